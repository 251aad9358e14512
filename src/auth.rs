//! Caller identity
//!
//! Credential verification is delegated to an [`Authenticator`]. Handlers
//! receive a verified [`Actor`] through the axum extractor below, which reads
//! a bearer token from the `Authorization` header or, for WebSocket upgrades
//! where browsers cannot set headers, from the `token` query parameter.

use crate::config::TokenEntry;
use crate::error::{MonitorError, Result};
use crate::http::AppState;
use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Teacher,
    Student,
}

/// A verified caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub user_id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    pub fn require_role(&self, role: Role) -> Result<()> {
        if self.role != role {
            return Err(MonitorError::Forbidden(format!(
                "{:?} role required",
                role
            )));
        }
        Ok(())
    }
}

/// Resolves a bearer credential to an actor
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, token: &str) -> Result<Actor>;
}

/// Fixed token table loaded from configuration
#[derive(Debug, Default)]
pub struct StaticTokenAuthenticator {
    tokens: HashMap<String, Actor>,
}

impl StaticTokenAuthenticator {
    pub fn new(entries: &[TokenEntry]) -> Self {
        let tokens = entries
            .iter()
            .map(|entry| {
                (
                    entry.token.clone(),
                    Actor::new(entry.user_id.clone(), entry.role),
                )
            })
            .collect();

        Self { tokens }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl Authenticator for StaticTokenAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<Actor> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| MonitorError::Unauthorized("invalid token".to_string()))
    }
}

/// Pull the credential out of the request: header first, then `?token=`
fn extract_token(parts: &Parts) -> Option<String> {
    if let Some(value) = parts.headers.get(AUTHORIZATION) {
        if let Ok(value) = value.to_str() {
            if let Some(token) = value.strip_prefix("Bearer ") {
                return Some(token.trim().to_string());
            }
        }
    }

    parts.uri.query().and_then(|query| {
        query.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            (key == "token" && !value.is_empty()).then(|| value.to_string())
        })
    })
}

#[async_trait]
impl FromRequestParts<AppState> for Actor {
    type Rejection = MonitorError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let token = extract_token(parts)
            .ok_or_else(|| MonitorError::Unauthorized("no token provided".to_string()))?;
        state.authenticator.authenticate(&token).await
    }
}
