//! Bearer JWT authentication.
//!
//! - Tokens are HS256 JWTs carrying the actor id (`sub`) and `role`
//! - `require_auth` resolves the token to an [`Actor`] and stores it as a request extension
//! - With `DEV_MODE=true`, requests without a token act as admin

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::routes::AppState;
use crate::accounts::{Actor, ActorKind, AgentId, ClientId};
use crate::store::AccountStore;

/// Lifetime of tokens handed out when accounts are created.
pub const TOKEN_TTL_DAYS: i64 = 30;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Account id, or "admin"
    pub sub: String,
    pub role: ActorKind,
    /// Issued-at unix seconds
    pub iat: i64,
    /// Expiration unix seconds
    pub exp: i64,
}

pub fn issue_jwt(secret: &str, ttl_days: i64, actor: &Actor) -> anyhow::Result<(String, i64)> {
    let now = Utc::now();
    let exp = now + Duration::days(ttl_days.max(1));
    let sub = match actor {
        Actor::Admin => "admin".to_string(),
        Actor::Agent(id) => id.to_string(),
        Actor::Client(id) => id.to_string(),
    };
    let claims = Claims {
        sub,
        role: actor.kind(),
        iat: now.timestamp(),
        exp: exp.timestamp(),
    };
    let token = jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok((token, claims.exp))
}

pub fn verify_jwt(token: &str, secret: &str) -> anyhow::Result<Actor> {
    let token_data = jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    let claims = token_data.claims;
    Actor::from_parts(claims.role, &claims.sub)
        .ok_or_else(|| anyhow::anyhow!("malformed subject {:?}", claims.sub))
}

fn bearer_token(req: &Request<Body>) -> &str {
    let auth_header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");

    auth_header
        .strip_prefix("Bearer ")
        .or_else(|| auth_header.strip_prefix("bearer "))
        .unwrap_or("")
        .trim()
}

pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let token = bearer_token(&req).to_string();

    if token.is_empty() {
        if state.config.dev_mode {
            req.extensions_mut().insert(Actor::Admin);
            return next.run(req).await;
        }
        return (StatusCode::UNAUTHORIZED, "Missing Authorization header").into_response();
    }

    // Fail closed when no secret is configured.
    let Some(secret) = state.config.jwt_secret.as_deref() else {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "JWT_SECRET not configured",
        )
            .into_response();
    };

    let actor = match verify_jwt(&token, secret) {
        Ok(actor) => actor,
        Err(_) => {
            return (StatusCode::UNAUTHORIZED, "Invalid or expired token").into_response();
        }
    };

    match state.workflow.store().actor_exists(&actor).await {
        Ok(true) => {
            req.extensions_mut().insert(actor);
            next.run(req).await
        }
        Ok(false) => (StatusCode::UNAUTHORIZED, "Unknown account").into_response(),
        Err(e) => {
            tracing::error!("Account lookup failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Account lookup failed").into_response()
        }
    }
}

/// Layer for routes only administrators may call.
pub async fn admin_only(req: Request<Body>, next: Next) -> Response {
    match req.extensions().get::<Actor>() {
        Some(Actor::Admin) => next.run(req).await,
        _ => forbidden(ActorKind::Admin).into_response(),
    }
}

fn forbidden(role: ActorKind) -> (StatusCode, String) {
    (StatusCode::FORBIDDEN, format!("{} access required", role))
}

pub fn require_agent(actor: &Actor) -> Result<AgentId, (StatusCode, String)> {
    match actor {
        Actor::Agent(id) => Ok(*id),
        _ => Err(forbidden(ActorKind::Agent)),
    }
}

pub fn require_client(actor: &Actor) -> Result<ClientId, (StatusCode, String)> {
    match actor {
        Actor::Client(id) => Ok(*id),
        _ => Err(forbidden(ActorKind::Client)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_round_trip_per_role() {
        let agent = Actor::Agent(AgentId::new());
        let (token, exp) = issue_jwt("s3cret", TOKEN_TTL_DAYS, &agent).unwrap();
        assert!(exp > Utc::now().timestamp());
        assert_eq!(verify_jwt(&token, "s3cret").unwrap(), agent);
        assert!(verify_jwt(&token, "other").is_err());

        let (token, _) = issue_jwt("s3cret", 1, &Actor::Admin).unwrap();
        assert_eq!(verify_jwt(&token, "s3cret").unwrap(), Actor::Admin);
    }

    #[test]
    fn test_role_guards() {
        let client = ClientId::new();
        assert_eq!(require_client(&Actor::Client(client)).unwrap(), client);
        assert_eq!(
            require_agent(&Actor::Client(client)).unwrap_err().0,
            StatusCode::FORBIDDEN
        );
    }
}
