//! Auth Middleware
//!
//! Axum layers that run the access policies before a handler, plus the
//! extractors handlers use to read what the layers attached.
//!
//! Layers compose in the usual axum order: the last `.layer` added runs
//! first, so `require_roles`, `tenant_isolation` and `tenant_header` are
//! added before `require_auth`/`optional_auth`.

use std::sync::Arc;

use axum::async_trait;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use tracing::debug;

use super::acl::{ensure_tenant, resolve_tenant, RoleRequirement, TenantContext, TENANT_HEADER};
use super::auth::{bearer_token, Principal, TokenVerifier};
use crate::error::AuthError;

fn authorization(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
}

fn attach(req: &mut Request, principal: Principal) {
    req.extensions_mut()
        .insert(TenantContext::for_principal(&principal));
    req.extensions_mut().insert(principal);
}

/// Reject requests without a valid bearer token
pub async fn require_auth(
    State(verifier): State<Arc<TokenVerifier>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let Some(token) = authorization(req.headers()) else {
        debug!(path = %req.uri().path(), "missing bearer token");
        return Err(AuthError::unauthorized("No authentication token provided"));
    };

    let principal = verifier.verify(token)?;
    attach(&mut req, principal);
    Ok(next.run(req).await)
}

/// Attach a principal when a valid token is present, never reject
pub async fn optional_auth(
    State(verifier): State<Arc<TokenVerifier>>,
    mut req: Request,
    next: Next,
) -> Response {
    let principal = authorization(req.headers()).and_then(|token| verifier.verify(token).ok());
    if let Some(principal) = principal {
        attach(&mut req, principal);
    }
    next.run(req).await
}

/// Reject principals whose platform role is not allowed
pub async fn require_roles(
    State(requirement): State<RoleRequirement>,
    req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let principal = req
        .extensions()
        .get::<Principal>()
        .ok_or_else(|| AuthError::unauthorized("Authentication required"))?;
    requirement.check(principal)?;
    Ok(next.run(req).await)
}

/// Require a trustworthy tenant id on the principal
pub async fn tenant_isolation(req: Request, next: Next) -> Result<Response, AuthError> {
    let principal = req
        .extensions()
        .get::<Principal>()
        .ok_or_else(|| AuthError::unauthorized("Tenant information missing"))?;
    ensure_tenant(principal)?;
    Ok(next.run(req).await)
}

/// Apply an explicit `x-tenant-id` selection to the tenant context
pub async fn tenant_header(mut req: Request, next: Next) -> Result<Response, AuthError> {
    let header = req
        .headers()
        .get(TENANT_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if header.is_some() {
        let context = resolve_tenant(req.extensions().get::<Principal>(), header.as_deref())?;
        req.extensions_mut().insert(context);
    }
    Ok(next.run(req).await)
}

/// Principal attached by `require_auth`; 401 when missing
#[derive(Debug, Clone)]
pub struct Authenticated(pub Principal);

#[async_trait]
impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .map(Authenticated)
            .ok_or_else(|| AuthError::unauthorized("Authentication required"))
    }
}

/// Principal attached by `optional_auth`, if any
#[derive(Debug, Clone)]
pub struct MaybeAuthenticated(pub Option<Principal>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeAuthenticated
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeAuthenticated(parts.extensions.get::<Principal>().cloned()))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<TenantContext>()
            .cloned()
            .ok_or_else(|| AuthError::unauthorized("Tenant information missing"))
    }
}
