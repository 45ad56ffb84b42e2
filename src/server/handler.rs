//! API Handlers
//!
//! Small guarded routes showing how the access layers compose. Business
//! services mount their own routers the same way.

use std::sync::Arc;

use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::security::{
    optional_auth, require_auth, require_roles, tenant_header, tenant_isolation, Authenticated,
    MaybeAuthenticated, PlatformRole, Principal, RoleRequirement, TenantContext, TokenVerifier,
};

#[derive(Serialize)]
pub struct WhoAmI {
    pub principal: Principal,
    pub tenant_id: Option<String>,
}

#[derive(Serialize)]
pub struct Greeting {
    pub message: String,
    pub user_id: Option<String>,
    pub tenant_id: Option<String>,
}

#[derive(Serialize)]
pub struct AdminInfo {
    pub user_id: String,
    pub platform_role: PlatformRole,
}

async fn me(Authenticated(principal): Authenticated, tenant: TenantContext) -> Json<WhoAmI> {
    Json(WhoAmI {
        principal,
        tenant_id: tenant.tenant_id,
    })
}

async fn tenant(tenant: TenantContext) -> Json<TenantContext> {
    Json(tenant)
}

async fn admin(Authenticated(principal): Authenticated) -> Json<AdminInfo> {
    Json(AdminInfo {
        user_id: principal.user_id,
        platform_role: principal.platform_role,
    })
}

async fn hello(
    MaybeAuthenticated(principal): MaybeAuthenticated,
    tenant: Option<TenantContext>,
) -> Json<Greeting> {
    let message = match &principal {
        Some(p) if !p.email.is_empty() => format!("Hello, {}", p.email),
        Some(p) => format!("Hello, {}", p.user_id),
        None => "Hello, guest".to_string(),
    };
    Json(Greeting {
        message,
        user_id: principal.map(|p| p.user_id),
        tenant_id: tenant.and_then(|t| t.tenant_id),
    })
}

/// Demo API guarded by the access layers.
///
/// Layers are `route_layer`s so unmatched paths still fall through to 404.
pub fn api_router(verifier: Arc<TokenVerifier>) -> Router {
    let me_routes = Router::new()
        .route("/api/me", get(me))
        .route_layer(from_fn(tenant_header))
        .route_layer(from_fn_with_state(verifier.clone(), require_auth));

    let tenant_routes = Router::new()
        .route("/api/tenant", get(tenant))
        .route_layer(from_fn(tenant_header))
        .route_layer(from_fn(tenant_isolation))
        .route_layer(from_fn_with_state(verifier.clone(), require_auth));

    let admin_routes = Router::new()
        .route("/api/admin", get(admin))
        .route_layer(from_fn_with_state(
            RoleRequirement::platform_tier(),
            require_roles,
        ))
        .route_layer(from_fn_with_state(verifier.clone(), require_auth));

    let public_routes = Router::new()
        .route("/public/hello", get(hello))
        .route_layer(from_fn(tenant_header))
        .route_layer(from_fn_with_state(verifier, optional_auth));

    Router::new()
        .merge(me_routes)
        .merge(tenant_routes)
        .merge(admin_routes)
        .merge(public_routes)
}
