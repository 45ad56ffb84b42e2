//! Security Module
//!
//! Token verification, role and tenant policies, and the axum layers that
//! enforce them.

pub mod acl;
pub mod auth;
pub mod middleware;

pub use acl::{ensure_tenant, resolve_tenant, RoleRequirement, TenantContext, TENANT_HEADER};
pub use auth::{
    bearer_token, Audience, AuthConfig, Claims, PlatformRole, Principal, TokenVerifier,
};
pub use middleware::{
    optional_auth, require_auth, require_roles, tenant_header, tenant_isolation, Authenticated,
    MaybeAuthenticated,
};
