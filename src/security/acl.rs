//! Access Control
//!
//! Role and tenant policies evaluated against an authenticated principal.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use super::auth::{PlatformRole, Principal};
use crate::error::AuthError;

/// Header used to select a tenant explicitly
pub const TENANT_HEADER: &str = "x-tenant-id";

/// Effective tenant for a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantContext {
    pub tenant_id: Option<String>,
}

impl TenantContext {
    pub fn new(tenant_id: Option<String>) -> Self {
        Self { tenant_id }
    }

    pub fn for_principal(principal: &Principal) -> Self {
        Self::new(principal.tenant_id.clone())
    }
}

/// Set of platform roles allowed through a route
#[derive(Debug, Clone)]
pub struct RoleRequirement {
    allowed: Arc<HashSet<PlatformRole>>,
    // Kept in declaration order for error messages
    names: Arc<[PlatformRole]>,
}

impl RoleRequirement {
    pub fn new(roles: impl IntoIterator<Item = PlatformRole>) -> Self {
        let mut names = Vec::new();
        let mut allowed = HashSet::new();
        for role in roles {
            if allowed.insert(role) {
                names.push(role);
            }
        }
        Self {
            allowed: Arc::new(allowed),
            names: names.into(),
        }
    }

    /// PLATFORM_ADMIN or OWNER
    pub fn platform_tier() -> Self {
        Self::new([PlatformRole::PlatformAdmin, PlatformRole::Owner])
    }

    pub fn allows(&self, role: PlatformRole) -> bool {
        self.allowed.contains(&role)
    }

    /// Reject principals whose platform role is not in the set
    pub fn check(&self, principal: &Principal) -> Result<(), AuthError> {
        if self.allows(principal.platform_role) {
            return Ok(());
        }
        let names: Vec<&str> = self.names.iter().map(PlatformRole::as_str).collect();
        Err(AuthError::forbidden(format!(
            "Required role: {}",
            names.join(" or ")
        )))
    }
}

/// Require a tenant id on the principal.
///
/// Platform-tier principals are not confined to that tenant; everyone else is,
/// by the data-access code that reads the tenant context downstream.
pub fn ensure_tenant(principal: &Principal) -> Result<(), AuthError> {
    match principal.tenant_id.as_deref() {
        Some(id) if !id.is_empty() => Ok(()),
        _ => Err(AuthError::unauthorized("Tenant information missing")),
    }
}

/// Resolve the effective tenant given an optional `x-tenant-id` header value.
///
/// Anonymous requests (only possible behind `optional_auth`) take the header
/// as is; it carries no authority without a principal.
pub fn resolve_tenant(
    principal: Option<&Principal>,
    header: Option<&str>,
) -> Result<TenantContext, AuthError> {
    let Some(requested) = header.filter(|h| !h.is_empty()) else {
        return Ok(TenantContext::new(
            principal.and_then(|p| p.tenant_id.clone()),
        ));
    };

    let Some(principal) = principal else {
        return Ok(TenantContext::new(Some(requested.to_string())));
    };

    if principal.tenant_id.as_deref() != Some(requested)
        && !principal.platform_role.is_platform_tier()
    {
        return Err(AuthError::forbidden("Access to this tenant is not allowed"));
    }

    Ok(TenantContext::new(Some(requested.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(role: PlatformRole, tenant: Option<&str>) -> Principal {
        Principal {
            user_id: "u1".to_string(),
            email: "u1@example.com".to_string(),
            platform_role: role,
            tenant_role: None,
            tenant_id: tenant.map(str::to_string),
        }
    }

    #[test]
    fn test_role_requirement() {
        let req = RoleRequirement::platform_tier();
        assert!(req.check(&principal(PlatformRole::Owner, None)).is_ok());
        assert!(req.check(&principal(PlatformRole::PlatformAdmin, None)).is_ok());

        let err = req.check(&principal(PlatformRole::User, None)).unwrap_err();
        assert_eq!(
            err,
            AuthError::forbidden("Required role: PLATFORM_ADMIN or OWNER")
        );
    }

    #[test]
    fn test_ensure_tenant() {
        assert!(ensure_tenant(&principal(PlatformRole::User, Some("A"))).is_ok());
        assert!(matches!(
            ensure_tenant(&principal(PlatformRole::User, None)),
            Err(AuthError::Unauthorized(_))
        ));
        assert!(matches!(
            ensure_tenant(&principal(PlatformRole::Owner, Some(""))),
            Err(AuthError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_tenant_header_override() {
        let user = principal(PlatformRole::User, Some("A"));
        let owner = principal(PlatformRole::Owner, Some("A"));

        assert!(matches!(
            resolve_tenant(Some(&user), Some("B")),
            Err(AuthError::Forbidden(_))
        ));
        assert_eq!(
            resolve_tenant(Some(&owner), Some("B")).unwrap().tenant_id.as_deref(),
            Some("B")
        );
        assert_eq!(
            resolve_tenant(Some(&user), Some("A")).unwrap().tenant_id.as_deref(),
            Some("A")
        );
    }

    #[test]
    fn test_tenant_without_header_uses_principal() {
        let user = principal(PlatformRole::User, Some("A"));
        assert_eq!(
            resolve_tenant(Some(&user), None).unwrap(),
            TenantContext::new(Some("A".to_string()))
        );
        assert_eq!(resolve_tenant(None, None).unwrap(), TenantContext::new(None));
    }

    #[test]
    fn test_anonymous_tenant_header() {
        assert_eq!(
            resolve_tenant(None, Some("B")).unwrap(),
            TenantContext::new(Some("B".to_string()))
        );
        assert_eq!(resolve_tenant(None, Some("")).unwrap(), TenantContext::new(None));
    }
}
