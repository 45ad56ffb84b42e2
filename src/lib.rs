//! VIGIL - Service Observability and Access-Control Core
//!
//! Bearer token verification with tenant isolation, dependency health
//! aggregation, and a Prometheus metrics registry, packaged as axum layers
//! and routes that every tenant-facing service embeds.

pub mod error;
pub mod metrics;
pub mod observability;
pub mod security;
pub mod server;

pub use error::{AuthError, DependencyError, ServerError};
pub use metrics::{record_request, track_requests};
pub use observability::{Dependency, HealthAggregator, HealthStatus, MetricsRegistry};
pub use security::{AuthConfig, PlatformRole, Principal, TenantContext, TokenVerifier};
pub use server::{Config, Server};
