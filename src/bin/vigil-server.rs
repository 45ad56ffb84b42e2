//! VIGIL Server Binary
//!
//! Hosts the health, metrics and guarded API routes for one service.

use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};
use vigil::security::AuthConfig;
use vigil::server::{Config, HttpCheckConfig};
use vigil::Server;

/// VIGIL Server - service health, metrics and tenant-aware auth
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Bind address
    #[arg(short, long, env = "VIGIL_BIND", default_value = "0.0.0.0")]
    bind: String,

    /// Port number
    #[arg(short, long, env = "VIGIL_PORT", default_value_t = 4000)]
    port: u16,

    /// Service name reported by the health and metrics endpoints
    #[arg(long, env = "VIGIL_SERVICE", default_value = "vigil")]
    service: String,

    /// Service version reported by `/health`
    #[arg(long, env = "VIGIL_VERSION", default_value = env!("CARGO_PKG_VERSION"))]
    service_version: String,

    /// HMAC secret used to verify bearer tokens
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    jwt_secret: Option<String>,

    /// Expected token issuer
    #[arg(long, env = "JWT_ISSUER", default_value = "http://svc-auth:4001")]
    jwt_issuer: String,

    /// Expected token audience
    #[arg(long, env = "JWT_AUDIENCE", default_value = "ewh-saas")]
    jwt_audience: String,

    /// HTTP dependency as name=url, `name!=url` marks it critical (repeatable)
    #[arg(long = "check", env = "VIGIL_HTTP_CHECKS", value_delimiter = ',')]
    checks: Vec<HttpCheckConfig>,

    /// Samples kept per histogram
    #[arg(long, default_value_t = vigil::observability::DEFAULT_HISTOGRAM_CAPACITY)]
    histogram_capacity: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("vigil=info".parse()?))
        .init();

    let args = Args::parse();

    let mut auth = AuthConfig::default()
        .with_issuer(&args.jwt_issuer)
        .with_audience(&args.jwt_audience);
    if let Some(secret) = &args.jwt_secret {
        auth = auth.with_secret(secret);
    }

    let mut config = Config::default()
        .with_bind(&args.bind)
        .with_port(args.port)
        .with_service(&args.service, &args.service_version)
        .with_auth(auth)
        .with_histogram_capacity(args.histogram_capacity);
    for check in args.checks {
        config = config.with_http_check(check);
    }

    info!(
        "Starting {} on {}:{} with {} HTTP dependency checks",
        config.service_name,
        config.bind,
        config.port,
        config.http_checks.len()
    );

    let server = Server::new(config)?;
    server.run().await?;

    Ok(())
}
