//! VIGIL CLI
//!
//! Mint development tokens and query a running service's probes.

use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use vigil::security::{AuthConfig, Claims, PlatformRole, TokenVerifier};

/// VIGIL CLI - tokens and probes
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Sign a bearer token with the shared secret
    Token {
        /// User id (`sub` claim)
        #[arg(long)]
        user: String,

        #[arg(long)]
        email: Option<String>,

        #[arg(long, value_enum, default_value_t = Role::User)]
        role: Role,

        #[arg(long)]
        tenant: Option<String>,

        #[arg(long)]
        tenant_role: Option<String>,

        /// Lifetime in seconds
        #[arg(long, default_value_t = 3600)]
        ttl: i64,

        #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
        secret: Option<String>,

        #[arg(long, env = "JWT_ISSUER", default_value = "http://svc-auth:4001")]
        issuer: String,

        #[arg(long, env = "JWT_AUDIENCE", default_value = "ewh-saas")]
        audience: String,
    },

    /// Query a health or metrics endpoint
    Probe {
        /// Service base URL
        #[arg(long, default_value = "http://127.0.0.1:4000")]
        url: String,

        #[arg(value_enum, default_value_t = Endpoint::Health)]
        endpoint: Endpoint,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Role {
    User,
    TenantAdmin,
    PlatformAdmin,
    Owner,
}

impl From<Role> for PlatformRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => PlatformRole::User,
            Role::TenantAdmin => PlatformRole::TenantAdmin,
            Role::PlatformAdmin => PlatformRole::PlatformAdmin,
            Role::Owner => PlatformRole::Owner,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Endpoint {
    Live,
    Ready,
    Health,
    Metrics,
    MetricsJson,
}

impl Endpoint {
    fn path(&self) -> &'static str {
        match self {
            Endpoint::Live => "/health/live",
            Endpoint::Ready => "/health/ready",
            Endpoint::Health => "/health",
            Endpoint::Metrics => "/metrics",
            Endpoint::MetricsJson => "/metrics/json",
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    match args.command {
        Cmd::Token {
            user,
            email,
            role,
            tenant,
            tenant_role,
            ttl,
            secret,
            issuer,
            audience,
        } => {
            let mut config = AuthConfig::default()
                .with_issuer(&issuer)
                .with_audience(&audience);
            if let Some(secret) = &secret {
                config = config.with_secret(secret);
            }
            let verifier = TokenVerifier::new(config);

            let mut claims = Claims::for_user(&user, ttl).with_role(role.into());
            if let Some(email) = &email {
                claims = claims.with_email(email);
            }
            if let Some(tenant) = &tenant {
                claims = claims.with_tenant(tenant);
            }
            if let Some(tenant_role) = &tenant_role {
                claims = claims.with_tenant_role(tenant_role);
            }

            println!("{}", verifier.sign(&claims)?);
            Ok(ExitCode::SUCCESS)
        }

        Cmd::Probe { url, endpoint } => {
            let target = format!("{}{}", url.trim_end_matches('/'), endpoint.path());
            let response = reqwest::get(&target).await?;
            let status = response.status();
            let body = response.text().await?;

            match serde_json::from_str::<serde_json::Value>(&body) {
                Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
                Err(_) => print!("{}", body),
            }

            if status.is_success() {
                Ok(ExitCode::SUCCESS)
            } else {
                eprintln!("{} returned {}", target, status);
                Ok(ExitCode::FAILURE)
            }
        }
    }
}
