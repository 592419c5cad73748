use std::{env, time::Duration};

const LOCAL_JWT_SECRET: &str = "super-secure-test-secret-value-local";
const DEFAULT_ACCESS_TTL_SECS: u64 = 5 * 60;
const DEFAULT_REFRESH_TTL_SECS: u64 = 24 * 60 * 60;

/// AppConfig
///
/// Holds the application's entire configuration state. Loaded once at startup,
/// never mutated afterwards, and handed to handlers and extractors through
/// `FromRef`.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Runtime environment marker. Controls the development auth bypass and
    // whether secrets may fall back to defaults.
    pub env: Env,
    // Postgres connection string. Local runs without it use the in-memory store.
    pub db_url: Option<String>,
    // HMAC secret used to sign and verify access and refresh tokens.
    pub jwt_secret: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    // Externally visible root of the API, used to build navigable references.
    pub public_base_url: String,
    pub bind_addr: String,
    // Staff account provisioned at startup when configured.
    pub admin: Option<AdminBootstrap>,
}

/// Env
///
/// Runtime context: `Local` enables development conveniences, `Production`
/// demands every secret explicitly.
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

/// AdminBootstrap
///
/// Credentials of the staff account created on first start.
#[derive(Clone, Debug, PartialEq)]
pub struct AdminBootstrap {
    pub username: String,
    pub password: String,
    pub email: String,
}

impl Default for AppConfig {
    /// Safe, non-panicking values for test state scaffolding.
    fn default() -> Self {
        Self {
            env: Env::Local,
            db_url: None,
            jwt_secret: LOCAL_JWT_SECRET.to_string(),
            access_token_ttl: Duration::from_secs(DEFAULT_ACCESS_TTL_SECS),
            refresh_token_ttl: Duration::from_secs(DEFAULT_REFRESH_TTL_SECS),
            public_base_url: "http://localhost:3000".to_string(),
            bind_addr: "0.0.0.0:3000".to_string(),
            admin: None,
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads every parameter from the environment.
    ///
    /// # Panics
    /// Panics when `APP_ENV=production` and `DATABASE_URL` or `JWT_SECRET` is
    /// missing, or when a TTL is not a whole number of seconds. The service must
    /// not start half-configured.
    pub fn load() -> Self {
        let env = match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        };

        let (db_url, jwt_secret) = match env {
            Env::Production => (
                Some(
                    env::var("DATABASE_URL").expect("FATAL: DATABASE_URL required in production"),
                ),
                env::var("JWT_SECRET").expect("FATAL: JWT_SECRET must be set in production."),
            ),
            Env::Local => (
                env::var("DATABASE_URL").ok(),
                env::var("JWT_SECRET").unwrap_or_else(|_| LOCAL_JWT_SECRET.to_string()),
            ),
        };

        let admin = match (env::var("ADMIN_USERNAME"), env::var("ADMIN_PASSWORD")) {
            (Ok(username), Ok(password)) => Some(AdminBootstrap {
                email: env::var("ADMIN_EMAIL")
                    .unwrap_or_else(|_| format!("{}@localhost", username)),
                username,
                password,
            }),
            _ => None,
        };

        Self {
            env,
            db_url,
            jwt_secret,
            access_token_ttl: ttl_from_env("ACCESS_TOKEN_TTL_SECS", DEFAULT_ACCESS_TTL_SECS),
            refresh_token_ttl: ttl_from_env("REFRESH_TOKEN_TTL_SECS", DEFAULT_REFRESH_TTL_SECS),
            public_base_url: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            admin,
        }
    }
}

fn ttl_from_env(var: &str, default_secs: u64) -> Duration {
    match env::var(var) {
        Ok(raw) => Duration::from_secs(
            raw.trim()
                .parse()
                .unwrap_or_else(|_| panic!("FATAL: {var} must be a whole number of seconds")),
        ),
        Err(_) => Duration::from_secs(default_secs),
    }
}
