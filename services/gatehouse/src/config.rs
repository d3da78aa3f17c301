use anyhow::{Context, Result, bail};
use gatehouse_authz::MAX_TOKEN_TTL;
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::time::Duration;

pub const DEFAULT_BIND: &str = "0.0.0.0:8000";
pub const DEFAULT_METRICS_BIND: &str = "0.0.0.0:9100";
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 3600;
pub const DEFAULT_TOKEN_ISSUER: &str = "gatehouse";
pub const DEFAULT_TOKEN_AUDIENCE: &str = "gatehouse-api";
pub const DEFAULT_ROLE: &str = "user";
pub const DEFAULT_PG_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_PG_CONNECT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_PG_ACQUIRE_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Postgres,
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "postgres" => Ok(StorageBackend::Postgres),
            other => bail!("unknown storage backend: {other}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_ms: u64,
    pub acquire_timeout_ms: u64,
}

impl PostgresConfig {
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: DEFAULT_PG_MAX_CONNECTIONS,
            connect_timeout_ms: DEFAULT_PG_CONNECT_TIMEOUT_MS,
            acquire_timeout_ms: DEFAULT_PG_ACQUIRE_TIMEOUT_MS,
        }
    }
}

#[derive(Clone)]
pub struct TokenConfig {
    pub issuer: String,
    pub audience: String,
    pub ttl: Duration,
    pub leeway_secs: u64,
    /// Hex Ed25519 seed. A random key is generated per process when unset.
    pub signing_key: Option<String>,
    pub previous_signing_keys: Vec<String>,
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("ttl", &self.ttl)
            .field("leeway_secs", &self.leeway_secs)
            .field("signing_key", &self.signing_key.as_ref().map(|_| "<redacted>"))
            .field("previous_signing_keys", &self.previous_signing_keys.len())
            .finish()
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            issuer: DEFAULT_TOKEN_ISSUER.to_string(),
            audience: DEFAULT_TOKEN_AUDIENCE.to_string(),
            ttl: Duration::from_secs(DEFAULT_TOKEN_TTL_SECS),
            leeway_secs: 0,
            signing_key: None,
            previous_signing_keys: Vec::new(),
        }
    }
}

/// Account created at bootstrap when absent.
#[derive(Clone)]
pub struct AdminAccount {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for AdminAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminAccount")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

// Service configuration sourced from environment variables.
#[derive(Debug, Clone)]
pub struct GatehouseConfig {
    pub bind_addr: SocketAddr,
    pub metrics_bind: SocketAddr,
    pub storage: StorageBackend,
    pub postgres: Option<PostgresConfig>,
    pub token: TokenConfig,
    pub default_role: String,
    pub admin: Option<AdminAccount>,
}

/// In-memory storage on the default ports, with no bootstrap admin.
impl Default for GatehouseConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            metrics_bind: SocketAddr::from(([0, 0, 0, 0], 9100)),
            storage: StorageBackend::Memory,
            postgres: None,
            token: TokenConfig::default(),
            default_role: DEFAULT_ROLE.to_string(),
            admin: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GatehouseConfigOverride {
    bind_addr: Option<String>,
    metrics_bind: Option<String>,
    storage: Option<String>,
    postgres_url: Option<String>,
    postgres_max_connections: Option<u32>,
    token_ttl_secs: Option<u64>,
    token_leeway_secs: Option<u64>,
    token_issuer: Option<String>,
    token_audience: Option<String>,
    default_role: Option<String>,
    admin_email: Option<String>,
}

impl GatehouseConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr = env_or("GATEHOUSE_BIND", DEFAULT_BIND)
            .parse::<SocketAddr>()
            .with_context(|| "parse GATEHOUSE_BIND")?;
        let metrics_bind = env_or("GATEHOUSE_METRICS_BIND", DEFAULT_METRICS_BIND)
            .parse::<SocketAddr>()
            .with_context(|| "parse GATEHOUSE_METRICS_BIND")?;
        let storage = env_or("GATEHOUSE_STORAGE", "memory")
            .parse::<StorageBackend>()
            .with_context(|| "parse GATEHOUSE_STORAGE")?;
        let postgres = std::env::var("GATEHOUSE_POSTGRES_URL")
            .ok()
            .map(PostgresConfig::with_url);

        let token = TokenConfig {
            issuer: env_or("GATEHOUSE_TOKEN_ISSUER", DEFAULT_TOKEN_ISSUER),
            audience: env_or("GATEHOUSE_TOKEN_AUDIENCE", DEFAULT_TOKEN_AUDIENCE),
            ttl: token_ttl(
                env_or("GATEHOUSE_TOKEN_TTL_SECS", &DEFAULT_TOKEN_TTL_SECS.to_string())
                    .parse::<u64>()
                    .with_context(|| "parse GATEHOUSE_TOKEN_TTL_SECS")?,
            )
            .with_context(|| "GATEHOUSE_TOKEN_TTL_SECS")?,
            leeway_secs: env_or("GATEHOUSE_TOKEN_LEEWAY_SECS", "0")
                .parse::<u64>()
                .with_context(|| "parse GATEHOUSE_TOKEN_LEEWAY_SECS")?,
            signing_key: std::env::var("GATEHOUSE_SIGNING_KEY").ok(),
            previous_signing_keys: std::env::var("GATEHOUSE_PREVIOUS_SIGNING_KEYS")
                .map(|value| split_list(&value))
                .unwrap_or_default(),
        };

        let admin = match (
            std::env::var("GATEHOUSE_ADMIN_EMAIL"),
            std::env::var("GATEHOUSE_ADMIN_PASSWORD"),
        ) {
            (Ok(email), Ok(password)) => Some(AdminAccount { email, password }),
            (Ok(_), Err(_)) => bail!("GATEHOUSE_ADMIN_EMAIL is set without GATEHOUSE_ADMIN_PASSWORD"),
            (Err(_), Ok(_)) => bail!("GATEHOUSE_ADMIN_PASSWORD is set without GATEHOUSE_ADMIN_EMAIL"),
            (Err(_), Err(_)) => None,
        };

        Ok(Self {
            bind_addr,
            metrics_bind,
            storage,
            postgres,
            token,
            default_role: env_or("GATEHOUSE_DEFAULT_ROLE", DEFAULT_ROLE),
            admin,
        })
    }

    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::from_env()?;
        if let Ok(path) = std::env::var("GATEHOUSE_CONFIG") {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("read GATEHOUSE_CONFIG: {path}"))?;
            config.apply_yaml(&contents)?;
        }
        Ok(config)
    }

    fn apply_yaml(&mut self, contents: &str) -> Result<()> {
        let override_cfg: GatehouseConfigOverride =
            serde_yaml::from_str(contents).with_context(|| "parse gatehouse config yaml")?;
        if let Some(value) = override_cfg.bind_addr {
            self.bind_addr = value.parse::<SocketAddr>().with_context(|| "parse bind_addr")?;
        }
        if let Some(value) = override_cfg.metrics_bind {
            self.metrics_bind = value.parse::<SocketAddr>().with_context(|| "parse metrics_bind")?;
        }
        if let Some(value) = override_cfg.storage {
            self.storage = value.parse::<StorageBackend>().with_context(|| "parse storage")?;
        }
        if let Some(value) = override_cfg.postgres_url {
            self.postgres = Some(PostgresConfig::with_url(value));
        }
        if let Some(value) = override_cfg.postgres_max_connections
            && let Some(pg) = self.postgres.as_mut()
        {
            pg.max_connections = value;
        }
        if let Some(value) = override_cfg.token_ttl_secs {
            self.token.ttl = token_ttl(value).with_context(|| "token_ttl_secs")?;
        }
        if let Some(value) = override_cfg.token_leeway_secs {
            self.token.leeway_secs = value;
        }
        if let Some(value) = override_cfg.token_issuer {
            self.token.issuer = value;
        }
        if let Some(value) = override_cfg.token_audience {
            self.token.audience = value;
        }
        if let Some(value) = override_cfg.default_role {
            self.default_role = value;
        }
        if let Some(email) = override_cfg.admin_email {
            // Passwords stay in the environment.
            match self.admin.as_mut() {
                Some(admin) => admin.email = email,
                None => bail!("admin_email requires GATEHOUSE_ADMIN_PASSWORD"),
            }
        }
        Ok(())
    }
}

fn token_ttl(secs: u64) -> Result<Duration> {
    let ttl = Duration::from_secs(secs);
    if secs == 0 || ttl > MAX_TOKEN_TTL {
        bail!("token lifetime must be between 1 and {} seconds, got {secs}", MAX_TOKEN_TTL.as_secs());
    }
    Ok(ttl)
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
