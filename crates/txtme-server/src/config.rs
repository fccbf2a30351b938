use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

use txtme_notify::expo::DEFAULT_PUSH_URL;

/// Signing key used when `TXTME_JWT_SECRET` is unset. Fine for local runs only.
pub const DEV_JWT_SECRET: &str = "dev-secret-change-me";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub upload_dir: PathBuf,
    pub jwt_secret: String,
    pub push_url: String,
    pub push_timeout: Duration,
    pub send_limit: usize,
    pub send_window: Duration,
    /// `None` when the background sweep is disabled.
    pub sweep_interval: Option<Duration>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Unset or empty keys take
    /// their default; a value that does not parse is an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let sweep_secs: u64 = parse_or(&get, "TXTME_SWEEP_INTERVAL_SECS", 3600)?;

        Ok(Self {
            host: get("TXTME_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&get, "TXTME_PORT", 3000)?,
            db_path: get("TXTME_DB_PATH").unwrap_or_else(|| "txtme.db".into()).into(),
            upload_dir: get("TXTME_UPLOAD_DIR").unwrap_or_else(|| "./uploads".into()).into(),
            jwt_secret: get("TXTME_JWT_SECRET").unwrap_or_else(|| DEV_JWT_SECRET.into()),
            push_url: get("TXTME_PUSH_URL").unwrap_or_else(|| DEFAULT_PUSH_URL.into()),
            push_timeout: Duration::from_secs(parse_or(&get, "TXTME_PUSH_TIMEOUT_SECS", 10)?),
            send_limit: parse_or(&get, "TXTME_SEND_LIMIT", 12)?,
            send_window: Duration::from_secs(parse_or(&get, "TXTME_SEND_WINDOW_SECS", 60)?),
            sweep_interval: (sweep_secs > 0).then(|| Duration::from_secs(sweep_secs)),
        })
    }

    pub fn listen_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }

    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", key, raw)),
        None => Ok(default),
    }
}
