// ⚙️ Import Configuration - environment variables with local defaults

use anyhow::{bail, Context as AnyhowContext, Result};
use std::path::PathBuf;

use crate::report::DEFAULT_EXAMPLE_LIMIT;
use crate::sync::SyncOptions;

/// Loaded once at startup.
///
/// | Env Var                 | Default            |
/// |-------------------------|--------------------|
/// | `SYNC_DATABASE_PATH`    | `eligibility.db`   |
/// | `SYNC_BUCKET_ROOT`      | `./buckets`        |
/// | `SYNC_ALLOWED_EMAIL`    | none (server only) |
/// | `SYNC_JWT_SECRET`       | none (server only) |
/// | `SYNC_BIND_ADDR`        | `127.0.0.1:3000`   |
/// | `SYNC_MIN_VALID_RATIO`  | `0.0`              |
/// | `SYNC_REPORT_EXAMPLES`  | `5`                |
/// | `SYNC_LOG_JSON`         | `false`            |
#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub database_path: PathBuf,
    pub bucket_root: PathBuf,
    pub allowed_email: Option<String>,
    pub jwt_secret: Option<String>,
    pub bind_addr: String,
    pub min_valid_ratio: f64,
    pub report_examples: usize,
    pub log_json: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        ImportConfig {
            database_path: PathBuf::from("eligibility.db"),
            bucket_root: PathBuf::from("./buckets"),
            allowed_email: None,
            jwt_secret: None,
            bind_addr: "127.0.0.1:3000".to_string(),
            min_valid_ratio: 0.0,
            report_examples: DEFAULT_EXAMPLE_LIMIT,
            log_json: false,
        }
    }
}

impl ImportConfig {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = ImportConfig::default();
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let min_valid_ratio = match get("SYNC_MIN_VALID_RATIO") {
            Some(raw) => raw
                .trim()
                .parse::<f64>()
                .with_context(|| format!("SYNC_MIN_VALID_RATIO must be a number, got `{}`", raw))?,
            None => defaults.min_valid_ratio,
        };
        if !(0.0..=1.0).contains(&min_valid_ratio) {
            bail!("SYNC_MIN_VALID_RATIO must be between 0 and 1, got {}", min_valid_ratio);
        }

        let report_examples = match get("SYNC_REPORT_EXAMPLES") {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .with_context(|| format!("SYNC_REPORT_EXAMPLES must be a count, got `{}`", raw))?,
            None => defaults.report_examples,
        };

        let log_json = match get("SYNC_LOG_JSON").map(|v| v.trim().to_ascii_lowercase()) {
            None => defaults.log_json,
            Some(v) if matches!(v.as_str(), "1" | "true" | "yes") => true,
            Some(v) if matches!(v.as_str(), "0" | "false" | "no") => false,
            Some(v) => bail!("SYNC_LOG_JSON must be true or false, got `{}`", v),
        };

        Ok(ImportConfig {
            database_path: get("SYNC_DATABASE_PATH").map(PathBuf::from).unwrap_or(defaults.database_path),
            bucket_root: get("SYNC_BUCKET_ROOT").map(PathBuf::from).unwrap_or(defaults.bucket_root),
            allowed_email: get("SYNC_ALLOWED_EMAIL"),
            jwt_secret: get("SYNC_JWT_SECRET"),
            bind_addr: get("SYNC_BIND_ADDR").unwrap_or(defaults.bind_addr),
            min_valid_ratio,
            report_examples,
            log_json,
        })
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            min_valid_ratio: self.min_valid_ratio,
        }
    }

    /// Secret and allow-listed email, both required to serve imports.
    pub fn server_credentials(&self) -> Result<(&str, &str)> {
        let secret = self.jwt_secret.as_deref().context("SYNC_JWT_SECRET must be set")?;
        let email = self.allowed_email.as_deref().context("SYNC_ALLOWED_EMAIL must be set")?;
        Ok((secret, email))
    }
}

/// `RUST_LOG` filter (default `info`), plain or JSON lines.
pub fn init_tracing(json: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    // a second init (tests, embedding) is not an error
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
