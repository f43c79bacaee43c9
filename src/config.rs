//! Configuration loading from `.env` files.

use std::env;

use anyhow::{Context, Result};

use crate::query::Limits;

/// Runtime settings derived from environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Postgres connection string.
    pub database_url: String,
    /// HTTP bind address, e.g. `127.0.0.1:7777`.
    pub bind_http: String,
    /// Enable Schnorr signature verification on ingest.
    pub verify_sig: bool,
    /// Query translation caps, overridable per deployment.
    pub limits: Limits,
}

impl Settings {
    /// Load settings from the specified `.env` file.
    pub fn from_env(path: &str) -> Result<Self> {
        dotenvy::from_filename(path).context("reading env file")?;
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL")?;
        let bind_http = env::var("BIND_HTTP").context("BIND_HTTP")?;
        let verify_sig = env::var("VERIFY_SIG").unwrap_or_else(|_| "0".into()) == "1";
        let defaults = Limits::default();
        let limits = Limits {
            max_ids: env_usize("MAX_IDS", defaults.max_ids),
            max_authors: env_usize("MAX_AUTHORS", defaults.max_authors),
            max_kinds: env_usize("MAX_KINDS", defaults.max_kinds),
            max_tag_values: env_usize("MAX_TAG_VALUES", defaults.max_tag_values),
            limit: env_usize("QUERY_LIMIT", defaults.limit),
        };
        Ok(Self {
            database_url,
            bind_http,
            verify_sig,
            limits,
        })
    }
}

/// Read an optional numeric override, keeping `default` when the variable is
/// absent or unparsable.
fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Split a comma-separated string into trimmed string values.
pub fn csv_strings(input: impl AsRef<str>) -> Vec<String> {
    let s = input.as_ref();
    s.split(',')
        .filter_map(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .collect()
}
