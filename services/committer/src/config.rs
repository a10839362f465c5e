use anyhow::{bail, Context, Result};

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Postgres backend when set; local JSON ledger otherwise
    pub database_url: Option<String>,
    pub ledger_file: String,
    pub bind_addr: String,

    pub commit_loop: bool,
    pub commit_interval_secs: u64,
    pub batch_limit: usize,

    pub anchor_url: Option<String>,
    pub anchor_secret: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            ledger_file: "ledger.json".to_string(),
            bind_addr: "0.0.0.0:8080".to_string(),
            commit_loop: true,
            commit_interval_secs: 60,
            batch_limit: minechain::DEFAULT_BATCH_LIMIT,
            anchor_url: None,
            anchor_secret: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let commit_interval_secs = match get("COMMIT_INTERVAL_SECS") {
            Some(v) => v.parse().with_context(|| format!("COMMIT_INTERVAL_SECS is not a number: {v}"))?,
            None => defaults.commit_interval_secs,
        };
        let batch_limit = match get("COMMIT_BATCH_LIMIT") {
            Some(v) => v.parse().with_context(|| format!("COMMIT_BATCH_LIMIT is not a number: {v}"))?,
            None => defaults.batch_limit,
        };
        let commit_loop = get("COMMIT_LOOP")
            .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
            .unwrap_or(defaults.commit_loop);

        let anchor_url = get("ANCHOR_URL");
        let anchor_secret = get("ANCHOR_SECRET");

        // Tiny sanity checks (fail fast, fail loud)
        if commit_interval_secs == 0 {
            bail!("COMMIT_INTERVAL_SECS must be greater than 0");
        }
        if !(1..=10_000).contains(&batch_limit) {
            bail!("COMMIT_BATCH_LIMIT must be between 1 and 10000");
        }
        if let Some(url) = &anchor_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                bail!("ANCHOR_URL must start with http:// or https://");
            }
            if anchor_secret.is_none() {
                bail!("ANCHOR_SECRET is required when ANCHOR_URL is set");
            }
        }

        Ok(Self {
            database_url: get("DATABASE_URL"),
            ledger_file: get("LEDGER_FILE").unwrap_or(defaults.ledger_file),
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
            commit_loop,
            commit_interval_secs,
            batch_limit,
            anchor_url,
            anchor_secret,
        })
    }
}
