//! Application configuration. Paths, remote endpoint, retry policy knobs.

use serde::Deserialize;

/// Base delay for the sync retry backoff: `base x 2^retries`.
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 5_000;

/// Informational retry ceiling. Not enforced unless
/// `enforce_retry_cap` is set: by default the engine never gives up on a
/// failed submission, it only backs off harder.
pub const DEFAULT_RETRY_CAP: u32 = 12;

/// Cadence of exam-timer checkpoints while a session is open.
pub const DEFAULT_CHECKPOINT_SECS: u64 = 30;

#[derive(Debug, Deserialize, Default)]
pub struct AppConfig {
    /// Local data directory (sqlite db, identity profile). Read from CERT_PREP_DATA_DIR.
    pub data_dir: Option<String>,

    /// Path to the question/config catalog JSON. Read from CERT_PREP_CATALOG_PATH.
    #[serde(default)]
    pub catalog_path: Option<String>,

    /// Remote results endpoint base URL. When unset, the mock gateway is
    /// wired instead. Read from CERT_PREP_API_BASE_URL.
    #[serde(default)]
    pub api_base_url: Option<String>,

    /// Backoff base delay in ms. Read from CERT_PREP_RETRY_BASE_DELAY_MS.
    #[serde(default)]
    pub retry_base_delay_ms: Option<u64>,

    /// Retry ceiling. Read from CERT_PREP_RETRY_CAP.
    #[serde(default)]
    pub retry_cap: Option<u32>,

    /// Whether the retry ceiling is a hard stop. Read from CERT_PREP_ENFORCE_RETRY_CAP.
    #[serde(default)]
    pub enforce_retry_cap: Option<bool>,

    /// Timer checkpoint cadence in seconds. Read from CERT_PREP_CHECKPOINT_SECS.
    #[serde(default)]
    pub checkpoint_secs: Option<u64>,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();
        let mut c = config::Config::builder();
        c = c.add_source(config::Environment::with_prefix("CERT_PREP"));
        if let Ok(path) = std::env::var("CERT_PREP_CONFIG") {
            c = c.add_source(config::File::with_name(&path));
        }
        c.build()?.try_deserialize()
    }

    pub fn data_dir_or_default(&self) -> String {
        self.data_dir.clone().unwrap_or_else(|| "./data".to_string())
    }

    pub fn catalog_path_or_default(&self) -> String {
        self.catalog_path
            .clone()
            .unwrap_or_else(|| format!("{}/catalog.json", self.data_dir_or_default()))
    }

    pub fn retry_base_delay_ms_or_default(&self) -> u64 {
        self.retry_base_delay_ms
            .unwrap_or(DEFAULT_RETRY_BASE_DELAY_MS)
    }

    pub fn retry_cap_or_default(&self) -> u32 {
        self.retry_cap.unwrap_or(DEFAULT_RETRY_CAP)
    }

    pub fn enforce_retry_cap_or_default(&self) -> bool {
        self.enforce_retry_cap.unwrap_or(false)
    }

    pub fn checkpoint_secs_or_default(&self) -> u64 {
        self.checkpoint_secs.unwrap_or(DEFAULT_CHECKPOINT_SECS)
    }

    /// True when a real remote endpoint is configured.
    pub fn is_remote_configured(&self) -> bool {
        self.api_base_url.as_deref().is_some_and(|s| !s.is_empty())
    }
}
