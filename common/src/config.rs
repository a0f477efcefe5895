//! Global application configuration manager.
//!
//! `AppConfig` is a lazily initialized, globally accessible singleton containing
//! runtime configuration values loaded from environment variables. It provides
//! thread-safe access and mutation for testing or overrides in runtime environments.

use std::env;
use std::sync::{OnceLock, RwLock};

/// Represents the complete application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub env: String,
    pub project_name: String,
    pub log_level: String,
    pub log_file: String,
    pub log_to_stdout: bool,
    pub database_path: String,
    pub submission_storage_root: String,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub generation_timeout_secs: u64,
    pub max_output_tokens: u32,
    pub job_max_attempts: u32,
    pub job_backoff_base_secs: u64,
    pub worker_count: usize,
    pub queue_poll_interval_ms: u64,
    pub completed_job_retention: u64,
    pub failed_job_retention: u64,
    pub upload_cache_ttl_hours: i64,
    pub inline_image_limit_bytes: u64,
}

/// Lazily-initialized, thread-safe singleton instance of `AppConfig`.
static CONFIG_INSTANCE: OnceLock<RwLock<AppConfig>> = OnceLock::new();

impl AppConfig {
    /// Loads the configuration from `.env` and environment variables.
    ///
    /// This method is used internally to populate the singleton. It panics
    /// if required variables are missing or improperly formatted.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            env: env::var("APP_ENV").unwrap_or_else(|_| "development".into()),
            project_name: env::var("PROJECT_NAME").unwrap_or_else(|_| "remark".into()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_file: env::var("LOG_FILE").unwrap_or_else(|_| "logs/remark.log".into()),
            log_to_stdout: env::var("LOG_TO_STDOUT").unwrap_or_else(|_| "true".into()) == "true",
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "data/remark.db".into()),
            submission_storage_root: env::var("SUBMISSION_STORAGE_ROOT")
                .unwrap_or_else(|_| "data/submissions".into()),
            gemini_api_key: env::var("GEMINI_API_KEY").unwrap_or_default(),
            gemini_model: env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| "gemini-2.5-flash".into()),
            generation_timeout_secs: env::var("GENERATION_TIMEOUT_SECS")
                .unwrap_or_else(|_| "120".into())
                .parse()
                .unwrap(),
            max_output_tokens: env::var("MAX_OUTPUT_TOKENS")
                .unwrap_or_else(|_| "8192".into())
                .parse()
                .unwrap(),
            job_max_attempts: env::var("JOB_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "3".into())
                .parse()
                .unwrap(),
            job_backoff_base_secs: env::var("JOB_BACKOFF_BASE_SECS")
                .unwrap_or_else(|_| "2".into())
                .parse()
                .unwrap(),
            worker_count: env::var("WORKER_COUNT")
                .unwrap_or_else(|_| "4".into())
                .parse()
                .unwrap(),
            queue_poll_interval_ms: env::var("QUEUE_POLL_INTERVAL_MS")
                .unwrap_or_else(|_| "500".into())
                .parse()
                .unwrap(),
            completed_job_retention: env::var("COMPLETED_JOB_RETENTION")
                .unwrap_or_else(|_| "10".into())
                .parse()
                .unwrap(),
            failed_job_retention: env::var("FAILED_JOB_RETENTION")
                .unwrap_or_else(|_| "5".into())
                .parse()
                .unwrap(),
            // Gemini file handles expire after 48h; stay well inside that window.
            upload_cache_ttl_hours: env::var("UPLOAD_CACHE_TTL_HOURS")
                .unwrap_or_else(|_| "45".into())
                .parse()
                .unwrap(),
            inline_image_limit_bytes: env::var("INLINE_IMAGE_LIMIT_BYTES")
                .unwrap_or_else(|_| (5 * 1024 * 1024).to_string())
                .parse()
                .unwrap(),
        }
    }

    /// Returns a shared reference to the global configuration.
    ///
    /// # Panics
    /// Panics if the lock cannot be acquired.
    pub fn global() -> std::sync::RwLockReadGuard<'static, AppConfig> {
        CONFIG_INSTANCE
            .get_or_init(|| RwLock::new(AppConfig::from_env()))
            .read()
            .expect("Failed to acquire AppConfig read lock")
    }

    /// Resets the configuration by reloading from environment variables.
    ///
    /// Useful in tests to clear overrides.
    pub fn reset() {
        if let Some(lock) = CONFIG_INSTANCE.get() {
            let mut guard = lock.write().unwrap();
            *guard = AppConfig::from_env();
        }
    }

    /// Generic internal setter for any field in the config.
    ///
    /// Used by public per-field setter methods.
    fn set_field<F>(setter: F)
    where
        F: FnOnce(&mut AppConfig),
    {
        let lock = CONFIG_INSTANCE.get_or_init(|| RwLock::new(AppConfig::from_env()));
        let mut guard = lock
            .write()
            .expect("Failed to acquire AppConfig write lock");
        setter(&mut guard);
    }

    pub fn set_gemini_api_key(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.gemini_api_key = value.into());
    }

    pub fn set_gemini_model(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.gemini_model = value.into());
    }

    pub fn set_database_path(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.database_path = value.into());
    }

    pub fn set_submission_storage_root(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.submission_storage_root = value.into());
    }

    pub fn set_job_max_attempts(value: u32) {
        AppConfig::set_field(|cfg| cfg.job_max_attempts = value);
    }

    pub fn set_worker_count(value: usize) {
        AppConfig::set_field(|cfg| cfg.worker_count = value);
    }
}
