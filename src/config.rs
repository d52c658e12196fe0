use serde::Serialize;
use std::path::PathBuf;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:5000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Runtime settings, read from the environment (and `.env`) once at startup.
#[derive(Debug, Clone, Serialize)]
pub struct AppConfig {
    pub backend_url: String,
    pub db_path: PathBuf,
    pub timeout_secs: u64,
    pub auto_calculate: bool,
    pub export_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("docxtract")
        .join("docxtract.db")
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            backend_url: get("DOCXTRACT_BACKEND_URL")
                .or_else(|| get("BACKEND_URL"))
                .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string()),
            db_path: get("DOCXTRACT_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(default_db_path),
            timeout_secs: get("DOCXTRACT_TIMEOUT_SECS")
                .and_then(|v| v.trim().parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
            auto_calculate: get("DOCXTRACT_AUTO_CALCULATE")
                .and_then(|v| parse_bool(&v))
                .unwrap_or(true),
            export_dir: get("DOCXTRACT_EXPORT_DIR").map(PathBuf::from),
        }
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}
