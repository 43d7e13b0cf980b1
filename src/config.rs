use std::env;
use std::path::PathBuf;

use anyhow::Result;

use crate::alert;

#[derive(Debug, Clone)]
pub struct Config {
    pub backend_url: String,
    pub poll_interval_ms: u64,
    pub capture_interval_ms: u64,
    pub warn_frames: u32,
    pub http_timeout_secs: u64,
    pub settings_dir: PathBuf,
    pub event_archive_path: PathBuf,
    pub dashboard: bool,
    pub detecting: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let backend_url =
            env::var("BACKEND_URL").unwrap_or_else(|_| "http://localhost:8000".to_string());

        let poll_interval_ms = get_env_var_u64("POLL_INTERVAL_MS", 500);
        let capture_interval_ms = get_env_var_u64("CAPTURE_INTERVAL_MS", 500);
        let warn_frames =
            get_env_var_u64("WARN_CONSECUTIVE_FRAMES", alert::DEFAULT_WARN_FRAMES as u64) as u32;
        let http_timeout_secs = get_env_var_u64("HTTP_TIMEOUT_SECS", 5);

        let settings_dir = PathBuf::from(env::var("SETTINGS_DIR").unwrap_or_else(|_| ".".to_string()));
        let event_archive_path =
            PathBuf::from(env::var("EVENT_ARCHIVE_PATH").unwrap_or_else(|_| "./events.db".to_string()));

        let dashboard = get_env_var_bool("DASHBOARD", true);
        let detecting = get_env_var_bool("DETECTING", false);

        Ok(Config {
            backend_url,
            poll_interval_ms,
            capture_interval_ms,
            warn_frames,
            http_timeout_secs,
            settings_dir,
            event_archive_path,
            dashboard,
            detecting,
        })
    }
}

fn get_env_var_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(default)
}

fn get_env_var_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(val) => matches!(val.as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}
