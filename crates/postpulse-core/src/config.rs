use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_dir: String,
    pub duckdb_memory_limit: String,
    pub geoip_path: String,
    pub auth_mode: AuthMode,
    pub cors_origins: Vec<String>,
    pub cleanup_interval_secs: u64,
    pub backfill_resume: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuthMode {
    /// Admin routes are open.
    None,
    /// Holds the plaintext token read from `POSTPULSE_ADMIN_TOKEN`.
    Token(String),
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            port: std::env::var("POSTPULSE_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|e| format!("invalid port: {e}"))?,
            data_dir: std::env::var("POSTPULSE_DATA_DIR").unwrap_or_else(|_| "./data".to_string()),
            duckdb_memory_limit: std::env::var("POSTPULSE_DUCKDB_MEMORY")
                .unwrap_or_else(|_| "1GB".to_string()),
            geoip_path: std::env::var("POSTPULSE_GEOIP_PATH")
                .unwrap_or_else(|_| "./GeoLite2-City.mmdb".to_string()),
            auth_mode: match std::env::var("POSTPULSE_ADMIN_TOKEN") {
                Ok(token) if !token.trim().is_empty() => AuthMode::Token(token),
                _ => AuthMode::None,
            },
            cors_origins: std::env::var("POSTPULSE_CORS_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            cleanup_interval_secs: std::env::var("POSTPULSE_CLEANUP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(|v| v.clamp(10, 3600))
                .unwrap_or(300),
            backfill_resume: std::env::var("POSTPULSE_BACKFILL_RESUME")
                .map(|v| v != "false")
                .unwrap_or(true),
        })
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn db_path(&self) -> String {
        format!("{}/postpulse.db", self.data_dir)
    }
}
