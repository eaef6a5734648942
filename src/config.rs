// Configuration knobs, read from environment variables with defaults.

use std::env;
use std::sync::OnceLock;

static CONFIG: OnceLock<Config> = OnceLock::new();

#[derive(Debug, Clone)]
pub struct Config {
    /// Read connection pool size (TIERGRAPH_POOL_SIZE)
    pub pool_size: u32,

    /// Read connection pool minimum idle connections (TIERGRAPH_POOL_MIN_IDLE)
    pub pool_min_idle: u32,

    /// Maximum analyzable file size in megabytes (TIERGRAPH_MAX_FILE_MB).
    /// Oversized files are marked errored and skipped.
    pub max_file_mb: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pool_size: 8,
            pool_min_idle: 2,
            max_file_mb: 10,
        }
    }
}

impl Config {
    fn from_env() -> Self {
        let mut config = Config::default();

        if let Ok(val) = env::var("TIERGRAPH_POOL_SIZE") {
            if let Ok(parsed) = val.parse() {
                config.pool_size = parsed;
            } else {
                tracing::warn!(value = %val, "invalid TIERGRAPH_POOL_SIZE, using default");
            }
        }

        if let Ok(val) = env::var("TIERGRAPH_POOL_MIN_IDLE") {
            if let Ok(parsed) = val.parse() {
                config.pool_min_idle = parsed;
            } else {
                tracing::warn!(value = %val, "invalid TIERGRAPH_POOL_MIN_IDLE, using default");
            }
        }

        if let Ok(val) = env::var("TIERGRAPH_MAX_FILE_MB") {
            if let Ok(parsed) = val.parse() {
                config.max_file_mb = parsed;
            } else {
                tracing::warn!(value = %val, "invalid TIERGRAPH_MAX_FILE_MB, using default");
            }
        }

        config
    }

    pub fn get() -> &'static Config {
        CONFIG.get_or_init(Config::from_env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.pool_size, 8);
        assert_eq!(config.pool_min_idle, 2);
        assert_eq!(config.max_file_mb, 10);
    }
}
