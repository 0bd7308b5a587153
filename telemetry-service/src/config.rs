use serde::Deserialize;
use std::fs;

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub uri: String,
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
    /// Applied as the PostgreSQL `statement_timeout` of every pooled connection.
    #[serde(default = "default_statement_timeout_ms")]
    pub statement_timeout_ms: u64,
    #[serde(default)]
    pub apply_schema: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsConfig {
    /// Length of the trailing performance window.
    #[serde(default = "default_window_hours")]
    pub window_hours: u32,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            window_hours: default_window_hours(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub http: HttpConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    pub metrics: Option<MetricsConfig>,
}

fn default_acquire_timeout_ms() -> u64 {
    5_000
}

fn default_statement_timeout_ms() -> u64 {
    10_000
}

/// One hundred years of hours.
const MAX_WINDOW_HOURS: u32 = 8_760 * 100;

fn default_window_hours() -> u32 {
    24
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("TELEMETRY_CONFIG").unwrap_or_else(|_| "telemetry-config.toml".to_string());
        let contents = fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {path}: {e}"))?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        if cfg.analytics.window_hours == 0 {
            anyhow::bail!("analytics.window_hours must be greater than zero");
        }
        if cfg.analytics.window_hours > MAX_WINDOW_HOURS {
            anyhow::bail!(
                "analytics.window_hours must be at most {MAX_WINDOW_HOURS}, got {}",
                cfg.analytics.window_hours
            );
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_fills_defaults() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [database]
            uri = "postgres://telemetry@localhost/telemetry"
            max_connections = 8

            [http]
            bind_addr = "127.0.0.1:8080"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.database.max_connections, 8);
        assert_eq!(cfg.database.acquire_timeout_ms, 5_000);
        assert_eq!(cfg.database.statement_timeout_ms, 10_000);
        assert!(!cfg.database.apply_schema);
        assert_eq!(cfg.analytics.window_hours, 24);
        assert!(cfg.metrics.is_none());
    }

    #[test]
    fn full_config_is_parsed() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [database]
            uri = "postgres://telemetry@db/telemetry"
            max_connections = 16
            acquire_timeout_ms = 1500
            statement_timeout_ms = 3000
            apply_schema = true

            [http]
            bind_addr = "0.0.0.0:8080"

            [analytics]
            window_hours = 12

            [metrics]
            bind_addr = "0.0.0.0:9100"
            "#,
        )
        .unwrap();

        assert!(cfg.database.apply_schema);
        assert_eq!(cfg.database.statement_timeout_ms, 3000);
        assert_eq!(cfg.analytics.window_hours, 12);
        assert_eq!(cfg.metrics.unwrap().bind_addr, "0.0.0.0:9100");
    }

    #[test]
    fn zero_hour_window_is_rejected() {
        let res = AppConfig::from_toml_str(
            r#"
            [database]
            uri = "postgres://localhost/telemetry"
            max_connections = 1

            [http]
            bind_addr = "127.0.0.1:8080"

            [analytics]
            window_hours = 0
            "#,
        );
        assert!(res.is_err());
    }

    #[test]
    fn window_longer_than_a_century_is_rejected() {
        let config = |hours: u32| {
            format!(
                r#"
                [database]
                uri = "postgres://localhost/telemetry"
                max_connections = 1

                [http]
                bind_addr = "127.0.0.1:8080"

                [analytics]
                window_hours = {hours}
                "#
            )
        };

        assert!(AppConfig::from_toml_str(&config(MAX_WINDOW_HOURS)).is_ok());
        assert!(AppConfig::from_toml_str(&config(MAX_WINDOW_HOURS + 1)).is_err());
        assert!(AppConfig::from_toml_str(&config(u32::MAX)).is_err());
    }
}
