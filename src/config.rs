use std::path::PathBuf;
use std::str::FromStr;

/// Server settings, read from `SQUADTIME_*` environment variables.
///
/// | Env var                       | Default         |
/// |-------------------------------|-----------------|
/// | `SQUADTIME_BIND`              | `0.0.0.0`       |
/// | `SQUADTIME_PORT`              | `5433`          |
/// | `SQUADTIME_DATA_DIR`          | `./data`        |
/// | `SQUADTIME_PASSWORD`          | `squadtime`     |
/// | `SQUADTIME_MAX_CONNECTIONS`   | `256`           |
/// | `SQUADTIME_COMPACT_THRESHOLD` | `1000`          |
/// | `SQUADTIME_RETENTION_DAYS`    | `90` (0 = off)  |
/// | `SQUADTIME_DEFAULT_TZ`        | `Europe/Berlin` |
/// | `SQUADTIME_TLS_CERT` / `_KEY` | unset           |
/// | `SQUADTIME_METRICS_PORT`      | unset           |
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub password: String,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub retention_days: u32,
    pub default_tz: String,
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
    pub metrics_port: Option<u16>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} is not valid: {value:?}")]
    Invalid { var: &'static str, value: String },
    #[error("SQUADTIME_DEFAULT_TZ: {0}")]
    Timezone(#[from] crate::timezone::UnknownTimezone),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let string = |var: &str, default: &str| lookup(var).unwrap_or_else(|| default.to_string());

        let default_tz = string("SQUADTIME_DEFAULT_TZ", "Europe/Berlin");
        crate::timezone::parse_tz(&default_tz)?;

        Ok(Self {
            bind: string("SQUADTIME_BIND", "0.0.0.0"),
            port: parsed(&lookup, "SQUADTIME_PORT")?.unwrap_or(5433),
            data_dir: PathBuf::from(string("SQUADTIME_DATA_DIR", "./data")),
            password: string("SQUADTIME_PASSWORD", "squadtime"),
            max_connections: parsed(&lookup, "SQUADTIME_MAX_CONNECTIONS")?.unwrap_or(256),
            compact_threshold: parsed(&lookup, "SQUADTIME_COMPACT_THRESHOLD")?.unwrap_or(1000),
            retention_days: parsed(&lookup, "SQUADTIME_RETENTION_DAYS")?.unwrap_or(90),
            default_tz,
            tls_cert: lookup("SQUADTIME_TLS_CERT").map(PathBuf::from),
            tls_key: lookup("SQUADTIME_TLS_KEY").map(PathBuf::from),
            metrics_port: parsed(&lookup, "SQUADTIME_METRICS_PORT")?,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("squadtime.wal")
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, var: &'static str) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults() {
        let c = config(&[]).unwrap();
        assert_eq!(c.addr(), "0.0.0.0:5433");
        assert_eq!(c.max_connections, 256);
        assert_eq!(c.compact_threshold, 1000);
        assert_eq!(c.retention_days, 90);
        assert_eq!(c.default_tz, "Europe/Berlin");
        assert_eq!(c.wal_path(), PathBuf::from("./data/squadtime.wal"));
        assert!(c.tls_cert.is_none());
        assert!(c.metrics_port.is_none());
    }

    #[test]
    fn overrides() {
        let c = config(&[
            ("SQUADTIME_PORT", "6000"),
            ("SQUADTIME_RETENTION_DAYS", "0"),
            ("SQUADTIME_DEFAULT_TZ", "America/New_York"),
            ("SQUADTIME_METRICS_PORT", "9100"),
        ])
        .unwrap();
        assert_eq!(c.port, 6000);
        assert_eq!(c.retention_days, 0);
        assert_eq!(c.default_tz, "America/New_York");
        assert_eq!(c.metrics_port, Some(9100));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            config(&[("SQUADTIME_PORT", "lots")]),
            Err(ConfigError::Invalid { var: "SQUADTIME_PORT", .. })
        ));
        assert!(matches!(
            config(&[("SQUADTIME_DEFAULT_TZ", "Mars/Olympus")]),
            Err(ConfigError::Timezone(_))
        ));
    }
}
