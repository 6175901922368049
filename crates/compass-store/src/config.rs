use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which backend a connection URI asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendTarget {
    /// Native document server (`mongodb://`, `mongodb+srv://`).
    Native(String),
    /// Relational database file (`sqlite:path`, `sqlite://path`, `sqlite::memory:`).
    Relational(String),
    /// Process-local store (`memory:`).
    Memory,
    Unsupported(String),
}

impl BackendTarget {
    pub fn from_uri(uri: &str) -> Self {
        let uri = uri.trim();
        if uri.starts_with("mongodb://") || uri.starts_with("mongodb+srv://") {
            return BackendTarget::Native(uri.to_string());
        }
        if let Some(rest) = uri.strip_prefix("sqlite:") {
            let path = rest.strip_prefix("//").unwrap_or(rest);
            let path = if path.is_empty() || path == ":memory:" {
                ":memory:"
            } else {
                path
            };
            return BackendTarget::Relational(path.to_string());
        }
        if uri.starts_with("memory:") {
            return BackendTarget::Memory;
        }
        BackendTarget::Unsupported(uri.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub uri: String,
    pub database_name: String,
    /// Upper bound on the initial connection attempt.
    #[serde(with = "millis")]
    pub connect_timeout: Duration,
    /// Switch to the in-memory store when the native server is unreachable.
    pub memory_fallback: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            uri: "mongodb://localhost:27017".into(),
            database_name: "compass".into(),
            connect_timeout: Duration::from_millis(2000),
            memory_fallback: true,
        }
    }
}

impl StoreConfig {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Default::default()
        }
    }

    /// Read `DATABASE_URI`, `DATABASE_NAME`, `DATABASE_CONNECT_TIMEOUT_MS`
    /// and `DATABASE_MEMORY_FALLBACK`, keeping defaults for anything unset
    /// or unparsable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            uri: lookup("DATABASE_URI").unwrap_or(defaults.uri),
            database_name: lookup("DATABASE_NAME").unwrap_or(defaults.database_name),
            connect_timeout: lookup("DATABASE_CONNECT_TIMEOUT_MS")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.connect_timeout),
            memory_fallback: lookup("DATABASE_MEMORY_FALLBACK")
                .and_then(|s| parse_flag(&s))
                .unwrap_or(defaults.memory_fallback),
        }
    }

    pub fn target(&self) -> BackendTarget {
        BackendTarget::from_uri(&self.uri)
    }
}

fn parse_flag(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
