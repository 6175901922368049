use compass_store::StoreConfig;

pub const DEFAULT_ADDR: &str = "0.0.0.0:8000";

/// Service settings, read from the environment at startup.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// `COMPASS_API_ADDR`
    pub addr: String,
    pub store: StoreConfig,
}

impl ApiConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            addr: lookup("COMPASS_API_ADDR").unwrap_or_else(|| DEFAULT_ADDR.into()),
            store: StoreConfig::from_lookup(lookup),
        }
    }
}
