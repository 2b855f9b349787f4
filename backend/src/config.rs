use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    num::NonZeroUsize,
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_OSRM_URL: &str = "http://localhost:5000";
const DEFAULT_OSRM_PROFILE: &str = "driving";
const DEFAULT_NOMINATIM_URL: &str = "http://localhost:8080";
const DEFAULT_COUNTRY_CODES: &str = "bd";
const DEFAULT_SEARCH_TTL_SECS: u64 = 5 * 60;
const DEFAULT_SEARCH_CAPACITY: usize = 256;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: IpAddr,
    pub port: u16,
    pub osrm_url: String,
    pub osrm_profile: String,
    pub nominatim_url: String,
    /// Comma separated ISO codes passed to Nominatim; `None` searches worldwide.
    pub nominatim_country_codes: Option<String>,
    /// `None` allows any origin.
    pub cors_origin: Option<String>,
    pub static_dir: Option<PathBuf>,
    pub search_cache_ttl: Duration,
    pub search_cache_capacity: NonZeroUsize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            osrm_url: DEFAULT_OSRM_URL.to_string(),
            osrm_profile: DEFAULT_OSRM_PROFILE.to_string(),
            nominatim_url: DEFAULT_NOMINATIM_URL.to_string(),
            nominatim_country_codes: Some(DEFAULT_COUNTRY_CODES.to_string()),
            cors_origin: None,
            static_dir: None,
            search_cache_ttl: Duration::from_secs(DEFAULT_SEARCH_TTL_SECS),
            search_cache_capacity: NonZeroUsize::new(DEFAULT_SEARCH_CAPACITY)
                .unwrap_or(NonZeroUsize::MIN),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source, falling back to
    /// defaults for missing keys. Empty values count as missing.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        let search_cache_capacity = match parse::<usize>(&get, "SEARCH_CACHE_CAPACITY")? {
            Some(capacity) => NonZeroUsize::new(capacity).ok_or(ConfigError::Invalid {
                key: "SEARCH_CACHE_CAPACITY",
                value: capacity.to_string(),
            })?,
            None => defaults.search_cache_capacity,
        };

        Ok(Self {
            bind_addr: parse(&get, "BIND_ADDR")?.unwrap_or(defaults.bind_addr),
            port: parse(&get, "PORT")?.unwrap_or(defaults.port),
            osrm_url: get("OSRM_URL")
                .map(trim_url)
                .unwrap_or(defaults.osrm_url),
            osrm_profile: get("OSRM_PROFILE").unwrap_or(defaults.osrm_profile),
            nominatim_url: get("NOMINATIM_URL")
                .map(trim_url)
                .unwrap_or(defaults.nominatim_url),
            nominatim_country_codes: match get("NOMINATIM_COUNTRY_CODES") {
                Some(codes) if codes == "*" => None,
                Some(codes) => Some(codes),
                None => defaults.nominatim_country_codes,
            },
            cors_origin: get("CORS_ORIGIN").filter(|origin| origin != "*"),
            static_dir: get("STATIC_DIR").map(PathBuf::from),
            search_cache_ttl: parse::<u64>(&get, "SEARCH_CACHE_TTL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.search_cache_ttl),
            search_cache_capacity,
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }
}

fn parse<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    get(key)
        .map(|value| {
            value
                .trim()
                .parse::<T>()
                .map_err(|_| ConfigError::Invalid { key, value })
        })
        .transpose()
}

fn trim_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}
