//! Store connection settings and cache tunables.
//!
//! Read once at start-up. A missing endpoint is the supported "cache
//! disabled" configuration, not an error.

use std::time::Duration;

/// Default connection pool size.
pub const DEFAULT_POOL_SIZE: u32 = 16;

/// Default bound on a single store round trip.
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_millis(300);

/// Default lifetime of availability entries.
pub const DEFAULT_AVAILABILITY_TTL: Duration = Duration::from_secs(300);

/// Default number of lookups resolved concurrently per batch chunk.
pub const DEFAULT_BATCH_SIZE: usize = 10;

const ENV_URL: &str = "CACHE_STORE_URL";
const ENV_TOKEN: &str = "CACHE_STORE_TOKEN";
const ENV_POOL_SIZE: &str = "CACHE_POOL_SIZE";
const ENV_OP_TIMEOUT_MS: &str = "CACHE_OP_TIMEOUT_MS";
const ENV_AVAILABILITY_TTL_SECS: &str = "CACHE_AVAILABILITY_TTL_SECS";
const ENV_BATCH_SIZE: &str = "CACHE_BATCH_SIZE";

#[derive(Clone, Debug)]
pub struct StoreSettings {
    /// Store endpoint. `None` disables caching.
    pub url: Option<String>,
    /// Store credential.
    pub token: Option<String>,
    pub pool_size: u32,
    /// Bound on opening a pooled connection.
    pub connect_timeout: Duration,
    /// Bound on every individual store call.
    pub op_timeout: Duration,
    pub availability_ttl: Duration,
    pub batch_size: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        StoreSettings {
            url: None,
            token: None,
            pool_size: DEFAULT_POOL_SIZE,
            connect_timeout: Duration::from_secs(5),
            op_timeout: DEFAULT_OP_TIMEOUT,
            availability_ttl: DEFAULT_AVAILABILITY_TTL,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl StoreSettings {
    /// Read settings from the process environment.
    ///
    /// | Variable | Meaning | Default |
    /// |----------|---------|---------|
    /// | `CACHE_STORE_URL` | endpoint | unset (disabled) |
    /// | `CACHE_STORE_TOKEN` | credential | unset |
    /// | `CACHE_POOL_SIZE` | pool size | 16 |
    /// | `CACHE_OP_TIMEOUT_MS` | per-call timeout | 300 |
    /// | `CACHE_AVAILABILITY_TTL_SECS` | availability TTL | 300 |
    /// | `CACHE_BATCH_SIZE` | batch chunk size | 10 |
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = StoreSettings::default();
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let settings = StoreSettings {
            url: non_empty(ENV_URL),
            token: non_empty(ENV_TOKEN),
            pool_size: parse_or(&lookup, ENV_POOL_SIZE, defaults.pool_size),
            connect_timeout: defaults.connect_timeout,
            op_timeout: parse_or(&lookup, ENV_OP_TIMEOUT_MS, None::<u64>)
                .map(Duration::from_millis)
                .unwrap_or(defaults.op_timeout),
            availability_ttl: parse_or(&lookup, ENV_AVAILABILITY_TTL_SECS, None::<u64>)
                .map(Duration::from_secs)
                .unwrap_or(defaults.availability_ttl),
            batch_size: parse_or(&lookup, ENV_BATCH_SIZE, defaults.batch_size).max(1),
        };

        if settings.url.is_none() {
            info!("{} not set - cache disabled, all reads compute directly", ENV_URL);
        }

        settings
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_op_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = timeout;
        self
    }

    pub fn with_availability_ttl(mut self, ttl: Duration) -> Self {
        self.availability_ttl = ttl;
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Whether an endpoint is configured.
    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }
}

/// Parse `name` into `T`, or keep `default` (with a warning when the value is
/// present but malformed).
fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: ParseSetting,
{
    match lookup(name) {
        Some(raw) => match T::parse_setting(raw.trim()) {
            Some(value) => value,
            None => {
                warn!("Ignoring invalid {}={:?}, using default", name, raw);
                default
            }
        },
        None => default,
    }
}

trait ParseSetting: Sized {
    fn parse_setting(raw: &str) -> Option<Self>;
}

impl ParseSetting for u32 {
    fn parse_setting(raw: &str) -> Option<Self> {
        raw.parse().ok()
    }
}

impl ParseSetting for usize {
    fn parse_setting(raw: &str) -> Option<Self> {
        raw.parse().ok()
    }
}

impl ParseSetting for Option<u64> {
    fn parse_setting(raw: &str) -> Option<Self> {
        raw.parse().ok().map(Some)
    }
}
