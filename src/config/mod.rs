//! Service settings, read from environment variables.
//!
//! Every value has a default except the basic-auth credentials. Use
//! [`Settings::from_env`] in the binary and [`Settings::from_lookup`] in tests
//! so the process environment never has to be mutated.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Errors produced while loading settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {name}")]
    Missing { name: &'static str },

    #[error("invalid value {value:?} for {name}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Which [`ImageCache`](crate::cache::ImageCache) backend to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    /// Bounded in-process LRU map.
    Memory,
    /// Remote Redis store with per-entry TTL.
    Redis,
}

impl FromStr for CacheBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" | "lru" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            other => Err(format!("unknown cache backend `{other}`")),
        }
    }
}

/// Log output format for the binary's subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format `{other}`")),
        }
    }
}

/// Resize engine and cache settings.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub cache_backend: CacheBackend,
    /// LRU capacity in entries.
    pub image_cache_size: usize,
    /// Redis entry expiry.
    pub image_cache_ttl: Duration,
    pub redis_host: String,
    pub redis_port: u16,
    pub async_resize: bool,
    pub resize_workers: usize,
    pub resize_queue_size: usize,
    /// How long an image request waits on an in-flight resize.
    pub image_resize_timeout: Duration,
    /// Cap on bytes read from an origin response.
    pub max_image_size: u64,
    /// Cap on width × height of a resized image.
    pub max_output_pixels: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            cache_backend: CacheBackend::Memory,
            image_cache_size: 1024,
            image_cache_ttl: Duration::from_secs(3600),
            redis_host: "127.0.0.1".to_owned(),
            redis_port: 6379,
            async_resize: true,
            resize_workers: 4,
            resize_queue_size: 10_000,
            image_resize_timeout: Duration::from_secs(5),
            max_image_size: 15 * 1024 * 1024,
            max_output_pixels: 40_000_000,
        }
    }
}

impl ServiceSettings {
    /// Connection URL for the Redis backend.
    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}/", self.redis_host, self.redis_port)
    }
}

/// HTTP server and outbound client settings.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub server_port: u16,
    pub server_graceful_shutdown_timeout: Duration,
    pub client_read_timeout: Duration,
    pub client_user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            server_port: 4000,
            server_graceful_shutdown_timeout: Duration::from_secs(10),
            client_read_timeout: Duration::from_secs(10),
            client_user_agent: "imgresize".to_owned(),
        }
    }
}

/// Basic-auth credentials guarding the `/v1` routes.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub username: String,
    pub password: String,
    pub realm: String,
}

/// Logging settings, consumed by the binary only.
#[derive(Debug, Clone)]
pub struct LogSettings {
    /// Filter used when `RUST_LOG` is not set.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: LogFormat::Text,
        }
    }
}

/// All settings for one process.
#[derive(Debug, Clone)]
pub struct Settings {
    pub service: ServiceSettings,
    pub http: HttpSettings,
    pub auth: AuthSettings,
    pub log: LogSettings,
}

impl Settings {
    /// Loads settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] when `AUTH_USERNAME` or `AUTH_PASSWORD`
    /// is unset, and [`ConfigError::Invalid`] for any value that fails to parse
    /// or is out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads settings through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`Settings::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);
        let svc_defaults = ServiceSettings::default();
        let http_defaults = HttpSettings::default();
        let log_defaults = LogSettings::default();

        let service = ServiceSettings {
            cache_backend: env.parse("SVC_CACHE_BACKEND", svc_defaults.cache_backend)?,
            image_cache_size: env.positive("SVC_IMG_CACHE_SIZE", svc_defaults.image_cache_size)?,
            image_cache_ttl: Duration::from_secs(
                env.parse("SVC_IMG_CACHE_TTL_SECS", svc_defaults.image_cache_ttl.as_secs())?,
            ),
            redis_host: env.string("SVC_REDIS_HOST", &svc_defaults.redis_host),
            redis_port: env.parse("SVC_REDIS_PORT", svc_defaults.redis_port)?,
            async_resize: env.flag("SVC_ASYNC_RESIZE", svc_defaults.async_resize)?,
            resize_workers: env.positive("SVC_RESIZE_WORKERS", svc_defaults.resize_workers)?,
            resize_queue_size: env.positive("SVC_RESIZE_QUEUE_SIZE", svc_defaults.resize_queue_size)?,
            image_resize_timeout: env.millis(
                "SVC_IMG_RESIZE_TIMEOUT_MS",
                svc_defaults.image_resize_timeout,
            )?,
            max_image_size: env.parse("SVC_MAX_IMG_SIZE", svc_defaults.max_image_size)?,
            max_output_pixels: env.positive("SVC_MAX_OUTPUT_PIXELS", svc_defaults.max_output_pixels)?,
        };

        let http = HttpSettings {
            server_port: env.parse("HTTP_SERVER_PORT", http_defaults.server_port)?,
            server_graceful_shutdown_timeout: env.millis(
                "HTTP_SERVER_GRACEFUL_SHUTDOWN_TIMEOUT_MS",
                http_defaults.server_graceful_shutdown_timeout,
            )?,
            client_read_timeout: env.millis(
                "HTTP_CLIENT_READ_TIMEOUT_MS",
                http_defaults.client_read_timeout,
            )?,
            client_user_agent: env.string("HTTP_CLIENT_USER_AGENT", &http_defaults.client_user_agent),
        };

        let auth = AuthSettings {
            username: env.required("AUTH_USERNAME")?,
            password: env.required("AUTH_PASSWORD")?,
            realm: env.string("AUTH_REALM", "localhost"),
        };

        let log = LogSettings {
            level: env.string("LOG_LEVEL", &log_defaults.level),
            format: env.parse("LOG_FORMAT", log_defaults.format)?,
        };

        Ok(Self {
            service,
            http,
            auth,
            log,
        })
    }
}

// Typed accessors over a lookup function. Empty values count as unset.
struct Env<'a, F>(&'a F);

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name).filter(|v| !v.trim().is_empty())
    }

    fn string(&self, name: &str, default: &str) -> String {
        self.get(name).unwrap_or_else(|| default.to_owned())
    }

    fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        self.get(name).ok_or(ConfigError::Missing { name })
    }

    fn parse<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: ToString,
    {
        match self.get(name) {
            None => Ok(default),
            Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                name,
                reason: e.to_string(),
                value,
            }),
        }
    }

    fn positive<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr + PartialEq + From<u8>,
        T::Err: ToString,
    {
        let value = self.parse(name, default)?;
        if value == T::from(0) {
            return Err(ConfigError::Invalid {
                name,
                value: "0".to_owned(),
                reason: "must be greater than zero".to_owned(),
            });
        }
        Ok(value)
    }

    fn millis(&self, name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
        let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
        self.parse(name, default_ms).map(Duration::from_millis)
    }

    fn flag(&self, name: &'static str, default: bool) -> Result<bool, ConfigError> {
        match self.get(name) {
            None => Ok(default),
            Some(value) => match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::Invalid {
                    name,
                    value,
                    reason: "expected a boolean".to_owned(),
                }),
            },
        }
    }
}
