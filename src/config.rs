use crate::error::{Result, SyncError};
use crate::models::Identity;
use crate::realtime::ChannelConfig;
use std::env;
use std::time::Duration;
use url::Url;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Realtime endpoint configuration
    pub sync: SyncConfig,
    /// Credentials the monitor connects with
    pub auth: AuthConfig,
    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Endpoint base (default: wss://auto-eden-backend.onrender.com)
    pub base_url: Url,
    /// Notification channel path (default: ws/notifications)
    pub notifications_path: String,
    /// Dashboard channel path (default: ws/dashboard)
    pub dashboard_path: String,
    /// Delay before a lost connection is retried
    pub reconnect_delay: Duration,
    /// Handshake timeout; `None` waits indefinitely
    pub open_timeout: Option<Duration>,
}

#[derive(Clone, Default)]
pub struct AuthConfig {
    /// Access token, if logged in
    pub access_token: Option<String>,
    /// Privileged role flag
    pub is_staff: bool,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("is_staff", &self.is_staff)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let raw_url = get_env_or("EDEN_WS_URL", "wss://auto-eden-backend.onrender.com");
        let base_url = Url::parse(&raw_url).map_err(|e| {
            SyncError::InvalidConfig(format!("EDEN_WS_URL must be a valid URL: {}", e))
        })?;
        if !matches!(base_url.scheme(), "ws" | "wss") {
            return Err(SyncError::InvalidConfig(format!(
                "EDEN_WS_URL has unsupported scheme: {}",
                base_url.scheme()
            )));
        }

        let reconnect_secs: u64 = get_env_or("EDEN_RECONNECT_DELAY_SECS", "5")
            .parse()
            .map_err(|_| {
                SyncError::InvalidConfig("EDEN_RECONNECT_DELAY_SECS must be a whole number".into())
            })?;
        let open_timeout_secs: u64 = get_env_or("EDEN_OPEN_TIMEOUT_SECS", "10")
            .parse()
            .map_err(|_| {
                SyncError::InvalidConfig("EDEN_OPEN_TIMEOUT_SECS must be a whole number".into())
            })?;

        let access_token = env::var("EDEN_ACCESS_TOKEN")
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        let is_staff: bool = get_env_or("EDEN_IS_STAFF", "false")
            .parse()
            .map_err(|_| SyncError::InvalidConfig("EDEN_IS_STAFF must be true or false".into()))?;
        if is_staff && access_token.is_none() {
            return Err(SyncError::MissingEnvVar("EDEN_ACCESS_TOKEN".into()));
        }

        let format = get_env_or("LOG_FORMAT", "pretty");
        if !matches!(format.as_str(), "json" | "pretty") {
            return Err(SyncError::InvalidConfig(format!(
                "LOG_FORMAT must be json or pretty, got {}",
                format
            )));
        }

        Ok(Config {
            sync: SyncConfig {
                base_url,
                notifications_path: get_env_or("EDEN_NOTIFICATIONS_PATH", "ws/notifications"),
                dashboard_path: get_env_or("EDEN_DASHBOARD_PATH", "ws/dashboard"),
                reconnect_delay: Duration::from_secs(reconnect_secs),
                open_timeout: (open_timeout_secs > 0)
                    .then(|| Duration::from_secs(open_timeout_secs)),
            },
            auth: AuthConfig {
                access_token,
                is_staff,
            },
            log: LogConfig {
                level: get_env_or("LOG_LEVEL", "info"),
                format,
            },
        })
    }

    pub fn notifications_channel(&self) -> ChannelConfig {
        ChannelConfig::new(self.sync.base_url.clone(), &self.sync.notifications_path)
            .with_reconnect_delay(self.sync.reconnect_delay)
    }

    pub fn dashboard_channel(&self) -> ChannelConfig {
        ChannelConfig::new(self.sync.base_url.clone(), &self.sync.dashboard_path)
            .with_reconnect_delay(self.sync.reconnect_delay)
    }

    /// Identity described by the configured credentials
    pub fn identity(&self) -> Identity {
        match &self.auth.access_token {
            Some(token) => Identity::authenticated(token.clone()).with_staff(self.auth.is_staff),
            None => Identity::anonymous(),
        }
    }
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;
    use tokio_test::{assert_err, assert_ok};

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const CONFIG_ENV_KEYS: &[&str] = &[
        "EDEN_WS_URL",
        "EDEN_NOTIFICATIONS_PATH",
        "EDEN_DASHBOARD_PATH",
        "EDEN_RECONNECT_DELAY_SECS",
        "EDEN_OPEN_TIMEOUT_SECS",
        "EDEN_ACCESS_TOKEN",
        "EDEN_IS_STAFF",
        "LOG_LEVEL",
        "LOG_FORMAT",
    ];

    struct EnvGuard {
        saved: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(keys: &[&str]) -> Self {
            let saved = keys
                .iter()
                .map(|&key| {
                    let old = env::var(key).ok();
                    env::remove_var(key);
                    (key.to_string(), old)
                })
                .collect();

            Self { saved }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.saved.drain(..) {
                match value {
                    Some(v) => env::set_var(key, v),
                    None => env::remove_var(key),
                }
            }
        }
    }

    #[test]
    fn test_config_from_env_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        let config = assert_ok!(Config::from_env());

        assert_eq!(
            config.sync.base_url.as_str(),
            "wss://auto-eden-backend.onrender.com/"
        );
        assert_eq!(config.sync.notifications_path, "ws/notifications");
        assert_eq!(config.sync.dashboard_path, "ws/dashboard");
        assert_eq!(config.sync.reconnect_delay, Duration::from_secs(5));
        assert_eq!(config.sync.open_timeout, Some(Duration::from_secs(10)));
        assert!(config.auth.access_token.is_none());
        assert!(!config.auth.is_staff);
        assert_eq!(config.log.level, "info");
        assert_eq!(config.log.format, "pretty");

        assert!(config.identity().access_token().is_none());
    }

    #[test]
    fn test_config_from_env_overrides() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("EDEN_WS_URL", "ws://localhost:8000");
        env::set_var("EDEN_RECONNECT_DELAY_SECS", "2");
        env::set_var("EDEN_OPEN_TIMEOUT_SECS", "0");
        env::set_var("EDEN_ACCESS_TOKEN", " abc ");
        env::set_var("EDEN_IS_STAFF", "true");
        env::set_var("LOG_FORMAT", "json");

        let config = Config::from_env().unwrap();

        assert_eq!(config.sync.reconnect_delay, Duration::from_secs(2));
        assert_eq!(config.sync.open_timeout, None);
        assert_eq!(config.log.format, "json");

        let identity = config.identity();
        assert_eq!(identity.access_token(), Some("abc"));
        assert!(identity.is_staff());

        assert_eq!(
            config.notifications_channel().url_for("abc").unwrap().as_str(),
            "ws://localhost:8000/ws/notifications/?token=abc"
        );
        assert_eq!(
            config.dashboard_channel().reconnect_delay,
            Duration::from_secs(2)
        );
    }

    #[test]
    fn test_config_from_env_invalid_values() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("EDEN_RECONNECT_DELAY_SECS", "soon");
        assert!(matches!(
            Config::from_env().unwrap_err(),
            SyncError::InvalidConfig(_)
        ));
        env::remove_var("EDEN_RECONNECT_DELAY_SECS");

        env::set_var("EDEN_WS_URL", "https://auto-eden-backend.onrender.com");
        assert!(matches!(
            Config::from_env().unwrap_err(),
            SyncError::InvalidConfig(_)
        ));
        env::set_var("EDEN_WS_URL", "not a url");
        assert!(matches!(
            Config::from_env().unwrap_err(),
            SyncError::InvalidConfig(_)
        ));
        env::remove_var("EDEN_WS_URL");

        env::set_var("LOG_FORMAT", "xml");
        assert!(matches!(
            Config::from_env().unwrap_err(),
            SyncError::InvalidConfig(_)
        ));
    }

    #[test]
    fn test_config_staff_without_token() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("EDEN_IS_STAFF", "true");
        let err = assert_err!(Config::from_env());
        assert!(matches!(err, SyncError::MissingEnvVar(ref key) if key == "EDEN_ACCESS_TOKEN"));
    }

    #[test]
    fn test_auth_config_debug_redacts_token() {
        let auth = AuthConfig {
            access_token: Some("secret-token".to_string()),
            is_staff: false,
        };
        let rendered = format!("{:?}", auth);
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("<redacted>"));
    }
}
