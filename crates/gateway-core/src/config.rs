//! Environment-driven configuration, loaded once
//! at startup and validated before the server binds.

use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw {
            "development" => Ok(Environment::Development),
            "production" => Ok(Environment::Production),
            "test" => Ok(Environment::Test),
            other => Err(ConfigError::Invalid(format!(
                "NODE_ENV must be one of development, production, test (got '{other}')"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Fatal,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw {
            "fatal" => Ok(LogLevel::Fatal),
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(ConfigError::Invalid(format!(
                "LOG_LEVEL must be one of fatal,error,warn,info,debug,trace (got '{other}')"
            ))),
        }
    }

    /// `fatal` has no `log` crate equivalent; it is treated as `error`.
    pub fn as_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Fatal | LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// The gateway's environment-derived configuration. `DATABASE_URL` is read
/// and validated as present but never connected to directly by the core: the
/// route/tenant store adapter that would use it is an external collaborator.
/// `ADMIN_API_KEY` gates nothing in this core directly but is validated as
/// non-empty since the administrative surface that will consume it depends
/// on it existing.
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub environment: Environment,
    pub database_url: String,
    pub redis_url: String,
    pub admin_api_key: String,
    pub log_level: LogLevel,
    pub metrics_enabled: bool,
    pub tracing_enabled: bool,
    pub tracing_endpoint: Option<String>,
}

impl Settings {
    /// Loads settings from the process environment. Fails closed: any
    /// missing or malformed variable is a load error, not a silent default,
    /// except for a handful of variables with a documented default
    /// (`METRICS_ENABLED`, `TRACING_ENABLED`, `LOG_LEVEL`, `PORT`).
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match env::var("PORT") {
            Ok(raw) => raw
                .parse::<u16>()
                .map_err(|_| ConfigError::Invalid(format!("PORT must be a valid port number (got '{raw}')")))?,
            Err(_) => 8080,
        };

        let environment = match env::var("NODE_ENV") {
            Ok(raw) => Environment::parse(&raw)?,
            Err(_) => Environment::Development,
        };

        let database_url = env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;
        let redis_url = env::var("REDIS_URL").map_err(|_| ConfigError::Missing("REDIS_URL"))?;
        let admin_api_key = env::var("ADMIN_API_KEY").map_err(|_| ConfigError::Missing("ADMIN_API_KEY"))?;

        let log_level = match env::var("LOG_LEVEL") {
            Ok(raw) => LogLevel::parse(&raw)?,
            Err(_) => LogLevel::Info,
        };

        let metrics_enabled = parse_bool_env("METRICS_ENABLED", true)?;
        let tracing_enabled = parse_bool_env("TRACING_ENABLED", false)?;
        let tracing_endpoint = env::var("TRACING_ENDPOINT").ok();

        let settings = Self {
            port,
            environment,
            database_url,
            redis_url,
            admin_api_key,
            log_level,
            metrics_enabled,
            tracing_enabled,
            tracing_endpoint,
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Fail-fast checks beyond individual field parsing: non-empty secrets,
    /// a tracing endpoint present whenever tracing is enabled.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.admin_api_key.trim().is_empty() {
            return Err(ConfigError::Invalid("ADMIN_API_KEY must not be empty".into()));
        }
        if self.database_url.trim().is_empty() {
            return Err(ConfigError::Invalid("DATABASE_URL must not be empty".into()));
        }
        if self.redis_url.trim().is_empty() {
            return Err(ConfigError::Invalid("REDIS_URL must not be empty".into()));
        }
        if self.tracing_enabled && self.tracing_endpoint.is_none() {
            return Err(ConfigError::Invalid(
                "TRACING_ENDPOINT is required when TRACING_ENABLED=true".into(),
            ));
        }
        Ok(())
    }
}

fn parse_bool_env(name: &str, default: bool) -> Result<bool, ConfigError> {
    match env::var(name) {
        Ok(raw) => match raw.to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            other => Err(ConfigError::Invalid(format!(
                "{name} must be a boolean (got '{other}')"
            ))),
        },
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize tests that touch them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_vars() {
        for key in [
            "PORT",
            "NODE_ENV",
            "DATABASE_URL",
            "REDIS_URL",
            "ADMIN_API_KEY",
            "LOG_LEVEL",
            "METRICS_ENABLED",
            "TRACING_ENABLED",
            "TRACING_ENDPOINT",
        ] {
            env::remove_var(key);
        }
    }

    fn set_required() {
        env::set_var("DATABASE_URL", "postgres://localhost/gateway");
        env::set_var("REDIS_URL", "redis://localhost:6379");
        env::set_var("ADMIN_API_KEY", "admin-secret");
    }

    #[test]
    fn missing_required_var_is_an_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_vars();
        assert!(matches!(Settings::from_env(), Err(ConfigError::Missing("DATABASE_URL"))));
        clear_vars();
    }

    #[test]
    fn defaults_apply_when_optional_vars_absent() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_vars();
        set_required();
        let settings = Settings::from_env().unwrap();
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.environment, Environment::Development);
        assert!(settings.metrics_enabled);
        assert!(!settings.tracing_enabled);
        clear_vars();
    }

    #[test]
    fn tracing_enabled_without_endpoint_fails_validation() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_vars();
        set_required();
        env::set_var("TRACING_ENABLED", "true");
        assert!(matches!(Settings::from_env(), Err(ConfigError::Invalid(_))));
        clear_vars();
    }

    #[test]
    fn empty_admin_key_fails_validation() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_vars();
        set_required();
        env::set_var("ADMIN_API_KEY", "   ");
        assert!(matches!(Settings::from_env(), Err(ConfigError::Invalid(_))));
        clear_vars();
    }
}
