use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::token::MIN_SECRET_LEN;

/// Which build configuration the process runs under. Controls how much
/// error detail reaches users.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Production,
    Development,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }

    /// The message shown to a user for `err`. Production hides the detail.
    pub fn public_message(self, err: &dyn fmt::Display) -> String {
        match self {
            Environment::Production => GENERIC_ERROR_MESSAGE.to_string(),
            Environment::Development => err.to_string(),
        }
    }
}

pub const GENERIC_ERROR_MESSAGE: &str = "Something went wrong. Please try again later.";

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "development" | "dev" => Ok(Environment::Development),
            _ => Err(ConfigError::InvalidEnvironment(s.to_string())),
        }
    }
}

#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub secure: bool,
    pub user: Option<String>,
    pub password: Option<String>,
    pub timeout: Option<Duration>,
}

impl fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("secure", &self.secure)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Clone)]
pub struct Config {
    pub environment: Environment,
    /// Unset when `EMAIL_HOST` is not configured.
    pub smtp: Option<SmtpConfig>,
    pub mail_from: String,
    pub templates_dir: PathBuf,
    pub template_cache: bool,
    pub jwt_secret: String,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("environment", &self.environment)
            .field("smtp", &self.smtp)
            .field("mail_from", &self.mail_from)
            .field("templates_dir", &self.templates_dir)
            .field("template_cache", &self.template_cache)
            .field("jwt_secret", &"<redacted>")
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any variable source. Empty values count
    /// as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let environment = match var("APP_ENV") {
            Some(value) => value.parse()?,
            None => Environment::default(),
        };

        let jwt_secret = var("JWT_SECRET").ok_or(ConfigError::MissingJwtSecret)?;
        if jwt_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::WeakJwtSecret);
        }

        let user = var("EMAIL_USER");
        let password = var("EMAIL_PASSWORD");
        if user.is_some() && password.is_none() {
            return Err(ConfigError::MissingEmailPassword);
        }

        let secure = match var("EMAIL_SECURE") {
            Some(value) => parse_flag(&value).ok_or(ConfigError::InvalidSecureFlag(value))?,
            None => false,
        };

        let port = match var("EMAIL_PORT") {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPort(value))?,
            None if secure => 465,
            None => 587,
        };

        let timeout_secs: u64 = match var("EMAIL_TIMEOUT_SECS") {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidTimeout(value))?,
            None => 30,
        };

        let smtp = var("EMAIL_HOST").map(|host| SmtpConfig {
            host,
            port,
            secure,
            user: user.clone(),
            password,
            timeout: Some(Duration::from_secs(timeout_secs)),
        });

        let mail_from = var("EMAIL_FROM")
            .or(user)
            .ok_or(ConfigError::MissingSender)?;

        let templates_dir = var("TEMPLATES_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("templates"));

        let template_cache = match var("TEMPLATE_CACHE") {
            Some(value) => parse_flag(&value).ok_or(ConfigError::InvalidCacheFlag(value))?,
            None => false,
        };

        Ok(Config {
            environment,
            smtp,
            mail_from,
            templates_dir,
            template_cache,
            jwt_secret,
        })
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("JWT_SECRET environment variable not set")]
    MissingJwtSecret,

    #[error("JWT_SECRET must be at least {} bytes", MIN_SECRET_LEN)]
    WeakJwtSecret,

    #[error("EMAIL_PASSWORD must be set when EMAIL_USER is set")]
    MissingEmailPassword,

    #[error("Neither EMAIL_FROM nor EMAIL_USER is set")]
    MissingSender,

    #[error("Invalid port number: {0}")]
    InvalidPort(String),

    #[error("Invalid EMAIL_SECURE value: {0}")]
    InvalidSecureFlag(String),

    #[error("Invalid TEMPLATE_CACHE value: {0}")]
    InvalidCacheFlag(String),

    #[error("Invalid EMAIL_TIMEOUT_SECS value: {0}")]
    InvalidTimeout(String),

    #[error("Invalid APP_ENV value: {0}")]
    InvalidEnvironment(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("JWT_SECRET", SECRET), ("EMAIL_FROM", "shop@example.com")]).unwrap();
        assert_eq!(config.environment, Environment::Production);
        assert!(config.smtp.is_none());
        assert_eq!(config.templates_dir, PathBuf::from("templates"));
        assert!(!config.template_cache);
    }

    #[test]
    fn test_smtp_settings() {
        let config = load(&[
            ("JWT_SECRET", SECRET),
            ("EMAIL_HOST", "smtp.example.com"),
            ("EMAIL_SECURE", "true"),
            ("EMAIL_USER", "shop@example.com"),
            ("EMAIL_PASSWORD", "hunter2"),
        ])
        .unwrap();

        let smtp = config.smtp.unwrap();
        assert_eq!(smtp.host, "smtp.example.com");
        assert_eq!(smtp.port, 465);
        assert!(smtp.secure);
        assert_eq!(config.mail_from, "shop@example.com");
        assert!(!format!("{:?}", smtp).contains("hunter2"));
    }

    #[test]
    fn test_explicit_port_and_insecure_default() {
        let config = load(&[
            ("JWT_SECRET", SECRET),
            ("EMAIL_FROM", "shop@example.com"),
            ("EMAIL_HOST", "localhost"),
        ])
        .unwrap();
        assert_eq!(config.smtp.unwrap().port, 587);

        let config = load(&[
            ("JWT_SECRET", SECRET),
            ("EMAIL_FROM", "shop@example.com"),
            ("EMAIL_HOST", "localhost"),
            ("EMAIL_PORT", "2525"),
        ])
        .unwrap();
        assert_eq!(config.smtp.unwrap().port, 2525);
    }

    #[test]
    fn test_jwt_secret_required() {
        let err = load(&[("EMAIL_FROM", "shop@example.com")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingJwtSecret));

        let err = load(&[("JWT_SECRET", "  "), ("EMAIL_FROM", "shop@example.com")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingJwtSecret));

        let err = load(&[("JWT_SECRET", "short"), ("EMAIL_FROM", "shop@example.com")]).unwrap_err();
        assert!(matches!(err, ConfigError::WeakJwtSecret));
    }

    #[test]
    fn test_invalid_values() {
        let base = [("JWT_SECRET", SECRET), ("EMAIL_FROM", "shop@example.com")];

        let err = load(&[base[0], base[1], ("EMAIL_PORT", "smtp")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPort(_)));

        let err = load(&[base[0], base[1], ("EMAIL_SECURE", "maybe")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSecureFlag(_)));

        let err = load(&[base[0], base[1], ("APP_ENV", "staging")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvironment(_)));

        let err = load(&[base[0], base[1], ("EMAIL_USER", "shop")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEmailPassword));

        let err = load(&[base[0]]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSender));
    }

    #[test]
    fn test_public_message() {
        let err = ConfigError::InvalidPort("smtp".to_string());
        assert_eq!(
            Environment::Production.public_message(&err),
            GENERIC_ERROR_MESSAGE
        );
        assert_eq!(
            Environment::Development.public_message(&err),
            "Invalid port number: smtp"
        );
    }
}
