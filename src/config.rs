use std::env;

/// Minimum length accepted for the JWT signing secret.
const MIN_SECRET_LEN: usize = 32;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("JWT_SECRET must be at least 32 characters long")]
    WeakSecret,
    #[error("PORT is not a valid port number: {0}")]
    BadPort(String),
}

/// Process configuration, resolved once at startup. There are deliberately
/// no fallback values for the admin credentials or the signing secret:
/// startup fails if they are absent.
#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub admin_email: String,
    pub admin_password: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub environment: String,
}

fn require(name: &'static str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::Missing(name)),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let jwt_secret = require("JWT_SECRET")?;
        if jwt_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::WeakSecret);
        }

        let port = match env::var("PORT") {
            Ok(raw) => raw.parse::<u16>().map_err(|_| ConfigError::BadPort(raw))?,
            Err(_) => 3001,
        };

        let cors_origins = env::var("CORS_ORIGIN")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Config {
            jwt_secret,
            admin_email: require("ADMIN_EMAIL")?,
            admin_password: require("ADMIN_PASSWORD")?,
            port,
            cors_origins,
            environment: env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        })
    }
}
