use std::env;

use thiserror::Error;

const HOST: &str = "0.0.0.0";
const PORT: u16 = 8080;
const DATABASE: &str = "Descubreme";
const OPENROUTER_MODEL: &str = "google/gemma-2-9b-it:free";
const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const OPENROUTER_APP_NAME: &str = "Descubriendo";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct OpenRouterConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub site_url: String,
    pub app_name: String,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: OPENROUTER_MODEL.to_string(),
            base_url: OPENROUTER_BASE_URL.to_string(),
            site_url: String::new(),
            app_name: OPENROUTER_APP_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub mongo_uri: String,
    pub database: String,
    pub jwt_secret: String,
    pub google_places_api_key: String,
    pub openrouter: OpenRouterConfig,
    pub environment: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: HOST.to_string(),
            port: PORT,
            mongo_uri: String::new(),
            database: DATABASE.to_string(),
            jwt_secret: String::new(),
            google_places_api_key: String::new(),
            openrouter: OpenRouterConfig::default(),
            environment: "development".to_string(),
        }
    }
}

impl AppConfig {
    /// Reads the configuration from the process environment.
    ///
    /// `.env` is only honoured in debug builds; release deployments are expected
    /// to inject variables directly.
    pub fn from_env() -> Result<Self, ConfigError> {
        if cfg!(debug_assertions) {
            dotenv::dotenv().ok();
        }

        let port = match env::var("PORT") {
            Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                name: "PORT",
                value: raw,
            })?,
            Err(_) => PORT,
        };

        Ok(Self {
            host: var_or("HOST", HOST),
            port,
            mongo_uri: required("MONGODB_URI")?,
            database: var_or("MONGODB_DATABASE", DATABASE),
            jwt_secret: required("JWT_SECRET")?,
            google_places_api_key: var_or("GOOGLE_PLACES_API_KEY", ""),
            openrouter: OpenRouterConfig {
                api_key: var_or("OPENROUTER_API_KEY", ""),
                model: var_or("OPENROUTER_MODEL", OPENROUTER_MODEL),
                base_url: var_or("OPENROUTER_BASE_URL", OPENROUTER_BASE_URL),
                site_url: var_or("OPENROUTER_SITE_URL", ""),
                app_name: var_or("OPENROUTER_APP_NAME", OPENROUTER_APP_NAME),
            },
            environment: var_or("RUST_ENV", "development"),
        })
    }
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name)
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|_| default.to_string())
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(ConfigError::Missing(name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear() {
        for name in [
            "HOST",
            "PORT",
            "MONGODB_URI",
            "MONGODB_DATABASE",
            "JWT_SECRET",
            "GOOGLE_PLACES_API_KEY",
            "OPENROUTER_API_KEY",
            "OPENROUTER_MODEL",
            "OPENROUTER_BASE_URL",
            "OPENROUTER_SITE_URL",
            "OPENROUTER_APP_NAME",
            "RUST_ENV",
        ] {
            env::remove_var(name);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_applied() {
        clear();
        env::set_var("MONGODB_URI", "mongodb://localhost:27017");
        env::set_var("JWT_SECRET", "secret");

        let config = AppConfig::from_env().unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.database, "Descubreme");
        assert_eq!(config.openrouter.model, "google/gemma-2-9b-it:free");
        assert_eq!(config.openrouter.app_name, "Descubriendo");
        assert!(config.google_places_api_key.is_empty());
        clear();
    }

    #[test]
    #[serial]
    fn test_missing_jwt_secret() {
        clear();
        env::set_var("MONGODB_URI", "mongodb://localhost:27017");

        match AppConfig::from_env() {
            Err(ConfigError::Missing(name)) => assert_eq!(name, "JWT_SECRET"),
            other => panic!("unexpected result: {:?}", other),
        }
        clear();
    }

    #[test]
    #[serial]
    fn test_invalid_port() {
        clear();
        env::set_var("MONGODB_URI", "mongodb://localhost:27017");
        env::set_var("JWT_SECRET", "secret");
        env::set_var("PORT", "eighty");

        assert!(matches!(
            AppConfig::from_env(),
            Err(ConfigError::Invalid { name: "PORT", .. })
        ));
        clear();
    }
}
