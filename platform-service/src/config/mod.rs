use secrecy::Secret;
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct PlatformConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub storage: StorageConfig,
    pub security: SecurityConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Mongodb,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub mongodb: Option<MongoConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoConfig {
    pub uri: Secret<String>,
    pub database: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub global_ip_limit: u32,
    pub global_ip_window_seconds: u64,
}

impl PlatformConfig {
    pub fn from_env() -> Result<Self, AppError> {
        // Loads .env as a side effect
        let common_config = core_config::Config::load()?;

        let environment: Environment = env::var("ENVIRONMENT")
            .unwrap_or_else(|_| "dev".to_string())
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;
        let is_prod = environment == Environment::Prod;

        let backend: StorageBackend = get_env("STORAGE_BACKEND", Some("memory"), is_prod)?
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let mongodb = match backend {
            StorageBackend::Mongodb => Some(MongoConfig {
                uri: Secret::new(get_env("MONGODB_URI", None, is_prod)?),
                database: get_env("MONGODB_DATABASE", Some("platform_db"), is_prod)?,
            }),
            StorageBackend::Memory => None,
        };

        let config = PlatformConfig {
            common: common_config,
            environment,
            service_name: get_env("SERVICE_NAME", Some("platform-service"), is_prod)?,
            service_version: get_env(
                "SERVICE_VERSION",
                Some(env!("CARGO_PKG_VERSION")),
                is_prod,
            )?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            storage: StorageConfig { backend, mongodb },
            security: SecurityConfig {
                allowed_origins: parse_origins(&get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3000"),
                    is_prod,
                )?),
            },
            rate_limit: RateLimitConfig {
                global_ip_limit: parse_number(
                    "RATE_LIMIT_GLOBAL_IP_LIMIT",
                    &get_env("RATE_LIMIT_GLOBAL_IP_LIMIT", Some("100"), is_prod)?,
                )?,
                global_ip_window_seconds: parse_number(
                    "RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS",
                    &get_env("RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS", Some("60"), is_prod)?,
                )?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.storage.backend == StorageBackend::Mongodb && self.storage.mongodb.is_none() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "MONGODB_URI is required when STORAGE_BACKEND=mongodb"
            )));
        }

        if self.rate_limit.global_ip_window_seconds == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS must be positive"
            )));
        }

        if self.environment == Environment::Prod {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }

            if self.storage.backend == StorageBackend::Memory {
                tracing::warn!("In-memory storage in production - applications are lost on restart");
            }
        }

        Ok(())
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_number<T>(key: &str, raw: &str) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e| {
        AppError::ConfigError(anyhow::anyhow!("{} has invalid value '{}': {}", key, raw, e))
    })
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "mongodb" | "mongo" => Ok(StorageBackend::Mongodb),
            _ => Err(format!("Invalid storage backend: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev_config() -> PlatformConfig {
        PlatformConfig {
            common: core_config::Config::default(),
            environment: Environment::Dev,
            service_name: "platform-service".to_string(),
            service_version: "test".to_string(),
            log_level: "info".to_string(),
            otlp_endpoint: None,
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                mongodb: None,
            },
            security: SecurityConfig {
                allowed_origins: vec!["*".to_string()],
            },
            rate_limit: RateLimitConfig {
                global_ip_limit: 100,
                global_ip_window_seconds: 60,
            },
        }
    }

    #[test]
    fn test_parse_enums() {
        assert_eq!("PROD".parse::<Environment>(), Ok(Environment::Prod));
        assert!("staging".parse::<Environment>().is_err());
        assert_eq!("mongo".parse::<StorageBackend>(), Ok(StorageBackend::Mongodb));
        assert_eq!("Memory".parse::<StorageBackend>(), Ok(StorageBackend::Memory));
        assert!("s3".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn test_parse_origins() {
        assert_eq!(
            parse_origins("http://a.test, http://b.test,,"),
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number::<u32>("RATE_LIMIT_GLOBAL_IP_LIMIT", " 250 ").unwrap(), 250);
        assert_eq!(
            parse_number::<u64>("RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS", "60").unwrap(),
            60
        );
    }

    #[test]
    fn test_parse_number_rejects_garbage() {
        let err = parse_number::<u32>("RATE_LIMIT_GLOBAL_IP_LIMIT", "lots").unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
        assert!(err.to_string().contains("RATE_LIMIT_GLOBAL_IP_LIMIT"));
        assert!(parse_number::<u64>("RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS", "-5").is_err());
    }

    #[test]
    fn test_validate_dev_allows_wildcard() {
        assert!(dev_config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_wildcard_in_prod() {
        let mut config = dev_config();
        config.environment = Environment::Prod;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_requires_mongo_settings() {
        let mut config = dev_config();
        config.storage.backend = StorageBackend::Mongodb;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let mut config = dev_config();
        config.rate_limit.global_ip_window_seconds = 0;
        assert!(config.validate().is_err());
    }
}
