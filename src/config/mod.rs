use std::env;
use std::path::PathBuf;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub vision: VisionConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub server: ServerConfig,
}

/// Vision model API configuration
#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Ask the endpoint for `json_object` output
    pub json_mode: bool,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Outbound HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
}

/// HTTP listener configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
}

pub const DEFAULT_VISION_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_VISION_MODEL: &str = "meta-llama/llama-4-scout-17b-16e-instruct";

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let vision = VisionConfig {
            api_key: env::var("VISION_API_KEY")
                .or_else(|_| env::var("GROQ_API_KEY"))
                .map_err(|_| AppError::Config {
                    message: "VISION_API_KEY (or GROQ_API_KEY) is required".to_string(),
                })?,
            base_url: env::var("VISION_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_VISION_BASE_URL.to_string()),
            model: env::var("VISION_MODEL").unwrap_or_else(|_| DEFAULT_VISION_MODEL.to_string()),
            temperature: parse_var("VISION_TEMPERATURE").unwrap_or(0.3),
            max_tokens: parse_var("VISION_MAX_TOKENS").unwrap_or(1024),
            json_mode: env::var("VISION_JSON_MODE")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        };

        let database = DatabaseConfig::from_env();
        let logging = LoggingConfig::from_env();

        let request = RequestConfig {
            timeout_ms: parse_var("REQUEST_TIMEOUT_MS").unwrap_or(30000),
        };

        let server = ServerConfig {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_var("SERVER_PORT").unwrap_or(8000),
            max_upload_bytes: parse_var("MAX_UPLOAD_BYTES").unwrap_or(10 * 1024 * 1024),
        };

        Ok(Config {
            vision,
            database,
            logging,
            request,
            server,
        })
    }
}

impl DatabaseConfig {
    /// Load only the database settings. Offline commands use this so they
    /// run without a vision API key.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        Self {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./disease_history.db".to_string()),
            ),
            max_connections: parse_var("DATABASE_MAX_CONNECTIONS").unwrap_or(5),
        }
    }
}

impl LoggingConfig {
    /// Load only the logging settings
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        Self {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

impl ServerConfig {
    /// Socket address string for the listener
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_VISION_BASE_URL.to_string(),
            model: DEFAULT_VISION_MODEL.to_string(),
            temperature: 0.3,
            max_tokens: 1024,
            json_mode: false,
        }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self { timeout_ms: 30000 }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_addr() {
        let server = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 9000,
            ..ServerConfig::default()
        };
        assert_eq!(server.bind_addr(), "127.0.0.1:9000");
    }

    #[test]
    fn test_defaults() {
        assert_eq!(RequestConfig::default().timeout_ms, 30000);
        assert_eq!(ServerConfig::default().max_upload_bytes, 10_485_760);
        assert_eq!(VisionConfig::default().base_url, DEFAULT_VISION_BASE_URL);
    }
}
