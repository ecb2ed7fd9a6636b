use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::env;
use tracing::{info, warn};

use crate::models::Language;

// Import logging macros
use crate::{log_system_event, log_validation};

const DEFAULT_SOLUTION_BASE_URL: &str = "https://github.com/algoapp/solutions/blob/master";

/// Complete application configuration loaded from environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub solutions: SolutionConfig,
}

/// Database connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    /// Optional JSON dataset seeded on startup
    pub seed_path: Option<String>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

/// Logging system configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_enabled: bool,
    pub console_enabled: bool,
    pub log_directory: String,
}

/// Where solution snippets are scraped from, per language
#[derive(Debug, Clone, Deserialize)]
pub struct SolutionConfig {
    pub sources: Vec<SolutionSourceConfig>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SolutionSourceConfig {
    pub language: Language,
    /// URL with a `{slug}` placeholder for the question's title slug
    pub url_template: String,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> Result<Self> {
        log_system_event!(config, "Loading application configuration from environment variables");

        let config = Config {
            database: DatabaseConfig::from_env()?,
            server: ServerConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
            solutions: SolutionConfig::from_env()?,
        };

        log_system_event!(config, "Configuration loaded successfully");
        config.log_configuration_summary();

        Ok(config)
    }

    /// Log a summary of loaded configuration (without sensitive data)
    fn log_configuration_summary(&self) {
        info!(
            database_url_masked = %mask_sensitive_data(&self.database.url),
            seed_path = ?self.database.seed_path,
            server_address = %format!("{}:{}", self.server.host, self.server.port),
            log_level = %self.logging.level,
            solution_languages = self.solutions.sources.len(),
            "Configuration summary"
        );
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !self.database.url.starts_with("sqlite:") {
            return Err(anyhow!("DATABASE_URL must start with 'sqlite:'"));
        }

        if self.server.port == 0 {
            return Err(anyhow!("Server port must be greater than 0"));
        }

        for source in &self.solutions.sources {
            if !source.url_template.contains("{slug}") {
                return Err(anyhow!(
                    "Solution source for {} must contain a {{slug}} placeholder",
                    source.language
                ));
            }
        }

        if self.solutions.timeout_secs == 0 {
            return Err(anyhow!("SOLUTION_FETCH_TIMEOUT_SECS must be greater than 0"));
        }

        let level = self.logging.level.to_lowercase();
        let known_level = ["trace", "debug", "info", "warn", "error"]
            .iter()
            .any(|known| level.contains(known));
        if !known_level {
            warn!("Invalid log level '{}', using 'info' as fallback", self.logging.level);
        }

        log_validation!(success, "configuration", "Configuration validation completed successfully");
        Ok(())
    }
}

impl DatabaseConfig {
    fn from_env() -> Result<Self> {
        let url = env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:algo_app.db".to_string());
        let seed_path = env::var("SEED_PATH").ok().filter(|p| !p.trim().is_empty());

        Ok(DatabaseConfig { url, seed_path })
    }
}

impl ServerConfig {
    fn from_env() -> Result<Self> {
        let port_str = env::var("PORT").unwrap_or_else(|_| "3000".to_string());

        let port = port_str.parse::<u16>().map_err(|_| {
            anyhow!(
                "Invalid PORT value: '{}'. Must be a number between 1-65535",
                port_str
            )
        })?;

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        Ok(ServerConfig { port, host })
    }
}

impl LoggingConfig {
    fn from_env() -> Result<Self> {
        let level = env::var("RUST_LOG").unwrap_or_else(|_| "info,algo_app=debug".to_string());

        let file_enabled = env::var("LOG_FILE_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .unwrap_or(true);

        let console_enabled = env::var("LOG_CONSOLE_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .unwrap_or(true);

        let log_directory = env::var("LOG_DIRECTORY").unwrap_or_else(|_| "logs".to_string());

        Ok(LoggingConfig {
            level,
            file_enabled,
            console_enabled,
            log_directory,
        })
    }
}

impl SolutionConfig {
    fn from_env() -> Result<Self> {
        let sources = match env::var("SOLUTION_SOURCES") {
            Ok(raw) if !raw.trim().is_empty() => parse_solution_sources(&raw)?,
            _ => {
                let base = env::var("SOLUTION_BASE_URL")
                    .unwrap_or_else(|_| DEFAULT_SOLUTION_BASE_URL.to_string());
                default_solution_sources(&base)
            }
        };

        let timeout_str =
            env::var("SOLUTION_FETCH_TIMEOUT_SECS").unwrap_or_else(|_| "10".to_string());
        let timeout_secs = timeout_str.parse::<u64>().map_err(|_| {
            anyhow!(
                "Invalid SOLUTION_FETCH_TIMEOUT_SECS value: '{}'",
                timeout_str
            )
        })?;

        Ok(SolutionConfig {
            sources,
            timeout_secs,
        })
    }
}

/// One source per built-in language under a common base URL
pub fn default_solution_sources(base_url: &str) -> Vec<SolutionSourceConfig> {
    let base = base_url.trim_end_matches('/');
    Language::builtin()
        .into_iter()
        .map(|language| {
            let (directory, extension) = match language.as_str() {
                "Swift" => ("Swift", "swift"),
                "Python" => ("Python", "py"),
                "Java" => ("Java", "java"),
                "C++" => ("CPP", "cpp"),
                _ => ("JavaScript", "js"),
            };
            SolutionSourceConfig {
                language,
                url_template: format!("{}/{}/{{slug}}.{}", base, directory, extension),
            }
        })
        .collect()
}

/// Parse `Language=template;Language=template` pairs
pub fn parse_solution_sources(raw: &str) -> Result<Vec<SolutionSourceConfig>> {
    raw.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (language, template) = entry
                .split_once('=')
                .ok_or_else(|| anyhow!("Invalid SOLUTION_SOURCES entry '{}': expected Language=url", entry))?;
            let language = language.trim();
            let template = template.trim();
            if language.is_empty() || template.is_empty() {
                return Err(anyhow!("Invalid SOLUTION_SOURCES entry '{}'", entry));
            }
            Ok(SolutionSourceConfig {
                language: Language::new(language),
                url_template: template.to_string(),
            })
        })
        .collect()
}

/// Mask sensitive data in configuration for safe logging
fn mask_sensitive_data(data: &str) -> String {
    if data.len() <= 8 {
        "*".repeat(data.len())
    } else {
        format!("{}***{}", &data[..4], &data[data.len() - 4..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_sensitive_data() {
        assert_eq!(mask_sensitive_data("short"), "*****");
        assert_eq!(mask_sensitive_data("sqlite:algo_app.db"), "sqli***p.db");
    }

    #[test]
    fn test_default_solution_sources_cover_builtin_languages() {
        let sources = default_solution_sources("https://example.org/solutions/");
        assert_eq!(sources.len(), 5);
        assert_eq!(sources[0].language, Language::new("Swift"));
        assert_eq!(
            sources[0].url_template,
            "https://example.org/solutions/Swift/{slug}.swift"
        );
        assert!(sources.iter().all(|s| s.url_template.contains("{slug}")));
    }

    #[test]
    fn test_parse_solution_sources() {
        let sources =
            parse_solution_sources("Rust=https://a.test/{slug}.rs; Go = https://b.test/{slug}.go ;")
                .unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[1].language, Language::new("Go"));
        assert_eq!(sources[1].url_template, "https://b.test/{slug}.go");

        assert!(parse_solution_sources("no-separator").is_err());
        assert!(parse_solution_sources("=https://a.test/{slug}").is_err());
    }

    fn valid_config() -> Config {
        Config {
            database: DatabaseConfig {
                url: "sqlite:test.db".to_string(),
                seed_path: None,
            },
            server: ServerConfig {
                port: 3000,
                host: "0.0.0.0".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_enabled: true,
                console_enabled: true,
                log_directory: "logs".to_string(),
            },
            solutions: SolutionConfig {
                sources: default_solution_sources(DEFAULT_SOLUTION_BASE_URL),
                timeout_secs: 10,
            },
        }
    }

    #[test]
    fn test_config_validation() {
        let config = valid_config();
        assert!(config.validate().is_ok());

        let mut invalid_port = config.clone();
        invalid_port.server.port = 0;
        assert!(invalid_port.validate().is_err());

        let mut postgres = config.clone();
        postgres.database.url = "postgres://localhost/algo".to_string();
        assert!(postgres.validate().is_err());

        let mut no_slug = config.clone();
        no_slug.solutions.sources[0].url_template = "https://example.org/static".to_string();
        assert!(no_slug.validate().is_err());

        let mut no_timeout = config;
        no_timeout.solutions.timeout_secs = 0;
        assert!(no_timeout.validate().is_err());
    }
}
