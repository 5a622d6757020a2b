use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;
use crate::indexer::path_grammar::PathFormat;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    // Grammar must be usable before anything touches the archive
    config.path_format.parse::<PathFormat>()?;

    if let Err(e) = glob::Pattern::new(&config.manifest_glob) {
        return Err(ConfigError::InvalidGlob {
            pattern: config.manifest_glob.clone(),
            reason: e.to_string(),
        });
    }

    let web_root = url::Url::parse(&config.web_root).map_err(|e| ConfigError::InvalidUrl {
        url: config.web_root.clone(),
        reason: e.to_string(),
    })?;
    if web_root.cannot_be_a_base() {
        return Err(ConfigError::InvalidUrl {
            url: config.web_root.clone(),
            reason: "URL cannot be used as a base for download links".to_string(),
        });
    }

    if config.archive_lifetime_days == 0 {
        return Err(ConfigError::Validation {
            message: "archive_lifetime_days must be greater than 0".to_string(),
        });
    }

    if config.index_interval_secs == 0 || config.archive_poll_secs == 0 {
        return Err(ConfigError::Validation {
            message: "index_interval_secs and archive_poll_secs must be greater than 0"
                .to_string(),
        });
    }

    if config.max_job_attempts == 0 {
        return Err(ConfigError::Validation {
            message: "max_job_attempts must be at least 1".to_string(),
        });
    }

    if config.retry_base_secs > config.retry_max_secs {
        return Err(ConfigError::Validation {
            message: format!(
                "retry_base_secs ({}) exceeds retry_max_secs ({})",
                config.retry_base_secs, config.retry_max_secs
            ),
        });
    }

    if let Some(smtp) = &config.smtp {
        if smtp.host.trim().is_empty() {
            return Err(ConfigError::Validation {
                message: "smtp.host must not be empty".to_string(),
            });
        }
        if smtp.username.is_some() != smtp.password.is_some() {
            return Err(ConfigError::Validation {
                message: "smtp.username and smtp.password must be set together".to_string(),
            });
        }
    }

    Ok(())
}
