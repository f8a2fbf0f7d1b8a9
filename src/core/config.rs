use crate::core::errors::ConfigError;
use std::env;
use tracing::Level;

/// Grid configuration: the dense batch dimensions
#[derive(Debug, Clone)]
pub struct GridConfig {
    /// R: number of anatomical regions per image
    pub num_regions: usize,
    /// D: dimensionality of the per-region visual features
    pub feature_dim: usize,
}

/// Generator decoding configuration
#[derive(Debug, Clone)]
pub struct DecodingSettings {
    pub max_generate_tokens: usize,
    pub num_beams: usize,
    pub early_stopping: bool,
}

/// Report assembly configuration
#[derive(Debug, Clone)]
pub struct ReportNearDupConfig {
    /// Similarity score at or above which a later sentence is dropped
    pub similarity_threshold: f64,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub log_level: Level,
}

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub grid: GridConfig,
    pub decoding: DecodingSettings,
    pub report: ReportNearDupConfig,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let config = Self::load_from_env()?;
        config.validate()?;
        Ok(config)
    }

    fn load_from_env() -> Result<Self, ConfigError> {
        // Parse log level
        let log_level = env::var("LOG_LEVEL")
            .ok()
            .and_then(|s| match s.to_lowercase().as_str() {
                "trace" => Some(Level::TRACE),
                "debug" => Some(Level::DEBUG),
                "info" => Some(Level::INFO),
                "warn" | "warning" => Some(Level::WARN),
                "error" => Some(Level::ERROR),
                _ => None,
            })
            .unwrap_or(Level::INFO);

        Ok(Self {
            grid: GridConfig {
                num_regions: env::var("NUM_REGIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(crate::core::regions::NUM_REGIONS),
                feature_dim: env::var("FEATURE_DIM")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1024),
            },
            decoding: DecodingSettings {
                max_generate_tokens: env::var("MAX_GENERATE_TOKENS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
                num_beams: env::var("NUM_BEAMS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(4),
                early_stopping: env::var("EARLY_STOPPING")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(true),
            },
            report: ReportNearDupConfig {
                similarity_threshold: env::var("SIMILARITY_THRESHOLD")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0.955),
            },
            logging: LoggingConfig { log_level },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grid.num_regions == 0 {
            return Err(ConfigError::InvalidRegionCount(self.grid.num_regions));
        }

        if self.grid.feature_dim == 0 {
            return Err(ConfigError::InvalidFeatureDim(self.grid.feature_dim));
        }

        if !(0.0..=1.0).contains(&self.report.similarity_threshold) {
            return Err(ConfigError::InvalidSimilarityThreshold(
                self.report.similarity_threshold,
            ));
        }

        if self.decoding.num_beams == 0 {
            return Err(ConfigError::InvalidDecodingConfig(
                "num_beams must be > 0".to_string(),
            ));
        }

        if self.decoding.max_generate_tokens == 0 {
            return Err(ConfigError::InvalidDecodingConfig(
                "max_generate_tokens must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn num_regions(&self) -> usize {
        self.grid.num_regions
    }

    pub fn feature_dim(&self) -> usize {
        self.grid.feature_dim
    }

    pub fn similarity_threshold(&self) -> f64 {
        self.report.similarity_threshold
    }

    pub fn log_level(&self) -> Level {
        self.logging.log_level
    }
}

// Note: No Default implementation because Config::new() can fail
// Users should explicitly call Config::new()? and handle errors

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            grid: GridConfig {
                num_regions: 29,
                feature_dim: 1024,
            },
            decoding: DecodingSettings {
                max_generate_tokens: 300,
                num_beams: 4,
                early_stopping: true,
            },
            report: ReportNearDupConfig {
                similarity_threshold: 0.955,
            },
            logging: LoggingConfig {
                log_level: Level::INFO,
            },
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_out_of_range_threshold_rejected() {
        let mut config = base_config();
        config.report.similarity_threshold = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSimilarityThreshold(_))
        ));
    }

    #[test]
    fn test_zero_regions_rejected() {
        let mut config = base_config();
        config.grid.num_regions = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRegionCount(0))
        ));
    }

    #[test]
    fn test_zero_beams_rejected() {
        let mut config = base_config();
        config.decoding.num_beams = 0;
        assert!(config.validate().is_err());
    }
}
