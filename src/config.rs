use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::prompt::PromptAssembler;
use crate::service::PipelineSettings;

/// Application configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    pub schema: SchemaConfig,
    pub completion: CompletionConfig,
    pub warehouse: WarehouseConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub max_context_items: usize,
    pub char_budget: usize,
    pub relevance_floor: f64,
    pub request_timeout_ms: u64,
    pub max_question_chars: usize,
    pub scoring: String, // "lexical" or "embedding"
    pub refine_on_refusal: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaConfig {
    pub directory: String,
    pub extension: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionConfig {
    pub provider: String,
    pub model: String,
    pub embedding_model: String,
    pub endpoint: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseConfig {
    pub project_id: Option<String>,
    pub dataset_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub directory: String,
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_path: Option<String>,
    pub format: String, // "json" or "text"
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig {
                max_context_items: 3,
                char_budget: 12_000,
                relevance_floor: 0.1,
                request_timeout_ms: 30_000,
                max_question_chars: 1_000,
                scoring: "lexical".to_string(),
                refine_on_refusal: false,
            },
            schema: SchemaConfig {
                directory: "schemas".to_string(),
                extension: "txt".to_string(),
            },
            completion: CompletionConfig {
                provider: "gemini".to_string(),
                model: "gemini-1.5-pro".to_string(),
                embedding_model: "embedding-001".to_string(),
                endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
                api_key: None,
            },
            warehouse: WarehouseConfig::default(),
            cache: CacheConfig {
                enabled: false,
                directory: ".completion_cache".to_string(),
                ttl_secs: 86_400,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_path: None,
                format: "text".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources with precedence
    pub fn load() -> Result<Self> {
        Self::load_with(None)
    }

    /// Like [`AppConfig::load`], with an extra required file applied last
    /// before the environment
    pub fn load_with(path: Option<&Path>) -> Result<Self> {
        let defaults =
            Config::try_from(&Self::default()).context("Failed to serialize default configuration")?;

        let mut builder = Config::builder()
            // Start with default values
            .add_source(defaults)
            // Add config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(File::with_name("config").required(false));

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config = builder
            // Add environment variables with prefix, e.g. NL2SQL__PIPELINE__CHAR_BUDGET
            .add_source(
                Environment::with_prefix("NL2SQL")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to load configuration")?;

        let app_config: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Validate configuration
        app_config.validate()?;

        Ok(app_config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Validate pipeline config
        let pipeline = &self.pipeline;
        if pipeline.max_context_items == 0 {
            return Err(anyhow::anyhow!("max_context_items must be greater than 0"));
        }
        if pipeline.char_budget == 0 {
            return Err(anyhow::anyhow!("char_budget must be greater than 0"));
        }
        if pipeline.request_timeout_ms == 0 {
            return Err(anyhow::anyhow!("request_timeout_ms must be greater than 0"));
        }
        if pipeline.max_question_chars == 0 {
            return Err(anyhow::anyhow!("max_question_chars must be greater than 0"));
        }
        if !(0.0..=1.0).contains(&pipeline.relevance_floor) {
            return Err(anyhow::anyhow!(
                "relevance_floor must be within [0, 1], got {}",
                pipeline.relevance_floor
            ));
        }

        let valid_strategies = ["lexical", "embedding"];
        if !valid_strategies.contains(&pipeline.scoring.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid scoring strategy: {}. Must be one of: {:?}",
                pipeline.scoring,
                valid_strategies
            ));
        }

        let frame = self
            .assembler()
            .frame_overhead(pipeline.max_question_chars);
        if pipeline.char_budget <= frame {
            return Err(anyhow::anyhow!(
                "char_budget {} leaves no room for schema context; the prompt frame needs {} \
                 characters at max_question_chars {}",
                pipeline.char_budget,
                frame,
                pipeline.max_question_chars
            ));
        }

        // Validate completion config
        let valid_providers = ["gemini"];
        if !valid_providers.contains(&self.completion.provider.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid completion provider: {}. Must be one of: {:?}",
                self.completion.provider,
                valid_providers
            ));
        }

        // Validate warehouse config
        if self.warehouse.project_id.is_some() != self.warehouse.dataset_id.is_some() {
            return Err(anyhow::anyhow!(
                "warehouse.project_id and warehouse.dataset_id must be set together"
            ));
        }

        // Validate logging config
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            ));
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log format: {}. Must be one of: {:?}",
                self.logging.format,
                valid_formats
            ));
        }

        Ok(())
    }

    /// Prompt assembler honoring the warehouse qualification settings
    #[must_use]
    pub fn assembler(&self) -> PromptAssembler {
        match (&self.warehouse.project_id, &self.warehouse.dataset_id) {
            (Some(project), Some(dataset)) => PromptAssembler::with_qualifier(project, dataset),
            _ => PromptAssembler::new(),
        }
    }

    /// Per-request pipeline knobs
    #[must_use]
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            max_context_items: self.pipeline.max_context_items,
            char_budget: self.pipeline.char_budget,
            relevance_floor: self.pipeline.relevance_floor,
            max_question_chars: self.pipeline.max_question_chars,
            refine_on_refusal: self.pipeline.refine_on_refusal,
        }
    }

    /// Completion timeout
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.pipeline.request_timeout_ms)
    }

    /// Whether questions are scored with embeddings
    #[must_use]
    pub fn uses_embeddings(&self) -> bool {
        self.pipeline.scoring == "embedding"
    }

    /// Schema directory as a path
    #[must_use]
    pub fn schema_dir(&self) -> PathBuf {
        PathBuf::from(&self.schema.directory)
    }

    /// Get the completion API key from config or `GEMINI_API_KEY`
    pub fn get_api_key(&self) -> Result<String> {
        self.completion
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .context("No API key: set completion.api_key or GEMINI_API_KEY")
    }

    /// Get log level from environment or config
    #[must_use]
    pub fn get_log_level(&self) -> String {
        std::env::var("RUST_LOG").unwrap_or_else(|_| self.logging.level.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.pipeline.max_context_items, 3);
        assert_eq!(config.pipeline.char_budget, 12_000);
        assert_eq!(config.logging.level, "info");
        assert!(!config.uses_embeddings());
    }

    #[test]
    fn test_config_validation() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let mut config = AppConfig::default();
        config.pipeline.max_context_items = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_budget_must_exceed_frame() {
        let mut config = AppConfig::default();
        let frame = config.assembler().frame_overhead(config.pipeline.max_question_chars);
        config.pipeline.char_budget = frame;
        assert!(config.validate().is_err());
        config.pipeline.char_budget = frame + 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_qualified_assembler_has_larger_frame() {
        let mut config = AppConfig::default();
        let bare = config.assembler().frame_overhead(10);
        config.warehouse.project_id = Some("proj".to_string());
        config.warehouse.dataset_id = Some("census".to_string());
        assert!(config.assembler().frame_overhead(10) > bare);
    }
}
