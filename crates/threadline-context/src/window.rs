//! Context window configuration

use serde::{Deserialize, Serialize};
use threadline_runtime::GenerationConfig;

use crate::error::{ContextError, ContextResult};

/// Settings for a conversation's rolling window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Persona and rules sent with every primary completion
    pub system_instruction: String,
    /// Turns kept verbatim after a compression
    pub recent_window_size: usize,
    /// Compression runs once the recent turns exceed this count
    pub compression_threshold: usize,
    /// Sampling settings for ordinary chat turns
    #[serde(default)]
    pub generation: GenerationConfig,
    /// Sampling settings for summarization calls
    #[serde(default)]
    pub summary_generation: GenerationConfig,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            system_instruction: String::new(),
            recent_window_size: 3,
            compression_threshold: 6,
            generation: GenerationConfig::default(),
            summary_generation: GenerationConfig::default(),
        }
    }
}

impl WindowConfig {
    pub fn new(
        system_instruction: impl Into<String>,
        recent_window_size: usize,
        compression_threshold: usize,
    ) -> Self {
        Self {
            system_instruction: system_instruction.into(),
            recent_window_size,
            compression_threshold,
            ..Default::default()
        }
    }

    pub fn with_generation(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    pub fn with_summary_generation(mut self, generation: GenerationConfig) -> Self {
        self.summary_generation = generation;
        self
    }

    pub fn validate(&self) -> ContextResult<()> {
        if self.recent_window_size == 0 {
            return Err(ContextError::InvalidConfiguration(
                "recent_window_size must be positive".to_string(),
            ));
        }
        if self.compression_threshold == 0 {
            return Err(ContextError::InvalidConfiguration(
                "compression_threshold must be positive".to_string(),
            ));
        }
        if self.compression_threshold <= self.recent_window_size {
            return Err(ContextError::InvalidConfiguration(format!(
                "compression_threshold ({}) must exceed recent_window_size ({})",
                self.compression_threshold, self.recent_window_size
            )));
        }
        Ok(())
    }
}
