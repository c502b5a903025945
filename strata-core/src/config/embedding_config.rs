//! Embedding configuration.

use serde::{Deserialize, Serialize};

use crate::errors::{EmbeddingError, StrataError, StrataResult};

/// Embedding settings shared by every tier that stores vectors.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Fixed dimensionality for every stored vector. Must be set.
    pub dimensions: Option<usize>,
}

impl EmbeddingConfig {
    pub fn with_dimensions(dimensions: usize) -> Self {
        Self {
            dimensions: Some(dimensions),
        }
    }

    /// The configured dimensionality, or a fatal config error.
    pub fn required_dimensions(&self) -> StrataResult<usize> {
        match self.dimensions {
            Some(0) => Err(StrataError::ConfigError(
                "embedding.dimensions must be > 0".into(),
            )),
            Some(d) => Ok(d),
            None => Err(EmbeddingError::DimensionUnset.into()),
        }
    }

    pub fn validate(&self) -> StrataResult<()> {
        self.required_dimensions().map(|_| ())
    }
}
