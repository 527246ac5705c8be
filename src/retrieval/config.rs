use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Scoring and fan-out constants. They assume cosine distances in [0, 1];
/// a different distance metric needs recalibrated values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub original_weight: f64,
    pub expanded_weight: f64,
    pub frequency_boost: f64,
    pub min_relevance: f64,
    pub original_floor: usize,
    pub original_multiplier: usize,
    pub max_expansions: usize,
    pub snippet_chars: usize,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            original_weight: 1.0,
            expanded_weight: 0.6,
            frequency_boost: 0.05,
            min_relevance: 0.35,
            original_floor: 20,
            original_multiplier: 4,
            max_expansions: 4,
            snippet_chars: 200,
        }
    }
}

impl FusionConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read(path)
            .with_context(|| format!("failed to read fusion config {}", path.display()))?;
        let config: Self = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse fusion config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let weights = [
            ("original_weight", self.original_weight),
            ("expanded_weight", self.expanded_weight),
            ("frequency_boost", self.frequency_boost),
            ("min_relevance", self.min_relevance),
        ];
        for (name, value) in weights {
            if !value.is_finite() {
                bail!("fusion config field {name} must be finite, got {value}");
            }
        }
        if self.frequency_boost < 0.0 {
            bail!(
                "fusion config field frequency_boost must be non-negative, got {}",
                self.frequency_boost
            );
        }
        Ok(())
    }
}
