//! Thinking-depth tiers for model selection
//!
//! An ordered tier list from config; `/thinking set` selects a tier, clamped
//! to the configured maximum.

use tracing::debug;

use crate::config::ThinkingConfig;

/// Error kinds for tier selection
#[derive(Debug, thiserror::Error)]
pub enum ThinkingError {
    #[error("Unknown thinking tier `{0}`; configured tiers: {1}")]
    UnknownTier(String, String),
}

/// Session-scoped thinking-tier selection.
#[derive(Debug, Clone)]
pub struct ThinkingTiers {
    tiers: Vec<String>,
    default_tier: String,
    max_tier: String,
    current: String,
}

impl ThinkingTiers {
    pub fn from_config(config: &ThinkingConfig) -> Self {
        Self {
            tiers: config.tiers.clone(),
            default_tier: config.default_tier.clone(),
            max_tier: config.max_tier.clone(),
            current: config.default_tier.clone(),
        }
    }

    /// Currently selected tier.
    pub fn current(&self) -> &str {
        &self.current
    }

    /// Highest selectable tier.
    pub fn max(&self) -> &str {
        &self.max_tier
    }

    /// All configured tiers, shallowest first.
    pub fn tiers(&self) -> &[String] {
        &self.tiers
    }

    fn index_of(&self, tier: &str) -> Option<usize> {
        self.tiers.iter().position(|t| t == tier)
    }

    /// Select a tier, clamping to the configured max.
    ///
    /// Returns the tier actually selected.
    pub fn set(&mut self, tier: &str) -> Result<&str, ThinkingError> {
        let requested = self
            .index_of(tier)
            .ok_or_else(|| ThinkingError::UnknownTier(tier.to_string(), self.tiers.join(", ")))?;

        let cap = self.index_of(&self.max_tier).unwrap_or(self.tiers.len().saturating_sub(1));
        let selected = requested.min(cap);
        if selected != requested {
            debug!(requested = %tier, clamped = %self.tiers[selected], "Thinking tier clamped to max");
        }
        self.current = self.tiers[selected].clone();
        Ok(&self.current)
    }

    /// Jump straight to the configured max tier.
    pub fn set_max(&mut self) -> &str {
        self.current = self.max_tier.clone();
        &self.current
    }

    /// Back to the configured default.
    pub fn reset(&mut self) -> &str {
        self.current = self.default_tier.clone();
        &self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiers() -> ThinkingTiers {
        ThinkingTiers::from_config(&ThinkingConfig::default())
    }

    #[test]
    fn test_defaults() {
        let t = tiers();
        assert_eq!(t.current(), "standard");
        assert_eq!(t.max(), "deep");
    }

    #[test]
    fn test_set_valid_tier() {
        let mut t = tiers();
        assert_eq!(t.set("minimal").unwrap(), "minimal");
        assert_eq!(t.current(), "minimal");
    }

    #[test]
    fn test_set_clamps_to_max() {
        let mut t = tiers();
        // "max" is configured but above max_tier ("deep").
        assert_eq!(t.set("max").unwrap(), "deep");
    }

    #[test]
    fn test_set_unknown_fails() {
        let mut t = tiers();
        assert!(matches!(t.set("galaxy"), Err(ThinkingError::UnknownTier(..))));
        assert_eq!(t.current(), "standard", "selection unchanged on error");
    }

    #[test]
    fn test_set_max_and_reset() {
        let mut t = tiers();
        assert_eq!(t.set_max(), "deep");
        assert_eq!(t.reset(), "standard");
    }
}
