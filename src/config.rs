//! Configuration types and validation for the engine

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration for coordinate mapping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapperConfig {
    /// Maximum horizontal gap between tokens on one line, as a fraction of
    /// line height, before a span's rectangles are split into separate runs
    pub max_gap_ratio: f64,
    /// Vertical quantum used to assign rectangles to visual lines
    pub line_snap: f64,
}

/// Configuration for instruction compilation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstructionConfig {
    /// Minimum normalized similarity for a fuzzy entity-reference match
    pub entity_match_threshold: f64,
    /// Expand multi-word person names so a keep/redact rule on
    /// "Oliver Hughes" also covers bare "Oliver"
    pub expand_person_names: bool,
}

/// Configuration for suggestion merging and deduplication
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Overlap ratio above which two same-category suggestions on a page
    /// are considered duplicates
    pub dedup_overlap: f64,
    /// Manually drawn boxes are highest-priority provenance and are never
    /// silently merged away; the overlapping detector duplicate is absorbed
    /// instead
    pub manual_precedence: bool,
    /// Context window (chars) scanned before a DateTime span for
    /// date-of-birth keywords
    pub dob_context_window: usize,
}

/// Configuration for whole-document occurrence expansion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OccurrenceConfig {
    /// Minimum normalized similarity for a token window to count as a match
    pub match_threshold: f64,
    /// Extra tokens a candidate window may extend past the seed's token count
    pub window_slack: usize,
}

/// Configuration for the secure rewrite
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewriteConfig {
    /// Margin (points) added around every redaction rectangle when testing
    /// content intersection; biases toward over-redaction
    pub slop: f64,
    /// Remove invisible text (render mode 3, e.g. OCR layers) everywhere,
    /// not only under redaction rectangles
    pub strip_invisible_text: bool,
    /// Remove all page annotations during sanitization
    pub strip_annotations: bool,
    /// Overlap tolerance (points) above which final box rectangles on one
    /// page must have been explicitly merged
    pub box_overlap_tolerance: f64,
}

/// Global engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub mapper: MapperConfig,
    pub instruction: InstructionConfig,
    pub merge: MergeConfig,
    pub occurrence: OccurrenceConfig,
    pub rewrite: RewriteConfig,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            max_gap_ratio: 0.75,
            line_snap: 1.0,
        }
    }
}

impl Default for InstructionConfig {
    fn default() -> Self {
        Self {
            entity_match_threshold: 0.85,
            expand_person_names: true,
        }
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            dedup_overlap: 0.6,
            manual_precedence: true,
            dob_context_window: 20,
        }
    }
}

impl Default for OccurrenceConfig {
    fn default() -> Self {
        Self {
            match_threshold: 0.9,
            window_slack: 2,
        }
    }
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            slop: 0.5,
            strip_invisible_text: true,
            strip_annotations: true,
            box_overlap_tolerance: 1.0,
        }
    }
}

impl EngineConfig {
    /// Validates threshold ranges; thresholds are ratios in (0, 1]
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("instruction.entity_match_threshold", self.instruction.entity_match_threshold),
            ("merge.dedup_overlap", self.merge.dedup_overlap),
            ("occurrence.match_threshold", self.occurrence.match_threshold),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(Error::ConfigError(format!(
                    "{name} must be within (0, 1], got {value}"
                )));
            }
        }
        if self.rewrite.slop < 0.0 {
            return Err(Error::ConfigError("rewrite.slop must be >= 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let mut config = EngineConfig::default();
        config.occurrence.match_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn round_trips_through_json() {
        let config = EngineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.occurrence.match_threshold, config.occurrence.match_threshold);
        assert_eq!(back.merge.manual_precedence, config.merge.manual_precedence);
    }
}
