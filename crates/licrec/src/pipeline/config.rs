use crate::config::{Config, OcrConfig, ReviewConfig, ScoringConfig};
use crate::schema::FieldSchema;

pub struct PipelineConfig {
    pub schema: FieldSchema,
    pub scoring: ScoringConfig,
    pub review: ReviewConfig,
    pub ocr: OcrConfig,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            schema: FieldSchema::licensing(),
            scoring: config.scoring.clone(),
            review: config.review.clone(),
            ocr: config.ocr.clone(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            schema: FieldSchema::licensing(),
            scoring: ScoringConfig::default(),
            review: ReviewConfig::default(),
            ocr: OcrConfig::default(),
        }
    }
}
