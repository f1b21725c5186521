use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    /// Path to the SQLite database. Defaults to `~/.licrec/data/licrec.db`.
    #[serde(default)]
    pub database_path: Option<String>,
    /// Root directory for stored document uploads.
    #[serde(default)]
    pub document_root: Option<String>,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub review: ReviewConfig,
    #[serde(default)]
    pub queue: QueueConfig,
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_languages() -> Vec<String> {
    vec!["eng".to_string()]
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            languages: default_languages(),
        }
    }
}

/// Tunable parameters of the confidence scorer. The defaults are starting
/// points, not calibrated truths; deployments are expected to adjust them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Candidates below this raw confidence are discarded outright.
    #[serde(default = "default_floor")]
    pub floor: f64,
    /// Weight of OCR region confidence in the geometric-mean fusion.
    #[serde(default = "default_region_weight")]
    pub region_weight: f64,
    /// Weight of recognizer confidence in the geometric-mean fusion.
    #[serde(default = "default_recognizer_weight")]
    pub recognizer_weight: f64,
    /// Multiplicative penalty applied to the less-corroborated side of a
    /// failed cross-field consistency check.
    #[serde(default = "default_cross_field_penalty")]
    pub cross_field_penalty: f64,
    /// Multiplicative bonus applied to both sides of a passed check.
    #[serde(default = "default_cross_field_bonus")]
    pub cross_field_bonus: f64,
}

fn default_floor() -> f64 {
    0.3
}

fn default_region_weight() -> f64 {
    0.4
}

fn default_recognizer_weight() -> f64 {
    0.6
}

fn default_cross_field_penalty() -> f64 {
    0.3
}

fn default_cross_field_bonus() -> f64 {
    0.05
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            floor: default_floor(),
            region_weight: default_region_weight(),
            recognizer_weight: default_recognizer_weight(),
            cross_field_penalty: default_cross_field_penalty(),
            cross_field_bonus: default_cross_field_bonus(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Records whose minimum field confidence falls below this are flagged.
    #[serde(default = "default_review_threshold")]
    pub review_threshold: f64,
    /// Records at or above this overall quality score with no invalid field
    /// may skip human review entirely.
    #[serde(default = "default_auto_accept_threshold")]
    pub auto_accept_threshold: f64,
    /// How long a reviewer's exclusive hold on a record lasts.
    #[serde(default = "default_reservation_seconds")]
    pub reservation_seconds: u64,
}

fn default_review_threshold() -> f64 {
    0.7
}

fn default_auto_accept_threshold() -> f64 {
    0.85
}

fn default_reservation_seconds() -> u64 {
    900
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            review_threshold: default_review_threshold(),
            auto_accept_threshold: default_auto_accept_threshold(),
            reservation_seconds: default_reservation_seconds(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum processing attempts before a job fails terminally.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Lease duration; doubles as the per-job processing deadline.
    #[serde(default = "default_lease_seconds")]
    pub lease_seconds: u64,
    /// Base delay for exponential retry backoff.
    #[serde(default = "default_backoff_base_seconds")]
    pub backoff_base_seconds: u64,
    /// How long an idle worker sleeps between queue polls.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_lease_seconds() -> u64 {
    300
}

fn default_backoff_base_seconds() -> u64 {
    30
}

fn default_poll_interval_ms() -> u64 {
    200
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            lease_seconds: default_lease_seconds(),
            backoff_base_seconds: default_backoff_base_seconds(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}
