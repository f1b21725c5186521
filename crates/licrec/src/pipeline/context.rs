use std::collections::BTreeMap;

use crate::acquire::TextSpan;
use crate::extract::FieldCandidate;
use crate::model::StructuredRecord;
use crate::queue::Job;
use crate::score::ScoredField;
use crate::validate::Validity;

pub struct PipelineContext {
    // Input
    pub job: Job,

    // Step 1 result — guaranteed Some after step_acquire
    pub spans: Option<Vec<TextSpan>>,

    // Step 2 result — guaranteed Some after step_extract
    pub candidates: Option<BTreeMap<String, Vec<FieldCandidate>>>,

    // Step 3 result — guaranteed Some after step_score
    pub scored: Option<BTreeMap<String, ScoredField>>,

    // Step 4 result — guaranteed Some after step_validate
    pub verdicts: Option<BTreeMap<String, Validity>>,

    // Step 5 result
    pub record: Option<StructuredRecord>,
}

impl PipelineContext {
    pub fn new(job: Job) -> Self {
        Self {
            job,
            spans: None,
            candidates: None,
            scored: None,
            verdicts: None,
            record: None,
        }
    }
}
