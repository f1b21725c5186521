use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info_span};

use crate::acquire::{AcquirerRegistry, OcrEngine, TesseractEngine};
use crate::assemble::RecordAssembler;
use crate::error::AcquireError;
use crate::extract::CandidateExtractor;
use crate::model::StructuredRecord;
use crate::score::Scorer;
use crate::validate::Validator;

use super::config::PipelineConfig;
use super::context::PipelineContext;
use super::error::PipelineError;
use super::progress::{JobPhase, ProgressEvent, ProgressReporter};

pub struct Pipeline {
    config: Arc<PipelineConfig>,
    acquirer: AcquirerRegistry,
    extractor: CandidateExtractor,
    scorer: Scorer,
    validator: Validator,
    assembler: RecordAssembler,
}

impl Pipeline {
    /// Production constructor — builds all sub-components from config.
    pub fn from_config(config: Arc<PipelineConfig>) -> Self {
        let engine: Option<Arc<dyn OcrEngine>> = if config.ocr.enabled {
            Some(Arc::new(TesseractEngine::new(&config.ocr.languages)))
        } else {
            None
        };
        Self::with_ocr_engine(config, engine)
    }

    /// Constructor with an explicit OCR engine (or none). Tests inject a
    /// deterministic fake here.
    pub fn with_ocr_engine(
        config: Arc<PipelineConfig>,
        engine: Option<Arc<dyn OcrEngine>>,
    ) -> Self {
        let acquirer = AcquirerRegistry::new(engine);
        let extractor = CandidateExtractor::new();
        let scorer = Scorer::new(config.scoring.clone());
        let validator = Validator::new();
        let assembler = RecordAssembler::new(config.review.review_threshold);

        Self {
            config,
            acquirer,
            extractor,
            scorer,
            validator,
            assembler,
        }
    }

    /// Run the full pipeline for a single document job.
    /// Returns a (result, context) pair.
    pub fn run(
        &self,
        mut ctx: PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> (Result<StructuredRecord, PipelineError>, PipelineContext) {
        let _pipeline_span = info_span!("pipeline",
            job_id = %ctx.job.id,
            session_id = %ctx.job.session_id,
            format = ctx.job.format.as_str(),
        )
        .entered();

        // Step 1: Acquire text spans
        {
            let _step = info_span!("acquire").entered();
            progress.report(ProgressEvent::Phase {
                phase: JobPhase::Acquiring,
                message: "Extracting text from document...".to_string(),
            });
            if let Err(e) = self.step_acquire(&mut ctx) {
                let err_msg = e.to_string();
                progress.report(ProgressEvent::Failed {
                    error: err_msg.clone(),
                });
                return (Err(e), ctx);
            }
        }

        // Step 2: Extract field candidates
        {
            let _step = info_span!("extract_candidates").entered();
            progress.report(ProgressEvent::Phase {
                phase: JobPhase::Extracting,
                message: "Extracting field candidates...".to_string(),
            });
            self.step_extract(&mut ctx);
        }

        // Step 3: Score candidates
        {
            let _step = info_span!("score").entered();
            progress.report(ProgressEvent::Phase {
                phase: JobPhase::Scoring,
                message: "Scoring candidates...".to_string(),
            });
            self.step_score(&mut ctx);
        }

        // Step 4: Validate
        {
            let _step = info_span!("validate").entered();
            progress.report(ProgressEvent::Phase {
                phase: JobPhase::Validating,
                message: "Validating fields...".to_string(),
            });
            self.step_validate(&mut ctx);
        }

        // Step 5: Assemble the record
        {
            let _step = info_span!("assemble").entered();
            progress.report(ProgressEvent::Phase {
                phase: JobPhase::Assembling,
                message: "Assembling structured record...".to_string(),
            });
            self.step_assemble(&mut ctx);
        }

        let record = ctx.record.clone().expect("record set in step 5");
        debug!(
            "Assembled record {} (quality {:.2}, flagged: {})",
            record.record_id, record.overall_quality_score, record.flagged
        );

        progress.report(ProgressEvent::Completed {
            record_id: record.record_id.clone(),
            flagged: record.flagged,
        });

        (Ok(record), ctx)
    }

    fn step_acquire(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let bytes =
            std::fs::read(&ctx.job.document_path).map_err(|e| AcquireError::ReadDocument {
                path: ctx.job.document_path.clone(),
                source: e,
            })?;

        let spans = self.acquirer.extract(&bytes, ctx.job.format)?;
        ctx.spans = Some(spans);
        Ok(())
    }

    fn step_extract(&self, ctx: &mut PipelineContext) {
        let spans = ctx.spans.as_ref().expect("step 1 completed");
        ctx.candidates = Some(self.extractor.extract(&self.config.schema, spans));
    }

    fn step_score(&self, ctx: &mut PipelineContext) {
        let candidates = ctx.candidates.as_ref().expect("step 2 completed");
        ctx.scored = Some(self.scorer.score(&self.config.schema, candidates));
    }

    fn step_validate(&self, ctx: &mut PipelineContext) {
        let scored = ctx.scored.as_ref().expect("step 3 completed");
        let values: BTreeMap<String, String> = scored
            .iter()
            .map(|(name, field)| (name.clone(), field.value.clone()))
            .collect();
        ctx.verdicts = Some(self.validator.validate_record(&self.config.schema, &values));
    }

    fn step_assemble(&self, ctx: &mut PipelineContext) {
        let scored = ctx.scored.as_ref().expect("step 3 completed");
        let verdicts = ctx.verdicts.as_ref().expect("step 4 completed");
        ctx.record = Some(self.assembler.assemble(
            &self.config.schema,
            &ctx.job.session_id,
            scored,
            verdicts,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquire::{DocumentFormat, OcrRegion};
    use crate::pipeline::progress::NoopProgress;
    use crate::queue::Job;
    use std::path::Path;

    fn test_job(dir: &Path, name: &str, content: &str, format: DocumentFormat) -> Job {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        Job {
            id: "job-1".to_string(),
            session_id: "sess-1".to_string(),
            document_path: path,
            format,
            attempt_count: 1,
            max_retries: 3,
        }
    }

    fn pipeline() -> Pipeline {
        Pipeline::with_ocr_engine(Arc::new(PipelineConfig::default()), None)
    }

    const CLEAN_DOCUMENT: &str = "\
Dacorum Borough Council
Licence reference: HMO/12345
Property address: 12 High Street, Hemel Hempstead, HP1 1AB
Licence start: 2023-01-15
Expiry date: 2026-01-14
Maximum occupancy: 6
HMO Manager: John Smith
Licence holder: Jane Doe
";

    #[test]
    fn test_clean_digital_document_not_flagged() {
        let tmp = tempfile::tempdir().unwrap();
        let job = test_job(tmp.path(), "doc.txt", CLEAN_DOCUMENT, DocumentFormat::Text);

        let (result, ctx) = pipeline().run(PipelineContext::new(job), &NoopProgress);
        let record = result.unwrap();

        assert_eq!(record.session_id, "sess-1");
        let start = record.field("licence_start").unwrap();
        let expiry = record.field("licence_expiry").unwrap();
        assert_eq!(start.value, "2023-01-15");
        assert_eq!(expiry.value, "2026-01-14");
        assert!(start.validity.is_valid());
        assert!(expiry.validity.is_valid());
        assert!(start.confidence > 0.7);
        assert!(expiry.confidence > 0.7);
        assert!(!record.flagged, "clean record must not be flagged");
        assert!(ctx.spans.unwrap().len() > 5);
    }

    #[test]
    fn test_missing_required_field_flags_record() {
        let tmp = tempfile::tempdir().unwrap();
        // No address anywhere in the document.
        let content = "\
Fife Council
Licence reference: HMO/9999
Licence start: 2023-01-15
Expiry date: 2026-01-14
Maximum occupancy: 4
";
        let job = test_job(tmp.path(), "doc.txt", content, DocumentFormat::Text);

        let (result, _ctx) = pipeline().run(PipelineContext::new(job), &NoopProgress);
        let record = result.unwrap();

        let address = record.field("hmo_address").unwrap();
        assert_eq!(address.value, "");
        assert_eq!(address.confidence, 0.0);
        assert!(!address.validity.is_valid());
        assert!(record.flagged);
    }

    #[test]
    fn test_unreadable_file_fails_pipeline() {
        let job = Job {
            id: "job-1".to_string(),
            session_id: "sess-1".to_string(),
            document_path: Path::new("/nonexistent/doc.txt").to_path_buf(),
            format: DocumentFormat::Text,
            attempt_count: 1,
            max_retries: 3,
        };

        let (result, _ctx) = pipeline().run(PipelineContext::new(job), &NoopProgress);
        let err = result.unwrap_err();
        assert!(err.is_permanent());
    }

    #[test]
    fn test_corrupt_pdf_is_permanent_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let job = test_job(tmp.path(), "doc.pdf", "not a pdf", DocumentFormat::Pdf);

        let (result, _ctx) = pipeline().run(PipelineContext::new(job), &NoopProgress);
        assert!(result.unwrap_err().is_permanent());
    }

    struct ScriptedEngine {
        lines: Vec<(String, f64)>,
    }

    impl OcrEngine for ScriptedEngine {
        fn recognize(&self, _image_bytes: &[u8]) -> Result<Vec<OcrRegion>, AcquireError> {
            Ok(self
                .lines
                .iter()
                .map(|(text, confidence)| OcrRegion {
                    text: text.clone(),
                    confidence: *confidence,
                })
                .collect())
        }
    }

    #[test]
    fn test_ocr_document_with_inverted_dates_flags_expiry() {
        let tmp = tempfile::tempdir().unwrap();
        let job = test_job(tmp.path(), "scan.png", "fake image", DocumentFormat::Image);

        let engine = Arc::new(ScriptedEngine {
            lines: vec![
                ("Fife Council".to_string(), 0.9),
                ("Licence reference: HMO/4242".to_string(), 0.9),
                ("Property address: 3 Harbour Road, Anstruther, KY10 3AB".to_string(), 0.9),
                ("Licence start: 2023-01-15".to_string(), 0.88),
                ("Expiry date: 2021-01-14".to_string(), 0.88),
                ("Maximum occupancy: 5".to_string(), 0.9),
            ],
        });
        let pipeline =
            Pipeline::with_ocr_engine(Arc::new(PipelineConfig::default()), Some(engine));

        let (result, _ctx) = pipeline.run(PipelineContext::new(job), &NoopProgress);
        let record = result.unwrap();

        let expiry = record.field("licence_expiry").unwrap();
        assert!(!expiry.validity.is_valid());
        assert!(record.flagged, "cross-field failure must flag the record");

        // OCR region confidence participates in fusion: fused score is
        // below the raw recognizer confidence.
        let start = record.field("licence_start").unwrap();
        assert!(start.confidence < 0.9);
        assert!(start.confidence > 0.0);
    }
}
