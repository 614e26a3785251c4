//! Upload extraction pipeline.
//!
//! One call to [`Pipeline::process`] takes an uploaded file through sample
//! lookup, extraction (vision model, OCR or text parser), normalization,
//! validation with a single repair attempt, and storage. The uploaded file and
//! any preprocessed copy are removed when the call returns, whatever the
//! outcome.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::artifacts::TempArtifacts;
use crate::documents::{self, DocumentKind};
use crate::error::{PipelineError, Stage};
use crate::llm::{JsonRepairer, VisionExtractor};
use crate::normalizer::{normalize, normalize_with_report};
use crate::ocr::OcrProvider;
use crate::preprocess;
use crate::samples::{SampleRegistry, SAMPLE_NOTE};
use crate::schema::{ExtractionMethod, RawTimetable, Timetable, UploadMetadata};
use crate::storage::TimetableStore;
use crate::text_parser::parse_text;
use crate::validator::validate_timetable;

/// A file already written to the upload directory. The pipeline owns its cleanup.
#[derive(Debug, Clone)]
pub struct Upload {
    pub original_filename: String,
    pub mime_type: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub timetable: Timetable,
    pub metadata: UploadMetadata,
}

pub struct Pipeline {
    vision: Option<Arc<dyn VisionExtractor>>,
    repairer: Option<Arc<dyn JsonRepairer>>,
    ocr: Arc<dyn OcrProvider>,
    store: Arc<dyn TimetableStore>,
    samples: SampleRegistry,
    preprocess_images: bool,
}

impl Pipeline {
    pub fn new(ocr: Arc<dyn OcrProvider>, store: Arc<dyn TimetableStore>) -> Self {
        Self {
            vision: None,
            repairer: None,
            ocr,
            store,
            samples: SampleRegistry::new(),
            preprocess_images: true,
        }
    }

    pub fn with_vision(mut self, vision: Arc<dyn VisionExtractor>) -> Self {
        self.vision = Some(vision);
        self
    }

    pub fn with_repairer(mut self, repairer: Arc<dyn JsonRepairer>) -> Self {
        self.repairer = Some(repairer);
        self
    }

    #[cfg(test)]
    pub fn with_preprocessing(mut self, enabled: bool) -> Self {
        self.preprocess_images = enabled;
        self
    }

    pub fn store(&self) -> &Arc<dyn TimetableStore> {
        &self.store
    }

    pub async fn process(&self, upload: Upload) -> Result<UploadOutcome, PipelineError> {
        let started = Instant::now();
        let mut artifacts = TempArtifacts::new();
        artifacts.register(&upload.path);

        enter(Stage::Received, &upload.original_filename);
        info!(
            "Processing uploaded file: {} ({})",
            upload.original_filename, upload.mime_type
        );

        if let Some(sample) = self.samples.lookup_by_filename(&upload.original_filename) {
            enter(Stage::SampleShortCircuit, &upload.original_filename);
            info!("Using hardcoded sample data for: {}", upload.original_filename);
            self.store.save(&sample).await?;

            let metadata = UploadMetadata {
                extraction_method: ExtractionMethod::SampleData,
                processing_time: elapsed_ms(started),
                original_filename: upload.original_filename,
                repaired: None,
                note: Some(SAMPLE_NOTE.to_string()),
            };
            info!("Sample timetable returned in {}ms", metadata.processing_time);
            return Ok(UploadOutcome {
                timetable: sample,
                metadata,
            });
        }

        let kind = DocumentKind::detect(&upload.mime_type, &upload.original_filename);
        debug!("Detected document kind: {:?}", kind);

        enter(Stage::Extracting, &upload.original_filename);
        let (raw, method) = self.extract(&upload.path, kind, &mut artifacts).await?;
        debug!("Temporary files pending cleanup: {:?}", artifacts.paths());

        enter(Stage::Normalizing, &upload.original_filename);
        let report = normalize_with_report(raw);
        debug!("Normalization dropped {} blocks", report.dropped.len());
        let normalized = report.timetable;

        enter(Stage::Validating, &upload.original_filename);
        let (timetable, repaired) = match validate_timetable(&normalized) {
            Ok(valid) => (valid, None),
            Err(errors) => {
                error!("Validation failed with {} errors: {}", errors.len(), errors);
                enter(Stage::Repairing, &upload.original_filename);
                match self.repair(&normalized).await {
                    Some(valid) => {
                        info!("Successfully repaired invalid data");
                        (valid, Some(true))
                    }
                    None => return Err(PipelineError::Validation(errors)),
                }
            }
        };

        enter(Stage::Storing, &upload.original_filename);
        self.store.save(&timetable).await?;

        let metadata = UploadMetadata {
            extraction_method: method,
            processing_time: elapsed_ms(started),
            original_filename: upload.original_filename,
            repaired,
            note: None,
        };
        info!(
            "Timetable extraction completed in {}ms via {}",
            metadata.processing_time,
            method.as_str()
        );

        Ok(UploadOutcome { timetable, metadata })
    }

    async fn extract(
        &self,
        path: &Path,
        kind: DocumentKind,
        artifacts: &mut TempArtifacts,
    ) -> Result<(RawTimetable, ExtractionMethod), PipelineError> {
        match kind {
            DocumentKind::Image => {
                let image = self.prepare_image(path, artifacts).await;

                if let Some(vision) = &self.vision {
                    match vision.extract_from_image(&image).await {
                        Ok(raw) => {
                            info!("LLM extraction successful");
                            return Ok((raw, ExtractionMethod::Llm));
                        }
                        Err(e) => warn!("LLM extraction failed, falling back to OCR: {}", e),
                    }
                }

                info!("Using OCR ({}) for image extraction", self.ocr.name());
                let ocr = self.ocr.extract_text(&image).await?;
                info!(
                    "OCR extracted {} characters with confidence {:.2}",
                    ocr.text.len(),
                    ocr.confidence
                );
                debug!("Full OCR text:\n{}", ocr.text);
                Ok((parse_text(&ocr.text), ExtractionMethod::Ocr))
            }
            DocumentKind::Pdf | DocumentKind::Docx => {
                let text = match documents::read_text_layer(path, kind).await {
                    Ok(text) => text.unwrap_or_default(),
                    Err(e) => {
                        warn!("Could not read document text: {}", e);
                        String::new()
                    }
                };

                // Whitespace-only text still goes to the parser, which falls back to demo data.
                if text.is_empty() {
                    return Err(PipelineError::ExtractionUnavailable);
                }

                info!("Using text parser for {} extracted characters", text.len());
                debug!("Full extracted text:\n{}", text);
                Ok((parse_text(&text), ExtractionMethod::TextParser))
            }
            DocumentKind::Unknown => {
                warn!("No extraction strategy for this file type");
                Err(PipelineError::ExtractionUnavailable)
            }
        }
    }

    /// Preprocessed copy when enabled and useful, else the original path.
    async fn prepare_image(&self, path: &Path, artifacts: &mut TempArtifacts) -> PathBuf {
        if !self.preprocess_images || !preprocess::should_preprocess(path).await {
            return path.to_path_buf();
        }

        artifacts.register(preprocess::preprocessed_path(path));
        match preprocess::preprocess_image(path).await {
            Ok(processed) => processed,
            Err(e) => {
                warn!("Preprocessing failed, using original image: {}", e);
                path.to_path_buf()
            }
        }
    }

    /// Single repair round-trip. `None` on any failure.
    async fn repair(&self, candidate: &Timetable) -> Option<Timetable> {
        let Some(repairer) = &self.repairer else {
            warn!("No repair capability configured");
            return None;
        };

        let json = match serde_json::to_string(candidate) {
            Ok(json) => json,
            Err(e) => {
                error!("Could not serialize candidate for repair: {}", e);
                return None;
            }
        };

        let repaired = match repairer.repair_json(&json).await {
            Ok(raw) => raw,
            Err(e) => {
                error!("Repair failed: {}", e);
                return None;
            }
        };

        match validate_timetable(&normalize(repaired)) {
            Ok(valid) => Some(valid),
            Err(errors) => {
                error!("Repaired data still invalid: {}", errors);
                None
            }
        }
    }
}

fn enter(stage: Stage, filename: &str) {
    debug!("[{}] {}", stage, filename);
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ExtractionError, OcrError, RepairError};
    use crate::ocr::OcrText;
    use crate::schema::{RawBlock, RawDay};
    use crate::storage::InMemoryStore;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use uuid::Uuid;

    struct FakeVision {
        result: Option<RawTimetable>,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl VisionExtractor for FakeVision {
        async fn extract_from_image(&self, _image: &Path) -> Result<RawTimetable, ExtractionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result
                .clone()
                .ok_or(ExtractionError::EmptyResponse)
        }
    }

    struct FakeOcr {
        text: Option<String>,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl OcrProvider for FakeOcr {
        fn name(&self) -> &str {
            "fake"
        }

        async fn extract_text(&self, _image: &Path) -> Result<OcrText, OcrError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.text {
                Some(text) => Ok(OcrText {
                    text: text.clone(),
                    confidence: 0.87,
                }),
                None => Err(OcrError::Recognition("engine crashed".to_string())),
            }
        }
    }

    struct FakeRepairer {
        result: Option<RawTimetable>,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl JsonRepairer for FakeRepairer {
        async fn repair_json(&self, invalid_json: &str) -> Result<RawTimetable, RepairError> {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(invalid_json.to_string());
            }
            self.result.clone().ok_or(RepairError::NoJson)
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        dir: PathBuf,
        store: Arc<InMemoryStore>,
        vision: Arc<FakeVision>,
        ocr: Arc<FakeOcr>,
        repairer: Arc<FakeRepairer>,
    }

    impl Harness {
        fn new(vision: Option<RawTimetable>, ocr_text: Option<&str>, repaired: Option<RawTimetable>) -> Self {
            let dir = tempfile::tempdir().unwrap();
            Self {
                dir: dir.path().to_path_buf(),
                _dir: dir,
                store: Arc::new(InMemoryStore::new()),
                vision: Arc::new(FakeVision {
                    result: vision,
                    calls: AtomicUsize::new(0),
                }),
                ocr: Arc::new(FakeOcr {
                    text: ocr_text.map(str::to_string),
                    calls: AtomicUsize::new(0),
                }),
                repairer: Arc::new(FakeRepairer {
                    result: repaired,
                    seen: Mutex::new(Vec::new()),
                }),
            }
        }

        fn pipeline(&self) -> Pipeline {
            Pipeline::new(self.ocr.clone(), self.store.clone())
                .with_vision(self.vision.clone())
                .with_repairer(self.repairer.clone())
                .with_preprocessing(false)
        }

        fn upload(&self, filename: &str, mime: &str, bytes: &[u8]) -> Upload {
            let path = self.dir.join(format!("upload-{}", filename));
            std::fs::write(&path, bytes).unwrap();
            Upload {
                original_filename: filename.to_string(),
                mime_type: mime.to_string(),
                path,
            }
        }

        fn vision_calls(&self) -> usize {
            self.vision.calls.load(Ordering::SeqCst)
        }

        fn ocr_calls(&self) -> usize {
            self.ocr.calls.load(Ordering::SeqCst)
        }
    }

    fn raw(day: &str, blocks: Vec<RawBlock>) -> RawTimetable {
        RawTimetable {
            timetable_id: None,
            days: vec![RawDay {
                day: Some(day.to_string()),
                blocks,
            }],
        }
    }

    fn docx(text_lines: &[&str]) -> Vec<u8> {
        let body: String = text_lines
            .iter()
            .map(|l| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", l))
            .collect();
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        write!(
            zip,
            r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}</w:body></w:document>"#,
            body
        )
        .unwrap();
        zip.finish().unwrap().into_inner()
    }

    fn pdf(lines: &[&str]) -> Vec<u8> {
        use lopdf::content::{Content, Operation};
        use lopdf::{dictionary, Document, Object, Stream};

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut operations = Vec::new();
        for (i, line) in lines.iter().enumerate() {
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new("Tf", vec!["F1".into(), 12.into()]));
            operations.push(Operation::new("Td", vec![72.into(), (720 - 20 * i as i64).into()]));
            operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
            operations.push(Operation::new("ET", vec![]));
        }
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    #[tokio::test]
    async fn test_sample_file_short_circuits() {
        let h = Harness::new(None, None, None);
        let upload = h.upload("Teacher Timetable Example 1.1.png", "image/png", b"png");
        let path = upload.path.clone();

        let out = h.pipeline().process(upload).await.unwrap();

        assert_eq!(out.timetable.timetable_id, "sample-1.1");
        assert_eq!(out.timetable.days.len(), 5);
        assert_eq!(out.metadata.extraction_method, ExtractionMethod::SampleData);
        assert_eq!(out.metadata.note.as_deref(), Some(SAMPLE_NOTE));
        assert_eq!(h.vision_calls(), 0);
        assert_eq!(h.ocr_calls(), 0);
        assert!(h.store.get("sample-1.1").await.unwrap().is_some());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_vision_result_is_normalized_and_stored() {
        let vision = raw(
            "tue",
            vec![
                RawBlock::new("1:00 PM", "", "  physical   education ", "", 0.9),
                RawBlock::new("9:00 AM", "10:00 AM", "maths", "", 1.4),
            ],
        );
        let h = Harness::new(Some(vision), None, None);
        let upload = h.upload("week.jpg", "image/jpeg", b"jpg");
        let path = upload.path.clone();

        let out = h.pipeline().process(upload).await.unwrap();

        assert_eq!(out.metadata.extraction_method, ExtractionMethod::Llm);
        assert_eq!(out.metadata.repaired, None);
        assert!(Uuid::parse_str(&out.timetable.timetable_id).is_ok());

        let day = &out.timetable.days[0];
        assert_eq!(day.day, "Tuesday");
        assert_eq!(day.blocks[0].start, "09:00");
        assert_eq!(day.blocks[0].confidence, 1.0);
        assert_eq!(day.blocks[1].subject, "Physical Education");
        assert_eq!(day.blocks[1].end, "14:00");

        assert_eq!(h.ocr_calls(), 0);
        let stored = h.store.get(&out.timetable.timetable_id).await.unwrap();
        assert_eq!(stored, Some(out.timetable));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_vision_failure_falls_back_to_ocr() {
        let h = Harness::new(None, Some("Monday\n9:00-10:00 English\n10:00-11:00 History\n"), None);
        let upload = h.upload("scan.png", "image/png", b"png");

        let out = h.pipeline().process(upload).await.unwrap();

        assert_eq!(h.vision_calls(), 1);
        assert_eq!(h.ocr_calls(), 1);
        assert_eq!(out.metadata.extraction_method, ExtractionMethod::Ocr);
        let blocks = &out.timetable.days[0].blocks;
        assert_eq!(blocks[0].subject, "English");
        assert_eq!(blocks[1].start, "10:00");
        assert_eq!(blocks[1].notes, "Extracted from OCR");
    }

    #[tokio::test]
    async fn test_without_vision_goes_straight_to_ocr() {
        let h = Harness::new(None, Some("Wednesday\nArt and Music all afternoon\n"), None);
        let pipeline = Pipeline::new(h.ocr.clone(), h.store.clone()).with_preprocessing(false);

        let out = pipeline
            .process(h.upload("scan.png", "image/png", b"png"))
            .await
            .unwrap();

        assert_eq!(out.metadata.extraction_method, ExtractionMethod::Ocr);
        assert_eq!(h.vision_calls(), 0);
        assert_eq!(out.timetable.days[0].blocks[0].notes, "Time estimated");
    }

    #[tokio::test]
    async fn test_ocr_failure_is_terminal_and_cleans_up() {
        let h = Harness::new(None, None, None);
        let upload = h.upload("scan.png", "image/png", b"png");
        let path = upload.path.clone();

        let err = h.pipeline().process(upload).await.unwrap_err();

        assert!(matches!(err, PipelineError::Ocr(_)));
        assert_eq!(err.stage(), Stage::Extracting);
        assert!(!path.exists());
        assert!(h.store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_docx_text_uses_parser_not_ocr() {
        let h = Harness::new(None, Some("unused"), None);
        let bytes = docx(&["Thursday", "13:30 - 14:30 Science", "14:30 - 15:00 Reading"]);
        let upload = h.upload("week.docx", documents::MIME_DOCX, &bytes);

        let out = h.pipeline().process(upload).await.unwrap();

        assert_eq!(out.metadata.extraction_method, ExtractionMethod::TextParser);
        assert_eq!(h.vision_calls(), 0);
        assert_eq!(h.ocr_calls(), 0);
        let day = &out.timetable.days[0];
        assert_eq!(day.day, "Thursday");
        assert_eq!(day.blocks[0].subject, "Science");
        assert_eq!(day.blocks[1].subject, "Reading");
    }

    #[tokio::test]
    async fn test_document_without_text_is_unavailable() {
        let h = Harness::new(None, Some("unused"), None);
        let upload = h.upload("blank.docx", documents::MIME_DOCX, &docx(&[]));
        let path = upload.path.clone();

        let err = h.pipeline().process(upload).await.unwrap_err();
        assert!(matches!(err, PipelineError::ExtractionUnavailable));
        assert_eq!(h.ocr_calls(), 0);
        assert!(!path.exists());

        let err = h
            .pipeline()
            .process(h.upload("broken.pdf", documents::MIME_PDF, b"not a pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ExtractionUnavailable));
    }

    #[tokio::test]
    async fn test_whitespace_only_document_gets_demo_data() {
        let h = Harness::new(None, Some("unused"), None);
        let upload = h.upload("scanned.docx", documents::MIME_DOCX, &docx(&["   ", ""]));

        let out = h.pipeline().process(upload).await.unwrap();

        assert_eq!(out.metadata.extraction_method, ExtractionMethod::TextParser);
        assert_eq!(h.ocr_calls(), 0);
        let days: Vec<_> = out.timetable.days.iter().map(|d| d.day.as_str()).collect();
        assert_eq!(days, vec!["Monday", "Tuesday", "Wednesday"]);
        assert!(out
            .timetable
            .days
            .iter()
            .flat_map(|d| &d.blocks)
            .all(|b| b.notes == crate::text_parser::DEMO_NOTE));
    }

    #[tokio::test]
    async fn test_pdf_text_layer_uses_parser() {
        let h = Harness::new(None, Some("unused"), None);
        let bytes = pdf(&["Wednesday", "9:00 - 10:00 Geography"]);
        let upload = h.upload("week.pdf", documents::MIME_PDF, &bytes);

        let out = h.pipeline().process(upload).await.unwrap();

        assert_eq!(out.metadata.extraction_method, ExtractionMethod::TextParser);
        assert_eq!(h.ocr_calls(), 0);
        let day = &out.timetable.days[0];
        assert_eq!(day.day, "Wednesday");
        assert_eq!(day.blocks[0].subject, "Geography");
        assert_eq!(day.blocks[0].start, "09:00");
        assert_eq!(day.blocks[0].end, "10:00");
    }

    #[tokio::test]
    async fn test_example_2_returns_sample_for_any_extension() {
        for (name, mime) in [
            ("Teacher Timetable Example 2.pdf", documents::MIME_PDF),
            ("teacher_timetable_example_2.docx", documents::MIME_DOCX),
        ] {
            let h = Harness::new(None, None, None);
            let out = h.pipeline().process(h.upload(name, mime, b"ignored")).await.unwrap();

            assert_eq!(out.timetable.timetable_id, "sample-2");
            assert_eq!(out.timetable.days.len(), 5);
            assert_eq!(out.metadata.extraction_method, ExtractionMethod::SampleData);
            assert_eq!(out.metadata.original_filename, name);
            assert!(h.store.get("sample-2").await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn test_unknown_type_is_unavailable() {
        let h = Harness::new(None, Some("unused"), None);
        let upload = h.upload("x.bin", "application/octet-stream", b"\x00\x01");
        let path = upload.path.clone();

        let err = h.pipeline().process(upload).await.unwrap_err();
        assert!(matches!(err, PipelineError::ExtractionUnavailable));
        assert_eq!(err.stage(), Stage::Extracting);
        assert_eq!(h.ocr_calls(), 0);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_invalid_candidate_is_repaired_once() {
        let bad = raw("Funday", vec![RawBlock::new("9:00", "10:00", "Maths", "", 0.9)]);
        let fixed = raw("Friday", vec![RawBlock::new("9:00", "10:00", "Maths", "", 0.9)]);
        let h = Harness::new(Some(bad), None, Some(fixed));

        let out = h
            .pipeline()
            .process(h.upload("week.png", "image/png", b"png"))
            .await
            .unwrap();

        assert_eq!(out.metadata.repaired, Some(true));
        assert_eq!(out.timetable.days[0].day, "Friday");
        let seen = h.repairer.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].contains("\"Funday\""));
    }

    #[tokio::test]
    async fn test_repair_failure_surfaces_original_errors() {
        let bad = raw("Funday", vec![RawBlock::new("9:00", "10:00", "Maths", "", 0.9)]);
        let h = Harness::new(Some(bad), None, None);
        let upload = h.upload("week.png", "image/png", b"png");
        let path = upload.path.clone();

        let err = h.pipeline().process(upload).await.unwrap_err();

        match &err {
            PipelineError::Validation(errors) => {
                assert_eq!(errors.0[0].path, "days[0].day");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        assert_eq!(err.stage(), Stage::Validating);
        assert!(h.store.list().await.unwrap().is_empty());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_still_invalid_after_repair() {
        let bad = raw("Funday", vec![RawBlock::new("9:00", "10:00", "Maths", "", 0.9)]);
        let still_bad = raw("Someday", vec![RawBlock::new("9:00", "10:00", "Maths", "", 0.9)]);
        let h = Harness::new(Some(bad), None, Some(still_bad));

        let err = h
            .pipeline()
            .process(h.upload("week.png", "image/png", b"png"))
            .await
            .unwrap_err();

        let PipelineError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert!(errors.0[0].message.contains("'Funday'"));
    }

    #[tokio::test]
    async fn test_no_repairer_fails_validation_directly() {
        let bad = raw("Funday", vec![RawBlock::new("9:00", "10:00", "Maths", "", 0.9)]);
        let h = Harness::new(Some(bad), None, None);
        let pipeline = Pipeline::new(h.ocr.clone(), h.store.clone())
            .with_vision(h.vision.clone())
            .with_preprocessing(false);

        let err = pipeline
            .process(h.upload("week.png", "image/png", b"png"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
        assert!(h.repairer.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_preprocessing_failure_falls_back_to_original() {
        let h = Harness::new(None, Some("Monday\n9:00-10:00 Maths\nmore text here\n"), None);
        let pipeline = Pipeline::new(h.ocr.clone(), h.store.clone());
        let upload = h.upload("scan.png", "image/png", b"not really a png");
        let preprocessed = preprocess::preprocessed_path(&upload.path);

        let out = pipeline.process(upload).await.unwrap();

        assert_eq!(out.metadata.extraction_method, ExtractionMethod::Ocr);
        assert!(!preprocessed.exists());
    }
}
