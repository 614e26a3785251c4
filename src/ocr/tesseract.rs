//! Local OCR through the Tesseract CLI.
//!
//! The engine is acquired lazily on first use. Concurrent first calls share a
//! single `--version` probe, and recognition runs one image at a time.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::process::Command;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};

use super::{OcrProvider, OcrText};
use crate::error::OcrError;

/// Probed engine handle.
#[derive(Debug)]
struct Engine {
    version: String,
}

pub struct TesseractOcr {
    binary: String,
    language: String,
    engine: OnceCell<Engine>,
    recognize_lock: Mutex<()>,
    released: AtomicBool,
}

impl TesseractOcr {
    pub fn new(binary: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            language: language.into(),
            engine: OnceCell::new(),
            recognize_lock: Mutex::new(()),
            released: AtomicBool::new(false),
        }
    }

    async fn acquire(&self) -> Result<&Engine, OcrError> {
        if self.released.load(Ordering::Acquire) {
            return Err(OcrError::Released);
        }
        self.engine.get_or_try_init(|| self.probe()).await
    }

    async fn probe(&self) -> Result<Engine, OcrError> {
        info!("Initializing Tesseract OCR engine ({})...", self.binary);
        let output = Command::new(&self.binary)
            .arg("--version")
            .output()
            .await
            .map_err(|e| OcrError::EngineUnavailable(format!("failed to run '{}': {}", self.binary, e)))?;

        if !output.status.success() {
            return Err(OcrError::EngineUnavailable(format!(
                "'{} --version' exited with {}",
                self.binary, output.status
            )));
        }

        // Older builds print the banner on stderr.
        let banner = if output.stdout.is_empty() { &output.stderr } else { &output.stdout };
        let version = String::from_utf8_lossy(banner)
            .lines()
            .next()
            .unwrap_or("tesseract")
            .trim()
            .to_string();

        info!("Tesseract OCR engine initialized: {}", version);
        Ok(Engine { version })
    }
}

#[async_trait::async_trait]
impl OcrProvider for TesseractOcr {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn extract_text(&self, image: &Path) -> Result<OcrText, OcrError> {
        let engine = self.acquire().await?;
        let _guard = self.recognize_lock.lock().await;

        info!("Running OCR on image: {:?} ({})", image, engine.version);

        let output = Command::new(&self.binary)
            .arg(image.as_os_str())
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .arg("tsv")
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Recognition(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let tsv = String::from_utf8_lossy(&output.stdout);
        let result = parse_tsv(&tsv);

        info!(
            "OCR completed. Confidence: {:.2}, Text length: {}",
            result.confidence,
            result.text.len()
        );
        Ok(result)
    }

    async fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) && self.engine.initialized() {
            info!("Terminating Tesseract OCR engine...");
        }
    }
}

const COL_LEVEL: usize = 0;
const COL_PAGE: usize = 1;
const COL_BLOCK: usize = 2;
const COL_PAR: usize = 3;
const COL_LINE: usize = 4;
const COL_CONF: usize = 10;
const COL_TEXT: usize = 11;
const WORD_LEVEL: &str = "5";

/// Rebuild text from Tesseract TSV output, one output line per recognized
/// line. Confidence is the mean word confidence scaled to `[0, 1]`.
pub fn parse_tsv(tsv: &str) -> OcrText {
    let mut lines: BTreeMap<(u32, u32, u32, u32), Vec<&str>> = BTreeMap::new();
    let mut conf_sum = 0.0;
    let mut conf_count = 0usize;

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() <= COL_TEXT || cols[COL_LEVEL] != WORD_LEVEL {
            continue;
        }

        let word = cols[COL_TEXT].trim();
        if word.is_empty() {
            continue;
        }

        let key = |i: usize| cols[i].parse::<u32>().unwrap_or(0);
        lines
            .entry((key(COL_PAGE), key(COL_BLOCK), key(COL_PAR), key(COL_LINE)))
            .or_default()
            .push(word);

        if let Ok(conf) = cols[COL_CONF].parse::<f64>() {
            if conf >= 0.0 {
                conf_sum += conf;
                conf_count += 1;
            }
        }
    }

    let text = lines
        .values()
        .map(|words| words.join(" "))
        .collect::<Vec<_>>()
        .join("\n");

    let confidence = if conf_count == 0 {
        0.0
    } else {
        (conf_sum / conf_count as f64 / 100.0).clamp(0.0, 1.0)
    };

    debug!("Parsed TSV: {} lines, {} words", lines.len(), conf_count);
    OcrText { text, confidence }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    fn row(level: u8, block: u32, line: u32, word: u32, conf: &str, text: &str) -> String {
        format!("{level}\t1\t{block}\t1\t{line}\t{word}\t0\t0\t10\t10\t{conf}\t{text}")
    }

    #[test]
    fn test_parse_tsv_rebuilds_lines() {
        let tsv = [
            HEADER.to_string(),
            row(1, 0, 0, 0, "-1", ""),
            row(4, 1, 1, 0, "-1", ""),
            row(5, 1, 1, 1, "90", "Monday"),
            row(5, 1, 2, 1, "80", "9:00-10:00"),
            row(5, 1, 2, 2, "70", "Maths"),
            row(5, 1, 2, 3, "-1", " "),
        ]
        .join("\n");

        let out = parse_tsv(&tsv);
        assert_eq!(out.text, "Monday\n9:00-10:00 Maths");
        assert!((out.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_parse_tsv_orders_blocks() {
        let tsv = [
            HEADER.to_string(),
            row(5, 2, 1, 1, "50", "second"),
            row(5, 1, 1, 1, "50", "first"),
        ]
        .join("\n");
        assert_eq!(parse_tsv(&tsv).text, "first\nsecond");
    }

    #[test]
    fn test_parse_tsv_empty() {
        let out = parse_tsv(HEADER);
        assert_eq!(out.text, "");
        assert_eq!(out.confidence, 0.0);
        assert_eq!(parse_tsv("").text, "");
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let ocr = TesseractOcr::new("/nonexistent/tesseract-binary", "eng");
        let err = ocr.extract_text(Path::new("x.png")).await.unwrap_err();
        assert!(matches!(err, OcrError::EngineUnavailable(_)));
    }

    #[tokio::test]
    async fn test_released_engine_refuses_work() {
        let ocr = TesseractOcr::new("/nonexistent/tesseract-binary", "eng");
        ocr.release().await;
        let err = ocr.extract_text(Path::new("x.png")).await.unwrap_err();
        assert!(matches!(err, OcrError::Released));
    }
}
