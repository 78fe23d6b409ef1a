use std::io::{Cursor, Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use image::{DynamicImage, GrayImage, ImageFormat};
use tracing::debug;

/// Page layout assumed by one recognition attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayoutMode {
    /// A single line of text.
    SingleLine,
    /// A uniform block of text.
    Block,
    /// Sparse text scattered over the region.
    Sparse,
}

impl LayoutMode {
    /// Tesseract page segmentation mode for this layout.
    pub fn psm(&self) -> u32 {
        match self {
            LayoutMode::SingleLine => 7,
            LayoutMode::Block => 6,
            LayoutMode::Sparse => 11,
        }
    }
}

/// One recognition invocation: layout assumption, character whitelist,
/// language hint and a hard per-call timeout.
#[derive(Clone, Debug)]
pub struct RecognitionRequest<'a> {
    pub layout: LayoutMode,
    pub whitelist: &'a str,
    pub language: &'a str,
    pub timeout: Duration,
}

#[derive(thiserror::Error, Debug)]
pub enum RecognizeError {
    #[error("recognition timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to launch OCR engine: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("OCR engine I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("OCR engine failed: {0}")]
    Engine(String),

    #[error("failed to encode region image: {0}")]
    Encode(#[from] image::ImageError),
}

impl RecognizeError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RecognizeError::Timeout(_))
    }
}

/// External text-recognition capability.
///
/// The pipeline only ever sees this trait; the default implementation
/// drives a `tesseract` subprocess, and tests substitute scripted engines.
pub trait Recognizer: Send + Sync {
    fn recognize(&self, image: &GrayImage, request: &RecognitionRequest) -> Result<String, RecognizeError>;
}

impl<T: Recognizer + ?Sized> Recognizer for std::sync::Arc<T> {
    fn recognize(&self, image: &GrayImage, request: &RecognitionRequest) -> Result<String, RecognizeError> {
        (**self).recognize(image, request)
    }
}

/// Recognizer backed by the `tesseract` command-line binary.
///
/// The region image is piped to the child as PNG on stdin and the
/// recognized text read back from stdout, so no temporary files are
/// involved. Each call is bounded by the request timeout; on expiry the
/// child is killed and a `Timeout` error returned.
pub struct TesseractEngine {
    program: PathBuf,
    dpi: u32,
}

/// How often the child process is polled while waiting for it to exit.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(15);

impl TesseractEngine {
    /// Uses the binary named by `TESSERACT_CMD`, falling back to
    /// `tesseract` on the search path.
    pub fn new() -> Self {
        let program = std::env::var_os("TESSERACT_CMD")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("tesseract"));
        Self { program, dpi: 180 }
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            dpi: 180,
        }
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.dpi = dpi;
        self
    }
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Recognizer for TesseractEngine {
    fn recognize(&self, image: &GrayImage, request: &RecognitionRequest) -> Result<String, RecognizeError> {
        let png = encode_png(image)?;

        let mut child = Command::new(&self.program)
            .arg("stdin")
            .arg("stdout")
            .arg("-l")
            .arg(request.language)
            .arg("--oem")
            .arg("3")
            .arg("--psm")
            .arg(request.layout.psm().to_string())
            .arg("--dpi")
            .arg(self.dpi.to_string())
            .arg("-c")
            .arg(format!("tessedit_char_whitelist={}", request.whitelist))
            .arg("-c")
            .arg("classify_bln_numeric_mode=1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(RecognizeError::Spawn)?;

        if let Some(mut stdin) = child.stdin.take() {
            // The child may exit before consuming the whole stream; the
            // broken pipe then surfaces through its exit status below.
            let _ = stdin.write_all(&png);
        }

        let deadline = Instant::now() + request.timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(RecognizeError::Timeout(request.timeout));
            }
            thread::sleep(WAIT_POLL_INTERVAL);
        };

        let mut stdout = String::new();
        if let Some(mut out) = child.stdout.take() {
            out.read_to_string(&mut stdout)?;
        }

        if !status.success() {
            let mut stderr = String::new();
            if let Some(mut err) = child.stderr.take() {
                let _ = err.read_to_string(&mut stderr);
            }
            return Err(RecognizeError::Engine(stderr.trim().to_string()));
        }

        debug!(psm = request.layout.psm(), len = stdout.len(), "tesseract attempt finished");
        Ok(stdout)
    }
}

fn encode_png(image: &GrayImage) -> Result<Vec<u8>, RecognizeError> {
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(image.clone()).write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn layout_modes_map_to_expected_psm() {
        assert_eq!(LayoutMode::SingleLine.psm(), 7);
        assert_eq!(LayoutMode::Block.psm(), 6);
        assert_eq!(LayoutMode::Sparse.psm(), 11);
    }

    #[test]
    fn missing_binary_reports_spawn_error() {
        let engine = TesseractEngine::with_program("/nonexistent/tesseract-binary");
        let img = GrayImage::from_pixel(8, 8, Luma([255]));
        let request = RecognitionRequest {
            layout: LayoutMode::SingleLine,
            whitelist: "0123456789xX",
            language: "eng",
            timeout: Duration::from_secs(1),
        };
        match engine.recognize(&img, &request) {
            Err(RecognizeError::Spawn(_)) => {}
            other => panic!("expected spawn error, got {other:?}"),
        }
    }

    #[test]
    fn timeout_error_is_classified() {
        let err = RecognizeError::Timeout(Duration::from_secs(1));
        assert!(err.is_timeout());
        assert!(!RecognizeError::Engine("boom".into()).is_timeout());
    }
}
