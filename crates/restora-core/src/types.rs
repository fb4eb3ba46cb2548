use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::WorkflowError;

/// Stable face identifier assigned by the face service.
///
/// Indices are unique within one detection but may be sparse; they are not
/// array positions.
pub type FaceIndex = u32;

/// The user-chosen input image.
#[derive(Clone)]
pub struct SourceImage {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
    /// Original file name, forwarded to the service on upload.
    pub file_name: Option<String>,
}

impl SourceImage {
    /// Wrap an image payload, rejecting empty or unrecognisable bytes.
    pub fn new(bytes: Vec<u8>, file_name: Option<String>) -> Result<Self, WorkflowError> {
        if bytes.is_empty() {
            return Err(WorkflowError::InvalidImage("empty payload".into()));
        }
        let format = image::guess_format(&bytes)
            .map_err(|e| WorkflowError::InvalidImage(e.to_string()))?;
        Ok(Self {
            bytes,
            format,
            file_name,
        })
    }

    /// MIME type derived from the sniffed format (e.g. `image/png`).
    pub fn mime_type(&self) -> &'static str {
        self.format.to_mime_type()
    }

    /// File name used for the upload form, falling back to `image.<ext>`.
    pub fn upload_name(&self) -> String {
        match &self.file_name {
            Some(name) => name.clone(),
            None => {
                let ext = self.format.extensions_str().first().copied().unwrap_or("bin");
                format!("image.{ext}")
            }
        }
    }
}

impl fmt::Debug for SourceImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceImage")
            .field("bytes", &self.bytes.len())
            .field("format", &self.format)
            .field("file_name", &self.file_name)
            .finish()
    }
}

/// One face crop returned by detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedFace {
    pub index: FaceIndex,
    /// Service-relative path to the cropped face image.
    pub url: String,
}

/// Per-face (or whole-image) quality metrics computed by the service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// Peak signal-to-noise ratio in dB. Higher is sharper.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub psnr: Option<f64>,
    /// Structural similarity, nominally in [0, 1].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssim: Option<f64>,
    /// Learned perceptual distance. Lower is more realistic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lpips: Option<f64>,
}

pub const PSNR_HINT: &str = "Sharpness (~30 to 40+ dB)";
pub const SSIM_HINT: &str = "Structural Similarity (>0.85)";
pub const LPIPS_HINT: &str = "Restoration Quality (<0.30)";

impl Metrics {
    pub fn psnr_label(&self) -> String {
        match self.psnr {
            Some(v) => format!("{v:.2} dB"),
            None => "N/A".into(),
        }
    }

    pub fn ssim_label(&self) -> String {
        fixed4(self.ssim)
    }

    pub fn lpips_label(&self) -> String {
        fixed4(self.lpips)
    }
}

fn fixed4(value: Option<f64>) -> String {
    value.map_or_else(|| "N/A".into(), |v| format!("{v:.4}"))
}

/// A restored face with its metrics and derived ranking score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoredFace {
    /// Index of the detected face this was restored from.
    pub index: FaceIndex,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Metrics>,
    /// Recomputed locally on every restoration; any value sent by the service is ignored.
    #[serde(default)]
    pub score: f64,
}

/// Whole-image merge result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedResult {
    pub url: String,
    /// Absent metrics are stored empty and render as `N/A`.
    pub metrics: Metrics,
    /// Packaged download of the merged image.
    pub artifact_url: String,
}

/// Which operand set an action applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Selected,
    All,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Selected => f.write_str("selected"),
            Mode::All => f.write_str("all"),
        }
    }
}

/// Operation kinds tracked for per-operation mutual exclusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OpKind {
    Detect,
    RestoreSelected,
    RestoreAll,
    DownloadSelected,
    DownloadAll,
    Merge,
}

impl OpKind {
    pub fn restore(mode: Mode) -> Self {
        match mode {
            Mode::Selected => OpKind::RestoreSelected,
            Mode::All => OpKind::RestoreAll,
        }
    }

    pub fn download(mode: Mode) -> Self {
        match mode {
            Mode::Selected => OpKind::DownloadSelected,
            Mode::All => OpKind::DownloadAll,
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OpKind::Detect => "detect",
            OpKind::RestoreSelected => "restore (selected)",
            OpKind::RestoreAll => "restore (all)",
            OpKind::DownloadSelected => "download (selected)",
            OpKind::DownloadAll => "download (all)",
            OpKind::Merge => "merge",
        };
        f.write_str(name)
    }
}
