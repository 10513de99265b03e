//! Seam to the external face-analysis capability.
//!
//! The detection/recognition model is not part of this system: something
//! else turns pixels into face regions with descriptors. Everything here
//! talks to it through [`FaceAnalyzer`] so the kiosk logic can be exercised
//! with synthetic analyzers in tests.

use crate::types::DetectedFace;
use thiserror::Error;

/// A grayscale frame handed to the analyzer (width * height bytes).
#[derive(Debug, Clone)]
pub struct FramePixels {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl FramePixels {
    /// Average pixel brightness (0.0–255.0).
    pub fn mean_brightness(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().map(|&b| b as f32).sum::<f32>() / self.data.len() as f32
    }
}

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("analyzer unavailable: {0}")]
    Unavailable(String),
    #[error("analysis failed: {0}")]
    Failed(String),
}

/// External face detection + descriptor extraction.
///
/// Returns zero or more faces; zero is a normal outcome, not an error.
pub trait FaceAnalyzer {
    fn analyze(&self, frame: &FramePixels) -> Result<Vec<DetectedFace>, AnalyzerError>;
}
