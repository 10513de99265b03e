//! D-Bus client for the external face-analysis service.
//!
//! Detection and descriptor extraction are not tallyd's business: a
//! separate service owns the models and answers `Analyze` calls with a
//! JSON face list. The blocking proxy variant is used because every call
//! happens on the engine thread, never on the async runtime.

use serde::Deserialize;
use std::time::Duration;
use tally_core::types::{BoundingBox, Descriptor, DetectedFace};
use tally_core::{AnalyzerError, FaceAnalyzer, FramePixels};

// `#[zbus::proxy]` generates both `FaceLensProxy` (async) and
// `FaceLensProxyBlocking`. Only the blocking variant is used here.
#[zbus::proxy(
    interface = "org.freedesktop.FaceLens1",
    default_service = "org.freedesktop.FaceLens1",
    default_path = "/org/freedesktop/FaceLens1"
)]
trait FaceLens {
    /// Analyze one grayscale frame; returns a JSON array of faces.
    fn analyze(&self, frame: Vec<u8>, width: u32, height: u32) -> zbus::Result<String>;
}

/// One face on the wire.
#[derive(Debug, Deserialize)]
struct WireFace {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    descriptor: Vec<f32>,
}

impl From<WireFace> for DetectedFace {
    fn from(face: WireFace) -> Self {
        DetectedFace {
            region: BoundingBox {
                x: face.x,
                y: face.y,
                width: face.width,
                height: face.height,
            },
            descriptor: Descriptor::new(face.descriptor),
        }
    }
}

pub struct FaceLensAnalyzer {
    proxy: FaceLensProxyBlocking<'static>,
}

impl FaceLensAnalyzer {
    /// Connect to the session bus. Connecting does not require the
    /// analyzer service to be up; an absent service surfaces per call and
    /// is absorbed by the tick/enrollment error policy.
    ///
    /// A short method timeout keeps a wedged analyzer from stalling the
    /// detection loop for more than a couple of ticks.
    pub fn connect() -> anyhow::Result<Self> {
        let conn = zbus::blocking::connection::Builder::session()?
            .method_timeout(Duration::from_secs(3))
            .build()?;
        let proxy = FaceLensProxyBlocking::new(&conn)?;
        Ok(Self { proxy })
    }
}

impl FaceAnalyzer for FaceLensAnalyzer {
    fn analyze(&self, frame: &FramePixels) -> Result<Vec<DetectedFace>, AnalyzerError> {
        let json = self
            .proxy
            .analyze(frame.data.clone(), frame.width, frame.height)
            .map_err(|e| AnalyzerError::Unavailable(e.to_string()))?;

        let faces: Vec<WireFace> = serde_json::from_str(&json)
            .map_err(|e| AnalyzerError::Failed(format!("malformed analyzer reply: {e}")))?;

        Ok(faces.into_iter().map(Into::into).collect())
    }
}
