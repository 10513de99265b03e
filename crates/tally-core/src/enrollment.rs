//! Roster construction from labeled sample images.
//!
//! For each configured label we try a fixed number of sample images, run
//! face analysis on each, and keep whatever descriptors come out. One bad
//! sample never takes down the rest of its label, and a label with no
//! usable samples is dropped with a warning rather than failing the load —
//! the kiosk stays usable with a partial roster.

use crate::analyzer::{AnalyzerError, FaceAnalyzer, FramePixels};
use crate::types::Identity;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SampleError {
    #[error("sample not found: {0}")]
    NotFound(String),
    #[error("sample unreadable: {0}")]
    Unreadable(String),
}

/// Source of enrollment sample images, addressed as (label, index).
pub trait SampleSource {
    fn sample(&self, label: &str, index: usize) -> Result<FramePixels, SampleError>;
}

/// Build the known-identity set.
///
/// Labels yielding at least one descriptor become an [`Identity`]; the rest
/// are skipped. The returned roster may be empty — callers decide whether
/// that is fatal.
pub fn load_roster(
    labels: &[String],
    samples_per_label: usize,
    samples: &dyn SampleSource,
    analyzer: &dyn FaceAnalyzer,
) -> Vec<Identity> {
    let mut roster = Vec::with_capacity(labels.len());

    for label in labels {
        let descriptors = collect_descriptors(label, samples_per_label, samples, analyzer);

        match Identity::new(label.clone(), descriptors) {
            Some(identity) => {
                tracing::info!(
                    label = %label,
                    descriptors = identity.descriptors().len(),
                    "enrolled identity"
                );
                roster.push(identity);
            }
            None => {
                tracing::warn!(label = %label, "no usable samples; label dropped from roster");
            }
        }
    }

    tracing::info!(identities = roster.len(), "roster loaded");
    roster
}

/// Per-sample isolation: fetch and analysis failures are logged and
/// skipped, never propagated.
fn collect_descriptors(
    label: &str,
    samples_per_label: usize,
    samples: &dyn SampleSource,
    analyzer: &dyn FaceAnalyzer,
) -> Vec<crate::types::Descriptor> {
    let mut descriptors = Vec::with_capacity(samples_per_label);

    for index in 0..samples_per_label {
        let frame = match samples.sample(label, index) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(label = %label, index, error = %err, "sample fetch failed");
                continue;
            }
        };

        match analyzer.analyze(&frame) {
            Ok(faces) => match faces.into_iter().next() {
                Some(face) => descriptors.push(face.descriptor),
                None => {
                    tracing::warn!(label = %label, index, "no face in sample");
                }
            },
            Err(AnalyzerError::Unavailable(err)) => {
                tracing::warn!(label = %label, index, error = %err, "analyzer unavailable");
            }
            Err(err) => {
                tracing::warn!(label = %label, index, error = %err, "sample analysis failed");
            }
        }
    }

    descriptors
}
