use serde::{Deserialize, Serialize};

/// Bounding region for a detected face, in pixel coordinates.
///
/// Carried for status/debug display only; matching uses the descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Face descriptor vector (typically 128-dimensional).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub values: Vec<f32>,
}

impl Descriptor {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Euclidean distance between two descriptors.
    ///
    /// Dimensions beyond the shorter vector are ignored; descriptors from
    /// the same analyzer always have equal length.
    pub fn distance(&self, other: &Descriptor) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// One face found in a frame: where it is, and who it might be.
/// Lives for a single detection tick.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub region: BoundingBox,
    pub descriptor: Descriptor,
}

/// An enrolled person: a label plus at least one reference descriptor.
///
/// The "at least one" invariant is enforced at construction — a label whose
/// samples all failed extraction never becomes an `Identity`.
#[derive(Debug, Clone)]
pub struct Identity {
    label: String,
    descriptors: Vec<Descriptor>,
}

impl Identity {
    /// Returns `None` when `descriptors` is empty.
    pub fn new(label: impl Into<String>, descriptors: Vec<Descriptor>) -> Option<Self> {
        if descriptors.is_empty() {
            return None;
        }
        Some(Self {
            label: label.into(),
            descriptors,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }
}

/// Result of matching a probe descriptor against a roster.
#[derive(Debug, Clone)]
pub struct MatchResult {
    /// Label of the nearest identity, if the roster was non-empty and the
    /// distance was within the acceptance threshold.
    pub label: Option<String>,
    /// Euclidean distance to the nearest reference descriptor.
    pub distance: f32,
    /// Whether the nearest identity is close enough to accept.
    pub is_known: bool,
}

impl MatchResult {
    fn unknown(distance: f32) -> Self {
        Self {
            label: None,
            distance,
            is_known: false,
        }
    }
}

/// Strategy for matching a probe descriptor against an enrolled roster.
pub trait Matcher {
    fn best_match(&self, probe: &Descriptor, roster: &[Identity], threshold: f32) -> MatchResult;
}

/// Nearest-neighbor matcher over every reference descriptor of every
/// identity. Lower distance is better; a probe farther than `threshold`
/// from everything is unknown regardless of which identity was nearest.
/// Ties go to the first identity encountered.
pub struct NearestMatcher;

impl Matcher for NearestMatcher {
    fn best_match(&self, probe: &Descriptor, roster: &[Identity], threshold: f32) -> MatchResult {
        let mut best_distance = f32::INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, identity) in roster.iter().enumerate() {
            for reference in identity.descriptors() {
                let d = probe.distance(reference);
                if d < best_distance {
                    best_distance = d;
                    best_idx = Some(i);
                }
            }
        }

        match best_idx {
            Some(idx) if best_distance <= threshold => MatchResult {
                label: Some(roster[idx].label().to_string()),
                distance: best_distance,
                is_known: true,
            },
            Some(_) => MatchResult::unknown(best_distance),
            None => MatchResult::unknown(f32::INFINITY),
        }
    }
}
