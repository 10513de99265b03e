//! Detection session — the timer-driven loop that decides when an
//! attendance event may fire.
//!
//! The session is an explicit object owning every moving part the loop
//! touches: frame source, analyzer, roster cache, geofence gate and the
//! attendance ledger. One owner drives `tick` with `&mut self`, so ticks
//! can never overlap. The driving cadence (1 s in production) belongs to
//! the caller.

use crate::analyzer::{AnalyzerError, FaceAnalyzer, FramePixels};
use crate::enrollment::{self, SampleSource};
use crate::geofence::{Geofence, GeofenceReading, PositionSource};
use crate::ledger::{AttendanceLedger, AttendanceRecord, MarkOutcome, StoreError};
use crate::types::{Identity, Matcher, NearestMatcher};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("camera unavailable: {0}")]
    Unavailable(String),
    #[error("capture failed: {0}")]
    Failed(String),
}

/// Live frame acquisition. `release` must be safe to call in any state,
/// any number of times.
pub trait FrameSource {
    fn acquire(&mut self) -> Result<(), CaptureError>;
    fn grab(&mut self) -> Result<FramePixels, CaptureError>;
    fn release(&mut self);
}

/// `Stopped` is the single terminal state; a stopped session is re-entered
/// only through a fresh `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Running,
    Stopped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Starting => "starting",
            SessionState::Running => "running",
            SessionState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Why a start request was refused. Each reason is independent and clears
/// only through a state change (new location fix, reset, stop, new
/// samples) — retrying without one yields the same refusal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StartRefusal {
    #[error("no identities enrolled; check sample images")]
    EmptyRoster,
    #[error("attendance already marked today")]
    AlreadyMarked,
    #[error("detection already running")]
    AlreadyRunning,
    #[error("too far from target: {distance_m:.1} m")]
    OutOfRange { distance_m: f64 },
    #[error("location unavailable")]
    NoLocation,
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("start refused: {0}")]
    Refused(#[from] StartRefusal),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Analyzer(#[from] AnalyzerError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What one tick did. Everything except `Marked` leaves no trace.
#[derive(Debug)]
pub enum TickOutcome {
    /// Session is not running; nothing happened.
    NotRunning,
    /// Attendance landed through another path; the session stopped itself.
    AlreadyMarked,
    /// The tick failed and was absorbed; the loop keeps running.
    Skipped,
    /// No face in the frame. Deliberate no-op, not a failure.
    NoFaces,
    /// A face was found but nobody in the roster is close enough.
    Unknown { distance: f32 },
    /// Match accepted and attendance committed; the session stopped itself.
    Marked(AttendanceRecord),
}

/// Tunables for a session; defaults match the deployed kiosk.
pub struct SessionConfig {
    pub labels: Vec<String>,
    pub samples_per_label: usize,
    pub match_threshold: f32,
    pub geofence: Geofence,
}

pub struct KioskSession {
    config: SessionConfig,
    frames: Box<dyn FrameSource + Send>,
    analyzer: Box<dyn FaceAnalyzer + Send>,
    samples: Box<dyn SampleSource + Send>,
    position: Box<dyn PositionSource + Send>,
    ledger: AttendanceLedger,
    matcher: NearestMatcher,
    /// Lazily built on first successful start, then cached for the life of
    /// the process. A load that produces nothing is not cached, so fixing
    /// the sample images and retrying works.
    roster: Option<Vec<Identity>>,
    state: SessionState,
}

impl KioskSession {
    pub fn new(
        config: SessionConfig,
        frames: Box<dyn FrameSource + Send>,
        analyzer: Box<dyn FaceAnalyzer + Send>,
        samples: Box<dyn SampleSource + Send>,
        position: Box<dyn PositionSource + Send>,
        ledger: AttendanceLedger,
    ) -> Self {
        Self {
            config,
            frames,
            analyzer,
            samples,
            position,
            ledger,
            matcher: NearestMatcher,
            roster: None,
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn ledger(&self) -> &AttendanceLedger {
        &self.ledger
    }

    /// Geofence verdict for the latest position fix, if there is one.
    pub fn geofence_reading(&self) -> Option<GeofenceReading> {
        self.position
            .latest()
            .map(|pos| self.config.geofence.evaluate(pos))
    }

    /// Attempt the `Idle/Stopped → Running` transition.
    ///
    /// All preconditions are checked before the camera is touched; a
    /// refusal changes no state. Camera acquisition failure lands in
    /// `Stopped` with resources released.
    pub fn start(&mut self) -> Result<(), SessionError> {
        if matches!(self.state, SessionState::Starting | SessionState::Running) {
            return Err(StartRefusal::AlreadyRunning.into());
        }
        if self.ledger.is_marked_today()? {
            return Err(StartRefusal::AlreadyMarked.into());
        }
        match self.geofence_reading() {
            None => return Err(StartRefusal::NoLocation.into()),
            Some(reading) if !reading.in_range => {
                return Err(StartRefusal::OutOfRange {
                    distance_m: reading.distance_m,
                }
                .into());
            }
            Some(_) => {}
        }
        if self.roster_or_load().is_empty() {
            return Err(StartRefusal::EmptyRoster.into());
        }

        self.state = SessionState::Starting;
        if let Err(err) = self.frames.acquire() {
            tracing::error!(error = %err, "camera acquisition failed");
            self.stop();
            return Err(err.into());
        }

        self.state = SessionState::Running;
        tracing::info!("detection session running");
        Ok(())
    }

    /// One detection tick. Every failure inside a tick is absorbed here:
    /// a bad frame, analyzer error or store hiccup skips the tick and the
    /// next one still runs.
    pub fn tick(&mut self) -> TickOutcome {
        if self.state != SessionState::Running {
            return TickOutcome::NotRunning;
        }

        match self.run_tick() {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(error = %err, "tick skipped");
                TickOutcome::Skipped
            }
        }
    }

    fn run_tick(&mut self) -> Result<TickOutcome, SessionError> {
        // Attendance may have landed through reset-then-mark or another
        // control path since the last tick. Re-check before any capture.
        if self.ledger.is_marked_today()? {
            tracing::info!("attendance marked elsewhere; stopping session");
            self.stop();
            return Ok(TickOutcome::AlreadyMarked);
        }

        let frame = self.frames.grab()?;
        let faces = self.analyzer.analyze(&frame)?;

        // Single-candidate policy: only the first face is considered.
        // Multi-person frames are a deliberate simplification, not a bug.
        let Some(face) = faces.into_iter().next() else {
            return Ok(TickOutcome::NoFaces);
        };

        let roster = self.roster.as_deref().unwrap_or(&[]);
        let result = self
            .matcher
            .best_match(&face.descriptor, roster, self.config.match_threshold);

        let Some(label) = result.label.filter(|_| result.is_known) else {
            tracing::debug!(distance = result.distance, "face not recognized");
            return Ok(TickOutcome::Unknown {
                distance: result.distance,
            });
        };

        tracing::info!(label = %label, distance = result.distance, "match accepted");
        match self.ledger.mark(&label)? {
            MarkOutcome::Marked(record) => {
                self.stop();
                Ok(TickOutcome::Marked(record))
            }
            MarkOutcome::AlreadyMarked => {
                self.stop();
                Ok(TickOutcome::AlreadyMarked)
            }
        }
    }

    /// Release the camera and enter the terminal state. Safe to call in
    /// any state, any number of times; every stop path goes through here.
    pub fn stop(&mut self) {
        self.frames.release();
        if self.state != SessionState::Stopped {
            tracing::debug!(from = %self.state, "session stopped");
            self.state = SessionState::Stopped;
        }
    }

    /// Clear persisted attendance state, stopping the loop first so a
    /// running session cannot re-mark mid-reset.
    pub fn reset(&mut self) -> Result<(), StoreError> {
        self.stop();
        self.ledger.reset()
    }

    fn roster_or_load(&mut self) -> &[Identity] {
        if self.roster.is_none() {
            let roster = enrollment::load_roster(
                &self.config.labels,
                self.config.samples_per_label,
                self.samples.as_ref(),
                self.analyzer.as_ref(),
            );
            if roster.is_empty() {
                return &[];
            }
            self.roster = Some(roster);
        }
        self.roster.as_deref().unwrap_or(&[])
    }
}
