//! tally-core — Attendance kiosk domain logic.
//!
//! Face matching, geofence gating, enrollment loading and the daily
//! attendance state machine. All device and storage access goes through
//! traits so the whole loop runs against synthetic sources in tests.

pub mod analyzer;
pub mod enrollment;
pub mod geofence;
pub mod ledger;
pub mod session;
pub mod types;

pub use analyzer::{AnalyzerError, FaceAnalyzer, FramePixels};
pub use geofence::{Coordinates, Geofence, GeofenceReading, PositionSource};
pub use ledger::{AttendanceLedger, AttendanceRecord, AttendanceStore, Clock, SystemClock};
pub use session::{KioskSession, SessionConfig, SessionState, StartRefusal, TickOutcome};
pub use types::{Descriptor, DetectedFace, Identity, MatchResult, Matcher, NearestMatcher};
