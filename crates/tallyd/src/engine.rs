//! Engine thread — single owner of the camera, session and store.
//!
//! D-Bus handlers never touch the session directly; they send requests
//! over a channel and await a reply. While the session runs, the channel
//! receive doubles as the tick timer: wait up to one tick interval for a
//! command, and on timeout run one detection tick. A tick therefore always
//! completes before the next one can fire.

use serde::Serialize;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};
use tally_core::{AttendanceRecord, GeofenceReading, KioskSession, SessionState, TickOutcome};
use thiserror::Error;
use tokio::sync::oneshot;

#[derive(Error, Debug)]
pub enum EngineError {
    /// The request was handled and turned down; the message is user-facing.
    #[error("{0}")]
    Rejected(String),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Snapshot of everything the kiosk UI shows.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub state: String,
    pub marked_today: bool,
    pub record: Option<AttendanceRecord>,
    pub geofence: Option<GeofenceReading>,
}

enum EngineRequest {
    Start {
        reply: oneshot::Sender<Result<(), String>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    Reset {
        reply: oneshot::Sender<Result<(), String>>,
    },
    Status {
        reply: oneshot::Sender<StatusReport>,
    },
    History {
        reply: oneshot::Sender<Result<Vec<AttendanceRecord>, String>>,
    },
}

/// Handle to the engine thread, shareable across D-Bus handlers.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> EngineRequest,
    ) -> Result<oneshot::Receiver<T>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .map_err(|_| EngineError::ChannelClosed)?;
        Ok(reply_rx)
    }

    pub async fn start(&self) -> Result<(), EngineError> {
        let rx = self.request(|reply| EngineRequest::Start { reply })?;
        rx.await
            .map_err(|_| EngineError::ChannelClosed)?
            .map_err(EngineError::Rejected)
    }

    pub async fn stop(&self) -> Result<(), EngineError> {
        let rx = self.request(|reply| EngineRequest::Stop { reply })?;
        rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    pub async fn reset(&self) -> Result<(), EngineError> {
        let rx = self.request(|reply| EngineRequest::Reset { reply })?;
        rx.await
            .map_err(|_| EngineError::ChannelClosed)?
            .map_err(EngineError::Rejected)
    }

    pub async fn status(&self) -> Result<StatusReport, EngineError> {
        let rx = self.request(|reply| EngineRequest::Status { reply })?;
        rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    pub async fn history(&self) -> Result<Vec<AttendanceRecord>, EngineError> {
        let rx = self.request(|reply| EngineRequest::History { reply })?;
        rx.await
            .map_err(|_| EngineError::ChannelClosed)?
            .map_err(EngineError::Rejected)
    }
}

/// Spawn the engine on a dedicated OS thread.
pub fn spawn_engine(session: KioskSession, tick_interval: Duration) -> EngineHandle {
    let (tx, rx) = mpsc::channel::<EngineRequest>();

    std::thread::Builder::new()
        .name("tally-engine".into())
        .spawn(move || run_engine(session, rx, tick_interval))
        .expect("failed to spawn engine thread");

    EngineHandle { tx }
}

fn run_engine(mut session: KioskSession, rx: mpsc::Receiver<EngineRequest>, tick: Duration) {
    tracing::info!("engine thread started");
    let mut next_tick = Instant::now() + tick;

    loop {
        let request = if session.state() == SessionState::Running {
            // Wait only until the absolute deadline: a request arriving
            // mid-window consumes the remaining time instead of restarting
            // it, so frequent status polls cannot postpone the tick.
            match rx.recv_timeout(next_tick.saturating_duration_since(Instant::now())) {
                Ok(request) => Some(request),
                Err(RecvTimeoutError::Timeout) => {
                    run_tick(&mut session);
                    next_tick = Instant::now() + tick;
                    None
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        } else {
            match rx.recv() {
                Ok(request) => {
                    next_tick = Instant::now() + tick;
                    Some(request)
                }
                Err(_) => break,
            }
        };

        if let Some(request) = request {
            handle_request(&mut session, request);
        }
    }

    // All handles dropped; make sure the camera is not left open.
    session.stop();
    tracing::info!("engine thread exiting");
}

fn run_tick(session: &mut KioskSession) {
    match session.tick() {
        TickOutcome::Marked(record) => {
            tracing::info!(name = %record.name, "attendance committed; session complete");
        }
        TickOutcome::Unknown { distance } => {
            tracing::debug!(distance, "unrecognized face discarded");
        }
        TickOutcome::NoFaces
        | TickOutcome::Skipped
        | TickOutcome::AlreadyMarked
        | TickOutcome::NotRunning => {}
    }
}

fn handle_request(session: &mut KioskSession, request: EngineRequest) {
    match request {
        EngineRequest::Start { reply } => {
            let result = session.start().map_err(|err| {
                tracing::info!(reason = %err, "start refused");
                err.to_string()
            });
            let _ = reply.send(result);
        }
        EngineRequest::Stop { reply } => {
            session.stop();
            let _ = reply.send(());
        }
        EngineRequest::Reset { reply } => {
            let _ = reply.send(session.reset().map_err(|err| err.to_string()));
        }
        EngineRequest::Status { reply } => {
            let ledger = session.ledger();
            let report = StatusReport {
                state: session.state().to_string(),
                marked_today: ledger.is_marked_today().unwrap_or(false),
                record: ledger.current().ok().flatten(),
                geofence: session.geofence_reading(),
            };
            let _ = reply.send(report);
        }
        EngineRequest::History { reply } => {
            let _ = reply.send(session.ledger().history().map_err(|err| err.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tally_core::analyzer::{AnalyzerError, FaceAnalyzer, FramePixels};
    use tally_core::enrollment::{SampleError, SampleSource};
    use tally_core::geofence::PositionSource;
    use tally_core::ledger::AttendanceLedger;
    use tally_core::session::{CaptureError, FrameSource, SessionConfig};
    use tally_core::types::{BoundingBox, Descriptor, DetectedFace};
    use tally_core::{Coordinates, Geofence, SystemClock};

    struct NoCamera;

    impl FrameSource for NoCamera {
        fn acquire(&mut self) -> Result<(), CaptureError> {
            Err(CaptureError::Unavailable("no camera in tests".into()))
        }
        fn grab(&mut self) -> Result<FramePixels, CaptureError> {
            Err(CaptureError::Failed("no camera in tests".into()))
        }
        fn release(&mut self) {}
    }

    struct NoFaces;

    impl FaceAnalyzer for NoFaces {
        fn analyze(&self, _frame: &FramePixels) -> Result<Vec<DetectedFace>, AnalyzerError> {
            Ok(vec![])
        }
    }

    struct NoSamples;

    impl SampleSource for NoSamples {
        fn sample(&self, label: &str, _index: usize) -> Result<FramePixels, SampleError> {
            Err(SampleError::NotFound(label.to_string()))
        }
    }

    struct NoFix;

    impl PositionSource for NoFix {
        fn latest(&self) -> Option<Coordinates> {
            None
        }
    }

    fn offline_engine() -> EngineHandle {
        let store = crate::store::SqliteStore::open_in_memory().unwrap();
        let session = KioskSession::new(
            SessionConfig {
                labels: vec!["daniel".into()],
                samples_per_label: 3,
                match_threshold: 0.55,
                geofence: Geofence::new(Coordinates::new(13.101308, 80.200307), 50.0),
            },
            Box::new(NoCamera),
            Box::new(NoFaces),
            Box::new(NoSamples),
            Box::new(NoFix),
            AttendanceLedger::new(Box::new(store), Box::new(SystemClock)),
        );
        spawn_engine(session, Duration::from_millis(10))
    }

    #[tokio::test]
    async fn start_without_location_is_rejected_with_reason() {
        let engine = offline_engine();
        let err = engine.start().await.unwrap_err();
        match err {
            EngineError::Rejected(reason) => assert!(reason.contains("location unavailable")),
            other => panic!("expected Rejected, got {other}"),
        }
    }

    #[tokio::test]
    async fn status_reports_idle_and_unmarked() {
        let engine = offline_engine();
        let status = engine.status().await.unwrap();
        assert_eq!(status.state, "idle");
        assert!(!status.marked_today);
        assert!(status.record.is_none());
        assert!(status.geofence.is_none());
    }

    #[tokio::test]
    async fn stop_and_reset_succeed_on_an_idle_session() {
        let engine = offline_engine();
        engine.stop().await.unwrap();
        engine.reset().await.unwrap();
        assert!(engine.history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn dropped_handle_shuts_the_engine_down() {
        let engine = offline_engine();
        let clone = engine.clone();
        drop(engine);
        // The remaining handle still works; the thread exits only when the
        // last sender goes away.
        clone.status().await.unwrap();
    }

    #[test]
    fn handle_is_shareable_across_async_tasks() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EngineHandle>();
    }

    struct StubCamera;

    impl FrameSource for StubCamera {
        fn acquire(&mut self) -> Result<(), CaptureError> {
            Ok(())
        }
        fn grab(&mut self) -> Result<FramePixels, CaptureError> {
            Ok(FramePixels {
                data: vec![0],
                width: 1,
                height: 1,
            })
        }
        fn release(&mut self) {}
    }

    /// First call enrolls the reference face; every later call returns a
    /// face too far away to match, so the session keeps running.
    struct CountingAnalyzer {
        calls: Arc<AtomicUsize>,
    }

    impl FaceAnalyzer for CountingAnalyzer {
        fn analyze(&self, _frame: &FramePixels) -> Result<Vec<DetectedFace>, AnalyzerError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let values = if n == 0 {
                vec![1.0, 0.0]
            } else {
                vec![9.0, 9.0]
            };
            Ok(vec![DetectedFace {
                region: BoundingBox {
                    x: 0.0,
                    y: 0.0,
                    width: 10.0,
                    height: 10.0,
                },
                descriptor: Descriptor::new(values),
            }])
        }
    }

    struct OneSample;

    impl SampleSource for OneSample {
        fn sample(&self, _label: &str, _index: usize) -> Result<FramePixels, SampleError> {
            Ok(FramePixels {
                data: vec![0],
                width: 1,
                height: 1,
            })
        }
    }

    struct AtTarget;

    impl PositionSource for AtTarget {
        fn latest(&self) -> Option<Coordinates> {
            Some(Coordinates::new(13.101308, 80.200307))
        }
    }

    #[tokio::test]
    async fn frequent_status_polls_do_not_starve_the_tick() {
        let calls = Arc::new(AtomicUsize::new(0));
        let store = crate::store::SqliteStore::open_in_memory().unwrap();
        let session = KioskSession::new(
            SessionConfig {
                labels: vec!["daniel".into()],
                samples_per_label: 1,
                match_threshold: 0.55,
                geofence: Geofence::new(Coordinates::new(13.101308, 80.200307), 50.0),
            },
            Box::new(StubCamera),
            Box::new(CountingAnalyzer {
                calls: calls.clone(),
            }),
            Box::new(OneSample),
            Box::new(AtTarget),
            AttendanceLedger::new(Box::new(store), Box::new(SystemClock)),
        );

        let engine = spawn_engine(session, Duration::from_millis(25));
        engine.start().await.unwrap();
        let after_enrollment = calls.load(Ordering::SeqCst);

        // Poll status faster than the tick interval for several intervals.
        for _ in 0..20 {
            engine.status().await.unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(
            calls.load(Ordering::SeqCst) > after_enrollment,
            "no detection tick ran while status was being polled"
        );
    }
}
