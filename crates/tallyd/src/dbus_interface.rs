use crate::engine::{EngineError, EngineHandle};
use zbus::interface;

/// D-Bus interface for the attendance kiosk daemon.
///
/// Bus name: org.freedesktop.Tally1
/// Object path: /org/freedesktop/Tally1
pub struct TallyService {
    engine: EngineHandle,
}

impl TallyService {
    pub fn new(engine: EngineHandle) -> Self {
        Self { engine }
    }
}

fn to_fdo(err: EngineError) -> zbus::fdo::Error {
    zbus::fdo::Error::Failed(err.to_string())
}

#[interface(name = "org.freedesktop.Tally1")]
impl TallyService {
    /// Start the detection session. Fails with the refusal reason when a
    /// precondition does not hold (already marked, out of range, ...).
    async fn start(&self) -> zbus::fdo::Result<String> {
        tracing::info!("start requested");
        self.engine.start().await.map_err(to_fdo)?;
        Ok("detection started".into())
    }

    /// Stop a running detection session. A no-op when nothing runs.
    async fn stop(&self) -> zbus::fdo::Result<()> {
        tracing::info!("stop requested");
        self.engine.stop().await.map_err(to_fdo)
    }

    /// Clear all attendance state, stopping the session first.
    async fn reset(&self) -> zbus::fdo::Result<()> {
        tracing::info!("reset requested");
        self.engine.reset().await.map_err(to_fdo)
    }

    /// Kiosk status as JSON: session state, geofence reading, today's mark.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let report = self.engine.status().await.map_err(to_fdo)?;
        serde_json::to_string(&report)
            .map_err(|e| zbus::fdo::Error::Failed(format!("status serialization: {e}")))
    }

    /// Attendance history as a JSON array, newest first.
    async fn log(&self) -> zbus::fdo::Result<String> {
        let history = self.engine.history().await.map_err(to_fdo)?;
        serde_json::to_string(&history)
            .map_err(|e| zbus::fdo::Error::Failed(format!("log serialization: {e}")))
    }
}
