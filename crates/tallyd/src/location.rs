//! Continuous device location via GeoClue2.
//!
//! The desktop analog of a browser's `watchPosition`: subscribe once,
//! push every fix into a last-value-wins watch channel. If the
//! subscription cannot be established or dies, the channel stays at its
//! last value and a fresh process stays at `None` — the distance gate
//! fails closed, it never fails open.

use tally_core::{Coordinates, PositionSource};
use tokio::sync::watch;
use zbus::zvariant::{ObjectPath, OwnedObjectPath};

#[zbus::proxy(
    interface = "org.freedesktop.GeoClue2.Manager",
    default_service = "org.freedesktop.GeoClue2",
    default_path = "/org/freedesktop/GeoClue2/Manager"
)]
trait Manager {
    fn get_client(&self) -> zbus::Result<OwnedObjectPath>;
}

#[zbus::proxy(
    interface = "org.freedesktop.GeoClue2.Client",
    default_service = "org.freedesktop.GeoClue2"
)]
trait Client {
    fn start(&self) -> zbus::Result<()>;

    #[zbus(property)]
    fn set_desktop_id(&self, id: &str) -> zbus::Result<()>;

    /// Minimum movement (meters) between updates.
    #[zbus(property)]
    fn set_distance_threshold(&self, meters: u32) -> zbus::Result<()>;

    #[zbus(signal)]
    fn location_updated(
        &self,
        old_location: ObjectPath<'_>,
        new_location: ObjectPath<'_>,
    ) -> zbus::Result<()>;
}

#[zbus::proxy(
    interface = "org.freedesktop.GeoClue2.Location",
    default_service = "org.freedesktop.GeoClue2"
)]
trait Location {
    #[zbus(property)]
    fn latitude(&self) -> zbus::Result<f64>;

    #[zbus(property)]
    fn longitude(&self) -> zbus::Result<f64>;
}

/// Adapter from the watch channel to the core's position seam.
pub struct WatchedPosition(watch::Receiver<Option<Coordinates>>);

impl WatchedPosition {
    pub fn new(rx: watch::Receiver<Option<Coordinates>>) -> Self {
        Self(rx)
    }
}

impl PositionSource for WatchedPosition {
    fn latest(&self) -> Option<Coordinates> {
        *self.0.borrow()
    }
}

/// Spawn the location watcher on its own OS thread (blocking zbus; it
/// never touches the async runtime). Failure is terminal for location
/// only: one warning, channel untouched, the rest of the kiosk keeps
/// working with the start gate closed.
pub fn spawn_watcher(tx: watch::Sender<Option<Coordinates>>) {
    std::thread::Builder::new()
        .name("tally-location".into())
        .spawn(move || {
            if let Err(err) = watch_position(&tx) {
                tracing::warn!(error = %err, "location unavailable; distance gate stays closed");
            }
        })
        .expect("failed to spawn location thread");
}

fn watch_position(tx: &watch::Sender<Option<Coordinates>>) -> anyhow::Result<()> {
    let conn = zbus::blocking::Connection::system()?;

    let manager = ManagerProxyBlocking::new(&conn)?;
    let client_path = manager.get_client()?;
    let client = ClientProxyBlocking::builder(&conn)
        .path(client_path)?
        .build()?;

    client.set_desktop_id("tally")?;
    client.set_distance_threshold(5)?;

    let updates = client.receive_location_updated()?;
    client.start()?;
    tracing::info!("location subscription started");

    for signal in updates {
        let args = signal.args()?;
        let location = LocationProxyBlocking::builder(&conn)
            .path(args.new_location().to_owned())?
            .build()?;

        let fix = Coordinates::new(location.latitude()?, location.longitude()?);
        tracing::debug!(
            latitude = fix.latitude,
            longitude = fix.longitude,
            "location fix"
        );

        if tx.send(Some(fix)).is_err() {
            break;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watched_position_tracks_the_channel() {
        let (tx, rx) = watch::channel(None);
        let position = WatchedPosition::new(rx);

        assert_eq!(position.latest(), None);

        tx.send(Some(Coordinates::new(13.1, 80.2))).unwrap();
        assert_eq!(position.latest(), Some(Coordinates::new(13.1, 80.2)));

        // Last value wins; no history.
        tx.send(Some(Coordinates::new(13.2, 80.2))).unwrap();
        assert_eq!(position.latest(), Some(Coordinates::new(13.2, 80.2)));
    }

    #[test]
    fn no_fix_is_never_in_range() {
        let (_tx, rx) = watch::channel(None);
        let position = WatchedPosition::new(rx);
        // The gate reads this as "location unavailable", not "in range".
        assert!(position.latest().is_none());
    }
}
