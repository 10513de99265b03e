use std::path::PathBuf;
use tally_core::{Coordinates, Geofence};

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Path to the SQLite attendance database.
    pub db_path: PathBuf,
    /// Directory of enrollment samples, one subdirectory per label.
    pub sample_dir: PathBuf,
    /// TOML roster file listing the enrolled labels.
    pub roster_path: PathBuf,
    /// Geofence around the kiosk's target coordinate.
    pub geofence: Geofence,
    /// Maximum descriptor distance for an accepted match.
    pub match_threshold: f32,
    /// Detection tick interval in milliseconds.
    pub tick_ms: u64,
    /// Sample images attempted per roster label.
    pub samples_per_label: usize,
}

impl Config {
    /// Load configuration from `TALLY_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("tally");

        let db_path = std::env::var("TALLY_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("attendance.db"));
        let sample_dir = std::env::var("TALLY_SAMPLE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("samples"));
        let roster_path = std::env::var("TALLY_ROSTER_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("roster.toml"));

        let target = Coordinates::new(
            env_f64("TALLY_TARGET_LAT", 13.101308),
            env_f64("TALLY_TARGET_LON", 80.200307),
        );

        Self {
            camera_device: std::env::var("TALLY_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            db_path,
            sample_dir,
            roster_path,
            geofence: Geofence::new(target, env_f64("TALLY_GEOFENCE_RADIUS_M", 50.0)),
            match_threshold: env_f32("TALLY_MATCH_THRESHOLD", 0.55),
            tick_ms: env_u64("TALLY_TICK_MS", 1000),
            samples_per_label: env_usize("TALLY_SAMPLES_PER_LABEL", 3),
        }
    }
}

/// Roster file: the fixed list of known labels.
///
/// ```toml
/// labels = ["ajith_kumar", "daniel"]
/// ```
#[derive(Debug, serde::Deserialize)]
pub struct Roster {
    pub labels: Vec<String>,
}

impl Roster {
    /// Load the roster file. A missing or malformed roster is not fatal to
    /// the daemon — callers log and continue with an empty label set, and
    /// session start is refused until the roster is fixed.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roster_parses_label_list() {
        let roster: Roster = toml::from_str(r#"labels = ["ajith_kumar", "daniel"]"#).unwrap();
        assert_eq!(roster.labels, vec!["ajith_kumar", "daniel"]);
    }

    #[test]
    fn roster_rejects_missing_labels_key() {
        assert!(toml::from_str::<Roster>("people = []").is_err());
    }
}
