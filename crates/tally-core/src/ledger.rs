//! Daily attendance state machine.
//!
//! One attendance record may be active per device-local calendar day, no
//! matter whose it is. The day comparison is by calendar date only, and the
//! notion of "today" is injectable so tests can roll the clock.

use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Source of the current wall-clock time and calendar day.
pub trait Clock: Send {
    fn now(&self) -> DateTime<Local>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Device-local system time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// A committed attendance event. Never mutated; only replaced by reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub name: String,
    pub timestamp: DateTime<Local>,
    pub day: NaiveDate,
}

/// Persistence for the active record plus an append-only history.
pub trait AttendanceStore: Send {
    /// The currently active record, if any.
    fn current(&self) -> Result<Option<AttendanceRecord>, StoreError>;
    /// Persist `record` as the active record and append it to history as
    /// one unit. A failed commit must leave neither half behind.
    fn commit(&self, record: &AttendanceRecord) -> Result<(), StoreError>;
    /// Clear all attendance state. Blunt on purpose: history goes too.
    fn clear(&self) -> Result<(), StoreError>;
    /// Full history, newest first.
    fn history(&self) -> Result<Vec<AttendanceRecord>, StoreError>;
}

/// Outcome of a mark attempt.
#[derive(Debug)]
pub enum MarkOutcome {
    Marked(AttendanceRecord),
    AlreadyMarked,
}

/// Owns the once-per-day guard around the store.
pub struct AttendanceLedger {
    store: Box<dyn AttendanceStore>,
    clock: Box<dyn Clock>,
}

impl AttendanceLedger {
    pub fn new(store: Box<dyn AttendanceStore>, clock: Box<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Whether an attendance record is active for the current calendar day.
    pub fn is_marked_today(&self) -> Result<bool, StoreError> {
        let today = self.clock.today();
        Ok(self
            .store
            .current()?
            .is_some_and(|record| record.day == today))
    }

    /// Idempotent mark: a no-op when today's attendance already landed.
    /// On first success the record and its history entry land in a single
    /// store commit, so no later observer can see a half-written state.
    pub fn mark(&self, label: &str) -> Result<MarkOutcome, StoreError> {
        if self.is_marked_today()? {
            return Ok(MarkOutcome::AlreadyMarked);
        }

        let now = self.clock.now();
        let record = AttendanceRecord {
            name: label.to_string(),
            timestamp: now,
            day: now.date_naive(),
        };

        self.store.commit(&record)?;

        tracing::info!(name = %record.name, timestamp = %record.timestamp, "attendance marked");
        Ok(MarkOutcome::Marked(record))
    }

    /// Unconditionally clears persisted attendance state. Does not touch a
    /// running detection session; see `KioskSession::reset`.
    pub fn reset(&self) -> Result<(), StoreError> {
        self.store.clear()?;
        tracing::info!("attendance state reset");
        Ok(())
    }

    pub fn current(&self) -> Result<Option<AttendanceRecord>, StoreError> {
        self.store.current()
    }

    pub fn history(&self) -> Result<Vec<AttendanceRecord>, StoreError> {
        self.store.history()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::TimeZone;
    use std::sync::{Arc, Mutex};

    /// Settable clock shared between a test and the ledger under test.
    #[derive(Clone)]
    pub struct ManualClock(pub Arc<Mutex<DateTime<Local>>>);

    impl ManualClock {
        pub fn at(year: i32, month: u32, day: u32) -> Self {
            let t = Local.with_ymd_and_hms(year, month, day, 9, 0, 0).unwrap();
            Self(Arc::new(Mutex::new(t)))
        }

        pub fn set(&self, year: i32, month: u32, day: u32) {
            *self.0.lock().unwrap() = Local.with_ymd_and_hms(year, month, day, 9, 0, 0).unwrap();
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Local> {
            *self.0.lock().unwrap()
        }
    }

    /// In-memory store double.
    #[derive(Clone, Default)]
    pub struct MemoryStore {
        inner: Arc<Mutex<MemoryStoreInner>>,
    }

    #[derive(Default)]
    struct MemoryStoreInner {
        current: Option<AttendanceRecord>,
        history: Vec<AttendanceRecord>,
    }

    impl AttendanceStore for MemoryStore {
        fn current(&self) -> Result<Option<AttendanceRecord>, StoreError> {
            Ok(self.inner.lock().unwrap().current.clone())
        }

        fn commit(&self, record: &AttendanceRecord) -> Result<(), StoreError> {
            let mut inner = self.inner.lock().unwrap();
            inner.current = Some(record.clone());
            inner.history.insert(0, record.clone());
            Ok(())
        }

        fn clear(&self) -> Result<(), StoreError> {
            let mut inner = self.inner.lock().unwrap();
            inner.current = None;
            inner.history.clear();
            Ok(())
        }

        fn history(&self) -> Result<Vec<AttendanceRecord>, StoreError> {
            Ok(self.inner.lock().unwrap().history.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{ManualClock, MemoryStore};
    use super::*;

    fn ledger_with(clock: ManualClock) -> (AttendanceLedger, MemoryStore) {
        let store = MemoryStore::default();
        let ledger = AttendanceLedger::new(Box::new(store.clone()), Box::new(clock));
        (ledger, store)
    }

    #[test]
    fn first_mark_of_the_day_succeeds() {
        let (ledger, _store) = ledger_with(ManualClock::at(2026, 8, 25));

        assert!(!ledger.is_marked_today().unwrap());
        let outcome = ledger.mark("daniel").unwrap();
        assert!(matches!(outcome, MarkOutcome::Marked(_)));
        assert!(ledger.is_marked_today().unwrap());
    }

    #[test]
    fn second_mark_same_day_is_a_noop_for_anyone() {
        let (ledger, _store) = ledger_with(ManualClock::at(2026, 8, 25));

        ledger.mark("daniel").unwrap();
        // A different person is still blocked: the guard is per-day, not per-identity.
        let outcome = ledger.mark("ajith_kumar").unwrap();
        assert!(matches!(outcome, MarkOutcome::AlreadyMarked));

        let current = ledger.current().unwrap().unwrap();
        assert_eq!(current.name, "daniel");
        assert_eq!(ledger.history().unwrap().len(), 1);
    }

    #[test]
    fn yesterdays_mark_does_not_block_today() {
        let clock = ManualClock::at(2026, 8, 24);
        let (ledger, _store) = ledger_with(clock.clone());

        ledger.mark("daniel").unwrap();
        clock.set(2026, 8, 25);

        assert!(!ledger.is_marked_today().unwrap());
        let outcome = ledger.mark("ajith_kumar").unwrap();
        assert!(matches!(outcome, MarkOutcome::Marked(_)));
    }

    #[test]
    fn reset_unblocks_marking() {
        let (ledger, _store) = ledger_with(ManualClock::at(2026, 8, 25));

        ledger.mark("daniel").unwrap();
        ledger.reset().unwrap();

        assert!(!ledger.is_marked_today().unwrap());
        assert!(ledger.current().unwrap().is_none());
        assert!(ledger.history().unwrap().is_empty());
        assert!(matches!(
            ledger.mark("daniel").unwrap(),
            MarkOutcome::Marked(_)
        ));
    }

    #[test]
    fn reset_never_fails_on_empty_state() {
        let (ledger, _store) = ledger_with(ManualClock::at(2026, 8, 25));
        ledger.reset().unwrap();
        ledger.reset().unwrap();
    }

    #[test]
    fn failed_commit_marks_nothing() {
        struct FailingStore;

        impl AttendanceStore for FailingStore {
            fn current(&self) -> Result<Option<AttendanceRecord>, StoreError> {
                Ok(None)
            }
            fn commit(&self, _record: &AttendanceRecord) -> Result<(), StoreError> {
                Err(StoreError::Backend("disk full".into()))
            }
            fn clear(&self) -> Result<(), StoreError> {
                Ok(())
            }
            fn history(&self) -> Result<Vec<AttendanceRecord>, StoreError> {
                Ok(vec![])
            }
        }

        let ledger =
            AttendanceLedger::new(Box::new(FailingStore), Box::new(ManualClock::at(2026, 8, 25)));

        assert!(ledger.mark("daniel").is_err());
        // Nothing landed, so the day is still open and a retry can succeed.
        assert!(!ledger.is_marked_today().unwrap());
    }
}
