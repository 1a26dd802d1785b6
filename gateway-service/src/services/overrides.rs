//! Process-wide test/demo overrides for risk and time.
//!
//! Injected into every consumer rather than reached through a singleton, so
//! the risk scorer and any time-sensitive policy input stay deterministic
//! under test. Reads always observe a fully-written value.

use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock};

#[derive(Clone, Default)]
pub struct OverrideControl {
    risk: Arc<RwLock<Option<u8>>>,
    time: Arc<RwLock<Option<DateTime<Utc>>>>,
}

impl OverrideControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn risk_override(&self) -> Option<u8> {
        match self.risk.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Pin the risk score; `None` restores computed scoring. Values above
    /// 100 are clamped to keep the score invariant intact.
    pub fn set_risk_override(&self, value: Option<u8>) {
        let value = value.map(|v| v.min(100));
        match self.risk.write() {
            Ok(mut guard) => *guard = value,
            Err(poisoned) => *poisoned.into_inner() = value,
        }
    }

    pub fn time_override(&self) -> Option<DateTime<Utc>> {
        match self.time.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Pin "now"; `None` restores the wall clock.
    pub fn set_time_override(&self, value: Option<DateTime<Utc>>) {
        match self.time.write() {
            Ok(mut guard) => *guard = value,
            Err(poisoned) => *poisoned.into_inner() = value,
        }
    }

    /// The instant every time-sensitive computation should use.
    pub fn effective_now(&self) -> DateTime<Utc> {
        self.time_override().unwrap_or_else(Utc::now)
    }

    /// Clear both overrides. Idempotent.
    pub fn clear(&self) {
        self.set_risk_override(None);
        self.set_time_override(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_risk_override_set_and_clear() {
        let control = OverrideControl::new();
        assert_eq!(control.risk_override(), None);

        control.set_risk_override(Some(77));
        assert_eq!(control.risk_override(), Some(77));

        control.set_risk_override(None);
        assert_eq!(control.risk_override(), None);
    }

    #[test]
    fn test_risk_override_is_clamped() {
        let control = OverrideControl::new();
        control.set_risk_override(Some(255));
        assert_eq!(control.risk_override(), Some(100));
    }

    #[test]
    fn test_effective_now_prefers_override() {
        let control = OverrideControl::new();
        let pinned = Utc.with_ymd_and_hms(2024, 3, 1, 23, 30, 0).unwrap();

        control.set_time_override(Some(pinned));
        assert_eq!(control.effective_now(), pinned);

        control.set_time_override(None);
        assert!(control.effective_now() > pinned);
    }

    #[test]
    fn test_clear_resets_both() {
        let control = OverrideControl::new();
        control.set_risk_override(Some(10));
        control.set_time_override(Some(Utc::now()));

        control.clear();
        assert_eq!(control.risk_override(), None);
        assert_eq!(control.time_override(), None);

        // Idempotent
        control.clear();
        assert_eq!(control.risk_override(), None);
    }
}
