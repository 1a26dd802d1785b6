//! Risk scoring for sensitive banking actions.
//!
//! Pure function of the request signals, the injected notion of "now" and
//! the optional override. History-derived counts are fetched by the caller
//! so the scorer itself has no I/O and no hidden state.

use chrono::{DateTime, Timelike, Utc};
use std::collections::BTreeMap;

use crate::models::risk::RiskAssessment;

pub const WEIGHT_NEW_DEVICE: u8 = 30;
pub const WEIGHT_OFF_HOURS: u8 = 15;
pub const WEIGHT_HIGH_VELOCITY: u8 = 20;
pub const WEIGHT_PER_FAILED_ATTEMPT: u8 = 10;
pub const FAILED_ATTEMPTS_CAP: u8 = 30;
pub const WEIGHT_PROXY: u8 = 15;
pub const WEIGHT_SUSPICIOUS_AGENT: u8 = 20;

/// More successful actions than this in the trailing minute reads as
/// scripted behavior.
pub const HIGH_VELOCITY_THRESHOLD: u32 = 50;

const OFF_HOURS_END: u32 = 6;
const OFF_HOURS_START: u32 = 22;

const SUSPICIOUS_AGENT_MARKERS: &[&str] = &[
    "bot", "crawler", "scraper", "spider", "curl", "wget", "python", "scanner",
];

/// Request signals feeding one risk computation.
#[derive(Debug, Clone, Default)]
pub struct RiskSignals {
    pub user_agent: Option<String>,
    /// Raw x-forwarded-for header value, if any.
    pub forwarded_for: Option<String>,
    /// Successful actions by this user in the trailing 60 seconds.
    pub recent_success_count: u32,
    /// Denied authentication/authorization attempts by this user in the
    /// trailing 15 minutes.
    pub recent_failed_count: u32,
}

/// Compute a 0-100 risk score. With an override active all computation is
/// bypassed and the factor map carries the single `override` entry.
pub fn assess(
    signals: &RiskSignals,
    now: DateTime<Utc>,
    override_score: Option<u8>,
) -> RiskAssessment {
    if let Some(value) = override_score {
        let value = value.min(100);
        let mut factors = BTreeMap::new();
        factors.insert("override".to_string(), value);
        return RiskAssessment {
            score: value,
            factors,
            override_active: true,
        };
    }

    let mut factors = BTreeMap::new();
    let mut total: u32 = 0;

    // Absent or empty user-agent stands in for an unrecognized device.
    let user_agent = signals.user_agent.as_deref().map(str::trim);
    if user_agent.map_or(true, str::is_empty) {
        factors.insert("new_device".to_string(), WEIGHT_NEW_DEVICE);
        total += u32::from(WEIGHT_NEW_DEVICE);
    }

    let hour = now.hour();
    if hour < OFF_HOURS_END || hour >= OFF_HOURS_START {
        factors.insert("off_hours".to_string(), WEIGHT_OFF_HOURS);
        total += u32::from(WEIGHT_OFF_HOURS);
    }

    if signals.recent_success_count > HIGH_VELOCITY_THRESHOLD {
        factors.insert("high_velocity".to_string(), WEIGHT_HIGH_VELOCITY);
        total += u32::from(WEIGHT_HIGH_VELOCITY);
    }

    if signals.recent_failed_count > 0 {
        let points = (signals.recent_failed_count.saturating_mul(u32::from(
            WEIGHT_PER_FAILED_ATTEMPT,
        )))
        .min(u32::from(FAILED_ATTEMPTS_CAP)) as u8;
        factors.insert("failed_attempts".to_string(), points);
        total += u32::from(points);
    }

    if forwarded_hops(signals.forwarded_for.as_deref()) > 2 {
        factors.insert("proxy_signal".to_string(), WEIGHT_PROXY);
        total += u32::from(WEIGHT_PROXY);
    }

    if let Some(agent) = user_agent {
        let lowered = agent.to_lowercase();
        if SUSPICIOUS_AGENT_MARKERS
            .iter()
            .any(|marker| lowered.contains(marker))
        {
            factors.insert("suspicious_agent".to_string(), WEIGHT_SUSPICIOUS_AGENT);
            total += u32::from(WEIGHT_SUSPICIOUS_AGENT);
        }
    }

    RiskAssessment {
        score: total.min(100) as u8,
        factors,
        override_active: false,
    }
}

/// Hop count of a comma-separated forwarded-for chain. More than two hops is
/// taken as a proxy/VPN signal.
fn forwarded_hops(forwarded_for: Option<&str>) -> usize {
    forwarded_for
        .map(|value| {
            value
                .split(',')
                .filter(|hop| !hop.trim().is_empty())
                .count()
        })
        .unwrap_or(0)
}
