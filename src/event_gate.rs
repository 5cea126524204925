// src/event_gate.rs
//
// Per-session deduplication/escalation gate. Decides, once per scored
// frame, whether the current assessment is worth reporting.

use crate::types::{LogEvent, RiskAssessment, RiskLevel};
use tracing::info;

/// Gate state. `last_level` starts unset so the first evaluated frame of a
/// session always emits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateState {
    pub last_level: Option<RiskLevel>,
    pub last_time: f64,
    pub last_warning: bool,
}

impl Default for GateState {
    fn default() -> Self {
        Self {
            last_level: None,
            last_time: 0.0,
            last_warning: false,
        }
    }
}

/// Pure transition predicate. Emit iff the level changed, the level is HIGH
/// without a standing warning, or the cooldown window has elapsed.
pub fn should_emit(state: &GateState, level: RiskLevel, now: f64, cooldown: f64) -> bool {
    if state.last_level != Some(level) {
        return true;
    }
    if level == RiskLevel::High && !state.last_warning {
        return true;
    }
    now - state.last_time >= cooldown
}

pub struct EventGate {
    state: GateState,
    cooldown_seconds: f64,
    road_segment: String,
    mode_label: String,
}

impl EventGate {
    pub fn new(cooldown_seconds: f64, road_segment: String, mode_label: String) -> Self {
        Self {
            state: GateState::default(),
            cooldown_seconds,
            road_segment,
            mode_label,
        }
    }

    /// Evaluate the assessment at `now` (epoch seconds). Returns the record
    /// to forward when the gate opens, updating the gate state in lockstep.
    pub fn evaluate(
        &mut self,
        assessment: &RiskAssessment,
        cattle_count: usize,
        now: f64,
    ) -> Option<LogEvent> {
        if !should_emit(&self.state, assessment.level, now, self.cooldown_seconds) {
            return None;
        }

        let warning_issued = assessment.level == RiskLevel::High;

        self.state = GateState {
            last_level: Some(assessment.level),
            last_time: now,
            last_warning: warning_issued,
        };

        info!(
            "📋 Risk event: {} ({}) cattle={} warning={}",
            assessment.score,
            assessment.level.as_str(),
            cattle_count,
            warning_issued
        );

        Some(LogEvent {
            road_segment: self.road_segment.clone(),
            mode: self.mode_label.clone(),
            risk_score: assessment.score,
            risk_level: assessment.level.as_str().to_string(),
            cattle_count,
            warning_issued,
        })
    }

    pub fn state(&self) -> &GateState {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COOLDOWN: f64 = 5.0;

    fn gate() -> EventGate {
        EventGate::new(COOLDOWN, "NH-48 | KM 32-36".to_string(), "DAY MODE".to_string())
    }

    fn assessment(level: RiskLevel) -> RiskAssessment {
        let score = match level {
            RiskLevel::Low => 10,
            RiskLevel::Medium => 45,
            RiskLevel::High => 80,
        };
        RiskAssessment { score, level }
    }

    #[test]
    fn test_first_frame_always_emits() {
        let mut g = gate();
        let event = g.evaluate(&assessment(RiskLevel::Low), 0, 100.0);
        assert!(event.is_some());
        let event = event.unwrap();
        assert_eq!(event.risk_level, "LOW");
        assert!(!event.warning_issued);
    }

    #[test]
    fn test_unchanged_level_within_cooldown_is_silent() {
        let mut g = gate();
        // [LOW, LOW, LOW] all inside one second: exactly one emission
        assert!(g.evaluate(&assessment(RiskLevel::Low), 0, 100.0).is_some());
        assert!(g.evaluate(&assessment(RiskLevel::Low), 0, 100.4).is_none());
        assert!(g.evaluate(&assessment(RiskLevel::Low), 0, 100.9).is_none());
    }

    #[test]
    fn test_transition_and_cooldown_sequence() {
        let mut g = gate();
        // [LOW, HIGH, HIGH six seconds later] emits at every step
        assert!(g.evaluate(&assessment(RiskLevel::Low), 0, 100.0).is_some());
        assert!(g.evaluate(&assessment(RiskLevel::High), 2, 101.0).is_some());
        assert!(g.evaluate(&assessment(RiskLevel::High), 2, 107.0).is_some());
    }

    #[test]
    fn test_level_change_beats_cooldown() {
        let mut g = gate();
        g.evaluate(&assessment(RiskLevel::Low), 0, 100.0);
        // Only 0.1s later, but the level changed
        assert!(g.evaluate(&assessment(RiskLevel::Medium), 1, 100.1).is_some());
    }

    #[test]
    fn test_reentering_high_always_emits() {
        let mut g = gate();
        g.evaluate(&assessment(RiskLevel::High), 2, 100.0);
        g.evaluate(&assessment(RiskLevel::Low), 0, 100.5);
        // Back to HIGH immediately: last_warning was cleared on leaving HIGH
        let event = g.evaluate(&assessment(RiskLevel::High), 3, 100.6);
        assert!(event.is_some());
        assert!(event.unwrap().warning_issued);
    }

    #[test]
    fn test_sustained_level_reemits_after_cooldown() {
        let mut g = gate();
        g.evaluate(&assessment(RiskLevel::Medium), 1, 100.0);
        assert!(g.evaluate(&assessment(RiskLevel::Medium), 1, 104.9).is_none());
        assert!(g.evaluate(&assessment(RiskLevel::Medium), 1, 105.0).is_some());
    }

    #[test]
    fn test_warning_flag_tracks_high_only() {
        let mut g = gate();
        g.evaluate(&assessment(RiskLevel::High), 2, 100.0);
        assert!(g.state().last_warning);
        g.evaluate(&assessment(RiskLevel::Low), 0, 100.1);
        assert!(!g.state().last_warning);
    }

    #[test]
    fn test_pure_predicate_matches_initial_state() {
        let state = GateState::default();
        assert!(should_emit(&state, RiskLevel::Low, 0.0, COOLDOWN));
        assert!(should_emit(&state, RiskLevel::High, 0.0, COOLDOWN));
    }
}
