//! Temporal debounce between raw per-frame matches and a commit-eligible lock.
//!
//! A candidate only becomes locked after the same employee code has been the
//! accepted nearest match for `stable_count` consecutive ticks. Any tick that
//! sees no face, a match above the acceptance threshold, or a detector error
//! drops all progress.

use crate::types::MatchCandidate;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Maximum Euclidean distance for a candidate to count as a match.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.55;
/// Consecutive agreeing ticks required before a candidate is locked.
pub const STABLE_MATCH_COUNT: u32 = 3;

#[derive(Error, Debug, PartialEq)]
pub enum StabilizerError {
    #[error("acceptance threshold must be a positive finite number, got {0}")]
    InvalidThreshold(f32),
    #[error("stable match count must be at least 1")]
    InvalidStableCount,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilizerConfig {
    pub threshold: f32,
    pub stable_count: u32,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
            stable_count: STABLE_MATCH_COUNT,
        }
    }
}

impl StabilizerConfig {
    pub fn new(threshold: f32, stable_count: u32) -> Result<Self, StabilizerError> {
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(StabilizerError::InvalidThreshold(threshold));
        }
        if stable_count == 0 {
            return Err(StabilizerError::InvalidStableCount);
        }
        Ok(Self {
            threshold,
            stable_count,
        })
    }

    pub fn accepts(&self, candidate: &MatchCandidate) -> bool {
        !candidate.is_none() && candidate.distance <= self.threshold
    }
}

/// What the detector and matcher saw on one tick.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    NoFace,
    /// A face was seen; carries the nearest enrolled candidate (possibly
    /// [`MatchCandidate::none`] when the gallery is empty).
    Face(MatchCandidate),
    DetectorError(String),
}

/// Per-session debounce state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StabilizationState {
    pub last_code: String,
    pub consecutive_count: u32,
    pub locked: Option<MatchCandidate>,
}

impl StabilizationState {
    pub fn is_initial(&self) -> bool {
        self.last_code.is_empty() && self.consecutive_count == 0 && self.locked.is_none()
    }
}

/// Status surfaced to the operator after each tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScanStatus {
    /// Scanning has not produced a result yet, or no face is in view.
    Searching,
    /// A face was seen but nothing in the gallery is close enough.
    NotMatched { nearest: Option<MatchCandidate> },
    Confirming {
        candidate: MatchCandidate,
        count: u32,
        required: u32,
    },
    /// A candidate is locked and may be committed.
    Ready { candidate: MatchCandidate },
    Error { message: String },
}

impl ScanStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, ScanStatus::Ready { .. })
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanStatus::Searching => write!(f, "searching"),
            ScanStatus::NotMatched { nearest: Some(n) } => {
                write!(f, "not matched (nearest {} at {:.3})", n.code, n.distance)
            }
            ScanStatus::NotMatched { nearest: None } => write!(f, "not matched"),
            ScanStatus::Confirming {
                count, required, ..
            } => write!(f, "confirming ({count}/{required})"),
            ScanStatus::Ready { candidate } => {
                write!(f, "ready ({} {})", candidate.code, candidate.full_name)
            }
            ScanStatus::Error { message } => write!(f, "error: {message}"),
        }
    }
}

/// Advance the debounce state by one observation.
///
/// Pure step function: the caller owns the state and gets the next state back
/// together with the status to render.
pub fn tick(
    state: StabilizationState,
    observation: Observation,
    config: &StabilizerConfig,
) -> (StabilizationState, ScanStatus) {
    let candidate = match observation {
        Observation::NoFace => return (StabilizationState::default(), ScanStatus::Searching),
        Observation::DetectorError(message) => {
            return (StabilizationState::default(), ScanStatus::Error { message });
        }
        Observation::Face(candidate) if !config.accepts(&candidate) => {
            let nearest = (!candidate.is_none()).then_some(candidate);
            return (
                StabilizationState::default(),
                ScanStatus::NotMatched { nearest },
            );
        }
        Observation::Face(candidate) => candidate,
    };

    let mut next = state;
    if next.last_code == candidate.code {
        next.consecutive_count = next.consecutive_count.saturating_add(1);
    } else {
        next.last_code = candidate.code.clone();
        next.consecutive_count = 1;
        next.locked = None;
    }

    if next.consecutive_count >= config.stable_count {
        // Keep the first lock while the same code keeps matching.
        let locked = next.locked.get_or_insert(candidate).clone();
        (next, ScanStatus::Ready { candidate: locked })
    } else {
        let status = ScanStatus::Confirming {
            candidate,
            count: next.consecutive_count,
            required: config.stable_count,
        };
        (next, status)
    }
}

/// Owns a [`StabilizationState`] and its configuration.
#[derive(Debug, Clone, Default)]
pub struct Stabilizer {
    config: StabilizerConfig,
    state: StabilizationState,
}

impl Stabilizer {
    pub fn new(config: StabilizerConfig) -> Self {
        Self {
            config,
            state: StabilizationState::default(),
        }
    }

    pub fn config(&self) -> &StabilizerConfig {
        &self.config
    }

    pub fn state(&self) -> &StabilizationState {
        &self.state
    }

    pub fn observe(&mut self, observation: Observation) -> ScanStatus {
        let (next, status) = tick(std::mem::take(&mut self.state), observation, &self.config);
        self.state = next;
        status
    }

    pub fn locked(&self) -> Option<&MatchCandidate> {
        self.state.locked.as_ref()
    }

    pub fn reset(&mut self) {
        self.state = StabilizationState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(code: &str, distance: f32) -> Observation {
        Observation::Face(MatchCandidate {
            code: code.into(),
            full_name: format!("{code} name"),
            distance,
        })
    }

    #[test]
    fn test_locks_on_third_tick() {
        let mut s = Stabilizer::default();

        let st = s.observe(cand("E1", 0.3));
        assert_eq!(st.to_string(), "confirming (1/3)");
        assert!(s.locked().is_none());

        let st = s.observe(cand("E1", 0.3));
        assert_eq!(st.to_string(), "confirming (2/3)");
        assert!(s.locked().is_none());

        let st = s.observe(cand("E1", 0.3));
        assert!(st.is_ready());
        assert_eq!(s.locked().map(|c| c.code.as_str()), Some("E1"));
        assert_eq!(s.state().consecutive_count, 3);
    }

    #[test]
    fn test_lock_survives_repeated_matches() {
        let mut s = Stabilizer::default();
        for _ in 0..3 {
            s.observe(cand("E1", 0.3));
        }
        let first = s.locked().cloned();

        let st = s.observe(cand("E1", 0.25));
        assert!(st.is_ready());
        assert_eq!(s.locked().cloned(), first);
        assert_eq!(s.state().consecutive_count, 4);
    }

    #[test]
    fn test_different_code_clears_lock() {
        let mut s = Stabilizer::default();
        for _ in 0..3 {
            s.observe(cand("E1", 0.3));
        }
        assert!(s.locked().is_some());

        let st = s.observe(cand("E2", 0.2));
        assert_eq!(st.to_string(), "confirming (1/3)");
        assert!(s.locked().is_none());
        assert_eq!(s.state().last_code, "E2");
        assert_eq!(s.state().consecutive_count, 1);
    }

    #[test]
    fn test_above_threshold_never_locks() {
        let mut s = Stabilizer::default();
        for _ in 0..10 {
            let st = s.observe(cand("E1", 0.7));
            assert!(matches!(st, ScanStatus::NotMatched { nearest: Some(_) }));
        }
        assert!(s.state().is_initial());
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let config = StabilizerConfig::new(0.5, 1).unwrap();
        let mut s = Stabilizer::new(config);
        assert!(s.observe(cand("E1", 0.5)).is_ready());
    }

    #[test]
    fn test_no_face_resets() {
        let mut s = Stabilizer::default();
        for _ in 0..3 {
            s.observe(cand("E1", 0.3));
        }
        assert_eq!(s.observe(Observation::NoFace), ScanStatus::Searching);
        assert!(s.state().is_initial());

        // Must re-stabilize from scratch.
        assert_eq!(s.observe(cand("E1", 0.3)).to_string(), "confirming (1/3)");
    }

    #[test]
    fn test_detector_error_resets() {
        let mut s = Stabilizer::default();
        s.observe(cand("E1", 0.3));
        s.observe(cand("E1", 0.3));
        let st = s.observe(Observation::DetectorError("model not ready".into()));
        assert_eq!(st.to_string(), "error: model not ready");
        assert!(s.state().is_initial());
    }

    #[test]
    fn test_below_threshold_interrupts_run() {
        let mut s = Stabilizer::default();
        s.observe(cand("E1", 0.3));
        s.observe(cand("E1", 0.3));
        s.observe(cand("E1", 0.9));
        let st = s.observe(cand("E1", 0.3));
        assert_eq!(st.to_string(), "confirming (1/3)");
    }

    #[test]
    fn test_empty_gallery_is_not_matched() {
        let mut s = Stabilizer::default();
        let st = s.observe(Observation::Face(MatchCandidate::none()));
        assert_eq!(st, ScanStatus::NotMatched { nearest: None });
    }

    #[test]
    fn test_reset_from_any_state() {
        let mut s = Stabilizer::default();
        for _ in 0..5 {
            s.observe(cand("E9", 0.1));
        }
        s.reset();
        assert_eq!(s.state(), &StabilizationState::default());
        assert!(s.state().is_initial());
    }

    #[test]
    fn test_tick_is_pure() {
        let config = StabilizerConfig::default();
        let state = StabilizationState::default();
        let (a, _) = tick(state.clone(), cand("E1", 0.2), &config);
        let (b, _) = tick(state, cand("E1", 0.2), &config);
        assert_eq!(a, b);
        assert_eq!(a.consecutive_count, 1);
    }

    #[test]
    fn test_config_validation() {
        assert!(StabilizerConfig::new(0.55, 3).is_ok());
        assert_eq!(
            StabilizerConfig::new(0.0, 3),
            Err(StabilizerError::InvalidThreshold(0.0))
        );
        assert!(StabilizerConfig::new(f32::NAN, 3).is_err());
        assert_eq!(
            StabilizerConfig::new(0.55, 0),
            Err(StabilizerError::InvalidStableCount)
        );
    }
}
