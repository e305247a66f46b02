use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use uuid::Uuid;

use crate::alignment::{AlignmentGate, Baseline};
use crate::antispoof::AntiSpoofAnalyzer;
use crate::blink::{BlinkCalibration, BlinkGate};
use crate::config::LivenessConfig;
use crate::error::LivenessIssue;
use crate::head_pose::{HeadPoseGate, HeadPoseProgress, TurnDirection};
use crate::smoothing::EmaFilter;

/// One physical challenge the subject must perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Challenge {
    Align,
    Blink,
    TurnLeft,
    TurnRight,
    TurnUp,
    TurnDown,
}

impl Challenge {
    pub const ALL: [Challenge; 6] = [
        Challenge::Align,
        Challenge::Blink,
        Challenge::TurnLeft,
        Challenge::TurnRight,
        Challenge::TurnUp,
        Challenge::TurnDown,
    ];

    pub fn turn_direction(self) -> Option<TurnDirection> {
        match self {
            Challenge::TurnLeft => Some(TurnDirection::Left),
            Challenge::TurnRight => Some(TurnDirection::Right),
            Challenge::TurnUp => Some(TurnDirection::Up),
            Challenge::TurnDown => Some(TurnDirection::Down),
            Challenge::Align | Challenge::Blink => None,
        }
    }

    pub fn instruction(self) -> &'static str {
        match self {
            Challenge::Align => "Position your face inside the guide and hold still.",
            Challenge::Blink => "Blink once.",
            Challenge::TurnLeft => "Slowly turn your head to your left.",
            Challenge::TurnRight => "Slowly turn your head to your right.",
            Challenge::TurnUp => "Slowly tilt your head up.",
            Challenge::TurnDown => "Slowly tilt your head down.",
        }
    }
}

/// Position of the sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", content = "step", rename_all = "snake_case")]
pub enum Stage {
    Idle,
    Active(Challenge),
    Success,
}

/// Random challenge order with ALIGN pinned first.
///
/// Every other challenge needs the baseline that only ALIGN captures, so only
/// the remaining five are shuffled.
pub fn generate_step_order<R: Rng + ?Sized>(rng: &mut R) -> Vec<Challenge> {
    let mut order = Challenge::ALL.to_vec();
    order[1..].shuffle(rng);
    order
}

/// Mutable state of one verification attempt.
///
/// Created by `start`, mutated frame by frame, and dropped wholesale on
/// restart. Nothing carries over between sessions.
#[derive(Debug, Clone)]
pub struct Session {
    pub(crate) session_id: Uuid,
    pub(crate) started_at: Instant,
    pub(crate) step_order: Vec<Challenge>,
    pub(crate) current_step: Stage,
    pub(crate) step_entered_at: Instant,
    pub(crate) completed_steps: Vec<Challenge>,
    pub(crate) baseline: Option<Baseline>,
    pub(crate) blink_calibration: Option<BlinkCalibration>,
    pub(crate) yaw_deltas: Vec<f32>,
    pub(crate) pitch_deltas: Vec<f32>,
    pub(crate) last_error: Option<LivenessIssue>,
    pub(crate) is_complete: bool,
    /// Gating is suspended until this instant after a step completes.
    pub(crate) cooldown_until: Option<Instant>,

    pub(crate) ear_filter: EmaFilter,
    pub(crate) raw_ear: f32,
    pub(crate) alignment: AlignmentGate,
    pub(crate) blink: BlinkGate,
    pub(crate) head_pose: HeadPoseGate,
    pub(crate) antispoof: AntiSpoofAnalyzer,
}

impl Session {
    pub(crate) fn new(config: &LivenessConfig, step_order: Vec<Challenge>, now: Instant) -> Self {
        let current_step = step_order
            .first()
            .map_or(Stage::Success, |&step| Stage::Active(step));

        Self {
            session_id: Uuid::new_v4(),
            started_at: now,
            step_order,
            current_step,
            step_entered_at: now,
            completed_steps: Vec::with_capacity(Challenge::ALL.len()),
            baseline: None,
            blink_calibration: None,
            yaw_deltas: Vec::new(),
            pitch_deltas: Vec::new(),
            last_error: None,
            is_complete: false,
            cooldown_until: None,
            ear_filter: EmaFilter::new(config.ema_alpha),
            raw_ear: 0.0,
            alignment: AlignmentGate::new(config.alignment),
            blink: BlinkGate::new(config.blink),
            head_pose: HeadPoseGate::new(config.head_pose),
            antispoof: AntiSpoofAnalyzer::new(config.antispoof),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn step_order(&self) -> &[Challenge] {
        &self.step_order
    }

    pub fn current_step(&self) -> Stage {
        self.current_step
    }

    pub fn step_entered_at(&self) -> Instant {
        self.step_entered_at
    }

    pub fn completed_steps(&self) -> &[Challenge] {
        &self.completed_steps
    }

    pub fn baseline(&self) -> Option<&Baseline> {
        self.baseline.as_ref()
    }

    pub fn blink_calibration(&self) -> Option<&BlinkCalibration> {
        self.blink_calibration.as_ref()
    }

    pub fn head_pose_progress(&self) -> HeadPoseProgress {
        self.head_pose.progress()
    }

    pub fn yaw_deltas(&self) -> &[f32] {
        &self.yaw_deltas
    }

    pub fn pitch_deltas(&self) -> &[f32] {
        &self.pitch_deltas
    }

    pub fn last_error(&self) -> Option<LivenessIssue> {
        self.last_error
    }

    pub fn is_complete(&self) -> bool {
        self.is_complete
    }

    pub fn aligned_frames(&self) -> usize {
        self.alignment.aligned_frames()
    }

    pub fn antispoof(&self) -> &AntiSpoofAnalyzer {
        &self.antispoof
    }

    pub fn blink_gate(&self) -> &BlinkGate {
        &self.blink
    }

    pub fn smoothed_ear(&self) -> f32 {
        self.ear_filter.value()
    }

    pub fn is_cooling_down(&self, now: Instant) -> bool {
        self.cooldown_until.is_some_and(|until| now < until)
    }

    /// Challenge in progress, if any.
    pub fn active_challenge(&self) -> Option<Challenge> {
        match self.current_step {
            Stage::Active(step) => Some(step),
            Stage::Idle | Stage::Success => None,
        }
    }

    /// Clear per-frame counters after a progress-resetting issue.
    pub(crate) fn reset_progress(&mut self) {
        self.alignment.reset_progress();
        self.head_pose.reset_progress();
    }

    /// Append the active step and move to the next one.
    ///
    /// Returns the step entered, or `None` when the order is exhausted and
    /// the session is now complete.
    pub(crate) fn advance(&mut self, now: Instant, cooldown_until: Instant) -> Option<Challenge> {
        let Stage::Active(step) = self.current_step else {
            return None;
        };

        debug_assert_eq!(
            self.step_order.get(self.completed_steps.len()),
            Some(&step),
            "active step must be the first uncompleted step"
        );
        self.completed_steps.push(step);
        self.last_error = None;

        match self.step_order.get(self.completed_steps.len()).copied() {
            Some(next) => {
                self.current_step = Stage::Active(next);
                self.step_entered_at = cooldown_until;
                self.cooldown_until = Some(cooldown_until);
                self.enter_step(next);
                Some(next)
            }
            None => {
                self.current_step = Stage::Success;
                self.step_entered_at = now;
                self.cooldown_until = None;
                self.is_complete = true;
                None
            }
        }
    }

    /// Fresh gate state for a newly entered step.
    fn enter_step(&mut self, step: Challenge) {
        match step {
            Challenge::Align => self.alignment.reset(),
            Challenge::Blink => self.blink.reset(),
            Challenge::TurnLeft
            | Challenge::TurnRight
            | Challenge::TurnUp
            | Challenge::TurnDown => self.head_pose.reset(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::time::Duration;

    #[test]
    fn test_order_is_permutation_with_align_first() {
        for seed in 0..64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let order = generate_step_order(&mut rng);
            assert_eq!(order[0], Challenge::Align);

            let mut sorted = order.clone();
            sorted.sort();
            let mut canonical = Challenge::ALL.to_vec();
            canonical.sort();
            assert_eq!(sorted, canonical);
        }
    }

    #[test]
    fn test_order_is_seed_deterministic() {
        let a = generate_step_order(&mut StdRng::seed_from_u64(99));
        let b = generate_step_order(&mut StdRng::seed_from_u64(99));
        assert_eq!(a, b);
    }

    #[test]
    fn test_orders_vary_across_seeds() {
        let orders: std::collections::HashSet<Vec<Challenge>> = (0..32)
            .map(|seed| generate_step_order(&mut StdRng::seed_from_u64(seed)))
            .collect();
        assert!(orders.len() > 1);
    }

    #[test]
    fn test_advance_keeps_prefix_invariant() {
        let config = LivenessConfig::default();
        let order = generate_step_order(&mut StdRng::seed_from_u64(5));
        let t0 = Instant::now();
        let mut session = Session::new(&config, order.clone(), t0);
        assert_eq!(session.current_step(), Stage::Active(Challenge::Align));

        for i in 0..order.len() {
            let now = t0 + Duration::from_secs(i as u64);
            let next = session.advance(now, now + config.step_cooldown());
            assert_eq!(session.completed_steps(), &order[..=i]);
            match next {
                Some(step) => {
                    assert_eq!(step, order[i + 1]);
                    assert_eq!(session.current_step(), Stage::Active(step));
                    assert!(session.is_cooling_down(now));
                    assert!(!session.is_cooling_down(now + config.step_cooldown()));
                }
                None => {
                    assert_eq!(i, order.len() - 1);
                    assert_eq!(session.current_step(), Stage::Success);
                    assert!(session.is_complete());
                }
            }
        }

        // Nothing further to complete once terminal.
        assert_eq!(session.advance(t0, t0), None);
        assert_eq!(session.completed_steps().len(), Challenge::ALL.len());
    }

    #[test]
    fn test_challenge_serializes_screaming_case() {
        let json = serde_json::to_string(&Challenge::TurnLeft).unwrap();
        assert_eq!(json, "\"TURN_LEFT\"");
    }
}
