use serde::{Deserialize, Serialize};

use crate::alignment::Baseline;
use crate::config::HeadPoseConfig;
use crate::error::LivenessIssue;
use crate::geometry::PoseMetrics;

/// Direction of a head-turn challenge, in the subject's own frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnDirection {
    Left,
    Right,
    Up,
    Down,
}

/// Which pose metric a turn is measured on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoseAxis {
    Yaw,
    Pitch,
}

impl TurnDirection {
    pub fn axis(self) -> PoseAxis {
        match self {
            TurnDirection::Left | TurnDirection::Right => PoseAxis::Yaw,
            TurnDirection::Up | TurnDirection::Down => PoseAxis::Pitch,
        }
    }

    /// Signed delta from the baseline on this direction's axis.
    pub fn delta(self, pose: &PoseMetrics, baseline: &Baseline) -> f32 {
        match self.axis() {
            PoseAxis::Yaw => pose.yaw - baseline.yaw,
            PoseAxis::Pitch => pose.pitch - baseline.pitch,
        }
    }

    pub fn is_satisfied(self, delta: f32, config: &HeadPoseConfig) -> bool {
        match self {
            TurnDirection::Left => delta <= -config.yaw_threshold,
            TurnDirection::Right => delta >= config.yaw_threshold,
            TurnDirection::Up => delta <= -config.pitch_threshold,
            TurnDirection::Down => delta >= config.pitch_threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct HeadPoseProgress {
    pub held_frames: usize,
    pub reached: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PoseOutcome {
    /// Predicate evaluated; `held_frames` is the current consecutive run.
    Holding { held_frames: usize, delta: f32 },
    Rejected(LivenessIssue),
    /// Held long enough. Reported once per step.
    Completed { delta: f32 },
}

/// Requires a turn past threshold to be held for consecutive frames.
#[derive(Debug, Clone)]
pub struct HeadPoseGate {
    config: HeadPoseConfig,
    progress: HeadPoseProgress,
}

impl HeadPoseGate {
    pub fn new(config: HeadPoseConfig) -> Self {
        Self {
            config,
            progress: HeadPoseProgress::default(),
        }
    }

    pub fn progress(&self) -> HeadPoseProgress {
        self.progress
    }

    pub fn reset(&mut self) {
        self.progress = HeadPoseProgress::default();
    }

    pub fn reset_progress(&mut self) {
        self.progress.held_frames = 0;
    }

    pub fn observe(
        &mut self,
        direction: TurnDirection,
        pose: &PoseMetrics,
        baseline: Option<&Baseline>,
    ) -> PoseOutcome {
        let Some(baseline) = baseline else {
            return PoseOutcome::Rejected(LivenessIssue::MissingBaseline);
        };

        if pose.roll.abs() > self.config.roll_warning_threshold {
            self.progress.held_frames = 0;
            return PoseOutcome::Rejected(LivenessIssue::ExcessiveRoll);
        }

        let delta = direction.delta(pose, baseline);

        if self.progress.reached {
            return PoseOutcome::Holding {
                held_frames: self.progress.held_frames,
                delta,
            };
        }

        if !direction.is_satisfied(delta, &self.config) {
            self.progress.held_frames = 0;
            return PoseOutcome::Holding {
                held_frames: 0,
                delta,
            };
        }

        self.progress.held_frames += 1;
        if self.progress.held_frames < self.config.held_frames {
            return PoseOutcome::Holding {
                held_frames: self.progress.held_frames,
                delta,
            };
        }

        self.progress.reached = true;
        tracing::info!(
            direction = ?direction,
            delta,
            held_frames = self.progress.held_frames,
            "head turn held"
        );
        PoseOutcome::Completed { delta }
    }
}
