use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::LivenessError;

/// Target rate at which the capture loop should deliver frames.
pub const TARGET_FPS: f32 = 12.0;

/// Consecutive in-guide frames required before the baseline is captured.
pub const ALIGN_REQUIRED_FRAMES: usize = 10;
/// Guide width as a fraction of frame width.
pub const GUIDE_WIDTH_RATIO: f32 = 0.55;
/// Guide height as a fraction of frame height.
pub const GUIDE_HEIGHT_RATIO: f32 = 0.75;
/// Slack around the guide, as a fraction of its size, on every side.
pub const GUIDE_MARGIN: f32 = 0.10;
/// Face width / guide width below which the subject is too far away.
pub const MIN_FACE_RATIO: f32 = 0.40;
/// Face width / guide width above which the subject is too close.
pub const MAX_FACE_RATIO: f32 = 1.00;

/// Smoothed EAR samples collected before the open-eye baseline is frozen.
pub const BLINK_CALIBRATION_FRAMES: usize = 10;
/// Closed threshold as a fraction of the open-eye baseline.
pub const CLOSED_RATIO: f32 = 0.65;
pub const CLOSED_FRAME_THRESHOLD: usize = 2;
pub const OPEN_FRAME_THRESHOLD: usize = 2;
pub const BLINK_COOLDOWN_MS: u64 = 500;

/// EMA weight of the newest EAR sample. At 10-15 Hz a blink spans 2-4 samples.
pub const EMA_ALPHA: f32 = 0.5;

pub const YAW_THRESHOLD: f32 = 0.09;
pub const PITCH_THRESHOLD: f32 = 0.06;
/// Normalized roll (1.0 = 30 degrees) above which a turn is rejected.
pub const ROLL_WARNING_THRESHOLD: f32 = 0.5;
pub const POSE_HELD_FRAMES: usize = 4;

pub const STEP_COOLDOWN_MS: u64 = 800;
pub const RESTART_DELAY_MS: u64 = 500;

pub const SPOOF_HISTORY_LEN: usize = 30;
pub const SPOOF_MIN_HISTORY: usize = 8;
pub const SPOOF_MIN_MOVEMENT_SAMPLES: usize = 5;
/// Keypoints with a depth coordinate required for a depth variance reading.
pub const SPOOF_MIN_DEPTH_POINTS: usize = 50;
/// Depth std-dev (same units as x/y) below which the face is considered flat.
pub const SPOOF_DEPTH_VARIANCE_FLOOR: f32 = 1.0;
pub const SPOOF_MOVEMENT_FLOOR: f32 = 0.002;
pub const SPOOF_DEPTH_MOVEMENT_SCALE: f32 = 0.5;
pub const SPOOF_STATIC_WINDOW: usize = 10;
pub const SPOOF_STATIC_EPSILON: f32 = 0.0005;
pub const SPOOF_STATIC_FRACTION: f32 = 0.8;
pub const SPOOF_WEIGHT_FLAT: f32 = 0.4;
pub const SPOOF_WEIGHT_NO_MOVEMENT: f32 = 0.35;
pub const SPOOF_WEIGHT_STATIC: f32 = 0.25;
pub const SPOOF_SCORE_THRESHOLD: f32 = 0.55;

/// Alignment gate tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentConfig {
    pub required_frames: usize,
    pub guide_width_ratio: f32,
    pub guide_height_ratio: f32,
    pub margin: f32,
    pub min_face_ratio: f32,
    pub max_face_ratio: f32,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            required_frames: ALIGN_REQUIRED_FRAMES,
            guide_width_ratio: GUIDE_WIDTH_RATIO,
            guide_height_ratio: GUIDE_HEIGHT_RATIO,
            margin: GUIDE_MARGIN,
            min_face_ratio: MIN_FACE_RATIO,
            max_face_ratio: MAX_FACE_RATIO,
        }
    }
}

/// Blink gate tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlinkConfig {
    pub calibration_frames: usize,
    pub closed_ratio: f32,
    pub closed_frame_threshold: usize,
    pub open_frame_threshold: usize,
    pub cooldown_ms: u64,
}

impl BlinkConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

impl Default for BlinkConfig {
    fn default() -> Self {
        Self {
            calibration_frames: BLINK_CALIBRATION_FRAMES,
            closed_ratio: CLOSED_RATIO,
            closed_frame_threshold: CLOSED_FRAME_THRESHOLD,
            open_frame_threshold: OPEN_FRAME_THRESHOLD,
            cooldown_ms: BLINK_COOLDOWN_MS,
        }
    }
}

/// Head-pose gate tuning. Thresholds are in normalized metric units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadPoseConfig {
    pub yaw_threshold: f32,
    pub pitch_threshold: f32,
    pub roll_warning_threshold: f32,
    pub held_frames: usize,
}

impl Default for HeadPoseConfig {
    fn default() -> Self {
        Self {
            yaw_threshold: YAW_THRESHOLD,
            pitch_threshold: PITCH_THRESHOLD,
            roll_warning_threshold: ROLL_WARNING_THRESHOLD,
            held_frames: POSE_HELD_FRAMES,
        }
    }
}

/// Anti-spoof analyzer tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AntiSpoofConfig {
    pub history_len: usize,
    pub min_history: usize,
    pub min_movement_samples: usize,
    pub min_depth_points: usize,
    pub depth_variance_floor: f32,
    pub movement_floor: f32,
    pub depth_movement_scale: f32,
    pub static_window: usize,
    pub static_epsilon: f32,
    pub static_fraction: f32,
    pub weight_flat: f32,
    pub weight_no_movement: f32,
    pub weight_static: f32,
    pub score_threshold: f32,
}

impl Default for AntiSpoofConfig {
    fn default() -> Self {
        Self {
            history_len: SPOOF_HISTORY_LEN,
            min_history: SPOOF_MIN_HISTORY,
            min_movement_samples: SPOOF_MIN_MOVEMENT_SAMPLES,
            min_depth_points: SPOOF_MIN_DEPTH_POINTS,
            depth_variance_floor: SPOOF_DEPTH_VARIANCE_FLOOR,
            movement_floor: SPOOF_MOVEMENT_FLOOR,
            depth_movement_scale: SPOOF_DEPTH_MOVEMENT_SCALE,
            static_window: SPOOF_STATIC_WINDOW,
            static_epsilon: SPOOF_STATIC_EPSILON,
            static_fraction: SPOOF_STATIC_FRACTION,
            weight_flat: SPOOF_WEIGHT_FLAT,
            weight_no_movement: SPOOF_WEIGHT_NO_MOVEMENT,
            weight_static: SPOOF_WEIGHT_STATIC,
            score_threshold: SPOOF_SCORE_THRESHOLD,
        }
    }
}

/// Complete tuning surface of a verification session.
///
/// Every field defaults to the named constant of the same meaning, so a
/// partially specified TOML table only overrides what it names.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    pub target_fps: f32,
    pub ema_alpha: f32,
    pub step_cooldown_ms: u64,
    pub restart_delay_ms: u64,
    pub alignment: AlignmentConfig,
    pub blink: BlinkConfig,
    pub head_pose: HeadPoseConfig,
    pub antispoof: AntiSpoofConfig,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            target_fps: TARGET_FPS,
            ema_alpha: EMA_ALPHA,
            step_cooldown_ms: STEP_COOLDOWN_MS,
            restart_delay_ms: RESTART_DELAY_MS,
            alignment: AlignmentConfig::default(),
            blink: BlinkConfig::default(),
            head_pose: HeadPoseConfig::default(),
            antispoof: AntiSpoofConfig::default(),
        }
    }
}

impl LivenessConfig {
    pub fn step_cooldown(&self) -> Duration {
        Duration::from_millis(self.step_cooldown_ms)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    /// Interval between frames at the target rate.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f32(1.0 / self.target_fps)
    }

    /// Reject values that would make a gate unsatisfiable or divide by zero.
    pub fn validate(&self) -> Result<(), LivenessError> {
        fn check(ok: bool, what: &str) -> Result<(), LivenessError> {
            if ok {
                Ok(())
            } else {
                Err(LivenessError::InvalidConfig(what.to_string()))
            }
        }

        check(
            self.target_fps.is_finite() && self.target_fps > 0.0,
            "target_fps must be positive",
        )?;
        check(
            self.ema_alpha > 0.0 && self.ema_alpha <= 1.0,
            "ema_alpha must be in (0, 1]",
        )?;

        let a = &self.alignment;
        check(a.required_frames > 0, "alignment.required_frames must be > 0")?;
        check(a.margin >= 0.0, "alignment.margin must be >= 0")?;
        check(
            a.guide_width_ratio > 0.0 && a.guide_height_ratio > 0.0,
            "alignment guide ratios must be positive",
        )?;
        check(
            a.min_face_ratio >= 0.0 && a.min_face_ratio < a.max_face_ratio,
            "alignment.min_face_ratio must be below max_face_ratio",
        )?;

        let b = &self.blink;
        check(b.calibration_frames > 0, "blink.calibration_frames must be > 0")?;
        check(
            b.closed_ratio > 0.0 && b.closed_ratio < 1.0,
            "blink.closed_ratio must be in (0, 1)",
        )?;
        check(
            b.closed_frame_threshold > 0 && b.open_frame_threshold > 0,
            "blink frame thresholds must be > 0",
        )?;

        let h = &self.head_pose;
        check(
            h.yaw_threshold > 0.0 && h.pitch_threshold > 0.0,
            "head_pose thresholds must be positive",
        )?;
        check(
            h.roll_warning_threshold > 0.0,
            "head_pose.roll_warning_threshold must be positive",
        )?;
        check(h.held_frames > 0, "head_pose.held_frames must be > 0")?;

        let s = &self.antispoof;
        check(
            s.history_len >= s.min_history && s.min_history >= 2,
            "antispoof.history_len must be >= min_history >= 2",
        )?;
        // ALIGN must not finish before the analyzer can reach a verdict.
        check(
            a.required_frames >= s.min_history,
            "alignment.required_frames must be >= antispoof.min_history",
        )?;
        check(s.static_window > 0, "antispoof.static_window must be > 0")?;
        check(
            s.static_fraction > 0.0 && s.static_fraction <= 1.0,
            "antispoof.static_fraction must be in (0, 1]",
        )?;
        check(
            s.score_threshold > 0.0,
            "antispoof.score_threshold must be positive",
        )?;

        Ok(())
    }
}
