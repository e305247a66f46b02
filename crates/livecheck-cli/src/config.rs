use anyhow::{bail, Context, Result};
use livecheck_core::{LivenessConfig, Rect};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// CLI configuration: an optional TOML file, then `LIVECHECK_*` environment
/// overrides on top.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Width of the frames the landmarks were measured in, in pixels.
    pub frame_width: f32,
    /// Height of the frames the landmarks were measured in, in pixels.
    pub frame_height: f32,
    /// Gate, smoothing and anti-spoof tuning.
    pub liveness: LivenessConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            frame_width: 640.0,
            frame_height: 480.0,
            liveness: LivenessConfig::default(),
        }
    }
}

impl Config {
    /// Load from `path` (if given), apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                Self::from_toml_str(&text)
                    .with_context(|| format!("failed to parse {}", path.display()))?
            }
            None => Self::default(),
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Frame dimensions must be positive and finite; the guide and the
    /// synthetic subject are both derived from them.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("frame_width", self.frame_width),
            ("frame_height", self.frame_height),
        ] {
            if !value.is_finite() || value <= 0.0 {
                bail!("{name} must be a positive number of pixels, got {value}");
            }
        }
        self.liveness
            .validate()
            .context("invalid liveness configuration")
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Override individual settings from `LIVECHECK_*` environment variables.
    /// Unset or unparsable variables keep the current value.
    pub fn apply_env(&mut self) {
        self.frame_width = env_f32("LIVECHECK_FRAME_WIDTH", self.frame_width);
        self.frame_height = env_f32("LIVECHECK_FRAME_HEIGHT", self.frame_height);

        let l = &mut self.liveness;
        l.target_fps = env_f32("LIVECHECK_TARGET_FPS", l.target_fps);
        l.ema_alpha = env_f32("LIVECHECK_EMA_ALPHA", l.ema_alpha);
        l.step_cooldown_ms = env_u64("LIVECHECK_STEP_COOLDOWN_MS", l.step_cooldown_ms);
        l.restart_delay_ms = env_u64("LIVECHECK_RESTART_DELAY_MS", l.restart_delay_ms);

        l.alignment.required_frames =
            env_usize("LIVECHECK_ALIGN_REQUIRED_FRAMES", l.alignment.required_frames);
        l.alignment.margin = env_f32("LIVECHECK_GUIDE_MARGIN", l.alignment.margin);

        l.blink.calibration_frames =
            env_usize("LIVECHECK_BLINK_CALIBRATION_FRAMES", l.blink.calibration_frames);
        l.blink.closed_ratio = env_f32("LIVECHECK_BLINK_CLOSED_RATIO", l.blink.closed_ratio);
        l.blink.cooldown_ms = env_u64("LIVECHECK_BLINK_COOLDOWN_MS", l.blink.cooldown_ms);

        l.head_pose.yaw_threshold = env_f32("LIVECHECK_YAW_THRESHOLD", l.head_pose.yaw_threshold);
        l.head_pose.pitch_threshold =
            env_f32("LIVECHECK_PITCH_THRESHOLD", l.head_pose.pitch_threshold);
        l.head_pose.held_frames = env_usize("LIVECHECK_POSE_HELD_FRAMES", l.head_pose.held_frames);

        l.antispoof.score_threshold =
            env_f32("LIVECHECK_SPOOF_SCORE_THRESHOLD", l.antispoof.score_threshold);
    }

    /// Guide region centred in the configured frame.
    pub fn guide(&self) -> Rect {
        let a = &self.liveness.alignment;
        Rect::centered_guide(
            self.frame_width,
            self.frame_height,
            a.guide_width_ratio,
            a.guide_height_ratio,
        )
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
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
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            frame_width = 1280.0

            [liveness]
            step_cooldown_ms = 1000

            [liveness.head_pose]
            yaw_threshold = 0.12
            "#,
        )
        .unwrap();

        assert_eq!(config.frame_width, 1280.0);
        assert_eq!(config.frame_height, 480.0);
        assert_eq!(config.liveness.step_cooldown_ms, 1000);
        assert_eq!(config.liveness.head_pose.yaw_threshold, 0.12);
        assert_eq!(
            config.liveness.head_pose.pitch_threshold,
            LivenessConfig::default().head_pose.pitch_threshold
        );
        assert_eq!(config.liveness.blink, LivenessConfig::default().blink);
    }

    #[test]
    fn test_toml_round_trips_through_printer() {
        let config = Config::default();
        let text = config.to_toml_string().unwrap();
        assert!(text.contains("[liveness.antispoof]"));
        assert_eq!(Config::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_rejects_unknown_types() {
        assert!(Config::from_toml_str("frame_width = \"wide\"").is_err());
    }

    #[test]
    fn test_rejects_unusable_frame_size() {
        assert!(Config::default().validate().is_ok());

        let nan = Config::from_toml_str("frame_width = nan").unwrap();
        let err = nan.validate().unwrap_err();
        assert!(err.to_string().contains("frame_width"));

        let negative = Config {
            frame_height: -480.0,
            ..Config::default()
        };
        assert!(negative.validate().is_err());

        let infinite = Config {
            frame_width: f32::INFINITY,
            ..Config::default()
        };
        assert!(infinite.validate().is_err());
    }

    #[test]
    fn test_validate_covers_liveness_table() {
        let mut config = Config::default();
        config.liveness.alignment.required_frames = 3;
        let err = config.validate().unwrap_err();
        assert!(format!("{err:#}").contains("required_frames"));
    }

    #[test]
    fn test_guide_is_centred() {
        let guide = Config::default().guide();
        let (cx, cy) = guide.center();
        assert!((cx - 320.0).abs() < 1e-3);
        assert!((cy - 240.0).abs() < 1e-3);
        assert!((guide.width - 352.0).abs() < 1e-3);
    }

    #[test]
    fn test_env_override_applies() {
        std::env::set_var("LIVECHECK_POSE_HELD_FRAMES", "6");
        std::env::set_var("LIVECHECK_EMA_ALPHA", "not-a-number");
        let mut config = Config::default();
        config.apply_env();
        std::env::remove_var("LIVECHECK_POSE_HELD_FRAMES");
        std::env::remove_var("LIVECHECK_EMA_ALPHA");

        assert_eq!(config.liveness.head_pose.held_frames, 6);
        assert_eq!(config.liveness.ema_alpha, LivenessConfig::default().ema_alpha);
    }
}
