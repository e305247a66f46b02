use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Malformed input or configuration. Unlike [`LivenessIssue`] these are
/// caller bugs, not conditions the subject can correct.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LivenessError {
    #[error("expected {expected} landmarks, got {got}")]
    LandmarkCount { expected: usize, got: usize },

    #[error("landmark {index} has a non-finite coordinate")]
    NonFiniteLandmark { index: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Heuristic that flagged a presentation attack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpoofReason {
    /// Depth spread across the face is too small for a real head.
    FlatFace,
    /// Mean inter-frame movement is below what involuntary motion produces.
    NoMicroMovement,
    /// Almost every recent frame is motionless.
    TooStatic,
}

impl fmt::Display for SpoofReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            SpoofReason::FlatFace => {
                "Flat face detected. Please use a live camera, not a photo or screen."
            }
            SpoofReason::NoMicroMovement => {
                "No natural movement detected. Please use a live camera."
            }
            SpoofReason::TooStatic => "Face is too static. Please move naturally.",
        };
        f.write_str(msg)
    }
}

/// Frame-scoped condition that suppresses progress until it clears.
///
/// None of these end the session; the `Display` text is what the subject
/// is shown as the current instruction.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LivenessIssue {
    #[error("No face detected. Please position your face in the frame.")]
    NoFaceDetected,

    #[error("Move your face inside the guide.")]
    OutOfGuide,

    #[error("Too close. Please move back a little.")]
    TooClose,

    #[error("Too far. Please move closer to the camera.")]
    TooFar,

    #[error("Keep your head level. Do not tilt it sideways.")]
    ExcessiveRoll,

    #[error("Alignment is required before this step.")]
    MissingBaseline,

    #[error("{0}")]
    SpoofSuspected(SpoofReason),
}

impl LivenessIssue {
    /// Whether this issue clears alignment and held-frame counters.
    pub fn resets_progress(&self) -> bool {
        matches!(
            self,
            LivenessIssue::NoFaceDetected
                | LivenessIssue::OutOfGuide
                | LivenessIssue::TooClose
                | LivenessIssue::TooFar
                | LivenessIssue::ExcessiveRoll
                | LivenessIssue::SpoofSuspected(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spoof_issue_displays_reason() {
        let issue = LivenessIssue::SpoofSuspected(SpoofReason::FlatFace);
        assert_eq!(issue.to_string(), SpoofReason::FlatFace.to_string());
    }

    #[test]
    fn test_missing_baseline_keeps_progress() {
        assert!(!LivenessIssue::MissingBaseline.resets_progress());
        assert!(LivenessIssue::TooClose.resets_progress());
    }
}
