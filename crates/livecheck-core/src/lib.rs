//! Challenge-response liveness verification.
//!
//! Frames of face-mesh landmarks go in; instructions, progress and a terminal
//! result come out. The subject is asked to align, blink and turn their head
//! in a per-session random order, while an anti-spoof analyzer watches every
//! frame for the flat, motionless signature of a photo or screen.
//!
//! Entry point is [`Verifier::process_frame`]. The crate does no I/O, spawns
//! no threads and keeps nothing once a session ends.

pub mod alignment;
pub mod antispoof;
pub mod blink;
pub mod config;
pub mod error;
pub mod geometry;
pub mod head_pose;
pub mod landmarks;
pub mod result;
pub mod sequencer;
pub mod session;
pub mod smoothing;
pub mod synth;

pub use alignment::Baseline;
pub use antispoof::SpoofAssessment;
pub use blink::{BlinkCalibration, EyeState};
pub use config::LivenessConfig;
pub use error::{LivenessError, LivenessIssue, SpoofReason};
pub use landmarks::{FaceLandmarks, Point3, Rect, LANDMARK_COUNT};
pub use result::{DeviceInfo, MetricsSummary, VerificationResult};
pub use sequencer::{Frame, FrameReport, StatusSnapshot, VerificationEvent, Verifier};
pub use session::{Challenge, Session, Stage};
