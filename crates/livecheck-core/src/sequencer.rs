//! Top-level challenge sequencer.
//!
//! [`Verifier`] owns the current [`Session`] and is the single entry point for
//! frames. Processing is strictly sequential: the caller passes the frame and
//! the instant it was captured, the verifier runs geometry, anti-spoof and the
//! active gate to completion, and returns a status snapshot plus any events.
//! Delays (step cooldown, restart) are comparisons against that instant; no
//! timers run in the background.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::time::Instant;
use uuid::Uuid;

use crate::alignment::AlignmentOutcome;
use crate::blink::{BlinkOutcome, EyeState};
use crate::config::LivenessConfig;
use crate::error::{LivenessError, LivenessIssue};
use crate::geometry::{average_ear, pose_metrics};
use crate::head_pose::{PoseAxis, PoseOutcome};
use crate::landmarks::{FaceLandmarks, Rect};
use crate::result::{DeviceInfo, VerificationResult};
use crate::session::{generate_step_order, Challenge, Session, Stage};

/// One frame from the detection collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// First detected face, if any.
    pub face: Option<FaceLandmarks>,
    /// Guide region in the same pixel space as the landmarks.
    pub guide: Rect,
}

/// State transition the caller may want to act on.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum VerificationEvent {
    Started {
        session_id: Uuid,
        step_order: Vec<Challenge>,
    },
    StepCompleted {
        step: Challenge,
        next: Challenge,
    },
    Succeeded(VerificationResult),
}

/// Raw signals of the latest frame, for overlays and tuning.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct DebugMetrics {
    pub ear: f32,
    pub smoothed_ear: f32,
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
    pub spoof_score: Option<f32>,
    pub eye_displacement: Option<f32>,
}

/// Everything a UI needs to render the current frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub stage: Stage,
    pub instruction: String,
    pub issue: Option<LivenessIssue>,
    pub cooling_down: bool,
    pub aligned_frames: usize,
    pub held_frames: usize,
    pub blink_calibrated: bool,
    pub eye_state: Option<EyeState>,
    pub completed: usize,
    pub total: usize,
    pub metrics: DebugMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameReport {
    pub status: StatusSnapshot,
    pub events: Vec<VerificationEvent>,
}

pub struct Verifier {
    config: LivenessConfig,
    device_info: DeviceInfo,
    rng: StdRng,
    session: Option<Session>,
    pending_start: Option<Instant>,
    metrics: DebugMetrics,
}

impl Verifier {
    /// Verifier with a fresh random seed for step ordering.
    pub fn new(config: LivenessConfig, device_info: DeviceInfo) -> Result<Self, LivenessError> {
        Self::with_rng(config, device_info, StdRng::from_entropy())
    }

    /// Verifier whose step orders are reproducible from `seed`.
    pub fn with_seed(
        config: LivenessConfig,
        device_info: DeviceInfo,
        seed: u64,
    ) -> Result<Self, LivenessError> {
        Self::with_rng(config, device_info, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        config: LivenessConfig,
        device_info: DeviceInfo,
        rng: StdRng,
    ) -> Result<Self, LivenessError> {
        config.validate()?;
        Ok(Self {
            config,
            device_info,
            rng,
            session: None,
            pending_start: None,
            metrics: DebugMetrics::default(),
        })
    }

    pub fn config(&self) -> &LivenessConfig {
        &self.config
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Replace any session with a new one and enter its first step.
    pub fn start(&mut self, now: Instant) -> VerificationEvent {
        let order = generate_step_order(&mut self.rng);
        let session = Session::new(&self.config, order, now);
        let event = VerificationEvent::Started {
            session_id: session.session_id(),
            step_order: session.step_order().to_vec(),
        };

        tracing::info!(
            session_id = %session.session_id(),
            step_order = ?session.step_order(),
            "verification session started"
        );

        self.session = Some(session);
        self.pending_start = None;
        self.metrics = DebugMetrics::default();
        event
    }

    /// Drop the session now; a new one starts on the first frame after the
    /// restart delay.
    pub fn restart(&mut self, now: Instant) {
        if let Some(session) = self.session.take() {
            tracing::info!(
                session_id = %session.session_id(),
                completed = session.completed_steps().len(),
                "verification session discarded"
            );
        }
        self.pending_start = Some(now + self.config.restart_delay());
        self.metrics = DebugMetrics::default();
    }

    pub fn process_frame(&mut self, frame: &Frame, now: Instant) -> FrameReport {
        let mut events = Vec::new();

        if self.session.is_none() {
            match self.pending_start {
                Some(at) if now >= at => events.push(self.start(now)),
                _ => {
                    return FrameReport {
                        status: self.status(now),
                        events,
                    }
                }
            }
        }

        if let Some(event) = self.step(frame, now) {
            events.push(event);
        }

        FrameReport {
            status: self.status(now),
            events,
        }
    }

    fn step(&mut self, frame: &Frame, now: Instant) -> Option<VerificationEvent> {
        let session = self.session.as_mut()?;
        if session.is_complete {
            return None;
        }

        let Some(face) = frame.face.as_ref() else {
            self.metrics = DebugMetrics::default();
            session.reset_progress();
            session.last_error = Some(LivenessIssue::NoFaceDetected);
            return None;
        };

        let raw_ear = average_ear(face);
        let smoothed_ear = session.ear_filter.update(raw_ear);
        session.raw_ear = raw_ear;
        let pose = pose_metrics(face);

        // Anti-spoof sees every face frame, cooldown or not.
        let assessment = session.antispoof.observe(face).copied();
        self.metrics = DebugMetrics {
            ear: raw_ear,
            smoothed_ear,
            yaw: pose.yaw,
            pitch: pose.pitch,
            roll: pose.roll,
            spoof_score: assessment.map(|a| a.score),
            eye_displacement: assessment.map(|a| a.eye_stability.mean_eye_displacement),
        };

        if session.is_cooling_down(now) {
            session.last_error = None;
            return None;
        }
        session.cooldown_until = None;

        if let Some(a) = assessment.filter(|a| a.is_spoof) {
            session.reset_progress();
            session.last_error = a.reason.map(LivenessIssue::SpoofSuspected);
            return None;
        }

        let step = session.active_challenge()?;
        let completed = match step {
            Challenge::Align => match session.alignment.observe(face, &frame.guide, smoothed_ear) {
                AlignmentOutcome::Aligned { .. } => {
                    session.last_error = None;
                    false
                }
                AlignmentOutcome::Rejected(issue) => {
                    session.last_error = Some(issue);
                    false
                }
                AlignmentOutcome::Completed(baseline) => {
                    session.baseline = Some(baseline);
                    true
                }
            },

            Challenge::Blink => {
                session.last_error = None;
                match session.blink.observe(smoothed_ear, now) {
                    BlinkOutcome::Calibrated(calibration) => {
                        session.blink_calibration = Some(calibration);
                        false
                    }
                    BlinkOutcome::Blink => true,
                    BlinkOutcome::Calibrating { .. }
                    | BlinkOutcome::Watching(_)
                    | BlinkOutcome::CoolingDown => false,
                }
            }

            Challenge::TurnLeft
            | Challenge::TurnRight
            | Challenge::TurnUp
            | Challenge::TurnDown => {
                let direction = step.turn_direction()?;
                match session
                    .head_pose
                    .observe(direction, &pose, session.baseline.as_ref())
                {
                    PoseOutcome::Holding { .. } => {
                        session.last_error = None;
                        false
                    }
                    PoseOutcome::Rejected(issue) => {
                        session.last_error = Some(issue);
                        false
                    }
                    PoseOutcome::Completed { delta } => {
                        match direction.axis() {
                            PoseAxis::Yaw => session.yaw_deltas.push(delta),
                            PoseAxis::Pitch => session.pitch_deltas.push(delta),
                        }
                        true
                    }
                }
            }
        };

        if !completed {
            return None;
        }

        let cooldown_until = now + self.config.step_cooldown();
        match session.advance(now, cooldown_until) {
            Some(next) => {
                tracing::info!(
                    session_id = %session.session_id(),
                    step = ?step,
                    next = ?next,
                    completed = session.completed_steps().len(),
                    "challenge step completed"
                );
                Some(VerificationEvent::StepCompleted { step, next })
            }
            None => {
                let result = VerificationResult::from_session(session, self.device_info.clone());
                tracing::info!(
                    session_id = %result.session_id,
                    steps = result.steps_completed.len(),
                    "verification succeeded"
                );
                Some(VerificationEvent::Succeeded(result))
            }
        }
    }

    /// Snapshot of the current state without consuming a frame.
    pub fn status(&self, now: Instant) -> StatusSnapshot {
        let total = Challenge::ALL.len();
        let Some(session) = self.session.as_ref() else {
            return StatusSnapshot {
                stage: Stage::Idle,
                instruction: if self.pending_start.is_some() {
                    "Restarting…".to_string()
                } else {
                    "Press start to begin.".to_string()
                },
                issue: None,
                cooling_down: false,
                aligned_frames: 0,
                held_frames: 0,
                blink_calibrated: false,
                eye_state: None,
                completed: 0,
                total,
                metrics: self.metrics,
            };
        };

        let cooling_down = session.is_cooling_down(now);
        let issue = session.last_error();
        let instruction = match (issue, session.current_step()) {
            (Some(issue), _) => issue.to_string(),
            (None, Stage::Success) => "Verification complete.".to_string(),
            (None, Stage::Idle) => "Press start to begin.".to_string(),
            (None, Stage::Active(_)) if cooling_down => {
                "Great! Get ready for the next step.".to_string()
            }
            (None, Stage::Active(Challenge::Blink)) if !session.blink_gate().is_calibrated() => {
                "Look at the camera with your eyes open.".to_string()
            }
            (None, Stage::Active(step)) => step.instruction().to_string(),
        };

        StatusSnapshot {
            stage: session.current_step(),
            instruction,
            issue,
            cooling_down,
            aligned_frames: session.aligned_frames(),
            held_frames: session.head_pose_progress().held_frames,
            blink_calibrated: session.blink_gate().is_calibrated(),
            eye_state: session.blink_gate().eye_state(),
            completed: session.completed_steps().len(),
            total,
            metrics: self.metrics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ALIGN_REQUIRED_FRAMES, SPOOF_HISTORY_LEN, SPOOF_MIN_HISTORY};
    use crate::head_pose::TurnDirection;
    use crate::synth::{ScriptedSubject, SyntheticFace};
    use std::time::Duration;

    const FRAME: Duration = Duration::from_millis(83);

    fn verifier(seed: u64) -> Verifier {
        Verifier::with_seed(LivenessConfig::default(), DeviceInfo::current(), seed).unwrap()
    }

    fn guide() -> Rect {
        let c = crate::config::AlignmentConfig::default();
        Rect::centered_guide(640.0, 480.0, c.guide_width_ratio, c.guide_height_ratio)
    }

    #[test]
    fn test_idle_until_started() {
        let mut v = verifier(1);
        let t0 = Instant::now();
        let frame = Frame {
            face: Some(SyntheticFace::default().build().unwrap()),
            guide: guide(),
        };
        let report = v.process_frame(&frame, t0);
        assert_eq!(report.status.stage, Stage::Idle);
        assert!(report.events.is_empty());
        assert!(v.session().is_none());
    }

    #[test]
    fn test_start_enters_align() {
        let mut v = verifier(2);
        let event = v.start(Instant::now());
        let VerificationEvent::Started { step_order, .. } = event else {
            panic!("expected Started");
        };
        assert_eq!(step_order[0], Challenge::Align);
        assert_eq!(
            v.session().unwrap().current_step(),
            Stage::Active(Challenge::Align)
        );
    }

    #[test]
    fn test_no_face_reports_issue_and_resets() {
        let mut v = verifier(3);
        let t0 = Instant::now();
        v.start(t0);

        let mut subject = ScriptedSubject::new(SyntheticFace::default());
        let mut t = t0;
        for _ in 0..3 {
            t += FRAME;
            let status = v.status(t);
            let frame = Frame {
                face: Some(subject.face_for(&status).unwrap()),
                guide: guide(),
            };
            v.process_frame(&frame, t);
        }
        assert_eq!(v.session().unwrap().aligned_frames(), 3);
        assert!(v.status(t).metrics.ear > 0.0);

        let report = v.process_frame(
            &Frame {
                face: None,
                guide: guide(),
            },
            t + FRAME,
        );
        assert_eq!(report.status.issue, Some(LivenessIssue::NoFaceDetected));
        assert_eq!(report.status.aligned_frames, 0);
        // Overlay values from the last face must not linger.
        assert_eq!(report.status.metrics, DebugMetrics::default());
    }

    #[test]
    fn test_align_completes_into_cooldown() {
        let mut v = verifier(4);
        let t0 = Instant::now();
        v.start(t0);
        let mut subject = ScriptedSubject::new(SyntheticFace::default());

        let mut t = t0;
        let mut completed_at = None;
        for _ in 0..ALIGN_REQUIRED_FRAMES {
            t += FRAME;
            let status = v.status(t);
            let frame = Frame {
                face: Some(subject.face_for(&status).unwrap()),
                guide: guide(),
            };
            let report = v.process_frame(&frame, t);
            if let Some(VerificationEvent::StepCompleted { step, .. }) = report.events.first() {
                assert_eq!(*step, Challenge::Align);
                completed_at = Some(t);
                assert!(report.status.cooling_down);
            }
        }

        let completed_at = completed_at.expect("align should complete");
        let session = v.session().unwrap();
        assert!(session.baseline().is_some());
        assert_eq!(session.completed_steps(), &[Challenge::Align]);
        assert_eq!(
            session.step_entered_at(),
            completed_at + v.config().step_cooldown()
        );
    }

    #[test]
    fn test_static_photo_never_aligns() {
        let mut v = verifier(5);
        let t0 = Instant::now();
        v.start(t0);
        let photo = SyntheticFace {
            depth: 0.0,
            ..SyntheticFace::default()
        }
        .build()
        .unwrap();

        let mut t = t0;
        let mut last = None;
        for _ in 0..ALIGN_REQUIRED_FRAMES * 5 {
            t += FRAME;
            let report = v.process_frame(
                &Frame {
                    face: Some(photo.clone()),
                    guide: guide(),
                },
                t,
            );
            assert!(report.events.is_empty());
            last = Some(report);
        }

        let status = last.unwrap().status;
        assert!(matches!(status.issue, Some(LivenessIssue::SpoofSuspected(_))));
        assert_eq!(status.stage, Stage::Active(Challenge::Align));
        assert!(v.session().unwrap().baseline().is_none());
        assert!(v.session().unwrap().antispoof().len() >= SPOOF_MIN_HISTORY);
    }

    #[test]
    fn test_restart_waits_for_delay() {
        let mut v = verifier(6);
        let t0 = Instant::now();
        v.start(t0);
        let first_id = v.session().unwrap().session_id();

        v.restart(t0);
        assert!(v.session().is_none());

        let frame = Frame {
            face: Some(SyntheticFace::default().build().unwrap()),
            guide: guide(),
        };
        let early = v.process_frame(&frame, t0 + Duration::from_millis(100));
        assert!(early.events.is_empty());
        assert_eq!(early.status.stage, Stage::Idle);

        let later = v.process_frame(&frame, t0 + v.config().restart_delay());
        assert!(matches!(
            later.events.first(),
            Some(VerificationEvent::Started { .. })
        ));
        let session = v.session().unwrap();
        assert_ne!(session.session_id(), first_id);
        assert!(session.baseline().is_none());
        assert_eq!(session.antispoof().len(), 1);
    }

    /// Feed a cooperative subject until ALIGN completes; returns the completion instant.
    fn complete_align(v: &mut Verifier, t0: Instant) -> Instant {
        let mut subject = ScriptedSubject::new(SyntheticFace::default());
        let mut t = t0;
        for _ in 0..ALIGN_REQUIRED_FRAMES * 3 {
            t += FRAME;
            let status = v.status(t);
            let frame = Frame {
                face: Some(subject.face_for(&status).unwrap()),
                guide: guide(),
            };
            let report = v.process_frame(&frame, t);
            if !report.events.is_empty() {
                return t;
            }
        }
        panic!("align did not complete");
    }

    /// Live face (small alternating shift) performing `step`.
    fn performing(step: Challenge, k: usize) -> FaceLandmarks {
        let mut face = SyntheticFace {
            center: (320.0 + (k % 2) as f32 * 2.0, 240.0 + (k % 3) as f32),
            ..SyntheticFace::default()
        };
        match step.turn_direction() {
            Some(TurnDirection::Left) => face.yaw -= 0.15,
            Some(TurnDirection::Right) => face.yaw += 0.15,
            Some(TurnDirection::Up) => face.pitch -= 0.12,
            Some(TurnDirection::Down) => face.pitch += 0.12,
            None => {}
        }
        face.build().unwrap()
    }

    #[test]
    fn test_cooldown_suspends_gating_but_not_antispoof() {
        let mut v = verifier(8);
        let t0 = Instant::now();
        v.start(t0);
        let completed_at = complete_align(&mut v, t0);
        let next = v.session().unwrap().active_challenge().unwrap();
        let history_before = v.session().unwrap().antispoof().len();

        // Perform the next challenge at 20 ms spacing, entirely inside the cooldown.
        let spacing = Duration::from_millis(20);
        let frames = 15;
        for k in 0..frames {
            let t = completed_at + spacing * (k as u32 + 1);
            assert!(t < completed_at + v.config().step_cooldown());
            let report = v.process_frame(
                &Frame {
                    face: Some(performing(next, k)),
                    guide: guide(),
                },
                t,
            );
            assert!(report.events.is_empty());
            assert!(report.status.cooling_down);
        }

        let session = v.session().unwrap();
        assert_eq!(session.completed_steps(), &[Challenge::Align]);
        assert_eq!(session.head_pose_progress().held_frames, 0);
        assert!(!session.blink_gate().is_calibrated());
        assert_eq!(
            session.antispoof().len(),
            (history_before + frames).min(SPOOF_HISTORY_LEN)
        );

        // The same action after the cooldown earns progress.
        let mut t = completed_at + v.config().step_cooldown();
        let mut progressed = false;
        for k in 0..ALIGN_REQUIRED_FRAMES + 2 {
            t += FRAME;
            let report = v.process_frame(
                &Frame {
                    face: Some(performing(next, k)),
                    guide: guide(),
                },
                t,
            );
            progressed |= !report.events.is_empty() || report.status.blink_calibrated;
        }
        assert!(progressed, "no progress on {next:?} after cooldown");
    }

    #[test]
    fn test_progress_resumes_once_spoof_clears() {
        let mut v = verifier(9);
        let t0 = Instant::now();
        v.start(t0);

        let photo = SyntheticFace {
            depth: 0.0,
            ..SyntheticFace::default()
        }
        .build()
        .unwrap();
        let mut t = t0;
        for _ in 0..SPOOF_MIN_HISTORY {
            t += FRAME;
            v.process_frame(
                &Frame {
                    face: Some(photo.clone()),
                    guide: guide(),
                },
                t,
            );
        }
        let status = v.status(t);
        assert!(matches!(status.issue, Some(LivenessIssue::SpoofSuspected(_))));
        assert_eq!(status.aligned_frames, 0);

        let mut subject = ScriptedSubject::new(SyntheticFace::default());
        let mut aligned_at = None;
        for k in 0..ALIGN_REQUIRED_FRAMES * 3 {
            t += FRAME;
            let status = v.status(t);
            let report = v.process_frame(
                &Frame {
                    face: Some(subject.face_for(&status).unwrap()),
                    guide: guide(),
                },
                t,
            );
            if let Some(VerificationEvent::StepCompleted { step, .. }) = report.events.first() {
                assert_eq!(*step, Challenge::Align);
                aligned_at = Some(k);
                break;
            }
        }

        assert!(aligned_at.is_some(), "alignment never resumed after spoof cleared");
        let session = v.session().unwrap();
        assert!(!session.antispoof().is_spoof());
        assert!(session.baseline().is_some());
    }

    #[test]
    fn test_shortest_alignment_still_blocks_photo() {
        let mut config = LivenessConfig::default();
        config.alignment.required_frames = SPOOF_MIN_HISTORY;
        let mut v = Verifier::with_seed(config, DeviceInfo::current(), 10).unwrap();
        let t0 = Instant::now();
        v.start(t0);

        let photo = SyntheticFace {
            depth: 0.0,
            ..SyntheticFace::default()
        }
        .build()
        .unwrap();
        let mut t = t0;
        for _ in 0..SPOOF_MIN_HISTORY * 4 {
            t += FRAME;
            let report = v.process_frame(
                &Frame {
                    face: Some(photo.clone()),
                    guide: guide(),
                },
                t,
            );
            assert!(report.events.is_empty());
        }
        assert!(v.session().unwrap().baseline().is_none());
    }

    #[test]
    fn test_alignment_shorter_than_spoof_history_rejected() {
        let mut config = LivenessConfig::default();
        config.alignment.required_frames = SPOOF_MIN_HISTORY - 3;
        assert!(matches!(
            Verifier::with_seed(config, DeviceInfo::current(), 0),
            Err(LivenessError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = LivenessConfig {
            target_fps: 0.0,
            ..LivenessConfig::default()
        };
        assert!(Verifier::with_seed(config, DeviceInfo::current(), 0).is_err());
    }
}
