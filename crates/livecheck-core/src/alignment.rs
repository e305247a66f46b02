use serde::Serialize;

use crate::config::AlignmentConfig;
use crate::error::LivenessIssue;
use crate::geometry::{bounding_box, pose_metrics};
use crate::landmarks::{FaceLandmarks, Rect};

/// Reference pose, size and eye opening captured when alignment completes.
///
/// Every later turn is measured as a delta from these values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Baseline {
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
    pub face_width: f32,
    pub face_height: f32,
    pub open_ear: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AlignmentOutcome {
    /// Face is placed correctly; `aligned_frames` consecutive frames so far.
    Aligned { aligned_frames: usize },
    /// Placement is wrong this frame and the counter was reset.
    Rejected(LivenessIssue),
    /// Required frame count reached. Reported exactly once.
    Completed(Baseline),
}

/// Counts consecutive frames with the face inside the guide.
///
/// Any out-of-guide or wrongly sized frame resets the count to zero, with no
/// partial credit.
#[derive(Debug, Clone)]
pub struct AlignmentGate {
    config: AlignmentConfig,
    aligned_frames: usize,
    completed: bool,
}

impl AlignmentGate {
    pub fn new(config: AlignmentConfig) -> Self {
        Self {
            config,
            aligned_frames: 0,
            completed: false,
        }
    }

    pub fn aligned_frames(&self) -> usize {
        self.aligned_frames
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn reset(&mut self) {
        self.aligned_frames = 0;
        self.completed = false;
    }

    /// Clear the consecutive-frame counter without forgetting completion.
    pub fn reset_progress(&mut self) {
        self.aligned_frames = 0;
    }

    /// Check size band first, then guide containment.
    pub fn check_placement(&self, face_box: &Rect, guide: &Rect) -> Result<(), LivenessIssue> {
        if guide.width <= 0.0 || guide.height <= 0.0 {
            return Err(LivenessIssue::OutOfGuide);
        }

        let ratio = face_box.width / guide.width;
        if ratio < self.config.min_face_ratio {
            return Err(LivenessIssue::TooFar);
        }
        if ratio > self.config.max_face_ratio {
            return Err(LivenessIssue::TooClose);
        }

        if !guide.expanded(self.config.margin).contains(face_box) {
            return Err(LivenessIssue::OutOfGuide);
        }

        Ok(())
    }

    /// Evaluate one frame. `open_ear` is the current smoothed EAR, stored in
    /// the baseline as the open-eye snapshot.
    pub fn observe(
        &mut self,
        face: &FaceLandmarks,
        guide: &Rect,
        open_ear: f32,
    ) -> AlignmentOutcome {
        let face_box = bounding_box(face);

        if let Err(issue) = self.check_placement(&face_box, guide) {
            if self.aligned_frames > 0 {
                tracing::debug!(
                    aligned_frames = self.aligned_frames,
                    issue = ?issue,
                    "alignment lost, counter reset"
                );
            }
            self.aligned_frames = 0;
            return AlignmentOutcome::Rejected(issue);
        }

        if self.completed {
            return AlignmentOutcome::Aligned {
                aligned_frames: self.aligned_frames,
            };
        }

        self.aligned_frames += 1;
        if self.aligned_frames < self.config.required_frames {
            return AlignmentOutcome::Aligned {
                aligned_frames: self.aligned_frames,
            };
        }

        self.completed = true;
        let pose = pose_metrics(face);
        let baseline = Baseline {
            yaw: pose.yaw,
            pitch: pose.pitch,
            roll: pose.roll,
            face_width: face_box.width,
            face_height: face_box.height,
            open_ear,
        };

        tracing::info!(
            yaw = baseline.yaw,
            pitch = baseline.pitch,
            roll = baseline.roll,
            face_width = baseline.face_width,
            open_ear = baseline.open_ear,
            "alignment complete, baseline captured"
        );

        AlignmentOutcome::Completed(baseline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ALIGN_REQUIRED_FRAMES;
    use crate::synth::SyntheticFace;

    fn guide() -> Rect {
        Rect::centered_guide(640.0, 480.0, 0.55, 0.75)
    }

    fn centred_face() -> FaceLandmarks {
        SyntheticFace::default().build().unwrap()
    }

    fn shifted_face(dx: f32) -> FaceLandmarks {
        SyntheticFace {
            center: (320.0 + dx, 240.0),
            ..SyntheticFace::default()
        }
        .build()
        .unwrap()
    }

    #[test]
    fn test_completes_after_required_frames() {
        let mut gate = AlignmentGate::new(AlignmentConfig::default());
        let face = centred_face();
        let mut completions = 0;
        let mut baseline = None;

        for _ in 0..ALIGN_REQUIRED_FRAMES {
            if let AlignmentOutcome::Completed(b) = gate.observe(&face, &guide(), 0.3) {
                completions += 1;
                baseline = Some(b);
            }
        }

        assert_eq!(completions, 1);
        let baseline = baseline.unwrap();
        assert!((baseline.open_ear - 0.3).abs() < 1e-6);
        assert!(baseline.face_width > 0.0);

        // Further frames never complete a second time.
        for _ in 0..ALIGN_REQUIRED_FRAMES {
            assert!(!matches!(
                gate.observe(&face, &guide(), 0.3),
                AlignmentOutcome::Completed(_)
            ));
        }
    }

    #[test]
    fn test_out_of_guide_frame_resets_counter() {
        let mut gate = AlignmentGate::new(AlignmentConfig::default());
        let inside = centred_face();
        let outside = shifted_face(250.0);

        for _ in 0..ALIGN_REQUIRED_FRAMES - 1 {
            gate.observe(&inside, &guide(), 0.3);
        }
        assert_eq!(gate.aligned_frames(), ALIGN_REQUIRED_FRAMES - 1);

        let outcome = gate.observe(&outside, &guide(), 0.3);
        assert_eq!(outcome, AlignmentOutcome::Rejected(LivenessIssue::OutOfGuide));
        assert_eq!(gate.aligned_frames(), 0);
    }

    #[test]
    fn test_margin_tolerates_small_overhang() {
        let gate = AlignmentGate::new(AlignmentConfig::default());
        let g = guide();
        let face_box = Rect::new(g.x - 5.0, g.y + 10.0, 200.0, 200.0);
        assert_eq!(gate.check_placement(&face_box, &g), Ok(()));
    }

    #[test]
    fn test_size_band() {
        let gate = AlignmentGate::new(AlignmentConfig::default());
        let g = guide();
        let (cx, cy) = g.center();

        let tiny = Rect::new(cx - 20.0, cy - 20.0, 40.0, 40.0);
        assert_eq!(gate.check_placement(&tiny, &g), Err(LivenessIssue::TooFar));

        let huge = Rect::new(g.x - 10.0, g.y, g.width * 1.1, g.height);
        assert_eq!(gate.check_placement(&huge, &g), Err(LivenessIssue::TooClose));
    }

    #[test]
    fn test_size_violation_resets_counter() {
        let mut gate = AlignmentGate::new(AlignmentConfig::default());
        let face = centred_face();
        for _ in 0..3 {
            gate.observe(&face, &guide(), 0.3);
        }

        let far = SyntheticFace {
            width: 80.0,
            height: 100.0,
            ..SyntheticFace::default()
        }
        .build()
        .unwrap();
        assert_eq!(
            gate.observe(&far, &guide(), 0.3),
            AlignmentOutcome::Rejected(LivenessIssue::TooFar)
        );
        assert_eq!(gate.aligned_frames(), 0);
    }

    #[test]
    fn test_degenerate_guide_rejected() {
        let gate = AlignmentGate::new(AlignmentConfig::default());
        let face_box = Rect::new(0.0, 0.0, 10.0, 10.0);
        let guide = Rect::new(0.0, 0.0, 0.0, 0.0);
        assert_eq!(
            gate.check_placement(&face_box, &guide),
            Err(LivenessIssue::OutOfGuide)
        );
    }
}
