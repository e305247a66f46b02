//! Presentation-attack heuristics over a rolling window of frames.
//!
//! A printed photo or a phone screen held in front of the camera is flat and
//! still: every keypoint sits at nearly the same depth, and the face barely
//! moves between frames. A live head has tens of pixels of depth relief and
//! exhibits involuntary micro-movement even when the subject tries to hold
//! perfectly still.
//!
//! The analyzer keeps a bounded history of per-frame [`FrameSnapshot`]s and
//! scores three independent indicators:
//!
//! 1. mean depth variance below a floor (flat face),
//! 2. mean micro-movement below a floor (no natural movement),
//! 3. most recent movement scores nearly all zero (face too static).
//!
//! Each triggered indicator adds a fixed weight; the sum is compared to a
//! threshold. This is a heuristic ensemble, not a classifier.
//!
//! # Threat Coverage
//!
//! - **Blocks:** Printed photographs, still images on a screen, frozen video frames.
//! - **Does not block:** Video replay with natural motion and depth estimated
//!   by the detector, 3D masks, adversarial displays. The randomized challenge
//!   order is what makes pre-recorded video impractical.

use serde::Serialize;
use std::collections::VecDeque;

use crate::config::AntiSpoofConfig;
use crate::error::SpoofReason;
use crate::geometry::bounding_box;
use crate::landmarks::{FaceLandmarks, LEFT_EYE, RIGHT_EYE};
use crate::smoothing::sma;

/// Per-frame summary kept in the analyzer history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrameSnapshot {
    pub centroid: (f32, f32),
    pub width: f32,
    pub avg_depth: f32,
    /// Population standard deviation of keypoint depth; 0 without depth.
    pub depth_variance: f32,
    /// Eye centres, right eye (image left) first.
    pub eye_centres: [(f32, f32); 2],
    /// Movement relative to the previous snapshot, set when pushed.
    pub movement: Option<f32>,
}

impl FrameSnapshot {
    pub fn from_landmarks(face: &FaceLandmarks, min_depth_points: usize) -> Self {
        let points = face.points();
        let n = points.len() as f32;
        let (sx, sy) = points
            .iter()
            .fold((0.0f32, 0.0f32), |(sx, sy), p| (sx + p.x, sy + p.y));
        let (avg_depth, depth_variance) = depth_stats(face, min_depth_points);

        Self {
            centroid: (sx / n, sy / n),
            width: bounding_box(face).width,
            avg_depth,
            depth_variance,
            eye_centres: [face.eye_centre(&RIGHT_EYE), face.eye_centre(&LEFT_EYE)],
            movement: None,
        }
    }
}

/// Mean and population standard deviation of the depth coordinate.
///
/// Returns `(0, 0)` when fewer than `min_points` keypoints carry depth.
pub fn depth_stats(face: &FaceLandmarks, min_points: usize) -> (f32, f32) {
    let depths: Vec<f32> = face.points().iter().filter_map(|p| p.z).collect();
    if depths.is_empty() || depths.len() < min_points {
        return (0.0, 0.0);
    }

    let mean = sma(depths.iter().copied());
    let variance = sma(depths.iter().map(|z| (z - mean) * (z - mean)));
    (mean, variance.sqrt())
}

/// Normalized displacement between two snapshots.
///
/// Centroid shift and width change are divided by the current face width so
/// the score does not depend on distance to the camera.
pub fn movement_score(prev: &FrameSnapshot, curr: &FrameSnapshot, depth_scale: f32) -> f32 {
    if curr.width <= 0.0 {
        return 0.0;
    }

    let dx = curr.centroid.0 - prev.centroid.0;
    let dy = curr.centroid.1 - prev.centroid.1;
    let displacement = (dx * dx + dy * dy).sqrt() / curr.width;
    let width_change = (curr.width - prev.width).abs() / curr.width;
    let depth_change = depth_scale * (curr.avg_depth - prev.avg_depth).abs() / curr.width;

    displacement + width_change + depth_change
}

/// Eye-centre displacement across consecutive snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EyeStability {
    /// Mean Euclidean displacement of both eye centres, in pixels.
    pub mean_eye_displacement: f32,
    pub frame_pairs_analysed: usize,
}

/// Mean eye movement over a snapshot sequence; zero pairs for fewer than two frames.
pub fn eye_stability<'a, I>(snapshots: I) -> EyeStability
where
    I: IntoIterator<Item = &'a FrameSnapshot>,
{
    let mut total_displacement = 0.0f32;
    let mut pair_count = 0usize;
    let mut prev: Option<&FrameSnapshot> = None;

    for curr in snapshots {
        if let Some(prev) = prev {
            let disp = |i: usize| {
                let dx = curr.eye_centres[i].0 - prev.eye_centres[i].0;
                let dy = curr.eye_centres[i].1 - prev.eye_centres[i].1;
                (dx * dx + dy * dy).sqrt()
            };
            total_displacement += (disp(0) + disp(1)) / 2.0;
            pair_count += 1;
        }
        prev = Some(curr);
    }

    EyeStability {
        mean_eye_displacement: if pair_count > 0 {
            total_displacement / pair_count as f32
        } else {
            0.0
        },
        frame_pairs_analysed: pair_count,
    }
}

/// Score over the current history. Not stored beyond the latest frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpoofAssessment {
    pub score: f32,
    pub is_spoof: bool,
    /// First triggered indicator in check order.
    pub reason: Option<SpoofReason>,
    pub mean_depth_variance: f32,
    pub mean_movement: Option<f32>,
    pub static_fraction: Option<f32>,
    pub eye_stability: EyeStability,
}

#[derive(Debug, Clone)]
pub struct AntiSpoofAnalyzer {
    config: AntiSpoofConfig,
    history: VecDeque<FrameSnapshot>,
    assessment: Option<SpoofAssessment>,
}

impl AntiSpoofAnalyzer {
    pub fn new(config: AntiSpoofConfig) -> Self {
        Self {
            config,
            history: VecDeque::with_capacity(config.history_len),
            assessment: None,
        }
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.assessment = None;
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn history(&self) -> impl Iterator<Item = &FrameSnapshot> {
        self.history.iter()
    }

    /// Latest assessment, `None` until `min_history` frames are held.
    pub fn assessment(&self) -> Option<&SpoofAssessment> {
        self.assessment.as_ref()
    }

    pub fn is_spoof(&self) -> bool {
        self.assessment.is_some_and(|a| a.is_spoof)
    }

    pub fn observe(&mut self, face: &FaceLandmarks) -> Option<&SpoofAssessment> {
        let snapshot = FrameSnapshot::from_landmarks(face, self.config.min_depth_points);
        self.push(snapshot)
    }

    /// Append a snapshot, evicting the oldest when full, and re-score.
    pub fn push(&mut self, mut snapshot: FrameSnapshot) -> Option<&SpoofAssessment> {
        snapshot.movement = self
            .history
            .back()
            .map(|prev| movement_score(prev, &snapshot, self.config.depth_movement_scale));

        if self.history.len() >= self.config.history_len {
            self.history.pop_front();
        }
        self.history.push_back(snapshot);

        let was_spoof = self.is_spoof();
        self.assessment = self.assess();

        match self.assessment {
            Some(a) if a.is_spoof && !was_spoof => {
                tracing::warn!(
                    score = a.score,
                    reason = ?a.reason,
                    mean_depth_variance = a.mean_depth_variance,
                    mean_movement = ?a.mean_movement,
                    "spoof suspected"
                );
            }
            Some(a) if !a.is_spoof && was_spoof => {
                tracing::info!(score = a.score, "spoof suspicion cleared");
            }
            _ => {}
        }

        self.assessment.as_ref()
    }

    fn assess(&self) -> Option<SpoofAssessment> {
        let c = &self.config;
        if self.history.len() < c.min_history {
            return None;
        }

        let mut score = 0.0f32;
        let mut reason = None;
        let mut trigger = |weight: f32, why: SpoofReason| {
            score += weight;
            reason.get_or_insert(why);
        };

        let mean_depth_variance = sma(self.history.iter().map(|s| s.depth_variance));
        if mean_depth_variance < c.depth_variance_floor {
            trigger(c.weight_flat, SpoofReason::FlatFace);
        }

        let movements: Vec<f32> = self.history.iter().filter_map(|s| s.movement).collect();
        let mut mean_movement = None;
        let mut static_fraction = None;

        if movements.len() >= c.min_movement_samples {
            let mean = sma(movements.iter().copied());
            mean_movement = Some(mean);
            if mean < c.movement_floor {
                trigger(c.weight_no_movement, SpoofReason::NoMicroMovement);
            }

            let recent = &movements[movements.len().saturating_sub(c.static_window)..];
            let still = recent.iter().filter(|&&m| m < c.static_epsilon).count();
            let fraction = still as f32 / recent.len() as f32;
            static_fraction = Some(fraction);
            if fraction > c.static_fraction {
                trigger(c.weight_static, SpoofReason::TooStatic);
            }
        }

        Some(SpoofAssessment {
            score,
            is_spoof: score >= c.score_threshold,
            reason,
            mean_depth_variance,
            mean_movement,
            static_fraction,
            eye_stability: eye_stability(self.history.iter()),
        })
    }
}
