//! Stateless measurements derived from a single frame's keypoints.
//!
//! Every pose metric is a ratio of landmark distances, so the values do not
//! depend on the subject's distance from the camera or on the sensor
//! resolution. That is what lets the gate thresholds be fixed constants.

use serde::Serialize;

use crate::landmarks::{
    FaceLandmarks, Rect, CHEEK_IMAGE_LEFT, CHEEK_IMAGE_RIGHT, CHIN, FOREHEAD, LEFT_EYE,
    LEFT_EYE_OUTER, NOSE_TIP, RIGHT_EYE, RIGHT_EYE_OUTER,
};

/// Head tilt that maps to a roll metric of 1.0.
pub const ROLL_REFERENCE_DEG: f32 = 30.0;

/// Yaw, pitch and roll of one frame in normalized units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PoseMetrics {
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
}

/// Tight box around every keypoint.
pub fn bounding_box(face: &FaceLandmarks) -> Rect {
    let mut min_x = f32::INFINITY;
    let mut min_y = f32::INFINITY;
    let mut max_x = f32::NEG_INFINITY;
    let mut max_y = f32::NEG_INFINITY;

    for p in face.points() {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }

    Rect::from_bounds(min_x, min_y, max_x, max_y)
}

/// Eye aspect ratio over six ordered eye landmarks.
///
/// `(|p2 - p6| + |p3 - p5|) / (2 |p1 - p4|)`, or 0 when the eye has no width.
pub fn eye_aspect_ratio(face: &FaceLandmarks, eye: &[usize; 6]) -> f32 {
    let p = |i: usize| face.point(eye[i]);

    let horizontal = p(0).distance_2d(&p(3));
    if horizontal <= 0.0 {
        return 0.0;
    }

    let vertical_1 = p(1).distance_2d(&p(5));
    let vertical_2 = p(2).distance_2d(&p(4));
    (vertical_1 + vertical_2) / (2.0 * horizontal)
}

/// Mean EAR of both eyes.
pub fn average_ear(face: &FaceLandmarks) -> f32 {
    (eye_aspect_ratio(face, &LEFT_EYE) + eye_aspect_ratio(face, &RIGHT_EYE)) / 2.0
}

/// Cheek-to-cheek distance.
pub fn face_width(face: &FaceLandmarks) -> f32 {
    face.point(CHEEK_IMAGE_LEFT)
        .distance_2d(&face.point(CHEEK_IMAGE_RIGHT))
}

/// Forehead-to-chin distance.
pub fn face_height(face: &FaceLandmarks) -> f32 {
    face.point(FOREHEAD).distance_2d(&face.point(CHIN))
}

/// Horizontal nose offset from the cheek midpoint over face width.
///
/// The sign is inverted so that the value follows the subject's own frame:
/// turning to their left moves the nose toward image right and gives a
/// negative yaw.
pub fn yaw_metric(face: &FaceLandmarks) -> f32 {
    let width = face_width(face);
    if width <= 0.0 {
        return 0.0;
    }

    let left = face.point(CHEEK_IMAGE_LEFT);
    let right = face.point(CHEEK_IMAGE_RIGHT);
    let mid_x = (left.x + right.x) / 2.0;
    -(face.point(NOSE_TIP).x - mid_x) / width
}

/// Vertical nose offset below the eye line over face height.
///
/// Looking up raises the nose toward the eye line and lowers the value.
pub fn pitch_metric(face: &FaceLandmarks) -> f32 {
    let height = face_height(face);
    if height <= 0.0 {
        return 0.0;
    }

    let eye_line_y = (face.point(RIGHT_EYE_OUTER).y + face.point(LEFT_EYE_OUTER).y) / 2.0;
    (face.point(NOSE_TIP).y - eye_line_y) / height
}

/// Slope of the outer-eye line, where 1.0 is [`ROLL_REFERENCE_DEG`] of tilt.
pub fn roll_metric(face: &FaceLandmarks) -> f32 {
    let a = face.point(RIGHT_EYE_OUTER);
    let b = face.point(LEFT_EYE_OUTER);
    let angle = (b.y - a.y).atan2(b.x - a.x);
    angle / ROLL_REFERENCE_DEG.to_radians()
}

pub fn pose_metrics(face: &FaceLandmarks) -> PoseMetrics {
    PoseMetrics {
        yaw: yaw_metric(face),
        pitch: pitch_metric(face),
        roll: roll_metric(face),
    }
}
