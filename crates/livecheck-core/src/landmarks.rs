//! Face-mesh keypoint container and the fixed landmark index table.
//!
//! The detector collaborator returns 468 keypoints in face-mesh topology.
//! Coordinates are in frame-pixel space of the un-mirrored camera image, so
//! the subject's right eye appears on the image left. Depth, when present,
//! shares the x/y scale.

use serde::{Deserialize, Serialize};

use crate::error::LivenessError;

pub const LANDMARK_COUNT: usize = 468;

pub const NOSE_TIP: usize = 1;
pub const FOREHEAD: usize = 10;
pub const CHIN: usize = 152;
pub const CHEEK_IMAGE_LEFT: usize = 234;
pub const CHEEK_IMAGE_RIGHT: usize = 454;

/// Subject's right eye (image left): outer corner, upper pair, inner corner, lower pair.
///
/// The lower pair is stored so that `[1]`/`[5]` and `[2]`/`[4]` are the
/// vertically opposite points.
pub const RIGHT_EYE: [usize; 6] = [33, 160, 158, 133, 153, 144];
/// Subject's left eye (image right), same ordering as [`RIGHT_EYE`].
pub const LEFT_EYE: [usize; 6] = [263, 387, 385, 362, 380, 373];

pub const RIGHT_EYE_OUTER: usize = RIGHT_EYE[0];
pub const LEFT_EYE_OUTER: usize = LEFT_EYE[0];

/// Single keypoint. `z` is absent when the detector provides no depth.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f32,
    pub y: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f32>,
}

impl Point3 {
    pub fn new(x: f32, y: f32, z: Option<f32>) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance in the image plane.
    pub fn distance_2d(&self, other: &Point3) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Validated set of exactly [`LANDMARK_COUNT`] keypoints for one face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Point3>", into = "Vec<Point3>")]
pub struct FaceLandmarks {
    points: Vec<Point3>,
}

impl FaceLandmarks {
    pub fn from_points(points: Vec<Point3>) -> Result<Self, LivenessError> {
        if points.len() != LANDMARK_COUNT {
            return Err(LivenessError::LandmarkCount {
                expected: LANDMARK_COUNT,
                got: points.len(),
            });
        }

        if let Some(index) = points.iter().position(|p| {
            !p.x.is_finite() || !p.y.is_finite() || p.z.is_some_and(|z| !z.is_finite())
        }) {
            return Err(LivenessError::NonFiniteLandmark { index });
        }

        Ok(Self { points })
    }

    /// Keypoint at a table index. All named indices are below [`LANDMARK_COUNT`].
    pub fn point(&self, index: usize) -> Point3 {
        self.points[index]
    }

    pub fn points(&self) -> &[Point3] {
        &self.points
    }

    /// Centre of the six contour points of one eye.
    pub fn eye_centre(&self, eye: &[usize; 6]) -> (f32, f32) {
        let (sx, sy) = eye.iter().fold((0.0f32, 0.0f32), |(sx, sy), &i| {
            let p = self.points[i];
            (sx + p.x, sy + p.y)
        });
        (sx / 6.0, sy / 6.0)
    }
}

impl TryFrom<Vec<Point3>> for FaceLandmarks {
    type Error = LivenessError;

    fn try_from(points: Vec<Point3>) -> Result<Self, Self::Error> {
        Self::from_points(points)
    }
}

impl From<FaceLandmarks> for Vec<Point3> {
    fn from(face: FaceLandmarks) -> Self {
        face.points
    }
}

/// Axis-aligned rectangle in frame-pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_bounds(min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Self {
        Self::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }

    /// Guide region centred in a frame, sized as fractions of the frame.
    pub fn centered_guide(
        frame_width: f32,
        frame_height: f32,
        width_ratio: f32,
        height_ratio: f32,
    ) -> Self {
        let width = frame_width * width_ratio;
        let height = frame_height * height_ratio;
        Self::new(
            (frame_width - width) / 2.0,
            (frame_height - height) / 2.0,
            width,
            height,
        )
    }

    pub fn max_x(&self) -> f32 {
        self.x + self.width
    }

    pub fn max_y(&self) -> f32 {
        self.y + self.height
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Grow by `fraction` of the width/height on every side.
    pub fn expanded(&self, fraction: f32) -> Self {
        let dx = self.width * fraction;
        let dy = self.height * fraction;
        Self::new(
            self.x - dx,
            self.y - dy,
            self.width + 2.0 * dx,
            self.height + 2.0 * dy,
        )
    }

    /// Whether `other` lies entirely within `self` (edges inclusive).
    pub fn contains(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.max_x() <= self.max_x()
            && other.max_y() <= self.max_y()
    }
}
