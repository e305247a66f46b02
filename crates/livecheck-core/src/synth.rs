//! Synthetic face-mesh subjects.
//!
//! [`SyntheticFace`] lays out all 468 keypoints so that the named landmarks
//! produce exact, requested yaw/pitch/roll/EAR values. [`ScriptedSubject`]
//! wraps it in a closed loop: given the last status snapshot it produces the
//! next frame a cooperative person would, including natural jitter. Used by
//! the test suites and by the CLI `simulate` command.

use crate::error::LivenessError;
use crate::head_pose::TurnDirection;
use crate::landmarks::{
    FaceLandmarks, Point3, CHEEK_IMAGE_LEFT, CHEEK_IMAGE_RIGHT, CHIN, FOREHEAD, LANDMARK_COUNT,
    LEFT_EYE, NOSE_TIP, RIGHT_EYE,
};
use crate::sequencer::StatusSnapshot;
use crate::session::{Challenge, Stage};

/// Pitch metric of a subject looking straight at the camera.
pub const NEUTRAL_PITCH: f32 = 0.15;
pub const OPEN_EAR: f32 = 0.30;
pub const CLOSED_EAR: f32 = 0.05;

const GOLDEN_ANGLE: f32 = 2.399_963;

/// Parametric frontal face.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticFace {
    /// Face centre in frame pixels.
    pub center: (f32, f32),
    /// Cheek-to-cheek width in pixels; also the bounding box width.
    pub width: f32,
    /// Forehead-to-chin height in pixels; also the bounding box height.
    pub height: f32,
    pub yaw: f32,
    pub pitch: f32,
    pub roll_deg: f32,
    pub ear: f32,
    /// Depth relief; 0 gives a perfectly flat face.
    pub depth: f32,
}

impl Default for SyntheticFace {
    fn default() -> Self {
        Self {
            center: (320.0, 240.0),
            width: 220.0,
            height: 280.0,
            yaw: 0.0,
            pitch: NEUTRAL_PITCH,
            roll_deg: 0.0,
            ear: OPEN_EAR,
            depth: 30.0,
        }
    }
}

impl SyntheticFace {
    /// Lay out the mesh.
    ///
    /// Fails with [`LivenessError::NonFiniteLandmark`] when a field such as
    /// `center` or `width` is NaN or infinite.
    pub fn build(&self) -> Result<FaceLandmarks, LivenessError> {
        let (w, h) = (self.width, self.height);

        // Filler points on a sunflower spiral inside the face oval, domed in depth.
        let mut local: Vec<(f32, f32, f32)> = (0..LANDMARK_COUNT)
            .map(|i| {
                let r = ((i as f32 + 0.5) / LANDMARK_COUNT as f32).sqrt() * 0.9;
                let theta = i as f32 * GOLDEN_ANGLE;
                (
                    r * theta.cos() * w / 2.0,
                    r * theta.sin() * h / 2.0,
                    -self.depth * (1.0 - r * r),
                )
            })
            .collect();

        local[CHEEK_IMAGE_LEFT] = (-w / 2.0, 0.0, 0.0);
        local[CHEEK_IMAGE_RIGHT] = (w / 2.0, 0.0, 0.0);
        local[FOREHEAD] = (0.0, -h / 2.0, -self.depth * 0.5);
        local[CHIN] = (0.0, h / 2.0, -self.depth * 0.5);

        let eye_y = -0.1 * h;
        let eye_w = 0.16 * w;
        let gap = self.ear * eye_w;
        let eye_z = -self.depth * 0.6;
        // Subject's right eye sits on the image left, outer corner outermost.
        let (right_x, left_x) = (-0.2 * w, 0.2 * w);
        let half = eye_w / 2.0;
        place_eye(&mut local, &RIGHT_EYE, right_x - half, right_x + half, eye_y, gap, eye_z);
        place_eye(&mut local, &LEFT_EYE, left_x + half, left_x - half, eye_y, gap, eye_z);

        local[NOSE_TIP] = (-self.yaw * w, eye_y + self.pitch * h, -self.depth * 1.2);

        let (sin, cos) = self.roll_deg.to_radians().sin_cos();
        let points = local
            .into_iter()
            .map(|(u, v, z)| {
                Point3::new(
                    self.center.0 + u * cos - v * sin,
                    self.center.1 + u * sin + v * cos,
                    Some(z),
                )
            })
            .collect();

        FaceLandmarks::from_points(points)
    }
}

fn place_eye(
    local: &mut [(f32, f32, f32)],
    eye: &[usize; 6],
    outer_x: f32,
    inner_x: f32,
    y: f32,
    gap: f32,
    z: f32,
) {
    let third = (inner_x - outer_x) / 3.0;
    local[eye[0]] = (outer_x, y, z);
    local[eye[1]] = (outer_x + third, y - gap / 2.0, z);
    local[eye[2]] = (outer_x + 2.0 * third, y - gap / 2.0, z);
    local[eye[3]] = (inner_x, y, z);
    local[eye[4]] = (outer_x + 2.0 * third, y + gap / 2.0, z);
    local[eye[5]] = (outer_x + third, y + gap / 2.0, z);
}

/// Cooperative (or, with [`ScriptedSubject::photo`], static) subject that
/// follows the sequencer's instructions.
#[derive(Debug, Clone)]
pub struct ScriptedSubject {
    neutral: SyntheticFace,
    frame: u64,
    blink_clock: usize,
    jitter_px: f32,
    yaw_turn: f32,
    pitch_turn: f32,
    follows_instructions: bool,
}

impl ScriptedSubject {
    pub fn new(neutral: SyntheticFace) -> Self {
        Self {
            neutral,
            frame: 0,
            blink_clock: 0,
            jitter_px: 1.5,
            yaw_turn: 0.15,
            pitch_turn: 0.12,
            follows_instructions: true,
        }
    }

    /// A printed photo: no depth, no motion, ignores every instruction.
    pub fn photo(neutral: SyntheticFace) -> Self {
        Self {
            neutral: SyntheticFace {
                depth: 0.0,
                ..neutral
            },
            jitter_px: 0.0,
            follows_instructions: false,
            ..Self::new(neutral)
        }
    }

    pub fn with_jitter(mut self, px: f32) -> Self {
        self.jitter_px = px;
        self
    }

    /// Turn magnitudes in normalized yaw/pitch units.
    pub fn with_turns(mut self, yaw: f32, pitch: f32) -> Self {
        self.yaw_turn = yaw;
        self.pitch_turn = pitch;
        self
    }

    /// Next frame given the status the subject last saw.
    pub fn face_for(&mut self, status: &StatusSnapshot) -> Result<FaceLandmarks, LivenessError> {
        self.frame += 1;
        let k = self.frame as f32;

        let mut face = self.neutral;
        face.center.0 += self.jitter_px * (k * 0.9).sin();
        face.center.1 += self.jitter_px * 0.8 * (k * 1.3).cos();

        if !self.follows_instructions || status.cooling_down {
            return face.build();
        }

        match status.stage {
            Stage::Active(Challenge::Blink) if status.blink_calibrated => {
                // Two open frames, four closed, six open.
                let phase = self.blink_clock % 12;
                self.blink_clock += 1;
                if (2..6).contains(&phase) {
                    face.ear = CLOSED_EAR;
                }
            }
            Stage::Active(step) => match step.turn_direction() {
                Some(TurnDirection::Left) => face.yaw -= self.yaw_turn,
                Some(TurnDirection::Right) => face.yaw += self.yaw_turn,
                Some(TurnDirection::Up) => face.pitch -= self.pitch_turn,
                Some(TurnDirection::Down) => face.pitch += self.pitch_turn,
                None => {}
            },
            Stage::Idle | Stage::Success => {}
        }

        face.build()
    }
}
