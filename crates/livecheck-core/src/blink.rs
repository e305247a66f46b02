//! Calibrated blink detection.
//!
//! The gate first learns the subject's open-eye EAR, then fires only on a
//! full closed→open cycle: a closed run of at least `closed_frame_threshold`
//! frames followed by an open run of at least `open_frame_threshold` frames.
//! A single-frame dip, or a closed run cut short by an open frame, earns
//! nothing.
//!
//! All inputs are EMA-smoothed EAR values.

use serde::Serialize;
use std::time::Instant;

use crate::config::BlinkConfig;
use crate::smoothing::sma;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EyeState {
    Open,
    Closed,
    /// Calibration produced no usable baseline.
    Unknown,
}

/// Frozen open-eye reference. Never recomputed within a session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BlinkCalibration {
    pub open_ear_baseline: f32,
    pub closed_threshold: f32,
}

impl BlinkCalibration {
    pub fn from_samples(samples: &[f32], closed_ratio: f32) -> Self {
        let open_ear_baseline = sma(samples.iter().copied());
        Self {
            open_ear_baseline,
            closed_threshold: open_ear_baseline * closed_ratio,
        }
    }

    pub fn is_degenerate(&self) -> bool {
        !self.open_ear_baseline.is_finite() || self.open_ear_baseline <= 0.0
    }

    pub fn classify(&self, smoothed_ear: f32) -> EyeState {
        if self.is_degenerate() {
            EyeState::Unknown
        } else if smoothed_ear < self.closed_threshold {
            EyeState::Closed
        } else {
            EyeState::Open
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BlinkOutcome {
    Calibrating { collected: usize, required: usize },
    /// Calibration finished on this frame.
    Calibrated(BlinkCalibration),
    Watching(EyeState),
    CoolingDown,
    /// A full blink cycle completed on this frame.
    Blink,
}

#[derive(Debug, Clone)]
enum Phase {
    Calibrating {
        samples: Vec<f32>,
    },
    Ready {
        calibration: BlinkCalibration,
        eye: EyeState,
        closed_frames: usize,
        open_frames: usize,
        cooldown_until: Option<Instant>,
    },
}

#[derive(Debug, Clone)]
pub struct BlinkGate {
    config: BlinkConfig,
    phase: Phase,
}

impl BlinkGate {
    pub fn new(config: BlinkConfig) -> Self {
        Self {
            config,
            phase: Phase::Calibrating {
                samples: Vec::with_capacity(config.calibration_frames),
            },
        }
    }

    /// Back to calibration, discarding any baseline and counters.
    pub fn reset(&mut self) {
        self.phase = Phase::Calibrating {
            samples: Vec::with_capacity(self.config.calibration_frames),
        };
    }

    pub fn calibration(&self) -> Option<&BlinkCalibration> {
        match &self.phase {
            Phase::Calibrating { .. } => None,
            Phase::Ready { calibration, .. } => Some(calibration),
        }
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibration().is_some()
    }

    pub fn eye_state(&self) -> Option<EyeState> {
        match &self.phase {
            Phase::Calibrating { .. } => None,
            Phase::Ready { eye, .. } => Some(*eye),
        }
    }

    pub fn closed_frames(&self) -> usize {
        match &self.phase {
            Phase::Calibrating { .. } => 0,
            Phase::Ready { closed_frames, .. } => *closed_frames,
        }
    }

    pub fn open_frames(&self) -> usize {
        match &self.phase {
            Phase::Calibrating { .. } => 0,
            Phase::Ready { open_frames, .. } => *open_frames,
        }
    }

    pub fn observe(&mut self, smoothed_ear: f32, now: Instant) -> BlinkOutcome {
        let config = self.config;

        match &mut self.phase {
            Phase::Calibrating { samples } => {
                samples.push(smoothed_ear);
                if samples.len() < config.calibration_frames {
                    return BlinkOutcome::Calibrating {
                        collected: samples.len(),
                        required: config.calibration_frames,
                    };
                }

                let calibration = BlinkCalibration::from_samples(samples, config.closed_ratio);
                if calibration.is_degenerate() {
                    tracing::warn!(
                        open_ear = calibration.open_ear_baseline,
                        "blink calibration degenerate, eye state unknown"
                    );
                } else {
                    tracing::info!(
                        open_ear = calibration.open_ear_baseline,
                        closed_threshold = calibration.closed_threshold,
                        "blink calibration complete"
                    );
                }

                self.phase = Phase::Ready {
                    calibration,
                    eye: calibration.classify(smoothed_ear),
                    closed_frames: 0,
                    open_frames: 0,
                    cooldown_until: None,
                };
                BlinkOutcome::Calibrated(calibration)
            }

            Phase::Ready {
                calibration,
                eye,
                closed_frames,
                open_frames,
                cooldown_until,
            } => {
                if let Some(until) = *cooldown_until {
                    if now < until {
                        return BlinkOutcome::CoolingDown;
                    }
                    *cooldown_until = None;
                }

                *eye = calibration.classify(smoothed_ear);
                match *eye {
                    EyeState::Unknown => {}
                    EyeState::Closed => {
                        *closed_frames += 1;
                        *open_frames = 0;
                    }
                    EyeState::Open => {
                        if *closed_frames >= config.closed_frame_threshold {
                            *open_frames += 1;
                            if *open_frames >= config.open_frame_threshold {
                                tracing::debug!(
                                    closed_frames = *closed_frames,
                                    open_frames = *open_frames,
                                    "blink detected"
                                );
                                *closed_frames = 0;
                                *open_frames = 0;
                                *cooldown_until = Some(now + config.cooldown());
                                return BlinkOutcome::Blink;
                            }
                        } else {
                            // Partial closure: no credit.
                            *closed_frames = 0;
                            *open_frames = 0;
                        }
                    }
                }

                BlinkOutcome::Watching(*eye)
            }
        }
    }
}
