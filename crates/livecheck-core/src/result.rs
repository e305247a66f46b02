use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::session::{Challenge, Session};

/// Client metadata attached to the terminal result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub user_agent: String,
    pub platform: String,
}

impl DeviceInfo {
    /// Describe the host this process runs on.
    pub fn current() -> Self {
        Self {
            user_agent: format!("livecheck/{}", env!("CARGO_PKG_VERSION")),
            platform: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
        }
    }
}

/// Signal summary of a passed session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub open_ear: Option<f32>,
    pub blink_threshold: Option<f32>,
    pub yaw_deltas: Vec<f32>,
    pub pitch_deltas: Vec<f32>,
}

/// Terminal result handed to the caller on success. The core keeps no copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub timestamp: DateTime<Utc>,
    pub session_id: Uuid,
    pub steps_completed: Vec<Challenge>,
    pub device_info: DeviceInfo,
    pub metrics_summary: MetricsSummary,
}

impl VerificationResult {
    pub(crate) fn from_session(session: &Session, device_info: DeviceInfo) -> Self {
        let calibration = session.blink_calibration();
        Self {
            timestamp: Utc::now(),
            session_id: session.session_id(),
            steps_completed: session.completed_steps().to_vec(),
            device_info,
            metrics_summary: MetricsSummary {
                open_ear: calibration.map(|c| c.open_ear_baseline),
                blink_threshold: calibration.map(|c| c.closed_threshold),
                yaw_deltas: session.yaw_deltas().to_vec(),
                pitch_deltas: session.pitch_deltas().to_vec(),
            },
        }
    }
}
