use livecheck_core::{
    DeviceInfo, Frame, FrameReport, LivenessConfig, LivenessError, StatusSnapshot,
    VerificationEvent, Verifier,
};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("liveness error: {0}")]
    Liveness(#[from] LivenessError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from async callers to the engine thread.
enum EngineRequest {
    Start {
        at: Instant,
        reply: oneshot::Sender<VerificationEvent>,
    },
    Restart {
        at: Instant,
        reply: oneshot::Sender<()>,
    },
    Frame {
        frame: Frame,
        at: Instant,
        reply: oneshot::Sender<FrameReport>,
    },
    Status {
        at: Instant,
        reply: oneshot::Sender<StatusSnapshot>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Begin a new session, replacing any current one.
    pub async fn start(&self, at: Instant) -> Result<VerificationEvent, EngineError> {
        self.request(|reply| EngineRequest::Start { at, reply }).await
    }

    /// Discard the session; the next one starts after the restart delay.
    pub async fn restart(&self, at: Instant) -> Result<(), EngineError> {
        self.request(|reply| EngineRequest::Restart { at, reply }).await
    }

    /// Run one frame through the sequencer.
    pub async fn process_frame(
        &self,
        frame: Frame,
        at: Instant,
    ) -> Result<FrameReport, EngineError> {
        self.request(|reply| EngineRequest::Frame { frame, at, reply }).await
    }

    pub async fn status(&self, at: Instant) -> Result<StatusSnapshot, EngineError> {
        self.request(|reply| EngineRequest::Status { at, reply }).await
    }
}

/// Spawn the verifier on a dedicated OS thread.
///
/// The configuration is validated before the thread starts, so a bad config
/// fails here rather than on the first request. With `seed` set, step orders
/// are reproducible.
pub fn spawn_engine(
    config: LivenessConfig,
    device_info: DeviceInfo,
    seed: Option<u64>,
) -> Result<EngineHandle, EngineError> {
    let mut verifier = match seed {
        Some(seed) => Verifier::with_seed(config, device_info, seed)?,
        None => Verifier::new(config, device_info)?,
    };
    tracing::info!(
        seeded = seed.is_some(),
        target_fps = config.target_fps,
        "verifier ready"
    );

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("livecheck-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Start { at, reply } => {
                        let _ = reply.send(verifier.start(at));
                    }
                    EngineRequest::Restart { at, reply } => {
                        verifier.restart(at);
                        let _ = reply.send(());
                    }
                    EngineRequest::Frame { frame, at, reply } => {
                        let report = verifier.process_frame(&frame, at);
                        tracing::debug!(
                            stage = ?report.status.stage,
                            issue = ?report.status.issue,
                            events = report.events.len(),
                            "frame processed"
                        );
                        let _ = reply.send(report);
                    }
                    EngineRequest::Status { at, reply } => {
                        let _ = reply.send(verifier.status(at));
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}
