//! `livecheck replay`: feed a recorded landmark trace through the verifier.

use anyhow::{Context, Result};
use livecheck_core::{DeviceInfo, StatusSnapshot, VerificationEvent};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Instant;

use crate::config::Config;
use crate::engine::spawn_engine;
use crate::trace::read_trace;

/// Replay `path` frame by frame at its recorded offsets and print every event.
pub async fn run(config: &Config, path: &Path, seed: Option<u64>) -> Result<()> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let frames = read_trace(BufReader::new(file))
        .with_context(|| format!("failed to load trace {}", path.display()))?;
    tracing::info!(path = %path.display(), frames = frames.len(), "trace loaded");

    let engine = spawn_engine(config.liveness, DeviceInfo::current(), seed)?;
    let t0 = Instant::now();
    print_event(&engine.start(t0).await?)?;

    let mut last_status = None;
    let mut passed = false;
    for frame in &frames {
        let at = t0 + frame.offset();
        if frame.restart {
            tracing::info!(t_ms = frame.t_ms, "restart requested by trace");
            engine.restart(at).await?;
        }
        let report = engine.process_frame(frame.to_frame(), at).await?;
        for event in &report.events {
            passed |= matches!(event, VerificationEvent::Succeeded(_));
            print_event(event)?;
        }
        last_status = Some(report.status);
        if passed {
            break;
        }
    }

    println!();
    match last_status {
        Some(status) => print_summary(&status, passed),
        None => println!("Trace contained no frames."),
    }
    Ok(())
}

pub(crate) fn print_event(event: &VerificationEvent) -> Result<()> {
    match event {
        VerificationEvent::Started { session_id, step_order } => {
            println!("session {session_id} started: {step_order:?}");
        }
        VerificationEvent::StepCompleted { step, next } => {
            println!("  {step:?} done, next {next:?}");
        }
        VerificationEvent::Succeeded(result) => {
            println!("{}", serde_json::to_string_pretty(result)?);
        }
    }
    Ok(())
}

pub(crate) fn print_summary(status: &StatusSnapshot, passed: bool) {
    if passed {
        println!("Verification passed: {}/{} steps.", status.completed, status.total);
    } else {
        println!(
            "Verification incomplete: {}/{} steps. Last instruction: {}",
            status.completed, status.total, status.instruction
        );
    }
}
