//! `livecheck simulate`: run a scripted synthetic subject against the verifier.

use anyhow::{Context, Result};
use livecheck_core::synth::{ScriptedSubject, SyntheticFace};
use livecheck_core::{DeviceInfo, Frame, VerificationEvent};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::engine::spawn_engine;
use crate::replay::{print_event, print_summary};
use crate::trace::{write_frame, TraceFrame};

pub struct SimulateOptions {
    pub seed: Option<u64>,
    pub max_frames: usize,
    /// Record the generated frames as a trace for later `replay`.
    pub output: Option<PathBuf>,
    /// Present a flat, motionless face instead of a cooperative subject.
    pub photo: bool,
}

pub async fn run(config: &Config, options: SimulateOptions) -> Result<()> {
    let guide = config.guide();
    let neutral = SyntheticFace {
        center: guide.center(),
        ..SyntheticFace::default()
    };
    let mut subject = if options.photo {
        ScriptedSubject::photo(neutral)
    } else {
        ScriptedSubject::new(neutral)
    };

    let mut recorder = match &options.output {
        Some(path) => Some(BufWriter::new(
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?,
        )),
        None => None,
    };

    let engine = spawn_engine(config.liveness, DeviceInfo::current(), options.seed)?;
    let interval = config.liveness.frame_interval();
    let t0 = Instant::now();
    print_event(&engine.start(t0).await?)?;

    let mut status = engine.status(t0).await?;
    let mut passed = false;
    for k in 1..=options.max_frames {
        // Whole milliseconds, so a recorded trace replays with identical timing.
        let offset = Duration::from_millis((interval * k as u32).as_millis() as u64);
        let face = subject.face_for(&status)?;

        if let Some(writer) = recorder.as_mut() {
            let frame = TraceFrame {
                t_ms: offset.as_millis() as u64,
                face: Some(face.clone()),
                guide,
                restart: false,
            };
            write_frame(writer, &frame)?;
        }

        let report = engine
            .process_frame(
                Frame {
                    face: Some(face),
                    guide,
                },
                t0 + offset,
            )
            .await?;
        for event in &report.events {
            passed |= matches!(event, VerificationEvent::Succeeded(_));
            print_event(event)?;
        }
        status = report.status;
        if passed {
            tracing::info!(frames = k, "simulation finished");
            break;
        }
    }

    if let Some(mut writer) = recorder {
        writer.flush()?;
    }

    println!();
    print_summary(&status, passed);
    Ok(())
}
