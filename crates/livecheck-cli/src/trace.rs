//! Landmark traces: one JSON object per line, one line per captured frame.
//!
//! ```text
//! {"t_ms":0,"face":[{"x":312.4,"y":201.9,"z":-3.1}, ...],"guide":{"x":144.0,...}}
//! {"t_ms":83,"face":null,"guide":{...}}
//! ```
//!
//! `t_ms` is milliseconds since the session was started; `face` is the 468
//! keypoint array or `null` when detection found nothing. An optional
//! `"restart": true` discards the session just before that frame is processed.

use anyhow::{Context, Result};
use livecheck_core::{FaceLandmarks, Frame, Rect};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceFrame {
    pub t_ms: u64,
    pub face: Option<FaceLandmarks>,
    pub guide: Rect,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub restart: bool,
}

impl TraceFrame {
    pub fn offset(&self) -> Duration {
        Duration::from_millis(self.t_ms)
    }

    pub fn to_frame(&self) -> Frame {
        Frame {
            face: self.face.clone(),
            guide: self.guide,
        }
    }
}

/// Parse every non-blank line. Errors name the offending line.
pub fn read_trace<R: BufRead>(reader: R) -> Result<Vec<TraceFrame>> {
    let mut frames = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read trace line {}", i + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let frame: TraceFrame = serde_json::from_str(&line)
            .with_context(|| format!("invalid trace frame on line {}", i + 1))?;
        frames.push(frame);
    }
    Ok(frames)
}

pub fn write_frame<W: Write>(mut writer: W, frame: &TraceFrame) -> Result<()> {
    serde_json::to_writer(&mut writer, frame)?;
    writer.write_all(b"\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use livecheck_core::synth::SyntheticFace;
    use livecheck_core::LANDMARK_COUNT;

    fn guide() -> Rect {
        Rect::new(144.0, 60.0, 352.0, 360.0)
    }

    #[test]
    fn test_written_trace_reads_back() {
        let frames = vec![
            TraceFrame {
                t_ms: 0,
                face: Some(SyntheticFace::default().build().unwrap()),
                guide: guide(),
                restart: false,
            },
            TraceFrame {
                t_ms: 83,
                face: None,
                guide: guide(),
                restart: true,
            },
        ];

        let mut buf = Vec::new();
        for frame in &frames {
            write_frame(&mut buf, frame).unwrap();
        }
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().count(), 2);

        let back = read_trace(text.as_bytes()).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back[0].face.as_ref().unwrap().points().len(), LANDMARK_COUNT);
        assert_eq!(back[1].offset(), Duration::from_millis(83));
        assert!(back[1].to_frame().face.is_none());
        assert!(!back[0].restart);
        assert!(back[1].restart);
        assert!(!text.lines().next().unwrap().contains("restart"));
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let line = r#"{"t_ms":5,"face":null,"guide":{"x":0.0,"y":0.0,"width":10.0,"height":10.0}}"#;
        let text = format!("\n{line}\n\n");
        let frames = read_trace(text.as_bytes()).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].t_ms, 5);
    }

    #[test]
    fn test_short_face_is_rejected_with_line_number() {
        let guide = r#"{"x":0.0,"y":0.0,"width":10.0,"height":10.0}"#;
        let good = format!(r#"{{"t_ms":0,"face":null,"guide":{guide}}}"#);
        let bad = format!(r#"{{"t_ms":1,"face":[{{"x":1.0,"y":2.0}}],"guide":{guide}}}"#);
        let text = format!("{good}\n{bad}\n");
        let err = read_trace(text.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
