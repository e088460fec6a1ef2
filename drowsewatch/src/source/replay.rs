//! Timestamped replay input.
//!
//! One sample per line: `t_seconds,ratio,presence`, where presence is
//! `1`/`0`/`true`/`false`.  Blank lines and `#` comments are skipped.
//! Lines starting with `(` are passed through as control messages.

use std::io::BufRead;
use std::time::Duration;

use tracing::debug;

use super::{Sample, SignalSource, SourceItem};
use crate::error::SourceError;

pub struct ReplaySource<R> {
    reader: R,
    line_no: usize,
    last_offset: Option<Duration>,
    buf: String,
}

impl<R: BufRead> ReplaySource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_no: 0,
            last_offset: None,
            buf: String::new(),
        }
    }

    fn parse_sample(&mut self, line: &str) -> Result<Sample, SourceError> {
        let line_no = self.line_no;
        let parse_err = |reason: String| SourceError::Parse {
            line: line_no,
            reason,
        };

        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != 3 {
            return Err(parse_err(format!(
                "expected `t,ratio,presence`, found {} field(s)",
                fields.len()
            )));
        }
        let timestamp_s: f64 = fields[0]
            .parse()
            .map_err(|_| parse_err(format!("invalid timestamp {:?}", fields[0])))?;
        if !timestamp_s.is_finite() || timestamp_s < 0.0 {
            return Err(parse_err(format!("invalid timestamp {:?}", fields[0])));
        }
        let ratio: f64 = fields[1]
            .parse()
            .map_err(|_| parse_err(format!("invalid ratio {:?}", fields[1])))?;
        if !ratio.is_finite() {
            return Err(parse_err(format!("invalid ratio {:?}", fields[1])));
        }
        let presence = parse_presence(fields[2])
            .ok_or_else(|| parse_err(format!("invalid presence {:?}", fields[2])))?;

        let offset = Duration::try_from_secs_f64(timestamp_s)
            .map_err(|_| parse_err(format!("timestamp out of range {:?}", fields[0])))?;
        if self.last_offset.map_or(false, |last| offset < last) {
            return Err(SourceError::NonMonotonic {
                line: line_no,
                timestamp_s,
            });
        }
        self.last_offset = Some(offset);

        Ok(Sample {
            ratio,
            presence,
            offset: Some(offset),
        })
    }
}

fn parse_presence(s: &str) -> Option<bool> {
    match s {
        "1" | "true" | "t" => Some(true),
        "0" | "false" | "nil" => Some(false),
        _ => None,
    }
}

impl<R: BufRead> SignalSource for ReplaySource<R> {
    fn next_item(&mut self) -> Result<Option<SourceItem>, SourceError> {
        loop {
            self.buf.clear();
            if self.reader.read_line(&mut self.buf)? == 0 {
                debug!("Replay input exhausted after {} line(s)", self.line_no);
                return Ok(None);
            }
            self.line_no += 1;
            let line = self.buf.trim().to_string();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if line.starts_with('(') {
                return Ok(Some(SourceItem::Control(line)));
            }
            return self.parse_sample(&line).map(|s| Some(SourceItem::Sample(s)));
        }
    }

    fn name(&self) -> &'static str {
        "replay"
    }
}

// ── Tests ───────────────────────────────────────────────────
