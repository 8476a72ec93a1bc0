//! Catalyst sources feeding the master loop.
//!
//! A source is polled once per master tick and must answer immediately.
//! `Pull::Idle` means nothing arrived this tick (a no-op cycle, never an
//! error); `Pull::Exhausted` ends the run.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

use serde_json::{Map, Value, json};
use tokio::sync::mpsc;

use crate::domain::CycleCatalyst;
use crate::error::Result;

/// Source tag used for JSONL lines that do not carry one
pub const JSONL_SOURCE: &str = "jsonl";

#[derive(Debug, Clone, PartialEq)]
pub enum Pull {
    Ready(CycleCatalyst),
    Idle,
    Exhausted,
}

pub trait CatalystSource: Send {
    fn pull(&mut self) -> Pull;
}

/// Fixed in-memory sequence; `None` entries are idle ticks.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    queue: VecDeque<Option<CycleCatalyst>>,
}

impl ScriptedSource {
    pub fn new(items: impl IntoIterator<Item = Option<CycleCatalyst>>) -> Self {
        Self {
            queue: items.into_iter().collect(),
        }
    }

    /// Every tick ready, in order
    pub fn ready(catalysts: impl IntoIterator<Item = CycleCatalyst>) -> Self {
        Self::new(catalysts.into_iter().map(Some))
    }
}

impl CatalystSource for ScriptedSource {
    fn pull(&mut self) -> Pull {
        match self.queue.pop_front() {
            Some(Some(catalyst)) => Pull::Ready(catalyst),
            Some(None) => Pull::Idle,
            None => Pull::Exhausted,
        }
    }
}

/// Push-based source: whatever arrived on the channel since the last tick.
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::Receiver<CycleCatalyst>,
}

impl ChannelSource {
    pub fn new(rx: mpsc::Receiver<CycleCatalyst>) -> Self {
        Self { rx }
    }

    /// A source and the sender that feeds it
    pub fn channel(capacity: usize) -> (mpsc::Sender<CycleCatalyst>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self::new(rx))
    }
}

impl CatalystSource for ChannelSource {
    fn pull(&mut self) -> Pull {
        match self.rx.try_recv() {
            Ok(catalyst) => Pull::Ready(catalyst),
            Err(mpsc::error::TryRecvError::Empty) => Pull::Idle,
            Err(mpsc::error::TryRecvError::Disconnected) => Pull::Exhausted,
        }
    }
}

/// One catalyst per line of a JSONL file.
///
/// A line is either `{"source": .., "timestamp": .., "payload": {..}}` or a
/// bare object used as the payload. Blank lines and lines that fail to parse
/// are idle ticks.
pub struct JsonlCatalystSource {
    lines: Lines<BufReader<File>>,
    line_no: usize,
    skipped: usize,
}

impl JsonlCatalystSource {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            lines: BufReader::new(file).lines(),
            line_no: 0,
            skipped: 0,
        })
    }

    /// Lines that could not be turned into a catalyst
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn parse_line(line: &str) -> std::result::Result<CycleCatalyst, String> {
        let value: Value = serde_json::from_str(line).map_err(|e| e.to_string())?;
        let Value::Object(mut object) = value else {
            return Err("expected a JSON object".to_string());
        };
        if !object.contains_key("payload") {
            return Ok(CycleCatalyst::new(JSONL_SOURCE, object));
        }
        let source = match object.remove("source") {
            Some(Value::String(s)) => s,
            None => JSONL_SOURCE.to_string(),
            Some(other) => return Err(format!("source must be a string, got {other}")),
        };
        let payload = match object.remove("payload") {
            Some(Value::Object(map)) => map,
            Some(other) => return Err(format!("payload must be an object, got {other}")),
            None => Map::new(),
        };
        match object.remove("timestamp").map(|t| t.as_i64()) {
            Some(Some(ts)) => Ok(CycleCatalyst::at(source, payload, ts)),
            Some(None) => Err("timestamp must be an integer (unix ms)".to_string()),
            None => Ok(CycleCatalyst::new(source, payload)),
        }
    }
}

impl CatalystSource for JsonlCatalystSource {
    fn pull(&mut self) -> Pull {
        let Some(line) = self.lines.next() else {
            return Pull::Exhausted;
        };
        self.line_no += 1;
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(line = self.line_no, error = %e, "catalyst file unreadable, stopping");
                return Pull::Exhausted;
            }
        };
        if line.trim().is_empty() {
            return Pull::Idle;
        }
        match Self::parse_line(&line) {
            Ok(catalyst) => Pull::Ready(catalyst),
            Err(e) => {
                self.skipped += 1;
                tracing::warn!(line = self.line_no, error = %e, "skipping malformed catalyst");
                Pull::Idle
            }
        }
    }
}

/// Synthetic catalysts for demos: a fixed rotation of moods, each held for
/// `hold` ticks so recurring patterns can form.
#[derive(Debug, Clone)]
pub struct PulseSource {
    hold: u64,
    tick: u64,
    limit: Option<u64>,
}

/// (source, emotional_resonance, aesthetic_attraction, creative_tension, meaning_resonance, sacred_quality, resonance)
const PULSE_MOODS: [(&str, f64, f64, f64, f64, f64, f64); 4] = [
    ("dawn", 0.8, 0.6, 0.2, 0.7, 0.3, 0.8),
    ("storm", 0.4, 0.3, 0.9, 0.5, 0.1, 0.4),
    ("garden", 0.6, 0.9, 0.3, 0.6, 0.5, 0.9),
    ("night", 0.3, 0.5, 0.4, 0.9, 0.8, 0.6),
];

impl PulseSource {
    pub fn new(hold: u64) -> Self {
        Self {
            hold: hold.max(1),
            tick: 0,
            limit: None,
        }
    }

    /// Stop after `limit` catalysts
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    fn catalyst_for(tick: u64, hold: u64) -> CycleCatalyst {
        let idx = ((tick / hold) % PULSE_MOODS.len() as u64) as usize;
        let (source, emotional, aesthetic, tension, meaning, sacred, resonance) = PULSE_MOODS[idx];
        let payload = json!({
            "emotional_resonance": emotional,
            "aesthetic_attraction": aesthetic,
            "creative_tension": tension,
            "meaning_resonance": meaning,
            "sacred_quality": sacred,
            "resonance": resonance,
            "pulse": tick,
        });
        CycleCatalyst::from_value(source, payload)
    }
}

impl CatalystSource for PulseSource {
    fn pull(&mut self) -> Pull {
        if self.limit.is_some_and(|limit| self.tick >= limit) {
            return Pull::Exhausted;
        }
        let catalyst = Self::catalyst_for(self.tick, self.hold);
        self.tick += 1;
        Pull::Ready(catalyst)
    }
}
