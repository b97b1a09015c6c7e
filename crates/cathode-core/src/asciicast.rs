use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::time::Duration;

use async_trait::async_trait;
use cathode_common::error::{CathodeError, Result};
use cathode_common::traits::Workload;
use cathode_common::types::Size;
use cathode_parser::{serialize, Token};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::session::SessionFilter;

/// Asciicast v2 header: one JSON object on the first line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Header {
    pub version: u8,
    pub width: u16,
    pub height: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_time_limit: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme: Option<Theme>,
}

impl Header {
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            version: 2,
            width,
            height,
            timestamp: None,
            duration: None,
            title: None,
            command: None,
            idle_time_limit: None,
            env: None,
            theme: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Theme {
    pub fg: String,
    pub bg: String,
    pub palette: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCode {
    Output,
    Input,
    Resize,
    Marker,
}

impl EventCode {
    fn as_str(self) -> &'static str {
        match self {
            EventCode::Output => "o",
            EventCode::Input => "i",
            EventCode::Resize => "r",
            EventCode::Marker => "m",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "o" => Some(EventCode::Output),
            "i" => Some(EventCode::Input),
            "r" => Some(EventCode::Resize),
            "m" => Some(EventCode::Marker),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub time: f64,
    pub code: EventCode,
    pub data: String,
}

/// Newline-delimited writer: header first, then `[time, code, data]`
/// arrays, UTF-8 without BOM, time rounded to microseconds.
pub struct Writer<W: Write> {
    out: W,
}

impl<W: Write> Writer<W> {
    pub fn new(mut out: W, header: &Header) -> Result<Self> {
        let line = serde_json::to_string(header)
            .map_err(|e| CathodeError::Replay(format!("header encode failed: {e}")))?;
        writeln!(out, "{line}")?;
        Ok(Self { out })
    }

    pub fn write_event(&mut self, time: f64, code: EventCode, data: &str) -> Result<()> {
        let time = (time * 1_000_000.0).round() / 1_000_000.0;
        let line = serde_json::to_string(&(time, code.as_str(), data))
            .map_err(|e| CathodeError::Replay(format!("event encode failed: {e}")))?;
        writeln!(self.out, "{line}")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// Reads a v2 stream. Arrays with fewer than three elements are ignored;
/// unknown codes are skipped with a log line.
pub struct Reader<R: BufRead> {
    lines: std::io::Lines<R>,
    header: Header,
}

impl<R: BufRead> Reader<R> {
    pub fn new(input: R) -> Result<Self> {
        let mut lines = input.lines();
        let first = lines
            .next()
            .ok_or_else(|| CathodeError::Replay("empty recording".into()))??;
        let header: Header = serde_json::from_str(&first)
            .map_err(|e| CathodeError::Replay(format!("bad header: {e}")))?;
        if header.version != 2 {
            return Err(CathodeError::Replay(format!(
                "unsupported version {}",
                header.version
            )));
        }
        Ok(Self { lines, header })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn next_event(&mut self) -> Result<Option<Event>> {
        for line in self.lines.by_ref() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let value: Value = serde_json::from_str(&line)
                .map_err(|e| CathodeError::Replay(format!("bad event line: {e}")))?;
            let Some(items) = value.as_array() else {
                continue;
            };
            if items.len() < 3 {
                debug!("skipping short event line");
                continue;
            }
            let time = items[0].as_f64().unwrap_or(0.0);
            let Some(code) = items[1].as_str().and_then(EventCode::parse) else {
                warn!("skipping event with unknown code");
                continue;
            };
            let data = items[2].as_str().unwrap_or_default().to_string();
            return Ok(Some(Event { time, code, data }));
        }
        Ok(None)
    }

    pub fn events(mut self) -> Result<Vec<Event>> {
        let mut out = Vec::new();
        while let Some(event) = self.next_event()? {
            out.push(event);
        }
        Ok(out)
    }
}

/// A session filter that records the streams it sees as an asciicast.
pub struct RecorderFilter<W: Write + Send> {
    writer: Writer<W>,
}

impl<W: Write + Send> RecorderFilter<W> {
    pub fn new(out: W, size: Size, title: Option<String>) -> Result<Self> {
        let mut header = Header::new(size.width, size.height);
        header.title = title;
        header.timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .ok()
            .map(|d| d.as_secs());
        Ok(Self {
            writer: Writer::new(out, &header)?,
        })
    }

    fn record(&mut self, code: EventCode, data: &str, elapsed: Duration) {
        if let Err(e) = self.writer.write_event(elapsed.as_secs_f64(), code, data) {
            warn!(%e, "recording write failed");
        }
    }
}

impl<W: Write + Send> SessionFilter for RecorderFilter<W> {
    fn on_output(&mut self, tokens: &mut Vec<Token>, elapsed: Duration) {
        let data = String::from_utf8_lossy(&serialize(tokens)).into_owned();
        self.record(EventCode::Output, &data, elapsed);
    }

    fn on_input(&mut self, tokens: &mut Vec<Token>, elapsed: Duration) {
        let data = String::from_utf8_lossy(&serialize(tokens)).into_owned();
        self.record(EventCode::Input, &data, elapsed);
    }

    fn on_resize(&mut self, size: Size, elapsed: Duration) {
        let data = format!("{}x{}", size.width, size.height);
        self.record(EventCode::Resize, &data, elapsed);
    }

    fn on_session_end(&mut self, _elapsed: Duration) {
        let _ = self.writer.flush();
    }
}

/// Replays a recording's output stream as a workload, honoring event
/// timing (capped by the header's idle time limit). Input and resize
/// events in the file are skipped. The session disconnects at the end.
pub struct ReplayWorkload {
    events: std::vec::IntoIter<Event>,
    idle_limit: Option<f64>,
    clock: f64,
}

impl ReplayWorkload {
    pub fn from_reader<R: BufRead>(reader: Reader<R>) -> Result<(Self, Size)> {
        let size = Size::new(reader.header().width, reader.header().height);
        let idle_limit = reader.header().idle_time_limit;
        let events = reader.events()?;
        Ok((
            Self {
                events: events.into_iter(),
                idle_limit,
                clock: 0.0,
            },
            size,
        ))
    }
}

#[async_trait]
impl Workload for ReplayWorkload {
    async fn read_output(&mut self) -> Result<Vec<u8>> {
        for event in self.events.by_ref() {
            if event.code != EventCode::Output {
                continue;
            }
            let mut wait = (event.time - self.clock).max(0.0);
            if let Some(limit) = self.idle_limit {
                wait = wait.min(limit);
            }
            self.clock = event.time;
            if wait > 0.0 {
                tokio::time::sleep(Duration::from_secs_f64(wait)).await;
            }
            return Ok(event.data.into_bytes());
        }
        Err(CathodeError::Adapter("replay finished".into()))
    }

    async fn write_input(&mut self, _bytes: &[u8]) -> Result<()> {
        Ok(())
    }

    async fn resize(&mut self, _size: Size) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn header_and_events_round_trip() {
        let mut buf = Vec::new();
        {
            let mut header = Header::new(80, 24);
            header.title = Some("demo".into());
            let mut writer = Writer::new(&mut buf, &header).unwrap();
            writer.write_event(0.0, EventCode::Output, "hello\r\n").unwrap();
            writer
                .write_event(1.234_567_89, EventCode::Resize, "100x30")
                .unwrap();
            writer.write_event(2.0, EventCode::Marker, "chapter").unwrap();
        }

        let reader = Reader::new(Cursor::new(&buf)).unwrap();
        assert_eq!(reader.header().width, 80);
        assert_eq!(reader.header().title.as_deref(), Some("demo"));
        let events = reader.events().unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].data, "hello\r\n");
        // Time rounds to six decimals.
        assert!((events[1].time - 1.234_568).abs() < 1e-9);
        assert_eq!(events[2].code, EventCode::Marker);
    }

    #[test]
    fn reader_skips_short_and_unknown_events() {
        let text = concat!(
            "{\"version\": 2, \"width\": 10, \"height\": 5}\n",
            "[0.5]\n",
            "[0.6, \"o\"]\n",
            "[0.7, \"z\", \"??\"]\n",
            "[0.8, \"o\", \"ok\"]\n",
        );
        let events = Reader::new(Cursor::new(text)).unwrap().events().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "ok");
    }

    #[test]
    fn rejects_other_versions() {
        let text = "{\"version\": 1, \"width\": 10, \"height\": 5}\n";
        assert!(Reader::new(Cursor::new(text)).is_err());
    }

    #[test]
    fn writer_omits_absent_optionals() {
        let mut buf = Vec::new();
        Writer::new(&mut buf, &Header::new(5, 5)).unwrap();
        let line = String::from_utf8(buf).unwrap();
        assert!(!line.contains("timestamp"));
        assert!(!line.contains("theme"));
    }

    #[tokio::test]
    async fn replay_yields_output_events_in_order() {
        let text = concat!(
            "{\"version\": 2, \"width\": 10, \"height\": 5, \"idle_time_limit\": 0.0}\n",
            "[0.0, \"o\", \"one\"]\n",
            "[0.1, \"i\", \"typed\"]\n",
            "[0.2, \"o\", \"two\"]\n",
        );
        let reader = Reader::new(Cursor::new(text)).unwrap();
        let (mut replay, size) = ReplayWorkload::from_reader(reader).unwrap();
        assert_eq!(size, Size::new(10, 5));
        assert_eq!(replay.read_output().await.unwrap(), b"one");
        assert_eq!(replay.read_output().await.unwrap(), b"two");
        assert!(replay.read_output().await.is_err());
    }
}
