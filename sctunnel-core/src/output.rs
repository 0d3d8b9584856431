//! Sauce Connect output parsing
//!
//! Agent stdout and stderr are unbounded byte streams that may deliver a line
//! across several reads. [`AgentLineCodec`] reassembles complete lines, then
//! each stdout line is classified with a fixed priority: readiness first,
//! tunnel id second, plain debug output otherwise. Stderr is forwarded as-is.

use std::io;
use std::sync::LazyLock;

use bytes::BytesMut;
use regex::Regex;
use tokio::io::AsyncRead;
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_util::codec::{Decoder, FramedRead};
use tracing::{debug, trace};

use crate::state::TunnelEvent;

/// Printed by the agent once the tunnel accepts traffic
pub const READY_PHRASE: &str = "Sauce Connect is up, you may start your tests";

static TUNNEL_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:Tunnel ID: |\bid=)([0-9a-f]{32})\b").expect("tunnel id pattern is valid")
});

/// Which agent stream a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl std::fmt::Display for OutputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdout => f.write_str("stdout"),
            Self::Stderr => f.write_str("stderr"),
        }
    }
}

/// What a single line of agent output means
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    /// Informational stdout line
    Debug,
    /// The tunnel is up
    Ready,
    /// The agent reported its tunnel id
    IdAnnounced(String),
    /// Stderr line, not matched against anything
    Unmatched,
}

/// A line of agent output and its classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedLine {
    pub raw: String,
    pub kind: LineKind,
}

/// Classify one complete stdout line
pub fn classify_stdout(line: &str) -> LineKind {
    if line.contains(READY_PHRASE) {
        return LineKind::Ready;
    }
    match TUNNEL_ID.captures(line) {
        Some(caps) => LineKind::IdAnnounced(caps[1].to_string()),
        None => LineKind::Debug,
    }
}

/// Classify one complete line from either stream
pub fn classify(stream: OutputStream, raw: String) -> ClassifiedLine {
    let kind = match stream {
        OutputStream::Stdout => classify_stdout(&raw),
        OutputStream::Stderr => LineKind::Unmatched,
    };
    ClassifiedLine { raw, kind }
}

/// Whether a line echoes the agent's own arguments, e.g. `[-u, user, -k, key]`
///
/// These lines carry credentials and are never forwarded.
pub fn is_invocation_echo(line: &str) -> bool {
    line.starts_with("[-")
}

/// Newline-delimited decoder tolerant of CRLF and invalid UTF-8
#[derive(Debug, Default)]
pub struct AgentLineCodec {
    /// Where to resume the newline search in the buffer
    next_index: usize,
}

impl AgentLineCodec {
    pub fn new() -> Self {
        Self::default()
    }

    fn to_line(bytes: &[u8]) -> String {
        let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
        String::from_utf8_lossy(bytes).into_owned()
    }
}

impl Decoder for AgentLineCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, io::Error> {
        let newline = buf[self.next_index..]
            .iter()
            .position(|b| *b == b'\n')
            .map(|offset| self.next_index + offset);

        match newline {
            Some(index) => {
                self.next_index = 0;
                let line = buf.split_to(index + 1);
                Ok(Some(Self::to_line(&line[..index])))
            }
            None => {
                self.next_index = buf.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, io::Error> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        if buf.is_empty() {
            return Ok(None);
        }
        self.next_index = 0;
        let rest = buf.split();
        Ok(Some(Self::to_line(&rest)))
    }
}

/// Read an agent stream to the end, emitting events and reporting each line
///
/// Events are sent before `on_line` runs, in stream order. The callback is
/// the only way observations leave this function.
pub async fn forward_output<R, F>(
    reader: R,
    stream: OutputStream,
    events: broadcast::Sender<TunnelEvent>,
    mut on_line: F,
) where
    R: AsyncRead + Unpin,
    F: FnMut(&ClassifiedLine),
{
    let mut lines = FramedRead::new(reader, AgentLineCodec::new());

    while let Some(next) = lines.next().await {
        match next {
            Ok(raw) => {
                let line = classify(stream, raw);
                emit(&events, stream, &line);
                on_line(&line);
            }
            Err(e) => {
                debug!(error = %e, "Error reading agent {}", stream);
                break;
            }
        }
    }

    trace!("Agent {} closed", stream);
}

fn emit(events: &broadcast::Sender<TunnelEvent>, stream: OutputStream, line: &ClassifiedLine) {
    match stream {
        OutputStream::Stdout => {
            if is_invocation_echo(&line.raw) {
                return;
            }
            trace!(target: "sauce_connect", "{}", line.raw);
            let _ = events.send(TunnelEvent::debug(line.raw.clone()));
        }
        OutputStream::Stderr => {
            debug!(target: "sauce_connect", "{}", line.raw);
            let _ = events.send(TunnelEvent::error(line.raw.clone()));
        }
    }
}
