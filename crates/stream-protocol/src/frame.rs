//! SSE-style frame codec.
//!
//! Frames are `data: <json>` lines terminated by a blank line. The decoder
//! is incremental: network reads can split a frame at any byte boundary
//! and the partial tail is buffered until the rest arrives.

use crate::error::ProtocolError;
use crate::types::Chunk;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;

/// Encode a payload as one wire frame.
pub fn encode_frame<T: Serialize>(payload: &T) -> Result<String, ProtocolError> {
    let json = serde_json::to_string(payload)
        .map_err(|e| ProtocolError::MalformedFrame(e.to_string()))?;
    Ok(format!("data: {}\n\n", json))
}

/// Incremental frame decoder.
///
/// Feed raw bytes as they arrive; complete payloads are returned in order.
/// Unknown payload tags and non-`data` fields are rejected rather than
/// silently skipped. The payload type defaults to [`Chunk`]; the upstream
/// gateway client decodes its own event type through the same framing.
#[derive(Debug)]
pub struct FrameDecoder<T = Chunk> {
    buf: Vec<u8>,
    data: String,
    _payload: PhantomData<T>,
}

impl<T> Default for FrameDecoder<T> {
    fn default() -> Self {
        Self {
            buf: Vec::new(),
            data: String::new(),
            _payload: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> FrameDecoder<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a slice of stream bytes, returning any payloads completed
    /// by it.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<T>, ProtocolError> {
        self.buf.extend_from_slice(bytes);

        let mut payloads = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = std::str::from_utf8(&line[..line.len() - 1])?;
            let line = line.strip_suffix('\r').unwrap_or(line);

            if let Some(payload) = self.take_line(line)? {
                payloads.push(payload);
            }
        }

        Ok(payloads)
    }

    /// Whether a partial frame is still buffered.
    pub fn has_partial(&self) -> bool {
        !self.buf.is_empty() || !self.data.is_empty()
    }

    fn take_line(&mut self, line: &str) -> Result<Option<T>, ProtocolError> {
        if line.is_empty() {
            // Blank line closes the event.
            if self.data.is_empty() {
                return Ok(None);
            }
            let payload = std::mem::take(&mut self.data);
            let decoded = serde_json::from_str::<T>(&payload)
                .map_err(|e| ProtocolError::MalformedFrame(format!("{}: {}", e, payload)))?;
            return Ok(Some(decoded));
        }

        // SSE comment / keepalive.
        if line.starts_with(':') {
            return Ok(None);
        }

        if let Some(value) = line.strip_prefix("data:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            if !self.data.is_empty() {
                self.data.push('\n');
            }
            self.data.push_str(value);
            return Ok(None);
        }

        Err(ProtocolError::MalformedFrame(format!(
            "Unexpected field: {}",
            line
        )))
    }
}
