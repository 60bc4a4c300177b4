//! Minimal server-sent-events line parser shared by the Anthropic and
//! OpenAI-compatible (OpenAI, Groq) adapters, both of which stream
//! `data: <json>\n\n` frames terminated by a `[DONE]` sentinel or a
//! connection close.
//!
//! Ollama's streaming format is newline-delimited JSON rather than SSE, so
//! its adapter does not use this module.

/// Accumulates bytes from a chunked HTTP body and yields complete `data:`
/// payloads as they become available. Built incrementally because
/// `bytes_stream` chunk boundaries never align with SSE event
/// boundaries.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: String,
}

/// One decoded SSE event. `Done` marks the vendor-specific terminal
/// sentinel (`[DONE]`); callers stop reading after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Data(String),
    Done,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes, returning every complete event it completes.
    /// Incomplete trailing lines are buffered for the next call.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buf.push_str(&String::from_utf8_lossy(chunk));
        let mut events = Vec::new();

        while let Some(pos) = self.buf.find('\n') {
            let line = self.buf[..pos].trim_end_matches('\r').to_string();
            self.buf.drain(..=pos);

            let Some(payload) = line.strip_prefix("data:") else {
                continue;
            };
            let payload = payload.trim();
            if payload.is_empty() {
                continue;
            }
            if payload == "[DONE]" {
                events.push(SseEvent::Done);
            } else {
                events.push(SseEvent::Data(payload.to_string()));
            }
        }

        events
    }
}
