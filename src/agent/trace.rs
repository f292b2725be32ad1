//! Trace emission and the streaming side channel.
//!
//! Every trace line is logged and appended to `ChatState::trace_infos`.
//! When the run streams (`stream && enable_trace`, a client connection id
//! is present and the caller supplied a sink) the line is also sent as a
//! [`StreamEvent::Trace`]. The side channel never affects routing.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::state::ChatState;

/// Event pushed to the client while a run is in progress.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Human-readable progress line.
    Trace {
        /// Client connection.
        connection_id: String,
        /// Client message id.
        message_id: String,
        /// Trace text.
        text: String,
    },
    /// Final answer of the run.
    Answer {
        /// Client connection.
        connection_id: String,
        /// Client message id.
        message_id: String,
        /// Answer payload.
        answer: Value,
    },
}

/// Sender half handed to `ChatbotApp::run_with_sink`.
pub type StreamSink = mpsc::UnboundedSender<StreamEvent>;

/// Per-run trace emitter.
#[derive(Debug, Clone, Default)]
pub struct TraceEmitter {
    sink: Option<StreamSink>,
}

impl TraceEmitter {
    /// Emitter that only logs.
    #[must_use]
    pub const fn new() -> Self {
        Self { sink: None }
    }

    /// Emitter that also streams to `sink`.
    #[must_use]
    pub const fn with_sink(sink: StreamSink) -> Self {
        Self { sink: Some(sink) }
    }

    /// Logs `text`, streams it if the run asks for it, and returns it for
    /// `trace_infos`.
    pub fn emit(&self, state: &ChatState, text: impl Into<String>) -> String {
        let text = text.into();
        info!(message_id = %state.message_id, trace = %text, "trace");

        if state.stream && state.enable_trace {
            if let Some(connection_id) = self.streaming_connection(state) {
                self.send(StreamEvent::Trace {
                    connection_id: connection_id.to_string(),
                    message_id: state.message_id.clone(),
                    text: text.clone(),
                });
            }
        }
        text
    }

    /// Streams the final answer when the run is streaming.
    pub fn emit_answer(&self, state: &ChatState, answer: &Value) {
        if !state.stream {
            return;
        }
        if let Some(connection_id) = self.streaming_connection(state) {
            self.send(StreamEvent::Answer {
                connection_id: connection_id.to_string(),
                message_id: state.message_id.clone(),
                answer: answer.clone(),
            });
        }
    }

    fn streaming_connection<'a>(&self, state: &'a ChatState) -> Option<&'a str> {
        self.sink.as_ref()?;
        state.ws_connection_id.as_deref()
    }

    fn send(&self, event: StreamEvent) {
        if let Some(sink) = &self.sink {
            // A dropped receiver only means the client went away.
            if sink.send(event).is_err() {
                debug!("stream receiver dropped, event discarded");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::chatbot::ChatbotConfig;

    fn streaming_state() -> ChatState {
        let mut state = ChatState::new("hi", ChatbotConfig::default());
        state.stream = true;
        state.enable_trace = true;
        state.ws_connection_id = Some("conn-1".to_string());
        state.message_id = "msg-1".to_string();
        state
    }

    #[test]
    fn test_emit_streams_when_enabled() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let emitter = TraceEmitter::with_sink(tx);
        let line = emitter.emit(&streaming_state(), "query rewritten");
        assert_eq!(line, "query rewritten");
        assert_eq!(
            rx.try_recv().ok(),
            Some(StreamEvent::Trace {
                connection_id: "conn-1".to_string(),
                message_id: "msg-1".to_string(),
                text: "query rewritten".to_string(),
            })
        );
    }

    #[test]
    fn test_emit_silent_without_connection() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let emitter = TraceEmitter::with_sink(tx);
        let mut state = streaming_state();
        state.ws_connection_id = None;
        emitter.emit(&state, "line");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_emit_silent_when_trace_disabled() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let emitter = TraceEmitter::with_sink(tx);
        let mut state = streaming_state();
        state.enable_trace = false;
        emitter.emit(&state, "line");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_emit_survives_dropped_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let emitter = TraceEmitter::with_sink(tx);
        assert_eq!(emitter.emit(&streaming_state(), "line"), "line");
    }
}
