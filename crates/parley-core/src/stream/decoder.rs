//! Line-oriented event decoder for the chat backend's streaming protocol.
//!
//! The backend writes newline-delimited records:
//!
//! ```text
//! data: {"type":"chunk","content":"Hel"}
//! data: {"type":"tool_call_start","tool":"search","tool_call_id":"c1","input":{}}
//!
//! data: [DONE]
//! ```
//!
//! Network reads carry no line or character alignment, so the decoder keeps
//! two carries between buffers: undecoded trailing bytes of a split UTF-8
//! character, and the trailing text fragment after the last newline.
//! Malformed records are skipped without ending the stream.

use std::pin::Pin;

use futures_util::{Stream, StreamExt};
use serde::Deserialize;

use parley_types::error::{ProtocolError, TransportError};
use parley_types::stream::StreamEvent;

/// Prefix marking an event line.
const DATA_PREFIX: &str = "data:";

/// Payload that terminates the stream.
const DONE_SENTINEL: &str = "[DONE]";

/// Wire shape of an event payload, discriminated by `type`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireEvent {
    Chunk {
        content: String,
    },
    Done {
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        suggestions: Option<Vec<String>>,
    },
    Error {
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        error: Option<String>,
    },
    ToolCallStart {
        tool: String,
        #[serde(default)]
        tool_call_id: Option<String>,
        #[serde(default)]
        input: Option<serde_json::Value>,
    },
    ToolCallEnd {
        tool: String,
        #[serde(default)]
        tool_call_id: Option<String>,
        #[serde(default)]
        result: Option<serde_json::Value>,
    },
    ToolCallError {
        tool: String,
        #[serde(default)]
        tool_call_id: Option<String>,
        #[serde(default)]
        error: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

impl WireEvent {
    fn into_event(self) -> Result<StreamEvent, ProtocolError> {
        let event = match self {
            WireEvent::Chunk { content } => StreamEvent::Chunk { content },
            WireEvent::Done {
                session_id,
                suggestions,
            } => StreamEvent::Done {
                session_id,
                suggestions,
            },
            WireEvent::Error { content, error } => StreamEvent::Error {
                message: content
                    .or(error)
                    .unwrap_or_else(|| "unknown server error".to_string()),
            },
            WireEvent::ToolCallStart {
                tool,
                tool_call_id,
                input,
            } => StreamEvent::ToolCallStart {
                tool,
                tool_call_id,
                input: input.unwrap_or_else(|| serde_json::Value::Object(Default::default())),
            },
            WireEvent::ToolCallEnd {
                tool,
                tool_call_id,
                result,
            } => StreamEvent::ToolCallEnd {
                tool,
                tool_call_id,
                result,
            },
            WireEvent::ToolCallError {
                tool,
                tool_call_id,
                error,
            } => StreamEvent::ToolCallError {
                tool,
                tool_call_id,
                error,
            },
            WireEvent::Unknown => return Err(ProtocolError::UnknownType),
        };
        Ok(event)
    }
}

/// Parse one complete line into an event.
///
/// Returns `Ok(None)` for lines that carry no event (blank lines, comments,
/// other SSE fields) and `Err` for event lines whose payload is unusable.
pub fn parse_line(line: &str) -> Result<Option<StreamEvent>, ProtocolError> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return Ok(None);
    };
    let payload = payload.strip_prefix(' ').unwrap_or(payload);

    if payload.trim() == DONE_SENTINEL {
        return Ok(Some(StreamEvent::done()));
    }

    let wire: WireEvent =
        serde_json::from_str(payload).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    wire.into_event().map(Some)
}

/// Incremental decoder from raw bytes to stream events.
///
/// Feed buffers with [`EventDecoder::push`] as they arrive and call
/// [`EventDecoder::finish`] once the stream closes.
#[derive(Debug, Default)]
pub struct EventDecoder {
    /// Bytes of an incomplete UTF-8 sequence from the previous buffer.
    pending_bytes: Vec<u8>,
    /// Text after the last newline seen so far.
    line_buffer: String,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a buffer and return the events completed by it.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        self.pending_bytes.extend_from_slice(bytes);
        self.decode_pending_text(false);
        self.drain_complete_lines()
    }

    /// Flush everything still buffered, including a final unterminated line.
    pub fn finish(mut self) -> Vec<StreamEvent> {
        self.decode_pending_text(true);
        let mut events = self.drain_complete_lines();
        let remainder = std::mem::take(&mut self.line_buffer);
        if let Some(event) = Self::event_from_line(&remainder) {
            events.push(event);
        }
        events
    }

    /// Move decodable bytes from `pending_bytes` into `line_buffer`.
    ///
    /// An incomplete sequence at the end is kept for the next buffer unless
    /// `at_eof`, in which case it is replaced like any other invalid input.
    fn decode_pending_text(&mut self, at_eof: bool) {
        let mut consumed = 0;
        loop {
            let rest = &self.pending_bytes[consumed..];
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    self.line_buffer.push_str(text);
                    consumed = self.pending_bytes.len();
                    break;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    // from_utf8 already validated this prefix.
                    self.line_buffer
                        .push_str(&String::from_utf8_lossy(&rest[..valid]));
                    consumed += valid;
                    match err.error_len() {
                        Some(invalid) => {
                            self.line_buffer.push(char::REPLACEMENT_CHARACTER);
                            consumed += invalid;
                        }
                        None if at_eof => {
                            self.line_buffer.push(char::REPLACEMENT_CHARACTER);
                            consumed = self.pending_bytes.len();
                            break;
                        }
                        None => break,
                    }
                }
            }
        }
        self.pending_bytes.drain(..consumed);
    }

    fn drain_complete_lines(&mut self) -> Vec<StreamEvent> {
        let Some(last_newline) = self.line_buffer.rfind('\n') else {
            return Vec::new();
        };
        let remainder = self.line_buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.line_buffer, remainder);

        complete
            .split('\n')
            .filter_map(Self::event_from_line)
            .collect()
    }

    fn event_from_line(line: &str) -> Option<StreamEvent> {
        match parse_line(line) {
            Ok(event) => event,
            Err(err) => {
                tracing::debug!(error = %err, line = %line, "skipping malformed stream line");
                None
            }
        }
    }
}

/// Boxed stream of raw body buffers from a transport.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, TransportError>> + Send + 'static>>;

/// Boxed stream of decoded events.
pub type EventStream =
    Pin<Box<dyn Stream<Item = Result<StreamEvent, TransportError>> + Send + 'static>>;

/// Adapt a byte stream into an ordered stream of events.
///
/// Transport errors are forwarded and end the stream; the tail of the
/// buffer is flushed when the byte stream closes normally.
pub fn decode_stream(mut bytes: ByteStream) -> EventStream {
    Box::pin(async_stream::try_stream! {
        let mut decoder = EventDecoder::new();

        while let Some(chunk) = bytes.next().await {
            let chunk = chunk?;
            for event in decoder.push(&chunk) {
                yield event;
            }
        }

        for event in decoder.finish() {
            yield event;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use serde_json::json;

    const SAMPLE: &str = concat!(
        "data: {\"type\":\"chunk\",\"content\":\"Grüß \"}\n",
        "\n",
        "data: {\"type\":\"tool_call_start\",\"tool\":\"search\",\"tool_call_id\":\"c1\",\"input\":{\"q\":\"日本\"}}\n",
        "data: {\"type\":\"tool_call_end\",\"tool\":\"search\",\"tool_call_id\":\"c1\",\"result\":\"ok\"}\n",
        "data: {\"type\":\"chunk\",\"content\":\"🦀 done\"}\n",
        "data: [DONE]\n",
    );

    fn decode_all(buffers: &[&[u8]]) -> Vec<StreamEvent> {
        let mut decoder = EventDecoder::new();
        let mut events = Vec::new();
        for buffer in buffers {
            events.extend(decoder.push(buffer));
        }
        events.extend(decoder.finish());
        events
    }

    #[test]
    fn test_parse_chunk_line() {
        let event = parse_line(r#"data: {"type":"chunk","content":"Hi"}"#).unwrap();
        assert_eq!(
            event,
            Some(StreamEvent::Chunk {
                content: "Hi".to_string()
            })
        );
    }

    #[test]
    fn test_parse_done_sentinel() {
        assert_eq!(parse_line("data: [DONE]").unwrap(), Some(StreamEvent::done()));
        assert_eq!(parse_line("data:[DONE]\r").unwrap(), Some(StreamEvent::done()));
    }

    #[test]
    fn test_parse_done_with_session_id() {
        let event =
            parse_line(r#"data: {"type":"done","session_id":"s-42","suggestions":["more?"]}"#)
                .unwrap();
        assert_eq!(
            event,
            Some(StreamEvent::Done {
                session_id: Some("s-42".to_string()),
                suggestions: Some(vec!["more?".to_string()]),
            })
        );
    }

    #[test]
    fn test_parse_error_prefers_content_then_error() {
        let from_content = parse_line(r#"data: {"type":"error","content":"boom"}"#).unwrap();
        assert_eq!(
            from_content,
            Some(StreamEvent::Error {
                message: "boom".to_string()
            })
        );
        let from_error = parse_line(r#"data: {"type":"error","error":"bang"}"#).unwrap();
        assert_eq!(
            from_error,
            Some(StreamEvent::Error {
                message: "bang".to_string()
            })
        );
    }

    #[test]
    fn test_tool_call_start_defaults_input_to_empty_object() {
        let event = parse_line(r#"data: {"type":"tool_call_start","tool":"clock"}"#).unwrap();
        assert_eq!(
            event,
            Some(StreamEvent::ToolCallStart {
                tool: "clock".to_string(),
                tool_call_id: None,
                input: json!({}),
            })
        );
    }

    #[test]
    fn test_non_data_lines_yield_nothing() {
        assert_eq!(parse_line("").unwrap(), None);
        assert_eq!(parse_line(": keepalive").unwrap(), None);
        assert_eq!(parse_line("event: message").unwrap(), None);
    }

    #[test]
    fn test_malformed_and_unknown_lines_are_errors() {
        assert!(matches!(
            parse_line("data: {not json"),
            Err(ProtocolError::Malformed(_))
        ));
        assert_eq!(
            parse_line(r#"data: {"type":"heartbeat"}"#),
            Err(ProtocolError::UnknownType)
        );
    }

    #[test]
    fn test_malformed_line_does_not_stop_decoding() {
        let input = "data: {broken\ndata: {\"type\":\"chunk\",\"content\":\"ok\"}\n";
        let events = decode_all(&[input.as_bytes()]);
        assert_eq!(
            events,
            vec![StreamEvent::Chunk {
                content: "ok".to_string()
            }]
        );
    }

    #[test]
    fn test_final_line_without_newline_is_not_lost() {
        let input = "data: {\"type\":\"chunk\",\"content\":\"a\"}\ndata: [DONE]";
        let events = decode_all(&[input.as_bytes()]);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], StreamEvent::done());
    }

    #[test]
    fn test_crlf_line_endings() {
        let input = "data: {\"type\":\"chunk\",\"content\":\"a\"}\r\n\r\ndata: [DONE]\r\n";
        let events = decode_all(&[input.as_bytes()]);
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_split_multibyte_character_is_carried() {
        let bytes = "data: {\"type\":\"chunk\",\"content\":\"🦀\"}\n".as_bytes();
        let crab_start = bytes.iter().position(|b| *b == 0xF0).unwrap();
        let (head, tail) = bytes.split_at(crab_start + 2);

        let mut decoder = EventDecoder::new();
        assert!(decoder.push(head).is_empty());
        let events = decoder.push(tail);
        assert_eq!(
            events,
            vec![StreamEvent::Chunk {
                content: "🦀".to_string()
            }]
        );
    }

    #[test]
    fn test_every_split_point_yields_same_events() {
        let bytes = SAMPLE.as_bytes();
        let expected = decode_all(&[bytes]);
        assert_eq!(expected.len(), 5);

        for split in 0..=bytes.len() {
            let (a, b) = bytes.split_at(split);
            assert_eq!(decode_all(&[a, b]), expected, "split at byte {split}");
        }
    }

    #[test]
    fn test_byte_at_a_time_yields_same_events() {
        let bytes = SAMPLE.as_bytes();
        let expected = decode_all(&[bytes]);
        let singles: Vec<&[u8]> = bytes.chunks(1).collect();
        assert_eq!(decode_all(&singles), expected);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut bytes = b"data: {\"type\":\"chunk\",\"content\":\"a".to_vec();
        bytes.push(0xFF);
        bytes.extend_from_slice(b"b\"}\n");
        let events = decode_all(&[&bytes]);
        assert_eq!(
            events,
            vec![StreamEvent::Chunk {
                content: "a\u{FFFD}b".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_decode_stream_flushes_tail_on_close() {
        let parts: Vec<Result<Vec<u8>, TransportError>> = vec![
            Ok(b"data: {\"type\":\"chunk\",\"con".to_vec()),
            Ok(b"tent\":\"Hi\"}\ndata: [DO".to_vec()),
            Ok(b"NE]".to_vec()),
        ];
        let events: Vec<_> = decode_stream(Box::pin(stream::iter(parts)))
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(
            events,
            vec![
                StreamEvent::Chunk {
                    content: "Hi".to_string()
                },
                StreamEvent::done(),
            ]
        );
    }

    #[tokio::test]
    async fn test_decode_stream_forwards_transport_errors() {
        let parts: Vec<Result<Vec<u8>, TransportError>> = vec![
            Ok(b"data: {\"type\":\"chunk\",\"content\":\"a\"}\n".to_vec()),
            Err(TransportError::Network("connection reset".to_string())),
        ];
        let results: Vec<_> = decode_stream(Box::pin(stream::iter(parts))).collect().await;
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert_eq!(
            results[1],
            Err(TransportError::Network("connection reset".to_string()))
        );
    }
}
