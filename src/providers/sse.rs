//! Minimal server-sent events decoding for streaming completion bodies.
//!
//! Splits a byte stream into lines, yields the payload of each `data:` line
//! and stops at the `[DONE]` sentinel. Comment lines, `event:` lines and
//! blank keep-alives are skipped; the payload itself is left as-is for the
//! caller to parse, since each vendor wraps its deltas differently.

use std::fmt;
use std::pin::Pin;

use futures_util::{Stream, StreamExt, stream};

use crate::{BifrostError, Result};

struct Decoder<S> {
    bytes: Pin<Box<S>>,
    buffer: Vec<u8>,
    done: bool,
}

enum Line {
    Data(String),
    Done,
    Skip,
}

/// Decode the SSE body of an upstream response into `data:` payloads.
pub(crate) fn data_events(
    response: reqwest::Response,
) -> impl Stream<Item = Result<String>> + Send {
    decode(response.bytes_stream())
}

/// Generic over the byte source so tests can feed hand-built chunks.
pub(crate) fn decode<S, B, E>(bytes: S) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: fmt::Display + Send,
{
    let decoder = Decoder {
        bytes: Box::pin(bytes),
        buffer: Vec::new(),
        done: false,
    };

    stream::unfold(decoder, |mut decoder| async move {
        if decoder.done {
            return None;
        }
        loop {
            while let Some(line) = next_line(&mut decoder.buffer) {
                match parse_line(&line) {
                    Line::Data(payload) => return Some((Ok(payload), decoder)),
                    Line::Done => {
                        decoder.done = true;
                        return None;
                    }
                    Line::Skip => {}
                }
            }

            match decoder.bytes.next().await {
                Some(Ok(chunk)) => decoder.buffer.extend_from_slice(chunk.as_ref()),
                Some(Err(e)) => {
                    decoder.done = true;
                    return Some((Err(BifrostError::Stream(e.to_string())), decoder));
                }
                None => {
                    decoder.done = true;
                    if decoder.buffer.is_empty() {
                        return None;
                    }
                    // Trailing line without a newline before EOF.
                    let text = String::from_utf8_lossy(&decoder.buffer).into_owned();
                    decoder.buffer.clear();
                    return match parse_line(text.trim_end_matches(['\r', '\n'])) {
                        Line::Data(payload) => Some((Ok(payload), decoder)),
                        _ => None,
                    };
                }
            }
        }
    })
}

/// Pop the next complete line from the buffer, without its terminator.
///
/// Buffering bytes rather than text keeps multi-byte characters split
/// across chunk boundaries intact.
fn next_line(buffer: &mut Vec<u8>) -> Option<String> {
    let idx = buffer.iter().position(|b| *b == b'\n')?;
    let line: Vec<u8> = buffer.drain(..=idx).collect();
    let text = String::from_utf8_lossy(&line);
    Some(text.trim_end_matches(['\r', '\n']).to_owned())
}

fn parse_line(line: &str) -> Line {
    let Some(payload) = line.strip_prefix("data:") else {
        return Line::Skip;
    };
    let payload = payload.strip_prefix(' ').unwrap_or(payload);
    if payload == "[DONE]" {
        return Line::Done;
    }
    if payload.is_empty() {
        return Line::Skip;
    }
    Line::Data(payload.to_owned())
}
