//! Line-framed event stream decoder (Bytes -> JSON Value).
//!
//! - splits on `\n` (a trailing `\r` is dropped)
//! - strips the `data:` prefix
//! - ignores blank lines, `:` comments and non-data fields (`event:`, `id:`)
//! - stops on `data: [DONE]`
//!
//! A payload that is not JSON, or a body that ends before `[DONE]`, is a protocol error.

use crate::{BoxStream, Error, ErrorContext, Result};
use bytes::{Buf, Bytes, BytesMut};
use futures::{stream, StreamExt};
use serde_json::Value;

const DATA_PREFIX: &str = "data:";
const DONE_SIGNAL: &str = "[DONE]";

enum Line {
    Skip,
    Done,
    Payload(Value),
}

fn parse_line(raw: &str) -> Result<Line> {
    let line = raw.trim_end_matches('\r').trim();
    if line.is_empty() || line.starts_with(':') {
        return Ok(Line::Skip);
    }
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return Ok(Line::Skip);
    };
    let payload = payload.trim_start();
    if payload == DONE_SIGNAL {
        return Ok(Line::Done);
    }
    serde_json::from_str(payload).map(Line::Payload).map_err(|e| {
        Error::protocol_with_context(
            format!("malformed stream payload: {}", e),
            ErrorContext::new()
                .with_details(payload.chars().take(200).collect::<String>())
                .with_source("sse_decoder"),
        )
    })
}

struct DecoderState {
    input: BoxStream<'static, Bytes>,
    /// Raw bytes not yet framed; a line is only decoded once it is complete.
    buf: BytesMut,
    finished: bool,
}

/// Decode one complete line. Invalid UTF-8 inside a line is replaced.
fn take_line(buf: &mut BytesMut, end: usize) -> String {
    let line = String::from_utf8_lossy(&buf[..end]).into_owned();
    buf.advance(end + 1);
    line
}

pub fn decode(input: BoxStream<'static, Bytes>) -> BoxStream<'static, Value> {
    let state = DecoderState {
        input,
        buf: BytesMut::new(),
        finished: false,
    };

    let stream = stream::unfold(state, |mut st| async move {
        if st.finished {
            return None;
        }
        loop {
            // Emit complete lines first.
            if let Some(idx) = st.buf.iter().position(|b| *b == b'\n') {
                let line = take_line(&mut st.buf, idx);
                match parse_line(&line) {
                    Ok(Line::Skip) => continue,
                    Ok(Line::Done) => {
                        st.finished = true;
                        return None;
                    }
                    Ok(Line::Payload(v)) => return Some((Ok(v), st)),
                    Err(e) => {
                        st.finished = true;
                        return Some((Err(e), st));
                    }
                }
            }

            match st.input.next().await {
                Some(Ok(bytes)) => {
                    st.buf.extend_from_slice(&bytes);
                }
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(e), st));
                }
                None => {
                    // EOF: the last line may lack its newline.
                    let rest = String::from_utf8_lossy(&st.buf.split()).into_owned();
                    st.finished = true;
                    return match parse_line(&rest) {
                        Ok(Line::Done) => None,
                        Ok(Line::Payload(_)) | Ok(Line::Skip) => Some((
                            Err(Error::protocol_with_context(
                                "stream ended without [DONE]",
                                ErrorContext::new().with_source("sse_decoder"),
                            )),
                            st,
                        )),
                        Err(e) => Some((Err(e), st)),
                    };
                }
            }
        }
    });

    Box::pin(stream)
}
