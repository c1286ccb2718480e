//! Line framing for streamed provider responses (SSE and NDJSON).

use super::GenerationError;
use async_stream::try_stream;
use futures_core::Stream;
use futures_util::StreamExt;

/// Split a byte stream into text lines, tolerating lines split across chunks.
///
/// Trailing `\r` is removed; a final unterminated line is still emitted.
pub(crate) fn lines<S, B>(bytes: S) -> impl Stream<Item = Result<String, GenerationError>> + Send
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send,
{
    try_stream! {
        let mut bytes = Box::pin(bytes);
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(|error| {
                GenerationError::GenerationFailed(format!("stream interrupted: {error}"))
            })?;
            buffer.extend_from_slice(chunk.as_ref());

            while let Some(position) = buffer.iter().position(|byte| *byte == b'\n') {
                let line: Vec<u8> = buffer.drain(..=position).collect();
                yield decode_line(&line[..line.len() - 1]);
            }
        }

        if !buffer.is_empty() {
            yield decode_line(&buffer);
        }
    }
}

fn decode_line(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    text.strip_suffix('\r').unwrap_or(text.as_ref()).to_string()
}

/// Payload of a server-sent-event `data:` line, if the line is one.
pub(crate) fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim)
}
