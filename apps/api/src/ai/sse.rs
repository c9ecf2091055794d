//! Incremental decoding of vendor streaming responses.
//!
//! Vendors frame streams as server-sent events (`data: {...}` lines) or newline-delimited JSON.
//! Network chunks do not respect line boundaries, so bytes are buffered until a full line
//! is available.

use bytes::BytesMut;
use futures::StreamExt;

use crate::ai::types::ProviderError;

#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: BytesMut,
}

impl LineBuffer {
    /// Appends a chunk and returns every line it completed, without the line terminator.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line = self.buf.split_to(pos + 1);
            let text = String::from_utf8_lossy(&line[..pos]);
            lines.push(text.trim_end_matches('\r').to_string());
        }
        lines
    }

    /// Returns a trailing line that never received its newline.
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = self.buf.split();
        let text = String::from_utf8_lossy(&rest).trim().to_string();
        (!text.is_empty()).then_some(text)
    }
}

/// Returns the payload of an SSE `data:` line, skipping the `[DONE]` terminator.
pub fn sse_data(line: &str) -> Option<&str> {
    let data = line.strip_prefix("data:")?.trim_start();
    (data != "[DONE]" && !data.is_empty()).then_some(data)
}

/// Drives a streaming response to completion, handing each complete line to `on_line`.
pub async fn for_each_line<F>(
    response: reqwest::Response,
    provider: &str,
    mut on_line: F,
) -> Result<(), ProviderError>
where
    F: FnMut(&str) + Send,
{
    let mut stream = response.bytes_stream();
    let mut buffer = LineBuffer::default();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| ProviderError::transport(provider, e))?;
        for line in buffer.push(&chunk) {
            on_line(&line);
        }
    }

    if let Some(line) = buffer.finish() {
        on_line(&line);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_buffer_joins_lines_split_across_chunks() {
        let mut buffer = LineBuffer::default();

        assert!(buffer.push(b"data: {\"delta\":").is_empty());
        let lines = buffer.push(b"{\"text\":\"Hi\"}}\ndata: [DO");
        assert_eq!(lines, vec!["data: {\"delta\":{\"text\":\"Hi\"}}".to_string()]);

        let lines = buffer.push(b"NE]\r\n");
        assert_eq!(lines, vec!["data: [DONE]".to_string()]);
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn test_line_buffer_returns_multiple_lines_from_one_chunk() {
        let mut buffer = LineBuffer::default();
        let lines = buffer.push(b"{\"text\":\"a\"}\n{\"text\":\"b\"}\n{\"text\"");
        assert_eq!(lines.len(), 2);
        assert_eq!(buffer.finish().as_deref(), Some("{\"text\""));
    }

    #[test]
    fn test_line_buffer_keeps_multibyte_characters_intact() {
        let mut buffer = LineBuffer::default();
        let bytes = "data: café\n".as_bytes();
        // Split inside the two-byte 'é'.
        let split = bytes.len() - 2;
        assert!(buffer.push(&bytes[..split]).is_empty());
        assert_eq!(buffer.push(&bytes[split..]), vec!["data: café".to_string()]);
    }

    #[test]
    fn test_sse_data_extracts_payload() {
        assert_eq!(sse_data("data: {\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(sse_data("data:{\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(sse_data("data: [DONE]"), None);
        assert_eq!(sse_data("event: message_start"), None);
        assert_eq!(sse_data(""), None);
    }
}
