//! Line-buffered SSE decoding for upstream provider streams.
//!
//! Reassembles complete `data:` payloads from a byte stream whose chunk
//! boundaries do not align with SSE line boundaries (TCP framing).

/// Maximum bytes buffered for a single unterminated line before draining.
const MAX_LINE_BUFFER: usize = 64 * 1024;

/// Incremental decoder turning raw bytes into `data:` payload strings.
///
/// Non-`data:` SSE fields (`event:`, `id:`, `retry:`, comments) and blank
/// separator lines are skipped; CRLF and bare-LF line endings both work.
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Feed a chunk of bytes, returning every complete `data:` payload it
    /// finished.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut payloads = Vec::new();

        for &b in bytes {
            if b == b'\n' {
                if let Some(data) = Self::data_payload(&self.buffer) {
                    payloads.push(data);
                }
                self.buffer.clear();
            } else {
                self.buffer.push(b);
                if self.buffer.len() > MAX_LINE_BUFFER {
                    // Oversized line without a newline: drop it rather than
                    // grow without bound.
                    self.buffer.clear();
                }
            }
        }

        payloads
    }

    /// Flush a final unterminated line (stream ended without trailing newline).
    pub fn finish(mut self) -> Option<String> {
        let line = std::mem::take(&mut self.buffer);
        Self::data_payload(&line)
    }

    fn data_payload(line: &[u8]) -> Option<String> {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let rest = line.strip_prefix(b"data:")?;
        let rest = rest.strip_prefix(b" ").unwrap_or(rest);
        if rest.is_empty() {
            return None;
        }
        String::from_utf8(rest.to_vec()).ok()
    }
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(chunks: &[&[u8]]) -> Vec<String> {
        let mut decoder = SseDecoder::new();
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend(decoder.feed(chunk));
        }
        out.extend(decoder.finish());
        out
    }

    #[test]
    fn test_single_chunk_multiple_events() {
        let payloads = collect(&[b"data: {\"a\":1}\n\ndata: {\"b\":2}\n\ndata: [DONE]\n\n"]);
        assert_eq!(payloads, vec!["{\"a\":1}", "{\"b\":2}", "[DONE]"]);
    }

    #[test]
    fn test_payload_split_across_chunks() {
        let payloads = collect(&[b"data: {\"prompt_to", b"kens\":10}\n\nda", b"ta: [DONE]\n\n"]);
        assert_eq!(payloads, vec!["{\"prompt_tokens\":10}", "[DONE]"]);
    }

    #[test]
    fn test_non_data_fields_skipped() {
        let payloads = collect(&[
            b"event: message\nid: 123\nretry: 5000\n: comment\ndata: {\"x\":1}\n\n",
        ]);
        assert_eq!(payloads, vec!["{\"x\":1}"]);
    }

    #[test]
    fn test_crlf_line_endings() {
        let payloads = collect(&[b"data: {\"x\":1}\r\n\r\ndata: [DONE]\r\n\r\n"]);
        assert_eq!(payloads, vec!["{\"x\":1}", "[DONE]"]);
    }

    #[test]
    fn test_data_without_space() {
        let payloads = collect(&[b"data:{\"x\":1}\n\ndata:[DONE]\n\n"]);
        assert_eq!(payloads, vec!["{\"x\":1}", "[DONE]"]);
    }

    #[test]
    fn test_final_line_without_trailing_newline() {
        let payloads = collect(&[b"data: {\"x\":1}\n\ndata: [DONE]"]);
        assert_eq!(payloads, vec!["{\"x\":1}", "[DONE]"]);
    }

    #[test]
    fn test_oversized_line_drained() {
        let huge = vec![b'x'; 65 * 1024];
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(&huge).is_empty());

        // Decoder still works after draining
        let payloads = decoder.feed(b"\ndata: {\"ok\":true}\n");
        assert_eq!(payloads, vec!["{\"ok\":true}"]);
    }

    #[test]
    fn test_empty_stream() {
        let payloads = collect(&[]);
        assert!(payloads.is_empty());
    }
}
