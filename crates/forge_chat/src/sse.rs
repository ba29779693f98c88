//! Server-sent event buffering.

/// Accumulates raw stream bytes and yields complete `data:` payloads.
#[derive(Debug, Default)]
pub struct SseBuffer {
    buffer: Vec<u8>,
}

impl SseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a chunk and return the payloads of every line it completed.
    ///
    /// `[DONE]` markers and non-data lines are dropped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        // Chunks may split a UTF-8 sequence; only whole lines are decoded.
        self.buffer.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        while let Some(line_end) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=line_end).collect();
            let line = String::from_utf8_lossy(&raw).trim().to_string();

            if let Some(data) = line.strip_prefix("data:") {
                let data = data.trim_start();
                if !data.is_empty() && data != "[DONE]" {
                    payloads.push(data.to_string());
                }
            }
        }
        payloads
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_split_across_chunks() {
        let mut sse = SseBuffer::new();
        assert!(sse.push(b"event: message\ndata: {\"a\"").is_empty());
        assert_eq!(sse.push(b":1}\n\n"), vec!["{\"a\":1}".to_string()]);
    }

    #[test]
    fn test_done_marker_dropped() {
        let mut sse = SseBuffer::new();
        assert_eq!(
            sse.push(b"data: x\r\ndata: [DONE]\n"),
            vec!["x".to_string()]
        );
    }

    #[test]
    fn test_multibyte_split_across_chunks() {
        let mut sse = SseBuffer::new();
        let bytes = "data: café\n".as_bytes();
        let split = bytes.len() - 2;
        assert!(sse.push(&bytes[..split]).is_empty());
        assert_eq!(sse.push(&bytes[split..]), vec!["café".to_string()]);
    }
}
