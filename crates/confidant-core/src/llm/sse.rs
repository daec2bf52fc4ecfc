//! Incremental Server-Sent Events decoder.
//!
//! Consumes raw body chunks as they arrive and yields complete frames. Bytes
//! are buffered until a blank line closes a frame, so a multi-byte UTF-8
//! character split across two chunks decodes correctly. Used by the
//! provider adapters to read upstream streams and by tests to read the
//! relay's own output.

/// Sentinel data value ending an OpenAI-style stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// One decoded SSE frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Value of the `event:` field, if present.
    pub event: Option<String>,
    /// `data:` lines joined with `\n`.
    pub data: String,
}

impl SseFrame {
    pub fn is_done(&self) -> bool {
        self.data.trim() == DONE_SENTINEL
    }
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every frame it completed.
    ///
    /// Comment-only frames (heartbeats such as `:hb`) produce nothing.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        // CRLF and LF framing are treated alike.
        self.buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut frames = Vec::new();
        while let Some(pos) = find_blank_line(&self.buffer) {
            let raw: Vec<u8> = self.buffer.drain(..pos + 2).collect();
            if let Some(frame) = parse_frame(&raw[..pos]) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush a trailing frame that was not closed by a blank line.
    pub fn finish(&mut self) -> Option<SseFrame> {
        let raw = std::mem::take(&mut self.buffer);
        parse_frame(&raw)
    }
}

fn find_blank_line(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

fn parse_frame(raw: &[u8]) -> Option<SseFrame> {
    let text = String::from_utf8_lossy(raw);
    let mut event = None;
    let mut data: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => data.push(value),
            "event" => event = Some(value.to_string()),
            _ => {}
        }
    }

    if event.is_none() && data.is_empty() {
        return None;
    }
    Some(SseFrame {
        event,
        data: data.join("\n"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_frames_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: hel").is_empty());
        let frames = decoder.push(b"lo\n\ndata: world\n\n");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].data, "hello");
        assert_eq!(frames[1].data, "world");
    }

    #[test]
    fn test_utf8_split_across_chunks() {
        let bytes = "data: café\n\n".as_bytes();
        // Split inside the two-byte 'é'.
        let split = bytes.len() - 3;
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(&bytes[..split]).is_empty());
        let frames = decoder.push(&bytes[split..]);
        assert_eq!(frames[0].data, "café");
    }

    #[test]
    fn test_crlf_and_comments() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(b":hb\r\n\r\ndata: x\r\n\r\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "x");
    }

    #[test]
    fn test_event_and_done() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(b"event: done\ndata: [DONE]\n\n");
        assert_eq!(frames[0].event.as_deref(), Some("done"));
        assert!(frames[0].is_done());
    }

    #[test]
    fn test_multiline_data_and_finish() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(b"data: a\ndata: b\n\ndata: tail");
        assert_eq!(frames[0].data, "a\nb");
        assert_eq!(decoder.finish().map(|f| f.data), Some("tail".to_string()));
        assert!(decoder.finish().is_none());
    }
}
