//! Incremental server-sent-events decoder
//!
//! Network chunks can split a line, or a multi-byte character, anywhere, so
//! bytes are buffered until a full line is available.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Data(String),
    Done,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
    finished: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }
        self.buffer.extend_from_slice(chunk);

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line).into_owned();
            self.process_line(&line, &mut events);
            if self.finished {
                self.buffer.clear();
                break;
            }
        }

        events
    }

    /// Flush whatever is left once the body ends
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest).trim_end_matches('\r').to_string();
            self.process_line(&line, &mut events);
        }
        if !self.finished {
            self.dispatch(&mut events);
        }
        self.finished = true;
        events
    }

    fn process_line(&mut self, line: &str, events: &mut Vec<SseEvent>) {
        if line.is_empty() {
            self.dispatch(events);
            return;
        }
        if line.starts_with(':') {
            return;
        }
        if let Some(value) = line.strip_prefix("data:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            self.data.push(value.to_string());
        }
        // event:, id:, retry: carry nothing we use
    }

    fn dispatch(&mut self, events: &mut Vec<SseEvent>) {
        if self.data.is_empty() {
            return;
        }
        let payload = self.data.join("\n");
        self.data.clear();

        if payload.trim() == "[DONE]" {
            self.finished = true;
            events.push(SseEvent::Done);
        } else {
            events.push(SseEvent::Data(payload));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_event() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"data: {\"a\":1}\n\n");
        assert_eq!(events, vec![SseEvent::Data("{\"a\":1}".to_string())]);
    }

    #[test]
    fn test_event_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"da").is_empty());
        assert!(decoder.feed(b"ta: hel").is_empty());
        assert!(decoder.feed(b"lo\r\n").is_empty());
        assert_eq!(decoder.feed(b"\r\n"), vec![SseEvent::Data("hello".to_string())]);
    }

    #[test]
    fn test_multibyte_char_split_across_chunks() {
        let bytes = "data: 你好\n\n".as_bytes();
        let mut decoder = SseDecoder::new();
        let mut events = decoder.feed(&bytes[..8]);
        events.extend(decoder.feed(&bytes[8..]));
        assert_eq!(events, vec![SseEvent::Data("你好".to_string())]);
    }

    #[test]
    fn test_done_stops_decoding() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"data: x\n\ndata: [DONE]\n\ndata: y\n\n");
        assert_eq!(events, vec![SseEvent::Data("x".to_string()), SseEvent::Done]);
        assert!(decoder.is_finished());
        assert!(decoder.feed(b"data: z\n\n").is_empty());
    }

    #[test]
    fn test_comments_and_other_fields_ignored() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b": keep-alive\n\nevent: message\nid: 7\ndata: ok\n\n");
        assert_eq!(events, vec![SseEvent::Data("ok".to_string())]);
    }

    #[test]
    fn test_multi_line_data_is_joined() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"data: one\ndata:two\n\n");
        assert_eq!(events, vec![SseEvent::Data("one\ntwo".to_string())]);
    }

    #[test]
    fn test_finish_flushes_unterminated_event() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: tail").is_empty());
        assert_eq!(decoder.finish(), vec![SseEvent::Data("tail".to_string())]);
        assert!(decoder.finish().is_empty());
    }
}
