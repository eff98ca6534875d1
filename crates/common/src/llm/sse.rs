//! Incremental decoder for `text/event-stream` bodies

/// Splits a byte stream into event `data` payloads.
///
/// Network chunks may end anywhere, including inside a UTF-8 sequence or
/// between the two newlines that terminate an event, so bytes are buffered
/// until a full event is available.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feed a chunk, returning the payloads of all events it completed
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut events = Vec::new();
        while let Some(end) = find_event_end(&self.buffer) {
            let block: Vec<u8> = self.buffer.drain(..end + 2).collect();
            if let Some(data) = event_data(&block[..end]) {
                events.push(data);
            }
        }
        events
    }

    /// Flush a trailing event the server did not terminate
    pub(crate) fn finish(&mut self) -> Vec<String> {
        let block = std::mem::take(&mut self.buffer);
        event_data(&block).into_iter().collect()
    }
}

fn find_event_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

/// Join the `data:` lines of one event; comments and other fields are ignored
fn event_data(block: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(block);
    let lines: Vec<&str> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.strip_prefix(' ').unwrap_or(data))
        .collect();

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_event() {
        let mut decoder = SseDecoder::default();
        assert_eq!(decoder.push(b"data: {\"a\":1}\n\n"), vec!["{\"a\":1}"]);
    }

    #[test]
    fn test_event_split_across_chunks() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"te").is_empty());
        assert!(decoder.push(b"xt\":\"hi\"}\n").is_empty());
        assert_eq!(decoder.push(b"\ndata: second\n\n"), vec!["{\"text\":\"hi\"}", "second"]);
    }

    #[test]
    fn test_crlf_and_comments() {
        let mut decoder = SseDecoder::default();
        let events = decoder.push(b": keep-alive\r\n\r\ndata: one\r\n\r\n");
        assert_eq!(events, vec!["one"]);
    }

    #[test]
    fn test_multiline_data() {
        let mut decoder = SseDecoder::default();
        assert_eq!(decoder.push(b"data: a\ndata: b\n\n"), vec!["a\nb"]);
    }

    #[test]
    fn test_utf8_split_inside_character() {
        let mut decoder = SseDecoder::default();
        let payload = "data: ₹2500\n\n".as_bytes();
        // '₹' is three bytes; cut in the middle of it
        let cut = "data: ".len() + 1;
        assert!(decoder.push(&payload[..cut]).is_empty());
        assert_eq!(decoder.push(&payload[cut..]), vec!["₹2500"]);
    }

    #[test]
    fn test_finish_flushes_unterminated_event() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: tail").is_empty());
        assert_eq!(decoder.finish(), vec!["tail"]);
        assert!(decoder.finish().is_empty());
    }
}
