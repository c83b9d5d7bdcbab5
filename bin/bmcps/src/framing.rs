//! Stdio message framing: extract complete JSON objects from a byte stream.
//!
//! Brace counting with string/escape awareness, so the framer accepts both
//! newline-delimited and streamed JSON. Anything before the first `{` of a
//! message (whitespace, newlines) is discarded.

#[derive(Default)]
pub struct MessageFramer {
    current: Vec<u8>,
    depth: u32,
    inside_string: bool,
    escape_next: bool,
    started: bool,
}

impl MessageFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns every message completed by it, in order.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut messages = Vec::new();

        for &byte in bytes {
            if !self.started {
                if byte == b'{' {
                    self.started = true;
                    self.depth = 1;
                    self.current.push(byte);
                }
                continue;
            }

            self.current.push(byte);

            if self.escape_next {
                self.escape_next = false;
                continue;
            }
            if byte == b'\\' && self.inside_string {
                self.escape_next = true;
                continue;
            }
            if byte == b'"' {
                self.inside_string = !self.inside_string;
                continue;
            }
            if self.inside_string {
                continue;
            }

            match byte {
                b'{' => self.depth += 1,
                b'}' => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        let raw = std::mem::take(&mut self.current);
                        // The scanner only splits on ASCII; the payload is
                        // whatever the client sent.
                        messages.push(String::from_utf8_lossy(&raw).into_owned());
                        self.started = false;
                        self.inside_string = false;
                        self.escape_next = false;
                    }
                }
                _ => {}
            }
        }

        messages
    }

    /// True when a partial message is buffered.
    pub fn has_partial(&self) -> bool {
        self.started
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_object() {
        let mut framer = MessageFramer::new();
        let messages = framer.feed(br#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with(r#"{"jsonrpc"#));
        assert!(!framer.has_partial());
    }

    #[test]
    fn split_across_chunks() {
        let mut framer = MessageFramer::new();
        assert!(framer.feed(br#"{"method":"tools/"#).is_empty());
        assert!(framer.has_partial());
        let messages = framer.feed(br#"list","id":2}"#);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0], r#"{"method":"tools/list","id":2}"#);
    }

    #[test]
    fn braces_inside_strings_do_not_count() {
        let mut framer = MessageFramer::new();
        let messages = framer.feed(br#"{"text":"a { b } c"}"#);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0], r#"{"text":"a { b } c"}"#);
    }

    #[test]
    fn escaped_quotes_inside_strings() {
        let mut framer = MessageFramer::new();
        let messages = framer.feed(br#"{"text":"she said \"{\" loudly"}"#);
        assert_eq!(messages.len(), 1);
    }

    #[test]
    fn nested_objects() {
        let mut framer = MessageFramer::new();
        let messages = framer.feed(br#"{"params":{"arguments":{"x":{}}}}"#);
        assert_eq!(messages.len(), 1);
    }

    #[test]
    fn multiple_messages_one_chunk() {
        let mut framer = MessageFramer::new();
        let messages = framer.feed(b"{\"id\":1}\n{\"id\":2}\n");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], r#"{"id":1}"#);
        assert_eq!(messages[1], r#"{"id":2}"#);
    }

    #[test]
    fn leading_noise_is_skipped() {
        let mut framer = MessageFramer::new();
        let messages = framer.feed(b"\n\n  \t{\"id\":3}");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0], r#"{"id":3}"#);
    }
}
