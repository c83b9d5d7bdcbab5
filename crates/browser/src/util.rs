//! Small pure helpers shared across the driver.

/// Replace every byte sequence that is not a valid UTF-8 scalar with U+FFFD.
///
/// Walks the lead byte, classifies the sequence length (1-4), and requires
/// the exact number of continuation bytes (0x80..=0xBF). On any violation a
/// single replacement character is emitted and the walk advances one byte.
pub fn sanitize_utf8(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    let mut index = 0;

    while index < bytes.len() {
        let lead = bytes[index];
        let length = match lead {
            0x00..=0x7F => 1,
            0xC2..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF4 => 4,
            _ => 0,
        };

        if length == 0 || index + length > bytes.len() {
            out.push('\u{FFFD}');
            index += 1;
            continue;
        }

        let sequence = &bytes[index..index + length];
        if sequence[1..].iter().any(|b| b & 0xC0 != 0x80) {
            out.push('\u{FFFD}');
            index += 1;
            continue;
        }

        match std::str::from_utf8(sequence) {
            Ok(scalar) => {
                out.push_str(scalar);
                index += length;
            }
            // Overlongs and surrogates fail std validation even with correct
            // continuation bytes; advance one byte like any other violation.
            Err(_) => {
                out.push('\u{FFFD}');
                index += 1;
            }
        }
    }

    out
}

/// Sanitize a string observed from the page before handing it to callers.
pub fn sanitize_text(text: &str) -> String {
    sanitize_utf8(text.as_bytes())
}

/// Escape a string for embedding inside a single-quoted JS string literal.
pub fn js_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for character in text.chars() {
        match character {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

/// Wall clock in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Center of a CDP box-model `content` quad (8 doubles: four x,y corners,
/// clockwise from top-left).
pub fn box_model_center(content: &[f64]) -> Option<(f64, f64)> {
    if content.len() < 8 {
        return None;
    }
    Some(((content[0] + content[4]) / 2.0, (content[1] + content[5]) / 2.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_passes_valid_utf8_through() {
        for text in ["", "hello", "héllo wörld", "漢字", "a\u{10FFFF}b"] {
            assert_eq!(sanitize_utf8(text.as_bytes()), text);
        }
    }

    #[test]
    fn sanitize_replaces_stray_continuation() {
        assert_eq!(sanitize_utf8(&[0x80]), "\u{FFFD}");
        assert_eq!(sanitize_utf8(&[b'a', 0xBF, b'b']), "a\u{FFFD}b");
    }

    #[test]
    fn sanitize_replaces_truncated_sequence() {
        // 0xE4 starts a 3-byte sequence; only one continuation follows.
        assert_eq!(sanitize_utf8(&[0xE4, 0xB8]), "\u{FFFD}\u{FFFD}");
        // Valid lead at end of input.
        assert_eq!(sanitize_utf8(&[b'x', 0xC3]), "x\u{FFFD}");
    }

    #[test]
    fn sanitize_rejects_invalid_leads() {
        // 0xC0/0xC1 are overlong leads, 0xF5..=0xFF are out of range.
        assert_eq!(sanitize_utf8(&[0xC0, 0xAF]), "\u{FFFD}\u{FFFD}");
        assert_eq!(sanitize_utf8(&[0xFF]), "\u{FFFD}");
    }

    #[test]
    fn sanitize_rejects_surrogate_encoding() {
        // 0xED 0xA0 0x80 encodes U+D800, which is not a scalar value.
        assert_eq!(sanitize_utf8(&[0xED, 0xA0, 0x80]), "\u{FFFD}\u{FFFD}\u{FFFD}");
    }

    #[test]
    fn sanitize_output_is_always_valid() {
        let noise: Vec<u8> = (0u8..=255).collect();
        let out = sanitize_utf8(&noise);
        assert!(std::str::from_utf8(out.as_bytes()).is_ok());
    }

    #[test]
    fn js_escape_quotes_and_newlines() {
        assert_eq!(js_escape("a'b"), "a\\'b");
        assert_eq!(js_escape("a\\b"), "a\\\\b");
        assert_eq!(js_escape("line\nbreak"), "line\\nbreak");
        assert_eq!(js_escape("#plain .selector"), "#plain .selector");
    }

    #[test]
    fn box_center_midpoint() {
        let quad = [10.0, 20.0, 110.0, 20.0, 110.0, 60.0, 10.0, 60.0];
        let (x, y) = box_model_center(&quad).unwrap();
        assert!((x - 60.0).abs() < f64::EPSILON);
        assert!((y - 40.0).abs() < f64::EPSILON);
        assert!(box_model_center(&quad[..7]).is_none());
    }
}
