//! Reading the `response` value out of a body that is only valid JSON once it
//! has fully arrived.
//!
//! The endpoint streams the bytes of a single object, so any cut point may
//! land inside a key, a string, or an escape sequence. `partial_response`
//! scans just the `response` string value and decodes as much of it as is
//! unambiguous; `parse_final` runs a strict parse over the finished buffer.

use crate::errors::FinalParseError;

const RESPONSE_KEY: &str = "\"response\"";
const SOURCES_MARKER: &str = "\", \"sources\":";

/// Best-effort decoding of the `response` string from an incomplete buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartialResponse {
    /// Decoded text so far.
    pub text: String,
    /// `true` once a quote followed by `,` or `}` has ended the value.
    pub closed: bool,
}

/// Fully parsed reply body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatReply {
    pub response: String,
    pub sources: Vec<String>,
}

#[derive(serde::Deserialize)]
struct WireReply {
    response: String,
    #[serde(default)]
    sources: Option<Vec<String>>,
}

/// Locates the `response` value in `buffer` and decodes its readable prefix.
///
/// Returns `None` while the key, the colon or the opening quote have not
/// arrived yet.
pub fn partial_response(buffer: &str) -> Option<PartialResponse> {
    let start = response_value_start(buffer)?;
    let decoded = decode_string_prefix(&buffer[start..]);
    Some(PartialResponse {
        text: decoded.text,
        closed: decoded.closed,
    })
}

/// Recovers the `response` text from a finished body that failed to parse:
/// everything after the opening quote up to the last `", "sources":`.
///
/// Quotes are taken as text and incomplete escapes are kept literally.
/// Returns `None` when the value or the marker is missing.
pub fn marker_cut_response(buffer: &str) -> Option<String> {
    let start = response_value_start(buffer)?;
    let value = &buffer[start..];
    let end = value.rfind(SOURCES_MARKER)?;
    Some(unescape_lenient(&value[..end]))
}

/// Incremental form of [`partial_response`] for a buffer that only grows.
///
/// Bytes already decoded are never scanned again.
#[derive(Debug, Default)]
pub(crate) struct ResponseScanner {
    value_start: Option<usize>,
    cursor: usize,
    text: String,
    closed: bool,
}

impl ResponseScanner {
    /// Decodes whatever `buffer` added since the last call and returns the
    /// text so far, or `None` while the value has not started.
    pub(crate) fn advance(&mut self, buffer: &str) -> Option<&str> {
        if self.value_start.is_none() {
            let start = response_value_start(buffer)?;
            self.value_start = Some(start);
            self.cursor = start;
        }
        if !self.closed {
            let decoded = decode_string_prefix(&buffer[self.cursor..]);
            self.text.push_str(&decoded.text);
            self.cursor += decoded.consumed;
            self.closed = decoded.closed;
        }
        Some(&self.text)
    }
}

/// Parses the first-`{` to last-`}` span of the finished buffer.
pub fn parse_final(buffer: &str) -> Result<ChatReply, FinalParseError> {
    let (Some(start), Some(end)) = (buffer.find('{'), buffer.rfind('}')) else {
        return Err(FinalParseError::NoObject);
    };
    if end < start {
        return Err(FinalParseError::NoObject);
    }
    let wire: WireReply = serde_json::from_str(&buffer[start..=end])?;
    Ok(ChatReply {
        response: wire.response,
        sources: wire.sources.unwrap_or_default(),
    })
}

/// Byte offset just past the opening quote of the `response` value.
fn response_value_start(buffer: &str) -> Option<usize> {
    for (key_at, _) in buffer.match_indices(RESPONSE_KEY) {
        let after_key = key_at + RESPONSE_KEY.len();
        let rest = &buffer[after_key..];
        let trimmed = rest.trim_start();
        let Some(value) = trimmed.strip_prefix(':') else {
            if trimmed.is_empty() {
                return None;
            }
            continue;
        };
        let value_trimmed = value.trim_start();
        if value_trimmed.is_empty() {
            return None;
        }
        if value_trimmed.starts_with('"') {
            return Some(buffer.len() - value_trimmed.len() + 1);
        }
    }
    None
}

struct Decoded {
    text: String,
    /// Bytes of input fully accounted for; anything after is withheld.
    consumed: usize,
    closed: bool,
}

/// Decodes JSON string content up to its closing quote or the end of input.
///
/// A quote only closes the value when `,` or `}` follows it: the upstream
/// does not escape backslashes, so an answer containing `\"` arrives as
/// `\\"`. A quote,
/// escape or surrogate pair cut off by the end of input is withheld so later
/// chunks can only extend the result.
fn decode_string_prefix(raw: &str) -> Decoded {
    let mut out = String::with_capacity(raw.len());
    let mut pos = 0;
    loop {
        let rest = &raw[pos..];
        let Some(idx) = rest.find(['"', '\\']) else {
            out.push_str(rest);
            return Decoded {
                text: out,
                consumed: raw.len(),
                closed: false,
            };
        };
        out.push_str(&rest[..idx]);
        pos += idx;
        if raw.as_bytes()[pos] == b'"' {
            match quote_role(&raw[pos + 1..]) {
                QuoteRole::Text => {
                    out.push('"');
                    pos += 1;
                    continue;
                }
                role => {
                    return Decoded {
                        text: out,
                        consumed: pos,
                        closed: matches!(role, QuoteRole::Closing),
                    };
                }
            }
        }
        match read_escape(&raw[pos..]) {
            Escape::Char(ch, consumed) => {
                out.push(ch);
                pos += consumed;
            }
            Escape::Literal => {
                out.push('\\');
                pos += 1;
            }
            Escape::Incomplete => {
                return Decoded {
                    text: out,
                    consumed: pos,
                    closed: false,
                };
            }
        }
    }
}

enum QuoteRole {
    Closing,
    Text,
    Undecided,
}

fn quote_role(after: &str) -> QuoteRole {
    match after.trim_start().chars().next() {
        None => QuoteRole::Undecided,
        Some(',' | '}') => QuoteRole::Closing,
        Some(_) => QuoteRole::Text,
    }
}

/// Escape decoding without string structure: quotes are plain text.
fn unescape_lenient(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(idx) = rest.find('\\') {
        out.push_str(&rest[..idx]);
        let escape = &rest[idx..];
        match read_escape(escape) {
            Escape::Char(ch, consumed) => {
                out.push(ch);
                rest = &escape[consumed..];
            }
            Escape::Literal | Escape::Incomplete => {
                out.push('\\');
                rest = &escape[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

enum Escape {
    /// Decoded character and the number of bytes it used.
    Char(char, usize),
    /// Not a valid escape; keep the backslash as text.
    Literal,
    /// Input ends inside the escape.
    Incomplete,
}

enum Hex4 {
    Value(u16),
    Short,
    Invalid,
}

fn read_escape(escape: &str) -> Escape {
    let bytes = escape.as_bytes();
    let Some(&kind) = bytes.get(1) else {
        return Escape::Incomplete;
    };
    let simple = match kind {
        b'"' => '"',
        b'\\' => '\\',
        b'/' => '/',
        b'n' => '\n',
        b't' => '\t',
        b'r' => '\r',
        b'b' => '\u{8}',
        b'f' => '\u{c}',
        b'u' => return read_unicode_escape(bytes),
        _ => return Escape::Literal,
    };
    Escape::Char(simple, 2)
}

fn read_unicode_escape(bytes: &[u8]) -> Escape {
    let high = match read_hex4(bytes, 2) {
        Hex4::Value(v) => v,
        Hex4::Short => return Escape::Incomplete,
        Hex4::Invalid => return Escape::Literal,
    };
    if (0xDC00..=0xDFFF).contains(&high) {
        return Escape::Char(char::REPLACEMENT_CHARACTER, 6);
    }
    if !(0xD800..=0xDBFF).contains(&high) {
        let ch = char::from_u32(u32::from(high)).unwrap_or(char::REPLACEMENT_CHARACTER);
        return Escape::Char(ch, 6);
    }

    // High surrogate: the low half must follow as another `\uXXXX`.
    match bytes.get(6..8) {
        None if is_prefix_of_escape_start(&bytes[6..]) => return Escape::Incomplete,
        Some(b"\\u") => {}
        _ => return Escape::Char(char::REPLACEMENT_CHARACTER, 6),
    }
    match read_hex4(bytes, 8) {
        Hex4::Value(low) if (0xDC00..=0xDFFF).contains(&low) => {
            let code = 0x10000 + ((u32::from(high) - 0xD800) << 10) + (u32::from(low) - 0xDC00);
            Escape::Char(
                char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER),
                12,
            )
        }
        Hex4::Short => Escape::Incomplete,
        _ => Escape::Char(char::REPLACEMENT_CHARACTER, 6),
    }
}

fn is_prefix_of_escape_start(tail: &[u8]) -> bool {
    tail.is_empty() || tail == b"\\"
}

fn read_hex4(bytes: &[u8], at: usize) -> Hex4 {
    let tail = bytes.get(at..).unwrap_or(&[]);
    let available = &tail[..tail.len().min(4)];
    if !available.iter().all(u8::is_ascii_hexdigit) {
        return Hex4::Invalid;
    }
    if available.len() < 4 {
        return Hex4::Short;
    }
    let value = available
        .iter()
        .fold(0_u16, |acc, b| (acc << 4) | u16::from(hex_value(*b)));
    Hex4::Value(value)
}

fn hex_value(b: u8) -> u8 {
    match b {
        b'0'..=b'9' => b - b'0',
        b'a'..=b'f' => b - b'a' + 10,
        b'A'..=b'F' => b - b'A' + 10,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partial_text(buffer: &str) -> Option<String> {
        partial_response(buffer).map(|p| p.text)
    }

    #[test]
    fn nothing_is_displayable_before_the_opening_quote() {
        assert_eq!(partial_text(""), None);
        assert_eq!(partial_text("{\"respo"), None);
        assert_eq!(partial_text("{\"response\""), None);
        assert_eq!(partial_text("{\"response\": "), None);
        assert_eq!(partial_text("{\"response\": \""), Some(String::new()));
    }

    #[test]
    fn open_string_extends_to_end_of_buffer() {
        let partial = partial_response("{\"response\": \"Hel").expect("partial");
        assert_eq!(partial.text, "Hel");
        assert!(!partial.closed);
    }

    #[test]
    fn closing_quote_ends_the_value_before_sources_arrive() {
        // A half-arrived sources key must never be shown as answer text.
        assert_eq!(
            partial_text("{\"response\": \"Hello\", \"sour"),
            Some("Hello".into())
        );
        let partial =
            partial_response("{\"response\": \"Hello\", \"sources\": [\"http://a\"]}").expect("p");
        assert_eq!(partial.text, "Hello");
        assert!(partial.closed);
    }

    #[test]
    fn tolerates_whitespace_around_the_colon() {
        assert_eq!(
            partial_text("{\"response\"  :\n\"compact"),
            Some("compact".into())
        );
        assert_eq!(partial_text("{\"response\":\"tight"), Some("tight".into()));
    }

    #[test]
    fn decodes_the_full_escape_grammar() {
        let raw = r#"{"response": "a\nb \"q\" \\ \/ \té😀""#;
        assert_eq!(
            partial_text(raw),
            Some("a\nb \"q\" \\ / \té\u{1F600}".into())
        );
    }

    #[test]
    fn withholds_escapes_cut_by_the_buffer_end() {
        assert_eq!(partial_text(r#"{"response": "line\"#), Some("line".into()));
        assert_eq!(partial_text(r#"{"response": "x\u00"#), Some("x".into()));
        assert_eq!(partial_text(r#"{"response": "x\ud83d"#), Some("x".into()));
        assert_eq!(partial_text(r#"{"response": "x\ud83d\"#), Some("x".into()));
        assert_eq!(partial_text(r#"{"response": "x\ud83d\ude"#), Some("x".into()));
    }

    #[test]
    fn invalid_escapes_are_kept_literally() {
        assert_eq!(partial_text(r#"{"response": "a\qb"#), Some("a\\qb".into()));
        assert_eq!(partial_text(r#"{"response": "\uzz"#), Some("\\uzz".into()));
        assert_eq!(
            partial_text(r#"{"response": "\ud83dx"#),
            Some("\u{fffd}x".into())
        );
    }

    #[test]
    fn quotes_inside_the_value_stay_text_unless_a_delimiter_follows() {
        let body = r#"{"query": "q", "response": "use \\"x\\" then more words", "sources": ["http://a"]}"#;
        let partial = partial_response(body).expect("partial");
        assert_eq!(partial.text, r#"use \"x\" then more words"#);
        assert!(partial.closed);
    }

    #[test]
    fn a_quote_at_the_buffer_end_is_withheld() {
        let partial = partial_response(r#"{"response": "a""#).expect("partial");
        assert_eq!(partial.text, "a");
        assert!(!partial.closed);
        assert_eq!(partial_text(r#"{"response": "a"b"#), Some("a\"b".into()));
        assert!(partial_response(r#"{"response": "a" }"#).expect("p").closed);
    }

    #[test]
    fn marker_cut_runs_to_the_last_sources_marker() {
        let body = r#"{"response": "a "b", c", "sources": ["http://a"]}"#;
        assert_eq!(partial_text(body), Some(r#"a "b"#.into()));
        assert_eq!(marker_cut_response(body), Some(r#"a "b", c"#.into()));
        assert_eq!(
            marker_cut_response(r#"{"response": "tab\there \"q\"", "sources": [] x"#),
            Some("tab\there \"q\"".into())
        );
        assert_eq!(marker_cut_response(r#"{"response": "open \"end"#), None);
        assert_eq!(marker_cut_response(r#"{"respo"#), None);
    }

    #[test]
    fn scanner_agrees_with_a_full_rescan_at_every_prefix() {
        let body = "{\"response\": \"x \\\\\"q\\\\\" \\u00e9\\ud83d\\ude00 \u{2713}\", \"sources\": []}";
        let mut scanner = ResponseScanner::default();
        for (end, _) in body.char_indices().skip(1).chain([(body.len(), ' ')]) {
            let prefix = &body[..end];
            assert_eq!(
                scanner.advance(prefix).map(str::to_string),
                partial_text(prefix),
                "prefix {prefix:?}"
            );
        }
        assert_eq!(
            scanner.advance(body),
            Some("x \\\"q\\\" \u{e9}\u{1F600} \u{2713}")
        );
    }

    #[test]
    fn parse_final_reads_response_and_sources() {
        let reply =
            parse_final("noise {\"response\": \"ok\", \"sources\": [\"http://a\"]} tail").expect("ok");
        assert_eq!(reply.response, "ok");
        assert_eq!(reply.sources, vec!["http://a".to_string()]);
    }

    #[test]
    fn parse_final_accepts_missing_or_null_sources() {
        assert!(parse_final("{\"response\": \"ok\"}").expect("ok").sources.is_empty());
        assert!(
            parse_final("{\"response\": \"ok\", \"sources\": null}")
                .expect("ok")
                .sources
                .is_empty()
        );
    }

    #[test]
    fn parse_final_rejects_unterminated_objects() {
        let err = parse_final("{\"response\": \"ok\", \"sources\": [] malformed").expect_err("bad");
        assert!(matches!(err, FinalParseError::NoObject));
        let err = parse_final("{\"response\": \"ok\" oops}").expect_err("bad");
        assert!(matches!(err, FinalParseError::Json(_)));
    }
}
