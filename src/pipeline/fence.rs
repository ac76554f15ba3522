//! Fenced-block tokenizer.
//!
//! Splits a Markdown document into prose runs, ordinary fenced code blocks
//! and Mermaid diagram blocks. Every token that is not a diagram is a slice
//! of the input, so concatenating the tokens' raw text reproduces the
//! document byte-for-byte (line endings and indentation included).
//!
//! Fence rules follow CommonMark closely enough for real documents:
//!
//! * an opening fence is three or more backticks or tildes, indented by at
//!   most three spaces, followed by an optional info string (backtick fences
//!   may not have a backtick in the info string);
//! * a closing fence uses the same character, is at least as long as the
//!   opening fence and has nothing but whitespace after it;
//! * blocks never nest, so a `` ```mermaid `` line inside a `` ```` `` block
//!   is plain content.
//!
//! A block is a diagram when its info string is exactly `mermaid`, optionally
//! followed by whitespace and further words.

use std::fmt;

/// What kind of fenced block a token came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Diagram,
    Code,
}

/// The delimiter that opened a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FenceMarker {
    pub ch: char,
    pub len: usize,
    /// Leading spaces before the opening fence (0–3).
    pub indent: usize,
}

impl fmt::Display for FenceMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for _ in 0..self.len {
            write!(f, "{}", self.ch)?;
        }
        Ok(())
    }
}

/// One piece of a scanned document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    /// Lines outside any fenced block.
    Text(&'a str),
    /// A non-diagram fenced block, fences included. `closed` is false when the
    /// block ran to end of input.
    Code {
        raw: &'a str,
        line: usize,
        closed: bool,
    },
    /// A complete Mermaid block.
    Diagram {
        raw: &'a str,
        /// 1-based line of the opening fence.
        line: usize,
        /// Inner text with line endings normalised to `\n` and the fence's
        /// indentation removed.
        source: String,
    },
}

impl<'a> Token<'a> {
    /// The exact input text this token covers.
    pub fn raw(&self) -> &'a str {
        match self {
            Token::Text(s) => s,
            Token::Code { raw, .. } | Token::Diagram { raw, .. } => raw,
        }
    }
}

/// A block still open at end of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unclosed {
    pub kind: BlockKind,
    pub line: usize,
    pub marker: FenceMarker,
}

/// Result of [`scan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scan<'a> {
    pub tokens: Vec<Token<'a>>,
    /// Set when the document ends inside a fenced block. An unclosed diagram
    /// is reported here and its text is kept as an unclosed `Code` token.
    pub unclosed: Option<Unclosed>,
}

impl Scan<'_> {
    pub fn diagram_count(&self) -> usize {
        self.tokens
            .iter()
            .filter(|t| matches!(t, Token::Diagram { .. }))
            .count()
    }

    /// Prose runs, in order.
    pub fn prose(&self) -> impl Iterator<Item = &str> + '_ {
        self.tokens.iter().filter_map(|t| match t {
            Token::Text(s) => Some(*s),
            _ => None,
        })
    }
}

enum State {
    Text {
        start: usize,
    },
    InCode {
        marker: FenceMarker,
        start: usize,
        line: usize,
    },
    InDiagram {
        marker: FenceMarker,
        start: usize,
        line: usize,
        body: String,
    },
}

/// Tokenize `text`. Never fails; see [`Scan::unclosed`].
pub fn scan(text: &str) -> Scan<'_> {
    let mut tokens = Vec::new();
    let mut state = State::Text { start: 0 };
    let mut offset = 0;

    for (idx, raw_line) in text.split_inclusive('\n').enumerate() {
        let line_no = idx + 1;
        let line_start = offset;
        offset += raw_line.len();
        let content = raw_line.trim_end_matches(['\n', '\r']);

        state = match state {
            State::Text { start } => match detect_opening(content) {
                Some((marker, info)) => {
                    if start < line_start {
                        tokens.push(Token::Text(&text[start..line_start]));
                    }
                    if is_diagram_info(info) {
                        State::InDiagram {
                            marker,
                            start: line_start,
                            line: line_no,
                            body: String::new(),
                        }
                    } else {
                        State::InCode {
                            marker,
                            start: line_start,
                            line: line_no,
                        }
                    }
                }
                None => State::Text { start },
            },
            State::InCode {
                marker,
                start,
                line,
            } => {
                if is_closing(content, marker) {
                    tokens.push(Token::Code {
                        raw: &text[start..offset],
                        line,
                        closed: true,
                    });
                    State::Text { start: offset }
                } else {
                    State::InCode {
                        marker,
                        start,
                        line,
                    }
                }
            }
            State::InDiagram {
                marker,
                start,
                line,
                mut body,
            } => {
                if is_closing(content, marker) {
                    tokens.push(Token::Diagram {
                        raw: &text[start..offset],
                        line,
                        source: body,
                    });
                    State::Text { start: offset }
                } else {
                    body.push_str(strip_indent(content, marker.indent));
                    body.push('\n');
                    State::InDiagram {
                        marker,
                        start,
                        line,
                        body,
                    }
                }
            }
        };
    }

    let unclosed = match state {
        State::Text { start } => {
            if start < text.len() {
                tokens.push(Token::Text(&text[start..]));
            }
            None
        }
        State::InCode {
            marker,
            start,
            line,
        } => {
            tokens.push(Token::Code {
                raw: &text[start..],
                line,
                closed: false,
            });
            Some(Unclosed {
                kind: BlockKind::Code,
                line,
                marker,
            })
        }
        State::InDiagram {
            marker,
            start,
            line,
            ..
        } => {
            tokens.push(Token::Code {
                raw: &text[start..],
                line,
                closed: false,
            });
            Some(Unclosed {
                kind: BlockKind::Diagram,
                line,
                marker,
            })
        }
    };

    Scan { tokens, unclosed }
}

/// Apply `f` to every prose run and reassemble the document. Fenced blocks
/// (including diagrams) are copied through untouched.
pub fn rewrite_prose(text: &str, mut f: impl FnMut(&str) -> String) -> String {
    let scanned = scan(text);
    let mut out = String::with_capacity(text.len());
    for token in &scanned.tokens {
        match token {
            Token::Text(s) => out.push_str(&f(s)),
            other => out.push_str(other.raw()),
        }
    }
    out
}

/// Parse an opening fence line (without its line ending).
fn detect_opening(content: &str) -> Option<(FenceMarker, &str)> {
    let indent = leading_spaces(content);
    if indent > 3 {
        return None;
    }
    let rest = &content[indent..];
    let ch = rest.chars().next()?;
    if ch != '`' && ch != '~' {
        return None;
    }
    let len = rest.chars().take_while(|&c| c == ch).count();
    if len < 3 {
        return None;
    }
    let info = &rest[len..];
    if ch == '`' && info.contains('`') {
        return None;
    }
    Some((FenceMarker { ch, len, indent }, info))
}

fn is_diagram_info(info: &str) -> bool {
    info.strip_prefix("mermaid")
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
}

fn is_closing(content: &str, marker: FenceMarker) -> bool {
    let indent = leading_spaces(content);
    if indent > 3 {
        return false;
    }
    let rest = &content[indent..];
    let count = rest.chars().take_while(|&c| c == marker.ch).count();
    if count < marker.len {
        return false;
    }
    rest[count..].chars().all(char::is_whitespace)
}

fn leading_spaces(s: &str) -> usize {
    s.len() - s.trim_start_matches(' ').len()
}

fn strip_indent(line: &str, indent: usize) -> &str {
    let n = leading_spaces(line).min(indent);
    &line[n..]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reassemble(scan: &Scan<'_>) -> String {
        scan.tokens.iter().map(|t| t.raw()).collect()
    }

    #[test]
    fn plain_text_is_single_token() {
        let doc = "# Title\n\nSome text.\n";
        let s = scan(doc);
        assert_eq!(s.tokens, vec![Token::Text(doc)]);
        assert!(s.unclosed.is_none());
        assert_eq!(s.diagram_count(), 0);
    }

    #[test]
    fn empty_input() {
        let s = scan("");
        assert!(s.tokens.is_empty());
        assert!(s.unclosed.is_none());
    }

    #[test]
    fn diagram_block_is_recognised() {
        let doc = "intro\n```mermaid\ngraph TD;\n  A-->B\n```\noutro\n";
        let s = scan(doc);
        assert_eq!(s.tokens.len(), 3);
        assert_eq!(s.tokens[0], Token::Text("intro\n"));
        match &s.tokens[1] {
            Token::Diagram { raw, line, source } => {
                assert_eq!(*line, 2);
                assert_eq!(source, "graph TD;\n  A-->B\n");
                assert_eq!(*raw, "```mermaid\ngraph TD;\n  A-->B\n```\n");
            }
            other => panic!("expected diagram, got {other:?}"),
        }
        assert_eq!(s.tokens[2], Token::Text("outro\n"));
        assert_eq!(reassemble(&s), doc);
    }

    #[test]
    fn other_languages_are_code() {
        let doc = "```rust\nfn main() {}\n```\n~~~\nplain\n~~~\n";
        let s = scan(doc);
        assert_eq!(s.diagram_count(), 0);
        assert!(matches!(s.tokens[0], Token::Code { line: 1, closed: true, .. }));
        assert!(matches!(s.tokens[1], Token::Code { line: 4, closed: true, .. }));
        assert_eq!(reassemble(&s), doc);
    }

    #[test]
    fn mermaid_inside_longer_fence_is_content() {
        let doc = "````markdown\n```mermaid\ngraph TD;\n```\n````\n";
        let s = scan(doc);
        assert_eq!(s.diagram_count(), 0);
        assert_eq!(s.tokens.len(), 1);
        assert!(matches!(s.tokens[0], Token::Code { closed: true, .. }));
        assert!(s.unclosed.is_none());
    }

    #[test]
    fn mermaid_inside_tilde_fence_is_content() {
        let doc = "~~~\n```mermaid\nA\n```\n~~~\n";
        let s = scan(doc);
        assert_eq!(s.diagram_count(), 0);
        assert!(s.unclosed.is_none());
    }

    #[test]
    fn tilde_diagram_fence() {
        let doc = "~~~~mermaid\nA-->B\n~~~\n~~~~\n";
        let s = scan(doc);
        match &s.tokens[0] {
            Token::Diagram { source, .. } => assert_eq!(source, "A-->B\n~~~\n"),
            other => panic!("expected diagram, got {other:?}"),
        }
    }

    #[test]
    fn mismatched_char_does_not_close() {
        let doc = "```mermaid\nA\n~~~\n```\n";
        let s = scan(doc);
        match &s.tokens[0] {
            Token::Diagram { source, .. } => assert_eq!(source, "A\n~~~\n"),
            other => panic!("expected diagram, got {other:?}"),
        }
    }

    #[test]
    fn closing_fence_allows_trailing_whitespace_only() {
        let doc = "```mermaid\nA\n``` not closed\n```   \n";
        let s = scan(doc);
        match &s.tokens[0] {
            Token::Diagram { source, .. } => assert_eq!(source, "A\n``` not closed\n"),
            other => panic!("expected diagram, got {other:?}"),
        }
    }

    #[test]
    fn tag_must_follow_fence_immediately() {
        assert!(is_diagram_info("mermaid"));
        assert!(is_diagram_info("mermaid   "));
        assert!(is_diagram_info("mermaid {theme=dark}"));
        assert!(!is_diagram_info(" mermaid"));
        assert!(!is_diagram_info("mermaidjs"));
        assert!(!is_diagram_info("Mermaid"));
        assert!(!is_diagram_info(""));
    }

    #[test]
    fn indentation_limits() {
        let s = scan("   ```mermaid\n   A-->B\n   ```\n");
        match &s.tokens[0] {
            Token::Diagram { source, .. } => assert_eq!(source, "A-->B\n"),
            other => panic!("expected diagram, got {other:?}"),
        }

        let doc = "    ```mermaid\n    A\n    ```\n";
        let s = scan(doc);
        assert_eq!(s.tokens, vec![Token::Text(doc)]);
    }

    #[test]
    fn backtick_info_with_backtick_is_not_fence() {
        let doc = "```inline ``code`` here\ntext\n";
        let s = scan(doc);
        assert_eq!(s.tokens, vec![Token::Text(doc)]);
    }

    #[test]
    fn crlf_preserved_in_raw_and_normalised_in_source() {
        let doc = "a\r\n```mermaid\r\ngraph TD;\r\n```\r\nb\r\n";
        let s = scan(doc);
        assert_eq!(reassemble(&s), doc);
        match &s.tokens[1] {
            Token::Diagram { source, .. } => assert_eq!(source, "graph TD;\n"),
            other => panic!("expected diagram, got {other:?}"),
        }
    }

    #[test]
    fn last_line_without_newline() {
        let doc = "```mermaid\nA\n```";
        let s = scan(doc);
        assert_eq!(s.diagram_count(), 1);
        assert_eq!(reassemble(&s), doc);
    }

    #[test]
    fn unclosed_diagram_reported_with_line() {
        let doc = "one\ntwo\n```mermaid\nA-->B\n";
        let s = scan(doc);
        let u = s.unclosed.clone().unwrap();
        assert_eq!(u.kind, BlockKind::Diagram);
        assert_eq!(u.line, 3);
        assert_eq!(u.marker.to_string(), "```");
        assert_eq!(s.diagram_count(), 0);
        assert_eq!(reassemble(&s), doc);
    }

    #[test]
    fn unclosed_code_block_is_kept() {
        let doc = "text\n~~~~python\nprint(1)\n";
        let s = scan(doc);
        let u = s.unclosed.clone().unwrap();
        assert_eq!(u.kind, BlockKind::Code);
        assert_eq!(u.marker.to_string(), "~~~~");
        assert!(matches!(s.tokens[1], Token::Code { closed: false, line: 2, .. }));
        assert_eq!(reassemble(&s), doc);
    }

    #[test]
    fn two_diagrams_in_order() {
        let doc = "```mermaid\nA\n```\nmid\n```mermaid\nB\n```\n";
        let s = scan(doc);
        let lines: Vec<usize> = s
            .tokens
            .iter()
            .filter_map(|t| match t {
                Token::Diagram { line, .. } => Some(*line),
                _ => None,
            })
            .collect();
        assert_eq!(lines, vec![1, 5]);
    }

    #[test]
    fn rewrite_prose_skips_fences() {
        let doc = "a b\n```\na b\n```\na b\n";
        let out = rewrite_prose(doc, |s| s.replace('a', "X"));
        assert_eq!(out, "X b\n```\na b\n```\nX b\n");
    }

    #[test]
    fn prose_iterator() {
        let doc = "p1\n```\ncode\n```\np2\n";
        let s = scan(doc);
        assert_eq!(s.prose().collect::<Vec<_>>(), vec!["p1\n", "p2\n"]);
    }
}
