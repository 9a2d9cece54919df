//! @ai:module:intent Slice source text into raw comment blocks
//! @ai:module:layer application
//! @ai:module:public_api CommentSyntax, CommentBlock, CommentForm, CommentScanner, ExtractionError, extract_comments
//! @ai:module:depends_on annotation
//! @ai:module:stateless true
//!
//! This stage knows nothing about annotation syntax. It only finds comments,
//! strips their delimiters, and records the code around them.

use crate::annotation::SourcePosition;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// @ai:intent Comment-syntax descriptor for one file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentSyntax {
    /// Line comment markers, longest first (`///` must win over `//`).
    pub line_markers: Vec<String>,
    pub block_start: Option<String>,
    pub block_end: Option<String>,
    /// Continuation prefix of block comment lines, e.g. `*` in Javadoc style.
    pub block_line_prefix: Option<String>,
    /// Quotes of escape-aware string literals that end with their line.
    #[serde(default)]
    pub string_quotes: Vec<char>,
    /// Quotes of raw string literals: no escapes, may span lines (Go and JS backticks).
    #[serde(default)]
    pub raw_string_quotes: Vec<char>,
    /// `'x'` is a character literal rather than a string opener.
    #[serde(default)]
    pub char_literals: bool,
}

impl CommentSyntax {
    /// @ai:intent Create a descriptor, ordering line markers longest first
    /// @ai:effects pure
    pub fn new(line_markers: &[&str], block: Option<(&str, &str)>) -> Self {
        let mut markers: Vec<String> = line_markers.iter().map(|m| m.to_string()).collect();
        markers.sort_by(|a, b| b.len().cmp(&a.len()));

        Self {
            line_markers: markers,
            block_start: block.map(|(start, _)| start.to_string()),
            block_end: block.map(|(_, end)| end.to_string()),
            block_line_prefix: None,
            string_quotes: vec!['"'],
            raw_string_quotes: Vec::new(),
            char_literals: false,
        }
    }

    pub fn with_block_line_prefix(mut self, prefix: &str) -> Self {
        self.block_line_prefix = Some(prefix.to_string());
        self
    }

    pub fn with_string_quotes(mut self, quotes: &[char]) -> Self {
        self.string_quotes = quotes.to_vec();
        self
    }

    pub fn with_raw_string_quotes(mut self, quotes: &[char]) -> Self {
        self.raw_string_quotes = quotes.to_vec();
        self
    }

    pub fn with_char_literals(mut self) -> Self {
        self.char_literals = true;
        self
    }

    fn block(&self) -> Option<(&str, &str)> {
        match (self.block_start.as_deref(), self.block_end.as_deref()) {
            (Some(start), Some(end)) if !start.is_empty() && !end.is_empty() => Some((start, end)),
            _ => None,
        }
    }
}

/// @ai:intent Distinguishes `// ...` comments from `/* ... */` comments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentForm {
    Line,
    Block,
}

/// @ai:intent One raw comment with its delimiters stripped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentBlock {
    /// Comment text without delimiters; lines of block comments are joined with `\n`.
    pub text: String,
    /// Position of the opening delimiter.
    pub position: SourcePosition,
    pub form: CommentForm,
    /// True when code precedes the comment on its starting line.
    pub attached: bool,
    /// The code the comment trails, when `attached`.
    pub code: Option<String>,
    /// Nearest non-blank code line before the comment.
    pub preceding_code: Option<String>,
    /// Nearest code after the comment, skipping blank lines and other comments.
    pub following_code: Option<String>,
}

/// @ai:intent Fatal extraction failure confined to one file
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractionError {
    #[error("unterminated block comment starting at {position}")]
    UnterminatedComment { position: SourcePosition },
}

impl ExtractionError {
    pub fn position(&self) -> &SourcePosition {
        match self {
            ExtractionError::UnterminatedComment { position } => position,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum CommentStart<'s> {
    Line { marker: &'s str },
    Block { open: &'s str, close: &'s str },
}

type Found<'s> = Option<(usize, CommentStart<'s>)>;

#[derive(Debug, Clone, Copy)]
enum Quote {
    Plain(char),
    Raw(char),
}

/// @ai:intent Lazy, restartable iterator over the comments of one file
///
/// After an `ExtractionError` the iterator is exhausted.
#[derive(Debug, Clone)]
pub struct CommentScanner<'a> {
    file: &'a Path,
    lines: Vec<&'a str>,
    syntax: &'a CommentSyntax,
    line: usize,
    offset: usize,
    line_code: String,
    preceding_code: Option<String>,
    /// Raw string still open at the end of the previous line.
    open_raw: Option<char>,
    failed: bool,
}

/// @ai:intent Start scanning `text` for comments
/// @ai:effects pure
pub fn extract_comments<'a>(
    file: &'a Path,
    text: &'a str,
    syntax: &'a CommentSyntax,
) -> CommentScanner<'a> {
    CommentScanner {
        file,
        lines: text.lines().collect(),
        syntax,
        line: 0,
        offset: 0,
        line_code: String::new(),
        preceding_code: None,
        open_raw: None,
        failed: false,
    }
}

impl<'a> CommentScanner<'a> {
    /// @ai:intent Fresh scanner over the same text, positioned at the start
    pub fn restart(&self) -> CommentScanner<'a> {
        CommentScanner {
            file: self.file,
            lines: self.lines.clone(),
            syntax: self.syntax,
            line: 0,
            offset: 0,
            line_code: String::new(),
            preceding_code: None,
            open_raw: None,
            failed: false,
        }
    }

    fn position_at(&self, line: usize, byte_offset: usize) -> SourcePosition {
        let column = self.lines[line][..byte_offset].chars().count() + 1;
        SourcePosition::new(self.file, line + 1, column)
    }

    fn finish_line(&mut self) {
        let code = self.line_code.trim();
        if !code.is_empty() {
            self.preceding_code = Some(code.to_string());
        }
        self.line_code.clear();
        self.line += 1;
        self.offset = 0;
    }

    fn trailing_code(&self) -> Option<String> {
        let code = self.line_code.trim();
        (!code.is_empty()).then(|| code.to_string())
    }

    fn take_line_comment(&mut self, start: usize, marker: &str) -> CommentBlock {
        let line = self.lines[self.line];
        let code = self.trailing_code();
        let block = CommentBlock {
            text: line[start + marker.len()..].to_string(),
            position: self.position_at(self.line, start),
            form: CommentForm::Line,
            attached: code.is_some(),
            code,
            preceding_code: self.preceding_code.clone(),
            following_code: self.following_code(self.line + 1, 0),
        };
        self.finish_line();
        block
    }

    fn take_block_comment(
        &mut self,
        start: usize,
        open: &str,
        close: &str,
    ) -> Result<CommentBlock, ExtractionError> {
        let position = self.position_at(self.line, start);
        let code = self.trailing_code();

        let mut pieces: Vec<&'a str> = Vec::new();
        let mut cursor = self.line;
        let mut from = start + open.len();

        let end = loop {
            let line: &'a str = self.lines[cursor];
            let segment = &line[from..];
            if let Some(found) = segment.find(close) {
                pieces.push(&segment[..found]);
                break from + found + close.len();
            }

            pieces.push(segment);
            cursor += 1;
            from = 0;

            if cursor >= self.lines.len() {
                self.failed = true;
                return Err(ExtractionError::UnterminatedComment { position });
            }
        };

        let following_code = {
            let rest = &self.lines[cursor][end..];
            let rest_code = match find_comment_start(rest, self.syntax, None).0 {
                Some((at, _)) => rest[..at].trim(),
                None => rest.trim(),
            };
            if rest_code.is_empty() {
                self.following_code(cursor + 1, 0)
            } else {
                Some(rest_code.to_string())
            }
        };

        let block = CommentBlock {
            text: join_block_lines(&pieces, self.syntax.block_line_prefix.as_deref()),
            position,
            form: CommentForm::Block,
            attached: code.is_some(),
            code,
            preceding_code: self.preceding_code.clone(),
            following_code,
        };

        if cursor != self.line {
            // The opening line is done; its code (if any) precedes what follows.
            if let Some(code) = &block.code {
                self.preceding_code = Some(code.clone());
            }
            self.line_code.clear();
            self.line = cursor;
        }
        self.offset = end;

        Ok(block)
    }

    /// @ai:intent Find the next code after (line, offset), skipping blanks and comments
    /// @ai:effects pure
    fn following_code(&self, mut line: usize, mut offset: usize) -> Option<String> {
        while line < self.lines.len() {
            let text = &self.lines[line][offset..];

            match find_comment_start(text, self.syntax, None).0 {
                Some((at, start)) if text[..at].trim().is_empty() => match start {
                    CommentStart::Line { .. } => {
                        line += 1;
                        offset = 0;
                    }
                    CommentStart::Block { open, close } => {
                        let mut from = offset + at + open.len();
                        loop {
                            if line >= self.lines.len() {
                                return None;
                            }
                            if let Some(found) = self.lines[line][from..].find(close) {
                                offset = from + found + close.len();
                                break;
                            }
                            line += 1;
                            from = 0;
                        }
                    }
                },
                Some((at, _)) => return Some(text[..at].trim().to_string()),
                None if text.trim().is_empty() => {
                    line += 1;
                    offset = 0;
                }
                None => return Some(text.trim().to_string()),
            }
        }

        None
    }
}

impl Iterator for CommentScanner<'_> {
    type Item = Result<CommentBlock, ExtractionError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        while self.line < self.lines.len() {
            let line = self.lines[self.line];
            let rest = &line[self.offset..];

            let (found, open_raw) = find_comment_start(rest, self.syntax, self.open_raw);
            self.open_raw = open_raw;

            match found {
                None => {
                    self.line_code.push_str(rest);
                    self.finish_line();
                }
                Some((at, CommentStart::Line { marker })) => {
                    let start = self.offset + at;
                    self.line_code.push_str(&line[self.offset..start]);
                    return Some(Ok(self.take_line_comment(start, marker)));
                }
                Some((at, CommentStart::Block { open, close })) => {
                    let start = self.offset + at;
                    self.line_code.push_str(&line[self.offset..start]);
                    return Some(self.take_block_comment(start, open, close));
                }
            }
        }

        None
    }
}

/// @ai:intent Locate the first comment delimiter outside string and char literals
/// @ai:effects pure
///
/// `open_raw` is a raw string carried over from the previous line. The second
/// value is the raw string still open at the end of `text`, if any.
fn find_comment_start<'s>(
    text: &str,
    syntax: &'s CommentSyntax,
    open_raw: Option<char>,
) -> (Found<'s>, Option<char>) {
    let block = syntax.block();
    let mut quote = open_raw.map(Quote::Raw);
    let mut escaped = false;
    let mut skip_to = 0;

    for (idx, ch) in text.char_indices() {
        if idx < skip_to {
            continue;
        }

        match quote {
            Some(Quote::Raw(close)) => {
                if ch == close {
                    quote = None;
                }
                continue;
            }
            Some(Quote::Plain(close)) => {
                if escaped {
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == close {
                    quote = None;
                }
                continue;
            }
            None => {}
        }

        let tail = &text[idx..];

        if let Some((open, close)) = block {
            if tail.starts_with(open) {
                return (Some((idx, CommentStart::Block { open, close })), None);
            }
        }

        if let Some(marker) = syntax
            .line_markers
            .iter()
            .find(|m| !m.is_empty() && tail.starts_with(m.as_str()))
        {
            return (Some((idx, CommentStart::Line { marker: marker.as_str() })), None);
        }

        if syntax.string_quotes.contains(&ch) {
            quote = Some(Quote::Plain(ch));
        } else if syntax.raw_string_quotes.contains(&ch) {
            quote = Some(Quote::Raw(ch));
        } else if ch == '\'' && syntax.char_literals {
            if let Some(len) = char_literal_len(tail) {
                skip_to = idx + len;
            }
        }
    }

    match quote {
        Some(Quote::Raw(close)) => (None, Some(close)),
        _ => (None, None),
    }
}

/// @ai:intent Byte length of a char literal at the start of `tail`, None for lifetimes and labels
/// @ai:effects pure
fn char_literal_len(tail: &str) -> Option<usize> {
    let mut chars = tail.char_indices().skip(1);
    let (_, first) = chars.next()?;

    match first {
        '\'' => None,
        '\\' => {
            // '\n', '\'', '\x7f', '\u{1F600}'
            chars.next()?;
            chars
                .take(10)
                .find(|&(_, c)| c == '\'')
                .map(|(at, _)| at + 1)
        }
        _ => match chars.next()? {
            (at, '\'') => Some(at + 1),
            _ => None,
        },
    }
}

/// @ai:intent Join block comment lines, stripping the continuation prefix of Javadoc-style comments
/// @ai:effects pure
///
/// A comment is Javadoc-style when its first line starts with the prefix (`/**`).
/// Continuation lines lose the prefix only if every non-blank one carries it, so
/// `* item` bullets in a plain `/*` comment survive.
fn join_block_lines(pieces: &[&str], prefix: Option<&str>) -> String {
    let javadoc = prefix.filter(|p| pieces.first().is_some_and(|first| first.starts_with(p)));
    let strip_continuation = javadoc.filter(|p| {
        pieces
            .iter()
            .skip(1)
            .filter(|l| !l.trim().is_empty())
            .all(|l| l.trim_start().starts_with(p))
    });

    pieces
        .iter()
        .enumerate()
        .map(|(idx, &piece)| match (idx, javadoc, strip_continuation) {
            (0, Some(p), _) => piece.strip_prefix(p).unwrap_or(piece),
            (0, None, _) => piece,
            (_, _, Some(p)) => {
                let trimmed = piece.trim_start();
                trimmed.strip_prefix(p).unwrap_or(trimmed)
            }
            _ => piece,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn go() -> CommentSyntax {
        CommentSyntax::new(&["//"], Some(("/*", "*/")))
    }

    fn scan(text: &str, syntax: &CommentSyntax) -> Vec<CommentBlock> {
        extract_comments(Path::new("test.go"), text, syntax)
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_own_line_comment_sees_following_declaration() {
        let syntax = go();
        let blocks = scan(
            "package main\n\n//@[Domain/Accumulator] Collects stuff\ntype Accumulator struct {\n}",
            &syntax,
        );

        assert_eq!(blocks.len(), 1);
        let block = &blocks[0];
        assert_eq!(block.text, "@[Domain/Accumulator] Collects stuff");
        assert_eq!(block.position, SourcePosition::new("test.go", 3, 1));
        assert_eq!(block.form, CommentForm::Line);
        assert!(!block.attached);
        assert_eq!(block.preceding_code.as_deref(), Some("package main"));
        assert_eq!(block.following_code.as_deref(), Some("type Accumulator struct {"));
    }

    #[test]
    fn test_trailing_comment_is_attached() {
        let syntax = go();
        let blocks = scan(
            "    acc := Accumulator{ID: \"abc\", Value: 0} //@[Domain/Accumulator/Invariants]\n    _ = acc.Collect(5)",
            &syntax,
        );

        assert_eq!(blocks.len(), 1);
        let block = &blocks[0];
        assert!(block.attached);
        assert_eq!(
            block.code.as_deref(),
            Some("acc := Accumulator{ID: \"abc\", Value: 0}")
        );
        assert_eq!(block.position.column, 45);
        assert_eq!(block.following_code.as_deref(), Some("_ = acc.Collect(5)"));
    }

    #[test]
    fn test_block_comment_spans_lines() {
        let syntax = go();
        let text = "func (a *Accumulator) Collect(x int32) error {\n    /*@[Domain/Accumulator/Invariants]{alias:Domain rules}\n    The accumulated value is always increasing.\n    */\n    // Normal comment\n    if x <= 0 {";
        let blocks = scan(text, &syntax);

        assert_eq!(blocks.len(), 2);
        let block = &blocks[0];
        assert_eq!(block.form, CommentForm::Block);
        assert_eq!(block.position.line, 2);
        assert_eq!(block.position.column, 5);
        assert_eq!(
            block.text,
            "@[Domain/Accumulator/Invariants]{alias:Domain rules}\n    The accumulated value is always increasing.\n    "
        );
        assert_eq!(
            block.preceding_code.as_deref(),
            Some("func (a *Accumulator) Collect(x int32) error {")
        );
        assert_eq!(block.following_code.as_deref(), Some("if x <= 0 {"));

        assert_eq!(blocks[1].text, " Normal comment");
        assert_eq!(blocks[1].position.line, 5);
    }

    #[test]
    fn test_markers_inside_strings_are_ignored() {
        let syntax = go();
        let blocks = scan(
            "_ = \"This is /* not a comment */\"\n_ = \"escaped \\\" // still string\" // real",
            &syntax,
        );

        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].text, " real");
        assert_eq!(blocks[0].position.line, 2);
    }

    #[test]
    fn test_single_line_block_then_code() {
        let syntax = go();
        let blocks = scan("x := 1 /*@[A]*/ + 2 // tail", &syntax);

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].text, "@[A]");
        assert_eq!(blocks[0].code.as_deref(), Some("x := 1"));
        assert_eq!(blocks[0].following_code.as_deref(), Some("+ 2"));
        assert_eq!(blocks[1].code.as_deref(), Some("x := 1  + 2"));
    }

    #[test]
    fn test_unterminated_block_is_fatal() {
        let syntax = go();
        let mut scanner =
            extract_comments(Path::new("bad.go"), "// ok\n/* never closed\nstill open", &syntax);

        assert!(scanner.next().unwrap().is_ok());
        let err = scanner.next().unwrap().unwrap_err();
        assert_eq!(err.position(), &SourcePosition::new("bad.go", 2, 1));
        assert!(scanner.next().is_none());
    }

    #[test]
    fn test_scanner_is_restartable() {
        let syntax = go();
        let text = "// one\ncode()\n// two";
        let mut scanner = extract_comments(Path::new("f.go"), text, &syntax);
        let first = scanner.next().unwrap().unwrap();

        let again: Vec<_> = scanner.restart().collect::<Result<_, _>>().unwrap();
        assert_eq!(again.len(), 2);
        assert_eq!(again[0], first);
    }

    #[test]
    fn test_following_code_skips_comments() {
        let syntax = go();
        let blocks = scan("//@[A] Title\n// plain\n/* more\n */\n\nfunc Run() {}", &syntax);

        assert_eq!(blocks[0].following_code.as_deref(), Some("func Run() {}"));
    }

    #[test]
    fn test_longest_line_marker_wins() {
        let syntax = CommentSyntax::new(&["//", "///"], Some(("/*", "*/")));
        let blocks = scan("/// @[Doc] Title\nfn doc() {}", &syntax);

        assert_eq!(blocks[0].text, " @[Doc] Title");
    }

    #[test]
    fn test_javadoc_prefix_is_stripped() {
        let syntax = go().with_block_line_prefix("*");
        let blocks = scan("/**@[Api]\n * First line\n * Second line\n */\nclass Api {}", &syntax);

        assert_eq!(blocks[0].text, "@[Api]\n First line\n Second line\n");
        assert_eq!(blocks[0].following_code.as_deref(), Some("class Api {}"));
    }

    #[test]
    fn test_plain_block_keeps_star_bullets() {
        let syntax = go().with_block_line_prefix("*");
        let blocks = scan("/* @[A]\n    * first item\n    * second item\n    */", &syntax);

        assert_eq!(
            blocks[0].text,
            " @[A]\n    * first item\n    * second item\n    "
        );
    }

    #[test]
    fn test_go_raw_string_hides_comment_markers() {
        let syntax = go().with_raw_string_quotes(&['`']).with_char_literals();
        let blocks = scan(
            "var s = `/* not a comment`\n//@[A] Title\nfunc X() {}",
            &syntax,
        );

        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].text, "@[A] Title");
        assert_eq!(blocks[0].position.line, 2);
        assert_eq!(blocks[0].following_code.as_deref(), Some("func X() {}"));
    }

    #[test]
    fn test_raw_string_spans_lines() {
        let syntax = go().with_raw_string_quotes(&['`']);
        let blocks = scan("var s = `one\n// inside\n/* inside`\n// real", &syntax);

        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].text, " real");
        assert_eq!(blocks[0].position.line, 4);
    }

    #[test]
    fn test_char_literal_quote_is_not_a_string() {
        let syntax = CommentSyntax::new(&["//"], Some(("/*", "*/"))).with_char_literals();
        let blocks = scan("let q = '\"'; //@[Domain/Quote]\nfn run<'a>(s: &'a str) {} // tail", &syntax);

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].text, "@[Domain/Quote]");
        assert_eq!(blocks[0].code.as_deref(), Some("let q = '\"';"));
        assert_eq!(blocks[1].text, " tail");
    }

    #[test]
    fn test_escaped_char_literals() {
        assert_eq!(char_literal_len("'\\''; rest"), Some(4));
        assert_eq!(char_literal_len("'\\u{1F600}' x"), Some(11));
        assert_eq!(char_literal_len("'a> x"), None);
        assert_eq!(char_literal_len("'é' x"), Some(4));
    }
}
