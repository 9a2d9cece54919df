//! @ai:module:intent Turn raw comment blocks into structured annotations
//! @ai:module:layer application
//! @ai:module:public_api parse_block, extract_source, ParseOutcome, MalformedAnnotation, SymbolHeuristic, FileAnnotations
//! @ai:module:depends_on annotation, parser
//! @ai:module:stateless true

use crate::annotation::{Annotation, AnnotationPath, Payload, SourcePosition};
use crate::parser::{extract_comments, CommentBlock, CommentSyntax, ExtractionError};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

const MARKER_OPEN: &str = "@[";
const MARKER_CLOSE: char = ']';
const ALIAS_KEY: &str = "alias";
const TITLE_KEY: &str = "title";
const DO_NOT_COLLECT: &str = "do-not-collect";

/// @ai:intent Recognizes declarations and the symbol they declare
///
/// Only used to tell declarations from statements and to enrich Declaration
/// annotations; a missing symbol name is never an error.
pub trait SymbolHeuristic {
    /// @ai:intent Check whether a code line declares something
    fn is_declaration(&self, code: &str) -> bool;

    /// @ai:intent Name of the declared symbol, if it can be recovered
    fn symbol_name(&self, code: &str) -> Option<String>;
}

/// @ai:intent A comment that looked like an annotation but breaks the grammar
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{position}: {reason}")]
pub struct MalformedAnnotation {
    pub position: SourcePosition,
    pub reason: String,
}

/// @ai:intent Result of parsing one comment block
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    Annotation(Annotation),
    NotAnAnnotation,
    Malformed(MalformedAnnotation),
}

/// @ai:intent Annotations and parse errors collected from one file
#[derive(Debug, Clone, Default, Serialize)]
pub struct FileAnnotations {
    pub path: PathBuf,
    pub annotations: Vec<Annotation>,
    pub malformed: Vec<MalformedAnnotation>,
    /// Set when the file could not be sliced into comments; `annotations` is then empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction_error: Option<ExtractionError>,
}

/// @ai:intent Extract every annotation from one file's text
/// @ai:post an extraction error discards the whole file's annotations
/// @ai:effects pure
pub fn extract_source(
    path: &Path,
    text: &str,
    syntax: &CommentSyntax,
    symbols: &dyn SymbolHeuristic,
) -> FileAnnotations {
    let mut result = FileAnnotations {
        path: path.to_path_buf(),
        ..Default::default()
    };

    for block in extract_comments(path, text, syntax) {
        let block = match block {
            Ok(block) => block,
            Err(err) => {
                result.annotations.clear();
                result.malformed.clear();
                result.extraction_error = Some(err);
                return result;
            }
        };

        match parse_block(&block, symbols) {
            ParseOutcome::Annotation(annotation) => result.annotations.push(annotation),
            ParseOutcome::Malformed(err) => result.malformed.push(err),
            ParseOutcome::NotAnAnnotation => {}
        }
    }

    result
}

/// @ai:intent Parse a single comment block into at most one annotation
/// @ai:pre block text has its comment delimiters stripped
/// @ai:example ("@[Domain/Accumulator] Collects stuff" above `type Accumulator struct`) -> Declaration
/// @ai:example ("@[A]" trailing `x := f()`) -> Reference
/// @ai:example ("just a comment") -> NotAnAnnotation
/// @ai:effects pure
pub fn parse_block(block: &CommentBlock, symbols: &dyn SymbolHeuristic) -> ParseOutcome {
    let malformed = |reason: String| {
        ParseOutcome::Malformed(MalformedAnnotation {
            position: block.position.clone(),
            reason,
        })
    };

    let Some(after_open) = block.text.trim_start().strip_prefix(MARKER_OPEN) else {
        return ParseOutcome::NotAnAnnotation;
    };

    let (marker_line, rest_lines) = match after_open.split_once('\n') {
        Some((first, rest)) => (first, Some(rest)),
        None => (after_open, None),
    };

    let Some(close) = marker_line.find(MARKER_CLOSE) else {
        return malformed("unterminated path marker, expected `]`".to_string());
    };

    let path = match AnnotationPath::parse(&marker_line[..close]) {
        Ok(path) => path,
        Err(err) => return malformed(format!("invalid path `{}`: {}", &marker_line[..close], err)),
    };

    let (attributes, remainder) = match parse_attributes(&marker_line[close + 1..]) {
        Ok(parsed) => parsed,
        Err(reason) => return malformed(reason),
    };

    let inline_text = remainder.trim();
    let multi_line = rest_lines.is_some_and(|rest| !rest.trim().is_empty());

    let payload = if multi_line {
        let body = dedent_body(inline_text, rest_lines.unwrap_or_default());
        block_payload(Some(body), attributes)
    } else if let Some(code) = declaration_code(block).filter(|c| symbols.is_declaration(c)) {
        if !attributes.is_empty() {
            return malformed("attributes are only allowed on block annotations".to_string());
        }
        let title = (!inline_text.is_empty()).then(|| inline_text.to_string());
        Payload::Declaration {
            mentions: title.as_deref().map(find_mentions).unwrap_or_default(),
            title,
            bound_symbol: symbols.symbol_name(code),
        }
    } else if inline_text.is_empty() && attributes.is_empty() {
        Payload::Reference
    } else if inline_text.is_empty() && block.attached {
        return malformed("attributes are not allowed on a reference marker".to_string());
    } else {
        let body = (!inline_text.is_empty()).then(|| inline_text.to_string());
        block_payload(body, attributes)
    };

    ParseOutcome::Annotation(Annotation {
        path,
        position: block.position.clone(),
        payload,
    })
}

/// @ai:intent Code line a short-form annotation would decorate
fn declaration_code(block: &CommentBlock) -> Option<&str> {
    if block.attached {
        block.code.as_deref()
    } else {
        block.following_code.as_deref()
    }
}

/// @ai:intent Block payload; an uncollected block keeps only its attributes
fn block_payload(body: Option<String>, attributes: Attributes) -> Payload {
    let collected = !attributes.do_not_collect;
    let body = body.filter(|b| collected && !b.is_empty());
    Payload::Block {
        mentions: body.as_deref().map(find_mentions).unwrap_or_default(),
        body,
        alias: attributes.alias,
        title: attributes.title,
        collected,
    }
}

/// `{key:value}` and `{flag}` groups written right after the marker.
#[derive(Debug, Default)]
struct Attributes {
    alias: Option<String>,
    title: Option<String>,
    do_not_collect: bool,
}

impl Attributes {
    fn is_empty(&self) -> bool {
        self.alias.is_none() && self.title.is_none() && !self.do_not_collect
    }
}

/// @ai:intent Parse consecutive `{alias:..}`, `{title:..}` and `{do-not-collect}` groups
/// @ai:post returns the attributes and the text after the last closing brace
/// @ai:example ("{alias:Rules}{do-not-collect} rest") -> (alias Rules, uncollected), " rest"
/// @ai:effects pure
fn parse_attributes(mut text: &str) -> Result<(Attributes, &str), String> {
    let mut attributes = Attributes::default();

    while let Some(group) = text.strip_prefix('{') {
        let Some(end) = group.find('}') else {
            return Err("unterminated attribute brace, expected `}`".to_string());
        };
        let inner = &group[..end];
        text = &group[end + 1..];

        let (key, value) = match inner.split_once(':') {
            Some((key, value)) => (key.trim(), Some(value.trim())),
            None => (inner.trim(), None),
        };

        let slot = match (key, value) {
            (ALIAS_KEY, Some(value)) => (&mut attributes.alias, value),
            (TITLE_KEY, Some(value)) => (&mut attributes.title, value),
            (DO_NOT_COLLECT, None) => {
                if attributes.do_not_collect {
                    return Err(format!("duplicate attribute `{}`", DO_NOT_COLLECT));
                }
                attributes.do_not_collect = true;
                continue;
            }
            (DO_NOT_COLLECT, Some(_)) => {
                return Err(format!("attribute `{}` takes no value", DO_NOT_COLLECT))
            }
            (ALIAS_KEY | TITLE_KEY, None) => return Err(format!("attribute `{}` needs a value", key)),
            _ => return Err(format!("unsupported attribute `{}`", key)),
        };

        let (field, value) = slot;
        if value.is_empty() {
            return Err(format!("empty {}", key));
        }
        if field.is_some() {
            return Err(format!("duplicate attribute `{}`", key));
        }
        *field = Some(value.to_string());
    }

    Ok((attributes, text))
}

/// @ai:intent Join the marker-line text with the following lines, removing common indentation
/// @ai:effects pure
fn dedent_body(first: &str, rest: &str) -> String {
    let lines: Vec<&str> = rest.lines().collect();
    let indent = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);

    let mut body: Vec<&str> = Vec::with_capacity(lines.len() + 1);
    if !first.is_empty() {
        body.push(first);
    }
    for line in lines {
        if line.trim().is_empty() {
            body.push("");
        } else {
            body.push(line.get(indent..).unwrap_or(line));
        }
    }

    while body.first().is_some_and(|l| l.is_empty()) {
        body.remove(0);
    }
    while body.last().is_some_and(|l| l.is_empty()) {
        body.pop();
    }

    body.join("\n")
}

/// @ai:intent Collect well-formed `@[Path]` links inside prose
/// @ai:effects pure
fn find_mentions(body: &str) -> Vec<AnnotationPath> {
    let mut mentions = Vec::new();
    let mut rest = body;

    while let Some(start) = rest.find(MARKER_OPEN) {
        rest = &rest[start + MARKER_OPEN.len()..];
        let Some(end) = rest.find(MARKER_CLOSE) else {
            break;
        };
        if let Ok(path) = AnnotationPath::parse(&rest[..end]) {
            mentions.push(path);
        }
        rest = &rest[end + 1..];
    }

    mentions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::AnnotationKind;
    use crate::parser::CommentForm;

    /// Treats `type`/`func` lines as declarations, like the Go dialect.
    struct GoLike;

    impl SymbolHeuristic for GoLike {
        fn is_declaration(&self, code: &str) -> bool {
            code.starts_with("type ") || code.starts_with("func ")
        }

        fn symbol_name(&self, code: &str) -> Option<String> {
            let name = code.split_whitespace().nth(1)?;
            (!name.starts_with('(')).then(|| name.to_string())
        }
    }

    fn own_line(text: &str, following: Option<&str>) -> CommentBlock {
        CommentBlock {
            text: text.to_string(),
            position: SourcePosition::new("domain.go", 3, 1),
            form: CommentForm::Line,
            attached: false,
            code: None,
            preceding_code: None,
            following_code: following.map(str::to_string),
        }
    }

    fn trailing(text: &str, code: &str) -> CommentBlock {
        CommentBlock {
            attached: true,
            code: Some(code.to_string()),
            ..own_line(text, None)
        }
    }

    fn annotation(outcome: ParseOutcome) -> Annotation {
        match outcome {
            ParseOutcome::Annotation(a) => a,
            other => panic!("expected annotation, got {:?}", other),
        }
    }

    fn reason(outcome: ParseOutcome) -> String {
        match outcome {
            ParseOutcome::Malformed(m) => m.reason,
            other => panic!("expected malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_declaration_with_title() {
        let block = own_line(
            "@[Domain/Accumulator] Collects stuff",
            Some("type Accumulator struct {"),
        );
        let a = annotation(parse_block(&block, &GoLike));

        assert_eq!(a.kind(), AnnotationKind::Declaration);
        assert_eq!(a.path.to_string(), "Domain/Accumulator");
        assert_eq!(a.title(), Some("Collects stuff"));
        assert_eq!(a.bound_symbol(), Some("Accumulator"));
    }

    #[test]
    fn test_declaration_without_title() {
        let block = own_line("@[Domain/Accumulator]", Some("type Accumulator struct {"));
        let a = annotation(parse_block(&block, &GoLike));

        assert_eq!(a.kind(), AnnotationKind::Declaration);
        assert_eq!(a.title(), None);
    }

    #[test]
    fn test_declaration_without_recoverable_symbol() {
        let block = own_line("@[Domain/Collect] Adds", Some("func (a *Accumulator) Collect() {"));
        let a = annotation(parse_block(&block, &GoLike));

        assert_eq!(a.kind(), AnnotationKind::Declaration);
        assert_eq!(a.bound_symbol(), None);
    }

    #[test]
    fn test_leading_space_parses_identically() {
        let tight = own_line("@[Domain/Accumulator] Collects stuff", Some("type A struct {"));
        let spaced = own_line(" @[Domain/Accumulator] Collects stuff", Some("type A struct {"));

        assert_eq!(parse_block(&tight, &GoLike), parse_block(&spaced, &GoLike));
    }

    #[test]
    fn test_block_with_alias() {
        let block = CommentBlock {
            form: CommentForm::Block,
            ..own_line(
                "@[Domain/Accumulator/Invariants]{alias:Domain rules}\n    The accumulated value is always increasing when collecting new values.\n    ",
                Some("if x <= 0 {"),
            )
        };
        let a = annotation(parse_block(&block, &GoLike));

        assert_eq!(a.kind(), AnnotationKind::Block);
        assert_eq!(a.alias(), Some("Domain rules"));
        assert_eq!(
            a.body(),
            Some("The accumulated value is always increasing when collecting new values.")
        );
    }

    #[test]
    fn test_block_preserves_markdown_indentation() {
        let block = own_line(
            "@[Application]\n    Uses hard-coded values for demonstrating @[Domain/Accumulator/Invariants] in action.\n\n    _Primary uses:_\n    - Demo\n      - Nested\n    ",
            None,
        );
        let a = annotation(parse_block(&block, &GoLike));

        assert_eq!(
            a.body(),
            Some("Uses hard-coded values for demonstrating @[Domain/Accumulator/Invariants] in action.\n\n_Primary uses:_\n- Demo\n  - Nested")
        );
        assert_eq!(
            a.mentions(),
            &["Domain/Accumulator/Invariants".parse::<AnnotationPath>().unwrap()]
        );
    }

    #[test]
    fn test_multi_line_block_wins_over_declaration() {
        let block = own_line("@[Domain/Accumulator]\n  Long prose.\n", Some("type A struct {"));
        let a = annotation(parse_block(&block, &GoLike));

        assert_eq!(a.kind(), AnnotationKind::Block);
        assert_eq!(a.body(), Some("Long prose."));
    }

    #[test]
    fn test_trailing_marker_on_statement_is_reference() {
        let block = trailing(
            "@[Domain/Accumulator/Invariants]",
            "acc := Accumulator{ID: \"abc\", Value: 0}",
        );
        let a = annotation(parse_block(&block, &GoLike));

        assert_eq!(a.kind(), AnnotationKind::Reference);
        assert_eq!(a.content(), None);
    }

    #[test]
    fn test_trailing_marker_on_declaration_is_declaration() {
        let block = trailing("@[Domain/Accumulator]", "type Accumulator struct {");
        let a = annotation(parse_block(&block, &GoLike));

        assert_eq!(a.kind(), AnnotationKind::Declaration);
        assert_eq!(a.bound_symbol(), Some("Accumulator"));
    }

    #[test]
    fn test_single_line_note_inside_body_is_block() {
        let block = own_line("@[Domain/Reset] Resets to zero", Some("a.Value = 0"));
        let a = annotation(parse_block(&block, &GoLike));

        assert_eq!(a.kind(), AnnotationKind::Block);
        assert_eq!(a.body(), Some("Resets to zero"));
    }

    #[test]
    fn test_ordinary_comments_are_skipped() {
        let block = own_line(" Normal comment", Some("if x <= 0 {"));
        assert_eq!(parse_block(&block, &GoLike), ParseOutcome::NotAnAnnotation);

        let block = own_line(" see @[Domain/Accumulator]", None);
        assert_eq!(parse_block(&block, &GoLike), ParseOutcome::NotAnAnnotation);
    }

    #[test]
    fn test_empty_segment_is_malformed() {
        let block = own_line("@[Domain//Accumulator] Title", Some("type A struct {"));
        assert!(reason(parse_block(&block, &GoLike)).contains("empty path segment"));
    }

    #[test]
    fn test_unterminated_alias_is_malformed() {
        let block = own_line("@[Domain/Rules]{alias:Domain rules\n body\n", None);
        assert!(reason(parse_block(&block, &GoLike)).contains("unterminated attribute brace"));
    }

    #[test]
    fn test_alias_on_declaration_is_malformed() {
        let block = own_line("@[Domain/Accumulator]{alias:Acc} Title", Some("type A struct {"));
        assert!(reason(parse_block(&block, &GoLike)).contains("only allowed on block"));
    }

    #[test]
    fn test_alias_on_reference_is_malformed() {
        let block = trailing("@[Domain/Accumulator]{alias:Acc}", "acc := New()");
        assert!(reason(parse_block(&block, &GoLike)).contains("reference marker"));
    }

    #[test]
    fn test_unknown_attribute_is_malformed() {
        let block = own_line("@[Domain]{toggle}\n body\n", None);
        assert_eq!(reason(parse_block(&block, &GoLike)), "unsupported attribute `toggle`");
    }

    #[test]
    fn test_unknown_attribute_after_alias_is_malformed() {
        let block = CommentBlock {
            form: CommentForm::Block,
            ..own_line("@[A]{alias:Rules}{toggle}\n Body text.\n", None)
        };
        assert_eq!(reason(parse_block(&block, &GoLike)), "unsupported attribute `toggle`");
    }

    #[test]
    fn test_chained_attributes() {
        let block = own_line("@[Domain/Rules]{alias:Rules}{title:Rule set}\n  Body text.\n", None);
        let a = annotation(parse_block(&block, &GoLike));

        assert_eq!(a.kind(), AnnotationKind::Block);
        assert_eq!(a.alias(), Some("Rules"));
        assert_eq!(a.title(), Some("Rule set"));
        assert_eq!(a.body(), Some("Body text."));
        assert!(a.is_collected());
    }

    #[test]
    fn test_duplicate_attribute_is_malformed() {
        let block = own_line("@[A]{alias:One}{alias:Two}\n body\n", None);
        assert_eq!(reason(parse_block(&block, &GoLike)), "duplicate attribute `alias`");

        let block = own_line("@[A]{title:}\n body\n", None);
        assert_eq!(reason(parse_block(&block, &GoLike)), "empty title");

        let block = own_line("@[A]{do-not-collect:yes}\n body\n", None);
        assert!(reason(parse_block(&block, &GoLike)).contains("takes no value"));
    }

    #[test]
    fn test_do_not_collect_keeps_attributes_only() {
        let block = own_line(
            "@[Domain/Rules]{alias:Rules}{do-not-collect}\n  Draft that mentions @[Other].\n",
            None,
        );
        let a = annotation(parse_block(&block, &GoLike));

        assert_eq!(a.kind(), AnnotationKind::Block);
        assert!(!a.is_collected());
        assert_eq!(a.alias(), Some("Rules"));
        assert_eq!(a.body(), None);
        assert!(a.mentions().is_empty());
    }

    #[test]
    fn test_title_attribute_on_bare_own_line_marker() {
        let block = own_line("@[Domain/Rules]{title:Rule set}", Some("x := 1"));
        let a = annotation(parse_block(&block, &GoLike));

        assert_eq!(a.kind(), AnnotationKind::Block);
        assert_eq!(a.title(), Some("Rule set"));
        assert_eq!(a.body(), None);
    }

    #[test]
    fn test_title_attribute_on_declaration_is_malformed() {
        let block = own_line("@[Domain/Accumulator]{title:Acc} Collects", Some("type A struct {"));
        assert!(reason(parse_block(&block, &GoLike)).contains("only allowed on block"));
    }

    #[test]
    fn test_declaration_title_mentions() {
        let block = own_line("@[A] See @[B] and @[C/D]", Some("type A struct {"));
        let a = annotation(parse_block(&block, &GoLike));

        assert_eq!(a.kind(), AnnotationKind::Declaration);
        assert_eq!(a.title(), Some("See @[B] and @[C/D]"));
        let mentions: Vec<String> = a.mentions().iter().map(|p| p.to_string()).collect();
        assert_eq!(mentions, vec!["B", "C/D"]);
    }

    #[test]
    fn test_star_bullets_survive_plain_block() {
        let syntax = CommentSyntax::new(&["//"], Some(("/*", "*/"))).with_block_line_prefix("*");
        let text = "/* @[A]\n    * first item\n    * second item\n    */\nfunc Run() {}\n";
        let result = extract_source(Path::new("a.go"), text, &syntax, &GoLike);

        assert_eq!(result.annotations.len(), 1);
        assert_eq!(result.annotations[0].body(), Some("* first item\n* second item"));
    }

    #[test]
    fn test_extract_source_collects_errors_and_continues() {
        let syntax = CommentSyntax::new(&["//"], Some(("/*", "*/")));
        let text = "//@[Bad//Path] Title\ntype A struct {}\n\n//@[Good] Title\ntype B struct {}\n";
        let result = extract_source(Path::new("a.go"), text, &syntax, &GoLike);

        assert_eq!(result.malformed.len(), 1);
        assert_eq!(result.malformed[0].position.line, 1);
        assert_eq!(result.annotations.len(), 1);
        assert_eq!(result.annotations[0].path.to_string(), "Good");
        assert_eq!(result.annotations[0].bound_symbol(), Some("B"));
    }

    #[test]
    fn test_extract_source_drops_file_on_unterminated_comment() {
        let syntax = CommentSyntax::new(&["//"], Some(("/*", "*/")));
        let text = "//@[Good] Title\ntype B struct {}\n/* @[Lost]\n";
        let result = extract_source(Path::new("a.go"), text, &syntax, &GoLike);

        assert!(result.annotations.is_empty());
        assert!(matches!(
            result.extraction_error,
            Some(ExtractionError::UnterminatedComment { .. })
        ));
    }
}
