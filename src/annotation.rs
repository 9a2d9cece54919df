//! @ai:module:intent Define data structures for parsed annotations
//! @ai:module:layer domain
//! @ai:module:public_api SourcePosition, AnnotationPath, PathError, AnnotationKind, Payload, Annotation, Content
//! @ai:module:stateless true

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// @ai:intent Represents a source code location
///
/// Field order matters: the derived `Ord` sorts by file, then line, then column,
/// which is the occurrence order used everywhere in the tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourcePosition {
    pub file: PathBuf,
    pub line: usize,
    pub column: usize,
}

impl SourcePosition {
    /// @ai:intent Create a new SourcePosition
    pub fn new(file: impl Into<PathBuf>, line: usize, column: usize) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file.display(), self.line, self.column)
    }
}

/// @ai:intent Reasons a path string is rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("empty path")]
    Empty,

    #[error("empty path segment at position {index}")]
    EmptySegment { index: usize },

    #[error("whitespace inside path segment `{segment}`")]
    Whitespace { segment: String },
}

/// @ai:intent Slash-separated, case-sensitive, non-empty sequence of segment names
///
/// Ordering is segment-wise lexicographic, so a parent always sorts before its
/// descendants and siblings sort by name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct AnnotationPath {
    segments: Vec<String>,
}

impl AnnotationPath {
    /// @ai:intent Parse `A/B/C` into a path
    /// @ai:pre no whitespace inside the marker
    /// @ai:example ("Domain/Accumulator") -> Ok([Domain, Accumulator])
    /// @ai:example ("Domain//Accumulator") -> Err(EmptySegment { index: 1 })
    /// @ai:effects pure
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        if raw.is_empty() {
            return Err(PathError::Empty);
        }

        Self::from_segments(raw.split('/').map(str::to_string).collect())
    }

    /// @ai:intent Build a path from already split segments
    /// @ai:effects pure
    pub fn from_segments(segments: Vec<String>) -> Result<Self, PathError> {
        if segments.is_empty() {
            return Err(PathError::Empty);
        }

        for (index, segment) in segments.iter().enumerate() {
            if segment.is_empty() {
                return Err(PathError::EmptySegment { index });
            }
            if segment.chars().any(char::is_whitespace) {
                return Err(PathError::Whitespace {
                    segment: segment.clone(),
                });
            }
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// @ai:intent Last segment of the path
    pub fn name(&self) -> &str {
        // Construction guarantees at least one segment.
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    /// @ai:intent Number of segments below the first one (top-level paths have depth 0)
    pub fn depth(&self) -> usize {
        self.segments.len() - 1
    }

    /// @ai:intent Path with the last segment removed, None for top-level paths
    /// @ai:effects pure
    pub fn parent(&self) -> Option<AnnotationPath> {
        if self.segments.len() < 2 {
            return None;
        }

        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// @ai:intent All proper prefixes, shortest first
    /// @ai:example ("a/b/c") -> [a, a/b]
    pub fn ancestors(&self) -> impl Iterator<Item = AnnotationPath> + '_ {
        (1..self.segments.len()).map(move |len| Self {
            segments: self.segments[..len].to_vec(),
        })
    }

    /// @ai:intent Append one segment
    pub fn child(&self, segment: &str) -> AnnotationPath {
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Self { segments }
    }

    /// @ai:intent Check whether `other` lies strictly below this path
    pub fn is_ancestor_of(&self, other: &AnnotationPath) -> bool {
        other.segments.len() > self.segments.len() && other.segments.starts_with(&self.segments)
    }
}

impl fmt::Display for AnnotationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

impl FromStr for AnnotationPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<AnnotationPath> for String {
    fn from(path: AnnotationPath) -> Self {
        path.to_string()
    }
}

impl TryFrom<String> for AnnotationPath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

/// @ai:intent Categorizes annotations by the grammar form they were written in
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationKind {
    Declaration,
    Block,
    Reference,
}

impl fmt::Display for AnnotationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AnnotationKind::Declaration => "declaration",
            AnnotationKind::Block => "block",
            AnnotationKind::Reference => "reference",
        };
        f.write_str(name)
    }
}

/// @ai:intent Kind-specific fields of an annotation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    /// Short-form marker above or beside a declaration. `mentions` are the
    /// `@[Path]` links found inside the title.
    Declaration {
        title: Option<String>,
        bound_symbol: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        mentions: Vec<AnnotationPath>,
    },
    /// Long-form prose. `mentions` are the `@[Path]` links found inside the body.
    ///
    /// An uncollected block (`{do-not-collect}`) only lends its `title` and
    /// `alias` to the node; it has no body and leaves no site.
    Block {
        body: Option<String>,
        alias: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        mentions: Vec<AnnotationPath>,
        #[serde(default = "collected_default", skip_serializing_if = "is_collected")]
        collected: bool,
    },
    /// Bare marker on a statement line.
    Reference,
}

fn collected_default() -> bool {
    true
}

fn is_collected(collected: &bool) -> bool {
    *collected
}

/// @ai:intent Represents a single parsed annotation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Annotation {
    pub path: AnnotationPath,
    pub position: SourcePosition,
    #[serde(flatten)]
    pub payload: Payload,
}

impl Annotation {
    pub fn kind(&self) -> AnnotationKind {
        match self.payload {
            Payload::Declaration { .. } => AnnotationKind::Declaration,
            Payload::Block { .. } => AnnotationKind::Block,
            Payload::Reference => AnnotationKind::Reference,
        }
    }

    /// Inline title of a declaration, or the `{title:..}` attribute of a block.
    pub fn title(&self) -> Option<&str> {
        match &self.payload {
            Payload::Declaration { title, .. } | Payload::Block { title, .. } => title.as_deref(),
            Payload::Reference => None,
        }
    }

    pub fn body(&self) -> Option<&str> {
        match &self.payload {
            Payload::Block { body, .. } => body.as_deref(),
            _ => None,
        }
    }

    pub fn alias(&self) -> Option<&str> {
        match &self.payload {
            Payload::Block { alias, .. } => alias.as_deref(),
            _ => None,
        }
    }

    pub fn bound_symbol(&self) -> Option<&str> {
        match &self.payload {
            Payload::Declaration { bound_symbol, .. } => bound_symbol.as_deref(),
            _ => None,
        }
    }

    pub fn mentions(&self) -> &[AnnotationPath] {
        match &self.payload {
            Payload::Declaration { mentions, .. } | Payload::Block { mentions, .. } => mentions,
            Payload::Reference => &[],
        }
    }

    /// False for `{do-not-collect}` blocks.
    pub fn is_collected(&self) -> bool {
        match self.payload {
            Payload::Block { collected, .. } => collected,
            _ => true,
        }
    }

    /// @ai:intent Normalized content used for duplicate detection, None for references
    /// @ai:effects pure
    pub fn content(&self) -> Option<Content> {
        match &self.payload {
            Payload::Declaration { title, .. } => Some(Content::new(title.as_deref(), None, None)),
            Payload::Block {
                body, alias, title, ..
            } => Some(Content::new(title.as_deref(), body.as_deref(), alias.as_deref())),
            Payload::Reference => None,
        }
    }
}

/// @ai:intent Title, body and alias with surrounding whitespace removed
///
/// Two occurrences are duplicates iff their `Content` values are equal.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl Content {
    /// @ai:intent Build normalized content; blank strings become None
    /// @ai:effects pure
    pub fn new(title: Option<&str>, body: Option<&str>, alias: Option<&str>) -> Self {
        Self {
            title: normalize(title),
            body: normalize(body),
            alias: normalize(alias),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.body.is_none() && self.alias.is_none()
    }
}

fn normalize(text: Option<&str>) -> Option<String> {
    text.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}
