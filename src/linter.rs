//! @ai:module:intent Check a finished tree for consistency and collect every diagnostic of a run
//! @ai:module:layer application
//! @ai:module:public_api check, Diagnostic, DiagnosticKind, Severity, Report, FailPolicy
//! @ai:module:depends_on tree, reader, extractor, parser, annotation
//! @ai:module:stateless true

use crate::annotation::{AnnotationPath, SourcePosition};
use crate::extractor::MalformedAnnotation;
use crate::parser::ExtractionError;
use crate::tree::{MergeIssue, Tree};
use serde::{Deserialize, Serialize};
use std::fmt;

/// @ai:intent Severity level for diagnostics
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// @ai:intent Every kind of finding a run can produce
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    ExtractionError,
    MalformedAnnotation,
    MergeConflict,
    AliasCollision,
    UndefinedReference,
    EmptyStructuralLeaf,
    PartialRun,
}

impl DiagnosticKind {
    /// @ai:intent Stable short code shown next to each diagnostic
    /// @ai:effects pure
    pub fn code(self) -> &'static str {
        match self {
            DiagnosticKind::ExtractionError => "E001",
            DiagnosticKind::MalformedAnnotation => "E002",
            DiagnosticKind::MergeConflict => "E003",
            DiagnosticKind::AliasCollision => "E004",
            DiagnosticKind::UndefinedReference => "W001",
            DiagnosticKind::EmptyStructuralLeaf => "W002",
            DiagnosticKind::PartialRun => "W003",
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            DiagnosticKind::ExtractionError
            | DiagnosticKind::MalformedAnnotation
            | DiagnosticKind::MergeConflict
            | DiagnosticKind::AliasCollision => Severity::Error,
            DiagnosticKind::UndefinedReference
            | DiagnosticKind::EmptyStructuralLeaf
            | DiagnosticKind::PartialRun => Severity::Warning,
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiagnosticKind::ExtractionError => "extraction error",
            DiagnosticKind::MalformedAnnotation => "malformed annotation",
            DiagnosticKind::MergeConflict => "merge conflict",
            DiagnosticKind::AliasCollision => "alias collision",
            DiagnosticKind::UndefinedReference => "undefined reference",
            DiagnosticKind::EmptyStructuralLeaf => "empty structural leaf",
            DiagnosticKind::PartialRun => "partial run",
        };
        f.write_str(name)
    }
}

/// @ai:intent A single finding, located in the sources when possible
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<SourcePosition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<AnnotationPath>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl Diagnostic {
    fn new(kind: DiagnosticKind, message: String) -> Self {
        Self {
            severity: kind.severity(),
            kind,
            code: kind.code().to_string(),
            message,
            location: None,
            path: None,
            suggestion: None,
        }
    }

    fn at(mut self, location: SourcePosition) -> Self {
        self.location = Some(location);
        self
    }

    fn on(mut self, path: AnnotationPath) -> Self {
        self.path = Some(path);
        self
    }

    fn hint(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// @ai:intent Diagnostic for a file whose comments could not be sliced
    pub fn extraction(error: &ExtractionError) -> Self {
        Self::new(DiagnosticKind::ExtractionError, error.to_string())
            .at(error.position().clone())
            .hint("Close the comment; no annotation from this file was merged")
    }

    pub fn malformed(error: &MalformedAnnotation) -> Self {
        Self::new(DiagnosticKind::MalformedAnnotation, error.reason.clone())
            .at(error.position.clone())
            .hint("Expected @[Segment/Segment] optionally followed by {alias:name}")
    }

    /// @ai:intent Surface a bookkeeping finding of the tree builder
    pub fn from_merge_issue(issue: &MergeIssue) -> Self {
        match issue {
            MergeIssue::Conflict(conflict) => Self::new(
                DiagnosticKind::MergeConflict,
                format!(
                    "{} content for `{}` differs from the canonical {} at {}",
                    conflict.kind, conflict.path, conflict.kind, conflict.canonical_position
                ),
            )
            .at(conflict.position.clone())
            .on(conflict.path.clone())
            .hint("Make every occurrence identical or turn this one into a bare reference"),
            MergeIssue::AliasCollision(collision) => Self::new(
                DiagnosticKind::AliasCollision,
                format!(
                    "alias `{}` is already bound to `{}` at {}",
                    collision.alias, collision.bound_path, collision.bound_position
                ),
            )
            .at(collision.position.clone())
            .on(collision.claimed_path.clone())
            .hint("Pick a different alias"),
        }
    }

    /// @ai:intent Warning emitted when a run was cancelled before every file was read
    pub fn partial_run(skipped: usize, total: usize) -> Self {
        Self::new(
            DiagnosticKind::PartialRun,
            format!("run cancelled: {} of {} files were not processed", skipped, total),
        )
    }
}

/// @ai:intent Which severities turn a run into a failure
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FailPolicy {
    #[default]
    Error,
    Warning,
    Never,
}

/// @ai:intent Result of a whole run: counts plus the ordered diagnostics list
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Report {
    pub files_checked: usize,
    pub annotations: usize,
    pub diagnostics: Vec<Diagnostic>,
    pub errors: usize,
    pub warnings: usize,
}

impl Report {
    pub fn push(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Error => self.errors += 1,
            Severity::Warning => self.warnings += 1,
        }
        self.diagnostics.push(diagnostic);
    }

    /// @ai:intent Check if the run produced no error-severity diagnostics
    pub fn passed(&self) -> bool {
        self.errors == 0
    }

    /// @ai:intent Apply the caller's exit policy
    /// @ai:example (errors: 0, warnings: 2, Warning) -> true
    /// @ai:example (errors: 3, warnings: 0, Never) -> false
    pub fn fails(&self, policy: FailPolicy) -> bool {
        match policy {
            FailPolicy::Error => self.errors > 0,
            FailPolicy::Warning => self.errors + self.warnings > 0,
            FailPolicy::Never => false,
        }
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.diagnostics.iter().filter(|d| d.kind == kind).count()
    }
}

impl Extend<Diagnostic> for Report {
    fn extend<I: IntoIterator<Item = Diagnostic>>(&mut self, iter: I) {
        for diagnostic in iter {
            self.push(diagnostic);
        }
    }
}

/// @ai:intent Run the closure rules over a finished tree
/// @ai:pre issues are the ones returned alongside the tree by build_tree
/// @ai:post merge issues come first, then node findings in walk order; the tree is untouched
/// @ai:effects pure
pub fn check(tree: &Tree, issues: &[MergeIssue]) -> Vec<Diagnostic> {
    let mut diagnostics: Vec<Diagnostic> = issues.iter().map(Diagnostic::from_merge_issue).collect();

    for node in tree.walk() {
        if node.content.is_some() {
            continue;
        }

        if let Some(first) = node.reference_sites.first() {
            if !tree.has_content_below(&node.path) {
                diagnostics.push(
                    Diagnostic::new(
                        DiagnosticKind::UndefinedReference,
                        format!("`{}` is referenced but never documented", node.path),
                    )
                    .at(first.clone())
                    .on(node.path.clone())
                    .hint(format!("Add a block annotation for @[{}]", node.path)),
                );
            }
        } else if node.is_leaf() {
            let diagnostic = Diagnostic::new(
                DiagnosticKind::EmptyStructuralLeaf,
                format!("`{}` has no content, children or references", node.path),
            )
            .on(node.path.clone())
            .hint("Check the path for a typo");

            diagnostics.push(match node.mention_sites.first() {
                Some(mention) => diagnostic.at(mention.clone()),
                None => diagnostic,
            });
        }
    }

    diagnostics
}
