//! @ai:module:intent Run the whole pipeline over a set of in-memory source files
//! @ai:module:layer application
//! @ai:module:public_api collect, SourceFile, CancelToken, Collection
//! @ai:module:depends_on extractor, tree, linter, language
//! @ai:module:stateless true
//!
//! Extraction runs in parallel, one private result per file. Every result is
//! gathered before the tree is folded, so the fold always sees the whole run.

use crate::extractor::{extract_source, FileAnnotations};
use crate::language::Dialect;
use crate::linter::{check, Diagnostic, Report};
use crate::tree::{build_tree, Tree};
use rayon::prelude::*;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// @ai:intent One file to process, already read and matched to a dialect
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Identifier used in every position, usually relative to the scan root.
    pub path: PathBuf,
    pub text: String,
    pub dialect: Arc<Dialect>,
}

/// @ai:intent Shared flag a caller sets to stop scheduling new files
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// @ai:intent Output of a run: the immutable tree plus the full report
#[derive(Debug, Clone, Default)]
pub struct Collection {
    pub tree: Tree,
    pub report: Report,
}

/// @ai:intent Extract, merge and check a set of files
/// @ai:pre file paths are unique
/// @ai:post files skipped after cancellation add one PartialRun warning and nothing else
/// @ai:effects pure
pub fn collect(files: &[SourceFile], cancel: &CancelToken) -> Collection {
    let mut extracted: Vec<FileAnnotations> = files
        .par_iter()
        .filter_map(|file| {
            if cancel.is_cancelled() {
                return None;
            }
            let result = extract_source(&file.path, &file.text, &file.dialect.syntax, file.dialect.as_ref());
            debug!(
                file = %file.path.display(),
                dialect = %file.dialect.name,
                annotations = result.annotations.len(),
                malformed = result.malformed.len(),
                "extracted file"
            );
            Some(result)
        })
        .collect();
    extracted.sort_by(|a, b| a.path.cmp(&b.path));

    let mut report = Report {
        files_checked: extracted.len(),
        ..Default::default()
    };

    let mut annotations = Vec::new();
    for file in extracted {
        if let Some(error) = &file.extraction_error {
            warn!(file = %file.path.display(), "{}", error);
            report.push(Diagnostic::extraction(error));
        }
        report.extend(file.malformed.iter().map(Diagnostic::malformed));
        annotations.extend(file.annotations);
    }
    report.annotations = annotations.len();

    let (tree, issues) = build_tree(&annotations);
    report.extend(check(&tree, &issues));

    let skipped = files.len() - report.files_checked;
    if skipped > 0 {
        warn!(skipped, total = files.len(), "run cancelled before every file was processed");
        report.push(Diagnostic::partial_run(skipped, files.len()));
    }

    info!(
        files = report.files_checked,
        annotations = report.annotations,
        nodes = tree.len(),
        errors = report.errors,
        warnings = report.warnings,
        "collection finished"
    );

    Collection { tree, report }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Language;
    use crate::linter::DiagnosticKind;

    fn go_file(path: &str, text: &str) -> SourceFile {
        SourceFile {
            path: PathBuf::from(path),
            text: text.to_string(),
            dialect: Arc::new(Language::Go.dialect().unwrap()),
        }
    }

    fn files() -> Vec<SourceFile> {
        vec![
            go_file(
                "domain.go",
                "package main\n\n//@[Domain/Accumulator] Collects stuff\ntype Accumulator struct {\n}\n",
            ),
            go_file(
                "app.go",
                "package main\n\nfunc main() {\n    acc := Accumulator{} //@[Domain/Accumulator]\n}\n",
            ),
            go_file("broken.go", "package main\n\n/* @[Lost]\nnever closed\n"),
        ]
    }

    #[test]
    fn test_collect_builds_and_checks() {
        let collection = collect(&files(), &CancelToken::new());
        let report = &collection.report;

        assert_eq!(report.files_checked, 3);
        assert_eq!(report.annotations, 2);
        assert_eq!(report.errors, 1);
        assert_eq!(report.count(DiagnosticKind::ExtractionError), 1);
        assert_eq!(
            report.diagnostics[0].location.as_ref().unwrap().file,
            PathBuf::from("broken.go")
        );

        let node = collection.tree.get("Domain/Accumulator").unwrap();
        assert_eq!(node.declaration_sites.len(), 1);
        assert_eq!(node.reference_sites.len(), 1);
        assert!(collection.tree.get("Lost").is_none());
    }

    #[test]
    fn test_collect_ignores_file_order() {
        let mut reversed = files();
        reversed.reverse();

        let forward = collect(&files(), &CancelToken::new());
        let backward = collect(&reversed, &CancelToken::new());

        assert_eq!(forward.tree, backward.tree);
        assert_eq!(forward.report, backward.report);
    }

    #[test]
    fn test_cancelled_run_reports_partial() {
        let cancel = CancelToken::new();
        cancel.cancel();

        let collection = collect(&files(), &cancel);

        assert!(collection.tree.is_empty());
        assert_eq!(collection.report.files_checked, 0);
        assert_eq!(collection.report.diagnostics.len(), 1);
        assert_eq!(collection.report.diagnostics[0].kind, DiagnosticKind::PartialRun);
        assert!(collection.report.passed());
    }
}
