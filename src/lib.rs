//! @ai:module:intent annotree library for turning @[Path] comment annotations into a knowledge tree
//! @ai:module:layer infrastructure
//! @ai:module:public_api annotation, parser, extractor, tree, reader, linter, collector, language, scanner, config, output, error
//! @ai:module:stateless true
//!
//! # annotree
//!
//! Developers annotate source comments with hierarchical paths such as
//! `@[Domain/Accumulator/Invariants]`. This crate extracts those annotations,
//! merges every occurrence of a path across files into one tree node, and
//! checks the result for conflicts, alias collisions and dangling references.
//!
//! ## Example
//!
//! ```rust,no_run
//! use annotree::{collect, output, CancelToken, Config, Scanner};
//! use std::path::Path;
//!
//! let root = Path::new("src");
//! let config = Config::load_from_dir(root).unwrap();
//! let scanner = Scanner::new(&config.scan, config.dialects().unwrap()).unwrap();
//! let files = scanner.scan(root).unwrap();
//!
//! let collection = collect(&files, &CancelToken::new());
//! println!("{}", output::format_tree(&collection.tree, output::OutputFormat::Text));
//! println!("{}", output::format_report(&collection.report, output::OutputFormat::Text));
//!
//! if let Some(node) = collection.tree.get("Domain/Accumulator") {
//!     for occurrence in collection.tree.occurrences(&node.path).unwrap_or_default() {
//!         println!("{:?} at {}", occurrence.kind, occurrence.position);
//!     }
//! }
//! ```

pub mod annotation;
pub mod collector;
pub mod config;
pub mod error;
pub mod extractor;
pub mod language;
pub mod linter;
pub mod output;
pub mod parser;
pub mod reader;
pub mod scanner;
pub mod tree;

pub use annotation::{Annotation, AnnotationKind, AnnotationPath, Content, Payload, SourcePosition};
pub use collector::{collect, CancelToken, Collection, SourceFile};
pub use config::{Config, LinksConfig};
pub use error::{Error, Result};
pub use extractor::{extract_source, parse_block, FileAnnotations, MalformedAnnotation, SymbolHeuristic};
pub use language::{detect_language, Dialect, DialectRegistry, Language};
pub use linter::{check, Diagnostic, DiagnosticKind, FailPolicy, Report, Severity};
pub use output::{format_file_annotations, format_occurrences, format_report, format_tree, OutputFormat};
pub use parser::{extract_comments, CommentBlock, CommentScanner, CommentSyntax, ExtractionError};
pub use reader::{LinkFormat, Occurrence, OccurrenceKind};
pub use scanner::{FileFilter, Scanner};
pub use tree::{build_tree, MergeIssue, Tree, TreeNode};
