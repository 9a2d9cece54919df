//! @ai:module:intent Format reports, trees and file annotations for different formats (JSON, text)
//! @ai:module:layer infrastructure
//! @ai:module:public_api OutputFormat, format_report, format_tree, format_file_annotations, format_occurrences
//! @ai:module:depends_on linter, tree, reader, extractor
//! @ai:module:stateless true

use crate::annotation::{AnnotationKind, AnnotationPath};
use crate::extractor::FileAnnotations;
use crate::linter::{Report, Severity};
use crate::reader::{LinkFormat, Occurrence};
use crate::tree::{Tree, TreeNode};
use colored::Colorize;
use serde::Serialize;

/// @ai:intent Output format options
#[derive(Debug, Clone, Copy, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    JsonPretty,
}

/// @ai:intent Format a run report as a string
/// @ai:effects pure
pub fn format_report(report: &Report, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format_report_text(report),
        _ => to_json(report, format),
    }
}

/// @ai:intent Format a run report as human-readable text
/// @ai:effects pure
fn format_report_text(report: &Report) -> String {
    let mut output = String::new();

    for diagnostic in &report.diagnostics {
        let severity_str = match diagnostic.severity {
            Severity::Error => "ERROR".red().bold(),
            Severity::Warning => "WARN".yellow().bold(),
        };

        let location = diagnostic
            .location
            .as_ref()
            .map(|position| format!("{} ", position).dimmed().to_string())
            .unwrap_or_default();

        output.push_str(&format!(
            "{} {}- {} ({})\n",
            severity_str,
            location,
            diagnostic.message,
            diagnostic.code.dimmed()
        ));

        if let Some(suggestion) = &diagnostic.suggestion {
            output.push_str(&format!("  {} {}\n", "hint:".cyan(), suggestion));
        }
    }

    output.push('\n');
    output.push_str(&format!(
        "Checked {} files, {} annotations\n",
        report.files_checked, report.annotations
    ));

    if report.errors > 0 {
        output.push_str(&format!(
            "{} errors, {} warnings\n",
            report.errors.to_string().red().bold(),
            report.warnings.to_string().yellow()
        ));
    } else if report.warnings > 0 {
        output.push_str(&format!(
            "{} {} warnings\n",
            "OK".green().bold(),
            report.warnings.to_string().yellow()
        ));
    } else {
        output.push_str(&format!("{} No issues found\n", "OK".green().bold()));
    }

    output
}

/// @ai:intent Format a finished tree as an indented outline or JSON
/// @ai:effects pure
pub fn format_tree(tree: &Tree, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format_tree_text(tree),
        _ => to_json(tree, format),
    }
}

fn format_tree_text(tree: &Tree) -> String {
    let mut output = String::new();

    for node in tree.walk() {
        let indent = "  ".repeat(node.path.depth());
        output.push_str(&format!("{}{}", indent, node_label(node)));

        if let Some(alias) = node.content.as_ref().and_then(|c| c.alias.as_deref()) {
            output.push_str(&format!(" {}", format!("{{alias:{}}}", alias).cyan()));
        }
        if let Some(title) = node.content.as_ref().and_then(|c| c.title.as_deref()) {
            output.push_str(&format!(" - {}", title));
        }

        let counts = site_counts(node);
        if !counts.is_empty() {
            output.push_str(&format!(" {}", format!("[{}]", counts).dimmed()));
        }
        output.push('\n');

        if let Some(body) = node.content.as_ref().and_then(|c| c.body.as_deref()) {
            for line in body.lines() {
                output.push_str(&format!("{}  {} {}\n", indent, "|".dimmed(), line));
            }
        }
    }

    if tree.is_empty() {
        output.push_str("No annotations found\n");
    }

    output
}

fn node_label(node: &TreeNode) -> String {
    let name = node.path.name();
    if node.has_conflicts() {
        format!("{} {}", name.bold(), "(conflict)".red())
    } else if node.is_structural() {
        name.dimmed().to_string()
    } else {
        name.bold().to_string()
    }
}

fn site_counts(node: &TreeNode) -> String {
    [
        (node.declaration_sites.len(), "decl"),
        (node.block_sites.len(), "block"),
        (node.reference_sites.len(), "ref"),
        (node.mention_sites.len(), "mention"),
    ]
    .iter()
    .filter(|(count, _)| *count > 0)
    .map(|(count, label)| format!("{} {}", count, label))
    .collect::<Vec<_>>()
    .join(", ")
}

/// @ai:intent Format the annotations and parse errors of one file
/// @ai:effects pure
pub fn format_file_annotations(file: &FileAnnotations, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format_file_annotations_text(file),
        _ => to_json(file, format),
    }
}

fn format_file_annotations_text(file: &FileAnnotations) -> String {
    let mut output = String::new();

    output.push_str(&format!("{}\n", file.path.display().to_string().bold()));

    if let Some(error) = &file.extraction_error {
        output.push_str(&format!("  {} {}\n", "ERROR".red().bold(), error));
        return output;
    }

    output.push_str(&format!("\n  Annotations ({}):\n", file.annotations.len()));

    for annotation in &file.annotations {
        output.push_str(&format!(
            "    {} {} (line {})\n",
            annotation.kind().to_string().yellow(),
            annotation.path.to_string().cyan(),
            annotation.position.line
        ));

        if let Some(symbol) = annotation.bound_symbol() {
            output.push_str(&format!("      symbol: {}\n", symbol));
        }
        if let Some(title) = annotation.title() {
            output.push_str(&format!("      title: {}\n", title));
        }
        if let Some(alias) = annotation.alias() {
            output.push_str(&format!("      alias: {}\n", alias));
        }
        if !annotation.is_collected() {
            output.push_str("      not collected\n");
        }
        if annotation.kind() == AnnotationKind::Block {
            if let Some(body) = annotation.body() {
                output.push_str(&format!("      body: {} lines\n", body.lines().count()));
            }
        }
        if !annotation.mentions().is_empty() {
            let mentions: Vec<String> = annotation.mentions().iter().map(|m| m.to_string()).collect();
            output.push_str(&format!("      mentions: {}\n", mentions.join(", ")));
        }
    }

    for malformed in &file.malformed {
        output.push_str(&format!(
            "  {} line {}: {}\n",
            "MALFORMED".red(),
            malformed.position.line,
            malformed.reason
        ));
    }

    output
}

#[derive(Serialize)]
struct LinkedOccurrence<'o> {
    #[serde(flatten)]
    occurrence: &'o Occurrence,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
}

/// @ai:intent Format every occurrence of one node, with links when a link root is configured
/// @ai:effects pure
pub fn format_occurrences(
    path: &AnnotationPath,
    occurrences: &[Occurrence],
    links: Option<&LinkFormat>,
    format: OutputFormat,
) -> String {
    let linked: Vec<LinkedOccurrence> = occurrences
        .iter()
        .map(|occurrence| LinkedOccurrence {
            occurrence,
            url: links.map(|l| occurrence.url(l)),
        })
        .collect();

    if !matches!(format, OutputFormat::Text) {
        return to_json(&linked, format);
    }

    let mut output = format!("{}\n", path.to_string().bold());
    for entry in &linked {
        let occurrence = entry.occurrence;
        output.push_str(&format!(
            "  {:<11} {}",
            occurrence.kind.to_string().yellow(),
            occurrence.position
        ));
        if let Some(symbol) = &occurrence.bound_symbol {
            output.push_str(&format!(" ({})", symbol));
        }
        if let Some(url) = &entry.url {
            output.push_str(&format!(" {}", url.dimmed()));
        }
        output.push('\n');
    }

    if linked.is_empty() {
        output.push_str("  No occurrences\n");
    }

    output
}

/// @ai:intent Format any serializable value as JSON
/// @ai:effects pure
pub fn to_json<T: Serialize>(value: &T, format: OutputFormat) -> String {
    match format {
        OutputFormat::JsonPretty => serde_json::to_string_pretty(value).unwrap_or_default(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
