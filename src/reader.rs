//! @ai:module:intent Read-only query surface over a finished tree
//! @ai:module:layer application
//! @ai:module:public_api Occurrence, OccurrenceKind, LinkFormat
//! @ai:module:depends_on tree, annotation
//! @ai:module:stateless true

use crate::annotation::{AnnotationPath, Content, SourcePosition};
use crate::tree::{Tree, TreeNode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path};

const PLAIN_TEMPLATE: &str = "{root}/{path}";
const HOSTED_TEMPLATE: &str = "{root}/blob/master/{path}#L{line}";

/// @ai:intent How a path occurs at a source position
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum OccurrenceKind {
    Declaration,
    Block,
    Reference,
    Mention,
}

impl fmt::Display for OccurrenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OccurrenceKind::Declaration => "declaration",
            OccurrenceKind::Block => "block",
            OccurrenceKind::Reference => "reference",
            OccurrenceKind::Mention => "mention",
        };
        f.write_str(name)
    }
}

/// @ai:intent One place in the sources where a node is declared, described or used
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Occurrence {
    pub kind: OccurrenceKind,
    pub position: SourcePosition,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bound_symbol: Option<String>,
}

impl Occurrence {
    /// @ai:intent Link to this occurrence in a repository browser
    /// @ai:effects pure
    pub fn url(&self, links: &LinkFormat) -> String {
        links.url(&self.position)
    }
}

/// @ai:intent Renders source positions as URLs
///
/// The template understands `{root}`, `{path}`, `{line}` and `{column}`. Without
/// an explicit template, GitHub and GitLab roots link to the line on `master`;
/// any other root gets `{root}/{path}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkFormat {
    pub root: String,
    pub template: String,
}

impl LinkFormat {
    /// @ai:intent Create a formatter; a trailing `/` on the root is dropped
    /// @ai:example ("https://github.com/org/repo/", None) -> "{root}/blob/master/{path}#L{line}"
    /// @ai:effects pure
    pub fn new(root: &str, template: Option<&str>) -> Self {
        let root = root.strip_suffix('/').unwrap_or(root).to_string();
        let template = match template {
            Some(template) => template.to_string(),
            None if root.contains("github") || root.contains("gitlab") => HOSTED_TEMPLATE.to_string(),
            None => PLAIN_TEMPLATE.to_string(),
        };
        Self { root, template }
    }

    /// @ai:effects pure
    pub fn url(&self, position: &SourcePosition) -> String {
        self.template
            .replace("{root}", &self.root)
            .replace("{path}", &slash_path(&position.file))
            .replace("{line}", &position.line.to_string())
            .replace("{column}", &position.column.to_string())
    }
}

/// Root-relative path with `/` separators on every platform.
fn slash_path(path: &Path) -> String {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

impl Tree {
    /// @ai:intent Look up the node at an exact path
    pub fn node(&self, path: &AnnotationPath) -> Option<&TreeNode> {
        self.nodes.get(path)
    }

    /// @ai:intent Look up a node by its `A/B/C` spelling
    /// @ai:effects pure
    pub fn get(&self, path: &str) -> Option<&TreeNode> {
        let path = AnnotationPath::parse(path).ok()?;
        self.nodes.get(&path)
    }

    /// @ai:intent Children of a node, sorted by segment name
    /// @ai:post None if the path is not in the tree
    pub fn children(&self, path: &AnnotationPath) -> Option<Vec<&TreeNode>> {
        let node = self.nodes.get(path)?;
        Some(
            node.children
                .iter()
                .filter_map(|segment| self.nodes.get(&path.child(segment)))
                .collect(),
        )
    }

    /// @ai:intent Top-level nodes, sorted by segment name
    pub fn roots(&self) -> Vec<&TreeNode> {
        self.roots
            .iter()
            .filter_map(|segment| AnnotationPath::parse(segment).ok())
            .filter_map(|path| self.nodes.get(&path))
            .collect()
    }

    /// @ai:intent All nodes in depth-first pre-order with sorted children
    ///
    /// Path ordering already is pre-order, so this is the arena order.
    pub fn walk(&self) -> impl Iterator<Item = &TreeNode> {
        self.nodes.values()
    }

    /// @ai:intent All nodes satisfying a predicate, in walk order
    pub fn find<P>(&self, predicate: P) -> Vec<&TreeNode>
    where
        P: Fn(&TreeNode) -> bool,
    {
        self.walk().filter(|node| predicate(node)).collect()
    }

    /// @ai:intent All content-bearing nodes whose canonical content satisfies a predicate
    pub fn find_by_content<P>(&self, predicate: P) -> Vec<&TreeNode>
    where
        P: Fn(&Content) -> bool,
    {
        self.walk()
            .filter(|node| node.content.as_ref().is_some_and(&predicate))
            .collect()
    }

    /// @ai:intent Every occurrence of a node, sorted by file, then line
    /// @ai:post None if the path is not in the tree
    /// @ai:effects pure
    pub fn occurrences(&self, path: &AnnotationPath) -> Option<Vec<Occurrence>> {
        let node = self.nodes.get(path)?;

        let sites = |kind: OccurrenceKind, sites: &[crate::tree::Site]| {
            sites
                .iter()
                .map(move |site| Occurrence {
                    kind,
                    position: site.position.clone(),
                    bound_symbol: site.bound_symbol.clone(),
                })
                .collect::<Vec<_>>()
        };
        let positions = |kind: OccurrenceKind, positions: &[SourcePosition]| {
            positions
                .iter()
                .map(move |position| Occurrence {
                    kind,
                    position: position.clone(),
                    bound_symbol: None,
                })
                .collect::<Vec<_>>()
        };

        let mut all = sites(OccurrenceKind::Declaration, &node.declaration_sites);
        all.extend(sites(OccurrenceKind::Block, &node.block_sites));
        all.extend(positions(OccurrenceKind::Reference, &node.reference_sites));
        all.extend(positions(OccurrenceKind::Mention, &node.mention_sites));
        all.sort_by(|a, b| a.position.cmp(&b.position).then(a.kind.cmp(&b.kind)));

        Some(all)
    }

    /// @ai:intent Path an alias is bound to
    pub fn resolve_alias(&self, alias: &str) -> Option<&AnnotationPath> {
        self.aliases.get(alias)
    }

    pub fn aliases(&self) -> impl Iterator<Item = (&str, &AnnotationPath)> {
        self.aliases.iter().map(|(alias, path)| (alias.as_str(), path))
    }

    /// @ai:intent Check whether any node strictly below `path` carries content
    pub fn has_content_below(&self, path: &AnnotationPath) -> bool {
        self.nodes
            .range(path.clone()..)
            .skip(1)
            .take_while(|(candidate, _)| path.is_ancestor_of(candidate))
            .any(|(_, node)| node.content.is_some())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{Annotation, Payload};
    use crate::tree::build_tree;

    fn sample() -> Tree {
        let annotations = vec![
            Annotation {
                path: "Domain/Accumulator".parse().unwrap(),
                position: SourcePosition::new("test.go", 3, 1),
                payload: Payload::Declaration {
                    title: Some("Collects stuff".to_string()),
                    bound_symbol: Some("Accumulator".to_string()),
                    mentions: Vec::new(),
                },
            },
            Annotation {
                path: "Domain/Accumulator/Invariants".parse().unwrap(),
                position: SourcePosition::new("domain.go", 10, 5),
                payload: Payload::Block {
                    body: Some("Grows.".to_string()),
                    alias: Some("Domain rules".to_string()),
                    title: None,
                    mentions: Vec::new(),
                    collected: true,
                },
            },
            Annotation {
                path: "Domain/Accumulator/Invariants".parse().unwrap(),
                position: SourcePosition::new("app.go", 12, 45),
                payload: Payload::Reference,
            },
            Annotation {
                path: "Application".parse().unwrap(),
                position: SourcePosition::new("app.go", 4, 5),
                payload: Payload::Block {
                    body: Some("Uses @[Domain/Accumulator/Invariants].".to_string()),
                    alias: None,
                    title: None,
                    mentions: vec!["Domain/Accumulator/Invariants".parse().unwrap()],
                    collected: true,
                },
            },
        ];
        build_tree(&annotations).0
    }

    #[test]
    fn test_get_and_children() {
        let tree = sample();
        let domain: AnnotationPath = "Domain".parse().unwrap();

        assert!(tree.get("Domain/Accumulator").is_some());
        assert!(tree.get("Domain//Accumulator").is_none());
        assert!(tree.get("Missing").is_none());

        let children = tree.children(&domain).unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].path.to_string(), "Domain/Accumulator");
        assert!(tree.children(&"Nope".parse().unwrap()).is_none());
    }

    #[test]
    fn test_roots_and_walk_order() {
        let tree = sample();
        let roots: Vec<String> = tree.roots().iter().map(|n| n.path.to_string()).collect();
        assert_eq!(roots, vec!["Application", "Domain"]);

        let walked: Vec<String> = tree.walk().map(|n| n.path.to_string()).collect();
        assert_eq!(
            walked,
            vec![
                "Application",
                "Domain",
                "Domain/Accumulator",
                "Domain/Accumulator/Invariants"
            ]
        );
    }

    #[test]
    fn test_find_by_content() {
        let tree = sample();
        let aliased = tree.find_by_content(|c| c.alias.is_some());
        assert_eq!(aliased.len(), 1);
        assert_eq!(aliased[0].path.to_string(), "Domain/Accumulator/Invariants");

        let structural = tree.find(|n| n.is_structural());
        assert_eq!(structural.len(), 1);
        assert_eq!(structural[0].path.to_string(), "Domain");
    }

    #[test]
    fn test_occurrences_are_sorted_by_file_then_line() {
        let tree = sample();
        let occurrences = tree
            .occurrences(&"Domain/Accumulator/Invariants".parse().unwrap())
            .unwrap();

        let summary: Vec<(OccurrenceKind, String, usize)> = occurrences
            .iter()
            .map(|o| (o.kind, o.position.file.display().to_string(), o.position.line))
            .collect();
        assert_eq!(
            summary,
            vec![
                (OccurrenceKind::Mention, "app.go".to_string(), 4),
                (OccurrenceKind::Reference, "app.go".to_string(), 12),
                (OccurrenceKind::Block, "domain.go".to_string(), 10),
            ]
        );
    }

    #[test]
    fn test_alias_resolution_and_content_below() {
        let tree = sample();
        assert_eq!(
            tree.resolve_alias("Domain rules").map(|p| p.to_string()),
            Some("Domain/Accumulator/Invariants".to_string())
        );
        assert!(tree.resolve_alias("Unknown").is_none());

        assert!(tree.has_content_below(&"Domain".parse().unwrap()));
        assert!(!tree.has_content_below(&"Application".parse().unwrap()));
    }

    #[test]
    fn test_hosted_root_links_to_line() {
        let links = LinkFormat::new("https://github.com/acme/annotree/", None);
        let position = SourcePosition::new("pkg/domain.go", 10, 5);

        assert_eq!(links.root, "https://github.com/acme/annotree");
        assert_eq!(
            links.url(&position),
            "https://github.com/acme/annotree/blob/master/pkg/domain.go#L10"
        );

        let gitlab = LinkFormat::new("https://gitlab.example.org/acme/annotree", None);
        assert_eq!(
            gitlab.url(&position),
            "https://gitlab.example.org/acme/annotree/blob/master/pkg/domain.go#L10"
        );
    }

    #[test]
    fn test_plain_root_and_custom_template() {
        let position = SourcePosition::new("./src/app.go", 4, 5);

        let plain = LinkFormat::new("file:///srv/code", None);
        assert_eq!(plain.url(&position), "file:///srv/code/src/app.go");

        let custom = LinkFormat::new("https://git.example.org/acme", Some("{root}/tree/main/{path}?line={line}&col={column}"));
        assert_eq!(
            custom.url(&position),
            "https://git.example.org/acme/tree/main/src/app.go?line=4&col=5"
        );
    }

    #[test]
    fn test_occurrence_urls() {
        let tree = sample();
        let links = LinkFormat::new("https://github.com/acme/demo", None);
        let urls: Vec<String> = tree
            .occurrences(&"Domain/Accumulator/Invariants".parse().unwrap())
            .unwrap()
            .iter()
            .map(|o| o.url(&links))
            .collect();

        assert_eq!(
            urls,
            vec![
                "https://github.com/acme/demo/blob/master/app.go#L4",
                "https://github.com/acme/demo/blob/master/app.go#L12",
                "https://github.com/acme/demo/blob/master/domain.go#L10",
            ]
        );
    }
}
