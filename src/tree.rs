//! @ai:module:intent Fold annotations from every file into one deduplicated tree
//! @ai:module:layer domain
//! @ai:module:public_api build_tree, Tree, TreeNode, Site, Conflict, MergeIssue, MergeConflict, AliasCollision
//! @ai:module:depends_on annotation
//! @ai:module:stateless true
//!
//! Nodes live in an arena keyed by path; children are stored as segment names,
//! so the structure has no parent pointers and serializes as-is.

use crate::annotation::{Annotation, AnnotationKind, AnnotationPath, Content, Payload, SourcePosition};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// @ai:intent One occurrence whose content matched the canonical content
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Site {
    pub position: SourcePosition,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bound_symbol: Option<String>,
}

/// @ai:intent An occurrence whose content diverged from the canonical content
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conflict {
    pub kind: AnnotationKind,
    pub position: SourcePosition,
    pub content: Content,
}

/// @ai:intent A node of the knowledge tree, one per distinct path or path prefix
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TreeNode {
    pub path: AnnotationPath,
    /// Segment names of the children, sorted.
    pub children: BTreeSet<String>,
    /// Merged canonical content; None for structural nodes.
    pub content: Option<Content>,
    pub declaration_sites: Vec<Site>,
    pub block_sites: Vec<Site>,
    pub reference_sites: Vec<SourcePosition>,
    /// Positions of Block annotations whose prose links to this node.
    pub mention_sites: Vec<SourcePosition>,
    pub conflicts: Vec<Conflict>,
}

impl TreeNode {
    fn structural(path: AnnotationPath) -> Self {
        Self {
            path,
            children: BTreeSet::new(),
            content: None,
            declaration_sites: Vec::new(),
            block_sites: Vec::new(),
            reference_sites: Vec::new(),
            mention_sites: Vec::new(),
            conflicts: Vec::new(),
        }
    }

    /// @ai:intent Check whether the node only exists as an ancestor or link target
    pub fn is_structural(&self) -> bool {
        self.content.is_none()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

/// @ai:intent The immutable result of the merge, safe to share across readers
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tree {
    pub(crate) nodes: BTreeMap<AnnotationPath, TreeNode>,
    /// Segment names of the top-level nodes.
    pub(crate) roots: BTreeSet<String>,
    pub(crate) aliases: BTreeMap<String, AnnotationPath>,
}

/// @ai:intent Divergent content at a path, one per divergent occurrence
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MergeConflict {
    pub path: AnnotationPath,
    pub kind: AnnotationKind,
    pub canonical: Content,
    pub canonical_position: SourcePosition,
    pub divergent: Content,
    pub position: SourcePosition,
}

/// @ai:intent A second path claiming an alias already bound elsewhere
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AliasCollision {
    pub alias: String,
    pub bound_path: AnnotationPath,
    pub bound_position: SourcePosition,
    pub claimed_path: AnnotationPath,
    pub position: SourcePosition,
}

/// @ai:intent Bookkeeping findings produced while folding
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MergeIssue {
    Conflict(MergeConflict),
    AliasCollision(AliasCollision),
}

/// @ai:intent Build the tree from the complete annotation set of a run
/// @ai:pre annotations come from every file (input order does not matter)
/// @ai:post the same set always yields an identical tree and issue list
/// @ai:effects pure
pub fn build_tree(annotations: &[Annotation]) -> (Tree, Vec<MergeIssue>) {
    let mut sorted: Vec<&Annotation> = annotations.iter().collect();
    sorted.sort_by(|a, b| {
        a.path
            .cmp(&b.path)
            .then_with(|| a.position.cmp(&b.position))
            .then_with(|| a.kind().cmp(&b.kind()))
            .then_with(|| a.content().cmp(&b.content()))
    });

    let mut builder = TreeBuilder::default();

    for group in sorted.chunk_by(|a, b| a.path == b.path) {
        builder.fold_path(group);
    }

    builder.record_mentions(&sorted);
    builder.bind_aliases();

    let TreeBuilder { tree, issues, .. } = builder;
    (tree, issues)
}

#[derive(Default)]
struct TreeBuilder {
    tree: Tree,
    issues: Vec<MergeIssue>,
    /// Where each node's alias was written, for ordering alias claims.
    alias_sources: BTreeMap<AnnotationPath, SourcePosition>,
}

impl TreeBuilder {
    /// @ai:intent Create the node at `path` and every missing ancestor
    fn ensure(&mut self, path: &AnnotationPath) -> &mut TreeNode {
        if !self.tree.nodes.contains_key(path) {
            self.tree.roots.insert(path.segments()[0].clone());

            for ancestor in path.ancestors().chain(std::iter::once(path.clone())) {
                if let Some(parent) = ancestor.parent() {
                    if let Some(parent_node) = self.tree.nodes.get_mut(&parent) {
                        parent_node.children.insert(ancestor.name().to_string());
                    }
                }
                self.tree
                    .nodes
                    .entry(ancestor.clone())
                    .or_insert_with(|| TreeNode::structural(ancestor));
            }
        }

        self.tree
            .nodes
            .entry(path.clone())
            .or_insert_with(|| TreeNode::structural(path.clone()))
    }

    /// @ai:intent Merge all annotations sharing one path
    /// @ai:pre group is non-empty, sorted by position
    fn fold_path(&mut self, group: &[&Annotation]) {
        let path = group[0].path.clone();

        let declarations: Vec<&Annotation> = group
            .iter()
            .copied()
            .filter(|a| a.kind() == AnnotationKind::Declaration)
            .collect();
        let (blocks, uncollected): (Vec<&Annotation>, Vec<&Annotation>) = group
            .iter()
            .copied()
            .filter(|a| a.kind() == AnnotationKind::Block)
            .partition(|a| a.is_collected());

        let mut declaration_sites = Vec::new();
        let mut block_sites = Vec::new();
        let mut conflicts = Vec::new();

        // Untitled declarations only mark the symbol; they never disagree with a title.
        let canonical_declaration = declarations.iter().find(|a| a.title().is_some()).copied();
        let canonical_title = canonical_declaration.and_then(|a| a.content());
        for annotation in &declarations {
            let content = annotation.content().unwrap_or_default();
            match (canonical_declaration, &canonical_title) {
                (Some(canonical), Some(expected)) if content.title.is_some() && &content != expected => {
                    conflicts.push(self.conflict(&path, canonical, expected, annotation, content));
                }
                _ => declaration_sites.push(Site {
                    position: annotation.position.clone(),
                    bound_symbol: annotation.bound_symbol().map(str::to_string),
                }),
            }
        }

        let canonical_block = blocks.first().copied();
        let canonical_body = canonical_block.and_then(|a| a.content());
        for annotation in &blocks {
            let content = annotation.content().unwrap_or_default();
            match (canonical_block, &canonical_body) {
                (Some(canonical), Some(expected)) if &content != expected => {
                    conflicts.push(self.conflict(&path, canonical, expected, annotation, content));
                }
                _ => block_sites.push(Site {
                    position: annotation.position.clone(),
                    bound_symbol: None,
                }),
            }
        }

        // Uncollected blocks only fill in attributes the collected ones leave unset.
        let lent: Vec<(Content, &SourcePosition)> = uncollected
            .iter()
            .filter_map(|a| Some((a.content()?, &a.position)))
            .collect();
        let lent_title = lent.iter().find_map(|(c, _)| c.title.clone());
        let lent_alias = lent
            .iter()
            .find_map(|(c, position)| Some((c.alias.clone()?, (*position).clone())));

        let block = canonical_body.unwrap_or_default();
        let title = canonical_title
            .and_then(|c| c.title)
            .or(block.title)
            .or(lent_title);
        let alias = match (block.alias, canonical_block) {
            (Some(alias), Some(canonical)) => Some((alias, canonical.position.clone())),
            _ => lent_alias,
        };

        let has_sites = !declaration_sites.is_empty() || !block_sites.is_empty();
        let content = (has_sites || title.is_some() || alias.is_some()).then(|| Content {
            title,
            body: block.body,
            alias: alias.as_ref().map(|(alias, _)| alias.clone()),
        });
        if let Some((_, position)) = alias {
            self.alias_sources.insert(path.clone(), position);
        }

        let reference_sites: Vec<SourcePosition> = group
            .iter()
            .filter(|a| matches!(a.payload, Payload::Reference))
            .map(|a| a.position.clone())
            .collect();

        let node = self.ensure(&path);
        node.content = content;
        node.declaration_sites = declaration_sites;
        node.block_sites = block_sites;
        node.reference_sites = reference_sites;
        node.conflicts = conflicts;
    }

    fn conflict(
        &mut self,
        path: &AnnotationPath,
        canonical: &Annotation,
        expected: &Content,
        divergent: &Annotation,
        content: Content,
    ) -> Conflict {
        self.issues.push(MergeIssue::Conflict(MergeConflict {
            path: path.clone(),
            kind: divergent.kind(),
            canonical: expected.clone(),
            canonical_position: canonical.position.clone(),
            divergent: content.clone(),
            position: divergent.position.clone(),
        }));

        Conflict {
            kind: divergent.kind(),
            position: divergent.position.clone(),
            content,
        }
    }

    /// @ai:intent Attach prose links to their target nodes
    fn record_mentions(&mut self, sorted: &[&Annotation]) {
        for annotation in sorted {
            for target in annotation.mentions() {
                self.ensure(target)
                    .mention_sites
                    .push(annotation.position.clone());
            }
        }

        for node in self.tree.nodes.values_mut() {
            node.mention_sites.sort();
            node.mention_sites.dedup();
        }
    }

    /// @ai:intent Bind each alias to the earliest claiming path; later claims collide
    fn bind_aliases(&mut self) {
        let mut claims: Vec<(SourcePosition, AnnotationPath, String)> = self
            .tree
            .nodes
            .values()
            .filter_map(|node| {
                let alias = node.content.as_ref()?.alias.clone()?;
                let position = self.alias_sources.get(&node.path)?;
                Some((position.clone(), node.path.clone(), alias))
            })
            .collect();
        claims.sort();

        let mut bound: BTreeMap<String, (AnnotationPath, SourcePosition)> = BTreeMap::new();

        for (position, path, alias) in claims {
            match bound.get(&alias) {
                Some((bound_path, bound_position)) => {
                    self.issues.push(MergeIssue::AliasCollision(AliasCollision {
                        alias,
                        bound_path: bound_path.clone(),
                        bound_position: bound_position.clone(),
                        claimed_path: path.clone(),
                        position,
                    }));

                    if let Some(content) = self
                        .tree
                        .nodes
                        .get_mut(&path)
                        .and_then(|node| node.content.as_mut())
                    {
                        content.alias = None;
                    }
                }
                None => {
                    bound.insert(alias, (path, position));
                }
            }
        }

        self.tree.aliases = bound
            .into_iter()
            .map(|(alias, (path, _))| (alias, path))
            .collect();
    }
}
