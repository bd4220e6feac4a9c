//! Turn-scoped citation accumulator.

use std::collections::HashMap;

use docsage_core::document::SourceNode;

/// Citations gathered across every tool call of a turn, keyed by chunk
/// fingerprint. A fingerprint seen twice keeps its higher score.
#[derive(Debug, Default, Clone)]
pub struct CitationSet {
    nodes: HashMap<String, SourceNode>,
}

impl CitationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, node: SourceNode) {
        match self.nodes.get_mut(&node.id) {
            Some(existing) if existing.score >= node.score => {}
            Some(existing) => *existing = node,
            None => {
                self.nodes.insert(node.id.clone(), node);
            }
        }
    }

    pub fn extend(&mut self, nodes: impl IntoIterator<Item = SourceNode>) {
        for node in nodes {
            self.add(node);
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Distinct `doc_id`s behind the citations, sorted.
    pub fn doc_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .nodes
            .values()
            .filter_map(|n| n.doc_id().map(str::to_string))
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Nodes by descending score, ties broken by fingerprint.
    pub fn into_sorted(self) -> Vec<SourceNode> {
        let mut nodes: Vec<SourceNode> = self.nodes.into_values().collect();
        nodes.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        nodes
    }
}
