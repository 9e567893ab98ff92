//! Variant model - the scanned view of every node that owns variant sets
//!
//! Rebuilt from scratch on every scan; never persisted and never patched
//! in place. Node order is the depth-first order the host reported.

pub mod tree;

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VariantError};

pub use tree::{VariantTree, VariantTreeItem};

/// The atomic unit that gets switched or captured
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VariantSelection {
    pub node_path: String,
    pub set_name: String,
    pub variant_name: String,
}

impl VariantSelection {
    pub fn new(
        node_path: impl Into<String>,
        set_name: impl Into<String>,
        variant_name: impl Into<String>,
    ) -> Self {
        Self {
            node_path: node_path.into(),
            set_name: set_name.into(),
            variant_name: variant_name.into(),
        }
    }
}

/// Formats as the cache key `path|set|variant`
impl fmt::Display for VariantSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.node_path, self.set_name, self.variant_name)
    }
}

/// A named, closed list of mutually exclusive variants on one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantSet {
    pub name: String,
    /// Variant names in declaration order
    pub variants: Vec<String>,
    /// Currently authored selection, if any
    pub selection: Option<String>,
}

impl VariantSet {
    pub fn new(name: &str, variants: &[&str], selection: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            variants: variants.iter().map(|v| v.to_string()).collect(),
            selection: selection.map(str::to_string),
        }
    }

    pub fn contains(&self, variant: &str) -> bool {
        self.variants.iter().any(|v| v == variant)
    }
}

/// A scene graph node carrying at least one variant set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub path: String,
    /// Child paths in host order (read-only view)
    pub children: Vec<String>,
    pub variant_sets: Vec<VariantSet>,
}

impl GraphNode {
    pub fn variant_set(&self, name: &str) -> Option<&VariantSet> {
        self.variant_sets.iter().find(|set| set.name == name)
    }

    /// Last path component, `/` for the pseudo-root
    pub fn name(&self) -> &str {
        self.path.rsplit('/').find(|part| !part.is_empty()).unwrap_or("/")
    }

    pub fn variant_set_names(&self) -> Vec<&str> {
        self.variant_sets.iter().map(|set| set.name.as_str()).collect()
    }

    /// Total number of variants across all sets
    pub fn variant_count(&self) -> usize {
        self.variant_sets.iter().map(|set| set.variants.len()).sum()
    }
}

/// Flat, ordered model of one scan
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct VariantModel {
    root: String,
    nodes: Vec<GraphNode>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl VariantModel {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            nodes: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Append a node in traversal order
    ///
    /// Paths are unique in the host graph, so a repeated path replaces the
    /// earlier entry instead of duplicating it.
    pub fn push(&mut self, node: GraphNode) {
        if let Some(&slot) = self.index.get(&node.path) {
            self.nodes[slot] = node;
            return;
        }
        self.index.insert(node.path.clone(), self.nodes.len());
        self.nodes.push(node);
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&GraphNode> {
        self.index.get(path).map(|&slot| &self.nodes[slot])
    }

    pub fn contains(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    /// Fetch a node or fail with `NotFound`
    pub fn node(&self, path: &str) -> Result<&GraphNode> {
        self.get(path)
            .ok_or_else(|| VariantError::NotFound(path.to_string()))
    }

    /// Check that the model offers `variant` in `set` on `node`
    ///
    /// A node the model does not know is an invalid selection too: the panel
    /// offered something the last scan never saw.
    pub fn validate_selection(&self, selection: &VariantSelection) -> Result<&VariantSet> {
        self.get(&selection.node_path)
            .and_then(|node| node.variant_set(&selection.set_name))
            .filter(|set| set.contains(&selection.variant_name))
            .ok_or_else(|| VariantError::InvalidSelection {
                node: selection.node_path.clone(),
                set: selection.set_name.clone(),
                variant: selection.variant_name.clone(),
            })
    }

    /// Every variant of every set on `path`: sets in model order, variants in
    /// declaration order
    pub fn preview_queue(&self, path: &str) -> Result<Vec<VariantSelection>> {
        let node = self.node(path)?;
        Ok(node
            .variant_sets
            .iter()
            .flat_map(|set| {
                set.variants
                    .iter()
                    .map(move |variant| VariantSelection::new(&node.path, &set.name, variant))
            })
            .collect())
    }

    /// Plain-text summary of one node, suitable for the clipboard
    pub fn describe_node(&self, path: &str) -> Result<String> {
        let node = self.node(path)?;
        let mut lines = vec![format!("Prim Path: {}", node.path), String::new()];
        lines.push("=== Variant Sets ===".to_string());
        for set in &node.variant_sets {
            lines.push(format!(
                "  {}: {}",
                set.name,
                set.selection.as_deref().unwrap_or("(none)")
            ));
            lines.push(format!("    Options: {}", set.variants.join(", ")));
        }
        Ok(lines.join("\n"))
    }

    /// Build the hierarchical view used by the panel's tree
    pub fn tree(&self) -> VariantTree {
        VariantTree::build(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn table_node() -> GraphNode {
        GraphNode {
            path: "/Kitchen/table".to_string(),
            children: vec![],
            variant_sets: vec![
                VariantSet {
                    name: "materials".to_string(),
                    variants: vec!["wood".into(), "metal".into(), "glass".into()],
                    selection: Some("wood".to_string()),
                },
                VariantSet {
                    name: "size".to_string(),
                    variants: vec!["small".into(), "large".into()],
                    selection: None,
                },
            ],
        }
    }

    #[test]
    fn test_selection_display_is_cache_key() {
        let selection = VariantSelection::new("/table", "materials", "wood");
        assert_eq!(selection.to_string(), "/table|materials|wood");
    }

    #[test]
    fn test_validate_selection() {
        let mut model = VariantModel::new("/");
        model.push(table_node());

        assert!(model
            .validate_selection(&VariantSelection::new("/Kitchen/table", "materials", "glass"))
            .is_ok());
        assert!(matches!(
            model.validate_selection(&VariantSelection::new("/Kitchen/table", "materials", "gold")),
            Err(VariantError::InvalidSelection { .. })
        ));
        assert!(matches!(
            model.validate_selection(&VariantSelection::new("/Kitchen/table", "colour", "red")),
            Err(VariantError::InvalidSelection { .. })
        ));
        assert!(matches!(
            model.validate_selection(&VariantSelection::new("/Kitchen/chair", "materials", "wood")),
            Err(VariantError::InvalidSelection { ref node, .. }) if node == "/Kitchen/chair"
        ));
    }

    #[test]
    fn test_preview_queue_order() {
        let mut model = VariantModel::new("/");
        model.push(table_node());

        let queue: Vec<String> = model
            .preview_queue("/Kitchen/table")
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            queue,
            vec![
                "/Kitchen/table|materials|wood",
                "/Kitchen/table|materials|metal",
                "/Kitchen/table|materials|glass",
                "/Kitchen/table|size|small",
                "/Kitchen/table|size|large",
            ]
        );
    }

    #[test]
    fn test_describe_node() {
        let mut model = VariantModel::new("/");
        model.push(table_node());

        let text = model.describe_node("/Kitchen/table").unwrap();
        assert!(text.starts_with("Prim Path: /Kitchen/table"));
        assert!(text.contains("  materials: wood"));
        assert!(text.contains("  size: (none)"));
        assert!(text.contains("    Options: small, large"));
    }

    #[test]
    fn test_node_name() {
        assert_eq!(table_node().name(), "table");
    }
}
