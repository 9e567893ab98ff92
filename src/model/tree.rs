//! Hierarchical view over a flat [`VariantModel`]
//!
//! Nodes with variant sets become leaves (or branches, when nested variant
//! nodes live below them). Path components without variant sets are
//! inserted as intermediate items so the tree mirrors the scene hierarchy.
//! A pseudo-root carrying variant sets is listed first, as a row of its own.

use serde::Serialize;

use super::VariantModel;

/// One row of the variant tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariantTreeItem {
    /// Last path component
    pub name: String,
    /// Absolute path of this item
    pub path: String,
    /// Variant set names; empty for intermediate items
    pub variant_sets: Vec<String>,
    pub children: Vec<VariantTreeItem>,
}

impl VariantTreeItem {
    fn intermediate(name: &str, path: String) -> Self {
        Self {
            name: name.to_string(),
            path,
            variant_sets: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Whether this item is a scanned node rather than a path component
    pub fn has_variants(&self) -> bool {
        !self.variant_sets.is_empty()
    }

    /// Display label, e.g. `table  (2)` for variant nodes
    pub fn label(&self) -> String {
        if self.has_variants() {
            format!("{}  ({})", self.name, self.variant_sets.len())
        } else {
            self.name.clone()
        }
    }

    fn matches(&self, needle: &str) -> bool {
        if self.has_variants() {
            self.path.to_lowercase().contains(needle)
                || self
                    .variant_sets
                    .iter()
                    .any(|set| set.to_lowercase().contains(needle))
        } else {
            self.name.to_lowercase().contains(needle)
        }
    }

    /// Keep this item when it or a descendant matches
    fn filtered(&self, needle: &str) -> Option<Self> {
        let children: Vec<Self> = self
            .children
            .iter()
            .filter_map(|child| child.filtered(needle))
            .collect();

        if self.matches(needle) || !children.is_empty() {
            Some(Self {
                children,
                ..self.clone()
            })
        } else {
            None
        }
    }

    fn count(&self) -> usize {
        1 + self.children.iter().map(Self::count).sum::<usize>()
    }
}

/// Hierarchy of variant-carrying nodes
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct VariantTree {
    pub roots: Vec<VariantTreeItem>,
}

impl VariantTree {
    /// Build from a model, keeping model (traversal) order among siblings
    pub fn build(model: &VariantModel) -> Self {
        let mut roots = Vec::new();

        for node in model.nodes() {
            let set_names = || -> Vec<String> {
                node.variant_set_names()
                    .into_iter()
                    .map(str::to_string)
                    .collect()
            };

            let parts: Vec<&str> = node.path.split('/').filter(|p| !p.is_empty()).collect();
            if parts.is_empty() {
                // The pseudo-root gets its own top-level row
                let mut item = VariantTreeItem::intermediate("/", "/".to_string());
                item.variant_sets = set_names();
                roots.insert(0, item);
                continue;
            }

            let mut level = &mut roots;
            let mut current_path = String::new();
            for (i, part) in parts.iter().enumerate() {
                current_path.push('/');
                current_path.push_str(part);

                let slot = match level.iter().position(|item: &VariantTreeItem| item.path == current_path) {
                    Some(slot) => slot,
                    None => {
                        level.push(VariantTreeItem::intermediate(part, current_path.clone()));
                        level.len() - 1
                    }
                };

                if i == parts.len() - 1 {
                    level[slot].variant_sets = set_names();
                }
                level = &mut level[slot].children;
            }
        }

        Self { roots }
    }

    /// Case-insensitive filter over paths and variant set names
    ///
    /// Ancestors of a match stay visible; non-matching children of a match
    /// are hidden. An empty filter returns the whole tree.
    pub fn filter(&self, text: &str) -> Self {
        let needle = text.trim().to_lowercase();
        if needle.is_empty() {
            return self.clone();
        }
        Self {
            roots: self
                .roots
                .iter()
                .filter_map(|item| item.filtered(&needle))
                .collect(),
        }
    }

    /// Total number of items, intermediates included
    pub fn len(&self) -> usize {
        self.roots.iter().map(VariantTreeItem::count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Find an item by absolute path
    pub fn find(&self, path: &str) -> Option<&VariantTreeItem> {
        fn walk<'a>(items: &'a [VariantTreeItem], path: &str) -> Option<&'a VariantTreeItem> {
            items.iter().find_map(|item| {
                if item.path == path {
                    Some(item)
                } else if path.starts_with(&format!("{}/", item.path)) {
                    walk(&item.children, path)
                } else {
                    None
                }
            })
        }
        walk(&self.roots, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GraphNode, VariantSet};

    fn node(path: &str, sets: &[&str]) -> GraphNode {
        GraphNode {
            path: path.to_string(),
            children: vec![],
            variant_sets: sets
                .iter()
                .map(|name| VariantSet {
                    name: name.to_string(),
                    variants: vec!["a".into()],
                    selection: None,
                })
                .collect(),
        }
    }

    fn kitchen_model() -> VariantModel {
        let mut model = VariantModel::new("/");
        model.push(node("/Kitchen/assets/Ball", &["modelingVariant"]));
        model.push(node("/Kitchen/assets/Table", &["materials", "size"]));
        model.push(node("/Kitchen/assets/Table/Drawer", &["handle"]));
        model.push(node("/Garage/Car", &["shade"]));
        model
    }

    #[test]
    fn test_build_inserts_intermediates() {
        let tree = kitchen_model().tree();

        assert_eq!(tree.roots.len(), 2);
        assert_eq!(tree.roots[0].path, "/Kitchen");
        assert!(!tree.roots[0].has_variants());

        let assets = &tree.roots[0].children[0];
        assert_eq!(assets.path, "/Kitchen/assets");
        let names: Vec<&str> = assets.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Ball", "Table"]);

        let table = tree.find("/Kitchen/assets/Table").unwrap();
        assert_eq!(table.label(), "Table  (2)");
        assert_eq!(table.children[0].path, "/Kitchen/assets/Table/Drawer");
        // Kitchen, assets, Ball, Table, Drawer, Garage, Car
        assert_eq!(tree.len(), 7);
    }

    #[test]
    fn test_filter_keeps_ancestors() {
        let tree = kitchen_model().tree();
        let filtered = tree.filter("HANDLE");

        assert_eq!(filtered.roots.len(), 1);
        let drawer = filtered.find("/Kitchen/assets/Table/Drawer").unwrap();
        assert!(drawer.has_variants());
        // Ball does not match and has no matching descendants
        assert!(filtered.find("/Kitchen/assets/Ball").is_none());
    }

    #[test]
    fn test_filter_hides_non_matching_children() {
        let tree = kitchen_model().tree();
        let filtered = tree.filter("size");

        let table = filtered.find("/Kitchen/assets/Table").unwrap();
        assert!(table.children.is_empty());
    }

    #[test]
    fn test_pseudo_root_with_variants_is_listed() {
        let mut model = VariantModel::new("/");
        model.push(node("/", &["lighting"]));
        for kitchen_node in kitchen_model().nodes() {
            model.push(kitchen_node.clone());
        }
        let tree = model.tree();

        assert_eq!(tree.roots.len(), 3);
        let root = tree.find("/").unwrap();
        assert_eq!(root.label(), "/  (1)");
        assert!(root.children.is_empty());
        assert!(tree.find("/Garage/Car").is_some());
        assert_eq!(tree.len(), 8);

        let filtered = tree.filter("lighting");
        assert_eq!(filtered.roots.len(), 1);
        assert_eq!(filtered.roots[0].path, "/");
    }

    #[test]
    fn test_empty_filter_returns_everything() {
        let tree = kitchen_model().tree();
        assert_eq!(tree.filter("  "), tree);
    }
}
