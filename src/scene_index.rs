//! Scene indexer
//!
//! Walks the composed host graph below a root path and collects every node
//! that owns at least one non-empty variant set. A scan is a full re-walk;
//! nothing is cached between scans.

use std::collections::HashSet;

use log::{debug, info};

use crate::constants::node::PATH_SEPARATOR;
use crate::error::{Result, VariantError};
use crate::host::{HostAdapter, NodeHandle};
use crate::model::{GraphNode, VariantModel, VariantSet};

/// Read-only scanner over a [`HostAdapter`]
pub struct SceneIndex;

impl SceneIndex {
    /// Scan the subtree rooted at `root_path`
    ///
    /// Depth-first, pre-order, children in the order the host reports them,
    /// so an unchanged graph always yields an identical model. Override nodes
    /// are skipped together with anything below them.
    pub fn scan<H: HostAdapter + ?Sized>(host: &H, root_path: &str) -> Result<VariantModel> {
        let root_path = normalize_path(root_path)
            .ok_or_else(|| VariantError::NotFound(root_path.to_string()))?;
        let root = host
            .resolve(&root_path)
            .ok_or_else(|| VariantError::NotFound(root_path.clone()))?;

        let mut model = VariantModel::new(root_path.clone());
        let mut visited: HashSet<NodeHandle> = HashSet::new();
        let mut stack = vec![root];
        let mut visited_count = 0usize;

        while let Some(handle) = stack.pop() {
            if !visited.insert(handle) {
                continue;
            }
            let Some(info) = host.node_info(handle) else {
                // Vanished mid-scan; the next scan will not see it either
                continue;
            };
            if info.override_tag.is_some() {
                continue;
            }
            visited_count += 1;

            let children: Vec<NodeHandle> = host
                .list_children(handle)
                .into_iter()
                .filter(|child| {
                    host.node_info(*child)
                        .map(|c| c.override_tag.is_none())
                        .unwrap_or(false)
                })
                .collect();

            let variant_sets = clean_variant_sets(&info.path, host.list_variant_sets(handle));
            if !variant_sets.is_empty() {
                let child_paths = children
                    .iter()
                    .filter_map(|child| host.node_info(*child).map(|c| c.path))
                    .collect();
                model.push(GraphNode {
                    path: info.path,
                    children: child_paths,
                    variant_sets,
                });
            }

            // Reverse so the first child is visited first
            stack.extend(children.into_iter().rev());
        }

        info!(
            "Scanned {} nodes under {}: {} with variant sets",
            visited_count,
            root_path,
            model.len()
        );
        Ok(model)
    }
}

/// Trim trailing separators; `None` for relative or empty paths
fn normalize_path(path: &str) -> Option<String> {
    let path = path.trim();
    if !path.starts_with(PATH_SEPARATOR) {
        return None;
    }
    let trimmed = path.trim_end_matches(PATH_SEPARATOR);
    if trimmed.is_empty() {
        Some(PATH_SEPARATOR.to_string())
    } else {
        Some(trimmed.to_string())
    }
}

/// Drop empty sets and repeated set or variant names (first one wins)
fn clean_variant_sets(path: &str, sets: Vec<VariantSet>) -> Vec<VariantSet> {
    let mut seen_sets = HashSet::new();
    let mut cleaned = Vec::with_capacity(sets.len());

    for mut set in sets {
        if !seen_sets.insert(set.name.clone()) {
            debug!("{}: ignoring repeated variant set '{}'", path, set.name);
            continue;
        }
        let mut seen_variants = HashSet::new();
        set.variants.retain(|v| seen_variants.insert(v.clone()));
        if set.variants.is_empty() {
            debug!("{}: skipping empty variant set '{}'", path, set.name);
            continue;
        }
        cleaned.push(set);
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{MemoryHost, OverrideTag};
    use crate::model::VariantSelection;

    fn kitchen_host() -> MemoryHost {
        let mut host = MemoryHost::new();
        host.add_node("/Kitchen", vec![]).unwrap();
        host.add_node(
            "/Kitchen/table",
            vec![
                VariantSet::new("materials", &["wood", "metal", "glass"], Some("wood")),
                VariantSet::new("empty", &[], None),
            ],
        )
        .unwrap();
        host.add_node("/Kitchen/table/leg", vec![]).unwrap();
        host.add_node(
            "/Kitchen/chair",
            vec![VariantSet::new("style", &["modern", "classic"], None)],
        )
        .unwrap();
        host.add_node(
            "/Garage",
            vec![VariantSet::new("lighting", &["day", "night"], Some("day"))],
        )
        .unwrap();
        host
    }

    #[test]
    fn test_scan_collects_variant_nodes_in_traversal_order() {
        let host = kitchen_host();
        let model = SceneIndex::scan(&host, "/").unwrap();

        let paths: Vec<&str> = model.nodes().iter().map(|n| n.path.as_str()).collect();
        assert_eq!(paths, vec!["/Kitchen/table", "/Kitchen/chair", "/Garage"]);

        let table = model.get("/Kitchen/table").unwrap();
        assert_eq!(table.variant_set_names(), vec!["materials"]);
        assert_eq!(table.children, vec!["/Kitchen/table/leg".to_string()]);
    }

    #[test]
    fn test_scan_is_deterministic() {
        let host = kitchen_host();
        let first = SceneIndex::scan(&host, "/").unwrap();
        let second = SceneIndex::scan(&host, "/").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_scan_subtree_and_trailing_slash() {
        let host = kitchen_host();
        let model = SceneIndex::scan(&host, "/Kitchen/").unwrap();
        assert_eq!(model.root(), "/Kitchen");
        assert_eq!(model.len(), 2);
        assert!(!model.contains("/Garage"));
    }

    #[test]
    fn test_scan_missing_root() {
        let host = kitchen_host();
        assert!(matches!(
            SceneIndex::scan(&host, "/Attic"),
            Err(VariantError::NotFound(_))
        ));
        assert!(matches!(
            SceneIndex::scan(&host, "Kitchen"),
            Err(VariantError::NotFound(_))
        ));
    }

    #[test]
    fn test_scan_skips_override_nodes_and_sees_composed_selection() {
        let mut host = kitchen_host();
        let table = host.resolve("/Kitchen/table").unwrap();
        host.append_override_node(
            table,
            OverrideTag::Interactive,
            "set_variant",
            &[VariantSelection::new("/Kitchen/table", "materials", "glass")],
        )
        .unwrap();

        let model = SceneIndex::scan(&host, "/").unwrap();
        let table = model.get("/Kitchen/table").unwrap();
        assert_eq!(table.children, vec!["/Kitchen/table/leg".to_string()]);
        assert_eq!(
            table.variant_set("materials").unwrap().selection.as_deref(),
            Some("glass")
        );
    }

    #[test]
    fn test_clean_variant_sets_dedupes() {
        let sets = vec![
            VariantSet::new("a", &["x", "y", "x"], None),
            VariantSet::new("a", &["z"], None),
        ];
        let cleaned = clean_variant_sets("/n", sets);
        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned[0].variants, vec!["x".to_string(), "y".to_string()]);
    }
}
