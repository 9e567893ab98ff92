//! In-memory host graph
//!
//! A small stand-in for a real host application: a path-addressed node
//! tree with authored variant sets, override nodes that compose on top of
//! their parent, and a simulated viewport whose frames become ready after a
//! configurable number of polls. Used by the test suite and the command line
//! tool.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use glam::UVec2;
use log::debug;
use serde::{Deserialize, Serialize};

use super::{CameraHint, CapturedFrame, HostAdapter, HostNodeInfo, NodeHandle, OverrideTag};
use crate::constants;
use crate::error::{ConfigError, HostError};
use crate::model::{VariantSelection, VariantSet};

/// Mutations and viewport calls observed by the host, in call order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Appended {
        node: NodeHandle,
        parent: NodeHandle,
        tag: OverrideTag,
    },
    Updated {
        node: NodeHandle,
    },
    Deleted {
        node: NodeHandle,
    },
    ViewportPointed {
        target: String,
    },
    Captured {
        resolution: UVec2,
    },
}

/// One node of a JSON scene description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneNodeDescription {
    pub name: String,
    #[serde(default)]
    pub variant_sets: Vec<VariantSet>,
    #[serde(default)]
    pub children: Vec<SceneNodeDescription>,
}

/// JSON scene description accepted by [`MemoryHost::load`]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SceneDescription {
    /// Top-level nodes below the pseudo-root `/`
    #[serde(default)]
    pub children: Vec<SceneNodeDescription>,
    /// Polls before a frame is ready after each change
    #[serde(default)]
    pub frame_latency: u32,
    #[serde(default)]
    pub aspect_ratio: Option<f32>,
}

#[derive(Debug, Clone)]
struct OverrideNode {
    tag: OverrideTag,
    selections: Vec<VariantSelection>,
}

#[derive(Debug, Clone)]
struct MemoryNode {
    path: String,
    parent: Option<NodeHandle>,
    children: Vec<NodeHandle>,
    variant_sets: Vec<VariantSet>,
    override_node: Option<OverrideNode>,
}

/// Path-addressed scene graph with a simulated viewport
#[derive(Debug)]
pub struct MemoryHost {
    nodes: HashMap<NodeHandle, MemoryNode>,
    paths: HashMap<String, NodeHandle>,
    root: NodeHandle,
    next_id: u64,
    frame_latency: u32,
    pending_polls: u32,
    stalled_selections: HashSet<VariantSelection>,
    stalled: bool,
    reject_mutations: bool,
    fail_captures: bool,
    aspect_ratio: Option<f32>,
    viewport: Option<CameraHint>,
    rendered: Vec<VariantSelection>,
    events: Vec<HostEvent>,
}

impl MemoryHost {
    /// Create a host holding only the pseudo-root `/`
    pub fn new() -> Self {
        let root = NodeHandle(0);
        let mut nodes = HashMap::new();
        nodes.insert(
            root,
            MemoryNode {
                path: "/".to_string(),
                parent: None,
                children: Vec::new(),
                variant_sets: Vec::new(),
                override_node: None,
            },
        );
        let mut paths = HashMap::new();
        paths.insert("/".to_string(), root);

        Self {
            nodes,
            paths,
            root,
            next_id: 1,
            frame_latency: 0,
            pending_polls: 0,
            stalled_selections: HashSet::new(),
            stalled: false,
            reject_mutations: false,
            fail_captures: false,
            aspect_ratio: None,
            viewport: None,
            rendered: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Build a host from a parsed scene description
    pub fn from_description(description: &SceneDescription) -> Result<Self, ConfigError> {
        fn add_recursive(
            host: &mut MemoryHost,
            parent_path: &str,
            node: &SceneNodeDescription,
        ) -> Result<(), ConfigError> {
            let path = join_path(parent_path, &node.name);
            host.add_node(&path, node.variant_sets.clone())
                .map_err(|e| ConfigError::Invalid {
                    field: "children",
                    reason: format!("{}: {}", path, e),
                })?;
            for child in &node.children {
                add_recursive(host, &path, child)?;
            }
            Ok(())
        }

        let mut host = Self::new();
        for child in &description.children {
            add_recursive(&mut host, "/", child)?;
        }
        host.frame_latency = description.frame_latency;
        host.aspect_ratio = description.aspect_ratio;
        Ok(host)
    }

    /// Parse a scene description from JSON text
    pub fn from_json_str(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        let description: SceneDescription =
            serde_json::from_str(text).map_err(|source| ConfigError::Parse {
                path: origin.to_path_buf(),
                source,
            })?;
        Self::from_description(&description)
    }

    /// Load a scene description file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text, path)
    }

    /// Add a scene node below its (existing) parent path
    pub fn add_node(
        &mut self,
        path: &str,
        variant_sets: Vec<VariantSet>,
    ) -> Result<NodeHandle, HostError> {
        if self.paths.contains_key(path) {
            return Err(HostError::Rejected(format!("{} already exists", path)));
        }
        let parent_path = parent_path(path)
            .ok_or_else(|| HostError::Rejected(format!("{} is not an absolute path", path)))?;
        let parent = *self
            .paths
            .get(parent_path)
            .ok_or_else(|| HostError::Rejected(format!("parent of {} does not exist", path)))?;

        Ok(self.insert_child(parent, path.to_string(), variant_sets, None))
    }

    /// Remove a node by path, as an artist deleting it by hand would
    pub fn remove_path(&mut self, path: &str) -> bool {
        match self.paths.get(path).copied() {
            Some(handle) => self.remove_subtree(handle),
            None => false,
        }
    }

    /// Frames become ready after `polls` unsuccessful polls
    pub fn set_frame_latency(&mut self, polls: u32) {
        self.frame_latency = polls;
    }

    /// Never report a frame while `selection` is being previewed
    pub fn stall_on(&mut self, selection: VariantSelection) {
        self.stalled_selections.insert(selection);
    }

    /// Reject every graph mutation
    pub fn set_reject_mutations(&mut self, reject: bool) {
        self.reject_mutations = reject;
    }

    /// Fail every capture
    pub fn set_fail_captures(&mut self, fail: bool) {
        self.fail_captures = fail;
    }

    pub fn set_aspect_ratio(&mut self, ratio: Option<f32>) {
        self.aspect_ratio = ratio;
    }

    pub fn events(&self) -> &[HostEvent] {
        &self.events
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    pub fn viewport(&self) -> Option<&CameraHint> {
        self.viewport.as_ref()
    }

    /// Number of nodes, pseudo-root and override nodes included
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Override nodes directly below `path`, in append order
    pub fn override_children(&self, path: &str) -> Vec<(NodeHandle, OverrideTag, Vec<VariantSelection>)> {
        let Some(node) = self.paths.get(path).and_then(|h| self.nodes.get(h)) else {
            return Vec::new();
        };
        node.children
            .iter()
            .filter_map(|handle| {
                let child = self.nodes.get(handle)?;
                let ov = child.override_node.as_ref()?;
                Some((*handle, ov.tag, ov.selections.clone()))
            })
            .collect()
    }

    /// Composed selection of one set, after overrides
    pub fn composed_selection(&self, path: &str, set_name: &str) -> Option<String> {
        let handle = self.resolve(path)?;
        self.list_variant_sets(handle)
            .into_iter()
            .find(|set| set.name == set_name)
            .and_then(|set| set.selection)
    }

    fn insert_child(
        &mut self,
        parent: NodeHandle,
        path: String,
        variant_sets: Vec<VariantSet>,
        override_node: Option<OverrideNode>,
    ) -> NodeHandle {
        let handle = NodeHandle(self.next_id);
        self.next_id += 1;
        self.paths.insert(path.clone(), handle);
        self.nodes.insert(
            handle,
            MemoryNode {
                path,
                parent: Some(parent),
                children: Vec::new(),
                variant_sets,
                override_node,
            },
        );
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children.push(handle);
        }
        handle
    }

    fn remove_subtree(&mut self, handle: NodeHandle) -> bool {
        let Some(node) = self.nodes.remove(&handle) else {
            return false;
        };
        self.paths.remove(&node.path);
        for child in node.children {
            self.remove_subtree(child);
        }
        if let Some(parent) = node.parent.and_then(|p| self.nodes.get_mut(&p)) {
            parent.children.retain(|c| *c != handle);
        }
        true
    }

    fn unique_child_path(&self, parent: &str, name_hint: &str) -> String {
        let mut counter = 1;
        loop {
            let candidate = join_path(parent, &format!("{}{}", name_hint, counter));
            if !self.paths.contains_key(&candidate) {
                return candidate;
            }
            counter += 1;
        }
    }

    fn check_writable(&self) -> Result<(), HostError> {
        if self.reject_mutations {
            Err(HostError::Rejected("graph is locked".to_string()))
        } else {
            Ok(())
        }
    }

    /// Restart the simulated render after the scene changed
    fn invalidate_frame(&mut self, rendered: Vec<VariantSelection>) {
        self.stalled = rendered.iter().any(|s| self.stalled_selections.contains(s));
        self.rendered = rendered;
        self.pending_polls = self.frame_latency;
    }
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HostAdapter for MemoryHost {
    fn resolve(&self, path: &str) -> Option<NodeHandle> {
        self.paths.get(path).copied()
    }

    fn node_info(&self, node: NodeHandle) -> Option<HostNodeInfo> {
        self.nodes.get(&node).map(|n| HostNodeInfo {
            path: n.path.clone(),
            override_tag: n.override_node.as_ref().map(|o| o.tag),
        })
    }

    fn list_children(&self, node: NodeHandle) -> Vec<NodeHandle> {
        self.nodes
            .get(&node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    fn list_variant_sets(&self, node: NodeHandle) -> Vec<VariantSet> {
        let Some(target) = self.nodes.get(&node) else {
            return Vec::new();
        };
        let mut sets = target.variant_sets.clone();

        // Overrides compose in append order; the last one wins
        for child in &target.children {
            let Some(ov) = self.nodes.get(child).and_then(|c| c.override_node.as_ref()) else {
                continue;
            };
            for selection in ov.selections.iter().filter(|s| s.node_path == target.path) {
                if let Some(set) = sets.iter_mut().find(|s| s.name == selection.set_name) {
                    if set.contains(&selection.variant_name) {
                        set.selection = Some(selection.variant_name.clone());
                    }
                }
            }
        }
        sets
    }

    fn append_override_node(
        &mut self,
        parent: NodeHandle,
        tag: OverrideTag,
        name_hint: &str,
        selections: &[VariantSelection],
    ) -> Result<NodeHandle, HostError> {
        self.check_writable()?;
        let parent_path = self
            .nodes
            .get(&parent)
            .map(|n| n.path.clone())
            .ok_or(HostError::StaleHandle(parent.0))?;

        let path = self.unique_child_path(&parent_path, name_hint);
        let handle = self.insert_child(
            parent,
            path.clone(),
            Vec::new(),
            Some(OverrideNode {
                tag,
                selections: selections.to_vec(),
            }),
        );
        debug!("Appended {:?} override {} at {}", tag, handle, path);

        self.events.push(HostEvent::Appended { node: handle, parent, tag });
        self.invalidate_frame(selections.to_vec());
        Ok(handle)
    }

    fn update_override_node(
        &mut self,
        node: NodeHandle,
        selections: &[VariantSelection],
    ) -> Result<(), HostError> {
        self.check_writable()?;
        let target = self.nodes.get_mut(&node).ok_or(HostError::StaleHandle(node.0))?;
        let ov = target
            .override_node
            .as_mut()
            .ok_or_else(|| HostError::Rejected(format!("{} is not an override node", target.path)))?;
        ov.selections = selections.to_vec();

        self.events.push(HostEvent::Updated { node });
        self.invalidate_frame(selections.to_vec());
        Ok(())
    }

    fn delete_node(&mut self, node: NodeHandle) -> Result<(), HostError> {
        self.check_writable()?;
        if node == self.root {
            return Err(HostError::Rejected("cannot delete the pseudo-root".to_string()));
        }
        if !self.remove_subtree(node) {
            return Err(HostError::StaleHandle(node.0));
        }
        self.events.push(HostEvent::Deleted { node });
        self.invalidate_frame(Vec::new());
        Ok(())
    }

    fn point_viewport_at(&mut self, hint: &CameraHint) {
        self.events.push(HostEvent::ViewportPointed {
            target: hint.target_path.clone(),
        });
        self.viewport = Some(hint.clone());
        self.pending_polls = self.frame_latency;
    }

    fn is_frame_ready(&mut self) -> bool {
        if self.stalled {
            return false;
        }
        if self.pending_polls == 0 {
            return true;
        }
        self.pending_polls -= 1;
        false
    }

    fn capture_frame(&mut self) -> Result<CapturedFrame, HostError> {
        if self.fail_captures {
            return Err(HostError::Capture("viewport unavailable".to_string()));
        }
        let resolution = self
            .viewport
            .as_ref()
            .map(|hint| hint.resolution)
            .unwrap_or(UVec2::new(constants::thumbnail::DEFAULT_WIDTH, 384));

        // Flat colour derived from what is on screen, so different variants
        // produce different buffers
        let shade = self
            .rendered
            .iter()
            .flat_map(|s| s.variant_name.bytes())
            .fold(0u8, |acc, b| acc.wrapping_mul(31).wrapping_add(b));
        let pixel_count = resolution.x as usize * resolution.y as usize;
        let mut pixels = Vec::with_capacity(pixel_count * constants::thumbnail::BYTES_PER_PIXEL);
        for _ in 0..pixel_count {
            pixels.extend_from_slice(&[shade, shade, shade, 255]);
        }

        self.events.push(HostEvent::Captured { resolution });
        Ok(CapturedFrame { resolution, pixels })
    }

    fn viewport_aspect_ratio(&self) -> Option<f32> {
        self.aspect_ratio
    }
}

fn join_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent, name)
    }
}

fn parent_path(path: &str) -> Option<&str> {
    if !path.starts_with('/') || path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_host() -> MemoryHost {
        let mut host = MemoryHost::new();
        host.add_node("/Kitchen", vec![]).unwrap();
        host.add_node(
            "/Kitchen/table",
            vec![VariantSet::new("materials", &["wood", "metal", "glass"], Some("wood"))],
        )
        .unwrap();
        host
    }

    #[test]
    fn test_add_node_requires_parent() {
        let mut host = MemoryHost::new();
        assert!(host.add_node("/a/b", vec![]).is_err());
        assert!(host.add_node("relative", vec![]).is_err());
        assert!(host.add_node("/a", vec![]).is_ok());
        assert!(host.add_node("/a", vec![]).is_err());
    }

    #[test]
    fn test_overrides_compose_in_append_order() {
        let mut host = table_host();
        let table = host.resolve("/Kitchen/table").unwrap();

        host.append_override_node(
            table,
            OverrideTag::Interactive,
            "set_variant",
            &[VariantSelection::new("/Kitchen/table", "materials", "metal")],
        )
        .unwrap();
        let second = host
            .append_override_node(
                table,
                OverrideTag::Interactive,
                "set_variant",
                &[VariantSelection::new("/Kitchen/table", "materials", "glass")],
            )
            .unwrap();
        assert_eq!(host.composed_selection("/Kitchen/table", "materials").as_deref(), Some("glass"));
        assert_eq!(host.node_info(second).unwrap().path, "/Kitchen/table/set_variant2");

        host.delete_node(second).unwrap();
        assert_eq!(host.composed_selection("/Kitchen/table", "materials").as_deref(), Some("metal"));
    }

    #[test]
    fn test_frame_latency_and_stall() {
        let mut host = table_host();
        host.set_frame_latency(2);
        let table = host.resolve("/Kitchen/table").unwrap();
        let glass = VariantSelection::new("/Kitchen/table", "materials", "glass");
        host.stall_on(glass.clone());

        let node = host
            .append_override_node(
                table,
                OverrideTag::Preview,
                "_preview",
                &[VariantSelection::new("/Kitchen/table", "materials", "metal")],
            )
            .unwrap();
        assert!(!host.is_frame_ready());
        assert!(!host.is_frame_ready());
        assert!(host.is_frame_ready());

        host.update_override_node(node, &[glass]).unwrap();
        for _ in 0..10 {
            assert!(!host.is_frame_ready());
        }
    }

    #[test]
    fn test_stale_handles_and_locked_graph() {
        let mut host = table_host();
        let table = host.resolve("/Kitchen/table").unwrap();
        assert!(host.remove_path("/Kitchen"));
        assert!(host.resolve("/Kitchen/table").is_none());
        assert_eq!(
            host.append_override_node(table, OverrideTag::Interactive, "set_variant", &[]),
            Err(HostError::StaleHandle(table.0))
        );

        let mut host = table_host();
        host.set_reject_mutations(true);
        let table = host.resolve("/Kitchen/table").unwrap();
        assert!(matches!(
            host.append_override_node(table, OverrideTag::Interactive, "set_variant", &[]),
            Err(HostError::Rejected(_))
        ));
    }

    #[test]
    fn test_load_scene_json() {
        let text = r#"{
            "frame_latency": 3,
            "children": [
                { "name": "Kitchen", "children": [
                    { "name": "table", "variant_sets": [
                        { "name": "materials", "variants": ["wood", "metal"], "selection": "wood" }
                    ] }
                ] }
            ]
        }"#;
        let host = MemoryHost::from_json_str(text, Path::new("scene.json")).unwrap();
        assert_eq!(host.composed_selection("/Kitchen/table", "materials").as_deref(), Some("wood"));
        assert_eq!(host.frame_latency, 3);
    }

    #[test]
    fn test_demo_scene_loads() {
        let text = include_str!("../../demos/kitchen.json");
        let host = MemoryHost::from_json_str(text, Path::new("kitchen.json")).unwrap();
        assert!(host.resolve("/Kitchen/table/leg").is_some());
        assert_eq!(host.composed_selection("/Garage/Car", "shade").as_deref(), Some("red"));
        assert_eq!(host.composed_selection("/Kitchen/chair", "style"), None);
        assert!(host.viewport_aspect_ratio().is_some());
    }

    #[test]
    fn test_capture_uses_viewport_resolution() {
        let mut host = table_host();
        host.point_viewport_at(&CameraHint {
            target_path: "/Kitchen/table".to_string(),
            resolution: UVec2::new(8, 6),
        });
        let frame = host.capture_frame().unwrap();
        assert_eq!(frame.resolution, UVec2::new(8, 6));
        assert!(frame.is_consistent());
    }
}
