//! Host adapter boundary
//!
//! The host application owns the composed scene graph, the override nodes
//! and the viewport. Everything in this crate talks to it through
//! [`HostAdapter`]; nothing caches host state beyond a single scan.

pub mod memory;

use std::fmt;

use glam::UVec2;
use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::HostError;
use crate::model::{VariantSelection, VariantSet};

pub use memory::{HostEvent, MemoryHost, SceneDescription, SceneNodeDescription};

/// Opaque handle to a host graph node, owned by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeHandle(pub u64);

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Origin of an override node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OverrideTag {
    /// Created by an artist-facing switch; never deleted by this crate
    Interactive,
    /// Created by a capture job; always deleted before the job ends
    Preview,
}

/// What the host knows about a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostNodeInfo {
    pub path: String,
    /// Set for override nodes appended through this adapter
    pub override_tag: Option<OverrideTag>,
}

/// Where to point the viewport before capturing
#[derive(Debug, Clone, PartialEq)]
pub struct CameraHint {
    /// Node the capture is about
    pub target_path: String,
    /// Requested capture resolution
    pub resolution: UVec2,
}

/// Pixels pulled from the viewport (RGBA8)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    pub resolution: UVec2,
    pub pixels: Vec<u8>,
}

impl CapturedFrame {
    /// Whether the buffer size matches the reported resolution
    pub fn is_consistent(&self) -> bool {
        self.pixels.len()
            == self.resolution.x as usize
                * self.resolution.y as usize
                * constants::thumbnail::BYTES_PER_PIXEL
    }
}

/// Narrow interface onto the host graph, viewport and capture API
///
/// All calls are made from the host's event loop thread; implementations
/// need no internal locking. Any node may disappear between two calls.
pub trait HostAdapter {
    /// Resolve an absolute path in the composed graph
    fn resolve(&self, path: &str) -> Option<NodeHandle>;

    /// Path and override tag of a node, `None` if the handle is stale
    fn node_info(&self, node: NodeHandle) -> Option<HostNodeInfo>;

    /// Children in host order
    fn list_children(&self, node: NodeHandle) -> Vec<NodeHandle>;

    /// Composed variant sets of a node, in authored order
    fn list_variant_sets(&self, node: NodeHandle) -> Vec<VariantSet>;

    /// Append a new override node downstream of `parent`
    fn append_override_node(
        &mut self,
        parent: NodeHandle,
        tag: OverrideTag,
        name_hint: &str,
        selections: &[VariantSelection],
    ) -> Result<NodeHandle, HostError>;

    /// Replace the selections authored by an existing override node
    fn update_override_node(
        &mut self,
        node: NodeHandle,
        selections: &[VariantSelection],
    ) -> Result<(), HostError>;

    /// Delete a node (and anything below it)
    fn delete_node(&mut self, node: NodeHandle) -> Result<(), HostError>;

    /// Aim the viewport used for captures
    fn point_viewport_at(&mut self, hint: &CameraHint);

    /// Non-blocking check whether the viewport finished rendering
    fn is_frame_ready(&mut self) -> bool;

    /// Pull the current frame
    fn capture_frame(&mut self) -> Result<CapturedFrame, HostError>;

    /// Width over height of the capture viewport
    fn viewport_aspect_ratio(&self) -> Option<f32> {
        None
    }
}

impl<T: HostAdapter + ?Sized> HostAdapter for &mut T {
    fn resolve(&self, path: &str) -> Option<NodeHandle> {
        (**self).resolve(path)
    }

    fn node_info(&self, node: NodeHandle) -> Option<HostNodeInfo> {
        (**self).node_info(node)
    }

    fn list_children(&self, node: NodeHandle) -> Vec<NodeHandle> {
        (**self).list_children(node)
    }

    fn list_variant_sets(&self, node: NodeHandle) -> Vec<VariantSet> {
        (**self).list_variant_sets(node)
    }

    fn append_override_node(
        &mut self,
        parent: NodeHandle,
        tag: OverrideTag,
        name_hint: &str,
        selections: &[VariantSelection],
    ) -> Result<NodeHandle, HostError> {
        (**self).append_override_node(parent, tag, name_hint, selections)
    }

    fn update_override_node(
        &mut self,
        node: NodeHandle,
        selections: &[VariantSelection],
    ) -> Result<(), HostError> {
        (**self).update_override_node(node, selections)
    }

    fn delete_node(&mut self, node: NodeHandle) -> Result<(), HostError> {
        (**self).delete_node(node)
    }

    fn point_viewport_at(&mut self, hint: &CameraHint) {
        (**self).point_viewport_at(hint)
    }

    fn is_frame_ready(&mut self) -> bool {
        (**self).is_frame_ready()
    }

    fn capture_frame(&mut self) -> Result<CapturedFrame, HostError> {
        (**self).capture_frame()
    }

    fn viewport_aspect_ratio(&self) -> Option<f32> {
        (**self).viewport_aspect_ratio()
    }
}
