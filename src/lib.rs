//! Variant manager library
//!
//! Inspects, switches and previews the variant sets of a composed scene
//! graph owned by a host application. The host is reached only through
//! [`HostAdapter`]; [`VariantManager`] is the entry point for the panel.

pub mod capture;
pub mod config;
pub mod constants;
pub mod error;
pub mod host;
pub mod manager;
pub mod model;
pub mod overrides;
pub mod scene_index;
pub mod thumbnails;

// Re-export commonly used types
pub use capture::{CaptureEvent, CaptureFailure, CaptureState, ItemOutcome, JobId, JobStatus};
pub use config::ManagerConfig;
pub use error::{ConfigError, HostError, Result, VariantError};
pub use host::{HostAdapter, MemoryHost, NodeHandle, OverrideTag};
pub use manager::VariantManager;
pub use model::{GraphNode, VariantModel, VariantSelection, VariantSet, VariantTree};
pub use overrides::OverrideRecord;
pub use scene_index::SceneIndex;
pub use thumbnails::{Thumbnail, ThumbnailStore};
