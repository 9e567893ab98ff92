//! Application-wide constants and default values
//!
//! Centralized location for all hard-coded values to improve maintainability

/// Capture orchestration defaults
pub mod capture {
    /// Per-item wait for the renderer before the item is marked failed (milliseconds)
    ///
    /// Generous on purpose: external renderers may need several seconds to
    /// converge after a variant switch.
    pub const DEFAULT_FRAME_TIMEOUT_MS: u64 = 30_000;

    /// Minimum time between two "frame ready" polls (milliseconds)
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

    /// Upper bound accepted for the per-item timeout (milliseconds)
    pub const MAX_FRAME_TIMEOUT_MS: u64 = 600_000; // 10 minutes

    /// Number of capture jobs that may drive the viewport at once
    pub const MAX_ACTIVE_JOBS: usize = 1;
}

/// Thumbnail sizing constants
pub mod thumbnail {
    /// Default thumbnail width in pixels
    pub const DEFAULT_WIDTH: u32 = 512;

    /// Aspect ratio assumed when the host cannot report one (4:3)
    pub const DEFAULT_ASPECT_RATIO: f32 = 4.0 / 3.0;

    /// Bytes per pixel of captured RGBA buffers
    pub const BYTES_PER_PIXEL: usize = 4;
}

/// Override node naming constants
pub mod node {
    /// Name hint for interactive override nodes
    pub const INTERACTIVE_NAME_HINT: &str = "set_variant";

    /// Name hint for the per-job preview override node
    pub const PREVIEW_NAME_HINT: &str = "_thumbnail_generator_internal";

    /// Path separator of the scene graph
    pub const PATH_SEPARATOR: char = '/';
}

/// Configuration file location
pub mod config {
    /// Directory under the platform config dir
    pub const APP_DIR: &str = "variant-manager";

    /// Config file name
    pub const FILE_NAME: &str = "config.json";
}
