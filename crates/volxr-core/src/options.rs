//! Configuration options for volxr.

use serde::{Deserialize, Serialize};

use crate::surface_nets::DEFAULT_MAX_VERTICES_PER_CELL;

/// Capacity ceilings for every fixed pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryLimits {
    pub meshes: usize,
    pub textures: usize,
    pub targets: usize,
    pub shaders: usize,
    pub materials: usize,
    pub passes: usize,
    pub draw_calls_per_pass: usize,
}

impl Default for RegistryLimits {
    fn default() -> Self {
        Self {
            meshes: 20,
            textures: 32,
            targets: 15,
            shaders: 16,
            materials: 16,
            passes: 5,
            draw_calls_per_pass: 30,
        }
    }
}

/// What to do when the GPU wants to emit more vertices than were reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OverflowPolicy {
    /// Report `CapacityExceeded`.
    #[default]
    Fail,
    /// Keep the vertices that fit and log a warning.
    Truncate,
}

/// Bounded wait for GPU work the host blocks on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    /// Timeout of the first wait, in milliseconds. Each retry doubles it.
    pub timeout_ms: u64,
    /// Additional waits after the first one times out.
    pub retries: u32,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 2000,
            retries: 3,
        }
    }
}

/// Isosurface extraction settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Vertex slots reserved per cell.
    pub max_vertices_per_cell: u32,
    pub overflow_policy: OverflowPolicy,
    /// Compute workgroup edge length; workgroups are `size^3` invocations.
    pub workgroup_size: u32,
    pub sync: SyncOptions,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            max_vertices_per_cell: DEFAULT_MAX_VERTICES_PER_CELL,
            overflow_policy: OverflowPolicy::Fail,
            workgroup_size: 4,
            sync: SyncOptions::default(),
        }
    }
}

/// Adapter preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PowerPreference {
    LowPower,
    #[default]
    HighPerformance,
}

/// Renderer construction options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererOptions {
    pub limits: RegistryLimits,
    /// Measure GPU time per frame with timestamp queries when the device allows it.
    pub gpu_timing: bool,
    pub power_preference: PowerPreference,
    pub sync: SyncOptions,
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            limits: RegistryLimits::default(),
            gpu_timing: false,
            power_preference: PowerPreference::HighPerformance,
            sync: SyncOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = RegistryLimits::default();
        assert_eq!(limits.meshes, 20);
        assert_eq!(limits.targets, 15);
        assert_eq!(limits.passes, 5);
        assert_eq!(limits.draw_calls_per_pass, 30);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ExtractorConfig =
            serde_json::from_str(r#"{ "overflow_policy": "Truncate" }"#).unwrap();
        assert_eq!(config.overflow_policy, OverflowPolicy::Truncate);
        assert_eq!(config.max_vertices_per_cell, 36);
        assert_eq!(config.sync, SyncOptions::default());
    }
}
