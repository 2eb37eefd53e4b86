//! Render-graph configuration: ordered passes holding ordered draw calls.
//!
//! This is pure data. Walking it against a device is the renderer's job; the graph
//! only guarantees ordering, capacity ceilings and handle validity within itself.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::handle::{tag, DrawCallHandle, MaterialHandle, MeshHandle, PassHandle, TargetHandle};
use crate::options::RegistryLimits;
use crate::pool::Pool;
use crate::state::PipelineState;
use crate::transform::Transform;

/// Where a pass renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderTargetRef {
    /// The current eye's display image.
    Display,
    /// An offscreen color + depth target.
    Offscreen(TargetHandle),
}

/// What a pass clears before drawing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClearPolicy {
    /// Clear color, or `None` to preserve the existing contents.
    pub color: Option<[f32; 4]>,
    /// Depth clear value, or `None` to preserve depth.
    pub depth: Option<f32>,
}

impl Default for ClearPolicy {
    fn default() -> Self {
        Self::color_and_depth([0.0, 0.0, 0.0, 1.0])
    }
}

impl ClearPolicy {
    /// Keep whatever the target already holds.
    pub fn preserve() -> Self {
        Self {
            color: None,
            depth: None,
        }
    }

    /// Clear color to `color` and depth to the far plane.
    pub fn color_and_depth(color: [f32; 4]) -> Self {
        Self {
            color: Some(color),
            depth: Some(1.0),
        }
    }
}

/// One draw inside a pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawCall {
    pub mesh: MeshHandle,
    pub material: MaterialHandle,
    /// Model transform. Without one, no transform uniforms are written.
    pub transform: Option<Transform>,
    pub state: PipelineState,
    pub enabled: bool,
}

/// A target, its clear policy, and its draw calls in execution order.
pub struct RenderPass {
    pub target: RenderTargetRef,
    pub clear: ClearPolicy,
    draw_calls: Pool<tag::DrawCall, DrawCall>,
}

impl RenderPass {
    /// Draw calls in execution order.
    pub fn draw_calls(&self) -> impl Iterator<Item = (DrawCallHandle, &DrawCall)> {
        self.draw_calls.iter()
    }

    /// Number of draw calls, enabled or not.
    pub fn len(&self) -> usize {
        self.draw_calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.draw_calls.is_empty()
    }

    /// Number of enabled draw calls.
    pub fn enabled_count(&self) -> usize {
        self.draw_calls.iter().filter(|(_, dc)| dc.enabled).count()
    }
}

/// Ordered list of passes.
///
/// Passes and draw calls are never removed, only disabled, so handles stay valid for
/// the life of the graph and slot order is insertion order.
pub struct RenderGraph {
    passes: Pool<tag::Pass, RenderPass>,
    max_draw_calls_per_pass: usize,
}

impl RenderGraph {
    /// Creates an empty graph with the ceilings from `limits`.
    pub fn new(limits: &RegistryLimits) -> Self {
        Self {
            passes: Pool::new("render pass", limits.passes),
            max_draw_calls_per_pass: limits.draw_calls_per_pass,
        }
    }

    /// Appends a pass.
    pub fn add_pass(&mut self, target: RenderTargetRef, clear: ClearPolicy) -> Result<PassHandle> {
        let handle = self.passes.insert(RenderPass {
            target,
            clear,
            draw_calls: Pool::new("draw call", self.max_draw_calls_per_pass),
        })?;
        log::debug!("added render pass {handle:?} targeting {target:?}");
        Ok(handle)
    }

    /// Appends a draw call to a pass.
    pub fn add_draw_call(
        &mut self,
        pass: PassHandle,
        draw_call: DrawCall,
    ) -> Result<DrawCallHandle> {
        self.pass_mut(pass)?.draw_calls.insert(draw_call)
    }

    /// Toggles a draw call. Takes effect on the next walk.
    pub fn set_enabled(
        &mut self,
        pass: PassHandle,
        draw_call: DrawCallHandle,
        enabled: bool,
    ) -> Result<()> {
        self.draw_call_mut(pass, draw_call)?.enabled = enabled;
        Ok(())
    }

    /// Replaces a draw call's model transform.
    pub fn set_transform(
        &mut self,
        pass: PassHandle,
        draw_call: DrawCallHandle,
        transform: Option<Transform>,
    ) -> Result<()> {
        self.draw_call_mut(pass, draw_call)?.transform = transform;
        Ok(())
    }

    /// Replaces a draw call's requested pipeline state.
    pub fn set_state(
        &mut self,
        pass: PassHandle,
        draw_call: DrawCallHandle,
        state: PipelineState,
    ) -> Result<()> {
        self.draw_call_mut(pass, draw_call)?.state = state;
        Ok(())
    }

    /// Changes a pass's clear policy.
    pub fn set_clear(&mut self, pass: PassHandle, clear: ClearPolicy) -> Result<()> {
        self.pass_mut(pass)?.clear = clear;
        Ok(())
    }

    pub fn pass(&self, pass: PassHandle) -> Result<&RenderPass> {
        self.passes.get(pass)
    }

    fn pass_mut(&mut self, pass: PassHandle) -> Result<&mut RenderPass> {
        self.passes.get_mut(pass)
    }

    pub fn draw_call(&self, pass: PassHandle, draw_call: DrawCallHandle) -> Result<&DrawCall> {
        self.pass(pass)?.draw_calls.get(draw_call)
    }

    fn draw_call_mut(
        &mut self,
        pass: PassHandle,
        draw_call: DrawCallHandle,
    ) -> Result<&mut DrawCall> {
        self.pass_mut(pass)?.draw_calls.get_mut(draw_call)
    }

    /// Passes in execution order.
    pub fn passes(&self) -> impl Iterator<Item = (PassHandle, &RenderPass)> {
        self.passes.iter()
    }

    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    /// Returns true if any pass renders to the display.
    pub fn targets_display(&self) -> bool {
        self.passes
            .iter()
            .any(|(_, p)| p.target == RenderTargetRef::Display)
    }

    /// Checks that `mesh` is not referenced by any enabled draw call.
    pub fn ensure_mesh_unused(&self, mesh: MeshHandle) -> Result<()> {
        let in_use = self
            .passes
            .iter()
            .flat_map(|(_, p)| p.draw_calls.iter())
            .any(|(_, dc)| dc.enabled && dc.mesh == mesh);
        if in_use {
            return Err(CoreError::precondition(format!(
                "mesh {mesh:?} is still referenced by an enabled draw call"
            )));
        }
        Ok(())
    }

    /// Checks that `target` is not rendered to by any pass.
    pub fn ensure_target_unused(&self, target: TargetHandle) -> Result<()> {
        let in_use = self
            .passes
            .iter()
            .any(|(_, p)| p.target == RenderTargetRef::Offscreen(target));
        if in_use {
            return Err(CoreError::precondition(format!(
                "target {target:?} is still used by a render pass"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handles() -> (MeshHandle, MaterialHandle) {
        let mut meshes: Pool<tag::Mesh, ()> = Pool::new("mesh", 4);
        let mut materials: Pool<tag::Material, ()> = Pool::new("material", 4);
        (meshes.insert(()).unwrap(), materials.insert(()).unwrap())
    }

    fn draw(enabled: bool) -> DrawCall {
        let (mesh, material) = handles();
        DrawCall {
            mesh,
            material,
            transform: None,
            state: PipelineState::default(),
            enabled,
        }
    }

    #[test]
    fn test_pass_capacity() {
        let limits = RegistryLimits {
            passes: 2,
            ..RegistryLimits::default()
        };
        let mut graph = RenderGraph::new(&limits);
        graph.add_pass(RenderTargetRef::Display, ClearPolicy::default()).unwrap();
        graph.add_pass(RenderTargetRef::Display, ClearPolicy::default()).unwrap();
        let err = graph
            .add_pass(RenderTargetRef::Display, ClearPolicy::default())
            .unwrap_err();
        assert!(err.is_capacity_exceeded());
    }

    #[test]
    fn test_draw_call_capacity() {
        let limits = RegistryLimits {
            draw_calls_per_pass: 3,
            ..RegistryLimits::default()
        };
        let mut graph = RenderGraph::new(&limits);
        let pass = graph.add_pass(RenderTargetRef::Display, ClearPolicy::default()).unwrap();
        for _ in 0..3 {
            graph.add_draw_call(pass, draw(true)).unwrap();
        }
        assert!(graph.add_draw_call(pass, draw(true)).unwrap_err().is_capacity_exceeded());
    }

    #[test]
    fn test_execution_order_is_insertion_order() {
        let mut graph = RenderGraph::new(&RegistryLimits::default());
        let a = graph.add_pass(RenderTargetRef::Display, ClearPolicy::preserve()).unwrap();
        let b = graph.add_pass(RenderTargetRef::Display, ClearPolicy::default()).unwrap();
        let first = graph.add_draw_call(b, draw(true)).unwrap();
        let second = graph.add_draw_call(b, draw(false)).unwrap();

        let passes: Vec<_> = graph.passes().map(|(h, _)| h).collect();
        assert_eq!(passes, vec![a, b]);
        let calls: Vec<_> = graph.pass(b).unwrap().draw_calls().map(|(h, _)| h).collect();
        assert_eq!(calls, vec![first, second]);
    }

    #[test]
    fn test_toggle_enabled() {
        let mut graph = RenderGraph::new(&RegistryLimits::default());
        let pass = graph.add_pass(RenderTargetRef::Display, ClearPolicy::default()).unwrap();
        let dc = graph.add_draw_call(pass, draw(false)).unwrap();
        assert_eq!(graph.pass(pass).unwrap().enabled_count(), 0);

        graph.set_enabled(pass, dc, true).unwrap();
        assert!(graph.draw_call(pass, dc).unwrap().enabled);
        assert_eq!(graph.pass(pass).unwrap().enabled_count(), 1);
    }

    #[test]
    fn test_set_transform() {
        let mut graph = RenderGraph::new(&RegistryLimits::default());
        let pass = graph.add_pass(RenderTargetRef::Display, ClearPolicy::default()).unwrap();
        let dc = graph.add_draw_call(pass, draw(true)).unwrap();
        let t = Transform::from_translation(glam::Vec3::X);
        graph.set_transform(pass, dc, Some(t)).unwrap();
        assert_eq!(graph.draw_call(pass, dc).unwrap().transform, Some(t));
    }

    #[test]
    fn test_mesh_in_use() {
        let mut graph = RenderGraph::new(&RegistryLimits::default());
        let pass = graph.add_pass(RenderTargetRef::Display, ClearPolicy::default()).unwrap();
        let call = draw(true);
        let dc = graph.add_draw_call(pass, call).unwrap();
        assert!(graph.ensure_mesh_unused(call.mesh).is_err());
        graph.set_enabled(pass, dc, false).unwrap();
        assert!(graph.ensure_mesh_unused(call.mesh).is_ok());
    }

    #[test]
    fn test_foreign_draw_call_handle_rejected() {
        let mut graph = RenderGraph::new(&RegistryLimits::default());
        let a = graph.add_pass(RenderTargetRef::Display, ClearPolicy::default()).unwrap();
        let b = graph.add_pass(RenderTargetRef::Display, ClearPolicy::default()).unwrap();
        let dc = graph.add_draw_call(a, draw(true)).unwrap();
        assert!(graph.set_enabled(b, dc, false).unwrap_err().is_precondition_violation());
    }
}
