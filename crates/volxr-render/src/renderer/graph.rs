use volxr_core::{
    ClearPolicy, DrawCall, DrawCallHandle, MaterialHandle, MeshHandle, PassHandle, PipelineState,
    RenderTargetRef, TargetHandle, TextureHandle, Transform,
};

use super::Renderer;
use crate::capture::read_target_pixels;
use crate::error::RenderResult;
use crate::isosurface::IsosurfaceExtractor;

impl Renderer {
    /// Appends a pass. An offscreen target must already exist.
    pub fn add_pass(
        &mut self,
        target: RenderTargetRef,
        clear: ClearPolicy,
    ) -> RenderResult<PassHandle> {
        if let RenderTargetRef::Offscreen(t) = target {
            self.registry.target(t)?;
        }
        Ok(self.graph.add_pass(target, clear)?)
    }

    /// Appends a draw call to a pass. Mesh and material must be registered.
    pub fn add_draw_call(
        &mut self,
        pass: PassHandle,
        mesh: MeshHandle,
        material: MaterialHandle,
        transform: Option<Transform>,
        state: PipelineState,
        enabled: bool,
    ) -> RenderResult<DrawCallHandle> {
        self.registry.mesh(mesh)?;
        self.registry.material(material)?;
        Ok(self.graph.add_draw_call(
            pass,
            DrawCall {
                mesh,
                material,
                transform,
                state,
                enabled,
            },
        )?)
    }

    /// Appends a pass drawing the built-in quad across the whole target with
    /// `material`: no transform, depth test and culling off.
    pub fn add_fullscreen_pass(
        &mut self,
        target: RenderTargetRef,
        clear: ClearPolicy,
        material: MaterialHandle,
    ) -> RenderResult<(PassHandle, DrawCallHandle)> {
        let quad = self.registry.builtins().quad;
        let pass = self.add_pass(target, clear)?;
        let draw_call =
            self.add_draw_call(pass, quad, material, None, PipelineState::fullscreen(), true)?;
        Ok((pass, draw_call))
    }

    /// Toggles a draw call; the next frame sees the change.
    pub fn set_enabled(
        &mut self,
        pass: PassHandle,
        draw_call: DrawCallHandle,
        enabled: bool,
    ) -> RenderResult<()> {
        Ok(self.graph.set_enabled(pass, draw_call, enabled)?)
    }

    pub fn set_transform(
        &mut self,
        pass: PassHandle,
        draw_call: DrawCallHandle,
        transform: Option<Transform>,
    ) -> RenderResult<()> {
        Ok(self.graph.set_transform(pass, draw_call, transform)?)
    }

    pub fn set_state(
        &mut self,
        pass: PassHandle,
        draw_call: DrawCallHandle,
        state: PipelineState,
    ) -> RenderResult<()> {
        Ok(self.graph.set_state(pass, draw_call, state)?)
    }

    pub fn set_clear(&mut self, pass: PassHandle, clear: ClearPolicy) -> RenderResult<()> {
        Ok(self.graph.set_clear(pass, clear)?)
    }

    pub fn draw_call(&self, pass: PassHandle, draw_call: DrawCallHandle) -> RenderResult<&DrawCall> {
        Ok(self.graph.draw_call(pass, draw_call)?)
    }

    /// Frees a mesh no enabled draw call uses.
    pub fn free_mesh(&mut self, mesh: MeshHandle) -> RenderResult<()> {
        self.graph.ensure_mesh_unused(mesh)?;
        self.registry.free_mesh(mesh)
    }

    /// Creates an offscreen target.
    pub fn create_target(&mut self, width: u32, height: u32) -> RenderResult<TargetHandle> {
        self.registry.create_target(width, height)
    }

    /// Resizes a target in place; passes and materials referring to it keep working.
    pub fn reinit_target(
        &mut self,
        target: TargetHandle,
        width: u32,
        height: u32,
    ) -> RenderResult<()> {
        self.registry.reinit_target(target, width, height)
    }

    /// Frees a target no pass renders to and no material samples.
    pub fn free_target(&mut self, target: TargetHandle) -> RenderResult<()> {
        self.graph.ensure_target_unused(target)?;
        self.registry.free_target(target)
    }

    /// Reads a target's color image as RGBA8.
    pub fn capture_target(&self, target: TargetHandle) -> RenderResult<Vec<u8>> {
        let target = self.registry.target(target)?;
        read_target_pixels(&self.context.device, &self.context.queue, target, &self.sync)
    }

    /// Extracts an isosurface from a registered volume texture and registers the
    /// resulting mesh.
    pub fn extract_isosurface(
        &mut self,
        extractor: &IsosurfaceExtractor,
        volume: TextureHandle,
        sampling_rate: u32,
        threshold: f32,
    ) -> RenderResult<MeshHandle> {
        self.registry.ensure_mesh_slot()?;
        let texture = self.registry.texture(volume)?;
        let extracted = extractor.extract(
            &self.context.device,
            &self.context.queue,
            texture,
            sampling_rate,
            threshold,
        )?;
        match self.registry.insert_mesh(extracted.into_mesh()) {
            Ok(handle) => Ok(handle),
            Err(e) => {
                log::warn!("no mesh slot for extracted isosurface: {e}");
                Err(e)
            }
        }
    }

    /// Re-runs extraction into an existing mesh handle and destroys the old
    /// geometry. Draw calls using the handle pick up the new surface.
    pub fn reextract_isosurface(
        &mut self,
        extractor: &IsosurfaceExtractor,
        mesh: MeshHandle,
        volume: TextureHandle,
        sampling_rate: u32,
        threshold: f32,
    ) -> RenderResult<()> {
        self.registry.mesh(mesh)?;
        let texture = self.registry.texture(volume)?;
        let extracted = extractor.extract(
            &self.context.device,
            &self.context.queue,
            texture,
            sampling_rate,
            threshold,
        )?;
        let old = self.registry.replace_mesh(mesh, extracted.into_mesh())?;
        old.destroy();
        Ok(())
    }
}
