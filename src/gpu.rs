//! egui/wgpu integration for the viewer overlay: one paint callback per
//! frame that uploads the shared uniform block and issues at most two draw
//! calls (instanced sprites, textured plane).

pub mod resources;

pub use resources::{
    GeometryGuard, HeadlessFactory, MaterialGuard, ResourceLedger, SessionFactory, SharedGpu,
    TextureGuard, WgpuFactory,
};

use std::sync::Arc;

/// Uniform block shared by the sprite and plane pipelines. Must match the
/// `ViewerUniforms` struct in `gpu/viewer.wgsl` (16 floats, 64 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ViewerUniforms {
    pub viewport: [f32; 2],
    pub plane: [f32; 2],
    pub progress: f32,
    pub dispersion: f32,
    pub texture_mix: f32,
    pub time: f32,
    pub point_size: f32,
    pub open_mode: f32,
    pub sprite_opacity: f32,
    pub plane_opacity: f32,
    pub pixels_per_point: f32,
    pub _pad: [f32; 3],
}

pub struct OverlayCallback {
    pub shared: Arc<SharedGpu>,
    pub uniforms: ViewerUniforms,
    pub geometry: GeometryGuard,
    pub material: MaterialGuard,
}

impl egui_wgpu::CallbackTrait for OverlayCallback {
    fn prepare(
        &self,
        _device: &wgpu::Device,
        queue: &wgpu::Queue,
        _screen_descriptor: &egui_wgpu::ScreenDescriptor,
        _egui_encoder: &mut wgpu::CommandEncoder,
        _callback_resources: &mut egui_wgpu::CallbackResources,
    ) -> Vec<wgpu::CommandBuffer> {
        queue.write_buffer(
            &self.shared.uniform_buffer,
            0,
            bytemuck::bytes_of(&self.uniforms),
        );
        Vec::new()
    }

    fn paint<'a>(
        &'a self,
        _info: egui::PaintCallbackInfo,
        render_pass: &mut wgpu::RenderPass<'a>,
        _callback_resources: &'a egui_wgpu::CallbackResources,
    ) {
        let (Some(geometry), Some(material)) = (self.geometry.gpu(), self.material.gpu()) else {
            return;
        };
        render_pass.set_bind_group(0, &material.bind_group, &[]);
        if self.uniforms.sprite_opacity > 0.0 {
            render_pass.set_pipeline(&self.shared.sprite_pipeline);
            render_pass.set_vertex_buffer(0, geometry.start_buffer.slice(..));
            render_pass.set_vertex_buffer(1, geometry.attr_buffer.slice(..));
            render_pass.draw(0..6, 0..geometry.count);
        }
        if self.uniforms.plane_opacity > 0.0 {
            render_pass.set_pipeline(&self.shared.plane_pipeline);
            render_pass.draw(0..6, 0..1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_block_is_64_bytes() {
        assert_eq!(std::mem::size_of::<ViewerUniforms>(), 64);
    }
}
