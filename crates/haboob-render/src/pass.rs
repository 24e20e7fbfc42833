//! Render and compute pass scoping.
//!
//! [`RenderPassBuilder`] configures a colour attachment declaratively,
//! [`ScopedRenderPass`] and [`ScopedComputePass`] bind a pipeline plus its bind groups
//! and release them when dropped.

use std::ops::Range;

/// Sky blue clear color - distinctive and visible when geometry is missing.
pub const SKY_BLUE: wgpu::Color = wgpu::Color {
    r: 0.529,
    g: 0.808,
    b: 0.922,
    a: 1.0,
};

/// Lifecycle of a scoped pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    /// Nothing attached yet.
    Idle,
    /// Pipeline and bind groups attached.
    Bound,
    /// At least one draw or dispatch recorded.
    Dispatched,
    /// Pass ended; all bind state released.
    Unbound,
}

/// Builder for a single-colour-attachment render pass.
#[derive(Debug, Clone)]
pub struct RenderPassBuilder {
    clear_color: Option<wgpu::Color>,
    label: Option<&'static str>,
}

impl Default for RenderPassBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderPassBuilder {
    /// Create a builder that loads the existing attachment contents.
    pub fn new() -> Self {
        Self {
            clear_color: None,
            label: None,
        }
    }

    /// Clear the attachment to `color` when the pass begins.
    pub fn clear_color(mut self, color: wgpu::Color) -> Self {
        self.clear_color = Some(color);
        self
    }

    /// Set debug label for the render pass.
    pub fn label(mut self, label: &'static str) -> Self {
        self.label = Some(label);
        self
    }

    fn load_op(&self) -> wgpu::LoadOp<wgpu::Color> {
        match self.clear_color {
            Some(color) => wgpu::LoadOp::Clear(color),
            None => wgpu::LoadOp::Load,
        }
    }

    /// Begin a render pass writing into `view`.
    pub fn begin<'encoder>(
        &self,
        encoder: &'encoder mut wgpu::CommandEncoder,
        view: &wgpu::TextureView,
    ) -> wgpu::RenderPass<'encoder> {
        let color_attachment = wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: self.load_op(),
                store: wgpu::StoreOp::Store,
            },
            depth_slice: None,
        };

        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: self.label,
            color_attachments: &[Some(color_attachment)],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        })
    }

    /// Clear `view` without drawing anything.
    pub fn clear(&self, encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView) {
        let _pass = self.begin(encoder, view);
    }
}

/// A render pass with its pipeline and bind groups attached.
///
/// The pass ends when the guard is dropped, on every exit path.
pub struct ScopedRenderPass<'encoder> {
    pass: Option<wgpu::RenderPass<'encoder>>,
    label: &'static str,
    state: PassState,
}

impl<'encoder> ScopedRenderPass<'encoder> {
    /// Begin the pass described by `builder` and bind `pipeline` plus `bind_groups`
    /// (group index = slice index).
    pub fn bind(
        encoder: &'encoder mut wgpu::CommandEncoder,
        builder: &RenderPassBuilder,
        view: &wgpu::TextureView,
        pipeline: &wgpu::RenderPipeline,
        bind_groups: &[&wgpu::BindGroup],
    ) -> Self {
        let label = builder.label.unwrap_or("render-pass");
        let mut pass = builder.begin(encoder, view);
        pass.set_pipeline(pipeline);
        for (index, group) in bind_groups.iter().enumerate() {
            pass.set_bind_group(index as u32, *group, &[]);
        }
        log::trace!("{label}: bound");
        Self {
            pass: Some(pass),
            label,
            state: PassState::Bound,
        }
    }

    /// Record a non-indexed draw of `vertices`.
    pub fn draw(&mut self, vertices: Range<u32>) {
        if let Some(pass) = self.pass.as_mut() {
            pass.draw(vertices, 0..1);
            self.state = PassState::Dispatched;
        }
    }

    /// Swap the pipeline while keeping the attached bind groups.
    pub fn set_pipeline(&mut self, pipeline: &wgpu::RenderPipeline) {
        if let Some(pass) = self.pass.as_mut() {
            pass.set_pipeline(pipeline);
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PassState {
        self.state
    }

    /// End the pass now and report the final state.
    pub fn finish(mut self) -> PassState {
        self.release();
        self.state
    }

    fn release(&mut self) {
        if self.pass.take().is_some() {
            self.state = PassState::Unbound;
            log::trace!("{}: unbound", self.label);
        }
    }
}

impl Drop for ScopedRenderPass<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

/// A compute pass with its pipeline and bind groups attached.
pub struct ScopedComputePass<'encoder> {
    pass: Option<wgpu::ComputePass<'encoder>>,
    label: &'static str,
    state: PassState,
}

impl<'encoder> ScopedComputePass<'encoder> {
    /// Begin a compute pass and bind `pipeline` plus `bind_groups`.
    pub fn bind(
        encoder: &'encoder mut wgpu::CommandEncoder,
        label: &'static str,
        pipeline: &wgpu::ComputePipeline,
        bind_groups: &[&wgpu::BindGroup],
    ) -> Self {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(label),
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        for (index, group) in bind_groups.iter().enumerate() {
            pass.set_bind_group(index as u32, *group, &[]);
        }
        log::trace!("{label}: bound");
        Self {
            pass: Some(pass),
            label,
            state: PassState::Bound,
        }
    }

    /// Dispatch `groups` workgroups.
    pub fn dispatch(&mut self, groups: [u32; 3]) {
        if let Some(pass) = self.pass.as_mut() {
            pass.dispatch_workgroups(groups[0], groups[1], groups[2]);
            self.state = PassState::Dispatched;
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PassState {
        self.state
    }

    /// End the pass now and report the final state.
    pub fn finish(mut self) -> PassState {
        self.release();
        self.state
    }

    fn release(&mut self) {
        if self.pass.take().is_some() {
            self.state = PassState::Unbound;
            log::trace!("{}: unbound", self.label);
        }
    }
}

impl Drop for ScopedComputePass<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Workgroup counts covering `extent` with workgroups of `size`.
pub fn workgroup_count(extent: [u32; 3], size: [u32; 3]) -> [u32; 3] {
    [
        extent[0].div_ceil(size[0]),
        extent[1].div_ceil(size[1]),
        extent[2].div_ceil(size[2]),
    ]
}
