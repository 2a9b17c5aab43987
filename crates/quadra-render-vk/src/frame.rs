// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use tracing::debug;

use crate::config::Shape;
use crate::error::{ApiContext, RenderResult};
use crate::pipeline::{GraphicsPipeline, RenderPass};
use crate::swapchain::Swapchain;

pub(crate) fn clear_value(rgba: [f32; 4]) -> vk::ClearValue {
    vk::ClearValue {
        color: vk::ClearColorValue { float32: rgba },
    }
}

/// Command pool on the graphics family. Outlives every swapchain rebuild.
pub struct CommandPool {
    device: ash::Device,
    handle: vk::CommandPool,
}

impl CommandPool {
    pub fn new(device: &ash::Device, family: u32) -> RenderResult<Self> {
        let ci = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            queue_family_index: family,
            ..Default::default()
        };
        let handle =
            unsafe { device.create_command_pool(&ci, None) }.api("create_command_pool")?;
        Ok(Self {
            device: device.clone(),
            handle,
        })
    }

    pub fn handle(&self) -> vk::CommandPool {
        self.handle
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe { self.device.destroy_command_pool(self.handle, None) };
    }
}

/// One framebuffer and one pre-recorded command buffer per swapchain image,
/// indexed by image index. Command buffers are freed before framebuffers.
pub struct FrameResources {
    command_buffers: Vec<vk::CommandBuffer>,
    framebuffers: Vec<vk::Framebuffer>,
    pool: vk::CommandPool,
    device: ash::Device,
}

impl FrameResources {
    pub fn new(
        device: &ash::Device,
        pool: &CommandPool,
        render_pass: &RenderPass,
        swapchain: &Swapchain,
    ) -> RenderResult<Self> {
        let mut res = Self {
            command_buffers: Vec::new(),
            framebuffers: Vec::with_capacity(swapchain.views().len()),
            pool: pool.handle(),
            device: device.clone(),
        };

        let extent = swapchain.extent();
        for view in swapchain.views() {
            let attachments = [*view];
            let ci = vk::FramebufferCreateInfo {
                s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
                render_pass: render_pass.handle(),
                attachment_count: attachments.len() as u32,
                p_attachments: attachments.as_ptr(),
                width: extent.width,
                height: extent.height,
                layers: 1,
                ..Default::default()
            };
            let fb = unsafe { device.create_framebuffer(&ci, None) }.api("create_framebuffer")?;
            res.framebuffers.push(fb);
        }

        let alloc = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: pool.handle(),
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: res.framebuffers.len() as u32,
            ..Default::default()
        };
        res.command_buffers = unsafe { device.allocate_command_buffers(&alloc) }
            .api("allocate_command_buffers")?;
        Ok(res)
    }

    pub fn command_buffer(&self, image: u32) -> vk::CommandBuffer {
        self.command_buffers[image as usize]
    }

    pub fn len(&self) -> usize {
        self.command_buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.command_buffers.is_empty()
    }

    /// Records every command buffer: clear, bind, draw. None of them may be
    /// pending execution.
    pub fn record(
        &self,
        render_pass: &RenderPass,
        pipeline: &GraphicsPipeline,
        extent: vk::Extent2D,
        clear_color: [f32; 4],
        shape: Shape,
    ) -> RenderResult<()> {
        let clear = [clear_value(clear_color)];
        let (vertex_count, first_vertex) = shape.draw_range();

        for (&cb, &fb) in self.command_buffers.iter().zip(&self.framebuffers) {
            let begin = vk::CommandBufferBeginInfo {
                s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
                ..Default::default()
            };
            let rp_begin = vk::RenderPassBeginInfo {
                s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
                render_pass: render_pass.handle(),
                framebuffer: fb,
                render_area: vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent,
                },
                clear_value_count: clear.len() as u32,
                p_clear_values: clear.as_ptr(),
                ..Default::default()
            };
            unsafe {
                self.device
                    .begin_command_buffer(cb, &begin)
                    .api("begin_command_buffer")?;
                self.device
                    .cmd_begin_render_pass(cb, &rp_begin, vk::SubpassContents::INLINE);
                self.device.cmd_bind_pipeline(
                    cb,
                    vk::PipelineBindPoint::GRAPHICS,
                    pipeline.handle(),
                );
                self.device.cmd_draw(cb, vertex_count, 1, first_vertex, 0);
                self.device.cmd_end_render_pass(cb);
                self.device
                    .end_command_buffer(cb)
                    .api("end_command_buffer")?;
            }
        }
        debug!(
            buffers = self.command_buffers.len(),
            ?shape,
            "command buffers recorded"
        );
        Ok(())
    }
}

impl Drop for FrameResources {
    fn drop(&mut self) {
        unsafe {
            if !self.command_buffers.is_empty() {
                self.device
                    .free_command_buffers(self.pool, &self.command_buffers);
            }
            for &fb in &self.framebuffers {
                self.device.destroy_framebuffer(fb, None);
            }
        }
    }
}
