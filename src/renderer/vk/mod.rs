mod device;
mod frame;
mod instance;
mod pipeline;
mod swapchain;
mod util;

use ash::prelude::VkResult;
use ash::vk;
use color_eyre::Result;
use color_eyre::eyre::OptionExt;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::renderer::backend::{ColorFormat, LoadOp, RenderBackend, ShaderStage, SwapchainImage};
use crate::renderer::config::RenderConfig;
use crate::renderer::vk::device::VulkanDevice;
use crate::renderer::vk::frame::FrameSync;
use crate::renderer::vk::instance::VulkanInstance;
use crate::renderer::vk::pipeline::{GraphicsPipelineBuilder, VulkanPipeline};
use crate::renderer::vk::swapchain::{Swapchain, SwapchainDesc, choose_extent};
use crate::renderer::vk::util::{set_object_name, transition_image_layout};

/// Vulkan 1.3 implementation of [`RenderBackend`] built on dynamic rendering.
///
/// Owns the instance, surface, device, swapchain and the synchronization objects of the one
/// frame in flight. Everything is torn down in reverse creation order on drop.
pub struct VulkanBackend {
    instance: VulkanInstance,
    surface: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
    device: VulkanDevice,
    debug_utils: Option<ash::ext::debug_utils::Device>,

    swapchain_loader: ash::khr::swapchain::Device,
    swapchain: Swapchain,
    frame: FrameSync,

    requested_extent: (u32, u32),
    needs_recreate: bool,
    vsync: bool,
    acquired_image: Option<u32>,
}

impl VulkanBackend {
    pub fn new<W>(window: &W, width: u32, height: u32, config: &RenderConfig) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let display = window.display_handle()?.as_raw();
        let raw_window = window.window_handle()?.as_raw();

        let instance = VulkanInstance::new(display, config.validation)?;
        let (surface, surface_loader) = instance.create_surface(display, raw_window)?;
        let device = VulkanDevice::new(&instance.instance, surface, &surface_loader)?;
        let debug_utils = instance
            .validation_enabled
            .then(|| ash::ext::debug_utils::Device::new(&instance.instance, &device.logical));

        let swapchain_loader =
            ash::khr::swapchain::Device::new(&instance.instance, &device.logical);
        let swapchain = Swapchain::new(
            &SwapchainDesc {
                surface,
                surface_loader: &surface_loader,
                loader: &swapchain_loader,
                width,
                height,
                vsync: config.vsync,
                old_swapchain: vk::SwapchainKHR::null(),
            },
            &device,
        )?;
        let frame = FrameSync::new(&device.logical, device.queue_family)?;

        Ok(Self {
            instance,
            surface,
            surface_loader,
            device,
            debug_utils,
            swapchain_loader,
            swapchain,
            frame,
            requested_extent: (width, height),
            needs_recreate: false,
            vsync: config.vsync,
            acquired_image: None,
        })
    }

    /// Rebuilds the swapchain for the requested extent. Returns `false`, leaving the old
    /// swapchain in place and the recreation pending, while the surface has no area.
    fn recreate_swapchain(&mut self) -> Result<bool> {
        let (width, height) = self.requested_extent;
        let capabilities = unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(self.device.physical, self.surface)?
        };
        if choose_extent(&capabilities, width, height).is_none() {
            self.needs_recreate = true;
            return Ok(false);
        }

        unsafe {
            self.device.logical.device_wait_idle()?;
        }

        let desc = SwapchainDesc {
            surface: self.surface,
            surface_loader: &self.surface_loader,
            loader: &self.swapchain_loader,
            width,
            height,
            vsync: self.vsync,
            old_swapchain: self.swapchain.handle,
        };
        let new_swapchain = Swapchain::new(&desc, &self.device)?;

        let mut old_swapchain = std::mem::replace(&mut self.swapchain, new_swapchain);
        unsafe {
            old_swapchain.destroy(&self.swapchain_loader, &self.device.logical);
        }
        self.needs_recreate = false;
        Ok(true)
    }

    fn acquire_next_image(&mut self) -> VkResult<u32> {
        let (index, suboptimal) = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain.handle,
                u64::MAX,
                self.frame.image_available,
                vk::Fence::null(),
            )?
        };
        if suboptimal {
            self.needs_recreate = true;
        }
        Ok(index)
    }
}

impl RenderBackend for VulkanBackend {
    type ShaderModule = vk::ShaderModule;
    type Pipeline = VulkanPipeline;
    type CommandBuffer = vk::CommandBuffer;

    fn swapchain_format(&self) -> ColorFormat {
        self.swapchain.color_format
    }

    fn swapchain_extent(&self) -> (u32, u32) {
        self.requested_extent
    }

    fn resize_swapchain(&mut self, width: u32, height: u32) -> Result<()> {
        self.requested_extent = (width, height);
        self.needs_recreate = true;
        Ok(())
    }

    fn create_shader_module(
        &mut self,
        spirv: &[u32],
        stage: ShaderStage,
        label: &str,
    ) -> Result<vk::ShaderModule> {
        let shader_module_info = vk::ShaderModuleCreateInfo::default().code(spirv);
        let module = unsafe {
            self.device
                .logical
                .create_shader_module(&shader_module_info, None)?
        };
        set_object_name(self.debug_utils.as_ref(), module, label);
        log::debug!("Created {:?} shader module '{}'", stage, label);
        Ok(module)
    }

    fn create_render_pipeline(
        &mut self,
        vertex: &vk::ShaderModule,
        fragment: &vk::ShaderModule,
        color_format: ColorFormat,
        label: &str,
    ) -> Result<VulkanPipeline> {
        let pipeline = GraphicsPipelineBuilder::new(&self.device.logical)
            .with_shaders(*vertex, *fragment)
            .with_input_topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .with_cull_mode(vk::CullModeFlags::NONE, vk::FrontFace::CLOCKWISE)
            .with_blending_disabled()
            .with_color_attachment_format(color_format.into())
            .build()?;
        set_object_name(self.debug_utils.as_ref(), pipeline.pipeline, label);
        Ok(pipeline)
    }

    fn destroy_shader_module(&mut self, module: vk::ShaderModule) {
        unsafe {
            self.device.logical.destroy_shader_module(module, None);
        }
    }

    fn destroy_render_pipeline(&mut self, pipeline: VulkanPipeline) {
        unsafe {
            pipeline.destroy(&self.device.logical);
        }
    }

    fn prepare_frame(&mut self) -> Result<bool> {
        if self.acquired_image.is_some() {
            return Ok(true);
        }

        // The image-available semaphore is free again once the previous submission retired
        self.frame.wait(&self.device.logical)?;
        if self.needs_recreate && !self.recreate_swapchain()? {
            return Ok(false);
        }

        let index = match self.acquire_next_image() {
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::debug!("Swapchain out of date at acquire, recreating");
                self.needs_recreate = true;
                if !self.recreate_swapchain()? {
                    return Ok(false);
                }
                self.acquire_next_image()?
            }
            result => result?,
        };
        self.acquired_image = Some(index);
        Ok(true)
    }

    fn begin_command_buffer(&mut self) -> Result<vk::CommandBuffer> {
        self.frame.begin_recording(&self.device.logical)
    }

    fn acquire_swapchain_image(&mut self, _cmd: &vk::CommandBuffer) -> Result<SwapchainImage> {
        let index = self
            .acquired_image
            .take()
            .ok_or_eyre("No swapchain image was acquired for this frame")?;

        Ok(SwapchainImage {
            index,
            width: self.swapchain.extent.width,
            height: self.swapchain.extent.height,
        })
    }

    fn cmd_begin_rendering(
        &mut self,
        cmd: &vk::CommandBuffer,
        target: &SwapchainImage,
        load_op: LoadOp,
    ) {
        let device = &self.device.logical;
        let index = target.index as usize;
        let extent = self.swapchain.extent;

        transition_image_layout(
            device,
            *cmd,
            self.swapchain.images[index],
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        );

        let LoadOp::Clear(color) = load_op;
        let clear_value = vk::ClearValue {
            color: vk::ClearColorValue {
                float32: color.to_array(),
            },
        };
        let color_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(self.swapchain.image_views[index])
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(clear_value);

        let render_area = vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent,
        };
        let rendering_info = vk::RenderingInfo::default()
            .render_area(render_area)
            .layer_count(1)
            .color_attachments(std::slice::from_ref(&color_attachment));

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };

        unsafe {
            device.cmd_begin_rendering(*cmd, &rendering_info);
            device.cmd_set_viewport(*cmd, 0, &[viewport]);
            device.cmd_set_scissor(*cmd, 0, &[render_area]);
        }
    }

    fn cmd_bind_render_pipeline(&mut self, cmd: &vk::CommandBuffer, pipeline: &VulkanPipeline) {
        unsafe {
            self.device.logical.cmd_bind_pipeline(
                *cmd,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline.pipeline,
            );
        }
    }

    fn cmd_draw(&mut self, cmd: &vk::CommandBuffer, vertex_count: u32) {
        unsafe {
            self.device.logical.cmd_draw(*cmd, vertex_count, 1, 0, 0);
        }
    }

    fn cmd_end_rendering(&mut self, cmd: &vk::CommandBuffer, target: &SwapchainImage) {
        let device = &self.device.logical;
        unsafe {
            device.cmd_end_rendering(*cmd);
        }
        transition_image_layout(
            device,
            *cmd,
            self.swapchain.images[target.index as usize],
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        );
    }

    fn submit(&mut self, cmd: vk::CommandBuffer, target: &SwapchainImage) -> Result<()> {
        let device = &self.device.logical;
        self.frame.end_recording(device)?;

        let render_finished = *self
            .swapchain
            .render_finished
            .get(target.index as usize)
            .ok_or_eyre("Swapchain image index out of range")?;

        let wait_semaphores = [self.frame.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [cmd];
        let signal_semaphores = [render_finished];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            // Reset only once work is guaranteed to be submitted, otherwise the next wait hangs
            device.reset_fences(&[self.frame.in_flight])?;
            device.queue_submit(self.device.queue, &[submit_info], self.frame.in_flight)?;
        }

        let swapchains = [self.swapchain.handle];
        let image_indices = [target.index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe {
            self.swapchain_loader
                .queue_present(self.device.queue, &present_info)
        } {
            Ok(suboptimal) => self.needs_recreate |= suboptimal,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => self.needs_recreate = true,
            Err(e) => return Err(e.into()),
        }

        Ok(())
    }

    fn wait_idle(&mut self) -> Result<()> {
        unsafe {
            self.device.logical.device_wait_idle()?;
        }
        Ok(())
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.logical.device_wait_idle() {
                log::error!("device_wait_idle failed during teardown: {e}");
            }
            self.frame.destroy(&self.device.logical);
            self.swapchain
                .destroy(&self.swapchain_loader, &self.device.logical);
            self.device.destroy();
            self.surface_loader.destroy_surface(self.surface, None);
            self.instance.destroy();
        }
        log::debug!("Vulkan backend destroyed");
    }
}
