use ash::vk;
use color_eyre::Result;
use color_eyre::eyre::eyre;

/// Command recording and synchronization state for the single frame in flight
pub struct FrameSync {
    pub command_pool: vk::CommandPool,
    pub command_buffer: vk::CommandBuffer,

    // Signals when the acquired swapchain image is ready to be rendered to.
    pub image_available: vk::Semaphore,

    // Signals when all rendering commands have finished execution.
    pub in_flight: vk::Fence,

    is_recording: bool,
}

impl FrameSync {
    pub fn new(device: &ash::Device, queue_family: u32) -> Result<Self> {
        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = unsafe { device.create_command_pool(&pool_info, None)? };

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let command_buffer = unsafe { device.allocate_command_buffers(&alloc_info)? }
            .into_iter()
            .next()
            .ok_or_else(|| eyre!("Driver returned no command buffers"))?;

        let image_available =
            unsafe { device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None)? };
        // Created signaled so the first frame does not wait forever
        let in_flight = unsafe {
            device.create_fence(
                &vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED),
                None,
            )?
        };

        Ok(Self {
            command_pool,
            command_buffer,
            image_available,
            in_flight,
            is_recording: false,
        })
    }

    /// Blocks until the previous submission has retired.
    pub fn wait(&self, device: &ash::Device) -> Result<()> {
        unsafe { device.wait_for_fences(&[self.in_flight], true, u64::MAX)? }
        Ok(())
    }

    /// Opens the command buffer. The previous submission must have retired, see [`Self::wait`].
    pub fn begin_recording(&mut self, device: &ash::Device) -> Result<vk::CommandBuffer> {
        if self.is_recording {
            return Err(eyre!("Command buffer is already recording"));
        }

        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            device.reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())?;
            device.begin_command_buffer(self.command_buffer, &begin_info)?;
        }

        self.is_recording = true;
        Ok(self.command_buffer)
    }

    pub fn end_recording(&mut self, device: &ash::Device) -> Result<()> {
        if !self.is_recording {
            return Err(eyre!("Command buffer is not recording"));
        }

        unsafe { device.end_command_buffer(self.command_buffer)? }

        self.is_recording = false;
        Ok(())
    }

    /// # Safety
    /// The device must be idle.
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        if self.is_recording {
            log::warn!("Destroying frame resources while the command buffer is still recording");
        }
        unsafe {
            device.destroy_fence(self.in_flight, None);
            device.destroy_semaphore(self.image_available, None);
            device.destroy_command_pool(self.command_pool, None);
        }
    }
}
