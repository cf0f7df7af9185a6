use ash::prelude::VkResult;
use ash::vk;
use color_eyre::Result;
use color_eyre::eyre::OptionExt;

use crate::renderer::backend::ColorFormat;
use crate::renderer::vk::device::VulkanDevice;

/// Swapchain images and everything whose lifetime is tied to them
pub struct Swapchain {
    pub handle: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    /// Signaled when rendering into the image with the same index has finished
    pub render_finished: Vec<vk::Semaphore>,
    pub extent: vk::Extent2D,
    pub color_format: ColorFormat,
}

pub struct SwapchainDesc<'a> {
    pub surface: vk::SurfaceKHR,
    pub surface_loader: &'a ash::khr::surface::Instance,
    pub loader: &'a ash::khr::swapchain::Device,
    pub width: u32,
    pub height: u32,
    pub vsync: bool,
    pub old_swapchain: vk::SwapchainKHR,
}

impl Swapchain {
    pub fn new(desc: &SwapchainDesc<'_>, dev: &VulkanDevice) -> Result<Self> {
        let (capabilities, formats, present_modes) = unsafe {
            (
                desc.surface_loader
                    .get_physical_device_surface_capabilities(dev.physical, desc.surface)?,
                desc.surface_loader
                    .get_physical_device_surface_formats(dev.physical, desc.surface)?,
                desc.surface_loader
                    .get_physical_device_surface_present_modes(dev.physical, desc.surface)?,
            )
        };

        let (surface_format, color_format) =
            choose_surface_format(&formats).ok_or_eyre("No suitable surface format found")?;
        let present_mode = choose_present_mode(&present_modes, desc.vsync);
        let extent = choose_extent(&capabilities, desc.width, desc.height)
            .ok_or_eyre("Surface has no presentable area")?;
        let min_image_count = choose_image_count(&capabilities);

        let pre_transform = if capabilities
            .supported_transforms
            .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            capabilities.current_transform
        };

        let swapchain_info = vk::SwapchainCreateInfoKHR::default()
            .surface(desc.surface)
            .min_image_count(min_image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .image_array_layers(1)
            .old_swapchain(desc.old_swapchain);

        let handle = unsafe { desc.loader.create_swapchain(&swapchain_info, None)? };
        let images = unsafe { desc.loader.get_swapchain_images(handle)? };
        let image_views = Self::create_image_views(&images, surface_format.format, dev)?;
        let render_finished = images
            .iter()
            .map(|_| unsafe {
                dev.logical
                    .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
            })
            .collect::<VkResult<Vec<_>>>()?;

        log::info!(
            "Created swapchain {}x{} with {} images ({:?}, {:?})",
            extent.width,
            extent.height,
            images.len(),
            surface_format.format,
            present_mode,
        );

        Ok(Self {
            handle,
            images,
            image_views,
            render_finished,
            extent,
            color_format,
        })
    }

    /// # Safety
    /// The device must be idle with respect to this swapchain's images.
    pub unsafe fn destroy(&mut self, loader: &ash::khr::swapchain::Device, device: &ash::Device) {
        unsafe {
            for semaphore in self.render_finished.drain(..) {
                device.destroy_semaphore(semaphore, None);
            }
            for view in self.image_views.drain(..) {
                device.destroy_image_view(view, None);
            }
            loader.destroy_swapchain(self.handle, None);
        }
        self.images.clear();
    }

    fn create_image_views(
        images: &[vk::Image],
        format: vk::Format,
        dev: &VulkanDevice,
    ) -> Result<Vec<vk::ImageView>> {
        let views = images
            .iter()
            .map(|image| {
                let view_info = vk::ImageViewCreateInfo::default()
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(format)
                    .components(vk::ComponentMapping {
                        r: vk::ComponentSwizzle::R,
                        g: vk::ComponentSwizzle::G,
                        b: vk::ComponentSwizzle::B,
                        a: vk::ComponentSwizzle::A,
                    })
                    .subresource_range(color_subresource_range())
                    .image(*image);
                unsafe { dev.logical.create_image_view(&view_info, None) }
            })
            .collect::<VkResult<Vec<vk::ImageView>>>()?;
        Ok(views)
    }
}

pub fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

pub fn color_format_from_vk(format: vk::Format) -> Option<ColorFormat> {
    match format {
        vk::Format::B8G8R8A8_SRGB => Some(ColorFormat::Bgra8Srgb),
        vk::Format::R8G8B8A8_SRGB => Some(ColorFormat::Rgba8Srgb),
        vk::Format::B8G8R8A8_UNORM => Some(ColorFormat::Bgra8Unorm),
        vk::Format::R8G8B8A8_UNORM => Some(ColorFormat::Rgba8Unorm),
        _ => None,
    }
}

impl From<ColorFormat> for vk::Format {
    fn from(format: ColorFormat) -> Self {
        match format {
            ColorFormat::Bgra8Srgb => vk::Format::B8G8R8A8_SRGB,
            ColorFormat::Rgba8Srgb => vk::Format::R8G8B8A8_SRGB,
            ColorFormat::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
            ColorFormat::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
        }
    }
}

/// Prefers B8G8R8A8_SRGB, then any sRGB-nonlinear format that maps onto a [`ColorFormat`].
fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
) -> Option<(vk::SurfaceFormatKHR, ColorFormat)> {
    let nonlinear = |f: &&vk::SurfaceFormatKHR| f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR;

    formats
        .iter()
        .filter(nonlinear)
        .find(|f| f.format == vk::Format::B8G8R8A8_SRGB)
        .or_else(|| {
            formats
                .iter()
                .filter(nonlinear)
                .find(|f| color_format_from_vk(f.format).is_some())
        })
        .and_then(|f| color_format_from_vk(f.format).map(|c| (*f, c)))
}

fn choose_present_mode(modes: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if vsync {
        // FIFO is the only mode every implementation must support
        return vk::PresentModeKHR::FIFO;
    }
    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|preferred| modes.contains(preferred))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Size of the swapchain images for a drawable of `width`x`height`.
///
/// `None` while the surface has no area, which happens when the window is minimized. Such an
/// extent must never reach swapchain creation.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> Option<vk::Extent2D> {
    let extent = if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    };
    (extent.width > 0 && extent.height > 0).then_some(extent)
}

fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let min = capabilities.min_image_count;
    let max = capabilities.max_image_count;
    // Recommended to request at least one more image than the minimum
    // to prevent having to wait on driver to complete internal operations
    // before another image can be acquired
    if max > 0 && min + 1 > max { max } else { min + 1 }
}
