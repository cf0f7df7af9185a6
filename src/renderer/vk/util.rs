use ash::vk;

use crate::renderer::vk::swapchain::color_subresource_range;

pub fn transition_image_layout(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) {
    if old_layout == new_layout {
        return;
    }

    let image_barrier = vk::ImageMemoryBarrier2::default()
        .src_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
        .src_access_mask(vk::AccessFlags2::MEMORY_WRITE)
        .dst_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
        .dst_access_mask(vk::AccessFlags2::MEMORY_WRITE | vk::AccessFlags2::MEMORY_READ)
        .old_layout(old_layout)
        .new_layout(new_layout)
        .subresource_range(color_subresource_range())
        .image(image);

    let dep_info =
        vk::DependencyInfo::default().image_memory_barriers(std::slice::from_ref(&image_barrier));

    unsafe {
        device.cmd_pipeline_barrier2(cmd, &dep_info);
    }
}

/// Attaches a debug name to a Vulkan object so validation messages can refer to it
pub fn set_object_name<H: vk::Handle>(
    debug_utils: Option<&ash::ext::debug_utils::Device>,
    handle: H,
    name: &str,
) {
    let Some(debug_utils) = debug_utils else {
        return;
    };
    let Ok(name) = std::ffi::CString::new(name) else {
        return;
    };

    let name_info = vk::DebugUtilsObjectNameInfoEXT::default()
        .object_handle(handle)
        .object_name(&name);
    if let Err(e) = unsafe { debug_utils.set_debug_utils_object_name(&name_info) } {
        log::warn!("Failed to set debug name {:?}: {}", name, e);
    }
}
