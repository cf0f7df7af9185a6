use std::ffi::{CStr, c_char};

use ash::vk;
use color_eyre::Result;
use color_eyre::eyre::OptionExt;

/// Logical device plus the single queue used for both rendering and presentation
pub struct VulkanDevice {
    pub logical: ash::Device,
    pub physical: vk::PhysicalDevice,
    pub queue: vk::Queue,
    pub queue_family: u32,
}

impl VulkanDevice {
    pub fn new(
        instance: &ash::Instance,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> Result<Self> {
        let (physical, queue_family) =
            Self::select_physical_device(instance, surface, surface_loader)?;

        let props = unsafe { instance.get_physical_device_properties(physical) };
        log::info!(
            "Selected physical device {:?} ({:?}, Vulkan {}.{}.{})",
            props.device_name_as_c_str().unwrap_or(c"<unnamed>"),
            props.device_type,
            vk::api_version_major(props.api_version),
            vk::api_version_minor(props.api_version),
            vk::api_version_patch(props.api_version),
        );

        let logical = Self::create_logical_device(instance, physical, queue_family)?;
        let queue = unsafe { logical.get_device_queue(queue_family, 0) };

        Ok(Self {
            logical,
            physical,
            queue,
            queue_family,
        })
    }

    /// # Safety
    /// Every object created from this device must already be destroyed.
    pub unsafe fn destroy(&mut self) {
        unsafe {
            self.logical.destroy_device(None);
        }
    }

    fn select_physical_device(
        instance: &ash::Instance,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> Result<(vk::PhysicalDevice, u32)> {
        let devices = unsafe { instance.enumerate_physical_devices()? };

        devices
            .into_iter()
            // Dynamic rendering and synchronization2 are core in Vulkan 1.3
            .filter(|device| {
                let props = unsafe { instance.get_physical_device_properties(*device) };
                props.api_version >= vk::API_VERSION_1_3
            })
            .filter(|device| Self::supports_required_extensions(instance, *device))
            .filter(|device| Self::supports_required_features(instance, *device))
            // Require a queue family that can both draw and present to the surface
            .filter_map(|device| {
                let families =
                    unsafe { instance.get_physical_device_queue_family_properties(device) };
                families
                    .iter()
                    .enumerate()
                    .position(|(i, family)| {
                        let supports_graphics =
                            family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
                        let supports_present = unsafe {
                            surface_loader.get_physical_device_surface_support(
                                device,
                                i as u32,
                                surface,
                            )
                        }
                        .unwrap_or(false);
                        supports_graphics && supports_present
                    })
                    .map(|index| (device, index as u32))
            })
            .min_by_key(|(device, _)| {
                let props = unsafe { instance.get_physical_device_properties(*device) };
                device_type_rank(props.device_type)
            })
            .ok_or_eyre("No suitable physical device found")
    }

    fn supports_required_extensions(instance: &ash::Instance, device: vk::PhysicalDevice) -> bool {
        let supported = unsafe { instance.enumerate_device_extension_properties(device) }
            .unwrap_or_default();

        Self::required_device_extensions().iter().all(|required| {
            let found = supported
                .iter()
                .filter_map(|ext| ext.extension_name_as_c_str().ok())
                .any(|name| name == *required);
            if !found {
                log::debug!("Device extension not supported: {:?}", required);
            }
            found
        })
    }

    fn supports_required_features(instance: &ash::Instance, device: vk::PhysicalDevice) -> bool {
        let mut vulkan13 = vk::PhysicalDeviceVulkan13Features::default();
        {
            let mut features = vk::PhysicalDeviceFeatures2::default().push_next(&mut vulkan13);
            unsafe { instance.get_physical_device_features2(device, &mut features) };
        }
        vulkan13.dynamic_rendering == vk::TRUE && vulkan13.synchronization2 == vk::TRUE
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical: vk::PhysicalDevice,
        queue_family: u32,
    ) -> Result<ash::Device> {
        let queue_priorities = [1.0];
        let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(queue_family)
            .queue_priorities(&queue_priorities)];

        let enabled_extension_names = Self::required_device_extensions()
            .iter()
            .map(|ext| ext.as_ptr())
            .collect::<Vec<*const c_char>>();
        let mut vulkan13 = vk::PhysicalDeviceVulkan13Features::default()
            .dynamic_rendering(true)
            .synchronization2(true);

        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&enabled_extension_names)
            .push_next(&mut vulkan13);

        Ok(unsafe { instance.create_device(physical, &device_create_info, None)? })
    }

    fn required_device_extensions() -> Vec<&'static CStr> {
        vec![
            ash::khr::swapchain::NAME,
            #[cfg(target_os = "macos")]
            ash::khr::portability_subset::NAME,
        ]
    }
}

fn device_type_rank(device_type: vk::PhysicalDeviceType) -> u32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 0,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
        vk::PhysicalDeviceType::CPU => 3,
        vk::PhysicalDeviceType::OTHER => 4,
        _ => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discrete_gpus_are_preferred() {
        let mut types = [
            vk::PhysicalDeviceType::CPU,
            vk::PhysicalDeviceType::INTEGRATED_GPU,
            vk::PhysicalDeviceType::DISCRETE_GPU,
            vk::PhysicalDeviceType::VIRTUAL_GPU,
        ];
        types.sort_by_key(|t| device_type_rank(*t));

        assert_eq!(types[0], vk::PhysicalDeviceType::DISCRETE_GPU);
        assert_eq!(types[1], vk::PhysicalDeviceType::INTEGRATED_GPU);
        assert_eq!(types[3], vk::PhysicalDeviceType::CPU);
    }
}
