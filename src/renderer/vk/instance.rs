use std::ffi::{CStr, c_char, c_void};

use ash::vk;
use color_eyre::Result;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

/// Initializes Vulkan and keeps the Vulkan instance alive
pub struct VulkanInstance {
    pub entry: ash::Entry,
    pub instance: ash::Instance,
    pub validation_enabled: bool,
    debug_utils: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanInstance {
    const VALIDATION_LAYER: &'static CStr = c"VK_LAYER_KHRONOS_validation";

    pub fn new(display: RawDisplayHandle, validation: bool) -> Result<Self> {
        let entry = ash::Entry::linked();

        let validation_enabled = validation && Self::validation_layer_supported(&entry)?;
        if validation && !validation_enabled {
            log::warn!(
                "Validation layer {:?} not available, continuing without it",
                Self::VALIDATION_LAYER
            );
        }

        let instance = Self::create_instance(&entry, display, validation_enabled)?;

        let debug_utils = if validation_enabled {
            Some(Self::create_debug_utils_messenger(&entry, &instance)?)
        } else {
            None
        };

        Ok(Self {
            entry,
            instance,
            validation_enabled,
            debug_utils,
        })
    }

    pub fn create_surface(
        &self,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> Result<(vk::SurfaceKHR, ash::khr::surface::Instance)> {
        let surface = unsafe {
            ash_window::create_surface(&self.entry, &self.instance, display, window, None)?
        };
        let surface_loader = ash::khr::surface::Instance::new(&self.entry, &self.instance);
        Ok((surface, surface_loader))
    }

    /// # Safety
    /// Every object created from this instance must already be destroyed.
    pub unsafe fn destroy(&mut self) {
        unsafe {
            if let Some((loader, messenger)) = self.debug_utils.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }

    fn create_instance(
        entry: &ash::Entry,
        display: RawDisplayHandle,
        validation: bool,
    ) -> Result<ash::Instance> {
        let application_info = vk::ApplicationInfo::default()
            .application_name(c"Vulkan Engine")
            .engine_name(c"vke")
            .api_version(vk::API_VERSION_1_3);

        let enabled_layer_names = if validation {
            vec![Self::VALIDATION_LAYER.as_ptr()]
        } else {
            Vec::new()
        };
        let enabled_extension_names = Self::required_extensions(display, validation)?
            .iter()
            .map(|ext| ext.as_ptr())
            .collect::<Vec<*const c_char>>();

        let mut debug_info = debug_utils_messenger_create_info();
        let mut instance_info = vk::InstanceCreateInfo::default()
            .application_info(&application_info)
            .enabled_layer_names(&enabled_layer_names)
            .enabled_extension_names(&enabled_extension_names);
        if validation {
            // Also report problems raised while creating and destroying the instance itself
            instance_info = instance_info.push_next(&mut debug_info);
        }

        #[cfg(target_os = "macos")]
        let instance_info = instance_info.flags(vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR);

        Ok(unsafe { entry.create_instance(&instance_info, None)? })
    }

    fn create_debug_utils_messenger(
        entry: &ash::Entry,
        instance: &ash::Instance,
    ) -> Result<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
        let loader = ash::ext::debug_utils::Instance::new(entry, instance);
        let info = debug_utils_messenger_create_info();
        let messenger = unsafe { loader.create_debug_utils_messenger(&info, None)? };
        Ok((loader, messenger))
    }

    fn required_extensions(
        display: RawDisplayHandle,
        validation: bool,
    ) -> Result<Vec<&'static CStr>> {
        let mut exts = ash_window::enumerate_required_extensions(display)?
            .iter()
            .map(|ext| unsafe { CStr::from_ptr(*ext) })
            .collect::<Vec<_>>();

        if validation {
            exts.push(ash::ext::debug_utils::NAME);
        }

        #[cfg(target_os = "macos")]
        {
            exts.push(ash::khr::portability_enumeration::NAME);
            exts.push(ash::khr::get_physical_device_properties2::NAME);
        }

        Ok(exts)
    }

    fn validation_layer_supported(entry: &ash::Entry) -> Result<bool> {
        let layers = unsafe { entry.enumerate_instance_layer_properties()? };
        Ok(layers
            .iter()
            .filter_map(|props| props.layer_name_as_c_str().ok())
            .any(|name| name == Self::VALIDATION_LAYER))
    }
}

fn debug_utils_messenger_create_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    let message_severity = vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
        | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
        | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
        | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR;
    let message_type = vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
        | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
        | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE;
    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(message_severity)
        .message_type(message_type)
        .pfn_user_callback(Some(debug_callback))
}

unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _p_user_data: *mut c_void,
) -> vk::Bool32 {
    let msg_type = match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL => "[General]",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "[Performance]",
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "[Validation]",
        _ => "[Unknown]",
    };
    let msg = unsafe {
        if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
            return vk::FALSE;
        }
        CStr::from_ptr((*p_callback_data).p_message).to_string_lossy()
    };
    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE => log::trace!("{} {}", msg_type, msg),
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => log::info!("{} {}", msg_type, msg),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::warn!("{} {}", msg_type, msg),
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => log::error!("{} {}", msg_type, msg),
        _ => log::warn!("[Unknown severity]{} {}", msg_type, msg),
    }

    vk::FALSE
}
