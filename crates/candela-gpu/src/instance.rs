//! Vulkan instance creation.

use std::ffi::{CStr, CString};

use ash::vk;
use candela_core::version::Version;

use crate::error::Result;

/// Required instance extensions for the engine.
pub fn required_instance_extensions(enable_debug: bool) -> Vec<&'static CStr> {
    let mut extensions = vec![
        ash::khr::surface::NAME,
        #[cfg(target_os = "windows")]
        ash::khr::win32_surface::NAME,
        #[cfg(target_os = "linux")]
        ash::khr::xlib_surface::NAME,
        #[cfg(target_os = "linux")]
        ash::khr::wayland_surface::NAME,
        #[cfg(target_os = "macos")]
        ash::ext::metal_surface::NAME,
        #[cfg(target_os = "macos")]
        ash::khr::portability_enumeration::NAME,
    ];

    if enable_debug {
        extensions.push(ash::ext::debug_utils::NAME);
    }

    extensions
}

/// Validation layers to enable in debug builds.
pub fn validation_layers() -> Vec<&'static CStr> {
    vec![
        // Standard validation layer
        c"VK_LAYER_KHRONOS_validation",
    ]
}

/// Check whether the debug-utils extension can be enabled.
///
/// # Safety
/// The entry must be a valid Vulkan entry point.
pub unsafe fn debug_utils_supported(entry: &ash::Entry) -> bool {
    let Ok(extensions) = entry.enumerate_instance_extension_properties(None) else {
        return false;
    };
    extensions.iter().any(|props| {
        let name = CStr::from_ptr(props.extension_name.as_ptr());
        name == ash::ext::debug_utils::NAME
    })
}

/// Create a Vulkan instance.
///
/// # Safety
/// The entry must be a valid Vulkan entry point.
pub unsafe fn create_instance(
    entry: &ash::Entry,
    app_name: &str,
    app_version: Version,
    enable_validation: bool,
    enable_debug: bool,
) -> Result<ash::Instance> {
    let app_name = CString::new(app_name).unwrap_or_default();
    let engine_name = c"Candela";

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(app_version.to_vk())
        .engine_name(engine_name)
        .engine_version(Version::default().to_vk())
        .api_version(vk::API_VERSION_1_1);

    // Collect extension names
    let extension_names: Vec<*const i8> = required_instance_extensions(enable_debug)
        .iter()
        .map(|ext| ext.as_ptr())
        .collect();

    // Collect layer names, dropping any the loader does not offer
    let requested_layers = if enable_validation {
        validation_layers()
    } else {
        vec![]
    };

    let available_layers = entry.enumerate_instance_layer_properties()?;
    let mut layers = Vec::with_capacity(requested_layers.len());
    for layer in requested_layers {
        let found = available_layers.iter().any(|props| {
            let name = CStr::from_ptr(props.layer_name.as_ptr());
            name == layer
        });
        if found {
            layers.push(layer);
        } else {
            tracing::warn!("Validation layer {} not available", layer.to_string_lossy());
        }
    }

    let layer_names: Vec<*const i8> = layers.iter().map(|l| l.as_ptr()).collect();

    // Required for MoltenVK on macOS
    #[cfg(target_os = "macos")]
    let create_flags = vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    #[cfg(not(target_os = "macos"))]
    let create_flags = vk::InstanceCreateFlags::empty();

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extension_names)
        .enabled_layer_names(&layer_names)
        .flags(create_flags);

    let instance = entry.create_instance(&create_info, None)?;

    Ok(instance)
}
