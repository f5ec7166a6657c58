//! Debug messenger wiring for validation output.

use std::ffi::{c_void, CStr};
use std::sync::Arc;

use ash::vk;
use candela_core::events::{DebugCategory, DebugMessage, DebugSeverity};

use crate::device::GraphicsEvents;
use crate::error::Result;

/// Wraps a `VK_EXT_debug_utils` messenger that forwards validation output to
/// the engine log and the debug-message event bus.
pub struct DebugMessenger {
    loader: ash::ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
    // The raw user-data pointer handed to Vulkan aims at `events.debug_message`,
    // so the Arc must stay alive for as long as the messenger does.
    _events: Arc<GraphicsEvents>,
}

impl DebugMessenger {
    /// Install the debug messenger on an instance.
    ///
    /// # Safety
    /// The instance must be valid and must have been created with the
    /// debug-utils extension enabled.
    pub unsafe fn new(
        entry: &ash::Entry,
        instance: &ash::Instance,
        events: Arc<GraphicsEvents>,
    ) -> Result<Self> {
        let loader = ash::ext::debug_utils::Instance::new(entry, instance);

        let user_data =
            std::ptr::from_ref(&events.debug_message).cast_mut().cast::<c_void>();
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback))
            .user_data(user_data);

        let messenger = loader.create_debug_utils_messenger(&create_info, None)?;

        Ok(Self {
            loader,
            messenger,
            _events: events,
        })
    }

    /// Remove the messenger from the instance.
    ///
    /// # Safety
    /// Must be called before the instance is destroyed, and no other use of
    /// the messenger may be in flight.
    pub unsafe fn destroy(&self) {
        self.loader
            .destroy_debug_utils_messenger(self.messenger, None);
    }
}

fn map_severity(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> DebugSeverity {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        DebugSeverity::Error
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        DebugSeverity::Warning
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        DebugSeverity::Info
    } else {
        DebugSeverity::Verbose
    }
}

fn map_category(types: vk::DebugUtilsMessageTypeFlagsEXT) -> DebugCategory {
    if types.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        DebugCategory::Validation
    } else if types.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        DebugCategory::Performance
    } else {
        DebugCategory::General
    }
}

unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_types: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    p_user_data: *mut c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }
    let data = &*p_callback_data;

    let message = if data.p_message.is_null() {
        String::new()
    } else {
        CStr::from_ptr(data.p_message).to_string_lossy().into_owned()
    };

    let mut objects = Vec::new();
    if !data.p_objects.is_null() {
        let raw = std::slice::from_raw_parts(data.p_objects, data.object_count as usize);
        for object in raw {
            let name = if object.p_object_name.is_null() {
                String::new()
            } else {
                format!(" \"{}\"", CStr::from_ptr(object.p_object_name).to_string_lossy())
            };
            objects.push(format!(
                "{:?} {:#x}{}",
                object.object_type, object.object_handle, name
            ));
        }
    }

    let severity = map_severity(message_severity);
    match severity {
        DebugSeverity::Verbose => tracing::trace!(target: "candela_gpu::validation", "{message}"),
        DebugSeverity::Info => tracing::debug!(target: "candela_gpu::validation", "{message}"),
        DebugSeverity::Warning => tracing::warn!(target: "candela_gpu::validation", "{message}"),
        DebugSeverity::Error => tracing::error!(target: "candela_gpu::validation", "{message}"),
    }

    if !p_user_data.is_null() {
        let bus = &*p_user_data.cast::<candela_core::events::Callbacks<DebugMessage>>();
        if !bus.is_empty() {
            bus.emit(&DebugMessage {
                severity,
                category: map_category(message_types),
                message,
                objects,
            });
        }
    }

    vk::FALSE
}
