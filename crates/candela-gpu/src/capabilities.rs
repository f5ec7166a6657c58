//! GPU capability detection.

use std::collections::HashSet;
use std::ffi::CStr;

use ash::vk;
use candela_core::events::DeviceKind;

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    pub fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

/// Map a Vulkan device type onto the engine's device kind.
pub fn device_kind(device_type: vk::PhysicalDeviceType) -> DeviceKind {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => DeviceKind::Discrete,
        vk::PhysicalDeviceType::INTEGRATED_GPU => DeviceKind::Integrated,
        vk::PhysicalDeviceType::VIRTUAL_GPU => DeviceKind::Virtual,
        vk::PhysicalDeviceType::CPU => DeviceKind::Cpu,
        _ => DeviceKind::Other,
    }
}

/// Framebuffer and image limits relevant to render target creation.
#[derive(Debug, Clone, Copy)]
pub struct DeviceLimits {
    /// Maximum framebuffer width.
    pub max_framebuffer_width: u32,
    /// Maximum framebuffer height.
    pub max_framebuffer_height: u32,
    /// Maximum 2D image dimension.
    pub max_image_dimension_2d: u32,
    /// Sample counts supported for color attachments.
    pub framebuffer_color_samples: vk::SampleCountFlags,
    /// Sample counts supported for depth attachments.
    pub framebuffer_depth_samples: vk::SampleCountFlags,
}

/// Detected GPU information.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// GPU vendor
    pub vendor: GpuVendor,
    /// Device name
    pub name: String,
    /// Device kind (discrete, integrated, ...)
    pub kind: DeviceKind,
    /// Vulkan API version
    pub api_version: u32,
    /// Driver version
    pub driver_version: u32,
    /// Device-local memory in MB
    pub device_local_memory_mb: u64,
    /// Render target limits
    pub limits: DeviceLimits,
    /// Available device extensions
    pub available_extensions: HashSet<String>,
}

impl DeviceInfo {
    /// Query device information from a physical device.
    ///
    /// # Safety
    /// The instance and physical device must be valid.
    pub unsafe fn query(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Self {
        let properties = instance.get_physical_device_properties(physical_device);
        let memory_properties = instance.get_physical_device_memory_properties(physical_device);

        let extensions = instance
            .enumerate_device_extension_properties(physical_device)
            .unwrap_or_default();

        let available_extensions: HashSet<String> = extensions
            .iter()
            .filter_map(|ext| {
                CStr::from_ptr(ext.extension_name.as_ptr())
                    .to_str()
                    .ok()
                    .map(String::from)
            })
            .collect();

        let vendor = GpuVendor::from_vendor_id(properties.vendor_id);
        let name = CStr::from_ptr(properties.device_name.as_ptr())
            .to_string_lossy()
            .into_owned();

        let device_local_memory_mb = device_local_memory_mb(&memory_properties);

        Self {
            vendor,
            name,
            kind: device_kind(properties.device_type),
            api_version: properties.api_version,
            driver_version: properties.driver_version,
            device_local_memory_mb,
            limits: DeviceLimits {
                max_framebuffer_width: properties.limits.max_framebuffer_width,
                max_framebuffer_height: properties.limits.max_framebuffer_height,
                max_image_dimension_2d: properties.limits.max_image_dimension2_d,
                framebuffer_color_samples: properties.limits.framebuffer_color_sample_counts,
                framebuffer_depth_samples: properties.limits.framebuffer_depth_sample_counts,
            },
            available_extensions,
        }
    }

    /// Check whether a sample count is usable for both color and depth targets.
    pub fn supports_sample_count(&self, samples: vk::SampleCountFlags) -> bool {
        self.limits.framebuffer_color_samples.contains(samples)
            && self.limits.framebuffer_depth_samples.contains(samples)
    }

    /// Get a human-readable summary of the device.
    pub fn summary(&self) -> String {
        format!(
            "{} ({:?}, {:?}) - Vulkan {}.{}.{} - {} MB VRAM",
            self.name,
            self.vendor,
            self.kind,
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version),
            self.device_local_memory_mb,
        )
    }
}

/// Sum the device-local heap sizes in MB.
pub(crate) fn device_local_memory_mb(memory: &vk::PhysicalDeviceMemoryProperties) -> u64 {
    memory
        .memory_heaps
        .iter()
        .take(memory.memory_heap_count as usize)
        .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
        .map(|heap| heap.size / (1024 * 1024))
        .sum()
}

/// Convert a plain sample count into the matching Vulkan flag.
pub fn sample_count_flag(samples: u32) -> Option<vk::SampleCountFlags> {
    match samples {
        1 => Some(vk::SampleCountFlags::TYPE_1),
        2 => Some(vk::SampleCountFlags::TYPE_2),
        4 => Some(vk::SampleCountFlags::TYPE_4),
        8 => Some(vk::SampleCountFlags::TYPE_8),
        16 => Some(vk::SampleCountFlags::TYPE_16),
        32 => Some(vk::SampleCountFlags::TYPE_32),
        64 => Some(vk::SampleCountFlags::TYPE_64),
        _ => None,
    }
}

/// Convert a Vulkan sample count flag back into a plain count.
pub fn sample_count_value(samples: vk::SampleCountFlags) -> u32 {
    samples.as_raw()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_identification() {
        assert_eq!(GpuVendor::from_vendor_id(0x10DE), GpuVendor::Nvidia);
        assert_eq!(GpuVendor::from_vendor_id(0x1002), GpuVendor::Amd);
        assert_eq!(GpuVendor::from_vendor_id(0x8086), GpuVendor::Intel);
    }

    #[test]
    fn device_kind_mapping() {
        assert_eq!(
            device_kind(vk::PhysicalDeviceType::DISCRETE_GPU),
            DeviceKind::Discrete
        );
        assert_eq!(
            device_kind(vk::PhysicalDeviceType::INTEGRATED_GPU),
            DeviceKind::Integrated
        );
        assert_eq!(device_kind(vk::PhysicalDeviceType::OTHER), DeviceKind::Other);
    }

    #[test]
    fn sample_count_round_trip() {
        assert_eq!(sample_count_flag(4), Some(vk::SampleCountFlags::TYPE_4));
        assert_eq!(sample_count_flag(3), None);
        assert_eq!(sample_count_value(vk::SampleCountFlags::TYPE_8), 8);
    }
}
