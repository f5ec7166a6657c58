//! Graphics device management.

use std::ffi::CStr;
use std::sync::Arc;

use ash::vk;
use parking_lot::Mutex;

use candela_core::constants::MAX_FRAMES;
use candela_core::events::{Callbacks, DebugMessage, DeviceDiscovery, DeviceKind};
use candela_core::version::Version;

use crate::capabilities::{device_kind, device_local_memory_mb, DeviceInfo};
use crate::command::TrackedCommandBuffer;
use crate::debug::DebugMessenger;
use crate::error::{GpuError, Result};
use crate::instance::{create_instance, debug_utils_supported};
use crate::memory::GpuAllocator;
use crate::queue::DeviceQueue;
use crate::resources::ResourceManager;

/// Event buses exposed by a graphics device.
///
/// Subscribe before building the device to observe device discovery; the
/// debug-message bus stays live for the device's lifetime.
#[derive(Default)]
pub struct GraphicsEvents {
    /// Fired once per physical device during selection.
    pub device_discovery: Callbacks<DeviceDiscovery>,
    /// Fired for every message the validation layer reports.
    pub debug_message: Callbacks<DebugMessage>,
}

/// Tracks the frame slot rotation and lifetime frame count.
#[derive(Debug)]
pub(crate) struct FrameTracker {
    index: usize,
    count: u64,
    open: bool,
}

impl FrameTracker {
    pub(crate) fn new() -> Self {
        Self {
            index: 0,
            count: 0,
            open: false,
        }
    }

    pub(crate) fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn count(&self) -> u64 {
        self.count
    }

    pub(crate) fn begin(&mut self) {
        assert!(
            !self.open,
            "begin_frame called while a frame is already open"
        );
        self.open = true;
    }

    /// Close the frame and rotate to the next slot.
    ///
    /// Returns the new slot index and the completed-frame count.
    pub(crate) fn end(&mut self) -> (usize, u64) {
        assert!(self.open, "end_frame called without a matching begin_frame");
        self.open = false;
        self.index = (self.index + 1) % MAX_FRAMES;
        self.count += 1;
        (self.index, self.count)
    }
}

/// One physical device as seen during selection.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DeviceCandidate {
    pub kind: DeviceKind,
    pub opted_in: bool,
}

/// Pick a device: explicit opt-in wins, then the first discrete device, then
/// the first device of any kind.
pub(crate) fn pick_device(candidates: &[DeviceCandidate]) -> Option<usize> {
    candidates
        .iter()
        .position(|candidate| candidate.opted_in)
        .or_else(|| {
            candidates
                .iter()
                .position(|candidate| candidate.kind == DeviceKind::Discrete)
        })
        .or_else(|| (!candidates.is_empty()).then_some(0))
}

/// Main graphics device holding the Vulkan instance, logical device and the
/// shared queue.
pub struct GraphicsDevice {
    // Entry must be kept alive for the lifetime of the device
    #[allow(dead_code)]
    pub(crate) entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    debug: Option<DebugMessenger>,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) device: Arc<ash::Device>,
    info: DeviceInfo,
    queue: DeviceQueue,
    resources: ResourceManager,
    allocator: Mutex<GpuAllocator>,
    frame: Mutex<FrameTracker>,
    events: Arc<GraphicsEvents>,
}

impl GraphicsDevice {
    /// Get the Vulkan entry point.
    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    /// Get the Vulkan instance handle.
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// Get the physical device handle.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Get the Vulkan device handle.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Get information about the selected device.
    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    /// Get the shared graphics queue.
    pub fn queue(&self) -> &DeviceQueue {
        &self.queue
    }

    /// Get the per-thread command resources.
    pub fn resources(&self) -> &ResourceManager {
        &self.resources
    }

    /// Get access to the GPU allocator.
    pub fn allocator(&self) -> &Mutex<GpuAllocator> {
        &self.allocator
    }

    /// Get the event buses.
    pub fn events(&self) -> &GraphicsEvents {
        &self.events
    }

    /// Current frame slot index, always below [`MAX_FRAMES`].
    pub fn frame_index(&self) -> usize {
        self.frame.lock().index()
    }

    /// Lifetime count of completed frames.
    pub fn frame_count(&self) -> u64 {
        self.frame.lock().count()
    }

    /// Open a frame.
    ///
    /// Panics if the previous frame was never closed.
    pub fn begin_frame(&self) {
        self.frame.lock().begin();
    }

    /// Close the frame: rotate the slot index and run queue and resource
    /// bookkeeping for the slot that comes back into use.
    pub fn end_frame(&self) -> Result<()> {
        let (index, count) = self.frame.lock().end();
        unsafe {
            self.queue.poll_submits(&self.device, &self.resources)?;
            self.resources.recycle_frame(&self.device, index)?;
            self.resources.process_deferred(&self.device, count);
        }
        Ok(())
    }

    /// Register the calling thread for command recording.
    pub fn register_thread(&self) -> Result<()> {
        unsafe { self.resources.register_thread(&self.device) }
    }

    /// Unregister the calling thread; its pools are retired after the frames
    /// that may still use them complete.
    pub fn unregister_thread(&self) -> Result<()> {
        self.resources.unregister_thread(self.frame_count())
    }

    /// Acquire a command buffer from the calling thread's pool for the current
    /// frame slot.
    ///
    /// Panics if the thread never registered.
    pub fn get_command_buffer(&self) -> Result<TrackedCommandBuffer> {
        let frame = self.frame_index();
        unsafe { self.resources.get_command_buffer(&self.device, frame) }
    }

    /// Queue a destructor to run once no in-flight frame can reference the
    /// handle it destroys.
    pub fn defer_destroy<F>(&self, destructor: F)
    where
        F: FnOnce(&ash::Device) + Send + 'static,
    {
        self.resources.defer(self.frame_count(), destructor);
    }

    /// Wait for the device to be idle.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device.device_wait_idle()?;
        }
        Ok(())
    }
}

impl Drop for GraphicsDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();

            self.queue.destroy(&self.device, &self.resources);
            self.resources.destroy(&self.device);

            // Shutdown allocator BEFORE destroying device
            // This frees all VkDeviceMemory allocations
            self.allocator.lock().shutdown();

            self.device.destroy_device(None);

            if let Some(debug) = &self.debug {
                debug.destroy();
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Builder for creating a graphics device.
pub struct GraphicsDeviceBuilder {
    app_name: String,
    app_version: Version,
    enable_validation: bool,
    events: Arc<GraphicsEvents>,
}

impl Default for GraphicsDeviceBuilder {
    fn default() -> Self {
        Self {
            app_name: "Candela".to_string(),
            app_version: Version::default(),
            enable_validation: cfg!(debug_assertions),
            events: Arc::new(GraphicsEvents::default()),
        }
    }
}

impl GraphicsDeviceBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Set the application version.
    pub fn app_version(mut self, version: Version) -> Self {
        self.app_version = version;
        self
    }

    /// Enable or disable validation layers.
    pub fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Use an existing event bus set, keeping any subscriptions made on it.
    pub fn events(mut self, events: Arc<GraphicsEvents>) -> Self {
        self.events = events;
        self
    }

    /// Build the graphics device.
    pub fn build(self) -> Result<GraphicsDevice> {
        // Load Vulkan entry point
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| GpuError::Other(format!("Failed to load Vulkan: {e}")))?;

        let enable_debug = self.enable_validation && unsafe { debug_utils_supported(&entry) };
        if self.enable_validation && !enable_debug {
            tracing::warn!("Debug-utils extension not available; validation output disabled");
        }

        // Create Vulkan instance
        let instance = unsafe {
            create_instance(
                &entry,
                &self.app_name,
                self.app_version,
                self.enable_validation,
                enable_debug,
            )
        }?;

        let debug = if enable_debug {
            Some(unsafe { DebugMessenger::new(&entry, &instance, self.events.clone()) }?)
        } else {
            None
        };

        // Discover and select the physical device
        let physical_device = unsafe { select_physical_device(&instance, &self.events) }?;

        // Validate requirements on the selected device
        let info = unsafe { DeviceInfo::query(&instance, physical_device) };
        let queue_family = unsafe { find_graphics_family(&instance, physical_device) }?;
        for extension in required_device_extensions() {
            let name = extension.to_string_lossy();
            if !info.available_extensions.contains(name.as_ref()) {
                return Err(GpuError::MissingCapability(name.into_owned()));
            }
        }

        tracing::info!("Selected GPU: {}", info.summary());

        // Create logical device
        let device = unsafe { create_device(&instance, physical_device, queue_family) }?;
        let device = Arc::new(device);

        let queue = DeviceQueue::new(
            unsafe { device.get_device_queue(queue_family, 0) },
            queue_family,
        );

        // Create GPU allocator
        let allocator = unsafe { GpuAllocator::new(&instance, device.clone(), physical_device) }?;

        let resources = ResourceManager::new(queue_family);
        // The building thread records commands without further ceremony.
        unsafe { resources.register_thread(&device) }?;

        Ok(GraphicsDevice {
            entry,
            instance,
            debug,
            physical_device,
            device,
            info,
            queue,
            resources,
            allocator: Mutex::new(allocator),
            frame: Mutex::new(FrameTracker::new()),
            events: self.events,
        })
    }
}

/// Enumerate physical devices, fire discovery events and apply the selection
/// policy.
///
/// # Safety
/// The instance must be valid.
unsafe fn select_physical_device(
    instance: &ash::Instance,
    events: &GraphicsEvents,
) -> Result<vk::PhysicalDevice> {
    let devices = instance.enumerate_physical_devices()?;
    if devices.is_empty() {
        return Err(GpuError::NoSuitableDevice);
    }

    let mut candidates = Vec::with_capacity(devices.len());
    for (index, &device) in devices.iter().enumerate() {
        let properties = instance.get_physical_device_properties(device);
        let memory = instance.get_physical_device_memory_properties(device);

        let name = CStr::from_ptr(properties.device_name.as_ptr())
            .to_string_lossy()
            .into_owned();
        let kind = device_kind(properties.device_type);

        let discovery = DeviceDiscovery::new(index, name, kind, device_local_memory_mb(&memory));
        events.device_discovery.emit(&discovery);

        tracing::debug!(
            "Discovered GPU {index}: {} ({kind:?}, {} MB)",
            discovery.name,
            discovery.memory_mb
        );
        candidates.push(DeviceCandidate {
            kind,
            opted_in: discovery.opted_in(),
        });
    }

    let selected = pick_device(&candidates).ok_or(GpuError::NoSuitableDevice)?;
    Ok(devices[selected])
}

/// Find a graphics-capable queue family.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn find_graphics_family(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> Result<u32> {
    let queue_families = instance.get_physical_device_queue_family_properties(physical_device);

    queue_families
        .iter()
        .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|index| index as u32)
        .ok_or_else(|| GpuError::MissingCapability("graphics queue family".to_string()))
}

/// Required device extensions.
fn required_device_extensions() -> Vec<&'static CStr> {
    vec![ash::khr::swapchain::NAME]
}

/// Create the logical device with a single graphics queue.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn create_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    queue_family: u32,
) -> Result<ash::Device> {
    let queue_priority = 1.0_f32;
    let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
        .queue_family_index(queue_family)
        .queue_priorities(std::slice::from_ref(&queue_priority))];

    let extensions = required_device_extensions();
    let extension_names: Vec<*const i8> = extensions.iter().map(|ext| ext.as_ptr()).collect();

    let features = vk::PhysicalDeviceFeatures::default();

    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_names)
        .enabled_features(&features);

    let device = instance
        .create_device(physical_device, &device_create_info, None)
        .map_err(GpuError::from)?;

    Ok(device)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_rotation_wraps_at_max_frames() {
        let mut tracker = FrameTracker::new();
        assert_eq!(tracker.index(), 0);
        assert_eq!(tracker.count(), 0);

        let mut seen = vec![tracker.index()];
        for _ in 0..MAX_FRAMES {
            tracker.begin();
            let (index, _) = tracker.end();
            seen.push(index);
        }

        assert_eq!(seen, vec![0, 1, 2, 0]);
        assert_eq!(tracker.count(), MAX_FRAMES as u64);
    }

    #[test]
    #[should_panic(expected = "already open")]
    fn double_begin_panics() {
        let mut tracker = FrameTracker::new();
        tracker.begin();
        tracker.begin();
    }

    #[test]
    #[should_panic(expected = "without a matching begin_frame")]
    fn end_without_begin_panics() {
        let mut tracker = FrameTracker::new();
        tracker.end();
    }

    fn candidate(kind: DeviceKind, opted_in: bool) -> DeviceCandidate {
        DeviceCandidate { kind, opted_in }
    }

    #[test]
    fn opt_in_overrides_discrete_preference() {
        let candidates = [
            candidate(DeviceKind::Discrete, false),
            candidate(DeviceKind::Integrated, true),
        ];
        assert_eq!(pick_device(&candidates), Some(1));
    }

    #[test]
    fn first_discrete_wins_without_opt_in() {
        let candidates = [
            candidate(DeviceKind::Integrated, false),
            candidate(DeviceKind::Discrete, false),
            candidate(DeviceKind::Discrete, false),
        ];
        assert_eq!(pick_device(&candidates), Some(1));
    }

    #[test]
    fn falls_back_to_first_device() {
        let candidates = [
            candidate(DeviceKind::Integrated, false),
            candidate(DeviceKind::Cpu, false),
        ];
        assert_eq!(pick_device(&candidates), Some(0));
        assert_eq!(pick_device(&[]), None);
    }
}
