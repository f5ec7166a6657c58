//! Swapchain management.
//!
//! The swapchain owns its surface, the per-slot synchronization objects and
//! the rebuild state machine. After construction an image is always acquired;
//! [`Swapchain::present`] queues the image for display and immediately
//! acquires the next one, rebuilding the chain first whenever the surface
//! reported it stale or a property change (resize, vsync) marked it dirty.

use ash::vk;

use candela_core::constants::MAX_FRAMES;

use crate::command::{self, TrackedCommandBuffer};
use crate::device::GraphicsDevice;
use crate::error::{GpuError, Result};
use crate::surface::SurfaceContext;
use crate::sync::FrameSync;

/// Swapchain over a window surface.
pub struct Swapchain {
    surface: SurfaceContext,
    handle: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
    requested_extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
    supported_present_modes: Vec<vk::PresentModeKHR>,
    vsync: bool,

    // One sync slot per frame in flight, plus the fence that last wrote each
    // image so a reacquired image is never overwritten while still pending.
    slots: Vec<FrameSync>,
    pending_commands: Vec<Vec<TrackedCommandBuffer>>,
    slot: usize,
    mapped_fences: Vec<vk::Fence>,

    current_image: u32,
    image_acquired: bool,
    rendered: bool,
    dirty: bool,
    generation: u64,

    // Pre-recorded clear-and-present commands, one per image, submitted when
    // a frame presents without having rendered anything.
    clear_pool: vk::CommandPool,
    clear_commands: Vec<vk::CommandBuffer>,
}

impl Swapchain {
    /// Create a swapchain for a surface and acquire the first image.
    ///
    /// Takes ownership of the surface; it is destroyed with the swapchain.
    ///
    /// # Safety
    /// The device and surface must be valid.
    pub unsafe fn new(
        device: &GraphicsDevice,
        surface: SurfaceContext,
        width: u32,
        height: u32,
        vsync: bool,
    ) -> Result<Self> {
        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(device.queue().family());
        let clear_pool = device.device().create_command_pool(&pool_info, None)?;

        let mut swapchain = Self {
            surface,
            handle: vk::SwapchainKHR::null(),
            images: Vec::new(),
            image_views: Vec::new(),
            format: vk::SurfaceFormatKHR::default(),
            extent: vk::Extent2D::default(),
            requested_extent: vk::Extent2D { width, height },
            present_mode: vk::PresentModeKHR::FIFO,
            supported_present_modes: Vec::new(),
            vsync,
            slots: Vec::new(),
            pending_commands: (0..MAX_FRAMES).map(|_| Vec::new()).collect(),
            slot: 0,
            mapped_fences: Vec::new(),
            current_image: 0,
            image_acquired: false,
            rendered: false,
            dirty: true,
            generation: 0,
            clear_pool,
            clear_commands: Vec::new(),
        };

        swapchain.rebuild_inner(device)?;
        if swapchain.handle == vk::SwapchainKHR::null() {
            swapchain.destroy(device);
            return Err(GpuError::SwapchainCreation(
                "window surface has zero area".to_string(),
            ));
        }

        Ok(swapchain)
    }

    /// Raw swapchain handle.
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    /// Swapchain images.
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    /// Views over the swapchain images.
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Number of images in the chain.
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Surface format in use.
    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// Current chain extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Present mode in use.
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    /// Whether vsync was requested.
    pub fn vsync(&self) -> bool {
        self.vsync
    }

    /// Incremented on every successful rebuild. Render targets bound to the
    /// chain compare this against the value they were built from.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Index of the currently acquired image.
    pub fn current_image(&self) -> u32 {
        self.current_image
    }

    /// View of the currently acquired image.
    pub fn current_image_view(&self) -> vk::ImageView {
        self.image_views[self.current_image as usize]
    }

    /// Whether an image is acquired and the chain is not pending a rebuild.
    pub fn is_ready(&self) -> bool {
        self.image_acquired && !self.dirty
    }

    /// Request a different vsync mode.
    ///
    /// No-op when the chain is already using the mode the request maps to;
    /// otherwise the next present rebuilds the chain with the new mode.
    pub fn set_vsync(&mut self, enable: bool) {
        self.vsync = enable;
        let mode = pick_present_mode(&self.supported_present_modes, enable);
        if mode != self.present_mode {
            tracing::debug!(
                "Present mode change queued: {:?} -> {mode:?}",
                self.present_mode
            );
            self.dirty = true;
        }
    }

    /// Rebuild the chain for a new target size.
    ///
    /// A zero-area size leaves the current chain untouched; the swapchain
    /// stays dirty and later presents retry the rebuild.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn rebuild(&mut self, device: &GraphicsDevice, width: u32, height: u32) -> Result<()> {
        self.requested_extent = vk::Extent2D { width, height };
        self.rebuild_inner(device)
    }

    /// Make sure an image is acquired, rebuilding the chain if needed.
    ///
    /// Returns `false` when the chain still cannot produce images, e.g. while
    /// the window is minimized. The caller should skip rendering then.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn ensure_ready(&mut self, device: &GraphicsDevice) -> Result<bool> {
        if self.is_ready() {
            return Ok(true);
        }
        self.rebuild_inner(device)?;
        Ok(self.is_ready())
    }

    /// Acquire the next image if none is held.
    ///
    /// Returns `false` when the surface reported the chain stale; the
    /// swapchain is marked dirty and the caller must rebuild.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn acquire(&mut self, device: &GraphicsDevice) -> Result<bool> {
        if self.image_acquired {
            return Ok(!self.dirty);
        }

        let dev = device.device();
        let slot_sync = &self.slots[self.slot];

        // The slot about to be reused must have left the GPU; its command
        // buffers can then return to their pools.
        slot_sync.wait(dev)?;
        for command in self.pending_commands[self.slot].drain(..) {
            device.resources().give_back(command);
        }

        let acquired = self.surface.swapchain_loader.acquire_next_image(
            self.handle,
            u64::MAX,
            slot_sync.image_available,
            vk::Fence::null(),
        );

        let index = match acquired {
            Ok((index, false)) => index,
            Ok((_, true)) => {
                // Image handed out but stale; rebuilding recreates the slot
                // semaphores, so the signaled one is not reused.
                self.dirty = true;
                return Ok(false);
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.dirty = true;
                return Ok(false);
            }
            Err(e) => return Err(GpuError::from(e)),
        };

        // If another in-flight slot last rendered this image, its work must
        // finish before the image is written again.
        let mapped = self.mapped_fences[index as usize];
        if mapped != vk::Fence::null() && mapped != slot_sync.in_flight {
            crate::sync::wait_for_fence(dev, mapped, u64::MAX)?;
        }
        self.mapped_fences[index as usize] = slot_sync.in_flight;

        slot_sync.reset(dev)?;
        self.current_image = index;
        self.image_acquired = true;
        self.rendered = false;
        Ok(true)
    }

    /// Submit the frame's rendering work for the acquired image.
    ///
    /// The submission waits on the image-available semaphore, signals the
    /// render-finished semaphore and the slot fence, and keeps the command
    /// buffers until that fence proves the GPU is done with them.
    ///
    /// # Safety
    /// The device must be valid and the commands fully recorded.
    pub unsafe fn submit_render(
        &mut self,
        device: &GraphicsDevice,
        commands: Vec<TrackedCommandBuffer>,
    ) -> Result<()> {
        if !self.image_acquired {
            return Err(GpuError::InvalidState(
                "submit_render without an acquired image".to_string(),
            ));
        }
        if self.rendered {
            return Err(GpuError::InvalidState(
                "submit_render called twice for one acquired image".to_string(),
            ));
        }

        let slot_sync = &self.slots[self.slot];
        let handles: Vec<vk::CommandBuffer> =
            commands.iter().map(|command| command.handle).collect();
        let waits = [slot_sync.image_available];
        let stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signals = [slot_sync.render_finished];

        let submit = vk::SubmitInfo::default()
            .wait_semaphores(&waits)
            .wait_dst_stage_mask(&stages)
            .command_buffers(&handles)
            .signal_semaphores(&signals);

        device
            .queue()
            .submit(device.device(), &[submit], slot_sync.in_flight)?;

        self.pending_commands[self.slot].extend(commands);
        self.rendered = true;
        Ok(())
    }

    /// Present the acquired image and move to the next frame slot.
    ///
    /// If nothing was rendered the image is cleared to black first so the
    /// present still waits on a signaled semaphore. After queuing the present
    /// this either rebuilds a stale chain or acquires the next image.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn present(&mut self, device: &GraphicsDevice) -> Result<()> {
        if !self.image_acquired {
            return Err(GpuError::InvalidState(
                "present without an acquired image".to_string(),
            ));
        }

        if !self.rendered {
            self.submit_clear(device)?;
        }

        let slot_sync = &self.slots[self.slot];
        let waits = [slot_sync.render_finished];
        let swapchains = [self.handle];
        let image_indices = [self.current_image];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&waits)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = device
            .queue()
            .present(&self.surface.swapchain_loader, &present_info);

        // The slot advances even when presentation failed; its fence was
        // signaled by the render submission either way.
        self.image_acquired = false;
        self.rendered = false;
        self.slot = (self.slot + 1) % self.slots.len();

        match result {
            Ok(false) => {}
            Ok(true) => self.dirty = true,
            Err(GpuError::Vulkan(vk::Result::ERROR_OUT_OF_DATE_KHR)) => self.dirty = true,
            Err(e) => return Err(e),
        }

        if self.dirty {
            self.rebuild_inner(device)?;
        } else if !self.acquire(device)? {
            self.rebuild_inner(device)?;
        }
        Ok(())
    }

    /// Destroy the swapchain, its sync objects and the owned surface.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn destroy(&mut self, device: &GraphicsDevice) {
        let _ = device.wait_idle();
        self.drain_pending(device);

        let dev = device.device();
        for slot_sync in &self.slots {
            slot_sync.destroy(dev);
        }
        self.slots.clear();

        for &view in &self.image_views {
            dev.destroy_image_view(view, None);
        }
        self.image_views.clear();

        if self.handle != vk::SwapchainKHR::null() {
            self.surface
                .swapchain_loader
                .destroy_swapchain(self.handle, None);
            self.handle = vk::SwapchainKHR::null();
        }

        dev.destroy_command_pool(self.clear_pool, None);
        self.surface.destroy();
    }

    fn drain_pending(&mut self, device: &GraphicsDevice) {
        for pending in &mut self.pending_commands {
            for command in pending.drain(..) {
                device.resources().give_back(command);
            }
        }
    }

    /// Rebuild the chain at the last requested size.
    ///
    /// # Safety
    /// The device must be valid.
    unsafe fn rebuild_inner(&mut self, device: &GraphicsDevice) -> Result<()> {
        let caps = self.surface.capabilities(device)?;
        let extent = surface_extent(&caps.capabilities, self.requested_extent);
        if rebuild_skipped(extent) {
            tracing::debug!("Swapchain target has zero area; keeping current chain");
            self.dirty = true;
            return Ok(());
        }

        device.wait_idle()?;
        self.drain_pending(device);

        let dev = device.device();
        for slot_sync in &self.slots {
            slot_sync.destroy(dev);
        }
        self.slots.clear();

        let format = pick_surface_format(&caps.formats);
        let present_mode = pick_present_mode(&caps.present_modes, self.vsync);
        let count = image_count(&caps.capabilities);

        let queue_families = [device.queue().family()];
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface.surface)
            .min_image_count(count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .queue_family_indices(&queue_families)
            .pre_transform(caps.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(self.handle);

        let new_handle = self
            .surface
            .swapchain_loader
            .create_swapchain(&create_info, None)
            .map_err(|e| GpuError::SwapchainCreation(e.to_string()))?;

        self.images = self
            .surface
            .swapchain_loader
            .get_swapchain_images(new_handle)?;

        let new_views = self
            .images
            .iter()
            .map(|&image| {
                let view_info = vk::ImageViewCreateInfo::default()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(format.format)
                    .components(vk::ComponentMapping::default())
                    .subresource_range(
                        vk::ImageSubresourceRange::default()
                            .aspect_mask(vk::ImageAspectFlags::COLOR)
                            .base_mip_level(0)
                            .level_count(1)
                            .base_array_layer(0)
                            .layer_count(1),
                    );

                dev.create_image_view(&view_info, None)
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        // The old generation goes away only after its replacement exists,
        // keeping the oldSwapchain transition smooth.
        let (old_views, old_chain) = retire_generation(
            &mut self.image_views,
            &mut self.handle,
            vk::SwapchainKHR::null(),
            new_views,
            new_handle,
        );
        for view in old_views {
            dev.destroy_image_view(view, None);
        }
        if let Some(old) = old_chain {
            self.surface.swapchain_loader.destroy_swapchain(old, None);
        }

        self.mapped_fences = vec![vk::Fence::null(); self.images.len()];
        for _ in 0..MAX_FRAMES {
            self.slots.push(FrameSync::new(dev)?);
        }
        self.slot = 0;

        self.format = format;
        self.extent = extent;
        self.present_mode = present_mode;
        self.supported_present_modes = caps.present_modes;

        self.record_clear_commands(dev)?;

        self.generation += 1;
        self.dirty = false;
        self.rendered = false;
        self.image_acquired = false;

        tracing::info!(
            "Swapchain built: {}x{}, {} images, {:?}, {:?}",
            extent.width,
            extent.height,
            self.images.len(),
            format.format,
            present_mode,
        );

        // A freshly built chain can already be stale (e.g. mid-resize); the
        // dirty flag then sends the next present straight back here.
        let _ = self.acquire(device)?;
        Ok(())
    }

    /// Record one clear-to-black-and-present command buffer per image.
    ///
    /// # Safety
    /// The device must be valid.
    unsafe fn record_clear_commands(&mut self, dev: &ash::Device) -> Result<()> {
        if !self.clear_commands.is_empty() {
            dev.free_command_buffers(self.clear_pool, &self.clear_commands);
            self.clear_commands.clear();
        }
        dev.reset_command_pool(self.clear_pool, vk::CommandPoolResetFlags::empty())?;

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.clear_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(self.images.len() as u32);
        self.clear_commands = dev.allocate_command_buffers(&alloc_info)?;

        let range = vk::ImageSubresourceRange::default()
            .aspect_mask(vk::ImageAspectFlags::COLOR)
            .base_mip_level(0)
            .level_count(1)
            .base_array_layer(0)
            .layer_count(1);
        let clear_color = vk::ClearColorValue {
            float32: [0.0, 0.0, 0.0, 1.0],
        };

        for (&image, &cmd) in self.images.iter().zip(&self.clear_commands) {
            command::begin_command_buffer(dev, cmd, vk::CommandBufferUsageFlags::empty())?;

            let to_transfer = vk::ImageMemoryBarrier::default()
                .src_access_mask(vk::AccessFlags::empty())
                .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(range);
            dev.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[to_transfer],
            );

            dev.cmd_clear_color_image(
                cmd,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &clear_color,
                &[range],
            );

            let to_present = vk::ImageMemoryBarrier::default()
                .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .dst_access_mask(vk::AccessFlags::empty())
                .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .new_layout(vk::ImageLayout::PRESENT_SRC_KHR)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(range);
            dev.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[to_present],
            );

            command::end_command_buffer(dev, cmd)?;
        }
        Ok(())
    }

    /// Submit the pre-recorded clear for the acquired image.
    ///
    /// # Safety
    /// The device must be valid.
    unsafe fn submit_clear(&mut self, device: &GraphicsDevice) -> Result<()> {
        let slot_sync = &self.slots[self.slot];
        let commands = [self.clear_commands[self.current_image as usize]];
        let waits = [slot_sync.image_available];
        let stages = [vk::PipelineStageFlags::TRANSFER];
        let signals = [slot_sync.render_finished];

        let submit = vk::SubmitInfo::default()
            .wait_semaphores(&waits)
            .wait_dst_stage_mask(&stages)
            .command_buffers(&commands)
            .signal_semaphores(&signals);

        device
            .queue()
            .submit(device.device(), &[submit], slot_sync.in_flight)?;
        self.rendered = true;
        Ok(())
    }
}

/// Select the best surface format.
pub fn pick_surface_format(available: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    // Prefer SRGB
    for format in available {
        if format.format == vk::Format::B8G8R8A8_SRGB
            && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        {
            return *format;
        }
    }

    // Fall back to first available
    available[0]
}

/// Select the best present mode.
pub fn pick_present_mode(available: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if vsync {
        // FIFO is always supported
        vk::PresentModeKHR::FIFO
    } else {
        // Prefer mailbox (triple buffering without tearing)
        for &mode in available {
            if mode == vk::PresentModeKHR::MAILBOX {
                return mode;
            }
        }
        // Fall back to immediate
        for &mode in available {
            if mode == vk::PresentModeKHR::IMMEDIATE {
                return mode;
            }
        }
        // Fall back to FIFO (always supported)
        vk::PresentModeKHR::FIFO
    }
}

/// Calculate the swapchain extent for a desired size.
pub fn surface_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: desired.width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: desired.height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

/// Whether a rebuild must be skipped because the target has no area
/// (minimized window). A skipped rebuild leaves every current handle in
/// place.
pub(crate) fn rebuild_skipped(extent: vk::Extent2D) -> bool {
    extent.width == 0 || extent.height == 0
}

/// Swap the rebuilt generation in, returning the handles the previous one
/// owned so the caller can destroy each exactly once. The null chain of a
/// first build contributes nothing.
pub(crate) fn retire_generation<V, C: Copy + PartialEq>(
    views: &mut Vec<V>,
    chain: &mut C,
    null_chain: C,
    new_views: Vec<V>,
    new_chain: C,
) -> (Vec<V>, Option<C>) {
    let old_views = std::mem::replace(views, new_views);
    let old_chain = std::mem::replace(chain, new_chain);
    (old_views, (old_chain != null_chain).then_some(old_chain))
}

/// Number of images to request: one above the surface minimum, never more
/// than the frames in flight, clamped to the surface maximum when bounded.
pub fn image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut count = (capabilities.min_image_count + 1).min(MAX_FRAMES as u32);
    if capabilities.max_image_count > 0 {
        count = count.min(capabilities.max_image_count);
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            ..Default::default()
        }
    }

    #[test]
    fn image_count_stays_within_bounds() {
        // Unbounded surface: min + 1 capped by frames in flight.
        assert_eq!(image_count(&caps(2, 0)), 3);
        assert_eq!(image_count(&caps(1, 0)), 2);
        assert_eq!(image_count(&caps(3, 0)), 3);

        // Bounded surface: the maximum wins.
        assert_eq!(image_count(&caps(1, 2)), 2);
        assert_eq!(image_count(&caps(2, 8)), 3);
    }

    #[test]
    fn present_mode_respects_vsync() {
        let all = [
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::FIFO,
        ];
        assert_eq!(pick_present_mode(&all, true), vk::PresentModeKHR::FIFO);
        assert_eq!(pick_present_mode(&all, false), vk::PresentModeKHR::MAILBOX);

        let no_mailbox = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO];
        assert_eq!(
            pick_present_mode(&no_mailbox, false),
            vk::PresentModeKHR::IMMEDIATE
        );

        let fifo_only = [vk::PresentModeKHR::FIFO];
        assert_eq!(
            pick_present_mode(&fifo_only, false),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn extent_follows_surface_when_fixed() {
        let mut capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            ..Default::default()
        };
        let desired = vk::Extent2D {
            width: 1920,
            height: 1080,
        };
        assert_eq!(surface_extent(&capabilities, desired).width, 800);

        // Minimized windows report zero area; the rebuild must skip.
        capabilities.current_extent = vk::Extent2D {
            width: 0,
            height: 0,
        };
        let extent = surface_extent(&capabilities, desired);
        assert_eq!((extent.width, extent.height), (0, 0));
    }

    #[test]
    fn extent_clamps_when_surface_leaves_it_free() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            max_image_extent: vk::Extent2D {
                width: 1600,
                height: 900,
            },
            ..Default::default()
        };
        let extent = surface_extent(
            &capabilities,
            vk::Extent2D {
                width: 1920,
                height: 50,
            },
        );
        assert_eq!((extent.width, extent.height), (1600, 100));
    }

    #[test]
    fn rebuild_retires_each_generation_exactly_once() {
        // Fake handles; chain 0 is the null sentinel.
        let mut views: Vec<u32> = Vec::new();
        let mut chain = 0u32;

        // The first build has nothing to retire.
        let (old_views, old_chain) =
            retire_generation(&mut views, &mut chain, 0, vec![10, 11], 1);
        assert!(old_views.is_empty());
        assert_eq!(old_chain, None);

        // A rebuild retires exactly the first generation's handles.
        let (old_views, old_chain) =
            retire_generation(&mut views, &mut chain, 0, vec![20, 21], 2);
        assert_eq!(old_views, vec![10, 11]);
        assert_eq!(old_chain, Some(1));

        // Repeating with identical inputs retires the second generation
        // once and never resurfaces the first.
        let (old_views, old_chain) =
            retire_generation(&mut views, &mut chain, 0, vec![30, 31], 3);
        assert_eq!(old_views, vec![20, 21]);
        assert_eq!(old_chain, Some(2));
        assert_eq!(views, vec![30, 31]);
        assert_eq!(chain, 3);
    }

    #[test]
    fn zero_area_target_skips_the_rebuild() {
        assert!(rebuild_skipped(vk::Extent2D {
            width: 0,
            height: 600
        }));
        assert!(rebuild_skipped(vk::Extent2D {
            width: 800,
            height: 0
        }));
        assert!(!rebuild_skipped(vk::Extent2D {
            width: 800,
            height: 600
        }));
    }

    #[test]
    fn surface_format_prefers_srgb() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];
        assert_eq!(pick_surface_format(&formats).format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(
            pick_surface_format(&formats[..1]).format,
            vk::Format::R8G8B8A8_UNORM
        );
    }
}
