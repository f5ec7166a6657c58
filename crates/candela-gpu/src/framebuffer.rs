//! Framebuffers and their attachment images.
//!
//! A window pass gets one framebuffer per swapchain image, all sharing the
//! engine-owned attachment images; an offscreen pass gets exactly one. The
//! owned images live in the device allocator and are released exactly once
//! on every rebuild.

use ash::vk;
use gpu_allocator::MemoryLocation;

use crate::capabilities::{self, DeviceLimits};
use crate::device::GraphicsDevice;
use crate::error::{GpuError, Result};
use crate::memory::GpuImage;
use crate::renderpass::{format_aspect, RenderPass};
use crate::swapchain::Swapchain;

struct TargetImage {
    image: GpuImage,
    view: vk::ImageView,
}

/// Framebuffers for one render pass, including the non-window attachment
/// images backing them.
pub struct Framebuffers {
    extent: vk::Extent2D,
    samples: u32,
    chain_generation: u64,
    // Parallel to the plan's expanded attachment list; None marks the
    // swapchain-backed slot.
    images: Vec<Option<TargetImage>>,
    framebuffers: Vec<vk::Framebuffer>,
}

impl Framebuffers {
    /// Build framebuffers for a pass.
    ///
    /// Window passes need the swapchain whose images back the window
    /// attachment; offscreen passes ignore it.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(
        device: &GraphicsDevice,
        pass: &mut RenderPass,
        extent: vk::Extent2D,
        samples: u32,
        swapchain: Option<&Swapchain>,
    ) -> Result<Self> {
        let mut framebuffers = Self {
            extent: vk::Extent2D::default(),
            samples: 1,
            chain_generation: 0,
            images: Vec::new(),
            framebuffers: Vec::new(),
        };
        framebuffers.rebuild(device, pass, extent, samples, swapchain)?;
        Ok(framebuffers)
    }

    /// Current target extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Sample count the targets were built for.
    pub fn samples(&self) -> u32 {
        self.samples
    }

    /// Swapchain generation the window framebuffers were built against.
    pub fn chain_generation(&self) -> u64 {
        self.chain_generation
    }

    /// All framebuffer handles, one per swapchain image for window passes.
    pub fn handles(&self) -> &[vk::Framebuffer] {
        &self.framebuffers
    }

    /// Framebuffer for a swapchain image index. Offscreen passes have a
    /// single framebuffer regardless of index.
    pub fn handle(&self, image: usize) -> vk::Framebuffer {
        if self.framebuffers.len() == 1 {
            self.framebuffers[0]
        } else {
            self.framebuffers[image]
        }
    }

    /// View of an owned attachment by expanded-plan index. `None` for the
    /// swapchain-backed slot or an out-of-range index.
    pub fn attachment_view(&self, attachment: usize) -> Option<vk::ImageView> {
        self.images
            .get(attachment)
            .and_then(|target| target.as_ref().map(|target| target.view))
    }

    /// Drop all current targets and rebuild for a new extent and sample
    /// count.
    ///
    /// # Safety
    /// The device must be valid and no framebuffer may be referenced by
    /// in-flight work; the swapchain rebuild path waits for the device
    /// before calling this.
    pub unsafe fn rebuild(
        &mut self,
        device: &GraphicsDevice,
        pass: &mut RenderPass,
        extent: vk::Extent2D,
        samples: u32,
        swapchain: Option<&Swapchain>,
    ) -> Result<()> {
        check_extent(extent, &device.info().limits)?;

        self.release(device)?;

        let pass_handle = pass.handle_for(device, samples)?;
        let plan = pass.plan_for(samples)?;
        let dev = device.device();

        let mut images: Vec<Option<TargetImage>> = Vec::with_capacity(plan.attachments.len());
        for attachment in &plan.attachments {
            if attachment.window_bound {
                images.push(None);
                continue;
            }

            let samples_flag = capabilities::sample_count_flag(attachment.samples)
                .ok_or(GpuError::UnsupportedSampleCount(attachment.samples))?;
            let image_info = vk::ImageCreateInfo::default()
                .image_type(vk::ImageType::TYPE_2D)
                .format(attachment.format)
                .extent(vk::Extent3D {
                    width: extent.width,
                    height: extent.height,
                    depth: 1,
                })
                .mip_levels(1)
                .array_layers(1)
                .samples(samples_flag)
                .tiling(vk::ImageTiling::OPTIMAL)
                .usage(attachment.usage)
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .initial_layout(vk::ImageLayout::UNDEFINED);

            let image = device.allocator().lock().create_image(
                &image_info,
                MemoryLocation::GpuOnly,
                &attachment.name,
            )?;

            let view_info = vk::ImageViewCreateInfo::default()
                .image(image.image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(attachment.format)
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(format_aspect(attachment.format))
                        .base_mip_level(0)
                        .level_count(1)
                        .base_array_layer(0)
                        .layer_count(1),
                );
            let view = dev.create_image_view(&view_info, None)?;

            images.push(Some(TargetImage { image, view }));
        }

        let (count, chain_generation) = match (plan.window_attachment, swapchain) {
            (Some(_), Some(chain)) => (chain.image_count(), chain.generation()),
            (Some(_), None) => {
                return Err(GpuError::InvalidState(
                    "window render pass needs swapchain image views".to_string(),
                ))
            }
            (None, _) => (1, 0),
        };

        let mut framebuffers = Vec::with_capacity(count);
        for index in 0..count {
            let views: Vec<vk::ImageView> = plan
                .attachments
                .iter()
                .enumerate()
                .map(|(attachment_index, attachment)| {
                    if attachment.window_bound {
                        swapchain.map_or(vk::ImageView::null(), |chain| {
                            chain.image_views()[index]
                        })
                    } else {
                        images[attachment_index]
                            .as_ref()
                            .map_or(vk::ImageView::null(), |target| target.view)
                    }
                })
                .collect();

            let create_info = vk::FramebufferCreateInfo::default()
                .render_pass(pass_handle)
                .attachments(&views)
                .width(extent.width)
                .height(extent.height)
                .layers(1);
            framebuffers.push(dev.create_framebuffer(&create_info, None)?);
        }

        self.images = images;
        self.framebuffers = framebuffers;
        self.extent = extent;
        self.samples = samples;
        self.chain_generation = chain_generation;

        tracing::debug!(
            "Framebuffers built: {} targets at {}x{}, {} samples",
            self.framebuffers.len(),
            extent.width,
            extent.height,
            samples,
        );
        Ok(())
    }

    /// Destroy the framebuffers and their owned attachment images.
    ///
    /// # Safety
    /// The device must be valid and the framebuffers must not be in use.
    pub unsafe fn destroy(&mut self, device: &GraphicsDevice) {
        if let Err(e) = self.release(device) {
            tracing::warn!("Failed to release framebuffer target: {e}");
        }
    }

    unsafe fn release(&mut self, device: &GraphicsDevice) -> Result<()> {
        let dev = device.device();
        for framebuffer in self.framebuffers.drain(..) {
            dev.destroy_framebuffer(framebuffer, None);
        }
        for mut target in self.images.drain(..).flatten() {
            dev.destroy_image_view(target.view, None);
            device.allocator().lock().free_image(&mut target.image)?;
        }
        Ok(())
    }
}

fn check_extent(extent: vk::Extent2D, limits: &DeviceLimits) -> Result<()> {
    if extent.width == 0 || extent.height == 0 {
        return Err(GpuError::InvalidState(
            "framebuffer extent must be nonzero".to_string(),
        ));
    }
    if extent.width > limits.max_framebuffer_width || extent.height > limits.max_framebuffer_height
    {
        return Err(GpuError::TargetTooLarge {
            width: extent.width,
            height: extent.height,
            max_width: limits.max_framebuffer_width,
            max_height: limits.max_framebuffer_height,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(max_width: u32, max_height: u32) -> DeviceLimits {
        DeviceLimits {
            max_framebuffer_width: max_width,
            max_framebuffer_height: max_height,
            max_image_dimension_2d: max_width,
            framebuffer_color_samples: vk::SampleCountFlags::TYPE_1,
            framebuffer_depth_samples: vk::SampleCountFlags::TYPE_1,
        }
    }

    #[test]
    fn extent_within_limits_is_accepted() {
        let extent = vk::Extent2D {
            width: 1920,
            height: 1080,
        };
        assert!(check_extent(extent, &limits(4096, 4096)).is_ok());
    }

    #[test]
    fn oversized_extent_is_rejected_with_limits() {
        let extent = vk::Extent2D {
            width: 8192,
            height: 1080,
        };
        match check_extent(extent, &limits(4096, 4096)) {
            Err(GpuError::TargetTooLarge {
                width,
                max_width,
                ..
            }) => {
                assert_eq!(width, 8192);
                assert_eq!(max_width, 4096);
            }
            other => panic!("expected TargetTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn zero_extent_is_rejected() {
        let extent = vk::Extent2D {
            width: 0,
            height: 600,
        };
        assert!(check_extent(extent, &limits(4096, 4096)).is_err());
    }
}
