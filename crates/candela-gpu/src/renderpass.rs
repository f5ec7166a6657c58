//! Render pass planning and creation.
//!
//! Callers describe attachments as ordered per-subpass usage timelines; the
//! planner expands them into attachment descriptions, subpass references and
//! subpass dependencies. Planning is pure so the layout rules are unit
//! testable without a device.

use ash::vk;

use crate::capabilities;
use crate::device::GraphicsDevice;
use crate::error::{GpuError, Result};

/// How one subpass uses an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentUse {
    /// Not referenced by this subpass.
    Unused,
    /// Written as a color or depth attachment.
    Output,
    /// Read as an input attachment.
    Input,
    /// Written as a color attachment, then resolved to a single-sample
    /// target. Degrades to `Output` when the pass runs at one sample.
    Resolve,
}

/// What backs the color target a pass ultimately renders to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// The preserved color attachment is a swapchain image.
    Window,
    /// All attachments are engine-owned images.
    Offscreen,
}

/// Caller-facing attachment description.
#[derive(Debug, Clone)]
pub struct AttachmentDesc {
    pub name: String,
    pub format: vk::Format,
    /// Render this attachment at the pass sample count when above one.
    pub msaa: bool,
    /// Keep the contents readable after the pass ends.
    pub preserve: bool,
    /// One entry per subpass, in subpass order.
    pub uses: Vec<AttachmentUse>,
}

impl AttachmentDesc {
    /// Create a description with no uses; chain the builder methods to
    /// fill it in.
    pub fn new(name: impl Into<String>, format: vk::Format) -> Self {
        Self {
            name: name.into(),
            format,
            msaa: false,
            preserve: false,
            uses: Vec::new(),
        }
    }

    /// Mark the attachment as multisample-capable.
    pub fn msaa(mut self, msaa: bool) -> Self {
        self.msaa = msaa;
        self
    }

    /// Keep the contents after the pass.
    pub fn preserve(mut self, preserve: bool) -> Self {
        self.preserve = preserve;
        self
    }

    /// Set the per-subpass usage timeline.
    pub fn uses(mut self, uses: Vec<AttachmentUse>) -> Self {
        self.uses = uses;
        self
    }
}

/// One attachment in the expanded plan.
#[derive(Debug, Clone)]
pub struct PlannedAttachment {
    pub name: String,
    pub format: vk::Format,
    /// Effective sample count for this plan.
    pub samples: u32,
    /// Contents survive the pass; synthetic resolve targets inherit this
    /// from the attachment they resolve.
    pub preserve: bool,
    pub is_depth: bool,
    /// Backed by the swapchain image in window passes.
    pub window_bound: bool,
    /// Index of the multisampled attachment this synthetic target resolves.
    pub resolve_of: Option<usize>,
    pub uses: Vec<AttachmentUse>,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub initial_layout: vk::ImageLayout,
    pub final_layout: vk::ImageLayout,
    /// Usage flags the backing image needs.
    pub usage: vk::ImageUsageFlags,
}

/// Attachment references for one subpass, as expanded-list indices.
#[derive(Debug, Clone, Default)]
pub struct SubpassPlan {
    pub inputs: Vec<(u32, vk::ImageLayout)>,
    pub colors: Vec<(u32, vk::ImageLayout)>,
    /// Parallel to `colors` when any entry resolves; empty otherwise.
    pub resolves: Vec<(u32, vk::ImageLayout)>,
    pub depth: Option<(u32, vk::ImageLayout)>,
    pub preserves: Vec<u32>,
}

/// One subpass dependency; `vk::SUBPASS_EXTERNAL` marks the external edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedDependency {
    pub src_subpass: u32,
    pub dst_subpass: u32,
    pub src_stages: vk::PipelineStageFlags,
    pub src_access: vk::AccessFlags,
    pub dst_stages: vk::PipelineStageFlags,
    pub dst_access: vk::AccessFlags,
    pub by_region: bool,
}

/// Fully expanded render pass layout.
#[derive(Debug, Clone)]
pub struct PassPlan {
    pub attachments: Vec<PlannedAttachment>,
    pub subpasses: Vec<SubpassPlan>,
    pub dependencies: Vec<PlannedDependency>,
    pub samples: u32,
    pub target: TargetKind,
    /// Expanded-list index of the swapchain-backed attachment.
    pub window_attachment: Option<usize>,
}

impl PassPlan {
    /// Expand attachment timelines into a complete pass layout.
    ///
    /// Multisampled attachments with a `Resolve` use get a synthetic
    /// single-sample target appended after the originals; the expanded
    /// order is also the framebuffer view-binding order.
    pub fn plan(
        descs: &[AttachmentDesc],
        samples: u32,
        target: TargetKind,
    ) -> Result<Self> {
        if descs.is_empty() {
            return Err(GpuError::InvalidState(
                "render pass needs at least one attachment".to_string(),
            ));
        }
        if samples == 0 {
            return Err(GpuError::UnsupportedSampleCount(0));
        }
        let subpass_count = descs[0].uses.len();
        if subpass_count == 0 {
            return Err(GpuError::InvalidState(format!(
                "attachment '{}' has an empty usage timeline",
                descs[0].name
            )));
        }
        for desc in descs {
            if desc.uses.len() != subpass_count {
                return Err(GpuError::InvalidState(format!(
                    "attachment '{}' covers {} subpasses, expected {}",
                    desc.name,
                    desc.uses.len(),
                    subpass_count
                )));
            }
            if desc.uses.iter().all(|&use_kind| use_kind == AttachmentUse::Unused) {
                return Err(GpuError::InvalidState(format!(
                    "attachment '{}' is never used",
                    desc.name
                )));
            }
        }
        if samples > 1 && !descs.iter().any(|desc| desc.msaa) {
            return Err(GpuError::InvalidState(
                "multisampling requested on a pass with no multisampled attachments".to_string(),
            ));
        }

        // Originals first, in caller order. A Resolve use only survives when
        // the attachment actually runs multisampled; otherwise it degrades
        // to a plain Output.
        let mut attachments: Vec<PlannedAttachment> = Vec::new();
        for desc in descs {
            let is_depth = is_depth_format(desc.format);
            let effective_samples = if desc.msaa { samples } else { 1 };
            let wants_resolve = desc.uses.contains(&AttachmentUse::Resolve);
            if is_depth && wants_resolve {
                return Err(GpuError::InvalidState(format!(
                    "depth attachment '{}' cannot be resolved",
                    desc.name
                )));
            }
            let resolves = effective_samples > 1 && wants_resolve;
            let uses: Vec<AttachmentUse> = desc
                .uses
                .iter()
                .map(|&use_kind| {
                    if use_kind == AttachmentUse::Resolve && !resolves {
                        AttachmentUse::Output
                    } else {
                        use_kind
                    }
                })
                .collect();
            attachments.push(PlannedAttachment {
                name: desc.name.clone(),
                format: desc.format,
                samples: effective_samples,
                // A resolved attachment dies with the pass; preservation
                // transfers to its resolve target.
                preserve: desc.preserve && !resolves,
                is_depth,
                window_bound: false,
                resolve_of: None,
                uses,
                load_op: vk::AttachmentLoadOp::DONT_CARE,
                store_op: vk::AttachmentStoreOp::DONT_CARE,
                initial_layout: vk::ImageLayout::UNDEFINED,
                final_layout: vk::ImageLayout::UNDEFINED,
                usage: vk::ImageUsageFlags::empty(),
            });
        }

        let source_count = attachments.len();
        let mut resolve_target: Vec<Option<usize>> = vec![None; source_count];
        for index in 0..source_count {
            if !attachments[index].uses.contains(&AttachmentUse::Resolve) {
                continue;
            }
            let source = attachments[index].clone();
            let uses: Vec<AttachmentUse> = source
                .uses
                .iter()
                .map(|&use_kind| {
                    if use_kind == AttachmentUse::Resolve {
                        AttachmentUse::Resolve
                    } else {
                        AttachmentUse::Unused
                    }
                })
                .collect();
            resolve_target[index] = Some(attachments.len());
            attachments.push(PlannedAttachment {
                name: format!("{}.resolve", source.name),
                format: source.format,
                samples: 1,
                preserve: descs[index].preserve,
                is_depth: false,
                window_bound: false,
                resolve_of: Some(index),
                uses,
                load_op: vk::AttachmentLoadOp::DONT_CARE,
                store_op: vk::AttachmentStoreOp::DONT_CARE,
                initial_layout: vk::ImageLayout::UNDEFINED,
                final_layout: vk::ImageLayout::UNDEFINED,
                usage: vk::ImageUsageFlags::empty(),
            });
        }

        let window_attachment = match target {
            TargetKind::Window => {
                let candidates: Vec<usize> = attachments
                    .iter()
                    .enumerate()
                    .filter(|(_, attachment)| {
                        attachment.preserve && !attachment.is_depth && attachment.samples == 1
                    })
                    .map(|(index, _)| index)
                    .collect();
                match candidates.as_slice() {
                    [index] => {
                        attachments[*index].window_bound = true;
                        Some(*index)
                    }
                    [] => {
                        return Err(GpuError::InvalidState(
                            "window pass needs one preserved single-sample color attachment"
                                .to_string(),
                        ))
                    }
                    _ => {
                        return Err(GpuError::InvalidState(
                            "window pass has more than one preserved single-sample color attachment"
                                .to_string(),
                        ))
                    }
                }
            }
            TargetKind::Offscreen => None,
        };

        for attachment in &mut attachments {
            let first_use = attachment
                .uses
                .iter()
                .find(|&&use_kind| use_kind != AttachmentUse::Unused)
                .copied()
                .unwrap_or(AttachmentUse::Unused);
            let last_use = attachment
                .uses
                .iter()
                .rev()
                .find(|&&use_kind| use_kind != AttachmentUse::Unused)
                .copied()
                .unwrap_or(AttachmentUse::Unused);

            (attachment.load_op, attachment.initial_layout) =
                if attachment.resolve_of.is_some() {
                    // Fully overwritten by the resolve.
                    (vk::AttachmentLoadOp::DONT_CARE, vk::ImageLayout::UNDEFINED)
                } else if first_use == AttachmentUse::Input {
                    // Content arrives from an earlier pass.
                    (
                        vk::AttachmentLoadOp::LOAD,
                        read_layout(attachment.is_depth),
                    )
                } else {
                    (vk::AttachmentLoadOp::CLEAR, vk::ImageLayout::UNDEFINED)
                };

            attachment.store_op = if attachment.preserve {
                vk::AttachmentStoreOp::STORE
            } else {
                vk::AttachmentStoreOp::DONT_CARE
            };

            attachment.final_layout = if attachment.preserve {
                if attachment.window_bound {
                    vk::ImageLayout::PRESENT_SRC_KHR
                } else {
                    read_layout(attachment.is_depth)
                }
            } else {
                match last_use {
                    AttachmentUse::Input => read_layout(attachment.is_depth),
                    AttachmentUse::Output if attachment.is_depth => {
                        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
                    }
                    _ => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                }
            };

            attachment.usage = if attachment.is_depth {
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
            } else {
                vk::ImageUsageFlags::COLOR_ATTACHMENT
            };
            if attachment.uses.contains(&AttachmentUse::Input) {
                attachment.usage |= vk::ImageUsageFlags::INPUT_ATTACHMENT;
            }
            if attachment.preserve && !attachment.window_bound {
                attachment.usage |= vk::ImageUsageFlags::SAMPLED;
            }
        }

        let mut subpasses = Vec::with_capacity(subpass_count);
        for subpass in 0..subpass_count {
            let mut plan = SubpassPlan::default();
            for (index, attachment) in attachments.iter().enumerate() {
                // Synthetic targets are referenced through the resolve slots
                // of the attachment they resolve.
                if attachment.resolve_of.is_some() {
                    continue;
                }
                match attachment.uses[subpass] {
                    AttachmentUse::Unused => {}
                    AttachmentUse::Input => plan
                        .inputs
                        .push((index as u32, read_layout(attachment.is_depth))),
                    AttachmentUse::Output => {
                        if attachment.is_depth {
                            if plan.depth.is_some() {
                                return Err(GpuError::InvalidState(format!(
                                    "subpass {subpass} binds two depth attachments"
                                )));
                            }
                            plan.depth = Some((
                                index as u32,
                                vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                            ));
                        } else {
                            plan.colors
                                .push((index as u32, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL));
                            plan.resolves
                                .push((vk::ATTACHMENT_UNUSED, vk::ImageLayout::UNDEFINED));
                        }
                    }
                    AttachmentUse::Resolve => {
                        let Some(resolved_into) = resolve_target[index] else {
                            return Err(GpuError::InvalidState(format!(
                                "attachment '{}' resolves without a target",
                                attachment.name
                            )));
                        };
                        plan.colors
                            .push((index as u32, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL));
                        plan.resolves.push((
                            resolved_into as u32,
                            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                        ));
                    }
                }
            }
            if plan
                .resolves
                .iter()
                .all(|&(index, _)| index == vk::ATTACHMENT_UNUSED)
            {
                plan.resolves.clear();
            }

            // Attachments alive across this subpass without being referenced
            // must be listed as preserved.
            for (index, attachment) in attachments.iter().enumerate() {
                if attachment.uses[subpass] != AttachmentUse::Unused {
                    continue;
                }
                let first = attachment
                    .uses
                    .iter()
                    .position(|&use_kind| use_kind != AttachmentUse::Unused);
                let last = attachment
                    .uses
                    .iter()
                    .rposition(|&use_kind| use_kind != AttachmentUse::Unused);
                if let (Some(first), Some(last)) = (first, last) {
                    if first < subpass && subpass < last {
                        plan.preserves.push(index as u32);
                    }
                }
            }
            subpasses.push(plan);
        }

        // One dependency per consecutive pair of real uses, plus a trailing
        // external edge for preserved attachments. Identical (src, dst)
        // pairs merge by OR-ing their masks.
        let mut dependencies: Vec<PlannedDependency> = Vec::new();
        for attachment in &attachments {
            let timeline: Vec<(usize, AttachmentUse)> = attachment
                .uses
                .iter()
                .enumerate()
                .filter(|(_, &use_kind)| use_kind != AttachmentUse::Unused)
                .map(|(subpass, &use_kind)| (subpass, use_kind))
                .collect();

            for pair in timeline.windows(2) {
                let (src_subpass, src_use) = pair[0];
                let (dst_subpass, dst_use) = pair[1];
                let (src_stages, src_access) = source_masks(src_use, attachment.is_depth);
                let (dst_stages, dst_access) = dest_masks(dst_use, attachment.is_depth);
                dependencies.push(PlannedDependency {
                    src_subpass: src_subpass as u32,
                    dst_subpass: dst_subpass as u32,
                    src_stages,
                    src_access,
                    dst_stages,
                    dst_access,
                    by_region: true,
                });
            }

            if attachment.preserve {
                if let Some(&(last_subpass, last_use)) = timeline.last() {
                    let (src_stages, src_access) = source_masks(last_use, attachment.is_depth);
                    let (dst_stages, dst_access) = if attachment.window_bound {
                        (vk::PipelineStageFlags::BOTTOM_OF_PIPE, vk::AccessFlags::empty())
                    } else {
                        (vk::PipelineStageFlags::FRAGMENT_SHADER, vk::AccessFlags::SHADER_READ)
                    };
                    dependencies.push(PlannedDependency {
                        src_subpass: last_subpass as u32,
                        dst_subpass: vk::SUBPASS_EXTERNAL,
                        src_stages,
                        src_access,
                        dst_stages,
                        dst_access,
                        by_region: false,
                    });
                }
            }
        }

        let mut merged: Vec<PlannedDependency> = Vec::new();
        for dependency in dependencies {
            if let Some(existing) = merged.iter_mut().find(|existing| {
                existing.src_subpass == dependency.src_subpass
                    && existing.dst_subpass == dependency.dst_subpass
            }) {
                existing.src_stages |= dependency.src_stages;
                existing.src_access |= dependency.src_access;
                existing.dst_stages |= dependency.dst_stages;
                existing.dst_access |= dependency.dst_access;
                existing.by_region &= dependency.by_region;
            } else {
                merged.push(dependency);
            }
        }

        Ok(Self {
            attachments,
            subpasses,
            dependencies: merged,
            samples,
            target,
            window_attachment,
        })
    }

    /// Number of subpasses.
    pub fn subpass_count(&self) -> usize {
        self.subpasses.len()
    }
}

/// Render pass with an always-built single-sample variant and a lazily
/// built multisampled one.
pub struct RenderPass {
    descs: Vec<AttachmentDesc>,
    target: TargetKind,
    base_plan: PassPlan,
    base_pass: vk::RenderPass,
    msaa_plan: Option<PassPlan>,
    msaa_pass: Option<vk::RenderPass>,
    msaa_samples: u32,
    has_msaa_attachments: bool,
}

impl RenderPass {
    /// Plan and build the single-sample render pass.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(
        device: &GraphicsDevice,
        descs: Vec<AttachmentDesc>,
        target: TargetKind,
    ) -> Result<Self> {
        let base_plan = PassPlan::plan(&descs, 1, target)?;
        let base_pass = build_render_pass(device.device(), &base_plan)?;
        let has_msaa_attachments = descs.iter().any(|desc| desc.msaa);

        tracing::debug!(
            "Render pass built: {} attachments, {} subpasses, {} dependencies",
            base_plan.attachments.len(),
            base_plan.subpasses.len(),
            base_plan.dependencies.len(),
        );

        Ok(Self {
            descs,
            target,
            base_plan,
            base_pass,
            msaa_plan: None,
            msaa_pass: None,
            msaa_samples: 0,
            has_msaa_attachments,
        })
    }

    /// Target kind the pass renders to.
    pub fn target(&self) -> TargetKind {
        self.target
    }

    /// Single-sample render pass handle.
    pub fn handle(&self) -> vk::RenderPass {
        self.base_pass
    }

    /// Single-sample plan.
    pub fn plan(&self) -> &PassPlan {
        &self.base_plan
    }

    /// Number of subpasses.
    pub fn subpass_count(&self) -> usize {
        self.base_plan.subpass_count()
    }

    /// Handle for the requested sample count, building or rebuilding the
    /// multisampled variant when needed.
    ///
    /// Asking for more than one sample on a pass without multisampled
    /// attachments, or an unsupported count, is a usage error.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn handle_for(
        &mut self,
        device: &GraphicsDevice,
        samples: u32,
    ) -> Result<vk::RenderPass> {
        if samples <= 1 {
            return Ok(self.base_pass);
        }
        if !self.has_msaa_attachments {
            return Err(GpuError::InvalidState(
                "multisampling requested on a pass with no multisampled attachments".to_string(),
            ));
        }
        let Some(flag) = capabilities::sample_count_flag(samples) else {
            return Err(GpuError::UnsupportedSampleCount(samples));
        };
        if !device.info().supports_sample_count(flag) {
            return Err(GpuError::UnsupportedSampleCount(samples));
        }
        if samples == self.msaa_samples {
            if let Some(pass) = self.msaa_pass {
                return Ok(pass);
            }
        }

        if let Some(old) = self.msaa_pass.take() {
            device.defer_destroy(move |dev| dev.destroy_render_pass(old, None));
        }
        let plan = PassPlan::plan(&self.descs, samples, self.target)?;
        let pass = build_render_pass(device.device(), &plan)?;
        tracing::debug!("Render pass multisample variant built for {samples} samples");

        self.msaa_plan = Some(plan);
        self.msaa_pass = Some(pass);
        self.msaa_samples = samples;
        Ok(pass)
    }

    /// Plan for a sample count whose variant has been built.
    pub fn plan_for(&self, samples: u32) -> Result<&PassPlan> {
        if samples <= 1 {
            return Ok(&self.base_plan);
        }
        if samples == self.msaa_samples {
            if let Some(plan) = self.msaa_plan.as_ref() {
                return Ok(plan);
            }
        }
        Err(GpuError::InvalidState(format!(
            "no render pass variant built for {samples} samples"
        )))
    }

    /// Destroy both variants.
    ///
    /// # Safety
    /// The device must be valid and the pass must not be in use.
    pub unsafe fn destroy(&mut self, device: &GraphicsDevice) {
        let dev = device.device();
        dev.destroy_render_pass(self.base_pass, None);
        if let Some(pass) = self.msaa_pass.take() {
            dev.destroy_render_pass(pass, None);
        }
    }
}

/// Build a `vk::RenderPass` from a plan.
///
/// # Safety
/// The device must be valid.
pub unsafe fn build_render_pass(
    device: &ash::Device,
    plan: &PassPlan,
) -> Result<vk::RenderPass> {
    let attachment_descs = plan
        .attachments
        .iter()
        .map(|attachment| {
            let samples = capabilities::sample_count_flag(attachment.samples)
                .ok_or(GpuError::UnsupportedSampleCount(attachment.samples))?;
            Ok(vk::AttachmentDescription::default()
                .format(attachment.format)
                .samples(samples)
                .load_op(attachment.load_op)
                .store_op(attachment.store_op)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(attachment.initial_layout)
                .final_layout(attachment.final_layout))
        })
        .collect::<Result<Vec<_>>>()?;

    struct SubpassRefs {
        inputs: Vec<vk::AttachmentReference>,
        colors: Vec<vk::AttachmentReference>,
        resolves: Vec<vk::AttachmentReference>,
        depth: Option<vk::AttachmentReference>,
        preserves: Vec<u32>,
    }

    let reference = |(attachment, layout): (u32, vk::ImageLayout)| vk::AttachmentReference {
        attachment,
        layout,
    };

    let refs: Vec<SubpassRefs> = plan
        .subpasses
        .iter()
        .map(|subpass| SubpassRefs {
            inputs: subpass.inputs.iter().copied().map(reference).collect(),
            colors: subpass.colors.iter().copied().map(reference).collect(),
            resolves: subpass.resolves.iter().copied().map(reference).collect(),
            depth: subpass.depth.map(reference),
            preserves: subpass.preserves.clone(),
        })
        .collect();

    let subpass_descs: Vec<vk::SubpassDescription> = refs
        .iter()
        .map(|subpass| {
            let mut desc = vk::SubpassDescription::default()
                .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
                .input_attachments(&subpass.inputs)
                .color_attachments(&subpass.colors)
                .preserve_attachments(&subpass.preserves);
            if !subpass.resolves.is_empty() {
                desc = desc.resolve_attachments(&subpass.resolves);
            }
            if let Some(depth) = &subpass.depth {
                desc = desc.depth_stencil_attachment(depth);
            }
            desc
        })
        .collect();

    let dependencies: Vec<vk::SubpassDependency> = plan
        .dependencies
        .iter()
        .map(|dependency| {
            let mut dep = vk::SubpassDependency::default()
                .src_subpass(dependency.src_subpass)
                .dst_subpass(dependency.dst_subpass)
                .src_stage_mask(dependency.src_stages)
                .src_access_mask(dependency.src_access)
                .dst_stage_mask(dependency.dst_stages)
                .dst_access_mask(dependency.dst_access);
            if dependency.by_region {
                dep = dep.dependency_flags(vk::DependencyFlags::BY_REGION);
            }
            dep
        })
        .collect();

    let create_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachment_descs)
        .subpasses(&subpass_descs)
        .dependencies(&dependencies);

    let pass = device.create_render_pass(&create_info, None)?;
    Ok(pass)
}

/// Whether a format carries depth data.
pub fn is_depth_format(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D16_UNORM
            | vk::Format::X8_D24_UNORM_PACK32
            | vk::Format::D32_SFLOAT
            | vk::Format::D16_UNORM_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D32_SFLOAT_S8_UINT
    )
}

/// Image aspect flags for a format.
pub fn format_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::X8_D24_UNORM_PACK32 | vk::Format::D32_SFLOAT => {
            vk::ImageAspectFlags::DEPTH
        }
        vk::Format::D16_UNORM_S8_UINT
        | vk::Format::D24_UNORM_S8_UINT
        | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
        _ => vk::ImageAspectFlags::COLOR,
    }
}

fn read_layout(is_depth: bool) -> vk::ImageLayout {
    if is_depth {
        vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
    } else {
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
    }
}

fn source_masks(
    use_kind: AttachmentUse,
    is_depth: bool,
) -> (vk::PipelineStageFlags, vk::AccessFlags) {
    match use_kind {
        AttachmentUse::Input => (
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::AccessFlags::INPUT_ATTACHMENT_READ,
        ),
        AttachmentUse::Output if is_depth => (
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ),
        AttachmentUse::Output | AttachmentUse::Resolve => (
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        ),
        AttachmentUse::Unused => (vk::PipelineStageFlags::empty(), vk::AccessFlags::empty()),
    }
}

fn dest_masks(
    use_kind: AttachmentUse,
    is_depth: bool,
) -> (vk::PipelineStageFlags, vk::AccessFlags) {
    match use_kind {
        AttachmentUse::Input => (
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::AccessFlags::INPUT_ATTACHMENT_READ,
        ),
        AttachmentUse::Output if is_depth => (
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ),
        AttachmentUse::Output | AttachmentUse::Resolve => (
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        ),
        AttachmentUse::Unused => (vk::PipelineStageFlags::empty(), vk::AccessFlags::empty()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window_color(uses: Vec<AttachmentUse>) -> AttachmentDesc {
        AttachmentDesc::new("color", vk::Format::B8G8R8A8_SRGB)
            .preserve(true)
            .uses(uses)
    }

    #[test]
    fn resolve_expansion_appends_synthetic_target() {
        let descs = vec![window_color(vec![AttachmentUse::Resolve]).msaa(true)];
        let plan = PassPlan::plan(&descs, 4, TargetKind::Window).unwrap();

        assert_eq!(plan.attachments.len(), 2);
        let source = &plan.attachments[0];
        let target = &plan.attachments[1];

        assert_eq!(source.samples, 4);
        assert!(!source.preserve);
        assert_eq!(source.store_op, vk::AttachmentStoreOp::DONT_CARE);

        assert_eq!(target.resolve_of, Some(0));
        assert_eq!(target.samples, 1);
        assert!(target.preserve);
        assert!(target.window_bound);
        assert_eq!(target.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);

        assert_eq!(plan.subpasses[0].colors, vec![(
            0,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        )]);
        assert_eq!(plan.subpasses[0].resolves, vec![(
            1,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        )]);
        assert_eq!(plan.window_attachment, Some(1));
    }

    #[test]
    fn resolve_degrades_at_one_sample() {
        let descs = vec![window_color(vec![AttachmentUse::Resolve]).msaa(true)];
        let plan = PassPlan::plan(&descs, 1, TargetKind::Window).unwrap();

        assert_eq!(plan.attachments.len(), 1);
        let color = &plan.attachments[0];
        assert_eq!(color.uses, vec![AttachmentUse::Output]);
        assert!(color.window_bound);
        assert_eq!(color.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert!(plan.subpasses[0].resolves.is_empty());
    }

    #[test]
    fn producer_consumer_emits_one_dependency_each_way() {
        let descs = vec![AttachmentDesc::new("gbuffer", vk::Format::R16G16B16A16_SFLOAT)
            .preserve(true)
            .uses(vec![AttachmentUse::Output, AttachmentUse::Input])];
        let plan = PassPlan::plan(&descs, 1, TargetKind::Offscreen).unwrap();

        let internal: Vec<_> = plan
            .dependencies
            .iter()
            .filter(|dep| dep.src_subpass == 0 && dep.dst_subpass == 1)
            .collect();
        assert_eq!(internal.len(), 1);
        assert_eq!(internal[0].dst_stages, vk::PipelineStageFlags::FRAGMENT_SHADER);
        assert_eq!(internal[0].dst_access, vk::AccessFlags::INPUT_ATTACHMENT_READ);
        assert!(internal[0].by_region);

        let trailing: Vec<_> = plan
            .dependencies
            .iter()
            .filter(|dep| dep.dst_subpass == vk::SUBPASS_EXTERNAL)
            .collect();
        assert_eq!(trailing.len(), 1);
        assert_eq!(trailing[0].src_subpass, 1);
    }

    #[test]
    fn identical_edges_merge() {
        let descs = vec![
            AttachmentDesc::new("albedo", vk::Format::R8G8B8A8_UNORM)
                .uses(vec![AttachmentUse::Output, AttachmentUse::Input]),
            AttachmentDesc::new("normal", vk::Format::R16G16B16A16_SFLOAT)
                .uses(vec![AttachmentUse::Output, AttachmentUse::Input]),
        ];
        let plan = PassPlan::plan(&descs, 1, TargetKind::Offscreen).unwrap();

        let internal: Vec<_> = plan
            .dependencies
            .iter()
            .filter(|dep| dep.src_subpass == 0 && dep.dst_subpass == 1)
            .collect();
        assert_eq!(internal.len(), 1);
    }

    #[test]
    fn depth_output_takes_the_depth_slot() {
        let descs = vec![
            window_color(vec![AttachmentUse::Output]),
            AttachmentDesc::new("depth", vk::Format::D32_SFLOAT)
                .uses(vec![AttachmentUse::Output]),
        ];
        let plan = PassPlan::plan(&descs, 1, TargetKind::Window).unwrap();

        assert_eq!(plan.subpasses[0].colors.len(), 1);
        assert_eq!(
            plan.subpasses[0].depth,
            Some((1, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL))
        );
        assert_eq!(
            plan.attachments[1].final_layout,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        );
    }

    #[test]
    fn unused_middle_subpass_preserves_attachment() {
        let descs = vec![
            AttachmentDesc::new("shadow", vk::Format::R8G8B8A8_UNORM).uses(vec![
                AttachmentUse::Output,
                AttachmentUse::Unused,
                AttachmentUse::Input,
            ]),
            AttachmentDesc::new("mid", vk::Format::R8G8B8A8_UNORM).uses(vec![
                AttachmentUse::Unused,
                AttachmentUse::Output,
                AttachmentUse::Unused,
            ]),
        ];
        let plan = PassPlan::plan(&descs, 1, TargetKind::Offscreen).unwrap();
        assert_eq!(plan.subpasses[1].preserves, vec![0]);
        assert!(plan.subpasses[0].preserves.is_empty());
        assert!(plan.subpasses[2].preserves.is_empty());
    }

    #[test]
    fn msaa_request_without_msaa_attachments_is_rejected() {
        let descs = vec![window_color(vec![AttachmentUse::Output])];
        let result = PassPlan::plan(&descs, 4, TargetKind::Window);
        assert!(matches!(result, Err(GpuError::InvalidState(_))));
    }

    #[test]
    fn window_pass_needs_a_preserved_color_target() {
        let descs = vec![AttachmentDesc::new("scratch", vk::Format::R8G8B8A8_UNORM)
            .uses(vec![AttachmentUse::Output])];
        let result = PassPlan::plan(&descs, 1, TargetKind::Window);
        assert!(matches!(result, Err(GpuError::InvalidState(_))));
    }

    #[test]
    fn mismatched_timelines_are_rejected() {
        let descs = vec![
            window_color(vec![AttachmentUse::Output, AttachmentUse::Unused]),
            AttachmentDesc::new("depth", vk::Format::D32_SFLOAT)
                .uses(vec![AttachmentUse::Output]),
        ];
        let result = PassPlan::plan(&descs, 1, TargetKind::Window);
        assert!(matches!(result, Err(GpuError::InvalidState(_))));
    }

    #[test]
    fn preserved_offscreen_attachment_reads_back() {
        let descs = vec![AttachmentDesc::new("bloom", vk::Format::R16G16B16A16_SFLOAT)
            .preserve(true)
            .uses(vec![AttachmentUse::Output])];
        let plan = PassPlan::plan(&descs, 1, TargetKind::Offscreen).unwrap();

        let bloom = &plan.attachments[0];
        assert_eq!(bloom.final_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(bloom.store_op, vk::AttachmentStoreOp::STORE);
        assert!(bloom.usage.contains(vk::ImageUsageFlags::SAMPLED));
    }
}
