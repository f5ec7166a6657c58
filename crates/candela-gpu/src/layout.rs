//! Binding layout merging and pipeline layouts.
//!
//! Each binding namespace maps to one descriptor set, with the namespace
//! index as the set index and the slot as the binding index. Slots claimed
//! by more than one module must agree on their type information; a
//! disagreement means the modules were not compiled against each other and
//! the merge fails naming the offending stage.

use ash::vk;

use crate::device::GraphicsDevice;
use crate::error::{GpuError, Result};
use crate::shader::{
    BindingNamespace, BindingSlot, ShaderReflection, ShaderStage, StageFlags,
};

/// Merged per-namespace binding tables.
#[derive(Debug, Clone)]
pub struct BindingLayout {
    groups: [Vec<Option<BindingSlot>>; BindingNamespace::ALL.len()],
}

impl BindingLayout {
    /// Empty layout with every namespace table at its fixed size.
    pub fn new() -> Self {
        Self {
            groups: BindingNamespace::ALL.map(|namespace| vec![None; namespace.table_size()]),
        }
    }

    /// Build a layout from one container's reflection, merging each stage's
    /// view of the bindings.
    pub fn from_reflection(reflection: &ShaderReflection) -> Result<Self> {
        let mut layout = Self::new();
        layout.merge_reflection(reflection)?;
        Ok(layout)
    }

    /// Merge a container's bindings stage by stage.
    pub fn merge_reflection(&mut self, reflection: &ShaderReflection) -> Result<()> {
        for (stage, flag) in [
            (ShaderStage::Vertex, StageFlags::VERTEX),
            (ShaderStage::Fragment, StageFlags::FRAGMENT),
        ] {
            let stage_bindings: Vec<BindingSlot> = reflection
                .bindings
                .iter()
                .filter(|binding| binding.stages.contains(flag))
                .map(|binding| BindingSlot {
                    stages: flag,
                    ..*binding
                })
                .collect();
            self.merge(stage, &stage_bindings)?;
        }
        Ok(())
    }

    /// Merge one module's binding table into the layout.
    ///
    /// A slot already claimed by another module must match in kind, array
    /// length, texture dimension and block size; its stage mask is unioned.
    pub fn merge(&mut self, stage: ShaderStage, bindings: &[BindingSlot]) -> Result<()> {
        for binding in bindings {
            let table = &mut self.groups[binding.namespace.set_index() as usize];
            let index = binding.slot as usize;
            if index >= table.len() {
                return Err(conflict(
                    stage,
                    binding,
                    format!("slot exceeds the table size {}", table.len()),
                ));
            }

            match &mut table[index] {
                Some(existing) => {
                    if existing.kind != binding.kind {
                        return Err(conflict(
                            stage,
                            binding,
                            format!("kind {:?} conflicts with {:?}", binding.kind, existing.kind),
                        ));
                    }
                    if existing.array_len != binding.array_len {
                        return Err(conflict(
                            stage,
                            binding,
                            format!(
                                "array length {} conflicts with {}",
                                binding.array_len, existing.array_len
                            ),
                        ));
                    }
                    if existing.dim != binding.dim {
                        return Err(conflict(
                            stage,
                            binding,
                            format!(
                                "texture dimension {:?} conflicts with {:?}",
                                binding.dim, existing.dim
                            ),
                        ));
                    }
                    if existing.block_size != binding.block_size {
                        return Err(conflict(
                            stage,
                            binding,
                            format!(
                                "block size {} conflicts with {}",
                                binding.block_size, existing.block_size
                            ),
                        ));
                    }
                    existing.stages |= binding.stages;
                }
                empty => *empty = Some(*binding),
            }
        }
        Ok(())
    }

    /// Slot table of one namespace, indexed by slot.
    pub fn group(&self, namespace: BindingNamespace) -> &[Option<BindingSlot>] {
        &self.groups[namespace.set_index() as usize]
    }

    /// Look up one merged slot.
    pub fn slot(&self, namespace: BindingNamespace, slot: u32) -> Option<&BindingSlot> {
        self.groups[namespace.set_index() as usize]
            .get(slot as usize)
            .and_then(Option::as_ref)
    }

    /// Number of occupied slots across all namespaces.
    pub fn binding_count(&self) -> usize {
        self.groups
            .iter()
            .map(|table| table.iter().flatten().count())
            .sum()
    }
}

impl Default for BindingLayout {
    fn default() -> Self {
        Self::new()
    }
}

fn conflict(stage: ShaderStage, binding: &BindingSlot, reason: String) -> GpuError {
    GpuError::IncompatibleModule {
        stage: stage.to_string(),
        reason: format!("{:?} slot {}: {reason}", binding.namespace, binding.slot),
    }
}

/// Immutable GPU-side layout shared across pipelines: the merged bindings,
/// one descriptor set layout per namespace and the pipeline layout.
///
/// Shared through `Arc`; the final owner queues the handles on the deferred
/// destruction queue so no in-flight frame can still reference them.
pub struct ShaderLayout {
    bindings: BindingLayout,
    reflection: ShaderReflection,
    set_layouts: [vk::DescriptorSetLayout; BindingNamespace::ALL.len()],
    pipeline_layout: vk::PipelineLayout,
}

impl ShaderLayout {
    /// Merge the reflection and create the Vulkan layout objects.
    ///
    /// Empty namespaces still get a (bindingless) set layout so set indices
    /// stay equal to namespace indices.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(device: &GraphicsDevice, reflection: ShaderReflection) -> Result<Self> {
        let bindings = BindingLayout::from_reflection(&reflection)?;
        let dev = device.device();

        let mut set_layouts =
            [vk::DescriptorSetLayout::null(); BindingNamespace::ALL.len()];
        for namespace in BindingNamespace::ALL {
            let entries: Vec<vk::DescriptorSetLayoutBinding> = bindings
                .group(namespace)
                .iter()
                .flatten()
                .map(|slot| {
                    vk::DescriptorSetLayoutBinding::default()
                        .binding(slot.slot)
                        .descriptor_type(slot.kind.descriptor_type())
                        .descriptor_count(slot.array_len)
                        .stage_flags(slot.stages.to_vk())
                })
                .collect();
            let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&entries);
            set_layouts[namespace.set_index() as usize] =
                dev.create_descriptor_set_layout(&create_info, None)?;
        }

        let pipeline_info = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);
        let pipeline_layout = dev.create_pipeline_layout(&pipeline_info, None)?;

        Ok(Self {
            bindings,
            reflection,
            set_layouts,
            pipeline_layout,
        })
    }

    /// Merged binding tables.
    pub fn bindings(&self) -> &BindingLayout {
        &self.bindings
    }

    /// Reflection the layout was built from.
    pub fn reflection(&self) -> &ShaderReflection {
        &self.reflection
    }

    /// Descriptor set layouts in namespace order.
    pub fn set_layouts(&self) -> &[vk::DescriptorSetLayout] {
        &self.set_layouts
    }

    /// Set layout of one namespace.
    pub fn set_layout(&self, namespace: BindingNamespace) -> vk::DescriptorSetLayout {
        self.set_layouts[namespace.set_index() as usize]
    }

    /// Pipeline layout handle.
    pub fn pipeline_layout(&self) -> vk::PipelineLayout {
        self.pipeline_layout
    }

    /// Queue the layout handles for destruction once every in-flight frame
    /// has retired.
    pub fn destroy_deferred(&self, device: &GraphicsDevice) {
        let set_layouts = self.set_layouts;
        let pipeline_layout = self.pipeline_layout;
        device.defer_destroy(move |dev| unsafe {
            for layout in set_layouts {
                dev.destroy_descriptor_set_layout(layout, None);
            }
            dev.destroy_pipeline_layout(pipeline_layout, None);
        });
    }

    /// Destroy the layout handles immediately.
    ///
    /// # Safety
    /// The device must be valid and no pipeline or bound set may still use
    /// the layouts.
    pub unsafe fn destroy_now(&self, device: &GraphicsDevice) {
        let dev = device.device();
        for layout in self.set_layouts {
            dev.destroy_descriptor_set_layout(layout, None);
        }
        dev.destroy_pipeline_layout(self.pipeline_layout, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::{BindingKind, TextureDim};

    fn slot(
        namespace: BindingNamespace,
        index: u32,
        kind: BindingKind,
        stages: StageFlags,
    ) -> BindingSlot {
        BindingSlot {
            namespace,
            slot: index,
            kind,
            array_len: 1,
            dim: TextureDim::None,
            stages,
            block_size: 0,
        }
    }

    #[test]
    fn shared_slot_unions_stage_masks() {
        let reflection = ShaderReflection {
            bindings: vec![slot(
                BindingNamespace::Buffers,
                0,
                BindingKind::UniformBuffer,
                StageFlags::all(),
            )],
            ..Default::default()
        };
        let layout = BindingLayout::from_reflection(&reflection).unwrap();

        let merged = layout.slot(BindingNamespace::Buffers, 0).unwrap();
        assert_eq!(merged.stages, StageFlags::all());
        assert_eq!(layout.binding_count(), 1);
    }

    #[test]
    fn kind_conflict_names_the_merging_stage() {
        let mut layout = BindingLayout::new();
        layout
            .merge(
                ShaderStage::Vertex,
                &[slot(
                    BindingNamespace::Buffers,
                    2,
                    BindingKind::UniformBuffer,
                    StageFlags::VERTEX,
                )],
            )
            .unwrap();

        let err = layout
            .merge(
                ShaderStage::Fragment,
                &[slot(
                    BindingNamespace::Buffers,
                    2,
                    BindingKind::StorageBuffer,
                    StageFlags::FRAGMENT,
                )],
            )
            .unwrap_err();

        match err {
            GpuError::IncompatibleModule { stage, reason } => {
                assert_eq!(stage, "fragment");
                assert!(reason.contains("kind"));
            }
            other => panic!("expected IncompatibleModule, got {other:?}"),
        }
    }

    #[test]
    fn block_size_conflict_is_reported() {
        let mut layout = BindingLayout::new();
        let mut first = slot(
            BindingNamespace::Buffers,
            0,
            BindingKind::UniformBuffer,
            StageFlags::VERTEX,
        );
        first.block_size = 64;
        layout.merge(ShaderStage::Vertex, &[first]).unwrap();

        let mut second = first;
        second.stages = StageFlags::FRAGMENT;
        second.block_size = 128;
        let err = layout
            .merge(ShaderStage::Fragment, &[second])
            .unwrap_err();
        assert!(err.to_string().contains("block size"));
    }

    #[test]
    fn dimension_conflict_is_reported() {
        let mut layout = BindingLayout::new();
        let mut first = slot(
            BindingNamespace::Textures,
            1,
            BindingKind::Texture,
            StageFlags::FRAGMENT,
        );
        first.dim = TextureDim::D2;
        layout.merge(ShaderStage::Fragment, &[first]).unwrap();

        let mut second = first;
        second.dim = TextureDim::Cube;
        let err = layout.merge(ShaderStage::Fragment, &[second]).unwrap_err();
        assert!(err.to_string().contains("dimension"));
    }

    #[test]
    fn matching_slots_merge_across_stages() {
        let mut layout = BindingLayout::new();
        layout
            .merge(
                ShaderStage::Vertex,
                &[slot(
                    BindingNamespace::Samplers,
                    3,
                    BindingKind::Sampler,
                    StageFlags::VERTEX,
                )],
            )
            .unwrap();
        layout
            .merge(
                ShaderStage::Fragment,
                &[slot(
                    BindingNamespace::Samplers,
                    3,
                    BindingKind::Sampler,
                    StageFlags::FRAGMENT,
                )],
            )
            .unwrap();

        let merged = layout.slot(BindingNamespace::Samplers, 3).unwrap();
        assert_eq!(merged.stages, StageFlags::all());
    }

    #[test]
    fn out_of_table_slot_is_rejected() {
        let mut layout = BindingLayout::new();
        let err = layout
            .merge(
                ShaderStage::Vertex,
                &[slot(
                    BindingNamespace::InputAttachments,
                    5,
                    BindingKind::InputAttachment,
                    StageFlags::FRAGMENT,
                )],
            )
            .unwrap_err();
        assert!(matches!(err, GpuError::IncompatibleModule { .. }));
    }
}
