//! Shader container loading and reflection.
//!
//! Compiled shaders ship as a binary container holding the SPIR-V for a
//! vertex and a fragment stage plus the reflection tables the engine needs
//! to derive vertex input state and binding layouts. The loader validates
//! the header against the engine's compiled-in limits and rejects anything
//! malformed; a rejected container is an asset pipeline failure, never a
//! condition to recover from at runtime.

use std::fmt;
use std::path::Path;

use ash::vk;
use bitflags::bitflags;

use crate::error::{GpuError, Result};

/// Leading magic of a shader container file.
pub const SHADER_MAGIC: [u8; 4] = *b"CSBC";
/// Container format major version this loader understands.
pub const SHADER_VERSION_MAJOR: u8 = 1;

/// Binding slots available in the buffer namespace.
pub const MAX_BUFFER_BINDINGS: usize = 8;
/// Binding slots available in the sampler namespace.
pub const MAX_SAMPLER_BINDINGS: usize = 8;
/// Binding slots available in the texture namespace.
pub const MAX_TEXTURE_BINDINGS: usize = 8;
/// Binding slots available in the input attachment namespace.
pub const MAX_INPUT_ATTACHMENT_BINDINGS: usize = 4;

const SPIRV_MAGIC: u32 = 0x0723_0203;

bitflags! {
    /// Shader stages present in a container or accessing a binding.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StageFlags: u8 {
        const VERTEX = 0b01;
        const FRAGMENT = 0b10;
    }
}

impl StageFlags {
    /// Convert to the Vulkan stage mask.
    pub fn to_vk(self) -> vk::ShaderStageFlags {
        let mut flags = vk::ShaderStageFlags::empty();
        if self.contains(Self::VERTEX) {
            flags |= vk::ShaderStageFlags::VERTEX;
        }
        if self.contains(Self::FRAGMENT) {
            flags |= vk::ShaderStageFlags::FRAGMENT;
        }
        flags
    }
}

/// One of the two pipeline stages a container holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    /// Convert to the Vulkan stage flag.
    pub fn to_vk(self) -> vk::ShaderStageFlags {
        match self {
            Self::Vertex => vk::ShaderStageFlags::VERTEX,
            Self::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vertex => write!(f, "vertex"),
            Self::Fragment => write!(f, "fragment"),
        }
    }
}

/// The four fixed binding namespaces. Each maps to one descriptor set with
/// the namespace index as the set index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingNamespace {
    Buffers,
    Samplers,
    Textures,
    InputAttachments,
}

impl BindingNamespace {
    /// All namespaces in set-index order.
    pub const ALL: [Self; 4] = [
        Self::Buffers,
        Self::Samplers,
        Self::Textures,
        Self::InputAttachments,
    ];

    /// Decode the container byte.
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Buffers),
            1 => Some(Self::Samplers),
            2 => Some(Self::Textures),
            3 => Some(Self::InputAttachments),
            _ => None,
        }
    }

    /// Slots available in this namespace.
    pub fn table_size(self) -> usize {
        match self {
            Self::Buffers => MAX_BUFFER_BINDINGS,
            Self::Samplers => MAX_SAMPLER_BINDINGS,
            Self::Textures => MAX_TEXTURE_BINDINGS,
            Self::InputAttachments => MAX_INPUT_ATTACHMENT_BINDINGS,
        }
    }

    /// Descriptor set index backing this namespace.
    pub fn set_index(self) -> u32 {
        match self {
            Self::Buffers => 0,
            Self::Samplers => 1,
            Self::Textures => 2,
            Self::InputAttachments => 3,
        }
    }
}

/// What a binding slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    UniformBuffer,
    StorageBuffer,
    Sampler,
    Texture,
    CombinedTextureSampler,
    InputAttachment,
}

impl BindingKind {
    /// Decode the container byte.
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::UniformBuffer),
            1 => Some(Self::StorageBuffer),
            2 => Some(Self::Sampler),
            3 => Some(Self::Texture),
            4 => Some(Self::CombinedTextureSampler),
            5 => Some(Self::InputAttachment),
            _ => None,
        }
    }

    /// Namespace this kind belongs to.
    pub fn namespace(self) -> BindingNamespace {
        match self {
            Self::UniformBuffer | Self::StorageBuffer => BindingNamespace::Buffers,
            Self::Sampler => BindingNamespace::Samplers,
            Self::Texture | Self::CombinedTextureSampler => BindingNamespace::Textures,
            Self::InputAttachment => BindingNamespace::InputAttachments,
        }
    }

    /// Descriptor type for the binding.
    pub fn descriptor_type(self) -> vk::DescriptorType {
        match self {
            Self::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
            Self::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
            Self::Sampler => vk::DescriptorType::SAMPLER,
            Self::Texture => vk::DescriptorType::SAMPLED_IMAGE,
            Self::CombinedTextureSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            Self::InputAttachment => vk::DescriptorType::INPUT_ATTACHMENT,
        }
    }
}

/// Dimensionality of a texture binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureDim {
    None,
    D1,
    D2,
    D3,
    Cube,
}

impl TextureDim {
    /// Decode the container byte.
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::None),
            1 => Some(Self::D1),
            2 => Some(Self::D2),
            3 => Some(Self::D3),
            4 => Some(Self::Cube),
            _ => None,
        }
    }
}

/// Interface format of a vertex input or fragment output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexFormat {
    Float,
    Float2,
    Float3,
    Float4,
    Int,
    Int2,
    Int3,
    Int4,
    UInt,
    UInt2,
    UInt3,
    UInt4,
}

impl VertexFormat {
    /// Decode the container byte.
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Float),
            1 => Some(Self::Float2),
            2 => Some(Self::Float3),
            3 => Some(Self::Float4),
            4 => Some(Self::Int),
            5 => Some(Self::Int2),
            6 => Some(Self::Int3),
            7 => Some(Self::Int4),
            8 => Some(Self::UInt),
            9 => Some(Self::UInt2),
            10 => Some(Self::UInt3),
            11 => Some(Self::UInt4),
            _ => None,
        }
    }

    /// Matching Vulkan vertex attribute format.
    pub fn to_vk(self) -> vk::Format {
        match self {
            Self::Float => vk::Format::R32_SFLOAT,
            Self::Float2 => vk::Format::R32G32_SFLOAT,
            Self::Float3 => vk::Format::R32G32B32_SFLOAT,
            Self::Float4 => vk::Format::R32G32B32A32_SFLOAT,
            Self::Int => vk::Format::R32_SINT,
            Self::Int2 => vk::Format::R32G32_SINT,
            Self::Int3 => vk::Format::R32G32B32_SINT,
            Self::Int4 => vk::Format::R32G32B32A32_SINT,
            Self::UInt => vk::Format::R32_UINT,
            Self::UInt2 => vk::Format::R32G32_UINT,
            Self::UInt3 => vk::Format::R32G32B32_UINT,
            Self::UInt4 => vk::Format::R32G32B32A32_UINT,
        }
    }

    /// Size of one element in bytes.
    pub fn size(self) -> u32 {
        match self {
            Self::Float | Self::Int | Self::UInt => 4,
            Self::Float2 | Self::Int2 | Self::UInt2 => 8,
            Self::Float3 | Self::Int3 | Self::UInt3 => 12,
            Self::Float4 | Self::Int4 | Self::UInt4 => 16,
        }
    }
}

/// Type of one uniform block member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberType {
    Float,
    Float2,
    Float3,
    Float4,
    Int,
    UInt,
    Mat2,
    Mat3,
    Mat4,
}

impl MemberType {
    /// Decode the container byte.
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Float),
            1 => Some(Self::Float2),
            2 => Some(Self::Float3),
            3 => Some(Self::Float4),
            4 => Some(Self::Int),
            5 => Some(Self::UInt),
            6 => Some(Self::Mat2),
            7 => Some(Self::Mat3),
            8 => Some(Self::Mat4),
            _ => None,
        }
    }
}

/// One reflected vertex input attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexInput {
    pub location: u32,
    pub format: VertexFormat,
    pub array_len: u32,
}

/// One reflected fragment output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentOutput {
    pub location: u32,
    pub format: VertexFormat,
}

/// One reflected binding slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingSlot {
    pub namespace: BindingNamespace,
    pub slot: u32,
    pub kind: BindingKind,
    pub array_len: u32,
    pub dim: TextureDim,
    pub stages: StageFlags,
    /// Size of the backing block for buffer bindings, zero otherwise.
    pub block_size: u32,
}

/// One named member of the uniform block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformMember {
    pub name: String,
    pub offset: u32,
    pub kind: MemberType,
    pub array_len: u32,
}

/// Reflected uniform block layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformLayout {
    pub size: u32,
    pub stages: StageFlags,
    pub members: Vec<UniformMember>,
}

/// One reflected subpass input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubpassInputDesc {
    /// Render pass attachment index the input reads.
    pub attachment: u32,
    /// Slot in the input attachment namespace.
    pub slot: u32,
}

/// Everything the container reflects about its modules.
#[derive(Debug, Clone, Default)]
pub struct ShaderReflection {
    pub vertex_inputs: Vec<VertexInput>,
    pub fragment_outputs: Vec<FragmentOutput>,
    pub bindings: Vec<BindingSlot>,
    pub uniform: Option<UniformLayout>,
    pub subpass_inputs: Vec<SubpassInputDesc>,
}

/// A parsed shader container.
#[derive(Debug, Clone)]
pub struct ShaderContainer {
    /// Stages present; always vertex and fragment.
    pub stages: StageFlags,
    /// Container format version (major, minor).
    pub version: (u8, u8),
    pub reflection: ShaderReflection,
    pub vertex_code: Vec<u32>,
    pub fragment_code: Vec<u32>,
}

impl ShaderContainer {
    /// Parse a container from its raw bytes.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(data);

        let magic = reader.bytes(4, "magic")?;
        if magic != SHADER_MAGIC {
            return Err(GpuError::InvalidShader(format!(
                "bad magic {magic:02x?}, expected \"CSBC\""
            )));
        }

        let version_major = reader.u8("version")?;
        if version_major != SHADER_VERSION_MAJOR {
            return Err(GpuError::InvalidShader(format!(
                "container version {version_major} is not supported, expected {SHADER_VERSION_MAJOR}"
            )));
        }
        let version_minor = reader.u8("version")?;

        let stage_bits = reader.u8("stage mask")?;
        let stages = StageFlags::from_bits(stage_bits).ok_or_else(|| {
            GpuError::InvalidShader(format!("unknown bits in stage mask {stage_bits:#04x}"))
        })?;
        if stages != StageFlags::all() {
            return Err(GpuError::InvalidShader(format!(
                "stage mask {stage_bits:#04x}; containers must hold exactly a vertex and a fragment stage"
            )));
        }

        let reserved = reader.u8("reserved")?;
        if reserved != 0 {
            return Err(GpuError::InvalidShader(format!(
                "reserved header byte is {reserved}, expected 0"
            )));
        }

        let vertex_len = reader.u32("vertex bytecode length")? as usize;
        let fragment_len = reader.u32("fragment bytecode length")? as usize;
        for (len, stage) in [
            (vertex_len, ShaderStage::Vertex),
            (fragment_len, ShaderStage::Fragment),
        ] {
            if len == 0 || len % 4 != 0 {
                return Err(GpuError::InvalidShader(format!(
                    "{stage} bytecode length {len} is not a nonzero multiple of 4"
                )));
            }
        }

        for (field, expected) in [
            ("buffer table size", MAX_BUFFER_BINDINGS),
            ("sampler table size", MAX_SAMPLER_BINDINGS),
            ("texture table size", MAX_TEXTURE_BINDINGS),
            ("input attachment table size", MAX_INPUT_ATTACHMENT_BINDINGS),
        ] {
            let got = reader.u8(field)?;
            if got as usize != expected {
                return Err(GpuError::InvalidShader(format!(
                    "{field} {got} does not match the engine limit {expected}"
                )));
            }
        }

        let mut reflection = ShaderReflection::default();

        let input_count = reader.u8("vertex input count")?;
        for _ in 0..input_count {
            let location = reader.u8("vertex input location")?;
            let format_raw = reader.u8("vertex input format")?;
            let format = VertexFormat::from_raw(format_raw).ok_or_else(|| {
                GpuError::InvalidShader(format!("unknown vertex input format {format_raw}"))
            })?;
            let array_len = read_array_len(&mut reader, "vertex input array length")?;
            reflection.vertex_inputs.push(VertexInput {
                location: u32::from(location),
                format,
                array_len,
            });
        }

        let output_count = reader.u8("fragment output count")?;
        for _ in 0..output_count {
            let location = reader.u8("fragment output location")?;
            let format_raw = reader.u8("fragment output format")?;
            let format = VertexFormat::from_raw(format_raw).ok_or_else(|| {
                GpuError::InvalidShader(format!("unknown fragment output format {format_raw}"))
            })?;
            reflection.fragment_outputs.push(FragmentOutput {
                location: u32::from(location),
                format,
            });
        }

        let binding_count = reader.u8("binding count")?;
        for _ in 0..binding_count {
            let namespace_raw = reader.u8("binding namespace")?;
            let namespace = BindingNamespace::from_raw(namespace_raw).ok_or_else(|| {
                GpuError::InvalidShader(format!("unknown binding namespace {namespace_raw}"))
            })?;
            let slot = reader.u8("binding slot")?;
            let kind_raw = reader.u8("binding kind")?;
            let kind = BindingKind::from_raw(kind_raw).ok_or_else(|| {
                GpuError::InvalidShader(format!("unknown binding kind {kind_raw}"))
            })?;
            let array_len = read_array_len(&mut reader, "binding array length")?;
            let dim_raw = reader.u8("binding texture dimension")?;
            let dim = TextureDim::from_raw(dim_raw).ok_or_else(|| {
                GpuError::InvalidShader(format!("unknown texture dimension {dim_raw}"))
            })?;
            let stage_bits = reader.u8("binding stage mask")?;
            let stages = StageFlags::from_bits(stage_bits)
                .filter(|stages| !stages.is_empty())
                .ok_or_else(|| {
                    GpuError::InvalidShader(format!(
                        "invalid binding stage mask {stage_bits:#04x}"
                    ))
                })?;
            let block_size = reader.u16("binding block size")?;

            if kind.namespace() != namespace {
                return Err(GpuError::InvalidShader(format!(
                    "binding kind {kind:?} does not belong to the {namespace:?} namespace"
                )));
            }
            if slot as usize >= namespace.table_size() {
                return Err(GpuError::InvalidShader(format!(
                    "binding slot {slot} exceeds the {namespace:?} table size {}",
                    namespace.table_size()
                )));
            }

            reflection.bindings.push(BindingSlot {
                namespace,
                slot: u32::from(slot),
                kind,
                array_len,
                dim,
                stages,
                block_size: u32::from(block_size),
            });
        }

        let uniform_size = reader.u16("uniform block size")?;
        if uniform_size > 0 {
            let stage_bits = reader.u8("uniform stage mask")?;
            let stages = StageFlags::from_bits(stage_bits)
                .filter(|stages| !stages.is_empty())
                .ok_or_else(|| {
                    GpuError::InvalidShader(format!(
                        "invalid uniform stage mask {stage_bits:#04x}"
                    ))
                })?;
            let member_count = reader.u8("uniform member count")?;
            let mut members = Vec::with_capacity(member_count as usize);
            for _ in 0..member_count {
                let name_len = reader.u8("uniform member name length")?;
                let name_bytes = reader.bytes(name_len as usize, "uniform member name")?;
                let name = std::str::from_utf8(name_bytes)
                    .map_err(|_| {
                        GpuError::InvalidShader("uniform member name is not UTF-8".to_string())
                    })?
                    .to_string();
                let offset = reader.u16("uniform member offset")?;
                let kind_raw = reader.u8("uniform member type")?;
                let kind = MemberType::from_raw(kind_raw).ok_or_else(|| {
                    GpuError::InvalidShader(format!("unknown uniform member type {kind_raw}"))
                })?;
                let array_len = read_array_len(&mut reader, "uniform member array length")?;
                members.push(UniformMember {
                    name,
                    offset: u32::from(offset),
                    kind,
                    array_len,
                });
            }
            reflection.uniform = Some(UniformLayout {
                size: u32::from(uniform_size),
                stages,
                members,
            });
        }

        let subpass_count = reader.u8("subpass input count")?;
        for _ in 0..subpass_count {
            let attachment = reader.u8("subpass input attachment index")?;
            let slot = reader.u8("subpass input slot")?;
            if slot as usize >= MAX_INPUT_ATTACHMENT_BINDINGS {
                return Err(GpuError::InvalidShader(format!(
                    "subpass input slot {slot} exceeds the input attachment table size {MAX_INPUT_ATTACHMENT_BINDINGS}"
                )));
            }
            reflection.subpass_inputs.push(SubpassInputDesc {
                attachment: u32::from(attachment),
                slot: u32::from(slot),
            });
        }

        let vertex_code = words(reader.bytes(vertex_len, "vertex bytecode")?);
        let fragment_code = words(reader.bytes(fragment_len, "fragment bytecode")?);

        if reader.remaining() > 0 {
            return Err(GpuError::InvalidShader(format!(
                "trailing {} bytes after the fragment bytecode",
                reader.remaining()
            )));
        }

        for (code, stage) in [
            (&vertex_code, ShaderStage::Vertex),
            (&fragment_code, ShaderStage::Fragment),
        ] {
            if code.first() != Some(&SPIRV_MAGIC) {
                return Err(GpuError::InvalidShader(format!(
                    "{stage} bytecode does not start with the SPIR-V magic word"
                )));
            }
        }

        Ok(Self {
            stages,
            version: (version_major, version_minor),
            reflection,
            vertex_code,
            fragment_code,
        })
    }

    /// Load and parse a container file, attaching the path to any failure.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| GpuError::ShaderLoad {
            path: path.to_path_buf(),
            source: Box::new(GpuError::from(e)),
        })?;
        Self::parse(&data).map_err(|e| GpuError::ShaderLoad {
            path: path.to_path_buf(),
            source: Box::new(e),
        })
    }
}

/// The Vulkan modules created from a container's bytecode.
pub struct ShaderModules {
    pub vertex: vk::ShaderModule,
    pub fragment: vk::ShaderModule,
}

impl ShaderModules {
    /// Create both modules.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(device: &ash::Device, container: &ShaderContainer) -> Result<Self> {
        let vertex = create_module(device, &container.vertex_code, ShaderStage::Vertex)?;
        let fragment = match create_module(device, &container.fragment_code, ShaderStage::Fragment)
        {
            Ok(fragment) => fragment,
            Err(e) => {
                device.destroy_shader_module(vertex, None);
                return Err(e);
            }
        };
        Ok(Self { vertex, fragment })
    }

    /// Destroy both modules.
    ///
    /// # Safety
    /// The device must be valid and no pipeline creation may be in flight.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_shader_module(self.vertex, None);
        device.destroy_shader_module(self.fragment, None);
    }
}

unsafe fn create_module(
    device: &ash::Device,
    code: &[u32],
    stage: ShaderStage,
) -> Result<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::default().code(code);
    device
        .create_shader_module(&create_info, None)
        .map_err(|e| GpuError::InvalidShader(format!("{stage} module creation failed: {e}")))
}

fn read_array_len(reader: &mut Reader<'_>, field: &str) -> Result<u32> {
    let len = reader.u8(field)?;
    if len == 0 {
        return Err(GpuError::InvalidShader(format!("{field} is 0")));
    }
    Ok(u32::from(len))
}

fn words(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn bytes(&mut self, len: usize, field: &str) -> Result<&'a [u8]> {
        let end = self.offset.checked_add(len).filter(|&end| end <= self.data.len());
        let Some(end) = end else {
            return Err(GpuError::InvalidShader(format!(
                "container ends inside {field}"
            )));
        };
        let slice = &self.data[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn u8(&mut self, field: &str) -> Result<u8> {
        Ok(self.bytes(1, field)?[0])
    }

    fn u16(&mut self, field: &str) -> Result<u16> {
        let bytes = self.bytes(2, field)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self, field: &str) -> Result<u32> {
        let bytes = self.bytes(4, field)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Offsets into the fixed header, for targeted corruption.
    const VERSION_OFFSET: usize = 4;
    const STAGE_MASK_OFFSET: usize = 6;
    const VERTEX_LEN_OFFSET: usize = 8;
    const SAMPLER_TABLE_OFFSET: usize = 17;

    fn container_bytes() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(b"CSBC");
        data.push(1); // version major
        data.push(0); // version minor
        data.push(0b11); // stage mask
        data.push(0); // reserved
        data.extend_from_slice(&8u32.to_le_bytes()); // vertex bytecode length
        data.extend_from_slice(&8u32.to_le_bytes()); // fragment bytecode length
        data.push(8); // buffer table size
        data.push(8); // sampler table size
        data.push(8); // texture table size
        data.push(4); // input attachment table size

        // One vertex input: location 0, vec3, no array.
        data.push(1);
        data.extend_from_slice(&[0, 2, 1]);
        // One fragment output: location 0, vec4.
        data.push(1);
        data.extend_from_slice(&[0, 3]);
        // One binding: buffers namespace, slot 0, uniform buffer, both stages.
        data.push(1);
        data.extend_from_slice(&[0, 0, 0, 1, 0, 0b11]);
        data.extend_from_slice(&64u16.to_le_bytes());
        // Uniform block: 64 bytes, both stages, one mat4 member "mvp".
        data.extend_from_slice(&64u16.to_le_bytes());
        data.push(0b11);
        data.push(1);
        data.push(3);
        data.extend_from_slice(b"mvp");
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(&[8, 1]);
        // No subpass inputs.
        data.push(0);

        for _ in 0..2 {
            data.extend_from_slice(&0x0723_0203u32.to_le_bytes());
            data.extend_from_slice(&0u32.to_le_bytes());
        }
        data
    }

    #[test]
    fn valid_container_parses() {
        let container = ShaderContainer::parse(&container_bytes()).unwrap();

        assert_eq!(container.version, (1, 0));
        assert_eq!(container.stages, StageFlags::all());
        assert_eq!(container.vertex_code.len(), 2);
        assert_eq!(container.fragment_code.len(), 2);

        let reflection = &container.reflection;
        assert_eq!(reflection.vertex_inputs, vec![VertexInput {
            location: 0,
            format: VertexFormat::Float3,
            array_len: 1,
        }]);
        assert_eq!(reflection.fragment_outputs.len(), 1);
        assert_eq!(reflection.bindings.len(), 1);
        assert_eq!(reflection.bindings[0].kind, BindingKind::UniformBuffer);
        assert_eq!(reflection.bindings[0].block_size, 64);

        let uniform = reflection.uniform.as_ref().unwrap();
        assert_eq!(uniform.size, 64);
        assert_eq!(uniform.members[0].name, "mvp");
        assert_eq!(uniform.members[0].kind, MemberType::Mat4);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut data = container_bytes();
        data[0] = b'X';
        let err = ShaderContainer::parse(&data).unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn version_mismatch_names_the_version() {
        let mut data = container_bytes();
        data[VERSION_OFFSET] = 2;
        let err = ShaderContainer::parse(&data).unwrap_err();
        assert!(err.to_string().contains("version 2"));
    }

    #[test]
    fn partial_stage_mask_is_rejected() {
        let mut data = container_bytes();
        data[STAGE_MASK_OFFSET] = 0b01;
        let err = ShaderContainer::parse(&data).unwrap_err();
        assert!(err.to_string().contains("stage"));
    }

    #[test]
    fn table_size_mismatch_names_the_field() {
        let mut data = container_bytes();
        data[SAMPLER_TABLE_OFFSET] = 4;
        let err = ShaderContainer::parse(&data).unwrap_err();
        assert!(err.to_string().contains("sampler table size"));
    }

    #[test]
    fn misaligned_bytecode_is_rejected() {
        let mut data = container_bytes();
        data[VERTEX_LEN_OFFSET..VERTEX_LEN_OFFSET + 4].copy_from_slice(&6u32.to_le_bytes());
        let err = ShaderContainer::parse(&data).unwrap_err();
        assert!(err.to_string().contains("multiple of 4"));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut data = container_bytes();
        data.extend_from_slice(&[0xFF, 0xFF, 0xFF]);
        let err = ShaderContainer::parse(&data).unwrap_err();
        assert!(err.to_string().contains("trailing 3 bytes"));
    }

    #[test]
    fn truncated_container_names_the_field() {
        let data = &container_bytes()[..14];
        let err = ShaderContainer::parse(data).unwrap_err();
        assert!(err.to_string().contains("fragment bytecode length"));
    }

    #[test]
    fn binding_slot_outside_table_is_rejected() {
        // The binding record follows the header (20 bytes), the vertex
        // input table (4) and the fragment output table (3), plus its own
        // count byte; slot is the record's second byte.
        let binding_slot_offset = 20 + 4 + 3 + 1 + 1;
        let mut data = container_bytes();
        data[binding_slot_offset] = 9;
        let err = ShaderContainer::parse(&data).unwrap_err();
        assert!(err.to_string().contains("slot 9"));
    }

    #[test]
    fn kind_in_wrong_namespace_is_rejected() {
        // Flip the binding kind to Sampler while the namespace stays Buffers.
        let binding_kind_offset = 20 + 4 + 3 + 1 + 2;
        let mut data = container_bytes();
        data[binding_kind_offset] = 2;
        let err = ShaderContainer::parse(&data).unwrap_err();
        assert!(err.to_string().contains("namespace"));
    }
}
