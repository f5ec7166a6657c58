//! Command buffer management.
//!
//! Command buffers are handed out as [`TrackedCommandBuffer`]s that remember
//! the pool they came from, so completed work can return them for reuse no
//! matter which thread recorded them.

use ash::vk;

use crate::error::Result;

/// Identifies the pool a command buffer was allocated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolId(pub(crate) u64);

/// A command buffer together with its origin pool.
#[derive(Debug, Clone, Copy)]
pub struct TrackedCommandBuffer {
    /// Raw command buffer handle.
    pub handle: vk::CommandBuffer,
    /// Pool the buffer must be returned to.
    pub origin: PoolId,
}

/// Command pool with an explicit free list.
///
/// Buffers are acquired for recording and later given back once the work they
/// carry has finished on the GPU. The pool never frees individual buffers;
/// returned ones are reused on the next acquire.
pub struct CommandPool {
    id: PoolId,
    pool: vk::CommandPool,
    queue_family: u32,
    free: Vec<vk::CommandBuffer>,
    outstanding: usize,
}

impl CommandPool {
    /// Create a new command pool.
    ///
    /// # Safety
    /// The device must be valid and the queue family must exist.
    pub unsafe fn new(device: &ash::Device, queue_family: u32, id: PoolId) -> Result<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let pool = device.create_command_pool(&create_info, None)?;

        Ok(Self {
            id,
            pool,
            queue_family,
            free: Vec::new(),
            outstanding: 0,
        })
    }

    /// Get the pool identifier.
    pub fn id(&self) -> PoolId {
        self.id
    }

    /// Get the raw pool handle.
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Get the queue family index.
    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Number of buffers currently handed out.
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Acquire a command buffer, reusing a returned one when possible.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn acquire(&mut self, device: &ash::Device) -> Result<TrackedCommandBuffer> {
        let handle = match self.free.pop() {
            Some(buffer) => {
                device.reset_command_buffer(buffer, vk::CommandBufferResetFlags::empty())?;
                buffer
            }
            None => {
                let alloc_info = vk::CommandBufferAllocateInfo::default()
                    .command_pool(self.pool)
                    .level(vk::CommandBufferLevel::PRIMARY)
                    .command_buffer_count(1);
                let buffers = device.allocate_command_buffers(&alloc_info)?;
                buffers[0]
            }
        };

        self.outstanding += 1;
        Ok(TrackedCommandBuffer {
            handle,
            origin: self.id,
        })
    }

    /// Return a previously acquired buffer to the free list.
    ///
    /// The caller must guarantee the GPU is done with it.
    pub fn give_back(&mut self, buffer: vk::CommandBuffer) {
        debug_assert!(self.outstanding > 0, "command buffer returned twice");
        self.outstanding = self.outstanding.saturating_sub(1);
        self.free.push(buffer);
    }

    /// Reset the whole pool if no buffers are outstanding.
    ///
    /// Returns whether the reset happened.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn reset_if_idle(&mut self, device: &ash::Device) -> Result<bool> {
        if self.outstanding != 0 {
            return Ok(false);
        }
        device.reset_command_pool(self.pool, vk::CommandPoolResetFlags::empty())?;
        Ok(true)
    }

    /// Destroy the command pool.
    ///
    /// # Safety
    /// The device must be valid and the pool must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_command_pool(self.pool, None);
    }
}

/// Begin recording a command buffer.
///
/// # Safety
/// The device and command buffer must be valid.
pub unsafe fn begin_command_buffer(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    flags: vk::CommandBufferUsageFlags,
) -> Result<()> {
    let begin_info = vk::CommandBufferBeginInfo::default().flags(flags);
    device.begin_command_buffer(cmd, &begin_info)?;
    Ok(())
}

/// End recording a command buffer.
///
/// # Safety
/// The device and command buffer must be valid.
pub unsafe fn end_command_buffer(device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()> {
    device.end_command_buffer(cmd)?;
    Ok(())
}
