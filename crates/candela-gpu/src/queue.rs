//! Device queue wrapper.
//!
//! All submission and presentation for the device funnels through one
//! [`DeviceQueue`]. Vulkan queues are externally synchronized, so both paths
//! take the same lock; counters record lifetime submit and buffer totals for
//! diagnostics.

use std::sync::atomic::{AtomicU64, Ordering};

use ash::vk;
use parking_lot::Mutex;

use crate::command::TrackedCommandBuffer;
use crate::error::Result;
use crate::resources::ResourceManager;
use crate::submit::SubmitPool;

/// Lifetime submission totals, advanced once per submit call.
#[derive(Debug, Default)]
pub(crate) struct SubmitCounters {
    submits: AtomicU64,
    buffers: AtomicU64,
}

impl SubmitCounters {
    pub(crate) fn record(&self, buffers: u64) {
        self.submits.fetch_add(1, Ordering::Relaxed);
        self.buffers.fetch_add(buffers, Ordering::Relaxed);
    }

    pub(crate) fn submits(&self) -> u64 {
        self.submits.load(Ordering::Relaxed)
    }

    pub(crate) fn buffers(&self) -> u64 {
        self.buffers.load(Ordering::Relaxed)
    }
}

/// Total command buffers across a set of submit batches.
pub(crate) fn count_buffers(submits: &[vk::SubmitInfo]) -> u64 {
    submits
        .iter()
        .map(|submit| u64::from(submit.command_buffer_count))
        .sum()
}

/// Graphics queue shared by every swapchain and renderer on the device.
pub struct DeviceQueue {
    queue: vk::Queue,
    family: u32,
    lock: Mutex<()>,
    submit_pool: Mutex<SubmitPool>,
    counters: SubmitCounters,
}

impl DeviceQueue {
    pub(crate) fn new(queue: vk::Queue, family: u32) -> Self {
        Self {
            queue,
            family,
            lock: Mutex::new(()),
            submit_pool: Mutex::new(SubmitPool::new()),
            counters: SubmitCounters::default(),
        }
    }

    /// Queue family index the queue was created from.
    pub fn family(&self) -> u32 {
        self.family
    }

    /// Raw queue handle.
    pub fn raw(&self) -> vk::Queue {
        self.queue
    }

    /// Lifetime number of submit calls.
    pub fn submit_count(&self) -> u64 {
        self.counters.submits()
    }

    /// Lifetime number of command buffers submitted.
    pub fn buffer_count(&self) -> u64 {
        self.counters.buffers()
    }

    /// Submit batches to the queue under the queue lock.
    ///
    /// # Safety
    /// All handles referenced by the batches must be valid.
    pub unsafe fn submit(
        &self,
        device: &ash::Device,
        submits: &[vk::SubmitInfo],
        fence: vk::Fence,
    ) -> Result<()> {
        {
            let _guard = self.lock.lock();
            device.queue_submit(self.queue, submits, fence)?;
        }

        self.counters.record(count_buffers(submits));
        Ok(())
    }

    /// Submit tracked command buffers through a pooled submit context.
    ///
    /// The context's fence guards the buffers; they return to their origin
    /// pools once a later [`DeviceQueue::poll_submits`] sees the fence signal.
    ///
    /// # Safety
    /// All handles must be valid and the commands fully recorded.
    pub unsafe fn submit_tracked(
        &self,
        device: &ash::Device,
        resources: &ResourceManager,
        commands: Vec<TrackedCommandBuffer>,
        wait_semaphores: &[vk::Semaphore],
        wait_stages: &[vk::PipelineStageFlags],
        signal_semaphores: &[vk::Semaphore],
    ) -> Result<()> {
        let handles: Vec<vk::CommandBuffer> =
            commands.iter().map(|command| command.handle).collect();

        let mut pool = self.submit_pool.lock();
        let index = pool.acquire(device, resources)?;
        let context = pool.get_mut(index);
        if let Err(e) = context.prepare(device, commands) {
            context.abort(resources);
            return Err(e);
        }
        let fence = context.fence();

        let submit = vk::SubmitInfo::default()
            .command_buffers(&handles)
            .wait_semaphores(wait_semaphores)
            .wait_dst_stage_mask(wait_stages)
            .signal_semaphores(signal_semaphores);

        // A rejected submission leaves the fence unsignaled forever; hand
        // the commands back instead of stranding the context as pending.
        if let Err(e) = self.submit(device, &[submit], fence) {
            pool.get_mut(index).abort(resources);
            return Err(e);
        }
        Ok(())
    }

    /// Present a swapchain image under the queue lock.
    ///
    /// Returns `true` if the presentation engine reported the swapchain as
    /// suboptimal.
    ///
    /// # Safety
    /// All handles referenced by the present info must be valid.
    pub unsafe fn present(
        &self,
        swapchain_loader: &ash::khr::swapchain::Device,
        present_info: &vk::PresentInfoKHR,
    ) -> Result<bool> {
        let _guard = self.lock.lock();
        let suboptimal = swapchain_loader.queue_present(self.queue, present_info)?;
        Ok(suboptimal)
    }

    /// Release every finished submit context, returning buffers to their pools.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn poll_submits(
        &self,
        device: &ash::Device,
        resources: &ResourceManager,
    ) -> Result<usize> {
        self.submit_pool.lock().poll(device, resources)
    }

    /// Block until the queue has drained.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn wait_idle(&self, device: &ash::Device) -> Result<()> {
        let _guard = self.lock.lock();
        device.queue_wait_idle(self.queue)?;
        Ok(())
    }

    /// Destroy the pooled submit contexts.
    ///
    /// # Safety
    /// The device must be valid and idle.
    pub(crate) unsafe fn destroy(&self, device: &ash::Device, resources: &ResourceManager) {
        let mut pool = self.submit_pool.lock();
        // Return finished buffers before the fences go away.
        let _ = pool.poll(device, resources);
        pool.destroy(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(buffers: u32) -> vk::SubmitInfo<'static> {
        vk::SubmitInfo {
            command_buffer_count: buffers,
            ..Default::default()
        }
    }

    #[test]
    fn buffer_totals_sum_across_batches() {
        assert_eq!(count_buffers(&[]), 0);
        assert_eq!(count_buffers(&[batch(1)]), 1);
        assert_eq!(count_buffers(&[batch(2), batch(3), batch(0)]), 5);
    }

    #[test]
    fn counters_advance_by_exact_buffer_counts() {
        let counters = SubmitCounters::default();

        counters.record(count_buffers(&[batch(2), batch(3)]));
        assert_eq!(counters.submits(), 1);
        assert_eq!(counters.buffers(), 5);

        counters.record(count_buffers(&[batch(1)]));
        assert_eq!(counters.submits(), 2);
        assert_eq!(counters.buffers(), 6);

        // An empty submit still counts as one call.
        counters.record(count_buffers(&[]));
        assert_eq!(counters.submits(), 3);
        assert_eq!(counters.buffers(), 6);
    }
}
