//! Per-thread command resources and deferred destruction.
//!
//! Command pools are not externally synchronized, so each recording thread
//! registers with the device and receives its own set of pools, one per frame
//! in flight. Handles that may still be referenced by an in-flight frame are
//! destroyed through a queue that delays them by `MAX_FRAMES` frames.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::ThreadId;

use parking_lot::Mutex;

use candela_core::constants::MAX_FRAMES;

use crate::command::{CommandPool, TrackedCommandBuffer};
use crate::error::{GpuError, Result};

struct ThreadPools {
    // One pool per frame slot.
    pools: Vec<CommandPool>,
}

struct PendingDestroy {
    frame_queued: u64,
    run: Box<dyn FnOnce(&ash::Device) + Send>,
}

/// Closure queue that delays destruction until no in-flight frame can still
/// reference the handle.
struct DeferredQueue {
    pending: VecDeque<PendingDestroy>,
}

impl DeferredQueue {
    fn new() -> Self {
        Self {
            pending: VecDeque::new(),
        }
    }

    fn queue(&mut self, frame_number: u64, run: Box<dyn FnOnce(&ash::Device) + Send>) {
        self.pending.push_back(PendingDestroy {
            frame_queued: frame_number,
            run,
        });
    }

    fn process(&mut self, device: &ash::Device, current_frame_number: u64) {
        let cutoff = current_frame_number.saturating_sub(MAX_FRAMES as u64);

        // Queue order is FIFO and frame numbers are non-decreasing, so only the front can mature.
        while matches!(self.pending.front(), Some(p) if p.frame_queued < cutoff) {
            if let Some(pending) = self.pending.pop_front() {
                (pending.run)(device);
            }
        }
    }

    fn flush(&mut self, device: &ash::Device) {
        while let Some(pending) = self.pending.pop_front() {
            (pending.run)(device);
        }
    }

    fn len(&self) -> usize {
        self.pending.len()
    }
}

/// Tracks per-thread command pools and pending destructions for one device.
pub struct ResourceManager {
    queue_family: u32,
    threads: Mutex<HashMap<ThreadId, ThreadPools>>,
    next_pool_id: AtomicU64,
    deferred: Mutex<DeferredQueue>,
}

impl ResourceManager {
    pub(crate) fn new(queue_family: u32) -> Self {
        Self {
            queue_family,
            threads: Mutex::new(HashMap::new()),
            next_pool_id: AtomicU64::new(0),
            deferred: Mutex::new(DeferredQueue::new()),
        }
    }

    /// Register the calling thread for command recording.
    ///
    /// Creates one command pool per frame slot for this thread.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn register_thread(&self, device: &ash::Device) -> Result<()> {
        let thread = std::thread::current().id();
        let mut threads = self.threads.lock();
        if threads.contains_key(&thread) {
            return Err(GpuError::InvalidState(format!(
                "thread {thread:?} is already registered"
            )));
        }

        let mut pools = Vec::with_capacity(MAX_FRAMES);
        for _ in 0..MAX_FRAMES {
            let id = crate::command::PoolId(self.next_pool_id.fetch_add(1, Ordering::Relaxed));
            pools.push(CommandPool::new(device, self.queue_family, id)?);
        }

        tracing::debug!("Registered render thread {thread:?}");
        threads.insert(thread, ThreadPools { pools });
        Ok(())
    }

    /// Unregister the calling thread.
    ///
    /// Its pools are destroyed once every frame that could reference them has
    /// completed.
    pub fn unregister_thread(&self, current_frame_number: u64) -> Result<()> {
        let thread = std::thread::current().id();
        let Some(slot) = self.threads.lock().remove(&thread) else {
            return Err(GpuError::InvalidState(format!(
                "thread {thread:?} is not registered"
            )));
        };

        tracing::debug!("Unregistered render thread {thread:?}");
        for pool in slot.pools {
            self.defer(current_frame_number, move |device| {
                unsafe { pool.destroy(device) };
            });
        }
        Ok(())
    }

    /// Whether the calling thread has registered.
    pub fn is_thread_registered(&self) -> bool {
        let thread = std::thread::current().id();
        self.threads.lock().contains_key(&thread)
    }

    /// Acquire a command buffer from the calling thread's pool for a frame slot.
    ///
    /// Panics if the thread never registered; recording from unknown threads
    /// corrupts pool bookkeeping and cannot be recovered from.
    ///
    /// # Safety
    /// The device must be valid and `frame` must be below `MAX_FRAMES`.
    pub unsafe fn get_command_buffer(
        &self,
        device: &ash::Device,
        frame: usize,
    ) -> Result<TrackedCommandBuffer> {
        let thread = std::thread::current().id();
        let mut threads = self.threads.lock();
        let slot = threads.get_mut(&thread).unwrap_or_else(|| {
            panic!("thread {thread:?} is not registered for command recording; call register_thread first")
        });
        slot.pools[frame].acquire(device)
    }

    /// Return a tracked buffer to its origin pool.
    ///
    /// Buffers whose pool was retired by `unregister_thread` are dropped; the
    /// deferred pool destruction frees them.
    pub fn give_back(&self, command: TrackedCommandBuffer) {
        let mut threads = self.threads.lock();
        for slot in threads.values_mut() {
            for pool in &mut slot.pools {
                if pool.id() == command.origin {
                    pool.give_back(command.handle);
                    return;
                }
            }
        }
        tracing::debug!("Command buffer returned to a retired pool; dropping");
    }

    /// Reset every thread's pool for a frame slot that has finished.
    ///
    /// Pools with buffers still outstanding are skipped and picked up on a
    /// later cycle.
    ///
    /// # Safety
    /// The device must be valid and frame `frame`'s work must have completed.
    pub unsafe fn recycle_frame(&self, device: &ash::Device, frame: usize) -> Result<()> {
        let mut threads = self.threads.lock();
        for slot in threads.values_mut() {
            slot.pools[frame].reset_if_idle(device)?;
        }
        Ok(())
    }

    /// Queue a destructor to run after `MAX_FRAMES` further frames complete.
    pub fn defer<F>(&self, current_frame_number: u64, destructor: F)
    where
        F: FnOnce(&ash::Device) + Send + 'static,
    {
        self.deferred
            .lock()
            .queue(current_frame_number, Box::new(destructor));
    }

    /// Run destructors whose delay has elapsed.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn process_deferred(&self, device: &ash::Device, current_frame_number: u64) {
        self.deferred.lock().process(device, current_frame_number);
    }

    /// Run every pending destructor immediately.
    ///
    /// # Safety
    /// The device must be valid and idle.
    pub unsafe fn flush_deferred(&self, device: &ash::Device) {
        self.deferred.lock().flush(device);
    }

    /// Number of destructors waiting in the queue.
    pub fn pending_deferred(&self) -> usize {
        self.deferred.lock().len()
    }

    /// Destroy all thread pools and flush the deferred queue.
    ///
    /// # Safety
    /// The device must be valid and idle.
    pub(crate) unsafe fn destroy(&self, device: &ash::Device) {
        self.flush_deferred(device);
        let mut threads = self.threads.lock();
        for (_, slot) in threads.drain() {
            for pool in &slot.pools {
                pool.destroy(device);
            }
        }
    }
}
