//! Submission tracking.
//!
//! Every piece of GPU work that is not tied to a swapchain slot goes through a
//! [`SubmitContext`]: a completion fence plus the command buffers the
//! submission borrowed. Contexts cycle through three states:
//!
//! - `Idle`: free for reuse, fence signaled, no tracked commands.
//! - `Pending`: submitted, fence unsignaled.
//! - `Finished`: fence signaled but commands not yet returned.
//!
//! `Finished` contexts only become `Idle` again through [`SubmitContext::try_release`],
//! which hands the tracked buffers back to their origin pools.

use ash::vk;

use crate::command::TrackedCommandBuffer;
use crate::error::Result;
use crate::resources::ResourceManager;
use crate::sync;

/// Lifecycle state of a submit context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitState {
    /// Free for reuse.
    Idle,
    /// Submitted and still executing.
    Pending,
    /// Executed but not yet released.
    Finished,
}

/// Pure state machine behind a submit context.
///
/// The fence itself lives on the GPU; the tracker only remembers whether a
/// submission is outstanding and derives the state from the fence status the
/// caller observed.
#[derive(Debug, Default)]
pub(crate) struct SubmitTracker {
    pending: bool,
}

impl SubmitTracker {
    pub(crate) fn new() -> Self {
        Self { pending: false }
    }

    pub(crate) fn state(&self, fence_signaled: bool) -> SubmitState {
        if !self.pending {
            SubmitState::Idle
        } else if fence_signaled {
            SubmitState::Finished
        } else {
            SubmitState::Pending
        }
    }

    /// Mark the context as submitted.
    ///
    /// Panics if a previous submission was never released. Reusing a fence
    /// that still guards live command buffers would corrupt the pools, so
    /// this is treated as a fatal usage bug rather than an error value.
    pub(crate) fn prepare(&mut self) {
        assert!(
            !self.pending,
            "submit context prepared while a previous submission is still tracked"
        );
        self.pending = true;
    }

    /// Forget a submission that never reached the queue.
    ///
    /// The fence was reset but will not signal; clearing the pending flag
    /// makes the context idle again so the next `prepare` can reuse it.
    pub(crate) fn abort(&mut self) {
        self.pending = false;
    }

    /// Release the tracked submission if the fence has signaled.
    pub(crate) fn try_release(&mut self, fence_signaled: bool) -> bool {
        if self.pending && fence_signaled {
            self.pending = false;
            true
        } else {
            false
        }
    }
}

/// A reusable submission slot: one fence and the command buffers it guards.
pub struct SubmitContext {
    fence: vk::Fence,
    commands: Vec<TrackedCommandBuffer>,
    tracker: SubmitTracker,
}

impl SubmitContext {
    /// Create an idle context. The fence starts signaled.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(device: &ash::Device) -> Result<Self> {
        Ok(Self {
            fence: sync::create_fence(device, true)?,
            commands: Vec::new(),
            tracker: SubmitTracker::new(),
        })
    }

    /// Fence to pass to the queue submission this context tracks.
    pub fn fence(&self) -> vk::Fence {
        self.fence
    }

    /// Current state, polling the fence without blocking.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn state(&self, device: &ash::Device) -> Result<SubmitState> {
        let signaled = sync::fence_signaled(device, self.fence)?;
        Ok(self.tracker.state(signaled))
    }

    /// Take ownership of the commands for a submission and reset the fence.
    ///
    /// Must only be called on an `Idle` context; panics otherwise.
    ///
    /// # Safety
    /// The device must be valid and the commands fully recorded.
    pub unsafe fn prepare(
        &mut self,
        device: &ash::Device,
        commands: Vec<TrackedCommandBuffer>,
    ) -> Result<()> {
        self.tracker.prepare();
        sync::reset_fence(device, self.fence)?;
        self.commands = commands;
        Ok(())
    }

    /// Back out of a prepared submission that never reached the queue.
    ///
    /// Returns the taken commands to their pools and marks the context idle
    /// again; the next `prepare` resets the fence.
    pub(crate) fn abort(&mut self, resources: &ResourceManager) {
        self.tracker.abort();
        for command in self.commands.drain(..) {
            resources.give_back(command);
        }
    }

    /// Return tracked commands to their pools if the submission completed.
    ///
    /// Returns `true` when the context transitioned back to `Idle`.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn try_release(
        &mut self,
        device: &ash::Device,
        resources: &ResourceManager,
    ) -> Result<bool> {
        let signaled = sync::fence_signaled(device, self.fence)?;
        if !self.tracker.try_release(signaled) {
            return Ok(false);
        }
        for command in self.commands.drain(..) {
            resources.give_back(command);
        }
        Ok(true)
    }

    /// Whether this context can take a new submission right now.
    ///
    /// Releases a finished submission as a side effect.
    ///
    /// # Safety
    /// The device must be valid.
    pub(crate) unsafe fn is_free(
        &mut self,
        device: &ash::Device,
        resources: &ResourceManager,
    ) -> Result<bool> {
        if !self.tracker.pending {
            return Ok(true);
        }
        self.try_release(device, resources)
    }

    /// Destroy the fence.
    ///
    /// # Safety
    /// The device must be valid and the context must not be pending.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_fence(self.fence, None);
    }
}

/// Grow-on-demand pool of submit contexts.
pub struct SubmitPool {
    contexts: Vec<SubmitContext>,
}

impl SubmitPool {
    pub fn new() -> Self {
        Self {
            contexts: Vec::new(),
        }
    }

    /// Number of contexts ever created.
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Find a free context, creating one if every slot is busy.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn acquire(
        &mut self,
        device: &ash::Device,
        resources: &ResourceManager,
    ) -> Result<usize> {
        for index in 0..self.contexts.len() {
            if self.contexts[index].is_free(device, resources)? {
                return Ok(index);
            }
        }
        self.contexts.push(SubmitContext::new(device)?);
        Ok(self.contexts.len() - 1)
    }

    pub fn get_mut(&mut self, index: usize) -> &mut SubmitContext {
        &mut self.contexts[index]
    }

    /// Release every finished context, returning how many were reclaimed.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn poll(
        &mut self,
        device: &ash::Device,
        resources: &ResourceManager,
    ) -> Result<usize> {
        let mut released = 0;
        for context in &mut self.contexts {
            if context.try_release(device, resources)? {
                released += 1;
            }
        }
        Ok(released)
    }

    /// Destroy all context fences.
    ///
    /// # Safety
    /// The device must be valid and idle.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        for context in &self.contexts {
            context.destroy(device);
        }
    }
}

impl Default for SubmitPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_tracker_is_idle() {
        let tracker = SubmitTracker::new();
        assert_eq!(tracker.state(true), SubmitState::Idle);
    }

    #[test]
    fn full_lifecycle() {
        let mut tracker = SubmitTracker::new();

        tracker.prepare();
        assert_eq!(tracker.state(false), SubmitState::Pending);

        // Fence signals on the device.
        assert_eq!(tracker.state(true), SubmitState::Finished);

        assert!(tracker.try_release(true));
        assert_eq!(tracker.state(true), SubmitState::Idle);

        // Released contexts can be prepared again.
        tracker.prepare();
        assert_eq!(tracker.state(false), SubmitState::Pending);
    }

    #[test]
    fn release_requires_signaled_fence() {
        let mut tracker = SubmitTracker::new();
        tracker.prepare();
        assert!(!tracker.try_release(false));
        assert_eq!(tracker.state(false), SubmitState::Pending);
    }

    #[test]
    fn release_without_submission_is_a_no_op() {
        let mut tracker = SubmitTracker::new();
        assert!(!tracker.try_release(true));
        assert_eq!(tracker.state(true), SubmitState::Idle);
    }

    #[test]
    fn abort_returns_the_context_to_idle() {
        let mut tracker = SubmitTracker::new();
        tracker.prepare();

        // The queue rejected the submission; the fence will never signal.
        tracker.abort();
        assert_eq!(tracker.state(false), SubmitState::Idle);

        // The slot is reusable without a release in between.
        tracker.prepare();
        assert_eq!(tracker.state(false), SubmitState::Pending);
    }

    #[test]
    #[should_panic(expected = "still tracked")]
    fn prepare_while_pending_panics() {
        let mut tracker = SubmitTracker::new();
        tracker.prepare();
        tracker.prepare();
    }

    #[test]
    #[should_panic(expected = "still tracked")]
    fn prepare_finished_but_unreleased_panics() {
        let mut tracker = SubmitTracker::new();
        tracker.prepare();
        // Fence signaled, but the commands were never returned.
        assert_eq!(tracker.state(true), SubmitState::Finished);
        tracker.prepare();
    }
}
