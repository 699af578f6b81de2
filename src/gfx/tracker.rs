use super::Barrier;
use super::CmdList;
use super::Device;
use super::ResourceState;
use super::resource::Resource;

/// Tracks usage state changes requested while recording and batches the resulting barriers.
///
/// The state of each resource lives on the resource itself so that every command buffer
/// observes the same current state. Barriers are buffered in insertion order and applied in a
/// single native call by `flush`, which must happen before any command that depends on the
/// new state and before the command list is closed.
///
/// Resources are never demoted to `ResourceState::COMMON` automatically; callers that need a
/// resource in a particular state at the end of a frame (ie. `PRESENT` for a back buffer)
/// transition it explicitly.
///
/// The new state is committed to the shared resource when the transition is recorded, not when
/// the command list executes. Command buffers which record transitions of the same resource
/// concurrently must be submitted in the order they were recorded, otherwise the `before` states
/// of their barriers do not match the state on the gpu.
pub struct ResourceStateTracker<D: Device> {
    barriers: Vec<Barrier<D>>,
    flushed: usize
}

impl<D> Default for ResourceStateTracker<D> where D: Device {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> ResourceStateTracker<D> where D: Device {
    pub fn new() -> Self {
        ResourceStateTracker {
            barriers: Vec::new(),
            flushed: 0
        }
    }

    /// Requests `resource` to be in `state` for the commands which follow.
    /// Appends a transition barrier if the state differs from the current state, or a uav
    /// barrier if both are the same unordered access state. A `None` resource is a no-op.
    /// Returns true if a barrier was appended.
    pub fn transition(&mut self, resource: Option<&Resource<D>>, state: ResourceState) -> bool {
        let resource = match resource {
            Some(resource) => resource,
            None => return false
        };

        let before = resource.exchange_state(state);
        if before != state {
            tracing::trace!(
                "hotline_gfx::tracker: resource {} {:?} -> {:?}", resource.id(), before, state
            );
            self.barriers.push(Barrier::Transition {
                resource: resource.clone(),
                before,
                after: state
            });
            true
        }
        else if state.has_unordered_access() {
            self.barriers.push(Barrier::Uav {
                resource: Some(resource.clone())
            });
            true
        }
        else {
            false
        }
    }

    /// Appends a barrier without consulting the tracked state, for hazards the caller knows
    /// about (ie. two dispatches writing the same buffer without an intervening bind).
    /// Raw transition barriers also update the resource state to `after`.
    pub fn add_barrier(&mut self, barrier: Barrier<D>) {
        if let Barrier::Transition { resource, after, .. } = &barrier {
            resource.exchange_state(*after);
        }
        self.barriers.push(barrier);
    }

    /// Applies every pending barrier as one batch and clears the list, returns the number applied
    pub fn flush(&mut self, cmd_list: &mut D::CmdList) -> usize {
        let count = self.barriers.len();
        if count > 0 {
            cmd_list.resource_barriers(&self.barriers);
            self.barriers.clear();
            self.flushed += count;
        }
        count
    }

    /// Barriers recorded but not yet flushed, in insertion order
    pub fn pending(&self) -> &[Barrier<D>] {
        &self.barriers
    }

    pub fn num_pending(&self) -> usize {
        self.barriers.len()
    }

    /// Total number of barriers flushed since the last `reset`
    pub fn num_flushed(&self) -> usize {
        self.flushed
    }

    /// Drops pending barriers without applying them, used when a command buffer starts a new cycle
    pub fn reset(&mut self) {
        if !self.barriers.is_empty() {
            tracing::warn!(
                "hotline_gfx::tracker: discarding {} unflushed barriers", self.barriers.len()
            );
        }
        self.barriers.clear();
        self.flushed = 0;
    }
}
