use crate::Error;

use super::Device;
use super::Queue;
use super::QueueType;
use super::cmd::CommandBuffer;
use super::cmd::CommandBufferState;
use super::cmd::TransientPools;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// How long dropping a queue waits for outstanding work before giving up
const DROP_WAIT_TIMEOUT: Duration = Duration::from_secs(1);

/// A point on a queue's timeline, complete once the gpu has finished all work submitted before it
pub struct Fence<D: Device> {
    queue: Arc<D::Queue>,
    value: u64
}

impl<D> Clone for Fence<D> where D: Device {
    fn clone(&self) -> Self {
        Fence {
            queue: self.queue.clone(),
            value: self.value
        }
    }
}

impl<D> std::fmt::Debug for Fence<D> where D: Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Fence({})", self.value)
    }
}

impl<D> Fence<D> where D: Device {
    pub fn value(&self) -> u64 {
        self.value
    }

    /// Non blocking status query
    pub fn is_complete(&self) -> bool {
        self.queue.completed_value() >= self.value
    }

    /// Blocks until the fence completes or `timeout` elapses, returns true if it completed
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        self.is_complete() || self.queue.wait(self.value, timeout)
    }
}

/// Submits closed command buffers to a native queue and recycles them once their fence completes
pub struct CommandQueue<D: Device> {
    queue_type: QueueType,
    pools: TransientPools<D>,
    queue: Arc<D::Queue>,
    in_flight: VecDeque<CommandBuffer<D>>,
    available: Vec<CommandBuffer<D>>,
    created: usize
}

impl<D> CommandQueue<D> where D: Device {
    pub fn new(pools: TransientPools<D>, queue_type: QueueType) -> Result<Self, Error> {
        let queue = pools.device.create_queue(queue_type).map_err(|err| {
            tracing::error!("hotline_gfx::queue: failed to create {:?} queue: {}", queue_type, err);
            err
        })?;
        Ok(CommandQueue {
            queue_type,
            pools,
            queue: Arc::new(queue),
            in_flight: VecDeque::new(),
            available: Vec::new(),
            created: 0
        })
    }

    pub fn queue_type(&self) -> QueueType {
        self.queue_type
    }

    pub fn native(&self) -> &Arc<D::Queue> {
        &self.queue
    }

    /// Returns a command buffer in the recording state, recycling a retired one where possible
    pub fn command_buffer(&mut self) -> Result<CommandBuffer<D>, Error> {
        self.retire_completed();
        let mut cmd = match self.available.pop() {
            Some(cmd) => cmd,
            None => {
                let cmd = CommandBuffer::new(&self.pools, self.queue_type)?;
                self.created += 1;
                tracing::debug!(
                    "hotline_gfx::queue: created {:?} command buffer ({} total)", self.queue_type, self.created
                );
                cmd
            }
        };
        cmd.begin()?;
        Ok(cmd)
    }

    /// Executes a closed command buffer and returns the fence which signals its completion.
    /// The queue holds the buffer until the fence completes, then recycles it.
    pub fn submit(&mut self, mut cmd: CommandBuffer<D>) -> Result<Fence<D>, Error> {
        if cmd.queue_type() != self.queue_type {
            tracing::error!(
                "hotline_gfx::queue: {:?} command buffer submitted to a {:?} queue", cmd.queue_type(), self.queue_type
            );
            return Err(Error::InvalidState(format!(
                "{:?} command buffer submitted to a {:?} queue", cmd.queue_type(), self.queue_type
            )));
        }
        if cmd.state() != CommandBufferState::Closed {
            tracing::error!("hotline_gfx::queue: cannot submit a {:?} command buffer", cmd.state());
            return Err(Error::InvalidState(format!("cannot submit a {:?} command buffer", cmd.state())));
        }

        self.queue.execute(&[cmd.native()]).map_err(|err| {
            tracing::error!("hotline_gfx::queue: failed to execute on {:?} queue: {}", self.queue_type, err);
            err
        })?;
        let value = self.queue.signal()?;
        cmd.mark_submitted(value);
        self.in_flight.push_back(cmd);
        Ok(Fence {
            queue: self.queue.clone(),
            value
        })
    }

    /// Moves every command buffer whose fence has completed to the available list,
    /// returns the number retired
    pub fn retire_completed(&mut self) -> usize {
        let completed = self.queue.completed_value();
        let mut retired = 0;
        while let Some(cmd) = self.in_flight.front() {
            if cmd.fence_value() > completed {
                break;
            }
            if let Some(mut cmd) = self.in_flight.pop_front() {
                cmd.mark_retired();
                self.available.push(cmd);
                retired += 1;
            }
        }
        retired
    }

    /// Blocks until all submitted work has completed, then retires every in flight buffer
    pub fn flush(&mut self) -> Result<(), Error> {
        let value = self.queue.signal()?;
        if !self.queue.wait(value, None) {
            return Err(Error::Device(format!("{:?} queue did not reach fence value {}", self.queue_type, value)));
        }
        self.retire_completed();
        Ok(())
    }

    pub fn num_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn num_available(&self) -> usize {
        self.available.len()
    }

    /// Total command buffers this queue has created
    pub fn num_created(&self) -> usize {
        self.created
    }
}

impl<D> Drop for CommandQueue<D> where D: Device {
    fn drop(&mut self) {
        if let Some(last) = self.in_flight.back().map(|cmd| cmd.fence_value()) {
            if !self.queue.wait(last, Some(DROP_WAIT_TIMEOUT)) {
                tracing::warn!(
                    "hotline_gfx::queue: dropping {:?} queue with {} command buffers still in flight",
                    self.queue_type, self.in_flight.len()
                );
            }
        }
    }
}
