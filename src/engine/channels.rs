//! Engine Channels
//!
//! Lock-free communication between the control plane and the processing loop.
//! Uses rtrb ring buffers for SPSC (single-producer, single-consumer) queues.

use rtrb::{Consumer, Producer, RingBuffer};

use super::commands::{EngineCommand, EngineEvent};
use crate::error::{EngineError, Result as EngineResult};

/// Default buffer size for command queue (control -> processing).
pub const DEFAULT_COMMAND_BUFFER_SIZE: usize = 1024;

/// Default buffer size for event queue (processing -> control).
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

/// Holds both directions of communication channels.
/// Split into producer/consumer pairs for the two contexts.
pub struct EngineChannels {
    /// Send commands from the control plane.
    pub command_tx: Producer<EngineCommand>,
    /// Receive commands in the processing loop.
    pub command_rx: Consumer<EngineCommand>,
    /// Send events from the processing loop.
    pub event_tx: Producer<EngineEvent>,
    /// Receive events in the control plane.
    pub event_rx: Consumer<EngineEvent>,
}

impl EngineChannels {
    /// Create new engine channels with the specified buffer sizes.
    ///
    /// # Arguments
    /// * `command_capacity` - Number of commands the buffer can hold
    /// * `event_capacity` - Number of events the buffer can hold
    pub fn new(command_capacity: usize, event_capacity: usize) -> Self {
        let (command_tx, command_rx) = RingBuffer::new(command_capacity);
        let (event_tx, event_rx) = RingBuffer::new(event_capacity);

        Self {
            command_tx,
            command_rx,
            event_tx,
            event_rx,
        }
    }

    /// Create new channels with default buffer sizes.
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_COMMAND_BUFFER_SIZE, DEFAULT_EVENT_BUFFER_SIZE)
    }

    /// Split the channels into control-side and engine-side handles.
    pub fn split(self) -> (ControlHandle, EngineHandle) {
        let control = ControlHandle {
            command_tx: self.command_tx,
            event_rx: self.event_rx,
        };
        let engine = EngineHandle {
            command_rx: self.command_rx,
            event_tx: self.event_tx,
        };
        (control, engine)
    }
}

/// Control-side handle: command producer and event consumer.
pub struct ControlHandle {
    command_tx: Producer<EngineCommand>,
    event_rx: Consumer<EngineEvent>,
}

impl ControlHandle {
    /// Send a command to the processing loop.
    /// Returns Err(cmd) if the buffer is full. Never waits for space.
    pub fn send_command(&mut self, cmd: EngineCommand) -> Result<(), EngineCommand> {
        self.command_tx
            .push(cmd)
            .map_err(|rtrb::PushError::Full(cmd)| cmd)
    }

    /// Receive an event from the processing loop.
    pub fn recv_event(&mut self) -> Option<EngineEvent> {
        self.event_rx.pop().ok()
    }

    /// Drain all pending events.
    pub fn drain_events(&mut self) -> impl Iterator<Item = EngineEvent> + '_ {
        std::iter::from_fn(|| self.recv_event())
    }

    /// Check how many commands can still be queued.
    pub fn command_slots_available(&self) -> usize {
        self.command_tx.slots()
    }

    /// Check if the command buffer is full.
    pub fn is_command_buffer_full(&self) -> bool {
        self.command_tx.is_full()
    }
}

/// Destination of control-side commands.
pub trait CommandSink {
    /// Free command slots.
    fn slots(&self) -> usize;

    /// Queues a command, failing with `QueueFull` when there is no room.
    fn submit(&mut self, cmd: EngineCommand) -> EngineResult<()>;

    /// Fails unless `needed` commands fit.
    fn reserve(&self, needed: usize) -> EngineResult<()> {
        let available = self.slots();
        if available < needed {
            return Err(EngineError::QueueFull { needed, available });
        }
        Ok(())
    }
}

impl CommandSink for ControlHandle {
    fn slots(&self) -> usize {
        self.command_slots_available()
    }

    fn submit(&mut self, cmd: EngineCommand) -> EngineResult<()> {
        self.send_command(cmd)
            .map_err(|_| EngineError::QueueFull {
                needed: 1,
                available: 0,
            })
    }
}

/// Engine-side handle: command consumer and event producer.
///
/// All methods are non-blocking and do not allocate.
pub struct EngineHandle {
    command_rx: Consumer<EngineCommand>,
    event_tx: Producer<EngineEvent>,
}

impl EngineHandle {
    /// Receive a command from the control plane.
    pub fn recv_command(&mut self) -> Option<EngineCommand> {
        self.command_rx.pop().ok()
    }

    /// Process all pending commands with the given handler, in order.
    pub fn process_commands<F>(&mut self, mut handler: F)
    where
        F: FnMut(EngineCommand),
    {
        while let Some(cmd) = self.recv_command() {
            handler(cmd);
        }
    }

    /// Send an event to the control plane.
    /// Returns Err(event) if the buffer is full.
    pub fn send_event(&mut self, event: EngineEvent) -> Result<(), EngineEvent> {
        self.event_tx
            .push(event)
            .map_err(|rtrb::PushError::Full(event)| event)
    }

    /// Check how many events can still be queued.
    pub fn event_slots_available(&self) -> usize {
        self.event_tx.slots()
    }

    /// Check how many commands are pending.
    pub fn commands_pending(&self) -> usize {
        self.command_rx.slots()
    }
}
