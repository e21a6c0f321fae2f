//! Engine module
//!
//! Control plane and processing loop.
//! Handles intents, connection bookkeeping, component lifecycle, graph
//! processing and the lock-free queues between the two sides.

pub mod audio_graph;
pub mod audio_processor;
pub mod channels;
pub mod commands;
pub mod connections;
pub mod controller;
pub mod lifecycle;

pub use audio_graph::AudioGraph;
pub use audio_processor::AudioProcessor;
pub use channels::{
    CommandSink, ControlHandle, EngineChannels, EngineHandle, DEFAULT_COMMAND_BUFFER_SIZE,
    DEFAULT_EVENT_BUFFER_SIZE,
};
pub use commands::{
    ComponentId, EngineCommand, EngineEvent, Intent, Outcome, OutcomeError, Status,
};
pub use connections::{Connection, ConnectionManager};
pub use controller::Controller;
pub use lifecycle::{ComponentHandle, ComponentManager, ControlSurfaceModel};

use crate::config::EngineConfig;
use crate::dsp::context::BuildContext;
use crate::dsp::registry::ModuleRegistry;

/// Builds both halves of an engine from a configuration.
///
/// The [`Controller`] stays on the control side; the [`AudioProcessor`] is
/// moved to whatever pulls audio.
pub fn create_engine(config: &EngineConfig) -> (Controller, AudioProcessor) {
    let build = BuildContext::from_config(config);
    let (control, engine) =
        EngineChannels::new(config.channels.command_capacity, config.channels.event_capacity)
            .split();
    let processor = AudioProcessor::new(build.process, engine);
    let controller = Controller::new(ModuleRegistry::builtin(), build, control);
    (controller, processor)
}
