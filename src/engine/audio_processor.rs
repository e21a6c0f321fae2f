//! Audio Processor
//!
//! The processing loop. It owns the [`AudioGraph`] and the engine side of
//! the channels, applies pending commands at tick boundaries and produces
//! samples on demand. An external sink (a device callback, a file writer, a
//! test) drives the cadence by pulling; the engine has no clock of its own.

use super::audio_graph::AudioGraph;
use super::channels::EngineHandle;
use super::commands::{ComponentId, EngineCommand, EngineEvent};
use crate::dsp::context::ProcessContext;

/// Runs the graph one sample period at a time.
///
/// This struct is moved into whatever context pulls audio.
pub struct AudioProcessor {
    /// The audio processing graph.
    graph: AudioGraph,
    /// Handle for receiving commands from the control plane.
    engine_handle: EngineHandle,
    /// Ticks since creation or the last reset.
    ticks: u64,
}

impl AudioProcessor {
    pub fn new(context: ProcessContext, engine_handle: EngineHandle) -> Self {
        Self {
            graph: AudioGraph::new(context),
            engine_handle,
            ticks: 0,
        }
    }

    pub fn graph(&self) -> &AudioGraph {
        &self.graph
    }

    pub fn context(&self) -> &ProcessContext {
        self.graph.context()
    }

    /// Global tick counter.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Advances the whole graph by one sample period.
    ///
    /// Pending commands are applied first, so the tick sees a consistent
    /// topology.
    pub fn tick(&mut self) {
        self.process_commands();

        let handle = &mut self.engine_handle;
        self.graph.process(|id, fault| {
            let _ = handle.send_event(EngineEvent::ModuleFaulted { id, fault });
        });
        self.ticks += 1;
    }

    /// Performs one tick and returns the sink's sample.
    ///
    /// Silence if the sink does not exist.
    pub fn pull(&mut self, sink: ComponentId) -> f32 {
        self.tick();
        self.graph.current_sample(sink) as f32
    }

    /// Pulls one sample per frame of `out`.
    pub fn fill(&mut self, sink: ComponentId, out: &mut [f32]) {
        for sample in out.iter_mut() {
            *sample = self.pull(sink);
        }
    }

    /// Pulls one sample per frame and copies it to every channel of an
    /// interleaved buffer.
    pub fn fill_interleaved(&mut self, sink: ComponentId, out: &mut [f32], channels: usize) {
        for frame in out.chunks_mut(channels.max(1)) {
            frame.fill(self.pull(sink));
        }
    }

    /// Applies all pending commands from the control plane.
    fn process_commands(&mut self) {
        while let Some(command) = self.engine_handle.recv_command() {
            if matches!(command, EngineCommand::Reset) {
                self.ticks = 0;
            }
            if let Some(event) = self.graph.handle_command(command) {
                // a full queue drops the event; a retired module is then freed here
                let _ = self.engine_handle.send_event(event);
            }
        }
    }
}
