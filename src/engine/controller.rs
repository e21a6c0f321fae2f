//! Control plane.
//!
//! The [`Controller`] turns [`Intent`]s into validated state changes and
//! answers each with an [`Outcome`]. A rejected intent leaves every piece of
//! state untouched. Accepted changes reach the processing loop as commands
//! and take effect at its next tick.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::dsp::context::BuildContext;
use crate::dsp::registry::ModuleRegistry;
use crate::error::{ErrorKind, Result};
use crate::persistence::Patch;

use super::channels::{CommandSink, ControlHandle};
use super::commands::{ComponentId, EngineCommand, EngineEvent, Intent, Outcome};
use super::connections::ConnectionManager;
use super::lifecycle::ComponentManager;

/// Commands an intent sends when it succeeds.
fn commands_needed(intent: &Intent) -> usize {
    match intent {
        Intent::SetParameter { .. } => 0,
        Intent::AddComponent { .. }
        | Intent::RemoveComponent { .. }
        | Intent::CreateConnection { .. }
        | Intent::RemoveConnection { .. }
        | Intent::Midi { .. } => 1,
    }
}

/// Applies intents from the control plane.
pub struct Controller {
    components: ComponentManager,
    control: ControlHandle,
    faulted: BTreeSet<ComponentId>,
}

impl Controller {
    pub fn new(registry: Arc<ModuleRegistry>, build: BuildContext, control: ControlHandle) -> Self {
        Self {
            components: ComponentManager::new(registry, build),
            control,
            faulted: BTreeSet::new(),
        }
    }

    pub fn components(&self) -> &ComponentManager {
        &self.components
    }

    pub fn connections(&self) -> &ConnectionManager {
        self.components.connections()
    }

    /// Applies one intent. Never panics; failures are reported in the outcome.
    pub fn apply(&mut self, intent: Intent) -> Outcome {
        let action = intent.name();
        match self.dispatch(intent) {
            Ok(payload) => {
                debug!(action, "intent applied");
                Outcome::success(action, payload)
            }
            Err(err) => {
                warn!(action, %err, "intent rejected");
                Outcome::from_error(action, &err)
            }
        }
    }

    /// Parses a JSON intent, applies it and serializes the outcome.
    pub fn apply_json(&mut self, text: &str) -> String {
        let outcome = match serde_json::from_str::<Intent>(text) {
            Ok(intent) => self.apply(intent),
            Err(err) => {
                warn!(%err, "malformed intent");
                Outcome::failed("unknown", ErrorKind::Incompatible, err.to_string())
            }
        };
        serde_json::to_string(&outcome).unwrap_or_else(|err| {
            warn!(%err, "outcome could not be serialized");
            String::from(r#"{"action":"unknown","status":"failed"}"#)
        })
    }

    fn dispatch(&mut self, intent: Intent) -> Result<Value> {
        self.control.reserve(commands_needed(&intent))?;

        match intent {
            Intent::AddComponent {
                component_type,
                name,
                id,
            } => {
                let id = self
                    .components
                    .add_component(id, component_type, &name, &mut self.control)?;
                Ok(json!({ "id": id, "component_type": component_type }))
            }
            Intent::RemoveComponent { id } => {
                let removed = self.components.remove_component(id, &mut self.control)?;
                self.faulted.remove(&id);
                Ok(json!({ "id": id, "removed_connections": removed }))
            }
            Intent::SetParameter {
                id,
                parameter,
                value,
            } => {
                let stored = self.components.set_parameter(id, parameter, value)?;
                Ok(json!({ "id": id, "parameter": parameter, "value": stored }))
            }
            Intent::CreateConnection { outbound, inbound } => {
                let connection = self
                    .components
                    .connect(outbound, inbound, &mut self.control)?;
                Ok(json!({ "connection": connection }))
            }
            Intent::RemoveConnection { connection } => {
                let removed = self
                    .components
                    .disconnect(&connection, &mut self.control)?;
                Ok(json!({ "connection": removed }))
            }
            Intent::Midi { id, event } => {
                self.components.send_midi(id, event, &mut self.control)?;
                Ok(json!({ "id": id }))
            }
        }
    }

    /// Clears runtime state of every component on the processing side.
    pub fn reset(&mut self) -> Result<()> {
        self.control.submit(EngineCommand::Reset)?;
        self.faulted.clear();
        info!("engine reset requested");
        Ok(())
    }

    /// Handles events from the processing loop. Returns how many were handled.
    ///
    /// Retired components are dropped here, off the processing side.
    pub fn poll_events(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.control.recv_event() {
            handled += 1;
            match event {
                EngineEvent::ModuleFaulted { id, fault } => {
                    warn!(id, %fault, "component faulted");
                    self.faulted.insert(id);
                }
                EngineEvent::ModuleRetired { id, module } => {
                    debug!(id, component_type = %module.component_type(), "component retired");
                    drop(module);
                }
                EngineEvent::CommandFailed { command, id } => {
                    warn!(command, id, "processing loop rejected command");
                }
            }
        }
        handled
    }

    /// Captures every component and connection as a patch.
    pub fn snapshot(&self, name: &str) -> Patch {
        Patch::capture(
            name,
            self.components.models(),
            self.components.connections().connections(),
        )
    }

    /// Replays a patch as intents, one outcome per intent.
    ///
    /// Components keep their saved ids, so ids already in use are rejected.
    /// Each intent needs at most one command slot; the processing loop must
    /// keep up with larger patches or the tail is rejected as busy.
    pub fn load_patch(&mut self, patch: &Patch) -> Vec<Outcome> {
        let intents = patch.intents(self.components.registry());
        let outcomes: Vec<Outcome> = intents.into_iter().map(|i| self.apply(i)).collect();
        let failed = outcomes.iter().filter(|o| !o.is_success()).count();
        if failed == 0 {
            info!(patch = %patch.name, intents = outcomes.len(), "patch loaded");
        } else {
            warn!(patch = %patch.name, failed, "patch loaded with rejected intents");
        }
        outcomes
    }

    /// Returns true if the processing loop reported a fault for `id`.
    pub fn is_faulted(&self, id: ComponentId) -> bool {
        self.faulted.contains(&id)
    }
}
