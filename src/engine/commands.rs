//! Commands, events, intents and outcomes.
//!
//! [`EngineCommand`]s travel from the control plane to the processing loop,
//! [`EngineEvent`]s travel back. Both sides run in separate contexts and only
//! exchange these values through lock-free ring buffers.
//!
//! [`Intent`] and [`Outcome`] are the serde shapes the control plane accepts
//! and answers with.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dsp::midi::MidiEvent;
use crate::dsp::module_trait::{Fault, Module};
use crate::dsp::parameter::{ParameterType, ParameterValue};
use crate::dsp::port::Socket;
use crate::dsp::registry::ComponentType;
use crate::engine::connections::Connection;
use crate::error::{EngineError, ErrorKind};

/// Unique identifier for a component in the graph.
pub type ComponentId = u64;

/// Commands sent from the control plane to the processing loop.
///
/// Applied only at tick boundaries, so a tick always sees a consistent graph.
pub enum EngineCommand {
    /// Insert a component built on the control side.
    AddModule {
        id: ComponentId,
        module: Box<dyn Module>,
    },

    /// Remove a component. Its connections have already been removed.
    RemoveModule { id: ComponentId },

    /// Wire a validated connection.
    Connect(Connection),

    /// Unwire a connection.
    Disconnect(Connection),

    /// Deliver a MIDI event to a component.
    Midi { id: ComponentId, event: MidiEvent },

    /// Clear runtime state of every component and the tick counter.
    Reset,
}

impl fmt::Debug for EngineCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineCommand::AddModule { id, module } => f
                .debug_struct("AddModule")
                .field("id", id)
                .field("component_type", &module.component_type())
                .finish(),
            EngineCommand::RemoveModule { id } => {
                f.debug_struct("RemoveModule").field("id", id).finish()
            }
            EngineCommand::Connect(c) => f.debug_tuple("Connect").field(c).finish(),
            EngineCommand::Disconnect(c) => f.debug_tuple("Disconnect").field(c).finish(),
            EngineCommand::Midi { id, event } => f
                .debug_struct("Midi")
                .field("id", id)
                .field("event", event)
                .finish(),
            EngineCommand::Reset => f.write_str("Reset"),
        }
    }
}

/// Events sent from the processing loop back to the control plane.
pub enum EngineEvent {
    /// A component stopped producing sound.
    ModuleFaulted { id: ComponentId, fault: Fault },

    /// A removed component, handed back so it is dropped off the processing side.
    ModuleRetired {
        id: ComponentId,
        module: Box<dyn Module>,
    },

    /// A command referred to state the graph does not have.
    CommandFailed { command: &'static str, id: ComponentId },
}

impl fmt::Debug for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineEvent::ModuleFaulted { id, fault } => f
                .debug_struct("ModuleFaulted")
                .field("id", id)
                .field("fault", fault)
                .finish(),
            EngineEvent::ModuleRetired { id, module } => f
                .debug_struct("ModuleRetired")
                .field("id", id)
                .field("component_type", &module.component_type())
                .finish(),
            EngineEvent::CommandFailed { command, id } => f
                .debug_struct("CommandFailed")
                .field("command", command)
                .field("id", id)
                .finish(),
        }
    }
}

/// A request from the control plane.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Intent {
    AddComponent {
        component_type: ComponentType,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<ComponentId>,
    },
    RemoveComponent {
        id: ComponentId,
    },
    SetParameter {
        id: ComponentId,
        parameter: ParameterType,
        value: ParameterValue,
    },
    CreateConnection {
        outbound: Socket,
        inbound: Socket,
    },
    RemoveConnection {
        connection: Connection,
    },
    Midi {
        id: ComponentId,
        event: MidiEvent,
    },
}

impl Intent {
    /// The `action` tag, used to correlate outcomes.
    pub fn name(&self) -> &'static str {
        match self {
            Intent::AddComponent { .. } => "add_component",
            Intent::RemoveComponent { .. } => "remove_component",
            Intent::SetParameter { .. } => "set_parameter",
            Intent::CreateConnection { .. } => "create_connection",
            Intent::RemoveConnection { .. } => "remove_connection",
            Intent::Midi { .. } => "midi",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    Failed,
}

/// Error details of a failed outcome.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutcomeError {
    pub kind: ErrorKind,
    pub message: String,
}

/// The answer to an [`Intent`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub action: String,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OutcomeError>,
}

impl Outcome {
    pub fn success(action: impl Into<String>, payload: Value) -> Self {
        Self {
            action: action.into(),
            status: Status::Success,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn failed(action: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            status: Status::Failed,
            payload: None,
            error: Some(OutcomeError {
                kind,
                message: message.into(),
            }),
        }
    }

    /// A failed outcome carrying an engine error.
    pub fn from_error(action: impl Into<String>, err: &EngineError) -> Self {
        Self::failed(action, err.kind(), err.to_string())
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// The error kind, if the intent failed.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}
