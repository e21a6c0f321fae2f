//! Engine error types.
//!
//! Every rejected intent maps to one [`EngineError`]. Runtime errors never
//! leave partially applied state behind; configuration errors are fatal at
//! startup.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dsp::parameter::ParameterType;
use crate::dsp::port::Socket;
use crate::dsp::registry::ComponentType;
use crate::engine::commands::ComponentId;
use crate::engine::connections::Connection;

/// Coarse classification of an [`EngineError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Unknown component, parameter, socket or connection.
    NotFound,
    /// Port classes do not match, a port is out of range, or the edge would form a cycle.
    Incompatible,
    /// The component id, connection or modulation binding already exists.
    Duplicate,
    /// The registry has no entry for a component type.
    Configuration,
    /// The processing side cannot accept more commands right now.
    Busy,
}

impl ErrorKind {
    /// Returns a human-readable name for the kind.
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::Incompatible => "incompatible",
            ErrorKind::Duplicate => "already exists",
            ErrorKind::Configuration => "configuration error",
            ErrorKind::Busy => "busy",
        }
    }
}

/// Errors reported by the engine's control plane.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("component {0} not found")]
    ComponentNotFound(ComponentId),

    #[error("component {0} already exists")]
    DuplicateComponent(ComponentId),

    #[error("parameter '{parameter}' is not controllable on component {id}")]
    NotControllable { id: ComponentId, parameter: ParameterType },

    #[error("parameter '{parameter}' is not modulatable on component {id}")]
    NotModulatable { id: ComponentId, parameter: ParameterType },

    #[error("parameter '{0}' is not present in this store")]
    UnknownParameter(ParameterType),

    #[error("invalid value for parameter '{parameter}': {reason}")]
    InvalidValue { parameter: ParameterType, reason: String },

    #[error("socket {0} does not exist")]
    SocketNotFound(Socket),

    #[error("cannot connect {outbound} to {inbound}: {reason}")]
    IncompatibleSockets {
        outbound: Socket,
        inbound: Socket,
        reason: &'static str,
    },

    #[error("connecting {outbound} to {inbound} would create a cycle")]
    CycleDetected { outbound: Socket, inbound: Socket },

    #[error("connection {0} already exists")]
    DuplicateConnection(Connection),

    #[error("parameter '{parameter}' on component {id} is already bound to component {modulator}")]
    AlreadyModulated {
        id: ComponentId,
        parameter: ParameterType,
        modulator: ComponentId,
    },

    #[error("connection {0} is not present")]
    ConnectionNotFound(Connection),

    #[error("component {id} ({component_type}) does not accept MIDI events")]
    NotMidiSource {
        id: ComponentId,
        component_type: ComponentType,
    },

    #[error("no registry entry for component type {0}")]
    UnknownComponentType(ComponentType),

    #[error("command queue is full ({needed} slots needed, {available} available)")]
    QueueFull { needed: usize, available: usize },
}

impl EngineError {
    /// Returns the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::ComponentNotFound(_)
            | EngineError::NotControllable { .. }
            | EngineError::NotModulatable { .. }
            | EngineError::UnknownParameter(_)
            | EngineError::InvalidValue { .. }
            | EngineError::SocketNotFound(_)
            | EngineError::ConnectionNotFound(_) => ErrorKind::NotFound,
            EngineError::IncompatibleSockets { .. }
            | EngineError::CycleDetected { .. }
            | EngineError::NotMidiSource { .. } => ErrorKind::Incompatible,
            EngineError::DuplicateComponent(_)
            | EngineError::DuplicateConnection(_)
            | EngineError::AlreadyModulated { .. } => ErrorKind::Duplicate,
            EngineError::UnknownComponentType(_) => ErrorKind::Configuration,
            EngineError::QueueFull { .. } => ErrorKind::Busy,
        }
    }

    /// Returns true if the error indicates a defect in the registry or config.
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }
}

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, EngineError>;
