//! Ports and socket coordinates.
//!
//! A [`Socket`] names a port by (component id, port index, port class). It is a
//! plain value, so a connection request can name endpoints before anyone has
//! checked that they exist.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::engine::commands::ComponentId;

/// Direction of a port on a component.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PortDirection {
    /// An input port that receives signals.
    Input,
    /// An output port that sends signals.
    Output,
}

impl PortDirection {
    /// Returns a human-readable name for the port direction.
    pub fn name(&self) -> &'static str {
        match self {
            PortDirection::Input => "Input",
            PortDirection::Output => "Output",
        }
    }
}

/// Kind of signal a port carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SignalType {
    /// Per-sample audio.
    Audio,
    /// Note events.
    Midi,
    /// A control source feeding a parameter.
    Modulation,
}

impl SignalType {
    /// Signals only connect to ports of the same type.
    pub fn can_connect_to(&self, other: &SignalType) -> bool {
        self == other
    }

    /// Returns a human-readable name for the signal type.
    pub fn name(&self) -> &'static str {
        match self {
            SignalType::Audio => "Audio",
            SignalType::Midi => "MIDI",
            SignalType::Modulation => "Modulation",
        }
    }
}

/// The six port classes a socket can address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortClass {
    AudioIn,
    AudioOut,
    MidiIn,
    MidiOut,
    ModulationIn,
    ModulationOut,
}

impl PortClass {
    /// Every port class.
    pub const ALL: [PortClass; 6] = [
        PortClass::AudioIn,
        PortClass::AudioOut,
        PortClass::MidiIn,
        PortClass::MidiOut,
        PortClass::ModulationIn,
        PortClass::ModulationOut,
    ];

    /// Returns whether signals enter or leave through this class.
    pub fn direction(&self) -> PortDirection {
        match self {
            PortClass::AudioIn | PortClass::MidiIn | PortClass::ModulationIn => {
                PortDirection::Input
            }
            PortClass::AudioOut | PortClass::MidiOut | PortClass::ModulationOut => {
                PortDirection::Output
            }
        }
    }

    /// Returns the signal carried by this class.
    pub fn signal_type(&self) -> SignalType {
        match self {
            PortClass::AudioIn | PortClass::AudioOut => SignalType::Audio,
            PortClass::MidiIn | PortClass::MidiOut => SignalType::Midi,
            PortClass::ModulationIn | PortClass::ModulationOut => SignalType::Modulation,
        }
    }

    /// Returns true for input classes.
    pub fn is_inbound(&self) -> bool {
        self.direction() == PortDirection::Input
    }

    /// Returns true if an edge may run from `self` (outbound) to `inbound`.
    pub fn compatible_with(&self, inbound: &PortClass) -> bool {
        !self.is_inbound()
            && inbound.is_inbound()
            && self.signal_type().can_connect_to(&inbound.signal_type())
    }

    /// Returns a human-readable name for the class.
    pub fn name(&self) -> &'static str {
        match self {
            PortClass::AudioIn => "audio in",
            PortClass::AudioOut => "audio out",
            PortClass::MidiIn => "midi in",
            PortClass::MidiOut => "midi out",
            PortClass::ModulationIn => "modulation in",
            PortClass::ModulationOut => "modulation out",
        }
    }
}

impl fmt::Display for PortClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Coordinate of a port: component id, port index within its class, and class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Socket {
    pub module: ComponentId,
    pub port: usize,
    pub class: PortClass,
}

impl Socket {
    /// Creates a socket coordinate.
    pub fn new(module: ComponentId, port: usize, class: PortClass) -> Self {
        Self {
            module,
            port,
            class,
        }
    }

    /// Returns true if this socket receives signals.
    pub fn is_inbound(&self) -> bool {
        self.class.is_inbound()
    }
}

impl fmt::Display for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}#{}", self.module, self.class, self.port)
    }
}
