//! Typed, modulatable parameters.
//!
//! Every [`ParameterType`] has exactly one value representation ([`ValueKind`]),
//! fixed limits, a default and a modulation strategy. A [`ParameterStore`]
//! holds the live values of one component behind atomic cells so the control
//! context can write while the processing loop reads, without locks.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use super::wavetable::Waveform;
use crate::error::{EngineError, Result};

/// The controllable values a component can expose.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParameterType {
    Depth,
    Status,
    Waveform,
    Frequency,
    Amplitude,
    Gain,
    Phase,
    Pan,
    Detune,
    Attack,
    Decay,
    Sustain,
    Release,
    FilterType,
    Cutoff,
    QFactor,
}

/// Concrete representation of a parameter's value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    Double,
    Waveform,
}

/// How a modulation signal `m` with depth `d` is combined with a base value `v`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModulationStrategy {
    /// `v + d * m`
    Linear,
    /// `v * 2^(d * m)`, one unit of `m` per octave.
    Exponential,
    /// `v * 2^(d * m)`, for level-like values.
    Logarithmic,
    /// `v * (1 + d * m)`
    Multiplicative,
    /// The base value is left untouched.
    None,
}

impl ModulationStrategy {
    /// Combines a base value with a modulation signal.
    pub fn apply(&self, value: f64, depth: f64, signal: f64) -> f64 {
        match self {
            ModulationStrategy::Linear => value + depth * signal,
            ModulationStrategy::Exponential | ModulationStrategy::Logarithmic => {
                value * (depth * signal).exp2()
            }
            ModulationStrategy::Multiplicative => value * (1.0 + depth * signal),
            ModulationStrategy::None => value,
        }
    }
}

/// Valid range of a parameter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParameterLimits {
    pub min: f64,
    pub max: f64,
}

impl ParameterLimits {
    /// Creates a new range.
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Clamps a value to this range. NaN maps to the minimum.
    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() {
            self.min
        } else {
            value.clamp(self.min, self.max)
        }
    }
}

impl ParameterType {
    /// Every parameter type.
    pub const ALL: [ParameterType; 16] = [
        ParameterType::Depth,
        ParameterType::Status,
        ParameterType::Waveform,
        ParameterType::Frequency,
        ParameterType::Amplitude,
        ParameterType::Gain,
        ParameterType::Phase,
        ParameterType::Pan,
        ParameterType::Detune,
        ParameterType::Attack,
        ParameterType::Decay,
        ParameterType::Sustain,
        ParameterType::Release,
        ParameterType::FilterType,
        ParameterType::Cutoff,
        ParameterType::QFactor,
    ];

    /// Returns the display name of the parameter.
    pub fn name(&self) -> &'static str {
        match self {
            ParameterType::Depth => "depth",
            ParameterType::Status => "status",
            ParameterType::Waveform => "waveform",
            ParameterType::Frequency => "frequency",
            ParameterType::Amplitude => "amplitude",
            ParameterType::Gain => "gain",
            ParameterType::Phase => "phase",
            ParameterType::Pan => "pan",
            ParameterType::Detune => "detune",
            ParameterType::Attack => "attack",
            ParameterType::Decay => "decay",
            ParameterType::Sustain => "sustain",
            ParameterType::Release => "release",
            ParameterType::FilterType => "filter type",
            ParameterType::Cutoff => "cutoff",
            ParameterType::QFactor => "q factor",
        }
    }

    /// Returns the representation used for this parameter's values.
    pub fn kind(&self) -> ValueKind {
        match self {
            ParameterType::Status => ValueKind::Bool,
            ParameterType::Waveform => ValueKind::Waveform,
            ParameterType::FilterType => ValueKind::Int,
            ParameterType::Frequency
            | ParameterType::Amplitude
            | ParameterType::Gain
            | ParameterType::Phase => ValueKind::Double,
            ParameterType::Depth
            | ParameterType::Pan
            | ParameterType::Detune
            | ParameterType::Attack
            | ParameterType::Decay
            | ParameterType::Sustain
            | ParameterType::Release
            | ParameterType::Cutoff
            | ParameterType::QFactor => ValueKind::Float,
        }
    }

    /// Returns the valid range of this parameter.
    pub fn limits(&self) -> ParameterLimits {
        match self {
            ParameterType::Depth => ParameterLimits::new(-5.0, 5.0),
            ParameterType::Status => ParameterLimits::new(0.0, 1.0),
            ParameterType::Waveform => {
                ParameterLimits::new(0.0, (Waveform::ALL.len() - 1) as f64)
            }
            ParameterType::Frequency => ParameterLimits::new(0.0, 20_000.0),
            ParameterType::Amplitude
            | ParameterType::Gain
            | ParameterType::Phase
            | ParameterType::Sustain => ParameterLimits::new(0.0, 1.0),
            ParameterType::Pan => ParameterLimits::new(-1.0, 1.0),
            ParameterType::Detune => ParameterLimits::new(-1250.0, 1250.0),
            ParameterType::Attack | ParameterType::Decay | ParameterType::Release => {
                ParameterLimits::new(0.001, 4.0)
            }
            ParameterType::FilterType => ParameterLimits::new(0.0, 3.0),
            ParameterType::Cutoff => ParameterLimits::new(0.0, 20_000.0),
            ParameterType::QFactor => ParameterLimits::new(0.5, 10.0),
        }
    }

    /// Returns the value a freshly created component starts with.
    pub fn default_value(&self) -> ParameterValue {
        match self {
            ParameterType::Depth => ParameterValue::Float(1.0),
            ParameterType::Status => ParameterValue::Bool(false),
            ParameterType::Waveform => ParameterValue::Waveform(Waveform::Sine),
            ParameterType::Frequency => ParameterValue::Double(440.0),
            ParameterType::Amplitude | ParameterType::Gain => ParameterValue::Double(1.0),
            ParameterType::Phase => ParameterValue::Double(0.0),
            ParameterType::Pan | ParameterType::Detune => ParameterValue::Float(0.0),
            ParameterType::Attack => ParameterValue::Float(0.01),
            ParameterType::Decay => ParameterValue::Float(0.05),
            ParameterType::Sustain => ParameterValue::Float(0.8),
            ParameterType::Release => ParameterValue::Float(0.2),
            ParameterType::FilterType => ParameterValue::Int(0),
            ParameterType::Cutoff => ParameterValue::Float(0.0),
            ParameterType::QFactor => ParameterValue::Float(0.5),
        }
    }

    /// Returns how modulation signals are applied to this parameter.
    pub fn modulation_strategy(&self) -> ModulationStrategy {
        match self {
            ParameterType::Frequency | ParameterType::Cutoff => ModulationStrategy::Exponential,
            ParameterType::Amplitude | ParameterType::Gain => ModulationStrategy::Logarithmic,
            ParameterType::Phase | ParameterType::Pan | ParameterType::Sustain => {
                ModulationStrategy::Linear
            }
            ParameterType::Depth => ModulationStrategy::Multiplicative,
            _ => ModulationStrategy::None,
        }
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A parameter value in the representation of its [`ParameterType`].
///
/// On the wire values are untagged (`true`, `3`, `0.5`, `"SAW"`); use
/// [`ParameterValue::coerce`] to convert them to the kind a parameter needs.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Bool(bool),
    Int(i32),
    Double(f64),
    Float(f32),
    Waveform(Waveform),
}

impl ParameterValue {
    /// Returns the representation of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            ParameterValue::Bool(_) => ValueKind::Bool,
            ParameterValue::Int(_) => ValueKind::Int,
            ParameterValue::Float(_) => ValueKind::Float,
            ParameterValue::Double(_) => ValueKind::Double,
            ParameterValue::Waveform(_) => ValueKind::Waveform,
        }
    }

    /// Numeric view used for atomic storage and DSP.
    pub fn as_f64(&self) -> f64 {
        match *self {
            ParameterValue::Bool(b) => {
                if b {
                    1.0
                } else {
                    0.0
                }
            }
            ParameterValue::Int(i) => i as f64,
            ParameterValue::Float(f) => f as f64,
            ParameterValue::Double(d) => d,
            ParameterValue::Waveform(w) => w.index() as f64,
        }
    }

    /// Rebuilds a value of the given kind from its numeric view.
    pub fn from_f64(kind: ValueKind, value: f64) -> Self {
        match kind {
            ValueKind::Bool => ParameterValue::Bool(value >= 0.5),
            ValueKind::Int => ParameterValue::Int(value.round() as i32),
            ValueKind::Float => ParameterValue::Float(value as f32),
            ValueKind::Double => ParameterValue::Double(value),
            ValueKind::Waveform => {
                ParameterValue::Waveform(Waveform::from_index(value.round().max(0.0) as usize))
            }
        }
    }

    /// Converts this value to `kind`, failing when no sensible conversion exists.
    pub fn coerce(self, kind: ValueKind) -> std::result::Result<Self, String> {
        if self.kind() == kind {
            return Ok(self);
        }
        match (kind, self) {
            (ValueKind::Waveform, ParameterValue::Bool(_)) => {
                Err("a boolean cannot select a waveform".to_string())
            }
            (ValueKind::Waveform, other) => {
                let index = other.as_f64();
                if index.fract() != 0.0 || index < 0.0 || index >= Waveform::ALL.len() as f64 {
                    Err(format!("{index} is not a waveform index"))
                } else {
                    Ok(ParameterValue::Waveform(Waveform::from_index(index as usize)))
                }
            }
            (_, ParameterValue::Waveform(w)) => {
                Err(format!("waveform {w} is not a numeric value"))
            }
            (kind, other) => {
                let value = other.as_f64();
                if value.is_finite() {
                    Ok(ParameterValue::from_f64(kind, value))
                } else {
                    Err("value must be finite".to_string())
                }
            }
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Bool(b) => write!(f, "{b}"),
            ParameterValue::Int(i) => write!(f, "{i}"),
            ParameterValue::Float(v) => write!(f, "{v}"),
            ParameterValue::Double(v) => write!(f, "{v}"),
            ParameterValue::Waveform(w) => write!(f, "{w}"),
        }
    }
}

/// An `f64` stored as bits in an `AtomicU64`.
#[derive(Debug)]
struct AtomicF64(AtomicU64);

impl AtomicF64 {
    fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// Live storage of one parameter.
///
/// `base` is written by the control context, `instantaneous` by the
/// processing loop when a modulator is bound.
#[derive(Debug)]
struct ParameterCell {
    parameter: ParameterType,
    base: AtomicF64,
    instantaneous: AtomicF64,
    modulated: AtomicBool,
}

impl ParameterCell {
    fn new(parameter: ParameterType) -> Self {
        let default = parameter.default_value().as_f64();
        Self {
            parameter,
            base: AtomicF64::new(default),
            instantaneous: AtomicF64::new(default),
            modulated: AtomicBool::new(false),
        }
    }
}

/// The parameter values of one component.
///
/// The set of parameter types is fixed at construction; values change through
/// `&self` methods so a store can be shared with `Arc` between threads.
#[derive(Debug)]
pub struct ParameterStore {
    cells: Vec<ParameterCell>,
}

impl ParameterStore {
    /// Creates a store holding the given parameters at their defaults.
    pub fn new(parameters: &[ParameterType]) -> Self {
        let mut cells: Vec<ParameterCell> = Vec::with_capacity(parameters.len());
        for &p in parameters {
            if !cells.iter().any(|c| c.parameter == p) {
                cells.push(ParameterCell::new(p));
            }
        }
        Self { cells }
    }

    fn cell(&self, parameter: ParameterType) -> Option<&ParameterCell> {
        self.cells.iter().find(|c| c.parameter == parameter)
    }

    fn require(&self, parameter: ParameterType) -> Result<&ParameterCell> {
        self.cell(parameter)
            .ok_or(EngineError::UnknownParameter(parameter))
    }

    /// Returns true if the store holds `parameter`.
    pub fn contains(&self, parameter: ParameterType) -> bool {
        self.cell(parameter).is_some()
    }

    /// Parameter types held by this store, in construction order.
    pub fn parameter_types(&self) -> impl Iterator<Item = ParameterType> + '_ {
        self.cells.iter().map(|c| c.parameter)
    }

    /// Number of parameters in the store.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Returns true if the store holds no parameters.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Returns the base value of a parameter.
    pub fn get(&self, parameter: ParameterType) -> Result<ParameterValue> {
        let cell = self.require(parameter)?;
        Ok(ParameterValue::from_f64(parameter.kind(), cell.base.load()))
    }

    /// Coerces, clamps and stores a base value, returning what was stored.
    pub fn set(&self, parameter: ParameterType, value: ParameterValue) -> Result<ParameterValue> {
        let cell = self.require(parameter)?;
        let value = value
            .coerce(parameter.kind())
            .map_err(|reason| EngineError::InvalidValue { parameter, reason })?;
        let clamped = parameter.limits().clamp(value.as_f64());
        let stored = ParameterValue::from_f64(parameter.kind(), clamped);
        cell.base.store(stored.as_f64());
        Ok(stored)
    }

    /// Stores a numeric base value, clamped to the parameter's limits.
    pub fn set_f64(&self, parameter: ParameterType, value: f64) -> Result<f64> {
        let cell = self.require(parameter)?;
        let stored =
            ParameterValue::from_f64(parameter.kind(), parameter.limits().clamp(value)).as_f64();
        cell.base.store(stored);
        Ok(stored)
    }

    /// Numeric base value, or the type's default if the store lacks it.
    pub fn base_value(&self, parameter: ParameterType) -> f64 {
        match self.cell(parameter) {
            Some(cell) => cell.base.load(),
            None => parameter.default_value().as_f64(),
        }
    }

    /// Value the processing loop should use: the modulated value when a
    /// modulator is bound, the base value otherwise.
    pub fn effective_value(&self, parameter: ParameterType) -> f64 {
        match self.cell(parameter) {
            Some(cell) if cell.modulated.load(Ordering::Relaxed) => cell.instantaneous.load(),
            Some(cell) => cell.base.load(),
            None => parameter.default_value().as_f64(),
        }
    }

    /// Records a modulated value, clamped to the parameter's limits.
    pub fn set_instantaneous(&self, parameter: ParameterType, value: f64) {
        if let Some(cell) = self.cell(parameter) {
            cell.instantaneous.store(parameter.limits().clamp(value));
            cell.modulated.store(true, Ordering::Relaxed);
        }
    }

    /// Drops the modulated value so the base value applies again.
    pub fn clear_instantaneous(&self, parameter: ParameterType) {
        if let Some(cell) = self.cell(parameter) {
            cell.modulated.store(false, Ordering::Relaxed);
        }
    }

    /// Returns true if a modulated value currently overrides the base value.
    pub fn is_modulated(&self, parameter: ParameterType) -> bool {
        self.cell(parameter)
            .is_some_and(|c| c.modulated.load(Ordering::Relaxed))
    }

    /// Base values of every parameter, in construction order.
    pub fn snapshot(&self) -> Vec<(ParameterType, ParameterValue)> {
        self.cells
            .iter()
            .map(|c| {
                (
                    c.parameter,
                    ParameterValue::from_f64(c.parameter.kind(), c.base.load()),
                )
            })
            .collect()
    }
}
