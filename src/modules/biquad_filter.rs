//! Biquad filter module.
//!
//! A second-order IIR filter in Direct Form I. Coefficients follow the RBJ
//! Audio EQ Cookbook and are recomputed only when the filter type, cutoff or
//! Q actually change.

use std::f64::consts::PI;

use crate::dsp::{
    context::{BuildContext, ProcessContext},
    module_trait::{Module, ModuleCore, SignalView},
    parameter::ParameterType,
    registry::{ComponentType, ModuleDescriptor, ModuleType},
};

/// Cutoff a new filter starts with, in Hz.
pub const DEFAULT_CUTOFF: f64 = 1_000.0;

/// Q a new filter starts with (Butterworth).
pub const DEFAULT_Q: f64 = 0.707;

/// Response selected by the FilterType parameter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FilterKind {
    #[default]
    LowPass,
    HighPass,
    BandPass,
    BandStop,
}

impl FilterKind {
    /// Every kind, in parameter index order.
    pub const ALL: [FilterKind; 4] = [
        FilterKind::LowPass,
        FilterKind::HighPass,
        FilterKind::BandPass,
        FilterKind::BandStop,
    ];

    /// Kind for a FilterType parameter value. Out-of-range values saturate.
    pub fn from_index(index: f64) -> Self {
        let i = index.round().clamp(0.0, (Self::ALL.len() - 1) as f64) as usize;
        Self::ALL[i]
    }
}

/// Filter coefficients normalized by `a0`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Coefficients {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl Coefficients {
    /// Passes the input through unchanged.
    pub const IDENTITY: Coefficients = Coefficients {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    /// Designs a filter. `cutoff` is kept strictly between 0 Hz and Nyquist.
    pub fn design(kind: FilterKind, cutoff: f64, q: f64, sample_rate: f64) -> Self {
        let nyquist = sample_rate / 2.0;
        let cutoff = cutoff.clamp(1.0, nyquist * 0.999);
        let q = q.max(f64::EPSILON);

        let w0 = 2.0 * PI * cutoff / sample_rate;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * q);

        let (b0, b1, b2) = match kind {
            FilterKind::LowPass => {
                let b = (1.0 - cos_w0) / 2.0;
                (b, 1.0 - cos_w0, b)
            }
            FilterKind::HighPass => {
                let b = (1.0 + cos_w0) / 2.0;
                (b, -1.0 - cos_w0, b)
            }
            // constant skirt gain, peak gain = Q
            FilterKind::BandPass => (q * alpha, 0.0, -q * alpha),
            FilterKind::BandStop => (1.0, -2.0 * cos_w0, 1.0),
        };
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Gain at 0 Hz.
    pub fn dc_gain(&self) -> f64 {
        (self.b0 + self.b1 + self.b2) / (1.0 + self.a1 + self.a2)
    }
}

/// Previous two inputs and outputs.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct History {
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl History {
    fn process(&mut self, c: &Coefficients, x: f64) -> f64 {
        let y = c.b0 * x + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }
}

/// A resonant filter for audio signals.
///
/// # Ports
///
/// - **In** (Audio, Input): every connected source is summed.
/// - **Out** (Audio, Output): the filtered signal.
/// - **Modulation In 0**: Cutoff.
///
/// # Parameters
///
/// - **FilterType** (0-3): low-pass, high-pass, band-pass or band-stop.
/// - **Cutoff** (0-20000 Hz): corner or center frequency, default 1000 Hz.
/// - **QFactor** (0.5-10): resonance, default 0.707.
pub struct BiquadFilter {
    core: ModuleCore,
    coefficients: Coefficients,
    /// Filter type, cutoff and Q the coefficients were designed for.
    designed: Option<(FilterKind, f64, f64)>,
    history: History,
}

impl BiquadFilter {
    pub const DESCRIPTOR: ModuleDescriptor = ModuleDescriptor {
        name: "Biquad Filter",
        component_type: ComponentType::Module(ModuleType::BiquadFilter),
        modulatable: &[ParameterType::Cutoff],
        controllable: &[
            ParameterType::FilterType,
            ParameterType::Cutoff,
            ParameterType::QFactor,
        ],
        audio_inputs: 1,
        audio_outputs: 1,
        midi_inputs: 0,
        midi_outputs: 0,
        modulation_outputs: 0,
        polyphonic: false,
    };

    pub fn new(ctx: &BuildContext) -> Self {
        let core = ModuleCore::new(Self::DESCRIPTOR, ctx.buffer_size());
        // both parameters are in the store; the descriptor lists them
        let _ = core.parameters().set_f64(ParameterType::Cutoff, DEFAULT_CUTOFF);
        let _ = core.parameters().set_f64(ParameterType::QFactor, DEFAULT_Q);
        Self {
            core,
            coefficients: Coefficients::IDENTITY,
            designed: None,
            history: History::default(),
        }
    }

    pub fn build(ctx: &BuildContext) -> Box<dyn Module> {
        Box::new(Self::new(ctx))
    }

    /// Filter type currently selected.
    pub fn kind(&self) -> FilterKind {
        FilterKind::from_index(self.core.parameters().base_value(ParameterType::FilterType))
    }

    pub fn coefficients(&self) -> &Coefficients {
        &self.coefficients
    }

    fn update_coefficients(&mut self, sample_rate: f64) {
        let params = self.core.parameters();
        let design = (
            self.kind(),
            params.effective_value(ParameterType::Cutoff),
            params.effective_value(ParameterType::QFactor),
        );
        if self.designed != Some(design) {
            let (kind, cutoff, q) = design;
            self.coefficients = Coefficients::design(kind, cutoff, q, sample_rate);
            self.designed = Some(design);
        }
    }
}

impl Module for BiquadFilter {
    fn core(&self) -> &ModuleCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ModuleCore {
        &mut self.core
    }

    fn next_sample(&mut self, ctx: &ProcessContext, view: &dyn SignalView) -> f64 {
        self.update_coefficients(ctx.sample_rate);
        let input = self.core.sum_inputs(view);
        self.history.process(&self.coefficients, input)
    }

    fn reset(&mut self) {
        self.core.reset();
        self.history = History::default();
    }
}
