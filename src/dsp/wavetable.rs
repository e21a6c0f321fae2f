//! Waveforms and precomputed wavetables.
//!
//! Tables are generated once per engine and shared read-only between every
//! oscillator. Square and saw tables are band-limited with PolyBLEP.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Oscillator waveform.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Waveform {
    #[default]
    Sine,
    Square,
    Triangle,
    Saw,
    Noise,
}

impl Waveform {
    /// All waveforms, in table order.
    pub const ALL: [Waveform; 5] = [
        Waveform::Sine,
        Waveform::Square,
        Waveform::Triangle,
        Waveform::Saw,
        Waveform::Noise,
    ];

    /// Returns the wire name of the waveform.
    pub fn name(&self) -> &'static str {
        match self {
            Waveform::Sine => "SINE",
            Waveform::Square => "SQUARE",
            Waveform::Triangle => "TRIANGLE",
            Waveform::Saw => "SAW",
            Waveform::Noise => "NOISE",
        }
    }

    /// Position of the waveform in [`Waveform::ALL`].
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Looks a waveform up by index, clamping out-of-range values to the last one.
    pub fn from_index(index: usize) -> Self {
        Self::ALL[index.min(Self::ALL.len() - 1)]
    }
}

impl fmt::Display for Waveform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Waveform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|w| w.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown waveform '{s}'"))
    }
}

/// One precomputed table per [`Waveform`].
#[derive(Clone, Debug)]
pub struct WavetableBank {
    tables: Vec<Vec<f64>>,
    size: usize,
}

impl WavetableBank {
    /// Generates all tables with `size` samples each. Sizes below 2 are raised to 2.
    pub fn new(size: usize) -> Self {
        let size = size.max(2);
        let square = square_table(size);
        let triangle = triangle_table(&square);
        // order must match Waveform::ALL
        let tables = vec![
            sine_table(size),
            square,
            triangle,
            saw_table(size),
            noise_table(size),
        ];
        Self { tables, size }
    }

    /// Number of samples per table.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Raw table for a waveform.
    pub fn table(&self, waveform: Waveform) -> &[f64] {
        &self.tables[waveform.index()]
    }

    /// Reads a table at `phase` (0.0 to 1.0) with linear interpolation.
    pub fn sample(&self, waveform: Waveform, phase: f64) -> f64 {
        let table = self.table(waveform);
        let last = self.size - 1;
        let position = phase.clamp(0.0, 1.0) * last as f64;
        let index = position.floor() as usize;
        let frac = position - index as f64;
        let a = table[index.min(last)];
        let b = table[(index + 1).min(last)];
        a + (b - a) * frac
    }
}

fn poly_blep(t: f64, dt: f64) -> f64 {
    if t < dt {
        let t = t / dt;
        t + t - t * t - 1.0
    } else if t > 1.0 - dt {
        let t = (t - 1.0) / dt;
        t * t + t + t + 1.0
    } else {
        0.0
    }
}

fn sine_table(size: usize) -> Vec<f64> {
    (0..size)
        .map(|i| (std::f64::consts::TAU * i as f64 / size as f64).sin())
        .collect()
}

fn square_table(size: usize) -> Vec<f64> {
    let dt = 1.0 / size as f64;
    (0..size)
        .map(|i| {
            let phase = i as f64 / size as f64;
            let mut sample = if phase < 0.5 { 1.0 } else { -1.0 };
            sample += poly_blep(phase, dt);
            sample -= poly_blep((phase + 0.5) % 1.0, dt);
            sample
        })
        .collect()
}

/// Integrates the square table and normalizes the result to [-1, 1].
fn triangle_table(square: &[f64]) -> Vec<f64> {
    let mut acc = 0.0;
    let mut table: Vec<f64> = square
        .iter()
        .map(|s| {
            acc += s;
            acc
        })
        .collect();
    let mean = table.iter().sum::<f64>() / table.len() as f64;
    let peak = table
        .iter()
        .map(|v| (v - mean).abs())
        .fold(0.0_f64, f64::max);
    for v in &mut table {
        *v = if peak > 0.0 { (*v - mean) / peak } else { 0.0 };
    }
    table
}

fn saw_table(size: usize) -> Vec<f64> {
    let dt = 1.0 / size as f64;
    (0..size)
        .map(|i| {
            let phase = i as f64 / size as f64;
            2.0 * phase - 1.0 - poly_blep(phase, dt)
        })
        .collect()
}

/// White noise from a fixed-seed xorshift generator, so renders are reproducible.
fn noise_table(size: usize) -> Vec<f64> {
    let mut state: u32 = 0x9E37_79B9;
    (0..size)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state as f64 / u32::MAX as f64) * 2.0 - 1.0
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_waveform_names() {
        assert_eq!(Waveform::Sine.name(), "SINE");
        assert_eq!(Waveform::Saw.to_string(), "SAW");
        assert_eq!("triangle".parse::<Waveform>().unwrap(), Waveform::Triangle);
        assert!("pulse".parse::<Waveform>().is_err());
    }

    #[test]
    fn test_waveform_index_round_trip() {
        for (i, w) in Waveform::ALL.iter().enumerate() {
            assert_eq!(w.index(), i);
            assert_eq!(Waveform::from_index(i), *w);
        }
        assert_eq!(Waveform::from_index(99), Waveform::Noise);
    }

    #[test]
    fn test_waveform_serde() {
        assert_eq!(serde_json::to_string(&Waveform::Square).unwrap(), "\"SQUARE\"");
        let w: Waveform = serde_json::from_str("\"NOISE\"").unwrap();
        assert_eq!(w, Waveform::Noise);
    }

    #[test]
    fn test_tables_have_requested_size() {
        let bank = WavetableBank::new(256);
        assert_eq!(bank.size(), 256);
        for w in Waveform::ALL {
            assert_eq!(bank.table(w).len(), 256, "{w}");
        }
    }

    #[test]
    fn test_tables_are_bounded() {
        let bank = WavetableBank::new(1024);
        for w in Waveform::ALL {
            for &s in bank.table(w) {
                assert!(s.is_finite());
                assert!(s.abs() <= 1.0 + 1e-9, "{w} sample {s} out of range");
            }
        }
    }

    #[test]
    fn test_sine_lookup() {
        let bank = WavetableBank::new(4096);
        assert!(bank.sample(Waveform::Sine, 0.0).abs() < 1e-9);
        // index = phase * (size - 1), so a quarter turn lands just short of the peak
        assert!((bank.sample(Waveform::Sine, 0.25) - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_square_levels() {
        let bank = WavetableBank::new(2048);
        assert!((bank.sample(Waveform::Square, 0.25) - 1.0).abs() < 1e-9);
        assert!((bank.sample(Waveform::Square, 0.75) + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_interpolation_between_points() {
        let bank = WavetableBank::new(2);
        let a = bank.table(Waveform::Saw)[0];
        let b = bank.table(Waveform::Saw)[1];
        let mid = bank.sample(Waveform::Saw, 0.5);
        assert!((mid - (a + b) / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_noise_is_deterministic() {
        let a = WavetableBank::new(64);
        let b = WavetableBank::new(64);
        assert_eq!(a.table(Waveform::Noise), b.table(Waveform::Noise));
    }

    #[test]
    fn test_minimum_size() {
        let bank = WavetableBank::new(0);
        assert_eq!(bank.size(), 2);
        assert!(bank.sample(Waveform::Sine, 1.0).is_finite());
    }
}
