//! Modular Synth Engine Library
//!
//! Headless engine for a modular audio synthesizer: a registry of component
//! types, a validated control plane and a per-sample processing graph.

pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod modules;
pub mod persistence;
