//! Chain routing and plugin-host bridging for a synth workstation.
//!
//! Two cooperating cores:
//! - [`chain`] / [`rack`] — per-chain routing state (node grid, MIDI
//!   bindings, audio port sets) and the mutation layer that keeps the
//!   external connection graph in sync after every change.
//! - [`host`] / [`translator`] / [`screens`] — the bridge to the external
//!   plugin host: pedalboard translation, line-protocol parsing, MIDI-CC
//!   mapping and controller-screen derivation.

pub mod chain;
pub mod cli;
pub mod config;
pub mod error;
pub mod host;
pub mod rack;
pub mod screens;
pub mod translator;
