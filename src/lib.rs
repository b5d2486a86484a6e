//! Kontrol Bridge library
//!
//! Decides which track a Komplete Kontrol keyboard controls and keeps the
//! keyboard informed. The binary adds the simulated host REPL and port wiring.

pub mod bridge;
pub mod config;
pub mod diagnostics;
pub mod focus;
pub mod host;
pub mod midi;
pub mod navigation;
pub mod protocol;
pub mod surface;
pub mod transport;
