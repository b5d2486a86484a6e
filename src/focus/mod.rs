//! Focus engine: which track the keyboard controls
//!
//! The engine is split the way data flows through it:
//!
//! * [`scanner`] - finds the instrument on a device tree
//! * [`resolver`] - picks the focused track from a song snapshot
//! * [`watch`] - per-track listener handles and arm-state normalisation
//! * [`scheduler`] - single-slot debounced activation
//! * [`coordinator`] - ties the above together and emits status updates

pub mod coordinator;
pub mod resolver;
pub mod scanner;
pub mod scheduler;
pub mod watch;

pub use coordinator::FocusCoordinator;
pub use resolver::{resolve, Focus};
pub use scanner::InstrumentScanner;
pub use scheduler::{ActivationScheduler, ActivationTicket, PendingActivation};
pub use watch::{ArmState, TrackWatch, WatchEvent};

#[cfg(test)]
mod tests;
