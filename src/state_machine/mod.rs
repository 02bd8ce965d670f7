//! App-level state machines.

pub mod display_sm;

pub use display_sm::{DisplayEvent, DisplayMachine, DisplayView};
