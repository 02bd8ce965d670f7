//! View-model panels.
//!
//! Action panels (catalog, arithmetic, composite) run when the user asks and
//! write to the shared session. Reactive panels (display, statistics) run as
//! background tasks that follow session changes and publish a view through a
//! `watch` channel.

pub mod arithmetic;
pub mod catalog;
pub mod composite;
pub mod display;
pub mod statistics;

pub use arithmetic::{ArithmeticPanel, Operation, PipelineError, Step};
pub use catalog::{CatalogEntry, CatalogPanel};
pub use composite::CompositePanel;
pub use display::DisplayPanel;
pub use statistics::{StatisticsPanel, StatisticsView};

/// How a user action ended. Failures have already been reported as
/// notifications by the time the caller sees this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The result was written to the shared session.
    Published,
    /// The action succeeded but a newer action had been issued meanwhile, so
    /// its result was discarded.
    Superseded,
    /// The action failed or was rejected before any request was made.
    Failed,
}

impl ActionOutcome {
    pub fn from_publish(applied: bool) -> Self {
        if applied {
            ActionOutcome::Published
        } else {
            ActionOutcome::Superseded
        }
    }
}
