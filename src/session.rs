//! Shared session state observed by every panel.
//!
//! Holds the selected band and the active visualization. A [`Session`] is
//! created once by the explorer and handed to each panel at construction;
//! there is no global instance. Writes replace a whole field and are
//! broadcast to subscribers in order as [`SessionChange`] values.
//!
//! Writers that issue asynchronous requests take a [`Generation`] ticket
//! first and publish through [`Session::publish_visualization`], which drops
//! the write if a newer ticket has been issued in the meantime.

use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::image::ImageHandle;
use crate::protocol::BandId;

const CHANGE_CAPACITY: usize = 64;

/// Where the current visualization comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisualizationRef {
    Empty,
    /// Backend-relative path, fetched by the display panel.
    Remote(String),
    /// Image already held in memory.
    Local(ImageHandle),
}

/// Provenance tag of the current visualization, used for labelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisualizationKind {
    None,
    Band,
    Manipulation,
    Composite,
}

impl VisualizationKind {
    pub fn label(self) -> &'static str {
        match self {
            VisualizationKind::None => "none",
            VisualizationKind::Band => "band",
            VisualizationKind::Manipulation => "manipulation",
            VisualizationKind::Composite => "composite",
        }
    }
}

/// A visualization reference together with its kind.
///
/// Only constructible through the associated functions, which keeps
/// `kind == None` exactly when `reference == Empty`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Visualization {
    reference: VisualizationRef,
    kind: VisualizationKind,
}

impl Visualization {
    pub fn none() -> Self {
        Self {
            reference: VisualizationRef::Empty,
            kind: VisualizationKind::None,
        }
    }

    pub fn band(path: impl Into<String>) -> Self {
        Self {
            reference: VisualizationRef::Remote(path.into()),
            kind: VisualizationKind::Band,
        }
    }

    pub fn manipulation(path: impl Into<String>) -> Self {
        Self {
            reference: VisualizationRef::Remote(path.into()),
            kind: VisualizationKind::Manipulation,
        }
    }

    pub fn composite(handle: ImageHandle) -> Self {
        Self {
            reference: VisualizationRef::Local(handle),
            kind: VisualizationKind::Composite,
        }
    }

    pub fn reference(&self) -> &VisualizationRef {
        &self.reference
    }

    pub fn kind(&self) -> VisualizationKind {
        self.kind
    }

    pub fn is_none(&self) -> bool {
        self.kind == VisualizationKind::None
    }
}

impl Default for Visualization {
    fn default() -> Self {
        Self::none()
    }
}

/// Snapshot of the shared session fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub visualization: Visualization,
    pub selected_band: Option<BandId>,
}

/// A single field replacement, as seen by subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionChange {
    Visualization(Visualization),
    SelectedBand(BandId),
}

/// Ticket identifying one asynchronous visualization write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Generation(u64);

impl Generation {
    pub fn value(self) -> u64 {
        self.0
    }
}

struct Inner {
    state: SessionState,
    visualization_generation: u64,
}

/// Handle to the shared session. Cheap to clone.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Mutex<Inner>>,
    changes: broadcast::Sender<SessionChange>,
}

impl Session {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: SessionState::default(),
                visualization_generation: 0,
            })),
            changes,
        }
    }

    /// Receive every subsequent change, in write order.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionChange> {
        self.changes.subscribe()
    }

    pub fn snapshot(&self) -> SessionState {
        self.inner.lock().unwrap().state.clone()
    }

    pub fn visualization(&self) -> Visualization {
        self.inner.lock().unwrap().state.visualization.clone()
    }

    pub fn selected_band(&self) -> Option<BandId> {
        self.inner.lock().unwrap().state.selected_band.clone()
    }

    /// Record an explicit band selection. Re-selecting the current band is
    /// not a change and is not broadcast.
    pub fn set_selected_band(&self, band: BandId) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state.selected_band.as_ref() == Some(&band) {
            return;
        }
        inner.state.selected_band = Some(band.clone());
        debug!(target: "session", band = %band, "selected band changed");
        let _ = self.changes.send(SessionChange::SelectedBand(band));
    }

    /// Replace the visualization unconditionally. Outstanding tickets become
    /// stale.
    pub fn set_visualization(&self, visualization: Visualization) {
        let mut inner = self.inner.lock().unwrap();
        inner.visualization_generation += 1;
        self.apply_visualization(&mut inner, visualization);
    }

    /// Issue a ticket for a visualization write that will complete later.
    pub fn begin_visualization(&self) -> Generation {
        let mut inner = self.inner.lock().unwrap();
        inner.visualization_generation += 1;
        Generation(inner.visualization_generation)
    }

    /// Apply `visualization` if `ticket` is still the newest one issued.
    /// Returns whether the write was applied.
    pub fn publish_visualization(&self, ticket: Generation, visualization: Visualization) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if ticket.0 != inner.visualization_generation {
            info!(
                target: "session",
                ticket = ticket.0,
                latest = inner.visualization_generation,
                "discarding stale visualization result"
            );
            return false;
        }
        self.apply_visualization(&mut inner, visualization);
        true
    }

    fn apply_visualization(&self, inner: &mut Inner, visualization: Visualization) {
        if inner.state.visualization == visualization {
            return;
        }
        debug!(
            target: "session",
            kind = visualization.kind().label(),
            "visualization changed"
        );
        inner.state.visualization = visualization.clone();
        let _ = self.changes.send(SessionChange::Visualization(visualization));
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
