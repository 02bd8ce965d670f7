//! Display panel state machine.
//!
//! Hierarchy:
//! ```text
//! Tracking (superstate: new reference / adopt / clear)
//!     ├── Empty
//!     ├── Loading { generation }
//!     ├── Displaying { image_id }
//!     └── Error { generation }
//! ```
//!
//! Every fetch carries the generation it was issued under. Results are only
//! accepted in `Loading` with a matching generation; anything else is stale
//! and its image handle is dropped on the spot.

use statig::prelude::*;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::ApiError;
use crate::image::ImageHandle;
use crate::notifications::Notifications;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Events dispatched to the display state machine.
#[derive(Debug, Clone)]
pub enum DisplayEvent {
    /// The shared reference became empty.
    Cleared,
    /// A remote path was published and a fetch for it was issued.
    FetchStarted { generation: u64, path: String },
    /// A local handle was published; no fetch needed.
    Adopt { generation: u64, image: ImageHandle },
    /// A fetch completed.
    FetchSucceeded { generation: u64, image: ImageHandle },
    /// A fetch failed.
    FetchFailed {
        generation: u64,
        path: String,
        error: ApiError,
    },
}

// ---------------------------------------------------------------------------
// Rendered view
// ---------------------------------------------------------------------------

/// What the display panel currently shows.
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayView {
    /// Nothing selected yet: prompt the user.
    Empty,
    Loading { source: String },
    Displaying { image: ImageHandle },
    /// The last fetch failed. The previously displayed image, if any, stays
    /// on screen.
    Failed {
        source: String,
        message: String,
        previous: Option<ImageHandle>,
    },
}

impl DisplayView {
    /// Text lines for a terminal front-end.
    pub fn lines(&self) -> Vec<String> {
        match self {
            DisplayView::Empty => vec!["Select a band or run a computation to see an image.".into()],
            DisplayView::Loading { source } => vec![format!("Loading {source} ...")],
            DisplayView::Displaying { image } => vec![describe(image)],
            DisplayView::Failed {
                source,
                message,
                previous,
            } => {
                let mut lines = vec![format!("Failed to load {source}: {message}")];
                if let Some(image) = previous {
                    lines.push(format!("still showing {}", describe(image)));
                }
                lines
            }
        }
    }

    /// The image on screen, if any.
    pub fn image(&self) -> Option<&ImageHandle> {
        match self {
            DisplayView::Displaying { image } => Some(image),
            DisplayView::Failed { previous, .. } => previous.as_ref(),
            _ => None,
        }
    }
}

fn describe(image: &ImageHandle) -> String {
    format!(
        "{} [{}, {} bytes, handle #{}]",
        image.source(),
        image.format_hint(),
        image.len(),
        image.id()
    )
}

// ---------------------------------------------------------------------------
// Shared storage
// ---------------------------------------------------------------------------

/// Shared storage for the display state machine.
///
/// `current` is the one handle the panel owns. It is replaced (and the old
/// handle released) whenever a newer image is adopted, and cleared when the
/// reference is emptied.
pub struct DisplayMachine {
    current: Option<ImageHandle>,
    view: watch::Sender<DisplayView>,
    notifications: Notifications,
}

impl DisplayMachine {
    pub fn new(view: watch::Sender<DisplayView>, notifications: Notifications) -> Self {
        Self {
            current: None,
            view,
            notifications,
        }
    }

    fn show(&self, view: DisplayView) {
        self.view.send_replace(view);
    }

    fn adopt(&mut self, image: ImageHandle) {
        let previous = self.current.replace(image.clone());
        self.show(DisplayView::Displaying { image });
        if let Some(previous) = previous {
            debug!(target: "display", id = previous.id(), "releasing superseded image");
        }
    }

    fn release(&mut self) {
        if let Some(previous) = self.current.take() {
            debug!(target: "display", id = previous.id(), "releasing image");
        }
    }
}

// ---------------------------------------------------------------------------
// State machine implementation
// ---------------------------------------------------------------------------

#[state_machine(
    initial = "State::empty()",
    state(derive(Debug, Clone, PartialEq))
)]
impl DisplayMachine {
    /// Any new reference restarts the machine, whatever the current state.
    #[superstate]
    fn tracking(&mut self, event: &DisplayEvent) -> Outcome<State> {
        match event {
            DisplayEvent::Cleared => {
                self.show(DisplayView::Empty);
                self.release();
                Transition(State::empty())
            }
            DisplayEvent::FetchStarted { generation, path } => {
                self.show(DisplayView::Loading {
                    source: path.clone(),
                });
                Transition(State::loading(*generation))
            }
            DisplayEvent::Adopt { image, .. } => {
                self.adopt(image.clone());
                Transition(State::displaying(image.id()))
            }
            DisplayEvent::FetchSucceeded { generation, .. }
            | DisplayEvent::FetchFailed { generation, .. } => {
                debug!(target: "display", generation, "ignoring stale fetch result");
                Handled
            }
        }
    }

    /// Nothing to show.
    #[state(superstate = "tracking")]
    fn empty(&mut self, event: &DisplayEvent) -> Outcome<State> {
        let _ = event;
        Super
    }

    /// Waiting for the fetch issued under `generation`.
    #[state(superstate = "tracking")]
    fn loading(&mut self, event: &DisplayEvent, generation: &u64) -> Outcome<State> {
        match event {
            DisplayEvent::FetchSucceeded {
                generation: g,
                image,
            } if g == generation => {
                info!(target: "display", source = image.source(), bytes = image.len(), "image loaded");
                self.adopt(image.clone());
                Transition(State::displaying(image.id()))
            }
            DisplayEvent::FetchFailed {
                generation: g,
                path,
                error,
            } if g == generation => {
                self.notifications
                    .failure(&format!("load image {path}"), error);
                let previous = self.current.clone();
                self.show(DisplayView::Failed {
                    source: path.clone(),
                    message: error.detail(),
                    previous: previous.clone(),
                });
                match previous {
                    Some(image) => Transition(State::displaying(image.id())),
                    None => Transition(State::error(*generation)),
                }
            }
            _ => Super,
        }
    }

    /// Showing the image with handle `image_id`.
    #[state(superstate = "tracking")]
    fn displaying(&mut self, event: &DisplayEvent, image_id: &u64) -> Outcome<State> {
        let _ = image_id;
        let _ = event;
        Super
    }

    /// The fetch issued under `generation` failed.
    #[state(superstate = "tracking")]
    fn error(&mut self, event: &DisplayEvent, generation: &u64) -> Outcome<State> {
        let _ = generation;
        let _ = event;
        Super
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
