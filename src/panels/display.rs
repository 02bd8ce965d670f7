//! Display panel: follows the shared visualization reference and keeps the
//! referenced image on screen.
//!
//! Remote paths are fetched concurrently; every fetch is tagged with the
//! generation of the reference that triggered it, and the state machine
//! drops results from superseded generations.

use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use futures_util::stream::FuturesUnordered;
use statig::prelude::*;
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

use crate::backend::Backend;
use crate::error::ApiResult;
use crate::image::{ImageHandle, ImageRegistry};
use crate::notifications::Notifications;
use crate::session::{Session, SessionChange, VisualizationRef};
use crate::state_machine::{DisplayEvent, DisplayMachine, DisplayView};

struct Fetched {
    generation: u64,
    path: String,
    result: ApiResult<ImageHandle>,
}

pub struct DisplayPanel<B> {
    backend: Arc<B>,
    session: Session,
    registry: ImageRegistry,
    notifications: Notifications,
    view: watch::Sender<DisplayView>,
}

impl<B: Backend> DisplayPanel<B> {
    pub fn new(
        backend: Arc<B>,
        session: Session,
        registry: ImageRegistry,
        notifications: Notifications,
    ) -> Self {
        let (view, _) = watch::channel(DisplayView::Empty);
        Self {
            backend,
            session,
            registry,
            notifications,
            view,
        }
    }

    /// Observe the rendered view.
    pub fn subscribe(&self) -> watch::Receiver<DisplayView> {
        self.view.subscribe()
    }

    /// Follow session changes until the task is aborted.
    pub async fn run(self) {
        let mut changes = self.session.subscribe();
        let mut machine =
            DisplayMachine::new(self.view.clone(), self.notifications.clone()).state_machine();
        let mut in_flight: FuturesUnordered<BoxFuture<'static, Fetched>> = FuturesUnordered::new();
        let mut generation = 0u64;
        let mut last = VisualizationRef::Empty;

        // Pick up whatever was published before we subscribed.
        let initial = self.session.visualization().reference().clone();
        if initial != last {
            generation += 1;
            last = initial.clone();
            if let Some(event) = self.start(initial, generation, &mut in_flight) {
                machine.handle(&event);
            }
        }

        loop {
            tokio::select! {
                change = changes.recv() => {
                    let reference = match change {
                        Ok(SessionChange::Visualization(v)) => v.reference().clone(),
                        Ok(SessionChange::SelectedBand(_)) => continue,
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(target: "display", missed, "fell behind session changes, resyncing");
                            self.session.visualization().reference().clone()
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    };
                    if reference == last {
                        continue;
                    }
                    generation += 1;
                    last = reference.clone();
                    if let Some(event) = self.start(reference, generation, &mut in_flight) {
                        machine.handle(&event);
                    }
                }
                Some(fetched) = in_flight.next(), if !in_flight.is_empty() => {
                    let event = match fetched.result {
                        Ok(image) => DisplayEvent::FetchSucceeded {
                            generation: fetched.generation,
                            image,
                        },
                        Err(error) => DisplayEvent::FetchFailed {
                            generation: fetched.generation,
                            path: fetched.path,
                            error,
                        },
                    };
                    machine.handle(&event);
                }
            }
        }
    }

    /// Translate a new reference into a machine event, issuing a fetch for
    /// remote paths.
    fn start(
        &self,
        reference: VisualizationRef,
        generation: u64,
        in_flight: &mut FuturesUnordered<BoxFuture<'static, Fetched>>,
    ) -> Option<DisplayEvent> {
        match reference {
            VisualizationRef::Empty => Some(DisplayEvent::Cleared),
            VisualizationRef::Local(image) => Some(DisplayEvent::Adopt { generation, image }),
            VisualizationRef::Remote(path) => {
                debug!(target: "display", generation, path = %path, "fetching image");
                in_flight.push(Box::pin(fetch(
                    Arc::clone(&self.backend),
                    self.registry.clone(),
                    path.clone(),
                    generation,
                )));
                Some(DisplayEvent::FetchStarted { generation, path })
            }
        }
    }
}

async fn fetch<B: Backend>(
    backend: Arc<B>,
    registry: ImageRegistry,
    path: String,
    generation: u64,
) -> Fetched {
    let result = backend
        .fetch_image(&path)
        .await
        .map(|bytes| registry.acquire(bytes, path.clone()));
    Fetched {
        generation,
        path,
        result,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::backend::fake::{Call, FakeBackend};
    use crate::error::ApiError;
    use crate::session::Visualization;

    struct Harness {
        backend: Arc<FakeBackend>,
        session: Session,
        registry: ImageRegistry,
        view: watch::Receiver<DisplayView>,
        task: tokio::task::JoinHandle<()>,
    }

    fn start(backend: FakeBackend) -> Harness {
        let backend = Arc::new(backend);
        let session = Session::new();
        let registry = ImageRegistry::new();
        let panel = DisplayPanel::new(
            Arc::clone(&backend),
            session.clone(),
            registry.clone(),
            Notifications::new(Duration::from_secs(5)),
        );
        let view = panel.subscribe();
        let task = tokio::spawn(panel.run());
        Harness {
            backend,
            session,
            registry,
            view,
            task,
        }
    }

    async fn settle(view: &mut watch::Receiver<DisplayView>) -> DisplayView {
        view.wait_for(|v| !matches!(v, DisplayView::Loading { .. } | DisplayView::Empty))
            .await
            .unwrap()
            .clone()
    }

    #[tokio::test(start_paused = true)]
    async fn latest_reference_wins_even_if_first_fetch_resolves_last() {
        let mut h = start(
            FakeBackend::new()
                .with_delay("image:/x", Duration::from_millis(500))
                .with_delay("image:/y", Duration::from_millis(50)),
        );
        tokio::task::yield_now().await;

        h.session.set_visualization(Visualization::band("/x"));
        h.session.set_visualization(Visualization::band("/y"));

        let shown = settle(&mut h.view).await;
        assert_eq!(shown.image().map(ImageHandle::source), Some("/y"));

        // Let the slow /x fetch land; it must not replace /y.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(
            h.view.borrow().image().map(ImageHandle::source),
            Some("/y")
        );
        assert_eq!(
            h.backend.calls(),
            [
                Call::FetchImage("/x".into()),
                Call::FetchImage("/y".into())
            ]
        );
        assert_eq!(h.registry.live_count(), 1);
        h.task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn latest_reference_wins_when_fetches_resolve_in_order() {
        let mut h = start(
            FakeBackend::new()
                .with_delay("image:/x", Duration::from_millis(10))
                .with_delay("image:/y", Duration::from_millis(300)),
        );
        tokio::task::yield_now().await;

        h.session.set_visualization(Visualization::band("/x"));
        h.session.set_visualization(Visualization::band("/y"));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(
            settle(&mut h.view).await.image().map(ImageHandle::source),
            Some("/y")
        );
        h.task.abort();
    }

    #[tokio::test]
    async fn local_handle_is_shown_without_fetch() {
        let mut h = start(FakeBackend::new());
        tokio::task::yield_now().await;

        let handle = h.registry.acquire(vec![0x89, b'P', b'N', b'G'], "rgb(a, b, c)");
        h.session
            .set_visualization(Visualization::composite(handle.clone()));

        assert_eq!(settle(&mut h.view).await.image(), Some(&handle));
        assert!(h.backend.calls().is_empty());
        h.task.abort();
    }

    #[tokio::test]
    async fn fetch_failure_shows_error_state() {
        let mut h = start(FakeBackend::new().failing(
            "image:/gone",
            ApiError::Backend {
                status: 404,
                detail: Some("File not found".into()),
            },
        ));
        tokio::task::yield_now().await;

        h.session.set_visualization(Visualization::manipulation("/gone"));

        match settle(&mut h.view).await {
            DisplayView::Failed {
                source, message, ..
            } => {
                assert_eq!(source, "/gone");
                assert_eq!(message, "File not found");
            }
            other => panic!("expected failure view, got {other:?}"),
        }
        h.task.abort();
    }

    #[tokio::test]
    async fn superseded_images_are_released() {
        let mut h = start(FakeBackend::new());
        tokio::task::yield_now().await;

        h.session.set_visualization(Visualization::band("/a"));
        h.view
            .wait_for(|v| v.image().map(ImageHandle::source) == Some("/a"))
            .await
            .unwrap();
        h.session.set_visualization(Visualization::band("/b"));
        h.view
            .wait_for(|v| v.image().map(ImageHandle::source) == Some("/b"))
            .await
            .unwrap();

        assert_eq!(h.registry.live_count(), 1);

        h.session.set_visualization(Visualization::none());
        h.view
            .wait_for(|v| *v == DisplayView::Empty)
            .await
            .unwrap();
        assert_eq!(h.registry.live_count(), 0);
        h.task.abort();
    }
}
