//! The explorer layout: one session shared by every panel.
//!
//! Action panels are called directly. Reactive panels (display, statistics)
//! run as tokio tasks owned by the explorer and are aborted when it drops.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::backend::Backend;
use crate::image::ImageRegistry;
use crate::notifications::Notifications;
use crate::panels::{
    ArithmeticPanel, CatalogPanel, CompositePanel, DisplayPanel, StatisticsPanel, StatisticsView,
};
use crate::session::{Session, VisualizationRef};
use crate::state_machine::DisplayView;

pub struct Explorer<B> {
    session: Session,
    notifications: Notifications,
    registry: ImageRegistry,
    catalog: CatalogPanel<B>,
    arithmetic: ArithmeticPanel<B>,
    composite: CompositePanel<B>,
    display: watch::Receiver<DisplayView>,
    statistics: watch::Receiver<StatisticsView>,
    tasks: Vec<JoinHandle<()>>,
}

impl<B: Backend> Explorer<B> {
    /// Build every panel around a fresh session and spawn the reactive ones.
    /// Must be called from within a tokio runtime.
    pub fn start(backend: B, notification_ttl: Duration) -> Self {
        let backend = Arc::new(backend);
        let session = Session::new();
        let notifications = Notifications::new(notification_ttl);
        let registry = ImageRegistry::new();

        let display_panel = DisplayPanel::new(
            Arc::clone(&backend),
            session.clone(),
            registry.clone(),
            notifications.clone(),
        );
        let statistics_panel =
            StatisticsPanel::new(Arc::clone(&backend), session.clone(), notifications.clone());
        let display = display_panel.subscribe();
        let statistics = statistics_panel.subscribe();
        let tasks = vec![
            tokio::spawn(display_panel.run()),
            tokio::spawn(statistics_panel.run()),
        ];

        Self {
            catalog: CatalogPanel::new(Arc::clone(&backend), session.clone(), notifications.clone()),
            arithmetic: ArithmeticPanel::new(
                Arc::clone(&backend),
                session.clone(),
                notifications.clone(),
            ),
            composite: CompositePanel::new(
                backend,
                session.clone(),
                notifications.clone(),
                registry.clone(),
            ),
            session,
            notifications,
            registry,
            display,
            statistics,
            tasks,
        }
    }

    /// Load the band catalog. Called once after start.
    pub async fn mount(&self) -> bool {
        let loaded = self.catalog.load_catalog().await;
        info!(target: "explorer", loaded, bands = self.catalog.bands().len(), "explorer mounted");
        loaded
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn notifications(&self) -> &Notifications {
        &self.notifications
    }

    pub fn registry(&self) -> &ImageRegistry {
        &self.registry
    }

    pub fn catalog(&self) -> &CatalogPanel<B> {
        &self.catalog
    }

    pub fn arithmetic(&self) -> &ArithmeticPanel<B> {
        &self.arithmetic
    }

    pub fn composite(&self) -> &CompositePanel<B> {
        &self.composite
    }

    pub fn display_view(&self) -> DisplayView {
        self.display.borrow().clone()
    }

    pub fn statistics_view(&self) -> StatisticsView {
        self.statistics.borrow().clone()
    }

    /// Wait until the display shows (or failed to show) the current shared
    /// reference. Returns the view as it is at the deadline otherwise.
    pub async fn settle_display(&self, timeout: Duration) -> DisplayView {
        let target = self.session.visualization().reference().clone();
        let mut view = self.display.clone();
        match tokio::time::timeout(timeout, view.wait_for(|v| shows(v, &target))).await {
            Ok(Ok(settled)) => settled.clone(),
            Ok(Err(_)) | Err(_) => {
                warn!(target: "explorer", "display did not settle in time");
                self.display_view()
            }
        }
    }

    /// Wait until the statistics panel answered for the selected band.
    pub async fn settle_statistics(&self, timeout: Duration) -> StatisticsView {
        let selected = self.session.selected_band();
        let mut view = self.statistics.clone();
        let answered = |v: &StatisticsView| match (v, &selected) {
            (StatisticsView::Prompt, None) => true,
            (StatisticsView::Ready { band, .. } | StatisticsView::Error { band, .. }, Some(s)) => {
                band == s
            }
            _ => false,
        };
        match tokio::time::timeout(timeout, view.wait_for(answered)).await {
            Ok(Ok(settled)) => settled.clone(),
            Ok(Err(_)) | Err(_) => {
                warn!(target: "explorer", "statistics did not settle in time");
                self.statistics_view()
            }
        }
    }
}

impl<B> Drop for Explorer<B> {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Whether `view` is the final rendering of `reference`.
fn shows(view: &DisplayView, reference: &VisualizationRef) -> bool {
    match (reference, view) {
        (VisualizationRef::Empty, DisplayView::Empty) => true,
        (VisualizationRef::Remote(path), DisplayView::Displaying { image }) => image.source() == path,
        (VisualizationRef::Remote(path), DisplayView::Failed { source, .. }) => source == path,
        (VisualizationRef::Local(handle), DisplayView::Displaying { image }) => image == handle,
        _ => false,
    }
}
