//! RGB composite panel: three bands mapped to red, green and blue.
//!
//! The backend answers with the rendered composite directly, so the result
//! is published as a local image handle instead of a remote path.

use std::sync::{Arc, Mutex};

use tracing::info;

use super::ActionOutcome;
use crate::backend::Backend;
use crate::error::ApiError;
use crate::image::ImageRegistry;
use crate::notifications::Notifications;
use crate::protocol::{BandId, RgbRequest};
use crate::session::{Session, Visualization};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Channels {
    pub red: Option<BandId>,
    pub green: Option<BandId>,
    pub blue: Option<BandId>,
}

pub struct CompositePanel<B> {
    backend: Arc<B>,
    session: Session,
    notifications: Notifications,
    registry: ImageRegistry,
    channels: Mutex<Channels>,
}

impl<B: Backend> CompositePanel<B> {
    pub fn new(
        backend: Arc<B>,
        session: Session,
        notifications: Notifications,
        registry: ImageRegistry,
    ) -> Self {
        Self {
            backend,
            session,
            notifications,
            registry,
            channels: Mutex::new(Channels::default()),
        }
    }

    pub fn set_channels(&self, red: BandId, green: BandId, blue: BandId) {
        *self.channels.lock().unwrap() = Channels {
            red: Some(red),
            green: Some(green),
            blue: Some(blue),
        };
    }

    pub fn channels(&self) -> Channels {
        self.channels.lock().unwrap().clone()
    }

    pub async fn compose(&self) -> ActionOutcome {
        let Channels {
            red: Some(red),
            green: Some(green),
            blue: Some(blue),
        } = self.channels()
        else {
            self.notifications.failure(
                "compose rgb",
                &ApiError::Validation("select a band for each of red, green and blue".to_string()),
            );
            return ActionOutcome::Failed;
        };

        let ticket = self.session.begin_visualization();
        let request = RgbRequest { red, green, blue };
        let source = format!("rgb({}, {}, {})", request.red, request.green, request.blue);

        match self.backend.rgb_composite(&request).await {
            Ok(bytes) => {
                info!(target: "composite", %source, bytes = bytes.len(), "composite received");
                let handle = self.registry.acquire(bytes, source);
                let applied = self
                    .session
                    .publish_visualization(ticket, Visualization::composite(handle));
                ActionOutcome::from_publish(applied)
            }
            Err(e) => {
                self.notifications.failure("compose rgb", &e);
                ActionOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::backend::fake::{Call, FakeBackend};
    use crate::notifications::Category;
    use crate::session::{VisualizationKind, VisualizationRef};

    #[tokio::test]
    async fn composite_is_published_as_local_handle() {
        let backend = Arc::new(FakeBackend::new());
        let session = Session::new();
        let registry = ImageRegistry::new();
        let panel = CompositePanel::new(
            Arc::clone(&backend),
            session.clone(),
            Notifications::new(Duration::from_secs(5)),
            registry.clone(),
        );
        panel.set_channels("IMG_TIR1".into(), "IMG_WV".into(), "IMG_VIS".into());

        assert_eq!(panel.compose().await, ActionOutcome::Published);

        let v = session.visualization();
        assert_eq!(v.kind(), VisualizationKind::Composite);
        match v.reference() {
            VisualizationRef::Local(handle) => {
                assert_eq!(handle.source(), "rgb(IMG_TIR1, IMG_WV, IMG_VIS)");
                assert_eq!(handle.format_hint(), "png");
            }
            other => panic!("expected local handle, got {other:?}"),
        }
        assert_eq!(registry.live_count(), 1);
        assert_eq!(
            backend.calls(),
            [Call::Rgb(RgbRequest {
                red: "IMG_TIR1".into(),
                green: "IMG_WV".into(),
                blue: "IMG_VIS".into(),
            })]
        );
    }

    #[tokio::test]
    async fn missing_channel_is_rejected_without_request() {
        let backend = Arc::new(FakeBackend::new());
        let notes = Notifications::new(Duration::from_secs(5));
        let panel = CompositePanel::new(
            Arc::clone(&backend),
            Session::new(),
            notes.clone(),
            ImageRegistry::new(),
        );

        assert_eq!(panel.compose().await, ActionOutcome::Failed);
        assert!(backend.calls().is_empty());
        assert_eq!(notes.drain()[0].category, Category::Validation);
    }
}
