//! Statistics panel: summary statistics of the selected band.
//!
//! Every selection change issues a request. Responses are tagged with the
//! selection they answer, and only the answer for the latest selection is
//! shown.

use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use futures_util::stream::FuturesUnordered;
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

use crate::backend::Backend;
use crate::error::ApiResult;
use crate::notifications::Notifications;
use crate::protocol::{BandId, BandStatistics};
use crate::session::{Session, SessionChange};

#[derive(Debug, Clone, PartialEq)]
pub enum StatisticsView {
    /// No band selected yet.
    Prompt,
    Loading { band: BandId },
    Ready { band: BandId, stats: BandStatistics },
    Error { band: BandId, message: String },
}

impl StatisticsView {
    pub fn lines(&self) -> Vec<String> {
        match self {
            StatisticsView::Prompt => vec!["Select a band to view statistics.".into()],
            StatisticsView::Loading { band } => vec![format!("Loading statistics for {band} ...")],
            StatisticsView::Ready { band, stats } => vec![
                format!("Statistics for {band}"),
                format!("  Minimum: {:.2}", stats.minimum),
                format!("  Maximum: {:.2}", stats.maximum),
                format!("  Mean:    {:.2}", stats.mean),
                format!("  Std:     {:.2}", stats.std),
            ],
            StatisticsView::Error { band, message } => {
                vec![format!("Statistics for {band} unavailable: {message}")]
            }
        }
    }

    /// True once the view no longer waits on a request.
    pub fn is_settled(&self) -> bool {
        !matches!(self, StatisticsView::Loading { .. })
    }
}

struct Answer {
    generation: u64,
    band: BandId,
    result: ApiResult<BandStatistics>,
}

pub struct StatisticsPanel<B> {
    backend: Arc<B>,
    session: Session,
    notifications: Notifications,
    view: watch::Sender<StatisticsView>,
}

impl<B: Backend> StatisticsPanel<B> {
    pub fn new(backend: Arc<B>, session: Session, notifications: Notifications) -> Self {
        let (view, _) = watch::channel(StatisticsView::Prompt);
        Self {
            backend,
            session,
            notifications,
            view,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<StatisticsView> {
        self.view.subscribe()
    }

    /// Follow selection changes until the task is aborted.
    pub async fn run(self) {
        let mut changes = self.session.subscribe();
        let mut in_flight: FuturesUnordered<BoxFuture<'static, Answer>> = FuturesUnordered::new();
        let mut generation = 0u64;

        if let Some(band) = self.session.selected_band() {
            generation += 1;
            self.request(band, generation, &mut in_flight);
        }

        loop {
            tokio::select! {
                change = changes.recv() => {
                    let band = match change {
                        Ok(SessionChange::SelectedBand(band)) => band,
                        Ok(SessionChange::Visualization(_)) => continue,
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(target: "statistics", missed, "fell behind session changes, resyncing");
                            match self.session.selected_band() {
                                Some(band) => band,
                                None => continue,
                            }
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    };
                    generation += 1;
                    self.request(band, generation, &mut in_flight);
                }
                Some(answer) = in_flight.next(), if !in_flight.is_empty() => {
                    if answer.generation != generation {
                        debug!(target: "statistics", band = %answer.band, "dropping stale statistics");
                        continue;
                    }
                    let view = match answer.result {
                        Ok(stats) => StatisticsView::Ready { band: answer.band, stats },
                        Err(e) => {
                            self.notifications
                                .failure(&format!("load statistics for {}", answer.band), &e);
                            StatisticsView::Error { band: answer.band, message: e.detail() }
                        }
                    };
                    self.view.send_replace(view);
                }
            }
        }
    }

    fn request(
        &self,
        band: BandId,
        generation: u64,
        in_flight: &mut FuturesUnordered<BoxFuture<'static, Answer>>,
    ) {
        debug!(target: "statistics", band = %band, generation, "requesting statistics");
        self.view.send_replace(StatisticsView::Loading { band: band.clone() });
        let backend = Arc::clone(&self.backend);
        in_flight.push(Box::pin(async move {
            let result = backend.statistics(&band).await;
            Answer {
                generation,
                band,
                result,
            }
        }));
    }
}
