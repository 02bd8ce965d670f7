//! Band arithmetic panel: ratio or difference of two bands.
//!
//! A computation is a fixed sequence of fallible steps:
//!
//! ```text
//! convert first -> convert second -> re-check catalog -> dispatch -> extract path
//! ```
//!
//! Each step runs only after the previous one succeeded. The first failure
//! ends the sequence and nothing is written to the session. Conversions the
//! backend already performed are not undone.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::ActionOutcome;
use crate::backend::Backend;
use crate::error::{ApiError, ApiResult};
use crate::notifications::Notifications;
use crate::protocol::{BandId, DifferenceRequest, RatioRequest};
use crate::session::{Session, Visualization};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Operation {
    #[default]
    Ratio,
    Difference,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Ratio => "ratio",
            Operation::Difference => "difference",
        })
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ratio" => Ok(Operation::Ratio),
            "difference" | "diff" => Ok(Operation::Difference),
            other => Err(format!("unknown operation `{other}` (expected ratio or difference)")),
        }
    }
}

/// The steps of a computation, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    ConvertFirst,
    ConvertSecond,
    VerifyCatalog,
    Dispatch,
    ExtractPath,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Step::ConvertFirst => "converting first band",
            Step::ConvertSecond => "converting second band",
            Step::VerifyCatalog => "checking band catalog",
            Step::Dispatch => "computing",
            Step::ExtractPath => "reading result",
        })
    }
}

/// A computation that stopped at `step`.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{step} failed: {source}")]
pub struct PipelineError {
    pub step: Step,
    #[source]
    pub source: ApiError,
}

trait AtStep<T> {
    fn at(self, step: Step) -> Result<T, PipelineError>;
}

impl<T> AtStep<T> for ApiResult<T> {
    fn at(self, step: Step) -> Result<T, PipelineError> {
        self.map_err(|source| PipelineError { step, source })
    }
}

/// The user's current choices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArithmeticForm {
    pub operation: Operation,
    pub first: Option<BandId>,
    pub second: Option<BandId>,
}

pub struct ArithmeticPanel<B> {
    backend: Arc<B>,
    session: Session,
    notifications: Notifications,
    form: Mutex<ArithmeticForm>,
}

impl<B: Backend> ArithmeticPanel<B> {
    pub fn new(backend: Arc<B>, session: Session, notifications: Notifications) -> Self {
        Self {
            backend,
            session,
            notifications,
            form: Mutex::new(ArithmeticForm::default()),
        }
    }

    pub fn form(&self) -> ArithmeticForm {
        self.form.lock().unwrap().clone()
    }

    pub fn set_operation(&self, operation: Operation) {
        self.form.lock().unwrap().operation = operation;
    }

    /// First operand: numerator for ratio, minuend for difference.
    pub fn set_first(&self, band: BandId) {
        self.form.lock().unwrap().first = Some(band);
    }

    pub fn set_second(&self, band: BandId) {
        self.form.lock().unwrap().second = Some(band);
    }

    /// Run the computation described by the current form.
    pub async fn compute(&self) -> ActionOutcome {
        let form = self.form();
        let action = format!("compute {}", form.operation);

        let (Some(first), Some(second)) = (form.first, form.second) else {
            self.notifications.failure(
                &action,
                &ApiError::Validation("select both bands before computing".to_string()),
            );
            return ActionOutcome::Failed;
        };

        let ticket = self.session.begin_visualization();
        info!(
            target: "arithmetic",
            operation = %form.operation,
            first = %first,
            second = %second,
            ticket = ticket.value(),
            "starting computation"
        );

        match self.run_steps(form.operation, &first, &second).await {
            Ok(path) => {
                let applied = self
                    .session
                    .publish_visualization(ticket, Visualization::manipulation(path));
                if applied {
                    self.notifications.success(format!(
                        "{} of {} and {} computed",
                        form.operation, first, second
                    ));
                }
                ActionOutcome::from_publish(applied)
            }
            Err(e) => {
                warn!(target: "arithmetic", step = %e.step, "computation aborted: {}", e.source);
                self.notifications
                    .failure(&format!("{action} ({})", e.step), &e.source);
                ActionOutcome::Failed
            }
        }
    }

    async fn run_steps(
        &self,
        operation: Operation,
        first: &BandId,
        second: &BandId,
    ) -> Result<String, PipelineError> {
        self.backend.convert_band(first).await.at(Step::ConvertFirst)?;
        self.backend
            .convert_band(second)
            .await
            .at(Step::ConvertSecond)?;

        // The catalog lists source bands, not converted artifacts, so the
        // answer is only logged.
        let catalog = self.backend.list_bands().await.at(Step::VerifyCatalog)?;
        debug!(
            target: "arithmetic",
            first_listed = catalog.contains_key(first),
            second_listed = catalog.contains_key(second),
            "catalog re-check"
        );

        let result = match operation {
            Operation::Ratio => {
                self.backend
                    .ratio(&RatioRequest {
                        numerator: first.clone(),
                        denominator: second.clone(),
                    })
                    .await
            }
            Operation::Difference => {
                self.backend
                    .difference(&DifferenceRequest {
                        band1: first.clone(),
                        band2: second.clone(),
                    })
                    .await
            }
        }
        .at(Step::Dispatch)?;

        let path = result.visualization.trim();
        if path.is_empty() {
            return Err(ApiError::Payload("result has an empty visualization path".to_string()))
                .at(Step::ExtractPath);
        }
        Ok(path.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::backend::fake::{Call, FakeBackend};
    use crate::notifications::{Category, Severity};

    const RESULT: &str = "/api/files/manipulations/ratio_A_B_vis.png";

    fn panel(backend: FakeBackend) -> (ArithmeticPanel<FakeBackend>, Arc<FakeBackend>, Session, Notifications) {
        let backend = Arc::new(backend);
        let session = Session::new();
        let notes = Notifications::new(Duration::from_secs(5));
        (
            ArithmeticPanel::new(Arc::clone(&backend), session.clone(), notes.clone()),
            backend,
            session,
            notes,
        )
    }

    #[tokio::test]
    async fn ratio_runs_steps_in_order() {
        let (panel, backend, session, _) = panel(FakeBackend::new().with_manipulation(RESULT));
        panel.set_operation(Operation::Ratio);
        panel.set_first("A".into());
        panel.set_second("B".into());

        assert_eq!(panel.compute().await, ActionOutcome::Published);

        assert_eq!(
            backend.calls(),
            [
                Call::Convert("A".into()),
                Call::Convert("B".into()),
                Call::ListBands,
                Call::Ratio(RatioRequest {
                    numerator: "A".into(),
                    denominator: "B".into(),
                }),
            ]
        );
        assert_eq!(session.visualization(), Visualization::manipulation(RESULT));
    }

    #[tokio::test]
    async fn difference_sends_band1_band2() {
        let (panel, backend, session, _) = panel(FakeBackend::new().with_manipulation("/d.png"));
        panel.set_operation("diff".parse().unwrap());
        panel.set_first("IMG_TIR1".into());
        panel.set_second("IMG_TIR2".into());

        assert_eq!(panel.compute().await, ActionOutcome::Published);
        assert_eq!(
            backend.calls().last(),
            Some(&Call::Difference(DifferenceRequest {
                band1: "IMG_TIR1".into(),
                band2: "IMG_TIR2".into(),
            }))
        );
        assert_eq!(session.visualization(), Visualization::manipulation("/d.png"));
    }

    #[tokio::test]
    async fn missing_operand_makes_no_calls() {
        let (panel, backend, session, notes) = panel(FakeBackend::new());
        panel.set_first("A".into());

        assert_eq!(panel.compute().await, ActionOutcome::Failed);

        assert!(backend.calls().is_empty());
        assert!(session.visualization().is_none());
        let pending = notes.drain();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].category, Category::Validation);
        assert_eq!(pending[0].severity, Severity::Warning);
    }

    #[tokio::test]
    async fn failure_in_second_conversion_stops_sequence() {
        let (panel, backend, session, notes) = panel(
            FakeBackend::new()
                .with_manipulation(RESULT)
                .failing("convert:B", ApiError::Transport("timed out".into())),
        );
        panel.set_first("A".into());
        panel.set_second("B".into());
        session.set_visualization(Visualization::band("/api/visualize/A"));

        assert_eq!(panel.compute().await, ActionOutcome::Failed);

        assert_eq!(
            backend.calls(),
            [Call::Convert("A".into()), Call::Convert("B".into())]
        );
        assert_eq!(session.visualization(), Visualization::band("/api/visualize/A"));
        let pending = notes.drain();
        assert_eq!(pending[0].category, Category::Transport);
        assert!(pending[0].detail.contains("converting second band"));
    }

    #[tokio::test]
    async fn backend_rejection_surfaces_detail() {
        // No manipulation path configured: the fake answers 404 "Result not found".
        let (panel, _, session, notes) = panel(FakeBackend::new());
        panel.set_first("A".into());
        panel.set_second("B".into());

        assert_eq!(panel.compute().await, ActionOutcome::Failed);
        assert!(session.visualization().is_none());
        let pending = notes.drain();
        assert_eq!(pending[0].category, Category::Backend);
        assert!(pending[0].detail.ends_with("Result not found"));
    }

    #[tokio::test]
    async fn empty_result_path_is_payload_failure() {
        let (panel, _, session, notes) = panel(FakeBackend::new().with_manipulation("  "));
        panel.set_first("A".into());
        panel.set_second("B".into());

        assert_eq!(panel.compute().await, ActionOutcome::Failed);
        assert!(session.visualization().is_none());
        assert_eq!(notes.drain()[0].category, Category::Payload);
    }

    #[test]
    fn parses_operation_names() {
        assert_eq!("Ratio".parse::<Operation>(), Ok(Operation::Ratio));
        assert_eq!("difference".parse::<Operation>(), Ok(Operation::Difference));
        assert!("sum".parse::<Operation>().is_err());
    }
}
