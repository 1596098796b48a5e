use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::flows::states::{DocumentRequest, Effect, NotificationRequest};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EffectError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
    #[error("document rendering failed: {0}")]
    Render(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &NotificationRequest) -> Result<(), EffectError>;
}

#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    async fn render(&self, document: &DocumentRequest) -> Result<Vec<u8>, EffectError>;
}

/// Runs transition effects as detached tasks. Failures are logged and never surface to
/// the actor.
#[derive(Clone, Default)]
pub struct EffectDispatcher {
    notifier: Option<Arc<dyn Notifier>>,
    renderer: Option<Arc<dyn DocumentRenderer>>,
}

impl EffectDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, renderer: Arc<dyn DocumentRenderer>) -> Self {
        Self { notifier: Some(notifier), renderer: Some(renderer) }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn DocumentRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn has_notifier(&self) -> bool {
        self.notifier.is_some()
    }

    pub fn has_renderer(&self) -> bool {
        self.renderer.is_some()
    }

    /// Spawns one task per effect. The handles are returned for callers that want to
    /// wait; dropping them leaves the tasks running.
    pub fn dispatch(&self, effects: Vec<Effect>, correlation_id: &str) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(effects.len());
        for effect in effects {
            let correlation_id = correlation_id.to_owned();
            match effect {
                Effect::Notify(notification) => {
                    let Some(notifier) = self.notifier.clone() else {
                        debug!(
                            event_name = "effects.notify.skipped",
                            request_id = %notification.request_id,
                            correlation_id = %correlation_id,
                            "no notifier configured"
                        );
                        continue;
                    };
                    handles.push(tokio::spawn(async move {
                        if let Err(error) = notifier.notify(&notification).await {
                            warn!(
                                event_name = "effects.notify.failed",
                                request_id = %notification.request_id,
                                correlation_id = %correlation_id,
                                error = %error,
                                "requester notification failed; transition kept"
                            );
                        }
                    }));
                }
                Effect::RenderDocument(document) => {
                    let Some(renderer) = self.renderer.clone() else {
                        debug!(
                            event_name = "effects.render.skipped",
                            request_id = %document.request.id,
                            correlation_id = %correlation_id,
                            "no document renderer configured"
                        );
                        continue;
                    };
                    handles.push(tokio::spawn(async move {
                        match renderer.render(&document).await {
                            Ok(bytes) => debug!(
                                event_name = "effects.render.completed",
                                request_id = %document.request.id,
                                correlation_id = %correlation_id,
                                bytes = bytes.len(),
                                "supporting document regenerated"
                            ),
                            Err(error) => warn!(
                                event_name = "effects.render.failed",
                                request_id = %document.request.id,
                                correlation_id = %correlation_id,
                                error = %error,
                                "document regeneration failed; transition kept"
                            ),
                        }
                    }));
                }
            }
        }
        handles
    }
}

/// Records notifications; can be told to fail every delivery.
#[derive(Clone, Default)]
pub struct InMemoryNotifier {
    sent: Arc<Mutex<Vec<NotificationRequest>>>,
    fail: bool,
}

impl InMemoryNotifier {
    pub fn failing() -> Self {
        Self { sent: Arc::default(), fail: true }
    }

    pub fn sent(&self) -> Vec<NotificationRequest> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn notify(&self, notification: &NotificationRequest) -> Result<(), EffectError> {
        if self.fail {
            return Err(EffectError::Delivery("notifier unavailable".to_owned()));
        }
        match self.sent.lock() {
            Ok(mut sent) => sent.push(notification.clone()),
            Err(poisoned) => poisoned.into_inner().push(notification.clone()),
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct RecordingDocumentRenderer {
    rendered: Arc<Mutex<Vec<DocumentRequest>>>,
}

impl RecordingDocumentRenderer {
    pub fn rendered(&self) -> Vec<DocumentRequest> {
        match self.rendered.lock() {
            Ok(rendered) => rendered.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl DocumentRenderer for RecordingDocumentRenderer {
    async fn render(&self, document: &DocumentRequest) -> Result<Vec<u8>, EffectError> {
        let bytes = serde_json::to_vec(&document.signatures)
            .map_err(|error| EffectError::Render(error.to_string()))?;
        match self.rendered.lock() {
            Ok(mut rendered) => rendered.push(document.clone()),
            Err(poisoned) => poisoned.into_inner().push(document.clone()),
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{EffectDispatcher, InMemoryNotifier, RecordingDocumentRenderer};
    use crate::domain::request::{RequestStatus, RequestType};
    use crate::flows::states::{DocumentRequest, Effect, NotificationRequest};
    use crate::test_support::{base_time, request};

    fn effects() -> Vec<Effect> {
        let pending = request("REQ-1", "E-1", RequestType::Dental, RequestStatus::PendingHr);
        vec![
            Effect::Notify(NotificationRequest {
                request_id: pending.id.clone(),
                contact: "line:E-1".to_owned(),
                request_type: pending.request_type,
                status: pending.status,
                amount: pending.amount,
                requester_name: pending.requester.name.clone(),
                occurred_at: base_time(),
            }),
            Effect::RenderDocument(DocumentRequest {
                signatures: pending.signatures(),
                request: pending,
            }),
        ]
    }

    #[tokio::test]
    async fn dispatch_runs_every_effect() {
        let notifier = InMemoryNotifier::default();
        let renderer = RecordingDocumentRenderer::default();
        let dispatcher =
            EffectDispatcher::new(Arc::new(notifier.clone()), Arc::new(renderer.clone()));

        for handle in dispatcher.dispatch(effects(), "corr-1") {
            handle.await.expect("effect task");
        }

        assert_eq!(notifier.sent().len(), 1);
        assert_eq!(renderer.rendered().len(), 1);
    }

    #[tokio::test]
    async fn failures_are_swallowed() {
        let dispatcher =
            EffectDispatcher::default().with_notifier(Arc::new(InMemoryNotifier::failing()));

        let handles = dispatcher.dispatch(effects(), "corr-2");
        assert_eq!(handles.len(), 1, "render skipped without a renderer");
        for handle in handles {
            handle.await.expect("failed delivery must not panic the task");
        }
    }
}
