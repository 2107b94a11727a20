use {
    super::purchase_lifecycle::{ProcessResult, PurchaseLifecycle},
    crate::domain::{
        error::PipelineError,
        event::{BillingEvent, VerifiedPayload},
        id::{EventId, PaymentIntentId},
    },
    std::sync::Arc,
};

/// Classifies verified billing events and routes each to exactly one handler.
pub struct BillingDispatcher {
    lifecycle: Arc<PurchaseLifecycle>,
}

impl BillingDispatcher {
    pub fn new(lifecycle: Arc<PurchaseLifecycle>) -> Self {
        Self { lifecycle }
    }

    pub async fn dispatch(&self, payload: &VerifiedPayload) -> Result<ProcessResult, PipelineError> {
        let event = BillingEvent::parse(payload)?;
        self.route(event).await
    }

    pub async fn route(&self, event: BillingEvent) -> Result<ProcessResult, PipelineError> {
        let result = match event {
            BillingEvent::PaymentSucceeded {
                event_id,
                payment_intent,
            } => self.on_payment_succeeded(&event_id, &payment_intent).await,
            BillingEvent::PaymentFailed {
                event_id,
                payment_intent,
            } => self.on_payment_failed(&event_id, &payment_intent).await,
            BillingEvent::Unhandled {
                event_id,
                event_type,
            } => Ok(self.on_unhandled(&event_id, event_type)),
        };

        match result {
            Err(
                err @ (PipelineError::SessionNotFound(_)
                | PipelineError::SessionMetadataMissing { .. }),
            ) => {
                // Redelivery cannot repair a missing or malformed session.
                tracing::error!(error = %err, "unresolvable payment correlation, acknowledging");
                Ok(ProcessResult::Ignored {
                    reason: err.to_string(),
                })
            }
            other => other,
        }
    }

    async fn on_payment_succeeded(
        &self,
        event_id: &EventId,
        payment_intent: &PaymentIntentId,
    ) -> Result<ProcessResult, PipelineError> {
        self.lifecycle
            .on_payment_succeeded(event_id, payment_intent)
            .await
    }

    async fn on_payment_failed(
        &self,
        event_id: &EventId,
        payment_intent: &PaymentIntentId,
    ) -> Result<ProcessResult, PipelineError> {
        self.lifecycle
            .on_payment_failed(event_id, payment_intent)
            .await
    }

    fn on_unhandled(&self, event_id: &EventId, event_type: String) -> ProcessResult {
        tracing::info!(%event_id, %event_type, "unhandled billing event, acknowledged");
        ProcessResult::Unhandled(event_type)
    }
}
