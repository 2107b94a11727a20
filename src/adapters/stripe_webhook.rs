use {
    crate::{
        AppState,
        adapters::{
            api_errors::ApiError,
            signature::{STRIPE_SIGNATURE_HEADER, StripeSignatureVerifier},
        },
        domain::{error::PipelineError, event::BillingEvent},
        services::dispatcher::BillingDispatcher,
    },
    axum::{Json, body::Bytes, extract::State, http::HeaderMap},
    std::sync::Arc,
    tracing::Instrument,
};

/// Everything the billing route needs. Only constructed when both the
/// webhook secret and the provider API key are configured.
pub struct BillingWebhook {
    verifier: StripeSignatureVerifier,
    dispatcher: BillingDispatcher,
}

impl BillingWebhook {
    pub fn new(verifier: StripeSignatureVerifier, dispatcher: BillingDispatcher) -> Self {
        Self {
            verifier,
            dispatcher,
        }
    }
}

#[tracing::instrument(
    name = "billing_webhook",
    skip_all,
    fields(event_id = tracing::field::Empty, event_type = tracing::field::Empty)
)]
pub async fn billing_webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let webhook: Arc<BillingWebhook> = state
        .billing
        .clone()
        .ok_or(PipelineError::NotConfigured("billing"))?;

    let sig = headers
        .get(STRIPE_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    // Verify against the exact bytes received; nothing is parsed before this.
    let payload = webhook.verifier.verify(&body, sig)?;
    let event = BillingEvent::parse(&payload)?;

    tracing::Span::current()
        .record("event_id", tracing::field::display(event.event_id()))
        .record("event_type", tracing::field::display(event.event_type()));

    // Run the transition on its own task: if the provider hangs up, the
    // writes still finish instead of stopping between two saves.
    let task = {
        let webhook = Arc::clone(&webhook);
        tokio::spawn(async move { webhook.dispatcher.route(event).await }.in_current_span())
    };
    let result = task
        .await
        .map_err(|e| PipelineError::Internal(format!("transition task failed: {e}")))??;

    tracing::info!(status = result.status(), "billing event processed");
    Ok(Json(serde_json::json!({
        "received": true,
        "status": result.status(),
    })))
}
