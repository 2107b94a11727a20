use {
    crate::{
        AppState,
        adapters::{
            api_errors::ApiError,
            signature::{
                SVIX_ID_HEADER, SVIX_SIGNATURE_HEADER, SVIX_TIMESTAMP_HEADER, SvixHeaders,
                SvixSignatureVerifier,
            },
        },
        domain::error::PipelineError,
        services::identity_sync::IdentitySync,
    },
    axum::{Json, body::Bytes, extract::State, http::HeaderMap},
    std::sync::Arc,
    tracing::Instrument,
};

pub struct IdentityWebhook {
    verifier: SvixSignatureVerifier,
    sync: IdentitySync,
}

impl IdentityWebhook {
    pub fn new(verifier: SvixSignatureVerifier, sync: IdentitySync) -> Self {
        Self { verifier, sync }
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[tracing::instrument(
    name = "identity_webhook",
    skip_all,
    fields(delivery_id = tracing::field::Empty)
)]
pub async fn identity_webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let webhook: Arc<IdentityWebhook> = state
        .identity
        .clone()
        .ok_or(PipelineError::NotConfigured("identity"))?;

    let svix = SvixHeaders {
        id: header(&headers, SVIX_ID_HEADER),
        timestamp: header(&headers, SVIX_TIMESTAMP_HEADER),
        signature: header(&headers, SVIX_SIGNATURE_HEADER),
    };
    if let Some(id) = svix.id {
        tracing::Span::current().record("delivery_id", id);
    }

    let payload = webhook.verifier.verify(&body, svix)?;

    let task = {
        let webhook = Arc::clone(&webhook);
        tokio::spawn(async move { webhook.sync.dispatch(&payload).await }.in_current_span())
    };
    let result = task
        .await
        .map_err(|e| PipelineError::Internal(format!("identity task failed: {e}")))??;

    Ok(Json(serde_json::json!({
        "success": true,
        "status": result.status(),
    })))
}
