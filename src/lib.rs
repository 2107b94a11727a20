pub mod adapters;
pub mod config;
pub mod domain;
pub mod infra;
pub mod services;

use {
    adapters::{
        identity_webhook::{IdentityWebhook, identity_webhook_handler},
        signature::{StripeSignatureVerifier, SvixSignatureVerifier},
        stripe_webhook::{BillingWebhook, billing_webhook_handler},
    },
    axum::{
        Router,
        extract::DefaultBodyLimit,
        routing::{get, post},
    },
    config::Config,
    domain::{provider::CheckoutSessions, store::RecordStore},
    services::{
        dispatcher::BillingDispatcher, identity_sync::IdentitySync,
        purchase_lifecycle::PurchaseLifecycle,
    },
    std::sync::Arc,
    tower_http::trace::TraceLayer,
};

/// Stripe events are typically well under 20 KB.
const MAX_WEBHOOK_BODY: usize = 64 * 1024;

/// A route whose dependencies are missing stays `None` and answers 500.
#[derive(Clone, Default)]
pub struct AppState {
    pub billing: Option<Arc<BillingWebhook>>,
    pub identity: Option<Arc<IdentityWebhook>>,
}

impl AppState {
    pub fn build(
        config: &Config,
        store: Arc<dyn RecordStore>,
        sessions: Option<Arc<dyn CheckoutSessions>>,
    ) -> Self {
        let tolerance = config.webhook_tolerance_secs;

        let billing_verifier =
            StripeSignatureVerifier::new(config.stripe_webhook_secret.as_deref().unwrap_or(""), tolerance);
        let billing = match (billing_verifier, sessions) {
            (Ok(verifier), Some(sessions)) => {
                let lifecycle = Arc::new(PurchaseLifecycle::new(Arc::clone(&store), sessions));
                Some(Arc::new(BillingWebhook::new(
                    verifier,
                    BillingDispatcher::new(lifecycle),
                )))
            }
            (Err(e), _) => {
                tracing::warn!(error = %e, "billing webhooks disabled: STRIPE_WEBHOOK_SECRET missing");
                None
            }
            (Ok(_), None) => {
                tracing::warn!("billing webhooks disabled: STRIPE_SECRET_KEY missing");
                None
            }
        };

        let identity = match SvixSignatureVerifier::new(
            config.identity_webhook_secret.as_deref().unwrap_or(""),
            tolerance,
        ) {
            Ok(verifier) => Some(Arc::new(IdentityWebhook::new(
                verifier,
                IdentitySync::new(store),
            ))),
            Err(e) => {
                tracing::warn!(error = %e, "identity webhooks disabled: CLERK_WEBHOOK_SECRET missing or invalid");
                None
            }
        };

        Self { billing, identity }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/webhooks/billing", post(billing_webhook_handler))
        .route("/webhooks/identity", post(identity_webhook_handler))
        .layer(DefaultBodyLimit::max(MAX_WEBHOOK_BODY))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
