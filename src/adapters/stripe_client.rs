use {
    crate::domain::{
        error::PipelineError,
        id::PaymentIntentId,
        provider::{CheckoutSession, CheckoutSessions},
    },
    std::{future::Future, pin::Pin},
};

pub struct StripeCheckoutSessions {
    client: stripe::Client,
}

impl StripeCheckoutSessions {
    pub fn new(secret_key: &str) -> Self {
        Self {
            client: stripe::Client::new(secret_key),
        }
    }
}

impl CheckoutSessions for StripeCheckoutSessions {
    fn list_by_payment_intent(
        &self,
        id: &PaymentIntentId,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<CheckoutSession>, PipelineError>> + Send + '_>> {
        let id = id.clone();
        Box::pin(async move { self.list_by_payment_intent_inner(&id).await })
    }
}

impl StripeCheckoutSessions {
    async fn list_by_payment_intent_inner(
        &self,
        id: &PaymentIntentId,
    ) -> Result<Vec<CheckoutSession>, PipelineError> {
        let pi_id = id
            .as_str()
            .parse::<stripe::PaymentIntentId>()
            .map_err(|e| PipelineError::Provider(format!("invalid PaymentIntent id: {e}")))?;

        let mut params = stripe::ListCheckoutSessions::new();
        params.payment_intent = Some(pi_id);

        let sessions = stripe::CheckoutSession::list(&self.client, &params)
            .await
            .map_err(|e| PipelineError::Provider(format!("Stripe API: {e}")))?;

        Ok(sessions
            .data
            .into_iter()
            .map(|session| CheckoutSession {
                id: session.id.to_string(),
                metadata: session.metadata.unwrap_or_default(),
            })
            .collect())
    }
}
