use {
    super::error::PipelineError,
    super::id::PaymentIntentId,
    std::{collections::HashMap, future::Future, pin::Pin},
};

/// Metadata key the checkout flow stores the purchase id under.
pub const PURCHASE_ID_METADATA_KEY: &str = "purchaseId";

/// The slice of a provider checkout session this crate reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: String,
    pub metadata: HashMap<String, String>,
}

impl CheckoutSession {
    pub fn purchase_id(&self) -> Option<&str> {
        self.metadata
            .get(PURCHASE_ID_METADATA_KEY)
            .map(String::as_str)
            .filter(|id| !id.trim().is_empty())
    }
}

/// Lookup of the checkout sessions that produced a payment intent. Payment
/// intents carry no application ids, so the purchase id lives in session
/// metadata.
pub trait CheckoutSessions: Send + Sync {
    fn list_by_payment_intent(
        &self,
        id: &PaymentIntentId,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<CheckoutSession>, PipelineError>> + Send + '_>>;
}
