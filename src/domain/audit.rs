use {
    super::id::{EventId, PurchaseId},
    super::purchase::{PaymentOutcome, PurchaseStatus},
    super::store::EntityKind,
    uuid::Uuid,
};

/// A transition the state machine refused to apply. Kept for manual review;
/// nothing in this crate ever resolves one automatically.
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyEntry {
    pub id: Uuid,
    pub purchase_id: PurchaseId,
    pub event_id: EventId,
    pub current_status: PurchaseStatus,
    pub incoming: PaymentOutcome,
    pub actor: String,
    pub detail: serde_json::Value,
}

impl AnomalyEntry {
    pub fn new(
        purchase_id: PurchaseId,
        event_id: EventId,
        current_status: PurchaseStatus,
        incoming: PaymentOutcome,
        actor: &str,
    ) -> Self {
        let detail = serde_json::json!({
            "current_status": current_status.as_str(),
            "incoming": incoming.as_str(),
            "resolution": "manual_review",
        });
        Self {
            id: Uuid::now_v7(),
            purchase_id,
            event_id,
            current_status,
            incoming,
            actor: actor.to_string(),
            detail,
        }
    }

    /// Notes enrollment writes that landed before the purchase was found in
    /// a conflicting state. Review has to undo them by hand.
    pub fn with_enrollment_writes(mut self, written: &[EntityKind]) -> Self {
        let kinds: Vec<&str> = written.iter().map(EntityKind::as_str).collect();
        self.detail["enrollment_writes"] = serde_json::json!(kinds);
        self
    }

    /// Two entries for the same event and purchase describe the same refusal.
    pub fn same_refusal_as(&self, other: &AnomalyEntry) -> bool {
        self.event_id == other.event_id && self.purchase_id == other.purchase_id
    }
}
