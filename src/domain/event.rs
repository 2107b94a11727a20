use {
    super::error::PipelineError,
    super::id::{EventId, PaymentIntentId, UserId},
    serde::Deserialize,
};

/// Raw webhook body whose signature has been checked.
///
/// Only the signature verifiers can mint one, so holding a `VerifiedPayload`
/// is proof that the bytes came from the configured provider.
#[derive(Debug, Clone)]
pub struct VerifiedPayload(Vec<u8>);

impl VerifiedPayload {
    pub(crate) fn new(body: &[u8]) -> Self {
        Self(body.to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingEvent {
    PaymentSucceeded {
        event_id: EventId,
        payment_intent: PaymentIntentId,
    },
    PaymentFailed {
        event_id: EventId,
        payment_intent: PaymentIntentId,
    },
    Unhandled {
        event_id: EventId,
        event_type: String,
    },
}

#[derive(Deserialize)]
struct RawBillingEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: RawEventData,
}

#[derive(Deserialize)]
struct RawEventData {
    object: RawEventObject,
}

#[derive(Deserialize)]
struct RawEventObject {
    id: Option<String>,
}

fn payment_intent_of(raw: &RawBillingEvent) -> Result<PaymentIntentId, PipelineError> {
    let id = raw.data.object.id.clone().ok_or_else(|| {
        PipelineError::Payload(format!("{} event has no data.object.id", raw.event_type))
    })?;
    PaymentIntentId::new(id)
}

impl BillingEvent {
    pub fn parse(payload: &VerifiedPayload) -> Result<Self, PipelineError> {
        let raw: RawBillingEvent = serde_json::from_slice(payload.as_bytes())
            .map_err(|e| PipelineError::Payload(e.to_string()))?;
        let event_id = EventId::new(raw.id.as_str())?;

        let event = match raw.event_type.as_str() {
            "payment_intent.succeeded" => Self::PaymentSucceeded {
                payment_intent: payment_intent_of(&raw)?,
                event_id,
            },
            "payment_intent.payment_failed" => Self::PaymentFailed {
                payment_intent: payment_intent_of(&raw)?,
                event_id,
            },
            other => Self::Unhandled {
                event_type: other.to_string(),
                event_id,
            },
        };
        Ok(event)
    }

    pub fn event_id(&self) -> &EventId {
        match self {
            Self::PaymentSucceeded { event_id, .. }
            | Self::PaymentFailed { event_id, .. }
            | Self::Unhandled { event_id, .. } => event_id,
        }
    }

    pub fn event_type(&self) -> &str {
        match self {
            Self::PaymentSucceeded { .. } => "payment_intent.succeeded",
            Self::PaymentFailed { .. } => "payment_intent.payment_failed",
            Self::Unhandled { event_type, .. } => event_type,
        }
    }
}

/// Profile fields carried by identity `user.*` events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityUser {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub image_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityEvent {
    UserCreated(IdentityUser),
    UserUpdated(IdentityUser),
    UserDeleted { id: UserId },
    Unhandled { event_type: String },
}

#[derive(Deserialize)]
struct RawIdentityEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: serde_json::Value,
}

#[derive(Deserialize)]
struct RawIdentityUser {
    id: String,
    #[serde(default)]
    email_addresses: Vec<RawEmailAddress>,
    first_name: Option<String>,
    last_name: Option<String>,
    image_url: Option<String>,
}

#[derive(Deserialize)]
struct RawEmailAddress {
    email_address: String,
}

#[derive(Deserialize)]
struct RawDeletedUser {
    id: String,
}

impl RawIdentityUser {
    fn into_identity_user(self) -> Result<IdentityUser, PipelineError> {
        let email = self
            .email_addresses
            .into_iter()
            .next()
            .map(|e| e.email_address)
            .unwrap_or_default();
        let name = [self.first_name, self.last_name]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        Ok(IdentityUser {
            id: UserId::new(self.id)?,
            email,
            name,
            image_url: self.image_url.unwrap_or_default(),
        })
    }
}

impl IdentityEvent {
    pub fn parse(payload: &VerifiedPayload) -> Result<Self, PipelineError> {
        let raw: RawIdentityEvent = serde_json::from_slice(payload.as_bytes())
            .map_err(|e| PipelineError::Payload(e.to_string()))?;

        let user = |data: serde_json::Value| -> Result<IdentityUser, PipelineError> {
            serde_json::from_value::<RawIdentityUser>(data)
                .map_err(|e| PipelineError::Payload(e.to_string()))?
                .into_identity_user()
        };

        let event = match raw.event_type.as_str() {
            "user.created" => Self::UserCreated(user(raw.data)?),
            "user.updated" => Self::UserUpdated(user(raw.data)?),
            "user.deleted" => {
                let deleted: RawDeletedUser = serde_json::from_value(raw.data)
                    .map_err(|e| PipelineError::Payload(e.to_string()))?;
                Self::UserDeleted {
                    id: UserId::new(deleted.id)?,
                }
            }
            other => Self::Unhandled {
                event_type: other.to_string(),
            },
        };
        Ok(event)
    }
}
