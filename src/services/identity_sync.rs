use {
    crate::domain::{
        enrollment::User,
        error::PipelineError,
        event::{IdentityEvent, IdentityUser, VerifiedPayload},
        id::UserId,
        store::{EntityKind, Record, RecordStore, StoreError},
    },
    std::sync::Arc,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityResult {
    Provisioned(UserId),
    Updated(UserId),
    Unchanged(UserId),
    Removed(UserId),
    AlreadyRemoved(UserId),
    Unhandled(String),
}

impl IdentityResult {
    pub fn status(&self) -> &'static str {
        match self {
            Self::Provisioned(_) => "provisioned",
            Self::Updated(_) => "updated",
            Self::Unchanged(_) => "unchanged",
            Self::Removed(_) => "removed",
            Self::AlreadyRemoved(_) => "already_removed",
            Self::Unhandled(_) => "unhandled",
        }
    }
}

/// Keeps User records in step with the identity provider so purchases can
/// reference them. Enrollment lists are never touched here.
pub struct IdentitySync {
    store: Arc<dyn RecordStore>,
}

impl IdentitySync {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn dispatch(&self, payload: &VerifiedPayload) -> Result<IdentityResult, PipelineError> {
        match IdentityEvent::parse(payload)? {
            // Created and updated both upsert: deliveries can arrive out of order.
            IdentityEvent::UserCreated(user) | IdentityEvent::UserUpdated(user) => {
                self.upsert(user).await
            }
            IdentityEvent::UserDeleted { id } => self.remove(id).await,
            IdentityEvent::Unhandled { event_type } => {
                tracing::info!(%event_type, "unhandled identity event, acknowledged");
                Ok(IdentityResult::Unhandled(event_type))
            }
        }
    }

    async fn upsert(&self, incoming: IdentityUser) -> Result<IdentityResult, PipelineError> {
        // One retry covers a concurrent insert of the same user.
        for _ in 0..2 {
            let (record, result) = match self.store.get(EntityKind::User, incoming.id.as_str()).await {
                Ok(existing) => {
                    let mut user = existing.into_user()?;
                    if user.email == incoming.email
                        && user.name == incoming.name
                        && user.image_url == incoming.image_url
                    {
                        return Ok(IdentityResult::Unchanged(user.id));
                    }
                    user.email = incoming.email.clone();
                    user.name = incoming.name.clone();
                    user.image_url = incoming.image_url.clone();
                    (user, IdentityResult::Updated(incoming.id.clone()))
                }
                Err(StoreError::NotFound { .. }) => {
                    let mut user = User::new(
                        incoming.id.clone(),
                        incoming.email.clone(),
                        incoming.name.clone(),
                    );
                    user.image_url = incoming.image_url.clone();
                    (user, IdentityResult::Provisioned(incoming.id.clone()))
                }
                Err(err) => return Err(err.into()),
            };

            match self.store.save(Record::User(record)).await {
                Ok(_) => {
                    tracing::info!(user_id = %incoming.id, status = result.status(), "user synced");
                    return Ok(result);
                }
                Err(StoreError::Conflict { .. }) => continue,
                Err(err) => return Err(err.into()),
            }
        }

        Err(StoreError::Conflict {
            kind: EntityKind::User,
            id: incoming.id.to_string(),
        }
        .into())
    }

    async fn remove(&self, id: UserId) -> Result<IdentityResult, PipelineError> {
        if self.store.remove(EntityKind::User, id.as_str()).await? {
            tracing::info!(user_id = %id, "user removed");
            Ok(IdentityResult::Removed(id))
        } else {
            Ok(IdentityResult::AlreadyRemoved(id))
        }
    }
}
