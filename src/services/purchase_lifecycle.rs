use {
    crate::domain::{
        audit::AnomalyEntry,
        enrollment::{Course, User},
        error::PipelineError,
        id::{CourseId, EventId, PaymentIntentId, PurchaseId, UserId},
        provider::CheckoutSessions,
        purchase::{PaymentOutcome, Purchase, PurchaseAction, PurchaseStatus},
        store::{EntityKind, Record, RecordStore, StoreError},
    },
    std::{
        collections::HashMap,
        sync::{Arc, Mutex, PoisonError},
    },
    tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard},
};

/// Attempts per enrollment write before a version conflict is surfaced.
const MAX_SAVE_ATTEMPTS: u32 = 3;

const ACTOR: &str = "webhook:stripe";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessResult {
    /// pending → completed, user and course enrollments written.
    Completed(PurchaseId),
    /// pending → failed.
    Failed(PurchaseId),
    /// Redelivered success for a purchase that is already completed.
    AlreadyCompleted(PurchaseId),
    /// Redelivered failure for a purchase that is already failed.
    AlreadyFailed(PurchaseId),
    /// Outcome contradicts the terminal state. Logged, not applied.
    Anomaly {
        purchase_id: PurchaseId,
        current: PurchaseStatus,
        incoming: PaymentOutcome,
    },
    /// Event kind this service does not act on.
    Unhandled(String),
    /// Terminal lookup failure; acknowledged so the provider stops retrying.
    Ignored { reason: String },
}

impl ProcessResult {
    pub fn status(&self) -> &'static str {
        match self {
            Self::Completed(_) => "completed",
            Self::Failed(_) => "failed",
            Self::AlreadyCompleted(_) | Self::AlreadyFailed(_) => "duplicate",
            Self::Anomaly { .. } => "anomaly",
            Self::Unhandled(_) => "unhandled",
            Self::Ignored { .. } => "ignored",
        }
    }
}

/// Serializes transitions per purchase id inside this process.
#[derive(Debug, Default)]
pub struct PurchaseLocks {
    inner: Mutex<HashMap<PurchaseId, Arc<AsyncMutex<()>>>>,
}

impl PurchaseLocks {
    pub async fn acquire(&self, id: &PurchaseId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            // Entries only the map still references are idle.
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
            map.entry(id.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Moves purchases through pending → completed | failed and keeps the
/// user/course enrollment lists in step.
///
/// Writes are ordered user, course, purchase. The purchase is saved last so
/// an interrupted completion leaves it `pending`; the provider's redelivery
/// then re-runs the idempotent appends and finishes the job. `PurchaseLocks`
/// only covers this process: when another process moves the purchase between
/// the enrollment writes and the purchase save, the conditional save fails and
/// the landed writes go to the anomaly log.
pub struct PurchaseLifecycle {
    store: Arc<dyn RecordStore>,
    sessions: Arc<dyn CheckoutSessions>,
    locks: PurchaseLocks,
}

impl PurchaseLifecycle {
    pub fn new(store: Arc<dyn RecordStore>, sessions: Arc<dyn CheckoutSessions>) -> Self {
        Self {
            store,
            sessions,
            locks: PurchaseLocks::default(),
        }
    }

    /// Payment intent → checkout session → `metadata.purchaseId`.
    pub async fn resolve_purchase_id(
        &self,
        payment_intent: &PaymentIntentId,
    ) -> Result<PurchaseId, PipelineError> {
        let sessions = self.sessions.list_by_payment_intent(payment_intent).await?;
        let session = sessions
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::SessionNotFound(payment_intent.to_string()))?;

        let raw = session
            .purchase_id()
            .ok_or_else(|| PipelineError::SessionMetadataMissing {
                session_id: session.id.clone(),
            })?;
        PurchaseId::new(raw)
    }

    pub async fn on_payment_succeeded(
        &self,
        event_id: &EventId,
        payment_intent: &PaymentIntentId,
    ) -> Result<ProcessResult, PipelineError> {
        let purchase_id = self.resolve_purchase_id(payment_intent).await?;
        self.apply(event_id, &purchase_id, PaymentOutcome::Succeeded)
            .await
    }

    pub async fn on_payment_failed(
        &self,
        event_id: &EventId,
        payment_intent: &PaymentIntentId,
    ) -> Result<ProcessResult, PipelineError> {
        let purchase_id = self.resolve_purchase_id(payment_intent).await?;
        self.apply(event_id, &purchase_id, PaymentOutcome::Failed)
            .await
    }

    #[tracing::instrument(
        name = "purchase_transition",
        skip_all,
        fields(purchase_id = %purchase_id, event_id = %event_id, outcome = %outcome)
    )]
    pub async fn apply(
        &self,
        event_id: &EventId,
        purchase_id: &PurchaseId,
        outcome: PaymentOutcome,
    ) -> Result<ProcessResult, PipelineError> {
        let _guard = self.locks.acquire(purchase_id).await;

        let purchase = self.load_purchase(purchase_id).await?;

        match purchase.decide(outcome) {
            PurchaseAction::AlreadyApplied(status) => {
                tracing::info!(%status, "redelivered event, purchase already transitioned");
                Ok(match status {
                    PurchaseStatus::Failed => ProcessResult::AlreadyFailed(purchase.id),
                    _ => ProcessResult::AlreadyCompleted(purchase.id),
                })
            }
            PurchaseAction::Anomaly { current, incoming } => {
                self.store
                    .record_anomaly(AnomalyEntry::new(
                        purchase.id.clone(),
                        event_id.clone(),
                        current,
                        incoming,
                        ACTOR,
                    ))
                    .await?;
                tracing::warn!(
                    from = %current,
                    to = %incoming.target_status(),
                    "invalid purchase transition, logged as anomaly for manual review"
                );
                Ok(ProcessResult::Anomaly {
                    purchase_id: purchase.id,
                    current,
                    incoming,
                })
            }
            PurchaseAction::Fail => {
                let mut purchase = purchase;
                purchase.transition_status(PurchaseStatus::Failed)?;
                let id = purchase.id.clone();
                self.store.save(Record::Purchase(purchase)).await?;
                tracing::info!("purchase marked failed");
                Ok(ProcessResult::Failed(id))
            }
            PurchaseAction::Complete => self.complete(event_id, purchase).await,
        }
    }

    async fn complete(
        &self,
        event_id: &EventId,
        mut purchase: Purchase,
    ) -> Result<ProcessResult, PipelineError> {
        // Load everything before the first write: a missing row must leave
        // all three records untouched.
        let user = self.load_user(&purchase.user_id).await?;
        let course = self.load_course(&purchase.course_id).await?;

        let mut written: Vec<EntityKind> = Vec::with_capacity(2);

        let enrolled = async {
            let course_id = purchase.course_id.clone();
            self.save_enrollment(
                user,
                |u: &mut User| u.enroll(&course_id),
                Record::User,
                Record::into_user,
            )
            .await?;
            written.push(EntityKind::User);

            let user_id = purchase.user_id.clone();
            self.save_enrollment(
                course,
                |c: &mut Course| c.enroll(&user_id),
                Record::Course,
                Record::into_course,
            )
            .await?;
            written.push(EntityKind::Course);

            purchase.transition_status(PurchaseStatus::Completed)?;
            self.store.save(Record::Purchase(purchase.clone())).await?;
            Ok::<_, PipelineError>(())
        }
        .await;

        match enrolled {
            Ok(()) => {
                tracing::info!(
                    user_id = %purchase.user_id,
                    course_id = %purchase.course_id,
                    "purchase completed, user enrolled"
                );
                Ok(ProcessResult::Completed(purchase.id))
            }
            // Another process moved the purchase after our enrollment writes.
            Err(PipelineError::Store(StoreError::Conflict {
                kind: EntityKind::Purchase,
                ..
            })) => self.reconcile_lost_race(event_id, &purchase.id, &written).await,
            Err(err) => {
                if !written.is_empty() {
                    tracing::error!(
                        purchase_id = %purchase.id,
                        written = ?written,
                        error = %err,
                        "completion interrupted after partial writes, redelivery will resume it"
                    );
                }
                Err(err)
            }
        }
    }

    /// The purchase save lost to a concurrent writer. If the purchase is now
    /// failed, the enrollments just written are unpaid; they are recorded in
    /// the anomaly log alongside the refusal.
    async fn reconcile_lost_race(
        &self,
        event_id: &EventId,
        purchase_id: &PurchaseId,
        written: &[EntityKind],
    ) -> Result<ProcessResult, PipelineError> {
        let current = self.load_purchase(purchase_id).await?;
        match current.decide(PaymentOutcome::Succeeded) {
            PurchaseAction::AlreadyApplied(_) => {
                tracing::info!("purchase completed concurrently");
                Ok(ProcessResult::AlreadyCompleted(current.id))
            }
            PurchaseAction::Anomaly { current: status, incoming } => {
                self.store
                    .record_anomaly(
                        AnomalyEntry::new(
                            current.id.clone(),
                            event_id.clone(),
                            status,
                            incoming,
                            ACTOR,
                        )
                        .with_enrollment_writes(written),
                    )
                    .await?;
                tracing::error!(
                    from = %status,
                    written = ?written,
                    "purchase moved concurrently after enrollment writes, logged for manual review"
                );
                Ok(ProcessResult::Anomaly {
                    purchase_id: current.id,
                    current: status,
                    incoming,
                })
            }
            // Still pending under a newer version; redelivery retries.
            PurchaseAction::Complete | PurchaseAction::Fail => Err(StoreError::Conflict {
                kind: EntityKind::Purchase,
                id: current.id.to_string(),
            }
            .into()),
        }
    }

    /// Appends the purchase's counterpart id via `enroll` and saves,
    /// reloading on version conflicts. Another purchase by the same user (or
    /// for the same course) may be writing the same record concurrently.
    async fn save_enrollment<T: Clone>(
        &self,
        mut entity: T,
        enroll: impl Fn(&mut T) -> bool,
        into_record: fn(T) -> Record,
        from_record: fn(Record) -> Result<T, StoreError>,
    ) -> Result<(), PipelineError> {
        let mut attempt = 1;
        loop {
            if !enroll(&mut entity) {
                return Ok(());
            }

            match self.store.save(into_record(entity.clone())).await {
                Ok(_) => return Ok(()),
                Err(StoreError::Conflict { kind, id }) if attempt < MAX_SAVE_ATTEMPTS => {
                    tracing::debug!(%kind, %id, attempt, "version conflict, reloading");
                    attempt += 1;
                    entity = from_record(self.store.get(kind, &id).await?)?;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn load_purchase(&self, id: &PurchaseId) -> Result<Purchase, PipelineError> {
        match self.store.get(EntityKind::Purchase, id.as_str()).await {
            Ok(record) => Ok(record.into_purchase()?),
            Err(StoreError::NotFound { .. }) => Err(PipelineError::PurchaseNotFound(id.to_string())),
            Err(err) => Err(err.into()),
        }
    }

    async fn load_user(&self, id: &UserId) -> Result<User, PipelineError> {
        match self.store.get(EntityKind::User, id.as_str()).await {
            Ok(record) => Ok(record.into_user()?),
            Err(StoreError::NotFound { .. }) => Err(PipelineError::UserNotFound(id.to_string())),
            Err(err) => Err(err.into()),
        }
    }

    async fn load_course(&self, id: &CourseId) -> Result<Course, PipelineError> {
        match self.store.get(EntityKind::Course, id.as_str()).await {
            Ok(record) => Ok(record.into_course()?),
            Err(StoreError::NotFound { .. }) => Err(PipelineError::CourseNotFound(id.to_string())),
            Err(err) => Err(err.into()),
        }
    }
}
