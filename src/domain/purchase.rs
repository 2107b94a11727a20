use {
    super::error::PipelineError,
    super::id::{CourseId, PurchaseId, UserId},
    super::money::Money,
    serde::{Deserialize, Serialize},
    std::fmt,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    Pending,
    Completed,
    Failed,
}

impl PurchaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn can_transition_to(&self, next: &PurchaseStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Completed) | (Self::Pending, Self::Failed)
        )
    }
}

impl fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for PurchaseStatus {
    type Error = PipelineError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(PipelineError::Validation(format!(
                "unknown purchase status: {other}"
            ))),
        }
    }
}

/// What the billing provider reported about the payment behind a purchase.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOutcome {
    Succeeded,
    Failed,
}

impl PaymentOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub fn target_status(&self) -> PurchaseStatus {
        match self {
            Self::Succeeded => PurchaseStatus::Completed,
            Self::Failed => PurchaseStatus::Failed,
        }
    }
}

impl fmt::Display for PaymentOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of applying a payment outcome to the current purchase status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseAction {
    /// pending → completed, enroll the user in the course.
    Complete,
    /// pending → failed, nothing else changes.
    Fail,
    /// Redelivery of the event that already moved the purchase.
    AlreadyApplied(PurchaseStatus),
    /// Terminal state disagrees with the incoming outcome.
    Anomaly {
        current: PurchaseStatus,
        incoming: PaymentOutcome,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    pub id: PurchaseId,
    pub user_id: UserId,
    pub course_id: CourseId,
    pub amount: Money,
    pub status: PurchaseStatus,
    /// Optimistic-concurrency token owned by the store. 0 = never saved.
    #[serde(default)]
    pub version: u64,
}

impl Purchase {
    pub fn new_pending(id: PurchaseId, user_id: UserId, course_id: CourseId, amount: Money) -> Self {
        Self {
            id,
            user_id,
            course_id,
            amount,
            status: PurchaseStatus::Pending,
            version: 0,
        }
    }

    pub fn decide(&self, outcome: PaymentOutcome) -> PurchaseAction {
        let target = outcome.target_status();
        match self.status {
            PurchaseStatus::Pending => match outcome {
                PaymentOutcome::Succeeded => PurchaseAction::Complete,
                PaymentOutcome::Failed => PurchaseAction::Fail,
            },
            current if current == target => PurchaseAction::AlreadyApplied(current),
            current => PurchaseAction::Anomaly {
                current,
                incoming: outcome,
            },
        }
    }

    pub fn transition_status(&mut self, new: PurchaseStatus) -> Result<(), PipelineError> {
        if !self.status.can_transition_to(&new) {
            return Err(PipelineError::Validation(format!(
                "invalid status transition: {} → {}",
                self.status, new
            )));
        }

        self.status = new;
        Ok(())
    }
}
