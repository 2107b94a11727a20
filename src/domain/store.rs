use {
    super::audit::AnomalyEntry,
    super::enrollment::{Course, User},
    super::purchase::Purchase,
    std::{fmt, future::Future, pin::Pin},
    thiserror::Error,
};

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    User,
    Course,
    Purchase,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Course => "course",
            Self::Purchase => "purchase",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: String },

    /// The stored version moved since the record was loaded.
    #[error("{kind} {id} was modified concurrently")]
    Conflict { kind: EntityKind, id: String },

    #[error("{kind} {id} has the wrong shape: {reason}")]
    Corrupt {
        kind: EntityKind,
        id: String,
        reason: String,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    User(User),
    Course(Course),
    Purchase(Purchase),
}

impl Record {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::User(_) => EntityKind::User,
            Self::Course(_) => EntityKind::Course,
            Self::Purchase(_) => EntityKind::Purchase,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::User(u) => u.id.as_str(),
            Self::Course(c) => c.id.as_str(),
            Self::Purchase(p) => p.id.as_str(),
        }
    }

    pub fn version(&self) -> u64 {
        match self {
            Self::User(u) => u.version,
            Self::Course(c) => c.version,
            Self::Purchase(p) => p.version,
        }
    }

    pub fn with_version(mut self, version: u64) -> Self {
        match &mut self {
            Self::User(u) => u.version = version,
            Self::Course(c) => c.version = version,
            Self::Purchase(p) => p.version = version,
        }
        self
    }

    pub fn into_user(self) -> Result<User, StoreError> {
        match self {
            Self::User(u) => Ok(u),
            other => Err(other.wrong_shape(EntityKind::User)),
        }
    }

    pub fn into_course(self) -> Result<Course, StoreError> {
        match self {
            Self::Course(c) => Ok(c),
            other => Err(other.wrong_shape(EntityKind::Course)),
        }
    }

    pub fn into_purchase(self) -> Result<Purchase, StoreError> {
        match self {
            Self::Purchase(p) => Ok(p),
            other => Err(other.wrong_shape(EntityKind::Purchase)),
        }
    }

    fn wrong_shape(&self, expected: EntityKind) -> StoreError {
        StoreError::Corrupt {
            kind: expected,
            id: self.id().to_string(),
            reason: format!("store returned a {}", self.kind()),
        }
    }
}

/// Persistence for the three records the lifecycle manager touches.
///
/// No multi-record transaction is assumed. `save` is a conditional write:
/// it only succeeds when the stored version equals `record.version()`
/// (0 meaning "must not exist yet"), and returns the record carrying its new
/// version.
pub trait RecordStore: Send + Sync {
    fn get<'a>(&'a self, kind: EntityKind, id: &'a str) -> StoreFuture<'a, Record>;

    fn save(&self, record: Record) -> StoreFuture<'_, Record>;

    /// Returns whether a record was removed.
    fn remove<'a>(&'a self, kind: EntityKind, id: &'a str) -> StoreFuture<'a, bool>;

    fn record_anomaly(&self, entry: AnomalyEntry) -> StoreFuture<'_, ()>;
}
