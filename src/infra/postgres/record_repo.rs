use {
    crate::domain::{
        audit::AnomalyEntry,
        enrollment::{Course, User},
        error::PipelineError,
        id::{CourseId, PurchaseId, UserId},
        money::{Currency, Money, MoneyAmount},
        purchase::{Purchase, PurchaseStatus},
        store::{EntityKind, Record, RecordStore, StoreError, StoreFuture},
    },
    sqlx::PgPool,
};

/// Postgres-backed record store. Each `save` is a single conditional
/// statement on `version`; there is no cross-record transaction.
#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(format!("migration failed: {e}")))
    }

    async fn get_user(&self, id: &str) -> Result<Record, StoreError> {
        let row = sqlx::query_as::<_, (String, String, String, String, Vec<String>, i64)>(
            "SELECT id, email, name, image_url, enrolled_courses, version FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| not_found(EntityKind::User, id))?;

        let (id, email, name, image_url, courses, version) = row;
        let corrupt = |e: PipelineError| corrupt(EntityKind::User, &id, e);
        let enrolled_courses = courses
            .into_iter()
            .map(CourseId::new)
            .collect::<Result<Vec<_>, _>>()
            .map_err(corrupt)?;

        Ok(Record::User(User {
            id: UserId::new(id.clone()).map_err(corrupt)?,
            email,
            name,
            image_url,
            enrolled_courses,
            version: from_db_version(version),
        }))
    }

    async fn get_course(&self, id: &str) -> Result<Record, StoreError> {
        let row = sqlx::query_as::<_, (String, String, Vec<String>, i64)>(
            "SELECT id, title, enrolled_students, version FROM courses WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| not_found(EntityKind::Course, id))?;

        let (id, title, students, version) = row;
        let corrupt = |e: PipelineError| corrupt(EntityKind::Course, &id, e);
        let enrolled_students = students
            .into_iter()
            .map(UserId::new)
            .collect::<Result<Vec<_>, _>>()
            .map_err(corrupt)?;

        Ok(Record::Course(Course {
            id: CourseId::new(id.clone()).map_err(corrupt)?,
            title,
            enrolled_students,
            version: from_db_version(version),
        }))
    }

    async fn get_purchase(&self, id: &str) -> Result<Record, StoreError> {
        let row = sqlx::query_as::<_, (String, String, String, i64, String, String, i64)>(
            r#"
            SELECT id, user_id, course_id, amount, currency, status, version
            FROM purchases WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| not_found(EntityKind::Purchase, id))?;

        let (id, user_id, course_id, amount, currency, status, version) = row;
        let corrupt = |e: PipelineError| corrupt(EntityKind::Purchase, &id, e);

        Ok(Record::Purchase(Purchase {
            id: PurchaseId::new(id.clone()).map_err(corrupt)?,
            user_id: UserId::new(user_id).map_err(corrupt)?,
            course_id: CourseId::new(course_id).map_err(corrupt)?,
            amount: Money::new(
                MoneyAmount::new(amount).map_err(corrupt)?,
                Currency::try_from(currency.as_str()).map_err(corrupt)?,
            ),
            status: PurchaseStatus::try_from(status.as_str()).map_err(corrupt)?,
            version: from_db_version(version),
        }))
    }

    async fn save_user(&self, user: &User) -> Result<u64, sqlx::Error> {
        let courses: Vec<String> = user
            .enrolled_courses
            .iter()
            .map(|c| c.as_str().to_string())
            .collect();

        let result = if user.version == 0 {
            sqlx::query(
                r#"
                INSERT INTO users (id, email, name, image_url, enrolled_courses, version)
                VALUES ($1, $2, $3, $4, $5, 1)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(user.id.as_str())
            .bind(&user.email)
            .bind(&user.name)
            .bind(&user.image_url)
            .bind(&courses)
            .execute(&self.pool)
            .await?
        } else {
            sqlx::query(
                r#"
                UPDATE users
                SET email = $2, name = $3, image_url = $4, enrolled_courses = $5,
                    version = version + 1, updated_at = now()
                WHERE id = $1 AND version = $6
                "#,
            )
            .bind(user.id.as_str())
            .bind(&user.email)
            .bind(&user.name)
            .bind(&user.image_url)
            .bind(&courses)
            .bind(to_db_version(user.version))
            .execute(&self.pool)
            .await?
        };
        Ok(result.rows_affected())
    }

    async fn save_course(&self, course: &Course) -> Result<u64, sqlx::Error> {
        let students: Vec<String> = course
            .enrolled_students
            .iter()
            .map(|u| u.as_str().to_string())
            .collect();

        let result = if course.version == 0 {
            sqlx::query(
                r#"
                INSERT INTO courses (id, title, enrolled_students, version)
                VALUES ($1, $2, $3, 1)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(course.id.as_str())
            .bind(&course.title)
            .bind(&students)
            .execute(&self.pool)
            .await?
        } else {
            sqlx::query(
                r#"
                UPDATE courses
                SET title = $2, enrolled_students = $3, version = version + 1, updated_at = now()
                WHERE id = $1 AND version = $4
                "#,
            )
            .bind(course.id.as_str())
            .bind(&course.title)
            .bind(&students)
            .bind(to_db_version(course.version))
            .execute(&self.pool)
            .await?
        };
        Ok(result.rows_affected())
    }

    async fn save_purchase(&self, purchase: &Purchase) -> Result<u64, sqlx::Error> {
        let result = if purchase.version == 0 {
            sqlx::query(
                r#"
                INSERT INTO purchases (id, user_id, course_id, amount, currency, status, version)
                VALUES ($1, $2, $3, $4, $5, $6, 1)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(purchase.id.as_str())
            .bind(purchase.user_id.as_str())
            .bind(purchase.course_id.as_str())
            .bind(purchase.amount.amount().minor_units())
            .bind(purchase.amount.currency().as_str())
            .bind(purchase.status.as_str())
            .execute(&self.pool)
            .await?
        } else {
            // Only status moves after checkout; the other columns are fixed.
            sqlx::query(
                r#"
                UPDATE purchases
                SET status = $2, version = version + 1, updated_at = now()
                WHERE id = $1 AND version = $3
                "#,
            )
            .bind(purchase.id.as_str())
            .bind(purchase.status.as_str())
            .bind(to_db_version(purchase.version))
            .execute(&self.pool)
            .await?
        };
        Ok(result.rows_affected())
    }
}

fn not_found(kind: EntityKind, id: &str) -> StoreError {
    StoreError::NotFound {
        kind,
        id: id.to_string(),
    }
}

fn corrupt(kind: EntityKind, id: &str, err: PipelineError) -> StoreError {
    StoreError::Corrupt {
        kind,
        id: id.to_string(),
        reason: err.to_string(),
    }
}

// BIGINT columns are never negative; the CHECK constraint enforces it.
fn from_db_version(version: i64) -> u64 {
    u64::try_from(version).unwrap_or(0)
}

fn to_db_version(version: u64) -> i64 {
    i64::try_from(version).unwrap_or(i64::MAX)
}

impl RecordStore for PgRecordStore {
    fn get<'a>(&'a self, kind: EntityKind, id: &'a str) -> StoreFuture<'a, Record> {
        Box::pin(async move {
            match kind {
                EntityKind::User => self.get_user(id).await,
                EntityKind::Course => self.get_course(id).await,
                EntityKind::Purchase => self.get_purchase(id).await,
            }
        })
    }

    fn save(&self, record: Record) -> StoreFuture<'_, Record> {
        Box::pin(async move {
            let affected = match &record {
                Record::User(user) => self.save_user(user).await?,
                Record::Course(course) => self.save_course(course).await?,
                Record::Purchase(purchase) => self.save_purchase(purchase).await?,
            };

            if affected == 0 {
                return Err(StoreError::Conflict {
                    kind: record.kind(),
                    id: record.id().to_string(),
                });
            }

            let version = record.version() + 1;
            Ok(record.with_version(version))
        })
    }

    fn remove<'a>(&'a self, kind: EntityKind, id: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let sql = match kind {
                EntityKind::User => "DELETE FROM users WHERE id = $1",
                EntityKind::Course => "DELETE FROM courses WHERE id = $1",
                EntityKind::Purchase => "DELETE FROM purchases WHERE id = $1",
            };
            let result = sqlx::query(sql).bind(id).execute(&self.pool).await?;
            Ok(result.rows_affected() > 0)
        })
    }

    fn record_anomaly(&self, entry: AnomalyEntry) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query(
                r#"
                INSERT INTO purchase_anomalies
                    (id, purchase_id, event_id, current_status, incoming, actor, detail)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (event_id, purchase_id) DO NOTHING
                "#,
            )
            .bind(entry.id)
            .bind(entry.purchase_id.as_str())
            .bind(entry.event_id.as_str())
            .bind(entry.current_status.as_str())
            .bind(entry.incoming.as_str())
            .bind(&entry.actor)
            .bind(&entry.detail)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
    }
}
