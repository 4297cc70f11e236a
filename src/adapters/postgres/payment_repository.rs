//! PostgreSQL implementation of PaymentRepository.
//!
//! The compare-and-set runs in one transaction: the guarded status update
//! (`WHERE status = 'pending'`) decides the winner through `rows_affected`,
//! and the winner activates or creates the linked subscription before
//! committing. A losing or failing caller rolls back and writes nothing.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::billing::{
    Money, PaymentMethod, PaymentNotes, PaymentRecord, PaymentStatus, PlanType, SubscriptionRecord,
};
use crate::domain::foundation::{
    AnalysisId, DomainError, ErrorCode, PaymentId, SubscriptionId, Timestamp, UserId,
};
use crate::ports::{
    CasResult, PaymentRepository, StatusTransition, SubscriptionActivation, SubscriptionChange,
};

const UNIQUE_VIOLATION: &str = "23505";

const PAYMENT_COLUMNS: &str = r#"
    id, user_id, analysis_id, transaction_id, amount_minor, currency, payment_method,
    plan_type, status, sender_identifier, notes, created_at, verified_at
"#;

pub struct PostgresPaymentRepository {
    pool: PgPool,
}

impl PostgresPaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a payment.
#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    user_id: String,
    analysis_id: Option<Uuid>,
    transaction_id: String,
    amount_minor: i64,
    currency: String,
    payment_method: String,
    plan_type: String,
    status: String,
    sender_identifier: Option<String>,
    notes: String,
    created_at: DateTime<Utc>,
    verified_at: Option<DateTime<Utc>>,
}

impl TryFrom<PaymentRow> for PaymentRecord {
    type Error = DomainError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(PaymentRecord {
            id: PaymentId::from_uuid(row.id),
            user_id: UserId::new(row.user_id).map_err(corrupt("user_id"))?,
            analysis_id: row.analysis_id.map(AnalysisId::from_uuid),
            transaction_id: row.transaction_id,
            amount: Money::new(row.amount_minor, row.currency.trim()).map_err(corrupt("amount"))?,
            payment_method: PaymentMethod::from_str(&row.payment_method)
                .map_err(corrupt("payment_method"))?,
            plan_type: PlanType::from_str(&row.plan_type).map_err(corrupt("plan_type"))?,
            status: PaymentStatus::from_str(&row.status).map_err(corrupt("status"))?,
            sender_identifier: row.sender_identifier,
            notes: PaymentNotes::from_raw(row.notes),
            created_at: Timestamp::from_datetime(row.created_at),
            verified_at: row.verified_at.map(Timestamp::from_datetime),
        })
    }
}

/// Database row representation of a subscription.
#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    user_id: String,
    plan_type: String,
    expires_at: Option<DateTime<Utc>>,
    is_active: bool,
    payment_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    activated_at: Option<DateTime<Utc>>,
}

impl TryFrom<SubscriptionRow> for SubscriptionRecord {
    type Error = DomainError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        Ok(SubscriptionRecord {
            id: SubscriptionId::from_uuid(row.id),
            user_id: UserId::new(row.user_id).map_err(corrupt("user_id"))?,
            plan_type: PlanType::from_str(&row.plan_type).map_err(corrupt("plan_type"))?,
            expires_at: row.expires_at.map(Timestamp::from_datetime),
            is_active: row.is_active,
            payment_id: row.payment_id.map(PaymentId::from_uuid),
            created_at: Timestamp::from_datetime(row.created_at),
            activated_at: row.activated_at.map(Timestamp::from_datetime),
        })
    }
}

fn corrupt<E: std::fmt::Display>(column: &'static str) -> impl Fn(E) -> DomainError {
    move |e| {
        DomainError::new(ErrorCode::DatabaseError, format!("Invalid {} value: {}", column, e))
    }
}

fn db_error(context: &'static str) -> impl Fn(sqlx::Error) -> DomainError {
    move |e| {
        if let sqlx::Error::Database(db_err) = &e {
            if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
                return DomainError::new(ErrorCode::DuplicateRecord, format!("{}: {}", context, e));
            }
        }
        DomainError::database(format!("{}: {}", context, e))
    }
}

/// Formats the note exactly as `PaymentNotes::append` would.
fn note_entry(note: &Option<(String, String)>) -> Option<String> {
    note.as_ref()
        .map(|(key, value)| PaymentNotes::default().with(key, value).as_str().to_string())
}

async fn activate_or_create(
    tx: &mut Transaction<'_, Postgres>,
    payment_id: &PaymentId,
    activation: &SubscriptionActivation,
) -> Result<SubscriptionChange, DomainError> {
    let activated: Option<Uuid> = sqlx::query_scalar(
        r#"
        UPDATE subscriptions
        SET is_active = TRUE, expires_at = $2, activated_at = $3
        WHERE payment_id = $1 AND is_active = FALSE
        RETURNING id
        "#,
    )
    .bind(payment_id.as_uuid())
    .bind(activation.expires_at.as_datetime())
    .bind(activation.activated_at.as_datetime())
    .fetch_optional(&mut **tx)
    .await
    .map_err(db_error("Failed to activate subscription"))?;

    if let Some(id) = activated {
        return Ok(SubscriptionChange::Activated(SubscriptionId::from_uuid(id)));
    }

    let created: Option<Uuid> = sqlx::query_scalar(
        r#"
        INSERT INTO subscriptions (
            id, user_id, plan_type, expires_at, is_active, payment_id, created_at, activated_at
        ) VALUES ($1, $2, $3, $4, TRUE, $5, $6, $6)
        ON CONFLICT (payment_id) WHERE payment_id IS NOT NULL DO NOTHING
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(activation.user_id.as_str())
    .bind(activation.plan_type.as_str())
    .bind(activation.expires_at.as_datetime())
    .bind(payment_id.as_uuid())
    .bind(activation.activated_at.as_datetime())
    .fetch_optional(&mut **tx)
    .await
    .map_err(db_error("Failed to create subscription"))?;

    if let Some(id) = created {
        return Ok(SubscriptionChange::Created(SubscriptionId::from_uuid(id)));
    }

    // The row exists and is already active; leave it alone.
    let existing: Uuid = sqlx::query_scalar("SELECT id FROM subscriptions WHERE payment_id = $1")
        .bind(payment_id.as_uuid())
        .fetch_one(&mut **tx)
        .await
        .map_err(db_error("Failed to load subscription"))?;

    Ok(SubscriptionChange::AlreadyActive(SubscriptionId::from_uuid(existing)))
}

#[async_trait]
impl PaymentRepository for PostgresPaymentRepository {
    async fn insert_pending_payment(&self, payment: &PaymentRecord) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO payments (
                id, user_id, analysis_id, transaction_id, amount_minor, currency, payment_method,
                plan_type, status, sender_identifier, notes, created_at, verified_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.user_id.as_str())
        .bind(payment.analysis_id.as_ref().map(AnalysisId::as_uuid))
        .bind(&payment.transaction_id)
        .bind(payment.amount.amount_minor())
        .bind(payment.amount.currency())
        .bind(payment.payment_method.as_str())
        .bind(payment.plan_type.as_str())
        .bind(payment.status.as_str())
        .bind(&payment.sender_identifier)
        .bind(payment.notes.as_str())
        .bind(payment.created_at.as_datetime())
        .bind(payment.verified_at.as_ref().map(Timestamp::as_datetime))
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to insert payment"))?;

        Ok(())
    }

    async fn insert_inactive_subscription(
        &self,
        subscription: &SubscriptionRecord,
    ) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, user_id, plan_type, expires_at, is_active, payment_id, created_at, activated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(subscription.user_id.as_str())
        .bind(subscription.plan_type.as_str())
        .bind(subscription.expires_at.as_ref().map(Timestamp::as_datetime))
        .bind(subscription.is_active)
        .bind(subscription.payment_id.as_ref().map(PaymentId::as_uuid))
        .bind(subscription.created_at.as_datetime())
        .bind(subscription.activated_at.as_ref().map(Timestamp::as_datetime))
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to insert subscription"))?;

        Ok(())
    }

    async fn find_by_id(&self, id: &PaymentId) -> Result<Option<PaymentRecord>, DomainError> {
        let row: Option<PaymentRow> =
            sqlx::query_as(&format!("SELECT {} FROM payments WHERE id = $1", PAYMENT_COLUMNS))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error("Failed to find payment"))?;

        row.map(PaymentRecord::try_from).transpose()
    }

    async fn find_pending_by_id(&self, id: &PaymentId) -> Result<Option<PaymentRecord>, DomainError> {
        let row: Option<PaymentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payments WHERE id = $1 AND status = 'pending'",
            PAYMENT_COLUMNS
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to find pending payment"))?;

        row.map(PaymentRecord::try_from).transpose()
    }

    async fn find_by_transaction_id(
        &self,
        method: PaymentMethod,
        transaction_id: &str,
    ) -> Result<Option<PaymentRecord>, DomainError> {
        let row: Option<PaymentRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM payments
            WHERE payment_method = $1 AND transaction_id = $2
            ORDER BY created_at DESC
            LIMIT 1
            "#,
            PAYMENT_COLUMNS
        ))
        .bind(method.as_str())
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to find payment by transaction id"))?;

        row.map(PaymentRecord::try_from).transpose()
    }

    async fn find_by_notes_fragment(
        &self,
        method: PaymentMethod,
        fragment: &str,
    ) -> Result<Option<PaymentRecord>, DomainError> {
        if fragment.is_empty() {
            return Ok(None);
        }

        // strpos instead of LIKE so '%' and '_' in processor ids match literally.
        let row: Option<PaymentRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM payments
            WHERE payment_method = $1 AND strpos(notes, $2) > 0
            ORDER BY created_at DESC
            LIMIT 1
            "#,
            PAYMENT_COLUMNS
        ))
        .bind(method.as_str())
        .bind(fragment)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to search payment notes"))?;

        row.map(PaymentRecord::try_from).transpose()
    }

    async fn list_pending(
        &self,
        created_after: Timestamp,
        limit: u32,
    ) -> Result<Vec<PaymentRecord>, DomainError> {
        let rows: Vec<PaymentRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM payments
            WHERE status = 'pending'
              AND payment_method IN ('stripe', 'mobile_money')
              AND created_at >= $1
            ORDER BY created_at ASC
            LIMIT $2
            "#,
            PAYMENT_COLUMNS
        ))
        .bind(created_after.as_datetime())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list pending payments"))?;

        rows.into_iter().map(PaymentRecord::try_from).collect()
    }

    async fn find_subscription_by_payment(
        &self,
        payment_id: &PaymentId,
    ) -> Result<Option<SubscriptionRecord>, DomainError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, plan_type, expires_at, is_active, payment_id, created_at, activated_at
            FROM subscriptions
            WHERE payment_id = $1
            "#,
        )
        .bind(payment_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to find subscription"))?;

        row.map(SubscriptionRecord::try_from).transpose()
    }

    async fn compare_and_set_status(
        &self,
        transition: &StatusTransition,
    ) -> Result<CasResult, DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to start transaction"))?;

        let verified_at = (transition.target == PaymentStatus::Verified)
            .then(|| transition.at.as_datetime().to_owned());

        let result = sqlx::query(
            r#"
            UPDATE payments SET
                status = $2,
                verified_at = COALESCE($3, verified_at),
                notes = CASE
                    WHEN $4::TEXT IS NULL THEN notes
                    WHEN notes = '' THEN $4
                    ELSE notes || '; ' || $4
                END
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(transition.payment_id.as_uuid())
        .bind(transition.target.as_str())
        .bind(verified_at)
        .bind(note_entry(&transition.note))
        .execute(&mut *tx)
        .await
        .map_err(db_error("Failed to update payment status"))?;

        if result.rows_affected() == 0 {
            let current: Option<String> =
                sqlx::query_scalar("SELECT status FROM payments WHERE id = $1")
                    .bind(transition.payment_id.as_uuid())
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(db_error("Failed to read payment status"))?;

            return match current {
                Some(status) => Ok(CasResult::NotPending(
                    PaymentStatus::from_str(&status).map_err(corrupt("status"))?,
                )),
                None => Err(DomainError::new(
                    ErrorCode::PaymentNotFound,
                    format!("payment {} not found", transition.payment_id),
                )),
            };
        }

        let subscription = match &transition.activation {
            Some(activation) => {
                Some(activate_or_create(&mut tx, &transition.payment_id, activation).await?)
            }
            None => None,
        };

        tx.commit()
            .await
            .map_err(db_error("Failed to commit transaction"))?;

        Ok(CasResult::Applied { subscription })
    }
}
