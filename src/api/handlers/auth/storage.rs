//! Database helpers for users, activation, and password-reset state.

use anyhow::{Context, Result};
use serde_json::json;
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use crate::api::email::{TEMPLATE_ACTIVATE_ACCOUNT, TEMPLATE_PASSWORD_RESET};
use crate::session::{PlanTier, Role, SyncStatus};

use super::state::AuthConfig;
use super::utils::{
    build_activation_url, build_reset_url, generate_token, hash_token, is_unique_violation,
};

/// Outcome when attempting to create a new user + activation record.
#[derive(Debug)]
pub(crate) enum SignupOutcome {
    Created,
    Conflict,
}

/// Outcome for a resend request (always 204 to avoid account probing).
#[derive(Debug)]
pub(crate) enum ResendOutcome {
    Queued,
    Cooldown,
    Noop,
}

/// A user row with claims-relevant fields decoded.
#[derive(Clone, Debug)]
pub(crate) struct UserRecord {
    pub(crate) id: Uuid,
    pub(crate) email: String,
    pub(crate) display_name: Option<String>,
    pub(crate) password_hash: String,
    pub(crate) status: String,
    pub(crate) role: Role,
    pub(crate) plan_tier: PlanTier,
    pub(crate) sync_status: SyncStatus,
    pub(crate) onboarding_completed: bool,
    pub(crate) totp_secret: Option<String>,
    pub(crate) totp_enabled: bool,
    pub(crate) billing_customer_id: Option<String>,
}

impl UserRecord {
    pub(crate) fn is_active(&self) -> bool {
        self.status == "active"
    }
}

const USER_COLUMNS: &str = r"
    id, email, display_name, password_hash, status,
    role, plan_tier, sync_status, onboarding_completed,
    totp_secret, totp_enabled, billing_customer_id
";

fn row_to_user(row: &sqlx::postgres::PgRow) -> UserRecord {
    // Unknown enum text degrades to the least-privileged value.
    let role: String = row.get("role");
    let plan_tier: String = row.get("plan_tier");
    let sync_status: String = row.get("sync_status");
    UserRecord {
        id: row.get("id"),
        email: row.get("email"),
        display_name: row.get("display_name"),
        password_hash: row.get("password_hash"),
        status: row.get("status"),
        role: Role::from_str(&role).unwrap_or(Role::Guest),
        plan_tier: PlanTier::from_str(&plan_tier).unwrap_or(PlanTier::Free),
        sync_status: SyncStatus::from_str(&sync_status).unwrap_or(SyncStatus::Idle),
        onboarding_completed: row.get("onboarding_completed"),
        totp_secret: row.get("totp_secret"),
        totp_enabled: row.get("totp_enabled"),
        billing_customer_id: row.get("billing_customer_id"),
    }
}

pub(crate) async fn lookup_user_by_email(
    pool: &PgPool,
    email: &str,
) -> Result<Option<UserRecord>> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1 LIMIT 1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = %query
    );
    let row = sqlx::query(&query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by email")?;
    Ok(row.as_ref().map(row_to_user))
}

pub(crate) async fn lookup_user_by_id(pool: &PgPool, user_id: Uuid) -> Result<Option<UserRecord>> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 LIMIT 1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = %query
    );
    let row = sqlx::query(&query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by id")?;
    Ok(row.as_ref().map(row_to_user))
}

pub(crate) async fn insert_user_and_activation(
    pool: &PgPool,
    email: &str,
    password_hash: &str,
    display_name: Option<&str>,
    config: &AuthConfig,
) -> Result<SignupOutcome> {
    // Transaction keeps user creation, activation token, and the outbox row
    // consistent even if something fails.
    let mut tx = pool.begin().await.context("begin signup transaction")?;

    let query = r"
        INSERT INTO users
            (email, password_hash, display_name)
        VALUES ($1, $2, $3)
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .bind(password_hash)
        .bind(display_name)
        .fetch_one(&mut *tx)
        .instrument(span)
        .await;

    let user_id: Uuid = match row {
        Ok(row) => row.get("id"),
        Err(err) => {
            if is_unique_violation(&err) {
                let _ = tx.rollback().await;
                return Ok(SignupOutcome::Conflict);
            }
            return Err(err).context("failed to insert user");
        }
    };

    let _token = insert_activation_records(&mut tx, user_id, email, config).await?;

    tx.commit().await.context("commit signup transaction")?;

    Ok(SignupOutcome::Created)
}

pub(crate) async fn insert_activation_records(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    email: &str,
    config: &AuthConfig,
) -> Result<String> {
    // Generate a raw token for the email link and store only its hash.
    let token = generate_token()?;
    let token_hash = hash_token(&token);

    let query = r"
        INSERT INTO email_activation_tokens
            (user_id, token_hash, expires_at)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(token_hash)
        .bind(config.email_token_ttl_seconds())
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to insert activation token")?;

    let activate_url = build_activation_url(config.base_url(), &token);
    enqueue_email(tx, email, TEMPLATE_ACTIVATE_ACCOUNT, &json!({
        "email": email,
        "activate_url": activate_url,
    }))
    .await?;

    Ok(token)
}

pub(crate) async fn enqueue_email(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    to_email: &str,
    template: &str,
    payload: &serde_json::Value,
) -> Result<()> {
    let payload_text = serde_json::to_string(payload).context("failed to serialize email payload")?;
    let query = r"
        INSERT INTO email_outbox (to_email, template, payload_json)
        VALUES ($1, $2, $3::jsonb)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(to_email)
        .bind(template)
        .bind(payload_text)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to insert email outbox row")?;
    Ok(())
}

pub(crate) async fn consume_activation_token(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    token_hash: &[u8],
) -> Result<bool> {
    // Mark the token consumed if still valid, then activate the user in the
    // same transaction.
    let query = r"
        UPDATE email_activation_tokens
        SET consumed_at = NOW()
        WHERE token_hash = $1
          AND consumed_at IS NULL
          AND expires_at > NOW()
        RETURNING user_id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to consume activation token")?;

    let Some(row) = row else {
        return Ok(false);
    };

    let user_id: Uuid = row.get("user_id");
    let query = r"
        UPDATE users
        SET status = 'active',
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to activate user")?;

    Ok(true)
}

pub(crate) async fn lookup_email_by_activation_hash(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    token_hash: &[u8],
) -> Result<Option<String>> {
    // Used for per-email rate limiting during activation.
    let query = r"
        SELECT users.email
        FROM email_activation_tokens
        JOIN users ON users.id = email_activation_tokens.user_id
        WHERE email_activation_tokens.token_hash = $1
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to lookup email for activation token")?;
    Ok(row.map(|row| row.get("email")))
}

pub(crate) async fn enqueue_resend_activation(
    pool: &PgPool,
    email: &str,
    config: &AuthConfig,
) -> Result<ResendOutcome> {
    // Resend is intentionally opaque: callers always get 204.
    let mut tx = pool.begin().await.context("begin resend transaction")?;

    let query = r"
        SELECT id, email, status
        FROM users
        WHERE email = $1
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(&mut *tx)
        .instrument(span)
        .await
        .context("failed to lookup user for resend")?;

    let Some(row) = row else {
        tx.commit().await.context("commit resend noop")?;
        return Ok(ResendOutcome::Noop);
    };

    let status: String = row.get("status");
    if status != "pending_verification" {
        tx.commit().await.context("commit resend noop")?;
        return Ok(ResendOutcome::Noop);
    }

    let user_id: Uuid = row.get("id");
    if resend_cooldown_active(&mut tx, user_id, config.resend_cooldown_seconds()).await? {
        tx.commit().await.context("commit resend cooldown")?;
        return Ok(ResendOutcome::Cooldown);
    }

    let email: String = row.get("email");
    let _ = insert_activation_records(&mut tx, user_id, &email, config).await?;
    tx.commit().await.context("commit resend enqueue")?;
    Ok(ResendOutcome::Queued)
}

async fn resend_cooldown_active(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    cooldown_seconds: i64,
) -> Result<bool> {
    // Cooldown prevents repeated resend requests from spamming the outbox.
    let query = r"
        SELECT 1
        FROM email_activation_tokens
        WHERE user_id = $1
          AND created_at > NOW() - ($2 * INTERVAL '1 second')
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .bind(cooldown_seconds)
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to check resend cooldown")?;
    Ok(row.is_some())
}

pub(crate) async fn enqueue_password_reset(
    pool: &PgPool,
    email: &str,
    config: &AuthConfig,
) -> Result<()> {
    // A missing or inactive account is a silent no-op.
    let mut tx = pool.begin().await.context("begin reset transaction")?;

    let query = r"
        SELECT id
        FROM users
        WHERE email = $1
          AND status = 'active'
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(&mut *tx)
        .instrument(span)
        .await
        .context("failed to lookup user for password reset")?;

    let Some(row) = row else {
        tx.commit().await.context("commit reset noop")?;
        return Ok(());
    };

    let user_id: Uuid = row.get("id");
    let token = generate_token()?;
    let token_hash = hash_token(&token);

    let query = r"
        INSERT INTO password_reset_tokens
            (user_id, token_hash, expires_at)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(token_hash)
        .bind(config.email_token_ttl_seconds())
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert password reset token")?;

    let reset_url = build_reset_url(config.base_url(), &token);
    enqueue_email(&mut tx, email, TEMPLATE_PASSWORD_RESET, &json!({
        "email": email,
        "reset_url": reset_url,
    }))
    .await?;

    tx.commit().await.context("commit reset enqueue")?;
    Ok(())
}

pub(crate) async fn consume_password_reset_token(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    token_hash: &[u8],
) -> Result<Option<Uuid>> {
    let query = r"
        UPDATE password_reset_tokens
        SET consumed_at = NOW()
        WHERE token_hash = $1
          AND consumed_at IS NULL
          AND expires_at > NOW()
        RETURNING user_id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to consume password reset token")?;
    Ok(row.map(|row| row.get("user_id")))
}

pub(crate) async fn update_password(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    password_hash: &str,
) -> Result<()> {
    let query = r"
        UPDATE users
        SET password_hash = $2,
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(password_hash)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to update password")?;
    Ok(())
}

pub(crate) async fn set_pending_totp_secret(
    pool: &PgPool,
    user_id: Uuid,
    secret_base32: &str,
) -> Result<()> {
    // Enrollment is pending until the first code verifies.
    let query = r"
        UPDATE users
        SET totp_secret = $2,
            totp_enabled = FALSE,
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(secret_base32)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to store pending TOTP secret")?;
    Ok(())
}

pub(crate) async fn confirm_totp(pool: &PgPool, user_id: Uuid) -> Result<()> {
    let query = r"
        UPDATE users
        SET totp_enabled = TRUE,
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to confirm TOTP enrollment")?;
    Ok(())
}

pub(crate) async fn clear_totp(pool: &PgPool, user_id: Uuid) -> Result<()> {
    let query = r"
        UPDATE users
        SET totp_secret = NULL,
            totp_enabled = FALSE,
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to disable TOTP")?;
    Ok(())
}
