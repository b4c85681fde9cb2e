use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use super::common::{parse_status, status_code};
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::{ReservationHook, SessionRepo},
    },
    models::{
        NewSmsMessage, OpenSession, RepeatReservation, Reservation, ReserveNumber,
        ServiceSmsCount, Session, SessionStatus, SmsMessage,
    },
};

pub struct PostgresSessionRepo {
    write_pool: PgPool,
    read_pool: PgPool,
}

impl PostgresSessionRepo {
    pub fn new(write_pool: PgPool, read_pool: Option<PgPool>) -> Self {
        let read_pool = read_pool.unwrap_or_else(|| write_pool.clone());
        Self {
            write_pool,
            read_pool,
        }
    }

    fn parse_session(row: &sqlx::postgres::PgRow) -> DbResult<Session> {
        Ok(Session {
            id: row.get("id"),
            phone_number: row.get("phone_number"),
            phone_number_id: row.get("phone_number_id"),
            service_id: row.get("service_id"),
            api_key_id: row.get("api_key_id"),
            status: parse_status(row.get("status"))?,
            created_at: row.get("created_at"),
        })
    }

    fn parse_sms(row: &sqlx::postgres::PgRow) -> SmsMessage {
        SmsMessage {
            id: row.get("id"),
            session_id: row.get("session_id"),
            source_addr: row.get("source_addr"),
            text: row.get("text"),
            code: row.get("code"),
            received_at: row.get("received_at"),
        }
    }

    async fn open_session(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        phone_number_id: i64,
        number: &str,
        service_id: i64,
        api_key_id: i64,
    ) -> DbResult<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO sessions (phone_number, phone_number_id, service_id, api_key_id, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(number)
        .bind(phone_number_id)
        .bind(service_id)
        .bind(api_key_id)
        .bind(status_code(SessionStatus::WaitCode))
        .bind(Utc::now())
        .fetch_one(&mut **tx)
        .await?;

        Ok(row.get("id"))
    }
}

#[async_trait]
impl SessionRepo for PostgresSessionRepo {
    async fn reserve_next(
        &self,
        input: ReserveNumber,
        on_reserved: ReservationHook<'_>,
    ) -> DbResult<Option<Reservation>> {
        let mut tx = self.write_pool.begin().await?;

        let row = sqlx::query(
            r#"
            UPDATE phone_numbers
            SET is_in_use = TRUE
            WHERE id = (
                SELECT id FROM phone_numbers
                WHERE country_id = $1 AND is_active AND NOT is_in_use
                  AND ($2::BIGINT IS NULL OR operator_id = $2)
                ORDER BY sort_order, id
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, number
            "#,
        )
        .bind(input.country_id)
        .bind(input.operator_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };

        let phone_number_id: i64 = row.get("id");
        let number: String = row.get("number");
        on_reserved(&number);

        let session_id = Self::open_session(
            &mut tx,
            phone_number_id,
            &number,
            input.service_id,
            input.api_key_id,
        )
        .await?;

        tx.commit().await?;

        Ok(Some(Reservation {
            session_id,
            phone_number_id,
            number,
        }))
    }

    async fn reserve_number(
        &self,
        number: &str,
        service_id: i64,
        api_key_id: i64,
        on_reserved: ReservationHook<'_>,
    ) -> DbResult<RepeatReservation> {
        let mut tx = self.write_pool.begin().await?;

        let row = sqlx::query(
            "SELECT id, is_in_use FROM phone_numbers WHERE number = $1 FOR UPDATE",
        )
        .bind(number)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(RepeatReservation::UnknownNumber);
        };
        if row.get::<bool, _>("is_in_use") {
            tx.rollback().await?;
            return Ok(RepeatReservation::Busy);
        }

        let phone_number_id: i64 = row.get("id");
        sqlx::query("UPDATE phone_numbers SET is_in_use = TRUE WHERE id = $1")
            .bind(phone_number_id)
            .execute(&mut *tx)
            .await?;
        on_reserved(number);

        let session_id =
            Self::open_session(&mut tx, phone_number_id, number, service_id, api_key_id).await?;

        tx.commit().await?;

        Ok(RepeatReservation::Reserved(Reservation {
            session_id,
            phone_number_id,
            number: number.to_string(),
        }))
    }

    async fn get(&self, id: i64) -> DbResult<Option<Session>> {
        let row = sqlx::query(
            r#"
            SELECT id, phone_number, phone_number_id, service_id, api_key_id, status, created_at
            FROM sessions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.write_pool)
        .await?;

        row.as_ref().map(Self::parse_session).transpose()
    }

    async fn get_for_api_key(&self, id: i64, api_key_id: i64) -> DbResult<Option<Session>> {
        // Polled right after getNumber; read from the primary.
        let row = sqlx::query(
            r#"
            SELECT id, phone_number, phone_number_id, service_id, api_key_id, status, created_at
            FROM sessions
            WHERE id = $1 AND api_key_id = $2
            "#,
        )
        .bind(id)
        .bind(api_key_id)
        .fetch_optional(&self.write_pool)
        .await?;

        row.as_ref().map(Self::parse_session).transpose()
    }

    async fn set_status(
        &self,
        id: i64,
        status: SessionStatus,
        release_number: bool,
    ) -> DbResult<()> {
        let mut tx = self.write_pool.begin().await?;

        let row =
            sqlx::query("UPDATE sessions SET status = $1 WHERE id = $2 RETURNING phone_number_id")
                .bind(status_code(status))
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(DbError::NotFound)?;

        let phone_number_id: Option<i64> = row.get("phone_number_id");
        if release_number && let Some(phone_number_id) = phone_number_id {
            sqlx::query("UPDATE phone_numbers SET is_in_use = FALSE WHERE id = $1")
                .bind(phone_number_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_open_by_phone(&self, number: &str) -> DbResult<Vec<OpenSession>> {
        let rows = sqlx::query(
            r#"
            SELECT s.id, s.service_id, s.created_at, sv.code AS service_code, sv.name AS service_name
            FROM sessions s
            JOIN services sv ON sv.id = s.service_id
            WHERE s.phone_number = $1 AND s.status IN ($2, $3)
            ORDER BY s.created_at DESC, s.id DESC
            "#,
        )
        .bind(number)
        .bind(status_code(SessionStatus::WaitCode))
        .bind(status_code(SessionStatus::WaitRetry))
        .fetch_all(&self.write_pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| OpenSession {
                id: row.get("id"),
                service_id: row.get("service_id"),
                service_code: row.get("service_code"),
                service_name: row.get("service_name"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    async fn sender_names(&self, service_id: i64) -> DbResult<Vec<String>> {
        let rows =
            sqlx::query("SELECT name FROM allowed_senders WHERE service_id = $1 ORDER BY id")
                .bind(service_id)
                .fetch_all(&self.read_pool)
                .await?;

        Ok(rows.iter().map(|row| row.get("name")).collect())
    }

    async fn record_sms(&self, input: NewSmsMessage) -> DbResult<SmsMessage> {
        let mut tx = self.write_pool.begin().await?;

        let row = sqlx::query(
            r#"
            INSERT INTO sms_messages (session_id, source_addr, text, code, received_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, session_id, source_addr, text, code, received_at
            "#,
        )
        .bind(input.session_id)
        .bind(&input.source_addr)
        .bind(&input.text)
        .bind(&input.code)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        // A session closed since matching keeps its final status.
        sqlx::query("UPDATE sessions SET status = $1 WHERE id = $2 AND status IN ($3, $4)")
            .bind(status_code(SessionStatus::CodeReceived))
            .bind(input.session_id)
            .bind(status_code(SessionStatus::WaitCode))
            .bind(status_code(SessionStatus::WaitRetry))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Self::parse_sms(&row))
    }

    async fn latest_sms(&self, session_id: i64) -> DbResult<Option<SmsMessage>> {
        let row = sqlx::query(
            r#"
            SELECT id, session_id, source_addr, text, code, received_at
            FROM sms_messages
            WHERE session_id = $1
            ORDER BY received_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.write_pool)
        .await?;

        Ok(row.as_ref().map(Self::parse_sms))
    }

    async fn list_sms(&self, session_id: i64) -> DbResult<Vec<SmsMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT id, session_id, source_addr, text, code, received_at
            FROM sms_messages
            WHERE session_id = $1
            ORDER BY received_at DESC, id DESC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.write_pool)
        .await?;

        Ok(rows.iter().map(Self::parse_sms).collect())
    }

    async fn sms_counts_by_service(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        api_key_id: Option<i64>,
    ) -> DbResult<Vec<ServiceSmsCount>> {
        let rows = sqlx::query(
            r#"
            SELECT s.api_key_id, sv.name AS service_name, COUNT(m.id) AS n
            FROM sms_messages m
            JOIN sessions s ON s.id = m.session_id
            JOIN services sv ON sv.id = s.service_id
            WHERE m.received_at >= $1 AND m.received_at < $2
              AND s.api_key_id IS NOT NULL
              AND ($3::BIGINT IS NULL OR s.api_key_id = $3)
            GROUP BY s.api_key_id, sv.name
            ORDER BY s.api_key_id, n DESC, sv.name
            "#,
        )
        .bind(start)
        .bind(end)
        .bind(api_key_id)
        .fetch_all(&self.read_pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| ServiceSmsCount {
                api_key_id: row.get("api_key_id"),
                service_name: row.get("service_name"),
                count: row.get("n"),
            })
            .collect())
    }
}
