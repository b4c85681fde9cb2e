use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::ReservationHook;
use crate::{
    db::error::DbResult,
    models::{
        NewSmsMessage, OpenSession, RepeatReservation, Reservation, ReserveNumber,
        ServiceSmsCount, Session, SessionStatus, SmsMessage,
    },
};

#[async_trait]
pub trait SessionRepo: Send + Sync {
    /// Reserve the free number with the lowest `sort_order` (then id) and open
    /// a session on it. Concurrent callers never get the same number.
    ///
    /// Returns `None` when no number is available.
    async fn reserve_next(
        &self,
        input: ReserveNumber,
        on_reserved: ReservationHook<'_>,
    ) -> DbResult<Option<Reservation>>;

    /// Reserve a specific number again for a new session.
    async fn reserve_number(
        &self,
        number: &str,
        service_id: i64,
        api_key_id: i64,
        on_reserved: ReservationHook<'_>,
    ) -> DbResult<RepeatReservation>;

    async fn get(&self, id: i64) -> DbResult<Option<Session>>;

    /// A session, only if owned by `api_key_id`.
    async fn get_for_api_key(&self, id: i64, api_key_id: i64) -> DbResult<Option<Session>>;

    /// Update the status; with `release_number`, also free the session's number.
    async fn set_status(&self, id: i64, status: SessionStatus, release_number: bool)
    -> DbResult<()>;

    /// Open sessions on a number, newest first.
    async fn list_open_by_phone(&self, number: &str) -> DbResult<Vec<OpenSession>>;

    /// Allowed sender names of a service.
    async fn sender_names(&self, service_id: i64) -> DbResult<Vec<String>>;

    /// Store a matched message and mark its session as having a code.
    async fn record_sms(&self, input: NewSmsMessage) -> DbResult<SmsMessage>;

    /// Most recent message of a session.
    async fn latest_sms(&self, session_id: i64) -> DbResult<Option<SmsMessage>>;

    /// Every message of a session, newest first.
    async fn list_sms(&self, session_id: i64) -> DbResult<Vec<SmsMessage>>;

    /// Messages per (API key, service) received in `[start, end)`.
    async fn sms_counts_by_service(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        api_key_id: Option<i64>,
    ) -> DbResult<Vec<ServiceSmsCount>>;
}
