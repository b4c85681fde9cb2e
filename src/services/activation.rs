//! The reseller activation protocol served at `/stubs/handler_api.php`.
//!
//! Every outcome, including failures, is a reply string. Resellers parse the
//! body, not the HTTP status.

use std::{
    collections::{BTreeMap, HashSet},
    fmt,
    sync::Arc,
};

use rand::seq::SliceRandom;
use serde::Deserialize;

use super::numbers::{fill_mask, validate_mask};
use crate::{
    db::{DbError, DbPool, DbResult},
    models::{
        ApiKey, CustomNumberSession, MaskNumberSession, NewPhoneNumber, RepeatReservation,
        Reservation, ReserveNumber, Service, SessionMessages, SessionStatus, TesterSession,
        hash_api_key,
    },
    phone::{normalize_phone_number, strip_plus},
    sms::PendingSessions,
};

/// Query parameters of a handler API call. Numeric fields are kept as text
/// so a malformed value answers `BAD_ACTION` instead of a rejection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActivationRequest {
    pub api_key: Option<String>,
    pub action: Option<String>,
    pub service: Option<String>,
    pub country: Option<String>,
    pub operator: Option<String>,
    pub number: Option<String>,
    pub id: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationReply {
    Text(String),
    /// `getNumbersStatus`: available numbers keyed by `{service_code}_0`.
    NumbersStatus(BTreeMap<String, i64>),
}

impl ActivationReply {
    fn text(s: impl Into<String>) -> Self {
        ActivationReply::Text(s.into())
    }

    fn access_number(reservation: &Reservation) -> Self {
        ActivationReply::Text(format!(
            "ACCESS_NUMBER:{}:{}",
            reservation.session_id,
            strip_plus(&reservation.number)
        ))
    }
}

impl fmt::Display for ActivationReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivationReply::Text(s) => f.write_str(s),
            ActivationReply::NumbersStatus(counts) => {
                let json = serde_json::to_string(counts).map_err(|_| fmt::Error)?;
                f.write_str(&json)
            }
        }
    }
}

const BAD_ACTION: &str = "BAD_ACTION";

/// Candidates tried before a mask counts as exhausted.
const MASK_ATTEMPTS: usize = 20;

fn parse_int(value: Option<&str>) -> Option<i64> {
    value.and_then(|v| v.trim().parse().ok())
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Clone)]
pub struct ActivationService {
    db: Arc<DbPool>,
    pending: PendingSessions,
    balance: i64,
}

impl ActivationService {
    pub fn new(db: Arc<DbPool>, pending: PendingSessions, balance: i64) -> Self {
        Self {
            db,
            pending,
            balance,
        }
    }

    /// Answer one handler API call.
    #[tracing::instrument(skip(self, req), fields(action = req.action.as_deref().unwrap_or("")))]
    pub async fn handle(&self, req: &ActivationRequest) -> ActivationReply {
        match self.dispatch(req).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(error = %e, "Activation request failed");
                ActivationReply::text("ERROR_SQL")
            }
        }
    }

    async fn dispatch(&self, req: &ActivationRequest) -> DbResult<ActivationReply> {
        let Some(api_key) = self.authenticate(req.api_key.as_deref()).await? else {
            return Ok(ActivationReply::text("BAD_KEY"));
        };

        match req.action.as_deref().unwrap_or("") {
            "getBalance" => Ok(ActivationReply::Text(format!(
                "ACCESS_BALANCE:{}",
                self.balance
            ))),
            "getNumbersStatus" => self.numbers_status(req).await,
            "getNumber" => self.get_number(req, &api_key).await,
            "getRepeatNumber" => self.get_repeat_number(req, &api_key).await,
            "getStatus" => self.get_status(req, &api_key).await,
            "setStatus" => self.set_status(req, &api_key).await,
            _ => Ok(ActivationReply::text(BAD_ACTION)),
        }
    }

    async fn authenticate(&self, raw_key: Option<&str>) -> DbResult<Option<ApiKey>> {
        let Some(raw_key) = non_empty(raw_key) else {
            return Ok(None);
        };
        self.db
            .api_keys()
            .get_active_by_hash(&hash_api_key(raw_key))
            .await
    }

    async fn numbers_status(&self, req: &ActivationRequest) -> DbResult<ActivationReply> {
        let Some(country_id) = parse_int(req.country.as_deref()) else {
            return Ok(ActivationReply::text(BAD_ACTION));
        };
        let available = self.db.phone_numbers().count_available(country_id).await?;
        let counts = self
            .db
            .catalog()
            .list_services()
            .await?
            .into_iter()
            .map(|s| (format!("{}_0", s.code), available))
            .collect();
        Ok(ActivationReply::NumbersStatus(counts))
    }

    async fn get_number(
        &self,
        req: &ActivationRequest,
        api_key: &ApiKey,
    ) -> DbResult<ActivationReply> {
        let (Some(code), Some(country_id)) = (
            non_empty(req.service.as_deref()),
            parse_int(req.country.as_deref()),
        ) else {
            return Ok(ActivationReply::text(BAD_ACTION));
        };

        let catalog = self.db.catalog();
        let Some(service) = catalog.get_service_by_code(code).await? else {
            return Ok(ActivationReply::text("BAD_SERVICE"));
        };

        // Unknown operators fall back to any operator.
        let operator_id = match non_empty(req.operator.as_deref()) {
            Some(name) if name != "any" => catalog
                .find_operator(name, country_id)
                .await?
                .map(|op| op.id),
            _ => None,
        };

        let pending = self.pending.clone();
        let reservation = self
            .db
            .sessions()
            .reserve_next(
                ReserveNumber {
                    service_id: service.id,
                    country_id,
                    operator_id,
                    api_key_id: api_key.id,
                },
                &move |number: &str| pending.mark(number),
            )
            .await?;

        Ok(match reservation {
            Some(reservation) => {
                tracing::info!(
                    session_id = reservation.session_id,
                    service = %service.code,
                    "Number issued"
                );
                ActivationReply::access_number(&reservation)
            }
            None => ActivationReply::text("NO_NUMBERS"),
        })
    }

    async fn get_repeat_number(
        &self,
        req: &ActivationRequest,
        api_key: &ApiKey,
    ) -> DbResult<ActivationReply> {
        let Some(raw) = non_empty(req.number.as_deref()) else {
            return Ok(ActivationReply::text(BAD_ACTION));
        };
        let number = normalize_phone_number(raw);
        if number.is_empty() {
            return Ok(ActivationReply::text("BAD_NUMBER"));
        }

        let catalog = self.db.catalog();
        let requested = match non_empty(req.service.as_deref()) {
            Some(code) => catalog.get_service_by_code(code).await?,
            None => None,
        };
        let service = match requested {
            Some(service) => service,
            None => match catalog.first_service().await? {
                Some(service) => service,
                None => return Ok(ActivationReply::text("NO_SERVICES_IN_DB")),
            },
        };

        let pending = self.pending.clone();
        let outcome = self
            .db
            .sessions()
            .reserve_number(&number, service.id, api_key.id, &move |n: &str| {
                pending.mark(n)
            })
            .await?;

        Ok(match outcome {
            RepeatReservation::Reserved(reservation) => {
                tracing::info!(
                    session_id = reservation.session_id,
                    service = %service.code,
                    "Number issued again"
                );
                ActivationReply::access_number(&reservation)
            }
            RepeatReservation::Busy => ActivationReply::text("NUMBER_BUSY"),
            RepeatReservation::UnknownNumber => ActivationReply::text("BAD_NUMBER"),
        })
    }

    async fn get_status(
        &self,
        req: &ActivationRequest,
        api_key: &ApiKey,
    ) -> DbResult<ActivationReply> {
        let Some(id) = parse_int(req.id.as_deref()) else {
            return Ok(ActivationReply::text(BAD_ACTION));
        };
        let sessions = self.db.sessions();
        let Some(session) = sessions.get_for_api_key(id, api_key.id).await? else {
            return Ok(ActivationReply::text("NO_ACTIVATION"));
        };
        if session.status.is_closed() {
            return Ok(ActivationReply::text("STATUS_CANCEL"));
        }
        if let Some(code) = sessions.latest_sms(id).await?.and_then(|sms| sms.code) {
            return Ok(ActivationReply::Text(format!("STATUS_OK:{code}")));
        }
        Ok(ActivationReply::text(match session.status {
            SessionStatus::WaitRetry => "STATUS_WAIT_RETRY",
            _ => "STATUS_WAIT_CODE",
        }))
    }

    async fn set_status(
        &self,
        req: &ActivationRequest,
        api_key: &ApiKey,
    ) -> DbResult<ActivationReply> {
        let (Some(id), Some(code)) = (
            parse_int(req.id.as_deref()),
            parse_int(req.status.as_deref()),
        ) else {
            return Ok(ActivationReply::text(BAD_ACTION));
        };
        let sessions = self.db.sessions();
        if sessions.get_for_api_key(id, api_key.id).await?.is_none() {
            return Ok(ActivationReply::text("NO_ACTIVATION"));
        }

        let (status, release, reply) = match SessionStatus::from_code(code) {
            Some(SessionStatus::WaitRetry) => (SessionStatus::WaitRetry, false, "ACCESS_RETRY_GET"),
            Some(SessionStatus::Finished) => (SessionStatus::Finished, true, "ACCESS_ACTIVATION"),
            Some(SessionStatus::Cancelled) => (SessionStatus::Cancelled, true, "ACCESS_CANCEL"),
            _ => return Ok(ActivationReply::text(BAD_ACTION)),
        };
        sessions.set_status(id, status, release).await?;
        tracing::info!(session_id = id, status = code, "Session status changed");
        Ok(ActivationReply::text(reply))
    }

    /// Open a session on a chosen number, adding it to the pool first when
    /// it is unknown.
    pub async fn custom_number(&self, input: &CustomNumberSession) -> DbResult<TesterSession> {
        let api_key = self.tester_api_key(input.api_key_id).await?;
        let service = self.tester_service(&input.service).await?;
        let number = normalize_phone_number(&input.number);
        if number.is_empty() {
            return Err(DbError::Validation(format!(
                "invalid phone number: {}",
                input.number
            )));
        }

        let phone_numbers = self.db.phone_numbers();
        let provider_id = match phone_numbers.get_by_number(&number).await? {
            Some(existing) => existing.provider_id,
            None => {
                let (Some(provider_id), Some(country_id)) = (input.provider_id, input.country_id)
                else {
                    return Err(DbError::Validation(
                        "provider_id and country_id are required for a number not in the pool"
                            .into(),
                    ));
                };
                phone_numbers
                    .insert_many(&[NewPhoneNumber {
                        number: number.clone(),
                        provider_id,
                        country_id,
                        operator_id: input.operator_id,
                    }])
                    .await?;
                tracing::info!(number = %number, provider_id, country_id, "Tester number added");
                provider_id
            }
        };

        self.open_tester_session(&number, provider_id, &service, &api_key)
            .await
    }

    /// Generate an unused number from a mask, assign it to a random active
    /// provider that already has numbers in the country, and open a session.
    pub async fn number_by_mask(&self, input: &MaskNumberSession) -> DbResult<TesterSession> {
        let mask = input.mask.trim();
        validate_mask(mask)?;
        let api_key = self.tester_api_key(input.api_key_id).await?;
        let service = self.tester_service(&input.service).await?;

        let phone_numbers = self.db.phone_numbers();
        let in_country: HashSet<i64> = phone_numbers
            .provider_ids_in_country(input.country_id)
            .await?
            .into_iter()
            .collect();
        if in_country.is_empty() {
            return Err(DbError::Validation(format!(
                "country {} has no numbers to pick a provider from",
                input.country_id
            )));
        }
        let active: Vec<i64> = self
            .db
            .catalog()
            .list_active_providers()
            .await?
            .into_iter()
            .map(|p| p.id)
            .filter(|id| in_country.contains(id))
            .collect();
        let chosen = {
            let mut rng = rand::thread_rng();
            active.choose(&mut rng).copied()
        };
        let Some(provider_id) = chosen else {
            return Err(DbError::Validation(format!(
                "country {} has no active provider",
                input.country_id
            )));
        };

        let mut generated = None;
        for _ in 0..MASK_ATTEMPTS {
            let candidate = normalize_phone_number(&fill_mask(mask));
            if !candidate.is_empty() && phone_numbers.get_by_number(&candidate).await?.is_none() {
                generated = Some(candidate);
                break;
            }
        }
        let Some(number) = generated else {
            return Err(DbError::Conflict(format!(
                "no unused number for mask {mask} after {MASK_ATTEMPTS} attempts"
            )));
        };

        phone_numbers
            .insert_many(&[NewPhoneNumber {
                number: number.clone(),
                provider_id,
                country_id: input.country_id,
                operator_id: None,
            }])
            .await?;

        self.open_tester_session(&number, provider_id, &service, &api_key)
            .await
    }

    /// A session with every message it received.
    pub async fn session_messages(&self, session_id: i64) -> DbResult<SessionMessages> {
        let sessions = self.db.sessions();
        let session = sessions.get(session_id).await?.ok_or(DbError::NotFound)?;
        let messages = sessions.list_sms(session_id).await?;
        Ok(SessionMessages { session, messages })
    }

    async fn tester_api_key(&self, id: i64) -> DbResult<ApiKey> {
        self.db
            .api_keys()
            .list()
            .await?
            .into_iter()
            .find(|key| key.id == id && key.is_active)
            .ok_or_else(|| DbError::Validation(format!("API key {id} is unknown or inactive")))
    }

    async fn tester_service(&self, code: &str) -> DbResult<Service> {
        self.db
            .catalog()
            .get_service_by_code(code.trim())
            .await?
            .ok_or_else(|| DbError::Validation(format!("unknown service: {code}")))
    }

    async fn open_tester_session(
        &self,
        number: &str,
        provider_id: i64,
        service: &Service,
        api_key: &ApiKey,
    ) -> DbResult<TesterSession> {
        let pending = self.pending.clone();
        let outcome = self
            .db
            .sessions()
            .reserve_number(number, service.id, api_key.id, &move |n: &str| {
                pending.mark(n)
            })
            .await?;

        match outcome {
            RepeatReservation::Reserved(reservation) => {
                tracing::info!(
                    session_id = reservation.session_id,
                    service = %service.code,
                    "Tester session opened"
                );
                Ok(TesterSession {
                    session_id: reservation.session_id,
                    reply: ActivationReply::access_number(&reservation).to_string(),
                    number: reservation.number,
                    provider_id,
                })
            }
            RepeatReservation::Busy => Err(DbError::Conflict(format!("number {number} is in use"))),
            RepeatReservation::UnknownNumber => Err(DbError::NotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        db::tests::harness::{Fixture, numbers, seed_fixture, sqlite_db},
        models::{CreateApiKey, CreateOperator, NewPhoneNumber, NewSmsMessage, api_key_prefix, generate_api_key},
    };

    struct Setup {
        db: Arc<DbPool>,
        service: ActivationService,
        fixture: Fixture,
        key: String,
    }

    async fn setup() -> Setup {
        let db = sqlite_db().await;
        let fixture = seed_fixture(&db).await;
        let (key, hash) = generate_api_key();
        db.api_keys()
            .create(CreateApiKey::default(), &hash, api_key_prefix(&key))
            .await
            .unwrap();
        let db = Arc::new(db);
        let service = ActivationService::new(
            db.clone(),
            PendingSessions::new(Duration::from_secs(5)),
            9999,
        );
        Setup {
            db,
            service,
            fixture,
            key,
        }
    }

    fn request(key: &str, action: &str, params: &[(&str, &str)]) -> ActivationRequest {
        let mut req = ActivationRequest {
            api_key: Some(key.to_string()),
            action: Some(action.to_string()),
            ..Default::default()
        };
        for (name, value) in params {
            let value = Some(value.to_string());
            match *name {
                "service" => req.service = value,
                "country" => req.country = value,
                "operator" => req.operator = value,
                "number" => req.number = value,
                "id" => req.id = value,
                "status" => req.status = value,
                other => panic!("unknown parameter {other}"),
            }
        }
        req
    }

    async fn call(s: &Setup, action: &str, params: &[(&str, &str)]) -> String {
        s.service
            .handle(&request(&s.key, action, params))
            .await
            .to_string()
    }

    fn session_id(reply: &str) -> String {
        reply.split(':').nth(1).unwrap().to_string()
    }

    #[tokio::test]
    async fn test_bad_key() {
        let s = setup().await;
        let reply = s
            .service
            .handle(&request("0000", "getBalance", &[]))
            .await;
        assert_eq!(reply.to_string(), "BAD_KEY");

        let mut missing = request("", "getBalance", &[]);
        missing.api_key = None;
        assert_eq!(s.service.handle(&missing).await.to_string(), "BAD_KEY");
    }

    #[tokio::test]
    async fn test_balance_and_unknown_action() {
        let s = setup().await;
        assert_eq!(call(&s, "getBalance", &[]).await, "ACCESS_BALANCE:9999");
        assert_eq!(call(&s, "getPrices", &[]).await, "BAD_ACTION");
    }

    #[tokio::test]
    async fn test_numbers_status() {
        let s = setup().await;
        s.db.phone_numbers()
            .insert_many(&numbers(&s.fixture, &["+79990000001", "+79990000002"]))
            .await
            .unwrap();

        assert_eq!(call(&s, "getNumbersStatus", &[]).await, "BAD_ACTION");
        assert_eq!(
            call(&s, "getNumbersStatus", &[("country", "0")]).await,
            r#"{"tg_0":2}"#
        );
        assert_eq!(
            call(&s, "getNumbersStatus", &[("country", "5")]).await,
            r#"{"tg_0":0}"#
        );
    }

    #[tokio::test]
    async fn test_get_number_flow() {
        let s = setup().await;
        s.db.phone_numbers()
            .insert_many(&numbers(&s.fixture, &["+79990000001"]))
            .await
            .unwrap();

        assert_eq!(call(&s, "getNumber", &[("service", "tg")]).await, "BAD_ACTION");
        assert_eq!(
            call(&s, "getNumber", &[("service", "zz"), ("country", "0")]).await,
            "BAD_SERVICE"
        );

        let reply = call(&s, "getNumber", &[("service", "tg"), ("country", "0")]).await;
        assert!(reply.starts_with("ACCESS_NUMBER:"), "{reply}");
        assert!(reply.ends_with(":79990000001"), "{reply}");
        assert!(s.service.pending.is_pending("+79990000001"));

        assert_eq!(
            call(&s, "getNumber", &[("service", "tg"), ("country", "0")]).await,
            "NO_NUMBERS"
        );

        let id = session_id(&reply);
        assert_eq!(call(&s, "getStatus", &[("id", &id)]).await, "STATUS_WAIT_CODE");
        s.db.sessions()
            .record_sms(NewSmsMessage {
                session_id: id.parse().unwrap(),
                source_addr: "Telegram".into(),
                text: "Telegram code 12345".into(),
                code: Some("12345".into()),
            })
            .await
            .unwrap();
        assert_eq!(call(&s, "getStatus", &[("id", &id)]).await, "STATUS_OK:12345");

        assert_eq!(
            call(&s, "setStatus", &[("id", &id), ("status", "6")]).await,
            "ACCESS_ACTIVATION"
        );
        assert_eq!(call(&s, "getStatus", &[("id", &id)]).await, "STATUS_CANCEL");

        // Released, so it can be issued again.
        let again = call(&s, "getNumber", &[("service", "tg"), ("country", "0")]).await;
        assert!(again.ends_with(":79990000001"), "{again}");
    }

    #[tokio::test]
    async fn test_get_number_operator_filter() {
        let s = setup().await;
        let mts = s
            .db
            .catalog()
            .create_operator(CreateOperator {
                name: "mts".into(),
                country_id: s.fixture.country_id,
            })
            .await
            .unwrap();
        s.db.phone_numbers()
            .insert_many(&[
                NewPhoneNumber {
                    number: "+79990000001".into(),
                    provider_id: s.fixture.provider_id,
                    country_id: s.fixture.country_id,
                    operator_id: None,
                },
                NewPhoneNumber {
                    number: "+79990000002".into(),
                    provider_id: s.fixture.provider_id,
                    country_id: s.fixture.country_id,
                    operator_id: Some(mts.id),
                },
            ])
            .await
            .unwrap();

        let reply = call(
            &s,
            "getNumber",
            &[("service", "tg"), ("country", "0"), ("operator", "mts")],
        )
        .await;
        assert!(reply.ends_with(":79990000002"), "{reply}");

        // Unknown operator is ignored.
        let reply = call(
            &s,
            "getNumber",
            &[("service", "tg"), ("country", "0"), ("operator", "beeline")],
        )
        .await;
        assert!(reply.ends_with(":79990000001"), "{reply}");
    }

    #[tokio::test]
    async fn test_repeat_number() {
        let s = setup().await;
        s.db.phone_numbers()
            .insert_many(&numbers(&s.fixture, &["+79990000001"]))
            .await
            .unwrap();

        assert_eq!(call(&s, "getRepeatNumber", &[]).await, "BAD_ACTION");
        assert_eq!(
            call(&s, "getRepeatNumber", &[("number", "abc")]).await,
            "BAD_NUMBER"
        );
        assert_eq!(
            call(&s, "getRepeatNumber", &[("number", "79990000009")]).await,
            "BAD_NUMBER"
        );

        let reply = call(&s, "getRepeatNumber", &[("number", "89990000001")]).await;
        assert!(reply.ends_with(":79990000001"), "{reply}");
        assert_eq!(
            call(&s, "getRepeatNumber", &[("number", "+7 999 000-00-01")]).await,
            "NUMBER_BUSY"
        );
    }

    #[tokio::test]
    async fn test_repeat_number_without_services() {
        let db = sqlite_db().await;
        let (key, hash) = generate_api_key();
        db.api_keys()
            .create(CreateApiKey::default(), &hash, api_key_prefix(&key))
            .await
            .unwrap();
        let service = ActivationService::new(
            Arc::new(db),
            PendingSessions::new(Duration::from_secs(5)),
            9999,
        );
        let reply = service
            .handle(&request(&key, "getRepeatNumber", &[("number", "79990000001")]))
            .await;
        assert_eq!(reply.to_string(), "NO_SERVICES_IN_DB");
    }

    #[tokio::test]
    async fn test_set_status() {
        let s = setup().await;
        s.db.phone_numbers()
            .insert_many(&numbers(&s.fixture, &["+79990000001"]))
            .await
            .unwrap();
        let reply = call(&s, "getNumber", &[("service", "tg"), ("country", "0")]).await;
        let id = session_id(&reply);

        assert_eq!(call(&s, "setStatus", &[("id", &id)]).await, "BAD_ACTION");
        assert_eq!(
            call(&s, "setStatus", &[("id", "x"), ("status", "3")]).await,
            "BAD_ACTION"
        );
        assert_eq!(
            call(&s, "setStatus", &[("id", "999"), ("status", "3")]).await,
            "NO_ACTIVATION"
        );
        assert_eq!(
            call(&s, "setStatus", &[("id", &id), ("status", "1")]).await,
            "BAD_ACTION"
        );
        assert_eq!(
            call(&s, "setStatus", &[("id", &id), ("status", "3")]).await,
            "ACCESS_RETRY_GET"
        );
        assert_eq!(call(&s, "getStatus", &[("id", &id)]).await, "STATUS_WAIT_RETRY");
        assert_eq!(
            call(&s, "setStatus", &[("id", &id), ("status", "8")]).await,
            "ACCESS_CANCEL"
        );
        assert_eq!(
            s.db.phone_numbers().count_available(s.fixture.country_id).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_sessions_are_scoped_to_api_key() {
        let s = setup().await;
        s.db.phone_numbers()
            .insert_many(&numbers(&s.fixture, &["+79990000001"]))
            .await
            .unwrap();
        let reply = call(&s, "getNumber", &[("service", "tg"), ("country", "0")]).await;
        let id = session_id(&reply);

        let (other, hash) = generate_api_key();
        s.db.api_keys()
            .create(CreateApiKey::default(), &hash, api_key_prefix(&other))
            .await
            .unwrap();
        let reply = s
            .service
            .handle(&request(&other, "getStatus", &[("id", &id)]))
            .await;
        assert_eq!(reply.to_string(), "NO_ACTIVATION");
    }

    fn custom(s: &Setup, number: &str) -> CustomNumberSession {
        CustomNumberSession {
            api_key_id: s.fixture.api_key_id,
            number: number.into(),
            service: "tg".into(),
            provider_id: None,
            country_id: None,
            operator_id: None,
        }
    }

    #[tokio::test]
    async fn test_custom_number_adds_unknown_number() {
        let s = setup().await;

        let missing_origin = s.service.custom_number(&custom(&s, "8 999 000 00 07")).await;
        assert!(matches!(missing_origin, Err(DbError::Validation(_))));

        let opened = s
            .service
            .custom_number(&CustomNumberSession {
                provider_id: Some(s.fixture.provider_id),
                country_id: Some(s.fixture.country_id),
                ..custom(&s, "8 999 000 00 07")
            })
            .await
            .unwrap();
        assert_eq!(opened.number, "+79990000007");
        assert_eq!(opened.provider_id, s.fixture.provider_id);
        assert_eq!(
            opened.reply,
            format!("ACCESS_NUMBER:{}:79990000007", opened.session_id)
        );
        assert!(s.service.pending.is_pending("+79990000007"));

        let number = s
            .db
            .phone_numbers()
            .get_by_number("+79990000007")
            .await
            .unwrap()
            .unwrap();
        assert!(number.is_in_use);

        let busy = s.service.custom_number(&custom(&s, "+79990000007")).await;
        assert!(matches!(busy, Err(DbError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_custom_number_reuses_pool_number() {
        let s = setup().await;
        s.db.phone_numbers()
            .insert_many(&numbers(&s.fixture, &["+79990000001"]))
            .await
            .unwrap();

        let opened = s.service.custom_number(&custom(&s, "79990000001")).await.unwrap();
        assert_eq!(opened.number, "+79990000001");

        let session = s.db.sessions().get(opened.session_id).await.unwrap().unwrap();
        assert_eq!(session.api_key_id, Some(s.fixture.api_key_id));
        assert_eq!(session.service_id, s.fixture.service_id);

        for bad in [
            CustomNumberSession {
                service: "zz".into(),
                ..custom(&s, "79990000002")
            },
            CustomNumberSession {
                api_key_id: 9999,
                ..custom(&s, "79990000002")
            },
            custom(&s, "no digits"),
        ] {
            let result = s.service.custom_number(&bad).await;
            assert!(matches!(result, Err(DbError::Validation(_))), "{bad:?}");
        }
    }

    #[tokio::test]
    async fn test_number_by_mask() {
        let s = setup().await;
        let by_mask = |mask: &str| MaskNumberSession {
            api_key_id: s.fixture.api_key_id,
            mask: mask.into(),
            service: "tg".into(),
            country_id: s.fixture.country_id,
        };

        // No numbers in the country yet, so no provider to pick.
        let result = s.service.number_by_mask(&by_mask("7999111XXXX")).await;
        assert!(matches!(result, Err(DbError::Validation(_))));

        s.db.phone_numbers()
            .insert_many(&numbers(&s.fixture, &["+79990000001"]))
            .await
            .unwrap();
        let opened = s.service.number_by_mask(&by_mask("7999111XXXX")).await.unwrap();
        assert!(opened.number.starts_with("+7999111"), "{}", opened.number);
        assert_eq!(opened.number.len(), 12);
        assert_eq!(opened.provider_id, s.fixture.provider_id);
        assert!(opened.reply.starts_with("ACCESS_NUMBER:"));

        let session = s.db.sessions().get(opened.session_id).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::WaitCode);
        assert_eq!(session.phone_number, opened.number);

        let result = s.service.number_by_mask(&by_mask("79990000000")).await;
        assert!(matches!(result, Err(DbError::Validation(_))));
    }

    #[tokio::test]
    async fn test_number_by_mask_exhausted() {
        let s = setup().await;
        let taken: Vec<String> = (0..10).map(|d| format!("+7999000000{d}")).collect();
        let taken: Vec<&str> = taken.iter().map(String::as_str).collect();
        s.db.phone_numbers()
            .insert_many(&numbers(&s.fixture, &taken))
            .await
            .unwrap();

        let result = s
            .service
            .number_by_mask(&MaskNumberSession {
                api_key_id: s.fixture.api_key_id,
                mask: "7999000000X".into(),
                service: "tg".into(),
                country_id: s.fixture.country_id,
            })
            .await;
        assert!(matches!(result, Err(DbError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_session_messages() {
        let s = setup().await;
        s.db.phone_numbers()
            .insert_many(&numbers(&s.fixture, &["+79990000001"]))
            .await
            .unwrap();
        let reply = call(&s, "getNumber", &[("service", "tg"), ("country", "0")]).await;
        let id: i64 = session_id(&reply).parse().unwrap();

        let empty = s.service.session_messages(id).await.unwrap();
        assert_eq!(empty.session.id, id);
        assert!(empty.messages.is_empty());

        for code in ["1111", "2222"] {
            s.db.sessions()
                .record_sms(NewSmsMessage {
                    session_id: id,
                    source_addr: "TGcode".into(),
                    text: format!("code {code}"),
                    code: Some(code.into()),
                })
                .await
                .unwrap();
        }
        let full = s.service.session_messages(id).await.unwrap();
        let codes: Vec<_> = full.messages.iter().filter_map(|m| m.code.as_deref()).collect();
        assert_eq!(codes, vec!["2222", "1111"]);
        assert_eq!(full.session.status, SessionStatus::CodeReceived);

        assert!(matches!(
            s.service.session_messages(id + 100).await,
            Err(DbError::NotFound)
        ));
    }
}
