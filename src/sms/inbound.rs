//! Routing of inbound messages to activation sessions.
//!
//! Both SMPP paths (the listener receiving `submit_sm` and the client
//! workers receiving `deliver_sm`) hand messages to [`InboundSmsHandler`],
//! which answers with the SMPP status to send back to the peer.

use std::{
    sync::{Arc, LazyLock},
    time::Duration,
};

use regex::Regex;

use super::{PendingSessions, parse_code};
use crate::{
    config::MatchingConfig,
    db::{DbPool, DbResult},
    models::{NewOrphanSms, NewSmsMessage, OpenSession},
    phone::normalize_phone_number,
    smpp::SmppStatus,
};

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w+").expect("valid regex"));

/// A message received from an SMPP peer.
#[derive(Debug, Clone, Default)]
pub struct InboundSms {
    pub source_addr: String,
    pub destination_addr: String,
    pub text: String,
    /// Provider whose client worker received the message.
    pub provider_id: Option<i64>,
    pub client_ip: Option<String>,
    /// `system_id` the peer bound with.
    pub system_id: Option<String>,
}

#[derive(Clone)]
pub struct InboundSmsHandler {
    db: Arc<DbPool>,
    pending: PendingSessions,
    accept_any_service_codes: Arc<[String]>,
    lookup_attempts: u32,
    retry_delay: Duration,
}

impl InboundSmsHandler {
    pub fn new(db: Arc<DbPool>, matching: &MatchingConfig, pending: PendingSessions) -> Self {
        Self {
            db,
            pending,
            accept_any_service_codes: matching.accept_any_service_codes.clone().into(),
            lookup_attempts: matching.session_lookup_attempts.max(1),
            retry_delay: Duration::from_millis(matching.retry_delay_ms),
        }
    }

    /// Route one message. Never fails: database errors become `ESME_RSYSERR`.
    #[tracing::instrument(
        skip(self, sms),
        fields(
            source = %sms.source_addr,
            destination = %sms.destination_addr,
            provider_id = ?sms.provider_id,
        )
    )]
    pub async fn handle(&self, sms: InboundSms) -> SmppStatus {
        match self.route(&sms).await {
            Ok(status) => status,
            Err(e) => {
                tracing::error!(error = %e, "Failed to process inbound SMS");
                SmppStatus::ESME_RSYSERR
            }
        }
    }

    async fn route(&self, sms: &InboundSms) -> DbResult<SmppStatus> {
        let source = sms.source_addr.trim();
        let destination = normalize_phone_number(&sms.destination_addr);

        tracing::info!(
            text = %sms.text.replace(['\r', '\n'], " "),
            "Inbound SMS"
        );

        if destination.is_empty() {
            tracing::warn!("Destination has no digits, storing as orphan");
            self.save_orphan(sms.destination_addr.trim(), sms).await?;
            return Ok(SmppStatus::ESME_RINVDSTADR);
        }

        let sessions = self.find_open_sessions(&destination).await?;
        if sessions.is_empty() {
            tracing::warn!(number = %destination, "No open session, storing as orphan");
            self.save_orphan(&destination, sms).await?;
            return Ok(SmppStatus::ESME_RINVSENDERID);
        }

        let Some(session) = self.select_session(&sessions, source, &sms.text).await? else {
            tracing::warn!(
                number = %destination,
                open_sessions = sessions.len(),
                "Message matches no open session, storing as orphan"
            );
            self.save_orphan(&destination, sms).await?;
            return Ok(SmppStatus::ESME_RINVSENDERID);
        };

        let code = parse_code(&sms.text);
        self.db
            .sessions()
            .record_sms(NewSmsMessage {
                session_id: session.id,
                source_addr: source.to_string(),
                text: sms.text.clone(),
                code: code.clone(),
            })
            .await?;

        tracing::info!(
            session_id = session.id,
            service = %session.service_name,
            code = code.as_deref().unwrap_or(""),
            "Message matched to session"
        );
        Ok(SmppStatus::ESME_ROK)
    }

    /// Open sessions for `number`, newest first. Retries while a reservation
    /// for the number is in flight.
    async fn find_open_sessions(&self, number: &str) -> DbResult<Vec<OpenSession>> {
        let sessions = self.db.sessions();
        for attempt in 1..=self.lookup_attempts {
            let found = sessions.list_open_by_phone(number).await?;
            if !found.is_empty() {
                if attempt > 1 {
                    tracing::info!(number, attempt, "Session found after retry");
                }
                return Ok(found);
            }
            if attempt == self.lookup_attempts || !self.pending.is_pending(number) {
                break;
            }
            tracing::debug!(
                number,
                attempt,
                max_attempts = self.lookup_attempts,
                "Reservation pending, retrying session lookup"
            );
            tokio::time::sleep(self.retry_delay).await;
        }
        Ok(Vec::new())
    }

    async fn select_session<'a>(
        &self,
        sessions: &'a [OpenSession],
        source: &str,
        text: &str,
    ) -> DbResult<Option<&'a OpenSession>> {
        let text = text.to_lowercase();
        let source = source.to_lowercase();

        for session in sessions {
            if self
                .accept_any_service_codes
                .iter()
                .any(|code| code.eq_ignore_ascii_case(&session.service_code))
            {
                tracing::debug!(session_id = session.id, "Service accepts any message");
                return Ok(Some(session));
            }

            let senders = self.db.sessions().sender_names(session.service_id).await?;
            let keywords = service_keywords(&session.service_name, &senders);
            if keywords.is_empty() {
                tracing::warn!(service = %session.service_name, "Service has no keywords");
                continue;
            }
            if keywords
                .iter()
                .any(|kw| text.contains(kw.as_str()) || source.contains(kw.as_str()))
            {
                return Ok(Some(session));
            }
        }
        Ok(None)
    }

    async fn save_orphan(&self, number: &str, sms: &InboundSms) -> DbResult<()> {
        let known = if number.is_empty() {
            None
        } else {
            self.db.phone_numbers().get_by_number(number).await?
        };

        let orphan = self
            .db
            .orphans()
            .create(NewOrphanSms {
                phone_number: number.to_string(),
                source_addr: Some(sms.source_addr.trim().to_string()),
                text: sms.text.clone(),
                provider_id: known.as_ref().map(|n| n.provider_id).or(sms.provider_id),
                country_id: known.as_ref().map(|n| n.country_id),
                operator_id: known.as_ref().and_then(|n| n.operator_id),
                client_ip: sms.client_ip.clone(),
                system_id: sms.system_id.clone(),
            })
            .await?;

        tracing::info!(orphan_id = orphan.id, number, "Orphan SMS saved");
        Ok(())
    }
}

/// Lowercased word tokens of the service name plus lowercased sender names.
pub fn service_keywords(service_name: &str, sender_names: &[String]) -> Vec<String> {
    let name = service_name.to_lowercase();
    let mut keywords: Vec<String> = WORD
        .find_iter(&name)
        .map(|m| m.as_str().to_string())
        .collect();
    keywords.extend(
        sender_names
            .iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty()),
    );
    keywords.sort();
    keywords.dedup();
    keywords
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::tests::harness::{Fixture, numbers, seed_fixture, sqlite_db},
        models::{CreateService, ReserveNumber, SessionStatus},
    };

    #[test]
    fn test_service_keywords() {
        let keywords = service_keywords("Telegram Messenger", &["TGcode".into(), " ".into()]);
        assert_eq!(keywords, vec!["messenger", "telegram", "tgcode"]);
        assert_eq!(service_keywords("Вконтакте", &[]), vec!["вконтакте"]);
        assert!(service_keywords("--", &[]).is_empty());
    }

    async fn setup() -> (Arc<DbPool>, Fixture, InboundSmsHandler) {
        let db = Arc::new(sqlite_db().await);
        let fixture = seed_fixture(&db).await;
        db.phone_numbers()
            .insert_many(&numbers(&fixture, &["+79990000001"]))
            .await
            .unwrap();
        let handler = InboundSmsHandler::new(
            db.clone(),
            &MatchingConfig {
                retry_delay_ms: 10,
                ..Default::default()
            },
            PendingSessions::new(Duration::from_secs(5)),
        );
        (db, fixture, handler)
    }

    async fn open_session(db: &DbPool, fixture: &Fixture, service_id: i64) -> i64 {
        db.sessions()
            .reserve_next(
                ReserveNumber {
                    service_id,
                    country_id: fixture.country_id,
                    operator_id: None,
                    api_key_id: fixture.api_key_id,
                },
                &|_| {},
            )
            .await
            .unwrap()
            .unwrap()
            .session_id
    }

    fn sms(source: &str, destination: &str, text: &str) -> InboundSms {
        InboundSms {
            source_addr: source.into(),
            destination_addr: destination.into(),
            text: text.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_matched_by_service_name() {
        let (db, fixture, handler) = setup().await;
        let session_id = open_session(&db, &fixture, fixture.service_id).await;

        let status = handler
            .handle(sms("12345", "89990000001", "Telegram code: 55123"))
            .await;
        assert_eq!(status, SmppStatus::ESME_ROK);

        let latest = db.sessions().latest_sms(session_id).await.unwrap().unwrap();
        assert_eq!(latest.code.as_deref(), Some("55123"));
        let session = db
            .sessions()
            .get_for_api_key(session_id, fixture.api_key_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.status, SessionStatus::CodeReceived);
    }

    #[tokio::test]
    async fn test_matched_by_allowed_sender() {
        let (db, fixture, handler) = setup().await;
        open_session(&db, &fixture, fixture.service_id).await;

        let status = handler
            .handle(sms("TGcode", "+79990000001", "Your code 4411"))
            .await;
        assert_eq!(status, SmppStatus::ESME_ROK);
    }

    #[tokio::test]
    async fn test_unmatched_text_becomes_orphan() {
        let (db, fixture, handler) = setup().await;
        open_session(&db, &fixture, fixture.service_id).await;

        let status = handler
            .handle(sms("Bank", "+79990000001", "Your balance is 100"))
            .await;
        assert_eq!(status, SmppStatus::ESME_RINVSENDERID);

        // Numbers without an operator stay listed as unenriched.
        let orphans = db.orphans().list_unenriched(0, 10).await.unwrap();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].phone_number, "+79990000001");
        assert_eq!(orphans[0].provider_id, Some(fixture.provider_id));
        assert_eq!(orphans[0].country_id, Some(fixture.country_id));
    }

    #[tokio::test]
    async fn test_no_session_becomes_enriched_orphan() {
        let (db, fixture, handler) = setup().await;

        let mut message = sms("Telegram", "79990000001", "code 1234");
        message.client_ip = Some("10.0.0.5".into());
        message.system_id = Some("peer".into());
        let status = handler.handle(message).await;
        assert_eq!(status, SmppStatus::ESME_RINVSENDERID);

        let orphans = db.orphans().list_unenriched(0, 10).await.unwrap();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].phone_number, "+79990000001");
        assert_eq!(orphans[0].source_addr.as_deref(), Some("Telegram"));
        assert_eq!(orphans[0].provider_id, Some(fixture.provider_id));
        assert_eq!(orphans[0].country_id, Some(fixture.country_id));
        assert_eq!(orphans[0].client_ip.as_deref(), Some("10.0.0.5"));
        assert_eq!(orphans[0].system_id.as_deref(), Some("peer"));
    }

    #[tokio::test]
    async fn test_empty_destination() {
        let (db, _fixture, handler) = setup().await;
        let status = handler.handle(sms("x", "  ", "hello")).await;
        assert_eq!(status, SmppStatus::ESME_RINVDSTADR);
        assert_eq!(db.orphans().report(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_accept_any_service() {
        let (db, fixture, handler) = setup().await;
        let nitro = db
            .catalog()
            .create_service(CreateService {
                name: "Discord Nitro".into(),
                code: "nitro".into(),
            })
            .await
            .unwrap();
        let session_id = open_session(&db, &fixture, nitro.id).await;

        let status = handler
            .handle(sms("Unrelated", "+79990000001", "anything 9090"))
            .await;
        assert_eq!(status, SmppStatus::ESME_ROK);
        assert!(db.sessions().latest_sms(session_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_pending_reservation_retries_lookup() {
        let (db, fixture, _) = setup().await;
        let pending = PendingSessions::new(Duration::from_secs(5));
        let handler = InboundSmsHandler::new(
            db.clone(),
            &MatchingConfig {
                retry_delay_ms: 50,
                session_lookup_attempts: 10,
                ..Default::default()
            },
            pending.clone(),
        );
        pending.mark("+79990000001");

        let inbound = {
            let handler = handler.clone();
            tokio::spawn(async move {
                handler
                    .handle(sms("TGcode", "+79990000001", "code 7777"))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(120)).await;
        let session_id = open_session(&db, &fixture, fixture.service_id).await;

        assert_eq!(inbound.await.unwrap(), SmppStatus::ESME_ROK);
        let latest = db.sessions().latest_sms(session_id).await.unwrap().unwrap();
        assert_eq!(latest.code.as_deref(), Some("7777"));
    }
}
