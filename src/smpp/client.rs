//! Outbound SMPP client workers. One per active provider: bind as a
//! transceiver and receive `deliver_sm`.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::{codec::Framed, sync::CancellationToken, task::TaskTracker};

use super::{
    SequenceCounter, SmppError,
    pdu::{Bind, BindKind, Pdu, PduBody, PduCodec, SmppStatus},
};
use crate::{
    config::SmppClientConfig,
    db::{DbPool, DbResult},
    models::Provider,
    sms::{InboundSms, InboundSmsHandler},
};

/// SMPP 3.4
const INTERFACE_VERSION: u8 = 0x34;

type Connection = Framed<TcpStream, PduCodec>;

/// How a bound session ended without an error.
#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    Cancelled,
    PeerUnbound,
}

pub struct ProviderWorker {
    provider: Provider,
    config: SmppClientConfig,
    handler: InboundSmsHandler,
    sequence: SequenceCounter,
}

impl ProviderWorker {
    pub fn new(provider: Provider, config: SmppClientConfig, handler: InboundSmsHandler) -> Self {
        Self {
            provider,
            config,
            handler,
            sequence: SequenceCounter::default(),
        }
    }

    /// Connect, bind and receive until cancelled, reconnecting after failures.
    pub async fn run(self, cancel: CancellationToken) {
        let provider = &self.provider;
        tracing::info!(
            provider = %provider.name,
            host = %provider.smpp_host,
            port = provider.smpp_port,
            "Starting SMPP client worker"
        );

        loop {
            let delay = match self.session(&cancel).await {
                Ok(SessionEnd::Cancelled) => break,
                Ok(SessionEnd::PeerUnbound) => {
                    tracing::info!(provider = %provider.name, "Provider unbound, reconnecting");
                    Duration::from_secs(self.config.reconnect_delay_secs)
                }
                Err(e) if e.is_auth_failure() => {
                    tracing::error!(
                        provider = %provider.name,
                        error = %e,
                        delay_secs = self.config.auth_failure_delay_secs,
                        "Provider rejected credentials"
                    );
                    Duration::from_secs(self.config.auth_failure_delay_secs)
                }
                Err(e) => {
                    tracing::warn!(
                        provider = %provider.name,
                        error = %e,
                        delay_secs = self.config.reconnect_delay_secs,
                        "SMPP client session failed"
                    );
                    Duration::from_secs(self.config.reconnect_delay_secs)
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!(provider = %provider.name, "SMPP client worker stopped");
    }

    async fn session(&self, cancel: &CancellationToken) -> Result<SessionEnd, SmppError> {
        let connect_timeout = Duration::from_secs(self.config.connect_timeout_secs);
        let address = (self.provider.smpp_host.as_str(), self.provider.smpp_port);

        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(address))
            .await
            .map_err(|_| SmppError::Timeout("TCP connect"))??;
        let peer_ip = stream.peer_addr()?.ip().to_canonical();
        let mut conn = Framed::new(stream, PduCodec::default());

        tokio::time::timeout(connect_timeout, self.bind(&mut conn))
            .await
            .map_err(|_| SmppError::Timeout("bind_transceiver_resp"))??;
        tracing::info!(provider = %self.provider.name, "Bound to provider");

        let enquire_every = Duration::from_secs(self.config.enquire_link_secs);
        let mut enquire_link = tokio::time::interval_at(
            tokio::time::Instant::now() + enquire_every,
            enquire_every,
        );

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => {
                    let unbind = Pdu::request(self.sequence.next(), PduBody::Unbind);
                    if let Err(e) = conn.send(unbind).await {
                        tracing::debug!(error = %e, "Failed to send unbind");
                    }
                    return Ok(SessionEnd::Cancelled);
                }
                _ = enquire_link.tick() => {
                    conn.send(Pdu::request(self.sequence.next(), PduBody::EnquireLink)).await?;
                    continue;
                }
                next = conn.next() => next,
            };

            let pdu = match next {
                None => return Err(SmppError::ConnectionClosed),
                Some(pdu) => pdu?,
            };

            match &pdu.body {
                PduBody::DeliverSm(sm) => {
                    let status = if sm.is_delivery_receipt() {
                        tracing::debug!(provider = %self.provider.name, "Delivery receipt acknowledged");
                        SmppStatus::ESME_ROK
                    } else {
                        self.handler
                            .handle(InboundSms {
                                source_addr: sm.source_addr.clone(),
                                destination_addr: sm.destination_addr.clone(),
                                text: sm.text(),
                                provider_id: Some(self.provider.id),
                                client_ip: Some(peer_ip.to_string()),
                                system_id: Some(self.provider.system_id.clone()),
                            })
                            .await
                    };
                    conn.send(pdu.respond(
                        status,
                        PduBody::DeliverSmResp {
                            message_id: String::new(),
                        },
                    ))
                    .await?;
                }
                PduBody::EnquireLink => {
                    conn.send(pdu.respond(SmppStatus::ESME_ROK, PduBody::EnquireLinkResp))
                        .await?;
                }
                PduBody::Unbind => {
                    conn.send(pdu.respond(SmppStatus::ESME_ROK, PduBody::UnbindResp))
                        .await?;
                    return Ok(SessionEnd::PeerUnbound);
                }
                PduBody::GenericNack => {
                    tracing::warn!(
                        provider = %self.provider.name,
                        status = %pdu.command_status,
                        sequence = pdu.sequence_number,
                        "Provider sent generic_nack"
                    );
                }
                PduBody::EnquireLinkResp
                | PduBody::UnbindResp
                | PduBody::BindResp { .. }
                | PduBody::SubmitSmResp { .. }
                | PduBody::DeliverSmResp { .. } => {}
                PduBody::Bind(..) | PduBody::SubmitSm(_) | PduBody::Unknown { .. } => {
                    conn.send(Pdu::generic_nack(
                        pdu.sequence_number,
                        SmppStatus::ESME_RINVCMDID,
                    ))
                    .await?;
                }
            }
        }
    }

    /// Send `bind_transceiver` and wait for its response.
    async fn bind(&self, conn: &mut Connection) -> Result<(), SmppError> {
        let sequence = self.sequence.next();
        conn.send(Pdu::request(
            sequence,
            PduBody::Bind(
                BindKind::Transceiver,
                Bind {
                    system_id: self.provider.system_id.clone(),
                    password: self.provider.password.clone(),
                    system_type: self.provider.system_type.clone(),
                    interface_version: INTERFACE_VERSION,
                    ..Default::default()
                },
            ),
        ))
        .await?;

        while let Some(pdu) = conn.next().await {
            let pdu = pdu?;
            match &pdu.body {
                PduBody::BindResp { .. } if pdu.sequence_number == sequence => {
                    if pdu.command_status.is_ok() {
                        return Ok(());
                    }
                    return Err(SmppError::BindRejected(pdu.command_status));
                }
                PduBody::GenericNack => return Err(SmppError::BindRejected(pdu.command_status)),
                PduBody::EnquireLink => {
                    conn.send(pdu.respond(SmppStatus::ESME_ROK, PduBody::EnquireLinkResp))
                        .await?;
                }
                other => return Err(SmppError::UnexpectedPdu(other.name())),
            }
        }
        Err(SmppError::ConnectionClosed)
    }
}

/// Start a worker for every active provider. Returns the number started.
pub async fn spawn_provider_workers(
    db: &DbPool,
    config: &SmppClientConfig,
    handler: &InboundSmsHandler,
    cancel: &CancellationToken,
    tracker: &TaskTracker,
) -> DbResult<usize> {
    let providers = db.catalog().list_active_providers().await?;
    let count = providers.len();
    for provider in providers {
        let worker = ProviderWorker::new(provider, config.clone(), handler.clone());
        tracker.spawn(worker.run(cancel.clone()));
    }
    tracing::info!(workers = count, "SMPP client workers started");
    Ok(count)
}
