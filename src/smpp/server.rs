//! Inbound SMPP listener. Providers bind to us and push `submit_sm`.

use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::{codec::Framed, sync::CancellationToken, task::TaskTracker};

use super::{
    SmppError, SmppWhitelist,
    pdu::{Pdu, PduBody, PduCodec, ShortMessage, SmppStatus},
};
use crate::{
    config::SmppServerConfig,
    sms::{InboundSms, InboundSmsHandler},
};

/// Bind a listener on every configured port.
pub async fn bind_listeners(config: &SmppServerConfig) -> Result<Vec<TcpListener>, SmppError> {
    let mut listeners = Vec::new();
    for port in config.resolved_ports() {
        let addr = SocketAddr::new(config.bind_host, port);
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(address = %addr, "SMPP server listening");
        listeners.push(listener);
    }
    Ok(listeners)
}

#[derive(Clone)]
pub struct SmppServer {
    system_id: String,
    max_pdu_len: usize,
    whitelist: Arc<SmppWhitelist>,
    handler: InboundSmsHandler,
}

impl SmppServer {
    pub fn new(
        config: &SmppServerConfig,
        whitelist: Arc<SmppWhitelist>,
        handler: InboundSmsHandler,
    ) -> Self {
        Self {
            system_id: config.system_id.clone(),
            max_pdu_len: config.max_pdu_bytes,
            whitelist,
            handler,
        }
    }

    /// Accept connections on all listeners until cancelled.
    pub async fn serve(self, listeners: Vec<TcpListener>, cancel: CancellationToken) {
        let tracker = TaskTracker::new();
        for listener in listeners {
            let server = self.clone();
            let cancel = cancel.clone();
            let connections = tracker.clone();
            tracker.spawn(async move { server.accept_loop(listener, cancel, connections).await });
        }
        tracker.close();
        tracker.wait().await;
        tracing::info!("SMPP server stopped");
    }

    async fn accept_loop(
        self,
        listener: TcpListener,
        cancel: CancellationToken,
        connections: TaskTracker,
    ) {
        loop {
            let accepted = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => accepted,
            };
            let (stream, peer) = match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to accept SMPP connection");
                    continue;
                }
            };

            let peer_ip = peer.ip().to_canonical();
            if !self.whitelist.is_allowed(peer_ip) {
                tracing::warn!(peer = %peer, "Rejected SMPP connection from non-whitelisted address");
                drop(stream);
                continue;
            }

            tracing::info!(peer = %peer, "SMPP connection accepted");
            let server = self.clone();
            let cancel = cancel.clone();
            connections.spawn(async move {
                if let Err(e) = server.handle_connection(stream, peer_ip, cancel).await {
                    tracing::warn!(peer = %peer, error = %e, "SMPP connection ended with error");
                } else {
                    tracing::info!(peer = %peer, "SMPP connection closed");
                }
            });
        }
    }

    async fn handle_connection(
        &self,
        stream: TcpStream,
        peer_ip: IpAddr,
        cancel: CancellationToken,
    ) -> Result<(), SmppError> {
        let mut framed = Framed::new(stream, PduCodec::new(self.max_pdu_len));
        let mut bound_system_id: Option<String> = None;

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                next = framed.next() => next,
            };
            let pdu = match next {
                None => return Ok(()),
                Some(Ok(pdu)) => pdu,
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Invalid PDU, sending generic_nack");
                    framed
                        .send(Pdu::generic_nack(e.sequence_number(), e.status()))
                        .await?;
                    return Err(e.into());
                }
            };

            tracing::debug!(
                command = pdu.body.name(),
                sequence = pdu.sequence_number,
                "SMPP PDU received"
            );

            let reply = match &pdu.body {
                PduBody::Bind(kind, bind) => {
                    tracing::info!(system_id = %bind.system_id, kind = ?kind, "SMPP peer bound");
                    bound_system_id = Some(bind.system_id.clone());
                    Some(pdu.respond(
                        SmppStatus::ESME_ROK,
                        PduBody::BindResp {
                            kind: *kind,
                            system_id: self.system_id.clone(),
                        },
                    ))
                }
                PduBody::SubmitSm(sm) => {
                    let status = self
                        .receive(sm, bound_system_id.as_deref(), peer_ip)
                        .await;
                    Some(pdu.respond(
                        status,
                        PduBody::SubmitSmResp {
                            message_id: uuid::Uuid::new_v4().simple().to_string(),
                        },
                    ))
                }
                PduBody::DeliverSm(sm) => {
                    let status = self
                        .receive(sm, bound_system_id.as_deref(), peer_ip)
                        .await;
                    Some(pdu.respond(
                        status,
                        PduBody::DeliverSmResp {
                            message_id: String::new(),
                        },
                    ))
                }
                PduBody::EnquireLink => {
                    Some(pdu.respond(SmppStatus::ESME_ROK, PduBody::EnquireLinkResp))
                }
                PduBody::Unbind => {
                    framed
                        .send(pdu.respond(SmppStatus::ESME_ROK, PduBody::UnbindResp))
                        .await?;
                    tracing::info!(system_id = ?bound_system_id, "SMPP peer unbound");
                    return Ok(());
                }
                PduBody::GenericNack | PduBody::Unknown { .. } => Some(Pdu::generic_nack(
                    pdu.sequence_number,
                    SmppStatus::ESME_RINVCMDID,
                )),
                PduBody::BindResp { .. }
                | PduBody::SubmitSmResp { .. }
                | PduBody::DeliverSmResp { .. }
                | PduBody::UnbindResp
                | PduBody::EnquireLinkResp => None,
            };

            if let Some(reply) = reply {
                framed.send(reply).await?;
            }
        }
    }

    /// Status for a received short message.
    async fn receive(
        &self,
        sm: &ShortMessage,
        system_id: Option<&str>,
        peer_ip: IpAddr,
    ) -> SmppStatus {
        if system_id.is_none() {
            tracing::warn!("Message received before bind");
            return SmppStatus::ESME_RINVBNDSTS;
        }
        if sm.source_addr.trim().is_empty() || sm.destination_addr.trim().is_empty() {
            tracing::warn!("Message ignored: missing source or destination");
            return SmppStatus::ESME_ROK;
        }

        let sms = InboundSms {
            source_addr: sm.source_addr.clone(),
            destination_addr: sm.destination_addr.clone(),
            text: sm.text(),
            provider_id: None,
            client_ip: Some(peer_ip.to_string()),
            system_id: system_id.map(str::to_string),
        };
        let handler = self.handler.clone();
        match tokio::spawn(async move { handler.handle(sms).await }).await {
            Ok(status) => status,
            Err(e) => {
                tracing::error!(error = %e, "Inbound handler failed");
                SmppStatus::ESME_RINVSENDERID
            }
        }
    }
}
