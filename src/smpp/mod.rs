//! SMPP ingestion.
//!
//! Messages reach the gateway two ways:
//! - [`server`]: providers connect to our listener and push `submit_sm`
//! - [`client`]: we bind to each active provider and receive `deliver_sm`
//!
//! Both hand messages to [`crate::sms::InboundSmsHandler`].

pub mod client;
pub mod pdu;
pub mod server;
pub mod whitelist;

pub use client::spawn_provider_workers;
pub use pdu::{Pdu, PduBody, PduCodec, PduError, SmppStatus};
pub use server::{SmppServer, bind_listeners};
pub use whitelist::SmppWhitelist;

use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug, thiserror::Error)]
pub enum SmppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Pdu(#[from] PduError),

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("Bind rejected with {0}")]
    BindRejected(SmppStatus),

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Unexpected {0} while waiting for bind response")]
    UnexpectedPdu(&'static str),
}

impl SmppError {
    /// The provider refused our credentials.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            SmppError::BindRejected(SmppStatus::ESME_RBINDFAIL | SmppStatus::ESME_RINVPASWD)
        )
    }
}

/// Sequence numbers for PDUs we originate: 1..=0x7FFFFFFF, wrapping.
#[derive(Debug, Default)]
pub struct SequenceCounter(AtomicU32);

impl SequenceCounter {
    pub fn next(&self) -> u32 {
        let prev = self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(if n >= 0x7FFF_FFFF { 1 } else { n + 1 })
            })
            .unwrap_or_default();
        if prev >= 0x7FFF_FFFF { 1 } else { prev + 1 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_wraps() {
        let counter = SequenceCounter(AtomicU32::new(0x7FFF_FFFE));
        assert_eq!(counter.next(), 0x7FFF_FFFF);
        assert_eq!(counter.next(), 1);
        assert_eq!(counter.next(), 2);
        assert_eq!(SequenceCounter::default().next(), 1);
    }

    #[test]
    fn test_auth_failures() {
        assert!(SmppError::BindRejected(SmppStatus::ESME_RBINDFAIL).is_auth_failure());
        assert!(SmppError::BindRejected(SmppStatus::ESME_RINVPASWD).is_auth_failure());
        assert!(!SmppError::BindRejected(SmppStatus::ESME_RSYSERR).is_auth_failure());
        assert!(!SmppError::ConnectionClosed.is_auth_failure());
    }
}
