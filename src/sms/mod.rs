//! Inbound message processing: text decoding, code extraction and routing to
//! activation sessions.

mod code;
mod inbound;
mod pending;
mod text;

pub use code::parse_code;
pub use inbound::{InboundSms, InboundSmsHandler, service_keywords};
pub use pending::PendingSessions;
pub use text::{DATA_CODING_UCS2, decode_short_message};
