use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Activation session status, using the SMS-Activate numeric codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum SessionStatus {
    /// Number issued, waiting for a message.
    WaitCode,
    /// A message was matched to the session.
    CodeReceived,
    /// The reseller asked for another code.
    WaitRetry,
    Finished,
    Cancelled,
}

impl SessionStatus {
    pub const OPEN: [SessionStatus; 2] = [SessionStatus::WaitCode, SessionStatus::WaitRetry];

    pub fn code(self) -> i64 {
        match self {
            SessionStatus::WaitCode => 1,
            SessionStatus::CodeReceived => 2,
            SessionStatus::WaitRetry => 3,
            SessionStatus::Finished => 6,
            SessionStatus::Cancelled => 8,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(SessionStatus::WaitCode),
            2 => Some(SessionStatus::CodeReceived),
            3 => Some(SessionStatus::WaitRetry),
            6 => Some(SessionStatus::Finished),
            8 => Some(SessionStatus::Cancelled),
            _ => None,
        }
    }

    /// Open sessions accept inbound messages.
    pub fn is_open(self) -> bool {
        Self::OPEN.contains(&self)
    }

    pub fn is_closed(self) -> bool {
        matches!(self, SessionStatus::Finished | SessionStatus::Cancelled)
    }
}

impl TryFrom<i64> for SessionStatus {
    type Error = String;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or_else(|| format!("invalid session status: {code}"))
    }
}

impl From<SessionStatus> for i64 {
    fn from(status: SessionStatus) -> Self {
        status.code()
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// An activation: a number rented for one service by one API key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub id: i64,
    pub phone_number: String,
    pub phone_number_id: Option<i64>,
    pub service_id: i64,
    pub api_key_id: Option<i64>,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
}

/// An open session with the service data needed for message matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenSession {
    pub id: i64,
    pub service_id: i64,
    pub service_code: String,
    pub service_name: String,
    pub created_at: DateTime<Utc>,
}

/// Result of reserving a number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub session_id: i64,
    pub phone_number_id: i64,
    pub number: String,
}

/// Parameters for reserving the next free number.
#[derive(Debug, Clone)]
pub struct ReserveNumber {
    pub service_id: i64,
    pub country_id: i64,
    pub operator_id: Option<i64>,
    pub api_key_id: i64,
}

/// Outcome of reserving a specific number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepeatReservation {
    Reserved(Reservation),
    Busy,
    UnknownNumber,
}

/// A message matched to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SmsMessage {
    pub id: i64,
    pub session_id: i64,
    pub source_addr: String,
    pub text: String,
    pub code: Option<String>,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSmsMessage {
    pub session_id: i64,
    pub source_addr: String,
    pub text: String,
    pub code: Option<String>,
}


/// Admin tester: open a session on a chosen number.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CustomNumberSession {
    pub api_key_id: i64,
    #[validate(length(min = 1, max = 32))]
    pub number: String,
    /// Service code.
    #[validate(length(min = 1, max = 64))]
    pub service: String,
    /// Where to put the number when it is not in the pool yet.
    pub provider_id: Option<i64>,
    pub country_id: Option<i64>,
    pub operator_id: Option<i64>,
}

/// Admin tester: open a session on a fresh number generated from a mask.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct MaskNumberSession {
    pub api_key_id: i64,
    /// Digits with `X` placeholders.
    #[validate(length(min = 1, max = 32))]
    pub mask: String,
    #[validate(length(min = 1, max = 64))]
    pub service: String,
    pub country_id: i64,
}

/// A session opened from the admin tester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TesterSession {
    pub session_id: i64,
    pub number: String,
    pub provider_id: i64,
    /// What `getNumber` would have answered.
    pub reply: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionMessages {
    pub session: Session,
    /// Newest first.
    pub messages: Vec<SmsMessage>,
}
