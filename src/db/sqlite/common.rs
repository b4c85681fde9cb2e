use crate::{
    db::error::{DbError, DbResult},
    models::SessionStatus,
};

/// Decode a `sessions.status` column.
pub fn parse_status(code: i64) -> DbResult<SessionStatus> {
    SessionStatus::from_code(code)
        .ok_or_else(|| DbError::Internal(format!("Invalid session status in database: {}", code)))
}

/// Decode a `providers.smpp_port` column.
pub fn parse_port(port: i64) -> DbResult<u16> {
    u16::try_from(port)
        .map_err(|_| DbError::Internal(format!("Invalid SMPP port in database: {}", port)))
}

/// `?, ?, ?` for an `IN (...)` list.
pub fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}
