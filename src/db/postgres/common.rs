use crate::{
    db::error::{DbError, DbResult},
    models::SessionStatus,
};

/// Decode a `sessions.status` SMALLINT.
pub fn parse_status(code: i16) -> DbResult<SessionStatus> {
    SessionStatus::from_code(i64::from(code))
        .ok_or_else(|| DbError::Internal(format!("Invalid session status in database: {}", code)))
}

/// Encode a status for a SMALLINT column.
pub fn status_code(status: SessionStatus) -> i16 {
    status.code() as i16
}

/// Decode a `providers.smpp_port` INTEGER.
pub fn parse_port(port: i32) -> DbResult<u16> {
    u16::try_from(port)
        .map_err(|_| DbError::Internal(format!("Invalid SMPP port in database: {}", port)))
}
