mod api_keys;
mod catalog;
mod maintenance;
mod orphans;
mod phone_numbers;
mod sessions;

pub use api_keys::*;
pub use catalog::*;
pub use maintenance::*;
pub use orphans::*;
pub use phone_numbers::*;
pub use sessions::*;

/// Called with the normalized number once a reservation is written but
/// before it commits, so concurrent inbound messages know to wait for it.
pub type ReservationHook<'a> = &'a (dyn Fn(&str) + Send + Sync);
