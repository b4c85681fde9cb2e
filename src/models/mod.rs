mod api_key;
mod api_key_gen;
mod catalog;
mod orphan;
mod phone_number;
mod session;
mod stats;

pub use api_key::*;
pub use api_key_gen::*;
pub use catalog::*;
pub use orphan::*;
pub use phone_number::*;
pub use session::*;
pub use stats::*;
