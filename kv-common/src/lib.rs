pub mod error;
pub mod types;

pub use error::HkvError;
pub use types::{Key, Ttl, Value, MAX_KEY_LEN, MAX_VALUE_LEN};
