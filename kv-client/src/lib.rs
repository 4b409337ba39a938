pub mod client;

pub use client::{ClientError, ClientResult, GetOutcome, KvClient};
