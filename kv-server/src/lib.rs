pub mod connection;
pub mod forward;
pub mod metrics;
pub mod server;

pub use connection::handle_connection;
pub use forward::forward_set;
pub use metrics::{LatencyHistogram, LatencyHistogramSnapshot, Metrics, MetricsSnapshot};
pub use server::{dispatch_command, run_listener, socket_addr, AppState, DispatchResponse};
