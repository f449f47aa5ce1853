use crate::error::{DelegateError, Result};
use tokio::net::TcpListener;
use tracing::debug;

/// First bindable loopback port at or above `base`.
///
/// The listener is released before returning, so the port is only a good
/// guess; callers acquire a fresh one per call and never reuse it.
pub async fn find_available_port(base: u16) -> Result<u16> {
    for port in base..=u16::MAX {
        match TcpListener::bind(("127.0.0.1", port)).await {
            Ok(listener) => {
                drop(listener);
                debug!(port, "found available port");
                return Ok(port);
            }
            Err(_) => continue,
        }
    }
    Err(DelegateError::discovery(
        format!("no free local port at or above {}", base),
        format!("127.0.0.1:{}-{}", base, u16::MAX),
        "Free up local ports or set RTDELEGATE_BASE_PORT to a lower value.",
    ))
}
