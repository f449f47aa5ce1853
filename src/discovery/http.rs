use crate::error::{DelegateError, Result};
use crate::output::{parse_manifest, BuildDescription};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

pub const MANIFEST_PATH: &str = "/__/functions.yaml";
pub const QUIT_PATH: &str = "/__/quitquitquit";

const RETRY_INTERVAL: Duration = Duration::from_millis(200);

pub fn introspection_url(port: u16, path: &str) -> String {
    format!("http://localhost:{}{}", port, path)
}

/// Asks a live dev server for its trigger manifest.
///
/// Connection failures are retried until `limit` elapses, since the server
/// is usually still booting. An HTTP error status fails immediately.
pub async fn detect_from_port(port: u16, limit: Duration) -> Result<BuildDescription> {
    let url = introspection_url(port, MANIFEST_PATH);
    let client = reqwest::Client::builder()
        .timeout(limit)
        .build()
        .map_err(|e| {
            DelegateError::discovery(
                format!("could not build HTTP client: {}", e),
                url.as_str(),
                "This is likely an environment problem with TLS or proxy settings.",
            )
        })?;

    let deadline = Instant::now() + limit;
    let response = loop {
        match client.get(&url).send().await {
            Ok(response) => break response,
            Err(e) if Instant::now() + RETRY_INTERVAL < deadline => {
                debug!(url = %url, error = %e, "introspection server not ready, retrying");
                sleep(RETRY_INTERVAL).await;
            }
            Err(e) => {
                return Err(DelegateError::discovery(
                    format!(
                        "no response from the functions emulator within {}ms: {}",
                        limit.as_millis(),
                        e
                    ),
                    url.as_str(),
                    "Make sure the functions SDK is installed and the entry point loads without errors.",
                ));
            }
        }
    };

    let status = response.status();
    if !status.is_success() {
        return Err(DelegateError::discovery(
            format!("introspection request returned HTTP {}", status),
            url.as_str(),
            "The functions SDK failed to describe the code. Check the emulator output above for load errors.",
        ));
    }

    let body = response.text().await.map_err(|e| {
        DelegateError::discovery(
            format!("could not read introspection response: {}", e),
            url.as_str(),
            "Retry the command; if it keeps failing, the emulator is crashing mid-response.",
        )
    })?;

    parse_manifest(&body, &url)
}
