//! Notifies the sibling agent runtime over its unix socket.
//!
//! The runtime serves plain HTTP/1.1 on `runtime-server.sock`; a change is
//! announced with `GET /command/new?kind=<kind>` and acknowledged with 200.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::application::ports::{RuntimeCommand, RuntimeNotifier};

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);
/// Upper bound on the response bytes read back.
const MAX_RESPONSE: u64 = 64 * 1024;

pub struct UnixSocketNotifier {
    socket_path: PathBuf,
}

impl UnixSocketNotifier {
    #[must_use]
    pub fn new(socket_path: PathBuf) -> Self {
        Self { socket_path }
    }

    #[cfg(unix)]
    async fn send(&self, command: RuntimeCommand) -> Result<String> {
        let mut stream = tokio::net::UnixStream::connect(&self.socket_path)
            .await
            .with_context(|| {
                format!("connecting to runtime at {}", self.socket_path.display())
            })?;

        let request = format!(
            "GET /command/new?kind={} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
            command.as_str()
        );
        stream
            .write_all(request.as_bytes())
            .await
            .context("sending runtime command")?;

        let mut response = Vec::new();
        (&mut stream)
            .take(MAX_RESPONSE)
            .read_to_end(&mut response)
            .await
            .context("reading runtime response")?;
        Ok(String::from_utf8_lossy(&response).into_owned())
    }

    #[cfg(not(unix))]
    async fn send(&self, _command: RuntimeCommand) -> Result<String> {
        anyhow::bail!("unix sockets are not supported here")
    }
}

/// Status code from an HTTP/1.x status line.
fn status_code(response: &str) -> Option<u16> {
    let line = response.lines().next()?;
    let mut parts = line.split_whitespace();
    parts.next().filter(|v| v.starts_with("HTTP/"))?;
    parts.next()?.parse().ok()
}

#[async_trait]
impl RuntimeNotifier for UnixSocketNotifier {
    async fn notify(&self, command: RuntimeCommand) -> Result<()> {
        let response = tokio::time::timeout(NOTIFY_TIMEOUT, self.send(command))
            .await
            .context("runtime did not answer in time")??;

        match status_code(&response) {
            Some(200) => {
                tracing::info!(kind = command.as_str(), "runtime notified");
                Ok(())
            }
            Some(code) => {
                let body = response.split("\r\n\r\n").nth(1).unwrap_or("").trim();
                anyhow::bail!("runtime rejected {} ({code}): {body}", command.as_str())
            }
            None => anyhow::bail!("malformed runtime response"),
        }
    }
}
