use std::{io::ErrorKind, time::Duration};

use tokio::{process::Command, time::timeout};
use tracing::{debug, error};
use wgusage_common::messages::snapshot::Snapshot;

use crate::error::UsageError;

pub mod dump;

pub use dump::parse_dump;

/// Produces a snapshot of raw WireGuard counters for every interface on the host.
#[trait_variant::make(Send)]
pub trait SampleSource {
    async fn sample(&self) -> Result<Snapshot, UsageError>;
}

/// Samples counters by running `wg show all dump`.
#[derive(Clone, Debug)]
pub struct WgCommandSource {
    binary: String,
    timeout: Duration,
}

impl WgCommandSource {
    #[must_use]
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    async fn run(&self) -> Result<String, UsageError> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(["show", "all", "dump"]).kill_on_drop(true);

        let output = match timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) if err.kind() == ErrorKind::NotFound => {
                return Err(UsageError::SourceUnavailable(format!(
                    "{} not found, is wireguard-tools installed?",
                    self.binary
                )));
            }
            Ok(Err(err)) => {
                return Err(UsageError::SourceUnavailable(format!(
                    "failed to run {}: {err}",
                    self.binary
                )));
            }
            Err(_) => {
                return Err(UsageError::SourceUnavailable(format!(
                    "{} did not finish within {:?}",
                    self.binary, self.timeout
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("{} exited with {}: {}", self.binary, output.status, stderr.trim());
            return Err(UsageError::SourceUnavailable(format!(
                "{} exited with {}",
                self.binary, output.status
            )));
        }

        String::from_utf8(output.stdout).map_err(|err| {
            UsageError::MalformedSnapshot(format!("{} output is not UTF-8: {err}", self.binary))
        })
    }
}

impl SampleSource for WgCommandSource {
    async fn sample(&self) -> Result<Snapshot, UsageError> {
        debug!("Sampling WireGuard counters with {}", self.binary);
        let output = self.run().await?;
        let snapshot = parse_dump(&output)?;
        debug!(
            "Sampled {} interfaces with {} peers",
            snapshot.interfaces.len(),
            snapshot.peer_count()
        );
        Ok(snapshot)
    }
}
