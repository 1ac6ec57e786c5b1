//! Guest-info channel clients.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::error::{MetadataError, TransportError};

/// Default helper used to talk to the VMware backdoor.
pub const DEFAULT_RPCTOOL: &str = "vmware-rpctool";

/// Message the helper prints when a key is not set.
const NO_VALUE: &str = "No value found";

/// Key/value access to the hypervisor's guest-info channel.
pub trait GuestInfoClient: Send + Sync {
    /// Fetch the raw bytes of `key`, returning `default` when the key is not set.
    fn get(
        &self,
        key: &str,
        default: &str,
    ) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send;
}

/// Client backed by the `vmware-rpctool` helper process.
#[derive(Debug, Clone)]
pub struct RpcToolClient {
    program: PathBuf,
    timeout: Option<Duration>,
}

impl RpcToolClient {
    /// Create a client using `vmware-rpctool` from `PATH` and no timeout.
    pub fn new() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_RPCTOOL),
            timeout: None,
        }
    }

    /// Use a different helper binary.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Kill the helper and fail the fetch if it runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Get the helper binary.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Get the configured timeout.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl Default for RpcToolClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GuestInfoClient for RpcToolClient {
    async fn get(&self, key: &str, default: &str) -> Result<Vec<u8>, TransportError> {
        let mut command = Command::new(&self.program);
        command
            .arg(format!("info-get {key}"))
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, command.output())
                .await
                .map_err(|_| TransportError::new(key, format!("timed out after {timeout:?}")))?,
            None => command.output().await,
        }
        .map_err(|e| {
            TransportError::new(key, format!("failed to run {}: {e}", self.program.display()))
        })?;

        if output.status.success() {
            return Ok(output.stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        if stderr.contains(NO_VALUE) || stdout.contains(NO_VALUE) {
            return Ok(default.as_bytes().to_vec());
        }

        Err(TransportError::new(key, output.status.to_string()).with_diagnostic(stderr.trim_end()))
    }
}

/// In-memory guest-info store.
///
/// Useful for dry runs from a JSON snapshot and for tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryClient {
    values: HashMap<String, Vec<u8>>,
    failures: HashMap<String, TransportError>,
}

impl MemoryClient {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a store from a JSON object of string keys to string values.
    pub fn from_json(data: &[u8]) -> Result<Self, MetadataError> {
        let values: HashMap<String, String> = serde_json::from_slice(data)?;
        Ok(Self {
            values: values
                .into_iter()
                .map(|(key, value)| (key, value.into_bytes()))
                .collect(),
            failures: HashMap::new(),
        })
    }

    /// Set `key` to `value`.
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Make every fetch of `key` fail with `diagnostic` attached.
    pub fn with_failure(mut self, key: impl Into<String>, diagnostic: impl Into<String>) -> Self {
        let key = key.into();
        let error = TransportError::new(key.clone(), "exit status: 1").with_diagnostic(diagnostic);
        self.failures.insert(key, error);
        self
    }
}

impl GuestInfoClient for MemoryClient {
    async fn get(&self, key: &str, default: &str) -> Result<Vec<u8>, TransportError> {
        if let Some(error) = self.failures.get(key) {
            return Err(error.clone());
        }

        Ok(self
            .values
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.as_bytes().to_vec()))
    }
}
