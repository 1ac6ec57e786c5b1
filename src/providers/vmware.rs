//! VMware guestinfo provider.

use std::path::Path;

use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};

use crate::client::{GuestInfoClient, RpcToolClient};
use crate::detect::{DmiOracle, VirtualizationOracle};
use crate::encoding::Encoding;
use crate::error::{MetadataError, TransportError};
use crate::persist;
use crate::provider::MetadataProvider;

/// Name reported to the bootstrap framework.
pub const PROVIDER_NAME: &str = "VMWARE";

/// Guestinfo key holding the provider metadata.
pub const GUEST_METADATA: &str = "guestinfo.metadata";

/// Guestinfo key holding the operator's userdata.
pub const GUEST_USERDATA: &str = "guestinfo.userdata";

/// Suffix of the sibling key naming a value's encoding.
pub const ENCODING_SUFFIX: &str = ".encoding";

/// Userdata values that mean "present but empty".
const USERDATA_PLACEHOLDERS: [&[u8]; 2] = [b" ", b"---"];

/// Metadata provider reading VMware guestinfo keys.
///
/// # Example
///
/// ```ignore
/// use guestinfo_metadata::{MetadataProvider, VmwareProvider};
///
/// #[tokio::main]
/// async fn main() -> Result<(), guestinfo_metadata::MetadataError> {
///     let provider = VmwareProvider::new();
///     if provider.probe().await? {
///         let userdata = provider.extract("/run/config".as_ref()).await?;
///     }
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct VmwareProvider<C = RpcToolClient, O = DmiOracle> {
    client: C,
    oracle: O,
    max_size: Option<usize>,
}

impl VmwareProvider {
    /// Create a provider using `vmware-rpctool` and DMI detection.
    pub fn new() -> Self {
        Self::with_parts(RpcToolClient::new(), DmiOracle::new())
    }
}

impl Default for VmwareProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: GuestInfoClient, O: VirtualizationOracle> VmwareProvider<C, O> {
    /// Create a provider from an explicit transport and oracle.
    pub fn with_parts(client: C, oracle: O) -> Self {
        Self {
            client,
            oracle,
            max_size: None,
        }
    }

    /// Set the maximum size of a decoded value.
    ///
    /// Larger values fail with `MetadataError::TooLarge`.
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = Some(max_size);
        self
    }

    /// Get the guest-info transport.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Fetch `key` and its encoding tag, and decode the value.
    ///
    /// # Errors
    ///
    /// Transport failures are returned unchanged as
    /// `MetadataError::Transport`. An unrecognized tag is
    /// `MetadataError::UnknownEncoding`; a value the encoding rejects is
    /// `MetadataError::Decode`.
    pub async fn fetch(&self, key: &str) -> Result<Vec<u8>, MetadataError> {
        let raw = self.get(key).await?;
        let tag = self.get(&format!("{key}{ENCODING_SUFFIX}")).await?;

        let encoding = Encoding::from_tag(&String::from_utf8_lossy(&tag))?;
        debug!(key, %encoding, bytes = raw.len(), "decoding guest info");
        encoding.decode(key, &raw, self.max_size)
    }

    /// Fetch `key` as a UTF-8 string.
    ///
    /// # Errors
    ///
    /// Returns `MetadataError::Utf8` if the decoded value is not valid UTF-8.
    pub async fn fetch_text(&self, key: &str) -> Result<String, MetadataError> {
        let data = self.fetch(key).await?;
        String::from_utf8(data).map_err(|_| MetadataError::Utf8)
    }

    /// Fetch `key` and deserialize it as JSON.
    pub async fn fetch_json<T: DeserializeOwned>(&self, key: &str) -> Result<T, MetadataError> {
        let data = self.fetch(key).await?;
        serde_json::from_slice(&data).map_err(MetadataError::from)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, TransportError> {
        self.client.get(key, "").await.inspect_err(|e| {
            debug!(
                key,
                reason = %e.reason,
                diagnostic = e.diagnostic.as_deref().unwrap_or_default(),
                "getting guest info failed"
            );
        })
    }
}

impl<C: GuestInfoClient, O: VirtualizationOracle> MetadataProvider for VmwareProvider<C, O> {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn probe(&self) -> Result<bool, MetadataError> {
        let is_vm = self.oracle.is_virtual_world().await.map_err(|e| {
            error!(error = %e, "virtualization check failed");
            MetadataError::Oracle(e)
        })?;

        if !is_vm {
            error!("not in a virtual world");
            return Err(MetadataError::NotVirtualized);
        }

        match self.fetch(GUEST_USERDATA).await {
            Ok(userdata) => {
                let found = has_userdata(&userdata);
                info!(provider = PROVIDER_NAME, found, "probed for userdata");
                Ok(found)
            }
            Err(e) => {
                debug!(error = %e, "userdata not available");
                Ok(false)
            }
        }
    }

    async fn extract(&self, config_dir: &Path) -> Result<Option<Vec<u8>>, MetadataError> {
        // Metadata carries the host identity; without it there is nothing to boot.
        let metadata = self.fetch(GUEST_METADATA).await?;
        persist::write_metadata(config_dir, &metadata).await?;

        match self.fetch(GUEST_USERDATA).await {
            Ok(userdata) => Ok(Some(userdata)),
            Err(e) => {
                warn!(error = %e, "failed to get user-data");
                Ok(None)
            }
        }
    }
}

fn has_userdata(userdata: &[u8]) -> bool {
    !userdata.is_empty() && !USERDATA_PLACEHOLDERS.contains(&userdata)
}
