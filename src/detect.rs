//! Detection of the VMware virtual platform.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Default location of the firmware DMI identification files.
pub const DMI_ROOT: &str = "/sys/class/dmi/id";

/// Vendor string VMware reports through DMI.
const VMWARE_VENDOR: &str = "VMware";

/// DMI files inspected for the vendor string.
const DMI_FILES: [&str; 2] = ["sys_vendor", "product_name"];

/// Answers whether the current host is a VMware guest.
pub trait VirtualizationOracle: Send + Sync {
    /// `Ok(false)` means the check ran and this is not a VMware guest.
    fn is_virtual_world(&self) -> impl Future<Output = io::Result<bool>> + Send;
}

/// Oracle reading the DMI identification exported by the kernel.
#[derive(Debug, Clone)]
pub struct DmiOracle {
    root: PathBuf,
}

impl DmiOracle {
    /// Create an oracle reading from [`DMI_ROOT`].
    pub fn new() -> Self {
        Self::with_root(DMI_ROOT)
    }

    /// Create an oracle reading DMI files from `root` (for testing).
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Get the DMI directory.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Default for DmiOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualizationOracle for DmiOracle {
    async fn is_virtual_world(&self) -> io::Result<bool> {
        if !tokio::fs::try_exists(&self.root).await? {
            debug!(root = %self.root.display(), "no DMI information available");
            return Ok(false);
        }

        for name in DMI_FILES {
            let path = self.root.join(name);
            let value = match tokio::fs::read_to_string(&path).await {
                Ok(value) => value,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };

            if value.contains(VMWARE_VENDOR) {
                debug!(file = %path.display(), value = value.trim(), "found VMware DMI entry");
                return Ok(true);
            }
        }

        Ok(false)
    }
}

/// Oracle with a fixed answer, for dry runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticOracle(pub bool);

impl VirtualizationOracle for StaticOracle {
    async fn is_virtual_world(&self) -> io::Result<bool> {
        Ok(self.0)
    }
}
