//! Contract between metadata providers and the bootstrap framework.

use std::future::Future;
use std::path::Path;

use crate::error::MetadataError;

/// A source of guest metadata the bootstrap framework can select.
///
/// The framework calls [`probe`](MetadataProvider::probe) once and, if it
/// answers `true`, [`extract`](MetadataProvider::extract) once.
pub trait MetadataProvider: Send + Sync {
    /// Short identifier, e.g. `"VMWARE"`.
    fn name(&self) -> &'static str;

    /// Whether this provider is the active one for this host.
    ///
    /// An `Err` is never "not applicable": it is reserved for failures the
    /// caller must treat as fatal for the whole process (see
    /// [`MetadataError::is_fatal_probe`]).
    fn probe(&self) -> impl Future<Output = Result<bool, MetadataError>> + Send;

    /// Persist metadata into `config_dir` and return the userdata, if any.
    fn extract(
        &self,
        config_dir: &Path,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, MetadataError>> + Send;
}
