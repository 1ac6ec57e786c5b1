//! Fetch and decode VMware guestinfo metadata and userdata.
//!
//! This crate implements the VMware provider of a guest bootstrap pipeline.
//! Running inside a VMware guest, it reads the platform-injected
//! `guestinfo.metadata` and `guestinfo.userdata` keys, decodes them according
//! to their sibling `.encoding` keys, persists the metadata and hands the
//! userdata to the caller.
//!
//! # Features
//!
//! - Two-phase contract: [`MetadataProvider::probe`] then [`MetadataProvider::extract`]
//! - Identity, `base64` and `gzip+base64` encodings
//! - Pluggable guest-info transport ([`GuestInfoClient`]) and platform check
//!   ([`VirtualizationOracle`])
//! - Optional limit on decoded payload size
//!
//! # Example
//!
//! ```ignore
//! use guestinfo_metadata::{MetadataError, MetadataProvider, VmwareProvider};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), MetadataError> {
//!     let provider = VmwareProvider::new();
//!
//!     if provider.probe().await? {
//!         // Writes /run/config/metadata and returns the userdata, if any.
//!         let userdata = provider.extract("/run/config".as_ref()).await?;
//!     }
//!
//!     // Or decode a single key
//!     let text: String = provider.fetch_text("guestinfo.userdata").await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Encodings
//!
//! | `.encoding` value | Transform |
//! |-------------------|-----------|
//! | unset / `" "` | trailing newline removed |
//! | `base64` | standard base64 |
//! | `gzip+base64` | base64, then gunzip |

mod client;
mod detect;
mod encoding;
mod error;
mod persist;
mod provider;
mod providers;

pub use client::{GuestInfoClient, MemoryClient, RpcToolClient, DEFAULT_RPCTOOL};
pub use detect::{DmiOracle, StaticOracle, VirtualizationOracle, DMI_ROOT};
pub use encoding::Encoding;
pub use error::{DecodeStage, MetadataError, TransportError};
pub use persist::{write_metadata, DEFAULT_CONFIG_DIR, METADATA_FILE, METADATA_MODE};
pub use provider::MetadataProvider;
pub use providers::vmware::{
    VmwareProvider, ENCODING_SUFFIX, GUEST_METADATA, GUEST_USERDATA, PROVIDER_NAME,
};
