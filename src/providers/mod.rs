//! Provider implementations.

pub mod vmware;
