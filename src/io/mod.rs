//! Granule access and sidecar persistence

pub mod gring;
pub mod sidecar;
pub mod swath;

pub use gring::parse_gring_metadata;
pub use sidecar::{inspect_sidecar, sidecar_path, BinarySidecarStore, SidecarStore, SidecarSummary};
pub use swath::{MemorySwathReader, NativeGrid, ProductKind, ProductProfile, SwathReader};
