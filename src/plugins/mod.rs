//! Subsystems built on the core primitives.
//!
//! - `space_store`: per-Space graph storage with remote mirroring
//! - `spaces`: the Space registry and its lifecycle
//! - `share`: scoped share links
//! - `entitlements`: quota and feature gate
//! - `playground`: the onboarding Space

pub mod entitlements;
pub mod playground;
pub mod share;
pub mod space_store;
pub mod spaces;
