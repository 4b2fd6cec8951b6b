//! Dynamic, growable suballocation of 2D regions out of a layered texture
//! resource.
//!
//! - The [`DynamicTextureAtlas`] is the entry point. Callers request
//!   rectangular regions of a given size; the atlas finds or lazily creates a
//!   backing layer (*slice*) with enough free space, carves out a region, and
//!   hands back an [`AtlasSuballocation`] that returns the region to the pool
//!   when it is dropped.
//!
//! - Requests are rounded up to a power-of-two *alignment* derived from the
//!   configured minimum and the request's smaller dimension. Each slice is
//!   created for exactly one alignment and tracks its free space in units of
//!   that alignment, so similarly-sized requests are packed together and
//!   rarely fragment each other.
//!
//! - The backing resource grows transparently as slices are created. The
//!   atlas itself never talks to a device; a [`ResourceProvider`] is injected
//!   at the growth call site to create the new layered resource and copy the
//!   existing layers over. Every growth event bumps a version counter that
//!   consumers can compare to detect stale resource bindings.
//!
//! - Usage accounting (allocation count, allocated and used area) is kept in
//!   independent atomic counters and can be snapshotted at any time without
//!   taking any lock.
//!
//! [`DynamicTextureAtlas`]: crate::atlas::DynamicTextureAtlas
//! [`AtlasSuballocation`]: crate::atlas::AtlasSuballocation
//! [`ResourceProvider`]: crate::provider::ResourceProvider

pub mod atlas;
pub mod format;
pub mod image;
pub mod provider;

/// Represents texture memory size values. Analogous to the Rust `usize` type
/// on the host.
pub type DeviceSize = u64;
