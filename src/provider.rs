//! The capability interface through which an atlas creates and copies its
//! backing resources.

use crate::image::AtlasDescriptor;

/// Creates and copies the layered image resources backing a
/// [`DynamicTextureAtlas`].
///
/// The atlas stores the resources a provider creates, but never the provider
/// itself: a provider is injected at the call sites that can grow the backing
/// resource ([`DynamicTextureAtlas::resource`] and
/// [`DynamicTextureAtlas::with_resource`]) and dropped when they return. This
/// matches the typical rendering-loop shape where the device and the command
/// encoder are only at hand at well-defined points in a frame.
///
/// [`DynamicTextureAtlas`]: crate::atlas::DynamicTextureAtlas
/// [`DynamicTextureAtlas::resource`]: crate::atlas::DynamicTextureAtlas::resource
/// [`DynamicTextureAtlas::with_resource`]: crate::atlas::DynamicTextureAtlas::with_resource
pub trait ResourceProvider {
    /// The resource type this provider creates.
    type Resource;

    /// The error returned when resource creation fails.
    type Error;

    /// Creates a layered image resource matching `descriptor`.
    ///
    /// `descriptor.array_layers` is the layer count the atlas has grown to;
    /// the remaining fields are the ones the atlas was created with.
    fn create_resource(
        &mut self,
        descriptor: &AtlasDescriptor,
    ) -> Result<Self::Resource, Self::Error>;

    /// Copies one mip level of one array layer from `src` to `dst`.
    ///
    /// Called once for every layer and mip level of the old resource after a
    /// larger resource has been created. `layer` and `mip_level` are in
    /// bounds of both resources.
    fn copy_layer(
        &mut self,
        src: &Self::Resource,
        dst: &mut Self::Resource,
        layer: u32,
        mip_level: u32,
    );
}
