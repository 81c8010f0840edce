//! # umbra_render - GPU Light and Shadow-Map Registry
//!
//! CPU-side bookkeeping for dynamic lights and their shadow maps:
//! - Slot tables mirroring the GPU light and shadow-source buffers
//! - Tile atlas allocation for shadow maps
//! - Per-frame shadow update budget
//! - Fixed-size command records describing every GPU-state change
//!
//! ## Architecture
//!
//! The registry never touches a graphics API. Every mutation is described by
//! a [`CommandRecord`] queued on a [`CommandStream`]; once per frame the
//! stream is handed to a [`CommandUploader`] that copies the records into
//! GPU-visible memory, where a compute pass applies them.
//!
//! ## Example
//!
//! ```ignore
//! use umbra_render::prelude::*;
//!
//! let mut registry = LightRegistry::new(RegistryConfig::default())?;
//! let mut staging = StagingBuffer::default();
//!
//! let lamp = LightHandle::new(Light::point(Vec3::new(0.0, 3.0, 0.0), 10.0).with_shadows(512));
//! registry.attach(&lamp)?;
//!
//! // Once per frame
//! registry.set_camera_position(camera_position);
//! let stats = registry.tick(&mut staging)?;
//! for job in registry.render_jobs() {
//!     render_shadow_map(job.view_projection, job.region);
//! }
//!
//! registry.detach(&lamp)?;
//! ```

pub mod atlas;
pub mod command;
pub mod config;
pub mod error;
pub mod light;
pub mod registry;
pub mod scheduler;
pub mod source;
pub mod upload;

pub use atlas::{AtlasRegion, RegionUv, TileAtlas};
pub use command::{CommandKind, CommandRecord, CommandSink, CommandStream, IntPacking};
pub use config::{AtlasConfig, RegistryConfig, MAX_LIGHTS, MAX_SHADOW_SOURCES};
pub use error::{
    AtlasError, CommandError, ConfigError, LightError, RegistryError, Result, SchedulerError,
};
pub use light::{Light, LightHandle, LightKind, LightType, PointLight, SpotLight};
pub use registry::{Attachment, FrameStats, LightRegistry, RegistryStats, ShadowRenderJob};
pub use scheduler::UpdateScheduler;
pub use source::{BoundingSphere, ShadowSource};
pub use upload::{CommandUploader, StagingBuffer};

pub use glam::Vec3;

/// Prelude
pub mod prelude {
    pub use crate::atlas::{AtlasRegion, TileAtlas};
    pub use crate::command::{CommandKind, CommandRecord, CommandStream};
    pub use crate::config::RegistryConfig;
    pub use crate::error::{RegistryError, Result};
    pub use crate::light::{Light, LightHandle};
    pub use crate::registry::{FrameStats, LightRegistry, ShadowRenderJob};
    pub use crate::upload::{CommandUploader, StagingBuffer};
    pub use glam::Vec3;
}
