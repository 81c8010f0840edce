//! Lights
//!
//! Point and spot lights as seen by the registry. A light carries its common
//! attributes plus a [`LightKind`] with the type-specific data; per-type
//! behavior (shadow-source setup and command payload) is dispatched by
//! matching on the kind.
//!
//! # Ownership
//!
//! Lights are shared through a [`LightHandle`]. The caller keeps one handle,
//! the registry keeps another for as long as the light is attached, so a
//! light can never be dropped while it holds a slot.
//!
//! # Payload Layout
//!
//! After the common header written by [`Light::write_to_command`]:
//!
//! ```text
//! point: radius, inner_radius
//! spot:  radius, fov, direction(3)
//! ```

use std::fmt;
use std::sync::Arc;

use glam::Vec3;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::command::CommandRecord;
use crate::error::{CommandError, LightError};
use crate::source::ShadowSource;

/// Smallest shadow map resolution
pub const MIN_SHADOW_RESOLUTION: u32 = 32;
/// Largest shadow map resolution
pub const MAX_SHADOW_RESOLUTION: u32 = 16_384;
/// Smallest allowed near plane
pub const MIN_NEAR_PLANE: f32 = 1e-5;

/// Default shadow map resolution per source
pub const DEFAULT_SHADOW_RESOLUTION: u32 = 512;
/// Default shadow camera near plane
pub const DEFAULT_NEAR_PLANE: f32 = 0.5;

/// Cube face directions of a point light, in source order
const CUBE_DIRECTIONS: [Vec3; 6] = [
    Vec3::X,
    Vec3::NEG_X,
    Vec3::Y,
    Vec3::NEG_Y,
    Vec3::Z,
    Vec3::NEG_Z,
];

/// Light type tag written into light commands
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LightType {
    Empty = 0,
    Point = 1,
    Spot = 2,
}

/// Point light data
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointLight {
    /// Influence radius, also the shadow far plane
    pub radius: f32,
    /// Radius of the emitting sphere
    pub inner_radius: f32,
}

/// Spot light data
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpotLight {
    /// Influence radius, also the shadow far plane
    pub radius: f32,
    /// Full cone angle in degrees
    pub fov: f32,
    /// Normalized cone direction
    pub direction: Vec3,
}

/// Type-specific light data
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LightKind {
    Point(PointLight),
    Spot(SpotLight),
}

impl LightKind {
    /// Type tag
    pub fn light_type(&self) -> LightType {
        match self {
            LightKind::Point(_) => LightType::Point,
            LightKind::Spot(_) => LightType::Spot,
        }
    }

    /// Number of shadow sources a light of this kind owns
    pub fn source_count(&self) -> usize {
        match self {
            LightKind::Point(_) => CUBE_DIRECTIONS.len(),
            LightKind::Spot(_) => 1,
        }
    }
}

/// A dynamic light
#[derive(Clone, Debug)]
pub struct Light {
    kind: LightKind,
    position: Vec3,
    color: Vec3,
    energy: f32,
    near_plane: f32,
    ies_profile: Option<u32>,
    casts_shadows: bool,
    shadow_resolution: u32,
    needs_update: bool,
    slot: Option<usize>,
    shadow_sources: Vec<ShadowSource>,
}

impl Light {
    fn with_kind(kind: LightKind, position: Vec3) -> Self {
        Self {
            kind,
            position,
            color: Vec3::ONE,
            energy: 20.0,
            near_plane: DEFAULT_NEAR_PLANE,
            ies_profile: None,
            casts_shadows: false,
            shadow_resolution: DEFAULT_SHADOW_RESOLUTION,
            needs_update: false,
            slot: None,
            shadow_sources: Vec::new(),
        }
    }

    /// Create a point light
    pub fn point(position: Vec3, radius: f32) -> Self {
        Self::with_kind(
            LightKind::Point(PointLight {
                radius,
                inner_radius: 0.01,
            }),
            position,
        )
    }

    /// Create a spot light
    pub fn spot(position: Vec3, direction: Vec3, radius: f32, fov: f32) -> Self {
        Self::with_kind(
            LightKind::Spot(SpotLight {
                radius,
                fov,
                direction: direction.normalize_or_zero(),
            }),
            position,
        )
    }

    /// Set the color (builder)
    pub fn with_color(mut self, color: Vec3) -> Self {
        self.color = color;
        self
    }

    /// Set the energy (builder)
    pub fn with_energy(mut self, energy: f32) -> Self {
        self.energy = energy;
        self
    }

    /// Enable shadow casting (builder, for lights not yet attached)
    pub fn with_shadows(mut self, resolution: u32) -> Self {
        self.casts_shadows = true;
        self.shadow_resolution = resolution.clamp(MIN_SHADOW_RESOLUTION, MAX_SHADOW_RESOLUTION);
        self
    }

    /// Mark the light and all of its shadow sources dirty
    pub fn invalidate_shadows(&mut self) {
        self.needs_update = true;
        for source in &mut self.shadow_sources {
            source.set_needs_update(true);
        }
    }

    pub fn kind(&self) -> &LightKind {
        &self.kind
    }

    pub fn light_type(&self) -> LightType {
        self.kind.light_type()
    }

    /// Point light data, marking the light dirty
    pub fn as_point_mut(&mut self) -> Option<&mut PointLight> {
        match &mut self.kind {
            LightKind::Point(point) => {
                self.needs_update = true;
                Some(point)
            }
            LightKind::Spot(_) => None,
        }
    }

    /// Spot light data, marking the light dirty
    pub fn as_spot_mut(&mut self) -> Option<&mut SpotLight> {
        match &mut self.kind {
            LightKind::Spot(spot) => {
                self.needs_update = true;
                Some(spot)
            }
            LightKind::Point(_) => None,
        }
    }

    /// Influence radius
    pub fn radius(&self) -> f32 {
        match &self.kind {
            LightKind::Point(point) => point.radius,
            LightKind::Spot(spot) => spot.radius,
        }
    }

    pub fn set_radius(&mut self, radius: f32) {
        match &mut self.kind {
            LightKind::Point(point) => point.radius = radius,
            LightKind::Spot(spot) => spot.radius = radius,
        }
        self.needs_update = true;
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.needs_update = true;
    }

    pub fn color(&self) -> Vec3 {
        self.color
    }

    pub fn set_color(&mut self, color: Vec3) {
        self.color = color;
        self.needs_update = true;
    }

    pub fn energy(&self) -> f32 {
        self.energy
    }

    pub fn set_energy(&mut self, energy: f32) {
        self.energy = energy;
        self.needs_update = true;
    }

    pub fn ies_profile(&self) -> Option<u32> {
        self.ies_profile
    }

    /// Assign (or clear) the IES profile index
    pub fn set_ies_profile(&mut self, profile: Option<u32>) {
        self.ies_profile = profile;
        self.needs_update = true;
    }

    pub fn near_plane(&self) -> f32 {
        self.near_plane
    }

    pub fn set_near_plane(&mut self, near_plane: f32) -> Result<(), LightError> {
        if !(near_plane > MIN_NEAR_PLANE) {
            return Err(LightError::InvalidNearPlane(near_plane));
        }
        self.near_plane = near_plane;
        self.invalidate_shadows();
        Ok(())
    }

    pub fn casts_shadows(&self) -> bool {
        self.casts_shadows
    }

    /// Toggle shadow casting
    ///
    /// The number of shadow sources is fixed while attached, so this is only
    /// allowed on a detached light.
    pub fn set_casts_shadows(&mut self, casts_shadows: bool) -> Result<(), LightError> {
        if let Some(slot) = self.slot {
            return Err(LightError::Attached(slot));
        }
        self.casts_shadows = casts_shadows;
        Ok(())
    }

    pub fn shadow_resolution(&self) -> u32 {
        self.shadow_resolution
    }

    pub fn set_shadow_resolution(&mut self, resolution: u32) -> Result<(), LightError> {
        if !(MIN_SHADOW_RESOLUTION..=MAX_SHADOW_RESOLUTION).contains(&resolution) {
            return Err(LightError::InvalidResolution(resolution));
        }
        self.shadow_resolution = resolution;
        for source in &mut self.shadow_sources {
            source.set_resolution(resolution);
        }
        self.invalidate_shadows();
        Ok(())
    }

    pub fn needs_update(&self) -> bool {
        self.needs_update
    }

    pub fn set_needs_update(&mut self, needs_update: bool) {
        self.needs_update = needs_update;
    }

    /// Slot held while attached
    pub fn slot(&self) -> Option<usize> {
        self.slot
    }

    pub fn is_attached(&self) -> bool {
        self.slot.is_some()
    }

    pub(crate) fn assign_slot(&mut self, slot: usize) {
        self.slot = Some(slot);
    }

    pub(crate) fn remove_slot(&mut self) {
        self.slot = None;
    }

    pub fn shadow_sources(&self) -> &[ShadowSource] {
        &self.shadow_sources
    }

    pub(crate) fn shadow_sources_mut(&mut self) -> &mut [ShadowSource] {
        &mut self.shadow_sources
    }

    /// Create this light's shadow sources, replacing any existing ones
    pub(crate) fn init_shadow_sources(&mut self) {
        let count = self.kind.source_count();
        self.shadow_sources = (0..count)
            .map(|_| ShadowSource::new(self.shadow_resolution))
            .collect();
    }

    /// Recompute the view of every shadow source from the light's placement
    pub(crate) fn update_shadow_sources(&mut self) {
        let (position, near_plane) = (self.position, self.near_plane);
        match self.kind {
            LightKind::Point(point) => {
                for (source, direction) in self.shadow_sources.iter_mut().zip(CUBE_DIRECTIONS) {
                    source.set_perspective_lens(90.0, near_plane, point.radius, position, direction);
                }
            }
            LightKind::Spot(spot) => {
                for source in &mut self.shadow_sources {
                    source.set_perspective_lens(spot.fov, near_plane, spot.radius, position, spot.direction);
                }
            }
        }
    }

    pub(crate) fn clear_shadow_sources(&mut self) {
        self.shadow_sources.clear();
    }

    /// Slot of the first shadow source, if shadows are slotted
    pub fn first_source_slot(&self) -> Option<usize> {
        if !self.casts_shadows {
            return None;
        }
        self.shadow_sources.first().and_then(ShadowSource::slot)
    }

    /// Append the STORE_LIGHT payload (after the light slot)
    pub fn write_to_command(&self, cmd: &mut CommandRecord, energy_scale: f32) -> Result<(), CommandError> {
        cmd.push_int(self.light_type() as i32)?;
        cmd.push_int(self.ies_profile.map_or(-1, |profile| profile as i32))?;
        cmd.push_int(self.first_source_slot().map_or(-1, |slot| slot as i32))?;
        cmd.push_vec3(self.position)?;
        cmd.push_vec3(self.color * self.energy * energy_scale)?;

        match &self.kind {
            LightKind::Point(point) => {
                cmd.push_float(point.radius)?;
                cmd.push_float(point.inner_radius)
            }
            LightKind::Spot(spot) => {
                cmd.push_float(spot.radius)?;
                cmd.push_float(spot.fov)?;
                cmd.push_vec3(spot.direction)
            }
        }
    }
}

/// Shared handle to a light
///
/// Cloning the handle shares the light. The registry holds one clone per
/// attached light and drops it on detach.
#[derive(Clone)]
pub struct LightHandle(Arc<RwLock<Light>>);

impl LightHandle {
    pub fn new(light: Light) -> Self {
        Self(Arc::new(RwLock::new(light)))
    }

    /// Lock the light for reading
    pub fn read(&self) -> RwLockReadGuard<'_, Light> {
        self.0.read()
    }

    /// Lock the light for writing
    pub fn write(&self) -> RwLockWriteGuard<'_, Light> {
        self.0.write()
    }

    /// Check if two handles refer to the same light
    pub fn ptr_eq(&self, other: &LightHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Number of live handles to this light
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

impl From<Light> for LightHandle {
    fn from(light: Light) -> Self {
        Self::new(light)
    }
}

impl fmt::Debug for LightHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_read() {
            Some(light) => write!(f, "LightHandle({:?}, slot={:?})", light.light_type(), light.slot()),
            None => write!(f, "LightHandle(<locked>)"),
        }
    }
}
