//! Shadow Sources
//!
//! A shadow source is one camera view that must be rendered into the shadow
//! atlas to produce (part of) a light's shadow. Sources are owned by their
//! light; the registry only refers to them by light and index.

use glam::{Mat4, Vec3, Vec4};

use crate::atlas::{AtlasRegion, RegionUv};
use crate::command::CommandRecord;
use crate::error::CommandError;

/// World-space bounding sphere
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl BoundingSphere {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Distance from `point` to the sphere surface (negative inside)
    pub fn distance_to(&self, point: Vec3) -> f32 {
        (self.center - point).length() - self.radius
    }
}

/// Pick an up vector that is not parallel to `direction`
fn find_up_vector(direction: Vec3) -> Vec3 {
    if direction.z.abs() > 0.9 {
        Vec3::Y
    } else {
        Vec3::Z
    }
}

/// One shadow-casting view of a light
#[derive(Clone, Debug)]
pub struct ShadowSource {
    slot: Option<usize>,
    resolution: u32,
    bounds: BoundingSphere,
    view_projection: Mat4,
    region: Option<AtlasRegion>,
    region_uv: RegionUv,
    needs_update: bool,
}

impl ShadowSource {
    /// Create a source with an identity transform and no region
    pub fn new(resolution: u32) -> Self {
        Self {
            slot: None,
            resolution,
            bounds: BoundingSphere::default(),
            view_projection: Mat4::IDENTITY,
            region: None,
            region_uv: RegionUv::default(),
            needs_update: true,
        }
    }

    /// Set up a perspective view
    ///
    /// `fov` is the full vertical field of view in degrees. The aspect ratio
    /// is 1 since atlas regions are square. Marks the source dirty only if
    /// the view or bounds change.
    pub fn set_perspective_lens(
        &mut self,
        fov: f32,
        near_plane: f32,
        far_plane: f32,
        position: Vec3,
        direction: Vec3,
    ) {
        let direction = direction.normalize_or_zero();
        let view = Mat4::look_to_rh(position, direction, find_up_vector(direction));
        let projection = Mat4::perspective_rh(fov.to_radians(), 1.0, near_plane, far_plane);

        let view_projection = projection * view;
        let bounds = BoundingSphere::new(position, far_plane);
        if view_projection != self.view_projection || bounds != self.bounds {
            self.view_projection = view_projection;
            self.bounds = bounds;
            self.needs_update = true;
        }
    }

    /// Append the STORE_SOURCE payload (after the slot)
    pub fn write_to_command(&self, cmd: &mut CommandRecord) -> Result<(), CommandError> {
        cmd.push_mat4(self.view_projection)?;
        cmd.push_vec4(Vec4::from_array(self.region_uv.to_array()))
    }

    pub fn slot(&self) -> Option<usize> {
        self.slot
    }

    pub(crate) fn set_slot(&mut self, slot: Option<usize>) {
        self.slot = slot;
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub(crate) fn set_resolution(&mut self, resolution: u32) {
        self.resolution = resolution;
    }

    pub fn bounds(&self) -> BoundingSphere {
        self.bounds
    }

    pub fn view_projection(&self) -> Mat4 {
        self.view_projection
    }

    /// Atlas region currently holding this source's shadow map
    pub fn region(&self) -> Option<AtlasRegion> {
        self.region
    }

    /// Texture-space rectangle of the region (zero without a region)
    pub fn region_uv(&self) -> RegionUv {
        self.region_uv
    }

    pub fn has_region(&self) -> bool {
        self.region.is_some()
    }

    pub(crate) fn set_region(&mut self, region: AtlasRegion, uv: RegionUv) {
        self.region = Some(region);
        self.region_uv = uv;
    }

    /// Forget the region, returning it so the caller can free it
    pub(crate) fn take_region(&mut self) -> Option<AtlasRegion> {
        self.region_uv = RegionUv::default();
        self.region.take()
    }

    pub fn needs_update(&self) -> bool {
        self.needs_update
    }

    pub fn set_needs_update(&mut self, needs_update: bool) {
        self.needs_update = needs_update;
    }
}
