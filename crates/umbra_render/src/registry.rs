//! Light Registry
//!
//! Owns the light and shadow-source slot pools, the shadow atlas, the update
//! scheduler and the command stream. Lights are shared with the caller
//! through [`LightHandle`]; the registry keeps one clone per attached light
//! and drops it on detach.
//!
//! Per frame:
//! 1. Dirty lights are re-uploaded (and their shadow views recomputed).
//! 2. Shadow sources are scheduled: out-of-range sources give their atlas
//!    region back, dirty in-range sources compete for the update budget.
//! 3. The command stream is handed to the upload collaborator.

use std::cmp::Ordering;
use std::ops::Range;

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};
use umbra_structures::SlotPool;

use crate::atlas::{AtlasRegion, RegionUv, TileAtlas};
use crate::command::{CommandKind, CommandRecord, CommandStream, IntPacking};
use crate::config::{RegistryConfig, MAX_LIGHTS, MAX_SHADOW_SOURCES};
use crate::error::{CommandError, ConfigError, RegistryError, Result};
use crate::light::{Light, LightHandle};
use crate::scheduler::UpdateScheduler;
use crate::upload::CommandUploader;

/// Slots assigned by [`LightRegistry::attach`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    /// Light slot
    pub light_slot: usize,

    /// Contiguous shadow-source slots, `None` when the light casts no
    /// shadows or no run of free source slots was available
    pub shadow_slots: Option<Range<usize>>,
}

/// A shadow map to render this frame
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShadowRenderJob {
    pub source_slot: usize,
    pub view_projection: Mat4,
    pub region: AtlasRegion,
    pub uv: RegionUv,
}

/// Counters for one frame
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameStats {
    /// Dirty lights re-uploaded
    pub lights_refreshed: usize,
    /// Dirty in-range shadow sources
    pub candidates: usize,
    /// Shadow sources given a fresh region
    pub sources_updated: usize,
    /// Regions taken back from out-of-range sources
    pub regions_reclaimed: usize,
    /// Candidates left dirty for a later frame
    pub sources_pending: usize,
    /// Batch members that found no free atlas region
    pub atlas_failures: usize,
    /// Records taken by the upload collaborator
    pub commands_uploaded: usize,
}

/// Snapshot of registry occupancy
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub num_lights: usize,
    pub num_shadow_sources: usize,
    pub max_light_index: Option<usize>,
    pub atlas_used_tiles: u32,
    pub atlas_coverage: f32,
    pub queued_commands: usize,
    pub frame: u64,
}

/// Shadow-source pool entry: the owning light and the source's index in it
#[derive(Clone, Debug)]
struct SourceRef {
    light: LightHandle,
    index: usize,
}

/// A dirty in-range source competing for this frame's budget
struct Candidate {
    slot: usize,
    source: SourceRef,
    has_region: bool,
    distance: f32,
}

/// Sources without a region first, then farther from the camera first.
fn compare_candidates(a: &Candidate, b: &Candidate) -> Ordering {
    a.has_region
        .cmp(&b.has_region)
        .then_with(|| b.distance.total_cmp(&a.distance))
}

fn store_light_command(
    slot: usize,
    light: &Light,
    packing: IntPacking,
    energy_scale: f32,
) -> std::result::Result<CommandRecord, CommandError> {
    let mut cmd = CommandRecord::with_packing(CommandKind::StoreLight, packing);
    cmd.push_int(slot as i32)?;
    light.write_to_command(&mut cmd, energy_scale)?;
    Ok(cmd)
}

/// GPU light and shadow-map registry
pub struct LightRegistry {
    config: RegistryConfig,
    lights: SlotPool<LightHandle, MAX_LIGHTS>,
    sources: SlotPool<SourceRef, MAX_SHADOW_SOURCES>,
    atlas: TileAtlas,
    scheduler: UpdateScheduler,
    commands: CommandStream,
    camera_position: Vec3,
    render_jobs: Vec<ShadowRenderJob>,
    frame: u64,
}

impl LightRegistry {
    /// Create a registry from a validated config
    pub fn new(config: RegistryConfig) -> Result<Self> {
        config.validate()?;
        let atlas = TileAtlas::new(config.atlas.size, config.atlas.tile_size)?;
        let scheduler = UpdateScheduler::new(config.max_updates);

        Ok(Self {
            config,
            lights: SlotPool::new(),
            sources: SlotPool::new(),
            atlas,
            scheduler,
            commands: CommandStream::new(),
            camera_position: Vec3::ZERO,
            render_jobs: Vec::new(),
            frame: 0,
        })
    }

    /// Attach a light, uploading it immediately
    pub fn attach(&mut self, light: &LightHandle) -> Result<Attachment> {
        let mut guard = light.write();
        if let Some(slot) = guard.slot() {
            return Err(RegistryError::AlreadyAttached(slot));
        }

        let slot = match self.lights.allocate() {
            Ok(slot) => slot,
            Err(err) => {
                log::error!(
                    target: "umbra::lights",
                    "Light limit of {} reached, cannot attach light: {}",
                    MAX_LIGHTS,
                    err
                );
                return Err(RegistryError::CapacityExceeded(MAX_LIGHTS));
            }
        };
        self.lights.reserve(slot, light.clone())?;
        guard.assign_slot(slot);

        let shadow_slots = if guard.casts_shadows() {
            self.setup_shadow_sources(light, &mut guard)?
        } else {
            None
        };

        let cmd = store_light_command(slot, &guard, self.config.int_packing, self.config.energy_scale)?;
        self.commands.enqueue(cmd);
        guard.set_needs_update(false);

        log::debug!(
            target: "umbra::lights",
            "Attached {:?} light to slot {} (shadow slots {:?})",
            guard.light_type(),
            slot,
            shadow_slots
        );

        Ok(Attachment {
            light_slot: slot,
            shadow_slots,
        })
    }

    /// Create the light's shadow sources and slot them contiguously
    fn setup_shadow_sources(
        &mut self,
        handle: &LightHandle,
        light: &mut Light,
    ) -> Result<Option<Range<usize>>> {
        light.init_shadow_sources();
        light.update_shadow_sources();
        light.invalidate_shadows();

        let count = light.shadow_sources().len();
        let first = match self.sources.allocate_consecutive(count) {
            Ok(first) => first,
            Err(err) => {
                log::error!(
                    target: "umbra::shadows",
                    "No run of {} free shadow source slots ({}), light {:?} casts no shadows",
                    count,
                    err,
                    light.slot()
                );
                return Ok(None);
            }
        };

        for (index, source) in light.shadow_sources_mut().iter_mut().enumerate() {
            let slot = first + index;
            self.sources.reserve(
                slot,
                SourceRef {
                    light: handle.clone(),
                    index,
                },
            )?;
            source.set_slot(Some(slot));
        }

        Ok(Some(first..first + count))
    }

    /// Detach a light, releasing its slots and atlas regions
    pub fn detach(&mut self, light: &LightHandle) -> Result<()> {
        let mut guard = light.write();
        let slot = guard.slot().ok_or(RegistryError::NotAttached)?;
        match self.lights.get(slot) {
            Some(held) if held.ptr_eq(light) => {}
            _ => return Err(RegistryError::NotAttached),
        }

        let held = self.lights.free(slot)?;
        let mut cmd = CommandRecord::with_packing(CommandKind::RemoveLight, self.config.int_packing);
        cmd.push_int(slot as i32)?;
        self.commands.enqueue(cmd);
        guard.remove_slot();

        if guard.casts_shadows() {
            let count = guard.shadow_sources().len();
            let mut first_slot = None;

            for source in guard.shadow_sources_mut() {
                if let Some(source_slot) = source.slot() {
                    if let Err(err) = self.sources.free(source_slot) {
                        log::error!(target: "umbra::shadows", "Failed to free shadow source slot {}: {}", source_slot, err);
                    }
                    first_slot.get_or_insert(source_slot);
                    source.set_slot(None);
                }
                if let Some(region) = source.take_region() {
                    if let Err(err) = self.atlas.free(region) {
                        log::error!(target: "umbra::atlas", "Failed to free atlas region: {}", err);
                    }
                }
            }

            if let Some(first) = first_slot {
                let mut cmd = CommandRecord::with_packing(CommandKind::RemoveSources, self.config.int_packing);
                cmd.push_int(first as i32)?;
                cmd.push_int(count as i32)?;
                self.commands.enqueue(cmd);
            }
            guard.clear_shadow_sources();
        }

        log::debug!(target: "umbra::lights", "Detached light from slot {}", slot);

        drop(guard);
        drop(held);
        Ok(())
    }

    /// Whether `light` is attached to this registry
    pub fn is_attached(&self, light: &LightHandle) -> bool {
        light
            .read()
            .slot()
            .and_then(|slot| self.lights.get(slot))
            .is_some_and(|held| held.ptr_eq(light))
    }

    /// Refresh dirty lights and schedule shadow updates for this frame
    pub fn update(&mut self) -> Result<FrameStats> {
        self.frame += 1;
        self.render_jobs.clear();

        let mut stats = FrameStats {
            lights_refreshed: self.refresh_lights()?,
            ..Default::default()
        };
        self.update_shadow_sources(&mut stats)?;

        Ok(stats)
    }

    /// Run one frame and hand the command stream to `uploader`
    pub fn tick<U: CommandUploader + ?Sized>(&mut self, uploader: &mut U) -> Result<FrameStats> {
        let mut stats = self.update()?;
        stats.commands_uploaded = uploader.upload(&mut self.commands);
        Ok(stats)
    }

    fn refresh_lights(&mut self) -> Result<usize> {
        let mut refreshed = 0;
        for (slot, handle) in self.lights.iter() {
            let mut light = handle.write();
            if !light.needs_update() {
                continue;
            }
            if light.casts_shadows() {
                light.update_shadow_sources();
            }

            let cmd = store_light_command(slot, &light, self.config.int_packing, self.config.energy_scale)?;
            self.commands.enqueue(cmd);
            light.set_needs_update(false);
            refreshed += 1;
        }
        Ok(refreshed)
    }

    fn update_shadow_sources(&mut self, stats: &mut FrameStats) -> Result<()> {
        self.scheduler.reset();
        let camera = self.camera_position;
        let max_distance = self.config.shadow_update_distance;

        let mut candidates = Vec::new();
        for (slot, entry) in self.sources.iter() {
            let mut light = entry.light.write();
            let Some(source) = light.shadow_sources_mut().get_mut(entry.index) else {
                continue;
            };

            let distance = source.bounds().distance_to(camera);
            if distance > max_distance {
                if let Some(region) = source.take_region() {
                    if let Err(err) = self.atlas.free(region) {
                        log::error!(target: "umbra::atlas", "Failed to free atlas region: {}", err);
                    }
                    // Re-render once back in range
                    source.set_needs_update(true);
                    stats.regions_reclaimed += 1;
                    log::debug!(
                        target: "umbra::shadows",
                        "Shadow source {} out of range ({:.1}), region reclaimed",
                        slot,
                        distance
                    );
                }
                continue;
            }

            if source.needs_update() {
                candidates.push(Candidate {
                    slot,
                    source: entry.clone(),
                    has_region: source.has_region(),
                    distance,
                });
            }
        }

        stats.candidates = candidates.len();
        candidates.sort_by(compare_candidates);
        let batch = &candidates[..candidates.len().min(self.scheduler.remaining())];

        for candidate in batch {
            let mut light = candidate.source.light.write();
            if let Some(region) = light.shadow_sources_mut()[candidate.source.index].take_region() {
                if let Err(err) = self.atlas.free(region) {
                    log::error!(target: "umbra::atlas", "Failed to free atlas region: {}", err);
                }
            }
        }

        for candidate in batch {
            if let Err(err) = self.scheduler.claim(candidate.slot) {
                log::error!(
                    target: "umbra::shadows",
                    "Could not claim update slot for shadow source {}: {}",
                    candidate.slot,
                    err
                );
                break;
            }

            let mut light = candidate.source.light.write();
            let source = &mut light.shadow_sources_mut()[candidate.source.index];
            let tiles = self.atlas.tiles_for(source.resolution());
            let region = match self.atlas.find_and_reserve(tiles, tiles) {
                Ok(region) => region,
                Err(err) => {
                    log::error!(
                        target: "umbra::shadows",
                        "No atlas space for shadow source {} at {}px: {}",
                        candidate.slot,
                        source.resolution(),
                        err
                    );
                    stats.atlas_failures += 1;
                    continue;
                }
            };

            let uv = self.atlas.region_to_uv(region);
            source.set_region(region, uv);
            source.set_needs_update(false);

            let mut cmd = CommandRecord::with_packing(CommandKind::StoreSource, self.config.int_packing);
            cmd.push_int(candidate.slot as i32)?;
            source.write_to_command(&mut cmd)?;
            self.commands.enqueue(cmd);

            self.render_jobs.push(ShadowRenderJob {
                source_slot: candidate.slot,
                view_projection: source.view_projection(),
                region,
                uv,
            });
            stats.sources_updated += 1;
        }

        stats.sources_pending = stats.candidates - stats.sources_updated;
        if stats.candidates > 0 {
            log::debug!(
                target: "umbra::shadows",
                "Frame {}: updated {} of {} shadow sources",
                self.frame,
                stats.sources_updated,
                stats.candidates
            );
        }
        Ok(())
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn camera_position(&self) -> Vec3 {
        self.camera_position
    }

    /// Position that shadow update distances are measured from
    pub fn set_camera_position(&mut self, position: Vec3) {
        self.camera_position = position;
    }

    pub fn set_shadow_update_distance(&mut self, distance: f32) -> Result<()> {
        if !(distance > 0.0) {
            return Err(ConfigError::InvalidUpdateDistance(distance).into());
        }
        self.config.shadow_update_distance = distance;
        Ok(())
    }

    pub fn set_max_updates(&mut self, max_updates: usize) {
        self.config.max_updates = max_updates;
        self.scheduler.set_max_updates(max_updates);
    }

    pub fn num_lights(&self) -> usize {
        self.lights.len()
    }

    pub fn num_shadow_sources(&self) -> usize {
        self.sources.len()
    }

    /// Highest occupied light slot
    pub fn max_light_index(&self) -> Option<usize> {
        self.lights.max_index()
    }

    pub fn atlas(&self) -> &TileAtlas {
        &self.atlas
    }

    pub fn scheduler(&self) -> &UpdateScheduler {
        &self.scheduler
    }

    /// Commands not yet taken by an uploader
    pub fn commands(&self) -> &CommandStream {
        &self.commands
    }

    pub fn commands_mut(&mut self) -> &mut CommandStream {
        &mut self.commands
    }

    /// Shadow maps scheduled by the last update
    pub fn render_jobs(&self) -> &[ShadowRenderJob] {
        &self.render_jobs
    }

    /// Frames run so far
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            num_lights: self.num_lights(),
            num_shadow_sources: self.num_shadow_sources(),
            max_light_index: self.max_light_index(),
            atlas_used_tiles: self.atlas.used_tile_count(),
            atlas_coverage: self.atlas.coverage(),
            queued_commands: self.commands.len(),
            frame: self.frame,
        }
    }
}

impl Default for LightRegistry {
    fn default() -> Self {
        Self {
            config: RegistryConfig::default(),
            lights: SlotPool::new(),
            sources: SlotPool::new(),
            atlas: TileAtlas::default(),
            scheduler: UpdateScheduler::default(),
            commands: CommandStream::new(),
            camera_position: Vec3::ZERO,
            render_jobs: Vec::new(),
            frame: 0,
        }
    }
}

impl std::fmt::Debug for LightRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LightRegistry")
            .field("config", &self.config)
            .field("lights", &self.lights.len())
            .field("sources", &self.sources.len())
            .field("atlas_coverage", &self.atlas.coverage())
            .field("queued_commands", &self.commands.len())
            .field("frame", &self.frame)
            .finish()
    }
}
