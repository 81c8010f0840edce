//! Integration tests for umbra_render

use umbra_render::*;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn registry_with(config: RegistryConfig) -> LightRegistry {
    init_logger();
    LightRegistry::new(config).unwrap()
}

fn shadowed_point(position: Vec3) -> LightHandle {
    LightHandle::new(Light::point(position, 10.0).with_shadows(512))
}

fn shadowed_spot(position: Vec3) -> LightHandle {
    LightHandle::new(Light::spot(position, Vec3::NEG_Y, 10.0, 60.0).with_shadows(256))
}

fn kinds(registry: &LightRegistry) -> Vec<CommandKind> {
    registry.commands().iter().map(CommandRecord::kind).collect()
}

// ============================================================================
// Attach / detach
// ============================================================================

#[test]
fn test_attach_point_light_slots_six_sources() {
    let mut registry = registry_with(RegistryConfig::default());
    let light = shadowed_point(Vec3::ZERO);

    let attachment = registry.attach(&light).unwrap();

    assert_eq!(attachment.light_slot, 0);
    assert_eq!(attachment.shadow_slots, Some(0..6));
    assert_eq!(registry.num_lights(), 1);
    assert_eq!(registry.num_shadow_sources(), 6);

    let slots: Vec<_> = light
        .read()
        .shadow_sources()
        .iter()
        .map(|source| source.slot())
        .collect();
    assert_eq!(slots, (0..6).map(Some).collect::<Vec<_>>());
    assert!(light.read().shadow_sources().iter().all(ShadowSource::needs_update));

    // Uploaded immediately, no tick needed
    assert_eq!(kinds(&registry), vec![CommandKind::StoreLight]);
    let cmd = registry.commands().iter().next().unwrap();
    assert_eq!(cmd.int_field(1), 0);
    assert_eq!(cmd.int_field(2), LightType::Point as i32);
    assert_eq!(cmd.int_field(3), -1);
    assert_eq!(cmd.int_field(4), 0);
    assert!(!light.read().needs_update());
}

#[test]
fn test_detach_releases_everything() {
    let mut registry = registry_with(RegistryConfig::default());
    let light = shadowed_point(Vec3::ZERO);
    registry.attach(&light).unwrap();
    assert_eq!(light.strong_count(), 8);

    registry.update().unwrap();
    assert!(registry.atlas().used_tile_count() > 0);
    registry.commands_mut().clear();

    registry.detach(&light).unwrap();

    assert_eq!(registry.num_lights(), 0);
    assert_eq!(registry.num_shadow_sources(), 0);
    assert_eq!(registry.max_light_index(), None);
    assert_eq!(registry.atlas().used_tile_count(), 0);
    assert!(light.read().slot().is_none());
    assert!(light.read().shadow_sources().is_empty());
    assert_eq!(light.strong_count(), 1);

    let commands: Vec<_> = registry.commands().iter().cloned().collect();
    assert_eq!(commands.len(), 2);
    assert_eq!(commands[0].kind(), CommandKind::RemoveLight);
    assert_eq!(commands[0].int_field(1), 0);
    assert_eq!(commands[1].kind(), CommandKind::RemoveSources);
    assert_eq!(commands[1].int_field(1), 0);
    assert_eq!(commands[1].int_field(2), 6);
}

#[test]
fn test_double_attach_rejected() {
    let mut registry = registry_with(RegistryConfig::default());
    let light = shadowed_spot(Vec3::ZERO);
    registry.attach(&light).unwrap();

    assert!(matches!(
        registry.attach(&light),
        Err(RegistryError::AlreadyAttached(0))
    ));
    assert_eq!(registry.num_lights(), 1);
    assert_eq!(registry.num_shadow_sources(), 1);
}

#[test]
fn test_detach_unattached_rejected() {
    let mut registry = registry_with(RegistryConfig::default());
    let light = shadowed_spot(Vec3::ZERO);

    assert!(matches!(registry.detach(&light), Err(RegistryError::NotAttached)));

    registry.attach(&light).unwrap();
    registry.detach(&light).unwrap();
    assert!(matches!(registry.detach(&light), Err(RegistryError::NotAttached)));
}

#[test]
fn test_slots_reused_after_detach() {
    let mut registry = registry_with(RegistryConfig::default());
    let first = shadowed_point(Vec3::ZERO);
    let second = shadowed_spot(Vec3::ZERO);
    let third = shadowed_spot(Vec3::ZERO);

    registry.attach(&first).unwrap();
    registry.attach(&second).unwrap();
    registry.detach(&first).unwrap();

    let attachment = registry.attach(&third).unwrap();
    assert_eq!(attachment.light_slot, 0);
    assert_eq!(attachment.shadow_slots, Some(0..1));
    assert_eq!(registry.max_light_index(), Some(1));
}

#[test]
fn test_shadow_slot_exhaustion_keeps_light() {
    let mut registry = registry_with(RegistryConfig::default());
    let lights: Vec<_> = (0..MAX_SHADOW_SOURCES / 6)
        .map(|_| shadowed_point(Vec3::ZERO))
        .collect();
    for light in &lights {
        assert!(registry.attach(light).unwrap().shadow_slots.is_some());
    }
    registry.commands_mut().clear();

    let extra = shadowed_point(Vec3::ZERO);
    let attachment = registry.attach(&extra).unwrap();

    assert_eq!(attachment.shadow_slots, None);
    assert!(registry.is_attached(&extra));
    assert_eq!(registry.num_shadow_sources(), (MAX_SHADOW_SOURCES / 6) * 6);
    let cmd = registry.commands().iter().next().unwrap();
    assert_eq!(cmd.int_field(4), -1);

    // Detaching emits no REMOVE_SOURCES for the unslotted light
    registry.commands_mut().clear();
    registry.detach(&extra).unwrap();
    assert_eq!(kinds(&registry), vec![CommandKind::RemoveLight]);
}

#[test]
fn test_light_limit_leaves_light_detached() {
    let mut registry = registry_with(RegistryConfig::default());
    let lights: Vec<_> = (0..MAX_LIGHTS)
        .map(|_| LightHandle::new(Light::point(Vec3::ZERO, 1.0)))
        .collect();
    for light in &lights {
        registry.attach(light).unwrap();
    }
    assert_eq!(registry.num_lights(), MAX_LIGHTS);
    registry.commands_mut().clear();

    let extra = shadowed_point(Vec3::ZERO);
    assert!(matches!(
        registry.attach(&extra),
        Err(RegistryError::CapacityExceeded(MAX_LIGHTS))
    ));

    assert!(extra.read().slot().is_none());
    assert!(!registry.is_attached(&extra));
    assert_eq!(extra.strong_count(), 1);
    assert!(registry.commands().is_empty());
    assert_eq!(registry.num_lights(), MAX_LIGHTS);
    assert_eq!(registry.num_shadow_sources(), 0);
}

#[test]
fn test_casts_shadows_frozen_while_attached() {
    let mut registry = registry_with(RegistryConfig::default());
    let light = shadowed_spot(Vec3::ZERO);
    registry.attach(&light).unwrap();

    assert!(matches!(
        light.write().set_casts_shadows(false),
        Err(LightError::Attached(0))
    ));

    registry.detach(&light).unwrap();
    light.write().set_casts_shadows(false).unwrap();
    let attachment = registry.attach(&light).unwrap();
    assert_eq!(attachment.shadow_slots, None);
}

// ============================================================================
// Shadow scheduling
// ============================================================================

#[test]
fn test_update_budget_limits_sources() {
    let mut registry = registry_with(RegistryConfig {
        max_updates: 2,
        ..Default::default()
    });
    let lights: Vec<_> = (0..5)
        .map(|i| shadowed_spot(Vec3::new(i as f32, 0.0, 0.0)))
        .collect();
    for light in &lights {
        registry.attach(light).unwrap();
    }

    let mut staging = StagingBuffer::default();
    let stats = registry.tick(&mut staging).unwrap();

    assert_eq!(stats.candidates, 5);
    assert_eq!(stats.sources_updated, 2);
    assert_eq!(stats.sources_pending, 3);
    assert_eq!(registry.render_jobs().len(), 2);

    let dirty = lights
        .iter()
        .filter(|light| light.read().shadow_sources()[0].needs_update())
        .count();
    assert_eq!(dirty, 3);
    let with_region = lights
        .iter()
        .filter(|light| light.read().shadow_sources()[0].has_region())
        .count();
    assert_eq!(with_region, 2);

    let stats = registry.tick(&mut staging).unwrap();
    assert_eq!(stats.sources_updated, 2);
    let stats = registry.tick(&mut staging).unwrap();
    assert_eq!(stats.sources_updated, 1);
    assert_eq!(stats.sources_pending, 0);
    let stats = registry.tick(&mut staging).unwrap();
    assert_eq!(stats.candidates, 0);
}

#[test]
fn test_farther_sources_scheduled_first() {
    let mut registry = registry_with(RegistryConfig {
        max_updates: 1,
        ..Default::default()
    });
    let near = shadowed_spot(Vec3::new(5.0, 0.0, 0.0));
    let far = shadowed_spot(Vec3::new(50.0, 0.0, 0.0));
    registry.attach(&near).unwrap();
    registry.attach(&far).unwrap();

    registry.update().unwrap();

    // Each candidate is ranked by its own distance to the camera
    assert_eq!(registry.render_jobs()[0].source_slot, 1);
    assert!(far.read().shadow_sources()[0].has_region());
    assert!(!near.read().shadow_sources()[0].has_region());
}

#[test]
fn test_sources_without_region_scheduled_first() {
    let mut registry = registry_with(RegistryConfig {
        max_updates: 1,
        ..Default::default()
    });
    let far = shadowed_spot(Vec3::new(50.0, 0.0, 0.0));
    registry.attach(&far).unwrap();
    registry.update().unwrap();
    assert!(far.read().shadow_sources()[0].has_region());

    let near = shadowed_spot(Vec3::new(5.0, 0.0, 0.0));
    registry.attach(&near).unwrap();
    far.write().set_position(Vec3::new(60.0, 0.0, 0.0));

    registry.update().unwrap();

    // The stale far shadow waits for the missing near one
    assert_eq!(registry.render_jobs()[0].source_slot, 1);
    assert!(far.read().shadow_sources()[0].needs_update());
    assert!(far.read().shadow_sources()[0].has_region());
}

#[test]
fn test_out_of_range_region_reclaimed() {
    let mut registry = registry_with(RegistryConfig::default());
    let light = shadowed_spot(Vec3::ZERO);
    registry.attach(&light).unwrap();
    registry.update().unwrap();
    let used = registry.atlas().used_tile_count();
    assert!(used > 0);

    registry.set_camera_position(Vec3::new(500.0, 0.0, 0.0));
    let stats = registry.update().unwrap();

    assert_eq!(stats.regions_reclaimed, 1);
    assert_eq!(stats.candidates, 0);
    assert_eq!(registry.atlas().used_tile_count(), 0);
    assert!(!light.read().shadow_sources()[0].has_region());

    registry.set_camera_position(Vec3::ZERO);
    let stats = registry.update().unwrap();
    assert_eq!(stats.sources_updated, 1);
    assert_eq!(registry.atlas().used_tile_count(), used);
}

#[test]
fn test_atlas_exhaustion_leaves_source_dirty() {
    let mut registry = registry_with(RegistryConfig {
        atlas: AtlasConfig {
            size: 128,
            tile_size: 32,
        },
        ..Default::default()
    });
    // 64px maps take 2x2 tiles, four fit into the 4x4 grid
    let lights: Vec<_> = (0..5)
        .map(|_| LightHandle::new(Light::spot(Vec3::ZERO, Vec3::X, 10.0, 60.0).with_shadows(64)))
        .collect();
    for light in &lights {
        registry.attach(light).unwrap();
    }

    let stats = registry.update().unwrap();

    assert_eq!(stats.sources_updated, 4);
    assert_eq!(stats.atlas_failures, 1);
    assert_eq!(stats.sources_pending, 1);
    assert_eq!(registry.atlas().coverage(), 1.0);
    assert_eq!(registry.scheduler().claimed().len(), 5);
    assert!(lights[4].read().shadow_sources()[0].needs_update());
}

#[test]
fn test_moving_light_dirties_its_sources() {
    let mut registry = registry_with(RegistryConfig::default());
    let light = shadowed_point(Vec3::ZERO);
    registry.attach(&light).unwrap();
    registry.update().unwrap();
    assert!(light.read().shadow_sources().iter().all(|source| !source.needs_update()));

    light.write().set_position(Vec3::new(0.0, 2.0, 0.0));
    let stats = registry.update().unwrap();

    assert_eq!(stats.lights_refreshed, 1);
    assert_eq!(stats.candidates, 6);
    assert_eq!(stats.sources_updated, 6);
}

#[test]
fn test_color_change_keeps_shadows() {
    let mut registry = registry_with(RegistryConfig::default());
    let light = shadowed_point(Vec3::ZERO);
    registry.attach(&light).unwrap();
    registry.update().unwrap();

    light.write().set_color(Vec3::new(1.0, 0.0, 0.0));
    light.write().set_energy(40.0);
    light.write().set_ies_profile(Some(1));
    let stats = registry.update().unwrap();

    assert_eq!(stats.lights_refreshed, 1);
    assert_eq!(stats.candidates, 0);
    assert_eq!(stats.sources_updated, 0);
    assert!(light.read().shadow_sources().iter().all(ShadowSource::has_region));
}

#[test]
fn test_resolution_change_dirties_shadows() {
    let mut registry = registry_with(RegistryConfig::default());
    let light = shadowed_spot(Vec3::ZERO);
    registry.attach(&light).unwrap();
    registry.update().unwrap();

    light.write().set_shadow_resolution(1024).unwrap();
    let stats = registry.update().unwrap();

    assert_eq!(stats.candidates, 1);
    assert_eq!(registry.render_jobs()[0].region.width, 32);
}

#[test]
fn test_zero_budget_updates_nothing() {
    let mut registry = registry_with(RegistryConfig::default());
    registry.set_max_updates(0);
    let light = shadowed_spot(Vec3::ZERO);
    registry.attach(&light).unwrap();

    let stats = registry.update().unwrap();
    assert_eq!(stats.candidates, 1);
    assert_eq!(stats.sources_updated, 0);
    assert!(registry.render_jobs().is_empty());
}

// ============================================================================
// Command stream
// ============================================================================

#[test]
fn test_commands_drain_in_order() {
    let mut registry = registry_with(RegistryConfig::default());
    let light = shadowed_spot(Vec3::ZERO);
    registry.attach(&light).unwrap();

    let mut staging = StagingBuffer::new(16);
    let stats = registry.tick(&mut staging).unwrap();
    assert_eq!(stats.commands_uploaded, 2);
    assert!(registry.commands().is_empty());

    let store_light = staging.record(0).unwrap();
    let store_source = staging.record(1).unwrap();
    assert_eq!(store_light[0], CommandKind::StoreLight as i32 as f32);
    assert_eq!(store_source[0], CommandKind::StoreSource as i32 as f32);

    let job = registry.render_jobs()[0];
    assert_eq!(&store_source[18..22], &job.uv.to_array());
}

#[test]
fn test_small_staging_buffer_defers_commands() {
    let mut registry = registry_with(RegistryConfig::default());
    for _ in 0..3 {
        registry
            .attach(&LightHandle::new(Light::point(Vec3::ZERO, 4.0)))
            .unwrap();
    }

    let mut staging = StagingBuffer::new(2);
    assert_eq!(registry.tick(&mut staging).unwrap().commands_uploaded, 2);
    assert_eq!(staging.record(0).unwrap()[1], 0.0);
    assert_eq!(registry.commands().len(), 1);

    assert_eq!(registry.tick(&mut staging).unwrap().commands_uploaded, 1);
    assert_eq!(staging.record(0).unwrap()[1], 2.0);
}

#[test]
fn test_reinterpret_packing() {
    let mut registry = registry_with(RegistryConfig {
        int_packing: IntPacking::Reinterpret,
        ..Default::default()
    });
    let light = shadowed_spot(Vec3::ZERO);
    registry.attach(&light).unwrap();

    let cmd = registry.commands().iter().next().unwrap();
    assert_eq!(cmd.packing(), IntPacking::Reinterpret);
    assert_eq!(cmd.int_field(2), LightType::Spot as i32);
    assert_eq!(cmd.int_field(3), -1);
    assert_eq!(cmd.field(2).to_bits(), 2);
}

#[test]
fn test_energy_scale_applied() {
    let mut registry = registry_with(RegistryConfig {
        energy_scale: 0.5,
        ..Default::default()
    });
    let light = LightHandle::new(
        Light::point(Vec3::ZERO, 4.0)
            .with_color(Vec3::new(1.0, 0.5, 0.25))
            .with_energy(8.0),
    );
    registry.attach(&light).unwrap();

    let cmd = registry.commands().iter().next().unwrap();
    assert_eq!(&cmd.fields()[8..11], &[4.0, 2.0, 1.0]);
}

#[test]
fn test_stats_snapshot() {
    let mut registry = registry_with(RegistryConfig::default());
    registry.attach(&shadowed_point(Vec3::ZERO)).unwrap();
    registry.update().unwrap();

    let stats = registry.stats();
    assert_eq!(stats.num_lights, 1);
    assert_eq!(stats.num_shadow_sources, 6);
    assert_eq!(stats.frame, 1);
    assert!(stats.atlas_coverage > 0.0);

    let json = serde_json::to_string(&stats).unwrap();
    let restored: RegistryStats = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, stats);
}
