use super::*;
use crate::world::{MemoryWorld, VerticalBounds};

fn test_config() -> WardenConfig {
    let mut config = WardenConfig::default();
    config.scan.automation_materials = vec![
        "relay".to_string(),
        "piston".to_string(),
        "signal_wire".to_string(),
    ];
    config
}

fn engine_over(world: Arc<MemoryWorld>) -> MonitorEngine {
    MonitorEngine::new(test_config(), world)
}

fn flat_world() -> Arc<MemoryWorld> {
    let world = Arc::new(MemoryWorld::new());
    world.set_vertical_bounds("overworld", VerticalBounds { min_y: 0, max_y: 4 });
    world
}

fn coord(x: i32, z: i32) -> RegionCoordinate {
    RegionCoordinate::new("overworld", x, z)
}

#[tokio::test]
async fn test_remove_then_restore_round_trip() {
    let world = flat_world();
    let region = coord(0, 0);
    world.place(&region, 1, 0, 1, Material::new("relay"));
    world.place(&region, 2, 1, 3, Material::new("piston"));
    world.place(&region, 0, 2, 0, Material::new("stone"));

    let engine = engine_over(Arc::clone(&world));

    let removed = engine
        .remove_automation_at(&region, "admin", 1_000)
        .unwrap();
    assert_eq!(removed, RemoveOutcome { removed: 2 });
    assert_eq!(world.material_at(&region, 1, 0, 1), None);
    assert_eq!(world.material_at(&region, 2, 1, 3), None);
    // Non-automation blocks are untouched.
    assert_eq!(
        world.material_at(&region, 0, 2, 0),
        Some(Material::new("stone"))
    );

    let restored = engine.restore_automation(&region, "admin").unwrap();
    assert_eq!(
        restored,
        RestoreOutcome {
            restored: 2,
            skipped: 0
        }
    );
    assert_eq!(
        world.material_at(&region, 1, 0, 1),
        Some(Material::new("relay"))
    );
    assert_eq!(
        world.material_at(&region, 2, 1, 3),
        Some(Material::new("piston"))
    );
}

#[tokio::test]
async fn test_second_restore_is_noop() {
    let world = flat_world();
    let region = coord(0, 0);
    world.place(&region, 1, 0, 1, Material::new("relay"));

    let engine = engine_over(Arc::clone(&world));
    engine.remove_automation_at(&region, "admin", 1_000).unwrap();
    engine.restore_automation(&region, "admin").unwrap();

    // Backup already consumed.
    let second = engine.restore_automation(&region, "admin").unwrap();
    assert_eq!(
        second,
        RestoreOutcome {
            restored: 0,
            skipped: 0
        }
    );
}

#[tokio::test]
async fn test_restore_skips_positions_filled_in_the_interim() {
    let world = flat_world();
    let region = coord(0, 0);
    world.place(&region, 1, 0, 1, Material::new("relay"));
    world.place(&region, 2, 0, 2, Material::new("piston"));

    let engine = engine_over(Arc::clone(&world));
    engine.remove_automation_at(&region, "admin", 1_000).unwrap();

    // Unrelated activity fills one of the cleared positions.
    world.place(&region, 1, 0, 1, Material::new("stone"));

    let restored = engine.restore_automation(&region, "admin").unwrap();
    assert_eq!(
        restored,
        RestoreOutcome {
            restored: 1,
            skipped: 1
        }
    );
    assert_eq!(
        world.material_at(&region, 1, 0, 1),
        Some(Material::new("stone"))
    );
    assert_eq!(
        world.material_at(&region, 2, 0, 2),
        Some(Material::new("piston"))
    );
}

#[tokio::test]
async fn test_remove_with_zero_devices_changes_nothing() {
    let world = flat_world();
    let region = coord(0, 0);
    world.place(&region, 0, 0, 0, Material::new("stone"));

    let engine = engine_over(Arc::clone(&world));
    let removed = engine
        .remove_automation_at(&region, "admin", 1_000)
        .unwrap();
    assert_eq!(removed, RemoveOutcome { removed: 0 });

    // No backup was created and no record was flagged as cleared.
    let restored = engine.restore_automation(&region, "admin").unwrap();
    assert_eq!(restored.restored, 0);
    assert!(engine
        .get_record(&region)
        .map_or(true, |r| !r.is_cleared()));
}

#[tokio::test]
async fn test_operations_on_unloaded_region_fail_visibly() {
    let world = flat_world();
    let engine = engine_over(world);
    let region = coord(9, 9);

    assert_eq!(
        engine.remove_automation_at(&region, "admin", 1_000),
        Err(OpError::RegionUnavailable(region.clone()))
    );
    assert_eq!(
        engine.restore_automation(&region, "admin"),
        Err(OpError::RegionUnavailable(region.clone()))
    );
}

#[tokio::test]
async fn test_removed_region_is_cleared_and_never_flagged() {
    let world = flat_world();
    let region = coord(0, 0);
    // Enough devices to cross any threshold in the test config.
    for local_x in 0..16 {
        for local_z in 0..16 {
            world.place(&region, local_x, 0, local_z, Material::new("relay"));
        }
    }

    let engine = engine_over(Arc::clone(&world));
    engine.force_full_scan();
    assert_eq!(engine.get_record(&region).unwrap().automation(), 256);

    engine.remove_automation_at(&region, "admin", 2_000).unwrap();
    let record = engine.get_record(&region).unwrap();
    assert!(record.is_cleared());

    let page = engine.list_flagged("overworld", 0);
    assert_eq!(page.total_flagged, 0);
}

#[test]
fn test_should_suppress_requires_freeze_and_classification() {
    let world = flat_world();
    let engine = engine_over(world);

    assert!(!engine.should_suppress(&Material::new("relay")));

    engine.set_freeze_at(true, "admin", 1_000);
    assert!(engine.should_suppress(&Material::new("relay")));
    assert!(!engine.should_suppress(&Material::new("stone")));

    engine.set_freeze_at(false, "admin", 2_000);
    assert!(!engine.should_suppress(&Material::new("relay")));
}

#[test]
fn test_halt_disables_monitoring_until_unfreeze() {
    let world = flat_world();
    world.set_signal(5.0);
    let engine = engine_over(Arc::clone(&world));

    engine.halt("admin");
    assert!(engine.is_frozen());
    assert!(!engine.monitoring_enabled());

    // Critical signal is ignored while halted.
    engine.control_tick_at(10_000);
    assert!(engine.is_frozen());
    assert_eq!(engine.pending_scans(), 0);

    engine.set_freeze(false, "admin");
    assert!(!engine.is_frozen());
    assert!(engine.monitoring_enabled());
}

#[tokio::test]
async fn test_list_flagged_pagination() {
    let world = flat_world();
    // One more region than fits on a page, each dense enough to flag.
    for x in 0..(ITEMS_PER_PAGE as i32 + 1) {
        let region = coord(x, 0);
        for local_z in 0..8 {
            world.place(&region, 0, 0, local_z, Material::new("relay"));
        }
    }

    let mut config = test_config();
    config.scan.max_automation_threshold = 1;
    let engine = MonitorEngine::new(config, world);
    engine.force_full_scan();

    let first = engine.list_flagged("overworld", 0);
    assert_eq!(first.total_flagged, ITEMS_PER_PAGE + 1);
    assert_eq!(first.total_pages, 2);
    assert_eq!(first.entries.len(), ITEMS_PER_PAGE);
    assert_eq!(first.entries[0].0, coord(0, 0));

    let second = engine.list_flagged("overworld", 1);
    assert_eq!(second.entries.len(), 1);
    assert_eq!(second.entries[0].0, coord(ITEMS_PER_PAGE as i32, 0));
}

#[tokio::test(start_paused = true)]
async fn test_removed_record_expires_at_amnesty_boundary() {
    let world = flat_world();
    let region = coord(0, 0);
    world.place(&region, 1, 0, 1, Material::new("relay"));

    let engine = engine_over(Arc::clone(&world));
    engine.remove_automation(&region, "admin").unwrap();
    assert!(engine.get_record(&region).is_some());

    tokio::time::sleep(Duration::from_millis(AMNESTY_WINDOW_MS as u64 + 1_000)).await;
    assert!(engine.get_record(&region).is_none());
}

#[test]
fn test_signal_failure_falls_back_without_state_change() {
    let world = flat_world();
    world.load_region(coord(0, 0));
    world.set_signal(19.0);

    let engine = engine_over(Arc::clone(&world));
    engine.control_tick_at(1_000);
    assert!(!engine.is_frozen());

    // One failed read: the tick uses the last healthy value and stays calm.
    world.fail_next_signal();
    engine.control_tick_at(2_000);
    assert!(!engine.is_frozen());
}
