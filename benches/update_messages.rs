use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use glam::DVec3;

use entity_sync::config::TrackingConfig;
use entity_sync::game::entity::{Entity, EntityKind, Transform};
use entity_sync::game::sync::{EntityProtocolManager, EntityProtocolType, LastSent};
use entity_sync::game::viewer::{Viewer, ViewerSet};
use entity_sync::net::session::ConnectionRegistry;

fn zombie(id: i32, position: DVec3) -> Entity {
    Entity::new(
        id,
        EntityKind::Insentient { mob_type: 54 },
        Transform::at(position),
    )
}

fn bench_spawn_message(c: &mut Criterion) {
    let entity = zombie(1, DVec3::new(1.0, 64.0, 1.0));
    c.bench_function("spawn_message", |bencher| {
        bencher.iter(|| {
            let mut last_sent = LastSent::default();
            black_box(EntityProtocolType::Insentient.build_spawn_message(&entity, &mut last_sent))
        })
    });
}

fn bench_update_messages_moving(c: &mut Criterion) {
    let entity = zombie(1, DVec3::ZERO);
    let mut last_sent = LastSent::default();
    let _ = EntityProtocolType::Insentient.build_spawn_message(&entity, &mut last_sent);
    let mut step = 0.0;
    c.bench_function("update_messages_moving", |bencher| {
        bencher.iter(|| {
            step += 0.25;
            entity.set_position(DVec3::new(step % 4.0, 64.0, 0.0));
            black_box(EntityProtocolType::Insentient.build_update_messages(&entity, &mut last_sent))
        })
    });
}

fn bench_update_messages_idle(c: &mut Criterion) {
    let entity = zombie(1, DVec3::ZERO);
    let mut last_sent = LastSent::default();
    let _ = EntityProtocolType::Insentient.build_spawn_message(&entity, &mut last_sent);
    c.bench_function("update_messages_idle", |bencher| {
        bencher.iter(|| {
            black_box(EntityProtocolType::Insentient.build_update_messages(&entity, &mut last_sent))
        })
    });
}

fn bench_manager_tick(c: &mut Criterion) {
    let config = TrackingConfig {
        default_update_rate: 1,
        ..Default::default()
    };
    let connections = Arc::new(ConnectionRegistry::new());
    let mut receivers: Vec<_> = (0..50)
        .map(|id| connections.create_session(id, 1 << 16))
        .collect();
    let manager = EntityProtocolManager::new(config, connections);
    let entities: Vec<Arc<Entity>> = (0..500)
        .map(|id| {
            let position = DVec3::new((id % 25) as f64 * 8.0, 64.0, (id / 25) as f64 * 8.0);
            Arc::new(zombie(id, position))
        })
        .collect();
    for entity in &entities {
        let _ = manager.add(entity.clone());
    }
    let candidates: ViewerSet = (0..50)
        .map(|id| {
            let position = DVec3::new((id % 10) as f64 * 20.0, 64.0, (id / 10) as f64 * 40.0);
            Viewer::new(id, position)
        })
        .collect();
    manager.update_trackers(&candidates);

    let mut step = 0u64;
    c.bench_function("manager_tick_500_entities_50_viewers", |bencher| {
        bencher.iter_batched(
            || {
                step += 1;
                let dx = if step % 2 == 0 { 0.1 } else { -0.1 };
                for entity in &entities {
                    entity.set_position(entity.position() + DVec3::new(dx, 0.0, 0.0));
                }
                for (_, rx) in receivers.iter_mut() {
                    while rx.try_recv().is_ok() {}
                }
            },
            |_| black_box(manager.update_trackers(&candidates)),
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(
    benches,
    bench_spawn_message,
    bench_update_messages_moving,
    bench_update_messages_idle,
    bench_manager_tick
);
criterion_main!(benches);
