pub mod store;
pub mod sync;
pub mod scene;
pub mod transform;
pub mod app;

#[allow(unused)]
pub use app::{Application, HeadlessUser, SharedAppData, User};
#[allow(unused)]
pub use app::config::RuntimeConfig;
#[allow(unused)]
pub use scene::{
    CallbackTable, ComponentHandle, EntityHandle, LayerHandle, LevelHandle, OwnerHandle, Payload,
    Phase, Scene, SceneError,
};
#[allow(unused)]
pub use store::{SlotKey, SlotStore};
#[allow(unused)]
pub use transform::{Transform, TransformInstance};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::lifecycle::LOOP_KINDS;
    use cgmath::Vector3;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn tiny_scene(scene: &mut Scene) -> (LevelHandle, LayerHandle) {
        let level = scene.create_level("main", None).unwrap();
        let layer = scene.create_layer(level, "default", None).unwrap();
        (level, layer)
    }

    fn advance_all(scene: &Scene, ticks: u64) {
        let counters = scene.ticks();
        for _ in 0..ticks {
            for kind in LOOP_KINDS {
                counters.advance(kind);
            }
        }
    }

    #[test]
    fn stale_entity_handle_never_resolves_to_the_reused_slot() {
        let mut scene = Scene::standalone();
        let (_, layer) = tiny_scene(&mut scene);
        let _a = scene.spawn_entity(layer, "a", None).unwrap();
        let b = scene.spawn_entity(layer, "b", None).unwrap();

        assert!(scene.destroy_entity(b));
        // pending objects still resolve; walks skip them
        assert!(scene.entity(b).is_some());

        assert_eq!(scene.collect(None, 64), 0, "grace period must hold");
        advance_all(&scene, 2);
        assert_eq!(scene.collect(None, 64), 1);
        assert!(scene.entity(b).is_none());

        let c = scene.spawn_entity(layer, "c", None).unwrap();
        assert_eq!(c.entity.index, b.entity.index, "slot must be reused");
        assert!(scene.entity(b).is_none(), "stale handle sees nothing");
        assert_eq!(scene.entity(c).unwrap().name(), "c");
    }

    #[test]
    fn destruction_cascades_and_waits_for_every_loop() {
        let mut scene = Scene::standalone();
        let (_, layer) = tiny_scene(&mut scene);
        let parent = scene.spawn_entity(layer, "parent", None).unwrap();
        let child = scene.spawn_child(parent, "child", None).unwrap();
        let widget = scene.add_component(child, "widget", None).unwrap();

        assert!(scene.destroy_entity(parent));
        assert!(scene.entity(child).unwrap().lifecycle().is_pending());
        assert!(scene.component(widget).unwrap().lifecycle().is_pending());

        // one loop short of the margin: nothing may be reclaimed
        let counters = scene.ticks();
        for _ in 0..2 {
            counters.advance(scene::LoopKind::Fixed);
            counters.advance(scene::LoopKind::Vary);
        }
        assert_eq!(scene.collect(None, 64), 0);

        counters.advance(scene::LoopKind::Reclaim);
        counters.advance(scene::LoopKind::Reclaim);
        // component, child, parent
        assert_eq!(scene.collect(None, 64), 3);
        assert!(scene.entity(parent).is_none());
        assert!(scene.entity(child).is_none());
    }

    #[test]
    fn parent_translate_moves_child_world_by_exactly_that_much() {
        let mut scene = Scene::standalone();
        let (_, layer) = tiny_scene(&mut scene);
        let parent = scene.spawn_entity(layer, "parent", None).unwrap();
        let child = scene.spawn_child(parent, "child", None).unwrap();

        scene
            .entity(child)
            .unwrap()
            .transform()
            .queue_set_position(Vector3::new(5.0, 0.0, 0.0));
        scene.consume_transforms(1);
        assert_eq!(scene.entity(child).unwrap().transform().world().position.x, 5.0);

        scene
            .entity(parent)
            .unwrap()
            .transform()
            .queue_translate(Vector3::new(1.0, 0.0, 0.0));
        scene.consume_transforms(2);
        let parent_world = *scene.entity(parent).unwrap().transform().world();
        let child_world = *scene.entity(child).unwrap().transform().world();
        assert_eq!(parent_world.position.x, 1.0);
        assert_eq!(child_world.position.x, 6.0, "the delta applies exactly once");
        // same-tick propagation: child world equals parent world of this
        // tick combined with the child's local
        let child_local = *scene.entity(child).unwrap().transform().local();
        assert_eq!(parent_world.combine(&child_local).position, child_world.position);

        // nothing queued: a second pass changes nothing
        scene.consume_transforms(3);
        assert_eq!(scene.entity(child).unwrap().transform().world().position.x, 6.0);
        assert_eq!(scene.entity(parent).unwrap().transform().world().position.x, 1.0);
    }

    #[test]
    fn reparenting_keeps_the_world_placement() {
        let mut scene = Scene::standalone();
        let (_, layer) = tiny_scene(&mut scene);
        let parent = scene.spawn_entity(layer, "anchor", None).unwrap();
        let floater = scene.spawn_entity(layer, "floater", None).unwrap();

        scene
            .entity(parent)
            .unwrap()
            .transform()
            .queue_set_position(Vector3::new(1.0, 0.0, 0.0));
        scene
            .entity(floater)
            .unwrap()
            .transform()
            .queue_set_position(Vector3::new(2.0, 0.0, 0.0));
        scene.consume_transforms(1);

        assert!(scene.queue_reparent(floater, Some(parent)));
        scene.consume_transforms(2);
        let entity = scene.entity(floater).unwrap();
        assert_eq!(entity.parent(), parent);
        assert_eq!(entity.transform().world().position.x, 2.0);
        assert_eq!(entity.transform().local().position.x, 1.0);
        assert!(scene.entity(parent).unwrap().children().contains(&floater));

        assert!(scene.queue_reparent(floater, None));
        scene.consume_transforms(3);
        let entity = scene.entity(floater).unwrap();
        assert!(entity.is_root());
        assert_eq!(entity.transform().world().position.x, 2.0);
        assert_eq!(entity.transform().local().position.x, 2.0);
        assert!(!scene.entity(parent).unwrap().children().contains(&floater));
    }

    #[test]
    fn reparent_cycles_are_refused() {
        let mut scene = Scene::standalone();
        let (_, layer) = tiny_scene(&mut scene);
        let a = scene.spawn_entity(layer, "a", None).unwrap();
        let b = scene.spawn_child(a, "b", None).unwrap();

        assert!(scene.queue_reparent(a, Some(b)));
        scene.consume_transforms(1);
        // the request was dropped, the hierarchy is unchanged
        assert!(scene.entity(a).unwrap().is_root());
        assert_eq!(scene.entity(b).unwrap().parent(), a);
    }

    #[test]
    fn queueing_from_many_threads_accumulates_every_delta() {
        let scene = Arc::new(parking_lot::RwLock::new(Scene::standalone()));
        let entity = {
            let mut scene = scene.write();
            let (_, layer) = tiny_scene(&mut scene);
            scene.spawn_entity(layer, "mover", None).unwrap()
        };

        let mut joins = Vec::new();
        for _ in 0..4 {
            let scene = scene.clone();
            joins.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    let scene = scene.read();
                    scene
                        .entity(entity)
                        .unwrap()
                        .transform()
                        .queue_translate(Vector3::new(1.0, 0.0, 0.0));
                }
            }));
        }
        for join in joins {
            join.join().unwrap();
        }

        let mut scene = scene.write();
        scene.consume_transforms(1);
        assert_eq!(scene.entity(entity).unwrap().transform().world().position.x, 400.0);
    }

    #[test]
    fn dispatch_runs_callbacks_and_skips_flagged_objects() {
        let mut scene = Scene::standalone();
        let (_, layer) = tiny_scene(&mut scene);

        let counter = Arc::new(AtomicUsize::new(0));
        let table = {
            let counter = counter.clone();
            Arc::new(CallbackTable {
                on_physics_update: Some(Box::new(move |_| {
                    counter.fetch_add(1, Ordering::Relaxed);
                })),
                ..Default::default()
            })
        };

        let live = scene.spawn_entity(layer, "live", Some(table.clone())).unwrap();
        let doomed = scene.spawn_entity(layer, "doomed", Some(table.clone())).unwrap();
        scene.add_component(live, "counter", Some(table.clone())).unwrap();

        scene.dispatch(Phase::PhysicsUpdate, &mut ());
        assert_eq!(counter.load(Ordering::Relaxed), 3);

        scene.destroy_entity(doomed);
        scene.dispatch(Phase::PhysicsUpdate, &mut ());
        assert_eq!(counter.load(Ordering::Relaxed), 5, "pending entity is skipped");
    }

    #[test]
    fn a_panicking_callback_does_not_abort_the_walk() {
        let mut scene = Scene::standalone();
        let (_, layer) = tiny_scene(&mut scene);

        let faulty = Arc::new(CallbackTable {
            on_frame: Some(Box::new(|_| panic!("object misbehaved"))),
            ..Default::default()
        });
        let counter = Arc::new(AtomicUsize::new(0));
        let counting = {
            let counter = counter.clone();
            Arc::new(CallbackTable {
                on_frame: Some(Box::new(move |_| {
                    counter.fetch_add(1, Ordering::Relaxed);
                })),
                ..Default::default()
            })
        };

        scene.spawn_entity(layer, "bad", Some(faulty)).unwrap();
        scene.spawn_entity(layer, "good", Some(counting)).unwrap();

        scene.dispatch(Phase::FrameUpdate, &mut ());
        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn construct_failure_leaves_no_object_behind() {
        let mut scene = Scene::standalone();
        let (_, layer) = tiny_scene(&mut scene);
        let refusing = Arc::new(CallbackTable {
            construct: Some(Box::new(|_| None)),
            ..Default::default()
        });
        let result = scene.spawn_entity(layer, "ghost", Some(refusing));
        assert!(matches!(result, Err(SceneError::ConstructFailed { .. })));
        assert_eq!(scene.layer(layer).unwrap().entity_count(), 0);
    }

    #[test]
    fn duplicate_component_identity_is_rejected_with_the_existing_handle() {
        let mut scene = Scene::standalone();
        let (_, layer) = tiny_scene(&mut scene);
        let entity = scene.spawn_entity(layer, "unit", None).unwrap();
        let first = scene.add_component(entity, "health", None).unwrap();
        assert_eq!(scene.entity(entity).unwrap().find_component("health"), Some(first));
        match scene.add_component(entity, "health", None) {
            Err(SceneError::DuplicateComponent { existing, .. }) => {
                assert_eq!(existing, first);
            }
            other => panic!("expected a duplicate rejection, got {:?}", other.map(|_| ())),
        }
        assert_eq!(scene.entity(entity).unwrap().component_count(), 1);
    }

    #[test]
    fn component_destruction_leaves_the_entity_alive() {
        let mut scene = Scene::standalone();
        let (_, layer) = tiny_scene(&mut scene);
        let entity = scene.spawn_entity(layer, "unit", None).unwrap();
        let health = scene.add_component(entity, "health", None).unwrap();

        assert!(scene.destroy_component(health));
        advance_all(&scene, 2);
        assert_eq!(scene.collect(None, 64), 1);
        assert!(scene.component(health).is_none());
        let entity_ref = scene.entity(entity).unwrap();
        assert!(!entity_ref.lifecycle().is_dead());
        assert_eq!(entity_ref.component_count(), 0);

        // the identity is free again
        assert!(scene.add_component(entity, "health", None).is_ok());
    }

    #[test]
    fn destruct_callbacks_run_during_reclamation_and_teardown() {
        let destructed = Arc::new(AtomicUsize::new(0));
        let table = {
            let destructed = destructed.clone();
            Arc::new(CallbackTable {
                destruct: Some(Box::new(move |_, _| {
                    destructed.fetch_add(1, Ordering::Relaxed);
                })),
                ..Default::default()
            })
        };

        let mut scene = Scene::standalone();
        let (_, layer) = tiny_scene(&mut scene);
        let reclaimed = scene.spawn_entity(layer, "reclaimed", Some(table.clone())).unwrap();
        scene.spawn_entity(layer, "kept", Some(table.clone())).unwrap();

        scene.destroy_entity(reclaimed);
        advance_all(&scene, 2);
        assert_eq!(scene.collect(None, 64), 1);
        assert_eq!(destructed.load(Ordering::Relaxed), 1);

        scene.teardown();
        assert_eq!(destructed.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn large_reclaim_scans_work_through_the_pool() {
        let pool = sync::WorkerPool::new(4);
        let mut scene = Scene::standalone();
        let (_, layer) = tiny_scene(&mut scene);
        for i in 0..400 {
            scene
                .spawn_entity(layer, &format!("bulk {}", i), None)
                .unwrap();
        }
        assert!(scene.destroy_layer(layer));
        advance_all(&scene, 2);
        // 400 entities plus the emptied layer
        assert_eq!(scene.collect(Some(&pool), 32), 401);
        assert!(scene.layer(layer).is_none());
        pool.stop();
    }

    #[test]
    fn presentation_view_follows_published_transforms() {
        let mut scene = Scene::standalone();
        let (_, layer) = tiny_scene(&mut scene);
        let entity = scene.spawn_entity(layer, "shown", None).unwrap();

        scene
            .entity(entity)
            .unwrap()
            .transform()
            .queue_set_position(Vector3::new(8.0, 0.0, 0.0));
        scene.consume_transforms(1);

        scene.sync_transform_views(1.0);
        let entity_ref = scene.entity(entity).unwrap();
        let (tick, world) = entity_ref.transform().viewed_world();
        assert_eq!(tick, 1);
        assert_eq!(world.position.x, 8.0);
        assert_eq!(entity_ref.transform().interpolated().position.x, 8.0);
    }

    #[test]
    fn application_loops_run_and_shut_down_cleanly() {
        let config = RuntimeConfig {
            fixed_delta_ns: 1_000_000,
            min_vary_delta_ns: 500_000,
            reclaim_interval_ns: 2_000_000,
            worker_threads: 2,
            ..Default::default()
        };
        let mut app = Application::<HeadlessUser>::new(config);

        let stepped = Arc::new(AtomicUsize::new(0));
        let destructed = Arc::new(AtomicUsize::new(0));
        {
            let table = {
                let stepped = stepped.clone();
                let destructed = destructed.clone();
                Arc::new(CallbackTable {
                    on_physics_update: Some(Box::new(move |_| {
                        stepped.fetch_add(1, Ordering::Relaxed);
                    })),
                    destruct: Some(Box::new(move |_, _| {
                        destructed.fetch_add(1, Ordering::Relaxed);
                    })),
                    ..Default::default()
                })
            };
            let scene = app.scene();
            let mut scene = scene.write();
            let level = scene.create_level("main", None).unwrap();
            let layer = scene.create_layer(level, "default", None).unwrap();
            scene.spawn_entity(layer, "ticker", Some(table)).unwrap();
        }

        app.start();
        std::thread::sleep(Duration::from_millis(100));
        app.stop();

        let shared = app.shared();
        assert!(shared.ticks.completed(scene::LoopKind::Fixed) > 0);
        assert!(shared.ticks.completed(scene::LoopKind::Vary) > 0);
        assert!(shared.ticks.completed(scene::LoopKind::Reclaim) > 0);
        assert!(stepped.load(Ordering::Relaxed) > 0);
        assert_eq!(destructed.load(Ordering::Relaxed), 1, "teardown ran the destruct hook");
    }
}
