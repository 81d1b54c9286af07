//! Integration tests for bitmask-ecs

use std::{
    collections::BTreeSet,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
};

use bitmask_ecs::{Component, Entity, EntityId, Manager, Signature, View};
use rand::{Rng, SeedableRng, rngs::StdRng};

// ============================================================================
// Test Components
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
struct Walk {
    direction: &'static str,
    distance: f64,
}

#[derive(Debug, Clone, PartialEq)]
struct Talk {
    message: &'static str,
}

fn id_set(ids: impl IntoIterator<Item = EntityId>) -> BTreeSet<EntityId> {
    ids.into_iter().collect()
}

fn assert_view_matches_query(manager: &Manager, view: &View) {
    assert_eq!(
        id_set(view.get().ids()),
        id_set(manager.query(view.signature()).ids()),
        "view on {:?} diverged from query",
        view.signature()
    );
}

// ============================================================================
// Walk / Talk Scenario
// ============================================================================

#[test]
fn test_walk_talk_scenario() {
    let manager = Manager::new();
    let walk = manager.new_component::<Walk>().unwrap();
    let talk = manager.new_component::<Talk>().unwrap();

    assert_eq!(walk.signature().bits(), 0b01);
    assert_eq!(talk.signature().bits(), 0b10);

    let talkers_view = manager.create_view(bitmask_ecs::signature![talk]);

    let e1 = manager.new_entity();
    e1.add_component(
        &walk,
        Walk {
            direction: "north",
            distance: 12.4,
        },
    )
    .add_component(
        &talk,
        Talk {
            message: "Fluctuat nec mergitur.",
        },
    );

    let e2 = manager.new_entity();
    e2.add_component(
        &walk,
        Walk {
            direction: "east",
            distance: 3.5,
        },
    );

    let e3 = manager.new_entity();

    let walkers = bitmask_ecs::signature![walk];
    let talkers = bitmask_ecs::signature![talk];
    let walker_talkers = bitmask_ecs::signature![walkers, talkers];

    assert_eq!(id_set(manager.query(walkers).ids()), id_set([e1.id(), e2.id()]));
    assert_eq!(id_set(manager.query(talkers).ids()), id_set([e1.id()]));
    assert_eq!(manager.query(walker_talkers).ids(), vec![e1.id()]);

    // E3 starts talking after the view exists
    assert_eq!(talkers_view.get().ids(), vec![e1.id()]);
    e3.add_component(&talk, Talk { message: "Wassup?" });
    assert_eq!(id_set(talkers_view.get().ids()), id_set([e1.id(), e3.id()]));
    assert_eq!(id_set(manager.query(talkers).ids()), id_set([e1.id(), e3.id()]));

    // Payloads come back through query results
    let both = manager.query(walker_talkers);
    let result = &both[0];
    assert_eq!(result.get(&walk).unwrap().direction, "north");
    assert_eq!(result.get(&talk).unwrap().message, "Fluctuat nec mergitur.");

    manager.dispose_entities([&e1, &e3]);

    assert!(talkers_view.is_empty());
    assert!(manager.query(talkers).is_empty());
    assert_eq!(manager.query(walkers).ids(), vec![e2.id()]);
}

#[test]
fn test_dispose_query_results() {
    let manager = Manager::new();
    let walk = manager.new_component::<Walk>().unwrap();
    let talk = manager.new_component::<Talk>().unwrap();

    for _ in 0..3 {
        manager
            .new_entity()
            .add_component(
                &walk,
                Walk {
                    direction: "south",
                    distance: 1.0,
                },
            )
            .add_component(&talk, Talk { message: "hi" });
    }
    let loner = manager.new_entity();
    loner.add_component(&talk, Talk { message: "alone" });

    let walker_talkers = manager.query(bitmask_ecs::signature![walk, talk]);
    assert_eq!(manager.dispose_entities(&walker_talkers.entities()), 3);

    assert_eq!(manager.entity_count(), 1);
    assert!(walk.is_empty());
    assert_eq!(talk.len(), 1);
    assert_eq!(manager.query(Signature::EMPTY).ids(), vec![loner.id()]);
}

// ============================================================================
// Attach / Detach Properties
// ============================================================================

#[test]
fn test_add_then_has_and_get() {
    let manager = Manager::new();
    let talk = manager.new_component::<Talk>().unwrap();
    let entity = manager.new_entity();

    entity.add_component(&talk, Talk { message: "hello" });

    assert!(entity.has_component(&talk));
    assert_eq!(
        entity.get_component_data(&talk).as_deref(),
        Some(&Talk { message: "hello" })
    );
}

#[test]
fn test_remove_then_absent() {
    let manager = Manager::new();
    let talk = manager.new_component::<Talk>().unwrap();
    let entity = manager.new_entity();

    entity.add_component(&talk, Talk { message: "hello" });
    entity.remove_component(&talk);

    assert!(!entity.has_component(&talk));
    assert!(entity.get_component_data(&talk).is_none());
}

#[test]
fn test_remove_never_attached_is_noop() {
    let manager = Manager::new();
    let walk = manager.new_component::<Walk>().unwrap();
    let talk = manager.new_component::<Talk>().unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = Arc::clone(&calls);
    talk.set_destructor(move |_, _| {
        calls_clone.fetch_add(1, Ordering::SeqCst);
    });

    let entity = manager.new_entity();
    entity.add_component(
        &walk,
        Walk {
            direction: "west",
            distance: 2.0,
        },
    );
    let before = entity.signature();

    entity.remove_component(&talk);

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(entity.signature(), before);
    assert!(entity.has_component(&walk));
}

#[test]
fn test_destructor_receives_detached_payload() {
    let manager = Manager::new();
    let talk = manager.new_component::<Talk>().unwrap();

    let farewells = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let farewells_clone = Arc::clone(&farewells);
    talk.set_destructor(move |entity: &Entity, payload: &Talk| {
        farewells_clone.lock().push((entity.id(), payload.message));
    });

    let a = manager.new_entity();
    let b = manager.new_entity();
    a.add_component(&talk, Talk { message: "bye from a" });
    b.add_component(&talk, Talk { message: "bye from b" });

    a.remove_component(&talk);
    manager.dispose_entity(&b);

    assert_eq!(
        *farewells.lock(),
        vec![(a.id(), "bye from a"), (b.id(), "bye from b")]
    );
}

// ============================================================================
// View Consistency
// ============================================================================

#[test]
fn test_views_track_queries_through_mutations() {
    let manager = Manager::new();
    let components: Vec<Component<u32>> = (0..4)
        .map(|_| manager.new_component::<u32>().unwrap())
        .collect();

    let a = components[0].signature();
    let b = components[1].signature();
    let c = components[2].signature();

    let mut views = vec![
        manager.create_view(a),
        manager.create_view(a | b),
        manager.create_view(b.inverse()),
        manager.create_view((a | c).inverse()),
        manager.create_view(Signature::EMPTY),
    ];

    let mut entities: Vec<Entity> = (0..8).map(|_| manager.new_entity()).collect();
    let mut rng = StdRng::seed_from_u64(42);

    for step in 0..500 {
        match rng.gen_range(0..10) {
            0 => entities.push(manager.new_entity()),
            1 if !entities.is_empty() => {
                let entity = entities.swap_remove(rng.gen_range(0..entities.len()));
                manager.dispose_entity(&entity);
            }
            2 if step % 50 == 0 => {
                // A view created mid-stream must start out consistent too
                views.push(manager.create_view(b | c));
            }
            _ if !entities.is_empty() => {
                let entity = &entities[rng.gen_range(0..entities.len())];
                let component = &components[rng.gen_range(0..components.len())];
                if rng.gen_bool(0.5) {
                    entity.add_component(component, step);
                } else {
                    entity.remove_component(component);
                }
            }
            _ => {}
        }

        for view in &views {
            assert_view_matches_query(&manager, view);
        }
    }

    // Signature bits agree with payload presence everywhere
    for entity in &entities {
        for component in &components {
            assert_eq!(entity.has_component(component), component.has(entity));
        }
    }
}

#[test]
fn test_disposed_entity_leaves_every_view() {
    let manager = Manager::new();
    let walk = manager.new_component::<Walk>().unwrap();
    let talk = manager.new_component::<Talk>().unwrap();

    let views = [
        manager.create_view(walk.signature()),
        manager.create_view(talk.signature()),
        manager.create_view(walk.signature() | talk.signature()),
        manager.create_view(walk.signature().inverse()),
        manager.create_view(Signature::EMPTY),
    ];

    let entity = manager.new_entity();
    entity
        .add_component(
            &walk,
            Walk {
                direction: "up",
                distance: 0.5,
            },
        )
        .add_component(&talk, Talk { message: "gone soon" });
    let silent = manager.new_entity();

    manager.dispose_entity(&entity);
    manager.dispose_entity(&silent);

    for view in &views {
        assert!(view.is_empty(), "{view:?} still holds a disposed entity");
    }
    for signature in [
        Signature::EMPTY,
        walk.signature(),
        talk.signature().inverse(),
    ] {
        assert!(manager.query(signature).is_empty());
    }
    assert!(walk.is_empty());
    assert!(talk.is_empty());
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_concurrent_attach_loses_no_updates() {
    const THREADS: usize = 8;
    const ENTITIES_PER_THREAD: usize = 64;

    let manager = Manager::new();
    let components: Vec<Component<usize>> = (0..THREADS)
        .map(|_| manager.new_component::<usize>().unwrap())
        .collect();
    let all_bits = components
        .iter()
        .fold(Signature::EMPTY, |acc, component| acc.with(component));
    let everyone = manager.create_view(all_bits);

    let entities: Vec<Entity> = (0..ENTITIES_PER_THREAD)
        .map(|_| manager.new_entity())
        .collect();

    // Each thread owns one component and attaches it to every entity, in a
    // different order per thread.
    thread::scope(|scope| {
        for (t, component) in components.iter().enumerate() {
            let entities = &entities;
            scope.spawn(move || {
                for i in 0..ENTITIES_PER_THREAD {
                    let entity = &entities[(i + t * 7) % ENTITIES_PER_THREAD];
                    entity.add_component(component, t * 1000 + i);
                }
            });
        }
    });

    for entity in &entities {
        assert_eq!(entity.signature(), all_bits);
        for (t, component) in components.iter().enumerate() {
            let payload = entity.get_component_data(component).unwrap();
            assert_eq!(*payload / 1000, t);
        }
    }
    assert_eq!(everyone.len(), ENTITIES_PER_THREAD);
    assert_view_matches_query(&manager, &everyone);
}

#[test]
fn test_concurrent_entity_creation_and_disposal() {
    const THREADS: usize = 4;
    const PER_THREAD: usize = 200;

    let manager = Manager::new();
    let tag = manager.new_component::<()>().unwrap();
    let tagged = manager.create_view(tag.signature());
    let untagged = manager.create_view(tag.signature().inverse());

    let kept: Vec<Vec<Entity>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let manager = manager.clone();
                let tag = tag.clone();
                scope.spawn(move || {
                    let mut kept = Vec::new();
                    for i in 0..PER_THREAD {
                        let entity = manager.new_entity();
                        entity.add_component(&tag, ());
                        if i % 2 == 0 {
                            manager.dispose_entity(&entity);
                        } else {
                            kept.push(entity);
                        }
                    }
                    kept
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect()
    });

    let kept_ids = id_set(kept.iter().flatten().map(Entity::id));
    assert_eq!(kept_ids.len(), THREADS * PER_THREAD / 2);
    assert_eq!(manager.entity_count(), kept_ids.len());
    assert_eq!(id_set(tagged.get().ids()), kept_ids);
    assert!(untagged.is_empty());
    assert_eq!(tag.len(), kept_ids.len());
}

#[test]
fn test_concurrent_detach_and_reattach_of_one_component() {
    const ROUNDS: usize = 500;

    let manager = Manager::new();
    let marker = manager.new_component::<usize>().unwrap();
    let anchor = manager.new_component::<usize>().unwrap();
    let both = manager.create_view(bitmask_ecs::signature![marker, anchor]);
    let without_marker = manager.create_view(marker.signature().inverse());

    let entities: Vec<Entity> = (0..4).map(|_| manager.new_entity()).collect();
    for entity in &entities {
        entity.add_component(&marker, 0);
    }

    thread::scope(|scope| {
        for t in 0..3 {
            let entities = &entities;
            let marker = &marker;
            let anchor = &anchor;
            scope.spawn(move || {
                for round in 0..ROUNDS {
                    let entity = &entities[(round + t) % entities.len()];
                    match (round + t) % 3 {
                        0 => {
                            entity.remove_component(marker);
                        }
                        1 => {
                            entity.add_component(marker, round);
                        }
                        _ => {
                            entity.add_component(anchor, round);
                        }
                    }
                }
            });
        }
    });

    assert_view_matches_query(&manager, &both);
    assert_view_matches_query(&manager, &without_marker);
    for entity in &entities {
        assert_eq!(entity.has_component(&marker), marker.has(entity));
        assert_eq!(entity.has_component(&anchor), anchor.has(entity));
    }
}
