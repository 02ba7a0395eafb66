//! Cross-thread behavior: scope inheritance, shared trackers, and racing
//! sibling publishes

use isotx_core::types::ViewKind;
use isotx_engine::{current, spawn, Cell, Engine, MemStore, Value};
use std::sync::Arc;
use std::thread;

fn setup() -> (Engine, Arc<MemStore>) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let store = Arc::new(MemStore::new());
    (Engine::new(store.clone()), store)
}

#[test]
fn spawned_thread_writes_into_the_inherited_context() {
    let (engine, store) = setup();
    let root = engine.root();
    let cell = Cell::new(&store);

    let ctx = root.create_nested(ViewKind::Mergeable).unwrap();
    let _scope = ctx.enter();

    let worker_cell = cell.clone();
    spawn(move || {
        // `current()` here is the context the spawning thread had.
        worker_cell.set(&current(), 42).unwrap();
    })
    .join()
    .unwrap();

    assert_eq!(cell.get(&ctx).unwrap(), Some(Value::I64(42)));
    assert_eq!(cell.get(&root).unwrap(), None);
    assert!(ctx.try_publish().unwrap().succeeded());
    assert_eq!(cell.get(&root).unwrap(), Some(Value::I64(42)));
}

#[test]
fn tasks_register_concurrently_in_one_context() {
    let (engine, store) = setup();
    let root = engine.root();
    let ctx = root.create_nested(ViewKind::Mergeable).unwrap();

    let mut handles = Vec::new();
    for i in 0..4i64 {
        let ctx = ctx.clone();
        let cell = Cell::new(&store);
        handles.push(thread::spawn(move || {
            ctx.run_task(move || cell.set(&current(), i)).unwrap()
        }));
    }
    let ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let tracker = ctx.tasks().unwrap();
    assert_eq!(tracker.task_count(), 4);
    for id in ids {
        assert_eq!(tracker.writes_of(id).len(), 1);
    }
}

#[test]
fn exactly_one_racing_sibling_publishes() {
    let (engine, store) = setup();
    let root = engine.root();
    let cell = Arc::new(Cell::new(&store));
    cell.set(&root, 0).unwrap();

    let mut handles = Vec::new();
    for i in 0..2i64 {
        let ctx = root.create_nested(ViewKind::Mergeable).unwrap();
        let cell = cell.clone();
        handles.push(thread::spawn(move || {
            cell.set(&ctx, 100 + i).unwrap();
            let result = ctx.try_publish().unwrap();
            if !result.succeeded() {
                ctx.discard().unwrap();
            }
            result.succeeded()
        }));
    }
    let outcomes: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(outcomes.iter().filter(|&&won| won).count(), 1);
    match cell.get(&root).unwrap() {
        Some(Value::I64(v)) => assert!(v == 100 || v == 101),
        other => panic!("expected a winner's value, got {other:?}"),
    }
}
