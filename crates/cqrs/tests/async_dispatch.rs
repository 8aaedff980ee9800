//! Awaiting dispatch handles from async code.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use keel_cqrs::{
    BusConfig, Buses, Command, MessageKind, Query, ResultCommand, WorkerPool, command_handler,
    query_handler, result_handler,
};
use tokio::runtime::Handle;

#[derive(Debug)]
struct Touch;

impl Command for Touch {}

#[derive(Debug)]
struct Double(u64);

impl ResultCommand for Double {
    type Output = u64;
}

#[derive(Debug)]
struct Echo(&'static str);

impl Query for Echo {
    type Output = String;
}

fn buses_on_current_runtime() -> Buses {
    keel_observability::init_for_tests();
    let pool = WorkerPool::from_handle(Handle::current(), &BusConfig::default().with_name("async"));
    Buses::new(Arc::new(pool))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn handles_resolve_when_awaited() {
    let buses = buses_on_current_runtime();
    let touched = Arc::new(AtomicUsize::new(0));
    let counter = touched.clone();
    buses.commands().register(
        command_handler(move |_: &Touch| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
        MessageKind::of::<Touch>(),
    );
    buses.commands().register_result(result_handler(|cmd: &Double| Ok(cmd.0 * 2)));
    buses.queries().register(query_handler(|q: &Echo| Ok(q.0.to_uppercase())));

    assert!(buses.commands().send(Touch).await.unwrap());
    assert_eq!(buses.commands().send_result(Double(21)).await.unwrap(), 42);
    assert_eq!(buses.queries().send(Echo("hi")).await.unwrap(), "HI");
    assert_eq!(touched.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn awaiting_does_not_block_the_runtime() {
    let buses = buses_on_current_runtime();
    buses.queries().register(query_handler(|q: &Echo| {
        std::thread::sleep(Duration::from_millis(50));
        Ok(q.0.to_string())
    }));

    let slow = buses.queries().send(Echo("slow"));
    let ticker = tokio::spawn(async {
        tokio::time::sleep(Duration::from_millis(1)).await;
        "tick"
    });

    assert_eq!(ticker.await.unwrap(), "tick");
    assert_eq!(slow.await.unwrap(), "slow");
}

#[tokio::test]
async fn missing_handler_resolves_immediately() {
    let buses = buses_on_current_runtime();

    let err = buses.queries().send(Echo("nobody")).await.unwrap_err();
    assert!(err.is_no_handler());
    assert!(!buses.commands().send(Touch).await.unwrap());
    assert_eq!(buses.pool().stats().submitted, 0);
}
