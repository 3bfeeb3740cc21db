use chaingraph_bus::{BusError, BusMessage, MessageBus, Vocabulary};
use chaingraph_core::BusConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "data", rename_all = "camelCase")]
enum Msg {
    Add(u32),
    Echo(String),
    Search(String),
    Fetched(u32),
    Failed(String),
    Snapshot,
    Disable,
    Reset,
    Unknown,
}

impl BusMessage for Msg {
    fn name(&self) -> &'static str {
        match self {
            Msg::Add(_) => "add",
            Msg::Echo(_) => "echo",
            Msg::Search(_) => "search",
            Msg::Fetched(_) => "fetched",
            Msg::Failed(_) => "failed",
            Msg::Snapshot => "snapshot",
            Msg::Disable => "disable",
            Msg::Reset => "reset",
            Msg::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Default)]
struct Log {
    seen: Vec<String>,
    snapshots: usize,
    disabled: usize,
}

#[derive(Debug, thiserror::Error)]
#[error("broken: {0}")]
struct Broken(String);

fn vocabulary() -> Vocabulary {
    Vocabulary::new()
        .dirty("add")
        .deferred("echo")
        .synchronous("search")
        .deferred("fetched")
        .deferred("failed")
        .deferred("snapshot")
        .synchronous("disable")
        .deferred("reset")
}

fn bus() -> MessageBus<Log, Msg> {
    let mut bus = MessageBus::new(vocabulary(), &BusConfig::default())
        .with_snapshot_message(Msg::Snapshot)
        .unwrap()
        .with_undo_redo_message(Msg::Disable)
        .unwrap();
    bus.subscribe("add", |log: &mut Log, msg, _ctx| {
        if let Msg::Add(n) = msg {
            log.seen.push(format!("add {}", n));
        }
        Ok(())
    })
    .unwrap();
    bus.subscribe("echo", |log: &mut Log, msg, _ctx| {
        if let Msg::Echo(s) = msg {
            log.seen.push(format!("echo {}", s));
        }
        Ok(())
    })
    .unwrap();
    bus.subscribe("search", |log: &mut Log, msg, _ctx| {
        if let Msg::Search(s) = msg {
            log.seen.push(format!("search {}", s));
        }
        Ok(())
    })
    .unwrap();
    bus.subscribe("fetched", |log: &mut Log, msg, _ctx| {
        if let Msg::Fetched(n) = msg {
            log.seen.push(format!("fetched {}", n));
        }
        Ok(())
    })
    .unwrap();
    bus.subscribe("failed", |_log: &mut Log, msg, _ctx| match msg {
        Msg::Failed(reason) => Err(Broken(reason).into()),
        _ => Ok(()),
    })
    .unwrap();
    bus.subscribe("snapshot", |log: &mut Log, _msg, _ctx| {
        log.snapshots += 1;
        Ok(())
    })
    .unwrap();
    bus.subscribe("disable", |log: &mut Log, _msg, _ctx| {
        log.disabled += 1;
        Ok(())
    })
    .unwrap();
    bus.subscribe("reset", |log: &mut Log, _msg, ctx| {
        log.seen.clear();
        ctx.clear_history();
        Ok(())
    })
    .unwrap();
    bus
}

#[tokio::test]
async fn synchronous_message_is_handled_before_publish_returns() {
    let mut bus = bus();
    let mut log = Log::default();

    bus.publish(&mut log, Msg::Search("1A1z".into())).unwrap();
    assert_eq!(log.seen, vec!["search 1A1z"]);

    bus.publish(&mut log, Msg::Echo("later".into())).unwrap();
    assert_eq!(log.seen.len(), 1);

    bus.run_until_idle(&mut log).await.unwrap();
    assert_eq!(log.seen, vec!["search 1A1z", "echo later"]);
}

#[tokio::test]
async fn synchronous_publish_from_handler_runs_before_queued_messages() {
    let mut bus = MessageBus::<Log, Msg>::new(vocabulary(), &BusConfig::default());
    bus.subscribe("add", |log: &mut Log, _msg, ctx| {
        log.seen.push("add".into());
        ctx.publish(Msg::Echo("queued".into()))?;
        ctx.publish(Msg::Search("inline".into()))?;
        log.seen.push("add done".into());
        Ok(())
    })
    .unwrap();
    bus.subscribe("echo", |log: &mut Log, _msg, _ctx| {
        log.seen.push("echo".into());
        Ok(())
    })
    .unwrap();
    bus.subscribe("search", |log: &mut Log, _msg, _ctx| {
        log.seen.push("search".into());
        Ok(())
    })
    .unwrap();

    let mut log = Log::default();
    bus.publish(&mut log, Msg::Add(1)).unwrap();
    bus.run_until_idle(&mut log).await.unwrap();
    assert_eq!(log.seen, vec!["add", "add done", "search", "echo"]);
}

#[test]
fn undeclared_names_fail_fast() {
    let mut bus = MessageBus::<Log, Msg>::new(vocabulary(), &BusConfig::default());
    let mut log = Log::default();

    let err = bus
        .subscribe("unknown", |_: &mut Log, _msg, _ctx| Ok(()))
        .unwrap_err();
    assert!(matches!(err, BusError::UndeclaredMessage(name) if name == "unknown"));

    let err = bus.publish(&mut log, Msg::Unknown).unwrap_err();
    assert!(matches!(err, BusError::UndeclaredMessage(_)));
    assert!(bus.publisher().publish(Msg::Unknown).is_err());
}

#[test]
fn dirty_messages_cannot_be_control_messages() {
    let result = MessageBus::<Log, Msg>::new(vocabulary(), &BusConfig::default())
        .with_snapshot_message(Msg::Add(0));
    assert!(matches!(result, Err(BusError::InvalidControlMessage { .. })));
}

#[tokio::test(start_paused = true)]
async fn dirty_messages_within_the_window_collapse_into_one_snapshot() {
    let mut bus = bus();
    let mut log = Log::default();

    for n in 0..5 {
        bus.publish(&mut log, Msg::Add(n)).unwrap();
        bus.run_for(&mut log, Duration::from_millis(500)).await.unwrap();
        assert_eq!(log.snapshots, 0);
    }
    assert!(bus.snapshot_pending());
    assert_eq!(log.disabled, 5);

    bus.run_until_idle(&mut log).await.unwrap();
    assert_eq!(log.snapshots, 1);
    assert!(!bus.snapshot_pending());
    assert!(bus.is_dirty());
    assert_eq!(bus.stats().snapshots, 1);
}

#[tokio::test(start_paused = true)]
async fn spaced_dirty_messages_each_get_a_snapshot() {
    let mut bus = bus();
    let mut log = Log::default();

    for n in 0..3 {
        bus.publish(&mut log, Msg::Add(n)).unwrap();
        bus.run_for(&mut log, Duration::from_millis(2500)).await.unwrap();
    }
    assert_eq!(log.snapshots, 3);
}

#[tokio::test]
async fn fetch_results_come_back_as_messages() {
    let mut bus = bus();
    let mut log = Log::default();
    let publisher = bus.publisher();

    publisher.map_result(
        async { Ok::<u32, String>(21 * 2) },
        Msg::Fetched,
        |e| Msg::Echo(e),
    );
    publisher.map_result(
        async { Err::<u32, String>("timeout".into()) },
        Msg::Fetched,
        |e| Msg::Echo(e),
    );
    bus.run_for(&mut log, Duration::from_millis(50)).await.unwrap();

    log.seen.sort();
    assert_eq!(log.seen, vec!["echo timeout", "fetched 42"]);
    assert_eq!(bus.stats().fetches, 2);
    assert_eq!(bus.stats().fetches_in_flight, 0);
}

async fn explode() -> Result<u32, String> {
    panic!("backend client panicked")
}

#[tokio::test]
async fn panicking_fetch_does_not_stall_the_loop() {
    let mut bus = bus();
    let mut log = Log::default();
    let publisher = bus.publisher();

    publisher.map_result(explode(), Msg::Fetched, Msg::Echo);
    publisher.map_result(async { Ok::<u32, String>(7) }, Msg::Fetched, Msg::Echo);
    bus.run_until_idle(&mut log).await.unwrap();

    assert_eq!(log.seen, vec!["fetched 7"]);
    assert_eq!(bus.stats().fetches, 2);
    assert_eq!(bus.stats().fetches_in_flight, 0);
}

#[tokio::test]
async fn replay_redispatches_history_without_fetching() {
    let mut bus = MessageBus::<Log, Msg>::new(vocabulary(), &BusConfig::default());
    bus.subscribe("add", |log: &mut Log, msg, ctx| {
        if let Msg::Add(n) = msg {
            log.seen.push(format!("add {}", n));
            ctx.map_result(async move { Ok::<u32, String>(n + 100) }, Msg::Fetched, Msg::Echo);
            ctx.publish(Msg::Echo(format!("after {}", n)))?;
        }
        Ok(())
    })
    .unwrap();
    bus.subscribe("fetched", |log: &mut Log, msg, _ctx| {
        if let Msg::Fetched(n) = msg {
            log.seen.push(format!("fetched {}", n));
        }
        Ok(())
    })
    .unwrap();

    let mut log = Log::default();
    bus.publish(&mut log, Msg::Add(1)).unwrap();
    bus.run_for(&mut log, Duration::from_millis(50)).await.unwrap();
    assert!(log.seen.contains(&"fetched 101".to_string()));
    let fetches = bus.stats().fetches;
    let recorded = bus.history().len();
    assert_eq!(recorded, 3);

    let mut replayed = Log::default();
    bus.replay(&mut replayed).unwrap();
    bus.run_for(&mut replayed, Duration::from_millis(50)).await.unwrap();

    assert_eq!(bus.stats().fetches, fetches);
    assert_eq!(bus.history().len(), recorded);
    assert!(replayed.seen.contains(&"add 1".to_string()));
    assert!(replayed.seen.contains(&"fetched 101".to_string()));
    assert!(bus.stats().suppressed >= 2);
    assert!(!bus.publisher().is_replaying());
}

#[tokio::test]
async fn clearing_history_drops_earlier_entries() {
    let mut bus = bus();
    let mut log = Log::default();
    bus.publish(&mut log, Msg::Echo("one".into())).unwrap();
    bus.publish(&mut log, Msg::Reset).unwrap();
    bus.publish(&mut log, Msg::Echo("two".into())).unwrap();
    bus.run_until_idle(&mut log).await.unwrap();

    let names: Vec<&str> = bus.history().iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["echo"]);
    assert_eq!(log.seen, vec!["echo two"]);
}

#[tokio::test]
async fn handler_errors_surface_with_their_source() {
    let mut bus = bus();
    let mut log = Log::default();
    bus.publish(&mut log, Msg::Failed("no entity".into())).unwrap();
    let err = bus.run_until_idle(&mut log).await.unwrap_err();
    assert_eq!(err.handler_error::<Broken>().map(|b| b.0.as_str()), Some("no entity"));
}

#[test]
fn history_round_trips_through_json() -> anyhow::Result<()> {
    let mut bus = bus();
    let mut log = Log::default();
    bus.publish(&mut log, Msg::Search("abc".into()))?;
    bus.publish(&mut log, Msg::Search("abcd".into()))?;
    let json = bus.history_json()?;

    let mut fresh = self::bus();
    fresh.load_history_json(&json)?;
    let messages: Vec<Msg> = fresh.history().iter().map(|e| e.message.clone()).collect();
    assert_eq!(
        messages,
        vec![Msg::Search("abc".into()), Msg::Search("abcd".into())]
    );

    let mut replayed = Log::default();
    fresh.replay(&mut replayed)?;
    assert_eq!(replayed.seen, vec!["search abc", "search abcd"]);
    Ok(())
}

#[test]
fn history_with_undeclared_names_is_rejected() {
    let mut bus = bus();
    let json = r#"[{"name":"unknown","message":{"name":"unknown"},"recorded_at":"2024-01-01T00:00:00Z"}]"#;
    assert!(bus.load_history_json(json).is_err());
}

#[test]
fn deferred_dispatch_under_block_on() {
    let mut bus = bus();
    let mut log = Log::default();
    tokio_test::block_on(async {
        bus.publish(&mut log, Msg::Echo("x".into())).unwrap();
        bus.run_until_idle(&mut log).await.unwrap();
    });
    assert_eq!(log.seen, vec!["echo x"]);
}
