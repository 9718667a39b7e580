//! Integration tests for fifobell
//!
//! These tests drive the whole runtime through real FIFOs and check the
//! observable ordering of status events, then exercise the `fb` binary.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::thread;
use std::time::{Duration, Instant};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use tokio::sync::broadcast::Receiver;

use fifobell::channel::{self, announce};
use fifobell::events::{Event, EventBus};
use fifobell::runtime::{Runtime, RuntimeConfig};
use fifobell::trigger::TriggerConfig;
use fifobell::worker::FanoutPolicy;
use fifobell::{RunSummary, TriggerError};

// =============================================================================
// Helpers
// =============================================================================

/// Collected events with their arrival times
struct Recorder {
    rx: Receiver<Event>,
    seen: Vec<(Instant, Event)>,
}

impl Recorder {
    fn new(bus: &EventBus) -> Self {
        Self {
            rx: bus.subscribe(),
            seen: Vec::new(),
        }
    }

    /// Pull events until `pred` matches one, returning it
    fn until(&mut self, timeout: Duration, pred: impl Fn(&Event) -> bool) -> Option<Event> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            match self.rx.try_recv() {
                Ok(event) => {
                    let hit = pred(&event);
                    self.seen.push((Instant::now(), event.clone()));
                    if hit {
                        return Some(event);
                    }
                }
                Err(_) => thread::sleep(Duration::from_millis(2)),
            }
        }
        None
    }

    /// Pull whatever arrives within `window`
    fn settle(&mut self, window: Duration) {
        self.until(window, |_| false);
    }

    fn ready(&mut self, seq: u64) -> PathBuf {
        match self.until(Duration::from_secs(5), |e| {
            matches!(e, Event::ChannelReady { seq: s, .. } if *s == seq)
        }) {
            Some(Event::ChannelReady { path, .. }) => path,
            other => panic!("expected ChannelReady #{}, got {:?}", seq, other),
        }
    }

    fn position(&self, pred: impl Fn(&Event) -> bool) -> Option<usize> {
        self.seen.iter().position(|(_, e)| pred(e))
    }

    fn at(&self, pred: impl Fn(&Event) -> bool) -> Option<Instant> {
        self.seen.iter().find(|(_, e)| pred(e)).map(|(t, _)| *t)
    }

    fn completions(&self) -> Vec<(usize, u64)> {
        self.seen
            .iter()
            .filter_map(|(_, e)| match e {
                Event::WorkerCompleted { worker, generation } => Some((*worker, *generation)),
                _ => None,
            })
            .collect()
    }
}

fn runtime_config(dir: &Path, workers: usize, fanout: FanoutPolicy, delay: Duration, max: Option<u64>) -> RuntimeConfig {
    RuntimeConfig {
        workers,
        fanout,
        trigger: TriggerConfig {
            channel_dir: dir.to_path_buf(),
            processing_delay: delay,
            max_triggers: max,
            ..Default::default()
        },
    }
}

fn join_within(runtime: Runtime, timeout: Duration) -> RunSummary {
    let start = Instant::now();
    let summary = runtime.join().expect("runtime should stop cleanly");
    assert!(start.elapsed() < timeout, "join took {:?}", start.elapsed());
    summary
}

// =============================================================================
// Runtime Scenarios
// =============================================================================

#[test]
fn test_idle_workers_wait_and_do_nothing() {
    let temp = TempDir::new().unwrap();
    let bus = EventBus::new(256);
    let mut rec = Recorder::new(&bus);

    let runtime = Runtime::start(
        runtime_config(temp.path(), 2, FanoutPolicy::Broadcast, Duration::from_millis(50), None),
        &bus,
    )
    .unwrap();
    let path = rec.ready(1);
    rec.settle(Duration::from_millis(200));

    let waiting = rec.seen.iter().filter(|(_, e)| matches!(e, Event::WorkerWaiting { .. })).count();
    assert_eq!(waiting, 2);
    assert!(rec.completions().is_empty());
    assert!(!runtime.event().is_set());
    assert_eq!(runtime.event().generation(), 0);

    runtime.stopper().stop();
    let summary = join_within(runtime, Duration::from_secs(2));
    assert_eq!(summary.completed(), 0);
    assert!(!path.exists());
}

#[test]
fn test_single_trigger_reaches_every_worker_after_drain() {
    let temp = TempDir::new().unwrap();
    let bus = EventBus::new(256);
    let mut rec = Recorder::new(&bus);

    let runtime = Runtime::start(
        runtime_config(temp.path(), 2, FanoutPolicy::Broadcast, Duration::from_millis(50), None),
        &bus,
    )
    .unwrap();
    let path = rec.ready(1);
    channel::fire(&path, b"hello world").unwrap();
    rec.ready(2);
    rec.settle(Duration::from_millis(100));

    let drained = rec
        .position(|e| matches!(e, Event::ChannelDrained { seq: 1, bytes: 11 }))
        .expect("drained");
    let signaled = rec
        .position(|e| matches!(e, Event::Signaled { seq: 1, generation: 1 }))
        .expect("signaled");
    let removed = rec
        .position(|e| matches!(e, Event::ChannelRemoved { seq: 1, .. }))
        .expect("removed");
    let next_ready = rec
        .position(|e| matches!(e, Event::ChannelReady { seq: 2, .. }))
        .expect("second channel");
    assert!(drained < signaled);
    assert!(signaled < removed);
    assert!(removed < next_ready);

    let mut done = rec.completions();
    done.sort();
    assert_eq!(done, vec![(1, 1), (2, 1)]);
    let first_completion = rec
        .position(|e| matches!(e, Event::WorkerCompleted { .. }))
        .expect("completion");
    // Workers run on their own threads, so a completion is only ordered after
    // the signal; it may land before or after the next channel is ready
    assert!(signaled < first_completion);

    runtime.stopper().stop();
    let summary = join_within(runtime, Duration::from_secs(2));
    assert_eq!(summary.triggers, 1);
    assert_eq!(summary.completed(), 2);
}

#[test]
fn test_cancel_while_waiting_removes_channel() {
    let temp = TempDir::new().unwrap();
    let bus = EventBus::new(256);
    let mut rec = Recorder::new(&bus);

    let runtime = Runtime::start(
        runtime_config(temp.path(), 3, FanoutPolicy::Broadcast, Duration::from_secs(30), None),
        &bus,
    )
    .unwrap();
    let path = rec.ready(1);
    assert!(path.exists());

    runtime.stopper().stop();
    let summary = join_within(runtime, Duration::from_secs(2));
    assert_eq!(summary.triggers, 0);
    assert_eq!(summary.workers.len(), 3);
    assert!(!path.exists());
    assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);

    rec.settle(Duration::from_millis(100));
    assert!(rec.position(|e| matches!(e, Event::ChannelRemoved { seq: 1, .. })).is_some());
    assert!(rec.position(|e| matches!(e, Event::Signaled { .. })).is_none());
}

#[test]
fn test_next_channel_waits_for_processing_delay() {
    let delay = Duration::from_millis(300);
    let temp = TempDir::new().unwrap();
    let bus = EventBus::new(256);
    let mut rec = Recorder::new(&bus);

    let runtime = Runtime::start(runtime_config(temp.path(), 1, FanoutPolicy::Broadcast, delay, None), &bus).unwrap();
    let first = rec.ready(1);
    channel::fire(&first, b"one").unwrap();
    rec.until(Duration::from_secs(5), |e| matches!(e, Event::ChannelDrained { seq: 1, .. }))
        .expect("drained");

    // Nobody is reading the old channel during the delay
    let err = channel::fire(&first, b"two").unwrap_err();
    assert!(
        matches!(err, TriggerError::NotListening(_) | TriggerError::Open { .. }),
        "{:?}",
        err
    );

    let second = rec.ready(2);
    assert_ne!(first, second);
    let drained_at = rec
        .at(|e| matches!(e, Event::ChannelDrained { seq: 1, .. }))
        .expect("drained");
    let ready_at = rec
        .at(|e| matches!(e, Event::ChannelReady { seq: 2, .. }))
        .expect("ready");
    assert!(ready_at.duration_since(drained_at) >= delay - Duration::from_millis(20));

    runtime.stopper().stop();
    join_within(runtime, Duration::from_secs(2));
}

#[test]
fn test_channels_are_unique_and_removed() {
    let temp = TempDir::new().unwrap();
    let bus = EventBus::new(1024);
    let mut rec = Recorder::new(&bus);

    let runtime = Runtime::start(
        runtime_config(temp.path(), 2, FanoutPolicy::Broadcast, Duration::from_millis(5), Some(4)),
        &bus,
    )
    .unwrap();

    let mut paths = Vec::new();
    for seq in 1..=4 {
        let path = rec.ready(seq);
        let listed: Vec<_> = fs::read_dir(temp.path()).unwrap().collect();
        assert_eq!(listed.len(), 1, "exactly one channel dir exists while listening");
        channel::fire(&path, format!("trigger {}", seq).as_bytes()).unwrap();
        paths.push(path);
    }

    let summary = join_within(runtime, Duration::from_secs(5));
    assert_eq!(summary.triggers, 4);

    let mut unique = paths.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), 4);
    assert!(paths.iter().all(|p| !p.exists() && !p.parent().is_some_and(Path::exists)));
    assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
}

#[test]
fn test_every_worker_completes_exactly_once_per_trigger() {
    let temp = TempDir::new().unwrap();
    let bus = EventBus::new(1024);
    let mut rec = Recorder::new(&bus);

    let runtime = Runtime::start(
        runtime_config(temp.path(), 4, FanoutPolicy::Broadcast, Duration::from_millis(5), Some(3)),
        &bus,
    )
    .unwrap();
    for seq in 1..=3 {
        let path = rec.ready(seq);
        channel::fire(&path, b"x").unwrap();
    }

    let summary = join_within(runtime, Duration::from_secs(5));
    rec.settle(Duration::from_millis(100));

    assert!(summary.workers.iter().all(|w| w.completed == 3), "{:?}", summary);
    let mut done = rec.completions();
    done.sort();
    let expected: Vec<_> = (1..=4).flat_map(|w| (1..=3).map(move |g| (w, g))).collect();
    assert_eq!(done, expected);
}

#[test]
fn test_exclusive_fanout_one_worker_per_trigger() {
    let temp = TempDir::new().unwrap();
    let bus = EventBus::new(1024);
    let mut rec = Recorder::new(&bus);

    let runtime = Runtime::start(
        runtime_config(temp.path(), 3, FanoutPolicy::Exclusive, Duration::from_millis(5), Some(2)),
        &bus,
    )
    .unwrap();
    for seq in 1..=2 {
        let path = rec.ready(seq);
        channel::fire(&path, b"x").unwrap();
        rec.until(Duration::from_secs(5), |e| matches!(e, Event::WorkerCompleted { .. }))
            .expect("one completion");
    }

    let summary = join_within(runtime, Duration::from_secs(5));
    assert_eq!(summary.triggers, 2);
    assert_eq!(summary.completed(), 2);
}

// =============================================================================
// CLI Tests
// =============================================================================

fn write_config(temp: &TempDir) -> (PathBuf, PathBuf) {
    let announce_file = temp.path().join("run").join("channel");
    let channels = temp.path().join("channels");
    fs::create_dir_all(&channels).unwrap();
    let config = temp.path().join("fifobell.yml");
    fs::write(
        &config,
        format!(
            "workers: 2\nprocessing-delay-ms: 10\nchannel:\n  dir: {}\n  announce-file: {}\n",
            channels.display(),
            announce_file.display()
        ),
    )
    .unwrap();
    (config, announce_file)
}

#[test]
fn test_cli_help_lists_commands() {
    Command::cargo_bin("fb")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("trigger"))
        .stdout(predicate::str::contains("Announce file:"));
}

#[test]
fn test_cli_help_uses_configured_announce_file() {
    let temp = TempDir::new().unwrap();
    let (config, announce_file) = write_config(&temp);

    Command::cargo_bin("fb")
        .unwrap()
        .arg("--config")
        .arg(&config)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("Announce file: {}", announce_file.display())));
}

#[test]
fn test_cli_trigger_missing_channel_fails() {
    let temp = TempDir::new().unwrap();
    let (config, _) = write_config(&temp);

    Command::cargo_bin("fb")
        .unwrap()
        .args(["-c", config.to_str().unwrap(), "trigger", "--channel"])
        .arg(temp.path().join("nope"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to trigger"));
}

#[test]
fn test_cli_channel_without_coordinator_fails() {
    let temp = TempDir::new().unwrap();
    let (config, _) = write_config(&temp);

    Command::cargo_bin("fb")
        .unwrap()
        .args(["-c", config.to_str().unwrap(), "channel"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No channel announced"));
}

#[test]
fn test_cli_run_zero_workers_is_rejected() {
    let temp = TempDir::new().unwrap();
    let (config, _) = write_config(&temp);

    Command::cargo_bin("fb")
        .unwrap()
        .args(["-c", config.to_str().unwrap(), "run", "--workers", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("workers must be at least 1"));
}

#[test]
fn test_cli_run_and_trigger_end_to_end() {
    let temp = TempDir::new().unwrap();
    let (config, announce_file) = write_config(&temp);
    let config = config.to_str().unwrap().to_string();

    let mut run = std::process::Command::new(assert_cmd::cargo::cargo_bin("fb"))
        .args(["-c", &config, "run", "-n", "1", "--format", "json"])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    let channel = announce::wait_for_channel(&announce_file, None, Duration::from_secs(10))
        .unwrap()
        .expect("coordinator announced a channel");

    Command::cargo_bin("fb")
        .unwrap()
        .args(["-c", &config, "channel"])
        .assert()
        .success()
        .stdout(predicate::str::contains(channel.to_str().unwrap()));

    Command::cargo_bin("fb")
        .unwrap()
        .args(["-c", &config, "trigger", "-m", "ping"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Triggered"));

    let output = run.wait_with_output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let completed = stdout
        .lines()
        .filter(|l| l.contains("\"type\":\"WorkerCompleted\""))
        .count();
    assert_eq!(completed, 2, "{}", stdout);
    assert!(!channel.exists());
    assert_eq!(announce::read(&announce_file).unwrap(), None);
}
