#![cfg(unix)]

use async_trait::async_trait;
use oxtrap_agent::config::{ConfigError, TrapConfig};
use oxtrap_agent::scheduler::{RuleScheduler, RuleTask};
use oxtrap_collector::{CommandError, CommandRunner, ShellRunner};
use oxtrap_common::types::{Receiver, TrapValue, ValueType};
use oxtrap_common::Oid;
use oxtrap_notify::error::Result as DispatchResult;
use oxtrap_notify::pdu::{severity_oid, snmp_trap_oid, TrapMessage};
use oxtrap_notify::registry::ReceiverRegistry;
use oxtrap_notify::sessions::UdpSessionOpener;
use oxtrap_notify::{SessionOpener, TrapDispatcher, TrapSession};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;

const ROOT: &str = "1.3.6.1.4.1.12345";

struct CountingRunner {
    calls: AtomicUsize,
    fail: bool,
    delay: Duration,
}

impl CountingRunner {
    fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail,
            delay: Duration::ZERO,
        })
    }

    fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: false,
            delay,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommandRunner for CountingRunner {
    async fn execute(&self, _command: &str, value_type: ValueType) -> Result<TrapValue, CommandError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if self.fail {
            return Err(CommandError::Conversion {
                output: "garbage".into(),
                expected: value_type,
            });
        }
        Ok(TrapValue::Integer(1))
    }
}

async fn listener() -> (UdpSocket, u16) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = socket.local_addr().unwrap().port();
    (socket, port)
}

/// Varbind values the receiver saw, keyed by dotted OID.
#[derive(Debug, Clone, PartialEq)]
enum Seen {
    Integer(i64),
    Text(String),
    Oid(String),
    Other,
}

struct Trap {
    community: Vec<u8>,
    request_id: i32,
    varbinds: Vec<(String, Seen)>,
}

impl Trap {
    fn value_of(&self, oid: &Oid) -> Option<&Seen> {
        let oid = oid.to_string();
        self.varbinds
            .iter()
            .find(|(name, _)| *name == oid)
            .map(|(_, value)| value)
    }

    fn text_of(&self, oid: &Oid) -> Option<&str> {
        match self.value_of(oid) {
            Some(Seen::Text(text)) => Some(text),
            _ => None,
        }
    }

    fn trap_oid(&self) -> Option<Oid> {
        match self.value_of(&snmp_trap_oid()) {
            Some(Seen::Oid(oid)) => oid.parse().ok(),
            _ => None,
        }
    }
}

async fn recv_trap(socket: &UdpSocket, wait: Duration) -> Option<Trap> {
    let mut buf = [0u8; 2048];
    let (len, _) = tokio::time::timeout(wait, socket.recv_from(&mut buf))
        .await
        .ok()?
        .ok()?;

    let pdu = snmp2::Pdu::from_bytes(&buf[..len]).expect("receiver got an undecodable datagram");
    assert_eq!(pdu.message_type, snmp2::MessageType::Trap);
    let community = pdu.community.to_vec();
    let request_id = pdu.req_id;
    let varbinds = pdu
        .varbinds
        .map(|(name, value)| {
            let seen = match value {
                snmp2::Value::Integer(v) => Seen::Integer(v),
                snmp2::Value::OctetString(bytes) => {
                    Seen::Text(String::from_utf8_lossy(bytes).into_owned())
                }
                snmp2::Value::ObjectIdentifier(oid) => Seen::Oid(oid.to_id_string()),
                _ => Seen::Other,
            };
            (name.to_id_string(), seen)
        })
        .collect();

    Some(Trap {
        community,
        request_id,
        varbinds,
    })
}

/// Wraps UDP sessions and tracks how many are still alive.
#[derive(Default)]
struct TrackingOpener {
    live: Arc<AtomicUsize>,
}

impl TrackingOpener {
    fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

struct TrackedSession {
    inner: Box<dyn TrapSession>,
    live: Arc<AtomicUsize>,
}

impl Drop for TrackedSession {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl TrapSession for TrackedSession {
    async fn send(&self, message: &TrapMessage) -> DispatchResult<()> {
        self.inner.send(message).await
    }

    fn receiver_id(&self) -> &str {
        self.inner.receiver_id()
    }

    fn endpoint(&self) -> String {
        self.inner.endpoint()
    }
}

#[async_trait]
impl SessionOpener for TrackingOpener {
    async fn open(&self, receiver: &Receiver) -> DispatchResult<Box<dyn TrapSession>> {
        let inner = UdpSessionOpener.open(receiver).await?;
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(TrackedSession {
            inner,
            live: self.live.clone(),
        }))
    }
}

fn config(port: u16, rules: &str) -> TrapConfig {
    let content = format!(
        r#"
        oid_root = "{ROOT}"

        [[receivers]]
        id = "r1"
        host = "127.0.0.1"
        port = {port}
        community = "public"

        {rules}
        "#
    );
    TrapConfig::from_toml_str(&content).unwrap()
}

const CPU_RULE: &str = r#"
    [[rules]]
    id = "cpu"
    oid = "1.1"
    name = "CPU load"
    type = "integer"
    command = "echo 95"
    interval = 5
    receivers = ["r1"]

    [rules.thresholds]
    warning = 80
    critical = 90
"#;

fn oid(s: &str) -> Oid {
    s.parse().unwrap()
}

#[tokio::test]
async fn cpu_rule_sends_critical_trap_immediately() {
    let (socket, port) = listener().await;
    let mut scheduler = RuleScheduler::with_defaults(config(port, CPU_RULE)).unwrap();
    scheduler.start().await;
    assert!(scheduler.is_running());
    assert_eq!(scheduler.open_sessions(), 1);

    let trap = recv_trap(&socket, Duration::from_secs(3))
        .await
        .expect("first cycle should fire without waiting for the interval");
    let full = oid(&format!("{ROOT}.1.1"));

    assert_eq!(trap.community, b"public");
    assert_eq!(trap.trap_oid(), Some(full.clone()));
    assert_eq!(trap.value_of(&full), Some(&Seen::Integer(95)));
    assert_eq!(trap.text_of(&severity_oid(&full)), Some("critical"));

    scheduler.stop().await;
}

#[tokio::test]
async fn rule_repeats_on_its_interval() {
    let (socket, port) = listener().await;
    let rules = CPU_RULE.replace("interval = 5", "interval = 1");
    let mut scheduler = RuleScheduler::with_defaults(config(port, &rules)).unwrap();
    scheduler.start().await;

    let first = recv_trap(&socket, Duration::from_secs(3)).await.expect("first trap");
    let second = recv_trap(&socket, Duration::from_secs(3)).await.expect("second trap");
    assert_eq!(first.trap_oid(), second.trap_oid());
    assert!(second.request_id > first.request_id);

    scheduler.stop().await;
}

#[tokio::test]
async fn stop_cancels_timers() {
    let (socket, port) = listener().await;
    let rules = CPU_RULE.replace("interval = 5", "interval = 1");
    let mut scheduler = RuleScheduler::with_defaults(config(port, &rules)).unwrap();
    scheduler.start().await;
    recv_trap(&socket, Duration::from_secs(3)).await.expect("first trap");

    scheduler.stop().await;
    assert!(!scheduler.is_running());

    let mut buf = [0u8; 2048];
    while socket.try_recv_from(&mut buf).is_ok() {}

    assert!(
        recv_trap(&socket, Duration::from_millis(2500)).await.is_none(),
        "no trap may arrive after stop"
    );

    scheduler.stop().await;
}

#[tokio::test]
async fn stop_drops_every_receiver_session() {
    let (_socket, port) = listener().await;
    let opener = Arc::new(TrackingOpener::default());
    let rules = CPU_RULE.replace("interval = 5", "interval = 60");
    let mut scheduler =
        RuleScheduler::new(config(port, &rules), CountingRunner::new(false), opener.clone()).unwrap();

    scheduler.start().await;
    assert_eq!(opener.live(), 1);
    assert_eq!(scheduler.open_sessions(), 1);

    scheduler.stop().await;
    assert_eq!(opener.live(), 0);

    scheduler.start().await;
    assert_eq!(opener.live(), 1);
    scheduler.stop().await;
    assert_eq!(opener.live(), 0);
}

#[tokio::test]
async fn stop_during_a_running_cycle_still_closes_sessions() {
    let (_socket, port) = listener().await;
    let opener = Arc::new(TrackingOpener::default());
    let runner = CountingRunner::slow(Duration::from_secs(30));
    let mut scheduler =
        RuleScheduler::new(config(port, CPU_RULE), runner.clone(), opener.clone()).unwrap();

    scheduler.start().await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(runner.calls(), 1);

    tokio::time::timeout(Duration::from_secs(2), scheduler.stop())
        .await
        .expect("stop must not wait for the command");
    assert_eq!(opener.live(), 0);
}

#[tokio::test]
async fn start_twice_spawns_rules_once() {
    let (_socket, port) = listener().await;
    let runner = CountingRunner::new(false);
    let rules = CPU_RULE.replace("interval = 5", "interval = 60");
    let mut scheduler =
        RuleScheduler::new(config(port, &rules), runner.clone(), Arc::new(UdpSessionOpener)).unwrap();

    scheduler.start().await;
    scheduler.start().await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(runner.calls(), 1);

    scheduler.stop().await;
}

#[tokio::test]
async fn failing_cycles_keep_the_rule_scheduled() {
    let (socket, port) = listener().await;
    let runner = CountingRunner::new(true);
    let rules = CPU_RULE.replace("interval = 5", "interval = 1");
    let mut scheduler =
        RuleScheduler::new(config(port, &rules), runner.clone(), Arc::new(UdpSessionOpener)).unwrap();
    scheduler.start().await;

    assert!(recv_trap(&socket, Duration::from_millis(2500)).await.is_none());
    assert!(runner.calls() >= 2, "calls = {}", runner.calls());

    scheduler.stop().await;
}

#[tokio::test]
async fn broken_rule_does_not_affect_other_rules() {
    let (socket, port) = listener().await;
    let rules = r#"
        [[rules]]
        id = "broken"
        oid = "9"
        name = "Broken"
        type = "integer"
        command = "exit 1"
        interval = 1
        receivers = ["r1"]

        [[rules]]
        id = "status"
        oid = "2"
        name = "Status"
        type = "string"
        command = "echo ok"
        interval = 1
        receivers = ["r1"]
    "#;
    let mut scheduler = RuleScheduler::with_defaults(config(port, rules)).unwrap();
    scheduler.start().await;

    let trap = recv_trap(&socket, Duration::from_secs(3)).await.expect("status trap");
    let status = oid(&format!("{ROOT}.2"));
    assert_eq!(trap.trap_oid(), Some(status.clone()));
    assert_eq!(trap.text_of(&status), Some("ok"));

    scheduler.stop().await;
}

#[tokio::test]
async fn unknown_receiver_is_reported_and_skipped() {
    let (socket, port) = listener().await;
    let rules = CPU_RULE.replace(r#"receivers = ["r1"]"#, r#"receivers = ["ghost", "r1"]"#);
    let config = config(port, &rules);
    assert_eq!(config.dangling_receivers(), vec![("cpu", "ghost")]);

    let registry = ReceiverRegistry::open(&config.receivers, &UdpSessionOpener).await;
    let dispatcher = Arc::new(TrapDispatcher::new(registry));
    let task = RuleTask::new(
        config.rules[0].clone(),
        &config.root_oid().unwrap(),
        Arc::new(ShellRunner::new()),
        dispatcher,
    );

    let report = task.run_cycle().await.unwrap();
    assert_eq!(report.delivered(), 1);
    assert!(report
        .outcome("ghost")
        .is_some_and(|o| matches!(&o.result, Err(e) if e.is_not_found())));

    let trap = recv_trap(&socket, Duration::from_secs(2)).await.expect("r1 trap");
    assert_eq!(trap.trap_oid().as_ref(), Some(task.full_oid()));
}

#[tokio::test]
async fn string_rule_never_carries_severity() {
    let (socket, port) = listener().await;
    let rules = r#"
        [[rules]]
        id = "status"
        oid = "3"
        name = "Status"
        type = "string"
        command = "echo '  95  '"
        interval = 10
        receivers = ["r1"]

        [rules.thresholds]
        warning = 1
        critical = 2
    "#;
    let config = config(port, rules);
    let registry = ReceiverRegistry::open(&config.receivers, &UdpSessionOpener).await;
    let task = RuleTask::new(
        config.rules[0].clone(),
        &config.root_oid().unwrap(),
        Arc::new(ShellRunner::new()),
        Arc::new(TrapDispatcher::new(registry)),
    );

    assert!(task.run_cycle().await.unwrap().all_delivered());

    let trap = recv_trap(&socket, Duration::from_secs(2)).await.expect("status trap");
    let full = task.full_oid().clone();
    assert_eq!(trap.text_of(&full), Some("95"));
    assert!(trap.value_of(&severity_oid(&full)).is_none());
}

#[tokio::test]
async fn conversion_failure_surfaces_from_run_cycle() {
    let (_socket, port) = listener().await;
    let rules = CPU_RULE.replace("echo 95", "echo abc");
    let config = config(port, &rules);
    let registry = ReceiverRegistry::open(&config.receivers, &UdpSessionOpener).await;
    let task = RuleTask::new(
        config.rules[0].clone(),
        &config.root_oid().unwrap(),
        Arc::new(ShellRunner::new()),
        Arc::new(TrapDispatcher::new(registry)),
    );

    let err = task.run_cycle().await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CommandError>(),
        Some(CommandError::Conversion { .. })
    ));
}

#[test]
fn config_error_blocks_scheduling() {
    let mut config = config_without_io();
    config.oid_root = None;
    assert!(matches!(
        RuleScheduler::with_defaults(config),
        Err(ConfigError::MissingOidRoot)
    ));

    let mut config = config_without_io();
    config.rules.clear();
    assert!(matches!(
        RuleScheduler::with_defaults(config),
        Err(ConfigError::NoRules)
    ));
}

fn config_without_io() -> TrapConfig {
    config(1162, CPU_RULE)
}
