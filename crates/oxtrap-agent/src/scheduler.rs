use crate::config::{ConfigError, TrapConfig};
use anyhow::{Context, Result};
use oxtrap_alert::classify_rule;
use oxtrap_collector::{CommandRunner, ShellRunner};
use oxtrap_common::types::{Receiver, Rule};
use oxtrap_common::Oid;
use oxtrap_notify::registry::ReceiverRegistry;
use oxtrap_notify::sessions::UdpSessionOpener;
use oxtrap_notify::{DispatchReport, SessionOpener, TrapDispatcher};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// One rule bound to the shared runner and dispatcher.
pub struct RuleTask {
    rule: Rule,
    full_oid: Oid,
    runner: Arc<dyn CommandRunner>,
    dispatcher: Arc<TrapDispatcher>,
}

impl RuleTask {
    pub fn new(
        rule: Rule,
        oid_root: &Oid,
        runner: Arc<dyn CommandRunner>,
        dispatcher: Arc<TrapDispatcher>,
    ) -> Self {
        let full_oid = oid_root.join(&rule.oid);
        Self {
            rule,
            full_oid,
            runner,
            dispatcher,
        }
    }

    pub fn full_oid(&self) -> &Oid {
        &self.full_oid
    }

    /// Runs the command, classifies the value and sends the trap.
    ///
    /// # Errors
    ///
    /// Fails only when the command fails or its output cannot be converted;
    /// per-receiver delivery failures are reported in the returned
    /// [`DispatchReport`].
    pub async fn run_cycle(&self) -> Result<DispatchReport> {
        let value = self
            .runner
            .execute(&self.rule.command, self.rule.value_type)
            .await
            .with_context(|| format!("Rule '{}' check failed", self.rule.id))?;

        let severity = classify_rule(&self.rule, &value);

        Ok(self
            .dispatcher
            .send_trap(&self.rule.receivers, &self.full_oid, value, severity)
            .await)
    }

    /// Runs a cycle immediately and then every `interval` seconds until the
    /// task is aborted. Cycles of one rule never overlap: a slow command
    /// delays the next tick instead of stacking another cycle on top.
    async fn run(self) {
        tracing::info!(
            rule_id = %self.rule.id,
            oid = %self.full_oid,
            interval_secs = self.rule.interval,
            "Rule monitoring started"
        );

        let mut tick = interval(Duration::from_secs(self.rule.interval));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tick.tick().await;
            match self.run_cycle().await {
                Ok(report) if report.all_delivered() => {
                    tracing::debug!(
                        rule_id = %self.rule.id,
                        delivered = report.delivered(),
                        "Rule cycle complete"
                    );
                }
                Ok(report) => {
                    tracing::warn!(
                        rule_id = %self.rule.id,
                        delivered = report.delivered(),
                        failed = report.failed(),
                        "Rule cycle delivered to a subset of receivers"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        rule_id = %self.rule.id,
                        error = %format!("{e:#}"),
                        "Rule cycle failed"
                    );
                }
            }
        }
    }
}

struct Running {
    dispatcher: Arc<TrapDispatcher>,
    tasks: Vec<JoinHandle<()>>,
}

/// Owns the receiver sessions and one periodic task per rule.
///
/// Independent instances do not share any state, so several can run in
/// the same process.
pub struct RuleScheduler {
    oid_root: Oid,
    receivers: Vec<Receiver>,
    rules: Vec<Rule>,
    runner: Arc<dyn CommandRunner>,
    opener: Arc<dyn SessionOpener>,
    running: Option<Running>,
}

impl RuleScheduler {
    /// Validates `config`; a [`ConfigError`] means nothing may be scheduled.
    pub fn new(
        config: TrapConfig,
        runner: Arc<dyn CommandRunner>,
        opener: Arc<dyn SessionOpener>,
    ) -> Result<Self, ConfigError> {
        let oid_root = config.validate()?;

        for (rule_id, receiver_id) in config.dangling_receivers() {
            tracing::warn!(
                rule_id,
                receiver = receiver_id,
                "Rule references an unknown receiver, its traps to it will be skipped"
            );
        }

        Ok(Self {
            oid_root,
            receivers: config.receivers,
            rules: config.rules,
            runner,
            opener,
            running: None,
        })
    }

    /// Shell commands and SNMPv2c over UDP.
    pub fn with_defaults(config: TrapConfig) -> Result<Self, ConfigError> {
        Self::new(
            config,
            Arc::new(ShellRunner::new()),
            Arc::new(UdpSessionOpener),
        )
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn oid_root(&self) -> &Oid {
        &self.oid_root
    }

    /// Number of receivers with an open session, zero when stopped.
    pub fn open_sessions(&self) -> usize {
        self.running
            .as_ref()
            .map_or(0, |r| r.dispatcher.registry().len())
    }

    /// Opens every receiver session and spawns one task per rule. Calling
    /// it while already running does nothing.
    pub async fn start(&mut self) {
        if self.running.is_some() {
            tracing::debug!("Rule scheduler already running");
            return;
        }

        let registry = ReceiverRegistry::open(&self.receivers, self.opener.as_ref()).await;
        let dispatcher = Arc::new(TrapDispatcher::new(registry));

        let tasks = self
            .rules
            .iter()
            .map(|rule| {
                let task = RuleTask::new(
                    rule.clone(),
                    &self.oid_root,
                    self.runner.clone(),
                    dispatcher.clone(),
                );
                tokio::spawn(task.run())
            })
            .collect::<Vec<_>>();

        tracing::info!(
            rules = tasks.len(),
            receivers = dispatcher.registry().len(),
            configured_receivers = self.receivers.len(),
            "Rule scheduler started"
        );

        self.running = Some(Running { dispatcher, tasks });
    }

    /// Cancels every rule task and closes every receiver session. Calling
    /// it while stopped does nothing.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        for task in &running.tasks {
            task.abort();
        }
        for task in running.tasks {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    tracing::error!(error = %e, "Rule task ended abnormally");
                }
            }
        }

        // Joined tasks have dropped their dispatcher handles.
        let mut dispatcher = running.dispatcher;
        match Arc::get_mut(&mut dispatcher) {
            Some(dispatcher) => {
                let closed = dispatcher.close();
                tracing::info!(closed, "Receiver sessions closed");
            }
            None => {
                tracing::error!("Dispatcher still shared, sessions close when the last handle drops");
            }
        }

        tracing::info!("Rule scheduler stopped");
    }
}
