use std::sync::{Arc, Mutex};
use std::time::Duration;

use argus_types::AppConfig;
use async_trait::async_trait;
use hashbrown::HashMap;
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};

use super::client::{ClientRuntime, ClientShared, ClientStats};
use crate::config::validate;
use crate::error::{EngineError, Result};
use crate::frame::FrameSource;
use crate::input::InputInjector;
use crate::lock;
use crate::queue::{PriorityTaskQueue, QueueStatistics, shutdown_requested};
use crate::signal::{EngineSignal, SignalBus};

/// Explicit lifecycle of a long-running automation.
#[async_trait]
pub trait Automation: Send + Sync {
    async fn start(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;
    fn is_running(&self) -> bool;
}

/// Final counters handed back by [`Engine::shutdown`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineReport {
    pub queue: QueueStatistics,
    pub clients: Vec<ClientStats>,
}

struct Backend {
    frames: Arc<dyn FrameSource>,
    injector: Arc<dyn InputInjector>,
}

struct Running {
    queue: PriorityTaskQueue,
    clients: Vec<(ClientShared, JoinHandle<()>)>,
    stats_task: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

pub struct EngineBuilder {
    config: AppConfig,
    backends: HashMap<String, Backend>,
    signals: Option<SignalBus>,
}

impl EngineBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            backends: HashMap::new(),
            signals: None,
        }
    }

    /// Attach the capture and input backends of the client called `name`.
    pub fn client(
        mut self,
        name: impl Into<String>,
        frames: Arc<dyn FrameSource>,
        injector: Arc<dyn InputInjector>,
    ) -> Self {
        self.backends
            .insert(name.into(), Backend { frames, injector });
        self
    }

    /// Publish telemetry on an existing bus instead of a private one.
    pub fn signals(mut self, signals: SignalBus) -> Self {
        self.signals = Some(signals);
        self
    }

    pub fn build(self) -> Engine {
        Engine {
            config: self.config,
            backends: self.backends,
            signals: self.signals.unwrap_or_default(),
            running: Mutex::new(None),
        }
    }
}

/// Drives every enabled client of a configuration against one shared
/// dispatch queue.
pub struct Engine {
    config: AppConfig,
    backends: HashMap<String, Backend>,
    signals: SignalBus,
    running: Mutex<Option<Running>>,
}

impl Engine {
    pub fn builder(config: AppConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineSignal> {
        self.signals.subscribe()
    }

    /// Current counters of a running client.
    pub fn client_stats(&self, name: &str) -> Option<ClientStats> {
        let running = lock(&self.running);
        running
            .as_ref()?
            .clients
            .iter()
            .find(|(shared, _)| &*shared.name == name)
            .map(|(shared, _)| shared.stats())
    }

    pub fn queue_statistics(&self) -> Option<QueueStatistics> {
        lock(&self.running).as_ref().map(|r| r.queue.statistics())
    }

    fn launch(&self) -> Result<Running> {
        validate(&self.config)?;

        if let Some(missing) = self
            .config
            .enabled_clients()
            .find(|c| !self.backends.contains_key(&c.name))
        {
            return Err(EngineError::MissingBackend(missing.name.clone()));
        }

        let queue = PriorityTaskQueue::new(&self.config.queue);
        queue.start();

        let (shutdown, _) = watch::channel(false);
        let clients = self
            .config
            .enabled_clients()
            .filter_map(|client| {
                let backend = self.backends.get(&client.name)?;
                let runtime = ClientRuntime::new(
                    client.clone(),
                    Arc::clone(&backend.frames),
                    Arc::clone(&backend.injector),
                    queue.clone(),
                    self.signals.clone(),
                );
                let shared = runtime.shared();
                let handle = tokio::spawn(runtime.run(shutdown.subscribe()));
                Some((shared, handle))
            })
            .collect();

        let stats_task = tokio::spawn(report_statistics(
            queue.clone(),
            self.signals.clone(),
            Duration::from_millis(self.config.stats_interval_ms.max(1)),
            shutdown.subscribe(),
        ));

        Ok(Running {
            queue,
            clients,
            stats_task,
            shutdown,
        })
    }

    /// Stop every client, then the schedulers, then the shared queue, and
    /// return the final counters.
    pub async fn shutdown(&self) -> Result<EngineReport> {
        let running = lock(&self.running).take();
        let Some(running) = running else {
            return Err(EngineError::NotRunning);
        };
        let _ = running.shutdown.send(true);

        let mut clients = Vec::with_capacity(running.clients.len());
        for (shared, handle) in running.clients {
            if let Err(e) = handle.await
                && e.is_panic()
            {
                warn!(client = %shared.name, error = %e, "client loop panicked");
            }
            shared.scheduler.shutdown().await;
            clients.push(shared.stats());
        }

        running.queue.shutdown().await;
        running.stats_task.await.map_err(EngineError::Join)?;

        let queue = running.queue.statistics();
        info!(%queue, clients = clients.len(), "engine stopped");
        Ok(EngineReport { queue, clients })
    }
}

#[async_trait]
impl Automation for Engine {
    async fn start(&self) -> Result<()> {
        let mut running = lock(&self.running);
        if running.is_some() {
            return Err(EngineError::AlreadyRunning);
        }
        let launched = self.launch()?;
        info!(
            clients = launched.clients.len(),
            workers = self.config.queue.max_concurrency,
            "engine started"
        );
        *running = Some(launched);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.shutdown().await.map(|_| ())
    }

    fn is_running(&self) -> bool {
        lock(&self.running).is_some()
    }
}

/// Publish and log queue statistics every `interval` until shutdown.
async fn report_statistics(
    queue: PriorityTaskQueue,
    signals: SignalBus,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // First tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = shutdown_requested(&mut shutdown) => break,
            _ = ticker.tick() => {}
        }
        let stats = queue.statistics();
        info!(%stats, "queue statistics");
        signals.publish(EngineSignal::QueueStatistics {
            stats,
            timestamp: Instant::now(),
        });
    }
}
