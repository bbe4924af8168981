//! # Registry: one controller per job.
//!
//! [`Registry`] owns the event [`Bus`], the [`SubscriberSet`] fed from it and
//! the map of live [`EventController`]s keyed by job id.
//!
//! ## Architecture
//! ```text
//! observe(job) ──► controllers[job_id] ──exists──► same Arc<EventController>
//!                        └─absent──► EventController::start(job, cfg, store, bus)
//!
//! Bus ──► subscriber_listener ──► SubscriberSet::emit(&Event)   (fire-and-forget)
//!
//! shutdown() ──► stop every controller (JoinSet) ──within grace──► Ok
//!                                                 └─overrun──► RuntimeError::GraceExceeded{stuck}
//! ```
//!
//! ## Rules
//! - Jobs with process recovery disabled are refused with `RecoverDisabled`.
//! - `observe` is idempotent; the controller is created once per job id.
//! - Lookups of unknown jobs fail with `UnRegistry`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast::error::RecvError};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::{
    config::Config,
    controller::EventController,
    error::{RecoverError, RuntimeError},
    events::Bus,
    job::JobBaseInfo,
    store::JobStore,
    subscribers::{Subscribe, SubscriberSet},
};

/// Live controllers, keyed by job id.
pub struct Registry {
    cfg: Config,
    store: Arc<dyn JobStore>,
    bus: Bus,
    subs: Arc<SubscriberSet>,
    controllers: RwLock<HashMap<String, Arc<EventController>>>,
    token: CancellationToken,
}

impl Registry {
    /// Creates the registry and starts forwarding bus events to `subscribers`.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(
        cfg: Config,
        store: Arc<dyn JobStore>,
        subscribers: Vec<Arc<dyn Subscribe>>,
    ) -> Arc<Self> {
        let bus = Bus::new(cfg.bus_capacity_clamped());
        let subs = Arc::new(SubscriberSet::new(subscribers, bus.clone()));
        let reg = Arc::new(Self {
            cfg,
            store,
            bus,
            subs,
            controllers: RwLock::new(HashMap::new()),
            token: CancellationToken::new(),
        });
        reg.subscriber_listener();
        reg
    }

    /// Bus every controller of this registry publishes to.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Forwards bus events to the subscriber set until shutdown; queued events are drained first.
    fn subscriber_listener(&self) {
        let mut rx = self.bus.subscribe();
        let set = Arc::clone(&self.subs);
        let token = self.token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    msg = rx.recv() => match msg {
                        Ok(ev) => set.emit(&ev),
                        Err(RecvError::Lagged(n)) => {
                            tracing::warn!(skipped = n, "subscriber listener lagged");
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = token.cancelled() => break,
                }
            }
        });
    }

    /// Returns the controller of `job`, creating and starting it on first sight.
    pub async fn observe(&self, job: JobBaseInfo) -> Result<Arc<EventController>, RecoverError> {
        if !job.recover_config.process_recover_enable {
            return Err(RecoverError::RecoverDisabled { job: job.job_id });
        }
        if self.token.is_cancelled() {
            return Err(RecoverError::Cancelled);
        }

        let mut controllers = self.controllers.write().await;
        if let Some(ctl) = controllers.get(&job.job_id) {
            return Ok(Arc::clone(ctl));
        }
        let job_id = job.job_id.clone();
        let ctl = EventController::start(
            job,
            self.cfg.clone(),
            Arc::clone(&self.store),
            self.bus.clone(),
        );
        controllers.insert(job_id, Arc::clone(&ctl));
        Ok(ctl)
    }

    pub async fn get(&self, job_id: &str) -> Result<Arc<EventController>, RecoverError> {
        self.controllers
            .read()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| RecoverError::UnRegistry {
                job: job_id.to_string(),
            })
    }

    /// Stops and forgets the controller of `job_id`.
    pub async fn remove(&self, job_id: &str) -> Result<(), RecoverError> {
        let ctl = self.controllers.write().await.remove(job_id);
        match ctl {
            Some(ctl) => {
                ctl.stop().await;
                Ok(())
            }
            None => Err(RecoverError::UnRegistry {
                job: job_id.to_string(),
            }),
        }
    }

    /// Returns sorted list of observed job ids.
    pub async fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.controllers.read().await.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// Stops every controller within [`Config::grace`].
    ///
    /// Returns [`RuntimeError::GraceExceeded`] listing the jobs whose
    /// controllers did not stop in time.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        let drained: Vec<(String, Arc<EventController>)> =
            self.controllers.write().await.drain().collect();

        let mut set = JoinSet::new();
        for (job_id, ctl) in &drained {
            let (job_id, ctl) = (job_id.clone(), Arc::clone(ctl));
            set.spawn(async move {
                ctl.stop().await;
                job_id
            });
        }

        let grace = self.cfg.grace;
        let mut stopped: HashSet<String> = HashSet::new();
        let done = async {
            while let Some(res) = set.join_next().await {
                if let Ok(job_id) = res {
                    stopped.insert(job_id);
                }
            }
        };
        let timed = tokio::time::timeout(grace, done).await;
        self.token.cancel();

        match timed {
            Ok(()) => Ok(()),
            Err(_) => {
                set.abort_all();
                let mut stuck: Vec<String> = drained
                    .into_iter()
                    .map(|(job_id, _)| job_id)
                    .filter(|id| !stopped.contains(id))
                    .collect();
                stuck.sort_unstable();
                Err(RuntimeError::GraceExceeded { grace, stuck })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Event, EventKind};
    use crate::job::RecoverConfig;
    use crate::store::MemoryJobStore;
    use crate::strategy::Strategy;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    fn job(id: &str, enabled: bool) -> JobBaseInfo {
        let rc = RecoverConfig {
            process_recover_enable: enabled,
            strategies: vec![Strategy::Dump],
            ..RecoverConfig::default()
        };
        JobBaseInfo::new(id, format!("{id}-name"), format!("pg-{id}"), "default", rc)
    }

    fn config() -> Config {
        Config {
            keep_alive_interval: Duration::ZERO,
            ..Config::default()
        }
    }

    #[derive(Default)]
    struct Kinds(Mutex<Vec<EventKind>>);

    #[async_trait]
    impl Subscribe for Kinds {
        async fn on_event(&self, e: &Event) {
            self.0.lock().unwrap().push(e.kind);
        }

        fn name(&self) -> &'static str {
            "Kinds"
        }
    }

    #[tokio::test]
    async fn test_observe_creates_once() {
        let reg = Registry::new(config(), Arc::new(MemoryJobStore::new()), Vec::new());
        let a = reg.observe(job("job-a", true)).await.unwrap();
        let again = reg.observe(job("job-a", true)).await.unwrap();
        assert!(Arc::ptr_eq(&a, &again));

        reg.observe(job("job-b", true)).await.unwrap();
        assert_eq!(reg.list().await, vec!["job-a", "job-b"]);
        reg.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_disabled_job_is_refused() {
        let reg = Registry::new(config(), Arc::new(MemoryJobStore::new()), Vec::new());
        let Err(err) = reg.observe(job("job-off", false)).await else {
            panic!("disabled job was registered");
        };
        assert!(matches!(err, RecoverError::RecoverDisabled { .. }));
        assert!(!err.is_retryable());
        assert!(reg.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_remove_then_lookup_fails() {
        let reg = Registry::new(config(), Arc::new(MemoryJobStore::new()), Vec::new());
        let ctl = reg.observe(job("job-a", true)).await.unwrap();
        reg.remove("job-a").await.unwrap();
        assert!(ctl.is_stopped());
        assert!(matches!(
            reg.get("job-a").await,
            Err(RecoverError::UnRegistry { .. })
        ));
        assert!(reg.remove("job-a").await.is_err());
    }

    #[tokio::test]
    async fn test_subscribers_see_lifecycle() {
        let kinds = Arc::new(Kinds::default());
        let reg = Registry::new(
            config(),
            Arc::new(MemoryJobStore::new()),
            vec![kinds.clone() as Arc<dyn Subscribe>],
        );
        reg.observe(job("job-a", true)).await.unwrap();
        reg.remove("job-a").await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while !kinds.0.lock().unwrap().contains(&EventKind::ControllerRemoved) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(kinds.0.lock().unwrap()[0], EventKind::ControllerCreated);
    }
}
