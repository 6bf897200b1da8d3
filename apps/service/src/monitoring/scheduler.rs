use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::database::{TargetRegistry, UptimeLog};
use crate::error::StoreError;

use super::grouping::group_targets;
use super::probe::{Probe, ProbeOutcome};
use super::types::{DownEvent, IntervalClass, ProbeResult};

/// Identity of a recurring job: one live timer per (owner, intervalClass),
/// never per target. A jobKey's tick covers every url the owner currently
/// has at that interval.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobKey {
    pub owner: String,
    pub interval: IntervalClass,
}

/// Owns the recurring timers and the live-job index. Constructed once at
/// process start; registration is idempotent so embedding code may re-run
/// startup at any time without duplicating timers.
pub struct IntervalScheduler {
    registry: Arc<dyn TargetRegistry>,
    log: Arc<dyn UptimeLog>,
    probe: Arc<dyn Probe>,
    probe_concurrency: usize,
    jobs: Mutex<HashMap<JobKey, JoinHandle<()>>>,
    running: AtomicBool,
    events: Option<mpsc::Sender<DownEvent>>,
}

impl IntervalScheduler {
    pub fn new(
        registry: Arc<dyn TargetRegistry>,
        log: Arc<dyn UptimeLog>,
        probe: Arc<dyn Probe>,
        probe_concurrency: usize,
    ) -> Self {
        Self {
            registry,
            log,
            probe,
            probe_concurrency: probe_concurrency.max(1),
            jobs: Mutex::new(HashMap::new()),
            running: AtomicBool::new(false),
            events: None,
        }
    }

    /// Wire an outbound channel for up -> down transitions. Consumed by the
    /// notifier seam; routine results go to the uptime log regardless.
    pub fn with_events(mut self, events: mpsc::Sender<DownEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Start the scheduler and register jobs for every target currently in
    /// the registry. Starting an already-running scheduler is a no-op.
    /// Returns the number of newly registered jobs.
    pub async fn start(&self) -> Result<usize, StoreError> {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::debug!("scheduler already running, start is a no-op");
            return Ok(0);
        }

        self.sync_jobs().await
    }

    /// Re-read the registry and register any jobKey that does not have a
    /// live timer yet. Existing jobs are untouched; interval and membership
    /// changes for them take effect at their next tick via the fresh
    /// registry read. Callable at any time after start.
    pub async fn sync_jobs(&self) -> Result<usize, StoreError> {
        let targets = self.registry.list_all().await?;
        let groups = group_targets(&targets);

        let mut added = 0;
        for (interval, owners) in &groups {
            for owner in owners.keys() {
                if self.ensure_job(owner, *interval) {
                    added += 1;
                }
            }
        }

        Ok(added)
    }

    /// Register a recurring job for (owner, interval) unless one is already
    /// live. Returns false when the registration was absorbed as a
    /// duplicate.
    pub fn ensure_job(&self, owner: &str, interval: IntervalClass) -> bool {
        let key = JobKey { owner: owner.to_string(), interval };
        let mut jobs = self.jobs.lock().expect("scheduler job index lock poisoned");

        if jobs.contains_key(&key) {
            tracing::debug!(owner, interval = %interval, "job already registered, skipping");
            return false;
        }

        tracing::info!(owner, interval = %interval, "registering monitoring job");
        let handle = tokio::spawn(run_job(
            self.registry.clone(),
            self.log.clone(),
            self.probe.clone(),
            key.clone(),
            self.probe_concurrency,
            self.events.clone(),
        ));
        jobs.insert(key, handle);

        true
    }

    pub fn job_count(&self) -> usize {
        self.jobs.lock().expect("scheduler job index lock poisoned").len()
    }
}

impl Drop for IntervalScheduler {
    fn drop(&mut self) {
        for handle in self.jobs.lock().expect("scheduler job index lock poisoned").values() {
            handle.abort();
        }
    }
}

async fn run_job(
    registry: Arc<dyn TargetRegistry>,
    log: Arc<dyn UptimeLog>,
    probe: Arc<dyn Probe>,
    key: JobKey,
    probe_concurrency: usize,
    events: Option<mpsc::Sender<DownEvent>>,
) {
    let mut ticker = tokio::time::interval(key.interval.period());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // Last observed status per url, for down-transition events only.
    let mut last_up: HashMap<String, bool> = HashMap::new();

    loop {
        ticker.tick().await;
        run_tick(
            registry.as_ref(),
            log.as_ref(),
            probe.as_ref(),
            &key,
            probe_concurrency,
            &mut last_up,
            events.as_ref(),
        )
        .await;
    }
}

/// One firing for a jobKey: fresh registry read, concurrent probes, one log
/// append per probe. Per-target failures are isolated; a bad probe or
/// append never aborts the sibling urls in the same tick.
pub(crate) async fn run_tick(
    registry: &dyn TargetRegistry,
    log: &dyn UptimeLog,
    probe: &dyn Probe,
    key: &JobKey,
    probe_concurrency: usize,
    last_up: &mut HashMap<String, bool>,
    events: Option<&mpsc::Sender<DownEvent>>,
) {
    let targets = match registry.list(&key.owner).await {
        Ok(targets) => targets,
        Err(e) => {
            tracing::warn!(
                owner = %key.owner,
                interval = %key.interval,
                error = %e,
                "registry read failed, skipping tick"
            );
            return;
        }
    };

    let urls: Vec<String> = targets
        .into_iter()
        .filter(|t| t.interval == key.interval)
        .map(|t| t.url)
        .collect();

    // Drop status memory for urls no longer in this job's batch. A target
    // removed and later re-added starts a fresh history, so its first
    // observation after re-add must not count as a transition.
    last_up.retain(|url, _| urls.contains(url));

    let outcomes: Vec<(String, ProbeOutcome)> = futures::stream::iter(urls)
        .map(|url| async move {
            let outcome = probe.check(&url).await;
            (url, outcome)
        })
        .buffer_unordered(probe_concurrency)
        .collect()
        .await;

    for (url, outcome) in outcomes {
        let up = outcome.is_up();
        if let ProbeOutcome::Down { reason } = &outcome {
            tracing::debug!(owner = %key.owner, url = %url, %reason, "probe reported down");
        }

        let result = ProbeResult::observed_now(key.owner.clone(), url.clone(), up);

        let was_up = last_up.insert(url.clone(), up);
        if was_up == Some(true) && !up {
            if let Some(events) = events {
                let event = DownEvent {
                    owner: result.owner.clone(),
                    url: result.url.clone(),
                    observed_at: result.observed_at,
                };
                if let Err(e) = events.try_send(event) {
                    tracing::warn!(url = %url, error = %e, "dropping down event");
                }
            }
        }

        if let Err(e) = log.append(&result).await {
            tracing::warn!(
                owner = %key.owner,
                url = %url,
                error = %e,
                "failed to record probe result"
            );
        }
    }
}
