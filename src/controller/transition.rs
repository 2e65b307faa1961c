// ============================================================================
// Run Level Controller
// ============================================================================
//
// Drives the locator between run levels. Ascent activates level by level,
// descent tears down level by level, and a failed or cancelled ascent rolls
// back by popping the activation order from its tail. Locks are only taken
// for short bookkeeping steps, never across a lifecycle or listener call.
//
// ============================================================================

use super::policy::{ActivationPolicy, RollbackPolicy};
use super::report::ProceedReport;
use super::state::{ActivationRecord, ControllerPhase, ControllerState};
use crate::core::{
    ActivationError, Cancellation, DeactivationError, LocatorError, RUNLEVEL_INITIAL, Result,
    ServiceId,
};
use crate::interface::{RunLevelListener, ServiceLifecycle};
use crate::registry::{RunLevelRegistry, ServiceHandle};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{Instrument, Level, event, info_span};

/// Default bound on activations running at once within one level
pub const DEFAULT_MAX_CONCURRENCY: usize = 16;

fn lock_state(state: &Mutex<ControllerState>) -> MutexGuard<'_, ControllerState> {
    // Every mutation is a single statement, so a poisoned state is still consistent
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn activate_unit(
    lifecycle: &dyn ServiceLifecycle,
    service: &ServiceHandle,
) -> std::result::Result<(), String> {
    match AssertUnwindSafe(lifecycle.activate(service)).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(format!("{:#}", err)),
        Err(_) => Err("activation panicked".to_string()),
    }
}

async fn deactivate_unit(
    lifecycle: &dyn ServiceLifecycle,
    service: &ServiceHandle,
) -> std::result::Result<(), String> {
    match AssertUnwindSafe(lifecycle.deactivate(service)).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(format!("{:#}", err)),
        Err(_) => Err("deactivation panicked".to_string()),
    }
}

/// Result of one concurrent activation unit
enum UnitOutcome {
    Activated,
    Skipped,
    Failed(ServiceHandle, String),
}

#[derive(Default)]
struct LevelOutcome {
    activated: usize,
    /// Units never started because of a cancel or a failed sibling
    skipped: usize,
    failure: Option<(ServiceHandle, String)>,
}

/// Why an ascent stopped before its target
enum Interruption {
    Failure { service: ServiceHandle, reason: String },
    Cancelled,
}

/// Returns the controller to Idle however the transition ends
struct FinishOnDrop<'a>(&'a Mutex<ControllerState>);

impl Drop for FinishOnDrop<'_> {
    fn drop(&mut self) {
        lock_state(self.0).finish();
    }
}

/// Staged lifecycle controller
///
/// Owned by one locator; several controllers can coexist in a process.
pub struct RunLevelController {
    state: Arc<Mutex<ControllerState>>,
    registry: Arc<RunLevelRegistry>,
    lifecycle: Arc<dyn ServiceLifecycle>,
    listeners: RwLock<Vec<Arc<dyn RunLevelListener>>>,
    max_concurrency: usize,
    rollback_policy: RollbackPolicy,
}

impl RunLevelController {
    pub fn new(registry: Arc<RunLevelRegistry>, lifecycle: Arc<dyn ServiceLifecycle>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ControllerState::new())),
            registry,
            lifecycle,
            listeners: RwLock::new(Vec::new()),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            rollback_policy: RollbackPolicy::default(),
        }
    }

    /// Bound the number of activations running at once within a level
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.clamp(1, Semaphore::MAX_PERMITS);
        self
    }

    pub fn with_rollback_policy(mut self, policy: RollbackPolicy) -> Self {
        self.rollback_policy = policy;
        self
    }

    pub fn add_listener(&self, listener: Arc<dyn RunLevelListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn rollback_policy(&self) -> RollbackPolicy {
        self.rollback_policy
    }

    pub fn current_level(&self) -> i32 {
        self.lock().current_level()
    }

    pub fn phase(&self) -> ControllerPhase {
        self.lock().phase()
    }

    /// Target of the transition in flight, if any
    pub fn proposed_level(&self) -> Option<i32> {
        self.lock().proposed_level()
    }

    /// Services currently up, in the order they came up
    pub fn activation_order(&self) -> Vec<ActivationRecord> {
        self.lock().activation_order().to_vec()
    }

    pub fn is_active(&self, id: ServiceId) -> bool {
        self.lock().is_active(id)
    }

    /// Ask the transition in flight to stop
    ///
    /// Work already started is allowed to finish. An ascent then rolls back
    /// as if it had failed; a descent stops at the level it reached. Returns
    /// false if no transition is in flight.
    pub fn cancel(&self) -> bool {
        let requested = self.lock().request_cancel();
        if requested {
            event!(Level::INFO, "run level cancel requested");
        }
        requested
    }

    /// Move the controller to `target`
    ///
    /// Proceeding to the current level does nothing. Only one transition
    /// may run at a time. Levels with no services to start or stop are
    /// passed over without a progress notification; the target level is
    /// always reported.
    pub async fn proceed_to(&self, target: i32, policy: ActivationPolicy) -> Result<ProceedReport> {
        if target < RUNLEVEL_INITIAL {
            return Err(LocatorError::InvalidRunLevel(target));
        }

        let from = {
            let mut state = self.lock();
            if !state.phase().is_idle() {
                return Err(LocatorError::TransitionInProgress(
                    state.proposed_level().unwrap_or(state.current_level()),
                ));
            }
            if state.current_level() == target {
                return Ok(ProceedReport::unchanged(target));
            }
            state.begin(target)
        };

        let _finish = FinishOnDrop(&self.state);
        let span = info_span!("runlevel.proceed", from, target, policy = %policy);
        let started = Instant::now();

        let result = if target > from {
            self.ascend(from, target, policy).instrument(span).await
        } else {
            self.descend(from, target).instrument(span).await
        };

        result.map(|mut report| {
            report.elapsed = started.elapsed();
            report
        })
    }

    async fn ascend(&self, from: i32, target: i32, policy: ActivationPolicy) -> Result<ProceedReport> {
        // Registrations made after this point wait for the next transition
        let plan = self.registry.snapshot();
        let mut levels = plan.levels_between(from + 1, target);
        if levels.last() != Some(&target) {
            levels.push(target);
        }
        let mut activated = 0;

        for level in levels {
            if self.cancel_requested() {
                return Err(self.roll_back(level, Interruption::Cancelled).await);
            }

            let services = plan.services_at(level);
            let outcome = match policy {
                ActivationPolicy::Sequential => self.activate_sequential(level, services).await,
                ActivationPolicy::Concurrent => self.activate_concurrent(level, services).await,
            };
            activated += outcome.activated;

            if let Some((service, reason)) = outcome.failure {
                return Err(self
                    .roll_back(level, Interruption::Failure { service, reason })
                    .await);
            }
            if outcome.skipped > 0 {
                return Err(self.roll_back(level, Interruption::Cancelled).await);
            }

            self.lock().set_current_level(level);
            event!(Level::INFO, level, activated = outcome.activated, "run level reached");
            self.notify(|listener| listener.on_progress(level));
        }

        Ok(ProceedReport {
            from,
            level_reached: target,
            activated,
            deactivated: 0,
            teardown_failures: Vec::new(),
            elapsed: Duration::ZERO,
        })
    }

    async fn activate_sequential(&self, level: i32, services: &[ServiceHandle]) -> LevelOutcome {
        let mut outcome = LevelOutcome::default();

        for (index, service) in services.iter().enumerate() {
            if self.cancel_requested() {
                outcome.skipped = services.len() - index;
                break;
            }
            if self.is_active(service.id()) {
                continue;
            }

            match activate_unit(self.lifecycle.as_ref(), service).await {
                Ok(()) => {
                    let sequence = self.lock().record(Arc::clone(service), level);
                    event!(Level::DEBUG, service = %service, level, sequence, "service activated");
                    outcome.activated += 1;
                }
                Err(reason) => {
                    outcome.failure = Some((Arc::clone(service), reason));
                    break;
                }
            }
        }

        outcome
    }

    /// Activate a level's services in parallel
    ///
    /// Each unit appends itself to the activation order under the state lock
    /// as soon as it succeeds, so the order is completion order. Once a unit
    /// fails or a cancel arrives, units that have not started are skipped.
    async fn activate_concurrent(&self, level: i32, services: &[ServiceHandle]) -> LevelOutcome {
        let permits = Arc::new(Semaphore::new(self.max_concurrency));
        let halted = Arc::new(AtomicBool::new(false));
        let mut units = JoinSet::new();

        for service in services {
            if self.is_active(service.id()) {
                continue;
            }

            let service = Arc::clone(service);
            let state = Arc::clone(&self.state);
            let lifecycle = Arc::clone(&self.lifecycle);
            let permits = Arc::clone(&permits);
            let halted = Arc::clone(&halted);

            units.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return UnitOutcome::Skipped;
                };
                let cancelled = lock_state(&state).cancel_requested();
                if cancelled || halted.load(Ordering::SeqCst) {
                    return UnitOutcome::Skipped;
                }

                match activate_unit(lifecycle.as_ref(), &service).await {
                    Ok(()) => {
                        let sequence = lock_state(&state).record(Arc::clone(&service), level);
                        event!(Level::DEBUG, service = %service, level, sequence, "service activated");
                        UnitOutcome::Activated
                    }
                    Err(reason) => {
                        halted.store(true, Ordering::SeqCst);
                        UnitOutcome::Failed(service, reason)
                    }
                }
            });
        }

        let mut outcome = LevelOutcome::default();
        while let Some(joined) = units.join_next().await {
            match joined {
                Ok(UnitOutcome::Activated) => outcome.activated += 1,
                Ok(UnitOutcome::Skipped) => outcome.skipped += 1,
                Ok(UnitOutcome::Failed(service, reason)) => {
                    if outcome.failure.is_none() {
                        outcome.failure = Some((service, reason));
                    } else {
                        event!(Level::ERROR, service = %service, level, reason = %reason, "sibling activation failed");
                    }
                }
                Err(err) => {
                    event!(Level::ERROR, level, error = %err, "activation unit aborted");
                    outcome.skipped += 1;
                }
            }
        }

        outcome
    }

    async fn roll_back(&self, failing_level: i32, interruption: Interruption) -> LocatorError {
        self.lock().mark_failed();

        match &interruption {
            Interruption::Failure { service, reason } => {
                event!(Level::ERROR, service = %service, level = failing_level, reason = %reason, "service activation failed");
                self.notify(|listener| listener.on_error(service, failing_level, reason));
            }
            Interruption::Cancelled => {
                event!(Level::INFO, level = failing_level, "run level ascent cancelled");
            }
        }

        let (floor, level_reached) = match self.rollback_policy {
            RollbackPolicy::UnwindAll => (None, RUNLEVEL_INITIAL),
            RollbackPolicy::StepDown => (Some(failing_level), failing_level - 1),
        };
        let (deactivated, teardown_failures) = self.tear_down(floor).await;
        self.lock().set_current_level(level_reached);
        event!(
            Level::INFO,
            level = level_reached,
            deactivated,
            failures = teardown_failures.len(),
            "rollback complete"
        );

        match interruption {
            Interruption::Failure { service, reason } => {
                LocatorError::Activation(Box::new(ActivationError {
                    service: service.implementation().to_string(),
                    service_id: service.id(),
                    level: failing_level,
                    reason,
                    level_reached,
                    teardown_failures,
                }))
            }
            Interruption::Cancelled => {
                self.notify(|listener| listener.on_cancelled(level_reached));
                LocatorError::Cancelled(Box::new(Cancellation {
                    level_reached,
                    teardown_failures,
                }))
            }
        }
    }

    async fn descend(&self, from: i32, target: i32) -> Result<ProceedReport> {
        let mut deactivated = 0;
        let mut teardown_failures = Vec::new();

        let levels = self.lock().active_levels_above(target);
        if levels.is_empty() {
            self.lock().set_current_level(target);
            self.notify(|listener| listener.on_progress(target));
        }

        for (index, &level) in levels.iter().enumerate() {
            if self.cancel_requested() {
                let level_reached = self.current_level();
                event!(Level::INFO, level = level_reached, "run level descent cancelled");
                self.notify(|listener| listener.on_cancelled(level_reached));
                return Err(LocatorError::Cancelled(Box::new(Cancellation {
                    level_reached,
                    teardown_failures,
                })));
            }

            let (count, failures) = self.tear_down(Some(level)).await;
            deactivated += count;
            teardown_failures.extend(failures);

            // Everything above the next active level is down now
            let reached = levels.get(index + 1).copied().unwrap_or(target);
            self.lock().set_current_level(reached);
            event!(Level::INFO, level = reached, deactivated = count, "run level reached");
            self.notify(|listener| listener.on_progress(reached));
        }

        Ok(ProceedReport {
            from,
            level_reached: target,
            activated: 0,
            deactivated,
            teardown_failures,
            elapsed: Duration::ZERO,
        })
    }

    /// Pop and deactivate activation records tail-first until one falls
    /// below `floor`. Every popped service gets exactly one teardown call;
    /// failures are collected, never propagated.
    async fn tear_down(&self, floor: Option<i32>) -> (usize, Vec<DeactivationError>) {
        let mut deactivated = 0;
        let mut failures = Vec::new();

        loop {
            let record = self.lock().pop_tail(floor);
            let Some(record) = record else {
                break;
            };
            deactivated += 1;

            match deactivate_unit(self.lifecycle.as_ref(), &record.service).await {
                Ok(()) => {
                    event!(Level::DEBUG, service = %record.service, level = record.level, "service deactivated");
                }
                Err(reason) => {
                    event!(Level::WARN, service = %record.service, level = record.level, reason = %reason, "service deactivation failed");
                    failures.push(DeactivationError {
                        service: record.service.implementation().to_string(),
                        service_id: record.service.id(),
                        level: record.level,
                        reason,
                    });
                }
            }
        }

        (deactivated, failures)
    }

    fn cancel_requested(&self) -> bool {
        self.lock().cancel_requested()
    }

    /// Call every listener; a panicking listener is logged and skipped
    fn notify(&self, callback: impl Fn(&dyn RunLevelListener)) {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in &listeners {
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| callback(listener.as_ref())));
            if outcome.is_err() {
                event!(Level::WARN, "run level listener panicked");
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        lock_state(&self.state)
    }
}
