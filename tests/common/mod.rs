#![allow(dead_code)]

use anyhow::anyhow;
use async_trait::async_trait;
use runlevel_locator::{RunLevelListener, ServiceHandle, ServiceLifecycle};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// Lifecycle call observed by `RecordingLifecycle`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Activate(String),
    Deactivate(String),
}

/// Scripted lifecycle double: records every call, fails or delays the
/// services it is told to, and can hold one service's activation until the
/// test releases it.
#[derive(Default)]
pub struct RecordingLifecycle {
    calls: Mutex<Vec<Call>>,
    fail_activation: Mutex<HashSet<String>>,
    fail_deactivation: Mutex<HashSet<String>>,
    delays: Mutex<HashMap<String, Duration>>,
    gate: Mutex<Option<String>>,
    teardown_gate: Mutex<Option<String>>,
    pub gate_entered: Notify,
    pub gate_release: Notify,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingLifecycle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_activation_of(&self, name: &str) {
        self.fail_activation.lock().unwrap().insert(name.to_string());
    }

    pub fn fail_deactivation_of(&self, name: &str) {
        self.fail_deactivation.lock().unwrap().insert(name.to_string());
    }

    pub fn delay(&self, name: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(name.to_string(), delay);
    }

    /// Block the activation of `name` until `gate_release` is notified
    pub fn gate(&self, name: &str) {
        *self.gate.lock().unwrap() = Some(name.to_string());
    }

    /// Block the deactivation of `name` until `gate_release` is notified
    pub fn gate_teardown(&self, name: &str) {
        *self.teardown_gate.lock().unwrap() = Some(name.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn activated(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Activate(name) => Some(name),
                Call::Deactivate(_) => None,
            })
            .collect()
    }

    pub fn deactivated(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Deactivate(name) => Some(name),
                Call::Activate(_) => None,
            })
            .collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServiceLifecycle for RecordingLifecycle {
    async fn activate(&self, service: &ServiceHandle) -> anyhow::Result<()> {
        let name = service.implementation().to_string();
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        let delay = self.delays.lock().unwrap().get(&name).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let gated = self.gate.lock().unwrap().as_deref() == Some(name.as_str());
        if gated {
            self.gate_entered.notify_one();
            self.gate_release.notified().await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let fails = self.fail_activation.lock().unwrap().contains(&name);
        if fails {
            return Err(anyhow!("{} refused to start", name));
        }
        self.calls.lock().unwrap().push(Call::Activate(name));
        Ok(())
    }

    async fn deactivate(&self, service: &ServiceHandle) -> anyhow::Result<()> {
        let name = service.implementation().to_string();
        self.calls.lock().unwrap().push(Call::Deactivate(name.clone()));

        let gated = self.teardown_gate.lock().unwrap().as_deref() == Some(name.as_str());
        if gated {
            self.gate_entered.notify_one();
            self.gate_release.notified().await;
        }

        let fails = self.fail_deactivation.lock().unwrap().contains(&name);
        if fails {
            return Err(anyhow!("{} leaked its connection", name));
        }
        Ok(())
    }
}

/// Listener that records every notification as text
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<String>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl RunLevelListener for RecordingListener {
    fn on_progress(&self, level: i32) {
        self.events.lock().unwrap().push(format!("progress:{}", level));
    }

    fn on_error(&self, service: &ServiceHandle, level: i32, _reason: &str) {
        self.events
            .lock()
            .unwrap()
            .push(format!("error:{}@{}", service.implementation(), level));
    }

    fn on_cancelled(&self, level_reached: i32) {
        self.events
            .lock()
            .unwrap()
            .push(format!("cancelled:{}", level_reached));
    }
}
