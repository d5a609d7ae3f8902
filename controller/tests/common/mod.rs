use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use anyhow::{bail, Result};
use async_trait::async_trait;
use controller::{Action, ObjectKey, Reconciler};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::ObjectMeta;
use tokio::time::{sleep, Duration, Instant};

pub fn init() {
    let _ = env_logger::builder()
        .target(env_logger::Target::Stdout)
        .filter_level(log::LevelFilter::Trace)
        .is_test(true)
        .try_init();
}

pub fn configmap(namespace: &str, name: &str, data: &[(&str, &str)]) -> ConfigMap {
    let data: BTreeMap<String, String> = data.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..ObjectMeta::default()
        },
        data: Some(data),
        ..ConfigMap::default()
    }
}

#[derive(Clone, Debug)]
pub struct Call {
    pub key: ObjectKey,
    pub found: bool,
    pub at: Instant,
}

/// Records every call, fails the first `failures` calls and holds each call for `hold`.
pub struct RecordingReconciler {
    failures: usize,
    hold: Duration,
    calls: Mutex<Vec<Call>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingReconciler {
    pub fn new(failures: usize, hold: Duration) -> Self {
        RecordingReconciler {
            failures,
            hold,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Reconciler<ConfigMap> for RecordingReconciler {
    async fn reconcile(&self, key: &ObjectKey, object: Option<ConfigMap>) -> Result<Action> {
        let nth = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(Call { key: key.clone(), found: object.is_some(), at: Instant::now() });
            calls.len()
        };
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if !self.hold.is_zero() {
            sleep(self.hold).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if nth <= self.failures {
            bail!("reconcile {} failed on purpose ({})", key, nth);
        }
        Ok(Action::await_change())
    }
}

/// Sleeps in small steps until `cond` holds, panics after `limit`.
pub async fn wait_until<F>(limit: Duration, mut cond: F)
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + limit;
    while !cond() {
        assert!(Instant::now() < deadline, "condition not met within {:?}", limit);
        sleep(Duration::from_millis(10)).await;
    }
}
