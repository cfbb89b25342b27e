use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;
use berth_model::{ContainerSpec, Labels, WatchEvent, WatchEventKind, WorkloadState};
use berth_session::RemoteProcess;
use bytes::Bytes;
use futures::{StreamExt, stream};
use serde::{Deserialize, Serialize};
use tokio::{sync::broadcast, time::sleep};
use tracing::{debug, trace};

use super::process::{self, Program};
use crate::{
    cluster::{Cluster, LogStream, ProcessOptions, WatchStream},
    error::ClusterError,
    workload::WorkloadDescription,
};

/// Events buffered per namespace before a slow watch of that namespace lags.
const EVENT_BUFFER: usize = 1024;

/// Behaviour of a [`MemoryCluster`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryOptions {
    /// Mark created workloads ready after `ready_delay_ms`.
    pub auto_ready: bool,
    pub ready_delay_ms: u64,
    /// Time between a delete request and the `Deleted` event.
    pub delete_delay_ms: u64,
    /// Server-side lifetime of watch streams. `None` keeps them open.
    pub watch_timeout_ms: Option<u64>,
}

impl Default for MemoryOptions {
    fn default() -> Self {
        Self {
            auto_ready: true,
            ready_delay_ms: 0,
            delete_delay_ms: 0,
            watch_timeout_ms: None,
        }
    }
}

/// Operation observed by a [`MemoryCluster`], in the order it happened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Get(String),
    Create(String),
    Delete(String),
    DeletePods(Labels),
    Watch(Labels),
    /// A deleted workload was removed and its `Deleted` event sent.
    Removed(String),
    Logs(String),
    Attach(String),
    Exec(String, Vec<String>),
}

struct Entry {
    state: WorkloadState,
    desc: WorkloadDescription,
}

type Key = (String, String);

struct Inner {
    options: MemoryOptions,
    workloads: Mutex<HashMap<Key, Entry>>,
    logs: Mutex<HashMap<Key, Vec<Bytes>>>,
    calls: Mutex<Vec<Call>>,
    events: Mutex<HashMap<String, broadcast::Sender<WatchEvent>>>,
}

/// Cluster substrate kept in memory.
///
/// Workloads are namespaced; creates conflict on an existing name; deletion is asynchronous and
/// ends with a `Deleted` event; readiness is simulated according to [`MemoryOptions`].
/// Attach opens a `cat`-like process, exec runs a small scripted program set.
#[derive(Clone)]
pub struct MemoryCluster {
    inner: Arc<Inner>,
}

impl Default for MemoryCluster {
    fn default() -> Self {
        Self::new(MemoryOptions::default())
    }
}

impl MemoryCluster {
    pub fn new(options: MemoryOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                options,
                workloads: Mutex::new(HashMap::new()),
                logs: Mutex::new(HashMap::new()),
                calls: Mutex::new(Vec::new()),
                events: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Seed a ready workload without emitting events or recording calls.
    pub fn insert_ready(&self, ns: &str, spec: &ContainerSpec) -> Result<(), ClusterError> {
        let desc = WorkloadDescription::from_spec(spec);
        let mut state = initial_state(ns, &desc);
        state.ready_replicas = desc.replicas;
        state.available_replicas = desc.replicas;
        lock(&self.inner.workloads)?.insert(key(ns, &desc.name), Entry { state, desc });
        Ok(())
    }

    /// Set the ready and available counters of a workload and emit the change.
    pub fn set_ready(&self, ns: &str, name: &str, ready: u32) -> Result<(), ClusterError> {
        let mut workloads = lock(&self.inner.workloads)?;
        let entry = workloads
            .get_mut(&key(ns, name))
            .ok_or_else(|| not_found(name))?;
        entry.state.ready_replicas = ready;
        entry.state.available_replicas = ready;
        self.emit(ns, WatchEventKind::Modified, entry.state.clone());
        Ok(())
    }

    /// Lines returned by the next `stream_logs` calls for this workload.
    pub fn set_logs(&self, ns: &str, name: &str, lines: &[&str]) -> Result<(), ClusterError> {
        let chunks = lines
            .iter()
            .map(|l| Bytes::from(format!("{l}\n")))
            .collect();
        lock(&self.inner.logs)?.insert(key(ns, name), chunks);
        Ok(())
    }

    pub fn description(&self, ns: &str, name: &str) -> Option<WorkloadDescription> {
        let workloads = self.inner.workloads.lock().ok()?;
        workloads.get(&key(ns, name)).map(|e| e.desc.clone())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner
            .calls
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    fn record(&self, call: Call) {
        trace!(?call, "memory cluster call");
        if let Ok(mut calls) = self.inner.calls.lock() {
            calls.push(call);
        }
    }

    /// Publish on the namespace's channel. Nobody watching means nothing to do.
    fn emit(&self, ns: &str, kind: WatchEventKind, object: WorkloadState) {
        let Ok(events) = self.inner.events.lock() else {
            return;
        };
        if let Some(tx) = events.get(ns) {
            let _ = tx.send(WatchEvent::new(kind, object));
        }
    }

    fn subscribe(&self, ns: &str) -> Result<broadcast::Receiver<WatchEvent>, ClusterError> {
        let mut events = lock(&self.inner.events)?;
        let tx = events
            .entry(ns.to_string())
            .or_insert_with(|| broadcast::channel(EVENT_BUFFER).0);
        Ok(tx.subscribe())
    }

    fn exists(&self, ns: &str, name: &str) -> Result<(), ClusterError> {
        if lock(&self.inner.workloads)?.contains_key(&key(ns, name)) {
            Ok(())
        } else {
            Err(not_found(name))
        }
    }

    fn schedule_ready(&self, ns: &str, name: &str) {
        let this = self.clone();
        let (ns, name) = (ns.to_string(), name.to_string());
        let delay = Duration::from_millis(self.inner.options.ready_delay_ms);
        tokio::spawn(async move {
            if !delay.is_zero() {
                sleep(delay).await;
            }
            let Ok(mut workloads) = this.inner.workloads.lock() else {
                return;
            };
            if let Some(entry) = workloads.get_mut(&key(&ns, &name)) {
                if entry.state.deleting {
                    return;
                }
                entry.state.ready_replicas = entry.state.desired_replicas;
                entry.state.available_replicas = entry.state.desired_replicas;
                debug!(%ns, %name, "workload became ready");
                this.emit(&ns, WatchEventKind::Modified, entry.state.clone());
            }
        });
    }

    fn schedule_removal(&self, ns: &str, name: &str) {
        let this = self.clone();
        let (ns, name) = (ns.to_string(), name.to_string());
        let delay = Duration::from_millis(self.inner.options.delete_delay_ms);
        tokio::spawn(async move {
            if !delay.is_zero() {
                sleep(delay).await;
            }
            let Ok(mut workloads) = this.inner.workloads.lock() else {
                return;
            };
            if let Some(mut entry) = workloads.remove(&key(&ns, &name)) {
                entry.state.ready_replicas = 0;
                entry.state.available_replicas = 0;
                this.record(Call::Removed(name.clone()));
                debug!(%ns, %name, "workload removed");
                this.emit(&ns, WatchEventKind::Deleted, entry.state);
            }
        });
    }
}

#[async_trait]
impl Cluster for MemoryCluster {
    async fn get_workload(&self, ns: &str, name: &str) -> Result<Option<WorkloadState>, ClusterError> {
        self.record(Call::Get(name.to_string()));
        let workloads = lock(&self.inner.workloads)?;
        Ok(workloads.get(&key(ns, name)).map(|e| e.state.clone()))
    }

    async fn create_workload(&self, ns: &str, desc: &WorkloadDescription) -> Result<(), ClusterError> {
        {
            let mut workloads = lock(&self.inner.workloads)?;
            let k = key(ns, &desc.name);
            if workloads.contains_key(&k) {
                return Err(ClusterError::Conflict {
                    kind: "workload",
                    name: desc.name.clone(),
                });
            }
            let state = initial_state(ns, desc);
            self.record(Call::Create(desc.name.clone()));
            self.emit(ns, WatchEventKind::Added, state.clone());
            workloads.insert(
                k,
                Entry {
                    state,
                    desc: desc.clone(),
                },
            );
        }
        if self.inner.options.auto_ready {
            self.schedule_ready(ns, &desc.name);
        }
        Ok(())
    }

    async fn delete_workload(&self, ns: &str, name: &str, force: bool) -> Result<(), ClusterError> {
        {
            let mut workloads = lock(&self.inner.workloads)?;
            let entry = workloads
                .get_mut(&key(ns, name))
                .ok_or_else(|| not_found(name))?;
            self.record(Call::Delete(name.to_string()));
            if entry.state.deleting {
                return Ok(());
            }
            debug!(%ns, %name, force, "deleting workload");
            entry.state.deleting = true;
            self.emit(ns, WatchEventKind::Modified, entry.state.clone());
        }
        self.schedule_removal(ns, name);
        Ok(())
    }

    async fn delete_pods(&self, _ns: &str, selector: &Labels) -> Result<(), ClusterError> {
        self.record(Call::DeletePods(selector.clone()));
        Ok(())
    }

    async fn watch_workloads(&self, ns: &str, selector: &Labels) -> Result<WatchStream, ClusterError> {
        self.record(Call::Watch(selector.clone()));
        let rx = self.subscribe(ns)?;
        let selector = selector.clone();

        let events = stream::unfold(rx, move |mut rx| {
            let selector = selector.clone();
            async move {
                loop {
                    match rx.recv().await {
                        Ok(event) => {
                            if event.object.labels.matches(&selector) {
                                return Some((Ok(event), rx));
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            let err = ClusterError::Watch(format!("watch lagged by {n} events"));
                            return Some((Err(err), rx));
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        });

        Ok(match self.inner.options.watch_timeout_ms {
            Some(ms) => events.take_until(sleep(Duration::from_millis(ms))).boxed(),
            None => events.boxed(),
        })
    }

    async fn stream_logs(&self, ns: &str, name: &str) -> Result<LogStream, ClusterError> {
        self.exists(ns, name)?;
        self.record(Call::Logs(name.to_string()));
        let chunks = lock(&self.inner.logs)?
            .get(&key(ns, name))
            .cloned()
            .unwrap_or_default();
        Ok(stream::iter(chunks.into_iter().map(Ok)).boxed())
    }

    async fn attach(&self, ns: &str, name: &str, opts: ProcessOptions) -> Result<RemoteProcess, ClusterError> {
        self.exists(ns, name)?;
        self.record(Call::Attach(name.to_string()));
        trace!(stdin = opts.stdin, tty = opts.tty, "attach");
        Ok(process::spawn(Program::Cat))
    }

    async fn exec(
        &self,
        ns: &str,
        name: &str,
        command: &[String],
        opts: ProcessOptions,
    ) -> Result<RemoteProcess, ClusterError> {
        self.exists(ns, name)?;
        self.record(Call::Exec(name.to_string(), command.to_vec()));
        trace!(stdin = opts.stdin, tty = opts.tty, "exec");
        Ok(process::spawn(Program::parse(command)))
    }
}

fn key(ns: &str, name: &str) -> Key {
    (ns.to_string(), name.to_string())
}

fn not_found(name: &str) -> ClusterError {
    ClusterError::NotFound {
        kind: "workload",
        name: name.to_string(),
    }
}

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>, ClusterError> {
    m.lock()
        .map_err(|_| ClusterError::Api("memory cluster lock poisoned".into()))
}

fn initial_state(ns: &str, desc: &WorkloadDescription) -> WorkloadState {
    WorkloadState {
        name: desc.name.clone(),
        namespace: ns.to_string(),
        labels: desc.labels.clone(),
        desired_replicas: desc.replicas,
        ready_replicas: 0,
        available_replicas: 0,
        deleting: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(name: &str) -> WorkloadDescription {
        WorkloadDescription::from_spec(&ContainerSpec::new(name, "nginx"))
    }

    #[tokio::test]
    async fn duplicate_create_conflicts() {
        let cluster = MemoryCluster::default();
        cluster.create_workload("t-1", &desc("web")).await.unwrap();
        let err = cluster.create_workload("t-1", &desc("web")).await.unwrap_err();
        assert!(matches!(err, ClusterError::Conflict { .. }));

        cluster.create_workload("t-2", &desc("web")).await.unwrap();
    }

    #[tokio::test]
    async fn churn_in_one_namespace_does_not_lag_another() {
        let cluster = MemoryCluster::default();
        let spec = ContainerSpec::new("web", "nginx");
        let mut quiet = cluster.watch_workloads("t-1", &spec.selector()).await.unwrap();
        let _busy = cluster.watch_workloads("t-2", &spec.selector()).await.unwrap();

        cluster.insert_ready("t-2", &spec).unwrap();
        for i in 0..2 * EVENT_BUFFER {
            cluster.set_ready("t-2", "web", (i % 2) as u32).unwrap();
        }
        cluster.create_workload("t-1", &desc("web")).await.unwrap();

        let added = quiet.next().await.unwrap().unwrap();
        assert_eq!(added.kind, WatchEventKind::Added);
        assert_eq!(added.object.namespace, "t-1");
    }

    #[tokio::test]
    async fn watch_sees_lifecycle_in_own_namespace() {
        let cluster = MemoryCluster::default();
        let spec = ContainerSpec::new("web", "nginx");
        let mut watch = cluster.watch_workloads("t-1", &spec.selector()).await.unwrap();

        cluster.create_workload("t-2", &desc("web")).await.unwrap();
        cluster.create_workload("t-1", &desc("web")).await.unwrap();

        let added = watch.next().await.unwrap().unwrap();
        assert_eq!(added.kind, WatchEventKind::Added);
        assert_eq!(added.object.namespace, "t-1");
        let ready = watch.next().await.unwrap().unwrap();
        assert!(ready.object.is_ready());

        cluster.delete_workload("t-1", "web", true).await.unwrap();
        let deleting = watch.next().await.unwrap().unwrap();
        assert!(deleting.object.deleting);
        let deleted = watch.next().await.unwrap().unwrap();
        assert_eq!(deleted.kind, WatchEventKind::Deleted);
        assert!(cluster.get_workload("t-1", "web").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deleting_an_absent_workload_is_not_found() {
        let cluster = MemoryCluster::default();
        let err = cluster.delete_workload("t-1", "ghost", false).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test(start_paused = true)]
    async fn watch_timeout_ends_the_stream() {
        let cluster = MemoryCluster::new(MemoryOptions {
            watch_timeout_ms: Some(1_000),
            ..Default::default()
        });
        let mut watch = cluster.watch_workloads("t-1", &Labels::new()).await.unwrap();
        assert!(watch.next().await.is_none());
    }

    #[tokio::test]
    async fn canned_logs() {
        let cluster = MemoryCluster::default();
        cluster.insert_ready("t-1", &ContainerSpec::new("web", "nginx")).unwrap();
        cluster.set_logs("t-1", "web", &["a", "b"]).unwrap();
        let chunks: Vec<_> = cluster
            .stream_logs("t-1", "web")
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert_eq!(chunks, vec![Bytes::from("a\n"), Bytes::from("b\n")]);
    }
}
