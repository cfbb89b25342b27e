use std::sync::Arc;

use async_trait::async_trait;
use berth_core::{
    cluster::{Cluster, LogStream, ProcessOptions, WatchStream},
    controller::Controller,
    error::ClusterError,
    memory::{Call, MemoryCluster, MemoryOptions},
    workload::WorkloadDescription,
};
use berth_model::{ContainerSpec, FailureKind, Labels, ProgressEvent, RunResult, WorkloadState};
use berth_session::RemoteProcess;
use tokio_util::sync::CancellationToken;

const NS: &str = "tenant-1";

fn controller(cluster: &MemoryCluster) -> Controller {
    Controller::new(Arc::new(cluster.clone()))
}

fn lines(events: &[ProgressEvent]) -> Vec<String> {
    events.iter().map(ToString::to_string).collect()
}

fn creates(cluster: &MemoryCluster) -> usize {
    cluster
        .calls()
        .iter()
        .filter(|c| matches!(c, Call::Create(_)))
        .count()
}

#[tokio::test]
async fn second_converge_without_force_is_a_no_op() {
    let cluster = MemoryCluster::default();
    let ctl = controller(&cluster);
    let spec = ContainerSpec::new("web", "nginx:1.27");

    let (first, err) = ctl
        .converge_stream(NS, spec.clone(), &CancellationToken::new())
        .collect_all()
        .await;
    assert!(err.is_none());
    let waiting = lines(&first)
        .iter()
        .filter(|l| l.contains("created, waiting"))
        .count();
    assert_eq!(waiting, 1, "{first:?}");
    assert!(matches!(
        first.last(),
        Some(ProgressEvent::Done {
            result: RunResult::Running { replicas: 1, .. }
        })
    ));
    assert_eq!(creates(&cluster), 1);

    let (second, err) = ctl
        .converge_stream(NS, spec, &CancellationToken::new())
        .collect_all()
        .await;
    assert!(err.is_none());
    assert_eq!(second.len(), 1, "{second:?}");
    assert!(matches!(
        second[0],
        ProgressEvent::Done {
            result: RunResult::AlreadyExists { .. }
        }
    ));
    assert!(second[0].to_string().contains("--force"));
    assert_eq!(creates(&cluster), 1);
}

#[tokio::test]
async fn force_recreate_creates_only_after_deletion_observed() {
    let cluster = MemoryCluster::new(MemoryOptions {
        delete_delay_ms: 50,
        ..Default::default()
    });
    let mut spec = ContainerSpec::new("web", "nginx:1.27");
    cluster.insert_ready(NS, &spec).unwrap();
    spec.force = true;
    spec.image = "nginx:1.28".into();

    let (events, err) = controller(&cluster)
        .converge_stream(NS, spec, &CancellationToken::new())
        .collect_all()
        .await;
    assert!(err.is_none());
    assert!(matches!(
        events.last(),
        Some(ProgressEvent::Done {
            result: RunResult::Running { .. }
        })
    ));

    let calls = cluster.calls();
    let pos = |pred: fn(&Call) -> bool| calls.iter().position(pred).unwrap();
    let delete = pos(|c| matches!(c, Call::Delete(_)));
    let pods = pos(|c| matches!(c, Call::DeletePods(_)));
    let removed = pos(|c| matches!(c, Call::Removed(_)));
    let create = pos(|c| matches!(c, Call::Create(_)));
    assert!(delete < removed && pods < create);
    assert!(removed < create, "{calls:?}");
    assert_eq!(creates(&cluster), 1);

    let desc = cluster.description(NS, "web").unwrap();
    assert_eq!(desc.image, "nginx:1.28");
}

#[tokio::test(start_paused = true)]
async fn watch_ending_before_readiness_fails_to_start() {
    let cluster = MemoryCluster::new(MemoryOptions {
        auto_ready: false,
        watch_timeout_ms: Some(30_000),
        ..Default::default()
    });
    let (events, err) = controller(&cluster)
        .converge_stream(NS, ContainerSpec::new("web", "nginx"), &CancellationToken::new())
        .collect_all()
        .await;

    assert!(err.is_none());
    let Some(ProgressEvent::Failed { kind, message }) = events.last() else {
        panic!("expected failure, got {events:?}");
    };
    assert_eq!(*kind, FailureKind::NotConverged);
    assert_eq!(message, "container 'web' failed to start");
    // No rollback.
    assert!(cluster.description(NS, "web").is_some());
}

#[tokio::test(start_paused = true)]
async fn watch_ending_before_deletion_fails_to_stop() {
    let cluster = MemoryCluster::new(MemoryOptions {
        delete_delay_ms: 60_000,
        watch_timeout_ms: Some(10_000),
        ..Default::default()
    });
    let mut spec = ContainerSpec::new("web", "nginx");
    cluster.insert_ready(NS, &spec).unwrap();
    spec.force = true;

    let (events, _) = controller(&cluster)
        .converge_stream(NS, spec, &CancellationToken::new())
        .collect_all()
        .await;

    let Some(ProgressEvent::Failed { message, .. }) = events.last() else {
        panic!("expected failure, got {events:?}");
    };
    assert_eq!(message, "container 'web' failed to stop");
    assert_eq!(creates(&cluster), 0);
}

#[tokio::test]
async fn cancellation_before_readiness_leaves_workload_in_place() {
    let cluster = MemoryCluster::new(MemoryOptions {
        auto_ready: false,
        ..Default::default()
    });
    let cancel = CancellationToken::new();
    let stream = controller(&cluster).converge_stream(NS, ContainerSpec::new("web", "nginx"), &cancel);

    let watcher = cluster.clone();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        while watcher.description(NS, "web").is_none() {
            tokio::task::yield_now().await;
        }
        trigger.cancel();
    });

    let (_, err) = stream.collect_all().await;
    assert!(err.expect("cancellation is reported").is_aborted());
    assert!(cluster.description(NS, "web").is_some());
}

/// Hides existing workloads from `get_workload`, as if a concurrent request created one in
/// between.
struct LosingRace(MemoryCluster);

#[async_trait]
impl Cluster for LosingRace {
    async fn get_workload(&self, _: &str, _: &str) -> Result<Option<WorkloadState>, ClusterError> {
        Ok(None)
    }
    async fn create_workload(&self, ns: &str, desc: &WorkloadDescription) -> Result<(), ClusterError> {
        self.0.create_workload(ns, desc).await
    }
    async fn delete_workload(&self, ns: &str, name: &str, force: bool) -> Result<(), ClusterError> {
        self.0.delete_workload(ns, name, force).await
    }
    async fn delete_pods(&self, ns: &str, selector: &Labels) -> Result<(), ClusterError> {
        self.0.delete_pods(ns, selector).await
    }
    async fn watch_workloads(&self, ns: &str, selector: &Labels) -> Result<WatchStream, ClusterError> {
        self.0.watch_workloads(ns, selector).await
    }
    async fn stream_logs(&self, ns: &str, name: &str) -> Result<LogStream, ClusterError> {
        self.0.stream_logs(ns, name).await
    }
    async fn attach(&self, ns: &str, name: &str, opts: ProcessOptions) -> Result<RemoteProcess, ClusterError> {
        self.0.attach(ns, name, opts).await
    }
    async fn exec(
        &self,
        ns: &str,
        name: &str,
        command: &[String],
        opts: ProcessOptions,
    ) -> Result<RemoteProcess, ClusterError> {
        self.0.exec(ns, name, command, opts).await
    }
}

#[tokio::test]
async fn create_conflict_is_surfaced() {
    let memory = MemoryCluster::default();
    let spec = ContainerSpec::new("web", "nginx");
    memory.insert_ready(NS, &spec).unwrap();

    let ctl = Controller::new(Arc::new(LosingRace(memory)));
    let (events, _) = ctl
        .converge_stream(NS, spec, &CancellationToken::new())
        .collect_all()
        .await;

    let Some(ProgressEvent::Failed { kind, .. }) = events.last() else {
        panic!("expected failure, got {events:?}");
    };
    assert_eq!(*kind, FailureKind::Conflict);
}
