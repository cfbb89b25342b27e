use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use berth_api::{HttpApi, PipelineAdapter};
use berth_core::{
    memory::{MemoryCluster, MemoryDns, MemoryRoutes},
    pipeline::Pipeline,
};
use berth_observe::{init_local_offset, init_logger};
use berth_prometheus::PrometheusMetrics;

mod config;
use config::AgentConfig;

fn main() -> anyhow::Result<()> {
    // Offset detection only works while the process is single-threaded.
    init_local_offset();

    let cfg = AgentConfig::from_env()?;
    init_logger(&cfg.logger)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(serve(cfg))
}

async fn serve(cfg: AgentConfig) -> anyhow::Result<()> {
    let metrics = PrometheusMetrics::new()?;

    let cluster = MemoryCluster::new(cfg.memory_cluster.clone());
    let pipeline = Pipeline::new(
        Arc::new(cluster),
        Arc::new(MemoryDns::new()),
        Arc::new(MemoryRoutes::new(cfg.ingress_suffix.clone())),
        cfg.pipeline.clone(),
    )
    .with_metrics(Arc::new(metrics.clone()));

    let adapter = PipelineAdapter::new(pipeline).with_metrics(metrics);
    let router = HttpApi::new(Arc::new(adapter)).router();

    let listener = tokio::net::TcpListener::bind(cfg.listen)
        .await
        .with_context(|| format!("binding {}", cfg.listen))?;
    info!(addr = %cfg.listen, "agent listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;
    Ok(())
}
