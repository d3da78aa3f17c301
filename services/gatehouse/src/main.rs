//! Gatehouse HTTP service entry point.
//!
//! # Purpose
//! Loads configuration, builds the seeded application state, and serves the API
//! alongside the Prometheus listener until shutdown.
use anyhow::Context;
use gatehouse::app::{build_router, build_state};
use gatehouse::config::GatehouseConfig;
use gatehouse::observability;
use std::future::Future;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GatehouseConfig::from_env_or_yaml().context("load gatehouse config")?;
    run_with_shutdown(config, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}

async fn run_with_shutdown<F>(config: GatehouseConfig, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let metrics_handle = observability::init_observability("gatehouse");
    let state = build_state(config.clone()).await?;
    let metrics_task = tokio::spawn(observability::serve_metrics(
        metrics_handle,
        config.metrics_bind,
    ));

    let app = build_router(state);
    let addr = config.bind_addr;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    tracing::info!(%addr, "gatehouse listening");
    tokio::pin!(shutdown);
    tokio::select! {
        result = axum::serve(listener, app.into_make_service()) => {
            result?;
        }
        _ = &mut shutdown => {
            tracing::info!("shutdown requested");
        }
    }

    metrics_task.abort();
    let _ = metrics_task.await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse::config::StorageBackend;
    use serial_test::serial;

    fn local_config() -> GatehouseConfig {
        GatehouseConfig {
            bind_addr: "127.0.0.1:0".parse().expect("bind"),
            metrics_bind: "127.0.0.1:0".parse().expect("metrics"),
            storage: StorageBackend::Memory,
            ..GatehouseConfig::default()
        }
    }

    #[tokio::test]
    #[serial]
    async fn run_with_shutdown_starts_and_stops() {
        run_with_shutdown(local_config(), async {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        })
        .await
        .expect("run should stop cleanly");
    }

    #[tokio::test]
    #[serial]
    async fn run_with_shutdown_fails_without_postgres_config() {
        let config = GatehouseConfig {
            storage: StorageBackend::Postgres,
            ..local_config()
        };
        let err = run_with_shutdown(config, std::future::pending::<()>())
            .await
            .err()
            .expect("missing postgres");
        assert!(err.to_string().contains("postgres configuration missing"));
    }
}
