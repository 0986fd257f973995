use std::sync::Arc;
use std::time::Duration;

use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

use super::Context;
use crate::admission::AdmissionGate;
use crate::eval::Evaluator;
use crate::pool::ContainerPool;
use crate::router::{self, AppState};

pub async fn run(ctx: Context) -> anyhow::Result<()> {
    let langs = ctx.settings.language_names();

    if ctx.settings.build_concurrently {
        crate::image::build_concurrent(ctx.engine.clone(), &ctx.settings.languages_path, &langs)
            .await?;
    } else {
        crate::image::build_sequential(ctx.engine.as_ref(), &ctx.settings.languages_path, &langs)
            .await?;
    }

    let pool = Arc::new(ContainerPool::new(ctx.engine.clone(), ctx.settings.clone()));

    if ctx.settings.prepare_containers {
        pool.prepare_all(&langs).await?;
    }

    let interval = Duration::from_secs(ctx.settings.cleanup_interval_minutes.max(1) * 60);
    let _reaper = pool.clone().spawn_reaper(interval);

    let state = AppState {
        settings: ctx.settings.clone(),
        engine: ctx.engine.clone(),
        pool: pool.clone(),
        admission: Arc::new(AdmissionGate::new()),
        evaluator: Arc::new(Evaluator::new(ctx.engine.clone())),
    };

    let app = router::build_router(state);
    let addr = format!("{}:{}", ctx.settings.host, ctx.settings.port);
    info!(addr = addr.as_str(), "starting server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    // `notify` only marks the drain phase as started; the timeout below must
    // bound that phase alone, not the entire (indefinite) serving period
    // before a signal arrives.
    let drain = Arc::new(tokio::sync::Notify::new());
    let drain_for_serve = drain.clone();

    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { drain_for_serve.notified().await })
            .await
    });

    wait_for_signal().await;
    info!("shutdown signal received, draining in-flight connections");
    drain.notify_one();

    match tokio::time::timeout(SHUTDOWN_GRACE_PERIOD, server).await {
        Ok(Ok(serve_result)) => serve_result?,
        Ok(Err(join_err)) => return Err(join_err.into()),
        Err(_) => warn!("graceful shutdown deadline elapsed, exiting with connections still draining"),
    }

    Ok(())
}

/// Bound on how long a graceful shutdown is allowed to drain in-flight
/// connections before the process exits anyway (§5).
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Waits for SIGINT or SIGTERM.
async fn wait_for_signal() {
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }
}
