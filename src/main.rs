use axum::routing::get;
use axum_prometheus::PrometheusMetricLayer;
use nexus_market::config::Config;
use nexus_market::{routes, AppState};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn};

/// Card cache snapshots hit disk every 5 minutes.
const CACHE_FLUSH_SCHEDULE: &str = "0 */5 * * * *";

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    dotenvy::dotenv().ok();
    std::env::set_var(
        "RUST_LOG",
        std::env::var("RUST_LOG").unwrap_or_else(|_| String::from("info")),
    );

    // initialize tracing
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    let state = AppState::new(&config)?;

    state.cards.load_snapshot().await;
    if !state.chat.is_enabled() {
        warn!("ANTHROPIC_API_KEY not set, chat personas are disabled");
    }

    let scheduler = JobScheduler::new().await?;
    let cards = state.cards.clone();
    scheduler
        .add(Job::new_async(CACHE_FLUSH_SCHEDULE, move |_id, _sched| {
            let cards = cards.clone();
            Box::pin(async move {
                if let Err(err) = cards.flush_snapshot().await {
                    warn!("card cache flush failed: {err}");
                }
            })
        })?)
        .await?;
    scheduler.start().await?;

    let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
    let app = routes::router(state)
        .route("/metrics", get(|| async move { metric_handle.render() }))
        .layer(prometheus_layer);

    info!("listening on {}", config.bind_addr);
    axum::Server::bind(&config.bind_addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
