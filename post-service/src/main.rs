use actix_web::{web, App, HttpResponse, HttpServer};
use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::info;

use idempotent_consumer::IdempotencyGuard;
use post_service::clients::IdentityClient;
use post_service::config::Config;
use post_service::consumers;
use post_service::db::ReplicaRepository;
use post_service::kafka::EventConsumer;
use post_service::metrics;
use post_service::services::run_replica_backfill;

struct HealthState {
    db_pool: sqlx::PgPool,
    redis: ConnectionManager,
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate =
            signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = terminate.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    }
}

async fn readiness(state: web::Data<HealthState>) -> HttpResponse {
    if let Err(e) = sqlx::query("SELECT 1").execute(&state.db_pool).await {
        return HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "ready": false,
            "error": format!("PostgreSQL connection failed: {}", e),
        }));
    }

    let mut conn = state.redis.clone();
    let ping: std::result::Result<String, _> = redis::cmd("PING").query_async(&mut conn).await;
    if let Err(e) = ping {
        return HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "ready": false,
            "error": format!("Redis connection failed: {}", e),
        }));
    }

    HttpResponse::Ok().json(serde_json::json!({ "ready": true }))
}

/// Periodically delete processed-event rows past the retention window
async fn run_retention_sweep(guard: IdempotencyGuard, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        if let Err(err) = guard.cleanup_expired().await {
            tracing::warn!("Processed event cleanup failed: {}", err);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    info!("🔧 Starting post-service");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        "✅ Configuration loaded: env={}, http_port={}",
        config.app.env, config.app.http_port
    );

    // Initialize database pool
    let pg_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;

    // Verify database connection
    sqlx::query("SELECT 1")
        .execute(&pg_pool)
        .await
        .context("Failed to verify database connection")?;
    info!("✅ Database pool created and verified");

    // Run database migrations
    sqlx::migrate!("./migrations")
        .run(&pg_pool)
        .await
        .context("Failed to run database migrations")?;
    info!("✅ Database migrations completed");

    // Initialize Redis connection
    let redis_client =
        redis::Client::open(config.redis.url.as_str()).context("Failed to create Redis client")?;
    let redis_conn = ConnectionManager::new(redis_client)
        .await
        .context("Failed to connect to Redis")?;
    info!("✅ Redis connection established");

    // Replica backfill must finish before the consumer starts: bulk insert
    // is insert-if-absent, so events applied from here on always win.
    let replica_repo = ReplicaRepository::new(pg_pool.clone());
    let identity_client = IdentityClient::new(&config.identity)?;
    run_replica_backfill(&replica_repo, &identity_client)
        .await
        .context("Failed to backfill user replica")?;
    info!("✅ User replica ready");

    // Idempotency guard shared by all event handlers
    let guard = IdempotencyGuard::new(pg_pool.clone(), config.kafka.processed_retention());

    // Build the consumer over all registered identity topics
    let registry = consumers::build_registry(guard.clone(), replica_repo)?;
    let consumer = EventConsumer::new(
        &config.kafka.brokers,
        &config.kafka.group_id,
        registry,
        config.kafka.handler_timeout(),
    )?;
    info!("✅ Kafka consumer created");

    let http_addr = format!("{}:{}", config.app.host, config.app.http_port);
    info!("🚀 HTTP health/metrics server: http://{}", http_addr);

    let mut join_set = JoinSet::new();

    // Spawn HTTP server task
    let health_state = web::Data::new(HealthState {
        db_pool: pg_pool.clone(),
        redis: redis_conn.clone(),
    });
    let http_server = HttpServer::new(move || {
        App::new()
            .app_data(health_state.clone())
            .route("/health", web::get().to(|| async { "OK" }))
            .route("/ready", web::get().to(readiness))
            .route("/metrics", web::get().to(metrics::serve_metrics))
    })
    .bind(&http_addr)
    .context("Failed to bind HTTP server")?
    .run();

    join_set.spawn(async move {
        http_server
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))
    });
    info!("✅ HTTP server started");

    // Spawn consumer loop
    join_set.spawn(async move {
        consumer.run().await;
        Ok(())
    });
    info!("✅ Kafka consumer loop started");

    // Spawn processed-event retention sweep
    let sweep_interval = config.kafka.cleanup_interval();
    join_set.spawn(async move {
        run_retention_sweep(guard, sweep_interval).await;
        Ok(())
    });
    info!("✅ Retention sweep started");

    info!("🎉 post-service is running");

    tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown signal received, stopping tasks");
        }
        Some(result) = join_set.join_next() => {
            match result {
                Ok(Ok(())) => {
                    info!("Task completed");
                }
                Ok(Err(e)) => {
                    tracing::error!("Task failed: {:#}", e);
                    join_set.shutdown().await;
                    return Err(e);
                }
                Err(e) => {
                    tracing::error!("Task panicked: {:#}", e);
                    join_set.shutdown().await;
                    return Err(anyhow::anyhow!("Task panicked: {}", e));
                }
            }
        }
    }

    join_set.shutdown().await;
    info!("🛑 post-service shutting down");
    Ok(())
}
