use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use valpago_core::adapters::{
    PostgresRecordStore, RedisBroadcastLog, RedisEventLog, RedisStatusRegister,
};
use valpago_core::cli::{self, Cli, Commands, DbCommands};
use valpago_core::config::Config;
use valpago_core::health::{Dependency, PostgresChecker, RedisChecker};
use valpago_core::media::MediaGraphClient;
use valpago_core::ports::{BroadcastLog, EventLog, RecordStore};
use valpago_core::services::{
    spawn_workers, EnrichmentWorker, EvidenceResolver, HttpWebhookNotifier, LiveGateway,
    WorkerSettings,
};
use valpago_core::use_cases::TransactionService;
use valpago_core::{cors_layer, create_app, db, AppState};

/// Store handles shared by the API and the worker pool.
struct Infrastructure {
    pool: sqlx::PgPool,
    redis: redis::aio::ConnectionManager,
    records: Arc<dyn RecordStore>,
    events: Arc<dyn EventLog>,
    broadcast: Arc<dyn BroadcastLog>,
    register: Arc<RedisStatusRegister>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    init_tracing();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Worker => run_worker_pool(config).await,
        Commands::Db(DbCommands::Migrate) => cli::handle_db_migrate(&config).await,
        Commands::Config => cli::handle_config_validate(&config).await,
    }
}

fn init_tracing() {
    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
    );

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn connect(config: &Config) -> anyhow::Result<Infrastructure> {
    let pool = db::create_pool(config).await?;
    tracing::info!("Database pool ready");

    let client = redis::Client::open(config.redis_url.as_str())?;
    let redis = db::connect_redis(&client, config.store_connect_timeout).await?;
    tracing::info!("Redis connection ready");

    Ok(Infrastructure {
        records: Arc::new(PostgresRecordStore::new(pool.clone())),
        events: Arc::new(RedisEventLog::new(
            client.clone(),
            redis.clone(),
            config.event_stream.clone(),
            config.consumer_group.clone(),
            config.store_connect_timeout,
        )),
        broadcast: Arc::new(RedisBroadcastLog::new(
            client,
            redis.clone(),
            config.notification_stream.clone(),
            config.notification_stream_maxlen,
            config.store_connect_timeout,
        )),
        register: Arc::new(RedisStatusRegister::new(redis.clone())),
        pool,
        redis,
    })
}

async fn start_workers(
    config: &Config,
    infra: &Infrastructure,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<Vec<JoinHandle<()>>> {
    let media = MediaGraphClient::new(
        config.media_graph_url.clone(),
        config.media_bearer_token.clone(),
    );
    let worker = Arc::new(EnrichmentWorker::new(
        infra.records.clone(),
        infra.broadcast.clone(),
        Arc::new(EvidenceResolver::new(media)),
        config.ack_on_publish_failure,
    ));

    let handles = spawn_workers(
        worker,
        infra.events.clone(),
        &config.consumer_name,
        config.worker_count,
        WorkerSettings::from_config(config),
        shutdown,
    )
    .await?;
    tracing::info!(
        count = handles.len(),
        group = %config.consumer_group,
        stream = %config.event_stream,
        "Worker pool started"
    );

    Ok(handles)
}

/// Flip the shutdown signal on Ctrl+C.
fn watch_ctrl_c() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    let (tx, rx) = watch::channel(false);
    let signal = tx.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = signal.send(true);
    });
    (tx, rx)
}

async fn join_workers(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!("Worker task failed: {}", e);
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let infra = connect(&config).await?;
    let (_shutdown_tx, shutdown) = watch_ctrl_c();

    let workers = start_workers(&config, &infra, shutdown.clone()).await?;

    let transactions = TransactionService::new(
        infra.register.clone(),
        infra.records.clone(),
        infra.events.clone(),
        Arc::new(HttpWebhookNotifier::new(config.webhook_url.clone())),
    );
    let gateway = LiveGateway::new(
        infra.broadcast.clone(),
        config.live_buffer,
        config.stream_block,
        shutdown.clone(),
    );
    let health = vec![
        Dependency {
            name: "postgres",
            critical: true,
            checker: Arc::new(PostgresChecker::new(infra.pool.clone())),
        },
        Dependency {
            name: "redis",
            critical: true,
            checker: Arc::new(RedisChecker::new(infra.redis.clone())),
        },
    ];

    let app_state = AppState {
        transactions: Arc::new(transactions),
        gateway,
        health: Arc::new(health),
        start_time: Instant::now(),
    };
    let app = create_app(app_state).layer(cors_layer(config.origins()));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    let mut server_shutdown = shutdown.clone();
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = server_shutdown.wait_for(|stop| *stop).await;
        })
        .await?;

    join_workers(workers).await;
    tracing::info!("Server stopped");
    Ok(())
}

async fn run_worker_pool(config: Config) -> anyhow::Result<()> {
    let infra = connect(&config).await?;
    let (_shutdown_tx, shutdown) = watch_ctrl_c();

    let workers = start_workers(&config, &infra, shutdown).await?;
    join_workers(workers).await;

    tracing::info!("Worker pool stopped");
    Ok(())
}
