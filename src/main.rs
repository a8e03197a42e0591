use anyhow::Result;
use netmeter_daemon::{
    collector::LinuxConnectionProvider,
    config::Config,
    db::{Database, SampleStore},
    estimator::ConnectionCountEstimator,
    notifier::Notifier,
    persister::DataPersister,
    process_info::ProcessInfoResolver,
    protocol::{Request, Response, UpdateData},
    recommender::UsageRecommender,
    sampler::NetworkSampler,
    socket::{handle_client, RequestHandler, SocketServer},
    summary::SummaryManager,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::{error, info, warn};

struct DaemonState {
    sampler: Arc<NetworkSampler>,
    summary: Arc<SummaryManager>,
    store: Arc<Database>,
    recommender: RwLock<UsageRecommender>,
}

#[async_trait::async_trait]
impl RequestHandler for DaemonState {
    async fn handle(&self, request: Request) -> Response {
        match request {
            Request::Ping => Response::Pong,

            Request::GetSnapshot => {
                let snapshot = self.sampler.latest_snapshot();
                Response::Response {
                    data: serde_json::json!(snapshot),
                }
            }

            Request::GetTotalBandwidth => {
                let totals = self.sampler.total_bandwidth();
                Response::Response {
                    data: serde_json::json!(totals),
                }
            }

            Request::GetTopProcesses { params } => {
                let top = self.sampler.top_processes(params.n.unwrap_or(5));
                Response::Response {
                    data: serde_json::json!(top),
                }
            }

            Request::GetRecommendations => {
                let snapshot = self.sampler.latest_snapshot();
                let totals = snapshot.total_bandwidth();
                let recommender = self.recommender.read().await;
                let advisories = recommender.get_recommendations(&snapshot, &totals);
                Response::Response {
                    data: serde_json::json!(advisories),
                }
            }

            Request::GetDailySummary { params } => match self.store.get_daily_summary(params.date)
            {
                Ok(rows) => Response::Response {
                    data: serde_json::json!(rows),
                },
                Err(e) => Response::Response {
                    data: serde_json::json!({"error": e.to_string()}),
                },
            },

            Request::GetAvailableDates => match self.store.get_available_dates() {
                Ok(dates) => Response::Response {
                    data: serde_json::json!(dates),
                },
                Err(e) => Response::Response {
                    data: serde_json::json!({"error": e.to_string()}),
                },
            },

            Request::AggregateDate { params } => match self.summary.aggregate_date(params.date) {
                Ok(()) => Response::Response {
                    data: serde_json::json!({"success": true}),
                },
                Err(e) => Response::Response {
                    data: serde_json::json!({"error": e.to_string()}),
                },
            },

            Request::SetThreshold { params } => {
                self.recommender
                    .write()
                    .await
                    .set_threshold(params.bytes_per_second);
                Response::Response {
                    data: serde_json::json!({"success": true}),
                }
            }
        }
    }
}

/// Forward each tick's snapshot into the persistence queue and push a usage
/// update to connected clients. Surfaces the latched permission advisory as
/// a one-time desktop notification.
async fn forward_snapshots(
    sampler: Arc<NetworkSampler>,
    persister: Arc<DataPersister>,
    broadcast_tx: broadcast::Sender<String>,
) {
    let mut rx = sampler.subscribe();
    let notifier = Notifier::new();
    let mut permission_notified = false;

    loop {
        match rx.recv().await {
            Ok(snapshot) => {
                persister.enqueue_snapshot(&snapshot, Some(snapshot.taken_at));

                if !permission_notified {
                    if let Some(warning) = sampler.permission_warning() {
                        notifier.send("NetMeter: limited data", &warning);
                        permission_notified = true;
                    }
                }

                let totals = snapshot.total_bandwidth();
                let update = Response::Update {
                    data: UpdateData {
                        taken_at: snapshot.taken_at,
                        process_count: snapshot.processes.len(),
                        bytes_sent: totals.bytes_sent,
                        bytes_recv: totals.bytes_recv,
                    },
                };
                if let Ok(json) = serde_json::to_string(&update) {
                    let _ = broadcast_tx.send(json);
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("snapshot consumer lagged, skipped {} ticks", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    info!("netmeter daemon starting...");

    let config_path = Config::config_path();
    let config = if config_path.exists() {
        Config::load(&config_path).unwrap_or_else(|e| {
            warn!("failed to load config: {}, using defaults", e);
            Config::default()
        })
    } else {
        info!("no config file found, using defaults");
        Config::default()
    };

    // Schema failures are fatal: there is no degraded mode without storage.
    let store = Arc::new(Database::open_default()?);
    store.init_schema()?;

    let provider = Arc::new(LinuxConnectionProvider::new());
    let resolver = Arc::new(ProcessInfoResolver::new(provider.clone()));
    let sampler = Arc::new(NetworkSampler::new(
        provider,
        resolver,
        Box::new(ConnectionCountEstimator::default()),
        Duration::from_secs(config.sampling.interval_seconds),
    ));
    let persister = Arc::new(DataPersister::new(
        store.clone() as Arc<dyn SampleStore>,
        Duration::from_secs(config.persistence.flush_interval_seconds),
    ));
    let summary = Arc::new(SummaryManager::new(
        store.clone() as Arc<dyn SampleStore>,
        config.retention.days,
        config.retention.cleanup_hour,
    ));

    let socket_path = SocketServer::socket_path();
    let server = SocketServer::bind(&socket_path).await?;
    let broadcast_tx = server.broadcast_sender();

    let state = Arc::new(DaemonState {
        sampler: sampler.clone(),
        summary: summary.clone(),
        store,
        recommender: RwLock::new(UsageRecommender::new(
            config.recommendations.high_bandwidth_threshold_bytes,
        )),
    });

    sampler.start();
    persister.start();
    summary.start();

    tokio::spawn(forward_snapshots(
        sampler.clone(),
        persister.clone(),
        broadcast_tx,
    ));

    info!("daemon ready, listening for connections...");

    loop {
        tokio::select! {
            result = server.accept() => match result {
                Ok(stream) => {
                    let state = Arc::clone(&state);
                    let broadcast_rx = server.broadcast_sender().subscribe();
                    tokio::spawn(async move {
                        handle_client(stream, broadcast_rx, state).await;
                    });
                }
                Err(e) => {
                    error!("failed to accept connection: {}", e);
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    sampler.stop().await;
    persister.stop().await;
    summary.stop().await;
    info!("shutdown complete");
    Ok(())
}
