mod collectors;
mod config;
mod history;
mod http;
mod metrics;
mod parser;
mod poller;
mod state;

use axum::serve;
use clap::Parser;
use config::Config;
use history::HistoryRecorder;
use metrics::Metrics;
use poller::Poller;
use state::SnapshotCache;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "hostmetricsd")]
#[command(version)]
struct Cli {
    #[arg(long, default_value = "./config.yaml")]
    config: String,
    #[arg(long)]
    print_default_config: bool,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let cfg = match Config::load_from_file(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "не удалось загрузить конфигурацию");
            std::process::exit(1);
        }
    };

    let addr: SocketAddr = match cfg.listen.parse() {
        Ok(addr) => addr,
        Err(err) => {
            error!(error = %err, listen = %cfg.listen, "некорректный адрес listen");
            std::process::exit(1);
        }
    };

    info!(
        listen = %cfg.listen,
        interval_secs = cfg.interval_secs,
        mode = cfg.collector.mode(),
        history = %cfg.history_path.display(),
        "запуск hostmetricsd"
    );

    let history = HistoryRecorder::new(cfg.history_path.clone());
    if let Err(err) = history.reset().await {
        error!(error = %err, "не удалось очистить журнал истории");
    }

    let collector = match collectors::from_config(&cfg.collector) {
        Ok(c) => c,
        Err(err) => {
            error!(error = %err, "не удалось создать сборщик метрик");
            std::process::exit(1);
        }
    };
    let metrics = match Metrics::new() {
        Ok(m) => m,
        Err(err) => {
            error!(error = %err, "не удалось инициализировать метрики");
            std::process::exit(1);
        }
    };
    let cache = SnapshotCache::new();

    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(err) => {
            error!(error = %err, %addr, "не удалось запустить HTTP-сервер");
            std::process::exit(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let poll_task = {
        let poller = Poller::new(
            collector.clone(),
            cache.clone(),
            history.clone(),
            metrics.clone(),
            Duration::from_secs(cfg.interval_secs),
        );
        tokio::spawn(poller.run(shutdown_rx.clone()))
    };

    let http_task = {
        let app = http::build_router(metrics, cache, history, collector, cfg.collector.mode());
        let mut shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let server = serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            });

            if let Err(err) = server.await {
                error!(error = %err, "ошибка HTTP-сервера");
            }
        })
    };

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "не удалось дождаться Ctrl+C");
    }
    info!("получен Ctrl+C, выполняется остановка");

    let _ = shutdown_tx.send(true);

    let _ = http_task.await;
    poll_task.abort();
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
