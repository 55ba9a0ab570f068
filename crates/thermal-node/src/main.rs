use anyhow::{Context, Result};
use clap::Parser;
use thermal_hw::Camera;
use tracing_subscriber::EnvFilter;

mod clock;
mod config;
mod msg;
mod node;
mod publisher;

use config::{Args, Config};
use node::ThermalNode;
use publisher::{QUEUE_DEPTH, TOPIC};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    if args.list_devices {
        list_devices();
        return Ok(());
    }

    let config = Config::from_args(&args).context("invalid configuration")?;
    let period = config.period()?;
    let device_path = config.device_path();

    tracing::info!(device = %device_path, "opening device");
    let camera = match Camera::open(&device_path) {
        Ok(camera) => camera,
        Err(e) => {
            tracing::error!(
                device = %device_path,
                error = %e,
                "failed to open device; check permissions or device index"
            );
            for dev in Camera::list_devices() {
                tracing::info!(path = %dev.path, name = %dev.name, "available capture device");
            }
            return Err(e).with_context(|| format!("could not open {device_path}"));
        }
    };

    let session = publisher::connect()
        .await
        .context("failed to open zenoh session")?;
    let (sink, queue) = publisher::queue(QUEUE_DEPTH);
    let publish_task = tokio::spawn(publisher::run(session, TOPIC, queue));

    let mut node = ThermalNode::new(camera, sink, config.frame_id.as_str());
    tracing::info!(
        device = %device_path,
        frame_id = %config.frame_id,
        rate_hz = config.publish_rate,
        period_ms = period.as_secs_f64() * 1000.0,
        topic = TOPIC,
        "thermal node started"
    );

    node.spin_until(period, shutdown_signal()).await;
    let stats = node.stats();
    tracing::info!(
        published = stats.published,
        capture_failures = stats.capture_failures,
        processing_failures = stats.processing_failures,
        "thermal node shutting down"
    );

    // Dropping the node drops the queue sender, which lets the publisher drain and exit.
    drop(node);
    match publish_task.await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "publisher failed"),
        Err(e) => tracing::warn!(error = %e, "publisher task panicked"),
    }

    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "failed to install SIGTERM handler");
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            return;
        }
    };

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                terminate.recv().await;
            }
            tracing::info!("interrupt received");
        }
        _ = terminate.recv() => tracing::info!("termination requested"),
    }
}

fn list_devices() {
    let devices = Camera::list_devices();
    if devices.is_empty() {
        println!("No V4L2 capture devices found");
        return;
    }
    for dev in devices {
        println!("{}\t{}\t{}\t{}", dev.path, dev.name, dev.driver, dev.bus);
    }
}
