//! Command-line sender for cast receivers.
//!
//! Usage:
//!   cast2-rs discover [secs]
//!   cast2-rs cast <device-id> <url> <content-type>

use anyhow::{bail, Context};
use cast_client::{CallbackHandler, CastController, ClientEvent, LoadRequest};
use cast_discovery::{Discovery, ServiceBrowser};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_SCAN_SECS: u64 = 5;
/// How long `cast` waits for the requested device to be announced.
const DEVICE_WAIT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("discover") => {
            let secs = match args.get(2) {
                Some(secs) => secs.parse().context("scan duration must be whole seconds")?,
                None => DEFAULT_SCAN_SECS,
            };
            discover(Duration::from_secs(secs)).await
        }
        Some("cast") if args.len() >= 5 => cast(&args[2], &args[3], &args[4]).await,
        _ => {
            let program = args.first().map(String::as_str).unwrap_or("cast2-rs");
            eprintln!("Usage: {} discover [secs]", program);
            eprintln!("       {} cast <device-id> <url> <content-type>", program);
            eprintln!("Example: {} cast 4f9c0e2a http://192.168.1.5/song.mp3 audio/mpeg", program);
            std::process::exit(1);
        }
    }
}

async fn discover(timeout: Duration) -> anyhow::Result<()> {
    println!("Scanning for {} seconds...\n", timeout.as_secs());
    let browser = ServiceBrowser::default();
    let devices = browser.scan(timeout).await?;

    if devices.is_empty() {
        println!("No cast devices found.");
        return Ok(());
    }

    for device in &devices {
        println!("{}  {}", device.id, device.name);
        println!("    host:    {}:{}", device.host, device.port);
        println!("    address: {}", device.address_literals().join(", "));
        if let Some(model) = device.model() {
            println!("    model:   {}", model);
        }
    }
    println!("\n{} device(s) found.", devices.len());
    Ok(())
}

async fn cast(device_id: &str, url: &str, content_type: &str) -> anyhow::Result<()> {
    let controller = CastController::new(Arc::new(ServiceBrowser::default()));
    controller.events().subscribe(CallbackHandler::new(|event| match event {
        ClientEvent::StateChanged { state, .. } => info!("Session state: {:?}", state),
        ClientEvent::MediaStatus { message, .. } => {
            let entry = &message["status"][0];
            info!(
                "Media status: {} at {}s",
                entry["playerState"].as_str().unwrap_or("UNKNOWN"),
                entry["currentTime"].as_f64().unwrap_or(0.0)
            );
        }
        ClientEvent::Error { detail, .. } => warn!("Connection error: {}", detail),
        ClientEvent::ConnectionClosed { .. } => info!("Connection closed"),
        _ => {}
    }));

    controller.start_discovery().await?;
    let found = tokio::time::timeout(DEVICE_WAIT, async {
        loop {
            if controller
                .list_devices()
                .await
                .iter()
                .any(|device| device.id == device_id)
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    })
    .await;
    if found.is_err() {
        controller.stop_discovery().await;
        bail!("device {} was not announced within {:?}", device_id, DEVICE_WAIT);
    }

    let session = controller.connect(device_id).await?;
    controller.stop_discovery().await;

    let media_session = controller
        .load_media(&session, LoadRequest::new(url, content_type))
        .await?;
    match media_session {
        Some(id) => println!("Playing {} (media session {}). Press Ctrl-C to stop.", url, id),
        None => println!("Loaded {}. Press Ctrl-C to stop.", url),
    }

    tokio::signal::ctrl_c().await?;
    if let Err(e) = controller.stop(&session).await {
        warn!("Stop failed: {}", e);
    }
    controller.disconnect(&session).await?;
    Ok(())
}
