use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use crossbeam_channel::Receiver;
use stream_scan::config::{DEFAULT_CLEAR_CYCLE, DEFAULT_LOCATOR, ScanConfig};
use stream_scan::core::DecoderPixelFormat;
use stream_scan::session::{ProcessorController, ProcessorEvent, Status};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Scan barcodes from a live or recorded video stream:
/// - rtsp://...  decoded by the streaming backend over TCP
/// - http(s)://... fetched as a byte stream and decoded
/// - anything else is read as a local video file
#[derive(Parser, Debug)]
#[command(name = "scan")]
#[command(about = "Recognize barcodes in a video stream")]
#[command(long_about = "Recognize barcodes in an RTSP, HTTP or file video stream. \
Reconnects automatically when the stream ends and prints every newly recognized code.")]
struct Args {
    /// Stream locator (positional or use --url)
    #[arg(help = "rtsp:// or http(s):// URL, or a local video file")]
    locator: Option<String>,

    #[arg(short, long, env = "STREAM_SCAN_URL", help = "Alternative way to specify the locator")]
    url: Option<String>,

    #[arg(long, env = "STREAM_SCAN_CREDENTIAL", default_value = "", hide_env_values = true,
          help = "License key for the recognition engine")]
    credential: String,

    #[arg(long, default_value = "1s",
          help = "Pause between connection attempts: 500ms, 2s, 1m")]
    reconnect_delay: String,

    #[arg(long, default_value_t = DEFAULT_CLEAR_CYCLE,
          help = "Frames between engine session clears (power of two)")]
    clear_cycle: u32,

    #[arg(long, default_value = "bgr24",
          help = "Pixel format frames are decoded to: gray8, rgb24, bgr24, rgba, argb")]
    pixel_format: String,

    #[arg(long, default_value = "10s",
          help = "Treat the stream as ended after this long without a frame")]
    frame_timeout: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("stream_scan=info")),
        )
        .init();

    let args = Args::parse();
    let locator = args
        .url
        .or(args.locator)
        .unwrap_or_else(|| DEFAULT_LOCATOR.to_string());
    let pixel_format = parse_pixel_format(&args.pixel_format)?;
    let frame_timeout = parse_duration(&args.frame_timeout)?;

    let config = ScanConfig::default()
        .with_locator(locator)
        .with_credential(args.credential)
        .with_reconnect_delay(parse_duration(&args.reconnect_delay)?)
        .with_session_clear_cycle(args.clear_cycle);

    // The controller owns blocking clients, so it is built and dropped on this
    // thread; the runtime only waits for events and Ctrl-C.
    let controller = Arc::new(
        ProcessorController::builder()
            .config(config)
            .decoder_arc(decoder_backend(pixel_format, frame_timeout)?)
            .build()?,
    );
    let events = controller.state().subscribe();
    controller.start()?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;
    let supervised = rt.block_on(supervise(Arc::clone(&controller), events));
    drop(rt);

    controller.stop()?;
    supervised?;

    match controller.state().last_error() {
        Some(reason) if controller.state().stats().frames_submitted == 0 => {
            Err(anyhow!("no frames were processed: {reason}"))
        }
        _ => Ok(()),
    }
}

/// Print codes until the run ends or Ctrl-C stops it
async fn supervise(
    controller: Arc<ProcessorController>,
    events: Receiver<ProcessorEvent>,
) -> Result<()> {
    let mut printer = tokio::task::spawn_blocking(move || {
        for event in events.iter() {
            match event {
                ProcessorEvent::RecognizedCode(code) => println!("{code}"),
                ProcessorEvent::Status(status) => {
                    info!(%status, "Status changed");
                    if status == Status::Stopped {
                        break;
                    }
                }
                ProcessorEvent::Failed(reason) => error!(%reason, "Scanning failed"),
            }
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, stopping");
            tokio::task::spawn_blocking(move || controller.stop()).await??;
            printer.await?;
        }
        joined = &mut printer => joined?,
    }
    Ok(())
}

#[cfg(feature = "gst")]
fn decoder_backend(
    pixel_format: DecoderPixelFormat,
    frame_timeout: Duration,
) -> Result<Arc<dyn stream_scan::capture::DecoderBackend>> {
    use stream_scan::capture::gst::GstDecoderBackend;

    Ok(Arc::new(
        GstDecoderBackend::new()
            .with_output_format(pixel_format)
            .with_frame_timeout(frame_timeout),
    ))
}

#[cfg(not(feature = "gst"))]
fn decoder_backend(
    _pixel_format: DecoderPixelFormat,
    _frame_timeout: Duration,
) -> Result<Arc<dyn stream_scan::capture::DecoderBackend>> {
    Err(anyhow!(
        "no video decoder available: rebuild with `--features gst` to decode with GStreamer"
    ))
}

/// Parse a pixel format the decoder can be asked to produce
fn parse_pixel_format(format: &str) -> Result<DecoderPixelFormat> {
    match format.parse::<DecoderPixelFormat>() {
        Ok(DecoderPixelFormat::Other(name)) => Err(anyhow!(
            "Invalid pixel format: {name}. Use: gray8, rgb24, bgr24, rgba, argb"
        )),
        Ok(format) => Ok(format),
        Err(never) => match never {},
    }
}

/// Parse duration string like "500ms", "30s", "2m", "1h"
fn parse_duration(duration: &str) -> Result<Duration> {
    if let Ok(seconds) = duration.parse::<u64>() {
        return Ok(Duration::from_secs(seconds));
    }
    if let Some(millis) = duration.strip_suffix("ms") {
        let num: u64 = millis
            .parse()
            .map_err(|_| anyhow!("Invalid number in duration: {}", millis))?;
        return Ok(Duration::from_millis(num));
    }

    let len = duration.len();
    if len < 2 {
        return Err(anyhow!("Invalid duration format: {}", duration));
    }

    let (num_str, unit) = duration.split_at(len - 1);
    let num: u64 = num_str
        .parse()
        .map_err(|_| anyhow!("Invalid number in duration: {}", num_str))?;

    match unit {
        "s" => Ok(Duration::from_secs(num)),
        "m" => Ok(Duration::from_secs(num * 60)),
        "h" => Ok(Duration::from_secs(num * 3600)),
        _ => Err(anyhow!(
            "Invalid duration unit: {}. Use 'ms', 's', 'm' or 'h'",
            unit
        )),
    }
}
