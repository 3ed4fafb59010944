use std::{error::Error, future::pending, sync::Arc};
use clap::Parser;
use tokio::sync::Mutex;
use zbus::{connection, interface};
use log::{error, info};
use frame_ring::config::load_config;
use frame_ring::pipeline::FramePipeline;
use frame_ring::sources::spawn_pumps;

#[derive(Parser, Debug)]
#[command(about = "Serve a fixed-capacity audio frame ring buffer over D-Bus")]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long)]
    config: Option<String>,

    /// Register on the system bus instead of the session bus
    #[arg(long)]
    system: bool,
}

fn get_config_path() -> String {
    if let Ok(home) = std::env::var("HOME") {
        format!("{}/.config/frame-ring/config.toml", home)
    } else {
        "/etc/frame-ring/config.toml".to_string()
    }
}

fn clamp_len(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

struct FrameRingService(Arc<Mutex<FramePipeline>>);

#[interface(name = "io.framering.Buffer")]
impl FrameRingService {
    /// WriteBytes stores as much of `data` as the buffer accepts.
    /// Returns (status, bytes_written).
    async fn write_bytes(&self, data: Vec<u8>, overlap: bool) -> (i32, u64) {
        let written = self.0.lock().await.push(&data, Some(overlap));
        (0, written as u64)
    }

    /// ReadBytes consumes up to `max_bytes` from the head of the buffer.
    async fn read_bytes(&self, max_bytes: u64) -> (i32, Vec<u8>) {
        (0, self.0.lock().await.read(clamp_len(max_bytes)))
    }

    /// PeekBytes returns up to `max_bytes` without consuming them.
    async fn peek_bytes(&self, max_bytes: u64) -> (i32, Vec<u8>) {
        (0, self.0.lock().await.peek(clamp_len(max_bytes)))
    }

    async fn skip_bytes(&self, max_bytes: u64) -> (i32, u64) {
        (0, self.0.lock().await.skip(clamp_len(max_bytes)) as u64)
    }

    /// ReadFrame pops one denoised frame; the payload is empty until a full
    /// frame is buffered. Status is negative if the suppressor failed.
    async fn read_frame(&self) -> (i32, Vec<u8>) {
        match self.0.lock().await.next_frame() {
            Ok(frame) => (0, frame.unwrap_or_default()),
            Err(e) => {
                error!("Error producing frame: {}", e);
                (e.to_status_code(), Vec::new())
            }
        }
    }

    async fn clear(&self) {
        self.0.lock().await.clear();
    }

    /// GrowCapacity returns (status, effective capacity). Capacity never
    /// shrinks; requests above `max_capacity` fail with a negative status.
    async fn grow_capacity(&self, capacity: u64, preserve: bool) -> (i32, u64) {
        let requested = clamp_len(capacity);
        let mut pipeline = self.0.lock().await;
        match pipeline.grow_capacity(requested, preserve) {
            Ok(effective) => (0, effective as u64),
            Err(e) => {
                error!("Error growing buffer: {}", e);
                (e.to_status_code(), pipeline.capacity() as u64)
            }
        }
    }

    /// GetStats returns (len, capacity, bytes_in, bytes_dropped, bytes_evicted,
    /// frames_out, frames_failed).
    async fn get_stats(&self) -> (u64, u64, u64, u64, u64, u64, u64) {
        let s = self.0.lock().await.stats();
        (
            s.len as u64,
            s.capacity as u64,
            s.bytes_in,
            s.bytes_dropped,
            s.bytes_evicted,
            s.frames_out,
            s.frames_failed,
        )
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize logging
    env_logger::init();

    let args = Args::parse();
    let config_path = args.config.unwrap_or_else(get_config_path);
    let cfg = load_config(&config_path)?;
    let pipeline = Arc::new(Mutex::new(FramePipeline::from_config(&cfg)?));

    let pumps = spawn_pumps(&cfg.file_sources, Arc::clone(&pipeline)).await;
    info!("Started {} source pump(s)", pumps.len());
    tokio::spawn(async move {
        for handle in pumps {
            if let Err(e) = handle.await {
                error!("Source pump task aborted: {}", e);
            }
        }
    });

    let builder = if args.system {
        connection::Builder::system()?
    } else {
        connection::Builder::session()?
    };
    let _connection = builder
        .name("io.framering")?
        .serve_at("/io/framering/Buffer", FrameRingService(pipeline))?
        .build()
        .await?;

    info!("D-Bus service 'io.framering' is running.");

    // Keep the application running indefinitely
    pending::<()>().await;

    Ok(())
}
