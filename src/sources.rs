use crate::config::FileConfig;
use crate::error::Error;
use crate::pipeline::FramePipeline;
use async_trait::async_trait;
use log::{error, info};
use std::io;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// A producer of raw bytes feeding the frame pipeline.
#[async_trait]
pub trait ByteSource: Send + Sync {
    fn id(&self) -> &str;
    /// Read up to `max_bytes`. An empty chunk means the source is exhausted.
    async fn read_chunk(&self, max_bytes: usize) -> Result<Vec<u8>, Error>;
}

pub struct FileSource {
    id: String,
    file: Mutex<File>,
    offset: Mutex<u64>,
    loop_on_eof: bool,
}

impl FileSource {
    pub async fn new(cfg: &FileConfig) -> io::Result<Self> {
        let file = File::open(&cfg.path).await?;
        Ok(Self {
            id: cfg.id.clone(),
            file: Mutex::new(file),
            offset: Mutex::new(0),
            loop_on_eof: cfg.loop_.unwrap_or(false),
        })
    }
}

#[async_trait]
impl ByteSource for FileSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn read_chunk(&self, max_bytes: usize) -> Result<Vec<u8>, Error> {
        let mut file = self.file.lock().await;
        let mut offset = self.offset.lock().await;

        // Seek to saved offset
        file.seek(io::SeekFrom::Start(*offset)).await?;

        let mut buf = vec![0u8; max_bytes];
        let mut rewound = false;
        let n = loop {
            match file.read(&mut buf).await? {
                // An empty file would rewind forever.
                0 if self.loop_on_eof && !rewound && *offset > 0 => {
                    file.seek(io::SeekFrom::Start(0)).await?;
                    *offset = 0;
                    rewound = true;
                }
                n => break n,
            }
        };
        *offset += n as u64;
        buf.truncate(n);
        Ok(buf)
    }
}

/// Push chunks from `source` into the pipeline until the source runs dry.
/// Returns the number of bytes the pipeline accepted.
///
/// Chunks are released at the pipeline's real-time byte rate. Unless the
/// pipeline evicts old data, a chunk is held back until it fits.
pub async fn pump(
    source: Arc<dyn ByteSource>,
    chunk_bytes: usize,
    pipeline: Arc<Mutex<FramePipeline>>,
) -> Result<u64, Error> {
    let byte_rate = pipeline.lock().await.byte_rate() as u64;
    let period = Duration::from_micros((chunk_bytes as u64 * 1_000_000 / byte_rate).max(1));
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut accepted = 0u64;
    let mut offered = 0u64;
    loop {
        ticker.tick().await;
        let chunk = match source.read_chunk(chunk_bytes).await {
            Ok(chunk) => chunk,
            Err(e) => {
                error!("Source '{}' failed: {}", source.id(), e);
                return Err(e);
            }
        };
        if chunk.is_empty() {
            break;
        }
        offered += chunk.len() as u64;

        loop {
            {
                let mut p = pipeline.lock().await;
                if p.overlap() || p.available_space() >= chunk.len().min(p.capacity()) {
                    accepted += p.push(&chunk, None) as u64;
                    break;
                }
            }
            ticker.tick().await;
        }
    }
    info!(
        "Source '{}' exhausted: {} bytes offered, {} accepted",
        source.id(), offered, accepted
    );
    Ok(accepted)
}

/// Open every configured file source and spawn a pump task for each.
/// Sources that fail to open are logged and skipped.
pub async fn spawn_pumps(
    sources: &[FileConfig],
    pipeline: Arc<Mutex<FramePipeline>>,
) -> Vec<JoinHandle<Result<u64, Error>>> {
    let mut handles = Vec::with_capacity(sources.len());
    for cfg in sources {
        let source: Arc<dyn ByteSource> = match FileSource::new(cfg).await {
            Ok(src) => Arc::new(src),
            Err(e) => {
                error!("Failed to open source '{}' at {}: {}", cfg.id, cfg.path, e);
                continue;
            }
        };
        info!("Source '{}' reading {} in {} byte chunks", cfg.id, cfg.path, cfg.chunk_bytes);
        handles.push(tokio::spawn(pump(source, cfg.chunk_bytes, Arc::clone(&pipeline))));
    }
    handles
}
