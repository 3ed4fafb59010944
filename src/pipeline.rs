use crate::circular_buffer::CircularBuffer;
use crate::config::{FlattenedConfig, DEFAULT_MAX_CAPACITY};
use crate::denoise::{frame_bytes, process_frame_bytes, NoiseSuppressor, Passthrough, FRAME_MS};
use crate::error::Error;
use log::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PipelineStats {
    pub len: usize,
    pub capacity: usize,
    pub bytes_in: u64,
    pub bytes_dropped: u64,
    pub bytes_evicted: u64,
    pub frames_out: u64,
    pub frames_failed: u64,
}

/// Re-chunks producer writes of any size into fixed 20 ms frames.
pub struct FramePipeline {
    buffer: CircularBuffer,
    overlap: bool,
    max_capacity: usize,
    frame_bytes: usize,
    suppressor: Option<Box<dyn NoiseSuppressor>>,
    bytes_in: u64,
    bytes_dropped: u64,
    bytes_evicted: u64,
    frames_out: u64,
    frames_failed: u64,
}

impl FramePipeline {
    pub fn from_config(cfg: &FlattenedConfig) -> Result<Self, Error> {
        let suppressor: Option<Box<dyn NoiseSuppressor>> = if cfg.denoise {
            Some(Box::new(Passthrough::default()))
        } else {
            None
        };
        Ok(Self::new(cfg.capacity, cfg.overlap, cfg.sample_rate, suppressor)?
            .with_max_capacity(cfg.max_capacity))
    }

    pub fn new(
        capacity: usize,
        overlap: bool,
        sample_rate: u32,
        mut suppressor: Option<Box<dyn NoiseSuppressor>>,
    ) -> Result<Self, Error> {
        let frame_bytes = frame_bytes(sample_rate);
        if frame_bytes == 0 {
            return Err(Error::UnsupportedSampleRate(sample_rate));
        }

        let mut buffer = CircularBuffer::new(capacity);
        if buffer.capacity() < 2 * frame_bytes {
            let grown = buffer.grow_capacity(2 * frame_bytes, true);
            warn!(
                "Buffer capacity {} cannot hold two {} byte frames, grown to {}",
                capacity, frame_bytes, grown
            );
        }

        if let Some(ns) = suppressor.as_mut() {
            ns.init(sample_rate)?;
            info!("Noise suppressor initialized at {} Hz", sample_rate);
        }

        let max_capacity = DEFAULT_MAX_CAPACITY.max(buffer.capacity());
        Ok(Self {
            buffer,
            overlap,
            max_capacity,
            frame_bytes,
            suppressor,
            bytes_in: 0,
            bytes_dropped: 0,
            bytes_evicted: 0,
            frames_out: 0,
            frames_failed: 0,
        })
    }

    /// Cap for `grow_capacity`. Never below the current capacity.
    pub fn with_max_capacity(mut self, max_capacity: usize) -> Self {
        self.max_capacity = max_capacity.max(self.buffer.capacity());
        self
    }

    pub fn frame_bytes(&self) -> usize {
        self.frame_bytes
    }

    /// Real-time PCM rate in bytes per second.
    pub fn byte_rate(&self) -> usize {
        self.frame_bytes * 1000 / FRAME_MS as usize
    }

    pub fn overlap(&self) -> bool {
        self.overlap
    }

    pub fn available_space(&self) -> usize {
        self.buffer.available_space()
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Buffer `data`, using the configured overlap policy unless overridden.
    /// Returns how many bytes were stored.
    pub fn push(&mut self, data: &[u8], overlap: Option<bool>) -> usize {
        let overlap = overlap.unwrap_or(self.overlap);
        let before = self.buffer.len();
        let written = self.buffer.write(data, overlap);
        self.bytes_in += written as u64;

        if written < data.len() {
            let dropped = data.len() - written;
            self.bytes_dropped += dropped as u64;
            debug!("Buffer full: dropped {} of {} incoming bytes", dropped, data.len());
        }

        // Bytes that were buffered before the write but are gone now.
        let evicted = (before + written).saturating_sub(self.buffer.len());
        if evicted > 0 {
            self.bytes_evicted += evicted as u64;
            debug!("Evicted {} oldest bytes to fit {} new", evicted, written);
        }

        written
    }

    /// Pop one full frame, denoised if a suppressor is configured.
    /// Returns `None` without consuming anything while less than a frame is buffered.
    ///
    /// A frame the suppressor rejects is discarded and counted in
    /// `frames_failed`, so one bad frame cannot stall the stream.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, Error> {
        if self.buffer.len() < self.frame_bytes {
            return Ok(None);
        }

        let mut frame = self.buffer.take(self.frame_bytes);
        if let Some(ns) = self.suppressor.as_mut() {
            if let Err(e) = process_frame_bytes(ns.as_mut(), &mut frame) {
                self.frames_failed += 1;
                return Err(e);
            }
        }
        self.frames_out += 1;
        Ok(Some(frame))
    }

    pub fn read(&mut self, max_bytes: usize) -> Vec<u8> {
        self.buffer.take(max_bytes)
    }

    pub fn peek(&self, max_bytes: usize) -> Vec<u8> {
        let mut out = vec![0; max_bytes.min(self.buffer.len())];
        self.buffer.peek(&mut out);
        out
    }

    pub fn skip(&mut self, max_bytes: usize) -> usize {
        self.buffer.skip(max_bytes)
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Grow the buffer, refusing anything above the configured ceiling.
    pub fn grow_capacity(&mut self, new_capacity: usize, preserve_data: bool) -> Result<usize, Error> {
        if new_capacity > self.max_capacity {
            warn!(
                "Refusing to grow buffer to {} bytes (limit {})",
                new_capacity, self.max_capacity
            );
            return Err(Error::CapacityLimit { requested: new_capacity, max: self.max_capacity });
        }

        let old = self.buffer.capacity();
        let capacity = self.buffer.grow_capacity(new_capacity, preserve_data);
        if capacity > old {
            info!("Buffer grown from {} to {} bytes", old, capacity);
        }
        Ok(capacity)
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            len: self.buffer.len(),
            capacity: self.buffer.capacity(),
            bytes_in: self.bytes_in,
            bytes_dropped: self.bytes_dropped,
            bytes_evicted: self.bytes_evicted,
            frames_out: self.frames_out,
            frames_failed: self.frames_failed,
        }
    }
}

impl Drop for FramePipeline {
    fn drop(&mut self) {
        if let Some(ns) = self.suppressor.as_mut() {
            if let Err(e) = ns.uninit() {
                error!("Failed to uninit noise suppressor: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Records lifecycle calls and negates samples.
    struct Recorder {
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl NoiseSuppressor for Recorder {
        fn init(&mut self, sample_rate: u32) -> Result<(), Error> {
            self.calls.lock().unwrap().push(format!("init {}", sample_rate));
            Ok(())
        }

        fn process(&mut self, frame: &mut [i16]) -> Result<(), Error> {
            frame.iter_mut().for_each(|s| *s = -*s);
            self.calls.lock().unwrap().push(format!("process {}", frame.len()));
            Ok(())
        }

        fn uninit(&mut self) -> Result<(), Error> {
            self.calls.lock().unwrap().push("uninit".to_string());
            Ok(())
        }
    }

    fn config(capacity: usize, overlap: bool, denoise: bool) -> FlattenedConfig {
        FlattenedConfig {
            capacity,
            overlap,
            max_capacity: 4096,
            sample_rate: 8000,
            denoise,
            file_sources: Vec::new(),
        }
    }

    #[test]
    fn test_frames_from_uneven_chunks() {
        let mut p = FramePipeline::from_config(&config(2048, false, true)).unwrap();
        assert_eq!(p.frame_bytes(), 320);

        let stream: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        let mut frames = Vec::new();
        for chunk in stream.chunks(77) {
            assert_eq!(p.push(chunk, None), chunk.len());
            while let Some(frame) = p.next_frame().unwrap() {
                frames.push(frame);
            }
        }

        assert_eq!(frames.len(), 3);
        assert_eq!(frames.concat(), &stream[..960]);
        let stats = p.stats();
        assert_eq!(stats.len, 40);
        assert_eq!(stats.frames_out, 3);
        assert_eq!(stats.bytes_in, 1000);
    }

    #[test]
    fn test_partial_frame_is_not_consumed() {
        let mut p = FramePipeline::from_config(&config(2048, false, false)).unwrap();
        p.push(&[1; 100], None);
        assert_eq!(p.next_frame().unwrap(), None);
        assert_eq!(p.stats().len, 100);
    }

    #[test]
    fn test_small_capacity_grows_to_two_frames() {
        let p = FramePipeline::from_config(&config(100, false, false)).unwrap();
        assert_eq!(p.stats().capacity, 640);
    }

    #[test]
    fn test_drop_and_evict_accounting() {
        let mut p = FramePipeline::from_config(&config(640, false, false)).unwrap();
        assert_eq!(p.push(&[0; 600], None), 600);
        assert_eq!(p.push(&[1; 100], None), 40);
        assert_eq!(p.stats().bytes_dropped, 60);

        assert_eq!(p.push(&[2; 100], Some(true)), 100);
        let stats = p.stats();
        assert_eq!(stats.len, 640);
        assert_eq!(stats.bytes_evicted, 100);
        assert_eq!(p.peek(4), vec![0; 4]);
    }

    #[test]
    fn test_suppressor_lifecycle_and_processing() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let recorder = Recorder { calls: Arc::clone(&calls) };
        let mut p = FramePipeline::new(1024, false, 8000, Some(Box::new(recorder))).unwrap();

        let mut pcm = Vec::new();
        for _ in 0..160 {
            pcm.extend_from_slice(&5i16.to_le_bytes());
        }
        p.push(&pcm, None);
        let frame = p.next_frame().unwrap().unwrap();
        assert_eq!(&frame[..2], &(-5i16).to_le_bytes());

        drop(p);
        assert_eq!(*calls.lock().unwrap(), vec!["init 8000", "process 160", "uninit"]);
    }

    #[test]
    fn test_unsupported_rate_fails_init() {
        let mut cfg = config(1024, false, true);
        cfg.sample_rate = 44100;
        assert!(matches!(
            FramePipeline::from_config(&cfg),
            Err(Error::UnsupportedSampleRate(44100))
        ));
    }

    #[test]
    fn test_passthrough_operations() {
        let mut p = FramePipeline::from_config(&config(1024, false, false)).unwrap();
        p.push(b"abcdefgh", None);
        assert_eq!(p.peek(3), b"abc");
        assert_eq!(p.skip(2), 2);
        assert_eq!(p.read(3), b"cde");
        assert_eq!(p.grow_capacity(4096, true), Ok(4096));
        assert_eq!(p.read(100), b"fgh");
        p.push(b"xyz", None);
        p.clear();
        assert_eq!(p.stats().len, 0);
    }
    /// Accepts the first frame and rejects every later one.
    struct FailsAfterOne {
        seen: usize,
    }

    impl NoiseSuppressor for FailsAfterOne {
        fn init(&mut self, _sample_rate: u32) -> Result<(), Error> {
            Ok(())
        }

        fn process(&mut self, _frame: &mut [i16]) -> Result<(), Error> {
            self.seen += 1;
            if self.seen > 1 {
                return Err(Error::NotInitialized);
            }
            Ok(())
        }

        fn uninit(&mut self) -> Result<(), Error> {
            Ok(())
        }
    }

    #[test]
    fn test_grow_beyond_limit_is_rejected() {
        let mut p = FramePipeline::from_config(&config(1024, false, false)).unwrap();
        p.push(b"keep", None);

        assert_eq!(
            p.grow_capacity(usize::MAX, true),
            Err(Error::CapacityLimit { requested: usize::MAX, max: 4096 })
        );
        assert_eq!(
            p.grow_capacity(4097, true),
            Err(Error::CapacityLimit { requested: 4097, max: 4096 })
        );
        assert_eq!(p.stats().capacity, 1024);
        assert_eq!(p.peek(4), b"keep");

        assert_eq!(p.grow_capacity(4096, true), Ok(4096));
        assert_eq!(p.grow_capacity(2048, true), Ok(4096));
    }

    #[test]
    fn test_limit_never_below_initial_capacity() {
        let mut p = FramePipeline::new(8192, false, 8000, None)
            .unwrap()
            .with_max_capacity(100);
        assert_eq!(p.grow_capacity(8192, true), Ok(8192));
        assert!(p.grow_capacity(8193, true).is_err());
    }

    #[test]
    fn test_rejected_frame_is_discarded_and_counted() {
        let ns = FailsAfterOne { seen: 0 };
        let mut p = FramePipeline::new(2048, false, 8000, Some(Box::new(ns))).unwrap();
        p.push(&[0; 960], None);

        assert!(p.next_frame().unwrap().is_some());
        assert_eq!(p.next_frame(), Err(Error::NotInitialized));

        let stats = p.stats();
        assert_eq!(stats.frames_out, 1);
        assert_eq!(stats.frames_failed, 1);
        assert_eq!(stats.len, 320);
    }

    #[test]
    fn test_byte_rate() {
        let p = FramePipeline::new(1024, false, 16000, None).unwrap();
        assert_eq!(p.byte_rate(), 32000);
        assert!(!p.overlap());
        assert_eq!(p.available_space(), p.capacity());
    }
}
