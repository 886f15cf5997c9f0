//! Analysis orchestration.
//!
//! [`RhythmAnalyzer`] runs the registered analyses over an audio source
//! on a background worker thread. The worker is strictly sequential: it
//! windows and transforms one frame per hop and fans it out to every
//! analysis before advancing. Decoded sample blocks are pulled from the
//! foreground through a rendezvous, since the decode source is only
//! safe to touch from its owning thread; the foreground services those
//! requests, drains the analyses' feature queues, and polls lifecycle
//! conditions from [`RhythmAnalyzer::update`], driven by the
//! application's own main loop.

use crate::analysis::{Analysis, FrameConfig, TrackOutput};
use crate::data::RhythmData;
use crate::error::{Error, Result};
use crate::provider::AudioProvider;
use atomic_float::AtomicF32;
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use rhythmtool_dsp::{downmix_mono, fft, window, RealFft};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Frame and buffering configuration for the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalyzerConfig {
    /// Samples per analysis window. Must be a power of two.
    pub frame_size: usize,
    /// Sample advance between consecutive frames.
    pub hop_size: usize,
    /// Hops per block pulled from the audio source.
    pub buffer_count: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            frame_size: 2048,
            hop_size: 1024,
            buffer_count: 128,
        }
    }
}

/// Lifecycle state of an analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AnalyzerState {
    Idle = 0,
    Running = 1,
    Done = 2,
    Aborted = 3,
}

impl AnalyzerState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => AnalyzerState::Running,
            2 => AnalyzerState::Done,
            3 => AnalyzerState::Aborted,
            _ => AnalyzerState::Idle,
        }
    }
}

/// Flags shared between the worker and the foreground. Progress and the
/// terminal state are written with at most one assignment per
/// transition; readers need no further synchronization.
struct RunShared {
    progress: AtomicF32,
    state: AtomicU8,
    abort: AtomicBool,
    frames_processed: AtomicUsize,
}

impl RunShared {
    fn new() -> Self {
        Self {
            progress: AtomicF32::new(0.0),
            state: AtomicU8::new(AnalyzerState::Running as u8),
            abort: AtomicBool::new(false),
            frames_processed: AtomicUsize::new(0),
        }
    }

    fn state(&self) -> AnalyzerState {
        AnalyzerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: AnalyzerState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

/// Worker-to-foreground request for the next block of decoded samples.
/// The block buffer travels with the request so it can be recycled.
struct BlockRequest {
    first_sample: usize,
    buffer: Vec<f32>,
}

enum BlockReply {
    Fill(Vec<f32>),
    Abort,
}

struct ActiveRun {
    shared: Arc<RunShared>,
    worker: Option<JoinHandle<()>>,
    request_rx: Receiver<BlockRequest>,
    reply_tx: Sender<BlockReply>,
    outputs: Vec<TrackOutput>,
    source: Box<dyn AudioProvider>,
    initial_frames: i64,
    initialized: bool,
}

/// Runs registered analyses over audio sources and aggregates their
/// tracks into [`RhythmData`].
pub struct RhythmAnalyzer {
    config: AnalyzerConfig,
    analyses: Arc<Mutex<Vec<Box<dyn Analysis>>>>,
    run: Option<ActiveRun>,
    data: Option<Arc<RhythmData>>,
    on_initialized: Option<Box<dyn FnMut(Arc<RhythmData>)>>,
}

impl RhythmAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            config,
            analyses: Arc::new(Mutex::new(Vec::new())),
            run: None,
            data: None,
            on_initialized: None,
        }
    }

    /// Register an analysis. Analyses registered while a run is in
    /// progress take part from the next run onward.
    pub fn add_analysis(&mut self, analysis: impl Analysis + 'static) {
        self.analyses.lock().push(Box::new(analysis));
    }

    /// Register the one-shot callback fired when the initial prefix of a
    /// run has been analyzed.
    pub fn on_initialized(&mut self, callback: impl FnMut(Arc<RhythmData>) + 'static) {
        self.on_initialized = Some(Box::new(callback));
    }

    /// The result aggregate of the current or most recent run.
    pub fn data(&self) -> Option<Arc<RhythmData>> {
        self.data.clone()
    }

    /// Progress of the current run, from 0 to 1.
    pub fn progress(&self) -> f32 {
        match &self.run {
            Some(run) => run.shared.progress.load(Ordering::Acquire),
            None => 0.0,
        }
    }

    /// Lifecycle state of the current run.
    pub fn state(&self) -> AnalyzerState {
        match &self.run {
            Some(run) => run.shared.state(),
            None => AnalyzerState::Idle,
        }
    }

    /// Whether the current run has completed.
    pub fn is_done(&self) -> bool {
        self.state() == AnalyzerState::Done
    }

    /// Whether the initial prefix of the current run has been analyzed.
    pub fn is_initialized(&self) -> bool {
        self.run.as_ref().map_or(false, |run| run.initialized)
    }

    /// Start analyzing an audio source, aborting any run in progress.
    ///
    /// `initial_length` is the prefix in seconds after which the
    /// initialized notification fires, letting consumers start using
    /// partial results early.
    ///
    /// # Panics
    /// Panics if the configured frame size is not a power of two, the
    /// hop size is zero or larger than the frame size, or the buffer
    /// count is zero.
    pub fn analyze(
        &mut self,
        source: Box<dyn AudioProvider>,
        initial_length: f32,
    ) -> Result<Arc<RhythmData>> {
        let config = self.config;

        assert!(
            config.frame_size.is_power_of_two(),
            "frame size {} is not a power of two",
            config.frame_size
        );
        assert!(
            config.hop_size > 0 && config.hop_size <= config.frame_size,
            "hop size {} does not fit frame size {}",
            config.hop_size,
            config.frame_size
        );
        assert!(config.buffer_count > 0, "buffer count is zero");

        self.abort();
        self.run = None;

        let info = source.info();

        if info.sample_rate == 0 || info.channels == 0 {
            return Err(Error::InvalidSource(
                "source has no sample rate or channels".into(),
            ));
        }

        let total_frames = info.samples / config.hop_size;

        if total_frames == 0 {
            return Err(Error::InvalidSource(
                "source is shorter than one hop".into(),
            ));
        }

        let frame_config = FrameConfig {
            sample_rate: info.sample_rate,
            frame_size: config.frame_size,
            hop_size: config.hop_size,
        };

        let mut outputs = Vec::new();
        let mut tracks = Vec::new();
        let count;

        {
            let mut analyses = self.analyses.lock();
            count = analyses.len();

            for analysis in analyses.iter_mut() {
                let output = analysis.initialize(frame_config);
                tracks.push(output.track().clone());
                outputs.push(output);
            }
        }

        let data = Arc::new(RhythmData::new(info, tracks));
        self.data = Some(Arc::clone(&data));

        let initial_frames = ((initial_length * info.sample_rate as f32
            / config.hop_size as f32)
            .round() as i64
            - 1)
            .min(total_frames as i64 - 1);

        let shared = Arc::new(RunShared::new());
        let (request_tx, request_rx) = bounded(1);
        let (reply_tx, reply_rx) = bounded(1);

        let worker = Worker {
            analyses: Arc::clone(&self.analyses),
            count,
            shared: Arc::clone(&shared),
            frame: frame_config,
            buffer_count: config.buffer_count,
            channels: info.channels,
            total_frames,
            request_tx,
            reply_rx,
        };

        let handle = std::thread::Builder::new()
            .name("rhythm-analysis".into())
            .spawn(move || worker.run())?;

        log::debug!(
            "analysis started: {} frames, {} channels at {} Hz",
            total_frames,
            info.channels,
            info.sample_rate
        );

        self.run = Some(ActiveRun {
            shared,
            worker: Some(handle),
            request_rx,
            reply_tx,
            outputs,
            source,
            initial_frames,
            initialized: false,
        });

        Ok(data)
    }

    /// Foreground tick: service the worker's pending data request, apply
    /// queued features to the shared tracks, and fire the initialized
    /// notification once its prefix condition holds. Call this from the
    /// application's main loop while a run is in progress.
    pub fn update(&mut self) {
        let Some(run) = &mut self.run else {
            return;
        };

        // Service the pending block request, if any. The decode source
        // is only touched here, on its owning thread.
        if run.shared.state() == AnalyzerState::Running {
            if let Ok(mut request) = run.request_rx.try_recv() {
                let reply = if run.shared.abort.load(Ordering::Acquire) {
                    BlockReply::Abort
                } else {
                    match run.source.read(request.first_sample, &mut request.buffer) {
                        Ok(()) => BlockReply::Fill(request.buffer),
                        Err(error) => {
                            log::warn!("audio source lost during analysis: {}", error);
                            run.shared.abort.store(true, Ordering::Release);
                            BlockReply::Abort
                        }
                    }
                };

                let _ = run.reply_tx.try_send(reply);
            }
        }

        // Apply queued features at the single drain point, before any
        // reader observes the tracks.
        for output in &mut run.outputs {
            output.drain();
        }

        if !run.initialized
            && run.shared.frames_processed.load(Ordering::Acquire) as i64 > run.initial_frames
        {
            run.initialized = true;

            if let (Some(callback), Some(data)) = (&mut self.on_initialized, &self.data) {
                callback(Arc::clone(data));
            }
        }

        // Reap the worker once it reaches a terminal state.
        if matches!(
            run.shared.state(),
            AnalyzerState::Done | AnalyzerState::Aborted
        ) {
            if let Some(worker) = run.worker.take() {
                let _ = worker.join();

                for output in &mut run.outputs {
                    output.drain();
                }
            }
        }
    }

    /// Abort the analysis in progress. The worker thread is guaranteed
    /// to have stopped when this returns.
    pub fn abort(&mut self) {
        let Some(run) = &mut self.run else {
            return;
        };

        if run.shared.state() == AnalyzerState::Running {
            run.shared.abort.store(true, Ordering::Release);

            // Unblock the worker if it is waiting on a data reply.
            let _ = run.reply_tx.try_send(BlockReply::Abort);
        }

        if let Some(worker) = run.worker.take() {
            let _ = worker.join();
            log::debug!("analysis worker joined");
        }

        for output in &mut run.outputs {
            output.drain();
        }
    }
}

impl Drop for RhythmAnalyzer {
    fn drop(&mut self) {
        self.abort();
    }
}

impl Default for RhythmAnalyzer {
    fn default() -> Self {
        Self::new(AnalyzerConfig::default())
    }
}

/// Background half of a run.
struct Worker {
    analyses: Arc<Mutex<Vec<Box<dyn Analysis>>>>,
    /// Number of analyses initialized for this run; later additions are
    /// not part of it.
    count: usize,
    shared: Arc<RunShared>,
    frame: FrameConfig,
    buffer_count: usize,
    channels: usize,
    total_frames: usize,
    request_tx: Sender<BlockRequest>,
    reply_rx: Receiver<BlockReply>,
}

impl Worker {
    fn run(self) {
        let frame_size = self.frame.frame_size;
        let hop_size = self.frame.hop_size;

        let block_samples = hop_size * self.buffer_count + (frame_size - hop_size);
        let mut buffer = vec![0.0f32; block_samples * self.channels];

        let mut samples = vec![0.0f32; frame_size * self.channels];
        let mut mono = vec![0.0f32; frame_size];
        let mut spectrum = vec![0.0f32; frame_size];
        let mut magnitude = vec![0.0f32; frame_size / 2];

        let hann = window::hann_window(frame_size);
        let mut real_fft = RealFft::new(frame_size);

        let mut frame = 0usize;
        let mut aborted = false;

        while frame < self.total_frames {
            if self.shared.abort.load(Ordering::Acquire) {
                aborted = true;
                break;
            }

            let index = frame % self.buffer_count;

            if index == 0 {
                match self.refill(frame * hop_size, std::mem::take(&mut buffer)) {
                    Some(filled) => buffer = filled,
                    None => {
                        aborted = true;
                        break;
                    }
                }
            }

            let start = index * hop_size * self.channels;
            let samples_len = samples.len();
            samples.copy_from_slice(&buffer[start..start + samples_len]);

            downmix_mono(&samples, &mut mono, self.channels);

            spectrum.copy_from_slice(&mono);
            window::apply_window(&mut spectrum, &hann);
            real_fft.forward(&mut spectrum);
            fft::spectrum_magnitude(&spectrum, &mut magnitude);

            {
                let mut analyses = self.analyses.lock();

                for analysis in analyses.iter_mut().take(self.count) {
                    analysis.process(&mono, &magnitude, frame);
                }
            }

            frame += 1;
            self.shared.frames_processed.store(frame, Ordering::Release);
            self.shared
                .progress
                .store(frame as f32 / self.total_frames as f32, Ordering::Release);
        }

        if aborted {
            self.shared.set_state(AnalyzerState::Aborted);
            log::debug!("analysis aborted after {} of {} frames", frame, self.total_frames);
        } else {
            self.shared.set_state(AnalyzerState::Done);
            log::debug!("analysis done: {} frames", frame);
        }
    }

    /// Hand the block buffer to the foreground and wait for it to come
    /// back filled. Returns `None` when the run is being torn down.
    fn refill(&self, first_sample: usize, buffer: Vec<f32>) -> Option<Vec<f32>> {
        let request = BlockRequest {
            first_sample,
            buffer,
        };

        if self.request_tx.send(request).is_err() {
            return None;
        }

        match self.reply_rx.recv() {
            Ok(BlockReply::Fill(buffer)) => Some(buffer),
            Ok(BlockReply::Abort) | Err(_) => None,
        }
    }
}
