use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use log::{error, info, warn};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f32::consts::TAU;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

// --- Track constants ---

/// Tempo of the one hard-coded track.
pub const TRACK_BPM: f32 = 115.0;
/// Sixteenth-note steps per pattern cycle.
const STEPS_PER_CYCLE: u32 = 16;

// --- Scheduling constants ---
// The classic look-ahead pattern: a coarse timer arranges sound-start times
// against the sample clock, so audio timing never depends on timer jitter.

const LOOKAHEAD_SEC: f64 = 0.100;
const TICK_INTERVAL: Duration = Duration::from_millis(25);
const START_DELAY_SEC: f64 = 0.050;

// --- Visualization constants ---

pub const VIZ_BINS: usize = 64;
const FFT_SIZE: usize = 1024;
const VIZ_RING_CAP: usize = 2048;
const VIZ_GAIN: f32 = 900.0;

// --- Filter constants ---

const FILTER_FLOOR_HZ: f32 = 120.0;
/// Per-sample smoothing toward the cutoff target; parameter jumps would click.
const CUTOFF_SMOOTHING: f32 = 0.0006;

const DEFAULT_INTENSITY: f32 = 0.6;

/// A quarter-note boundary reported to gameplay, timestamped on the audio clock.
#[derive(Clone, Copy, Debug)]
pub struct BeatEvent {
    pub time: f64,
    pub step: u8,
}

#[inline(always)]
pub fn seconds_per_beat(bpm: f32) -> f64 {
    60.0 / bpm as f64
}

#[inline(always)]
fn seconds_per_step(bpm: f64) -> f64 {
    60.0 / bpm / 4.0
}

// --- Engine state shared with the audio callback and scheduler thread ---

struct Shared {
    samples_rendered: AtomicU64,
    sample_rate: AtomicU32,
    intensity: AtomicU32,
    voices: Mutex<Vec<Voice>>,
    viz: Mutex<VecDeque<f32>>,
}

impl Shared {
    fn new() -> Self {
        Self {
            samples_rendered: AtomicU64::new(0),
            sample_rate: AtomicU32::new(0),
            intensity: AtomicU32::new(DEFAULT_INTENSITY.to_bits()),
            voices: Mutex::new(Vec::new()),
            viz: Mutex::new(VecDeque::with_capacity(VIZ_RING_CAP)),
        }
    }

    /// Audio-clock seconds. Monotonic; advances only while the stream renders.
    fn seconds(&self) -> f64 {
        let sr = self.sample_rate.load(Ordering::Relaxed);
        if sr == 0 {
            return 0.0;
        }
        self.samples_rendered.load(Ordering::Acquire) as f64 / sr as f64
    }
}

struct DeviceState {
    stream: Stream,
    sample_rate: u32,
}

struct Scheduler {
    cancel: Sender<()>,
    thread: thread::JoinHandle<()>,
}

/// The audio clock and pattern sequencer. One owned instance per session;
/// lifecycle is init-on-first-start, teardown-on-stop.
pub struct Sequencer {
    shared: Arc<Shared>,
    device: Option<DeviceState>,
    scheduler: Option<Scheduler>,
    running: bool,
    master_volume: f32,
    beat_tx: Sender<BeatEvent>,
    beat_rx: Receiver<BeatEvent>,
    fft: Arc<dyn Fft<f32>>,
    fft_scratch: Vec<Complex<f32>>,
}

impl Sequencer {
    pub fn new(master_volume: f32) -> Self {
        let (beat_tx, beat_rx) = channel();
        let fft = FftPlanner::new().plan_fft_forward(FFT_SIZE);
        Self {
            shared: Arc::new(Shared::new()),
            device: None,
            scheduler: None,
            running: false,
            master_volume: master_volume.clamp(0.0, 1.0),
            beat_tx,
            beat_rx,
            fft,
            fft_scratch: vec![Complex::new(0.0, 0.0); FFT_SIZE],
        }
    }

    pub fn bpm(&self) -> f32 {
        TRACK_BPM
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Audio-clock seconds; monotonic, advances only while running.
    pub fn current_time(&self) -> f64 {
        self.shared.seconds()
    }

    /// Starts the device and arms the look-ahead scheduler. Idempotent while
    /// running. If the device cannot be acquired (platform policy, missing
    /// hardware) this logs and returns with `is_running()` still false;
    /// callers poll rather than assume success.
    pub fn start(&mut self) {
        if self.running {
            return;
        }
        if self.device.is_none() {
            match open_device(&self.shared, self.master_volume) {
                Ok(device) => self.device = Some(device),
                Err(e) => {
                    warn!("Audio device unavailable: {}", e);
                    return;
                }
            }
        }
        let Some(device) = &self.device else { return };
        if let Err(e) = device.stream.play() {
            warn!("Could not resume audio stream: {}", e);
            return;
        }

        // Flush leftovers from a previous run so a restart begins clean.
        self.shared.voices.lock().unwrap().clear();
        for _ in self.beat_rx.try_iter() {}

        let (cancel_tx, cancel_rx) = channel();
        let shared = Arc::clone(&self.shared);
        let beat_tx = self.beat_tx.clone();
        let sample_rate = device.sample_rate;
        let start_time = self.shared.seconds() + START_DELAY_SEC;
        let spawned = thread::Builder::new()
            .name("sequencer".into())
            .spawn(move || scheduler_loop(shared, beat_tx, cancel_rx, sample_rate, start_time));
        match spawned {
            Ok(handle) => {
                self.scheduler = Some(Scheduler {
                    cancel: cancel_tx,
                    thread: handle,
                });
                self.running = true;
                info!("Sequencer started ({} BPM, step 0).", TRACK_BPM);
            }
            Err(e) => {
                warn!("Could not spawn scheduler thread: {}", e);
                let _ = device.stream.pause();
            }
        }
    }

    /// Synchronously cancels the scheduler and suspends the stream. The step
    /// counter is not rewound; a subsequent `start()` resets it to 0.
    pub fn stop(&mut self) {
        if let Some(scheduler) = self.scheduler.take() {
            drop(scheduler.cancel);
            if scheduler.thread.join().is_err() {
                warn!("Sequencer thread panicked during shutdown.");
            }
        }
        if let Some(device) = &self.device {
            if let Err(e) = device.stream.pause() {
                warn!("Could not pause audio stream: {}", e);
            }
        }
        self.shared.voices.lock().unwrap().clear();
        if self.running {
            info!("Sequencer stopped.");
        }
        self.running = false;
    }

    /// Drains beat boundaries accumulated since the last call. The sequencer
    /// owns the receiving side, so there is exactly one consumer and restarts
    /// cannot duplicate subscriptions.
    pub fn drain_beats(&mut self) -> Vec<BeatEvent> {
        self.beat_rx.try_iter().collect()
    }

    /// Cosmetic intensity in [0,1], mapped to a master low-pass cutoff on a
    /// log scale between the floor and the device Nyquist. The audio callback
    /// ramps toward it; never used for judgment.
    pub fn set_intensity(&self, intensity: f32) {
        self.shared
            .intensity
            .store(intensity.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    /// Frequency-magnitude snapshot of the most recent output, byte-scaled
    /// 0-255. Refreshed on demand; cosmetic only.
    pub fn visualization_data(&mut self, out: &mut [u8; VIZ_BINS]) {
        {
            let viz = self.shared.viz.lock().unwrap();
            if viz.len() < FFT_SIZE {
                out.fill(0);
                return;
            }
            let skip = viz.len() - FFT_SIZE;
            for (i, sample) in viz.iter().skip(skip).enumerate() {
                self.fft_scratch[i] = Complex::new(sample * hann(i, FFT_SIZE), 0.0);
            }
        }
        self.fft.process(&mut self.fft_scratch);
        let norm = 2.0 / FFT_SIZE as f32;
        for (bin, slot) in out.iter_mut().enumerate() {
            let mag = self.fft_scratch[bin + 1].norm() * norm;
            *slot = (mag * VIZ_GAIN).min(255.0) as u8;
        }
    }
}

impl Drop for Sequencer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn hann(index: usize, size: usize) -> f32 {
    0.5 * (1.0 - (TAU * index as f32 / (size as f32 - 1.0)).cos())
}

// --- Device / callback ---

fn open_device(shared: &Arc<Shared>, master_volume: f32) -> Result<DeviceState, String> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or("no audio output device")?;
    let config = device
        .default_output_config()
        .map_err(|e| format!("no default audio config: {}", e))?;
    let stream_config: StreamConfig = config.into();

    let sample_rate = stream_config.sample_rate.0;
    let channels = stream_config.channels as usize;
    shared.sample_rate.store(sample_rate, Ordering::Relaxed);

    let cb_shared = Arc::clone(shared);
    let mut lowpass = 0.0f32;
    let mut cutoff = FILTER_FLOOR_HZ;
    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _| {
                render_block(
                    &cb_shared,
                    data,
                    channels,
                    sample_rate,
                    master_volume,
                    &mut lowpass,
                    &mut cutoff,
                );
            },
            |err| error!("Audio stream error: {}", err),
            None,
        )
        .map_err(|e| format!("failed to build audio stream: {}", e))?;

    info!("Audio device opened ({} Hz, {} ch).", sample_rate, channels);
    Ok(DeviceState {
        stream,
        sample_rate,
    })
}

/// Real-time callback: renders active voices at their sample-accurate start
/// positions, applies the smoothed master filter, advances the sample clock.
fn render_block(
    shared: &Shared,
    data: &mut [f32],
    channels: usize,
    sample_rate: u32,
    master_volume: f32,
    lowpass: &mut f32,
    cutoff: &mut f32,
) {
    let sr = sample_rate as f32;
    let start = shared.samples_rendered.load(Ordering::Relaxed);
    let frames = data.len() / channels.max(1);
    let target_cutoff = cutoff_for(
        f32::from_bits(shared.intensity.load(Ordering::Relaxed)),
        sample_rate,
    );

    let mut voices = shared.voices.lock().unwrap();
    let mut viz = shared.viz.lock().unwrap();

    for frame in 0..frames {
        let t = start + frame as u64;
        let mut mix = 0.0f32;
        for voice in voices.iter_mut() {
            mix += voice.sample(t, sr);
        }

        *cutoff += (target_cutoff - *cutoff) * CUTOFF_SMOOTHING;
        let alpha = 1.0 - (-TAU * *cutoff / sr).exp();
        *lowpass += alpha * (mix - *lowpass);

        let out = (*lowpass * master_volume).clamp(-1.0, 1.0);
        for ch in 0..channels {
            data[frame * channels + ch] = out;
        }

        if viz.len() == VIZ_RING_CAP {
            viz.pop_front();
        }
        viz.push_back(out);
    }

    voices.retain(|v| !v.finished(sr));
    shared
        .samples_rendered
        .fetch_add(frames as u64, Ordering::Release);
}

/// Log-scale map from intensity in [0,1] to a cutoff between the floor and
/// the device Nyquist.
fn cutoff_for(intensity: f32, sample_rate: u32) -> f32 {
    let nyquist = (sample_rate.max(8000) / 2) as f32;
    FILTER_FLOOR_HZ * (nyquist / FILTER_FLOOR_HZ).powf(intensity.clamp(0.0, 1.0))
}

// --- Look-ahead scheduler ---

#[derive(Clone, Copy, Debug, PartialEq)]
struct DueStep {
    index: u32,
    time: f64,
}

/// Walks the sixteenth-note grid; hands out every step whose target time has
/// entered the horizon. A late caller simply receives more steps at once, so
/// gaps in the tick cadence self-heal.
struct StepCursor {
    step: u32,
    next_time: f64,
    seconds_per_step: f64,
}

impl StepCursor {
    fn new(start_time: f64, bpm: f64) -> Self {
        Self {
            step: 0,
            next_time: start_time,
            seconds_per_step: seconds_per_step(bpm),
        }
    }

    fn next_due(&mut self, horizon: f64) -> Option<DueStep> {
        if self.next_time >= horizon {
            return None;
        }
        let due = DueStep {
            index: self.step,
            time: self.next_time,
        };
        self.step = (self.step + 1) % STEPS_PER_CYCLE;
        self.next_time += self.seconds_per_step;
        Some(due)
    }
}

fn scheduler_loop(
    shared: Arc<Shared>,
    beat_tx: Sender<BeatEvent>,
    cancel_rx: Receiver<()>,
    sample_rate: u32,
    start_time: f64,
) {
    let mut cursor = StepCursor::new(start_time, TRACK_BPM as f64);
    loop {
        let horizon = shared.seconds() + LOOKAHEAD_SEC;
        while let Some(due) = cursor.next_due(horizon) {
            let start_sample = (due.time * sample_rate as f64).round() as u64;
            shared
                .voices
                .lock()
                .unwrap()
                .extend(voices_for_step(due.index, start_sample));
            if due.index % 4 == 0 {
                let _ = beat_tx.send(BeatEvent {
                    time: due.time,
                    step: due.index as u8,
                });
            }
        }
        match cancel_rx.recv_timeout(TICK_INTERVAL) {
            Err(RecvTimeoutError::Timeout) => continue,
            _ => break,
        }
    }
}

// --- Pattern ---

const BASS_NOTES: [f32; 8] = [55.00, 55.00, 65.41, 55.00, 43.65, 43.65, 49.00, 49.00];
const ARP_NOTES: [f32; 8] = [220.00, 261.63, 329.63, 440.00, 329.63, 261.63, 220.00, 164.81];

/// The step pattern, a pure function of `(step, scheduled start sample)`.
fn voices_for_step(step: u32, start: u64) -> Vec<Voice> {
    let mut voices = Vec::with_capacity(4);
    if step % 4 == 0 {
        voices.push(Voice::new(VoiceKind::Kick, start));
    }
    if step % 16 == 4 || step % 16 == 12 {
        voices.push(Voice::new(VoiceKind::Snare, start));
    }
    if step % 2 == 0 {
        voices.push(Voice::new(
            VoiceKind::Hat {
                accent: step % 4 == 2,
            },
            start,
        ));
        let seq = ((step / 2) % 8) as usize;
        voices.push(Voice::new(
            VoiceKind::Bass {
                freq: BASS_NOTES[seq],
            },
            start,
        ));
        voices.push(Voice::new(
            VoiceKind::Arp {
                freq: ARP_NOTES[seq],
            },
            start,
        ));
    }
    voices
}

// --- Voices ---

#[derive(Clone, Copy, Debug, PartialEq)]
enum VoiceKind {
    Kick,
    Snare,
    Hat { accent: bool },
    Bass { freq: f32 },
    Arp { freq: f32 },
}

const ATTACK_SEC: f32 = 0.002;

#[derive(Clone, Debug)]
struct Voice {
    kind: VoiceKind,
    start: u64,
    duration: f32,
    age: u32,
    phase: f32,
    detune_phase: f32,
    noise: u32,
    prev_noise: f32,
}

impl Voice {
    fn new(kind: VoiceKind, start: u64) -> Self {
        let duration = match kind {
            VoiceKind::Kick => 0.30,
            VoiceKind::Snare => 0.18,
            VoiceKind::Hat { accent: true } => 0.10,
            VoiceKind::Hat { accent: false } => 0.05,
            VoiceKind::Bass { .. } => 0.22,
            VoiceKind::Arp { .. } => 0.15,
        };
        Self {
            kind,
            start,
            duration,
            age: 0,
            phase: 0.0,
            detune_phase: 0.0,
            noise: (start as u32) | 1,
            prev_noise: 0.0,
        }
    }

    fn sample(&mut self, t: u64, sr: f32) -> f32 {
        if t < self.start {
            return 0.0;
        }
        let secs = self.age as f32 / sr;
        self.age += 1;
        if secs >= self.duration {
            return 0.0;
        }
        let attack = (secs / ATTACK_SEC).min(1.0);
        // Linear tail keeps exponential envelopes from clicking at cutoff.
        let tail = 1.0 - secs / self.duration;

        let body = match self.kind {
            VoiceKind::Kick => {
                let freq = 42.0 + 68.0 * (-secs * 22.0).exp();
                self.phase = (self.phase + freq / sr).fract();
                (TAU * self.phase).sin() * (-secs * 9.0).exp() * 0.9
            }
            VoiceKind::Snare => {
                self.phase = (self.phase + 190.0 / sr).fract();
                let tone = (TAU * self.phase).sin() * 0.3;
                (tone + self.next_noise() * 0.7) * (-secs * 18.0).exp() * 0.55
            }
            VoiceKind::Hat { accent } => {
                let n = self.next_noise();
                let high = n - self.prev_noise;
                self.prev_noise = n;
                let decay = if accent { 28.0 } else { 55.0 };
                let amp = if accent { 0.40 } else { 0.28 };
                high * (-secs * decay).exp() * amp
            }
            VoiceKind::Bass { freq } => {
                self.phase = (self.phase + freq / sr).fract();
                self.detune_phase = (self.detune_phase + freq * 1.004 / sr).fract();
                let saw = (2.0 * self.phase - 1.0) + (2.0 * self.detune_phase - 1.0);
                saw * 0.5 * (-secs * 10.0).exp() * 0.5
            }
            VoiceKind::Arp { freq } => {
                self.phase = (self.phase + freq / sr).fract();
                let square = if self.phase < 0.5 { 1.0 } else { -1.0 };
                square * (-secs * 16.0).exp() * 0.20
            }
        };
        body * attack * tail
    }

    fn finished(&self, sr: f32) -> bool {
        self.age as f32 / sr >= self.duration
    }

    fn next_noise(&mut self) -> f32 {
        let mut x = self.noise;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.noise = x;
        (x as f32 / u32::MAX as f32) * 2.0 - 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_per_beat_matches_tempo() {
        assert!((seconds_per_beat(115.0) - 60.0 / 115.0).abs() < 1e-12);
        assert!((seconds_per_beat(120.0) - 0.5).abs() < 1e-12);
        assert!((seconds_per_step(115.0) - 60.0 / 115.0 / 4.0).abs() < 1e-12);
    }

    #[test]
    fn cursor_cycles_all_sixteen_steps_in_order() {
        let mut cursor = StepCursor::new(0.0, 115.0);
        let horizon = seconds_per_step(115.0) * 33.0;
        let mut steps = Vec::new();
        while let Some(due) = cursor.next_due(horizon) {
            steps.push(due.index);
        }
        assert_eq!(steps.len(), 33);
        for (i, step) in steps.iter().enumerate() {
            assert_eq!(*step, (i as u32) % 16);
        }
    }

    #[test]
    fn cursor_never_skips_a_beat_boundary() {
        // Irregular horizons model a jittery tick cadence; the catch-up loop
        // must still produce every beat boundary exactly once.
        let mut cursor = StepCursor::new(0.25, 115.0);
        let sps = seconds_per_step(115.0);
        let mut boundaries = Vec::new();
        for horizon_steps in [3.0, 3.5, 9.0, 9.1, 30.0, 64.0] {
            let horizon = 0.25 + sps * horizon_steps;
            while let Some(due) = cursor.next_due(horizon) {
                if due.index % 4 == 0 {
                    boundaries.push(due.time);
                }
            }
        }
        assert_eq!(boundaries.len(), 16);
        for (k, time) in boundaries.iter().enumerate() {
            assert!((time - (0.25 + sps * 4.0 * k as f64)).abs() < 1e-9);
        }
    }

    #[test]
    fn cursor_times_are_sample_accurate_grid_points() {
        let mut cursor = StepCursor::new(1.0, 115.0);
        let sps = seconds_per_step(115.0);
        for k in 0..40 {
            let due = cursor.next_due(f64::INFINITY).unwrap();
            assert!((due.time - (1.0 + sps * k as f64)).abs() < 1e-9);
        }
    }

    #[test]
    fn pattern_membership_follows_modulo_rules() {
        for step in 0..16u32 {
            let voices = voices_for_step(step, 0);
            let has = |pred: &dyn Fn(&VoiceKind) -> bool| voices.iter().any(|v| pred(&v.kind));
            assert_eq!(has(&|k| matches!(k, VoiceKind::Kick)), step % 4 == 0);
            assert_eq!(
                has(&|k| matches!(k, VoiceKind::Snare)),
                step == 4 || step == 12
            );
            assert_eq!(has(&|k| matches!(k, VoiceKind::Hat { .. })), step % 2 == 0);
            assert_eq!(has(&|k| matches!(k, VoiceKind::Bass { .. })), step % 2 == 0);
            assert_eq!(has(&|k| matches!(k, VoiceKind::Arp { .. })), step % 2 == 0);
            if step % 4 == 2 {
                assert!(has(&|k| matches!(k, VoiceKind::Hat { accent: true })));
            }
        }
    }

    #[test]
    fn pattern_pitches_come_from_the_note_tables() {
        let voices = voices_for_step(6, 0);
        let seq = ((6 / 2) % 8) as usize;
        assert!(voices
            .iter()
            .any(|v| v.kind == VoiceKind::Bass { freq: BASS_NOTES[seq] }));
        assert!(voices
            .iter()
            .any(|v| v.kind == VoiceKind::Arp { freq: ARP_NOTES[seq] }));
    }

    #[test]
    fn no_voice_outlives_half_a_second() {
        for step in 0..16 {
            for voice in voices_for_step(step, 4800) {
                assert!(voice.duration <= 0.5);
            }
        }
    }

    #[test]
    fn voices_are_silent_before_their_start_sample() {
        let mut voice = Voice::new(VoiceKind::Kick, 1000);
        assert_eq!(voice.sample(999, 48_000.0), 0.0);
        assert_eq!(voice.age, 0);
    }

    #[test]
    fn voices_finish_and_stay_bounded() {
        let sr = 48_000.0;
        for step in [0u32, 2, 4, 6, 12] {
            for mut voice in voices_for_step(step, 0) {
                let total = (voice.duration * sr) as u64 + 8;
                for t in 0..total {
                    let s = voice.sample(t, sr);
                    assert!(s.abs() <= 1.5, "voice sample out of range: {}", s);
                }
                assert!(voice.finished(sr));
            }
        }
    }

    #[test]
    fn cutoff_mapping_is_log_scaled_and_bounded() {
        let sr = 48_000;
        assert!((cutoff_for(0.0, sr) - FILTER_FLOOR_HZ).abs() < 1e-3);
        assert!((cutoff_for(1.0, sr) - 24_000.0).abs() < 1.0);
        let mid = cutoff_for(0.5, sr);
        assert!(mid > FILTER_FLOOR_HZ && mid < 24_000.0);
        // Log scale: the midpoint is the geometric mean, not the arithmetic one.
        assert!((mid - (FILTER_FLOOR_HZ * 24_000.0).sqrt()).abs() < 10.0);
        assert!(cutoff_for(0.3, sr) < cutoff_for(0.7, sr));
    }

    #[test]
    fn sequencer_is_inert_until_started() {
        // No device is acquired in new(), so a cold instance is safe to poke.
        let mut seq = Sequencer::new(0.8);
        assert!(!seq.is_running());
        assert_eq!(seq.bpm(), TRACK_BPM);
        assert_eq!(seq.current_time(), 0.0);
        assert!(seq.drain_beats().is_empty());
        seq.set_intensity(7.0);
        seq.stop();
        seq.stop();
        assert!(!seq.is_running());
    }

    #[test]
    fn hann_window_is_zero_edged() {
        assert!(hann(0, FFT_SIZE).abs() < 0.01);
        assert!(hann(FFT_SIZE - 1, FFT_SIZE).abs() < 0.01);
        assert!((hann(FFT_SIZE / 2, FFT_SIZE) - 1.0).abs() < 0.01);
    }
}
