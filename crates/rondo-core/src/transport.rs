//! Shared play position and tempo state.
//!
//! [`Transport`] is written by the control thread (play, stop, loop points)
//! and advanced by the render thread once per block. Every field is an atomic,
//! so neither side ever waits on the other. Floating-point values are stored
//! as bit patterns in `AtomicU64`.

use core::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, Ordering};

/// MIDI ticks per quarter note used for tick/second conversions.
pub const TICKS_PER_QUARTER: u32 = 480;

/// Snapshot of the transport for one block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionInfo {
    /// Block start in samples.
    pub position: i64,
    /// Block start in seconds.
    pub seconds: f64,
    /// Whether the transport is rolling.
    pub playing: bool,
    /// Whether recording is armed.
    pub recording: bool,
    /// Whether the loop range is active.
    pub looping: bool,
    /// Tempo in BPM.
    pub tempo: f64,
    /// Zero-based bar index.
    pub bar: u32,
    /// Beat position inside the bar.
    pub beat: f64,
}

/// Atomic session transport.
#[derive(Debug)]
pub struct Transport {
    sample_rate: AtomicU64,
    position: AtomicI64,
    playing: AtomicBool,
    recording: AtomicBool,
    looping: AtomicBool,
    loop_start: AtomicI64,
    loop_end: AtomicI64,
    tempo: AtomicU64,
    numerator: AtomicU32,
    denominator: AtomicU32,
}

impl Transport {
    /// Creates a stopped transport at position 0, 120 BPM, 4/4.
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate: AtomicU64::new(sample_rate.to_bits()),
            position: AtomicI64::new(0),
            playing: AtomicBool::new(false),
            recording: AtomicBool::new(false),
            looping: AtomicBool::new(false),
            loop_start: AtomicI64::new(0),
            loop_end: AtomicI64::new(0),
            tempo: AtomicU64::new(120.0f64.to_bits()),
            numerator: AtomicU32::new(4),
            denominator: AtomicU32::new(4),
        }
    }

    // --- Rate and position ---

    /// Current session sample rate.
    pub fn sample_rate(&self) -> f64 {
        f64::from_bits(self.sample_rate.load(Ordering::Relaxed))
    }

    /// Changes the session rate, keeping the position in seconds.
    pub fn set_sample_rate(&self, sample_rate: f64) {
        if sample_rate <= 0.0 {
            return;
        }
        let seconds = self.position_seconds();
        let (loop_start, loop_end) = self.loop_range();
        self.sample_rate
            .store(sample_rate.to_bits(), Ordering::Relaxed);
        self.set_position_seconds(seconds);
        self.set_loop_range(loop_start, loop_end);
    }

    /// Play position in samples.
    pub fn position(&self) -> i64 {
        self.position.load(Ordering::Acquire)
    }

    /// Moves the play position.
    pub fn set_position(&self, samples: i64) {
        self.position.store(samples, Ordering::Release);
    }

    /// Play position in seconds.
    pub fn position_seconds(&self) -> f64 {
        self.position() as f64 / self.sample_rate()
    }

    /// Moves the play position in seconds.
    pub fn set_position_seconds(&self, seconds: f64) {
        self.set_position((seconds * self.sample_rate()).floor() as i64);
    }

    // --- Play state ---

    /// Starts rolling.
    pub fn play(&self) {
        self.playing.store(true, Ordering::Release);
    }

    /// Stops rolling and disarms recording.
    pub fn stop(&self) {
        self.playing.store(false, Ordering::Release);
        self.recording.store(false, Ordering::Release);
    }

    /// Whether the transport is rolling.
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    /// Arms or disarms recording.
    pub fn set_recording(&self, recording: bool) {
        self.recording.store(recording, Ordering::Release);
    }

    /// Whether recording is armed.
    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }

    // --- Looping ---

    /// Enables or disables the loop range.
    pub fn set_looping(&self, looping: bool) {
        self.looping.store(looping, Ordering::Release);
    }

    /// Whether the loop range is active.
    pub fn is_looping(&self) -> bool {
        self.looping.load(Ordering::Acquire)
    }

    /// Sets the loop range in seconds. Reversed bounds are swapped.
    pub fn set_loop_range(&self, start: f64, end: f64) {
        let (start, end) = if end < start { (end, start) } else { (start, end) };
        let rate = self.sample_rate();
        self.loop_start
            .store((start * rate).floor() as i64, Ordering::Release);
        self.loop_end
            .store((end * rate).floor() as i64, Ordering::Release);
    }

    /// Loop range in seconds.
    pub fn loop_range(&self) -> (f64, f64) {
        let rate = self.sample_rate();
        (
            self.loop_start.load(Ordering::Acquire) as f64 / rate,
            self.loop_end.load(Ordering::Acquire) as f64 / rate,
        )
    }

    /// Advances by one block and returns the position the block starts at.
    ///
    /// With looping on and a non-empty loop range, a position that reaches the
    /// loop end wraps back inside the range.
    pub fn next(&self, block_size: usize) -> i64 {
        let start = self.position();
        let mut next = start + block_size as i64;
        if self.is_looping() {
            let loop_start = self.loop_start.load(Ordering::Acquire);
            let loop_end = self.loop_end.load(Ordering::Acquire);
            let len = loop_end - loop_start;
            if len > 0 && next >= loop_end {
                next = loop_start + (next - loop_end) % len;
            }
        }
        self.set_position(next);
        start
    }

    // --- Tempo ---

    /// Tempo in BPM.
    pub fn tempo(&self) -> f64 {
        f64::from_bits(self.tempo.load(Ordering::Relaxed))
    }

    /// Sets the tempo. Non-positive values are ignored.
    pub fn set_tempo(&self, bpm: f64) {
        if bpm > 0.0 {
            self.tempo.store(bpm.to_bits(), Ordering::Relaxed);
        }
    }

    /// Time signature as `(numerator, denominator)`.
    pub fn time_signature(&self) -> (u32, u32) {
        (
            self.numerator.load(Ordering::Relaxed),
            self.denominator.load(Ordering::Relaxed),
        )
    }

    /// Sets the time signature. Zero parts are ignored.
    pub fn set_time_signature(&self, numerator: u32, denominator: u32) {
        if numerator > 0 && denominator > 0 {
            self.numerator.store(numerator, Ordering::Relaxed);
            self.denominator.store(denominator, Ordering::Relaxed);
        }
    }

    /// Converts MIDI ticks to seconds at the current tempo.
    pub fn to_seconds(&self, ticks: f64) -> f64 {
        ticks / f64::from(TICKS_PER_QUARTER) * 60.0 / self.tempo()
    }

    /// Converts seconds to MIDI ticks at the current tempo.
    pub fn to_ticks(&self, seconds: f64) -> f64 {
        seconds * self.tempo() / 60.0 * f64::from(TICKS_PER_QUARTER)
    }

    /// Converts seconds to a zero-based `(bar, beat)` pair.
    pub fn to_bar(&self, seconds: f64) -> (u32, f64) {
        let (numerator, denominator) = self.time_signature();
        let quarters = seconds.max(0.0) * self.tempo() / 60.0;
        let beats = quarters * f64::from(denominator) / 4.0;
        let bar = (beats / f64::from(numerator)).floor();
        (bar as u32, beats - bar * f64::from(numerator))
    }

    /// Snapshot for the current block.
    pub fn position_info(&self) -> PositionInfo {
        let seconds = self.position_seconds();
        let (bar, beat) = self.to_bar(seconds);
        PositionInfo {
            position: self.position(),
            seconds,
            playing: self.is_playing(),
            recording: self.is_recording(),
            looping: self.is_looping(),
            tempo: self.tempo(),
            bar,
            beat,
        }
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new(48000.0)
    }
}
