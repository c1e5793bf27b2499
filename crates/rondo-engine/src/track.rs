//! Mixer channel strip.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rondo_core::{
    AudioBuffer, AudioProcessor, BusLayout, MidiBuffer, ProcessorError, balance_gains,
    db_to_linear,
};

use crate::dock::PluginDock;

/// Default strip color, mid grey.
pub const DEFAULT_TRACK_COLOR: u32 = 0x80_80_80;

/// Control-side state of a track. Every field can be changed while the
/// track renders.
#[derive(Debug)]
pub struct TrackState {
    name: RwLock<String>,
    color: AtomicU32,
    gain: AtomicU32,
    pan: AtomicU32,
    muted: AtomicBool,
}

impl TrackState {
    /// Unity gain, centred, unmuted.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: RwLock::new(name.into()),
            color: AtomicU32::new(DEFAULT_TRACK_COLOR),
            gain: AtomicU32::new(1.0f32.to_bits()),
            pan: AtomicU32::new(0.0f32.to_bits()),
            muted: AtomicBool::new(false),
        }
    }

    /// Display name.
    pub fn name(&self) -> String {
        self.name.read().clone()
    }

    /// Renames the track.
    pub fn set_name(&self, name: impl Into<String>) {
        *self.name.write() = name.into();
    }

    /// Color as `0xRRGGBB`.
    pub fn color(&self) -> u32 {
        self.color.load(Ordering::Relaxed)
    }

    /// Sets the color.
    pub fn set_color(&self, rgb: u32) {
        self.color.store(rgb & 0xFF_FF_FF, Ordering::Relaxed);
    }

    /// Linear fader gain.
    pub fn gain(&self) -> f32 {
        f32::from_bits(self.gain.load(Ordering::Relaxed))
    }

    /// Sets the linear fader gain. Negative values clamp to 0.
    pub fn set_gain(&self, gain: f32) {
        self.gain.store(gain.max(0.0).to_bits(), Ordering::Relaxed);
    }

    /// Sets the fader gain in dB.
    pub fn set_gain_db(&self, db: f32) {
        self.set_gain(db_to_linear(db));
    }

    /// Balance in `[-1, 1]`.
    pub fn pan(&self) -> f32 {
        f32::from_bits(self.pan.load(Ordering::Relaxed))
    }

    /// Sets the balance, clamped to `[-1, 1]`.
    pub fn set_pan(&self, pan: f32) {
        self.pan.store(pan.clamp(-1.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    /// Whether the track renders silence.
    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    /// Mutes or unmutes.
    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }
}

/// The unit a mixer track node wraps: its plugin chain, then gain, pan and
/// mute.
pub(crate) struct TrackProcessor {
    state: Arc<TrackState>,
    dock: Arc<PluginDock>,
}

impl TrackProcessor {
    pub(crate) fn new(state: Arc<TrackState>, dock: Arc<PluginDock>) -> Self {
        Self { state, dock }
    }
}

impl AudioProcessor for TrackProcessor {
    fn name(&self) -> &str {
        "Track"
    }

    fn layout(&self) -> BusLayout {
        self.dock.layout()
    }

    fn accepts_midi(&self) -> bool {
        true
    }

    fn prepare(&mut self, sample_rate: f64, block_size: usize) -> Result<(), ProcessorError> {
        self.dock.prepare(sample_rate, block_size);
        Ok(())
    }

    fn process(&mut self, audio: &mut AudioBuffer, midi: &mut MidiBuffer) {
        self.dock.graph().process(audio, midi);

        if self.state.is_muted() {
            audio.clear();
            return;
        }
        audio.apply_gain(self.state.gain());
        if audio.num_channels() == 2 {
            let (left, right) = balance_gains(self.state.pan());
            audio.apply_channel_gain(0, left);
            audio.apply_channel_gain(1, right);
        }
    }

    fn reset(&mut self) {
        self.dock.graph().reset();
    }

    fn latency_samples(&self) -> usize {
        (0..self.dock.plugin_count())
            .filter_map(|i| self.dock.plugin_node(i))
            .filter_map(|node| node.try_with_unit(|unit| unit.latency_samples()))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rondo_core::{ChannelSet, DeferredQueue};

    fn strip() -> (Arc<TrackState>, TrackProcessor) {
        let dock = Arc::new(PluginDock::new(
            ChannelSet::Stereo,
            48000.0,
            16,
            Arc::new(DeferredQueue::new()),
        ));
        let state = Arc::new(TrackState::new("Bass"));
        (Arc::clone(&state), TrackProcessor::new(state, dock))
    }

    fn run(unit: &mut TrackProcessor) -> AudioBuffer {
        let mut audio = AudioBuffer::from_channels(vec![vec![1.0; 16]; 2]);
        let mut midi = MidiBuffer::new(4);
        unit.process(&mut audio, &mut midi);
        audio
    }

    #[test]
    fn test_centre_is_unity() {
        let (_, mut unit) = strip();
        let out = run(&mut unit);
        assert_eq!(out.channel(0)[0], 1.0);
        assert_eq!(out.channel(1)[0], 1.0);
    }

    #[test]
    fn test_balance_attenuates_far_side() {
        let (state, mut unit) = strip();
        state.set_pan(0.5);
        let out = run(&mut unit);
        assert_eq!(out.channel(0)[3], 0.5);
        assert_eq!(out.channel(1)[3], 1.0);
    }

    #[test]
    fn test_gain_and_mute() {
        let (state, mut unit) = strip();
        state.set_gain(0.25);
        assert_eq!(run(&mut unit).channel(1)[0], 0.25);
        state.set_muted(true);
        assert_eq!(run(&mut unit).peak(), 0.0);
    }

    #[test]
    fn test_state_setters_clamp() {
        let state = TrackState::new("Keys");
        state.set_pan(-3.0);
        assert_eq!(state.pan(), -1.0);
        state.set_gain(-1.0);
        assert_eq!(state.gain(), 0.0);
        state.set_color(0xFF_12_34_56);
        assert_eq!(state.color(), 0x12_34_56);
        state.set_name("Piano");
        assert_eq!(state.name(), "Piano");
    }
}
