//! Render path.
//!
//! Nothing here takes the structural lock or allocates. Each node's buffer is
//! `try_lock`ed; a miss leaves the node's previous stamp in place, and
//! downstream nodes ignore inputs whose stamp is not the current pass, so a
//! contended node contributes silence instead of stale audio.

use core::sync::atomic::Ordering;

use crate::buffer::AudioBuffer;
use crate::midi::MidiBuffer;

use super::AudioGraph;
use super::node::{NodeIo, NodeKind};

impl AudioGraph {
    /// Renders one block.
    ///
    /// `audio` carries the graph's input channels in and its output channels
    /// out. `midi` carries host MIDI in and is cleared on return. Frames beyond
    /// the prepared block size are silenced.
    ///
    /// Real-time safe: never blocks, never allocates.
    pub fn process(&self, audio: &mut AudioBuffer, midi: &mut MidiBuffer) {
        let plan = self.plan.load();
        let stamp = self.render_count.fetch_add(1, Ordering::Relaxed) + 1;
        let frames = audio.frames().min(self.block_size());

        for step in &plan.steps {
            let node = &step.node;
            let Some(mut io) = node.io.try_lock() else {
                #[cfg(feature = "tracing")]
                tracing::trace!("graph_render: io contended on {}", node.id());
                continue;
            };
            io.begin(frames, stamp);

            match node.kind() {
                NodeKind::AudioInput => {
                    for ch in 0..io.audio.num_channels() {
                        if let Some(src) = audio.get(ch) {
                            io.audio.copy_from(ch, src);
                        }
                    }
                }
                NodeKind::MidiInput => io.midi.merge_from(midi),
                kind => {
                    for feed in &step.audio_feeds {
                        if let Some(src_io) = plan.steps[feed.from_step].node.io.try_lock()
                            && src_io.stamp == stamp
                            && let Some(src) = src_io.audio.get(feed.source_channel)
                        {
                            io.audio.add_from(feed.dest_channel, src);
                        }
                    }
                    for &from in &step.midi_feeds {
                        if let Some(src_io) = plan.steps[from].node.io.try_lock()
                            && src_io.stamp == stamp
                        {
                            io.midi.merge_from(&src_io.midi);
                        }
                    }

                    if kind == NodeKind::Processor && !node.is_bypassed() {
                        let NodeIo {
                            audio: node_audio,
                            midi: node_midi,
                            ..
                        } = &mut *io;
                        match node.unit.try_lock() {
                            Some(mut unit) => unit.process(node_audio, node_midi),
                            None => {
                                #[cfg(feature = "tracing")]
                                tracing::trace!("graph_render: unit busy on {}", node.id());
                                node_audio.clear();
                                node_midi.clear();
                            }
                        }
                    }
                }
            }
        }

        let out_channels = match plan.output_step {
            Some(i) => match plan.steps[i].node.io.try_lock() {
                Some(io) if io.stamp == stamp => {
                    let n = io.audio.num_channels().min(audio.num_channels());
                    for ch in 0..n {
                        audio.copy_from(ch, io.audio.channel(ch));
                    }
                    n
                }
                _ => 0,
            },
            None => 0,
        };

        for ch in out_channels..audio.num_channels() {
            if let Some(dst) = audio.get_mut(ch) {
                dst.fill(0.0);
            }
        }
        if audio.frames() > frames {
            audio.clear_range(frames, audio.frames() - frames);
        }
        midi.clear();
    }
}
