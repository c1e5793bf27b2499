//! Integration tests for rondo-core.
//!
//! Exercises graph nesting (a unit that renders its own graph), rendering
//! while the control thread mutates topology, and deferred teardown of
//! removed nodes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use rondo_core::{
    AudioBuffer, AudioGraph, AudioProcessor, BusLayout, Connection, DeferredQueue, MidiBuffer,
    ProcessorError, Transport,
};

const BLOCK: usize = 64;

struct Gain(f32);

impl AudioProcessor for Gain {
    fn name(&self) -> &str {
        "gain"
    }

    fn layout(&self) -> BusLayout {
        BusLayout::stereo()
    }

    fn prepare(&mut self, _sample_rate: f64, _block_size: usize) -> Result<(), ProcessorError> {
        Ok(())
    }

    fn process(&mut self, audio: &mut AudioBuffer, _midi: &mut MidiBuffer) {
        audio.apply_gain(self.0);
    }
}

/// A unit hosting a whole graph, the way a track hosts its plugin chain.
struct Nested {
    inner: Arc<AudioGraph>,
}

impl AudioProcessor for Nested {
    fn name(&self) -> &str {
        "nested"
    }

    fn layout(&self) -> BusLayout {
        self.inner.layout()
    }

    fn prepare(&mut self, sample_rate: f64, block_size: usize) -> Result<(), ProcessorError> {
        self.inner.prepare(sample_rate, block_size);
        Ok(())
    }

    fn process(&mut self, audio: &mut AudioBuffer, midi: &mut MidiBuffer) {
        self.inner.process(audio, midi);
    }
}

fn graph(deferred: &Arc<DeferredQueue>) -> AudioGraph {
    AudioGraph::new(BusLayout::stereo(), 48000.0, BLOCK, Arc::clone(deferred))
}

fn wire(g: &AudioGraph, node: rondo_core::NodeId) {
    for ch in 0..2 {
        g.add_connection(&Connection::new(g.audio_input_node(), ch, node, ch))
            .unwrap();
        g.add_connection(&Connection::new(node, ch, g.audio_output_node(), ch))
            .unwrap();
    }
}

fn render(g: &AudioGraph, value: f32) -> AudioBuffer {
    let mut audio = AudioBuffer::new(2, BLOCK);
    for ch in 0..2 {
        audio.channel_mut(ch).fill(value);
    }
    g.process(&mut audio, &mut MidiBuffer::new(8));
    audio
}

#[test]
fn nested_graph_renders_inner_chain() {
    let deferred = Arc::new(DeferredQueue::new());
    let inner = Arc::new(graph(&deferred));
    let gain = inner.add_node(Box::new(Gain(0.5))).unwrap();
    wire(&inner, gain);

    let outer = graph(&deferred);
    let nested = outer
        .add_node(Box::new(Nested {
            inner: Arc::clone(&inner),
        }))
        .unwrap();
    wire(&outer, nested);

    let out = render(&outer, 1.0);
    assert!((out.channel(0)[0] - 0.5).abs() < 1e-6);
    assert!((out.channel(1)[BLOCK - 1] - 0.5).abs() < 1e-6);
}

#[test]
fn render_survives_concurrent_mutation() {
    let deferred = Arc::new(DeferredQueue::new());
    let g = Arc::new(graph(&deferred));
    let running = Arc::new(AtomicBool::new(true));

    let render_thread = {
        let g = Arc::clone(&g);
        let running = Arc::clone(&running);
        thread::spawn(move || {
            let mut blocks = 0usize;
            while running.load(Ordering::Relaxed) {
                let out = render(&g, 1.0);
                assert!(out.peak() <= 2.0 + 1e-6);
                blocks += 1;
            }
            blocks
        })
    };

    for _ in 0..200 {
        let node = g.add_node(Box::new(Gain(1.0))).unwrap();
        wire(&g, node);
        assert!(g.remove_node(node));
        deferred.drain();
    }
    running.store(false, Ordering::Relaxed);
    let blocks = render_thread.join().unwrap();
    assert!(blocks > 0);
    assert_eq!(g.node_count(), 3);
}

#[test]
fn transport_loops_across_blocks() {
    // 192 / 1024 s is exact in binary
    let transport = Transport::new(1024.0);
    transport.set_loop_range(0.0, 0.1875);
    transport.set_looping(true);
    let starts: Vec<i64> = (0..4).map(|_| transport.next(BLOCK)).collect();
    assert_eq!(starts, vec![0, 64, 128, 0]);
}
