//! Property-based tests for rondo-core graph and buffer invariants.
//!
//! Random connection sequences must never produce a cycle, every compiled
//! plan must render sources before destinations, and MIDI buffers must stay
//! frame-ordered under arbitrary insertion.

use std::sync::Arc;

use proptest::prelude::*;
use rondo_core::{
    AudioBuffer, AudioGraph, AudioProcessor, BusLayout, Connection, DeferredQueue, GraphError,
    MidiBuffer, MidiMessage, NodeId, ProcessorError,
};

struct Thru;

impl AudioProcessor for Thru {
    fn name(&self) -> &str {
        "thru"
    }

    fn layout(&self) -> BusLayout {
        BusLayout::stereo()
    }

    fn prepare(&mut self, _sample_rate: f64, _block_size: usize) -> Result<(), ProcessorError> {
        Ok(())
    }

    fn process(&mut self, _audio: &mut AudioBuffer, _midi: &mut MidiBuffer) {}
}

fn graph_with_nodes(count: usize) -> (AudioGraph, Vec<NodeId>) {
    let graph = AudioGraph::new(BusLayout::stereo(), 48000.0, 32, Arc::new(DeferredQueue::new()));
    let ids = (0..count)
        .map(|_| graph.add_node(Box::new(Thru)).unwrap())
        .collect();
    (graph, ids)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// For any sequence of connection attempts, accepted connections always
    /// leave the plan topologically ordered and rejected ones change nothing.
    #[test]
    fn connections_never_form_cycles(
        edges in prop::collection::vec((0usize..6, 0usize..2, 0usize..6, 0usize..2), 1..40),
    ) {
        let (graph, ids) = graph_with_nodes(6);

        for (src, src_ch, dst, dst_ch) in edges {
            let conn = Connection::new(ids[src], src_ch, ids[dst], dst_ch);
            let before = graph.connection_count();
            match graph.add_connection(&conn) {
                Ok(true) => prop_assert_eq!(graph.connection_count(), before + 1),
                Ok(false) => prop_assert_eq!(graph.connection_count(), before),
                Err(GraphError::CycleDetected | GraphError::SelfConnection(_)) => {
                    prop_assert_eq!(graph.connection_count(), before);
                }
                Err(other) => prop_assert!(false, "unexpected error {}", other),
            }
        }

        let plan = graph.plan();
        prop_assert_eq!(plan.len(), graph.node_count());
        for conn in graph.connections() {
            let from = plan.position(conn.source.node).unwrap();
            let to = plan.position(conn.destination.node).unwrap();
            prop_assert!(from < to, "{} rendered out of order", conn);
        }
    }

    /// Adding the same connection twice is a no-op the second time, and
    /// removing it twice is a no-op the second time.
    #[test]
    fn connect_and_disconnect_are_idempotent(src_ch in 0usize..2, dst_ch in 0usize..2) {
        let (graph, ids) = graph_with_nodes(2);
        let conn = Connection::new(ids[0], src_ch, ids[1], dst_ch);
        prop_assert_eq!(graph.add_connection(&conn), Ok(true));
        prop_assert_eq!(graph.add_connection(&conn), Ok(false));
        prop_assert!(graph.remove_connection(&conn));
        prop_assert!(!graph.remove_connection(&conn));
        prop_assert_eq!(graph.connection_count(), 0);
    }

    /// MIDI buffers stay sorted by frame for any insertion order.
    #[test]
    fn midi_buffer_stays_ordered(frames in prop::collection::vec(0u32..256, 0..64)) {
        let mut buffer = MidiBuffer::new(32);
        for (i, &frame) in frames.iter().enumerate() {
            buffer.add(frame, MidiMessage::NoteOn { channel: 0, note: (i % 128) as u8, velocity: 64 });
        }
        prop_assert_eq!(buffer.len(), frames.len().min(32));
        let ordered: Vec<u32> = buffer.iter().map(|e| e.frame).collect();
        prop_assert!(ordered.windows(2).all(|w| w[0] <= w[1]));
    }
}
