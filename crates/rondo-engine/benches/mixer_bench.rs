//! Criterion benchmarks for the rondo-engine mixer
//!
//! Run with: cargo bench -p rondo-engine
#![allow(missing_docs)]

use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use rondo_core::{AudioBuffer, ChannelSet, DeferredQueue, MidiBuffer};
use rondo_engine::{GainUnit, Mixer};

const SAMPLE_RATE: f64 = 48000.0;
const BLOCK_SIZE: usize = 256;
const TRACK_COUNTS: &[usize] = &[1, 8, 32];

fn mixer_with(tracks: usize, plugins: usize) -> (Mixer, Arc<DeferredQueue>) {
    let deferred = Arc::new(DeferredQueue::new());
    let mixer = Mixer::new(SAMPLE_RATE, BLOCK_SIZE, Arc::clone(&deferred)).unwrap();
    for i in 1..=tracks {
        mixer.insert_track(i, ChannelSet::Stereo);
        mixer.set_track_audio_input(i, 0);
        let dock = mixer.track_dock(i).unwrap();
        for _ in 0..plugins {
            dock.insert_plugin(Box::new(GainUnit::new(ChannelSet::Stereo, -1.0)), usize::MAX);
        }
    }
    deferred.drain();
    (mixer, deferred)
}

fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("Mixer::process");

    for &tracks in TRACK_COUNTS {
        for plugins in [0, 4] {
            let (mixer, _deferred) = mixer_with(tracks, plugins);
            let mut audio = AudioBuffer::new(2, BLOCK_SIZE);
            let mut midi = MidiBuffer::new(64);
            group.bench_with_input(
                BenchmarkId::new(format!("plugins_{plugins}"), tracks),
                &tracks,
                |b, _| {
                    b.iter(|| {
                        audio.channel_mut(0).fill(0.5);
                        mixer.graph().process(black_box(&mut audio), &mut midi);
                    });
                },
            );
        }
    }

    group.finish();
}

fn bench_track_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("Mixer::tracks");

    for &tracks in TRACK_COUNTS {
        let (mixer, deferred) = mixer_with(tracks, 1);
        group.bench_with_input(BenchmarkId::new("insert_remove", tracks), &tracks, |b, _| {
            b.iter(|| {
                mixer.insert_track(black_box(1), ChannelSet::Stereo);
                mixer.remove_track(black_box(1));
                deferred.drain();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_render, bench_track_churn);
criterion_main!(benches);
