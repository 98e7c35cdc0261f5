//! Benchmarks for the synthesis bank and the offline render path.
//!
//! Run with: cargo bench -p tingle-engine

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tingle_engine::{
    render_synth_buffer, AudioPosition, Catalog, EngineConfig, PlaybackRequest, SoundCategory, SoundDescriptor,
    TouchAudioEngine,
};

const SAMPLE_RATE: u32 = 48_000;

fn bench_synthesis(c: &mut Criterion) {
    for category in SoundCategory::ALL {
        let sound = SoundDescriptor::new("bench", category, 7).with_duration(1.0);
        c.bench_function(&format!("synth_{}_1sec", category.as_str()), |b| {
            b.iter(|| black_box(render_synth_buffer(&sound, SAMPLE_RATE)))
        });
    }
}

fn bench_render(c: &mut Criterion) {
    let catalog = Catalog::builtin();
    let (mut engine, handle) = TouchAudioEngine::offline(EngineConfig::offline(SAMPLE_RATE));
    let rain = catalog.get("ambient-rain").expect("builtin ambient");
    let brush = catalog.get("brush-soft").expect("builtin brush");
    engine.set_ambient_track(Some(rain), 0.3).expect("ambient");
    engine
        .update_stroke(&PlaybackRequest::drag(brush, AudioPosition::new(0.8, 0.2, -0.6), 400.0))
        .expect("stroke");

    c.bench_function("render_stroke_plus_ambient_10ms", |b| {
        b.iter(|| black_box(handle.render(480)))
    });
}

criterion_group!(benches, bench_synthesis, bench_render);
criterion_main!(benches);
