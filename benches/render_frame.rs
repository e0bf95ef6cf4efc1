//! Tick benchmarks at 720p.
//! Run: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use crt_reveal::crt::{CrtPipeline, EffectContext, EffectParams};
use crt_reveal::engine::{Engine, EngineConfig};
use crt_reveal::frame::FrameBuffer;
use crt_reveal::glyphs::BitmapGlyphs;
use crt_reveal::noise::XorShift64;
use crt_reveal::schema::Script;
use crt_reveal::timeline::Phase;

fn bench_engine_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("render_frame");
    group.sample_size(30);

    group.bench_function("tick_720p_poem", |b| {
        let mut engine = Engine::new(
            Script::default(),
            Box::new(BitmapGlyphs::new()),
            EngineConfig::default(),
            0,
        )
        .expect("engine");
        // Far enough in that the title, greeting and a poem line are on screen.
        let mut now = 0;
        while engine.phase() < Phase::Poem {
            now += 33;
            engine.tick(now);
        }
        b.iter(|| black_box(engine.tick(now)));
    });

    group.bench_function("crt_pipeline_720p_crazy", |b| {
        let mut buffer = FrameBuffer::new(1280, 720);
        let mut pipeline = CrtPipeline::new();
        let mut rng = XorShift64::from_seed(7);
        let ctx = EffectContext {
            time: 1.0,
            phase: Phase::Signature,
            shake: (0, 0),
        };
        b.iter(|| {
            pipeline.apply(&mut buffer, &EffectParams::CRAZY, &ctx, &mut rng);
            black_box(buffer.pixels()[0])
        });
    });

    group.finish();
}

criterion_group!(benches, bench_engine_tick);
criterion_main!(benches);
