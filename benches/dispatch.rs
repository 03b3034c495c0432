/// Benchmarks for dispatch of chunked requests.
use activestorage::active::EmulatedActiveStorage;
use activestorage::array::RawArray;
use activestorage::config::Config;
use activestorage::dispatcher::Dispatcher;
use activestorage::models::{ChunkHint, DType, MaskSpec, Mode, Selection, VariableRef};
use activestorage::scheduler::InlineScheduler;
use activestorage::source::memory::MemorySource;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;

fn get_dispatcher(source: Arc<MemorySource>, config: &Config) -> Dispatcher {
    let dispatcher = Dispatcher::new(source.clone(), config);
    let active = EmulatedActiveStorage::new(
        source,
        dispatcher.resource_manager().clone(),
        config.use_rayon,
    );
    dispatcher.with_active_storage(Arc::new(active))
}

fn criterion_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let size = 1024 * 1024;
    let data: Vec<f32> = (0..size).map(|i| (i % 1000) as f32).collect();
    let source = Arc::new(MemorySource::new().with_variable(
        "/data",
        "tas",
        RawArray::from_elements(DType::Float32, vec![size], &data),
    ));
    let variable = VariableRef::new("/data", "tas", DType::Float32, vec![size]);
    for use_rayon in [false, true] {
        let config = Config {
            use_rayon,
            ..Config::default()
        };
        let dispatchers = [
            ("tokio", get_dispatcher(source.clone(), &config)),
            (
                "inline",
                get_dispatcher(source.clone(), &config).with_scheduler(Arc::new(InlineScheduler)),
            ),
        ];
        for (scheduler, dispatcher) in dispatchers.iter() {
            for mode in [Mode::Local, Mode::Active] {
                for parts in [1, 4, 16, 64] {
                    let hint = ChunkHint::Split(parts);
                    let name = format!(
                        "dispatch(mean, {}, {}, rayon={}, {} chunks)",
                        mode, scheduler, use_rayon, parts
                    );
                    c.bench_function(&name, |b| {
                        b.to_async(&runtime).iter(|| async {
                            dispatcher
                                .request(
                                    black_box(&variable),
                                    &Selection::All,
                                    "mean",
                                    &MaskSpec::None,
                                    mode,
                                    &hint,
                                )
                                .unwrap()
                                .materialize()
                                .await
                                .unwrap()
                        })
                    });
                }
            }
        }
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
