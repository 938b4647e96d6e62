use criterion::{criterion_group, criterion_main, Criterion, BenchmarkId, Throughput};
use task_pool::pool::{Config as PoolConfig, WorkerPool};
use std::{convert::Infallible, hint::black_box, time::Duration};


// Benchmark 1: submit + result_of
fn bench_submit_overhead(c: &mut Criterion) {
    let mut group = c.benchmark_group("submit_overhead");

    for size in [100, 1000, 10000] {
        group.throughput(Throughput::Elements(size as u64));

        // Сначала все submit, потом все result_of
        group.bench_with_input(
            BenchmarkId::new("submit_then_collect", size),
            &size,
            |b, &size| {
                let pool = WorkerPool::<u64>::with_config(PoolConfig::default()).unwrap();
                b.iter(|| {
                    let ids: Vec<_> = (0..size)
                        .map(|i| pool.submit(move || Ok::<_, Infallible>(black_box(i))).unwrap())
                        .collect();
                    for id in ids {
                        black_box(pool.result_of(id).unwrap());
                    }
                });
            },
        );

        // По одной задаче: latency полного круга
        group.bench_with_input(
            BenchmarkId::new("round_trip", size),
            &size,
            |b, &size| {
                let pool = WorkerPool::<u64>::with_config(PoolConfig::default()).unwrap();
                b.iter(|| {
                    for i in 0..size {
                        let id = pool.submit(move || Ok::<_, Infallible>(black_box(i))).unwrap();
                        black_box(pool.result_of(id).unwrap());
                    }
                });
            },
        );
    }

    group.finish();
}

// Benchmark 2: масштабирование по числу воркеров на CPU-bound задачах
fn bench_thread_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("thread_scaling");
    group.sample_size(20);

    let tasks = 256u64;
    group.throughput(Throughput::Elements(tasks));

    for workers in [1, 2, 4, num_cpus::get()] {
        group.bench_with_input(
            BenchmarkId::from_parameter(workers),
            &workers,
            |b, &workers| {
                let pool = WorkerPool::<u64>::with_config(PoolConfig::new(workers)).unwrap();
                b.iter(|| {
                    let ids: Vec<_> = (0..tasks)
                        .map(|i| {
                            pool.submit_with(
                                |n: u64| Ok::<_, Infallible>((1..=10_000u64).fold(n, |acc, k| acc.wrapping_mul(k) ^ k)),
                                i,
                            )
                            .unwrap()
                        })
                        .collect();
                    for id in ids {
                        black_box(pool.result_of(id).unwrap());
                    }
                });
            },
        );
    }

    group.finish();
}

// Benchmark 3: стоимость создания и остановки пула
fn bench_lifecycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("lifecycle");
    group.sample_size(10);

    group.bench_function("new_then_shutdown", |b| {
        b.iter(|| {
            let config = PoolConfig::new(num_cpus::get())
                .with_poll_interval(Duration::from_millis(10));
            let pool = WorkerPool::<u64>::with_config(config).unwrap();
            pool.shutdown();
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_submit_overhead,
    bench_thread_scaling,
    bench_lifecycle,
);

criterion_main!(benches);
