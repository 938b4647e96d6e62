#[cfg(test)]
mod tests {
    use task_pool::{
        errors::PoolError,
        pool::{Config, WorkerPool},
    };
    use num_bigint::BigUint;
    use std::{
        convert::Infallible,
        sync::Arc,
        thread,
        time::{Duration, Instant},
    };

    fn measure<F, T>(name: &str, f: F) -> T
    where
        F: FnOnce() -> T,
    {
        let start = Instant::now();
        let result = f();
        let elapsed = start.elapsed();
        println!("✓ {}: {:?}", name, elapsed);
        result
    }

    fn factorial(n: u64) -> Result<BigUint, Infallible> {
        Ok((2..=n).fold(BigUint::from(1u32), |acc, k| acc * k))
    }

    #[test]
    fn load_test_1_factorials() {
        println!("\n=== LOAD TEST 1: 50 x factorial(40000) ===");
        let pool = WorkerPool::<BigUint>::with_config(Config::default()).unwrap();

        let ids: Vec<_> = (0..50)
            .map(|_| pool.submit_with(factorial, 40_000).unwrap())
            .collect();

        let expected = factorial(40_000).unwrap();
        let decimal = expected.to_string();
        assert_eq!(decimal.len(), 166_714);
        assert_eq!(decimal.len() - decimal.trim_end_matches('0').len(), 9_998);

        let results: Vec<_> = measure("50 factorials", || {
            ids.into_iter().map(|id| pool.result_of(id).unwrap()).collect()
        });

        assert_eq!(results.len(), 50);
        assert!(results.iter().all(|r| *r == expected), "все результаты равны 40000!");
        println!("  Воркеров: {}", pool.worker_count());
    }

    #[test]
    fn load_test_2_concurrent_submitters() {
        println!("\n=== LOAD TEST 2: 4 потока x 2500 задач ===");
        let pool = Arc::new(WorkerPool::<u64>::with_config(Config::io_bound()).unwrap());

        measure("10k tasks from 4 threads", || {
            let submitters: Vec<_> = (0..4u64)
                .map(|t| {
                    let pool = pool.clone();
                    thread::spawn(move || {
                        let ids: Vec<_> = (0..2_500u64)
                            .map(|i| {
                                let n = t * 10_000 + i;
                                pool.submit(move || Ok::<_, Infallible>(n * 2)).unwrap()
                            })
                            .collect();
                        for (i, id) in ids.into_iter().enumerate() {
                            let n = t * 10_000 + i as u64;
                            assert_eq!(pool.result_of(id).unwrap(), n * 2);
                        }
                    })
                })
                .collect();
            for submitter in submitters {
                submitter.join().unwrap();
            }
        });

        let metrics = pool.metrics();
        assert_eq!(metrics.total_submitted, 10_000);
        assert_eq!(metrics.completed_tasks, 10_000);
        assert_eq!(metrics.unclaimed_results, 0);
        println!("  Success rate: {:.1}%", metrics.success_rate() * 100.0);
    }

    #[test]
    fn load_test_3_completion_order() {
        println!("\n=== LOAD TEST 3: Порядок завершения ===");
        let pool = WorkerPool::<&'static str>::with_config(Config::new(2)).unwrap();

        let slow = pool
            .submit(|| {
                thread::sleep(Duration::from_millis(300));
                Ok::<_, Infallible>("slow")
            })
            .unwrap();
        let fast = pool.submit(|| Ok::<_, Infallible>("fast")).unwrap();

        assert_eq!(pool.result_of(fast).unwrap(), "fast");
        assert!(!pool.is_done(slow).unwrap(), "короткая задача завершилась раньше длинной");
        assert_eq!(pool.result_of(slow).unwrap(), "slow");
        println!("  ✓ Порядок завершения не равен порядку отправки");
    }

    #[test]
    fn load_test_4_mixed_failures() {
        println!("\n=== LOAD TEST 4: 2k задач, каждая десятая падает ===");
        let pool = WorkerPool::<usize>::with_config(Config::cpu_bound().with_max_pending(4_096)).unwrap();

        let ids: Vec<_> = (0..2_000usize)
            .map(|i| {
                pool.submit(move || {
                    if i % 10 == 0 {
                        Err(format!("failure {}", i))
                    } else {
                        Ok(i)
                    }
                })
                .unwrap()
            })
            .collect();

        let (ok, failed) = measure("2k mixed tasks", || {
            ids.into_iter().enumerate().fold((0, 0), |(ok, failed), (i, id)| {
                match pool.result_of(id) {
                    Ok(value) => {
                        assert_eq!(value, i);
                        (ok + 1, failed)
                    }
                    Err(PoolError::TaskFailed { source, .. }) => {
                        assert_eq!(source.cause().map(|c| c.to_string()), Some(format!("failure {}", i)));
                        (ok, failed + 1)
                    }
                    Err(other) => panic!("неожиданная ошибка {:?}", other),
                }
            })
        });

        assert_eq!(ok, 1_800);
        assert_eq!(failed, 200);
        assert_eq!(pool.live_workers(), pool.worker_count());
        println!("  Успешно: {}, с ошибкой: {}", ok, failed);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn load_test_5_async_unordered() {
        println!("\n=== LOAD TEST 5: 5k задач через results_unordered ===");
        let pool = WorkerPool::<u64>::with_config(Config::default()).unwrap();

        let ids: Vec<_> = (0..5_000u64)
            .map(|i| pool.submit(move || Ok::<_, Infallible>(i % 7)).unwrap())
            .collect();

        let start = Instant::now();
        let results = pool.results_unordered(ids).await;
        println!("✓ 5k unordered: {:?}", start.elapsed());

        assert_eq!(results.len(), 5_000);
        let total: u64 = results.into_iter().map(|(_, r)| r.unwrap()).sum();
        assert_eq!(total, (0..5_000u64).map(|i| i % 7).sum::<u64>());
    }
}
