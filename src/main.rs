use num_bigint::BigUint;
use task_pool::{PoolError, WorkerPool};
use std::{
    thread,
    time::{Duration, Instant},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};


#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct RuntimeError(String);

fn corrupted_task() -> Result<BigUint, RuntimeError> {
    thread::sleep(Duration::from_secs(2));
    Err(RuntimeError("MSG".into()))
}

fn factorial(base: u64) -> Result<BigUint, RuntimeError> {
    Ok((2..=base).fold(BigUint::from(1u32), |acc, n| acc * n))
}

fn main() -> Result<(), PoolError> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "task_pool=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let now = Instant::now();
    WorkerPool::<BigUint>::scoped(task_pool::Config::from_env()?, |pool| -> Result<(), PoolError> {
        let id = pool.submit(corrupted_task)?;
        match pool.result_of(id) {
            Ok(value) => println!("unexpected result: {}", value),
            Err(err) => println!("Exception was raised: {} ({:?})", err, err.task_error()),
        }

        let ids = (0..50)
            .map(|_| pool.submit_with(factorial, 40_000))
            .collect::<Result<Vec<_>, _>>()?;
        for id in ids {
            let value = pool.result_of(id)?;
            tracing::debug!(%id, bits = value.bits(), "factorial collected");
        }
        println!("{:?}", pool.metrics());
        Ok(())
    })??;

    println!("elapsed: {:?}", now.elapsed());
    Ok(())
}
