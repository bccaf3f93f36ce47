//! Throughput benchmarks for the pipeline iterator engine
//!
//! Each scenario builds a dataset description once and then times full
//! iterator passes over it, pulling a fixed number of elements per pass.
//! The pipelines mirror the classic slice/repeat/batch/cache/sparse
//! workloads used to exercise input-pipeline engines.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use rand::Rng;
use tracing::debug;

use datapipe_core::{get_single_element, Dataset, SparseTensor, Tensor, TensorType};

/// Benchmark configuration
pub struct BenchConfig {
    /// Number of input values sliced into per-element tensors
    pub input_size: usize,

    /// Batch size for the batching scenarios
    pub batch_size: usize,

    /// Number of repeat passes built into the pipelines
    pub num_epochs: u64,

    /// Number of timed iterations
    pub iterations: usize,

    /// Warmup iterations excluded from timing
    pub warmup_iterations: usize,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            input_size: 10_000,
            batch_size: 100,
            num_epochs: 100,
            iterations: 5,
            warmup_iterations: 1,
        }
    }
}

/// Benchmark result
#[derive(Debug, Clone)]
pub struct BenchResult {
    /// Name of the benchmark
    pub name: String,

    /// Elements pulled per timed iteration
    pub num_elements: usize,

    /// Total time across timed iterations
    pub total_time: Duration,

    /// Average time per iteration
    pub avg_time: Duration,

    /// Min time per iteration
    pub min_time: Duration,

    /// Max time per iteration
    pub max_time: Duration,

    /// Throughput (elements/second)
    pub throughput: f64,
}

/// Pull up to `num_elements` elements from a fresh iterator over `dataset`
///
/// Bounding the pull count is what terminates the infinite pipelines; finite
/// pipelines may exhaust earlier, and the number actually pulled is
/// returned.
pub fn drive<T: TensorType>(dataset: &Dataset<T>, num_elements: usize) -> Result<usize> {
    let mut iter = dataset.iter();
    let mut pulled = 0;
    while pulled < num_elements {
        match iter.next().context("pipeline failed mid-iteration")? {
            Some(_) => pulled += 1,
            None => break,
        }
    }
    Ok(pulled)
}

/// Time repeated full passes over a dataset
pub fn run_benchmark<T: TensorType>(
    name: &str,
    config: &BenchConfig,
    dataset: &Dataset<T>,
    num_elements: usize,
) -> Result<BenchResult> {
    debug!(name, num_elements, iterations = config.iterations, "running benchmark");
    for _ in 0..config.warmup_iterations {
        drive(dataset, num_elements)?;
    }

    let mut times = Vec::with_capacity(config.iterations);
    let start_total = Instant::now();
    for _ in 0..config.iterations {
        let start = Instant::now();
        drive(dataset, num_elements)?;
        times.push(start.elapsed());
    }
    let total_time = start_total.elapsed();

    let avg_time = total_time / config.iterations.max(1) as u32;
    let min_time = times.iter().min().copied().unwrap_or_default();
    let max_time = times.iter().max().copied().unwrap_or_default();
    let throughput =
        (config.iterations * num_elements) as f64 / total_time.as_secs_f64().max(f64::EPSILON);

    Ok(BenchResult {
        name: name.to_string(),
        num_elements,
        total_time,
        avg_time,
        min_time,
        max_time,
        throughput,
    })
}

/// Generate a flat vector of random input values
///
/// The engine never generates data itself; the harness supplies it.
pub fn random_input(len: usize) -> Vec<f64> {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

/// slice -> repeat -> batch over a large random vector
pub fn bench_slice_repeat_batch(config: &BenchConfig) -> Result<BenchResult> {
    let input = Tensor::from_vec(random_input(config.input_size), vec![config.input_size])?;
    let dataset = Dataset::from_tensor_slices(input)
        .repeat(config.num_epochs)
        .batch(config.batch_size)?;

    let num_elements =
        config.input_size * config.num_epochs as usize / config.batch_size;
    run_benchmark(
        &format!(
            "slice_repeat_batch_input_{}_batch_{}",
            config.input_size, config.batch_size
        ),
        config,
        &dataset,
        num_elements,
    )
}

/// reshape to a matrix, then slice -> repeat over its rows
pub fn bench_reshape_slice_repeat(config: &BenchConfig) -> Result<BenchResult> {
    let side = (config.input_size as f64).sqrt() as usize;
    let input = Tensor::from_vec(random_input(side * side), vec![side * side])?
        .reshape(vec![side, side])?;
    let dataset = Dataset::from_tensor_slices(input).repeat(config.num_epochs);

    let num_elements = config.num_epochs as usize * side;
    run_benchmark(
        &format!("reshape_slice_repeat_input_{}", config.input_size),
        config,
        &dataset,
        num_elements,
    )
}

/// Sparse rows batched via get_single_element, then sliced apart endlessly
///
/// Covers the nnz-per-row / row-count grid: each cell batches `num_rows`
/// copies of one sparse row, extracts the batched tensor, and drives an
/// infinite flat_map(slices) pipeline over it.
pub fn bench_slice_repeat_sparse(config: &BenchConfig) -> Result<Vec<BenchResult>> {
    let non_zeros_per_row_values = [0, 1, 5, 10, 100];
    let num_rows_values = [32, 64, 128, 1024];
    let num_elements = 100_000;

    let mut results = Vec::new();
    for &non_zeros_per_row in &non_zeros_per_row_values {
        let row = SparseTensor::new(
            (0..non_zeros_per_row).collect(),
            (0..non_zeros_per_row as i64).collect(),
            vec![1000],
        )?;

        for &num_rows in &num_rows_values {
            let batched = Dataset::from_sparse(row.clone())
                .repeat(num_rows as u64)
                .batch(num_rows)?;
            let batched_tensor = get_single_element(&batched)?;

            let dataset = Dataset::from_element(batched_tensor)
                .flat_map(|element| Ok(Dataset::from_element(element).slices()))
                .repeat_forever();

            results.push(run_benchmark(
                &format!(
                    "slice_repeat_sparse_elements_per_row_{non_zeros_per_row}_num_rows_{num_rows}"
                ),
                config,
                &dataset,
                num_elements,
            )?);
        }
    }

    Ok(results)
}

/// slice -> batch -> cache -> repeat; epochs after the first replay the cache
pub fn bench_slice_batch_cache_repeat(config: &BenchConfig) -> Result<BenchResult> {
    let input = Tensor::from_vec(random_input(config.input_size), vec![config.input_size])?;
    let dataset = Dataset::from_tensor_slices(input)
        .batch(config.batch_size)?
        .cache()
        .repeat(config.num_epochs);

    let num_elements =
        config.input_size * config.num_epochs as usize / config.batch_size;
    run_benchmark(
        &format!(
            "slice_batch_cache_repeat_input_{}_batch_{}",
            config.input_size, config.batch_size
        ),
        config,
        &dataset,
        num_elements,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drive_stops_at_exhaustion() {
        let tensor = Tensor::from_vec(vec![1.0_f64, 2.0, 3.0], vec![3]).unwrap();
        let dataset = Dataset::from_tensor_slices(tensor);
        assert_eq!(drive(&dataset, 10).unwrap(), 3);
        assert_eq!(drive(&dataset, 2).unwrap(), 2);
    }

    #[test]
    fn test_scenarios_produce_expected_counts() {
        let config = BenchConfig {
            input_size: 100,
            batch_size: 10,
            num_epochs: 3,
            iterations: 1,
            warmup_iterations: 0,
        };

        let result = bench_slice_repeat_batch(&config).unwrap();
        assert_eq!(result.num_elements, 30);

        let result = bench_slice_batch_cache_repeat(&config).unwrap();
        assert_eq!(result.num_elements, 30);

        let result = bench_reshape_slice_repeat(&config).unwrap();
        assert_eq!(result.num_elements, 30);
    }
}
