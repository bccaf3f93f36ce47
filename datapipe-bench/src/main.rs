//! Benchmark runner for the pipeline iterator engine

use anyhow::Result;

use datapipe_bench::{
    bench_reshape_slice_repeat, bench_slice_batch_cache_repeat, bench_slice_repeat_batch,
    bench_slice_repeat_sparse, BenchConfig, BenchResult,
};

fn print_result(result: &BenchResult) {
    println!("\nBenchmark: {}", result.name);
    println!("  Elements:     {}", result.num_elements);
    println!("  Total time:   {:?}", result.total_time);
    println!("  Average time: {:?}", result.avg_time);
    println!("  Min time:     {:?}", result.min_time);
    println!("  Max time:     {:?}", result.max_time);
    println!("  Throughput:   {:.2} elements/sec", result.throughput);
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    println!("=== Pipeline Iterator Benchmarks ===");

    let config = BenchConfig::default();

    print_result(&bench_slice_repeat_batch(&config)?);
    print_result(&bench_reshape_slice_repeat(&config)?);
    print_result(&bench_slice_batch_cache_repeat(&config)?);

    println!("\n=== Sparse Slice Grid ===");
    for result in bench_slice_repeat_sparse(&config)? {
        print_result(&result);
    }

    Ok(())
}
