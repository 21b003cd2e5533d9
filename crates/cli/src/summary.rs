//! Run summary printed after shutdown.

use dispatcher::{RunSummary, WorkerExit};

/// Print detailed summary
pub fn print_summary(summary: &RunSummary) {
    println!("\n=== Fan-out Summary ===\n");

    let source = &summary.source;
    println!("Source");
    println!("   ├─ Items dequeued: {}", source.dequeued_count);
    println!("   ├─ Empty polls: {}", source.empty_polls);
    println!("   ├─ Queue retries: {}", source.queue_retries);
    println!("   └─ Broadcasts cut by stop: {}", source.broadcasts_cancelled);

    if !summary.sinks.is_empty() {
        println!("\nSinks ({})", summary.sinks.len());
        for (name, metrics) in &summary.sinks {
            println!(
                "   ├─ {}: delivered={} failed={} retried={} dropped={}",
                name,
                metrics.delivered_count,
                metrics.failure_count,
                metrics.retry_count,
                metrics.dropped_count
            );
        }
    }

    println!("\nWorkers");
    for worker in &summary.workers.workers {
        let mark = match worker.exit {
            WorkerExit::Clean => "✓",
            WorkerExit::Failed(_) | WorkerExit::Panicked(_) => "✗",
        };
        match &worker.latency {
            Some(latency) => println!(
                "   {} {} {} ({}) latency_ms: {}",
                mark, worker.role, worker.name, worker.exit, latency
            ),
            None => println!("   {} {} {} ({})", mark, worker.role, worker.name, worker.exit),
        }
    }

    println!();
}
