//! Batch result accounting and the end-of-run summary.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: Vec<(PathBuf, String)>,
}

impl BatchResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn success(&mut self) {
        self.total += 1;
        self.succeeded += 1;
    }

    pub fn fail(&mut self, path: PathBuf, error: String) {
        self.total += 1;
        self.failed += 1;
        self.errors.push((path, error));
    }

    pub fn skip(&mut self) {
        self.total += 1;
        self.skipped += 1;
    }

    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.succeeded as f64 / self.total as f64) * 100.0
        }
    }
}

pub fn print_summary_report(result: &BatchResult, duration: Duration, operation_name: &str) {
    println!();
    println!("╔══════════════════════════════════════════════╗");
    println!("║        📊 {:<34}║", format!("{operation_name} Summary"));
    println!("╠══════════════════════════════════════════════╣");
    println!("║  📁 Files Processed:               {:>6}    ║", result.total);
    println!("║  ✅ Succeeded:                     {:>6}    ║", result.succeeded);
    println!("║  ❌ Failed:                        {:>6}    ║", result.failed);
    println!("║  ⏭️  Skipped:                      {:>6}    ║", result.skipped);
    println!("║  📈 Success Rate:                 {:>5.1}%    ║", result.success_rate());
    println!("║  ⏱️  Total Time:                  {:>6.1}s    ║", duration.as_secs_f64());
    println!("╚══════════════════════════════════════════════╝");

    if !result.errors.is_empty() {
        println!();
        println!("❌ Errors encountered:");
        for (path, error) in &result.errors {
            println!("   {} → {}", path.display(), error);
        }
    }
}
