//! Styled console output
//!
//! Human-facing messages go to stdout (errors to stderr) through `console`
//! styling. Tracing output is separate and always goes to stderr.

use console::style;

use crate::experiment::{DemoOutcome, ExperimentReport};

/// Output handler for consistent CLI formatting
pub struct Output {
    verbose: bool,
    quiet: bool,
}

impl Output {
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self { verbose, quiet }
    }

    pub fn success(&self, message: &str) {
        if !self.quiet {
            println!("{} {}", style("✔").green(), message);
        }
    }

    /// Errors are shown even in quiet mode
    pub fn error(&self, message: &str) {
        eprintln!("{} {}", style("✖").red(), message);
    }

    pub fn warning(&self, message: &str) {
        if !self.quiet {
            println!("{} {}", style("⚠").yellow(), message);
        }
    }

    pub fn info(&self, message: &str) {
        if !self.quiet {
            println!("{} {}", style("ℹ").blue(), message);
        }
    }

    /// Print a verbose message (only if verbose mode is enabled)
    pub fn verbose(&self, message: &str) {
        if self.verbose && !self.quiet {
            println!("{} {}", style("ℹ").dim(), style(message).dim());
        }
    }

    pub fn header(&self, title: &str) {
        if !self.quiet {
            println!("\n{}", style(title).bold().underlined());
        }
    }

    pub fn step(&self, step: &str) {
        if !self.quiet {
            println!("{} {}", style("❯").cyan(), step);
        }
    }

    pub fn key_value(&self, key: &str, value: &str, highlight: bool) {
        if !self.quiet {
            let styled_value = if highlight {
                style(value).green().bold()
            } else {
                style(value).white()
            };
            println!("  {:<22} {}", style(key).dim(), styled_value);
        }
    }

    pub fn status_indicator(&self, status: &str, message: &str, is_success: bool) {
        if !self.quiet {
            let (icon, color) = if is_success {
                ("✓", style(status).green())
            } else {
                ("✗", style(status).red())
            };
            println!("{} {} {}", style(icon).bold(), color.bold(), message);
        }
    }

    pub fn blank_line(&self) {
        if !self.quiet {
            println!();
        }
    }

    pub fn separator(&self) {
        if !self.quiet {
            println!("{}", style("─".repeat(60)).dim());
        }
    }

    /// One experiment, as printed while a run progresses.
    pub fn experiment(&self, report: &ExperimentReport) {
        let verdict = if report.failed > 0 {
            format!("{} failed", report.failed)
        } else if report.is_consistent() {
            "consistent".to_string()
        } else {
            "RACE".to_string()
        };
        self.status_indicator(
            &format!("{:<26}", report.name),
            &format!(
                "{:>8.3}s {:>9.1} items/s  contention {:.3}  [{}]",
                report.total_time.as_secs_f64(),
                report.throughput,
                report.contention_ratio,
                verdict
            ),
            report.failed == 0 && report.is_consistent(),
        );

        if self.verbose {
            if let Some(counter) = report.counter {
                self.key_value(
                    "counter",
                    &format!("{}/{} ({} lost)", counter.observed, counter.expected, counter.lost),
                    counter.lost == 0,
                );
            }
            self.key_value("log", &report.log.to_string(), report.log.is_clean());
            if let Some(lock) = report.lock {
                self.key_value(
                    "lock",
                    &format!(
                        "{} acquisitions, {} contended, avg wait {:?}, max wait {:?}",
                        lock.acquisitions,
                        lock.contended,
                        lock.avg_wait(),
                        lock.max_wait
                    ),
                    false,
                );
            }
            for error in &report.errors {
                self.key_value("error", error, false);
            }
        }
    }

    pub fn demo(&self, outcome: &DemoOutcome) {
        let clean = outcome.anomalies == 0;
        self.status_indicator(
            &format!("{:<24}", outcome.name),
            &format!(
                "expected {:>6}  observed {:>6}  anomalies {:>5}  contention {:.3}",
                outcome.expected, outcome.observed, outcome.anomalies, outcome.contention_ratio
            ),
            clean,
        );
        if self.verbose
            && let Some(lock) = outcome.lock
        {
            self.key_value(
                "wait",
                &format!(
                    "total {:?}, max {:?}, peak holders {}",
                    lock.wait_total, lock.max_wait, lock.peak_holders
                ),
                false,
            );
        }
    }
}
