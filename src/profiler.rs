use ahash::RandomState;
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct Section {
    samples: u64,
    total: Duration,
    min: Duration,
    max: Duration,
}

/// Wall-clock timing per named section.
///
/// Owned by whoever drives the miner and handed to it at construction; a
/// disabled profiler records nothing. Timings never influence mining.
#[derive(Debug, Clone)]
pub struct Profiler {
    enabled: bool,
    sections: HashMap<&'static str, Section, RandomState>,
    open: HashMap<&'static str, Instant, RandomState>,
    last_report: Instant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SectionReport {
    pub name: &'static str,
    pub samples: u64,
    pub total: Duration,
    pub min: Duration,
    pub max: Duration,
    /// Share of the `total` section's time, when one was recorded.
    pub percent: Option<f64>,
}

impl SectionReport {
    pub fn average(&self) -> Duration {
        if self.samples == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(self.total.as_secs_f64() / self.samples as f64)
        }
    }

    pub fn rate_per_sec(&self) -> f64 {
        let secs = self.total.as_secs_f64();
        if secs > 0.0 { self.samples as f64 / secs } else { 0.0 }
    }
}

impl fmt::Display for SectionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<16}: {:>9.3} s", self.name, self.total.as_secs_f64())?;
        if let Some(p) = self.percent {
            write!(f, " ({p:>6.2}%)")?;
        }
        write!(
            f,
            ", {:>10} samples, {:>8.4} ms/sample, {:>12.1}/s",
            self.samples,
            self.average().as_secs_f64() * 1000.0,
            self.rate_per_sec()
        )
    }
}

impl Default for Profiler {
    fn default() -> Self {
        Self::disabled()
    }
}

impl Profiler {
    pub fn enabled() -> Self {
        Self::with_state(true)
    }

    pub fn disabled() -> Self {
        Self::with_state(false)
    }

    fn with_state(enabled: bool) -> Self {
        Self {
            enabled,
            sections: HashMap::default(),
            open: HashMap::default(),
            last_report: Instant::now(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[inline]
    pub fn start_section(&mut self, name: &'static str) {
        if self.enabled {
            self.open.insert(name, Instant::now());
        }
    }

    /// Closes `name`. Ending a section that was never started is ignored.
    #[inline]
    pub fn end_section(&mut self, name: &'static str) {
        if !self.enabled {
            return;
        }
        let Some(started) = self.open.remove(name) else { return };
        let took = started.elapsed();
        let entry = self.sections.entry(name).or_insert(Section {
            samples: 0,
            total: Duration::ZERO,
            min: Duration::MAX,
            max: Duration::ZERO,
        });
        entry.samples += 1;
        entry.total += took;
        entry.min = entry.min.min(took);
        entry.max = entry.max.max(took);
    }

    pub fn samples(&self, name: &str) -> u64 {
        self.sections.get(name).map(|s| s.samples).unwrap_or(0)
    }

    /// Sections sorted by total time, longest first.
    pub fn report(&self) -> Vec<SectionReport> {
        let reference = self.sections.get("total").map(|s| s.total.as_secs_f64());
        let mut out: Vec<SectionReport> = self
            .sections
            .iter()
            .map(|(&name, s)| SectionReport {
                name,
                samples: s.samples,
                total: s.total,
                min: s.min,
                max: s.max,
                percent: reference.filter(|r| *r > 0.0).map(|r| s.total.as_secs_f64() / r * 100.0),
            })
            .collect();
        out.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.name.cmp(b.name)));
        out
    }

    pub fn log_report(&self) {
        for line in self.report() {
            tracing::info!("{line}");
        }
    }

    /// Logs the report when `interval` has elapsed since the previous one.
    pub fn report_if_due(&mut self, interval: Duration) {
        if !self.enabled || interval.is_zero() || self.last_report.elapsed() < interval {
            return;
        }
        self.log_report();
        self.last_report = Instant::now();
    }

    pub fn reset(&mut self) {
        self.sections.clear();
        self.open.clear();
        self.last_report = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_profiler_records_nothing() {
        let mut p = Profiler::disabled();
        p.start_section("total");
        p.end_section("total");
        assert!(p.report().is_empty());
    }

    #[test]
    fn enabled_profiler_counts_samples_and_resets() {
        let mut p = Profiler::enabled();
        for _ in 0..3 {
            p.start_section("total");
            p.start_section("mask");
            p.end_section("mask");
            p.end_section("total");
        }
        p.end_section("never_started");
        assert_eq!(p.samples("total"), 3);
        assert_eq!(p.samples("mask"), 3);
        let report = p.report();
        assert_eq!(report.len(), 2);
        assert!(report.iter().all(|r| r.percent.is_some()));
        p.reset();
        assert!(p.report().is_empty());
    }
}
