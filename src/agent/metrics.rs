use std::fs;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

const PROC_STAT: &str = "/proc/stat";
const PROC_MEMINFO: &str = "/proc/meminfo";

/// Aggregate CPU counters from the first line of `/proc/stat`, in jiffies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuTimes {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

impl CpuTimes {
    /// Parse the aggregate `cpu ...` line.
    pub fn parse(line: &str) -> Option<Self> {
        let mut fields = line.split_whitespace();
        if fields.next()? != "cpu" {
            return None;
        }
        let values: Vec<u64> = fields
            .take(8)
            .map(|f| f.parse().ok())
            .collect::<Option<Vec<u64>>>()?;
        if values.len() < 8 {
            return None;
        }
        Some(Self {
            user: values[0],
            nice: values[1],
            system: values[2],
            idle: values[3],
            iowait: values[4],
            irq: values[5],
            softirq: values[6],
            steal: values[7],
        })
    }

    pub fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }

    /// Idle time including iowait.
    pub fn idle_total(&self) -> u64 {
        self.idle + self.iowait
    }
}

/// CPU% over the interval between two samples.
///
/// A zero total delta (no ticks elapsed) reports 0 rather than NaN, and
/// negative or non-finite results clamp to 0.
pub fn cpu_percent(prev: CpuTimes, current: CpuTimes) -> f64 {
    let total_delta = current.total().saturating_sub(prev.total());
    if total_delta == 0 {
        return 0.0;
    }
    let idle_delta = current.idle_total().saturating_sub(prev.idle_total());
    let usage = 100.0 * (1.0 - idle_delta as f64 / total_delta as f64);
    if usage.is_finite() && usage > 0.0 {
        usage
    } else {
        0.0
    }
}

/// Memory% from MemTotal/MemAvailable. A zero or unreadable total reports 0.
pub fn memory_percent(total_kb: u64, available_kb: u64) -> f64 {
    if total_kb == 0 {
        return 0.0;
    }
    let usage = 100.0 * (1.0 - available_kb as f64 / total_kb as f64);
    if usage.is_finite() && usage > 0.0 {
        usage
    } else {
        0.0
    }
}

/// Extract MemTotal and MemAvailable (in kB, verbatim kernel units).
pub fn parse_meminfo(contents: &str) -> (u64, u64) {
    let mut total = 0;
    let mut available = 0;
    for line in contents.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            total = parse_kb(rest);
        } else if let Some(rest) = line.strip_prefix("MemAvailable:") {
            available = parse_kb(rest);
        }
    }
    (total, available)
}

fn parse_kb(rest: &str) -> u64 {
    rest.split_whitespace()
        .next()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

/// Host metrics snapshot reported by `/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub total_memory: u64,
    pub available_memory: u64,
}

/// Samples host CPU and memory from the kernel pseudofiles.
///
/// CPU usage is computed from the delta between successive reads, so the
/// first sample always reports 0. The previous sample is sampler-scoped
/// state, not a global.
#[derive(Debug, Default)]
pub struct MetricsSampler {
    prev_cpu: Mutex<Option<CpuTimes>>,
}

impl MetricsSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a metrics snapshot. Unreadable pseudofiles report zeros.
    pub fn sample(&self) -> SystemMetrics {
        let cpu_usage = self.sample_cpu();
        let (total_memory, available_memory) = read_meminfo();
        SystemMetrics {
            cpu_usage,
            memory_usage: memory_percent(total_memory, available_memory),
            total_memory,
            available_memory,
        }
    }

    fn sample_cpu(&self) -> f64 {
        let Some(current) = read_cpu_times() else {
            return 0.0;
        };
        let mut prev = self.prev_cpu.lock().expect("cpu sampler lock poisoned");
        let usage = match *prev {
            Some(previous) => cpu_percent(previous, current),
            None => 0.0,
        };
        *prev = Some(current);
        usage
    }
}

fn read_cpu_times() -> Option<CpuTimes> {
    let contents = fs::read_to_string(PROC_STAT).ok()?;
    CpuTimes::parse(contents.lines().next()?)
}

fn read_meminfo() -> (u64, u64) {
    match fs::read_to_string(PROC_MEMINFO) {
        Ok(contents) => parse_meminfo(&contents),
        Err(_) => (0, 0),
    }
}
