//! Best-effort process resource sampling.
//!
//! The sampler locates the OS process backing a service by command-line
//! match and reports CPU and memory percentages. Every failure mode
//! (process missing, permission denied, unreadable procfs) degrades to
//! zero values; nothing here may propagate an error into the probe
//! pipeline.

use std::collections::HashMap;
use std::fs;
use std::sync::Mutex;

use async_trait::async_trait;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResourceUsage {
    pub cpu_percent: f64,
    pub memory_percent: f64,
}

#[async_trait]
pub trait ResourceSampler: Send + Sync {
    /// Sample CPU%/memory% for the process matching `pattern`.
    async fn sample(&self, pattern: &str) -> ResourceUsage;
}

/// Zero-returning sampler for tests and platforms without procfs.
pub struct NoopSampler;

#[async_trait]
impl ResourceSampler for NoopSampler {
    async fn sample(&self, _pattern: &str) -> ResourceUsage {
        ResourceUsage::default()
    }
}

/// CPU tick snapshot used for delta-based utilization.
struct CpuSample {
    pid: u32,
    proc_ticks: u64,
    total_ticks: u64,
}

/// Procfs-backed sampler. CPU utilization is computed from tick deltas
/// between consecutive samples, so the first sample for a process
/// reports 0.0.
pub struct ProcfsSampler {
    cpu_count: f64,
    samples: Mutex<HashMap<String, CpuSample>>,
}

impl ProcfsSampler {
    pub fn new() -> Self {
        Self {
            cpu_count: num_cpus::get() as f64,
            samples: Mutex::new(HashMap::new()),
        }
    }

    fn sample_sync(&self, pattern: &str) -> Option<ResourceUsage> {
        let pid = find_pid(pattern)?;
        let proc_ticks = read_process_ticks(pid)?;
        let total_ticks = read_total_ticks()?;
        let memory_percent = read_memory_percent(pid).unwrap_or(0.0);

        let mut samples = self.samples.lock().ok()?;
        let cpu_percent = match samples.get(pattern) {
            // A changed pid means the process restarted; the old delta
            // baseline is meaningless.
            Some(prev)
                if prev.pid == pid
                    && total_ticks > prev.total_ticks
                    && proc_ticks >= prev.proc_ticks =>
            {
                (proc_ticks - prev.proc_ticks) as f64 / (total_ticks - prev.total_ticks) as f64
                    * self.cpu_count
                    * 100.0
            }
            _ => 0.0,
        };
        samples.insert(
            pattern.to_string(),
            CpuSample {
                pid,
                proc_ticks,
                total_ticks,
            },
        );

        Some(ResourceUsage {
            cpu_percent,
            memory_percent,
        })
    }
}

impl Default for ProcfsSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceSampler for ProcfsSampler {
    async fn sample(&self, pattern: &str) -> ResourceUsage {
        self.sample_sync(pattern).unwrap_or_default()
    }
}

/// Scan /proc for the first process whose command line (or comm name)
/// contains `pattern`.
fn find_pid(pattern: &str) -> Option<u32> {
    let entries = fs::read_dir("/proc").ok()?;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(pid) = name.to_str().and_then(|s| s.parse::<u32>().ok()) else {
            continue;
        };

        let cmdline_path = format!("/proc/{}/cmdline", pid);
        if let Ok(raw) = fs::read(&cmdline_path) {
            let cmdline = String::from_utf8_lossy(&raw).replace('\0', " ");
            if cmdline.contains(pattern) {
                return Some(pid);
            }
        }
        let comm_path = format!("/proc/{}/comm", pid);
        if let Ok(comm) = fs::read_to_string(&comm_path) {
            if comm.trim().contains(pattern) {
                return Some(pid);
            }
        }
    }
    None
}

/// utime + stime from /proc/<pid>/stat. The comm field may contain
/// spaces, so parsing starts after the closing paren.
fn read_process_ticks(pid: u32) -> Option<u64> {
    let stat = fs::read_to_string(format!("/proc/{}/stat", pid)).ok()?;
    let after_comm = &stat[stat.rfind(')')? + 1..];
    let fields: Vec<&str> = after_comm.split_whitespace().collect();
    // Fields here start at state (field 3 of the full line); utime and
    // stime are fields 14 and 15.
    let utime: u64 = fields.get(11)?.parse().ok()?;
    let stime: u64 = fields.get(12)?.parse().ok()?;
    Some(utime + stime)
}

/// Sum of the aggregate cpu line of /proc/stat.
fn read_total_ticks() -> Option<u64> {
    let stat = fs::read_to_string("/proc/stat").ok()?;
    let line = stat.lines().next()?;
    if !line.starts_with("cpu ") {
        return None;
    }
    let total = line
        .split_whitespace()
        .skip(1)
        .filter_map(|v| v.parse::<u64>().ok())
        .sum();
    Some(total)
}

/// VmRSS of the process as a percentage of MemTotal.
fn read_memory_percent(pid: u32) -> Option<f64> {
    let status = fs::read_to_string(format!("/proc/{}/status", pid)).ok()?;
    let rss_kb = parse_kb_line(&status, "VmRSS:")?;

    let meminfo = fs::read_to_string("/proc/meminfo").ok()?;
    let total_kb = parse_kb_line(&meminfo, "MemTotal:")?;
    if total_kb == 0 {
        return None;
    }
    Some(rss_kb as f64 / total_kb as f64 * 100.0)
}

fn parse_kb_line(text: &str, key: &str) -> Option<u64> {
    text.lines()
        .find(|line| line.starts_with(key))?
        .split_whitespace()
        .nth(1)?
        .parse()
        .ok()
}
