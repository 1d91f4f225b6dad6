//! Worker budget: how many pages render at once

use std::num::NonZeroUsize;

use log::debug;

pub const GIB: u64 = 1024 * 1024 * 1024;

/// Memory reserved per concurrent worker unless configured otherwise
pub const DEFAULT_WORKER_ALLOWANCE: u64 = GIB / 2;

/// `max(1, min(cpu_count, available_memory / allowance))`
#[must_use]
pub fn compute(available_memory: u64, cpu_count: usize, allowance: u64) -> usize {
    let by_memory = available_memory / allowance.max(1);
    let by_memory = usize::try_from(by_memory).unwrap_or(usize::MAX);
    cpu_count.min(by_memory).max(1)
}

/// Live host metrics used to size a pool
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HostMetrics {
    pub cpu_count: usize,
    /// `None` when the platform gives no reading
    pub available_memory: Option<u64>,
}

impl HostMetrics {
    /// Read the current CPU count and available memory
    #[must_use]
    pub fn probe() -> Self {
        let cpu_count = std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);
        let metrics = Self {
            cpu_count,
            available_memory: available_memory(),
        };
        debug!("Host metrics: {metrics:?}");
        metrics
    }

    /// Worker count for the given per-worker allowance.
    /// Without a memory reading only the CPU count bounds it.
    #[must_use]
    pub fn worker_budget(&self, allowance: u64) -> usize {
        match self.available_memory {
            Some(memory) => compute(memory, self.cpu_count, allowance),
            None => self.cpu_count.max(1),
        }
    }
}

#[cfg(target_os = "linux")]
fn available_memory() -> Option<u64> {
    std::fs::read_to_string("/proc/meminfo")
        .ok()
        .and_then(|text| parse_meminfo_available(&text))
        .or_else(sysconf_available_memory)
}

#[cfg(not(target_os = "linux"))]
fn available_memory() -> Option<u64> {
    None
}

/// Free physical pages times page size. Lower than `MemAvailable`
/// because it ignores reclaimable cache.
#[cfg(target_os = "linux")]
fn sysconf_available_memory() -> Option<u64> {
    let pages = unsafe { libc::sysconf(libc::_SC_AVPHYS_PAGES) };
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if pages < 0 || page_size <= 0 {
        return None;
    }
    Some((pages as u64).saturating_mul(page_size as u64))
}

/// `MemAvailable` from `/proc/meminfo`, in bytes
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_meminfo_available(meminfo: &str) -> Option<u64> {
    meminfo.lines().find_map(|line| {
        let rest = line.strip_prefix("MemAvailable:")?;
        let mut parts = rest.split_whitespace();
        let value: u64 = parts.next()?.parse().ok()?;
        let multiplier = match parts.next() {
            Some("kB") | Some("KB") => 1024,
            Some("mB") | Some("MB") => 1024 * 1024,
            None => 1,
            Some(_) => return None,
        };
        Some(value.saturating_mul(multiplier))
    })
}
