use std::sync::Mutex;

/// Point-in-time host utilization, in percent.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResourceUsage {
    pub memory_percent: f64,
    pub cpu_percent: f64,
}

/// Source of host utilization samples.
///
/// Implementations must not fail: when the host cannot be read they return a
/// zero or last-known value.
pub trait ResourceSampler: Send + Sync {
    fn sample(&self) -> ResourceUsage;
}

/// Always reports the same usage. Useful where host state is irrelevant.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedSampler(pub ResourceUsage);

impl ResourceSampler for FixedSampler {
    fn sample(&self) -> ResourceUsage {
        self.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct CpuTimes {
    busy: u64,
    total: u64,
}

#[derive(Default)]
struct ProcState {
    last: ResourceUsage,
    cpu: Option<CpuTimes>,
}

/// Samples system memory and CPU usage from `/proc`.
///
/// - memory: `(MemTotal - MemAvailable) / MemTotal` from `/proc/meminfo`
/// - cpu: busy share of jiffies elapsed since the previous sample, from the
///   aggregate `cpu` line of `/proc/stat`; the first sample reports 0
///
/// On other platforms, or when a file cannot be parsed, the last known value
/// is returned.
#[derive(Default)]
pub struct ProcSampler {
    state: Mutex<ProcState>,
}

impl ProcSampler {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_memory() -> Option<f64> {
        if !cfg!(target_os = "linux") {
            return None;
        }
        let content = std::fs::read_to_string("/proc/meminfo").ok()?;
        parse_meminfo(&content)
    }

    fn read_cpu() -> Option<CpuTimes> {
        if !cfg!(target_os = "linux") {
            return None;
        }
        let content = std::fs::read_to_string("/proc/stat").ok()?;
        parse_cpu_times(&content)
    }
}

impl ResourceSampler for ProcSampler {
    fn sample(&self) -> ResourceUsage {
        let memory = Self::read_memory();
        let cpu_times = Self::read_cpu();

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(memory) = memory {
            state.last.memory_percent = memory;
        }
        if let Some(current) = cpu_times {
            state.last.cpu_percent = match state.cpu {
                Some(previous) => cpu_percent(previous, current),
                None => 0.0,
            };
            state.cpu = Some(current);
        }
        state.last
    }
}

fn parse_meminfo(content: &str) -> Option<f64> {
    let field = |name: &str| -> Option<f64> {
        content
            .lines()
            .find(|line| line.starts_with(name))?
            .split_whitespace()
            .nth(1)?
            .parse()
            .ok()
    };
    let total = field("MemTotal:")?;
    let available = field("MemAvailable:")?;
    if total <= 0.0 {
        return None;
    }
    Some(((total - available) / total * 100.0).clamp(0.0, 100.0))
}

// user nice system idle iowait irq softirq steal ...
fn parse_cpu_times(content: &str) -> Option<CpuTimes> {
    let line = content.lines().find(|line| line.starts_with("cpu "))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .take(8)
        .map(|v| v.parse().ok())
        .collect::<Option<_>>()?;
    if fields.len() < 4 {
        return None;
    }
    let total: u64 = fields.iter().sum();
    let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
    Some(CpuTimes {
        busy: total.saturating_sub(idle),
        total,
    })
}

fn cpu_percent(previous: CpuTimes, current: CpuTimes) -> f64 {
    let total = current.total.saturating_sub(previous.total);
    if total == 0 {
        return 0.0;
    }
    let busy = current.busy.saturating_sub(previous.busy);
    (busy as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}
