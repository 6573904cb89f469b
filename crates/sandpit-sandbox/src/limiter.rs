//! Resource ceilings for an execution unit
//!
//! | Ceiling | Thread scope | Process scope |
//! |---------|--------------|---------------|
//! | memory  | interpreter heap ceiling | heap ceiling + `RLIMIT_AS` |
//! | CPU     | thread CPU clock, checked by the counter | `RLIMIT_CPU` |
//! | processes | not grantable from the namespace | `RLIMIT_NPROC` 0 |
//! | files   | not grantable from the namespace | `RLIMIT_FSIZE` 0 |
//!
//! Every OS call is best effort. A refused `setrlimit` is logged and the
//! run continues with the remaining ceilings.

use crate::config::{LimitScope, SandboxConfig};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// One ceiling the limiter tried to arm
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Ceiling {
    /// `RLIMIT_AS`, in bytes
    AddressSpace(u64),
    /// `RLIMIT_CPU`, in seconds
    ProcessCpu(u64),
    /// `RLIMIT_NPROC` 0
    NoProcesses,
    /// `RLIMIT_FSIZE` 0
    NoFileWrites,
    /// Thread CPU clock, enforced by the instruction counter
    ThreadCpu(Duration),
    /// Live interpreter heap, in bytes
    Heap(usize),
}

/// What [`apply`] managed to arm
#[derive(Debug, Clone, Default, Serialize)]
pub struct LimitReport {
    pub applied: Vec<Ceiling>,
    /// Ceilings the platform refused, with the reason
    pub skipped: Vec<(Ceiling, String)>,
}

impl LimitReport {
    pub fn has(&self, ceiling: &Ceiling) -> bool {
        self.applied.contains(ceiling)
    }
}

/// CPU budget measured on the calling thread's CPU clock
#[derive(Debug, Clone, Copy)]
pub struct CpuCeiling {
    start: Duration,
    limit: Duration,
}

impl CpuCeiling {
    /// Arm a ceiling starting from the current thread's CPU time
    pub fn arm(limit: Duration) -> Option<Self> {
        thread_cpu_time().map(|start| Self { start, limit })
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    /// CPU time consumed since arming
    pub fn used(&self) -> Duration {
        thread_cpu_time()
            .map(|now| now.saturating_sub(self.start))
            .unwrap_or_default()
    }

    pub fn exceeded(&self) -> bool {
        self.used() > self.limit
    }
}

/// Ceilings the interpreter and instruction counter enforce in-process
#[derive(Debug, Clone, Copy, Default)]
pub struct Ceilings {
    pub cpu: Option<CpuCeiling>,
    pub heap_bytes: Option<usize>,
}

/// Arm the ceilings in `config`; must run on the execution unit's thread
pub fn apply(config: &SandboxConfig) -> (LimitReport, Ceilings) {
    let mut report = LimitReport::default();
    let mut ceilings = Ceilings::default();

    let heap = config.max_memory_bytes();
    ceilings.heap_bytes = Some(heap);
    report.applied.push(Ceiling::Heap(heap));

    match config.limit_scope {
        LimitScope::Thread => match CpuCeiling::arm(config.timeout) {
            Some(cpu) => {
                ceilings.cpu = Some(cpu);
                report.applied.push(Ceiling::ThreadCpu(config.timeout));
            }
            None => skip(
                &mut report,
                Ceiling::ThreadCpu(config.timeout),
                "thread CPU clock unavailable on this platform".to_string(),
            ),
        },
        LimitScope::Process => apply_process(config, &mut report),
    }

    debug!(
        applied = report.applied.len(),
        skipped = report.skipped.len(),
        "resource limits armed"
    );
    (report, ceilings)
}

fn skip(report: &mut LimitReport, ceiling: Ceiling, reason: String) {
    warn!(?ceiling, %reason, "resource limit not applied");
    report.skipped.push((ceiling, reason));
}

#[cfg(unix)]
fn apply_process(config: &SandboxConfig, report: &mut LimitReport) {
    let budget = config.max_memory_bytes() as u64;
    match mapped_bytes() {
        Some(current) => {
            let limit = current.saturating_add(budget);
            set_ceiling(report, rlimit::ADDRESS_SPACE, limit, Ceiling::AddressSpace(limit));
        }
        None => skip(
            report,
            Ceiling::AddressSpace(budget),
            "could not read the current mapped size".to_string(),
        ),
    }
    let cpu_secs = config.timeout.as_secs().max(1);
    set_ceiling(report, rlimit::CPU, cpu_secs, Ceiling::ProcessCpu(cpu_secs));
    set_ceiling(report, rlimit::PROCESSES, 0, Ceiling::NoProcesses);
    set_ceiling(report, rlimit::FILE_SIZE, 0, Ceiling::NoFileWrites);
}

#[cfg(not(unix))]
fn apply_process(_config: &SandboxConfig, report: &mut LimitReport) {
    // no rlimits here; the namespace still grants no process or file access
    skip(
        report,
        Ceiling::NoProcesses,
        "process limits are not supported on this platform".to_string(),
    );
}

#[cfg(unix)]
fn set_ceiling(report: &mut LimitReport, resource: rlimit::Resource, limit: u64, ceiling: Ceiling) {
    match rlimit::set(resource, limit) {
        Ok(()) => report.applied.push(ceiling),
        Err(e) => skip(report, ceiling, e.to_string()),
    }
}

#[cfg(unix)]
mod rlimit {
    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    pub type Resource = libc::__rlimit_resource_t;
    #[cfg(not(all(target_os = "linux", target_env = "gnu")))]
    pub type Resource = libc::c_int;

    pub const ADDRESS_SPACE: Resource = libc::RLIMIT_AS as Resource;
    pub const CPU: Resource = libc::RLIMIT_CPU as Resource;
    pub const PROCESSES: Resource = libc::RLIMIT_NPROC as Resource;
    pub const FILE_SIZE: Resource = libc::RLIMIT_FSIZE as Resource;

    pub fn set(resource: Resource, limit: u64) -> std::io::Result<()> {
        let rlim = libc::rlimit {
            rlim_cur: limit as libc::rlim_t,
            rlim_max: limit as libc::rlim_t,
        };
        // SAFETY: rlim is a valid rlimit and resource a valid constant.
        if unsafe { libc::setrlimit(resource, &rlim) } != 0 {
            Err(std::io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

/// Bytes currently mapped by this process
#[cfg(unix)]
fn mapped_bytes() -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let pages: u64 = statm.split_whitespace().next()?.parse().ok()?;
    // SAFETY: sysconf has no preconditions.
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    u64::try_from(page_size).ok().map(|size| pages * size)
}

#[cfg(unix)]
fn thread_cpu_time() -> Option<Duration> {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: ts is a valid, writable timespec.
    if unsafe { libc::clock_gettime(libc::CLOCK_THREAD_CPUTIME_ID, &mut ts) } != 0 {
        return None;
    }
    Some(Duration::new(ts.tv_sec as u64, ts.tv_nsec as u32))
}

#[cfg(not(unix))]
fn thread_cpu_time() -> Option<Duration> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_scope_arms_heap_ceiling() {
        let config = SandboxConfig::default().with_max_memory_mb(4);
        let (report, ceilings) = apply(&config);
        assert!(report.has(&Ceiling::Heap(4 * 1024 * 1024)));
        assert_eq!(ceilings.heap_bytes, Some(4 * 1024 * 1024));
        assert!(!report.applied.iter().any(|c| matches!(c, Ceiling::NoProcesses)));
    }

    #[cfg(unix)]
    #[test]
    fn test_thread_cpu_ceiling() {
        let (report, ceilings) = apply(&SandboxConfig::default());
        assert!(report.has(&Ceiling::ThreadCpu(Duration::from_secs(60))));
        let cpu = ceilings.cpu.unwrap();
        assert!(!cpu.exceeded());

        let tight = CpuCeiling::arm(Duration::from_millis(1)).unwrap();
        let mut x = 0u64;
        while !tight.exceeded() {
            x = x.wrapping_add(1);
        }
        assert!(x > 0);
        assert!(tight.used() > tight.limit());
    }

    #[cfg(unix)]
    #[test]
    fn test_setrlimit_in_child_process() {
        // rlimits are process-wide, so exercise them in a forked child
        // SAFETY: the child only calls async-signal-safe code before _exit.
        let pid = unsafe { libc::fork() };
        assert!(pid >= 0);
        if pid == 0 {
            let ok = rlimit::set(rlimit::FILE_SIZE, 0).is_ok();
            // SAFETY: terminating the forked child.
            unsafe { libc::_exit(if ok { 0 } else { 1 }) };
        }
        let mut status = 0;
        // SAFETY: waiting on our own child.
        unsafe { libc::waitpid(pid, &mut status, 0) };
        assert!(libc::WIFEXITED(status));
        assert_eq!(libc::WEXITSTATUS(status), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_mapped_bytes_is_plausible() {
        if let Some(bytes) = mapped_bytes() {
            assert!(bytes > 0);
        }
    }
}
