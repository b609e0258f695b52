use std::{
    fmt,
    time::{Duration, Instant},
};

use sysinfo::{Pid, ProcessesToUpdate, System};

const MB: f64 = 1024.0 * 1024.0;

/// Wall clock and resident memory of this process at some point in time.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot {
    pub at: Instant,
    /// Resident set size in bytes, `0` when the platform doesn't expose it.
    pub resident: u64,
}

/// What a phase of the run cost.
#[derive(Debug, Clone, Copy)]
pub struct PhaseReport {
    pub phase: &'static str,
    pub elapsed: Duration,
    pub before: u64,
    pub after: u64,
    /// Highest resident size seen by any snapshot so far. Memory is only sampled at snapshots,
    /// a spike between two of them goes unnoticed.
    pub highest_sampled: u64,
}

impl PhaseReport {
    /// Resident memory the phase left behind, in bytes.
    pub fn delta(&self) -> i64 {
        self.after as i64 - self.before as i64
    }
}

impl fmt::Display for PhaseReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let used = self.delta().max(0);
        writeln!(
            f,
            "Time taken for {}: {:.2} seconds",
            self.phase,
            self.elapsed.as_secs_f64()
        )?;
        write!(
            f,
            "Memory used during {}: {used} bytes ({:.2} MB), highest sampled resident {:.2} MB",
            self.phase,
            used as f64 / MB,
            self.highest_sampled as f64 / MB
        )
    }
}

/// Samples the resident memory of the current process.
///
/// Purely local, taking a snapshot never waits on another worker.
pub struct ResourceMonitor {
    system: System,
    pid: Option<Pid>,
    highest_sampled: u64,
}

impl Default for ResourceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceMonitor {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            pid: sysinfo::get_current_pid().ok(),
            highest_sampled: 0,
        }
    }

    pub fn snapshot(&mut self) -> Snapshot {
        let resident = self.resident();
        self.highest_sampled = self.highest_sampled.max(resident);

        Snapshot {
            at: Instant::now(),
            resident,
        }
    }

    /// Closes a phase opened with `before`.
    pub fn report(&mut self, phase: &'static str, before: Snapshot) -> PhaseReport {
        let after = self.snapshot();

        PhaseReport {
            phase,
            elapsed: after.at.duration_since(before.at),
            before: before.resident,
            after: after.resident,
            highest_sampled: self.highest_sampled,
        }
    }

    fn resident(&mut self) -> u64 {
        let Some(pid) = self.pid else {
            return 0;
        };

        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        self.system.process(pid).map_or(0, |process| process.memory())
    }
}
