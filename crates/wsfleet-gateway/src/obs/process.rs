//! Process CPU and memory for the current worker, sampled on every scrape.
//!
//! Only the worker's own pid is refreshed; the values always describe the
//! process serving the scrape, never its siblings.

use parking_lot::Mutex;
use sysinfo::{Pid, ProcessesToUpdate, System};

use super::metrics::Sampled;

pub struct ProcessSampler {
    pid: Pid,
    system: Mutex<System>,
    cpu_seconds: Sampled,
    resident_memory: Sampled,
}

impl ProcessSampler {
    pub fn new(cpu_seconds: Sampled, resident_memory: Sampled) -> Self {
        Self {
            pid: Pid::from_u32(std::process::id()),
            system: Mutex::new(System::new()),
            cpu_seconds,
            resident_memory,
        }
    }

    /// Refresh both values. Leaves the previous sample in place when the
    /// platform cannot report the process.
    pub fn refresh(&self) {
        let mut sys = self.system.lock();
        sys.refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);

        match sys.process(self.pid) {
            Some(process) => {
                self.resident_memory.set(process.memory() as f64);
                // accumulated_cpu_time is in milliseconds
                self.cpu_seconds
                    .set(process.accumulated_cpu_time() as f64 / 1000.0);
            }
            None => tracing::debug!(pid = %self.pid, "process stats unavailable"),
        }
    }
}
