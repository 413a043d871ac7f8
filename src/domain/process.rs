//! Process monitoring domain types
//!
//! Compute processes running on a device, enriched with their command line
//! from the process filesystem.

use crate::smi::units::humanize_bytes;

use serde::Serialize;
use std::io;
use std::path::Path;

/// Default process filesystem mount
pub const PROC_ROOT: &str = "/proc";

/// A process using the GPU
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Process {
    pub pid: u32,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cmd_args: Vec<String>,

    /// GPU memory used by this process (bytes)
    pub gpu_used_memory_bytes: u64,
    pub gpu_used_memory_bytes_humanized: String,
}

impl Process {
    pub fn new(pid: u32, used_memory: u64) -> Self {
        Self {
            pid,
            cmd_args: Vec::new(),
            gpu_used_memory_bytes: used_memory,
            gpu_used_memory_bytes_humanized: humanize_bytes(used_memory),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Processes {
    pub uuid: String,
    pub running_processes: Vec<Process>,
}

/// Read `<proc_root>/<pid>/cmdline`. `Ok(None)` if the process is gone.
pub fn read_cmdline(proc_root: &Path, pid: u32) -> io::Result<Option<Vec<String>>> {
    match std::fs::read(proc_root.join(pid.to_string()).join("cmdline")) {
        Ok(raw) => Ok(Some(
            raw.split(|b| *b == 0)
                .filter(|arg| !arg.is_empty())
                .map(|arg| String::from_utf8_lossy(arg).into_owned())
                .collect(),
        )),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

impl Processes {
    /// Fill in command lines, dropping processes that exited since they were
    /// listed. Unreadable command lines are left empty.
    pub fn resolve_cmdlines(&mut self, proc_root: &Path) {
        let uuid = &self.uuid;
        self.running_processes
            .retain_mut(|proc| match read_cmdline(proc_root, proc.pid) {
                Ok(Some(args)) => {
                    proc.cmd_args = args;
                    true
                }
                Ok(None) => {
                    log::debug!("{}: process {} not running -- skipping", uuid, proc.pid);
                    false
                }
                Err(e) => {
                    log::warn!("{}: failed to read cmdline of {}: {}", uuid, proc.pid, e);
                    true
                }
            });
    }

    pub fn total_used_memory(&self) -> u64 {
        self.running_processes
            .iter()
            .map(|p| p.gpu_used_memory_bytes)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_cmdlines_skips_exited() {
        let root = tempfile::tempdir().unwrap();
        let live = root.path().join("4242");
        std::fs::create_dir(&live).unwrap();
        std::fs::write(live.join("cmdline"), b"/usr/bin/python3\0train.py\0--epochs=3\0").unwrap();

        let mut procs = Processes {
            uuid: "GPU-1".to_string(),
            running_processes: vec![Process::new(4242, 1 << 30), Process::new(4243, 1 << 20)],
        };
        procs.resolve_cmdlines(root.path());

        assert_eq!(procs.running_processes.len(), 1);
        assert_eq!(
            procs.running_processes[0].cmd_args,
            vec!["/usr/bin/python3", "train.py", "--epochs=3"]
        );
        assert_eq!(procs.total_used_memory(), 1 << 30);
    }

    #[test]
    fn test_process_json_names() {
        let json = serde_json::to_value(Process::new(7, 1_000_000)).unwrap();
        assert_eq!(json["pid"], 7);
        assert_eq!(json["gpu_used_memory_bytes"], 1_000_000);
        assert_eq!(json["gpu_used_memory_bytes_humanized"], "1 MB");
        assert!(json.get("cmd_args").is_none());
    }
}
