use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::process_tree::kill_tree;
use crate::prelude::*;
use tokio::process::Child;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Starting,
    Running,
    Failed,
    Stopped,
}

/// A live server process owned by the supervisor.
#[derive(Debug)]
pub struct ManagedProcess {
    pid: u32,
    working_dir: PathBuf,
    args: Vec<String>,
    state: ProcessState,
    child: Child,
}

impl ManagedProcess {
    pub fn new(pid: u32, working_dir: PathBuf, args: Vec<String>, child: Child) -> Self {
        Self {
            pid,
            working_dir,
            args,
            state: ProcessState::Starting,
            child,
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub(super) fn set_state(&mut self, state: ProcessState) {
        self.state = state;
    }

    /// Kill the process and everything it spawned
    pub fn terminate(&mut self) {
        if self.state == ProcessState::Stopped {
            return;
        }
        kill_tree(self.pid);
        // Covers the process having no entry in the process table snapshot
        let _ = self.child.start_kill();
        if let Ok(Some(status)) = self.child.try_wait() {
            debug!("Server process {} exited with {status}", self.pid);
        }
        self.state = ProcessState::Stopped;
    }
}

/// Every server process from its spawn until it is terminated.
///
/// Processes are registered while still starting, so an interrupted start is torn down along
/// with the rest. Cloning the registry shares it. It is constructed once at startup and torn down with
/// [`ProcessRegistry::terminate_all`], either explicitly or through a [`TeardownGuard`].
#[derive(Debug, Clone, Default)]
pub struct ProcessRegistry {
    processes: Arc<Mutex<Vec<ManagedProcess>>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock must not prevent the teardown
    fn lock(&self) -> MutexGuard<'_, Vec<ManagedProcess>> {
        self.processes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, process: ManagedProcess) {
        debug!(
            "Registering server process {} ({}) in {}",
            process.pid,
            process.args.join(" "),
            process.working_dir.display()
        );
        self.lock().push(process);
    }

    pub(super) fn set_state(&self, pid: u32, state: ProcessState) {
        if let Some(process) = self.lock().iter_mut().find(|process| process.pid == pid) {
            process.set_state(state);
        }
    }

    /// Take a process out of the registry, leaving it running
    pub fn remove(&self, pid: u32) -> Option<ManagedProcess> {
        let mut processes = self.lock();
        let index = processes.iter().position(|process| process.pid == pid)?;
        Some(processes.remove(index))
    }

    pub fn pids(&self) -> Vec<u32> {
        self.lock().iter().map(ManagedProcess::pid).collect()
    }

    pub fn state(&self, pid: u32) -> Option<ProcessState> {
        self.lock()
            .iter()
            .find(|process| process.pid == pid)
            .map(ManagedProcess::state)
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Terminate every registered process tree. Safe to call any number of times.
    pub fn terminate_all(&self) {
        let processes: Vec<ManagedProcess> = self.lock().drain(..).collect();
        for mut process in processes {
            info!(
                "Stopping server process {} ({:?})",
                process.pid(),
                process.state()
            );
            process.terminate();
        }
    }

    /// Tear the registry down when the returned guard is dropped, including while unwinding.
    pub fn teardown_guard(&self) -> TeardownGuard {
        TeardownGuard {
            registry: self.clone(),
        }
    }
}

#[must_use = "the registry is torn down as soon as the guard is dropped"]
pub struct TeardownGuard {
    registry: ProcessRegistry,
}

impl Drop for TeardownGuard {
    fn drop(&mut self) {
        self.registry.terminate_all();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::server::process_tree::tests::wait_for_exit;

    fn spawn_sleeper() -> ManagedProcess {
        let child = tokio::process::Command::new("sleep")
            .arg("300")
            .spawn()
            .unwrap();
        let pid = child.id().unwrap();
        let mut process = ManagedProcess::new(pid, PathBuf::from("."), vec!["300".into()], child);
        process.set_state(ProcessState::Running);
        process
    }

    #[test_log::test(tokio::test)]
    async fn test_terminate_all_is_idempotent() {
        let registry = ProcessRegistry::new();
        registry.register(spawn_sleeper());
        registry.register(spawn_sleeper());
        let pids = registry.pids();
        assert_eq!(pids.len(), 2);

        registry.terminate_all();
        assert!(registry.is_empty());
        registry.terminate_all();
        assert!(registry.is_empty());

        for pid in pids {
            assert!(wait_for_exit(pid).await);
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_state_and_remove() {
        let registry = ProcessRegistry::new();
        registry.register(spawn_sleeper());
        let pid = registry.pids()[0];
        assert_eq!(registry.state(pid), Some(ProcessState::Running));

        registry.set_state(pid, ProcessState::Failed);
        assert_eq!(registry.state(pid), Some(ProcessState::Failed));

        let mut process = registry.remove(pid).unwrap();
        assert!(registry.is_empty());
        assert_eq!(registry.state(pid), None);
        assert!(registry.remove(pid).is_none());

        process.terminate();
        assert_eq!(process.state(), ProcessState::Stopped);
        assert!(wait_for_exit(pid).await);
    }

    #[test_log::test(tokio::test)]
    async fn test_teardown_guard_runs_on_drop() {
        let registry = ProcessRegistry::new();
        registry.register(spawn_sleeper());
        let pid = registry.pids()[0];

        {
            let _guard = registry.teardown_guard();
        }

        assert!(registry.is_empty());
        assert!(wait_for_exit(pid).await);
    }

    #[test]
    fn test_terminate_all_survives_poisoned_lock() {
        let registry = ProcessRegistry::new();
        let shared = registry.clone();
        let _ = std::thread::spawn(move || {
            let _lock = shared.processes.lock().unwrap();
            panic!("poisoning the registry");
        })
        .join();

        registry.terminate_all();
        assert!(registry.is_empty());
    }
}
