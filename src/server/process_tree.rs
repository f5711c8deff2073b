use crate::prelude::*;
use sysinfo::{Pid, ProcessRefreshKind, RefreshKind, System};

fn process_snapshot() -> System {
    System::new_with_specifics(RefreshKind::nothing().with_processes(ProcessRefreshKind::nothing()))
}

/// Every process below `root`, parents before their children.
pub fn descendants(system: &System, root: Pid) -> Vec<Pid> {
    let mut found = vec![];
    let mut frontier = vec![root];
    while let Some(parent) = frontier.pop() {
        for (pid, process) in system.processes() {
            // Threads show up as processes on Linux
            if process.thread_kind().is_some() || *pid == root || found.contains(pid) {
                continue;
            }
            if process.parent() == Some(parent) {
                found.push(*pid);
                frontier.push(*pid);
            }
        }
    }
    found
}

/// Kill `pid` and all of its descendants. Returns how many processes were signalled.
///
/// The tree is collected before anything is killed, since children of a dead process get
/// re-parented and can't be found anymore.
pub fn kill_tree(pid: u32) -> usize {
    let system = process_snapshot();
    let root = Pid::from_u32(pid);
    let tree = std::iter::once(root).chain(descendants(&system, root));

    let mut killed = 0;
    for pid in tree {
        match system.process(pid) {
            Some(process) if process.kill() => killed += 1,
            Some(_) => debug!("Failed to kill process {pid}"),
            None => trace!("Process {pid} already exited"),
        }
    }
    debug!("Killed {killed} process(es) in the tree of {root}");
    killed
}
