//! A process table backed by host threads.
//!
//! [`HostProcesses`] implements [`ProcessOps`] for running the primitives
//! outside a kernel: each thread that calls in becomes a process with its
//! own [`Pid`], and sleeping parks the thread on a condition variable until
//! another thread wakes it. A wakeup that arrives first is remembered, so
//! the enqueue-then-sleep window of the primitives is safe.
//!
//! Several tables can coexist (one per test, typically). A thread gets a
//! separate pid in each table it touches. A spawned process leaves the
//! table when its thread finishes, and dropping a table forgets the dropping
//! thread's membership in it.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::PoisonError;

use crate::compat::{Condvar, Mutex, thread, thread_local};
use crate::id::Pid;
use crate::process::ProcessOps;

static NEXT_TABLE: AtomicUsize = AtomicUsize::new(1);

thread_local! {
    // (table id, process) for every table this thread belongs to.
    static CURRENT: RefCell<Vec<(usize, Arc<Process>)>> = RefCell::new(Vec::new());
}

#[derive(Debug, Default)]
struct ParkState {
    wakeup_pending: bool,
    sleeping: bool,
}

struct Process {
    pid: Pid,
    state: Mutex<ParkState>,
    changed: Condvar,
}

impl Process {
    fn new(pid: Pid) -> Self {
        Self {
            pid,
            state: Mutex::new(ParkState::default()),
            changed: Condvar::new(),
        }
    }

    fn park(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.sleeping = true;
        self.changed.notify_all();
        while !state.wakeup_pending {
            state = self
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.wakeup_pending = false;
        state.sleeping = false;
        self.changed.notify_all();
    }

    fn unpark(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        debug_assert!(!state.wakeup_pending, "pid {} woken twice", self.pid);
        state.wakeup_pending = true;
        self.changed.notify_all();
    }

    fn is_sleeping(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sleeping
    }

    fn wait_until_sleeping(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        while !state.sleeping {
            state = self
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

type ProcessMap = Mutex<BTreeMap<Pid, Arc<Process>>>;

/// Removes a spawned process from its table when its thread finishes,
/// panicking or not.
struct Exit {
    processes: Arc<ProcessMap>,
    pid: Pid,
}

impl Drop for Exit {
    fn drop(&mut self) {
        self.processes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.pid);
    }
}

/// Thread-backed process table.
pub struct HostProcesses {
    id: usize,
    next_pid: AtomicU32,
    processes: Arc<ProcessMap>,
}

impl HostProcesses {
    /// Creates an empty table. Pids start at 1.
    pub fn new() -> Self {
        Self {
            id: NEXT_TABLE.fetch_add(1, Ordering::Relaxed),
            next_pid: AtomicU32::new(1),
            processes: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    fn register(&self) -> Arc<Process> {
        let pid = Pid::new(self.next_pid.fetch_add(1, Ordering::Relaxed));
        let process = Arc::new(Process::new(pid));
        self.processes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pid, Arc::clone(&process));
        process
    }

    fn adopt(&self, process: Arc<Process>) {
        CURRENT.with(|current| current.borrow_mut().push((self.id, process)));
    }

    fn current(&self) -> Arc<Process> {
        let found = CURRENT.with(|current| {
            current
                .borrow()
                .iter()
                .find(|(table, _)| *table == self.id)
                .map(|(_, process)| Arc::clone(process))
        });
        found.unwrap_or_else(|| {
            let process = self.register();
            self.adopt(Arc::clone(&process));
            process
        })
    }

    fn lookup(&self, pid: Pid) -> Option<Arc<Process>> {
        self.processes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&pid)
            .cloned()
    }

    /// Runs `f` on a new thread that is a fresh process of this table.
    ///
    /// The pid is assigned before the thread starts, so it can be waited on
    /// right away.
    pub fn spawn<F, T>(&self, f: F) -> HostProcess<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let process = self.register();
        let pid = process.pid;
        let table = self.id;
        let exit = Exit {
            processes: Arc::clone(&self.processes),
            pid,
        };
        let handle = thread::spawn(move || {
            let _exit = exit;
            CURRENT.with(|current| current.borrow_mut().push((table, process)));
            f()
        });
        HostProcess { pid, handle }
    }

    /// Blocks the caller until `pid` is asleep in [`ProcessOps::sleep`].
    ///
    /// # Panics
    ///
    /// Panics if `pid` does not belong to this table or has already
    /// finished.
    pub fn wait_until_sleeping(&self, pid: Pid) {
        let Some(process) = self.lookup(pid) else {
            panic!("pid {pid} is not in this process table");
        };
        process.wait_until_sleeping();
    }

    /// Returns `true` if `pid` is asleep.
    pub fn is_sleeping(&self, pid: Pid) -> bool {
        self.lookup(pid).is_some_and(|process| process.is_sleeping())
    }

    /// Number of processes currently asleep.
    pub fn sleeping_count(&self) -> usize {
        let processes: Vec<_> = self
            .processes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        processes.iter().filter(|process| process.is_sleeping()).count()
    }
}

impl Default for HostProcesses {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for HostProcesses {
    fn drop(&mut self) {
        // Thread-locals may already be gone if the table dies during thread
        // teardown.
        let _ = CURRENT.try_with(|current| {
            current.borrow_mut().retain(|(table, _)| *table != self.id);
        });
    }
}

impl ProcessOps for HostProcesses {
    fn current_pid(&self) -> Pid {
        self.current().pid
    }

    fn sleep(&self) {
        self.current().park();
    }

    fn wakeup(&self, pid: Pid) {
        match self.lookup(pid) {
            Some(process) => process.unpark(),
            None => kerr!("host: wakeup for unknown pid {}", pid),
        }
    }
}

/// A process started with [`HostProcesses::spawn`].
pub struct HostProcess<T> {
    pid: Pid,
    handle: thread::JoinHandle<T>,
}

impl<T> HostProcess<T> {
    /// The process's pid.
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Waits for the process to finish and returns its result. A panic in
    /// the process is resumed on the caller.
    pub fn join(self) -> T {
        match self.handle.join() {
            Ok(value) => value,
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }
}
