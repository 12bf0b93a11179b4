//! # Exit registry - SIGCHLD multiplexer and completion dispatch table.
//!
//! One `SIGCHLD` stream is shared by every child the registry adopts. The
//! registry turns "some child changed state" into "pid P exited with code C"
//! and routes it to the one callback waiting for P, whichever of the two
//! arrives first.
//!
//! ## Architecture
//! ```text
//! track()  ── 0→1 ──► subscribe: spawn listener(SIGCHLD, CancellationToken)
//!
//! listener: SIGCHLD ─► reap_all() ─┐
//! poll(pid) ───────────────────────┼─► waitpid(pid, WNOHANG|WUNTRACED|WCONTINUED)
//! adopt(pid) ──────────────────────┘        │
//!                                           ├─ Stopped / Continued ─► suspended flag
//!                                           └─ Exited / Signaled  ─► observe(pid, code)
//!                                                                      ├─ resolved / unclaimed ─► AlreadyExited
//!                                                                      ├─ not live, not pending ─► Untracked
//!                                                                      ├─ tracked -= 1 (1→0: unsubscribe)
//!                                                                      ├─ pending[pid]? ─► take + invoke
//!                                                                      └─ else           ─► unclaimed[pid] = code
//!
//! on_exit(pid, cb) ─► pending[pid] exists ─► DuplicateRegistration
//!                  └► unclaimed[pid]?     ─► take + invoke now
//!                  └► else                ─► pending[pid] = cb
//! ```
//!
//! ## Rules
//! - `track()` must happen-before the OS spawn of the child it accounts for.
//! - A pid lives in at most one of `pending` / `unclaimed`.
//! - Each exit is delivered once. Later notifications for a resolved pid are
//!   rejected until `adopt` or `on_exit` starts it over (pid reuse).
//! - A pid is reaped exactly once: `waitpid` runs under the table lock and
//!   only for pids still in `live`.
//! - Callbacks are taken out under the lock and invoked after releasing it;
//!   they must not block for long (they run on the listener task).
//! - Stop/continue notifications never count as exit.

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};

use nix::errno::Errno;
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::RegistryError;
use crate::exit::{code, exit_code_of};

/// One-shot completion callback, receives the final exit code.
pub type ExitCallback = Box<dyn FnOnce(i32) + Send + 'static>;

static GLOBAL: OnceLock<Arc<ExitRegistry>> = OnceLock::new();

/// Mutable registry state, guarded by one lock.
#[derive(Default)]
struct Table {
    /// Children accounted for by `track()` and not yet observed exiting.
    tracked: usize,
    /// Adopted pids that have not been reaped.
    live: HashSet<u32>,
    /// Adopted pids currently stopped.
    suspended: HashSet<u32>,
    /// Callbacks waiting for an exit.
    pending: HashMap<u32, ExitCallback>,
    /// Exits observed before a callback was registered.
    unclaimed: HashMap<u32, i32>,
    /// Pids whose exit was delivered; cleared when the pid is reused.
    resolved: HashSet<u32>,
    /// Cancels the SIGCHLD listener while subscribed.
    listener: Option<CancellationToken>,
}

impl Table {
    /// Records an exit. Returns the callback to invoke, if one was pending.
    ///
    /// Only pids the table knows (adopted or awaited) count against
    /// `tracked`; a pid already resolved is rejected without side effects.
    fn observe(&mut self, pid: u32, code: i32) -> Result<Option<ExitCallback>, RegistryError> {
        if self.unclaimed.contains_key(&pid) {
            return Err(RegistryError::AlreadyExited { pid });
        }
        let adopted = self.live.remove(&pid);
        if !adopted && !self.pending.contains_key(&pid) {
            return Err(if self.resolved.contains(&pid) {
                RegistryError::AlreadyExited { pid }
            } else {
                RegistryError::Untracked { pid }
            });
        }
        self.suspended.remove(&pid);

        self.tracked = self.tracked.saturating_sub(1);
        if self.tracked == 0 {
            self.unsubscribe();
        }

        match self.pending.remove(&pid) {
            Some(cb) => {
                self.resolved.insert(pid);
                Ok(Some(cb))
            }
            None => {
                self.unclaimed.insert(pid, code);
                Ok(None)
            }
        }
    }

    fn unsubscribe(&mut self) {
        if let Some(token) = self.listener.take() {
            debug!("no tracked children left; unsubscribing from SIGCHLD");
            token.cancel();
        }
    }
}

/// A completion ready to run outside the lock.
struct Dispatch {
    pid: u32,
    code: i32,
    callback: ExitCallback,
}

impl Dispatch {
    fn run(self) {
        debug!(pid = self.pid, code = self.code, "dispatching exit");
        (self.callback)(self.code);
    }
}

/// Process-wide dispatch table between `SIGCHLD` and waiting handles.
///
/// Use [`ExitRegistry::global`] in applications; [`ExitRegistry::new`] gives an
/// isolated instance (each instance only reaps children it adopted).
pub struct ExitRegistry {
    table: Mutex<Table>,
    me: Weak<ExitRegistry>,
}

impl ExitRegistry {
    /// Creates an isolated registry.
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            table: Mutex::new(Table::default()),
            me: me.clone(),
        })
    }

    /// Returns the lazily created process-wide registry.
    pub fn global() -> Arc<Self> {
        Arc::clone(GLOBAL.get_or_init(ExitRegistry::new))
    }

    /// Accounts for one child about to be spawned.
    ///
    /// On the 0→1 transition this subscribes to `SIGCHLD`, which requires a
    /// Tokio runtime with signal support. A listener whose runtime has shut
    /// down is replaced. Must be called **before** the spawn.
    pub fn track(&self) -> io::Result<()> {
        let mut table = self.lock();
        if table.listener.as_ref().is_none_or(CancellationToken::is_cancelled) {
            table.listener = Some(self.subscribe()?);
        }
        table.tracked += 1;
        Ok(())
    }

    /// Rolls back a [`track`](Self::track) whose spawn failed.
    pub fn untrack(&self) {
        let mut table = self.lock();
        table.tracked = table.tracked.saturating_sub(1);
        if table.tracked == 0 {
            table.unsubscribe();
        }
    }

    /// Starts reaping `pid` and checks it once right away.
    ///
    /// The immediate check covers a child whose notification was delivered
    /// (and coalesced) before it was adopted.
    pub fn adopt(&self, pid: u32) {
        {
            let mut table = self.lock();
            table.resolved.remove(&pid);
            table.live.insert(pid);
        }
        self.poll(pid);
    }

    /// Registers the one-shot completion callback for `pid`.
    ///
    /// If the exit was already observed, `callback` runs synchronously before
    /// this returns.
    pub fn on_exit<F>(&self, pid: u32, callback: F) -> Result<(), RegistryError>
    where
        F: FnOnce(i32) + Send + 'static,
    {
        let ready = {
            let mut table = self.lock();
            if table.pending.contains_key(&pid) {
                return Err(RegistryError::DuplicateRegistration { pid });
            }
            match table.unclaimed.remove(&pid) {
                Some(code) => {
                    table.resolved.insert(pid);
                    Some(Dispatch {
                        pid,
                        code,
                        callback: Box::new(callback),
                    })
                }
                None => {
                    table.resolved.remove(&pid);
                    table.pending.insert(pid, Box::new(callback));
                    None
                }
            }
        };

        if let Some(dispatch) = ready {
            dispatch.run();
        }
        Ok(())
    }

    /// Serialized notification entry point: `pid` terminated with `code`.
    ///
    /// `pid` must be adopted or have a pending callback, otherwise this is
    /// [`RegistryError::Untracked`]; a second exit for the same pid is
    /// [`RegistryError::AlreadyExited`].
    pub fn notify(&self, pid: u32, code: i32) -> Result<(), RegistryError> {
        let ready = self.lock().observe(pid, code)?;
        if let Some(callback) = ready {
            Dispatch {
                pid,
                code,
                callback,
            }
            .run();
        }
        Ok(())
    }

    /// Checks one adopted pid without blocking and dispatches any exit.
    pub fn poll(&self, pid: u32) {
        let ready = {
            let mut table = self.lock();
            Self::reap(&mut table, pid)
        };
        if let Some(dispatch) = ready {
            dispatch.run();
        }
    }

    /// Checks every adopted pid (one notification may stand for many exits).
    fn reap_all(&self) {
        let ready: Vec<Dispatch> = {
            let mut table = self.lock();
            let pids: Vec<u32> = table.live.iter().copied().collect();
            pids.into_iter()
                .filter_map(|pid| Self::reap(&mut table, pid))
                .collect()
        };
        for dispatch in ready {
            dispatch.run();
        }
    }

    /// `waitpid` on one live pid; must be called with the table locked.
    fn reap(table: &mut Table, pid: u32) -> Option<Dispatch> {
        if !table.live.contains(&pid) {
            return None;
        }

        let flags = WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED;
        let code = match waitpid(Pid::from_raw(pid as i32), Some(flags)) {
            Ok(WaitStatus::Stopped(..)) => {
                table.suspended.insert(pid);
                return None;
            }
            Ok(WaitStatus::Continued(_)) => {
                table.suspended.remove(&pid);
                return None;
            }
            Ok(status) => exit_code_of(status)?,
            Err(Errno::EINTR) => return None,
            Err(Errno::ECHILD) => {
                warn!(pid, "child was reaped outside the registry; exit code lost");
                code::LOST
            }
            Err(e) => {
                warn!(pid, error = %e, "waitpid failed");
                return None;
            }
        };

        match table.observe(pid, code) {
            Ok(callback) => callback.map(|callback| Dispatch {
                pid,
                code,
                callback,
            }),
            Err(e) => {
                error!(pid, error = %e, "registry invariant violated");
                None
            }
        }
    }

    /// True if `pid` was last seen stopped.
    pub fn is_suspended(&self, pid: u32) -> bool {
        self.lock().suspended.contains(&pid)
    }

    /// Number of children tracked and not yet observed exiting.
    pub fn tracked(&self) -> usize {
        self.lock().tracked
    }

    /// True while the SIGCHLD listener is running.
    pub fn is_subscribed(&self) -> bool {
        self.lock()
            .listener
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }

    /// Number of callbacks waiting for an exit.
    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    /// Number of exits observed but not yet claimed.
    pub fn unclaimed(&self) -> usize {
        self.lock().unclaimed.len()
    }

    /// Spawns the SIGCHLD listener; cancelled by the returned token.
    fn subscribe(&self) -> io::Result<CancellationToken> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| io::Error::other(format!("SIGCHLD subscription needs a tokio runtime: {e}")))?;
        let mut sigchld = signal(SignalKind::child())?;

        let token = CancellationToken::new();
        let stop = token.clone();
        // Dropped with the task, even unpolled on runtime shutdown.
        let cancel_on_drop = token.clone().drop_guard();
        let me = self.me.clone();

        runtime.spawn(async move {
            let _cancel_on_drop = cancel_on_drop;
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    msg = sigchld.recv() => {
                        let Some(()) = msg else { break };
                        let Some(registry) = me.upgrade() else { break };
                        registry.reap_all();
                    }
                }
            }
        });

        debug!("subscribed to SIGCHLD");
        Ok(token)
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ExitRegistry {
    fn drop(&mut self) {
        let table = self.table.get_mut().unwrap_or_else(PoisonError::into_inner);
        table.unsubscribe();
    }
}
