// src/interp/pool.rs

//! Bounded pool of reusable interpreters.
//!
//! A semaphore with `max` permits bounds how many interpreters can be leased
//! at once; idle interpreters sit on a free list. `min` interpreters are
//! opened eagerly and the pool grows lazily up to `max`.
//!
//! The pool has a single owner responsible for calling [`InterpreterPool::close`].
//! Closing fails every queued and future `acquire`, force-stops leased
//! interpreters and waits for their leases to come back.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::errors::PoolError;

use super::lua::{LuaInterpreter, StopHandle};

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub min: usize,
    pub max: usize,
    /// Interpreters currently alive (idle + leased).
    pub live: usize,
    pub idle: usize,
    pub leased: usize,
    pub closed: bool,
}

#[derive(Debug, Default)]
struct Slots {
    idle: Vec<LuaInterpreter>,
    /// Stop handles of leased interpreters, by interpreter id.
    leased: HashMap<usize, StopHandle>,
}

#[derive(Debug)]
struct PoolShared {
    min: usize,
    max: usize,
    permits: Arc<Semaphore>,
    slots: Mutex<Slots>,
    live: AtomicUsize,
    next_id: AtomicUsize,
    closed: AtomicBool,
    returned: Notify,
}

impl PoolShared {
    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn open_interpreter(&self) -> Result<LuaInterpreter, PoolError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let interp = LuaInterpreter::open(id).map_err(|e| PoolError::Open {
            id,
            reason: e.to_string(),
        })?;
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(interp)
    }

    fn give_back(&self, id: usize, interp: Option<LuaInterpreter>) {
        let mut slots = self.slots();
        slots.leased.remove(&id);

        match interp {
            Some(interp) if !self.closed.load(Ordering::SeqCst) => {
                debug!(interp = id, "interpreter returned to pool");
                slots.idle.push(interp);
            }
            Some(interp) => {
                debug!(interp = id, "pool closed; disposing returned interpreter");
                drop(interp);
                self.live.fetch_sub(1, Ordering::SeqCst);
            }
            None => {
                warn!(interp = id, "interpreter was not handed back; writing it off");
                self.live.fetch_sub(1, Ordering::SeqCst);
            }
        }
        drop(slots);
        self.returned.notify_waiters();
    }
}

/// Cheap to clone; all clones share the same pool.
#[derive(Debug, Clone)]
pub struct InterpreterPool {
    shared: Arc<PoolShared>,
}

impl InterpreterPool {
    /// Open a pool and eagerly start `min` interpreters.
    pub fn open(min: usize, max: usize) -> Result<Self, PoolError> {
        if max == 0 || min > max {
            return Err(PoolError::InvalidSize { min, max });
        }

        let shared = Arc::new(PoolShared {
            min,
            max,
            permits: Arc::new(Semaphore::new(max)),
            slots: Mutex::new(Slots::default()),
            live: AtomicUsize::new(0),
            next_id: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            returned: Notify::new(),
        });

        let mut idle = Vec::with_capacity(max);
        for _ in 0..min {
            idle.push(shared.open_interpreter()?);
        }
        shared.slots().idle = idle;

        info!(min, max, "interpreter pool opened");
        Ok(Self { shared })
    }

    /// Lease an interpreter, waiting while all `max` are busy.
    pub async fn acquire(&self) -> Result<PooledInterpreter, PoolError> {
        if self.is_closed() {
            return Err(PoolError::Closed);
        }

        let permit = Arc::clone(&self.shared.permits)
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;

        let reused = self.shared.slots().idle.pop();
        let interp = match reused {
            Some(interp) => interp,
            None => {
                debug!("no idle interpreter; opening a new one");
                self.shared.open_interpreter()?
            }
        };
        interp.reset_stop();

        let id = interp.id();
        {
            // Registering under the lock means close() either sees this
            // lease (and stops it) or we see the closed flag here.
            let mut slots = self.shared.slots();
            if self.is_closed() {
                drop(slots);
                drop(interp);
                self.shared.live.fetch_sub(1, Ordering::SeqCst);
                return Err(PoolError::Closed);
            }
            slots.leased.insert(id, interp.stop_handle());
        }
        debug!(interp = id, "interpreter leased");

        Ok(PooledInterpreter {
            id,
            interp: Some(interp),
            shared: Arc::clone(&self.shared),
            _permit: permit,
        })
    }

    /// Close the pool.
    ///
    /// Returns `true` for the call that actually closed it; later calls are
    /// no-ops returning `false`. Waits until every lease has been returned.
    pub async fn close(&self) -> bool {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.shared.permits.close();

        let (disposed, stopping) = {
            let mut slots = self.shared.slots();
            let idle = std::mem::take(&mut slots.idle);
            for handle in slots.leased.values() {
                handle.stop();
            }
            (idle.len(), slots.leased.len())
        };
        self.shared.live.fetch_sub(disposed, Ordering::SeqCst);
        info!(disposed, stopping, "closing interpreter pool");

        loop {
            let notified = self.shared.returned.notified();
            if self.shared.slots().leased.is_empty() {
                break;
            }
            notified.await;
        }

        info!("interpreter pool closed");
        true
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> PoolStatus {
        let slots = self.shared.slots();
        PoolStatus {
            min: self.shared.min,
            max: self.shared.max,
            live: self.shared.live.load(Ordering::SeqCst),
            idle: slots.idle.len(),
            leased: slots.leased.len(),
            closed: self.is_closed(),
        }
    }
}

/// An interpreter leased from the pool.
///
/// Dropping the lease (or calling [`release`](Self::release)) hands the
/// interpreter back. The interpreter can be taken out temporarily, e.g. to
/// move it onto a blocking thread, and must then be [`restore`](Self::restore)d;
/// a lease dropped while empty writes the interpreter off.
#[derive(Debug)]
pub struct PooledInterpreter {
    id: usize,
    interp: Option<LuaInterpreter>,
    shared: Arc<PoolShared>,
    _permit: OwnedSemaphorePermit,
}

impl PooledInterpreter {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn take(&mut self) -> Option<LuaInterpreter> {
        self.interp.take()
    }

    pub fn restore(&mut self, interp: LuaInterpreter) {
        self.interp = Some(interp);
    }

    pub fn release(self) {
        drop(self);
    }
}

impl Drop for PooledInterpreter {
    fn drop(&mut self) {
        self.shared.give_back(self.id, self.interp.take());
    }
}
