//! Explicit execution context threaded through setup and dispatch.
//!
//! A batch either runs inside one process (optionally with an internal worker
//! pool) or as one of several cooperating ranks. Rank identity, the barrier
//! and the shared abort signal are reached only through [`ExecutionContext`].

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use nsrun_core::errors::{ErrorInfo, NsError};

/// Rank the coordinating process runs as.
pub const COORDINATOR_RANK: usize = 0;

/// Message-passing capability shared by cooperating processes.
pub trait Communicator: Send + Sync {
    /// Rank of the calling process.
    fn rank(&self) -> usize;

    /// Number of cooperating processes.
    fn size(&self) -> usize;

    /// Blocks until every rank arrives; returns [`NsError::Aborted`] if the
    /// global abort is raised before or while waiting.
    fn barrier(&self) -> Result<(), NsError>;

    /// Raises the global abort with the given exit status.
    fn abort(&self, status: i32);

    /// Exit status of the global abort, if raised.
    fn abort_status(&self) -> Option<i32>;

    /// Hands the coordinator's payload to every rank.
    ///
    /// Only the coordinating rank's `payload` is used; the others pass `None`.
    /// Acts as a barrier and fails with [`NsError::Aborted`] like one.
    fn broadcast(&self, payload: Option<Vec<u8>>) -> Result<Vec<u8>, NsError>;

    /// Collects one payload per rank on the coordinator, ordered by rank.
    ///
    /// Non-coordinating ranks receive `None`.
    fn gather(&self, payload: Vec<u8>) -> Result<Option<Vec<Vec<u8>>>, NsError>;
}

/// Shared abort flag with an attached exit status.
#[derive(Debug, Default)]
pub struct AbortSignal {
    raised: AtomicBool,
    status: AtomicI32,
}

impl AbortSignal {
    /// Records the abort. The first status wins.
    pub fn raise(&self, status: i32) {
        if !self.raised.load(Ordering::SeqCst) {
            self.status.store(status, Ordering::SeqCst);
        }
        self.raised.store(true, Ordering::SeqCst);
    }

    /// Status of the abort, if raised.
    pub fn status(&self) -> Option<i32> {
        self.raised
            .load(Ordering::SeqCst)
            .then(|| self.status.load(Ordering::SeqCst))
    }
}

/// Communicator for a lone process: the barrier is trivial.
#[derive(Debug, Default)]
pub struct SingleProcess {
    abort: AbortSignal,
}

impl Communicator for SingleProcess {
    fn rank(&self) -> usize {
        COORDINATOR_RANK
    }

    fn size(&self) -> usize {
        1
    }

    fn barrier(&self) -> Result<(), NsError> {
        match self.abort.status() {
            Some(status) => Err(aborted_error(COORDINATOR_RANK, status)),
            None => Ok(()),
        }
    }

    fn abort(&self, status: i32) {
        self.abort.raise(status);
    }

    fn abort_status(&self) -> Option<i32> {
        self.abort.status()
    }

    fn broadcast(&self, payload: Option<Vec<u8>>) -> Result<Vec<u8>, NsError> {
        self.barrier()?;
        Ok(payload.unwrap_or_default())
    }

    fn gather(&self, payload: Vec<u8>) -> Result<Option<Vec<Vec<u8>>>, NsError> {
        self.barrier()?;
        Ok(Some(vec![payload]))
    }
}

#[derive(Debug, Default)]
struct BarrierState {
    arrived: usize,
    generation: u64,
}

#[derive(Debug, Default)]
struct ExchangeSlots {
    broadcast: Vec<u8>,
    gathered: Vec<Option<Vec<u8>>>,
}

#[derive(Debug)]
struct GroupShared {
    size: usize,
    abort: AbortSignal,
    state: Mutex<BarrierState>,
    wake: Condvar,
    exchange: Mutex<ExchangeSlots>,
}

/// In-process group of cooperating ranks backed by threads.
///
/// Each rank holds a [`LocalRank`] handle; all handles share one barrier and
/// one abort signal, so a raised abort wakes every rank parked in the barrier.
/// Broadcast and gather exchange bytes through shared slots fenced by two
/// barrier rounds, so a slot is never rewritten before every rank read it.
#[derive(Debug, Clone)]
pub struct LocalRank {
    rank: usize,
    shared: Arc<GroupShared>,
}

impl LocalRank {
    /// Creates `size` connected rank handles, ordered by rank.
    pub fn group(size: usize) -> Vec<LocalRank> {
        let shared = Arc::new(GroupShared {
            size: size.max(1),
            abort: AbortSignal::default(),
            state: Mutex::new(BarrierState::default()),
            wake: Condvar::new(),
            exchange: Mutex::new(ExchangeSlots {
                broadcast: Vec::new(),
                gathered: vec![None; size.max(1)],
            }),
        });
        (0..size.max(1))
            .map(|rank| LocalRank {
                rank,
                shared: Arc::clone(&shared),
            })
            .collect()
    }

    fn slots(&self) -> std::sync::MutexGuard<'_, ExchangeSlots> {
        self.shared
            .exchange
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Communicator for LocalRank {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn barrier(&self) -> Result<(), NsError> {
        let mut state = self
            .shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(status) = self.shared.abort.status() {
            return Err(aborted_error(self.rank, status));
        }
        let generation = state.generation;
        state.arrived += 1;
        if state.arrived == self.shared.size {
            state.arrived = 0;
            state.generation += 1;
            self.shared.wake.notify_all();
            return Ok(());
        }
        while state.generation == generation {
            if let Some(status) = self.shared.abort.status() {
                return Err(aborted_error(self.rank, status));
            }
            state = self
                .shared
                .wake
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        Ok(())
    }

    fn abort(&self, status: i32) {
        self.shared.abort.raise(status);
        // Take the barrier lock so no rank misses the wake-up between its
        // abort check and its wait.
        let _state = self
            .shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.shared.wake.notify_all();
    }

    fn abort_status(&self) -> Option<i32> {
        self.shared.abort.status()
    }

    fn broadcast(&self, payload: Option<Vec<u8>>) -> Result<Vec<u8>, NsError> {
        if self.rank == COORDINATOR_RANK {
            self.slots().broadcast = payload.unwrap_or_default();
        }
        self.barrier()?;
        let received = self.slots().broadcast.clone();
        self.barrier()?;
        Ok(received)
    }

    fn gather(&self, payload: Vec<u8>) -> Result<Option<Vec<Vec<u8>>>, NsError> {
        self.slots().gathered[self.rank] = Some(payload);
        self.barrier()?;
        let collected = (self.rank == COORDINATOR_RANK).then(|| {
            self.slots()
                .gathered
                .iter_mut()
                .map(|slot| slot.take().unwrap_or_default())
                .collect()
        });
        self.barrier()?;
        Ok(collected)
    }
}

fn aborted_error(rank: usize, status: i32) -> NsError {
    NsError::Aborted(
        ErrorInfo::new("global_abort", "a cooperating process raised the global abort")
            .with_context("rank", rank.to_string())
            .with_context("status", status.to_string()),
    )
}

/// Execution context passed explicitly to the scheduling layer.
#[derive(Clone)]
pub struct ExecutionContext {
    comm: Arc<dyn Communicator>,
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("rank", &self.rank())
            .field("size", &self.size())
            .finish()
    }
}

impl ExecutionContext {
    /// Context for a lone process.
    pub fn single_process() -> Self {
        Self::from_communicator(Arc::new(SingleProcess::default()))
    }

    /// Context backed by an arbitrary communicator.
    pub fn from_communicator(comm: Arc<dyn Communicator>) -> Self {
        Self { comm }
    }

    /// Contexts for an in-process group of `size` ranks.
    pub fn local_group(size: usize) -> Vec<Self> {
        LocalRank::group(size)
            .into_iter()
            .map(|rank| Self::from_communicator(Arc::new(rank)))
            .collect()
    }

    /// Rank of the calling process.
    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    /// Number of cooperating processes.
    pub fn size(&self) -> usize {
        self.comm.size()
    }

    /// Whether this process performs the one-time setup.
    pub fn is_coordinator(&self) -> bool {
        self.rank() == COORDINATOR_RANK
    }

    /// Whether several processes cooperate on the batch.
    pub fn is_multi_process(&self) -> bool {
        self.size() > 1
    }

    /// Waits for every rank, observing the abort signal.
    pub fn barrier(&self) -> Result<(), NsError> {
        self.comm.barrier()
    }

    /// Raises the global abort.
    pub fn abort(&self, status: i32) {
        self.comm.abort(status);
    }

    /// Hands the coordinator's payload to every rank.
    pub fn broadcast(&self, payload: Option<Vec<u8>>) -> Result<Vec<u8>, NsError> {
        self.comm.broadcast(payload)
    }

    /// Collects every rank's payload on the coordinator.
    pub fn gather(&self, payload: Vec<u8>) -> Result<Option<Vec<Vec<u8>>>, NsError> {
        self.comm.gather(payload)
    }

    /// Returns [`NsError::Aborted`] once the global abort has been raised.
    pub fn check_abort(&self) -> Result<(), NsError> {
        match self.comm.abort_status() {
            Some(status) => Err(aborted_error(self.rank(), status)),
            None => Ok(()),
        }
    }

    /// Whether the global abort has been raised.
    pub fn is_aborted(&self) -> bool {
        self.comm.abort_status().is_some()
    }
}
