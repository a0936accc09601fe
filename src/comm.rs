//! Thin façade over intra-process (threaded) or inter-process (MPI)
//! message passing.
//!
//! Messages are *contiguous byte slices*. All handles are **waitable** but
//! non-blocking -– the collective layer calls `.wait()` before it trusts
//! that a buffer is ready. The container protocol only ever talks to this
//! trait, so serial tests, multi-thread rank groups, and real MPI jobs all
//! run the same code path.

use bytes::Bytes;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;

/// Message tag for one point-to-point exchange.
///
/// Collectives derive disjoint tag blocks from a generation counter so that
/// back-to-back collective calls never alias each other's messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CommTag(pub u16);

impl CommTag {
    /// Construct a tag from a raw value.
    pub fn new(raw: u16) -> Self {
        CommTag(raw)
    }

    /// Raw tag value.
    pub fn as_u16(self) -> u16 {
        self.0
    }

    /// Tag `n` slots past this one (wrapping).
    pub fn offset(self, n: u16) -> Self {
        CommTag(self.0.wrapping_add(n))
    }
}

/// Non-blocking communication interface (minimal by design).
pub trait Communicator: Send + Sync {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;

    /// This process's rank within the group, `0..size()`.
    fn rank(&self) -> usize;
    /// Number of ranks in the group.
    fn size(&self) -> usize;
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

/// Compile-time no-op comm for single-process groups and serial unit tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u16, _buf: &mut [u8]) {}

    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
}

// --- LocalComm: intra-process rank group, one thread per rank ---

type Key = (usize, usize, u16); // (src, dst, tag)

static MAILBOX: Lazy<DashMap<Key, VecDeque<Bytes>>> = Lazy::new(DashMap::new);

/// Receive handle for [`LocalComm`]; a polling thread drains the mailbox.
pub struct LocalHandle {
    buf: Arc<Mutex<Option<Vec<u8>>>>,
    handle: Option<JoinHandle<()>>,
}

impl Wait for LocalHandle {
    fn wait(mut self) -> Option<Vec<u8>> {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        self.buf.lock().take()
    }
}

/// Intra-process communicator: each rank is a thread, messages pass through
/// a process-global mailbox. Group membership is implicit in `(rank, size)`;
/// tests that spawn rank groups must not run concurrently with each other
/// (they share the mailbox), so mark them `#[serial]`.
#[derive(Clone, Debug)]
pub struct LocalComm {
    rank: usize,
    size: usize,
}

impl LocalComm {
    pub fn new(rank: usize, size: usize) -> Self {
        assert!(rank < size, "rank {rank} out of range for group of {size}");
        Self { rank, size }
    }
}

impl Communicator for LocalComm {
    type SendHandle = ();
    type RecvHandle = LocalHandle;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
        let key = (self.rank, peer, tag);
        MAILBOX
            .entry(key)
            .or_default()
            .push_back(Bytes::copy_from_slice(buf));
    }

    fn irecv(&self, peer: usize, tag: u16, _buf: &mut [u8]) -> LocalHandle {
        let key = (peer, self.rank, tag);
        let slot = Arc::new(Mutex::new(None));
        let slot_writer = slot.clone();
        let handle = std::thread::spawn(move || {
            loop {
                let msg = MAILBOX.get_mut(&key).and_then(|mut q| q.pop_front());
                if let Some(bytes) = msg {
                    // the full payload passes through; length policing is
                    // the caller's job
                    *slot_writer.lock() = Some(bytes.to_vec());
                    break;
                }
                std::thread::yield_now();
            }
        });
        LocalHandle {
            buf: slot,
            handle: Some(handle),
        }
    }

    fn rank(&self) -> usize {
        self.rank
    }
    fn size(&self) -> usize {
        self.size
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::*;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;

    /// Communicator over an MPI world; one OS process per rank.
    pub struct MpiComm {
        pub world: SimpleCommunicator,
        _universe: mpi::environment::Universe,
    }

    impl MpiComm {
        pub fn new() -> Self {
            let universe = mpi::initialize().expect("MPI already initialized");
            let world = universe.world();
            Self {
                world,
                _universe: universe,
            }
        }
    }

    /// Blocking-send handle; the data left the buffer before construction.
    pub struct MpiSendHandle;

    impl Wait for MpiSendHandle {
        fn wait(self) -> Option<Vec<u8>> {
            None
        }
    }

    /// Blocking-receive handle carrying the already-received payload.
    pub struct MpiRecvHandle(Option<Vec<u8>>);

    impl Wait for MpiRecvHandle {
        fn wait(self) -> Option<Vec<u8>> {
            self.0
        }
    }

    impl super::Communicator for MpiComm {
        type SendHandle = MpiSendHandle;
        type RecvHandle = MpiRecvHandle;

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> MpiSendHandle {
            self.world
                .process_at_rank(peer as i32)
                .send_with_tag(buf, i32::from(tag));
            MpiSendHandle
        }

        fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> MpiRecvHandle {
            let (data, _status) = self
                .world
                .process_at_rank(peer as i32)
                .receive_vec_with_tag::<u8>(i32::from(tag));
            let take = buf.len().min(data.len());
            buf[..take].copy_from_slice(&data[..take]);
            MpiRecvHandle(Some(data))
        }

        fn rank(&self) -> usize {
            self.world.rank() as usize
        }
        fn size(&self) -> usize {
            self.world.size() as usize
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;
