//! Group-wide collective operations layered over [`Communicator`]
//! point-to-point messaging.
//!
//! The container protocol needs exactly four collectives: a barrier, a
//! root broadcast, an exclusive prefix sum (rank-ordered offsets), and a
//! loud agreement check. All are implemented as gather-to-root plus
//! broadcast so any backend that can send bytes between ranks supports
//! them. Every call consumes a block of two tags (`tag`, `tag + 1`);
//! callers must hand successive collectives disjoint blocks or messages
//! from consecutive calls can alias.
//!
//! All functions are blocking collectives: every rank in the group must
//! call them, in the same order, or the group stalls.

use crate::comm::{CommTag, Communicator, Wait};
use crate::tlv_error::TlvError;

const ROOT: usize = 0;

fn recv_exact<C: Communicator>(
    comm: &C,
    peer: usize,
    tag: u16,
    len: usize,
) -> Result<Vec<u8>, TlvError> {
    let mut buf = vec![0u8; len];
    let got = comm
        .irecv(peer, tag, &mut buf)
        .wait()
        .ok_or_else(|| TlvError::CommFailure {
            peer,
            detail: "receive returned no data".into(),
        })?;
    if got.len() != len {
        return Err(TlvError::CommFailure {
            peer,
            detail: format!("expected {len} bytes, got {}", got.len()),
        });
    }
    Ok(got)
}

fn recv_u64<C: Communicator>(comm: &C, peer: usize, tag: u16) -> Result<u64, TlvError> {
    let buf = recv_exact(comm, peer, tag, 8)?;
    Ok(u64::from_ne_bytes(buf.try_into().expect("length checked")))
}

/// Block until every rank in the group has arrived.
pub fn barrier<C: Communicator>(comm: &C, tag: CommTag) -> Result<(), TlvError> {
    let rank = comm.rank();
    let size = comm.size();
    if size == 1 {
        return Ok(());
    }
    let arrive = tag.as_u16();
    let release = tag.offset(1).as_u16();
    if rank == ROOT {
        for peer in 1..size {
            recv_exact(comm, peer, arrive, 1)?;
        }
        for peer in 1..size {
            comm.isend(peer, release, &[1]).wait();
        }
    } else {
        comm.isend(ROOT, arrive, &[1]).wait();
        recv_exact(comm, ROOT, release, 1)?;
    }
    Ok(())
}

/// Broadcast a `u64` from rank 0; the root's `value` is returned on every rank.
pub fn broadcast_u64<C: Communicator>(
    comm: &C,
    tag: CommTag,
    value: u64,
) -> Result<u64, TlvError> {
    let rank = comm.rank();
    let size = comm.size();
    if size == 1 {
        return Ok(value);
    }
    if rank == ROOT {
        for peer in 1..size {
            comm.isend(peer, tag.as_u16(), &value.to_ne_bytes()).wait();
        }
        Ok(value)
    } else {
        recv_u64(comm, ROOT, tag.as_u16())
    }
}

/// Exclusive prefix sum of `local` across ranks, in rank order.
///
/// Rank 0 receives 0; rank `r` receives the sum of all lower ranks' values.
/// This is the offset of a rank's slice when the ranks' local arrays are
/// concatenated in rank order.
pub fn exclusive_scan_sum<C: Communicator>(
    comm: &C,
    tag: CommTag,
    local: u64,
) -> Result<u64, TlvError> {
    let rank = comm.rank();
    let size = comm.size();
    if size == 1 {
        return Ok(0);
    }
    let gather = tag.as_u16();
    let reply = tag.offset(1).as_u16();
    if rank == ROOT {
        let mut prefix = local;
        for peer in 1..size {
            let contribution = recv_u64(comm, peer, gather)?;
            comm.isend(peer, reply, &prefix.to_ne_bytes()).wait();
            prefix += contribution;
        }
        Ok(0)
    } else {
        comm.isend(ROOT, gather, &local.to_ne_bytes()).wait();
        recv_u64(comm, ROOT, reply)
    }
}

/// Sum of `local` over all ranks, returned on every rank.
pub fn all_sum_u64<C: Communicator>(comm: &C, tag: CommTag, local: u64) -> Result<u64, TlvError> {
    let rank = comm.rank();
    let size = comm.size();
    if size == 1 {
        return Ok(local);
    }
    let gather = tag.as_u16();
    let reply = tag.offset(1).as_u16();
    if rank == ROOT {
        let mut total = local;
        for peer in 1..size {
            total += recv_u64(comm, peer, gather)?;
        }
        for peer in 1..size {
            comm.isend(peer, reply, &total.to_ne_bytes()).wait();
        }
        Ok(total)
    } else {
        comm.isend(ROOT, gather, &local.to_ne_bytes()).wait();
        recv_u64(comm, ROOT, reply)
    }
}

/// Verify every rank presents the same `value`, failing the whole group loudly
/// if not.
///
/// Ranks disagreeing on a global size is the classic silent-corruption path
/// in collective file I/O; this check turns it into a [`TlvError::CollectiveDesync`]
/// on *every* rank before any byte is written.
pub fn all_agree_u64<C: Communicator>(
    comm: &C,
    tag: CommTag,
    value: u64,
) -> Result<u64, TlvError> {
    let rank = comm.rank();
    let size = comm.size();
    if size == 1 {
        return Ok(value);
    }
    let gather = tag.as_u16();
    let verdict = tag.offset(1).as_u16();
    if rank == ROOT {
        let mut mismatch: Option<(usize, u64)> = None;
        for peer in 1..size {
            let theirs = recv_u64(comm, peer, gather)?;
            if theirs != value && mismatch.is_none() {
                mismatch = Some((peer, theirs));
            }
        }
        // verdict: 1-byte ok flag followed by the canonical value
        let mut msg = [0u8; 9];
        msg[0] = mismatch.is_none() as u8;
        msg[1..9].copy_from_slice(&value.to_ne_bytes());
        for peer in 1..size {
            comm.isend(peer, verdict, &msg).wait();
        }
        if let Some((peer, theirs)) = mismatch {
            log::warn!("rank {peer} disagrees on collective value: {theirs} != {value}");
            return Err(TlvError::CollectiveDesync(format!(
                "rank {peer} reported {theirs}, rank 0 reported {value}"
            )));
        }
        Ok(value)
    } else {
        comm.isend(ROOT, gather, &value.to_ne_bytes()).wait();
        let msg = recv_exact(comm, ROOT, verdict, 9)?;
        let canonical = u64::from_ne_bytes(msg[1..9].try_into().expect("length checked"));
        if msg[0] == 0 {
            return Err(TlvError::CollectiveDesync(format!(
                "group disagreed on collective value (rank 0 reported {canonical}, this rank {value})"
            )));
        }
        Ok(canonical)
    }
}
