//! The collective container protocol: create-once, synchronize, write your
//! own slice, synchronize; and the symmetric probe/partition/read sequence.
//!
//! A [`TlvContainer`] binds a communicator to one value file (plus an
//! optional metadata prefix naming three CSR companion files). Every write
//! and read is a collective: all ranks call the same method, in the same
//! order, with the same global sizes. The write protocol runs in four
//! phases:
//!
//! 1. rank 0 creates the file fresh and writes header + global count;
//! 2. a creation sync propagates rank 0's success (or failure) to every
//!    rank; nobody touches the body before this;
//! 3. each rank writes exactly its own non-overlapping element slice;
//! 4. a closing barrier guarantees all shards are on disk before return.
//!
//! Before phase 1 the group cross-checks the global count it was handed;
//! ranks disagreeing fail the whole group with
//! [`TlvError::CollectiveDesync`] instead of corrupting the file.
//!
//! Reads carry no barrier: callers must serialize write-then-read
//! externally.

use crate::collective;
use crate::comm::{CommTag, Communicator};
use crate::field::{FieldVector, MeshConnectivity, ScatterInput};
use crate::format::{FormatDescriptor, TlvScalar};
use crate::partition;
use crate::range_io;
use crate::tlv_error::TlvError;
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU16, Ordering};

/// First tag used by container collectives; each collective call consumes a
/// block of two tags from here on, advanced in lockstep on every rank.
const TAG_BASE: u16 = 0x4000;

/// Caller-facing knobs; everything else is protocol.
#[derive(Clone, Copy, Debug)]
pub struct ContainerOptions {
    /// 4-bit payload tag stamped into every header this container writes.
    pub label: u8,
    /// Write the three CSR companion files alongside the value file.
    pub save_metadata: bool,
    /// Keep companion arrays in memory after the first metadata read.
    pub cache_metadata: bool,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            label: 0,
            save_metadata: false,
            cache_metadata: false,
        }
    }
}

/// Local slices of the three companion arrays, as read off disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedMetadata {
    /// Global ids of the entities this rank owns.
    pub cells: Vec<usize>,
    /// CSR prefix offsets into the flattened dof sequence, globally shifted;
    /// one entry past the local entity count to capture the closing boundary.
    pub x_cell_offsets: Vec<usize>,
    /// Globally numbered dof ids, in entity order.
    pub cell_dofs: Vec<i32>,
}

/// One value file plus optional metadata companions, bound to a rank group.
pub struct TlvContainer<C: Communicator> {
    comm: C,
    path: PathBuf,
    meta_prefix: Option<PathBuf>,
    options: ContainerOptions,
    cached: OnceCell<CachedMetadata>,
    generation: AtomicU16,
}

fn companion(prefix: &Path, role: &str) -> PathBuf {
    let mut name = prefix.as_os_str().to_os_string();
    name.push("_");
    name.push(role);
    PathBuf::from(name)
}

impl<C: Communicator> TlvContainer<C> {
    /// Container for a plain value file, no metadata companions.
    pub fn new(comm: C, path: impl Into<PathBuf>) -> Self {
        Self::with_options(comm, path, None, ContainerOptions::default())
    }

    /// Container with a metadata prefix and explicit options.
    pub fn with_options(
        comm: C,
        path: impl Into<PathBuf>,
        meta_prefix: Option<PathBuf>,
        options: ContainerOptions,
    ) -> Self {
        Self {
            comm,
            path: path.into(),
            meta_prefix,
            options,
            cached: OnceCell::new(),
            generation: AtomicU16::new(0),
        }
    }

    /// Path of the value file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the metadata cache has been populated.
    pub fn metadata_cached(&self) -> bool {
        self.cached.get().is_some()
    }

    /// Global element count recorded in the value file's header.
    pub fn global_count(&self) -> Result<u64, TlvError> {
        let (_, count) = range_io::probe(&self.path)?;
        Ok(count)
    }

    // Tag block for the next collective. The counter advances identically on
    // every rank because the protocol is lockstep.
    fn next_block(&self) -> CommTag {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        CommTag::new(TAG_BASE.wrapping_add(generation.wrapping_mul(2)))
    }

    /// The four-phase collective write of one distributed array to `path`.
    ///
    /// `start` carries the rank's slice start when the caller already knows
    /// it (value files use the field's own range); `None` derives it from a
    /// rank-ordered exclusive prefix sum over `local.len()` (metadata
    /// companions). The choice must be uniform across the group.
    fn write_distributed<T: TlvScalar>(
        &self,
        path: &Path,
        local: &[T],
        global_count: u64,
        start: Option<u64>,
    ) -> Result<(), TlvError> {
        let desc = FormatDescriptor::new(T::TAG, self.options.label)?;
        let agreed = collective::all_agree_u64(&self.comm, self.next_block(), global_count)?;

        let rank = self.comm.rank();
        let create_status = if rank == 0 {
            match range_io::create(path, desc, agreed) {
                Ok(()) => Ok(()),
                Err(e) => {
                    log::warn!("rank 0 failed to create `{}`: {e}", path.display());
                    Err(e)
                }
            }
        } else {
            Ok(())
        };
        // creation sync: every rank learns whether the file exists before
        // seeking into it
        let ok = collective::broadcast_u64(
            &self.comm,
            self.next_block(),
            create_status.is_ok() as u64,
        )?;
        match create_status {
            Err(e) => return Err(e),
            Ok(()) if ok == 0 => {
                return Err(TlvError::CollectiveDesync(format!(
                    "rank 0 failed to create `{}`",
                    path.display()
                )));
            }
            Ok(()) => {}
        }

        let start = match start {
            Some(s) => s,
            None => partition::global_offset(&self.comm, self.next_block(), local.len() as u64)?,
        };
        log::debug!(
            "rank {rank}: writing {} elements at [{start}, {}) of `{}`",
            local.len(),
            start + local.len() as u64,
            path.display()
        );
        range_io::write_range(path, desc, start, local)?;

        collective::barrier(&self.comm, self.next_block())?;
        Ok(())
    }

    /// Collective write of the field's value array.
    pub fn write<F: FieldVector<C>>(&self, field: &F) -> Result<(), TlvError> {
        let values = field.local_values();
        let (start, end) = field.local_range();
        debug_assert_eq!(values.len() as u64, end - start);
        self.write_distributed(&self.path, &values, field.global_size(), Some(start))
    }

    /// Collective write of the field's value array and, if `save_metadata`
    /// is set, the three connectivity companions.
    pub fn write_with_metadata<F, M>(&self, field: &F, mesh: &M) -> Result<(), TlvError>
    where
        F: FieldVector<C>,
        M: MeshConnectivity,
    {
        if self.options.save_metadata {
            self.write_metadata(mesh)?;
        }
        self.write(field)
    }

    fn write_metadata<M: MeshConnectivity>(&self, mesh: &M) -> Result<(), TlvError> {
        let prefix = self
            .meta_prefix
            .clone()
            .ok_or(TlvError::NoMetadataPrefix)?;

        let n_cells = mesh.num_local_entities();
        let mut cell_dofs: Vec<i32> = Vec::new();
        let mut x_cell_dofs: Vec<usize> = Vec::with_capacity(n_cells + 1);
        for cell in 0..n_cells {
            x_cell_dofs.push(cell_dofs.len());
            cell_dofs.extend(mesh.entity_dofs(cell));
        }

        // shift the local CSR offsets into the flattened global sequence
        let dof_offset =
            partition::global_offset(&self.comm, self.next_block(), cell_dofs.len() as u64)?;
        for x in &mut x_cell_dofs {
            *x += dof_offset as usize;
        }

        let total_dofs =
            collective::all_sum_u64(&self.comm, self.next_block(), cell_dofs.len() as u64)?;
        self.write_distributed(&companion(&prefix, "cell_dofs"), &cell_dofs, total_dofs, None)?;

        // the last rank closes the offset array with the global total
        if self.comm.rank() == self.comm.size() - 1 {
            x_cell_dofs.push(total_dofs as usize);
        }
        let n_global = mesh.num_global_entities();
        self.write_distributed(
            &companion(&prefix, "x_cell_dofs"),
            &x_cell_dofs,
            n_global + 1,
            None,
        )?;

        let cells = mesh.global_entity_ids();
        self.write_distributed(&companion(&prefix, "cells"), &cells, n_global, None)?;
        Ok(())
    }

    /// This rank's local slice of the value file, by partition of the
    /// recorded global count. No barrier; no metadata involved.
    pub fn read_vector<T: TlvScalar>(
        &self,
    ) -> Result<(FormatDescriptor, (u64, u64), Vec<T>), TlvError> {
        let (_, count) = range_io::probe(&self.path)?;
        let (start, end) = partition::local_range(self.comm.rank(), self.comm.size(), count);
        let (desc, values) = range_io::read_range::<T>(&self.path, start, end)?;
        Ok((desc, (start, end), values))
    }

    /// Collective read of the field: companion connectivity (cached or from
    /// disk), then the local value slice, then scatter into the field's own
    /// storage. The adapter owns its mesh; the scatter contract is entirely
    /// its own.
    pub fn read<F: FieldVector<C>>(&self, field: &mut F) -> Result<(), TlvError> {
        let fresh;
        let meta = match self.cached.get() {
            Some(cached) => cached,
            None => {
                let read = self.read_metadata()?;
                if self.options.cache_metadata {
                    // first population is atomic; a lost race drops the
                    // duplicate and reads the winner's copy
                    self.cached.get_or_init(move || read)
                } else {
                    fresh = read;
                    &fresh
                }
            }
        };

        let (_, vector_range, values) = self.read_vector::<F::Scalar>()?;
        field.scatter_local_values(
            &self.comm,
            ScatterInput {
                cells: &meta.cells,
                x_cell_offsets: &meta.x_cell_offsets,
                cell_dofs: &meta.cell_dofs,
                values: &values,
                vector_range,
            },
        )
    }

    fn read_metadata(&self) -> Result<CachedMetadata, TlvError> {
        let prefix = self
            .meta_prefix
            .clone()
            .ok_or(TlvError::NoMetadataPrefix)?;
        let rank = self.comm.rank();
        let size = self.comm.size();

        let cells_path = companion(&prefix, "cells");
        let (_, n_global_cells) = range_io::probe(&cells_path)?;
        let (cell_start, cell_end) = partition::local_range(rank, size, n_global_cells);

        let (_, cells) = range_io::read_range::<usize>(&cells_path, cell_start, cell_end)?;
        // one past the local end, to capture the closing boundary
        let (_, x_cell_offsets) = range_io::read_range::<usize>(
            &companion(&prefix, "x_cell_dofs"),
            cell_start,
            cell_end + 1,
        )?;
        let dof_start = x_cell_offsets.first().copied().unwrap_or(0) as u64;
        let dof_end = x_cell_offsets.last().copied().unwrap_or(0) as u64;
        let (_, cell_dofs) =
            range_io::read_range::<i32>(&companion(&prefix, "cell_dofs"), dof_start, dof_end)?;

        Ok(CachedMetadata {
            cells,
            x_cell_offsets,
            cell_dofs,
        })
    }
}
