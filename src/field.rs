//! External-collaborator traits: the distributed array being persisted and
//! the connectivity description behind its metadata companions.
//!
//! The container never owns numeric data. It reads local values and ranges
//! out of a [`FieldVector`], derives CSR companions from a
//! [`MeshConnectivity`], and on read hands everything back to the field
//! through [`FieldVector::scatter_local_values`]; how those values land in
//! the field's own storage (dof permutations, ghost updates, halo exchange)
//! is entirely the adapter's contract.

use crate::comm::Communicator;
use crate::format::TlvScalar;
use crate::tlv_error::TlvError;

/// Everything a read hands to the field adapter's scatter.
///
/// `cells`, `x_cell_offsets`, and `cell_dofs` are the local slices of the
/// three companion arrays: owned global entity ids, CSR prefix offsets into
/// the flattened dof sequence (globally shifted, with the closing sentinel
/// visible as the last entry), and globally numbered dof ids in entity
/// order. `values` covers exactly `vector_range` of the global value array.
#[derive(Clone, Copy, Debug)]
pub struct ScatterInput<'a, T> {
    pub cells: &'a [usize],
    pub x_cell_offsets: &'a [usize],
    pub cell_dofs: &'a [i32],
    pub values: &'a [T],
    pub vector_range: (u64, u64),
}

/// A distributed numeric array that can be persisted to a container.
///
/// `local_range` and `global_size` must be consistent across the group: the
/// union of all ranks' ranges tiles `[0, global_size)` in rank order.
pub trait FieldVector<C: Communicator> {
    /// Element type stored on disk for this field.
    type Scalar: TlvScalar;

    /// Total element count across all ranks.
    fn global_size(&self) -> u64;
    /// This rank's contiguous `[start, end)` slice of the global array.
    fn local_range(&self) -> (u64, u64);
    /// This rank's values, in slice order; length must equal the local range.
    fn local_values(&self) -> Vec<Self::Scalar>;

    /// Populate this rank's storage from values read back off disk.
    fn scatter_local_values(
        &mut self,
        comm: &C,
        input: ScatterInput<'_, Self::Scalar>,
    ) -> Result<(), TlvError>;
}

/// Distributed connectivity consumed when writing metadata companions:
/// which global entities a rank owns and which global dof ids each carries.
pub trait MeshConnectivity {
    /// Number of entities owned by this rank (ghosts excluded).
    fn num_local_entities(&self) -> usize;
    /// Total entity count across all ranks.
    fn num_global_entities(&self) -> u64;
    /// Global ids of the owned entities, in local order.
    fn global_entity_ids(&self) -> Vec<usize>;
    /// Global dof ids attached to one owned entity, in local dof order.
    fn entity_dofs(&self, local_entity: usize) -> Vec<i32>;
}
