//! Shared test adapters: an in-memory distributed field with an identity
//! dof map, and the matching one-dof-per-cell connectivity.
#![allow(dead_code)]

use tlv_field::comm::Communicator;
use tlv_field::field::{FieldVector, MeshConnectivity, ScatterInput};
use tlv_field::tlv_error::TlvError;

/// Distributed vector living in a plain `Vec`, dof `g` owned by the rank
/// whose range contains `g`.
pub struct InMemoryField {
    pub global_size: u64,
    pub range: (u64, u64),
    pub values: Vec<f64>,
}

impl InMemoryField {
    pub fn new(global_size: u64, range: (u64, u64), values: Vec<f64>) -> Self {
        assert_eq!(values.len() as u64, range.1 - range.0);
        Self {
            global_size,
            range,
            values,
        }
    }

    /// An empty field ready to receive a scatter.
    pub fn sink(global_size: u64, range: (u64, u64)) -> Self {
        let len = (range.1 - range.0) as usize;
        Self::new(global_size, range, vec![0.0; len])
    }
}

impl<C: Communicator> FieldVector<C> for InMemoryField {
    type Scalar = f64;

    fn global_size(&self) -> u64 {
        self.global_size
    }

    fn local_range(&self) -> (u64, u64) {
        self.range
    }

    fn local_values(&self) -> Vec<f64> {
        self.values.clone()
    }

    fn scatter_local_values(
        &mut self,
        _comm: &C,
        input: ScatterInput<'_, f64>,
    ) -> Result<(), TlvError> {
        let (lo, hi) = input.vector_range;
        self.range = (lo, hi);
        self.values = vec![0.0; (hi - lo) as usize];
        let base = input.x_cell_offsets.first().copied().unwrap_or(0);
        for i in 0..input.cells.len() {
            let first = input.x_cell_offsets[i] - base;
            let last = input.x_cell_offsets[i + 1] - base;
            for &dof in &input.cell_dofs[first..last] {
                let gid = dof as u64;
                if gid < lo || gid >= hi {
                    return Err(TlvError::ScatterFailed(format!(
                        "dof {gid} outside local range [{lo}, {hi})"
                    )));
                }
                self.values[(gid - lo) as usize] = input.values[(gid - lo) as usize];
            }
        }
        Ok(())
    }
}

/// Connectivity where cell `g` carries exactly dof `g`; a rank owns the
/// cells of its contiguous range.
pub struct IntervalMesh {
    pub n_global: u64,
    pub range: (u64, u64),
}

impl MeshConnectivity for IntervalMesh {
    fn num_local_entities(&self) -> usize {
        (self.range.1 - self.range.0) as usize
    }

    fn num_global_entities(&self) -> u64 {
        self.n_global
    }

    fn global_entity_ids(&self) -> Vec<usize> {
        (self.range.0..self.range.1).map(|g| g as usize).collect()
    }

    fn entity_dofs(&self, local_entity: usize) -> Vec<i32> {
        vec![(self.range.0 + local_entity as u64) as i32]
    }
}
