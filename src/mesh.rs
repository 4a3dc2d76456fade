//! Cell-vertex meshes and cell partitions.
//!
//! A [`Mesh`] stores vertex coordinates and, per cell, its vertices in
//! reference order. Cells and vertices are identified by their position;
//! those ids are global and survive restriction to a cell subset, which is
//! what lets reduced function spaces be renumbered deterministically.

use crate::rom_error::RomError;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Supported cell shapes.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum CellType {
    /// 1D segment, vertices `[left, right]`.
    Segment,
    /// 2D tensor-product cell, vertices counter-clockwise from the lower left.
    Quadrilateral,
}

impl CellType {
    /// Topological dimension.
    pub fn dimension(self) -> usize {
        match self {
            CellType::Segment => 1,
            CellType::Quadrilateral => 2,
        }
    }

    pub fn num_vertices(self) -> usize {
        match self {
            CellType::Segment => 2,
            CellType::Quadrilateral => 4,
        }
    }
}

/// Unstructured cell-vertex mesh with a single cell type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    dimension: usize,
    cell_type: CellType,
    coordinates: Vec<Vec<f64>>,
    cells: Vec<Vec<usize>>,
}

impl Mesh {
    /// Build a mesh, checking coordinate dimensions and cell connectivity.
    pub fn new(
        cell_type: CellType,
        coordinates: Vec<Vec<f64>>,
        cells: Vec<Vec<usize>>,
    ) -> Result<Self, RomError> {
        let dimension = cell_type.dimension();
        for (idx, coord) in coordinates.iter().enumerate() {
            if coord.len() != dimension {
                return Err(RomError::InvalidGeometry(format!(
                    "vertex {idx} has dimension {}, expected {dimension}",
                    coord.len()
                )));
            }
        }
        for (cell, vertices) in cells.iter().enumerate() {
            if vertices.len() != cell_type.num_vertices() {
                return Err(RomError::InvalidGeometry(format!(
                    "cell {cell} has {} vertices, expected {}",
                    vertices.len(),
                    cell_type.num_vertices()
                )));
            }
            if let Some(&v) = vertices.iter().find(|&&v| v >= coordinates.len()) {
                return Err(RomError::InvalidGeometry(format!(
                    "cell {cell} references missing vertex {v}"
                )));
            }
        }
        Ok(Self {
            dimension,
            cell_type,
            coordinates,
            cells,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn cell_type(&self) -> CellType {
        self.cell_type
    }

    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn num_vertices(&self) -> usize {
        self.coordinates.len()
    }

    pub fn cell_vertices(&self, cell: usize) -> Result<&[usize], RomError> {
        self.cells
            .get(cell)
            .map(Vec::as_slice)
            .ok_or_else(|| RomError::InvalidGeometry(format!("missing cell {cell}")))
    }

    pub fn vertex_coordinates(&self, vertex: usize) -> Result<&[f64], RomError> {
        self.coordinates
            .get(vertex)
            .map(Vec::as_slice)
            .ok_or_else(|| RomError::InvalidGeometry(format!("missing vertex {vertex}")))
    }

    /// Coordinates of the vertices of `cell`, in reference order.
    pub fn cell_coordinates(&self, cell: usize) -> Result<Vec<Vec<f64>>, RomError> {
        self.cell_vertices(cell)?
            .iter()
            .map(|&v| self.vertex_coordinates(v).map(<[f64]>::to_vec))
            .collect()
    }
}

/// Split of the cells of a space into contiguous blocks, one per worker.
///
/// Only the scan order of parallel searches depends on it; every result
/// built from a partitioned scan is sorted, so it is partition-agnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellPartition {
    n_parts: usize,
}

impl CellPartition {
    pub fn new(n_parts: usize) -> Result<Self, RomError> {
        if n_parts == 0 {
            return Err(RomError::Configuration("a partition needs at least one part".into()));
        }
        Ok(Self { n_parts })
    }

    /// One part per rayon worker thread.
    pub fn per_thread() -> Self {
        Self {
            n_parts: rayon::current_num_threads().max(1),
        }
    }

    pub fn n_parts(&self) -> usize {
        self.n_parts
    }

    /// Contiguous, balanced ranges covering `0..n_items`; empty parts are dropped.
    pub fn ranges(&self, n_items: usize) -> Vec<Range<usize>> {
        let base = n_items / self.n_parts;
        let extra = n_items % self.n_parts;
        let mut start = 0;
        let mut out = Vec::with_capacity(self.n_parts);
        for part in 0..self.n_parts {
            let len = base + usize::from(part < extra);
            if len > 0 {
                out.push(start..start + len);
            }
            start += len;
        }
        out
    }
}

impl Default for CellPartition {
    fn default() -> Self {
        Self { n_parts: 1 }
    }
}
