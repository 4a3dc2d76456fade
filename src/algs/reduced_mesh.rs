//! Reduced meshes for hyper-reduction.
//!
//! A [`ReducedMesh`] is built over `n` function spaces on a common mesh and
//! accumulates DOF `n`-tuples. For each appended tuple it adds every cell
//! whose closure holds one of the DOFs to a growing cell set and restricts
//! the spaces to that set. The resulting reduced spaces are small, yet an
//! operator assembled on them reproduces, at the recorded reduced DOFs, the
//! entries of the full operator at the original DOFs.
//!
//! # State
//!
//! `Empty → Growing` on the first append, `Growing → Frozen` on save or load,
//! `Frozen → Growing` on a later append. Cells and recorded tuples are never
//! removed; appending a tuple that is already recorded is a no-op.
//!
//! # Determinism
//!
//! Cell searches are split over a [`CellPartition`] and run on the rayon
//! pool, but their results are sorted before use. Reduced spaces are a pure
//! function of the accumulated cell set (see [`crate::function_space`]), and
//! the persisted file stores only global ids. A reduced mesh saved under one
//! partition count therefore reloads identically under any other.

use crate::algs::submesh::{SubmeshMaps, extract_cells};
use crate::config::{RebuildPolicy, ReducedMeshConfig};
use crate::debug_invariants::DebugInvariants;
use crate::function_space::FunctionSpace;
use crate::io::write_atomic;
use crate::mesh::{CellPartition, Mesh};
use crate::rom_error::RomError;
use parking_lot::{RwLock, RwLockReadGuard};
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const REDUCED_MESH_FILE_VERSION: u32 = 1;

/// Lifecycle of a [`ReducedMesh`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReducedMeshState {
    Empty,
    Growing,
    Frozen,
}

/// On-disk form: global cell ids plus the DOF correspondence table.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct ReducedMeshFile {
    version: u32,
    /// Partition count at save time; informational only.
    partitions: usize,
    space_dims: Vec<usize>,
    cells: Vec<usize>,
    dofs: Vec<Vec<usize>>,
    reduced_dofs: Vec<Vec<usize>>,
}

/// Growing cell subset supporting a set of DOF tuples.
#[derive(Clone, Debug)]
pub struct ReducedMesh {
    spaces: Vec<FunctionSpace>,
    partition: CellPartition,
    config: ReducedMeshConfig,
    cells: BTreeSet<usize>,
    reduced_spaces: Vec<FunctionSpace>,
    dofs: Vec<Vec<usize>>,
    reduced_dofs: Vec<Vec<usize>>,
    state: ReducedMeshState,
}

impl ReducedMesh {
    /// Reduced mesh over `spaces`, which must share one mesh.
    pub fn new(
        spaces: Vec<FunctionSpace>,
        partition: CellPartition,
        config: ReducedMeshConfig,
    ) -> Result<Self, RomError> {
        let Some(first) = spaces.first() else {
            return Err(RomError::Configuration(
                "a reduced mesh needs at least one function space".into(),
            ));
        };
        if spaces
            .iter()
            .any(|s| !Arc::ptr_eq(s.mesh(), first.mesh()) && s.mesh() != first.mesh())
        {
            return Err(RomError::InvalidGeometry(
                "reduced mesh spaces must live on the same mesh".into(),
            ));
        }
        Ok(Self {
            spaces,
            partition,
            config,
            cells: BTreeSet::new(),
            reduced_spaces: Vec::new(),
            dofs: Vec::new(),
            reduced_dofs: Vec::new(),
            state: ReducedMeshState::Empty,
        })
    }

    pub fn state(&self) -> ReducedMeshState {
        self.state
    }

    /// Number of spaces, i.e. the length of every DOF tuple.
    pub fn arity(&self) -> usize {
        self.spaces.len()
    }

    pub fn partition(&self) -> CellPartition {
        self.partition
    }

    pub fn function_spaces(&self) -> &[FunctionSpace] {
        &self.spaces
    }

    /// Accumulated cells, ascending global ids.
    pub fn cells(&self) -> Vec<usize> {
        self.cells.iter().copied().collect()
    }

    /// Record a DOF tuple, one DOF per space.
    ///
    /// Returns `false` if the tuple was already recorded.
    ///
    /// # Errors
    /// `DimensionMismatch` for a tuple of the wrong arity, `InvalidDof` for a
    /// DOF outside its space.
    pub fn append(&mut self, dofs: &[usize]) -> Result<bool, RomError> {
        if dofs.len() != self.arity() {
            return Err(RomError::DimensionMismatch {
                expected: self.arity(),
                found: dofs.len(),
            });
        }
        for (&dof, space) in dofs.iter().zip(&self.spaces) {
            if dof >= space.dim() {
                return Err(RomError::InvalidDof {
                    dof,
                    dim: space.dim(),
                });
            }
        }
        if self.dofs.iter().any(|recorded| recorded.as_slice() == dofs) {
            log::debug!("reduced mesh: {dofs:?} already recorded");
            return Ok(false);
        }

        let mut cells = self.cells.clone();
        for (&dof, space) in dofs.iter().zip(&self.spaces) {
            cells.extend(cells_touching(space, dof, &self.partition));
        }
        let new_cells = cells.len() > self.cells.len();
        let rebuild = self.reduced_spaces.is_empty()
            || new_cells
            || self.config.rebuild_policy == RebuildPolicy::Always;

        let (reduced_spaces, mut reduced_dofs) = if rebuild {
            let spaces = restrict_all(&self.spaces, &cells)?;
            let table = self
                .dofs
                .iter()
                .map(|tuple| map_to_reduced(&self.spaces, &spaces, tuple))
                .collect::<Result<Vec<_>, _>>()?;
            (spaces, table)
        } else {
            (self.reduced_spaces.clone(), self.reduced_dofs.clone())
        };
        reduced_dofs.push(map_to_reduced(&self.spaces, &reduced_spaces, dofs)?);

        log::debug!(
            "reduced mesh: appended {dofs:?}, {} cells ({} new), rebuilt = {rebuild}",
            cells.len(),
            cells.len() - self.cells.len()
        );
        self.cells = cells;
        self.reduced_spaces = reduced_spaces;
        self.reduced_dofs = reduced_dofs;
        self.dofs.push(dofs.to_vec());
        self.state = ReducedMeshState::Growing;
        #[cfg(any(debug_assertions, feature = "check-invariants"))]
        self.debug_assert_invariants();
        Ok(true)
    }

    /// Reduced space per coordinate; empty before the first append.
    pub fn get_reduced_function_spaces(&self) -> &[FunctionSpace] {
        &self.reduced_spaces
    }

    /// Recorded DOF tuples in append order.
    pub fn get_dofs_list(&self) -> &[Vec<usize>] {
        &self.dofs
    }

    /// Reduced DOF tuples matching [`ReducedMesh::get_dofs_list`] entry by entry.
    pub fn get_reduced_dofs_list(&self) -> &[Vec<usize>] {
        &self.reduced_dofs
    }

    /// Standalone mesh of the accumulated cells.
    pub fn get_reduced_mesh(&self) -> Result<(Mesh, SubmeshMaps), RomError> {
        extract_cells(self.spaces[0].mesh(), &self.cells())
    }

    /// Write `<directory>/<label>.reduced_mesh.json` atomically and freeze.
    pub fn save(&mut self, directory: impl AsRef<Path>, label: &str) -> Result<(), RomError> {
        let directory = directory.as_ref();
        fs::create_dir_all(directory)?;
        let file = ReducedMeshFile {
            version: REDUCED_MESH_FILE_VERSION,
            partitions: self.partition.n_parts(),
            space_dims: self.spaces.iter().map(FunctionSpace::dim).collect(),
            cells: self.cells(),
            dofs: self.dofs.clone(),
            reduced_dofs: self.reduced_dofs.clone(),
        };
        let path = reduced_mesh_path(directory, label);
        write_atomic(&path, &serde_json::to_vec_pretty(&file)?)?;
        self.state = ReducedMeshState::Frozen;
        log::info!(
            "saved reduced mesh ({} cells, {} tuples) to {}",
            file.cells.len(),
            file.dofs.len(),
            path.display()
        );
        Ok(())
    }

    /// Replace the state with `<directory>/<label>.reduced_mesh.json`.
    ///
    /// The reduced spaces are rebuilt with this mesh's partition and checked
    /// against the stored correspondence table. Returns `Ok(false)` and
    /// leaves the mesh untouched if the file does not exist.
    ///
    /// # Errors
    /// `PersistenceCorruption` if the file does not match these spaces or is
    /// internally inconsistent; the mesh is left untouched.
    pub fn load(&mut self, directory: impl AsRef<Path>, label: &str) -> Result<bool, RomError> {
        let path = reduced_mesh_path(directory.as_ref(), label);
        if !path.exists() {
            return Ok(false);
        }
        let corrupt =
            |what: String| RomError::PersistenceCorruption(format!("{}: {what}", path.display()));
        let bytes = fs::read(&path)?;
        let file: ReducedMeshFile =
            serde_json::from_slice(&bytes).map_err(|e| corrupt(e.to_string()))?;

        if file.version != REDUCED_MESH_FILE_VERSION {
            return Err(corrupt(format!("unsupported version {}", file.version)));
        }
        let dims: Vec<usize> = self.spaces.iter().map(FunctionSpace::dim).collect();
        if file.space_dims != dims {
            return Err(corrupt(format!(
                "saved for spaces of dimension {:?}, loading into {dims:?}",
                file.space_dims
            )));
        }
        if file.dofs.len() != file.reduced_dofs.len() {
            return Err(corrupt(format!(
                "{} DOF tuples but {} reduced DOF tuples",
                file.dofs.len(),
                file.reduced_dofs.len()
            )));
        }
        if file.cells.windows(2).any(|w| w[0] >= w[1]) {
            return Err(corrupt("cell ids are not strictly ascending".into()));
        }
        let n_cells = self.spaces[0].mesh().num_cells();
        if let Some(bad) = file.cells.iter().find(|&&c| c >= n_cells) {
            return Err(corrupt(format!("cell {bad} outside a mesh of {n_cells} cells")));
        }
        for tuple in &file.dofs {
            if tuple.len() != self.arity() || tuple.iter().zip(&dims).any(|(&d, &n)| d >= n) {
                return Err(corrupt(format!("invalid DOF tuple {tuple:?}")));
            }
        }

        let mut supported = BTreeSet::new();
        for tuple in &file.dofs {
            for (&dof, space) in tuple.iter().zip(&self.spaces) {
                supported.extend(cells_touching(space, dof, &self.partition));
            }
        }
        let cells: BTreeSet<usize> = file.cells.iter().copied().collect();
        if supported != cells {
            return Err(corrupt(
                "stored cells differ from the cells touching the stored DOFs".into(),
            ));
        }

        let reduced_spaces = if cells.is_empty() {
            Vec::new()
        } else {
            restrict_all(&self.spaces, &cells)?
        };
        for (tuple, stored) in file.dofs.iter().zip(&file.reduced_dofs) {
            let mapped = map_to_reduced(&self.spaces, &reduced_spaces, tuple)
                .map_err(|e| corrupt(e.to_string()))?;
            if &mapped != stored {
                return Err(corrupt(format!(
                    "DOFs {tuple:?} map to {mapped:?}, file records {stored:?}"
                )));
            }
        }

        log::info!(
            "loaded reduced mesh ({} cells, {} tuples) from {} (saved with {} partitions, loaded with {})",
            cells.len(),
            file.dofs.len(),
            path.display(),
            file.partitions,
            self.partition.n_parts()
        );
        self.cells = cells;
        self.reduced_spaces = reduced_spaces;
        self.dofs = file.dofs;
        self.reduced_dofs = file.reduced_dofs;
        self.state = ReducedMeshState::Frozen;
        Ok(true)
    }
}

fn reduced_mesh_path(directory: &Path, label: &str) -> PathBuf {
    directory.join(format!("{label}.reduced_mesh.json"))
}

/// Global ids of the active cells of `space` holding `dof`, ascending.
fn cells_touching(space: &FunctionSpace, dof: usize, partition: &CellPartition) -> Vec<usize> {
    let mut cells: Vec<usize> = partition
        .ranges(space.num_cells())
        .into_par_iter()
        .flat_map_iter(|range| space.cells_touching_in(dof, range))
        .map(|position| space.cells()[position])
        .collect();
    cells.sort_unstable();
    cells.dedup();
    cells
}

fn restrict_all(
    spaces: &[FunctionSpace],
    cells: &BTreeSet<usize>,
) -> Result<Vec<FunctionSpace>, RomError> {
    let cells: Vec<usize> = cells.iter().copied().collect();
    spaces.iter().map(|space| space.restrict(&cells)).collect()
}

fn map_to_reduced(
    spaces: &[FunctionSpace],
    reduced: &[FunctionSpace],
    tuple: &[usize],
) -> Result<Vec<usize>, RomError> {
    tuple
        .iter()
        .zip(spaces.iter().zip(reduced))
        .map(|(&dof, (full, reduced))| {
            let key = full.dof_key(dof).ok_or(RomError::InvalidDof {
                dof,
                dim: full.dim(),
            })?;
            reduced.dof_for_key(&key).ok_or_else(|| {
                RomError::InvalidGeometry(format!("DOF {dof} is not supported by the reduced cells"))
            })
        })
        .collect()
}

impl DebugInvariants for ReducedMesh {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "ReducedMesh");
    }

    fn validate_invariants(&self) -> Result<(), RomError> {
        if self.dofs.len() != self.reduced_dofs.len() {
            return Err(RomError::DimensionMismatch {
                expected: self.dofs.len(),
                found: self.reduced_dofs.len(),
            });
        }
        for (tuple, reduced) in self.dofs.iter().zip(&self.reduced_dofs) {
            if tuple.len() != self.arity() || reduced.len() != self.arity() {
                return Err(RomError::DimensionMismatch {
                    expected: self.arity(),
                    found: tuple.len().min(reduced.len()),
                });
            }
        }
        let inconsistent = match self.state {
            ReducedMeshState::Empty => !self.dofs.is_empty(),
            ReducedMeshState::Growing => self.dofs.is_empty(),
            ReducedMeshState::Frozen => false,
        };
        if inconsistent {
            return Err(RomError::Precondition(format!(
                "reduced mesh in state {:?} with {} tuples",
                self.state,
                self.dofs.len()
            )));
        }
        if !self.dofs.is_empty() && self.reduced_spaces.len() != self.arity() {
            return Err(RomError::DimensionMismatch {
                expected: self.arity(),
                found: self.reduced_spaces.len(),
            });
        }
        Ok(())
    }
}

/// Reduced mesh shared between threads: many readers, one appender at a time.
#[derive(Clone, Debug)]
pub struct SharedReducedMesh {
    inner: Arc<RwLock<ReducedMesh>>,
}

impl SharedReducedMesh {
    pub fn new(mesh: ReducedMesh) -> Self {
        Self {
            inner: Arc::new(RwLock::new(mesh)),
        }
    }

    /// [`ReducedMesh::append`] under the write lock.
    pub fn append(&self, dofs: &[usize]) -> Result<bool, RomError> {
        self.inner.write().append(dofs)
    }

    pub fn save(&self, directory: impl AsRef<Path>, label: &str) -> Result<(), RomError> {
        self.inner.write().save(directory, label)
    }

    pub fn load(&self, directory: impl AsRef<Path>, label: &str) -> Result<bool, RomError> {
        self.inner.write().load(directory, label)
    }

    /// Read access; appends block while the guard is alive.
    pub fn read(&self) -> RwLockReadGuard<'_, ReducedMesh> {
        self.inner.read()
    }
}

static_assertions::assert_impl_all!(ReducedMesh: Send, Sync);
static_assertions::assert_impl_all!(SharedReducedMesh: Send, Sync, Clone);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function_space::ElementSpec;
    use crate::mesh_generation::unit_square_mesh;

    fn q1_pair() -> Vec<FunctionSpace> {
        let mesh = Arc::new(unit_square_mesh(3, 3).unwrap());
        let v = FunctionSpace::new(mesh, ElementSpec::lagrange(1)).unwrap();
        vec![v.clone(), v]
    }

    fn builder(policy: RebuildPolicy) -> ReducedMesh {
        ReducedMesh::new(
            q1_pair(),
            CellPartition::new(2).unwrap(),
            ReducedMeshConfig {
                rebuild_policy: policy,
            },
        )
        .unwrap()
    }

    #[test]
    fn corner_dof_touches_one_cell() {
        let mut rm = builder(RebuildPolicy::Always);
        assert_eq!(rm.state(), ReducedMeshState::Empty);
        assert!(rm.append(&[0, 0]).unwrap());
        assert_eq!(rm.state(), ReducedMeshState::Growing);
        assert_eq!(rm.cells(), vec![0]);
        assert_eq!(rm.get_reduced_function_spaces()[0].dim(), 4);
    }

    #[test]
    fn interior_dof_touches_four_cells() {
        let mut rm = builder(RebuildPolicy::Always);
        let v = &rm.function_spaces()[0];
        // Vertex 5 is interior; find its DOF through the first cell.
        let dof = v.cell_dofs(0)[2];
        rm.append(&[dof, dof]).unwrap();
        assert_eq!(rm.cells(), vec![0, 1, 3, 4]);
        let (sub, maps) = rm.get_reduced_mesh().unwrap();
        assert_eq!(sub.num_cells(), 4);
        assert_eq!(maps.sub_to_parent_cells, vec![0, 1, 3, 4]);
    }

    #[test]
    fn duplicate_tuple_is_a_no_op() {
        let mut rm = builder(RebuildPolicy::Always);
        rm.append(&[1, 2]).unwrap();
        let dofs = rm.get_dofs_list().to_vec();
        let reduced = rm.get_reduced_dofs_list().to_vec();
        assert!(!rm.append(&[1, 2]).unwrap());
        assert_eq!(rm.get_dofs_list(), dofs.as_slice());
        assert_eq!(rm.get_reduced_dofs_list(), reduced.as_slice());
    }

    #[test]
    fn policies_agree() {
        let mut always = builder(RebuildPolicy::Always);
        let mut lazy = builder(RebuildPolicy::OnNewCells);
        for tuple in [[5, 6], [6, 5], [15, 10], [5, 5]] {
            always.append(&tuple).unwrap();
            lazy.append(&tuple).unwrap();
        }
        assert_eq!(always.get_reduced_dofs_list(), lazy.get_reduced_dofs_list());
        assert_eq!(always.cells(), lazy.cells());
    }

    #[test]
    fn bad_tuples_are_rejected() {
        let mut rm = builder(RebuildPolicy::Always);
        assert!(matches!(
            rm.append(&[1]),
            Err(RomError::DimensionMismatch { expected: 2, found: 1 })
        ));
        assert!(matches!(
            rm.append(&[1, 16]),
            Err(RomError::InvalidDof { dof: 16, dim: 16 })
        ));
        assert_eq!(rm.state(), ReducedMeshState::Empty);
    }

    #[test]
    fn shared_mesh_serializes_appends() {
        let shared = SharedReducedMesh::new(builder(RebuildPolicy::Always));
        std::thread::scope(|s| {
            for t in 0..4 {
                let shared = shared.clone();
                s.spawn(move || {
                    for d in 0..4 {
                        shared.append(&[t * 4 + d, d]).unwrap();
                    }
                });
            }
        });
        let guard = shared.read();
        assert_eq!(guard.get_dofs_list().len(), 16);
        guard.validate_invariants().unwrap();
    }
}
