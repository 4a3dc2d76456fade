//! Sparse assembly of bilinear forms between two function spaces.
//!
//! A form is a sum of [`FormTerm`]s, each the integral of a (derivative of a)
//! test field times a (derivative of a) trial field. Assembly walks the
//! active cells in ascending order and scatters dense local matrices into a
//! hash-backed [`SparseMatrix`]; a cell contributes the same local matrix
//! whether it belongs to a full or a reduced space, so entries evaluated at
//! corresponding DOFs agree between the two.

use crate::discretization::runtime::{
    ElementRuntime, ElementTabulation, QuadratureRule, local_form_matrix, tabulate_element,
};
use crate::function_space::FunctionSpace;
use crate::rom_error::RomError;
use hashbrown::HashMap;
use std::sync::Arc;

/// One term `c ∫ D(test_field) D(trial_field)` of a bilinear form.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FormTerm {
    pub test_field: usize,
    pub trial_field: usize,
    /// `None` for the value, `Some(axis)` for a physical derivative.
    pub test_derivative: Option<usize>,
    pub trial_derivative: Option<usize>,
    pub coefficient: f64,
}

impl FormTerm {
    /// `∫ u v` between two fields.
    pub fn mass(test_field: usize, trial_field: usize) -> Self {
        Self {
            test_field,
            trial_field,
            test_derivative: None,
            trial_derivative: None,
            coefficient: 1.0,
        }
    }

    /// `∫ ∂_axis u ∂_axis v` between two fields.
    pub fn stiffness(test_field: usize, trial_field: usize, axis: usize) -> Self {
        Self {
            test_derivative: Some(axis),
            trial_derivative: Some(axis),
            ..Self::mass(test_field, trial_field)
        }
    }

    pub fn with_test_derivative(mut self, axis: usize) -> Self {
        self.test_derivative = Some(axis);
        self
    }

    pub fn with_trial_derivative(mut self, axis: usize) -> Self {
        self.trial_derivative = Some(axis);
        self
    }

    pub fn scaled(mut self, coefficient: f64) -> Self {
        self.coefficient *= coefficient;
        self
    }
}

/// Hash-backed sparse matrix.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SparseMatrix {
    nrows: usize,
    ncols: usize,
    entries: HashMap<(usize, usize), f64>,
}

impl SparseMatrix {
    pub fn new(nrows: usize, ncols: usize) -> Self {
        Self {
            nrows,
            ncols,
            entries: HashMap::new(),
        }
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Number of structurally nonzero entries.
    pub fn nnz(&self) -> usize {
        self.entries.len()
    }

    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        *self.entries.entry((row, col)).or_insert(0.0) += value;
    }

    /// Entry `(row, col)`; structurally absent entries are zero.
    pub fn get(&self, row: usize, col: usize) -> Result<f64, RomError> {
        if row >= self.nrows {
            return Err(RomError::InvalidDof { dof: row, dim: self.nrows });
        }
        if col >= self.ncols {
            return Err(RomError::InvalidDof { dof: col, dim: self.ncols });
        }
        Ok(self.entries.get(&(row, col)).copied().unwrap_or(0.0))
    }
}

/// Assemble `Σ terms` with rows from `test` and columns from `trial`.
///
/// Both spaces must live on the same mesh and the same active cells.
pub fn assemble_bilinear_form(
    test: &FunctionSpace,
    trial: &FunctionSpace,
    terms: &[FormTerm],
) -> Result<SparseMatrix, RomError> {
    if !Arc::ptr_eq(test.mesh(), trial.mesh()) && test.mesh() != trial.mesh() {
        return Err(RomError::InvalidGeometry(
            "test and trial spaces live on different meshes".into(),
        ));
    }
    if test.cells() != trial.cells() {
        return Err(RomError::InvalidGeometry(
            "test and trial spaces have different active cells".into(),
        ));
    }
    for term in terms {
        if term.test_field >= test.num_fields() || term.trial_field >= trial.num_fields() {
            return Err(RomError::UnknownComponent(format!(
                "form term on fields ({}, {})",
                term.test_field, term.trial_field
            )));
        }
    }

    let mesh = test.mesh();
    let cell_type = mesh.cell_type();
    let max_degree = (0..test.num_fields())
        .filter_map(|f| test.field_basis(f))
        .chain((0..trial.num_fields()).filter_map(|f| trial.field_basis(f)))
        .map(|b| b.degree())
        .max()
        .unwrap_or(1);
    let quadrature = QuadratureRule::gauss(cell_type, max_degree + 1)?;

    let mut matrix = SparseMatrix::new(test.dim(), trial.dim());
    for (position, &cell) in test.cells().iter().enumerate() {
        let vertex_coords = mesh.cell_coordinates(cell)?;
        let tabulate = |space: &FunctionSpace, field: usize| -> Result<ElementTabulation, RomError> {
            let basis = space.field_basis(field).ok_or_else(|| {
                RomError::UnknownComponent(format!("field {field}"))
            })?;
            tabulate_element(&ElementRuntime::new(basis, quadrature.clone()), &vertex_coords)
        };
        for term in terms {
            let test_tab = tabulate(test, term.test_field)?;
            let trial_tab = tabulate(trial, term.trial_field)?;
            let local = local_form_matrix(
                &test_tab,
                &trial_tab,
                term.test_derivative,
                term.trial_derivative,
            )?;
            let rows = test.field_cell_dofs(position, term.test_field);
            let cols = trial.field_cell_dofs(position, term.trial_field);
            for (i, &row) in rows.iter().enumerate() {
                for (j, &col) in cols.iter().enumerate() {
                    matrix.add(row, col, term.coefficient * local[i * cols.len() + j]);
                }
            }
        }
    }
    log::debug!(
        "assembled {}x{} form with {} terms on {} cells ({} nonzeros)",
        matrix.nrows(),
        matrix.ncols(),
        terms.len(),
        test.num_cells(),
        matrix.nnz()
    );
    Ok(matrix)
}

/// Entries of `matrix` at DOF tuples `(row, col)`.
///
/// # Errors
/// `DimensionMismatch` if a tuple is not a pair, `InvalidDof` if out of range.
pub fn evaluate_sparse_matrix_at_dofs(
    matrix: &SparseMatrix,
    dofs: &[Vec<usize>],
) -> Result<Vec<f64>, RomError> {
    dofs.iter()
        .map(|pair| match pair.as_slice() {
            &[row, col] => matrix.get(row, col),
            other => Err(RomError::DimensionMismatch {
                expected: 2,
                found: other.len(),
            }),
        })
        .collect()
}
