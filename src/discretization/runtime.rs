//! Runtime basis/quadrature lookup and element integration utilities.

use crate::mesh::CellType;
use crate::rom_error::RomError;

/// Supported Lagrange basis implementations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Basis {
    /// Linear Lagrange basis on a segment.
    LagrangeP1Segment,
    /// Quadratic Lagrange basis on a segment.
    LagrangeP2Segment,
    /// Bilinear Lagrange basis on a quadrilateral.
    LagrangeQ1Quadrilateral,
    /// Biquadratic Lagrange basis on a quadrilateral.
    LagrangeQ2Quadrilateral,
}

/// Mesh entity a local basis node is attached to.
///
/// Vertex and edge indices are local to the cell (positions in its vertex
/// list). Edge nodes sit at the midpoint of the two vertices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LocalNode {
    Vertex(usize),
    Edge(usize, usize),
    Interior,
}

const P1_SEGMENT_NODES: [LocalNode; 2] = [LocalNode::Vertex(0), LocalNode::Vertex(1)];
const P2_SEGMENT_NODES: [LocalNode; 3] = [
    LocalNode::Vertex(0),
    LocalNode::Vertex(1),
    LocalNode::Interior,
];
const Q1_QUAD_NODES: [LocalNode; 4] = [
    LocalNode::Vertex(0),
    LocalNode::Vertex(1),
    LocalNode::Vertex(2),
    LocalNode::Vertex(3),
];
const Q2_QUAD_NODES: [LocalNode; 9] = [
    LocalNode::Vertex(0),
    LocalNode::Vertex(1),
    LocalNode::Vertex(2),
    LocalNode::Vertex(3),
    LocalNode::Edge(0, 1),
    LocalNode::Edge(1, 2),
    LocalNode::Edge(2, 3),
    LocalNode::Edge(3, 0),
    LocalNode::Interior,
];

/// 1D quadratic factor per Q2 node, as indices into `[x = -1, x = 0, x = 1]`.
const Q2_FACTORS: [(usize, usize); 9] = [
    (0, 0),
    (2, 0),
    (2, 2),
    (0, 2),
    (1, 0),
    (2, 1),
    (1, 2),
    (0, 1),
    (1, 1),
];

impl Basis {
    /// Resolve the Lagrange basis of `degree` on `cell_type`.
    pub fn lagrange(cell_type: CellType, degree: usize) -> Result<Self, RomError> {
        match (cell_type, degree) {
            (CellType::Segment, 1) => Ok(Self::LagrangeP1Segment),
            (CellType::Segment, 2) => Ok(Self::LagrangeP2Segment),
            (CellType::Quadrilateral, 1) => Ok(Self::LagrangeQ1Quadrilateral),
            (CellType::Quadrilateral, 2) => Ok(Self::LagrangeQ2Quadrilateral),
            _ => Err(RomError::InvalidGeometry(format!(
                "unsupported Lagrange degree {degree} on {cell_type:?}"
            ))),
        }
    }

    /// The basis used to map the reference cell to its vertices.
    pub fn geometric(cell_type: CellType) -> Self {
        match cell_type {
            CellType::Segment => Self::LagrangeP1Segment,
            CellType::Quadrilateral => Self::LagrangeQ1Quadrilateral,
        }
    }

    /// Reference dimension of the basis.
    pub fn dimension(&self) -> usize {
        self.cell_type().dimension()
    }

    pub fn degree(&self) -> usize {
        match self {
            Basis::LagrangeP1Segment | Basis::LagrangeQ1Quadrilateral => 1,
            Basis::LagrangeP2Segment | Basis::LagrangeQ2Quadrilateral => 2,
        }
    }

    /// Number of basis functions per element.
    pub fn num_nodes(&self) -> usize {
        self.local_nodes().len()
    }

    /// The cell type supported by this basis.
    pub fn cell_type(&self) -> CellType {
        match self {
            Basis::LagrangeP1Segment | Basis::LagrangeP2Segment => CellType::Segment,
            Basis::LagrangeQ1Quadrilateral | Basis::LagrangeQ2Quadrilateral => {
                CellType::Quadrilateral
            }
        }
    }

    /// Local nodes in basis-function order.
    pub fn local_nodes(&self) -> &'static [LocalNode] {
        match self {
            Basis::LagrangeP1Segment => &P1_SEGMENT_NODES,
            Basis::LagrangeP2Segment => &P2_SEGMENT_NODES,
            Basis::LagrangeQ1Quadrilateral => &Q1_QUAD_NODES,
            Basis::LagrangeQ2Quadrilateral => &Q2_QUAD_NODES,
        }
    }

    /// Evaluate basis values and gradients at reference points.
    pub fn tabulate(&self, points: &[Vec<f64>]) -> Result<BasisTabulation, RomError> {
        let dim = self.dimension();
        if let Some(bad) = points.iter().find(|p| p.len() != dim) {
            return Err(RomError::InvalidGeometry(format!(
                "{self:?} expects {dim}D reference points, found {}D",
                bad.len()
            )));
        }
        let mut values = Vec::with_capacity(points.len());
        let mut gradients = Vec::with_capacity(points.len());
        for point in points {
            let (v, g) = match self {
                Basis::LagrangeP1Segment => p1_segment(point[0]),
                Basis::LagrangeP2Segment => p2_segment(point[0]),
                Basis::LagrangeQ1Quadrilateral => q1_quad(point[0], point[1]),
                Basis::LagrangeQ2Quadrilateral => q2_quad(point[0], point[1]),
            };
            values.push(v);
            gradients.push(g);
        }
        Ok(BasisTabulation { values, gradients })
    }
}

/// Basis function tabulation on the reference element.
#[derive(Clone, Debug)]
pub struct BasisTabulation {
    /// Basis values per quadrature point: `[qp][basis]`.
    pub values: Vec<Vec<f64>>,
    /// Reference gradients per quadrature point: `[qp][basis][dim]`.
    pub gradients: Vec<Vec<Vec<f64>>>,
}

/// Quadrature rule on the reference element.
#[derive(Clone, Debug)]
pub struct QuadratureRule {
    /// Name for diagnostics.
    pub name: String,
    /// Quadrature points in reference coordinates.
    pub points: Vec<Vec<f64>>,
    /// Quadrature weights.
    pub weights: Vec<f64>,
}

impl QuadratureRule {
    /// Gauss-Legendre rule with `points_per_dim` points along each axis.
    pub fn gauss(cell_type: CellType, points_per_dim: usize) -> Result<Self, RomError> {
        let line = gauss_legendre_1d(points_per_dim)?;
        Ok(match cell_type {
            CellType::Segment => line,
            CellType::Quadrilateral => tensor_product_quadrature(&line, &line),
        })
    }

    /// Dimension of the quadrature points.
    pub fn dimension(&self) -> usize {
        self.points.first().map(|p| p.len()).unwrap_or(0)
    }
}

/// Combined runtime basis/quadrature for an element.
#[derive(Clone, Debug)]
pub struct ElementRuntime {
    pub basis: Basis,
    pub quadrature: QuadratureRule,
}

impl ElementRuntime {
    pub fn new(basis: Basis, quadrature: QuadratureRule) -> Self {
        Self { basis, quadrature }
    }

    /// Lagrange basis of `degree` with a Gauss rule exact for its mass matrix.
    pub fn lagrange(cell_type: CellType, degree: usize) -> Result<Self, RomError> {
        let basis = Basis::lagrange(cell_type, degree)?;
        let quadrature = QuadratureRule::gauss(cell_type, degree + 1)?;
        Ok(Self { basis, quadrature })
    }
}

/// Tabulation data on a physical element.
#[derive(Clone, Debug)]
pub struct ElementTabulation {
    /// Quadrature weights (reference).
    pub weights: Vec<f64>,
    /// Quadrature points in physical space.
    pub physical_points: Vec<Vec<f64>>,
    /// Basis values per quadrature point.
    pub basis_values: Vec<Vec<f64>>,
    /// Basis gradients per quadrature point in physical coordinates.
    pub basis_gradients: Vec<Vec<Vec<f64>>>,
    /// Absolute value of the Jacobian determinant per quadrature point.
    pub jacobian_dets: Vec<f64>,
}

impl ElementTabulation {
    pub fn num_basis(&self) -> usize {
        self.basis_values.first().map(|v| v.len()).unwrap_or(0)
    }

    pub fn num_points(&self) -> usize {
        self.weights.len()
    }
}

/// Build element tabulation on the cell with the given vertex coordinates.
///
/// The geometry is always mapped with the linear (P1/Q1) basis, so
/// higher-order fields share the Jacobians of the vertex map.
pub fn tabulate_element(
    runtime: &ElementRuntime,
    vertex_coords: &[Vec<f64>],
) -> Result<ElementTabulation, RomError> {
    let basis = &runtime.basis;
    let cell_type = basis.cell_type();
    let geometry = Basis::geometric(cell_type);
    if vertex_coords.len() != cell_type.num_vertices() {
        return Err(RomError::InvalidGeometry(format!(
            "expected {} vertex coordinates, found {}",
            cell_type.num_vertices(),
            vertex_coords.len()
        )));
    }
    let dim = basis.dimension();
    if let Some(bad) = vertex_coords.iter().find(|c| c.len() != dim) {
        return Err(RomError::InvalidGeometry(format!(
            "basis dimension {dim} does not match coordinate dimension {}",
            bad.len()
        )));
    }

    let quad = &runtime.quadrature;
    if quad.dimension() != dim {
        return Err(RomError::InvalidGeometry(format!(
            "quadrature dimension {} does not match basis dimension {dim}",
            quad.dimension()
        )));
    }
    let geom_tab = geometry.tabulate(&quad.points)?;
    let basis_tab = basis.tabulate(&quad.points)?;
    let n_points = quad.points.len();
    let mut jacobian_dets = Vec::with_capacity(n_points);
    let mut basis_gradients = Vec::with_capacity(n_points);
    let mut physical_points = Vec::with_capacity(n_points);

    for qp in 0..n_points {
        let jac = build_jacobian(dim, vertex_coords, &geom_tab.gradients[qp]);
        let (det, inv) = invert_jacobian(dim, &jac)?;
        jacobian_dets.push(det.abs());

        let mut grad_qp = Vec::with_capacity(basis.num_nodes());
        for ref_grad in &basis_tab.gradients[qp] {
            let mut phys_grad = vec![0.0; dim];
            for (phys_dim, slot) in phys_grad.iter_mut().enumerate() {
                for ref_dim in 0..dim {
                    *slot += inv[ref_dim * dim + phys_dim] * ref_grad[ref_dim];
                }
            }
            grad_qp.push(phys_grad);
        }
        basis_gradients.push(grad_qp);

        let mut x = vec![0.0; dim];
        for (vertex, value) in vertex_coords.iter().zip(&geom_tab.values[qp]) {
            for d in 0..dim {
                x[d] += value * vertex[d];
            }
        }
        physical_points.push(x);
    }

    Ok(ElementTabulation {
        weights: quad.weights.clone(),
        physical_points,
        basis_values: basis_tab.values,
        basis_gradients,
        jacobian_dets,
    })
}

/// Local matrix of `∫ D_test(φ_i) D_trial(ψ_j)`, row-major `[test][trial]`.
///
/// `None` selects the basis value, `Some(d)` the physical derivative along
/// axis `d`. Both tabulations must come from the same cell and quadrature.
pub fn local_form_matrix(
    test: &ElementTabulation,
    trial: &ElementTabulation,
    test_derivative: Option<usize>,
    trial_derivative: Option<usize>,
) -> Result<Vec<f64>, RomError> {
    if test.num_points() != trial.num_points() {
        return Err(RomError::InvalidGeometry(format!(
            "test and trial tabulations use {} and {} quadrature points",
            test.num_points(),
            trial.num_points()
        )));
    }
    let rows = test.num_basis();
    let cols = trial.num_basis();
    let pick = |tab: &ElementTabulation, qp: usize, i: usize, d: Option<usize>| match d {
        None => Ok(tab.basis_values[qp][i]),
        Some(axis) => tab.basis_gradients[qp][i].get(axis).copied().ok_or_else(|| {
            RomError::InvalidGeometry(format!("no derivative along axis {axis}"))
        }),
    };
    let mut matrix = vec![0.0; rows * cols];
    for qp in 0..test.num_points() {
        let weight = test.weights[qp] * test.jacobian_dets[qp];
        for i in 0..rows {
            let phi = pick(test, qp, i, test_derivative)?;
            for j in 0..cols {
                let psi = pick(trial, qp, j, trial_derivative)?;
                matrix[i * cols + j] += weight * phi * psi;
            }
        }
    }
    Ok(matrix)
}

/// Compute a local Poisson stiffness matrix from tabulation data.
pub fn local_stiffness_matrix(tabulation: &ElementTabulation) -> Vec<f64> {
    let num_nodes = tabulation.num_basis();
    let mut matrix = vec![0.0; num_nodes * num_nodes];
    for (qp, grads) in tabulation.basis_gradients.iter().enumerate() {
        let weight = tabulation.weights[qp] * tabulation.jacobian_dets[qp];
        for i in 0..num_nodes {
            for j in 0..num_nodes {
                let dot = grads[i]
                    .iter()
                    .zip(grads[j].iter())
                    .map(|(a, b)| a * b)
                    .sum::<f64>();
                matrix[i * num_nodes + j] += weight * dot;
            }
        }
    }
    matrix
}

/// Compute a local load vector for a source term `rhs`.
pub fn local_load_vector<F>(tabulation: &ElementTabulation, rhs: F) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64,
{
    let num_nodes = tabulation.num_basis();
    let mut vector = vec![0.0; num_nodes];
    for (qp, values) in tabulation.basis_values.iter().enumerate() {
        let weight = tabulation.weights[qp] * tabulation.jacobian_dets[qp];
        let f_val = rhs(&tabulation.physical_points[qp]);
        for i in 0..num_nodes {
            vector[i] += weight * f_val * values[i];
        }
    }
    vector
}

fn p1_segment(xi: f64) -> (Vec<f64>, Vec<Vec<f64>>) {
    (
        vec![0.5 * (1.0 - xi), 0.5 * (1.0 + xi)],
        vec![vec![-0.5], vec![0.5]],
    )
}

/// Quadratic Lagrange polynomials on the nodes `-1, 0, 1` and their derivatives.
fn quadratic_1d(x: f64) -> ([f64; 3], [f64; 3]) {
    (
        [0.5 * x * (x - 1.0), 1.0 - x * x, 0.5 * x * (x + 1.0)],
        [x - 0.5, -2.0 * x, x + 0.5],
    )
}

fn p2_segment(xi: f64) -> (Vec<f64>, Vec<Vec<f64>>) {
    let (l, dl) = quadratic_1d(xi);
    (vec![l[0], l[2], l[1]], vec![vec![dl[0]], vec![dl[2]], vec![dl[1]]])
}

fn q1_quad(xi: f64, eta: f64) -> (Vec<f64>, Vec<Vec<f64>>) {
    let n1 = 0.25 * (1.0 - xi) * (1.0 - eta);
    let n2 = 0.25 * (1.0 + xi) * (1.0 - eta);
    let n3 = 0.25 * (1.0 + xi) * (1.0 + eta);
    let n4 = 0.25 * (1.0 - xi) * (1.0 + eta);
    let dndxi = vec![
        vec![-0.25 * (1.0 - eta), -0.25 * (1.0 - xi)],
        vec![0.25 * (1.0 - eta), -0.25 * (1.0 + xi)],
        vec![0.25 * (1.0 + eta), 0.25 * (1.0 + xi)],
        vec![-0.25 * (1.0 + eta), 0.25 * (1.0 - xi)],
    ];
    (vec![n1, n2, n3, n4], dndxi)
}

fn q2_quad(xi: f64, eta: f64) -> (Vec<f64>, Vec<Vec<f64>>) {
    let (lx, dlx) = quadratic_1d(xi);
    let (ly, dly) = quadratic_1d(eta);
    let values = Q2_FACTORS.iter().map(|&(a, b)| lx[a] * ly[b]).collect();
    let gradients = Q2_FACTORS
        .iter()
        .map(|&(a, b)| vec![dlx[a] * ly[b], lx[a] * dly[b]])
        .collect();
    (values, gradients)
}

fn gauss_legendre_1d(order: usize) -> Result<QuadratureRule, RomError> {
    let (points, weights) = match order {
        1 => (vec![0.0], vec![2.0]),
        2 => {
            let pt = 1.0_f64 / 3.0_f64.sqrt();
            (vec![-pt, pt], vec![1.0, 1.0])
        }
        3 => {
            let pt = (3.0_f64 / 5.0).sqrt();
            (vec![-pt, 0.0, pt], vec![5.0 / 9.0, 8.0 / 9.0, 5.0 / 9.0])
        }
        _ => {
            return Err(RomError::InvalidGeometry(format!(
                "unsupported Gauss-Legendre order {order}"
            )));
        }
    };
    Ok(QuadratureRule {
        name: format!("gauss{order}"),
        points: points.into_iter().map(|p| vec![p]).collect(),
        weights,
    })
}

fn tensor_product_quadrature(a: &QuadratureRule, b: &QuadratureRule) -> QuadratureRule {
    let mut points = Vec::with_capacity(a.points.len() * b.points.len());
    let mut weights = Vec::with_capacity(a.points.len() * b.points.len());
    for (pa, wa) in a.points.iter().zip(a.weights.iter()) {
        for (pb, wb) in b.points.iter().zip(b.weights.iter()) {
            let mut pt = Vec::with_capacity(pa.len() + pb.len());
            pt.extend_from_slice(pa);
            pt.extend_from_slice(pb);
            points.push(pt);
            weights.push(wa * wb);
        }
    }
    QuadratureRule {
        name: format!("{}x{}", a.name, b.points.len()),
        points,
        weights,
    }
}

fn build_jacobian(dim: usize, vertex_coords: &[Vec<f64>], ref_grads: &[Vec<f64>]) -> Vec<f64> {
    let mut jac = vec![0.0; dim * dim];
    for (vertex, grad) in vertex_coords.iter().zip(ref_grads.iter()) {
        for phys_dim in 0..dim {
            for ref_dim in 0..dim {
                jac[phys_dim * dim + ref_dim] += vertex[phys_dim] * grad[ref_dim];
            }
        }
    }
    jac
}

fn invert_jacobian(dim: usize, jac: &[f64]) -> Result<(f64, Vec<f64>), RomError> {
    let singular = || RomError::InvalidGeometry("zero Jacobian determinant".to_string());
    match dim {
        1 => {
            let det = jac[0];
            if det.abs() < f64::EPSILON {
                return Err(singular());
            }
            Ok((det, vec![1.0 / det]))
        }
        2 => {
            let (a, b, c, d) = (jac[0], jac[1], jac[2], jac[3]);
            let det = a * d - b * c;
            if det.abs() < f64::EPSILON {
                return Err(singular());
            }
            Ok((det, vec![d / det, -b / det, -c / det, a / det]))
        }
        _ => Err(RomError::InvalidGeometry(format!(
            "unsupported Jacobian dimension {dim}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_quad() -> Vec<Vec<f64>> {
        vec![
            vec![0.0, 0.0],
            vec![1.0, 0.0],
            vec![1.0, 1.0],
            vec![0.0, 1.0],
        ]
    }

    #[test]
    fn q2_is_a_partition_of_unity_and_nodal() {
        let basis = Basis::LagrangeQ2Quadrilateral;
        let nodes = vec![
            vec![-1.0, -1.0],
            vec![1.0, -1.0],
            vec![1.0, 1.0],
            vec![-1.0, 1.0],
            vec![0.0, -1.0],
            vec![1.0, 0.0],
            vec![0.0, 1.0],
            vec![-1.0, 0.0],
            vec![0.0, 0.0],
        ];
        let tab = basis.tabulate(&nodes).unwrap();
        for (i, row) in tab.values.iter().enumerate() {
            for (j, v) in row.iter().enumerate() {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((v - expected).abs() < 1e-14, "node {i} basis {j}: {v}");
            }
        }
        let inner = basis.tabulate(&[vec![0.3, -0.7]]).unwrap();
        let sum: f64 = inner.values[0].iter().sum();
        assert!((sum - 1.0).abs() < 1e-14);
        let grad_sum: f64 = inner.gradients[0].iter().map(|g| g[0]).sum();
        assert!(grad_sum.abs() < 1e-14);
    }

    #[test]
    fn mass_matrix_integrates_area() {
        for degree in 1..=2 {
            let runtime = ElementRuntime::lagrange(CellType::Quadrilateral, degree).unwrap();
            let tab = tabulate_element(&runtime, &unit_quad()).unwrap();
            let mass = local_form_matrix(&tab, &tab, None, None).unwrap();
            let total: f64 = mass.iter().sum();
            assert!((total - 1.0).abs() < 1e-13, "degree {degree}: {total}");
        }
    }

    #[test]
    fn p1_stiffness_on_segment() {
        let runtime = ElementRuntime::lagrange(CellType::Segment, 1).unwrap();
        let tab = tabulate_element(&runtime, &[vec![0.0], vec![0.5]]).unwrap();
        let k = local_stiffness_matrix(&tab);
        assert!((k[0] - 2.0).abs() < 1e-13);
        assert!((k[1] + 2.0).abs() < 1e-13);
        let f = local_load_vector(&tab, |_| 1.0);
        assert!((f[0] - 0.25).abs() < 1e-14);
    }

    #[test]
    fn mixed_degree_tabulations_share_quadrature() {
        let quad = QuadratureRule::gauss(CellType::Quadrilateral, 3).unwrap();
        let q2 = ElementRuntime::new(Basis::LagrangeQ2Quadrilateral, quad.clone());
        let q1 = ElementRuntime::new(Basis::LagrangeQ1Quadrilateral, quad);
        let t2 = tabulate_element(&q2, &unit_quad()).unwrap();
        let t1 = tabulate_element(&q1, &unit_quad()).unwrap();
        let b = local_form_matrix(&t2, &t1, Some(0), None).unwrap();
        assert_eq!(b.len(), 9 * 4);
        // ∫ ∂x(Σφ_i) ψ_j = 0 since Σφ_i = 1.
        for j in 0..4 {
            let col: f64 = (0..9).map(|i| b[i * 4 + j]).sum();
            assert!(col.abs() < 1e-13);
        }
    }

    #[test]
    fn unsupported_degree_is_rejected() {
        assert!(Basis::lagrange(CellType::Segment, 3).is_err());
        assert!(QuadratureRule::gauss(CellType::Segment, 4).is_err());
    }
}
