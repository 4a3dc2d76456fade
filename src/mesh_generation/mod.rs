//! Structured mesh generators.

use crate::mesh::{CellType, Mesh};
use crate::rom_error::RomError;

fn invalid_geometry(message: impl Into<String>) -> RomError {
    RomError::InvalidGeometry(message.into())
}

/// Generate a 1D interval mesh with `n` segments over `[min, max]`.
///
/// Vertex `i` sits at `min + i (max - min) / n`; segment `i` is `[i, i + 1]`.
pub fn interval_mesh(n: usize, min: f64, max: f64) -> Result<Mesh, RomError> {
    if n == 0 {
        return Err(invalid_geometry("n must be positive"));
    }
    if !(max > min) {
        return Err(invalid_geometry(format!("empty interval [{min}, {max}]")));
    }

    let dx = (max - min) / n as f64;
    let mut vertices = Vec::with_capacity(n + 1);
    for i in 0..=n {
        vertices.push(vec![min + dx * i as f64]);
    }

    let mut cells = Vec::with_capacity(n);
    for i in 0..n {
        cells.push(vec![i, i + 1]);
    }

    Mesh::new(CellType::Segment, vertices, cells)
}

/// Generate a structured quadrilateral mesh over `[min, max]` with `nx`×`ny` cells.
///
/// Vertices are numbered row by row from the lower left; cell `j * nx + i`
/// has vertices `[v0, v0 + 1, v0 + nx + 2, v0 + nx + 1]` with
/// `v0 = j (nx + 1) + i`.
pub fn quad_mesh(nx: usize, ny: usize, min: [f64; 2], max: [f64; 2]) -> Result<Mesh, RomError> {
    if nx == 0 || ny == 0 {
        return Err(invalid_geometry("nx and ny must be positive"));
    }
    if !(max[0] > min[0] && max[1] > min[1]) {
        return Err(invalid_geometry(format!("empty box {min:?} x {max:?}")));
    }

    let dx = (max[0] - min[0]) / nx as f64;
    let dy = (max[1] - min[1]) / ny as f64;
    let mut vertices = Vec::with_capacity((nx + 1) * (ny + 1));
    for j in 0..=ny {
        let y = min[1] + dy * j as f64;
        for i in 0..=nx {
            let x = min[0] + dx * i as f64;
            vertices.push(vec![x, y]);
        }
    }

    let mut cells = Vec::with_capacity(nx * ny);
    let row_stride = nx + 1;
    for j in 0..ny {
        for i in 0..nx {
            let v0 = j * row_stride + i;
            let v1 = v0 + 1;
            let v3 = v0 + row_stride;
            let v2 = v3 + 1;
            cells.push(vec![v0, v1, v2, v3]);
        }
    }

    Mesh::new(CellType::Quadrilateral, vertices, cells)
}

/// `nx`×`ny` quadrilaterals on the unit square.
pub fn unit_square_mesh(nx: usize, ny: usize) -> Result<Mesh, RomError> {
    quad_mesh(nx, ny, [0.0, 0.0], [1.0, 1.0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_counts_and_coordinates() {
        let mesh = interval_mesh(4, 0.0, 2.0).unwrap();
        assert_eq!(mesh.num_cells(), 4);
        assert_eq!(mesh.num_vertices(), 5);
        assert_eq!(mesh.vertex_coordinates(3).unwrap(), &[1.5]);
        assert_eq!(mesh.cell_vertices(2).unwrap(), &[2, 3]);
    }

    #[test]
    fn unit_square_connectivity_is_counter_clockwise() {
        let mesh = unit_square_mesh(3, 3).unwrap();
        assert_eq!(mesh.num_cells(), 9);
        assert_eq!(mesh.num_vertices(), 16);
        assert_eq!(mesh.cell_vertices(4).unwrap(), &[5, 6, 10, 9]);
        let coords = mesh.cell_coordinates(0).unwrap();
        let third = 1.0 / 3.0;
        assert_eq!(coords[2], vec![third, third]);
    }

    #[test]
    fn degenerate_inputs_are_rejected() {
        assert!(interval_mesh(0, 0.0, 1.0).is_err());
        assert!(interval_mesh(2, 1.0, 1.0).is_err());
        assert!(quad_mesh(0, 1, [0.0, 0.0], [1.0, 1.0]).is_err());
    }
}
