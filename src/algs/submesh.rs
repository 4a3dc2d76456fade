//! Submesh extraction utilities.

use crate::mesh::Mesh;
use crate::rom_error::RomError;
use std::collections::HashMap;

/// Bidirectional mapping between parent and submesh cell / vertex ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmeshMaps {
    pub parent_to_sub_cells: HashMap<usize, usize>,
    pub sub_to_parent_cells: Vec<usize>,
    pub parent_to_sub_vertices: HashMap<usize, usize>,
    pub sub_to_parent_vertices: Vec<usize>,
}

/// Extract the submesh made of `cells` and their vertices.
///
/// Cells and vertices are renumbered compactly in ascending parent order, so
/// the result depends only on the set of cells.
pub fn extract_cells(mesh: &Mesh, cells: &[usize]) -> Result<(Mesh, SubmeshMaps), RomError> {
    let mut parent_cells = cells.to_vec();
    parent_cells.sort_unstable();
    parent_cells.dedup();

    let mut parent_vertices = Vec::new();
    for &cell in &parent_cells {
        parent_vertices.extend_from_slice(mesh.cell_vertices(cell)?);
    }
    parent_vertices.sort_unstable();
    parent_vertices.dedup();

    let parent_to_sub_vertices: HashMap<usize, usize> = parent_vertices
        .iter()
        .enumerate()
        .map(|(sub, &parent)| (parent, sub))
        .collect();
    let parent_to_sub_cells: HashMap<usize, usize> = parent_cells
        .iter()
        .enumerate()
        .map(|(sub, &parent)| (parent, sub))
        .collect();

    let coordinates = parent_vertices
        .iter()
        .map(|&v| mesh.vertex_coordinates(v).map(<[f64]>::to_vec))
        .collect::<Result<Vec<_>, _>>()?;
    let mut sub_cells = Vec::with_capacity(parent_cells.len());
    for &cell in &parent_cells {
        let vertices = mesh
            .cell_vertices(cell)?
            .iter()
            .map(|v| parent_to_sub_vertices[v])
            .collect();
        sub_cells.push(vertices);
    }

    let submesh = Mesh::new(mesh.cell_type(), coordinates, sub_cells)?;
    Ok((
        submesh,
        SubmeshMaps {
            parent_to_sub_cells,
            sub_to_parent_cells: parent_cells,
            parent_to_sub_vertices,
            sub_to_parent_vertices: parent_vertices,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh_generation::unit_square_mesh;

    #[test]
    fn extracts_two_cells_with_shared_edge() {
        let mesh = unit_square_mesh(3, 3).unwrap();
        let (sub, maps) = extract_cells(&mesh, &[4, 3, 4]).unwrap();
        assert_eq!(sub.num_cells(), 2);
        assert_eq!(sub.num_vertices(), 6);
        assert_eq!(maps.sub_to_parent_cells, vec![3, 4]);
        assert_eq!(maps.sub_to_parent_vertices, vec![4, 5, 6, 8, 9, 10]);
        assert_eq!(sub.cell_vertices(1).unwrap(), &[1, 2, 5, 4]);
        assert_eq!(
            sub.vertex_coordinates(5).unwrap(),
            mesh.vertex_coordinates(10).unwrap()
        );
    }

    #[test]
    fn missing_cell_is_an_error() {
        let mesh = unit_square_mesh(1, 1).unwrap();
        assert!(extract_cells(&mesh, &[1]).is_err());
    }
}
