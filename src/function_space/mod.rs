//! Lagrange function spaces over a mesh or a subset of its cells.
//!
//! A [`FunctionSpace`] numbers the degrees of freedom of an [`ElementSpec`]
//! on an ordered set of active cells. The element is flattened into scalar
//! *fields* (one per Lagrange leaf); DOFs are laid out field by field, and
//! within a field by node, where nodes are numbered in order of first
//! encounter while walking the active cells in ascending id order. The
//! numbering is therefore a pure function of `(mesh, element, cells)`, which
//! is what makes reduced spaces reproducible from a saved cell set.
//!
//! Views (`sub`, `extract_subspace`) share the parent numbering; `collapse`
//! builds a standalone numbering for the view and reports where each of its
//! DOFs lives in the parent.

pub mod components;

pub use components::{Component, ComponentMap, ComponentSpec};

use crate::discretization::runtime::{Basis, LocalNode};
use crate::mesh::Mesh;
use crate::rom_error::RomError;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;

/// Finite element declaration.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementSpec {
    /// Scalar Lagrange element.
    Lagrange { degree: usize },
    /// `components` copies of a scalar Lagrange element.
    Vector { degree: usize, components: usize },
    /// Concatenation of sub-elements.
    Mixed(Vec<ElementSpec>),
}

impl ElementSpec {
    pub fn lagrange(degree: usize) -> Self {
        ElementSpec::Lagrange { degree }
    }

    pub fn vector(degree: usize, components: usize) -> Self {
        ElementSpec::Vector { degree, components }
    }

    pub fn mixed(items: Vec<ElementSpec>) -> Self {
        ElementSpec::Mixed(items)
    }

    /// Degree of each scalar leaf, depth first.
    pub fn leaf_degrees(&self) -> Vec<usize> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves(&self, out: &mut Vec<usize>) {
        match self {
            ElementSpec::Lagrange { degree } => out.push(*degree),
            ElementSpec::Vector { degree, components } => {
                out.extend(std::iter::repeat(*degree).take(*components))
            }
            ElementSpec::Mixed(items) => items.iter().for_each(|e| e.collect_leaves(out)),
        }
    }

    pub fn num_leaves(&self) -> usize {
        match self {
            ElementSpec::Lagrange { .. } => 1,
            ElementSpec::Vector { components, .. } => *components,
            ElementSpec::Mixed(items) => items.iter().map(ElementSpec::num_leaves).sum(),
        }
    }

    pub fn num_sub_elements(&self) -> usize {
        match self {
            ElementSpec::Lagrange { .. } => 0,
            ElementSpec::Vector { components, .. } => *components,
            ElementSpec::Mixed(items) => items.len(),
        }
    }

    pub fn sub_element(&self, i: usize) -> Option<ElementSpec> {
        match self {
            ElementSpec::Lagrange { .. } => None,
            ElementSpec::Vector { degree, components } => {
                (i < *components).then(|| ElementSpec::Lagrange { degree: *degree })
            }
            ElementSpec::Mixed(items) => items.get(i).cloned(),
        }
    }

    /// Element selected by `path` together with its range of leaf indices.
    fn locate(&self, path: &[usize]) -> Result<(ElementSpec, Range<usize>), RomError> {
        let mut element = self.clone();
        let mut start = 0;
        for (depth, &i) in path.iter().enumerate() {
            let Some(sub) = element.sub_element(i) else {
                return Err(RomError::UnknownComponent(format!(
                    "{:?} (level {depth} has {} sub-elements)",
                    path,
                    element.num_sub_elements()
                )));
            };
            start += (0..i)
                .filter_map(|k| element.sub_element(k))
                .map(|e| e.num_leaves())
                .sum::<usize>();
            element = sub;
        }
        let end = start + element.num_leaves();
        Ok((element, start..end))
    }
}

/// Mesh entity a node is attached to, in global ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeKey {
    Vertex(usize),
    /// Edge between two vertices, smaller id first.
    Edge(usize, usize),
    Cell(usize),
}

impl NodeKey {
    fn from_local(node: LocalNode, cell: usize, vertices: &[usize]) -> Self {
        match node {
            LocalNode::Vertex(i) => NodeKey::Vertex(vertices[i]),
            LocalNode::Edge(i, j) => {
                let (a, b) = (vertices[i], vertices[j]);
                NodeKey::Edge(a.min(b), a.max(b))
            }
            LocalNode::Interior => NodeKey::Cell(cell),
        }
    }
}

/// Mesh-independent identity of a DOF: the field it belongs to and its node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DofKey {
    pub field: usize,
    pub node: NodeKey,
}

#[derive(Clone, Debug, PartialEq)]
struct NodeNumbering {
    keys: Vec<NodeKey>,
    index: HashMap<NodeKey, usize>,
}

#[derive(Clone, Debug, PartialEq)]
struct Field {
    basis: Basis,
    offset: usize,
    size: usize,
    local_offset: usize,
}

#[derive(Debug, PartialEq)]
struct Layout {
    mesh: Arc<Mesh>,
    element: ElementSpec,
    cells: Vec<usize>,
    fields: Vec<Field>,
    numberings: BTreeMap<usize, NodeNumbering>,
    cell_dofs: Vec<Vec<usize>>,
    dim: usize,
}

impl Layout {
    fn build(mesh: Arc<Mesh>, element: ElementSpec, mut cells: Vec<usize>) -> Result<Self, RomError> {
        cells.sort_unstable();
        cells.dedup();
        if let Some(&bad) = cells.iter().find(|&&c| c >= mesh.num_cells()) {
            return Err(RomError::InvalidGeometry(format!(
                "cell {bad} is outside a mesh of {} cells",
                mesh.num_cells()
            )));
        }
        let degrees = element.leaf_degrees();
        if degrees.is_empty() {
            return Err(RomError::Configuration("element has no scalar fields".into()));
        }

        let mut numberings = BTreeMap::new();
        for &degree in &degrees {
            if numberings.contains_key(&degree) {
                continue;
            }
            let basis = Basis::lagrange(mesh.cell_type(), degree)?;
            let mut keys = Vec::new();
            let mut index = HashMap::new();
            for &cell in &cells {
                let vertices = mesh.cell_vertices(cell)?;
                for &node in basis.local_nodes() {
                    let key = NodeKey::from_local(node, cell, vertices);
                    index.entry(key).or_insert_with(|| {
                        keys.push(key);
                        keys.len() - 1
                    });
                }
            }
            numberings.insert(degree, NodeNumbering { keys, index });
        }

        let mut fields = Vec::with_capacity(degrees.len());
        let mut offset = 0;
        let mut local_offset = 0;
        for &degree in &degrees {
            let basis = Basis::lagrange(mesh.cell_type(), degree)?;
            let size = numberings[&degree].keys.len();
            fields.push(Field {
                basis,
                offset,
                size,
                local_offset,
            });
            offset += size;
            local_offset += basis.num_nodes();
        }

        let mut cell_dofs = Vec::with_capacity(cells.len());
        for &cell in &cells {
            let vertices = mesh.cell_vertices(cell)?;
            let mut dofs = Vec::with_capacity(local_offset);
            for field in &fields {
                let numbering = &numberings[&field.basis.degree()];
                for &node in field.basis.local_nodes() {
                    let key = NodeKey::from_local(node, cell, vertices);
                    dofs.push(field.offset + numbering.index[&key]);
                }
            }
            cell_dofs.push(dofs);
        }

        Ok(Self {
            mesh,
            element,
            cells,
            fields,
            numberings,
            cell_dofs,
            dim: offset,
        })
    }
}

/// DOF numbering of an element on a set of active cells, possibly viewed
/// through a sub-element path.
#[derive(Clone, Debug, PartialEq)]
pub struct FunctionSpace {
    layout: Arc<Layout>,
    path: Vec<usize>,
    element: ElementSpec,
    leaves: Range<usize>,
    components: ComponentMap,
}

impl FunctionSpace {
    /// Space of `element` on every cell of `mesh`.
    pub fn new(mesh: Arc<Mesh>, element: ElementSpec) -> Result<Self, RomError> {
        let cells = (0..mesh.num_cells()).collect();
        Self::on_cells(mesh, element, cells)
    }

    /// Space of `element` on the given cells (sorted and deduplicated).
    pub fn on_cells(mesh: Arc<Mesh>, element: ElementSpec, cells: Vec<usize>) -> Result<Self, RomError> {
        let layout = Layout::build(mesh, element.clone(), cells)?;
        let leaves = 0..layout.fields.len();
        Ok(Self {
            layout: Arc::new(layout),
            path: Vec::new(),
            element,
            leaves,
            components: ComponentMap::default(),
        })
    }

    /// Attach string-named components.
    pub fn with_components(mut self, specs: &[ComponentSpec]) -> Result<Self, RomError> {
        self.components = ComponentMap::from_specs(specs)?;
        Ok(self)
    }

    pub fn mesh(&self) -> &Arc<Mesh> {
        &self.layout.mesh
    }

    /// Element of this view.
    pub fn element(&self) -> &ElementSpec {
        &self.element
    }

    /// Sub-element path of this view, empty for a whole space.
    pub fn path(&self) -> &[usize] {
        &self.path
    }

    pub fn components(&self) -> &ComponentMap {
        &self.components
    }

    /// Size of the underlying DOF numbering (shared by all views).
    pub fn dim(&self) -> usize {
        self.layout.dim
    }

    /// DOFs selected by this view, ascending.
    pub fn view_dofs(&self) -> Vec<usize> {
        self.leaves
            .clone()
            .flat_map(|f| {
                let field = &self.layout.fields[f];
                field.offset..field.offset + field.size
            })
            .collect()
    }

    /// Active cells, ascending global ids.
    pub fn cells(&self) -> &[usize] {
        &self.layout.cells
    }

    pub fn num_cells(&self) -> usize {
        self.layout.cells.len()
    }

    /// DOFs of the active cell at `position` (all fields, field-major).
    pub fn cell_dofs(&self, position: usize) -> &[usize] {
        &self.layout.cell_dofs[position]
    }

    /// DOFs of one field on the active cell at `position`.
    pub fn field_cell_dofs(&self, position: usize, field: usize) -> &[usize] {
        let f = &self.layout.fields[field];
        &self.layout.cell_dofs[position][f.local_offset..f.local_offset + f.basis.num_nodes()]
    }

    /// Number of scalar fields of the underlying element.
    pub fn num_fields(&self) -> usize {
        self.layout.fields.len()
    }

    pub fn field_basis(&self, field: usize) -> Option<Basis> {
        self.layout.fields.get(field).map(|f| f.basis)
    }

    /// Field and node of `dof`.
    pub fn dof_key(&self, dof: usize) -> Option<DofKey> {
        let fields = &self.layout.fields;
        let field = fields.partition_point(|f| f.offset + f.size <= dof);
        let f = fields.get(field)?;
        let numbering = &self.layout.numberings[&f.basis.degree()];
        numbering.keys.get(dof - f.offset).map(|&node| DofKey { field, node })
    }

    /// Inverse of [`FunctionSpace::dof_key`]; `None` if the node is not active.
    pub fn dof_for_key(&self, key: &DofKey) -> Option<usize> {
        let f = self.layout.fields.get(key.field)?;
        let numbering = &self.layout.numberings[&f.basis.degree()];
        numbering.index.get(&key.node).map(|&i| f.offset + i)
    }

    /// Positions of the active cells whose closure holds `dof`, restricted to
    /// the positions in `range`.
    pub fn cells_touching_in(&self, dof: usize, range: Range<usize>) -> Vec<usize> {
        let end = range.end.min(self.num_cells());
        (range.start.min(end)..end)
            .filter(|&pos| self.layout.cell_dofs[pos].contains(&dof))
            .collect()
    }

    /// Same element, view and components on a subset of cells, renumbered.
    pub fn restrict(&self, cells: &[usize]) -> Result<FunctionSpace, RomError> {
        let layout = Layout::build(
            Arc::clone(&self.layout.mesh),
            self.layout.element.clone(),
            cells.to_vec(),
        )?;
        Ok(Self {
            layout: Arc::new(layout),
            path: self.path.clone(),
            element: self.element.clone(),
            leaves: self.leaves.clone(),
            components: self.components.clone(),
        })
    }

    /// Sub-space selected by index, path or component name.
    ///
    /// A name bound to the whole space returns the space itself.
    pub fn sub(&self, component: impl Into<Component>) -> Result<FunctionSpace, RomError> {
        match component.into() {
            Component::Index(i) => self.extract_subspace(&[i]),
            Component::Path(path) => self.extract_subspace(&path),
            Component::Name(name) => match self.components.resolve(&name)? {
                None => Ok(self.clone()),
                Some(path) => {
                    let mut sub = self.extract_subspace(path)?;
                    sub.components = ComponentMap::whole(name);
                    Ok(sub)
                }
            },
        }
    }

    /// View of the sub-element at `path`, relative to this view.
    pub fn extract_subspace(&self, path: &[usize]) -> Result<FunctionSpace, RomError> {
        let mut full = self.path.clone();
        full.extend_from_slice(path);
        let (element, leaves) = self.layout.element.locate(&full)?;
        Ok(Self {
            layout: Arc::clone(&self.layout),
            path: full,
            element,
            leaves,
            components: ComponentMap::default(),
        })
    }

    /// Standalone space for this view; see [`FunctionSpace::collapse_with_map`].
    pub fn collapse(&self) -> Result<FunctionSpace, RomError> {
        self.collapse_with_map().map(|(space, _)| space)
    }

    /// Standalone space for this view and, per collapsed DOF, its parent DOF.
    ///
    /// Collapsing a whole space returns a copy and the identity map.
    pub fn collapse_with_map(&self) -> Result<(FunctionSpace, Vec<usize>), RomError> {
        if self.path.is_empty() {
            return Ok((self.clone(), (0..self.dim()).collect()));
        }
        let mut collapsed = Self::on_cells(
            Arc::clone(&self.layout.mesh),
            self.element.clone(),
            self.layout.cells.clone(),
        )?;
        collapsed.components = self.components.clone();

        let mut to_parent = vec![0; collapsed.dim()];
        for (field, parent_field) in collapsed.layout.fields.iter().zip(self.leaves.clone()) {
            let parent = &self.layout.fields[parent_field];
            for node in 0..field.size {
                to_parent[field.offset + node] = parent.offset + node;
            }
        }
        Ok((collapsed, to_parent))
    }
}

static_assertions::assert_impl_all!(FunctionSpace: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh_generation::unit_square_mesh;

    fn mesh() -> Arc<Mesh> {
        Arc::new(unit_square_mesh(3, 3).unwrap())
    }

    fn taylor_hood() -> ElementSpec {
        ElementSpec::mixed(vec![ElementSpec::vector(2, 2), ElementSpec::lagrange(1)])
    }

    #[test]
    fn dimensions_on_unit_square() {
        let m = mesh();
        assert_eq!(FunctionSpace::new(m.clone(), ElementSpec::lagrange(1)).unwrap().dim(), 16);
        assert_eq!(FunctionSpace::new(m.clone(), ElementSpec::lagrange(2)).unwrap().dim(), 49);
        assert_eq!(FunctionSpace::new(m, taylor_hood()).unwrap().dim(), 114);
    }

    #[test]
    fn dof_keys_round_trip() {
        let u = FunctionSpace::new(mesh(), taylor_hood()).unwrap();
        for dof in 0..u.dim() {
            let key = u.dof_key(dof).unwrap();
            assert_eq!(u.dof_for_key(&key), Some(dof));
        }
        assert!(u.dof_key(u.dim()).is_none());
    }

    #[test]
    fn shared_nodes_get_one_dof() {
        let v = FunctionSpace::new(mesh(), ElementSpec::lagrange(2)).unwrap();
        let a = v.cell_dofs(0);
        let b = v.cell_dofs(1);
        // Cell 0 edge (1,2) is cell 1 edge (3,0).
        assert_eq!(a[1], b[0]);
        assert_eq!(a[2], b[3]);
        assert_eq!(a[5], b[7]);
    }

    #[test]
    fn sub_and_collapse() {
        let u = FunctionSpace::new(mesh(), taylor_hood())
            .unwrap()
            .with_components(&[ComponentSpec::name("u"), ComponentSpec::name("p")])
            .unwrap();
        let velocity = u.sub("u").unwrap();
        assert_eq!(velocity.path(), &[0]);
        assert_eq!(velocity.view_dofs().len(), 98);
        let (v, to_parent) = velocity.collapse_with_map().unwrap();
        assert_eq!(v.dim(), 98);
        assert_eq!(v.components().resolve("u").unwrap(), None);
        assert_eq!(v.sub("u").unwrap(), v);
        for (dof, &parent) in to_parent.iter().enumerate() {
            let key = v.dof_key(dof).unwrap();
            let parent_key = u.dof_key(parent).unwrap();
            assert_eq!(key.node, parent_key.node);
            assert_eq!(key.field, parent_key.field);
        }
        let pressure = u.sub(1).unwrap().collapse().unwrap();
        assert_eq!(pressure.dim(), 16);
        assert!(u.sub(2).is_err());
        assert!(matches!(u.sub("T"), Err(RomError::UnknownComponent(_))));
    }

    #[test]
    fn restriction_renumbers_compactly() {
        let v = FunctionSpace::new(mesh(), ElementSpec::lagrange(1)).unwrap();
        let r = v.restrict(&[4, 0]).unwrap();
        assert_eq!(r.cells(), &[0, 4]);
        // Cells 0 and 4 touch at one corner, so the shared vertex is one DOF.
        assert_eq!(r.dim(), 7);
        let shared: Vec<usize> = r
            .cell_dofs(0)
            .iter()
            .copied()
            .filter(|d| r.cell_dofs(1).contains(d))
            .collect();
        assert_eq!(shared.len(), 1);
        let key = v.dof_key(v.cell_dofs(4)[2]).unwrap();
        assert!(r.dof_for_key(&key).is_some());
        assert!(v.restrict(&[9]).is_err());
    }
}
