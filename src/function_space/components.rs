//! String-named components of a function space.
//!
//! A [`ComponentMap`] maps a component name to the sub-element path it
//! selects, or to `None` when the name denotes the whole space. It is built
//! from a nested [`ComponentSpec`] list:
//!
//! - `Name("u")` at position `i` maps `"u"` to the current path;
//! - `Aliases([..])` gives several entries the same path;
//! - `Nested([..])` descends one level, entry `k` getting path `path + [k]`.
//!
//! For example `[Nested([Name("ux"), Name("uy")]), Name("p")]` on a
//! `(vector, scalar)` mixed element yields `ux → [0, 0]`, `uy → [0, 1]`,
//! `p → [1]`.

use crate::rom_error::RomError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One entry of a component declaration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComponentSpec {
    Name(String),
    Aliases(Vec<ComponentSpec>),
    Nested(Vec<ComponentSpec>),
}

impl ComponentSpec {
    pub fn name(name: impl Into<String>) -> Self {
        ComponentSpec::Name(name.into())
    }

    pub fn aliases<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ComponentSpec::Aliases(names.into_iter().map(|n| ComponentSpec::Name(n.into())).collect())
    }
}

impl From<&str> for ComponentSpec {
    fn from(name: &str) -> Self {
        ComponentSpec::Name(name.to_owned())
    }
}

/// Selector accepted by [`FunctionSpace::sub`](super::FunctionSpace::sub).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Component {
    Index(usize),
    Path(Vec<usize>),
    Name(String),
}

impl From<usize> for Component {
    fn from(index: usize) -> Self {
        Component::Index(index)
    }
}

impl From<&str> for Component {
    fn from(name: &str) -> Self {
        Component::Name(name.to_owned())
    }
}

impl From<Vec<usize>> for Component {
    fn from(path: Vec<usize>) -> Self {
        Component::Path(path)
    }
}

/// Name → sub-element path lookup attached to a function space.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentMap {
    map: BTreeMap<String, Option<Vec<usize>>>,
}

impl ComponentMap {
    /// Build the map from a top-level component list.
    ///
    /// # Errors
    /// `Configuration` if a name is declared twice with different paths.
    pub fn from_specs(specs: &[ComponentSpec]) -> Result<Self, RomError> {
        let mut out = Self::default();
        for (index, spec) in specs.iter().enumerate() {
            out.insert_spec(spec, vec![index])?;
        }
        Ok(out)
    }

    /// A map whose only name refers to the whole space.
    pub fn whole(name: impl Into<String>) -> Self {
        let mut map = BTreeMap::new();
        map.insert(name.into(), None);
        Self { map }
    }

    fn insert_spec(&mut self, spec: &ComponentSpec, path: Vec<usize>) -> Result<(), RomError> {
        match spec {
            ComponentSpec::Name(name) => match self.map.get(name) {
                Some(existing) if existing.as_ref() != Some(&path) => {
                    Err(RomError::Configuration(format!(
                        "component `{name}` declared for both {existing:?} and {path:?}"
                    )))
                }
                _ => {
                    self.map.insert(name.clone(), Some(path));
                    Ok(())
                }
            },
            ComponentSpec::Aliases(items) => {
                for item in items {
                    self.insert_spec(item, path.clone())?;
                }
                Ok(())
            }
            ComponentSpec::Nested(items) => {
                for (sub, item) in items.iter().enumerate() {
                    let mut child = path.clone();
                    child.push(sub);
                    self.insert_spec(item, child)?;
                }
                Ok(())
            }
        }
    }

    /// Path selected by `name`; `Ok(None)` means the whole space.
    ///
    /// # Errors
    /// `UnknownComponent` if the name was never declared.
    pub fn resolve(&self, name: &str) -> Result<Option<&[usize]>, RomError> {
        self.map
            .get(name)
            .map(|path| path.as_deref())
            .ok_or_else(|| RomError::UnknownComponent(name.to_owned()))
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.map.keys().map(String::as_str)
    }
}
