//! The type link map: a static, schema-derived table of abstract-to-concrete
//! type relationships plus per-type scalar field lists.
//!
//! Built once (typically deserialized from schema metadata emitted by a
//! codegen front end), then shared read-only for the process lifetime. The
//! compiler consults it for `on_<TypeName>` validation and `__scalar`
//! expansion; callers can use [`TypeLinkMap::implements`] together with an
//! observed `__typename` for runtime type discrimination.

use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TypeLinkMap {
    /// Abstract type name -> concrete implementer names.
    #[serde(default)]
    implementers: HashMap<String, Vec<String>>,
    /// Concrete type name -> its scalar field names, in schema order.
    #[serde(default)]
    scalar_fields: HashMap<String, Vec<String>>,
    /// Concrete type name -> abstract types it implements. Rebuilt from
    /// `implementers` on load; never deserialized.
    #[serde(skip)]
    memberships: HashMap<String, HashSet<String>>,
}

impl TypeLinkMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from schema metadata JSON:
    /// `{"implementers": {"Abstract": ["Concrete", ...]},
    ///   "scalar_fields": {"Concrete": ["field", ...]}}`.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let mut map: TypeLinkMap = serde_json::from_str(raw)?;
        map.rebuild_memberships();
        Ok(map)
    }

    /// Declare that `abstract_type` is implemented by `concretes`.
    pub fn link(
        mut self,
        abstract_type: impl Into<String>,
        concretes: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let abstract_type = abstract_type.into();
        let concretes: Vec<String> = concretes.into_iter().map(Into::into).collect();
        for concrete in &concretes {
            self.memberships
                .entry(concrete.clone())
                .or_default()
                .insert(abstract_type.clone());
        }
        self.implementers
            .entry(abstract_type)
            .or_default()
            .extend(concretes);
        self
    }

    /// Declare the scalar field list of a concrete type, in schema order.
    pub fn scalars(
        mut self,
        type_name: impl Into<String>,
        fields: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.scalar_fields
            .insert(type_name.into(), fields.into_iter().map(Into::into).collect());
        self
    }

    /// Does concrete type `concrete` implement abstract type `abstract_type`?
    ///
    /// This is the single generic lookup backing all runtime type guards:
    /// pair it with an observed `__typename` instead of writing one guard
    /// function per type.
    pub fn implements(&self, concrete: &str, abstract_type: &str) -> bool {
        self.memberships
            .get(concrete)
            .is_some_and(|set| set.contains(abstract_type))
    }

    /// The concrete implementers of an abstract type, if it is known.
    pub fn implementers_of(&self, abstract_type: &str) -> Option<&[String]> {
        self.implementers.get(abstract_type).map(Vec::as_slice)
    }

    /// The scalar fields of a concrete type, if it is known.
    pub fn scalar_fields_of(&self, type_name: &str) -> Option<&[String]> {
        self.scalar_fields.get(type_name).map(Vec::as_slice)
    }

    fn rebuild_memberships(&mut self) {
        self.memberships.clear();
        for (abstract_type, concretes) in &self.implementers {
            for concrete in concretes {
                self.memberships
                    .entry(concrete.clone())
                    .or_default()
                    .insert(abstract_type.clone());
            }
        }
    }
}

/// Read the `__typename` of a response object, when the caller requested it.
pub fn typename_of(value: &Value) -> Option<&str> {
    value.get("__typename").and_then(Value::as_str)
}
