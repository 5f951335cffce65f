//! The selection tree: a caller-authored description of which fields of
//! which types to request.
//!
//! A [`SelectionSet`] is an ordered list of `(field name, Selection)`
//! entries. Order is preserved so compilation is deterministic, and the same
//! field name may appear more than once at one level (the compiler aliases
//! duplicates instead of overwriting).
//!
//! Reserved keys:
//! - `__typename` requests the concrete type name of the value.
//! - `__scalar` requests every scalar field of the current type, looked up
//!   in the [`TypeLinkMap`](crate::TypeLinkMap).
//! - `on_<TypeName>` scopes a nested selection to one concrete type of an
//!   abstract (interface/union) position, compiled to an inline fragment.
//!
//! # Example
//!
//! ```rust
//! use graftql::{SelectionSet, Arguments};
//! use serde_json::json;
//!
//! let sel = SelectionSet::new()
//!     .field_args_nested(
//!         "user",
//!         Arguments::new().arg("id", "ID!", json!("u1")),
//!         SelectionSet::typed("User").field("name").typename(),
//!     );
//! ```

use serde_json::Value;

/// Reserved key requesting the concrete type name.
pub const TYPENAME_KEY: &str = "__typename";
/// Reserved key requesting all scalar fields of the current type.
pub const SCALAR_KEY: &str = "__scalar";
/// Prefix marking a type-conditional sub-selection.
pub const ON_PREFIX: &str = "on_";

/// One argument: name, declared wire type (as it appears in a variable
/// declaration, e.g. `ID!` or `[Int!]`), and the literal value.
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub name: String,
    pub wire_type: String,
    pub value: Value,
}

/// An ordered argument list for one field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    pub(crate) entries: Vec<Argument>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an argument. The wire type is carried verbatim into the compiled
    /// operation's variable declaration list.
    pub fn arg(mut self, name: impl Into<String>, wire_type: impl Into<String>, value: Value) -> Self {
        self.entries.push(Argument {
            name: name.into(),
            wire_type: wire_type.into(),
            value,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// The four selection shapes a field entry can take.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// Scalar inclusion, no arguments (`true` in map form).
    Scalar,
    /// Scalar inclusion with arguments.
    ScalarArgs(Arguments),
    /// Object-typed field, no arguments.
    Object(SelectionSet),
    /// Object-typed field with arguments.
    ObjectArgs(Arguments, SelectionSet),
}

impl Selection {
    pub(crate) fn arguments(&self) -> Option<&Arguments> {
        match self {
            Selection::ScalarArgs(args) | Selection::ObjectArgs(args, _) => Some(args),
            _ => None,
        }
    }

    pub(crate) fn nested(&self) -> Option<&SelectionSet> {
        match self {
            Selection::Object(set) | Selection::ObjectArgs(_, set) => Some(set),
            _ => None,
        }
    }
}

/// An ordered selection over one GraphQL type position.
///
/// `type_name` is the declared GraphQL type of this position when the caller
/// (usually generated code) knows it. It is required for `__scalar`
/// expansion and for validating `on_<TypeName>` conditions; plain field
/// selections work without it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionSet {
    pub(crate) type_name: Option<String>,
    pub(crate) entries: Vec<(String, Selection)>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// A selection set annotated with the declared type it selects on.
    pub fn typed(type_name: impl Into<String>) -> Self {
        Self {
            type_name: Some(type_name.into()),
            entries: Vec::new(),
        }
    }

    /// Select a scalar field.
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.entries.push((name.into(), Selection::Scalar));
        self
    }

    /// Select a scalar field with arguments.
    pub fn field_args(mut self, name: impl Into<String>, args: Arguments) -> Self {
        self.entries.push((name.into(), Selection::ScalarArgs(args)));
        self
    }

    /// Select an object-typed field with a nested selection.
    pub fn field_nested(mut self, name: impl Into<String>, nested: SelectionSet) -> Self {
        self.entries.push((name.into(), Selection::Object(nested)));
        self
    }

    /// Select an object-typed field with arguments and a nested selection.
    pub fn field_args_nested(
        mut self,
        name: impl Into<String>,
        args: Arguments,
        nested: SelectionSet,
    ) -> Self {
        self.entries
            .push((name.into(), Selection::ObjectArgs(args, nested)));
        self
    }

    /// Request `__typename`. Never injected implicitly; callers that need
    /// runtime type discrimination ask for it here.
    pub fn typename(mut self) -> Self {
        self.entries
            .push((TYPENAME_KEY.to_string(), Selection::Scalar));
        self
    }

    /// Request every scalar field of the current type (`__scalar`).
    pub fn all_scalars(mut self) -> Self {
        self.entries
            .push((SCALAR_KEY.to_string(), Selection::Scalar));
        self
    }

    /// Add a type-conditional sub-selection (`on_<TypeName>`), applied only
    /// when the runtime type matches `type_name`.
    pub fn on(mut self, type_name: impl Into<String>, nested: SelectionSet) -> Self {
        let type_name = type_name.into();
        let nested = if nested.type_name.is_none() {
            SelectionSet {
                type_name: Some(type_name.clone()),
                entries: nested.entries,
            }
        } else {
            nested
        };
        self.entries
            .push((format!("{ON_PREFIX}{type_name}"), Selection::Object(nested)));
        self
    }

    /// Insert a raw `(key, selection)` entry. This is the escape hatch for
    /// tree-of-maps style construction; reserved keys are interpreted the
    /// same way as the dedicated builder methods.
    pub fn entry(mut self, key: impl Into<String>, selection: Selection) -> Self {
        self.entries.push((key.into(), selection));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }
}
