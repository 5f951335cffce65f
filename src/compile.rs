//! The operation compiler: selection tree in, wire document out.
//!
//! `compile` is a pure function. The same tree always yields a byte-identical
//! document: entries are walked in insertion order and variable names come
//! from a deterministic counter. Literal argument values never appear in the
//! document text; every one is hoisted into the operation's variable list and
//! referenced as `$name`.

use crate::error::SelectionError;
use crate::selection::{Arguments, Selection, SelectionSet, ON_PREFIX, SCALAR_KEY, TYPENAME_KEY};
use crate::types::TypeLinkMap;
use serde_json::{Map, Value};

/// The three GraphQL operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

impl OperationKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            OperationKind::Query => "query",
            OperationKind::Mutation => "mutation",
            OperationKind::Subscription => "subscription",
        }
    }
}

/// A wire-ready operation: the document text plus the hoisted variables.
///
/// Produced fresh per [`compile`] call and owned entirely by the caller.
#[derive(Debug, Clone)]
pub struct CompiledOperation {
    pub kind: OperationKind,
    pub document: String,
    pub variables: Map<String, Value>,
    pub operation_name: Option<String>,
}

#[derive(Debug)]
struct VariableBinding {
    name: String,
    wire_type: String,
    value: Value,
}

/// Compile an anonymous operation.
pub fn compile(
    selection: &SelectionSet,
    kind: OperationKind,
    link_map: &TypeLinkMap,
) -> Result<CompiledOperation, SelectionError> {
    compile_inner(selection, kind, None, link_map)
}

/// Compile an operation with an explicit name (sent as `operationName`).
pub fn compile_named(
    selection: &SelectionSet,
    kind: OperationKind,
    name: impl Into<String>,
    link_map: &TypeLinkMap,
) -> Result<CompiledOperation, SelectionError> {
    compile_inner(selection, kind, Some(name.into()), link_map)
}

fn compile_inner(
    selection: &SelectionSet,
    kind: OperationKind,
    operation_name: Option<String>,
    link_map: &TypeLinkMap,
) -> Result<CompiledOperation, SelectionError> {
    let mut compiler = Compiler {
        link_map,
        bindings: Vec::new(),
        counter: 0,
    };

    let mut path = vec![kind.keyword().to_string()];
    let body = compiler.compile_set(selection, &mut path)?;

    let mut document = kind.keyword().to_string();
    if let Some(name) = &operation_name {
        document.push(' ');
        document.push_str(name);
    }
    if !compiler.bindings.is_empty() {
        let decls: Vec<String> = compiler
            .bindings
            .iter()
            .map(|b| format!("${}: {}", b.name, b.wire_type))
            .collect();
        document.push('(');
        document.push_str(&decls.join(", "));
        document.push(')');
    }
    document.push(' ');
    document.push_str(&body);

    let mut variables = Map::new();
    for binding in compiler.bindings {
        variables.insert(binding.name, binding.value);
    }

    Ok(CompiledOperation {
        kind,
        document,
        variables,
        operation_name,
    })
}

struct Compiler<'a> {
    link_map: &'a TypeLinkMap,
    bindings: Vec<VariableBinding>,
    counter: usize,
}

impl Compiler<'_> {
    /// Render one selection level to `{ ... }`. `path` is the field trail
    /// from the operation root, used for variable naming and error context.
    fn compile_set(
        &mut self,
        set: &SelectionSet,
        path: &mut Vec<String>,
    ) -> Result<String, SelectionError> {
        if set.entries.is_empty() {
            return Err(SelectionError::EmptySelection(path.join(".")));
        }

        // Explicit field names at this level, so __scalar expansion can
        // skip anything the caller already selected.
        let explicit: Vec<&str> = set
            .entries
            .iter()
            .map(|(name, _)| name.as_str())
            .filter(|name| *name != SCALAR_KEY && !name.starts_with(ON_PREFIX))
            .collect();

        let mut rendered: Vec<String> = Vec::new();
        let mut seen: Vec<&str> = Vec::new();

        for (name, selection) in &set.entries {
            if name == TYPENAME_KEY {
                if !matches!(selection, Selection::Scalar) {
                    return Err(SelectionError::InvalidReservedKey(name.clone()));
                }
                rendered.push(TYPENAME_KEY.to_string());
            } else if name == SCALAR_KEY {
                if !matches!(selection, Selection::Scalar) {
                    return Err(SelectionError::InvalidReservedKey(name.clone()));
                }
                self.expand_scalars(set, &explicit, &mut rendered)?;
            } else if let Some(concrete) = name.strip_prefix(ON_PREFIX) {
                rendered.push(self.compile_fragment(concrete, selection, set, path)?);
            } else {
                rendered.push(self.compile_field(name, selection, &mut seen, path)?);
            }
        }

        Ok(format!("{{ {} }}", rendered.join(" ")))
    }

    /// `__scalar`: splice in the current type's scalar fields, skipping any
    /// the caller selected explicitly at this level.
    fn expand_scalars(
        &self,
        set: &SelectionSet,
        explicit: &[&str],
        rendered: &mut Vec<String>,
    ) -> Result<(), SelectionError> {
        let type_name = set
            .type_name
            .as_deref()
            .ok_or(SelectionError::UntypedScalarExpansion)?;
        let fields = self
            .link_map
            .scalar_fields_of(type_name)
            .ok_or_else(|| SelectionError::UnknownScalarType(type_name.to_string()))?;
        for field in fields {
            if !explicit.contains(&field.as_str()) {
                rendered.push(field.clone());
            }
        }
        Ok(())
    }

    /// `on_<T>`: an inline fragment, validated against the link map.
    fn compile_fragment(
        &mut self,
        concrete: &str,
        selection: &Selection,
        enclosing: &SelectionSet,
        path: &mut Vec<String>,
    ) -> Result<String, SelectionError> {
        let nested = match selection {
            Selection::Object(nested) => nested,
            _ => return Err(SelectionError::InvalidReservedKey(format!("{ON_PREFIX}{concrete}"))),
        };
        let abstract_type = enclosing
            .type_name
            .as_deref()
            .ok_or_else(|| SelectionError::UntypedCondition(concrete.to_string()))?;
        let linked = self
            .link_map
            .implementers_of(abstract_type)
            .is_some_and(|types| types.iter().any(|t| t == concrete));
        if !linked {
            return Err(SelectionError::UnknownTypeCondition {
                concrete: concrete.to_string(),
                abstract_type: abstract_type.to_string(),
            });
        }

        // Inside the fragment the current type is the concrete one, so a
        // nested __scalar expands that type's fields.
        let scoped;
        let nested = if nested.type_name.is_none() {
            scoped = SelectionSet {
                type_name: Some(concrete.to_string()),
                entries: nested.entries.clone(),
            };
            &scoped
        } else {
            nested
        };

        path.push(format!("{ON_PREFIX}{concrete}"));
        let body = self.compile_set(nested, path)?;
        path.pop();
        Ok(format!("... on {concrete} {body}"))
    }

    fn compile_field<'s>(
        &mut self,
        name: &'s str,
        selection: &Selection,
        seen: &mut Vec<&'s str>,
        path: &mut Vec<String>,
    ) -> Result<String, SelectionError> {
        // Duplicate field at this level: alias the repeat occurrences so
        // neither silently overwrites the other in the response mapping.
        let occurrence = seen.iter().filter(|s| **s == name).count();
        seen.push(name);
        let mut out = if occurrence == 0 {
            name.to_string()
        } else {
            format!("{name}_{}: {name}", occurrence + 1)
        };

        if let Some(args) = selection.arguments() {
            if !args.is_empty() {
                out.push('(');
                out.push_str(&self.hoist_arguments(name, args, path));
                out.push(')');
            }
        }

        if let Some(nested) = selection.nested() {
            path.push(name.to_string());
            let body = self.compile_set(nested, path)?;
            path.pop();
            out.push(' ');
            out.push_str(&body);
        }

        Ok(out)
    }

    /// Replace each literal argument with a `$variable` reference and record
    /// the binding. Names combine the field path, the argument name, and a
    /// counter, so the same field appearing at different tree positions (or
    /// twice at one level) never collides.
    fn hoist_arguments(&mut self, field: &str, args: &Arguments, path: &[String]) -> String {
        let mut parts = Vec::with_capacity(args.len());
        for arg in &args.entries {
            self.counter += 1;
            let var_name = format!(
                "{}_{}_{}_{}",
                path[1..].join("_"),
                field,
                arg.name,
                self.counter
            )
            .trim_start_matches('_')
            .to_string();
            parts.push(format!("{}: ${var_name}", arg.name));
            self.bindings.push(VariableBinding {
                name: var_name,
                wire_type: arg.wire_type.clone(),
                value: arg.value.clone(),
            });
        }
        parts.join(", ")
    }
}
