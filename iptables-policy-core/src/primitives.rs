use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

/// Errors raised while building a [`Primitives`] tree or resolving a path in it.
#[derive(Debug, Error)]
pub enum PrimitiveError {
    /// A node in the source tree was neither a scalar, a list of scalars, nor a mapping.
    #[error("unsupported primitive value at '{path}'")]
    UnsupportedValue { path: String },
    /// A path segment does not exist.
    #[error("missing substitution for '{path}'")]
    MissingSubstitution { path: String },
    /// The path stops at a subtree instead of a leaf.
    #[error("partial substitution for '{path}': path resolves to a subtree")]
    PartialSubstitution { path: String },
}

/// One node of the primitives tree.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimitiveNode {
    /// A single scalar leaf.
    Scalar(String),
    /// An ordered list leaf.
    List(Vec<String>),
    /// A named subtree.
    Tree(BTreeMap<String, PrimitiveNode>),
}

/// A resolved leaf, borrowed from the tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Substitution<'a> {
    Scalar(&'a str),
    List(&'a [String]),
}

/// A named tree of templated values, addressable by dotted path.
///
/// Built once from a declarative mapping and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Primitives {
    children: BTreeMap<String, PrimitiveNode>,
}

impl Primitives {
    /// Build a primitives tree from a declarative mapping.
    pub fn from_value(value: &Value) -> Result<Self, PrimitiveError> {
        match value {
            Value::Object(map) => {
                let mut children = BTreeMap::new();
                for (name, child) in map {
                    children.insert(name.clone(), build_node(child, name)?);
                }
                Ok(Self { children })
            }
            _ => Err(PrimitiveError::UnsupportedValue {
                path: String::new(),
            }),
        }
    }

    /// Resolve a dotted path to its leaf.
    pub fn substitute(&self, path: &str) -> Result<Substitution<'_>, PrimitiveError> {
        let mut current = &self.children;
        let mut segments = path.split('.').peekable();

        while let Some(segment) = segments.next() {
            let node = current
                .get(segment)
                .ok_or_else(|| PrimitiveError::MissingSubstitution {
                    path: path.to_string(),
                })?;

            match node {
                PrimitiveNode::Tree(children) => {
                    if segments.peek().is_none() {
                        return Err(PrimitiveError::PartialSubstitution {
                            path: path.to_string(),
                        });
                    }
                    current = children;
                }
                PrimitiveNode::Scalar(value) => {
                    if segments.peek().is_some() {
                        return Err(PrimitiveError::MissingSubstitution {
                            path: path.to_string(),
                        });
                    }
                    return Ok(Substitution::Scalar(value));
                }
                PrimitiveNode::List(values) => {
                    if segments.peek().is_some() {
                        return Err(PrimitiveError::MissingSubstitution {
                            path: path.to_string(),
                        });
                    }
                    return Ok(Substitution::List(values));
                }
            }
        }

        Err(PrimitiveError::MissingSubstitution {
            path: path.to_string(),
        })
    }

    /// Report whether a dotted path resolves to a leaf.
    pub fn has(&self, path: &str) -> bool {
        self.substitute(path).is_ok()
    }
}

fn build_node(value: &Value, path: &str) -> Result<PrimitiveNode, PrimitiveError> {
    match value {
        Value::Object(map) => {
            let mut children = BTreeMap::new();
            for (name, child) in map {
                let child_path = format!("{path}.{name}");
                children.insert(name.clone(), build_node(child, &child_path)?);
            }
            Ok(PrimitiveNode::Tree(children))
        }
        Value::Array(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(scalar_text(item).ok_or_else(|| {
                    PrimitiveError::UnsupportedValue {
                        path: path.to_string(),
                    }
                })?);
            }
            Ok(PrimitiveNode::List(values))
        }
        _ => scalar_text(value)
            .map(PrimitiveNode::Scalar)
            .ok_or_else(|| PrimitiveError::UnsupportedValue {
                path: path.to_string(),
            }),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
