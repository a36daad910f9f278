use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

use crate::context::Context;
use crate::expansion::ExpansionError;
use crate::primitives::PrimitiveError;
use crate::rule::{Rule, RuleSite};

/// Errors raised while building firewall structures from declarative values.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The top-level value must map table names to definitions.
    #[error("expected a mapping of table definitions")]
    UnsupportedTables,
    /// A table entry was neither a mapping, `null`, nor `false`.
    #[error("unsupported table definition at '{path}'")]
    UnsupportedTable { path: String },
    /// A chain entry was neither a mapping, `null`, nor `false`.
    #[error("unsupported chain definition at '{path}'")]
    UnsupportedChain { path: String },
    /// A rule descriptor was neither a mapping nor a string.
    #[error("unsupported rule descriptor at '{path}'")]
    UnsupportedRule { path: String },
    /// A rule descriptor carried no directive key.
    #[error("rule at '{path}' has no recognized directive")]
    MissingDirective { path: String },
    /// A rule descriptor carried unknown or conflicting directive keys.
    #[error("conflicting or unknown rule keys [{keys}] at '{path}'")]
    UnknownKeys { path: String, keys: String },
    /// A rule key held a value of the wrong type.
    #[error("rule key '{key}' at '{path}' has an unsupported value")]
    InvalidValue { path: String, key: String },
    /// A service port did not fit an iptables port.
    #[error("port {port} at '{path}' is out of range")]
    PortRange { path: String, port: u64 },
    /// A macro was referenced but never defined.
    #[error("undefined macro '{name}' at '{path}'")]
    UndefinedMacro { name: String, path: String },
    /// A service was referenced but never defined.
    #[error("undefined service '{name}' at '{path}'")]
    UndefinedService { name: String, path: String },
    /// A macro directive was used without a macro table in the context.
    #[error("no macros are defined, required at '{path}'")]
    NoMacros { path: String },
    /// A service directive was used without a service table in the context.
    #[error("no services are defined, required at '{path}'")]
    NoServices { path: String },
    /// An interpolated directive was used without primitives in the context.
    #[error("no primitives are defined, required at '{path}'")]
    NoPrimitives { path: String },
    #[error(transparent)]
    Primitive(#[from] PrimitiveError),
    #[error(transparent)]
    Expansion(#[from] ExpansionError),
}

/// One slot of the top-level table mapping.
#[derive(Debug, Clone, PartialEq)]
pub enum TableSlot {
    Table(Table),
    /// Declared `null`: no rules for this table, distinct from absent.
    Null,
    /// Declared `false`: remove the table during merge.
    Remove,
}

/// One slot of a table's chain list.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainSlot {
    Chain(Chain),
    /// An additions-only chain that exists solely to feed addition points.
    Contribution(Contribution),
    /// Declared `null`: a no-op during merge.
    Null,
    /// Declared `false`: remove the chain during merge.
    Remove,
}

/// A named chain slot, in definition order.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainEntry {
    pub name: String,
    pub slot: ChainSlot,
}

/// The root firewall object: an ordered-for-output mapping of tables.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Tables {
    pub tables: BTreeMap<String, TableSlot>,
}

/// A named grouping of chains, e.g. `filter` or `nat`.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    pub chains: Vec<ChainEntry>,
}

/// A complete chain: declared policy, expanded rules, and any contributed
/// additions.
#[derive(Debug, Clone, PartialEq)]
pub struct Chain {
    pub name: String,
    pub table: String,
    pub policy: Option<String>,
    pub rules: Vec<Rule>,
    pub additions: Vec<Value>,
}

/// An incomplete chain: contributes additions (and optionally a policy) but
/// never materializes as output.
#[derive(Debug, Clone, PartialEq)]
pub struct Contribution {
    pub name: String,
    pub table: String,
    pub policy: Option<String>,
    pub additions: Vec<Value>,
}

impl Tables {
    /// An empty firewall.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a firewall from a declarative table mapping.
    pub fn from_value(value: &Value, ctx: &Context) -> Result<Self, BuildError> {
        let map = value.as_object().ok_or(BuildError::UnsupportedTables)?;
        let mut tables = BTreeMap::new();
        for (name, definition) in map {
            let slot = match definition {
                Value::Object(_) => TableSlot::Table(Table::from_value(name, definition, ctx)?),
                Value::Null => TableSlot::Null,
                Value::Bool(false) => TableSlot::Remove,
                _ => {
                    return Err(BuildError::UnsupportedTable {
                        path: name.clone(),
                    })
                }
            };
            tables.insert(name.clone(), slot);
        }
        Ok(Self { tables })
    }

    /// Look up a real table by name.
    pub fn table(&self, name: &str) -> Option<&Table> {
        match self.tables.get(name) {
            Some(TableSlot::Table(table)) => Some(table),
            _ => None,
        }
    }
}

impl Table {
    /// Build a table from a declarative chain mapping.
    pub fn from_value(name: &str, value: &Value, ctx: &Context) -> Result<Self, BuildError> {
        let map = value.as_object().ok_or_else(|| BuildError::UnsupportedTable {
            path: name.to_string(),
        })?;
        let mut chains = Vec::with_capacity(map.len());
        for (chain_name, definition) in map {
            let path = format!("{name}.{chain_name}");
            let slot = match definition {
                Value::Object(def) => chain_slot_from_value(name, chain_name, def, ctx)?,
                Value::Null => ChainSlot::Null,
                Value::Bool(false) => ChainSlot::Remove,
                _ => return Err(BuildError::UnsupportedChain { path }),
            };
            chains.push(ChainEntry {
                name: chain_name.clone(),
                slot,
            });
        }
        Ok(Self {
            name: name.to_string(),
            chains,
        })
    }

    /// Look up a real chain by name.
    pub fn chain(&self, name: &str) -> Option<&Chain> {
        self.chains.iter().find_map(|entry| match &entry.slot {
            ChainSlot::Chain(chain) if entry.name == name => Some(chain),
            _ => None,
        })
    }

    pub(crate) fn chain_mut(&mut self, name: &str) -> Option<&mut Chain> {
        self.chains.iter_mut().find_map(|entry| match &mut entry.slot {
            ChainSlot::Chain(chain) if entry.name == name => Some(chain),
            _ => None,
        })
    }

    /// Look up any chain slot by name, real or not.
    pub fn entry(&self, name: &str) -> Option<&ChainEntry> {
        self.chains.iter().find(|entry| entry.name == name)
    }
}

fn chain_slot_from_value(
    table: &str,
    name: &str,
    def: &serde_json::Map<String, Value>,
    ctx: &Context,
) -> Result<ChainSlot, BuildError> {
    let path = format!("{table}.{name}");

    let policy = match def.get("policy") {
        Some(Value::String(policy)) => Some(policy.clone()),
        Some(_) => {
            return Err(BuildError::InvalidValue {
                path,
                key: "policy".to_string(),
            })
        }
        None => None,
    };

    let additions = match def.get("additions") {
        Some(Value::Array(items)) => items.clone(),
        Some(_) => {
            return Err(BuildError::InvalidValue {
                path,
                key: "additions".to_string(),
            })
        }
        None => Vec::new(),
    };

    let rule_values = match def.get("rules") {
        Some(Value::Array(items)) => Some(items),
        Some(_) => {
            return Err(BuildError::InvalidValue {
                path,
                key: "rules".to_string(),
            })
        }
        None => None,
    };

    // Complete when a rules key was given (even empty) or nothing was given;
    // additions alone cannot stand as a real chain.
    let complete = rule_values.is_some() || def.get("additions").is_none();

    if !complete {
        return Ok(ChainSlot::Contribution(Contribution {
            name: name.to_string(),
            table: table.to_string(),
            policy,
            additions,
        }));
    }

    let mut rules = Vec::new();
    if let Some(values) = rule_values {
        for (position, value) in values.iter().enumerate() {
            let site = RuleSite {
                table,
                chain: name,
                position,
            };
            rules.push(Rule::from_value(value, site, ctx)?);
        }
    }

    Ok(ChainSlot::Chain(Chain {
        name: name.to_string(),
        table: table.to_string(),
        policy,
        rules,
        additions,
    }))
}

impl Chain {
    /// The declared output policy, `ACCEPT` when unspecified.
    pub fn policy(&self) -> &str {
        self.policy.as_deref().unwrap_or("ACCEPT")
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{BuildError, ChainSlot, Tables};
    use crate::context::Context;

    #[test]
    fn table_slots_track_null_and_definitions() {
        let tables = Tables::from_value(
            &json!({"table1": {}, "table2": null}),
            &Context::new(),
        )
        .expect("tables should build");

        assert!(tables.table("table1").is_some());
        assert!(tables.table("table2").is_none());
        assert!(tables.tables.contains_key("table2"));
    }

    #[test]
    fn non_mapping_inputs_are_rejected() {
        assert!(matches!(
            Tables::from_value(&json!(1), &Context::new()),
            Err(BuildError::UnsupportedTables)
        ));
        assert!(Tables::from_value(&json!({"table1": {"INPUT": 1}}), &Context::new()).is_err());
    }

    #[test]
    fn additions_only_chains_are_contributions() {
        let tables = Tables::from_value(
            &json!({"filter": {
                "with_rules": {"rules": ["-j ACCEPT"]},
                "empty": {},
                "contrib": {"additions": []},
            }}),
            &Context::new(),
        )
        .expect("tables should build");

        let filter = tables.table("filter").expect("table");
        assert!(filter.chain("with_rules").is_some());
        assert!(filter.chain("empty").is_some());
        assert!(filter.chain("contrib").is_none());
        assert!(matches!(
            filter.entry("contrib").expect("entry").slot,
            ChainSlot::Contribution(_)
        ));
    }

    #[test]
    fn rule_positions_and_paths_are_stable() {
        let tables = Tables::from_value(
            &json!({"table1": {"chain1": {"rules": ["-j ACCEPT", "-j DROP"]}}}),
            &Context::new(),
        )
        .expect("tables should build");

        let chain = tables.table("table1").expect("table").chain("chain1").expect("chain");
        assert_eq!(chain.rules[0].position(), 0);
        assert_eq!(chain.rules[1].path(), "table1.chain1.1");
        assert_eq!(chain.policy(), "ACCEPT");
    }
}
