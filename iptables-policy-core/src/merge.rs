use std::collections::BTreeMap;

use serde_json::Value;

use crate::context::Context;
use crate::rule::{Directive, Rule, RuleSite};
use crate::tables::{BuildError, Chain, ChainEntry, ChainSlot, Table, TableSlot, Tables};

impl Tables {
    /// Overlay `other` onto this firewall.
    ///
    /// Tables and chains resolve three ways: an explicit `false` removes the
    /// entry, an explicit `null` leaves it untouched, and a definition either
    /// merges into its existing counterpart (policy only; rule lists are
    /// reached through addition points) or materializes when complete.
    /// Afterwards every `node_addition_points` placeholder is replaced with
    /// the referenced contributions, collected by chain name from both sides.
    pub fn merge(&mut self, other: &Tables, ctx: &Context) -> Result<(), BuildError> {
        let mut contributions = BTreeMap::new();
        collect_additions(self, &mut contributions);
        collect_additions(other, &mut contributions);

        for (name, slot) in &other.tables {
            match slot {
                TableSlot::Remove => {
                    self.tables.remove(name);
                }
                TableSlot::Null => {}
                TableSlot::Table(other_table) => match self.tables.get_mut(name) {
                    Some(TableSlot::Table(table)) => table.merge(other_table),
                    _ => {
                        self.tables
                            .insert(name.clone(), TableSlot::Table(materialize(other_table)));
                    }
                },
            }
        }

        self.resolve_addition_points(&contributions, ctx)
    }

    fn resolve_addition_points(
        &mut self,
        contributions: &BTreeMap<String, Vec<Value>>,
        ctx: &Context,
    ) -> Result<(), BuildError> {
        for slot in self.tables.values_mut() {
            let TableSlot::Table(table) = slot else {
                continue;
            };
            let table_name = table.name.clone();
            for entry in &mut table.chains {
                let ChainSlot::Chain(chain) = &mut entry.slot else {
                    continue;
                };
                inject_into_chain(chain, &table_name, contributions, ctx)?;
            }
        }
        Ok(())
    }
}

impl Table {
    fn merge(&mut self, other: &Table) {
        for other_entry in &other.chains {
            match &other_entry.slot {
                ChainSlot::Remove => {
                    self.chains.retain(|entry| entry.name != other_entry.name);
                }
                ChainSlot::Null => {}
                ChainSlot::Contribution(contribution) => {
                    // An incomplete chain cannot stand alone, but its policy
                    // still applies to an existing counterpart.
                    if let Some(chain) = self.chain_mut(&other_entry.name) {
                        if let Some(policy) = &contribution.policy {
                            chain.policy = Some(policy.clone());
                        }
                    }
                }
                ChainSlot::Chain(other_chain) => {
                    if let Some(chain) = self.chain_mut(&other_entry.name) {
                        if let Some(policy) = &other_chain.policy {
                            chain.policy = Some(policy.clone());
                        }
                    } else {
                        self.chains.push(ChainEntry {
                            name: other_entry.name.clone(),
                            slot: ChainSlot::Chain(other_chain.clone()),
                        });
                    }
                }
            }
        }
    }
}

/// Instantiate a new table from an overlay definition: only complete chains
/// materialize; contribution-only chains and slot markers are left behind.
fn materialize(other: &Table) -> Table {
    Table {
        name: other.name.clone(),
        chains: other
            .chains
            .iter()
            .filter(|entry| matches!(entry.slot, ChainSlot::Chain(_)))
            .cloned()
            .collect(),
    }
}

fn collect_additions(tables: &Tables, contributions: &mut BTreeMap<String, Vec<Value>>) {
    for slot in tables.tables.values() {
        let TableSlot::Table(table) = slot else {
            continue;
        };
        for entry in &table.chains {
            let additions = match &entry.slot {
                ChainSlot::Chain(chain) => &chain.additions,
                ChainSlot::Contribution(contribution) => &contribution.additions,
                _ => continue,
            };
            if additions.is_empty() {
                continue;
            }
            contributions
                .entry(entry.name.clone())
                .or_default()
                .extend(additions.iter().cloned());
        }
    }
}

fn inject_into_chain(
    chain: &mut Chain,
    table_name: &str,
    contributions: &BTreeMap<String, Vec<Value>>,
    ctx: &Context,
) -> Result<(), BuildError> {
    let has_points = chain
        .rules
        .iter()
        .any(|rule| matches!(rule.directive(), Directive::AdditionPoints(_)));
    if !has_points {
        return Ok(());
    }

    let mut resolved: Vec<Rule> = Vec::with_capacity(chain.rules.len());
    for rule in chain.rules.drain(..) {
        let Directive::AdditionPoints(names) = rule.directive() else {
            resolved.push(rule);
            continue;
        };
        for name in names {
            let Some(fragments) = contributions.get(name) else {
                continue;
            };
            for descriptor in fragments {
                let site = RuleSite {
                    table: table_name,
                    chain: &chain.name,
                    position: resolved.len(),
                };
                resolved.push(Rule::from_value(descriptor, site, ctx)?);
            }
        }
    }

    for (position, rule) in resolved.iter_mut().enumerate() {
        rule.set_position(position);
    }
    chain.rules = resolved;
    Ok(())
}
