use std::collections::BTreeMap;

use serde::Serialize;

/// Table-level outcome of a firewall comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TableDiffEntry {
    /// Table present only on the first side, with its serialized content.
    Missing { name: String, lines: Vec<String> },
    /// Table present only on the second side, with its serialized content.
    New { name: String, lines: Vec<String> },
    /// Table present on both sides with differing chains.
    Changed {
        name: String,
        chains: Vec<ChainDiffEntry>,
    },
}

/// Chain-level outcome within a changed table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChainDiffEntry {
    /// Chain present only on the first side.
    Missing { name: String, lines: Vec<String> },
    /// Chain present only on the second side.
    New { name: String, lines: Vec<String> },
    /// Chain present on both sides with differing policy or rules.
    Changed {
        name: String,
        new_policy: Option<String>,
        missing: BTreeMap<usize, String>,
        added: BTreeMap<usize, String>,
    },
}

/// The coarse line-set comparison: plain set differences of the two
/// serialized rule-sets, with no positional or semantic alignment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineSetDiff {
    pub only_in_self: Vec<String>,
    pub only_in_compared: Vec<String>,
}
