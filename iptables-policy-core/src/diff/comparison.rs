use std::collections::{BTreeMap, HashSet};

use thiserror::Error;

use crate::diff::engine::align;
use crate::diff::result::{ChainDiffEntry, LineSetDiff, TableDiffEntry};
use crate::diff::semantic::rules_equal;
use crate::tables::{Chain, Table, TableSlot, Tables};

/// Identity errors raised at comparison construction.
#[derive(Debug, Error)]
pub enum CompareError {
    #[error("cannot compare chain '{left}' with chain '{right}'")]
    ChainNameMismatch { left: String, right: String },
    #[error("cannot compare table '{left}' with table '{right}'")]
    TableNameMismatch { left: String, right: String },
}

/// Structural diff of two same-named chains.
///
/// `missing` and `added` are keyed by each side's own line index under the
/// active comment policy; comment lines are excluded entirely when comments
/// are ignored.
#[derive(Debug)]
pub struct ChainComparison<'a> {
    a: &'a Chain,
    b: &'a Chain,
    comments: bool,
    missing: BTreeMap<usize, String>,
    added: BTreeMap<usize, String>,
}

impl<'a> ChainComparison<'a> {
    pub fn new(a: &'a Chain, b: &'a Chain) -> Result<Self, CompareError> {
        if a.name != b.name {
            return Err(CompareError::ChainNameMismatch {
                left: a.name.clone(),
                right: b.name.clone(),
            });
        }
        let mut comparison = Self {
            a,
            b,
            comments: true,
            missing: BTreeMap::new(),
            added: BTreeMap::new(),
        };
        comparison.recompute();
        Ok(comparison)
    }

    /// Exclude comment lines from the compared sequences.
    pub fn ignore_comments(&mut self) {
        self.set_comments(false);
    }

    /// Include comment lines in the compared sequences (the default).
    pub fn include_comments(&mut self) {
        self.set_comments(true);
    }

    pub(crate) fn set_comments(&mut self, comments: bool) {
        if self.comments != comments {
            self.comments = comments;
            self.recompute();
        }
    }

    fn recompute(&mut self) {
        let a_lines = self.a.rule_lines(self.comments);
        let b_lines = self.b.rule_lines(self.comments);
        let (missing, added) = align(&a_lines, &b_lines, |a, b| rules_equal(a, b));

        self.missing = missing.into_iter().map(|i| (i, a_lines[i].clone())).collect();
        self.added = added.into_iter().map(|i| (i, b_lines[i].clone())).collect();
    }

    pub fn chain_name(&self) -> &str {
        &self.a.name
    }

    /// Whether the second chain declares a different output policy.
    pub fn new_policy(&self) -> bool {
        self.a.policy() != self.b.policy()
    }

    /// Lines of the first chain absent from the second, by own index.
    pub fn missing(&self) -> &BTreeMap<usize, String> {
        &self.missing
    }

    /// Lines of the second chain absent from the first, by own index.
    pub fn added(&self) -> &BTreeMap<usize, String> {
        &self.added
    }

    pub fn equal(&self) -> bool {
        self.missing.is_empty() && self.added.is_empty() && !self.new_policy()
    }

    pub fn to_report(&self) -> Option<ChainDiffEntry> {
        if self.equal() {
            return None;
        }
        Some(ChainDiffEntry::Changed {
            name: self.a.name.clone(),
            new_policy: self.new_policy().then(|| self.b.policy().to_string()),
            missing: self.missing.clone(),
            added: self.added.clone(),
        })
    }
}

/// Structural diff of two same-named tables, aggregated per chain name.
#[derive(Debug)]
pub struct TablesComparison<'a> {
    comments: bool,
    tables: Vec<TableComparison<'a>>,
    missing: Vec<&'a Table>,
    added: Vec<&'a Table>,
}

/// Structural diff of two same-named tables.
#[derive(Debug)]
pub struct TableComparison<'a> {
    name: String,
    comments: bool,
    missing: Vec<&'a Chain>,
    added: Vec<&'a Chain>,
    compared: Vec<ChainComparison<'a>>,
}

impl<'a> TableComparison<'a> {
    pub fn new(a: &'a Table, b: &'a Table) -> Result<Self, CompareError> {
        if a.name != b.name {
            return Err(CompareError::TableNameMismatch {
                left: a.name.clone(),
                right: b.name.clone(),
            });
        }

        let mut missing = Vec::new();
        let mut compared = Vec::new();
        for chain in a.ordered_chains() {
            match b.chain(&chain.name) {
                Some(other) => compared.push(ChainComparison::new(chain, other)?),
                None => missing.push(chain),
            }
        }
        let added = b
            .ordered_chains()
            .into_iter()
            .filter(|chain| a.chain(&chain.name).is_none())
            .collect();

        Ok(Self {
            name: a.name.clone(),
            comments: true,
            missing,
            added,
            compared,
        })
    }

    pub fn ignore_comments(&mut self) {
        self.set_comments(false);
    }

    pub fn include_comments(&mut self) {
        self.set_comments(true);
    }

    pub(crate) fn set_comments(&mut self, comments: bool) {
        self.comments = comments;
        for comparison in &mut self.compared {
            comparison.set_comments(comments);
        }
    }

    pub fn table_name(&self) -> &str {
        &self.name
    }

    /// Names of chains present only on the first side.
    pub fn missing(&self) -> Vec<&str> {
        self.missing.iter().map(|chain| chain.name.as_str()).collect()
    }

    /// Names of chains present only on the second side.
    pub fn added(&self) -> Vec<&str> {
        self.added.iter().map(|chain| chain.name.as_str()).collect()
    }

    pub fn equal(&self) -> bool {
        self.missing.is_empty()
            && self.added.is_empty()
            && self.compared.iter().all(ChainComparison::equal)
    }

    pub fn to_report(&self) -> Option<TableDiffEntry> {
        if self.equal() {
            return None;
        }
        let mut chains = Vec::new();
        for chain in &self.missing {
            chains.push(ChainDiffEntry::Missing {
                name: chain.name.clone(),
                lines: chain.to_lines(self.comments),
            });
        }
        for chain in &self.added {
            chains.push(ChainDiffEntry::New {
                name: chain.name.clone(),
                lines: chain.to_lines(self.comments),
            });
        }
        chains.extend(self.compared.iter().filter_map(ChainComparison::to_report));
        Some(TableDiffEntry::Changed {
            name: self.name.clone(),
            chains,
        })
    }
}

impl<'a> TablesComparison<'a> {
    /// Compare two firewalls per table name.
    ///
    /// A `Null` slot on either side exempts that table name from comparison;
    /// only a table absent outright is reported as missing or new.
    pub fn new(a: &'a Tables, b: &'a Tables) -> Result<Self, CompareError> {
        let mut names: Vec<&String> = a.tables.keys().chain(b.tables.keys()).collect();
        names.sort();
        names.dedup();

        let mut tables = Vec::new();
        let mut missing = Vec::new();
        let mut added = Vec::new();
        for name in names {
            match (a.tables.get(name), b.tables.get(name)) {
                (Some(TableSlot::Table(left)), Some(TableSlot::Table(right))) => {
                    tables.push(TableComparison::new(left, right)?);
                }
                (Some(TableSlot::Table(left)), None) => missing.push(left),
                (None, Some(TableSlot::Table(right))) => added.push(right),
                _ => {}
            }
        }

        Ok(Self {
            comments: true,
            tables,
            missing,
            added,
        })
    }

    pub fn ignore_comments(&mut self) {
        self.comments = false;
        for comparison in &mut self.tables {
            comparison.set_comments(false);
        }
    }

    pub fn include_comments(&mut self) {
        self.comments = true;
        for comparison in &mut self.tables {
            comparison.set_comments(true);
        }
    }

    pub fn equal(&self) -> bool {
        self.missing.is_empty()
            && self.added.is_empty()
            && self.tables.iter().all(TableComparison::equal)
    }

    pub fn to_report(&self) -> Vec<TableDiffEntry> {
        let comments = self.comments;
        let mut entries = Vec::new();
        for table in &self.missing {
            entries.push(TableDiffEntry::Missing {
                name: table.name.clone(),
                lines: table.to_lines(comments),
            });
        }
        for table in &self.added {
            entries.push(TableDiffEntry::New {
                name: table.name.clone(),
                lines: table.to_lines(comments),
            });
        }
        entries.extend(self.tables.iter().filter_map(TableComparison::to_report));
        entries
    }

    /// The report as human-readable lines.
    pub fn as_lines(&self) -> Vec<String> {
        crate::format::report_lines(&self.to_report())
    }
}

impl Tables {
    /// Coarse line-set comparison: serialize both sides and return the two
    /// set differences, with no positional or semantic alignment.
    pub fn compare(&self, other: &Tables) -> LineSetDiff {
        let self_lines = self.to_lines(true);
        let other_lines = other.to_lines(true);
        let self_set: HashSet<&String> = self_lines.iter().collect();
        let other_set: HashSet<&String> = other_lines.iter().collect();

        LineSetDiff {
            only_in_self: self_lines
                .iter()
                .filter(|line| !other_set.contains(line))
                .cloned()
                .collect(),
            only_in_compared: other_lines
                .iter()
                .filter(|line| !self_set.contains(line))
                .cloned()
                .collect(),
        }
    }
}
