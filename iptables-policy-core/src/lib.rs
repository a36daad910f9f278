//! Declarative iptables policy compilation, merging, and comparison.
//!
//! A firewall is modeled as tables of chains of rules. Rule-sets come from
//! two directions: declarative policy trees whose rule descriptors expand
//! through primitives, interpolation, macros, and services into concrete
//! lines, and `iptables-save` style dumps parsed from a running host. A
//! policy firewall converges with a rules overlay through named addition
//! points, and two firewalls compare structurally under semantic rule
//! equality for drift detection.

pub mod context;
pub mod diff;
pub mod expansion;
pub mod format;
pub mod interpolate;
mod merge;
pub mod parser;
pub mod primitives;
pub mod rule;
pub mod tables;
mod writer;

pub use context::Context;
pub use diff::{
    ChainComparison, ChainDiffEntry, CompareError, LineSetDiff, TableComparison, TableDiffEntry,
    TablesComparison,
};
pub use expansion::{ExpansionError, Macro, Macros, Service, Services};
pub use format::{format_json, format_text, report_lines};
pub use interpolate::Interpolations;
pub use parser::{parse, parse_file, ParseError};
pub use primitives::{PrimitiveError, Primitives, Substitution};
pub use rule::{Directive, Rule, RuleLine};
pub use tables::{BuildError, Chain, ChainEntry, ChainSlot, Contribution, Table, TableSlot, Tables};
