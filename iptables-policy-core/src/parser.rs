use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::rule::{Rule, RuleSite};
use crate::tables::{Chain, ChainEntry, ChainSlot, Table, TableSlot, Tables};

/// Errors that can occur while parsing a rule dump into a [`Tables`] tree.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Failed to read the input file.
    #[error("failed to read rules file: {0}")]
    Io(#[from] std::io::Error),
    /// A chain declaration or rule appeared before any `*table` line.
    #[error("line {line}: '{content}' appears outside any table section")]
    OutsideTable { line: usize, content: String },
    /// A chain declaration lacked its policy column.
    #[error("line {line}: malformed chain declaration '{content}'")]
    MalformedChain { line: usize, content: String },
    /// A rule referenced a chain that was never declared.
    #[error("line {line}: rule for undeclared chain '{chain}'")]
    UndeclaredChain { line: usize, chain: String },
    /// The line matched no part of the rule-dump grammar.
    #[error("line {line}: unrecognized input '{content}'")]
    Unrecognized { line: usize, content: String },
}

/// Parse `iptables-save` style text into a [`Tables`] tree.
///
/// Empty input yields an empty firewall; anything that is neither blank, a
/// `#` comment, nor part of a table section is an error.
pub fn parse(text: &str) -> Result<Tables, ParseError> {
    let mut tables = Tables::new();
    let mut current: Option<Table> = None;

    for (index, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        let line_no = index + 1;

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(name) = line.strip_prefix('*') {
            if let Some(table) = current.take() {
                tables.tables.insert(table.name.clone(), TableSlot::Table(table));
            }
            current = Some(Table {
                name: name.to_string(),
                chains: Vec::new(),
            });
            continue;
        }

        if line == "COMMIT" {
            let table = current.take().ok_or_else(|| ParseError::OutsideTable {
                line: line_no,
                content: line.to_string(),
            })?;
            tables.tables.insert(table.name.clone(), TableSlot::Table(table));
            continue;
        }

        if let Some(declaration) = line.strip_prefix(':') {
            let table = current.as_mut().ok_or_else(|| ParseError::OutsideTable {
                line: line_no,
                content: line.to_string(),
            })?;
            let mut columns = declaration.split_whitespace();
            let (Some(name), Some(policy)) = (columns.next(), columns.next()) else {
                return Err(ParseError::MalformedChain {
                    line: line_no,
                    content: line.to_string(),
                });
            };
            // The optional trailing counters column is accepted and ignored.
            table.chains.push(ChainEntry {
                name: name.to_string(),
                slot: ChainSlot::Chain(Chain {
                    name: name.to_string(),
                    table: table.name.clone(),
                    policy: Some(policy.to_string()),
                    rules: Vec::new(),
                    additions: Vec::new(),
                }),
            });
            continue;
        }

        if let Some(rest) = line.strip_prefix("-A ") {
            let table = current.as_mut().ok_or_else(|| ParseError::OutsideTable {
                line: line_no,
                content: line.to_string(),
            })?;
            let (chain_name, args) =
                rest.split_once(' ')
                    .ok_or_else(|| ParseError::Unrecognized {
                        line: line_no,
                        content: line.to_string(),
                    })?;
            let table_name = table.name.clone();
            let chain = table
                .chain_mut(chain_name)
                .ok_or_else(|| ParseError::UndeclaredChain {
                    line: line_no,
                    chain: chain_name.to_string(),
                })?;
            let site = RuleSite {
                table: &table_name,
                chain: chain_name,
                position: chain.rules.len(),
            };
            chain.rules.push(Rule::from_dump(args, site));
            continue;
        }

        return Err(ParseError::Unrecognized {
            line: line_no,
            content: line.to_string(),
        });
    }

    if let Some(table) = current.take() {
        tables.tables.insert(table.name.clone(), TableSlot::Table(table));
    }

    Ok(tables)
}

/// Parse a rule-dump file into a [`Tables`] tree.
pub fn parse_file(path: &Path) -> Result<Tables, ParseError> {
    let text = fs::read_to_string(path)?;
    parse(&text)
}

#[cfg(test)]
mod tests {
    use super::{parse, ParseError};
    use crate::rule::Directive;

    #[test]
    fn empty_input_is_an_empty_firewall() {
        let tables = parse("").expect("empty input should parse");
        assert!(tables.tables.is_empty());
        assert!(parse("  \n\n").expect("blank input should parse").tables.is_empty());
    }

    #[test]
    fn garbage_input_is_rejected() {
        assert!(matches!(
            parse("garbage"),
            Err(ParseError::Unrecognized { line: 1, .. })
        ));
    }

    #[test]
    fn dump_comment_lines_are_skipped() {
        let tables = parse("# Generated by iptables-save\n*filter\nCOMMIT\n")
            .expect("dump should parse");
        assert!(tables.table("filter").is_some());
    }

    #[test]
    fn rules_attach_to_their_declared_chain_in_order() {
        let tables = parse(
            "*filter\n:INPUT ACCEPT [10:20]\n-A INPUT -j ACCEPT\n-A INPUT -m comment --comment \"note\"\nCOMMIT\n",
        )
        .expect("dump should parse");

        let chain = tables
            .table("filter")
            .expect("table")
            .chain("INPUT")
            .expect("chain");
        assert_eq!(chain.policy(), "ACCEPT");
        assert_eq!(chain.rules.len(), 2);
        assert!(matches!(chain.rules[0].directive(), Directive::Raw(_)));
        assert!(matches!(chain.rules[1].directive(), Directive::Comment(_)));
        assert_eq!(chain.rules[1].position(), 1);
    }

    #[test]
    fn rules_for_undeclared_chains_are_rejected() {
        assert!(matches!(
            parse("*filter\n-A INPUT -j ACCEPT\nCOMMIT\n"),
            Err(ParseError::UndeclaredChain { .. })
        ));
    }
}
