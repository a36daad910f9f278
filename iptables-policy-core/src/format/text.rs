use crate::diff::result::{ChainDiffEntry, TableDiffEntry};

/// Render diff entries as human-readable report lines.
///
/// Per table: `Missing table:`/`New table:` followed by the table's full
/// serialized content, or `Changed table:` followed by per-chain detail.
/// Per changed chain: `New policy:` when the policy differs, then every
/// missing line (`-<i>: ...`) by ascending index, then every new line
/// (`+<i>: ...`) by ascending index.
pub fn report_lines(entries: &[TableDiffEntry]) -> Vec<String> {
    let mut out = Vec::new();
    for entry in entries {
        match entry {
            TableDiffEntry::Missing { name, lines } => {
                out.push(format!("Missing table: {name}"));
                out.extend(lines.iter().cloned());
            }
            TableDiffEntry::New { name, lines } => {
                out.push(format!("New table: {name}"));
                out.extend(lines.iter().cloned());
            }
            TableDiffEntry::Changed { name, chains } => {
                out.push(format!("Changed table: {name}"));
                for chain in chains {
                    push_chain_lines(&mut out, chain);
                }
            }
        }
    }
    out
}

/// Render diff entries as one plain-text block.
pub fn format_text(entries: &[TableDiffEntry]) -> String {
    report_lines(entries).join("\n")
}

fn push_chain_lines(out: &mut Vec<String>, entry: &ChainDiffEntry) {
    match entry {
        ChainDiffEntry::Missing { lines, .. } => {
            out.push("Missing chain:".to_string());
            out.extend(lines.iter().cloned());
        }
        ChainDiffEntry::New { lines, .. } => {
            out.push("New chain:".to_string());
            out.extend(lines.iter().cloned());
        }
        ChainDiffEntry::Changed {
            name,
            new_policy,
            missing,
            added,
        } => {
            out.push(format!("Changed chain: {name}"));
            if let Some(policy) = new_policy {
                out.push(format!("New policy: {policy}"));
            }
            for (index, line) in missing {
                out.push(format!("-{index}: {line}"));
            }
            for (index, line) in added {
                out.push(format!("+{index}: {line}"));
            }
        }
    }
}
