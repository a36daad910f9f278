use crate::tables::{Chain, ChainSlot, Table, TableSlot, Tables};

/// Built-in chains serialize first, in kernel order; user chains follow in
/// definition order.
const BUILTIN_ORDER: [&str; 5] = ["PREROUTING", "INPUT", "FORWARD", "OUTPUT", "POSTROUTING"];

fn builtin_rank(name: &str) -> usize {
    BUILTIN_ORDER
        .iter()
        .position(|builtin| *builtin == name)
        .unwrap_or(BUILTIN_ORDER.len())
}

impl Tables {
    /// Serialize the firewall to its canonical line sequence.
    pub fn to_lines(&self, include_comments: bool) -> Vec<String> {
        let mut lines = Vec::new();
        for (name, slot) in &self.tables {
            let TableSlot::Table(table) = slot else {
                continue;
            };
            lines.push(format!("*{name}"));
            lines.extend(table.to_lines(include_comments));
            lines.push("COMMIT".to_string());
        }
        lines
    }
}

impl Table {
    /// Serialize chain declarations followed by rule lines, without the
    /// surrounding `*name`/`COMMIT` pair.
    pub fn to_lines(&self, include_comments: bool) -> Vec<String> {
        let chains = self.ordered_chains();
        let mut lines: Vec<String> = chains.iter().map(|chain| chain.declaration()).collect();
        for chain in chains {
            lines.extend(chain.rule_lines(include_comments));
        }
        lines
    }

    /// Real chains in output order.
    pub fn ordered_chains(&self) -> Vec<&Chain> {
        let mut chains: Vec<&Chain> = self
            .chains
            .iter()
            .filter_map(|entry| match &entry.slot {
                ChainSlot::Chain(chain) => Some(chain),
                _ => None,
            })
            .collect();
        chains.sort_by_key(|chain| builtin_rank(&chain.name));
        chains
    }
}

impl Chain {
    /// The `:name POLICY` declaration line. Counters are never emitted.
    pub fn declaration(&self) -> String {
        format!(":{} {}", self.name, self.policy())
    }

    /// Expanded rule lines under the given comment policy.
    pub fn rule_lines(&self, include_comments: bool) -> Vec<String> {
        self.rules
            .iter()
            .flat_map(|rule| rule.lines())
            .filter(|line| include_comments || !line.comment)
            .map(|line| line.text.clone())
            .collect()
    }

    /// Declaration plus rule lines, as shown in diff reports.
    pub fn to_lines(&self, include_comments: bool) -> Vec<String> {
        let mut lines = vec![self.declaration()];
        lines.extend(self.rule_lines(include_comments));
        lines
    }
}
