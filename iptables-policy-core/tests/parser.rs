use iptables_policy_core::{parse, Context, Tables, TablesComparison};
use pretty_assertions::assert_eq;
use serde_json::json;

const DUMP: &str = "\
*filter
:INPUT DROP
:FORWARD DROP
:OUTPUT ACCEPT
-A INPUT -m comment --comment \"accept established\"
-A INPUT -m state --state ESTABLISHED,RELATED -j ACCEPT
-A OUTPUT -j ACCEPT
COMMIT
*nat
:PREROUTING ACCEPT
:POSTROUTING ACCEPT
-A POSTROUTING -o eth0 -j MASQUERADE
COMMIT
";

#[test]
fn round_trip_reproduces_the_dump() {
    let tables = parse(DUMP).expect("dump should parse");
    let lines: Vec<&str> = DUMP.lines().collect();
    assert_eq!(tables.to_lines(true), lines);
}

#[test]
fn counters_are_normalized_away() {
    let tables = parse(
        "*filter\n:INPUT ACCEPT [1234:5678]\n-A INPUT -j ACCEPT\nCOMMIT\n",
    )
    .expect("dump should parse");
    assert_eq!(
        tables.to_lines(true),
        ["*filter", ":INPUT ACCEPT", "-A INPUT -j ACCEPT", "COMMIT"]
    );
}

#[test]
fn parsed_and_declared_firewalls_compare_consistently() {
    let parsed = parse(
        "*filter\n:INPUT ACCEPT [0:0]\n-A INPUT -m comment --comment \"note\"\n-A INPUT -j ACCEPT\nCOMMIT\n",
    )
    .expect("dump should parse");
    let declared = Tables::from_value(
        &json!({"filter": {"INPUT": {"rules": [
            "-m comment --comment \"note\"",
            "-j ACCEPT",
        ]}}}),
        &Context::new(),
    )
    .expect("tables should build");

    let comparison = TablesComparison::new(&parsed, &declared).expect("comparison");
    assert!(comparison.equal());
}

#[test]
fn set_compare_reports_both_differences() {
    let a = parse("*table1\nCOMMIT\n").expect("parse");
    let b = parse("*table2\nCOMMIT\n").expect("parse");

    let diff = a.compare(&b);
    assert_eq!(diff.only_in_self, ["*table1"]);
    assert_eq!(diff.only_in_compared, ["*table2"]);
}
