use serde_json::{Map, Value};

use crate::context::Context;
use crate::expansion::port_accept_rule;
use crate::interpolate::Interpolations;
use crate::tables::BuildError;

/// The single recognized directive of a rule descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// Verbatim iptables arguments appended to the owning chain.
    Raw(String),
    /// A comment-only rule.
    Comment(String),
    /// Expand a named macro in place.
    Macro(String),
    /// Expand a named service in place.
    Service(String),
    /// Open-port shorthand: a comment plus one accept rule per protocol.
    ServicePorts {
        name: String,
        tcp: Option<u16>,
        udp: Option<u16>,
    },
    /// A template expanded against the primitives tree.
    Interpolated(String),
    /// Rate-limited ULOG logging of a match spec, prefixed with the chain name.
    Ulog(String),
    /// Placeholder resolved by the merge engine; expands to nothing locally.
    AdditionPoints(Vec<String>),
}

/// One expanded output line, flagged for comment handling during diffs.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleLine {
    pub text: String,
    pub comment: bool,
}

/// Where a rule descriptor lives, for error paths and line emission.
#[derive(Debug, Clone, Copy)]
pub struct RuleSite<'a> {
    pub table: &'a str,
    pub chain: &'a str,
    pub position: usize,
}

impl RuleSite<'_> {
    pub fn path(&self) -> String {
        format!("{}.{}.{}", self.table, self.chain, self.position)
    }
}

/// One rule of a chain: a validated descriptor and its expanded lines.
///
/// Expansion happens once at construction; the rule is immutable afterwards
/// apart from renumbering during merge.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    table: String,
    chain: String,
    position: usize,
    directive: Directive,
    requires: Option<String>,
    lines: Vec<RuleLine>,
}

impl Rule {
    /// Build a rule from a declarative descriptor (a directive mapping or a
    /// raw textual rule line).
    pub fn from_value(value: &Value, site: RuleSite<'_>, ctx: &Context) -> Result<Self, BuildError> {
        let (directive, requires) = match value {
            Value::String(args) => (parse_rule_string(args), None),
            Value::Object(map) => parse_directive(map, &site)?,
            _ => return Err(BuildError::UnsupportedRule { path: site.path() }),
        };

        let guarded_out = match &requires {
            Some(path) => !ctx
                .primitives
                .as_ref()
                .is_some_and(|primitives| primitives.has(path)),
            None => false,
        };
        let lines = if guarded_out {
            Vec::new()
        } else {
            expand_directive(&directive, &site, ctx)?
        };

        Ok(Self {
            table: site.table.to_string(),
            chain: site.chain.to_string(),
            position: site.position,
            directive,
            requires,
            lines,
        })
    }

    /// Build a rule from the argument portion of a parsed `-A` dump line.
    pub fn from_dump(args: &str, site: RuleSite<'_>) -> Self {
        let directive = parse_rule_string(args);
        let lines = match &directive {
            Directive::Comment(text) => vec![comment_line(site.chain, text)],
            _ => vec![RuleLine {
                text: format!("-A {} {}", site.chain, args),
                comment: false,
            }],
        };
        Self {
            table: site.table.to_string(),
            chain: site.chain.to_string(),
            position: site.position,
            directive,
            requires: None,
            lines,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Identity of this rule within its firewall, `table.chain.index`.
    pub fn path(&self) -> String {
        format!("{}.{}.{}", self.table, self.chain, self.position)
    }

    pub fn directive(&self) -> &Directive {
        &self.directive
    }

    pub fn requires_primitive(&self) -> Option<&str> {
        self.requires.as_deref()
    }

    pub fn lines(&self) -> &[RuleLine] {
        &self.lines
    }

    pub(crate) fn set_position(&mut self, position: usize) {
        self.position = position;
    }
}

fn parse_directive(
    map: &Map<String, Value>,
    site: &RuleSite<'_>,
) -> Result<(Directive, Option<String>), BuildError> {
    let requires = match map.get("requires_primitive") {
        Some(Value::String(path)) => Some(path.clone()),
        Some(_) => {
            return Err(BuildError::InvalidValue {
                path: site.path(),
                key: "requires_primitive".to_string(),
            })
        }
        None => None,
    };

    let keys: Vec<&str> = map
        .keys()
        .map(String::as_str)
        .filter(|key| *key != "requires_primitive")
        .collect();

    let directive = match keys.as_slice() {
        [] => return Err(BuildError::MissingDirective { path: site.path() }),
        [key] => match *key {
            "raw" => Directive::Raw(string_value(map, "raw", site)?),
            "comment" => Directive::Comment(string_value(map, "comment", site)?),
            "macro" => Directive::Macro(string_value(map, "macro", site)?),
            "service" => Directive::Service(string_value(map, "service", site)?),
            "interpolated" => Directive::Interpolated(string_value(map, "interpolated", site)?),
            "ulog" => Directive::Ulog(string_value(map, "ulog", site)?),
            "node_addition_points" => {
                Directive::AdditionPoints(name_list(map, "node_addition_points", site)?)
            }
            _ => {
                return Err(BuildError::UnknownKeys {
                    path: site.path(),
                    keys: keys.join(", "),
                })
            }
        },
        _ => {
            let recognized = |key: &&str| {
                matches!(*key, "service_name" | "service_tcp" | "service_udp")
            };
            if !keys.iter().all(recognized) || !keys.contains(&"service_name") {
                return Err(BuildError::UnknownKeys {
                    path: site.path(),
                    keys: keys.join(", "),
                });
            }
            let tcp = port_value(map, "service_tcp", site)?;
            let udp = port_value(map, "service_udp", site)?;
            if tcp.is_none() && udp.is_none() {
                return Err(BuildError::MissingDirective { path: site.path() });
            }
            Directive::ServicePorts {
                name: string_value(map, "service_name", site)?,
                tcp,
                udp,
            }
        }
    };

    Ok((directive, requires))
}

fn expand_directive(
    directive: &Directive,
    site: &RuleSite<'_>,
    ctx: &Context,
) -> Result<Vec<RuleLine>, BuildError> {
    match directive {
        Directive::Raw(args) => Ok(vec![RuleLine {
            text: format!("-A {} {}", site.chain, args),
            comment: false,
        }]),
        Directive::Comment(text) => Ok(vec![comment_line(site.chain, text)]),
        Directive::Macro(name) => {
            let macros = ctx
                .macros
                .as_ref()
                .ok_or_else(|| BuildError::NoMacros { path: site.path() })?;
            let found = macros.get(name).ok_or_else(|| BuildError::UndefinedMacro {
                name: name.clone(),
                path: site.path(),
            })?;
            expand_fragments(found.fragments(), site, ctx)
        }
        Directive::Service(name) => {
            let services = ctx
                .services
                .as_ref()
                .ok_or_else(|| BuildError::NoServices { path: site.path() })?;
            let found = services
                .get(name)
                .ok_or_else(|| BuildError::UndefinedService {
                    name: name.clone(),
                    path: site.path(),
                })?;
            expand_fragments(found.fragments(), site, ctx)
        }
        Directive::ServicePorts { name, tcp, udp } => {
            let text = match (tcp, udp) {
                (Some(port), None) | (None, Some(port)) => format!("Port {port} - {name}"),
                _ => name.clone(),
            };
            let mut lines = vec![comment_line(site.chain, &text)];
            for (protocol, port) in [("tcp", tcp), ("udp", udp)] {
                if let Some(port) = port {
                    lines.push(RuleLine {
                        text: format!("-A {} {}", site.chain, port_accept_rule(protocol, *port)),
                        comment: false,
                    });
                }
            }
            Ok(lines)
        }
        Directive::Interpolated(template) => {
            let primitives = ctx
                .primitives
                .as_ref()
                .ok_or_else(|| BuildError::NoPrimitives { path: site.path() })?;
            let expanded = Interpolations::new(primitives).expand(template)?;
            Ok(expanded
                .into_iter()
                .map(|args| RuleLine {
                    text: format!("-A {} {}", site.chain, args),
                    comment: false,
                })
                .collect())
        }
        Directive::Ulog(match_spec) => Ok(vec![RuleLine {
            text: format!(
                "-A {chain} {match_spec} -m limit --limit 1/sec --limit-burst 2 -j ULOG --ulog-prefix \"{chain}:\"",
                chain = site.chain,
            ),
            comment: false,
        }]),
        Directive::AdditionPoints(_) => Ok(Vec::new()),
    }
}

fn expand_fragments(
    fragments: &[Value],
    site: &RuleSite<'_>,
    ctx: &Context,
) -> Result<Vec<RuleLine>, BuildError> {
    let mut lines = Vec::new();
    for fragment in fragments {
        let child = Rule::from_value(fragment, *site, ctx)?;
        lines.extend(child.lines);
    }
    Ok(lines)
}

/// Classify a textual rule line: a bare `-m comment --comment "..."` becomes
/// a comment rule so parsed and declared firewalls compare consistently.
fn parse_rule_string(args: &str) -> Directive {
    match comment_text(args) {
        Some(text) => Directive::Comment(text.to_string()),
        None => Directive::Raw(args.to_string()),
    }
}

fn comment_text(args: &str) -> Option<&str> {
    args.strip_prefix("-m comment --comment \"")?
        .strip_suffix('"')
}

fn comment_line(chain: &str, text: &str) -> RuleLine {
    RuleLine {
        text: format!("-A {chain} -m comment --comment \"{text}\""),
        comment: true,
    }
}

fn string_value(
    map: &Map<String, Value>,
    key: &str,
    site: &RuleSite<'_>,
) -> Result<String, BuildError> {
    map.get(key)
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .ok_or_else(|| BuildError::InvalidValue {
            path: site.path(),
            key: key.to_string(),
        })
}

fn name_list(
    map: &Map<String, Value>,
    key: &str,
    site: &RuleSite<'_>,
) -> Result<Vec<String>, BuildError> {
    let items = map
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| BuildError::InvalidValue {
            path: site.path(),
            key: key.to_string(),
        })?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(ToString::to_string)
                .ok_or_else(|| BuildError::InvalidValue {
                    path: site.path(),
                    key: key.to_string(),
                })
        })
        .collect()
}

fn port_value(
    map: &Map<String, Value>,
    key: &str,
    site: &RuleSite<'_>,
) -> Result<Option<u16>, BuildError> {
    match map.get(key) {
        None => Ok(None),
        Some(Value::Number(n)) => {
            let port = n.as_u64().ok_or_else(|| BuildError::InvalidValue {
                path: site.path(),
                key: key.to_string(),
            })?;
            u16::try_from(port)
                .map(Some)
                .map_err(|_| BuildError::PortRange {
                    path: site.path(),
                    port,
                })
        }
        Some(_) => Err(BuildError::InvalidValue {
            path: site.path(),
            key: key.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::{Directive, Rule, RuleSite};
    use crate::context::Context;

    fn site() -> RuleSite<'static> {
        RuleSite {
            table: "table1",
            chain: "chain1",
            position: 0,
        }
    }

    fn texts(rule: &Rule) -> Vec<&str> {
        rule.lines().iter().map(|line| line.text.as_str()).collect()
    }

    #[test]
    fn raw_rules_prepend_the_chain() {
        let rule =
            Rule::from_value(&json!({"raw": "-j ACCEPT"}), site(), &Context::new()).expect("rule");
        assert_eq!(texts(&rule), ["-A chain1 -j ACCEPT"]);
    }

    #[test]
    fn string_descriptors_detect_the_comment_pattern() {
        let rule = Rule::from_value(
            &json!("-m comment --comment \"note\""),
            site(),
            &Context::new(),
        )
        .expect("rule");
        assert!(matches!(rule.directive(), Directive::Comment(text) if text == "note"));
        assert!(rule.lines()[0].comment);

        let rule = Rule::from_value(
            &json!("-i eth0 -m comment --comment \"note\" -j ACCEPT"),
            site(),
            &Context::new(),
        )
        .expect("rule");
        assert!(matches!(rule.directive(), Directive::Raw(_)));
    }

    #[test]
    fn service_ports_emit_comment_then_accepts() {
        let rule = Rule::from_value(
            &json!({"service_name": "foo", "service_tcp": 1337}),
            site(),
            &Context::new(),
        )
        .expect("rule");
        assert_eq!(
            texts(&rule),
            [
                "-A chain1 -m comment --comment \"Port 1337 - foo\"",
                "-A chain1 -p tcp -m tcp --sport 1024:65535 --dport 1337 -m state --state NEW,ESTABLISHED -j ACCEPT",
            ]
        );

        let rule = Rule::from_value(
            &json!({"service_name": "foo", "service_tcp": 1337, "service_udp": 1337}),
            site(),
            &Context::new(),
        )
        .expect("rule");
        assert_eq!(
            texts(&rule),
            [
                "-A chain1 -m comment --comment \"foo\"",
                "-A chain1 -p tcp -m tcp --sport 1024:65535 --dport 1337 -m state --state NEW,ESTABLISHED -j ACCEPT",
                "-A chain1 -p udp -m udp --sport 1024:65535 --dport 1337 -m state --state NEW,ESTABLISHED -j ACCEPT",
            ]
        );
    }

    #[test]
    fn stray_keys_are_rejected() {
        assert!(Rule::from_value(
            &json!({"service_name": "foo", "service_tcp": 1337, "fake": 1}),
            site(),
            &Context::new(),
        )
        .is_err());
        assert!(Rule::from_value(&json!({"bad": 1}), site(), &Context::new()).is_err());
        assert!(Rule::from_value(&json!({}), site(), &Context::new()).is_err());
        assert!(Rule::from_value(&json!(1), site(), &Context::new()).is_err());
    }

    #[test]
    fn ulog_wraps_the_match_spec() {
        let rule =
            Rule::from_value(&json!({"ulog": "-p tcp"}), site(), &Context::new()).expect("rule");
        assert_eq!(
            texts(&rule),
            ["-A chain1 -p tcp -m limit --limit 1/sec --limit-burst 2 -j ULOG --ulog-prefix \"chain1:\""]
        );
    }

    #[test]
    fn addition_points_expand_to_nothing_locally() {
        let rule = Rule::from_value(
            &json!({"node_addition_points": ["chain1"]}),
            site(),
            &Context::new(),
        )
        .expect("rule");
        assert!(rule.lines().is_empty());
    }

    #[test]
    fn requires_primitive_guards_expansion() {
        let mut ctx = Context::new();
        ctx.primitives = Some(
            crate::primitives::Primitives::from_value(&json!({"present": "1"})).expect("tree"),
        );

        let guarded = Rule::from_value(
            &json!({"raw": "-j ACCEPT", "requires_primitive": "absent"}),
            site(),
            &ctx,
        )
        .expect("rule");
        assert!(guarded.lines().is_empty());

        let unguarded = Rule::from_value(
            &json!({"raw": "-j ACCEPT", "requires_primitive": "present"}),
            site(),
            &ctx,
        )
        .expect("rule");
        assert_eq!(texts(&unguarded), ["-A chain1 -j ACCEPT"]);
    }
}
