use std::collections::BTreeMap;

use serde_json::{json, Value};
use thiserror::Error;

/// Errors raised while building macro or service tables.
#[derive(Debug, Error)]
pub enum ExpansionError {
    /// Macro definitions must be a mapping of name to definition.
    #[error("expected a mapping of macro definitions")]
    UnsupportedMacros,
    /// Service definitions must be a mapping of name to definition.
    #[error("expected a mapping of service definitions")]
    UnsupportedServices,
    /// A macro definition was not an array, mapping, or string.
    #[error("unsupported macro definition for '{name}'")]
    UnsupportedMacro { name: String },
    /// A service definition was not an array, mapping, integer, or string.
    #[error("unsupported service definition for '{name}'")]
    UnsupportedService { name: String },
    /// A service mapping or array definition carried no content.
    #[error("empty service definition for '{name}'")]
    EmptyService { name: String },
    /// A service port did not fit an iptables port.
    #[error("service port {port} for '{name}' is out of range")]
    PortRange { name: String, port: u64 },
}

/// Named, reusable rule-fragment lists.
#[derive(Debug, Clone, Default)]
pub struct Macros {
    named: BTreeMap<String, Macro>,
}

/// One macro: an ordered list of rule-fragment descriptors.
#[derive(Debug, Clone)]
pub struct Macro {
    name: String,
    fragments: Vec<Value>,
}

impl Macros {
    /// Build the macro table from a declarative mapping.
    pub fn from_value(value: &Value) -> Result<Self, ExpansionError> {
        let map = value
            .as_object()
            .ok_or(ExpansionError::UnsupportedMacros)?;
        let mut named = BTreeMap::new();
        for (name, definition) in map {
            named.insert(name.clone(), Macro::from_value(name, definition)?);
        }
        Ok(Self { named })
    }

    pub fn get(&self, name: &str) -> Option<&Macro> {
        self.named.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.named.is_empty()
    }
}

impl Macro {
    fn from_value(name: &str, definition: &Value) -> Result<Self, ExpansionError> {
        let fragments = match definition {
            Value::Array(items) => items.clone(),
            Value::Object(_) => vec![definition.clone()],
            Value::String(s) => vec![json!({ "raw": s })],
            _ => {
                return Err(ExpansionError::UnsupportedMacro {
                    name: name.to_string(),
                })
            }
        };
        Ok(Self {
            name: name.to_string(),
            fragments,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fragments(&self) -> &[Value] {
        &self.fragments
    }
}

/// Named service expansions with open-port shorthand.
#[derive(Debug, Clone, Default)]
pub struct Services {
    named: BTreeMap<String, Service>,
}

/// One service: an ordered list of rule-fragment descriptors.
#[derive(Debug, Clone)]
pub struct Service {
    name: String,
    fragments: Vec<Value>,
}

impl Services {
    /// Build the service table from a declarative mapping.
    pub fn from_value(value: &Value) -> Result<Self, ExpansionError> {
        let map = value
            .as_object()
            .ok_or(ExpansionError::UnsupportedServices)?;
        let mut named = BTreeMap::new();
        for (name, definition) in map {
            named.insert(name.clone(), Service::from_value(name, definition)?);
        }
        Ok(Self { named })
    }

    pub fn get(&self, name: &str) -> Option<&Service> {
        self.named.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.named.is_empty()
    }
}

impl Service {
    fn from_value(name: &str, definition: &Value) -> Result<Self, ExpansionError> {
        let fragments = match definition {
            Value::Number(n) => {
                let port = n.as_u64().ok_or_else(|| ExpansionError::UnsupportedService {
                    name: name.to_string(),
                })?;
                let port = u16::try_from(port).map_err(|_| ExpansionError::PortRange {
                    name: name.to_string(),
                    port,
                })?;
                vec![
                    json!({ "comment": format!("Port {port} - {name}") }),
                    json!({ "raw": port_accept_rule("tcp", port) }),
                ]
            }
            Value::String(s) => vec![json!({ "comment": name }), json!({ "raw": s })],
            Value::Object(map) => {
                if map.is_empty() {
                    return Err(ExpansionError::EmptyService {
                        name: name.to_string(),
                    });
                }
                let mut fragment = map.clone();
                fragment.insert("service_name".to_string(), Value::String(name.to_string()));
                vec![Value::Object(fragment)]
            }
            Value::Array(items) => {
                if items.is_empty() {
                    return Err(ExpansionError::EmptyService {
                        name: name.to_string(),
                    });
                }
                let mut fragments = vec![json!({ "comment": name })];
                fragments.extend(items.iter().cloned());
                fragments
            }
            _ => {
                return Err(ExpansionError::UnsupportedService {
                    name: name.to_string(),
                })
            }
        };
        Ok(Self {
            name: name.to_string(),
            fragments,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fragments(&self) -> &[Value] {
        &self.fragments
    }
}

/// The stateful open-port rule shared by services and `service_tcp`/`service_udp`.
pub(crate) fn port_accept_rule(protocol: &str, port: u16) -> String {
    format!(
        "-p {protocol} -m {protocol} --sport 1024:65535 --dport {port} -m state --state NEW,ESTABLISHED -j ACCEPT"
    )
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::{ExpansionError, Macros, Services};

    #[test]
    fn macro_source_forms() {
        let macros = Macros::from_value(&json!({
            "from_string": "-j macro1",
            "from_mapping": {"ulog": "-p tcp"},
            "from_array": ["-j a", {"raw": "-j b"}],
        }))
        .expect("macros should build");

        assert_eq!(
            macros.get("from_string").expect("macro").fragments(),
            &[json!({"raw": "-j macro1"})]
        );
        assert_eq!(
            macros.get("from_mapping").expect("macro").fragments(),
            &[json!({"ulog": "-p tcp"})]
        );
        assert_eq!(macros.get("from_array").expect("macro").fragments().len(), 2);
        assert!(Macros::from_value(&json!({"bad": 1})).is_err());
    }

    #[test]
    fn integer_service_opens_a_tcp_port() {
        let services =
            Services::from_value(&json!({"service1": 1111})).expect("services should build");

        assert_eq!(
            services.get("service1").expect("service").fragments(),
            &[
                json!({"comment": "Port 1111 - service1"}),
                json!({"raw": "-p tcp -m tcp --sport 1024:65535 --dport 1111 -m state --state NEW,ESTABLISHED -j ACCEPT"}),
            ]
        );
    }

    #[test]
    fn mapping_service_injects_its_name() {
        let services = Services::from_value(&json!({"svc": {"service_tcp": 8080}}))
            .expect("services should build");

        assert_eq!(
            services.get("svc").expect("service").fragments(),
            &[json!({"service_tcp": 8080, "service_name": "svc"})]
        );
    }

    #[test]
    fn empty_and_unsupported_services_are_rejected() {
        assert!(matches!(
            Services::from_value(&json!({"svc": {}})),
            Err(ExpansionError::EmptyService { .. })
        ));
        assert!(matches!(
            Services::from_value(&json!({"svc": []})),
            Err(ExpansionError::EmptyService { .. })
        ));
        assert!(matches!(
            Services::from_value(&json!({"svc": 1.5})),
            Err(ExpansionError::UnsupportedService { .. })
        ));
        assert!(matches!(
            Services::from_value(&json!({"svc": 70000})),
            Err(ExpansionError::PortRange { .. })
        ));
    }
}
