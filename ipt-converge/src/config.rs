use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use thiserror::Error;

use iptables_policy_core::{
    BuildError, Context, ExpansionError, Macros, PrimitiveError, Primitives, Services, Tables,
};

/// Top-level keys a configuration directory may provide, one file each.
const CONFIG_KEYS: [&str; 6] = [
    "policy",
    "policy6",
    "rules",
    "primitives",
    "macros",
    "services",
];

/// Errors raised while loading or converging a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to parse TOML in {}: {source}", path.display())]
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },
    /// Configuration files must hold a top-level mapping.
    #[error("{} does not hold a top-level mapping", path.display())]
    NotAMapping { path: PathBuf },
    /// Two files defined the same top-level key.
    #[error("duplicate configuration key '{key}' from {}", path.display())]
    DuplicateKey { key: String, path: PathBuf },
    #[error("don't know how to read {}", path.display())]
    UnsupportedFile { path: PathBuf },
    #[error("missing configuration key '{key}'")]
    MissingKey { key: String },
    #[error(transparent)]
    Primitive(#[from] PrimitiveError),
    #[error(transparent)]
    Expansion(#[from] ExpansionError),
    #[error(transparent)]
    Build(#[from] BuildError),
}

/// Parsed configuration: one merged top-level key/value lookup.
#[derive(Debug, Default)]
pub struct Configuration {
    parsed: Map<String, Value>,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every path, merging top-level keys. A directory contributes the
    /// known configuration files it contains.
    pub fn load(paths: &[PathBuf]) -> Result<Self, ConfigError> {
        let mut configuration = Self::new();
        for path in paths {
            configuration.load_path(path)?;
        }
        Ok(configuration)
    }

    /// Load one configuration file, or every known file in a directory.
    pub fn load_path(&mut self, path: &Path) -> Result<(), ConfigError> {
        if path.is_dir() {
            for key in CONFIG_KEYS {
                for extension in ["json", "toml"] {
                    let candidate = path.join(format!("{key}.{extension}"));
                    if candidate.is_file() {
                        self.add_file(&candidate)?;
                    }
                }
            }
            return Ok(());
        }
        self.add_file(path)
    }

    fn add_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let value: Value = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json" | "js") => {
                serde_json::from_str(&text).map_err(|source| ConfigError::Json {
                    path: path.to_path_buf(),
                    source,
                })?
            }
            Some("toml") => {
                let parsed: toml::Value =
                    toml::from_str(&text).map_err(|source| ConfigError::Toml {
                        path: path.to_path_buf(),
                        source,
                    })?;
                serde_json::to_value(parsed).map_err(|source| ConfigError::Json {
                    path: path.to_path_buf(),
                    source,
                })?
            }
            _ => {
                return Err(ConfigError::UnsupportedFile {
                    path: path.to_path_buf(),
                })
            }
        };

        let Value::Object(map) = value else {
            return Err(ConfigError::NotAMapping {
                path: path.to_path_buf(),
            });
        };
        for (key, entry) in map {
            if self.parsed.contains_key(&key) {
                return Err(ConfigError::DuplicateKey {
                    key,
                    path: path.to_path_buf(),
                });
            }
            self.parsed.insert(key, entry);
        }
        Ok(())
    }

    /// Build the expansion context from whichever of `primitives`, `macros`,
    /// and `services` are present.
    pub fn context(&self) -> Result<Context, ConfigError> {
        let mut ctx = Context::new();
        if let Some(value) = self.parsed.get("primitives") {
            ctx.primitives = Some(Primitives::from_value(value)?);
        }
        if let Some(value) = self.parsed.get("macros") {
            ctx.macros = Some(Macros::from_value(value)?);
        }
        if let Some(value) = self.parsed.get("services") {
            ctx.services = Some(Services::from_value(value)?);
        }
        Ok(ctx)
    }

    /// Build the IPv4 policy firewall.
    pub fn policy(&self, ctx: &Context) -> Result<Tables, ConfigError> {
        self.tables("policy", ctx)
    }

    /// Build the IPv6 policy firewall.
    pub fn policy6(&self, ctx: &Context) -> Result<Tables, ConfigError> {
        self.tables("policy6", ctx)
    }

    /// Build the rules overlay.
    pub fn rules(&self, ctx: &Context) -> Result<Tables, ConfigError> {
        self.tables("rules", ctx)
    }

    /// Converge the IPv4 policy with the rules overlay.
    pub fn converge(&self) -> Result<Tables, ConfigError> {
        let ctx = self.context()?;
        let mut policy = self.policy(&ctx)?;
        let rules = self.rules(&ctx)?;
        policy.merge(&rules, &ctx)?;
        Ok(policy)
    }

    /// Expand the IPv6 policy; it takes no overlay, but its own addition
    /// points still resolve.
    pub fn converge6(&self) -> Result<Tables, ConfigError> {
        let ctx = self.context()?;
        let mut policy = self.policy6(&ctx)?;
        policy.merge(&Tables::new(), &ctx)?;
        Ok(policy)
    }

    fn tables(&self, key: &str, ctx: &Context) -> Result<Tables, ConfigError> {
        let value = self.parsed.get(key).ok_or_else(|| ConfigError::MissingKey {
            key: key.to_string(),
        })?;
        Ok(Tables::from_value(value, ctx)?)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use pretty_assertions::assert_eq;

    use super::{ConfigError, Configuration};

    #[test]
    fn converge_overlays_rules_onto_policy() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join("policy.json"),
            r#"{"policy": {"filter": {"INPUT": {
                "policy": "DROP",
                "rules": ["-j r1", {"node_addition_points": ["INPUT"]}]
            }}}}"#,
        )
        .expect("write");
        fs::write(
            dir.path().join("rules.json"),
            r#"{"rules": {"filter": {"INPUT": {"additions": ["-j add"]}}}}"#,
        )
        .expect("write");

        let mut configuration = Configuration::new();
        configuration.load_path(dir.path()).expect("directory loads");
        let converged = configuration.converge().expect("converge");

        assert_eq!(
            converged.to_lines(true),
            ["*filter", ":INPUT DROP", "-A INPUT -j r1", "-A INPUT -j add", "COMMIT"]
        );
    }

    #[test]
    fn duplicate_top_level_keys_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = dir.path().join("a.json");
        let second = dir.path().join("b.json");
        fs::write(&first, r#"{"policy": {}}"#).expect("write");
        fs::write(&second, r#"{"policy": {}}"#).expect("write");

        let mut configuration = Configuration::new();
        configuration.load_path(&first).expect("first file loads");
        assert!(matches!(
            configuration.load_path(&second),
            Err(ConfigError::DuplicateKey { key, .. }) if key == "policy"
        ));
    }

    #[test]
    fn toml_and_json_merge_into_one_lookup() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("policy.json"), r#"{"policy": {"filter": {}}}"#)
            .expect("write");
        fs::write(
            dir.path().join("services.toml"),
            "[services]\nssh = 22\n",
        )
        .expect("write");

        let mut configuration = Configuration::new();
        configuration.load_path(dir.path()).expect("directory loads");
        let ctx = configuration.context().expect("context");
        assert!(ctx.services.is_some());
        assert!(configuration.policy(&ctx).is_ok());
    }

    #[test]
    fn missing_required_keys_are_named() {
        let configuration = Configuration::new();
        assert!(matches!(
            configuration.converge(),
            Err(ConfigError::MissingKey { key }) if key == "policy"
        ));
    }

    #[test]
    fn unknown_file_types_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("policy.yaml");
        fs::write(&path, "policy: {}").expect("write");

        let mut configuration = Configuration::new();
        assert!(matches!(
            configuration.load_path(&path),
            Err(ConfigError::UnsupportedFile { .. })
        ));
    }
}
