//! Structural model of the node's TOML configuration documents.
//!
//! A [`ConfigDocument`] is an ordered list of root keys followed by ordered
//! sections, each an ordered list of keys. Nested tables are sections named by
//! their full dotted path (`streaming.abci`). Keys are addressed by dotted path
//! (`section.key`, or a bare `key` for the root table), never by text
//! matching, so a patch against a reformatted file still finds its target and
//! a patch against a missing key fails loudly.

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Which of the two node documents this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// Consensus-layer `config.toml`.
    Consensus,
    /// Application-layer `app.toml`.
    App,
}

impl DocumentKind {
    pub fn file_name(&self) -> &'static str {
        match self {
            DocumentKind::Consensus => "config.toml",
            DocumentKind::App => "app.toml",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// Document access errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocumentError {
    #[error("key path '{path}' not found in {document}")]
    MissingKey { document: DocumentKind, path: String },

    #[error("key path '{path}' in {document} holds a {found}, cannot store a {expected}")]
    TypeMismatch {
        document: DocumentKind,
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("key path '{path}' already exists in {document}")]
    DuplicateKey { document: DocumentKind, path: String },

    #[error("'{path}' is not a valid key path")]
    InvalidPath { document: DocumentKind, path: String },

    #[error("cannot parse {document}: {message}")]
    Parse { document: DocumentKind, message: String },
}

impl DocumentError {
    pub fn document(&self) -> DocumentKind {
        match self {
            DocumentError::MissingKey { document, .. }
            | DocumentError::TypeMismatch { document, .. }
            | DocumentError::DuplicateKey { document, .. }
            | DocumentError::InvalidPath { document, .. }
            | DocumentError::Parse { document, .. } => *document,
        }
    }
}

/// A typed configuration value.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    /// Rendered as a Go duration string (`5s`, `168h0m0s`).
    Duration(Duration),
    List(Vec<ConfigValue>),
}

impl ConfigValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ConfigValue::String(_) => "string",
            ConfigValue::Integer(_) => "integer",
            ConfigValue::Float(_) => "float",
            ConfigValue::Bool(_) => "bool",
            ConfigValue::Duration(_) => "duration",
            ConfigValue::List(_) => "list",
        }
    }

    /// Whether `other` may overwrite a slot currently holding `self`.
    ///
    /// Durations are stored as strings on disk, so the two are interchangeable.
    pub fn accepts(&self, other: &ConfigValue) -> bool {
        use ConfigValue::*;
        matches!(
            (self, other),
            (String(_) | Duration(_), String(_) | Duration(_))
                | (Integer(_), Integer(_))
                | (Float(_), Float(_) | Integer(_))
                | (Bool(_), Bool(_))
                | (List(_), List(_))
        )
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            ConfigValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn strings<I, S>(items: I) -> ConfigValue
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ConfigValue::List(
            items
                .into_iter()
                .map(|s| ConfigValue::String(s.into()))
                .collect(),
        )
    }

    fn to_toml(&self) -> toml::Value {
        match self {
            ConfigValue::String(s) => toml::Value::String(s.clone()),
            ConfigValue::Integer(i) => toml::Value::Integer(*i),
            ConfigValue::Float(f) => toml::Value::Float(*f),
            ConfigValue::Bool(b) => toml::Value::Boolean(*b),
            ConfigValue::Duration(d) => toml::Value::String(format_go_duration(*d)),
            ConfigValue::List(items) => {
                toml::Value::Array(items.iter().map(ConfigValue::to_toml).collect())
            }
        }
    }

    fn from_toml(value: toml::Value) -> Result<ConfigValue, String> {
        Ok(match value {
            toml::Value::String(s) => ConfigValue::String(s),
            toml::Value::Integer(i) => ConfigValue::Integer(i),
            toml::Value::Float(f) => ConfigValue::Float(f),
            toml::Value::Boolean(b) => ConfigValue::Bool(b),
            toml::Value::Datetime(dt) => ConfigValue::String(dt.to_string()),
            toml::Value::Array(items) => ConfigValue::List(
                items
                    .into_iter()
                    .map(ConfigValue::from_toml)
                    .collect::<Result<_, _>>()?,
            ),
            toml::Value::Table(_) => {
                return Err("tables inside arrays are not supported".to_string())
            }
        })
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_toml())
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        ConfigValue::String(s.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        ConfigValue::String(s)
    }
}

impl From<i64> for ConfigValue {
    fn from(i: i64) -> Self {
        ConfigValue::Integer(i)
    }
}

impl From<i32> for ConfigValue {
    fn from(i: i32) -> Self {
        ConfigValue::Integer(i64::from(i))
    }
}

impl From<u16> for ConfigValue {
    fn from(i: u16) -> Self {
        ConfigValue::Integer(i64::from(i))
    }
}

impl From<f64> for ConfigValue {
    fn from(f: f64) -> Self {
        ConfigValue::Float(f)
    }
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self {
        ConfigValue::Bool(b)
    }
}

impl From<Duration> for ConfigValue {
    fn from(d: Duration) -> Self {
        ConfigValue::Duration(d)
    }
}

/// Format a duration the way Go's `time.Duration.String` does.
pub fn format_go_duration(d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }
    if nanos < 1_000 {
        return format!("{}ns", nanos);
    }
    if nanos < 1_000_000 {
        return format!("{}µs", decimal(nanos / 1_000, nanos % 1_000, 3));
    }
    if nanos < 1_000_000_000 {
        return format!("{}ms", decimal(nanos / 1_000_000, nanos % 1_000_000, 6));
    }

    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = decimal((total_secs % 60) as u128, d.subsec_nanos() as u128, 9);

    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

fn decimal(whole: u128, frac: u128, digits: usize) -> String {
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{:0width$}", frac, width = digits);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

#[derive(Debug, Clone, PartialEq)]
struct Section {
    name: String,
    entries: Vec<(String, ConfigValue)>,
}

/// An ordered, structurally addressed TOML document.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigDocument {
    kind: DocumentKind,
    root: Vec<(String, ConfigValue)>,
    sections: Vec<Section>,
}

impl ConfigDocument {
    /// An empty document.
    pub fn new(kind: DocumentKind) -> Self {
        ConfigDocument {
            kind,
            root: Vec::new(),
            sections: Vec::new(),
        }
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    fn split_path<'a>(&self, path: &'a str) -> Result<(Option<&'a str>, &'a str), DocumentError> {
        let (section, key) = match path.rsplit_once('.') {
            Some((section, key)) => (Some(section), key),
            None => (None, path),
        };
        if key.is_empty() || section.is_some_and(|s| s.split('.').any(str::is_empty)) {
            return Err(DocumentError::InvalidPath {
                document: self.kind,
                path: path.to_string(),
            });
        }
        Ok((section, key))
    }

    fn entries(&self, section: Option<&str>) -> Option<&Vec<(String, ConfigValue)>> {
        match section {
            None => Some(&self.root),
            Some(name) => self
                .sections
                .iter()
                .find(|s| s.name == name)
                .map(|s| &s.entries),
        }
    }

    fn entries_mut(&mut self, section: Option<&str>) -> Option<&mut Vec<(String, ConfigValue)>> {
        match section {
            None => Some(&mut self.root),
            Some(name) => self
                .sections
                .iter_mut()
                .find(|s| s.name == name)
                .map(|s| &mut s.entries),
        }
    }

    /// Look up a value by dotted path.
    pub fn get(&self, path: &str) -> Option<&ConfigValue> {
        let (section, key) = self.split_path(path).ok()?;
        self.entries(section)?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Overwrite an existing key. Never creates keys.
    pub fn set(&mut self, path: &str, value: impl Into<ConfigValue>) -> Result<(), DocumentError> {
        let value = value.into();
        let kind = self.kind;
        let (section, key) = self.split_path(path)?;
        let slot = self
            .entries_mut(section)
            .and_then(|entries| entries.iter_mut().find(|(k, _)| k == key))
            .map(|(_, v)| v)
            .ok_or_else(|| DocumentError::MissingKey {
                document: kind,
                path: path.to_string(),
            })?;

        if !slot.accepts(&value) {
            return Err(DocumentError::TypeMismatch {
                document: kind,
                path: path.to_string(),
                expected: value.type_name(),
                found: slot.type_name(),
            });
        }
        *slot = value;
        Ok(())
    }

    /// Append a new key, creating its section if needed.
    pub fn insert(
        &mut self,
        path: &str,
        value: impl Into<ConfigValue>,
    ) -> Result<(), DocumentError> {
        let (section, key) = self.split_path(path)?;
        if self.contains(path) {
            return Err(DocumentError::DuplicateKey {
                document: self.kind,
                path: path.to_string(),
            });
        }
        let (section, key) = (section.map(str::to_string), key.to_string());
        if let Some(name) = &section {
            if !self.sections.iter().any(|s| &s.name == name) {
                self.sections.push(Section {
                    name: name.clone(),
                    entries: Vec::new(),
                });
            }
        }
        if let Some(entries) = self.entries_mut(section.as_deref()) {
            entries.push((key, value.into()));
        }
        Ok(())
    }

    /// Every key path, in document order.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.root.iter().map(|(k, _)| k.clone()).collect();
        for section in &self.sections {
            keys.extend(
                section
                    .entries
                    .iter()
                    .map(|(k, _)| format!("{}.{}", section.name, k)),
            );
        }
        keys
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().map(|s| s.name.as_str())
    }

    /// Render as TOML text. Identical documents render identically.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.root {
            out.push_str(&format!("{} = {}\n", toml_key(key), value));
        }
        for section in &self.sections {
            if !out.is_empty() {
                out.push('\n');
            }
            let header: Vec<String> = section.name.split('.').map(toml_key).collect();
            out.push_str(&format!("[{}]\n", header.join(".")));
            for (key, value) in &section.entries {
                out.push_str(&format!("{} = {}\n", toml_key(key), value));
            }
        }
        out
    }

    /// Parse TOML text. Comments and formatting are not retained.
    pub fn parse(kind: DocumentKind, text: &str) -> Result<ConfigDocument, DocumentError> {
        let parse_err = |message: String| DocumentError::Parse {
            document: kind,
            message,
        };
        let table: toml::Table = text.parse().map_err(|e: toml::de::Error| {
            parse_err(e.message().to_string())
        })?;

        let mut doc = ConfigDocument::new(kind);
        for (name, value) in table {
            check_segment(&name).map_err(parse_err)?;
            match value {
                toml::Value::Table(inner) => doc.push_table(name, inner).map_err(parse_err)?,
                value => {
                    let value = ConfigValue::from_toml(value)
                        .map_err(|e| parse_err(format!("{}: {}", name, e)))?;
                    if !doc.sections.is_empty() {
                        return Err(parse_err(format!(
                            "root key '{}' appears after a section",
                            name
                        )));
                    }
                    doc.root.push((name, value));
                }
            }
        }
        Ok(doc)
    }
}

impl ConfigDocument {
    /// Flatten a table into a section, then its subtables into `name.sub`
    /// sections in document order.
    fn push_table(&mut self, name: String, table: toml::Table) -> Result<(), String> {
        let mut entries = Vec::new();
        let mut children = Vec::new();
        for (key, value) in table {
            check_segment(&key)?;
            match value {
                toml::Value::Table(inner) => children.push((key, inner)),
                value => {
                    let value = ConfigValue::from_toml(value)
                        .map_err(|e| format!("{}.{}: {}", name, key, e))?;
                    entries.push((key, value));
                }
            }
        }
        self.sections.push(Section {
            name: name.clone(),
            entries,
        });
        for (key, inner) in children {
            self.push_table(format!("{}.{}", name, key), inner)?;
        }
        Ok(())
    }
}

fn check_segment(key: &str) -> Result<(), String> {
    if key.contains('.') {
        return Err(format!("key '{}' contains a '.'", key));
    }
    Ok(())
}

fn toml_key(key: &str) -> String {
    let bare = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if bare {
        key.to_string()
    } else {
        toml::Value::String(key.to_string()).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ConfigDocument {
        let mut doc = ConfigDocument::new(DocumentKind::Consensus);
        doc.insert("moniker", "node").unwrap();
        doc.insert("rpc.laddr", "tcp://127.0.0.1:26657").unwrap();
        doc.insert("p2p.max_num_inbound_peers", 40).unwrap();
        doc.insert("statesync.trust_period", Duration::from_secs(168 * 3600))
            .unwrap();
        doc.insert("rpc.cors_allowed_methods", ConfigValue::strings(["GET", "POST"]))
            .unwrap();
        doc
    }

    #[test]
    fn test_go_duration_format() {
        assert_eq!(format_go_duration(Duration::ZERO), "0s");
        assert_eq!(format_go_duration(Duration::from_secs(5)), "5s");
        assert_eq!(format_go_duration(Duration::from_secs(60)), "1m0s");
        assert_eq!(format_go_duration(Duration::from_secs(168 * 3600)), "168h0m0s");
        assert_eq!(format_go_duration(Duration::from_millis(500)), "500ms");
        assert_eq!(format_go_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_go_duration(Duration::from_secs(3725)), "1h2m5s");
        assert_eq!(format_go_duration(Duration::from_nanos(250)), "250ns");
    }

    #[test]
    fn test_get_and_keys_in_order() {
        let doc = sample();
        assert_eq!(doc.get("moniker"), Some(&ConfigValue::from("node")));
        assert_eq!(
            doc.keys(),
            vec![
                "moniker",
                "rpc.laddr",
                "rpc.cors_allowed_methods",
                "p2p.max_num_inbound_peers",
                "statesync.trust_period",
            ]
        );
    }

    #[test]
    fn test_set_missing_key_is_error() {
        let mut doc = sample();
        let err = doc.set("p2p.seeds", "x").unwrap_err();
        assert_eq!(
            err,
            DocumentError::MissingKey {
                document: DocumentKind::Consensus,
                path: "p2p.seeds".into()
            }
        );
        assert!(doc.set("nosuch.key", "x").is_err());
    }

    #[test]
    fn test_set_type_mismatch() {
        let mut doc = sample();
        let err = doc.set("p2p.max_num_inbound_peers", "many").unwrap_err();
        assert!(matches!(err, DocumentError::TypeMismatch { .. }));
        doc.set("statesync.trust_period", "24h0m0s").unwrap();
    }

    #[test]
    fn test_insert_duplicate_rejected() {
        let mut doc = sample();
        assert!(matches!(
            doc.insert("rpc.laddr", "x"),
            Err(DocumentError::DuplicateKey { .. })
        ));
    }

    #[test]
    fn test_invalid_paths() {
        let doc = sample();
        assert!(doc.get("").is_none());
        assert!(doc.get(".laddr").is_none());
        assert!(doc.get("a.b.c").is_none());
        assert!(doc.get("rpc..laddr").is_none());
    }

    #[test]
    fn test_render() {
        let text = sample().render();
        assert!(text.starts_with("moniker = \"node\"\n\n[rpc]\n"));
        assert!(text.contains("cors_allowed_methods = [\"GET\", \"POST\"]"));
        assert!(text.contains("trust_period = \"168h0m0s\""));
    }

    #[test]
    fn test_parse_render_is_stable() {
        let text = sample().render();
        let parsed = ConfigDocument::parse(DocumentKind::Consensus, &text).unwrap();
        assert_eq!(parsed.keys(), sample().keys());
        assert_eq!(parsed.render(), text);
    }

    #[test]
    fn test_parse_ignores_formatting() {
        let text =
            "# header\nmoniker=\"x\"\n\n  [rpc]\n# comment\n  laddr   =   \"tcp://127.0.0.1:26657\"\n";
        let mut doc = ConfigDocument::parse(DocumentKind::Consensus, text).unwrap();
        doc.set("rpc.laddr", "tcp://0.0.0.0:26657").unwrap();
        assert_eq!(
            doc.get("rpc.laddr").and_then(ConfigValue::as_str),
            Some("tcp://0.0.0.0:26657")
        );
    }

    #[test]
    fn test_nested_tables_are_dotted_sections() {
        let text = concat!(
            "[streaming]\n\n",
            "[streaming.abci]\nkeys = []\nplugin = \"\"\nstop-node-on-err = true\n\n",
            "[mempool]\nmax-txs = 5000\n",
        );
        let mut doc = ConfigDocument::parse(DocumentKind::App, text).unwrap();
        assert_eq!(
            doc.section_names().collect::<Vec<_>>(),
            vec!["streaming", "streaming.abci", "mempool"]
        );
        assert_eq!(
            doc.get("streaming.abci.stop-node-on-err"),
            Some(&ConfigValue::Bool(true))
        );
        doc.set("streaming.abci.plugin", "abci_v1").unwrap();
        let rendered = doc.render();
        assert!(rendered
            .contains("[streaming]\n\n[streaming.abci]\nkeys = []\nplugin = \"abci_v1\""));
        let reparsed = ConfigDocument::parse(DocumentKind::App, &rendered).unwrap();
        assert_eq!(reparsed, doc);
    }

    #[test]
    fn test_parse_rejects_tables_in_arrays() {
        let err = ConfigDocument::parse(DocumentKind::App, "[[a]]\nc = 1\n").unwrap_err();
        assert!(matches!(err, DocumentError::Parse { .. }));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ConfigDocument::parse(DocumentKind::App, "= = =").is_err());
    }
}
