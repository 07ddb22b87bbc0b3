//! Catalog, domain and business-model document loading.
//!
//! Documents are YAML or JSON maps keyed by path (or domain name). The key is
//! authoritative; a `path`/`name` inside the entry is overwritten by it.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use moniker_core::moniker::validate_path;
use serde::de::DeserializeOwned;

use crate::domain::Domain;
use crate::error::{CatalogError, Result};
use crate::metrics;
use crate::models::BusinessModel;
use crate::node::CatalogNode;

const INLINE_SOURCE: &str = "<inline>";

/// Serialization format of a catalog document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// `.yaml` / `.yml`
    Yaml,
    /// `.json`
    Json,
}

impl DocumentFormat {
    /// Picks the format from a file extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "yaml" | "yml" => Some(Self::Yaml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Parses an in-memory catalog document.
///
/// # Errors
///
/// Returns [`CatalogError::Load`] if the document is malformed, a key is not
/// a valid path, or an access policy is invalid.
pub fn load_catalog_str(text: &str, format: DocumentFormat) -> Result<Vec<CatalogNode>> {
    catalog_entries(text, format, INLINE_SOURCE).map(|nodes| nodes.into_values().collect())
}

/// Loads one catalog file.
///
/// # Errors
///
/// Returns [`CatalogError::Load`] if the file cannot be read or parsed.
pub fn load_catalog_file(path: &Path) -> Result<Vec<CatalogNode>> {
    load_catalog_sources(&[path])
}

/// Loads every `*.yaml`, `*.yml` and `*.json` file in `dir`, in lexical
/// filename order; later files override earlier ones per path.
///
/// # Errors
///
/// Returns [`CatalogError::Load`] if the directory or any file fails.
pub fn load_catalog_dir(dir: &Path) -> Result<Vec<CatalogNode>> {
    load_catalog_sources(&[dir])
}

/// Loads and merges files and directories in the given order.
///
/// # Errors
///
/// Returns [`CatalogError::Load`] on the first source that fails.
pub fn load_catalog_sources<P: AsRef<Path>>(sources: &[P]) -> Result<Vec<CatalogNode>> {
    let mut merged = BTreeMap::new();
    for source in sources {
        for file in expand_source(source.as_ref())? {
            let entries = read_document(&file, catalog_entries)?;
            tracing::debug!(file = %file.display(), nodes = entries.len(), "catalog document loaded");
            merged.extend(entries);
        }
    }
    tracing::info!(nodes = merged.len(), sources = sources.len(), "catalog loaded");
    Ok(merged.into_values().collect())
}

/// Parses an in-memory domain document.
///
/// # Errors
///
/// Returns [`CatalogError::Load`] if the document is malformed.
pub fn load_domains_str(text: &str, format: DocumentFormat) -> Result<Vec<Domain>> {
    domain_entries(text, format, INLINE_SOURCE)
}

/// Loads a domain file.
///
/// # Errors
///
/// Returns [`CatalogError::Load`] if the file cannot be read or parsed.
pub fn load_domains_file(path: &Path) -> Result<Vec<Domain>> {
    read_document(path, domain_entries)
}

/// Parses an in-memory business-model document.
///
/// # Errors
///
/// Returns [`CatalogError::Load`] if the document is malformed.
pub fn load_models_str(text: &str, format: DocumentFormat) -> Result<Vec<BusinessModel>> {
    model_entries(text, format, INLINE_SOURCE)
}

/// Loads a business-model file.
///
/// # Errors
///
/// Returns [`CatalogError::Load`] if the file cannot be read or parsed.
pub fn load_models_file(path: &Path) -> Result<Vec<BusinessModel>> {
    read_document(path, model_entries)
}

fn read_document<T>(
    path: &Path,
    parse: impl FnOnce(&str, DocumentFormat, &str) -> Result<T>,
) -> Result<T> {
    let source = path.display().to_string();
    let result = DocumentFormat::from_path(path)
        .ok_or_else(|| CatalogError::load(&source, "unsupported file extension"))
        .and_then(|format| {
            let text =
                fs::read_to_string(path).map_err(|e| CatalogError::load(&source, e.to_string()))?;
            parse(&text, format, &source)
        });
    metrics::record_load(if result.is_ok() { "ok" } else { "error" });
    result
}

fn expand_source(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }
    let source = path.display().to_string();
    let mut files = Vec::new();
    for entry in fs::read_dir(path).map_err(|e| CatalogError::load(&source, e.to_string()))? {
        let file = entry
            .map_err(|e| CatalogError::load(&source, e.to_string()))?
            .path();
        if file.is_file() && DocumentFormat::from_path(&file).is_some() {
            files.push(file);
        }
    }
    files.sort();
    Ok(files)
}

fn parse_map<T: DeserializeOwned>(
    text: &str,
    format: DocumentFormat,
    source: &str,
) -> Result<BTreeMap<String, Option<T>>> {
    if text.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    let parsed: Option<BTreeMap<String, Option<T>>> = match format {
        DocumentFormat::Yaml => serde_yaml::from_str(text).map_err(|e| e.to_string()),
        DocumentFormat::Json => serde_json::from_str(text).map_err(|e| e.to_string()),
    }
    .map_err(|message| CatalogError::load(source, message))?;
    Ok(parsed.unwrap_or_default())
}

fn catalog_entries(
    text: &str,
    format: DocumentFormat,
    source: &str,
) -> Result<BTreeMap<String, CatalogNode>> {
    let mut nodes = BTreeMap::new();
    for (key, entry) in parse_map::<CatalogNode>(text, format, source)? {
        let path = validate_path(&key)
            .map_err(|e| CatalogError::load(source, format!("invalid path '{key}': {e}")))?;
        let mut node = entry.unwrap_or_else(|| CatalogNode::new(&path));
        node.path.clone_from(&path);
        if let Some(policy) = &node.access_policy {
            policy
                .validate()
                .map_err(|e| CatalogError::load(source, format!("{path}: {e}")))?;
        }
        nodes.insert(path, node);
    }
    Ok(nodes)
}

fn domain_entries(text: &str, format: DocumentFormat, source: &str) -> Result<Vec<Domain>> {
    Ok(parse_map::<Domain>(text, format, source)?
        .into_iter()
        .map(|(name, entry)| {
            let mut domain = entry.unwrap_or_default();
            domain.name = name;
            domain
        })
        .collect())
}

fn model_entries(text: &str, format: DocumentFormat, source: &str) -> Result<Vec<BusinessModel>> {
    Ok(parse_map::<BusinessModel>(text, format, source)?
        .into_iter()
        .map(|(path, entry)| {
            let mut model = entry.unwrap_or_default();
            model.path = path;
            model
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeStatus, SourceType};
    use crate::ownership::OwnershipRole;

    const CATALOG: &str = r##"
risk:
  display_name: Risk
  ownership:
    accountable_owner: risk-owner@firm.com
    support_channel: "#risk"

risk.cvar:
  description: Conditional value at risk
  source_binding:
    type: snowflake
    config:
      query: "SELECT * FROM cvar WHERE desk = '{segments[0]}'"
      warehouse: RISK_WH
    segment_labels: [desk]

legacy:
  status: deprecated
  successor: risk
"##;

    #[test]
    fn yaml_catalog_uses_key_as_path() {
        let nodes = load_catalog_str(CATALOG, DocumentFormat::Yaml).unwrap();
        let paths: Vec<_> = nodes.iter().map(|n| n.path.as_str()).collect();
        assert_eq!(paths, vec!["legacy", "risk", "risk.cvar"]);

        let cvar = &nodes[2];
        let binding = cvar.source_binding.as_ref().unwrap();
        assert_eq!(binding.source_type, SourceType::Snowflake);
        assert!(binding.read_only);
        assert_eq!(cvar.status, NodeStatus::Active);
        assert_eq!(cvar.classification, "internal");

        assert_eq!(
            nodes[1].ownership.get(OwnershipRole::SupportChannel),
            Some("#risk")
        );
        assert_eq!(nodes[0].status, NodeStatus::Deprecated);
    }

    #[test]
    fn json_catalog_and_null_entries() {
        let doc = r#"{"rates": null, "rates.curves": {"display_name": "Curves"}}"#;
        let nodes = load_catalog_str(doc, DocumentFormat::Json).unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0], CatalogNode::new("rates"));
        assert_eq!(nodes[1].display_name, "Curves");
    }

    #[test]
    fn empty_document_is_empty_catalog() {
        assert!(load_catalog_str("  \n", DocumentFormat::Yaml).unwrap().is_empty());
        assert!(load_catalog_str("~", DocumentFormat::Yaml).unwrap().is_empty());
    }

    #[test]
    fn invalid_key_fails_load() {
        let err = load_catalog_str("risk..cvar: {}\n", DocumentFormat::Yaml).unwrap_err();
        assert!(matches!(err, CatalogError::Load { .. }));
    }

    #[test]
    fn invalid_access_policy_fails_load() {
        let doc = "risk:\n  access_policy:\n    blocked_patterns: ['(']\n";
        let err = load_catalog_str(doc, DocumentFormat::Yaml).unwrap_err();
        assert!(matches!(err, CatalogError::Load { .. }));
    }

    #[test]
    fn domains_take_name_from_key() {
        let doc = "risk:\n  owner: risk-owner@firm.com\n  help_channel: '#risk'\n";
        let domains = load_domains_str(doc, DocumentFormat::Yaml).unwrap();
        assert_eq!(domains.len(), 1);
        assert_eq!(domains[0].name, "risk");
        assert_eq!(domains[0].owner.as_deref(), Some("risk-owner@firm.com"));
    }

    #[test]
    fn models_take_path_from_key() {
        let doc = "risk.metrics/dv01:\n  appears_in:\n    - moniker_pattern: 'risk.cvar*'\n";
        let models = load_models_str(doc, DocumentFormat::Yaml).unwrap();
        assert_eq!(models[0].path, "risk.metrics/dv01");
        assert_eq!(models[0].appears_in.len(), 1);
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(
            DocumentFormat::from_path(Path::new("a/b.YML")),
            Some(DocumentFormat::Yaml)
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("a.json")),
            Some(DocumentFormat::Json)
        );
        assert_eq!(DocumentFormat::from_path(Path::new("a.toml")), None);
    }
}
