//! Integration tests for loading catalog documents from disk.

use std::fs;

use moniker_catalog::loader::{
    load_catalog_dir, load_catalog_file, load_catalog_sources, load_domains_file,
};
use moniker_catalog::prelude::*;
use tempfile::TempDir;

fn write(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn directory_loads_in_lexical_order_with_overrides() {
    let dir = TempDir::new().unwrap();
    write(&dir, "20-override.yaml", "risk:\n  display_name: Risk (override)\n");
    write(
        &dir,
        "10-base.yaml",
        "risk:\n  display_name: Risk\nrisk.cvar:\n  description: CVaR\n",
    );
    write(&dir, "30-extra.json", r#"{"rates": {"display_name": "Rates"}}"#);
    write(&dir, "notes.txt", "not a catalog document");

    let nodes = load_catalog_dir(dir.path()).unwrap();
    let paths: Vec<_> = nodes.iter().map(|n| n.path.as_str()).collect();
    assert_eq!(paths, vec!["rates", "risk", "risk.cvar"]);

    let risk = nodes.iter().find(|n| n.path == "risk").unwrap();
    assert_eq!(risk.display_name, "Risk (override)");
}

#[test]
fn sources_merge_in_configured_order() {
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    let a = write(&first, "catalog.yaml", "risk:\n  description: first\n");
    let b = write(&second, "catalog.yaml", "risk:\n  description: second\n");

    let nodes = load_catalog_sources(&[a.clone(), b.clone()]).unwrap();
    assert_eq!(nodes[0].description, "second");

    let nodes = load_catalog_sources(&[b, a]).unwrap();
    assert_eq!(nodes[0].description, "first");
}

#[test]
fn malformed_file_names_the_source() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "broken.yaml", "risk: [unclosed\n");

    let err = load_catalog_file(&path).unwrap_err();
    match err {
        CatalogError::Load { path: source, .. } => assert!(source.ends_with("broken.yaml")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn missing_file_is_a_load_error() {
    let dir = TempDir::new().unwrap();
    let err = load_catalog_file(&dir.path().join("absent.yaml")).unwrap_err();
    assert!(matches!(err, CatalogError::Load { .. }));
}

#[test]
fn loaded_catalog_drives_ownership_inheritance() {
    let dir = TempDir::new().unwrap();
    let catalog_path = write(
        &dir,
        "catalog.yaml",
        "risk:\n  ownership:\n    accountable_owner: owner@firm.com\nrisk.cvar:\n  ownership:\n    data_specialist: quant@firm.com\n",
    );
    let domains_path = write(
        &dir,
        "domains.yaml",
        "risk:\n  owner: domain-owner@firm.com\n  help_channel: '#risk-help'\n",
    );

    let catalog = CatalogRegistry::new();
    catalog
        .register_all(load_catalog_file(&catalog_path).unwrap())
        .unwrap();
    let domains = DomainRegistry::new();
    domains
        .register_all(load_domains_file(&domains_path).unwrap())
        .unwrap();

    let resolved = catalog.resolve_ownership("risk.cvar/desk", &domains).unwrap();
    assert_eq!(
        resolved.value(OwnershipRole::AccountableOwner),
        Some("owner@firm.com")
    );
    assert_eq!(
        resolved.source(OwnershipRole::AccountableOwner),
        Some(&OwnershipSource::Node("risk".to_string()))
    );
    assert_eq!(
        resolved.source(OwnershipRole::DataSpecialist),
        Some(&OwnershipSource::Node("risk.cvar".to_string()))
    );
    assert_eq!(
        resolved.source(OwnershipRole::SupportChannel),
        Some(&OwnershipSource::Domain("risk".to_string()))
    );
    assert!(resolved.get(OwnershipRole::Ui).is_none());
}
