use std::sync::Arc;

use schir::{Cell, DeviceKind, ParamDecl, Schematic};

use super::*;

fn resistor() -> Cell {
    let mut cell = Cell::primitive("res", DeviceKind::Resistor);
    cell.add_param("r", ParamDecl::with_default("1k"));
    cell
}

fn store_with(docs: impl IntoIterator<Item = (&'static str, &'static str, Cell)>) -> Arc<MemStore> {
    let store = MemStore::new();
    for (ns, version, cell) in docs {
        store.insert(ns, version, cell);
    }
    Arc::new(store)
}

#[test_log::test]
fn resolution_is_idempotent() {
    let resolver = Resolver::new(store_with([("analog", "v1", resistor())]));

    let first = resolver.resolve("analog", "res", None).unwrap();
    let second = resolver.resolve("analog", "res", None).unwrap();
    let pinned = resolver
        .resolve("analog", "res", Some(&Version::new("v1")))
        .unwrap();

    assert!(Arc::ptr_eq(&first.cell, &second.cell));
    assert!(Arc::ptr_eq(&first.cell, &pinned.cell));
    assert_eq!(first.key.version, Version::new("v1"));
    let stats = resolver.stats();
    assert_eq!(stats.fetches, 1);
    assert_eq!(stats.hits, 2);
}

#[test_log::test]
fn missing_cell_is_not_found() {
    let resolver = Resolver::new(store_with([("analog", "v1", resistor())]));
    assert!(matches!(
        resolver.resolve("analog", "cap", None),
        Err(Error::NotFound { version: None, .. })
    ));
    assert!(matches!(
        resolver.resolve("analog", "res", Some(&Version::new("v9"))),
        Err(Error::NotFound {
            version: Some(_),
            ..
        })
    ));
}

#[test_log::test]
fn several_uncached_versions_are_ambiguous() {
    let resolver = Resolver::new(store_with([
        ("analog", "v2", resistor()),
        ("analog", "v1", resistor()),
    ]));
    match resolver.resolve("analog", "res", None) {
        Err(Error::AmbiguousVersion { candidates, .. }) => {
            assert_eq!(candidates, [Version::new("v1"), Version::new("v2")]);
        }
        other => panic!("expected an ambiguous version error, got {other:?}"),
    }
    assert_eq!(resolver.stats().fetches, 0);
}

#[test_log::test]
fn cached_versions_disambiguate_by_interface() {
    let mut widened = resistor();
    widened.add_param("tc1", ParamDecl::with_default("0"));
    let resolver = Resolver::new(store_with([
        ("analog", "v1", resistor()),
        ("analog", "v2", resistor()),
        ("analog", "v3", widened),
    ]));

    resolver
        .resolve("analog", "res", Some(&Version::new("v1")))
        .unwrap();
    resolver
        .resolve("analog", "res", Some(&Version::new("v2")))
        .unwrap();
    let chosen = resolver.resolve("analog", "res", None).unwrap();
    assert_eq!(chosen.key.version, Version::new("v2"));

    resolver
        .resolve("analog", "res", Some(&Version::new("v3")))
        .unwrap();
    assert!(matches!(
        resolver.resolve("analog", "res", None),
        Err(Error::AmbiguousVersion { .. })
    ));
}

#[test_log::test]
fn invalid_namespace_is_rejected() {
    let resolver = Resolver::new(Arc::new(MemStore::new()));
    for ns in ["", "1abc", "a..b", "a-b", "lib."] {
        assert!(
            matches!(
                resolver.resolve(ns, "res", None),
                Err(Error::InvalidNamespace(_))
            ),
            "namespace `{ns}` should be rejected"
        );
    }
    assert!(is_valid_namespace("pdk.analog_v2"));
}

#[test_log::test]
fn invalidate_drops_one_symbol() {
    let store = store_with([("analog", "v1", resistor())]);
    store.insert(
        "analog",
        "v1",
        Cell::subcircuit("divider", Schematic::new()),
    );
    let resolver = Resolver::new(store.clone());

    let res = resolver.resolve("analog", "res", None).unwrap();
    let div = resolver.resolve("analog", "divider", None).unwrap();
    resolver.invalidate("analog", "res");

    let res_again = resolver.resolve("analog", "res", None).unwrap();
    let div_again = resolver.resolve("analog", "divider", None).unwrap();
    assert!(!Arc::ptr_eq(&res.cell, &res_again.cell));
    assert!(Arc::ptr_eq(&div.cell, &div_again.cell));
    assert_eq!(resolver.stats().fetches, 3);
}

#[test_log::test]
fn library_version_change_invalidates_cache() {
    let store = store_with([("analog", "v1", resistor())]);
    let resolver = Resolver::new(store.clone());

    assert!(!resolver.sync_library_version(&LibraryVersion::new("rev1")));
    let before = resolver.resolve("analog", "res", None).unwrap();
    assert!(!resolver.sync_library_version(&LibraryVersion::new("rev1")));
    assert!(Arc::ptr_eq(
        &before.cell,
        &resolver.resolve("analog", "res", None).unwrap().cell
    ));

    let mut updated = resistor();
    updated.add_param("tc1", ParamDecl::with_default("0"));
    store.remove("analog", "res", &Version::new("v1"));
    store.insert("analog", "v2", updated);

    assert!(resolver.sync_library_version(&LibraryVersion::new("rev2")));
    let after = resolver.resolve("analog", "res", None).unwrap();
    assert_eq!(after.key.version, Version::new("v2"));
    assert_eq!(resolver.stats().invalidations, 1);
    assert_eq!(resolver.library_version(), Some(LibraryVersion::new("rev2")));
}
