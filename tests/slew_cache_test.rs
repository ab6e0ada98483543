//! Slew-tensor caching across store instances.

mod support;

use sspplan::conditions::cache::{cache_key, compute_slew_tensor, load_or_compute, FileStore};
use sspplan::config::SlewRates;
use sspplan::TargetCatalog;

use support::{make_target, site, two_night_grid, SyntheticConditions};

fn catalog() -> TargetCatalog {
    let mut catalog = TargetCatalog::new();
    catalog.add_target(make_target("GA", "F1_a", 2, 1)).unwrap();
    catalog.add_target(make_target("GE", "Eld", 2, 1)).unwrap();
    catalog
}

fn names(catalog: &TargetCatalog) -> Vec<String> {
    catalog.all_targets().iter().map(|t| t.name.clone()).collect()
}

#[test]
fn test_tensor_persists_across_store_instances() {
    let dir = std::env::temp_dir().join(format!("sspplan-it-cache-{}", std::process::id()));
    let slots = two_night_grid();
    let catalog = catalog();
    let names = names(&catalog);
    let key = cache_key(&slots, &catalog, &site());
    let rates = SlewRates::default();

    let mut cold_store = FileStore::new(&dir);
    let cold = load_or_compute(
        &mut cold_store,
        &key,
        &slots,
        &names,
        &SyntheticConditions,
        &rates,
    );

    // A separate store instance over the same directory serves the entry.
    let mut warm_store = FileStore::new(&dir);
    let warm = load_or_compute(
        &mut warm_store,
        &key,
        &slots,
        &names,
        &SyntheticConditions,
        &rates,
    );
    assert_eq!(cold, warm);
    assert_eq!(
        warm,
        compute_slew_tensor(&slots, &names, &SyntheticConditions, &rates)
    );

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_key_stable_across_equal_fixtures() {
    let key1 = cache_key(&two_night_grid(), &catalog(), &site());
    let key2 = cache_key(&two_night_grid(), &catalog(), &site());
    assert_eq!(key1, key2);

    // Geometry-relevant input changes move the key.
    let mut other = catalog();
    other.add_target(make_target("CO", "CO_1", 1, 1)).unwrap();
    assert_ne!(key1, cache_key(&two_night_grid(), &other, &site()));
}
