use std::path::Path;

use super::*;

fn brand(name: &str) -> BrandConfig {
    BrandConfig {
        name: name.to_string(),
        display_name: None,
        cooldown_secs: None,
        contact_emails: vec![],
    }
}

#[test]
fn validate_rejects_empty_name() {
    let brands_file = BrandsFile {
        brands: vec![brand("  ")],
    };
    let err = validate_brands(&brands_file).unwrap_err();
    assert!(err.to_string().contains("non-empty"));
}

#[test]
fn validate_rejects_name_that_normalizes_to_nothing() {
    let brands_file = BrandsFile {
        brands: vec![brand("& and -")],
    };
    let err = validate_brands(&brands_file).unwrap_err();
    assert!(err.to_string().contains("empty key"));
}

#[test]
fn validate_rejects_zero_cooldown() {
    let mut b = brand("Nike");
    b.cooldown_secs = Some(0);
    let err = validate_brands(&BrandsFile { brands: vec![b] }).unwrap_err();
    assert!(err.to_string().contains("zero cooldown_secs"));
}

#[test]
fn validate_rejects_names_with_same_normalized_key() {
    let brands_file = BrandsFile {
        brands: vec![brand("Coca-Cola"), brand("coca cola")],
    };
    let err = validate_brands(&brands_file).unwrap_err();
    assert!(
        matches!(err, ConfigError::DuplicateBrandKey { ref key, .. } if key == "cocacola"),
        "expected DuplicateBrandKey, got: {err:?}"
    );
}

#[test]
fn validate_accepts_distinct_brands() {
    let brands_file = BrandsFile {
        brands: vec![brand("Nike"), brand("Coca-Cola"), brand("Procter & Gamble")],
    };
    assert!(validate_brands(&brands_file).is_ok());
}

#[test]
fn catalog_rejects_duplicate_keys() {
    let err = BrandCatalog::from_names(&["Procter & Gamble", "procter and gamble"]).unwrap_err();
    assert!(matches!(err, ConfigError::DuplicateBrandKey { .. }));
}

#[test]
fn catalog_matches_analysis_names_by_key() {
    let catalog = BrandCatalog::from_names(&["Coca-Cola", "Nike"]).unwrap();
    let matched = catalog.match_analysis("COCA_COLA").expect("should match");
    assert_eq!(matched.key.as_str(), "cocacola");
    assert_eq!(matched.display_name, "Coca-Cola");
    assert!(catalog.match_analysis("Pepsi").is_none());
    assert!(catalog.match_analysis("").is_none());
}

#[test]
fn catalog_prefers_configured_display_name() {
    let mut b = brand("Procter & Gamble");
    b.display_name = Some("P&G".to_string());
    let catalog = BrandCatalog::from_configs(&[b]).unwrap();
    let matched = catalog.match_analysis("procter and gamble").unwrap();
    assert_eq!(matched.display_name, "P&G");
}

#[test]
fn cooldown_override_applies_only_to_its_brand() {
    let mut slow = brand("Nike");
    slow.cooldown_secs = Some(3600);
    let catalog = BrandCatalog::from_configs(&[slow, brand("Adidas")]).unwrap();
    let default = Duration::days(7);

    assert_eq!(
        catalog.cooldown_for(&crate::normalize("nike"), default),
        Duration::hours(1)
    );
    assert_eq!(
        catalog.cooldown_for(&crate::normalize("adidas"), default),
        default
    );
    assert_eq!(
        catalog.cooldown_for(&crate::normalize("unknown"), default),
        default
    );
}

#[test]
fn load_brands_from_real_file() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("config")
        .join("brands.yaml");
    assert!(
        path.exists(),
        "brands.yaml missing at {path:?}, required for this test"
    );
    let result = load_brands(&path);
    assert!(result.is_ok(), "failed to load brands.yaml: {result:?}");
    let brands_file = result.unwrap();
    assert!(!brands_file.brands.is_empty());
    assert!(BrandCatalog::from_configs(&brands_file.brands).is_ok());
}
