//! Shared test utilities for domain testing
//!
//! This crate provides reusable test infrastructure for the domain crates:
//! - `fixtures`: a deterministic provider catalog with known prices
//! - `assertions`: custom assertion helpers
//!
//! # Usage
//!
//! ```rust
//! use domain_catalog::{InstanceRequirements, LookupContext, lookup};
//! use test_utils::fixtures;
//!
//! let catalog = fixtures::sample_catalog();
//! let ctx = LookupContext::new(fixtures::REGION);
//! let requirements = InstanceRequirements::new(0.5, 2000);
//! let best = lookup::lookup_instance(&catalog, &requirements, &ctx, Some(1));
//! assert_eq!(best[0].price.code, "C2");
//! ```

/// Deterministic catalog data.
///
/// Prices in [`REGION`], Linux and shared unless noted:
///
/// | code | type | term | monthly cost |
/// |---|---|---|---|
/// | C1 | instance1 (0.5 vCPU, 2000 MB) | on-demand1 | 146.4 |
/// | C2 | instance1 | 1y | 102.48 |
/// | C3 | instance2 (2 vCPU, 4000 MB) | on-demand1 | 292.8 |
/// | C4 | instance2 | 1y | 204.96 |
/// | C5 | instance3 (4 vCPU, 8000 MB) | 1y | 409.92 |
/// | C6 | instance4 (8 vCPU, 16000 MB) | 1y | 819.84 |
/// | C7 | instance1 | spot | 30.0 |
/// | C8 | instance1, windows | on-demand1 | 175.68 |
/// | C9 | instance1, windows BYOL | on-demand1 | 120.0 |
/// | C12 | instance2, dedicated | 1y | 250.0 |
///
/// In [`REGION_2`]: C10 (dynamic, 1y, 1 + 60/vCPU + 30/GB) and C11
/// (instance1, on-demand2, 160.0).
///
/// Storage prices, monthly per GB: S1 storage1 0.21 (good, iops, 5 GB
/// minimum), S2 storage2 0.045 (low, throughput, 500 GB minimum), S3
/// storage3 0.5 + 10 fixed (best, iops), S4 storage4 0.023 (medium,
/// durability, not attachable), all in [`REGION`]; S5 storage1 0.25 in
/// [`REGION_2`].
pub mod fixtures {
    use domain_catalog::{
        Catalog, CreateInstancePrice, CreateStoragePrice, InMemoryCatalogRepository,
        InstancePrice, InstanceType, LICENSE_BYOL, Location, Rate, StorageOptimized,
        StoragePrice, StorageType, Tenancy, Term, VmOs,
    };

    pub const PROVIDER: &str = "provider-1";

    pub const REGION: &str = "region-1";

    pub const REGION_2: &str = "region-2";

    struct Terms {
        on_demand1: Term,
        on_demand2: Term,
        yearly: Term,
        spot: Term,
    }

    fn terms() -> Terms {
        let mut spot = Term::new("spot", "spot", 0);
        spot.variable = true;
        spot.ephemeral = true;
        Terms {
            on_demand1: Term::new("on-demand1", "od1", 0),
            on_demand2: Term::new("on-demand2", "od2", 0),
            yearly: Term::new("1y", "1y", 12),
            spot,
        }
    }

    fn instance(
        code: &str,
        instance_type: &InstanceType,
        term: &Term,
        location: &str,
        cost: f64,
    ) -> CreateInstancePrice {
        CreateInstancePrice {
            code: code.to_string(),
            instance_type: instance_type.clone(),
            term: term.clone(),
            location: location.to_string(),
            os: VmOs::Linux,
            tenancy: Tenancy::Shared,
            license: None,
            cost,
            initial_cost: None,
            cost_cpu: None,
            cost_ram: None,
        }
    }

    fn storage(
        code: &str,
        storage_type: &StorageType,
        term: &Term,
        location: &str,
        cost_gb: f64,
    ) -> CreateStoragePrice {
        CreateStoragePrice {
            code: code.to_string(),
            storage_type: storage_type.clone(),
            term: term.clone(),
            location: location.to_string(),
            cost: 0.0,
            cost_gb,
            cost_transaction: 0.0,
            initial_cost: None,
        }
    }

    fn storage_type(
        name: &str,
        latency: Rate,
        optimized: StorageOptimized,
        minimal_gb: f64,
        instance_compatible: bool,
    ) -> StorageType {
        let mut storage_type = StorageType::new(name, latency);
        storage_type.optimized = Some(optimized);
        storage_type.minimal_gb = minimal_gb;
        storage_type.instance_compatible = instance_compatible;
        storage_type
    }

    /// The catalog of [`PROVIDER`]
    pub fn sample_catalog() -> Catalog {
        let mut catalog = Catalog::new(PROVIDER);
        catalog.locations = vec![Location::new(REGION), Location::new(REGION_2)];

        let terms = terms();
        let instance1 = InstanceType::new("instance1", 0.5, 2000);
        let instance2 = InstanceType::new("instance2", 2.0, 4000);
        let instance3 = InstanceType::new("instance3", 4.0, 8000);
        let instance4 = InstanceType::new("instance4", 8.0, 16000);
        let mut dynamic = InstanceType::new("dynamic", 1.0, 1024);
        dynamic.dynamic = true;

        // Linux, shared
        for (code, instance_type, term, cost) in [
            ("C1", &instance1, &terms.on_demand1, 146.4),
            ("C2", &instance1, &terms.yearly, 102.48),
            ("C3", &instance2, &terms.on_demand1, 292.8),
            ("C4", &instance2, &terms.yearly, 204.96),
            ("C5", &instance3, &terms.yearly, 409.92),
            ("C6", &instance4, &terms.yearly, 819.84),
            ("C7", &instance1, &terms.spot, 30.0),
        ] {
            catalog.add_instance_price(instance(code, instance_type, term, REGION, cost));
        }

        let mut windows = instance("C8", &instance1, &terms.on_demand1, REGION, 175.68);
        windows.os = VmOs::Windows;
        catalog.add_instance_price(windows);

        let mut byol = instance("C9", &instance1, &terms.on_demand1, REGION, 120.0);
        byol.os = VmOs::Windows;
        byol.license = Some(LICENSE_BYOL.to_string());
        catalog.add_instance_price(byol);

        let mut dedicated = instance("C12", &instance2, &terms.yearly, REGION, 250.0);
        dedicated.tenancy = Tenancy::Dedicated;
        catalog.add_instance_price(dedicated);

        let mut sized = instance("C10", &dynamic, &terms.yearly, REGION_2, 1.0);
        sized.cost_cpu = Some(60.0);
        sized.cost_ram = Some(30.0);
        catalog.add_instance_price(sized);
        catalog.add_instance_price(instance("C11", &instance1, &terms.on_demand2, REGION_2, 160.0));

        let monthly = Term::new("monthly", "monthly", 1);
        let storage1 = storage_type("storage1", Rate::Good, StorageOptimized::Iops, 5.0, true);
        let storage2 = storage_type(
            "storage2",
            Rate::Low,
            StorageOptimized::Throughput,
            500.0,
            true,
        );
        let storage3 = storage_type("storage3", Rate::Best, StorageOptimized::Iops, 1.0, true);
        let storage4 = storage_type(
            "storage4",
            Rate::Medium,
            StorageOptimized::Durability,
            1.0,
            false,
        );

        catalog.add_storage_price(storage("S1", &storage1, &monthly, REGION, 0.21));
        catalog.add_storage_price(storage("S2", &storage2, &monthly, REGION, 0.045));
        let mut premium = storage("S3", &storage3, &monthly, REGION, 0.5);
        premium.cost = 10.0;
        catalog.add_storage_price(premium);
        catalog.add_storage_price(storage("S4", &storage4, &monthly, REGION, 0.023));
        catalog.add_storage_price(storage("S5", &storage1, &monthly, REGION_2, 0.25));

        catalog
    }

    /// Instance price of the catalog by code
    pub fn instance_price(catalog: &Catalog, code: &str) -> InstancePrice {
        catalog
            .instance_price(code)
            .cloned()
            .unwrap_or_else(|| panic!("no instance price '{code}' in the fixture catalog"))
    }

    /// Storage price of the catalog by code
    pub fn storage_price(catalog: &Catalog, code: &str) -> StoragePrice {
        catalog
            .storage_price(code)
            .cloned()
            .unwrap_or_else(|| panic!("no storage price '{code}' in the fixture catalog"))
    }

    /// Repository serving [`sample_catalog`]
    pub fn catalog_repository() -> InMemoryCatalogRepository {
        InMemoryCatalogRepository::with_catalog(sample_catalog())
    }
}

/// Test assertion helpers
pub mod assertions {
    use uuid::Uuid;

    /// Tolerance of [`assert_close`]
    pub const DELTA: f64 = 1e-6;

    /// Assert that two costs are equal within [`DELTA`]
    pub fn assert_close(actual: f64, expected: f64, context: &str) {
        assert!(
            (actual - expected).abs() < DELTA,
            "{}: expected {}, got {}",
            context,
            expected,
            actual
        );
    }

    /// Assert that two UUIDs are equal with a nice error message
    pub fn assert_uuid_eq(actual: Uuid, expected: Uuid, context: &str) {
        assert_eq!(
            actual, expected,
            "{}: expected UUID {}, got {}",
            context, expected, actual
        );
    }

    /// Assert that an optional value is Some
    pub fn assert_some<T>(value: Option<T>, context: &str) -> T {
        value.unwrap_or_else(|| panic!("{}: expected Some, got None", context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_codes_are_unique() {
        let catalog = fixtures::sample_catalog();
        let mut codes: Vec<&str> = catalog
            .instance_prices
            .iter()
            .map(|p| p.code.as_str())
            .chain(catalog.storage_prices.iter().map(|p| p.code.as_str()))
            .collect();
        let count = codes.len();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), count);
    }

    #[test]
    fn test_fixture_terms_are_shared() {
        let catalog = fixtures::sample_catalog();
        // on-demand1, on-demand2, 1y, spot, monthly
        assert_eq!(catalog.terms.len(), 5);
        assert!(catalog.location(fixtures::REGION_2).is_some());
    }

    #[test]
    #[should_panic(expected = "no instance price")]
    fn test_missing_fixture_price_panics() {
        fixtures::instance_price(&fixtures::sample_catalog(), "C99");
    }

    #[test]
    fn test_assert_close() {
        assertions::assert_close(0.1 + 0.2, 0.3, "float sum");
    }
}
