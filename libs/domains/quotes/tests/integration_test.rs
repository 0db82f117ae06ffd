//! Integration tests for Quotes domain
//!
//! These tests drive the quote service over the in-memory repositories and
//! the fixture catalog to check that:
//! - Costs follow attachments and quantity bounds
//! - Quote-level changes reprice exactly the affected resources
//! - Deletions keep the aggregate consistent
//! - Batches honor their failure policy

use core_config::CostingConfig;
use domain_catalog::{InMemoryCatalogRepository, InstanceRequirements, Rate, Usage};
use domain_quotes::*;
use test_utils::{assertions::*, fixtures};
use uuid::Uuid;

type Service = QuoteService<InMemoryQuoteRepository, InMemoryCatalogRepository>;

fn setup() -> (Service, InMemoryQuoteRepository) {
    let quotes = InMemoryQuoteRepository::new();
    let service = QuoteService::new(
        quotes.clone(),
        fixtures::catalog_repository(),
        CostingConfig::default(),
    );
    (service, quotes)
}

async fn create_quote(service: &Service) -> Quote {
    service
        .create_quote(CreateQuote {
            name: "web platform".to_string(),
            description: None,
            provider: fixtures::PROVIDER.to_string(),
            location: fixtures::REGION.to_string(),
            license: None,
            usage: None,
            ram_adjusted_rate: None,
        })
        .await
        .unwrap()
}

fn instance(name: &str, min: u32, max: Option<u32>) -> InstanceEdition {
    let mut edition = InstanceEdition::new(name, 0.5, 2000);
    edition.min_quantity = min;
    edition.max_quantity = max;
    edition
}

fn attached(name: &str, size_gb: u32, host: Uuid) -> StorageEdition {
    let mut edition = StorageEdition::new(name, size_gb);
    edition.instance = Some(host);
    edition
}

async fn stored(quotes: &InMemoryQuoteRepository, id: Uuid) -> Quote {
    let quote = quotes.get_by_id(id).await.unwrap();
    assert_some(quote, "quote should be stored")
}

// ============================================================================
// Attachments and quantities
// ============================================================================

#[tokio::test]
async fn test_attached_storage_follows_host_quantity() {
    let (service, quotes) = setup();
    let quote = create_quote(&service).await;

    let host = service
        .create_instance(quote.id, instance("web", 2, Some(10)))
        .await
        .unwrap();
    let storage = service
        .create_storage(quote.id, attached("root", 20, host.id))
        .await
        .unwrap();

    assert_eq!(storage.cost, FloatingCost::new(8.4, 42.0, false));
    assert_close(storage.contribution.min, 204.96 + 8.4, "host contribution min");
    assert_close(storage.contribution.max, 1024.8 + 42.0, "host contribution max");
    assert_close(storage.total.min, 213.36, "total min");
    assert_close(storage.total.max, 1066.8, "total max");

    let quote = stored(&quotes, quote.id).await;
    assert_eq!(quote.storages[0].price.code, "S1");
    assert_eq!((quote.cost, quote.max_cost), (storage.total.min, storage.total.max));
}

#[tokio::test]
async fn test_host_quantity_change_reprices_attached_storage() {
    let (service, quotes) = setup();
    let quote = create_quote(&service).await;

    let host = service
        .create_instance(quote.id, instance("web", 1, Some(1)))
        .await
        .unwrap();
    let storage = service
        .create_storage(quote.id, attached("root", 20, host.id))
        .await
        .unwrap();

    let updated = service
        .update_instance(quote.id, host.id, instance("web", 2, Some(10)))
        .await
        .unwrap();
    assert_eq!(
        updated.related.get(&storage.id),
        Some(&FloatingCost::new(8.4, 42.0, false))
    );

    let quote = stored(&quotes, quote.id).await;
    assert_eq!(quote.storages[0].cost, 8.4);
    assert_eq!(quote.storages[0].max_cost, 42.0);
}

#[tokio::test]
async fn test_unbounded_storage_makes_total_unbound() {
    let (service, _) = setup();
    let quote = create_quote(&service).await;

    service
        .create_instance(quote.id, instance("web", 1, Some(1)))
        .await
        .unwrap();

    let mut logs = StorageEdition::new("logs", 1);
    logs.storage_type = Some("storage1".to_string());
    logs.max_quantity = None;
    let updated = service.create_storage(quote.id, logs).await.unwrap();

    // 5 GB minimum billed at 0.21
    assert_eq!(updated.cost, FloatingCost::new(1.05, 1.05, true));
    assert!(updated.total.unbound);
    assert_close(updated.total.min, 103.53, "total min");
    assert_eq!(updated.total.min, updated.total.max);
}

#[tokio::test]
async fn test_incompatible_storage_cannot_be_attached() {
    let (service, quotes) = setup();
    let quote = create_quote(&service).await;
    let host = service
        .create_instance(quote.id, instance("web", 1, Some(1)))
        .await
        .unwrap();

    let mut edition = attached("archive", 20, host.id);
    edition.storage_type = Some("storage4".to_string());
    let err = service.create_storage(quote.id, edition).await.unwrap_err();

    assert_eq!(err.code(), "type-incompatible-requirements");
    assert!(matches!(
        err,
        QuoteError::IncompatibleRequirements { ref field, .. } if field == "instance"
    ));
    assert!(stored(&quotes, quote.id).await.storages.is_empty());
}

#[tokio::test]
async fn test_storage_cannot_host_storage() {
    let (service, _) = setup();
    let quote = create_quote(&service).await;
    let data = service
        .create_storage(quote.id, StorageEdition::new("data", 20))
        .await
        .unwrap();

    let err = service
        .create_storage(quote.id, attached("nested", 20, data.id))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid-attachment");
}

// ============================================================================
// Storage edits
// ============================================================================

#[tokio::test]
async fn test_storage_edit_revalidates_size_and_latency() {
    let (service, quotes) = setup();
    let quote = create_quote(&service).await;
    let host = service
        .create_instance(quote.id, instance("web", 1, Some(1)))
        .await
        .unwrap();
    let root = service
        .create_storage(quote.id, attached("root", 20, host.id))
        .await
        .unwrap();

    let resized = service
        .update_storage(quote.id, root.id, attached("root", 100, host.id))
        .await
        .unwrap();
    assert_eq!(resized.cost, FloatingCost::fixed(21.0));
    assert_close(resized.total.min, 123.48, "total after resize");

    let mut fast = attached("root", 100, host.id);
    fast.latency = Some(Rate::Best);
    let upgraded = service
        .update_storage(quote.id, root.id, fast)
        .await
        .unwrap();
    // storage3: 100 x 0.5 + 10
    assert_eq!(upgraded.cost, FloatingCost::fixed(60.0));
    assert_close(upgraded.total.min, 162.48, "total after upgrade");

    let quote = stored(&quotes, quote.id).await;
    assert_eq!(quote.storages[0].price.code, "S3");
    assert_eq!(quote.cost, upgraded.total.min);
}

#[tokio::test]
async fn test_storage_moves_between_hosts() {
    let (service, quotes) = setup();
    let quote = create_quote(&service).await;
    let web = service
        .create_instance(quote.id, instance("web", 1, Some(1)))
        .await
        .unwrap();
    let db = service
        .create_instance(quote.id, instance("db", 2, Some(2)))
        .await
        .unwrap();
    let root = service
        .create_storage(quote.id, attached("root", 20, web.id))
        .await
        .unwrap();
    assert_close(root.total.min, 102.48 + 204.96 + 4.2, "total before move");

    let moved = service
        .update_storage(quote.id, root.id, attached("root", 20, db.id))
        .await
        .unwrap();
    assert_eq!(moved.cost, FloatingCost::fixed(8.4));
    assert_close(moved.contribution.min, 204.96 + 8.4, "db contribution");
    assert_close(moved.total.min, 102.48 + 204.96 + 8.4, "total after move");

    let web_cost = service.recompute(quote.id, web.id).await.unwrap();
    assert_eq!(web_cost.contribution, FloatingCost::fixed(102.48));
    assert!(web_cost.related.is_empty());

    let quote = stored(&quotes, quote.id).await;
    let host = assert_some(quote.storages[0].instance(), "storage should stay attached");
    assert_uuid_eq(host, db.id, "storage host");
}

#[tokio::test]
async fn test_storage_edit_rejects_invalid_attachment() {
    let (service, quotes) = setup();
    let quote = create_quote(&service).await;
    let data = service
        .create_storage(quote.id, StorageEdition::new("data", 20))
        .await
        .unwrap();
    let other = service
        .create_storage(quote.id, StorageEdition::new("other", 40))
        .await
        .unwrap();

    let err = service
        .update_storage(quote.id, data.id, attached("data", 20, other.id))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid-attachment");

    let err = service
        .update_storage(quote.id, data.id, attached("data", 20, data.id))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "attachment-cycle");

    // Unattached storages go to storage4 at 0.023 per GB
    let quote = stored(&quotes, quote.id).await;
    assert_eq!(quote.storages[0].instance(), None);
    assert_eq!(quote.storages[0].cost, 0.46);
    assert_close(quote.cost, 0.46 + 0.92, "total unchanged");
}

#[tokio::test]
async fn test_storage_edit_rejects_unfit_explicit_type() {
    let (service, quotes) = setup();
    let quote = create_quote(&service).await;
    let data = service
        .create_storage(quote.id, StorageEdition::new("data", 20))
        .await
        .unwrap();

    let mut edition = StorageEdition::new("data", 20);
    edition.latency = Some(Rate::Best);
    edition.storage_type = Some("storage1".to_string());
    let err = service
        .update_storage(quote.id, data.id, edition)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        QuoteError::IncompatibleRequirements { ref field, ref type_name, .. }
            if field == "latency" && type_name == "storage1"
    ));

    let quote = stored(&quotes, quote.id).await;
    assert_eq!(quote.storages[0].price.code, "S4");
    assert_eq!(quote.storages[0].requirements.latency, None);
}

// ============================================================================
// Quote-level changes
// ============================================================================

#[tokio::test]
async fn test_ram_rate_increase_selects_larger_type() {
    let (service, quotes) = setup();
    let quote = create_quote(&service).await;
    let before = service
        .create_instance(quote.id, instance("web", 1, Some(1)))
        .await
        .unwrap()
        .total;

    let updated = service
        .update_quote(
            quote.id,
            QuoteEdition {
                name: quote.name.clone(),
                description: None,
                location: quote.location.clone(),
                license: None,
                usage: None,
                ram_adjusted_rate: 150,
                refresh: false,
            },
        )
        .await
        .unwrap();

    assert!(updated.total().min > before.min);
    assert_eq!(updated.instances[0].price.instance_type.name, "instance2");
    assert_eq!(stored(&quotes, quote.id).await.cost, 204.96);
}

#[tokio::test]
async fn test_usage_makes_pay_per_use_cheaper() {
    let (service, _) = setup();
    let quote = create_quote(&service).await;
    service
        .create_instance(quote.id, instance("web", 1, Some(1)))
        .await
        .unwrap();

    let updated = service
        .update_quote(
            quote.id,
            QuoteEdition {
                name: quote.name.clone(),
                description: None,
                location: quote.location.clone(),
                license: None,
                usage: Some(Usage::new("office hours", 50, 12)),
                ram_adjusted_rate: 100,
                refresh: true,
            },
        )
        .await
        .unwrap();

    // 146.4 on demand at 50% beats 102.48 committed
    assert_eq!(updated.instances[0].price.code, "C1");
    assert_eq!(updated.cost, 73.2);
}

#[tokio::test]
async fn test_location_change_reprices_following_resources() {
    let (service, _) = setup();
    let quote = create_quote(&service).await;
    let host = service
        .create_instance(quote.id, instance("web", 1, Some(1)))
        .await
        .unwrap();
    service
        .create_storage(quote.id, attached("root", 20, host.id))
        .await
        .unwrap();

    let updated = service
        .update_quote(
            quote.id,
            QuoteEdition {
                name: quote.name.clone(),
                description: None,
                location: fixtures::REGION_2.to_string(),
                license: None,
                usage: None,
                ram_adjusted_rate: 100,
                refresh: false,
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.instances[0].price.code, "C10");
    assert_eq!(updated.storages[0].price.code, "S5");
    // 1 + 60 x 1 vCPU + 30 x 2000/1024 GB, plus 20 GB at 0.25
    assert_close(updated.cost, 119.594 + 5.0, "total in region-2");
}

#[tokio::test]
async fn test_update_quote_rejects_unknown_location() {
    let (service, _) = setup();
    let quote = create_quote(&service).await;

    let result = service
        .update_quote(
            quote.id,
            QuoteEdition {
                name: quote.name.clone(),
                description: None,
                location: "nowhere".to_string(),
                license: None,
                usage: None,
                ram_adjusted_rate: 100,
                refresh: false,
            },
        )
        .await;
    assert!(matches!(result, Err(QuoteError::NotFound(_))));
}

// ============================================================================
// Recompute and deletion
// ============================================================================

#[tokio::test]
async fn test_recompute_is_idempotent() {
    let (service, _) = setup();
    let quote = create_quote(&service).await;
    let host = service
        .create_instance(quote.id, instance("web", 2, None))
        .await
        .unwrap();
    service
        .create_storage(quote.id, attached("root", 20, host.id))
        .await
        .unwrap();

    let first = service.recompute(quote.id, host.id).await.unwrap();
    let second = service.recompute(quote.id, host.id).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(service.recompute_total(quote.id).await.unwrap(), first.total);
}

#[tokio::test]
async fn test_delete_reduces_total_by_contribution() {
    let (service, quotes) = setup();
    let quote = create_quote(&service).await;

    service
        .create_instance(quote.id, instance("web", 1, Some(1)))
        .await
        .unwrap();
    let db = service
        .create_instance(quote.id, instance("db", 1, None))
        .await
        .unwrap();
    let data = service
        .create_storage(quote.id, attached("data", 20, db.id))
        .await
        .unwrap();
    assert!(data.total.unbound);

    let total = service.delete_instance(quote.id, db.id).await.unwrap();
    assert_close(total.min, data.total.min - data.contribution.min, "min after delete");
    assert!(!total.unbound);

    let quote = stored(&quotes, quote.id).await;
    assert_eq!(quote.instances.len(), 1);
    assert!(quote.storages.is_empty());
    assert!(!quote.unbound_cost);
}

#[tokio::test]
async fn test_delete_all_storages() {
    let (service, quotes) = setup();
    let quote = create_quote(&service).await;
    let host = service
        .create_instance(quote.id, instance("web", 1, Some(1)))
        .await
        .unwrap();
    service
        .create_storage(quote.id, attached("root", 20, host.id))
        .await
        .unwrap();
    service
        .create_storage(quote.id, StorageEdition::new("backup", 100))
        .await
        .unwrap();

    let total = service.delete_all_storages(quote.id).await.unwrap();
    assert_eq!(total, FloatingCost::fixed(102.48));
    assert!(stored(&quotes, quote.id).await.storages.is_empty());
}

// ============================================================================
// Lookup
// ============================================================================

#[tokio::test]
async fn test_lookup_ranks_cheapest_first() {
    let (service, _) = setup();
    let quote = create_quote(&service).await;

    let candidates = service
        .lookup_instances(quote.id, &InstanceRequirements::new(0.5, 2000))
        .await
        .unwrap();
    let codes: Vec<&str> = candidates.iter().map(|c| c.price.code.as_str()).collect();
    assert_eq!(codes, ["C2", "C1", "C4", "C3", "C5", "C6"]);
    assert!(candidates.windows(2).all(|w| w[0].cost <= w[1].cost));

    let best = service
        .resolve_instance_price(quote.id, "web", &InstanceRequirements::new(0.5, 2000))
        .await
        .unwrap();
    assert_eq!(best, candidates[0]);
}

// ============================================================================
// Batches
// ============================================================================

fn batch() -> Vec<ImportEntry> {
    vec![
        ImportEntry::Instance(InstanceImport {
            instance: instance("web", 1, Some(1)),
            storages: vec![StorageEdition::new("root", 20)],
        }),
        ImportEntry::Instance(InstanceImport {
            instance: InstanceEdition::new("huge", 64.0, 512_000),
            storages: Vec::new(),
        }),
        ImportEntry::Storage(StorageEdition::new("backup", 100)),
    ]
}

#[tokio::test]
async fn test_import_skip_and_report() {
    let (service, quotes) = setup();
    let quote = create_quote(&service).await;

    let report = service
        .import(quote.id, batch(), BatchPolicy::SkipAndReport)
        .await
        .unwrap();

    assert_eq!(report.created.len(), 3);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].index, 1);
    assert_eq!(report.failures[0].name, "huge");
    assert_eq!(report.failures[0].code, "no-match-instance");

    let quote = stored(&quotes, quote.id).await;
    assert_eq!(quote.instances.len(), 1);
    assert_eq!(quote.storages.len(), 2);
    assert_eq!(quote.total(), report.total);
    assert!(quote.live_instances().all(|i| i.state == ResourceState::Priced));
}

#[tokio::test]
async fn test_import_abort_leaves_quote_untouched() {
    let (service, quotes) = setup();
    let quote = create_quote(&service).await;

    let err = service
        .import(quote.id, batch(), BatchPolicy::Abort)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "no-match-instance");

    let stored = stored(&quotes, quote.id).await;
    assert!(stored.instances.is_empty());
    assert!(stored.storages.is_empty());
    assert!(stored.total().is_zero());
}

#[tokio::test]
async fn test_costing_operations_are_observable() {
    core_config::tracing::init_tracing(&core_config::Environment::Development);
    observability::init_metrics().unwrap();

    let (service, _) = setup();
    let quote = create_quote(&service).await;
    service
        .create_instance(quote.id, instance("web", 1, None))
        .await
        .unwrap();

    let rendered = observability::render_metrics();
    assert!(rendered.contains("costing_recomputes_total"));
    assert!(rendered.contains("costing_aggregate_passes_total"));
}
