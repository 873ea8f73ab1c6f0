//! EntityStore CRUD over the shop model: create, read, update, delete,
//! search with keyset paging, templates and static enrichment.

mod common;

use std::str::FromStr;

use rust_decimal::Decimal;
use strata_core::config::StrataConfig;
use strata_core::errors::{PersistenceError, StatementError};
use strata_core::payload::{Id, Payload, Value};
use strata_core::query::{AttributeMask, Filter, OrderBy, QueryCustomizer, Seek};
use strata_core::traits::EntityStore;
use strata_storage::StorageEngine;

use common::*;

fn numbers(items: &[Payload]) -> Vec<&str> {
    items.iter().map(|p| text(p, "number")).collect()
}

// ═══════════════════════════════════════════════════════════════════════════
// CREATE
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn create_returns_the_stored_tree() {
    let engine = shop();
    let payload = order("A-1", vec![line("pen", 2), line("ink", 1)]).with("total", "25.50");

    let created = engine.create("Order", payload).unwrap();

    assert_eq!(text(&created, "number"), "A-1");
    assert_eq!(created.type_name(), Some("Order"));
    assert_eq!(created.version(), Some(1));
    assert!(created.is_created());
    // Default, static and derived features are all filled in on the way back.
    assert_eq!(created.get("status"), Some(&Value::enumeration("OPEN", 0)));
    assert_eq!(created.get("channel"), Some(&Value::Text("web".into())));
    assert_eq!(created.get("line_count"), Some(&Value::Integer(2)));
    assert_eq!(
        created.get("total"),
        Some(&Value::Decimal(Decimal::from_str("25.50").unwrap()))
    );

    let lines = created.nested("lines");
    assert_eq!(lines.len(), 2);
    assert_eq!(text(lines[0], "product"), "pen");
    assert_eq!(lines[0].get("quantity"), Some(&Value::Integer(2)));
    assert_eq!(text(lines[1], "product"), "ink");
    assert!(lines.iter().all(|l| l.is_created()));

    assert_eq!(created.get("shipping"), Some(&Value::Null));
    assert_eq!(created.get("customer"), Some(&Value::Null));
    assert_eq!(created.get("tags"), Some(&Value::List(vec![])));
}

#[test]
fn missing_mandatory_attribute_writes_nothing() {
    let engine = shop();
    let incomplete = Payload::new().with("product", "pen");
    let payload = order("A-2", vec![line("ink", 1), incomplete]);

    let err = engine.create("Order", payload).unwrap_err();

    match err {
        PersistenceError::Statement(StatementError::Insertion { entity, feature, .. }) => {
            assert_eq!(entity, "LineItem");
            assert_eq!(feature, "quantity");
        }
        other => panic!("expected an insertion error, got {other:?}"),
    }
    assert_eq!(engine.count("Order", None).unwrap(), 0);
    assert_eq!(scalar(&engine, "SELECT COUNT(*) FROM line_item"), 0);
}

#[test]
fn create_links_existing_instances_and_contained_to_one() {
    let engine = shop();
    let ada = engine.create("Customer", customer("Ada")).unwrap();
    let payload = order("A-3", vec![])
        .with("customer", stub(&id_of(&ada)))
        .with("shipping", Payload::new().with("street", "Main St").with("city", "Oslo"));

    let created = engine.create("Order", payload).unwrap();

    let linked = created.get("customer").and_then(Value::as_payload).unwrap();
    assert_eq!(linked.id(), ada.id());
    assert_eq!(linked.type_name(), Some("Customer"));
    let shipping = created.get("shipping").and_then(Value::as_payload).unwrap();
    assert_eq!(text(shipping, "street"), "Main St");
    assert!(shipping.is_created());
    assert_eq!(scalar(&engine, "SELECT COUNT(*) FROM orders WHERE shipping_address_id IS NOT NULL"), 1);
}

#[test]
fn reference_to_missing_instance_is_rejected() {
    let engine = shop();
    let payload = order("A-4", vec![]).with("customer", stub(&Id::Int(404)));

    let err = engine.create("Order", payload).unwrap_err();

    assert!(matches!(
        err,
        PersistenceError::Statement(StatementError::ConstraintNotFound { ref entity, .. }) if entity == "Customer"
    ));
    assert_eq!(engine.count("Order", None).unwrap(), 0);
}

#[test]
fn unknown_features_are_rejected() {
    let engine = shop();
    let err = engine.create("Customer", customer("Ada").with("nickname", "A")).unwrap_err();
    assert!(matches!(err, PersistenceError::Statement(StatementError::InvalidPayload { .. })));
}

#[test]
fn text_identifiers_are_generated() {
    let engine = shop();
    let tag = engine.create("Tag", Payload::new().with("label", "gift")).unwrap();
    match tag.id() {
        Some(Id::Text(id)) => assert_eq!(id.len(), 36, "uuid expected, got {id}"),
        other => panic!("expected a text id, got {other:?}"),
    }
}

#[test]
fn client_reference_ids_are_echoed_on_created_nodes() {
    let engine = shop();
    let payload = order("A-5", vec![line("pen", 1).with("__clientReferenceId", "tmp-1")])
        .with("__clientReferenceId", "tmp-root");

    let created = engine.create("Order", payload).unwrap();

    assert_eq!(created.client_reference_id(), Some("tmp-root"));
    let lines = created.nested("lines");
    assert_eq!(lines[0].client_reference_id(), Some("tmp-1"));
    assert!(lines[0].is_created());
}

// ═══════════════════════════════════════════════════════════════════════════
// READ
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn missing_identifier_reads_as_none() {
    let engine = shop();
    assert_eq!(engine.get_by_identifier("Order", &Id::Int(1), None).unwrap(), None);
}

#[test]
fn unknown_entity_type_is_a_schema_error() {
    let engine = shop();
    let err = engine.count("Invoice", None).unwrap_err();
    assert!(matches!(err, PersistenceError::Schema(_)));
}

#[test]
fn attribute_mask_limits_root_attributes() {
    let engine = shop();
    let created = engine
        .create("Order", order("M-1", vec![line("pen", 1)]).with("total", 10))
        .unwrap();
    let customizer = QueryCustomizer::default().with_mask(AttributeMask::only(&["number"]));

    let read = engine
        .get_by_identifier("Order", &id_of(&created), Some(&customizer))
        .unwrap()
        .unwrap();

    assert_eq!(text(&read, "number"), "M-1");
    assert!(!read.contains_key("total"));
    assert!(!read.contains_key("status"));
    // Contained instances still load in full.
    let lines = read.nested("lines");
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].get("quantity"), Some(&Value::Integer(1)));
}

#[test]
fn template_carries_defaults_and_static_values() {
    let engine = shop();
    let template = engine.template("Order").unwrap();

    assert_eq!(template.type_name(), Some("Order"));
    assert_eq!(template.get("status"), Some(&Value::enumeration("OPEN", 0)));
    assert_eq!(template.get("channel"), Some(&Value::Text("web".into())));
    assert!(!template.contains_key("number"));
    assert_eq!(template.id(), None);
}

// ═══════════════════════════════════════════════════════════════════════════
// SEARCH
// ═══════════════════════════════════════════════════════════════════════════

fn seed_orders(engine: &StorageEngine) {
    for (number, status) in [
        ("N-3", "OPEN"),
        ("N-1", "SHIPPED"),
        ("N-5", "OPEN"),
        ("N-2", "SHIPPED"),
        ("N-4", "OPEN"),
    ] {
        engine
            .create("Order", order(number, vec![]).with("status", status))
            .unwrap();
    }
}

#[test]
fn search_filters_by_enumeration_literal() {
    let engine = shop();
    seed_orders(&engine);
    let shipped = Filter::eq("status", "SHIPPED");

    let page = engine
        .search("Order", &QueryCustomizer::filtered(shipped.clone()))
        .unwrap();

    assert_eq!(numbers(&page.items), vec!["N-1", "N-2"]);
    assert!(!page.has_more);
    assert_eq!(engine.count("Order", Some(&shipped)).unwrap(), 2);
    assert_eq!(engine.count("Order", None).unwrap(), 5);
}

#[test]
fn keyset_paging_walks_every_row_once() {
    let engine = shop();
    seed_orders(&engine);
    let by_number = OrderBy {
        attribute: "number".to_string(),
        descending: false,
    };

    let first = engine
        .search(
            "Order",
            &QueryCustomizer::default().with_order(by_number.clone()).with_seek(Seek::first(2)),
        )
        .unwrap();
    assert_eq!(numbers(&first.items), vec!["N-1", "N-2"]);
    assert!(first.has_more);

    let cursor = first.next_cursor.clone().unwrap();
    let second = engine
        .search(
            "Order",
            &QueryCustomizer::default()
                .with_order(by_number.clone())
                .with_seek(Seek::after(2, cursor)),
        )
        .unwrap();
    assert_eq!(numbers(&second.items), vec!["N-3", "N-4"]);

    let cursor = second.next_cursor.clone().unwrap();
    let last = engine
        .search(
            "Order",
            &QueryCustomizer::default().with_order(by_number).with_seek(Seek::after(2, cursor)),
        )
        .unwrap();
    assert_eq!(numbers(&last.items), vec!["N-5"]);
    assert!(!last.has_more);
    assert_eq!(last.next_cursor, None);
}

#[test]
fn descending_order_with_filter() {
    let engine = shop();
    seed_orders(&engine);
    let customizer = QueryCustomizer::filtered(Filter::eq("status", "OPEN")).with_order(OrderBy {
        attribute: "number".to_string(),
        descending: true,
    });

    let page = engine.search("Order", &customizer).unwrap();

    assert_eq!(numbers(&page.items), vec!["N-5", "N-4", "N-3"]);
}

#[test]
fn malformed_cursor_is_rejected() {
    let engine = shop();
    seed_orders(&engine);
    let customizer = QueryCustomizer::default().with_seek(Seek::after(2, "not a cursor"));
    let err = engine.search("Order", &customizer).unwrap_err();
    assert!(matches!(err, PersistenceError::Statement(StatementError::InvalidPayload { .. })));
}

#[test]
fn range_of_reference_lists_candidate_targets() {
    let engine = shop();
    engine.create("Customer", customer("Ada")).unwrap();
    engine.create("Customer", customer("Grace")).unwrap();

    let all = engine
        .get_range_of("Order", "customer", &QueryCustomizer::default())
        .unwrap();
    assert_eq!(all.items.len(), 2);
    assert!(all.items.iter().all(|c| c.type_name() == Some("Customer")));

    let named = Filter::eq("name", "Grace");
    assert_eq!(engine.count_range_of("Order", "customer", Some(&named)).unwrap(), 1);
    assert_eq!(engine.count_range_of("Order", "customer", None).unwrap(), 2);
}

// ═══════════════════════════════════════════════════════════════════════════
// UPDATE
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn update_changes_only_submitted_attributes() {
    let engine = shop();
    let created = engine
        .create("Order", order("U-1", vec![]).with("total", 12))
        .unwrap();
    let patch = Payload::stub(&id_of(&created))
        .with("__version", 1)
        .with("status", "SHIPPED");

    let updated = engine.update("Order", patch).unwrap();

    assert_eq!(updated.get("status"), Some(&Value::enumeration("SHIPPED", 1)));
    assert_eq!(text(&updated, "number"), "U-1");
    assert_eq!(updated.get("total"), Some(&Value::Decimal(Decimal::from(12))));
    assert_eq!(updated.version(), Some(2));
    assert!(!updated.is_created());
}

#[test]
fn update_reconciles_contained_children() {
    let engine = shop();
    let created = engine
        .create("Order", order("U-2", vec![line("pen", 1), line("ink", 1)]))
        .unwrap();
    let lines = created.nested("lines");
    let pen = id_of(lines[0]);

    let patch = Payload::stub(&id_of(&created)).with(
        "lines",
        vec![
            Payload::stub(&pen)
                .with("quantity", 5)
                .with("__clientReferenceId", "keep"),
            line("cap", 3).with("__clientReferenceId", "new"),
        ],
    );
    let updated = engine.update("Order", patch).unwrap();

    let lines = updated.nested("lines");
    assert_eq!(lines.len(), 2);
    let kept = lines.iter().find(|l| l.id() == Some(pen.clone())).unwrap();
    assert_eq!(kept.get("quantity"), Some(&Value::Integer(5)));
    assert_eq!(kept.client_reference_id(), Some("keep"));
    assert!(!kept.is_created());
    let added = lines.iter().find(|l| text(l, "product") == "cap").unwrap();
    assert_eq!(added.client_reference_id(), Some("new"));
    assert!(added.is_created());

    assert_eq!(scalar(&engine, "SELECT COUNT(*) FROM line_item"), 2);
    assert_eq!(updated.get("line_count"), Some(&Value::Integer(2)));
}

#[test]
fn update_cannot_clear_mandatory_attribute() {
    let engine = shop();
    let created = engine.create("Customer", customer("Ada")).unwrap();
    let patch = Payload::stub(&id_of(&created)).with("name", Value::Null);

    let err = engine.update("Customer", patch).unwrap_err();

    assert!(matches!(err, PersistenceError::Statement(StatementError::Insertion { .. })));
}

#[test]
fn update_of_missing_instance_is_not_found() {
    let engine = shop();
    let err = engine
        .update("Customer", Payload::stub(&Id::Int(9)).with("name", "x"))
        .unwrap_err();
    assert!(matches!(err, PersistenceError::Statement(StatementError::ConstraintNotFound { .. })));
}

#[test]
fn stale_version_is_rejected_without_writing() {
    let engine = shop();
    let created = engine.create("Order", order("V-1", vec![])).unwrap();
    let id = id_of(&created);

    engine
        .update("Order", Payload::stub(&id).with("__version", 1).with("number", "V-2"))
        .unwrap();
    let err = engine
        .update("Order", Payload::stub(&id).with("__version", 1).with("number", "V-3"))
        .unwrap_err();

    assert!(matches!(
        err,
        PersistenceError::Statement(StatementError::OptimisticLock { version: 1, .. })
    ));
    let stored = engine.get_by_identifier("Order", &id, None).unwrap().unwrap();
    assert_eq!(text(&stored, "number"), "V-2");
    assert_eq!(stored.version(), Some(2));
}

#[test]
fn locking_can_be_disabled_by_configuration() {
    let mut config = StrataConfig::default();
    config.statements.optimistic_locking = Some(false);
    let engine = engine_with(SHOP_MODEL, SHOP_MAPPING, SHOP_DDL, &config);
    let created = engine.create("Order", order("V-4", vec![])).unwrap();

    let updated = engine
        .update(
            "Order",
            Payload::stub(&id_of(&created)).with("__version", 7).with("number", "V-5"),
        )
        .unwrap();

    assert_eq!(text(&updated, "number"), "V-5");
}

// ═══════════════════════════════════════════════════════════════════════════
// DELETE
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn delete_removes_owned_children_and_detaches_the_rest() {
    let engine = shop();
    let red = engine.create("Tag", Payload::new().with("label", "red")).unwrap();
    let payload = order("D-1", vec![line("pen", 1), line("ink", 2)])
        .with("shipping", Payload::new().with("street", "Elm"))
        .with("tags", vec![stub(&id_of(&red))]);
    let created = engine.create("Order", payload).unwrap();

    let deleted = engine.delete("Order", &[id_of(&created), Id::Int(999)]).unwrap();

    assert_eq!(deleted, 1);
    assert_eq!(engine.count("Order", None).unwrap(), 0);
    assert_eq!(scalar(&engine, "SELECT COUNT(*) FROM line_item"), 0);
    assert_eq!(scalar(&engine, "SELECT COUNT(*) FROM order_tag"), 0);
    // The address sat in a column of the order row and survives detached.
    assert_eq!(scalar(&engine, "SELECT COUNT(*) FROM address"), 1);
    assert_eq!(engine.count("Tag", None).unwrap(), 1);
}

#[test]
fn deleting_a_referenced_target_clears_the_link() {
    let engine = shop();
    let ada = engine.create("Customer", customer("Ada")).unwrap();
    let created = engine
        .create("Order", order("D-2", vec![]).with("customer", stub(&id_of(&ada))))
        .unwrap();

    assert_eq!(engine.delete("Customer", &[id_of(&ada)]).unwrap(), 1);

    let stored = engine
        .get_by_identifier("Order", &id_of(&created), None)
        .unwrap()
        .unwrap();
    assert_eq!(stored.get("customer"), Some(&Value::Null));
}

// ═══════════════════════════════════════════════════════════════════════════
// CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn stateless_context_rejects_mutations_but_serves_reads() {
    let mut config = StrataConfig::default();
    config.statements.stateful = Some(false);
    let engine = engine_with(SHOP_MODEL, SHOP_MAPPING, SHOP_DDL, &config);

    let err = engine.create("Customer", customer("Ada")).unwrap_err();

    assert!(matches!(
        err,
        PersistenceError::Statement(StatementError::StatelessOperation { .. })
    ));
    assert_eq!(engine.count("Customer", None).unwrap(), 0);

    // A mutation that would change nothing is still refused.
    engine
        .database()
        .execute_ddl("INSERT INTO orders (id, number) VALUES (1, 'S-1');")
        .unwrap();
    let err = engine.set_reference("Order", "tags", &Id::Int(1), &[]).unwrap_err();
    match err {
        PersistenceError::Statement(StatementError::StatelessOperation { operation }) => {
            assert_eq!(operation, "set_reference");
        }
        other => panic!("expected a stateless rejection, got {other:?}"),
    }
    let stored = engine.get_by_identifier("Order", &Id::Int(1), None).unwrap().unwrap();
    assert_eq!(text(&stored, "number"), "S-1");
}

#[test]
fn unknown_dialect_fails_at_open() {
    let mut config = StrataConfig::default();
    config.storage.dialect = Some("oracle".to_string());

    let result = StorageEngine::open_in_memory(load_model(SHOP_MODEL), load_mapping(SHOP_MAPPING), &config);

    assert!(matches!(result, Err(PersistenceError::Config(_))));
}
