//! Select plans and instance graph collection: cyclic containment,
//! containment round-trips and back-references.

mod common;

use strata_core::config::StrataConfig;
use strata_core::graph::EdgeKind;
use strata_core::payload::{Id, Payload};
use strata_core::traits::EntityStore;
use strata_storage::StorageEngine;

use common::*;

fn plan_only(model: &str, mapping: &str) -> StorageEngine {
    StorageEngine::open_in_memory(load_model(model), load_mapping(mapping), &StrataConfig::default())
        .expect("open engine")
}

/// A category with a single chain of `depth - 1` descendants.
fn chain(depth: usize) -> Payload {
    let mut node = Payload::new().with("name", format!("level-{depth}"));
    for level in (1..depth).rev() {
        node = Payload::new()
            .with("name", format!("level-{level}"))
            .with("children", vec![node]);
    }
    node
}

// ═══════════════════════════════════════════════════════════════════════════
// PLAN CONSTRUCTION
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn self_containment_closes_with_a_recursive_sub_select() {
    let engine = plan_only(CATEGORY_MODEL, CATEGORY_MAPPING);
    let model = engine.model();
    let category = model.entity_by_name("Category").unwrap().id;
    let children = model.find_reference(category, "children").unwrap();

    let plan = engine.collector().plan(category).unwrap();

    let recursive: Vec<_> = plan
        .sub_selects()
        .into_iter()
        .filter(|(_, sub)| sub.recursive)
        .collect();
    assert_eq!(recursive.len(), 1, "{}", plan.describe(model));
    assert_eq!(recursive[0].1.edge.reference, children);
    assert!(plan
        .join_edges()
        .iter()
        .all(|(_, edge)| edge.reference != children));
    // The contained node reaches its container without a query.
    let nested = recursive[0].1.edge.child;
    assert!(plan.node(nested).container.is_some());
}

const MUTUAL_MODEL: &str = r#"
[[entities]]
name = "Folder"
references = [{ name = "shortcuts", target = "Shortcut", upper = -1, containment = true }]

[[entities]]
name = "Shortcut"
references = [{ name = "folders", target = "Folder", upper = -1, containment = true }]
"#;

const MUTUAL_MAPPING: &str = r#"
rules = [
    { kind = "entity_table", entity = "Folder", table = "folder" },
    { kind = "entity_table", entity = "Shortcut", table = "shortcut" },
    { kind = "inverse_foreign_key", entity = "Folder", reference = "shortcuts", table = "shortcut", column = "folder_id" },
    { kind = "inverse_foreign_key", entity = "Shortcut", reference = "folders", table = "folder", column = "shortcut_id" },
]
"#;

#[test]
fn mutual_containment_terminates_for_both_roots() {
    let engine = plan_only(MUTUAL_MODEL, MUTUAL_MAPPING);
    let model = engine.model();

    for name in ["Folder", "Shortcut"] {
        let entity = model.entity_by_name(name).unwrap().id;
        let plan = engine.collector().plan(entity).unwrap();

        assert!(plan.nodes.len() <= 6, "{}", plan.describe(model));
        assert!(
            plan.sub_selects().iter().any(|(_, sub)| sub.recursive),
            "{}",
            plan.describe(model)
        );
        assert!(plan
            .join_edges()
            .iter()
            .all(|(_, edge)| edge.kind != EdgeKind::Containment));
    }
}

const LINKED_MODEL: &str = r#"
[[entities]]
name = "Step"
attributes = [{ name = "label", data_type = { type = "text" } }]
references = [{ name = "next", target = "Step" }]
"#;

const LINKED_MAPPING: &str = r#"
rules = [
    { kind = "entity_table", entity = "Step", table = "step" },
    { kind = "attribute_column", entity = "Step", attribute = "label", column = "label" },
    { kind = "foreign_key", entity = "Step", reference = "next", table = "step", column = "next_id" },
]
"#;

#[test]
fn self_reference_stops_after_one_level() {
    let engine = engine_with(
        LINKED_MODEL,
        LINKED_MAPPING,
        "CREATE TABLE step (id INTEGER PRIMARY KEY, label TEXT, next_id INTEGER REFERENCES step(id));",
        &StrataConfig::default(),
    );
    let model = engine.model();
    let step = model.entity_by_name("Step").unwrap().id;

    let plan = engine.collector().plan(step).unwrap();
    assert_eq!(plan.nodes.len(), 3, "{}", plan.describe(model));

    // A reference cycle in the data does not keep collection going.
    let last = id_of(&engine.create("Step", Payload::new().with("label", "c")).unwrap());
    let middle = id_of(
        &engine
            .create("Step", Payload::new().with("label", "b").with("next", stub(&last)))
            .unwrap(),
    );
    let first = id_of(
        &engine
            .create("Step", Payload::new().with("label", "a").with("next", stub(&middle)))
            .unwrap(),
    );
    engine.set_reference("Step", "next", &last, &[first.clone()]).unwrap();

    let graph = engine.collect_graph("Step", &[first.clone()]).unwrap();
    assert_eq!(graph.roots, vec![(step, first)]);
    assert!(graph.len() <= 3);
}

// ═══════════════════════════════════════════════════════════════════════════
// GRAPH COLLECTION
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn five_level_category_chain_is_collected_in_full() {
    let engine = categories();
    let root = id_of(&engine.create("Category", chain(5)).unwrap());
    let category = engine.model().entity_by_name("Category").unwrap().id;

    let graph = engine.collect_graph("Category", &[root.clone()]).unwrap();

    let key = (category, root.clone());
    assert_eq!(graph.roots, vec![key.clone()]);
    assert_eq!(graph.containment_depth(&key), 5);
    assert_eq!(graph.contained_count(&key), 4);
    assert_eq!(graph.len(), 5);

    let read = engine.get_by_identifier("Category", &root, None).unwrap().unwrap();
    let mut levels = vec![text(&read, "name").to_string()];
    let mut current = read.clone();
    loop {
        let next = match current.nested("children").first() {
            Some(child) => (*child).clone(),
            None => break,
        };
        levels.push(text(&next, "name").to_string());
        current = next;
    }
    assert_eq!(levels, vec!["level-1", "level-2", "level-3", "level-4", "level-5"]);
}

#[test]
fn deleting_a_category_removes_its_subtree() {
    let engine = categories();
    let root = engine.create("Category", chain(4)).unwrap();
    let second = id_of(root.nested("children")[0]);

    assert_eq!(engine.delete("Category", &[second]).unwrap(), 1);

    assert_eq!(engine.count("Category", None).unwrap(), 1);
    let stored = engine
        .get_by_identifier("Category", &id_of(&root), None)
        .unwrap()
        .unwrap();
    assert!(stored.nested("children").is_empty());
}

#[test]
fn graph_mirrors_the_inserted_containment_tree() {
    let engine = shop();
    let payload = order("G-1", vec![line("pen", 1), line("ink", 2), line("cap", 3)])
        .with("shipping", Payload::new().with("street", "Elm"));
    let created = engine.create("Order", payload).unwrap();
    let model = engine.model();
    let order_type = model.entity_by_name("Order").unwrap().id;
    let lines = model.find_reference(order_type, "lines").unwrap();
    let shipping = model.find_reference(order_type, "shipping").unwrap();

    let graph = engine.collect_graph("Order", &[id_of(&created)]).unwrap();

    let key = (order_type, id_of(&created));
    let node = graph.node(&key).unwrap();
    assert_eq!(node.contained(lines).len(), 3);
    assert_eq!(node.contained(shipping).len(), 1);
    assert_eq!(graph.contained_count(&key), 4);
    assert_eq!(graph.containment_depth(&key), 2);
    let created_lines: Vec<Id> = created.nested("lines").iter().map(|l| id_of(l)).collect();
    let collected: Vec<Id> = node.contained(lines).iter().map(|k| k.1.clone()).collect();
    assert_eq!(collected, created_lines);
}

#[test]
fn roots_follow_request_order_and_skip_missing_ids() {
    let engine = shop();
    let a = id_of(&engine.create("Customer", customer("Ada")).unwrap());
    let b = id_of(&engine.create("Customer", customer("Grace")).unwrap());
    let customer_type = engine.model().entity_by_name("Customer").unwrap().id;

    let graph = engine
        .collect_graph("Customer", &[b.clone(), Id::Int(77), a.clone(), b.clone()])
        .unwrap();

    assert_eq!(graph.roots, vec![(customer_type, b), (customer_type, a)]);
}

#[test]
fn back_references_point_at_referring_owners() {
    let engine = shop();
    let ada = id_of(&engine.create("Customer", customer("Ada")).unwrap());
    let o1 = id_of(
        &engine
            .create("Order", order("B-1", vec![]).with("customer", stub(&ada)))
            .unwrap(),
    );
    let o2 = id_of(
        &engine
            .create("Order", order("B-2", vec![]).with("customer", stub(&ada)))
            .unwrap(),
    );
    let model = engine.model();
    let customer_type = model.entity_by_name("Customer").unwrap().id;
    let order_type = model.entity_by_name("Order").unwrap().id;
    let customer_ref = model.find_reference(order_type, "customer").unwrap();

    let graph = engine.collect_graph("Customer", &[ada.clone()]).unwrap();

    let node = graph.node(&(customer_type, ada)).unwrap();
    let owners = node.back_references.get(&customer_ref).cloned().unwrap_or_default();
    assert_eq!(owners, vec![(order_type, o1), (order_type, o2)]);
}

#[test]
fn small_in_lists_still_collect_every_node() {
    let mut config = StrataConfig::default();
    config.statements.max_in_list = Some(2);
    let engine = engine_with(SHOP_MODEL, SHOP_MAPPING, SHOP_DDL, &config);
    let ids: Vec<Id> = (0..5)
        .map(|i| {
            let payload = order(&format!("C-{i}"), vec![line("pen", 1), line("ink", 2)]);
            id_of(&engine.create("Order", payload).unwrap())
        })
        .collect();
    let model = engine.model();
    let order_type = model.entity_by_name("Order").unwrap().id;
    let lines = model.find_reference(order_type, "lines").unwrap();

    let graph = engine.collect_graph("Order", &ids).unwrap();

    assert_eq!(graph.roots.len(), 5);
    for id in ids {
        assert_eq!(graph.node(&(order_type, id)).unwrap().contained(lines).len(), 2);
    }
}
