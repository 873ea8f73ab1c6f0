//! End-to-end dispatch over an in-memory store.

use std::sync::Arc;

use serde_json::{json, Value as Json};
use strata_core::errors::DispatchError;
use strata_core::payload::{Id, Payload, Value};
use strata_core::query::{OrderBy, QueryCustomizer, Seek};
use strata_runtime::collaborators::{Collaborators, IdentifierSigner};
use strata_runtime::{
    CrudPrimitive, Exchange, OperationContext, OperationDefinition, OperationHandler,
    RuntimeOptions, StrataRuntime,
};

const MODEL: &str = r#"
[[entities]]
name = "Customer"
attributes = [
    { name = "name", data_type = { type = "text" }, lower = 1 },
    { name = "credit", data_type = { type = "integer" }, default = 100 },
]

[[entities]]
name = "LineItem"
attributes = [
    { name = "product", data_type = { type = "text" }, lower = 1 },
    { name = "quantity", data_type = { type = "integer" }, lower = 1 },
]

[[entities]]
name = "Order"
attributes = [{ name = "number", data_type = { type = "text" }, lower = 1 }]
references = [
    { name = "customer", target = "Customer" },
    { name = "lines", target = "LineItem", upper = -1, containment = true },
]
"#;

const MAPPING: &str = r#"
rules = [
    { kind = "entity_table", entity = "Customer", table = "customer" },
    { kind = "attribute_column", entity = "Customer", attribute = "name", column = "name" },
    { kind = "attribute_column", entity = "Customer", attribute = "credit", column = "credit" },
    { kind = "entity_table", entity = "LineItem", table = "line_item" },
    { kind = "attribute_column", entity = "LineItem", attribute = "product", column = "product" },
    { kind = "attribute_column", entity = "LineItem", attribute = "quantity", column = "quantity" },
    { kind = "entity_table", entity = "Order", table = "orders" },
    { kind = "attribute_column", entity = "Order", attribute = "number", column = "number" },
    { kind = "foreign_key", entity = "Order", reference = "customer", table = "orders", column = "customer_id" },
    { kind = "inverse_foreign_key", entity = "Order", reference = "lines", table = "line_item", column = "order_id" },
]
"#;

const DDL: &str = "
CREATE TABLE customer (id INTEGER PRIMARY KEY, name TEXT NOT NULL, credit INTEGER);
CREATE TABLE orders (id INTEGER PRIMARY KEY, number TEXT NOT NULL, customer_id INTEGER REFERENCES customer(id));
CREATE TABLE line_item (id INTEGER PRIMARY KEY, product TEXT NOT NULL, quantity INTEGER NOT NULL,
                        order_id INTEGER REFERENCES orders(id));
";

fn options() -> RuntimeOptions {
    RuntimeOptions {
        model_toml: MODEL.to_string(),
        mapping_toml: MAPPING.to_string(),
        schema_ddl: Some(DDL.to_string()),
        ..Default::default()
    }
}

fn runtime() -> StrataRuntime {
    let mut runtime = StrataRuntime::open(options()).expect("open runtime");
    for entity in ["Customer", "Order", "LineItem"] {
        runtime.dispatcher.register_crud(entity).unwrap();
    }
    runtime
}

fn output(payload: &Payload) -> &Payload {
    payload
        .get("output")
        .and_then(Value::as_payload)
        .expect("payload output")
}

fn create_customer(runtime: &StrataRuntime, name: &str) -> Id {
    let result = runtime
        .dispatcher
        .call(
            "Customer.create",
            Exchange::new().with_parameter("input", json!({ "name": name })),
        )
        .unwrap();
    output(&result).id().unwrap()
}

// ═══════════════════════════════════════════════════════════════════════════
// CRUD PRIMITIVES
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn crud_registration_covers_mutable_references() {
    let runtime = runtime();
    let dispatcher = &runtime.dispatcher;

    assert!(dispatcher.operation("Order.customer.setReference").is_some());
    assert!(dispatcher.operation("Order.customer.getRangeOf").is_some());
    assert!(dispatcher.operation("Order.lines.addReferences").is_none());
    // 7 per entity plus 5 for Order.customer.
    assert_eq!(dispatcher.operation_count(), 7 * 3 + 5);
}

#[test]
fn create_then_get_round_trips_through_json() {
    let runtime = runtime();
    let created = runtime.dispatcher.call_external(
        "Order.create",
        Exchange::from_json(json!({
            "input": {
                "number": "A-1",
                "lines": [{ "product": "pen", "quantity": 2 }],
            }
        }))
        .unwrap(),
    );
    let id = created["output"]["__id"].as_i64().expect("generated id");

    let read = runtime
        .dispatcher
        .call_external("Order.getByIdentifier", Exchange::from_json(json!({ "__instance": id })).unwrap());

    assert_eq!(read["output"]["number"], "A-1");
    assert_eq!(read["output"]["lines"][0]["product"], "pen");
    assert_eq!(read["output"]["lines"][0]["quantity"], 2);
}

#[test]
fn bound_update_takes_the_instance_identifier() {
    let runtime = runtime();
    let id = create_customer(&runtime, "Ada");

    let result = runtime
        .dispatcher
        .call(
            "Customer.update",
            Exchange::new()
                .with_instance(id.clone())
                .with_parameter("input", json!({ "name": "Ada L." })),
        )
        .unwrap();

    let updated = output(&result);
    assert_eq!(updated.id(), Some(id));
    assert_eq!(updated.get("name").and_then(Value::as_str), Some("Ada L."));
    assert_eq!(updated.get("credit"), Some(&Value::Integer(100)));
}

#[test]
fn search_returns_a_page() {
    let runtime = runtime();
    for name in ["Cy", "Ada", "Bo"] {
        create_customer(&runtime, name);
    }
    let customizer = QueryCustomizer::default()
        .with_order(OrderBy {
            attribute: "name".into(),
            descending: false,
        })
        .with_seek(Seek::first(2));

    let result = runtime
        .dispatcher
        .call("Customer.search", Exchange::new().with_customizer(customizer))
        .unwrap();

    let page = output(&result);
    let names: Vec<&str> = page
        .nested("items")
        .iter()
        .filter_map(|p| p.get("name").and_then(Value::as_str))
        .collect();
    assert_eq!(names, vec!["Ada", "Bo"]);
    assert_eq!(page.get("hasMore"), Some(&Value::Bool(true)));
    assert!(matches!(page.get("nextCursor"), Some(Value::Text(_))));
}

#[test]
fn set_reference_takes_stubs() {
    let runtime = runtime();
    let customer = create_customer(&runtime, "Grace");
    let order = runtime
        .dispatcher
        .call(
            "Order.create",
            Exchange::new().with_parameter("input", json!({ "number": "R-1" })),
        )
        .unwrap();
    let order = output(&order).id().unwrap();

    let Id::Int(raw) = customer.clone() else {
        panic!("integer id expected");
    };
    runtime
        .dispatcher
        .call(
            "Order.customer.setReference",
            Exchange::new()
                .with_instance(order.clone())
                .with_parameter("input", json!([{ "__id": raw }])),
        )
        .unwrap();

    let count = runtime
        .dispatcher
        .call(
            "Order.customer.countRangeOf",
            Exchange::new(),
        )
        .unwrap();
    assert_eq!(count.get("output"), Some(&Value::Integer(1)));

    let read = runtime
        .dispatcher
        .call("Order.getByIdentifier", Exchange::new().with_instance(order))
        .unwrap();
    let linked = output(&read).nested("customer");
    assert_eq!(linked[0].id(), Some(customer));
}

// ═══════════════════════════════════════════════════════════════════════════
// ROUTING AND FAULTS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn unknown_operations_fault_as_client_errors() {
    let runtime = runtime();
    let reply = runtime.dispatcher.call_external("Order.explode", Exchange::new());

    assert_eq!(reply["__fault"]["type"], "CLIENT");
    assert_eq!(reply["__fault"]["errorCode"], "UNKNOWN_OPERATION");
}

#[test]
fn internal_operations_are_not_callable_externally() {
    let mut runtime = runtime();
    runtime.dispatcher.register(
        OperationDefinition::crud("Customer", CrudPrimitive::Count)
            .with_output("total")
            .internal(),
    );

    let reply = runtime.dispatcher.call_external("Customer.count", Exchange::new());
    assert_eq!(reply["__fault"]["errorCode"], "OPERATION_NOT_EXPOSED");

    let internal = runtime.dispatcher.call("Customer.count", Exchange::new()).unwrap();
    assert_eq!(internal.get("total"), Some(&Value::Integer(0)));
}

#[test]
fn bound_operations_need_an_instance() {
    let runtime = runtime();
    let err = runtime
        .dispatcher
        .call("Customer.delete", Exchange::new())
        .unwrap_err();
    assert!(matches!(err, DispatchError::InvalidInput { ref operation, .. } if operation == "Customer.delete"));
}

#[test]
fn missing_mandatory_feature_is_a_client_fault() {
    let runtime = runtime();
    let reply = runtime.dispatcher.call_external(
        "Order.create",
        Exchange::new().with_parameter(
            "input",
            json!({ "number": "B-1", "lines": [{ "product": "pen" }] }),
        ),
    );

    assert_eq!(reply["__fault"]["type"], "CLIENT");
    assert_eq!(reply["__fault"]["errorCode"], "INSERTION_ERROR");
}

#[test]
fn missing_instance_is_not_found() {
    let runtime = runtime();
    let reply = runtime.dispatcher.call_external(
        "Customer.getByIdentifier",
        Exchange::new().with_instance(Id::Int(404)),
    );
    assert_eq!(reply["__fault"]["errorCode"], "CONSTRAINT_NOT_FOUND");
}

// ═══════════════════════════════════════════════════════════════════════════
// SDK BEHAVIORS
// ═══════════════════════════════════════════════════════════════════════════

/// Spends credit on a customer; refuses to go negative.
struct Spend;

impl OperationHandler for Spend {
    fn invoke(&self, context: &OperationContext<'_>, input: Payload) -> Result<Value, DispatchError> {
        let id = context.instance.expect("bound");
        let amount = input.get("amount").and_then(Value::as_i64).unwrap_or(0);
        let customer = context
            .store
            .get_by_identifier("Customer", id, None)?
            .expect("customer exists");
        let credit = customer.get("credit").and_then(Value::as_i64).unwrap_or(0);
        if amount > credit {
            let fault = Payload::new()
                .with("errorCode", "CREDIT_EXCEEDED")
                .with("cause", format!("{amount} exceeds {credit}"));
            return Ok(Value::Payload(Box::new(
                Payload::new().with(strata_core::constants::keys::FAULT, fault),
            )));
        }
        let updated = context
            .store
            .update("Customer", Payload::stub(id).with("credit", credit - amount))?;
        Ok(Value::Payload(Box::new(updated)))
    }
}

fn with_spend(runtime: &mut StrataRuntime) {
    runtime.dispatcher.register(
        OperationDefinition::sdk("Customer.spend", Some("Customer"), Arc::new(Spend))
            .bound()
            .with_input("request"),
    );
}

#[test]
fn sdk_behavior_runs_against_the_store() {
    let mut runtime = runtime();
    with_spend(&mut runtime);
    let id = create_customer(&runtime, "Lin");

    let result = runtime
        .dispatcher
        .call(
            "Customer.spend",
            Exchange::new()
                .with_instance(id)
                .with_parameter("amount", 30),
        )
        .unwrap();

    assert_eq!(output(&result).get("credit"), Some(&Value::Integer(70)));
}

#[test]
fn fault_key_becomes_a_business_fault() {
    let mut runtime = runtime();
    with_spend(&mut runtime);
    let id = create_customer(&runtime, "Max");
    let Id::Int(raw) = id else {
        panic!("integer id expected");
    };

    let reply: Json = runtime.dispatcher.call_external(
        "Customer.spend",
        Exchange::from_json(json!({ "__instance": raw, "amount": 500 })).unwrap(),
    );

    assert_eq!(reply["__fault"]["type"], "BUSINESS");
    assert_eq!(reply["__fault"]["errorCode"], "CREDIT_EXCEEDED");
    assert_eq!(reply["__fault"]["cause"], "500 exceeds 100");
}

// ═══════════════════════════════════════════════════════════════════════════
// IDENTIFIER SIGNING
// ═══════════════════════════════════════════════════════════════════════════

/// Identifiers leave as `Entity:id` tokens and must come back that way.
struct PrefixSigner;

impl IdentifierSigner for PrefixSigner {
    fn verify(&self, entity: &str, id: &Id) -> Result<Id, DispatchError> {
        let Id::Text(token) = id else {
            return Err(DispatchError::Signature {
                message: format!("unsigned identifier {id}"),
            });
        };
        token
            .strip_prefix(&format!("{entity}:"))
            .and_then(|raw| raw.parse::<i64>().ok())
            .map(Id::Int)
            .ok_or_else(|| DispatchError::Signature {
                message: format!("'{token}' is not a {entity} token"),
            })
    }

    fn sign(&self, entity: &str, id: &Id) -> Id {
        Id::Text(format!("{entity}:{id}"))
    }
}

fn signed_runtime() -> StrataRuntime {
    let collaborators = Collaborators {
        signer: Arc::new(PrefixSigner),
        ..Default::default()
    };
    let mut runtime = StrataRuntime::open_with(options(), collaborators).unwrap();
    runtime.dispatcher.register_crud("Order").unwrap();
    runtime
}

#[test]
fn output_identifiers_are_signed_per_entity() {
    let runtime = signed_runtime();

    let reply = runtime.dispatcher.call_external(
        "Order.create",
        Exchange::new().with_parameter(
            "input",
            json!({ "number": "S-1", "lines": [{ "product": "ink", "quantity": 1 }] }),
        ),
    );

    let order = reply["output"]["__id"].as_str().unwrap();
    let line = reply["output"]["lines"][0]["__id"].as_str().unwrap();
    assert!(order.starts_with("Order:"), "{reply}");
    assert!(line.starts_with("LineItem:"), "{reply}");

    let read = runtime.dispatcher.call_external(
        "Order.getByIdentifier",
        Exchange::from_json(json!({ "__instance": order })).unwrap(),
    );
    assert_eq!(read["output"]["number"], "S-1");
}

#[test]
fn unsigned_identifiers_are_rejected() {
    let runtime = signed_runtime();

    let reply = runtime.dispatcher.call_external(
        "Order.getByIdentifier",
        Exchange::new().with_instance(Id::Int(1)),
    );

    assert_eq!(reply["__fault"]["type"], "CLIENT");
    assert_eq!(reply["__fault"]["errorCode"], "SIGNATURE_ERROR");
}

// ═══════════════════════════════════════════════════════════════════════════
// FILE-BACKED RUNTIME
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn file_backed_runtime_keeps_data_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("strata.db");

    let id = {
        let mut first = StrataRuntime::open(RuntimeOptions {
            db_path: Some(db_path.clone()),
            ..options()
        })
        .unwrap();
        first.dispatcher.register_crud("Customer").unwrap();
        create_customer(&first, "Hopper")
    };

    let mut second = StrataRuntime::open(RuntimeOptions {
        db_path: Some(db_path),
        schema_ddl: None,
        ..options()
    })
    .unwrap();
    second.dispatcher.register_crud("Customer").unwrap();

    let found = second
        .dispatcher
        .call("Customer.getByIdentifier", Exchange::new().with_instance(id))
        .unwrap();
    assert_eq!(output(&found).get("name").and_then(Value::as_str), Some("Hopper"));
    assert_eq!(output(&found).get("credit"), Some(&Value::Integer(100)));
}

#[test]
fn bad_config_toml_fails_to_open() {
    let err = StrataRuntime::open(RuntimeOptions {
        config_toml: Some("[storage\nread_pool_size = 2".to_string()),
        ..options()
    })
    .unwrap_err();
    assert!(matches!(
        err,
        strata_core::PersistenceError::Config(strata_core::errors::ConfigError::ParseError { .. })
    ));
}
