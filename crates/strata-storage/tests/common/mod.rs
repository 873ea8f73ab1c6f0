//! Shared fixtures: small models, their mapping traces and the DDL they map onto.

#![allow(dead_code)]

use std::sync::Arc;

use strata_core::config::StrataConfig;
use strata_core::errors::StorageError;
use strata_core::mapping::SchemaMapping;
use strata_core::model::{Model, ModelDefinition};
use strata_core::payload::{Id, Payload, Value};
use strata_storage::StorageEngine;

// ═══════════════════════════════════════════════════════════════════════════
// SHOP: containment over an inverse foreign key, a container-side column and
// a junction table; a plain to-one reference; optimistic locking.
// ═══════════════════════════════════════════════════════════════════════════

pub const SHOP_MODEL: &str = r#"
[[entities]]
name = "Customer"
attributes = [
    { name = "name", data_type = { type = "text", max_length = 80 }, lower = 1 },
]

[[entities]]
name = "Tag"
attributes = [{ name = "label", data_type = { type = "text" }, lower = 1 }]

[[entities]]
name = "Address"
attributes = [
    { name = "street", data_type = { type = "text" }, lower = 1 },
    { name = "city", data_type = { type = "text" } },
]

[[entities]]
name = "LineItem"
attributes = [
    { name = "product", data_type = { type = "text" }, lower = 1 },
    { name = "quantity", data_type = { type = "integer" }, lower = 1 },
]

[[entities]]
name = "Order"
optimistic_locking = true
attributes = [
    { name = "number", data_type = { type = "text" }, lower = 1 },
    { name = "status", data_type = { type = "enumeration", literals = ["OPEN", "SHIPPED"] }, default = "OPEN" },
    { name = "total", data_type = { type = "decimal", precision = 12, scale = 2 } },
    { name = "channel", data_type = { type = "text" }, static = "web" },
    { name = "line_count", data_type = { type = "integer" }, derived = "SELECT COUNT(*) FROM line_item li WHERE li.order_id = {self}.id" },
]
references = [
    { name = "customer", target = "Customer" },
    { name = "lines", target = "LineItem", upper = -1, containment = true },
    { name = "shipping", target = "Address", containment = true },
    { name = "tags", target = "Tag", upper = 3 },
]
"#;

pub const SHOP_MAPPING: &str = r#"
rules = [
    { kind = "entity_table", entity = "Customer", table = "customer" },
    { kind = "attribute_column", entity = "Customer", attribute = "name", column = "name" },
    { kind = "entity_table", entity = "Tag", table = "tag", id_type = "text" },
    { kind = "attribute_column", entity = "Tag", attribute = "label", column = "label" },
    { kind = "entity_table", entity = "Address", table = "address" },
    { kind = "attribute_column", entity = "Address", attribute = "street", column = "street" },
    { kind = "attribute_column", entity = "Address", attribute = "city", column = "city" },
    { kind = "entity_table", entity = "LineItem", table = "line_item" },
    { kind = "attribute_column", entity = "LineItem", attribute = "product", column = "product" },
    { kind = "attribute_column", entity = "LineItem", attribute = "quantity", column = "quantity" },
    { kind = "entity_table", entity = "Order", table = "orders", version_column = "version" },
    { kind = "attribute_column", entity = "Order", attribute = "number", column = "number" },
    { kind = "attribute_column", entity = "Order", attribute = "status", column = "status" },
    { kind = "attribute_column", entity = "Order", attribute = "total", column = "total" },
    { kind = "foreign_key", entity = "Order", reference = "customer", table = "orders", column = "customer_id" },
    { kind = "inverse_foreign_key", entity = "Order", reference = "lines", table = "line_item", column = "order_id" },
    { kind = "foreign_key", entity = "Order", reference = "shipping", table = "orders", column = "shipping_address_id" },
    { kind = "join_table", entity = "Order", reference = "tags", table = "order_tag", source_column = "order_id", target_column = "tag_id" },
]
"#;

pub const SHOP_DDL: &str = "
CREATE TABLE customer (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
CREATE TABLE tag (id TEXT PRIMARY KEY, label TEXT NOT NULL);
CREATE TABLE address (id INTEGER PRIMARY KEY, street TEXT NOT NULL, city TEXT);
CREATE TABLE orders (
    id INTEGER PRIMARY KEY,
    version INTEGER NOT NULL DEFAULT 1,
    number TEXT NOT NULL,
    status INTEGER,
    total TEXT,
    customer_id INTEGER REFERENCES customer(id),
    shipping_address_id INTEGER REFERENCES address(id)
);
CREATE TABLE line_item (
    id INTEGER PRIMARY KEY,
    product TEXT NOT NULL,
    quantity INTEGER NOT NULL,
    order_id INTEGER REFERENCES orders(id)
);
CREATE TABLE order_tag (
    order_id INTEGER NOT NULL REFERENCES orders(id),
    tag_id TEXT NOT NULL REFERENCES tag(id),
    PRIMARY KEY (order_id, tag_id)
);
";

// ═══════════════════════════════════════════════════════════════════════════
// LIBRARY: many-to-many over AUTHOR_BOOK, mapped from one side only.
// ═══════════════════════════════════════════════════════════════════════════

pub const LIBRARY_MODEL: &str = r#"
[[entities]]
name = "Author"
attributes = [{ name = "name", data_type = { type = "text" }, lower = 1 }]
references = [{ name = "books", target = "Book", upper = -1, opposite = "authors" }]

[[entities]]
name = "Book"
attributes = [{ name = "title", data_type = { type = "text" }, lower = 1 }]
references = [{ name = "authors", target = "Author", upper = -1 }]
"#;

pub const LIBRARY_MAPPING: &str = r#"
rules = [
    { kind = "entity_table", entity = "Author", table = "author" },
    { kind = "attribute_column", entity = "Author", attribute = "name", column = "name" },
    { kind = "entity_table", entity = "Book", table = "book" },
    { kind = "attribute_column", entity = "Book", attribute = "title", column = "title" },
    { kind = "join_table", entity = "Author", reference = "books", table = "AUTHOR_BOOK", source_column = "author_id", target_column = "book_id" },
]
"#;

pub const LIBRARY_DDL: &str = "
CREATE TABLE author (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
CREATE TABLE book (id INTEGER PRIMARY KEY, title TEXT NOT NULL);
CREATE TABLE AUTHOR_BOOK (
    author_id INTEGER NOT NULL REFERENCES author(id),
    book_id INTEGER NOT NULL REFERENCES book(id),
    PRIMARY KEY (author_id, book_id)
);
";

// ═══════════════════════════════════════════════════════════════════════════
// CATEGORY: self-containment with a declared parent back-reference.
// ═══════════════════════════════════════════════════════════════════════════

pub const CATEGORY_MODEL: &str = r#"
[[entities]]
name = "Category"
attributes = [{ name = "name", data_type = { type = "text" }, lower = 1 }]
references = [
    { name = "children", target = "Category", upper = -1, containment = true, opposite = "parent" },
    { name = "parent", target = "Category" },
]
"#;

pub const CATEGORY_MAPPING: &str = r#"
rules = [
    { kind = "entity_table", entity = "Category", table = "category" },
    { kind = "attribute_column", entity = "Category", attribute = "name", column = "name" },
    { kind = "inverse_foreign_key", entity = "Category", reference = "children", table = "category", column = "parent_id" },
]
"#;

pub const CATEGORY_DDL: &str = "
CREATE TABLE category (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    parent_id INTEGER REFERENCES category(id)
);
";

// ═══════════════════════════════════════════════════════════════════════════
// STAFF: joined-table inheritance, one table per type.
// ═══════════════════════════════════════════════════════════════════════════

pub const STAFF_MODEL: &str = r#"
[[entities]]
name = "Person"
attributes = [{ name = "name", data_type = { type = "text" }, lower = 1 }]

[[entities]]
name = "Employee"
supertype = "Person"
attributes = [{ name = "salary", data_type = { type = "decimal", precision = 10, scale = 2 } }]
"#;

pub const STAFF_MAPPING: &str = r#"
rules = [
    { kind = "entity_table", entity = "Person", table = "person" },
    { kind = "attribute_column", entity = "Person", attribute = "name", column = "name" },
    { kind = "entity_table", entity = "Employee", table = "employee" },
    { kind = "attribute_column", entity = "Employee", attribute = "salary", column = "salary" },
]
"#;

pub const STAFF_DDL: &str = "
CREATE TABLE person (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
CREATE TABLE employee (id INTEGER PRIMARY KEY, salary TEXT);
";

// ═══════════════════════════════════════════════════════════════════════════
// Constructors
// ═══════════════════════════════════════════════════════════════════════════

pub fn load_model(source: &str) -> Arc<Model> {
    let definition = ModelDefinition::from_toml(source).expect("model toml");
    Arc::new(Model::from_definition(definition).expect("valid model"))
}

pub fn load_mapping(source: &str) -> SchemaMapping {
    SchemaMapping::from_toml(source).expect("mapping toml")
}

/// In-memory engine with `ddl` installed.
pub fn engine_with(model: &str, mapping: &str, ddl: &str, config: &StrataConfig) -> StorageEngine {
    let engine = StorageEngine::open_in_memory(load_model(model), load_mapping(mapping), config)
        .expect("open engine");
    engine.database().execute_ddl(ddl).expect("install schema");
    engine
}

pub fn shop() -> StorageEngine {
    engine_with(SHOP_MODEL, SHOP_MAPPING, SHOP_DDL, &StrataConfig::default())
}

pub fn library() -> StorageEngine {
    engine_with(LIBRARY_MODEL, LIBRARY_MAPPING, LIBRARY_DDL, &StrataConfig::default())
}

pub fn categories() -> StorageEngine {
    engine_with(CATEGORY_MODEL, CATEGORY_MAPPING, CATEGORY_DDL, &StrataConfig::default())
}

pub fn staff() -> StorageEngine {
    engine_with(STAFF_MODEL, STAFF_MAPPING, STAFF_DDL, &StrataConfig::default())
}

// ═══════════════════════════════════════════════════════════════════════════
// Payload helpers
// ═══════════════════════════════════════════════════════════════════════════

pub fn customer(name: &str) -> Payload {
    Payload::new().with("name", name)
}

pub fn line(product: &str, quantity: i64) -> Payload {
    Payload::new().with("product", product).with("quantity", quantity)
}

pub fn order(number: &str, lines: Vec<Payload>) -> Payload {
    Payload::new().with("number", number).with("lines", lines)
}

/// Reference stub pointing at an existing instance.
pub fn stub(id: &Id) -> Payload {
    Payload::stub(id)
}

pub fn id_of(payload: &Payload) -> Id {
    payload.id().expect("payload carries an identifier")
}

pub fn text<'a>(payload: &'a Payload, key: &str) -> &'a str {
    payload
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_else(|| panic!("'{key}' is not text in {payload:?}"))
}

/// Run a single-value SQL query directly against the store.
pub fn scalar(engine: &StorageEngine, sql: &str) -> i64 {
    engine
        .database()
        .with_reader(|conn| {
            conn.query_row(sql, [], |row| row.get::<_, i64>(0))
                .map_err(|e| StorageError::SqliteError {
                    message: e.to_string(),
                })
        })
        .expect("scalar query")
}
