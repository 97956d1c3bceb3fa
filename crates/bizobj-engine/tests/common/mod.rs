#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use bizobj_core::model::{DataType, ModelKind, ModelSchema, ModelSchemaBuilder, PropertyDescriptor};
use bizobj_core::rules::builtin::{MaxLength, Required};
use bizobj_core::rules::RuleDescriptor;
use bizobj_core::{DaoRegistry, ModelInstance, PortalConfig, Record};
use bizobj_engine::DataPortal;
use bizobj_store::{DaoCallLog, MemoryConnectionProvider, MemoryDao, MemoryStore};

/// In-memory store, journals and DAO registry behind one portal
pub struct Backend {
    pub store: MemoryStore,
    pub log: DaoCallLog,
    pub connections: MemoryConnectionProvider,
    pub registry: DaoRegistry,
}

impl Backend {
    pub fn new() -> Self {
        let store = MemoryStore::new();
        let connections = MemoryConnectionProvider::new(&store);
        Self {
            store,
            log: DaoCallLog::new(),
            connections,
            registry: DaoRegistry::new(),
        }
    }

    /// Journaled DAO over `table`, not registered anywhere
    pub fn dao(&self, table: &str) -> MemoryDao {
        MemoryDao::new(&self.store, table).log(&self.log)
    }

    /// Register `dao` for `model`; the handle allows failure injection later
    pub fn register(&mut self, model: &str, dao: MemoryDao) -> Arc<MemoryDao> {
        let dao = Arc::new(dao);
        self.registry.register(model, dao.clone());
        dao
    }

    pub fn portal(&self) -> DataPortal {
        self.portal_with(PortalConfig::default())
    }

    pub fn portal_with(&self, config: PortalConfig) -> DataPortal {
        DataPortal::new(
            config,
            Arc::new(self.registry.clone()),
            Arc::new(self.connections.clone()),
        )
    }
}

// ===== ORDER GRAPH =====

pub fn address_schema() -> Arc<ModelSchema> {
    ModelSchema::builder("Address", ModelKind::EditableChild)
        .property(PropertyDescriptor::new("orderKey", DataType::Integer).parent_key())
        .property(PropertyDescriptor::new("street", DataType::Text))
        .property(PropertyDescriptor::new("city", DataType::Text))
        .build()
        .unwrap()
}

pub fn order_item_schema() -> Arc<ModelSchema> {
    ModelSchema::builder("OrderItem", ModelKind::EditableChild)
        .property(PropertyDescriptor::new("orderItemKey", DataType::Integer).key())
        .property(PropertyDescriptor::new("orderKey", DataType::Integer).parent_key())
        .property(PropertyDescriptor::new("productName", DataType::Text))
        .property(PropertyDescriptor::new("quantity", DataType::Integer))
        .property(PropertyDescriptor::new("unitPrice", DataType::Decimal))
        .rule(RuleDescriptor::validation("productName", Required))
        .rule(RuleDescriptor::validation("productName", MaxLength::new(30)))
        .rule(RuleDescriptor::validation("quantity", Required))
        .rule(RuleDescriptor::validation("unitPrice", Required))
        .build()
        .unwrap()
}

/// Order builder without rules, so tests can add their own
pub fn order_builder() -> ModelSchemaBuilder {
    ModelSchema::builder("Order", ModelKind::EditableRoot)
        .property(
            PropertyDescriptor::new("orderKey", DataType::Integer)
                .key()
                .read_only(),
        )
        .property(PropertyDescriptor::new("vendorName", DataType::Text))
        .property(PropertyDescriptor::new("orderDate", DataType::DateTime))
        .property(PropertyDescriptor::child("address", address_schema()))
        .property(PropertyDescriptor::collection("items", order_item_schema()))
        .rule(RuleDescriptor::validation("vendorName", Required))
}

pub fn order_schema() -> Arc<ModelSchema> {
    order_builder().build().unwrap()
}

/// Backend with journaled DAOs for Order, Address and OrderItem
pub fn order_backend() -> (Backend, OrderDaos) {
    let mut backend = Backend::new();
    let order = backend.dao("Order").auto_key("orderKey");
    let address = backend.dao("Address");
    let item = backend.dao("OrderItem").auto_key("orderItemKey");
    let daos = OrderDaos {
        order: backend.register("Order", order),
        address: backend.register("Address", address),
        item: backend.register("OrderItem", item),
    };
    (backend, daos)
}

pub struct OrderDaos {
    pub order: Arc<MemoryDao>,
    pub address: Arc<MemoryDao>,
    pub item: Arc<MemoryDao>,
}

/// Valid order with an address and `items` line items, not yet saved
pub fn new_order(schema: &Arc<ModelSchema>, items: usize) -> ModelInstance {
    let mut order = ModelInstance::new(schema.clone());
    order.set("vendorName", "Acme").unwrap();
    {
        let address = order.child_mut("address").unwrap();
        address.set("street", "1 Main St").unwrap();
        address.set("city", "Springfield").unwrap();
    }
    let lines = order.collection_mut("items").unwrap();
    for i in 0..items {
        let item = lines.add_new();
        item.set("productName", format!("Widget {i}")).unwrap();
        item.set("quantity", (i + 1) as i64).unwrap();
        item.set("unitPrice", 9.5).unwrap();
    }
    order
}

// ===== FAN-OUT GRAPH =====

/// Two child objects, each owning two child objects of its own
///
/// `root` names the root model so log assertions can be made unique.
pub fn vehicle_schema(root: &str) -> Arc<ModelSchema> {
    let part = |name: &str, parent_key: &str| {
        ModelSchema::builder(name, ModelKind::EditableChild)
            .property(PropertyDescriptor::new(parent_key, DataType::Integer).parent_key())
            .property(PropertyDescriptor::new("label", DataType::Text))
            .build()
            .unwrap()
    };
    let assembly = |name: &str, key: &str, left: &str, right: &str| {
        ModelSchema::builder(name, ModelKind::EditableChild)
            .property(PropertyDescriptor::new(key, DataType::Integer).key())
            .property(PropertyDescriptor::new("vehicleKey", DataType::Integer).parent_key())
            .property(PropertyDescriptor::child(left.to_lowercase(), part(left, key)))
            .property(PropertyDescriptor::child(right.to_lowercase(), part(right, key)))
            .build()
            .unwrap()
    };

    ModelSchema::builder(root, ModelKind::EditableRoot)
        .property(PropertyDescriptor::new("vehicleKey", DataType::Integer).key())
        .property(PropertyDescriptor::new("model", DataType::Text))
        .property(PropertyDescriptor::child(
            "engine",
            assembly("Engine", "engineKey", "Pump", "Starter"),
        ))
        .property(PropertyDescriptor::child(
            "chassis",
            assembly("Chassis", "chassisKey", "Axle", "Frame"),
        ))
        .build()
        .unwrap()
}

/// Seed one vehicle (key 1) and register delayed DAOs for every table
pub fn vehicle_backend(root: &str) -> (Backend, Vec<Arc<MemoryDao>>) {
    let mut backend = Backend::new();
    let store = &backend.store;
    let rows = [
        (root, Record::new().with("vehicleKey", 1).with("model", "Roadster")),
        ("Engine", Record::new().with("engineKey", 10).with("vehicleKey", 1)),
        ("Chassis", Record::new().with("chassisKey", 20).with("vehicleKey", 1)),
        ("Pump", Record::new().with("engineKey", 10).with("label", "Pump")),
        ("Starter", Record::new().with("engineKey", 10).with("label", "Starter")),
        ("Axle", Record::new().with("chassisKey", 20).with("label", "Axle")),
        ("Frame", Record::new().with("chassisKey", 20).with("label", "Frame")),
    ];
    for (table, row) in rows {
        store.insert(table, row).unwrap();
    }

    let delays = [
        (root, 1),
        ("Engine", 15),
        ("Chassis", 5),
        ("Pump", 10),
        ("Starter", 1),
        ("Axle", 20),
        ("Frame", 2),
    ];
    let mut daos = Vec::new();
    for (table, millis) in delays {
        let dao = backend.dao(table).delay(Duration::from_millis(millis));
        daos.push(backend.register(table, dao));
    }
    (backend, daos)
}
