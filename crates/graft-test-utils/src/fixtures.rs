//! Reusable node types, persistence and rule fixtures.
//!
//! - [`OrderTypes`]: an `Order` root type with a collection of `Line`
//!   items, each validated by common rules.
//! - [`PersistenceLog`]: handlers that record every persistence call and
//!   can be told to fail one operation.
//! - [`GatedRule`]: an asynchronous rule whose runs block until the test
//!   opens the gate for their input value.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use graft_core::{
    CollectionId, FactoryOperation, NodeId, PersistError, Property, PropertyId, PropertyReader,
    PropertySet, RuleFault, RuleId, Value,
};
use graft_engine::{FactoryContext, Graph, NodeType, NodeTypeBuilder};
use graft_rules::{NodeView, Range, Required, Rule, RuleMode, RuleOutcome};

/// Every factory operation, in declaration order.
pub const ALL_OPERATIONS: [FactoryOperation; 5] = [
    FactoryOperation::Create,
    FactoryOperation::Fetch,
    FactoryOperation::Insert,
    FactoryOperation::Update,
    FactoryOperation::Delete,
];

/// Records persistence calls made through its handlers.
#[derive(Clone, Default)]
pub struct PersistenceLog {
    calls: Arc<Mutex<Vec<(NodeId, FactoryOperation)>>>,
    failing: Arc<Mutex<Option<FactoryOperation>>>,
}

impl PersistenceLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded call, in order.
    pub fn calls(&self) -> Vec<(NodeId, FactoryOperation)> {
        self.calls.lock().unwrap().clone()
    }

    /// Recorded operations for one node.
    pub fn operations_for(&self, node: NodeId) -> Vec<FactoryOperation> {
        self.calls()
            .into_iter()
            .filter(|(n, _)| *n == node)
            .map(|(_, op)| op)
            .collect()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Make `operation` fail with a storage error until reset with `None`.
    pub fn fail_on(&self, operation: Option<FactoryOperation>) {
        *self.failing.lock().unwrap() = operation;
    }

    fn record(&self, ctx: &FactoryContext<'_>) -> Result<(), PersistError> {
        if *self.failing.lock().unwrap() == Some(ctx.operation()) {
            return Err(PersistError::Storage {
                reason: format!("{} refused by test", ctx.operation()),
            });
        }
        self.calls
            .lock()
            .unwrap()
            .push((ctx.node(), ctx.operation()));
        Ok(())
    }

    /// Register a recording handler for each of `operations`. The Fetch
    /// handler loads the criteria into `key` when it is text.
    pub fn install(
        &self,
        builder: &mut NodeTypeBuilder,
        operations: &[FactoryOperation],
        key: Property<String>,
    ) {
        for &operation in operations {
            let log = self.clone();
            builder.handler(operation, move |ctx| {
                log.record(ctx)?;
                if operation == FactoryOperation::Fetch {
                    if let Some(text) = ctx.criteria().and_then(Value::as_str).map(str::to_owned) {
                        ctx.load(key, text)?;
                    }
                }
                Ok(())
            });
        }
    }
}

/// `Order` roots holding `Line` items.
pub struct OrderTypes {
    pub order: Arc<NodeType>,
    pub line: Arc<NodeType>,
    /// Required.
    pub customer: Property<String>,
    /// Required.
    pub sku: Property<String>,
    /// Between 1 and 1000.
    pub quantity: Property<i64>,
    pub log: PersistenceLog,
}

impl OrderTypes {
    /// Both types with every handler registered.
    pub fn new() -> Self {
        Self::with_handlers(&ALL_OPERATIONS, &ALL_OPERATIONS)
    }

    /// Register only the listed handlers on each type.
    pub fn with_handlers(order_ops: &[FactoryOperation], line_ops: &[FactoryOperation]) -> Self {
        let log = PersistenceLog::new();

        let mut order = NodeType::builder("Order");
        let customer = order.property::<String>("customer");
        order.rule(Required::new(customer, "customer is required"));
        log.install(&mut order, order_ops, customer);

        let mut line = NodeType::builder("Line");
        let sku = line.property::<String>("sku");
        let quantity = line.property::<i64>("quantity");
        line.rule(Required::new(sku, "sku is required"));
        line.rule(Range::new(quantity, 1.0, 1000.0));
        log.install(&mut line, line_ops, sku);

        Self {
            order: order.build().expect("order type is valid"),
            line: line.build().expect("line type is valid"),
            customer,
            sku,
            quantity,
            log,
        }
    }

    /// A valid new order with a `lines` collection.
    pub fn new_order(&self, graph: &mut Graph, customer: &str) -> (NodeId, CollectionId) {
        let order = graph.create(&self.order).unwrap();
        graph.set(order, self.customer, customer.to_owned()).unwrap();
        let lines = graph.new_collection(order).unwrap();
        (order, lines)
    }

    /// A valid new line, not yet attached.
    pub fn new_line(&self, graph: &mut Graph, sku: &str, quantity: i64) -> NodeId {
        let line = graph.create(&self.line).unwrap();
        graph.set(line, self.sku, sku.to_owned()).unwrap();
        graph.set(line, self.quantity, quantity).unwrap();
        line
    }

    /// A persisted order with `count` persisted lines, all clean.
    pub fn persisted_order(&self, graph: &mut Graph, count: usize) -> (NodeId, CollectionId, Vec<NodeId>) {
        let order = graph.fetch(&self.order, "ACME").unwrap();
        let lines = graph.new_collection(order).unwrap();
        let items = (0..count)
            .map(|i| {
                let line = graph.fetch_into(lines, &self.line, format!("SKU-{i}")).unwrap();
                graph.set(line, self.quantity, 1).unwrap();
                line
            })
            .collect();
        graph.mark_unmodified(order).unwrap();
        self.log.clear();
        (order, lines, items)
    }
}

impl Default for OrderTypes {
    fn default() -> Self {
        Self::new()
    }
}

/// Lets [`GatedRule`] runs proceed per input value.
#[derive(Default)]
pub struct Gate {
    open: Mutex<HashSet<i64>>,
    changed: Condvar,
    started: AtomicUsize,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::default()
    }

    /// Let runs for `value` finish.
    pub fn release(&self, value: i64) {
        self.open.lock().unwrap().insert(value);
        self.changed.notify_all();
    }

    /// Runs that have entered the rule body.
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Spin until `count` runs have started, or a few seconds pass.
    pub fn wait_started(&self, count: usize) -> bool {
        let deadline = Instant::now() + Duration::from_secs(10);
        while self.started() < count {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        true
    }

    fn wait(&self, value: i64) {
        self.started.fetch_add(1, Ordering::SeqCst);
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut open = self.open.lock().unwrap();
        while !open.contains(&value) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return;
            }
            open = self.changed.wait_timeout(open, remaining).unwrap().0;
        }
    }
}

/// Asynchronous rule writing `input * 10` to `output` once the gate
/// opens for the input value.
pub struct GatedRule {
    id: RuleId,
    input: PropertyId,
    output: PropertyId,
    gate: Arc<Gate>,
}

impl GatedRule {
    pub fn new(input: Property<i64>, output: Property<i64>, gate: Arc<Gate>) -> Self {
        Self {
            id: RuleId::new("gated"),
            input: input.id(),
            output: output.id(),
            gate,
        }
    }
}

impl Rule for GatedRule {
    fn id(&self) -> &RuleId {
        &self.id
    }

    fn triggers(&self) -> PropertySet {
        [self.input].into_iter().collect()
    }

    fn affects(&self) -> PropertySet {
        [self.output].into_iter().collect()
    }

    fn mode(&self) -> RuleMode {
        RuleMode::Async
    }

    fn execute(&self, view: &NodeView) -> Result<RuleOutcome, RuleFault> {
        let value = view
            .read(self.input)
            .and_then(|v| match v {
                Value::Int(i) => Some(*i),
                _ => None,
            })
            .unwrap_or_default();
        self.gate.wait(value);
        Ok(RuleOutcome::new().write(self.output, Value::Int(value * 10)))
    }
}
