//! Composable, immutable operation blocks.
//!
//! A block is an ordered list of items, each either an [`Operation`] or a
//! reference to a nested sub-block plus the map from the child's local unit
//! indices to parent-scope indices. Nested blocks are shared through
//! [`Arc`], so reusing one sub-block across many parents or jobs costs a
//! reference count, not a copy.
//!
//! Every composition operator returns a new block. The aggregate
//! [`ResourceCost`], the reversibility flag and the touched-unit set are
//! derived while items are pushed and are never set directly, including on
//! deserialization.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::operation::{cnot, h, measure};
use crate::core::{IrError, Operation};
use crate::util::serde::UnitIndex;

/// Aggregate cost of a block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceCost {
    /// Operations, nested ones included.
    pub operation_count: usize,
    /// Operations of a high-cost kind.
    pub high_cost_operation_count: usize,
    /// Sum of depth contributions in insertion order.
    pub depth_estimate: u64,
    /// Distinct units touched.
    pub unit_count: usize,
    /// Irreversible-terminal operations.
    pub terminal_operation_count: usize,
}

/// A sub-block embedded by reference.
#[derive(Debug, Clone, PartialEq)]
pub struct NestedBlock {
    block: Arc<OperationBlock>,
    unit_map: BTreeMap<UnitIndex, UnitIndex>,
    depth_offset: u64,
}

impl NestedBlock {
    /// The embedded block.
    pub fn block(&self) -> &Arc<OperationBlock> {
        &self.block
    }

    /// Child-local index to parent-scope index.
    pub const fn unit_map(&self) -> &BTreeMap<UnitIndex, UnitIndex> {
        &self.unit_map
    }

    /// Parent depth at the point of nesting.
    pub const fn depth_offset(&self) -> u64 {
        self.depth_offset
    }

    /// Resolve a child-local index. Unmapped indices pass through unchanged.
    pub fn map_index(&self, local: UnitIndex) -> UnitIndex {
        self.unit_map.get(&local).copied().unwrap_or(local)
    }
}

/// One entry of a block, in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockItem {
    /// A directly contained operation.
    Operation {
        /// The operation.
        operation: Operation,
        /// Block depth before this operation.
        depth_offset: u64,
    },
    /// A referenced sub-block.
    Nested(NestedBlock),
}

/// Immutable intermediate representation of an operation sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "BlockRepr", from = "BlockRepr")]
pub struct OperationBlock {
    name: String,
    items: Vec<BlockItem>,
    cost: ResourceCost,
    is_reversible: bool,
    unit_ids: BTreeSet<UnitIndex>,
}

impl OperationBlock {
    /// Zero-cost, reversible, empty block.
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Vec::new(),
            cost: ResourceCost::default(),
            is_reversible: true,
            unit_ids: BTreeSet::new(),
        }
    }

    /// Build a block from a sequence of operations.
    pub fn from_operations(
        name: impl Into<String>,
        operations: impl IntoIterator<Item = Operation>,
    ) -> Self {
        let mut block = Self::empty(name);
        for op in operations {
            block.push_operation(op);
        }
        block
    }

    /// Block name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Aggregate cost.
    pub const fn cost(&self) -> &ResourceCost {
        &self.cost
    }

    /// True iff no contained or nested operation is irreversible-terminal.
    pub const fn is_reversible(&self) -> bool {
        self.is_reversible
    }

    /// Distinct block-local unit indices touched, nested blocks included.
    pub const fn unit_ids(&self) -> &BTreeSet<UnitIndex> {
        &self.unit_ids
    }

    /// All items in insertion order.
    pub fn items(&self) -> &[BlockItem] {
        &self.items
    }

    /// Directly contained operations, nested blocks excluded.
    pub fn instructions(&self) -> impl Iterator<Item = &Operation> {
        self.items.iter().filter_map(|item| match item {
            BlockItem::Operation { operation, .. } => Some(operation),
            BlockItem::Nested(_) => None,
        })
    }

    /// Nested sub-blocks.
    pub fn nested(&self) -> impl Iterator<Item = &NestedBlock> {
        self.items.iter().filter_map(|item| match item {
            BlockItem::Nested(nested) => Some(nested),
            BlockItem::Operation { .. } => None,
        })
    }

    /// Whether the block has no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Same block under a new name.
    #[must_use]
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    /// New block with `operation` appended.
    #[must_use]
    pub fn append(&self, operation: Operation) -> Self {
        let mut block = self.clone();
        block.push_operation(operation);
        block
    }

    /// `self` followed by `next`. Items of `next` are re-placed after the
    /// whole depth of `self`.
    #[must_use]
    pub fn combine_sequential(&self, next: &Self) -> Self {
        let mut block = self.renamed(format!("{}+{}", self.name, next.name));
        for item in &next.items {
            match item {
                BlockItem::Operation { operation, .. } => block.push_operation(operation.clone()),
                BlockItem::Nested(nested) => {
                    block.push_nested(Arc::clone(&nested.block), nested.unit_map.clone());
                }
            }
        }
        block
    }

    /// Embed `child` by reference, mapping its local indices into this
    /// block's scope through `unit_map`.
    #[must_use]
    pub fn nest(
        &self,
        child: impl Into<Arc<Self>>,
        unit_map: BTreeMap<UnitIndex, UnitIndex>,
    ) -> Self {
        let mut block = self.clone();
        block.push_nested(child.into(), unit_map);
        block
    }

    /// The block undoing this one: items reversed, each replaced by its
    /// inverse, nested blocks inverted in place under the same unit map.
    pub fn generate_inverse(&self) -> Result<Self, IrError> {
        if !self.is_reversible {
            return Err(IrError::NotReversible(self.name.clone()));
        }
        let mut block = Self::empty(format!("{}_inverse", self.name));
        for item in self.items.iter().rev() {
            match item {
                BlockItem::Operation { operation, .. } => {
                    let inverse = operation
                        .inverse()
                        .ok_or_else(|| IrError::NotReversible(self.name.clone()))?;
                    block.push_operation(inverse);
                }
                BlockItem::Nested(nested) => {
                    let inverse = nested.block.generate_inverse()?;
                    block.push_nested(Arc::new(inverse), nested.unit_map.clone());
                }
            }
        }
        Ok(block)
    }

    /// `prepare⁻¹ · target · prepare`: run `target` in the basis `prepare`
    /// sets up.
    pub fn conjugate(prepare: &Self, target: &Self) -> Result<Self, IrError> {
        let block = prepare
            .generate_inverse()?
            .combine_sequential(target)
            .combine_sequential(prepare);
        Ok(block.renamed(format!("conj({}, {})", prepare.name, target.name)))
    }

    /// Every structural violation, nested blocks included. Indices of nested
    /// operations are checked after mapping into this block's scope.
    pub fn validate(&self, max_unit_index: UnitIndex) -> Vec<IrError> {
        let mut violations = Vec::new();
        self.collect_violations(&|i| i, max_unit_index, &mut violations);
        violations
    }

    /// All operations in execution order with nested blocks resolved into
    /// this block's index scope.
    pub fn flatten(&self) -> Vec<Operation> {
        let mut out = Vec::with_capacity(self.cost.operation_count);
        self.flatten_into(&|i| i, &mut out);
        out
    }

    /// Number of operations each unit index receives.
    pub fn operations_per_unit(&self) -> BTreeMap<UnitIndex, u64> {
        let mut counts = BTreeMap::new();
        for op in self.flatten() {
            for target in op.distinct_targets() {
                *counts.entry(target).or_insert(0) += 1;
            }
        }
        counts
    }

    fn push_operation(&mut self, operation: Operation) {
        let kind = operation.kind();
        self.cost.operation_count += 1;
        if kind.is_high_cost() {
            self.cost.high_cost_operation_count += 1;
        }
        if kind.is_terminal() {
            self.cost.terminal_operation_count += 1;
        }
        self.is_reversible &= operation.is_invertible();
        self.unit_ids.extend(operation.targets().iter().copied());
        self.cost.unit_count = self.unit_ids.len();
        let depth_offset = self.cost.depth_estimate;
        self.cost.depth_estimate += u64::from(operation.depth_contribution());
        self.items.push(BlockItem::Operation {
            operation,
            depth_offset,
        });
    }

    fn push_nested(&mut self, block: Arc<Self>, unit_map: BTreeMap<UnitIndex, UnitIndex>) {
        let nested = NestedBlock {
            block,
            unit_map,
            depth_offset: self.cost.depth_estimate,
        };
        let child = nested.block.cost;
        self.cost.operation_count += child.operation_count;
        self.cost.high_cost_operation_count += child.high_cost_operation_count;
        self.cost.terminal_operation_count += child.terminal_operation_count;
        self.cost.depth_estimate += child.depth_estimate;
        self.is_reversible &= nested.block.is_reversible;
        let mapped: Vec<UnitIndex> = nested
            .block
            .unit_ids
            .iter()
            .map(|&i| nested.map_index(i))
            .collect();
        self.unit_ids.extend(mapped);
        self.cost.unit_count = self.unit_ids.len();
        self.items.push(BlockItem::Nested(nested));
    }

    fn collect_violations(
        &self,
        map: &dyn Fn(UnitIndex) -> UnitIndex,
        max_unit_index: UnitIndex,
        out: &mut Vec<IrError>,
    ) {
        for item in &self.items {
            match item {
                BlockItem::Operation { operation, .. } => {
                    out.extend(operation.structural_violations());
                    for &target in operation.targets() {
                        let index = map(target);
                        if index > max_unit_index {
                            out.push(IrError::OutOfRangeUnitIndex {
                                operation: operation.id(),
                                index,
                                max: max_unit_index,
                            });
                        }
                    }
                }
                BlockItem::Nested(nested) => {
                    let composed = |i| map(nested.map_index(i));
                    nested.block.collect_violations(&composed, max_unit_index, out);
                }
            }
        }
    }

    fn flatten_into(&self, map: &dyn Fn(UnitIndex) -> UnitIndex, out: &mut Vec<Operation>) {
        for item in &self.items {
            match item {
                BlockItem::Operation { operation, .. } => out.push(operation.remapped(map)),
                BlockItem::Nested(nested) => {
                    let composed = |i| map(nested.map_index(i));
                    nested.block.flatten_into(&composed, out);
                }
            }
        }
    }
}

/// Serialized shape of a block: only the items. Cost, reversibility and the
/// unit set are recomputed on load.
#[derive(Serialize, Deserialize)]
struct BlockRepr {
    name: String,
    items: Vec<ItemRepr>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ItemRepr {
    Operation(Operation),
    Nested {
        block: Arc<OperationBlock>,
        #[serde(default)]
        unit_map: BTreeMap<UnitIndex, UnitIndex>,
    },
}

impl From<OperationBlock> for BlockRepr {
    fn from(block: OperationBlock) -> Self {
        let items = block
            .items
            .into_iter()
            .map(|item| match item {
                BlockItem::Operation { operation, .. } => ItemRepr::Operation(operation),
                BlockItem::Nested(nested) => ItemRepr::Nested {
                    block: nested.block,
                    unit_map: nested.unit_map,
                },
            })
            .collect();
        Self {
            name: block.name,
            items,
        }
    }
}

impl From<BlockRepr> for OperationBlock {
    fn from(repr: BlockRepr) -> Self {
        let mut block = Self::empty(repr.name);
        for item in repr.items {
            match item {
                ItemRepr::Operation(operation) => block.push_operation(operation),
                ItemRepr::Nested { block: child, unit_map } => block.push_nested(child, unit_map),
            }
        }
        block
    }
}

/// Two-unit entangling block: `H(0)`, `CNOT(0, 1)`.
pub fn bell_pair() -> OperationBlock {
    OperationBlock::from_operations("bell_pair", [h(0), cnot(0, 1)])
}

/// `n`-unit GHZ preparation: `H(0)` then a `CNOT` chain. Empty for `n == 0`.
pub fn ghz(n: UnitIndex) -> OperationBlock {
    let mut block = OperationBlock::empty(format!("ghz_{n}"));
    if n == 0 {
        return block;
    }
    block.push_operation(h(0));
    for i in 1..n {
        block.push_operation(cnot(i - 1, i));
    }
    block
}

/// Measure units `0..n`.
pub fn measure_all(n: UnitIndex) -> OperationBlock {
    OperationBlock::from_operations(format!("measure_{n}"), (0..n).map(measure))
}
