//! Atomic operations over block-local unit indices.

use std::collections::BTreeSet;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::core::IrError;
use crate::util::serde::{OperationId, UnitIndex};

static NEXT_OPERATION_ID: AtomicU64 = AtomicU64::new(1);

fn next_operation_id() -> OperationId {
    NEXT_OPERATION_ID.fetch_add(1, Ordering::Relaxed)
}

const fn unit_depth() -> NonZeroU32 {
    NonZeroU32::MIN
}

/// Arity class of an operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationClass {
    /// Acts on one unit.
    SingleUnit,
    /// Acts on two units.
    TwoUnit,
    /// Acts on three units.
    ThreeUnit,
    /// Collapses unit state; has no inverse.
    IrreversibleTerminal,
}

/// Every operation the IR knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Pauli X.
    X,
    /// Pauli Y.
    Y,
    /// Pauli Z.
    Z,
    /// Hadamard.
    H,
    /// Phase (quarter turn).
    S,
    /// Inverse of `S`.
    Sdg,
    /// Eighth turn. High cost.
    T,
    /// Inverse of `T`. High cost.
    Tdg,
    /// X rotation by one angle.
    Rx,
    /// Y rotation by one angle.
    Ry,
    /// Z rotation by one angle.
    Rz,
    /// Phase shift by one angle.
    Phase,
    /// Controlled NOT.
    Cnot,
    /// Controlled Z.
    Cz,
    /// Exchange two units.
    Swap,
    /// Controlled phase shift by one angle.
    ControlledPhase,
    /// Doubly controlled NOT.
    Toffoli,
    /// Controlled swap.
    Fredkin,
    /// Doubly controlled Z.
    Ccz,
    /// Read out a unit.
    Measure,
    /// Force a unit back to its ground state.
    Reset,
}

impl OperationKind {
    /// Arity class.
    pub const fn class(self) -> OperationClass {
        match self {
            Self::X
            | Self::Y
            | Self::Z
            | Self::H
            | Self::S
            | Self::Sdg
            | Self::T
            | Self::Tdg
            | Self::Rx
            | Self::Ry
            | Self::Rz
            | Self::Phase => OperationClass::SingleUnit,
            Self::Cnot | Self::Cz | Self::Swap | Self::ControlledPhase => OperationClass::TwoUnit,
            Self::Toffoli | Self::Fredkin | Self::Ccz => OperationClass::ThreeUnit,
            Self::Measure | Self::Reset => OperationClass::IrreversibleTerminal,
        }
    }

    /// Number of distinct targets the kind requires.
    pub const fn arity(self) -> usize {
        match self.class() {
            OperationClass::SingleUnit | OperationClass::IrreversibleTerminal => 1,
            OperationClass::TwoUnit => 2,
            OperationClass::ThreeUnit => 3,
        }
    }

    /// Number of numeric parameters the kind requires.
    pub const fn parameter_count(self) -> usize {
        match self {
            Self::Rx | Self::Ry | Self::Rz | Self::Phase | Self::ControlledPhase => 1,
            _ => 0,
        }
    }

    /// Whether the kind takes parameters.
    pub const fn is_parameterized(self) -> bool {
        self.parameter_count() > 0
    }

    /// Whether the kind dominates execution cost and is counted separately.
    pub const fn is_high_cost(self) -> bool {
        matches!(self, Self::T | Self::Tdg)
    }

    /// Whether the kind is irreversible-terminal.
    pub const fn is_terminal(self) -> bool {
        matches!(self.class(), OperationClass::IrreversibleTerminal)
    }

    /// Kind implementing the inverse. Parameterized kinds keep their kind and
    /// negate their parameters. `None` for kinds with no inverse.
    pub const fn inverse(self) -> Option<Self> {
        match self {
            Self::S => Some(Self::Sdg),
            Self::Sdg => Some(Self::S),
            Self::T => Some(Self::Tdg),
            Self::Tdg => Some(Self::T),
            Self::Measure | Self::Reset => None,
            other => Some(other),
        }
    }

    /// Short display name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::X => "X",
            Self::Y => "Y",
            Self::Z => "Z",
            Self::H => "H",
            Self::S => "S",
            Self::Sdg => "Sdg",
            Self::T => "T",
            Self::Tdg => "Tdg",
            Self::Rx => "Rx",
            Self::Ry => "Ry",
            Self::Rz => "Rz",
            Self::Phase => "P",
            Self::Cnot => "CNOT",
            Self::Cz => "CZ",
            Self::Swap => "SWAP",
            Self::ControlledPhase => "CP",
            Self::Toffoli => "Toffoli",
            Self::Fredkin => "Fredkin",
            Self::Ccz => "CCZ",
            Self::Measure => "M",
            Self::Reset => "Reset",
        }
    }
}

/// Immutable record of one action on one or more units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(default = "next_operation_id")]
    id: OperationId,
    kind: OperationKind,
    targets: Vec<UnitIndex>,
    #[serde(default)]
    parameters: Vec<f64>,
    #[serde(default = "unit_depth")]
    depth_contribution: NonZeroU32,
}

impl Operation {
    /// Build an operation, checking target arity and parameter count.
    pub fn new(
        kind: OperationKind,
        targets: Vec<UnitIndex>,
        parameters: Vec<f64>,
    ) -> Result<Self, IrError> {
        let op = Self::unchecked(kind, targets, parameters);
        match op.structural_violations().into_iter().next() {
            Some(err) => Err(err),
            None => Ok(op),
        }
    }

    /// Build without checks; used by the fixed-shape constructors below.
    fn unchecked(kind: OperationKind, targets: Vec<UnitIndex>, parameters: Vec<f64>) -> Self {
        Self {
            id: next_operation_id(),
            kind,
            targets,
            parameters,
            depth_contribution: unit_depth(),
        }
    }

    /// Override the depth this operation adds to its block.
    #[must_use]
    pub fn with_depth_contribution(mut self, depth: NonZeroU32) -> Self {
        self.depth_contribution = depth;
        self
    }

    /// Operation id.
    pub const fn id(&self) -> OperationId {
        self.id
    }

    /// Operation kind.
    pub const fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Ordered target indices.
    pub fn targets(&self) -> &[UnitIndex] {
        &self.targets
    }

    /// Numeric parameters.
    pub fn parameters(&self) -> &[f64] {
        &self.parameters
    }

    /// Depth added to the enclosing block.
    pub const fn depth_contribution(&self) -> u32 {
        self.depth_contribution.get()
    }

    /// De-duplicated target set.
    pub fn distinct_targets(&self) -> BTreeSet<UnitIndex> {
        self.targets.iter().copied().collect()
    }

    /// Whether an inverse exists for this operation.
    pub const fn is_invertible(&self) -> bool {
        self.kind.inverse().is_some()
    }

    /// The operation undoing this one, with a fresh id.
    pub fn inverse(&self) -> Option<Self> {
        let kind = self.kind.inverse()?;
        Some(Self {
            id: next_operation_id(),
            kind,
            targets: self.targets.clone(),
            parameters: self.parameters.iter().map(|p| -p).collect(),
            depth_contribution: self.depth_contribution,
        })
    }

    /// Copy with every target passed through `map`. Keeps the id.
    pub fn remapped(&self, map: &dyn Fn(UnitIndex) -> UnitIndex) -> Self {
        Self {
            targets: self.targets.iter().map(|&t| map(t)).collect(),
            ..self.clone()
        }
    }

    /// Arity and parameter-count violations, independent of any index bound.
    pub fn structural_violations(&self) -> Vec<IrError> {
        let mut violations = Vec::new();
        let distinct = self.distinct_targets().len();
        if self.targets.len() != self.kind.arity() || distinct != self.kind.arity() {
            violations.push(IrError::ArityMismatch {
                operation: self.id,
                kind: self.kind,
                expected: self.kind.arity(),
                actual: distinct,
            });
        }
        if self.parameters.len() != self.kind.parameter_count() {
            violations.push(IrError::ParameterCountMismatch {
                operation: self.id,
                kind: self.kind,
                expected: self.kind.parameter_count(),
                actual: self.parameters.len(),
            });
        }
        violations
    }
}

/// Pauli X on `unit`.
pub fn x(unit: UnitIndex) -> Operation {
    Operation::unchecked(OperationKind::X, vec![unit], Vec::new())
}

/// Pauli Y on `unit`.
pub fn y(unit: UnitIndex) -> Operation {
    Operation::unchecked(OperationKind::Y, vec![unit], Vec::new())
}

/// Pauli Z on `unit`.
pub fn z(unit: UnitIndex) -> Operation {
    Operation::unchecked(OperationKind::Z, vec![unit], Vec::new())
}

/// Hadamard on `unit`.
pub fn h(unit: UnitIndex) -> Operation {
    Operation::unchecked(OperationKind::H, vec![unit], Vec::new())
}

/// `S` on `unit`.
pub fn s(unit: UnitIndex) -> Operation {
    Operation::unchecked(OperationKind::S, vec![unit], Vec::new())
}

/// High-cost `T` on `unit`.
pub fn t(unit: UnitIndex) -> Operation {
    Operation::unchecked(OperationKind::T, vec![unit], Vec::new())
}

/// X rotation by `theta`.
pub fn rx(unit: UnitIndex, theta: f64) -> Operation {
    Operation::unchecked(OperationKind::Rx, vec![unit], vec![theta])
}

/// Y rotation by `theta`.
pub fn ry(unit: UnitIndex, theta: f64) -> Operation {
    Operation::unchecked(OperationKind::Ry, vec![unit], vec![theta])
}

/// Z rotation by `theta`.
pub fn rz(unit: UnitIndex, theta: f64) -> Operation {
    Operation::unchecked(OperationKind::Rz, vec![unit], vec![theta])
}

/// Controlled NOT. Duplicate indices are reported by block validation.
pub fn cnot(control: UnitIndex, target: UnitIndex) -> Operation {
    Operation::unchecked(OperationKind::Cnot, vec![control, target], Vec::new())
}

/// Controlled Z.
pub fn cz(control: UnitIndex, target: UnitIndex) -> Operation {
    Operation::unchecked(OperationKind::Cz, vec![control, target], Vec::new())
}

/// Swap two units.
pub fn swap(a: UnitIndex, b: UnitIndex) -> Operation {
    Operation::unchecked(OperationKind::Swap, vec![a, b], Vec::new())
}

/// Controlled phase by `phi`.
pub fn cphase(control: UnitIndex, target: UnitIndex, phi: f64) -> Operation {
    Operation::unchecked(OperationKind::ControlledPhase, vec![control, target], vec![phi])
}

/// Toffoli with two controls.
pub fn toffoli(c1: UnitIndex, c2: UnitIndex, target: UnitIndex) -> Operation {
    Operation::unchecked(OperationKind::Toffoli, vec![c1, c2, target], Vec::new())
}

/// Measure `unit`. Irreversible.
pub fn measure(unit: UnitIndex) -> Operation {
    Operation::unchecked(OperationKind::Measure, vec![unit], Vec::new())
}

/// Reset `unit`. Irreversible.
pub fn reset(unit: UnitIndex) -> Operation {
    Operation::unchecked(OperationKind::Reset, vec![unit], Vec::new())
}
