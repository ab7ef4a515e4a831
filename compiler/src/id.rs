// id.rs — Stable semantic identifiers for tally compiler phases
//
// These IDs give deterministic, span-independent identity to AST nodes,
// definitions, and type parameters. Every ID carries the compilation unit
// it belongs to, so tables from several units can be consulted side by side
// without collisions. Allocation is always in source order.

use std::cell::Cell;
use std::fmt;

/// A compilation unit. Unit 0 is the platform (built-ins and plugins).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(pub u16);

impl UnitId {
    pub const PLATFORM: UnitId = UnitId(0);
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "u{}", self.0)
    }
}

/// Stable identifier for an AST node (expression, statement, block,
/// parameter, or match case).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    pub unit: UnitId,
    pub index: u32,
}

/// Stable identifier for a top-level definition (record, function, object,
/// sum, built-in, or plugin).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DefId {
    pub unit: UnitId,
    pub index: u32,
}

impl fmt::Display for DefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.unit, self.index)
    }
}

/// Identity of a type parameter: its owning definition plus its position.
/// Two parameters of different definitions never compare equal, even when
/// they share a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeParamId {
    pub owner: DefId,
    pub index: u16,
}

/// Node ID source shared by the parser combinators.
///
/// Combinator closures only get shared references, so the counter lives in
/// a `Cell`. Backtracking may skip numbers; IDs stay unique and ordered.
#[derive(Debug)]
pub struct NodeIdSource {
    unit: UnitId,
    next: Cell<u32>,
}

impl NodeIdSource {
    pub fn new(unit: UnitId) -> Self {
        Self {
            unit,
            next: Cell::new(0),
        }
    }

    pub fn next(&self) -> NodeId {
        let index = self.next.get();
        self.next.set(index + 1);
        NodeId {
            unit: self.unit,
            index,
        }
    }

    pub fn unit(&self) -> UnitId {
        self.unit
    }
}

/// Allocator for definition IDs within one unit. Produces monotonically
/// increasing IDs in allocation (source) order.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    unit: UnitId,
    next_def: u32,
}

impl IdAllocator {
    pub fn new(unit: UnitId) -> Self {
        Self { unit, next_def: 0 }
    }

    pub fn alloc_def(&mut self) -> DefId {
        let id = DefId {
            unit: self.unit,
            index: self.next_def,
        };
        self.next_def += 1;
        id
    }

    pub fn unit(&self) -> UnitId {
        self.unit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ids_are_sequential_per_unit() {
        let ids = NodeIdSource::new(UnitId(3));
        let a = ids.next();
        let b = ids.next();
        assert_eq!(a.unit, UnitId(3));
        assert_eq!(b.index, a.index + 1);
        assert!(a < b);
    }

    #[test]
    fn def_ids_from_different_units_differ() {
        let mut a = IdAllocator::new(UnitId(1));
        let mut b = IdAllocator::new(UnitId(2));
        assert_ne!(a.alloc_def(), b.alloc_def());
    }
}
