// value.rs — Run-time values and run-time errors
//
// Collections carry their live Fin bound and a mutability flag. Every
// mutation checks both: a mutation that would exceed the bound fails at
// exactly that insertion, and mutating a read-only value fails regardless
// of what the checker proved.
//
// Preconditions: bounds were recovered from the value's instantiation.
// Postconditions: a collection never holds more elements than its bound.
// Failure modes: `RuntimeError::{FinViolation, ImmutableViolation, ...}`.
// Side effects: interior mutation of shared collections and record fields.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::eval::Env;
use crate::id::{DefId, NodeId};
use crate::subst::Substitution;

// ── Errors ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("Fin violation: {kind} bounded by {bound} cannot hold {count} elements")]
    FinViolation {
        kind: &'static str,
        bound: u64,
        count: usize,
    },
    #[error("immutable violation: cannot {operation} a read-only {kind}")]
    ImmutableViolation {
        kind: &'static str,
        operation: &'static str,
    },
    #[error("decimal operation has no finite result")]
    NonFiniteDecimal,
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow in '{0}'")]
    IntegerOverflow(&'static str),
    #[error("index {index} out of bounds for size {size}")]
    IndexOutOfBounds { index: i64, size: usize },
    #[error("key {0} not found")]
    KeyNotFound(String),
    #[error("cost over limit: {cost} exceeds {limit}")]
    CostLimitExceeded { cost: u64, limit: u64 },
    #[error("plugin '{name}' failed: {message}")]
    Plugin { name: String, message: String },
    #[error("type system bug: {0}")]
    TypeSystemBug(String),
}

pub fn bug(message: impl Into<String>) -> RuntimeError {
    RuntimeError::TypeSystemBug(message.into())
}

// ── Values ─────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum Closure {
    /// A lambda with the environment it was evaluated in.
    Lambda {
        node: NodeId,
        env: Env,
        subst: Rc<Substitution>,
    },
    /// A reference to a top-level function.
    Function(DefId),
}

#[derive(Debug)]
pub struct RecordValue {
    pub def: DefId,
    pub name: Rc<str>,
    pub field_names: Vec<Rc<str>>,
    pub fields: RefCell<Vec<Value>>,
    /// Concrete arguments of the record's type parameters.
    pub subst: Substitution,
}

#[derive(Debug, Clone)]
pub struct Collection {
    pub elements: Vec<Value>,
    pub bound: u64,
    pub mutable: bool,
}

#[derive(Debug, Clone)]
pub struct DictValue {
    pub entries: Vec<(Value, Value)>,
    pub bound: u64,
    pub mutable: bool,
}

#[derive(Debug, Clone)]
pub enum Value {
    Unit,
    Boolean(bool),
    Int(i64),
    Decimal(Decimal),
    Char(char),
    String(Rc<str>),
    Function(Rc<Closure>),
    Object { def: DefId, name: Rc<str> },
    Record(Rc<RecordValue>),
    List(Rc<RefCell<Collection>>),
    Set(Rc<RefCell<Collection>>),
    Dictionary(Rc<RefCell<DictValue>>),
}

fn check_room(kind: &'static str, bound: u64, len: usize) -> Result<(), RuntimeError> {
    if (len as u64) < bound {
        Ok(())
    } else {
        Err(RuntimeError::FinViolation {
            kind,
            bound,
            count: len + 1,
        })
    }
}

fn check_mutable(mutable: bool, kind: &'static str, operation: &'static str) -> Result<(), RuntimeError> {
    if mutable {
        Ok(())
    } else {
        Err(RuntimeError::ImmutableViolation { kind, operation })
    }
}

/// Digits a decimal prints with, sign and point excluded.
pub fn decimal_digits(d: &Decimal) -> u64 {
    d.to_string().chars().filter(char::is_ascii_digit).count() as u64
}

/// Round `d` to at most `bound` printed digits by dropping fractional
/// digits. Fails when the integer part alone needs more.
pub fn fit_decimal(d: Decimal, bound: u64) -> Result<Decimal, RuntimeError> {
    let count = decimal_digits(&d);
    if count <= bound {
        return Ok(d);
    }
    let violation = RuntimeError::FinViolation {
        kind: "decimal",
        bound,
        count: count as usize,
    };
    let whole = decimal_digits(&d.trunc());
    if whole > bound {
        return Err(violation);
    }
    let places = u32::try_from(bound - whole).unwrap_or(u32::MAX);
    let rounded = d.round_dp(places).normalize();
    if decimal_digits(&rounded) <= bound {
        Ok(rounded)
    } else {
        Err(violation)
    }
}

impl Value {
    pub fn list(elements: Vec<Value>, bound: u64, mutable: bool) -> Result<Value, RuntimeError> {
        if elements.len() as u64 > bound {
            return Err(RuntimeError::FinViolation {
                kind: "list",
                bound,
                count: elements.len(),
            });
        }
        Ok(Value::List(Rc::new(RefCell::new(Collection {
            elements,
            bound,
            mutable,
        }))))
    }

    /// Duplicates collapse before the bound is checked.
    pub fn set(elements: Vec<Value>, bound: u64, mutable: bool) -> Result<Value, RuntimeError> {
        let mut unique: Vec<Value> = Vec::with_capacity(elements.len());
        for e in elements {
            if !unique.contains(&e) {
                unique.push(e);
            }
        }
        if unique.len() as u64 > bound {
            return Err(RuntimeError::FinViolation {
                kind: "set",
                bound,
                count: unique.len(),
            });
        }
        Ok(Value::Set(Rc::new(RefCell::new(Collection {
            elements: unique,
            bound,
            mutable,
        }))))
    }

    /// Later entries overwrite earlier ones with an equal key.
    pub fn dictionary(
        pairs: Vec<(Value, Value)>,
        bound: u64,
        mutable: bool,
    ) -> Result<Value, RuntimeError> {
        let mut entries: Vec<(Value, Value)> = Vec::with_capacity(pairs.len());
        for (k, v) in pairs {
            match entries.iter_mut().find(|(existing, _)| *existing == k) {
                Some(slot) => slot.1 = v,
                None => entries.push((k, v)),
            }
        }
        if entries.len() as u64 > bound {
            return Err(RuntimeError::FinViolation {
                kind: "dictionary",
                bound,
                count: entries.len(),
            });
        }
        Ok(Value::Dictionary(Rc::new(RefCell::new(DictValue {
            entries,
            bound,
            mutable,
        }))))
    }

    pub fn string(s: impl Into<Rc<str>>) -> Value {
        Value::String(s.into())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Unit => "Unit",
            Value::Boolean(_) => "Boolean",
            Value::Int(_) => "Int",
            Value::Decimal(_) => "Decimal",
            Value::Char(_) => "Char",
            Value::String(_) => "String",
            Value::Function(_) => "function",
            Value::Object { .. } => "object",
            Value::Record(_) => "record",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Dictionary(_) => "dictionary",
        }
    }

    pub fn as_int(&self) -> Result<i64, RuntimeError> {
        match self {
            Value::Int(n) => Ok(*n),
            other => Err(bug(format!("expected Int, found {}", other.type_name()))),
        }
    }

    pub fn as_bool(&self) -> Result<bool, RuntimeError> {
        match self {
            Value::Boolean(b) => Ok(*b),
            other => Err(bug(format!("expected Boolean, found {}", other.type_name()))),
        }
    }

    pub fn is_mutable(&self) -> bool {
        match self {
            Value::List(c) | Value::Set(c) => c.borrow().mutable,
            Value::Dictionary(d) => d.borrow().mutable,
            _ => false,
        }
    }

    /// Elements in iteration order. Dictionaries yield `Pair`-shaped keys
    /// only through `entries`, so they are rejected here.
    pub fn elements(&self) -> Result<Vec<Value>, RuntimeError> {
        match self {
            Value::List(c) | Value::Set(c) => Ok(c.borrow().elements.clone()),
            other => Err(bug(format!("cannot iterate {}", other.type_name()))),
        }
    }

    /// Fails when the value holds more than `bound` elements, characters or
    /// digits. Values without a Fin measure always pass.
    pub fn check_bound(&self, bound: u64) -> Result<(), RuntimeError> {
        let (kind, count) = match self {
            Value::List(c) => ("list", c.borrow().elements.len()),
            Value::Set(c) => ("set", c.borrow().elements.len()),
            Value::Dictionary(d) => ("dictionary", d.borrow().entries.len()),
            Value::String(s) => ("string", s.chars().count()),
            Value::Decimal(d) => ("decimal", decimal_digits(d) as usize),
            _ => return Ok(()),
        };
        if count as u64 > bound {
            Err(RuntimeError::FinViolation { kind, bound, count })
        } else {
            Ok(())
        }
    }

    pub fn size(&self) -> Result<usize, RuntimeError> {
        match self {
            Value::List(c) | Value::Set(c) => Ok(c.borrow().elements.len()),
            Value::Dictionary(d) => Ok(d.borrow().entries.len()),
            Value::String(s) => Ok(s.chars().count()),
            other => Err(bug(format!("{} has no size", other.type_name()))),
        }
    }

    // ── Mutation ──

    pub fn add(&self, item: Value) -> Result<(), RuntimeError> {
        match self {
            Value::List(c) => {
                let mut c = c.borrow_mut();
                check_mutable(c.mutable, "list", "add to")?;
                check_room("list", c.bound, c.elements.len())?;
                c.elements.push(item);
                Ok(())
            }
            Value::Set(c) => {
                let mut c = c.borrow_mut();
                check_mutable(c.mutable, "set", "add to")?;
                if c.elements.contains(&item) {
                    return Ok(());
                }
                check_room("set", c.bound, c.elements.len())?;
                c.elements.push(item);
                Ok(())
            }
            other => Err(bug(format!("cannot add to {}", other.type_name()))),
        }
    }

    pub fn set_at(&self, index: i64, item: Value) -> Result<(), RuntimeError> {
        match self {
            Value::List(c) => {
                let mut c = c.borrow_mut();
                check_mutable(c.mutable, "list", "update")?;
                let size = c.elements.len();
                let slot = usize::try_from(index)
                    .ok()
                    .and_then(|i| c.elements.get_mut(i))
                    .ok_or(RuntimeError::IndexOutOfBounds { index, size })?;
                *slot = item;
                Ok(())
            }
            other => Err(bug(format!("cannot index into {}", other.type_name()))),
        }
    }

    pub fn remove_at(&self, index: i64) -> Result<(), RuntimeError> {
        match self {
            Value::List(c) => {
                let mut c = c.borrow_mut();
                check_mutable(c.mutable, "list", "remove from")?;
                let size = c.elements.len();
                match usize::try_from(index) {
                    Ok(i) if i < size => {
                        c.elements.remove(i);
                        Ok(())
                    }
                    _ => Err(RuntimeError::IndexOutOfBounds { index, size }),
                }
            }
            other => Err(bug(format!("cannot remove from {}", other.type_name()))),
        }
    }

    pub fn remove(&self, key: &Value) -> Result<(), RuntimeError> {
        match self {
            Value::Set(c) => {
                let mut c = c.borrow_mut();
                check_mutable(c.mutable, "set", "remove from")?;
                c.elements.retain(|e| e != key);
                Ok(())
            }
            Value::Dictionary(d) => {
                let mut d = d.borrow_mut();
                check_mutable(d.mutable, "dictionary", "remove from")?;
                d.entries.retain(|(k, _)| k != key);
                Ok(())
            }
            other => Err(bug(format!("cannot remove from {}", other.type_name()))),
        }
    }

    pub fn put(&self, key: Value, value: Value) -> Result<(), RuntimeError> {
        match self {
            Value::Dictionary(d) => {
                let mut d = d.borrow_mut();
                check_mutable(d.mutable, "dictionary", "update")?;
                if let Some(slot) = d.entries.iter_mut().find(|(k, _)| *k == key) {
                    slot.1 = value;
                    return Ok(());
                }
                check_room("dictionary", d.bound, d.entries.len())?;
                d.entries.push((key, value));
                Ok(())
            }
            other => Err(bug(format!("cannot update {}", other.type_name()))),
        }
    }

    // ── Queries ──

    pub fn get(&self, key: &Value) -> Result<Value, RuntimeError> {
        match self {
            Value::List(c) => {
                let index = key.as_int()?;
                let c = c.borrow();
                usize::try_from(index)
                    .ok()
                    .and_then(|i| c.elements.get(i))
                    .cloned()
                    .ok_or(RuntimeError::IndexOutOfBounds {
                        index,
                        size: c.elements.len(),
                    })
            }
            Value::Dictionary(d) => d
                .borrow()
                .entries
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| RuntimeError::KeyNotFound(key.to_string())),
            other => Err(bug(format!("cannot look up in {}", other.type_name()))),
        }
    }

    pub fn contains(&self, key: &Value) -> Result<bool, RuntimeError> {
        match self {
            Value::List(c) | Value::Set(c) => Ok(c.borrow().elements.contains(key)),
            Value::Dictionary(d) => Ok(d.borrow().entries.iter().any(|(k, _)| k == key)),
            other => Err(bug(format!("cannot search {}", other.type_name()))),
        }
    }

    /// Copy into the read-only counterpart. Freezing an already read-only
    /// value is an immutable violation.
    pub fn freeze(&self) -> Result<Value, RuntimeError> {
        match self {
            Value::List(c) | Value::Set(c) => {
                let c = c.borrow();
                let kind = if matches!(self, Value::List(_)) { "list" } else { "set" };
                check_mutable(c.mutable, kind, "freeze")?;
                let frozen = Rc::new(RefCell::new(Collection {
                    elements: c.elements.clone(),
                    bound: c.bound,
                    mutable: false,
                }));
                Ok(if matches!(self, Value::List(_)) {
                    Value::List(frozen)
                } else {
                    Value::Set(frozen)
                })
            }
            Value::Dictionary(d) => {
                let d = d.borrow();
                check_mutable(d.mutable, "dictionary", "freeze")?;
                Ok(Value::Dictionary(Rc::new(RefCell::new(DictValue {
                    entries: d.entries.clone(),
                    bound: d.bound,
                    mutable: false,
                }))))
            }
            other => Err(bug(format!("cannot freeze {}", other.type_name()))),
        }
    }

    /// Text produced by `toString`.
    pub fn to_plain_string(&self) -> String {
        match self {
            Value::String(s) => s.to_string(),
            Value::Char(c) => c.to_string(),
            other => other.to_string(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Unit, Value::Unit) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Decimal(a), Value::Decimal(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Object { def: a, .. }, Value::Object { def: b, .. }) => a == b,
            (Value::Record(a), Value::Record(b)) => {
                a.def == b.def && *a.fields.borrow() == *b.fields.borrow()
            }
            (Value::List(a), Value::List(b)) => a.borrow().elements == b.borrow().elements,
            (Value::Set(a), Value::Set(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                a.elements.len() == b.elements.len()
                    && a.elements.iter().all(|e| b.elements.contains(e))
            }
            (Value::Dictionary(a), Value::Dictionary(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                a.entries.len() == b.entries.len()
                    && a.entries.iter().all(|e| b.entries.contains(e))
            }
            _ => false,
        }
    }
}

fn write_seq<'a>(
    f: &mut fmt::Formatter<'_>,
    name: &str,
    items: impl Iterator<Item = &'a Value>,
) -> fmt::Result {
    write!(f, "{}(", name)?;
    for (i, item) in items.enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    write!(f, ")")
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => write!(f, "()"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::Char(c) => write!(f, "'{}'", c),
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::Function(_) => write!(f, "<function>"),
            Value::Object { name, .. } => write!(f, "{}", name),
            Value::Record(r) => write_seq(f, &r.name, r.fields.borrow().iter()),
            Value::List(c) => {
                let c = c.borrow();
                let name = if c.mutable { "MutableList" } else { "List" };
                write_seq(f, name, c.elements.iter())
            }
            Value::Set(c) => {
                let c = c.borrow();
                let name = if c.mutable { "MutableSet" } else { "Set" };
                write_seq(f, name, c.elements.iter())
            }
            Value::Dictionary(d) => {
                let d = d.borrow();
                let name = if d.mutable {
                    "MutableDictionary"
                } else {
                    "Dictionary"
                };
                write!(f, "{}(", name)?;
                for (i, (k, v)) in d.entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} -> {}", k, v)?;
                }
                write!(f, ")")
            }
        }
    }
}
