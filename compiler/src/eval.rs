// eval.rs — Tree-walking evaluator
//
// Evaluates a compiled unit directly over its AST and annotation tables.
// Generic code is run under a run-time substitution that maps the enclosing
// function's type parameters to the concrete arguments of the current call;
// every call target's instantiation is replayed through it, which is how a
// collection built inside a generic function learns its live Fin bound.
//
// Preconditions: every unit involved compiled without errors.
// Postconditions: no collection ever holds more elements than its bound.
// Failure modes: `RuntimeError` (Fin and immutability violations, checked
//   arithmetic, lookups, plugin failures).
// Side effects: none beyond mutation of run-time values.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use rust_decimal::Decimal;

use crate::annot::{Annotations, Binding, CallTarget, DotTarget};
use crate::ast::*;
use crate::builtins::{BuiltinKind, Member, Platform};
use crate::id::{DefId, NodeId, UnitId};
use crate::plugin::PluginRegistry;
use crate::session::Artifact;
use crate::subst::{Instantiation, Substitution};
use crate::symbols::{DefKind, Definition};
use crate::types::TypeArg;
use crate::value::{bug, fit_decimal, Closure, RecordValue, RuntimeError, Value};

// ── Environments ────────────────────────────────────────────────────────────

/// One lexical scope. Locals are keyed by their declaring node.
#[derive(Debug, Default)]
pub struct Frame {
    vars: RefCell<HashMap<NodeId, Value>>,
    parent: Option<Env>,
}

pub type Env = Rc<Frame>;

impl Frame {
    pub fn root() -> Env {
        Rc::new(Frame::default())
    }

    pub fn child(parent: &Env) -> Env {
        Rc::new(Frame {
            vars: RefCell::new(HashMap::new()),
            parent: Some(Rc::clone(parent)),
        })
    }

    pub fn define(&self, decl: NodeId, value: Value) {
        self.vars.borrow_mut().insert(decl, value);
    }

    pub fn get(&self, decl: NodeId) -> Option<Value> {
        if let Some(v) = self.vars.borrow().get(&decl) {
            return Some(v.clone());
        }
        self.parent.as_ref().and_then(|p| p.get(decl))
    }

    /// Overwrite an existing local; false when no enclosing frame has it.
    pub fn assign(&self, decl: NodeId, value: Value) -> bool {
        if let Some(slot) = self.vars.borrow_mut().get_mut(&decl) {
            *slot = value;
            return true;
        }
        match &self.parent {
            Some(p) => p.assign(decl, value),
            None => false,
        }
    }
}

// ── Interpreter ─────────────────────────────────────────────────────────────

pub struct Interpreter<'a> {
    platform: &'a Platform,
    plugins: &'a PluginRegistry,
    units: HashMap<UnitId, &'a Artifact>,
    /// Lambdas seen so far, for invoking their closures.
    lambdas: HashMap<NodeId, &'a Expr>,
}

/// Runtime substitution for the code being evaluated.
type Rt = Rc<Substitution>;

impl<'a> Interpreter<'a> {
    pub fn new(
        platform: &'a Platform,
        plugins: &'a PluginRegistry,
        units: impl IntoIterator<Item = &'a Artifact>,
    ) -> Self {
        Self {
            platform,
            plugins,
            units: units.into_iter().map(|a| (a.unit, a)).collect(),
            lambdas: HashMap::new(),
        }
    }

    /// Evaluate a unit's top-level statements; the value of a trailing
    /// expression statement is the result.
    pub fn run(&mut self, artifact: &'a Artifact) -> Result<Value, RuntimeError> {
        self.units.insert(artifact.unit, artifact);
        let env = Frame::root();
        let rt: Rt = Rc::new(Substitution::new());
        let mut last = Value::Unit;
        for stmt in &artifact.program.statements {
            last = self.stmt(stmt, &env, &rt)?;
        }
        Ok(last)
    }

    fn def(&self, id: DefId) -> Result<&'a Definition, RuntimeError> {
        let def = if id.unit == UnitId::PLATFORM {
            self.platform.table.def(id)
        } else {
            self.units.get(&id.unit).copied().and_then(|a| a.symbols.def(id))
        };
        def.ok_or_else(|| bug(format!("unknown definition {}", id)))
    }

    fn ann(&self, node: NodeId) -> Result<&'a Annotations, RuntimeError> {
        self.units
            .get(&node.unit)
            .copied()
            .map(|a| &a.annotations)
            .ok_or_else(|| bug(format!("no annotations for unit {}", node.unit)))
    }

    // ── Statements ──────────────────────────────────────────────────────

    fn stmt(&mut self, stmt: &'a Stmt, env: &Env, rt: &Rt) -> Result<Value, RuntimeError> {
        match &stmt.kind {
            StmtKind::Import(_)
            | StmtKind::Def(_)
            | StmtKind::Record(_)
            | StmtKind::Object(_)
            | StmtKind::Sum(_) => Ok(Value::Unit),
            StmtKind::Val(v) => {
                let value = self.expr(&v.value, env, rt)?;
                env.define(stmt.id, value);
                Ok(Value::Unit)
            }
            StmtKind::Assign(a) => {
                let value = self.expr(&a.value, env, rt)?;
                self.assign(&a.target, value, env, rt)?;
                Ok(Value::Unit)
            }
            StmtKind::Expr(e) => self.expr(e, env, rt),
        }
    }

    fn assign(&mut self, target: &'a Expr, value: Value, env: &Env, rt: &Rt) -> Result<(), RuntimeError> {
        match &target.kind {
            ExprKind::Ref(name) => match self.ann(target.id)?.bindings.get(&target.id) {
                Some(Binding::Local { decl, .. }) => {
                    if env.assign(*decl, value) {
                        Ok(())
                    } else {
                        Err(bug(format!("'{}' is not in scope", name.name)))
                    }
                }
                _ => Err(bug(format!("'{}' is not assignable", name.name))),
            },
            ExprKind::DotAccess { receiver, .. } => {
                let Some(DotTarget::Field { index }) = self.ann(target.id)?.dots.get(&target.id) else {
                    return Err(bug("field assignment without a field target"));
                };
                match self.expr(receiver, env, rt)? {
                    Value::Record(r) => {
                        self.check_field(self.def(r.def)?, &r.subst, *index, &value)?;
                        let mut fields = r.fields.borrow_mut();
                        let slot = fields
                            .get_mut(*index)
                            .ok_or_else(|| bug(format!("{} has no field {}", r.name, index)))?;
                        *slot = value;
                        Ok(())
                    }
                    other => Err(bug(format!("cannot assign a field of {}", other.type_name()))),
                }
            }
            _ => Err(bug("invalid assignment target")),
        }
    }

    fn block(&mut self, block: &'a Block, env: &Env, rt: &Rt) -> Result<Value, RuntimeError> {
        let scope = Frame::child(env);
        let mut last = Value::Unit;
        for stmt in &block.stmts {
            last = self.stmt(stmt, &scope, rt)?;
        }
        match block.stmts.last().map(|s| &s.kind) {
            Some(StmtKind::Expr(_)) => Ok(last),
            _ => Ok(Value::Unit),
        }
    }

    // ── Expressions ─────────────────────────────────────────────────────

    fn expr(&mut self, expr: &'a Expr, env: &Env, rt: &Rt) -> Result<Value, RuntimeError> {
        match &expr.kind {
            ExprKind::Literal(lit) => Ok(literal(lit)),
            ExprKind::Ref(name) => self.reference(expr, name, env),
            ExprKind::Block(b) => self.block(b, env, rt),
            ExprKind::Call { args, .. } => {
                let values = self.exprs(args, env, rt)?;
                self.call(expr, values, env, rt)
            }
            ExprKind::DotAccess { receiver, member } => {
                let Some(DotTarget::Field { index }) = self.ann(expr.id)?.dots.get(&expr.id) else {
                    return Err(bug(format!("'{}' has no field target", member.name)));
                };
                match self.expr(receiver, env, rt)? {
                    Value::Record(r) => r
                        .fields
                        .borrow()
                        .get(*index)
                        .cloned()
                        .ok_or_else(|| bug(format!("{} has no field {}", r.name, index))),
                    other => Err(bug(format!("{} has no fields", other.type_name()))),
                }
            }
            ExprKind::DotCall { receiver, args, .. } => {
                let recv = self.expr(receiver, env, rt)?;
                let values = self.exprs(args, env, rt)?;
                let Some(DotTarget::Member(sig)) = self.ann(expr.id)?.dots.get(&expr.id) else {
                    return Err(bug("member call without a member target"));
                };
                let result = member(sig.member, &recv, values)?;
                if matches!(sig.member, Member::ToString) {
                    result.check_bound(self.live_bound(expr, rt)?)?;
                }
                Ok(result)
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let l = self.expr(lhs, env, rt)?;
                match op {
                    BinaryOp::And if !l.as_bool()? => return Ok(Value::Boolean(false)),
                    BinaryOp::Or if l.as_bool()? => return Ok(Value::Boolean(true)),
                    _ => {}
                }
                let r = self.expr(rhs, env, rt)?;
                match binary(*op, l, r)? {
                    Value::Decimal(d) => {
                        let bound = self.live_bound(expr, rt)?;
                        Ok(Value::Decimal(fit_decimal(d, bound)?))
                    }
                    other => Ok(other),
                }
            }
            ExprKind::Unary { op, operand } => {
                let v = self.expr(operand, env, rt)?;
                match (op, v) {
                    (UnaryOp::Not, v) => Ok(Value::Boolean(!v.as_bool()?)),
                    (UnaryOp::Neg, Value::Int(n)) => n
                        .checked_neg()
                        .map(Value::Int)
                        .ok_or(RuntimeError::IntegerOverflow("-")),
                    (UnaryOp::Neg, Value::Decimal(d)) => Ok(Value::Decimal(-d)),
                    (_, other) => Err(bug(format!("cannot negate {}", other.type_name()))),
                }
            }
            ExprKind::If {
                cond,
                then,
                otherwise,
            } => {
                if self.expr(cond, env, rt)?.as_bool()? {
                    self.block(then, env, rt)
                } else if let Some(e) = otherwise {
                    self.expr(e, env, rt)
                } else {
                    Ok(Value::Unit)
                }
            }
            ExprKind::For { source, body, .. } => {
                let items = match self.expr(source, env, rt)? {
                    Value::Dictionary(d) => {
                        let entries = d.borrow().entries.clone();
                        entries.into_iter().map(|(k, v)| self.pair(k, v)).collect()
                    }
                    other => other.elements()?,
                };
                for item in items {
                    let scope = Frame::child(env);
                    scope.define(expr.id, item);
                    self.block(body, &scope, rt)?;
                }
                Ok(Value::Unit)
            }
            ExprKind::Match { scrutinee, cases } => {
                let value = self.expr(scrutinee, env, rt)?;
                let member = match &value {
                    Value::Record(r) => r.def,
                    Value::Object { def, .. } => *def,
                    other => return Err(bug(format!("cannot match on {}", other.type_name()))),
                };
                let ann = self.ann(expr.id)?;
                let case = cases
                    .iter()
                    .find(|c| ann.cases.get(&c.id) == Some(&member))
                    .ok_or_else(|| bug("no case matches the scrutinee"))?;
                let scope = Frame::child(env);
                if case.binder.is_some() {
                    scope.define(case.id, value);
                }
                self.block(&case.body, &scope, rt)
            }
            ExprKind::Lambda { .. } => {
                // Captures the defining frame. Function bodies start from a
                // fresh root, so the call site never holds the lambda's locals.
                self.lambdas.insert(expr.id, expr);
                Ok(Value::Function(Rc::new(Closure::Lambda {
                    node: expr.id,
                    env: Rc::clone(env),
                    subst: Rc::clone(rt),
                })))
            }
        }
    }

    fn exprs(&mut self, exprs: &'a [Expr], env: &Env, rt: &Rt) -> Result<Vec<Value>, RuntimeError> {
        exprs.iter().map(|e| self.expr(e, env, rt)).collect()
    }

    fn reference(&mut self, expr: &Expr, name: &Ident, env: &Env) -> Result<Value, RuntimeError> {
        match self.ann(expr.id)?.bindings.get(&expr.id) {
            Some(Binding::Local { decl, .. }) => env
                .get(*decl)
                .ok_or_else(|| bug(format!("'{}' is not in scope", name.name))),
            Some(Binding::Global(id)) => {
                let def = self.def(*id)?;
                match def.kind {
                    DefKind::Object { .. } => Ok(Value::Object {
                        def: def.id,
                        name: Rc::clone(&def.name),
                    }),
                    DefKind::Function(_) | DefKind::Plugin(_) => {
                        Ok(Value::Function(Rc::new(Closure::Function(def.id))))
                    }
                    _ => Err(bug(format!("'{}' is not a value", name.name))),
                }
            }
            None => Err(bug(format!("'{}' is unbound", name.name))),
        }
    }

    /// Check a field value against the field's declared bound under the
    /// record's type arguments.
    fn check_field(
        &self,
        def: &Definition,
        subst: &Substitution,
        index: usize,
        value: &Value,
    ) -> Result<(), RuntimeError> {
        let field = def
            .as_record()
            .and_then(|r| r.fields.get(index))
            .ok_or_else(|| bug(format!("{} has no field {}", def.name, index)))?;
        let Some(declared) = Platform::fin_bound(&field.ty) else {
            return Ok(());
        };
        let bound = subst
            .apply_cost(&declared)
            .evaluate()
            .ok_or_else(|| bug(format!("field '{}' of {} has no concrete bound", field.name, def.name)))?;
        value.check_bound(bound)
    }

    /// Live Fin bound of an expression whose type is a bounded built-in.
    fn live_bound(&self, expr: &Expr, rt: &Rt) -> Result<u64, RuntimeError> {
        let ty = self.ann(expr.id)?.type_of(expr.id);
        Platform::fin_bound(ty)
            .map(|c| rt.apply_cost(&c))
            .and_then(|c| c.evaluate())
            .ok_or_else(|| bug(format!("{} has no concrete bound", ty)))
    }

    // ── Calls ───────────────────────────────────────────────────────────

    fn concrete(&self, inst: &Instantiation, rt: &Rt) -> Vec<TypeArg> {
        inst.args().iter().map(|a| rt.apply_arg(a)).collect()
    }

    fn call(&mut self, expr: &Expr, args: Vec<Value>, env: &Env, rt: &Rt) -> Result<Value, RuntimeError> {
        let target = self
            .ann(expr.id)?
            .calls
            .get(&expr.id)
            .ok_or_else(|| bug("call without a target"))?;
        match target {
            CallTarget::FormalParam { decl } => match env.get(*decl) {
                Some(Value::Function(closure)) => self.call_closure(&closure, args),
                _ => Err(bug("function parameter is not bound to a function")),
            },
            CallTarget::Function { def, inst } => {
                let type_args = self.concrete(inst, rt);
                self.call_function(*def, type_args, args)
            }
            CallTarget::Plugin { def, .. } => self.call_plugin(*def, &args),
            CallTarget::Builtin { kind, inst } => {
                let bound = inst
                    .arg(kind.fin_index())
                    .and_then(|a| a.as_fin().map(|c| rt.apply_cost(c)))
                    .and_then(|c| c.evaluate())
                    .ok_or_else(|| bug(format!("{} has no concrete bound", inst)))?;
                construct(*kind, args, bound)
            }
            CallTarget::Record { inst } => {
                let def = self.def(inst.def())?;
                let record = def
                    .as_record()
                    .ok_or_else(|| bug(format!("'{}' is not a record", def.name)))?;
                let subst = Substitution::zip(&inst.terminus().params, self.concrete(inst, rt));
                for (index, value) in args.iter().enumerate() {
                    self.check_field(def, &subst, index, value)?;
                }
                Ok(Value::Record(Rc::new(RecordValue {
                    def: def.id,
                    name: Rc::clone(&def.name),
                    field_names: record.fields.iter().map(|f| Rc::clone(&f.name)).collect(),
                    fields: RefCell::new(args),
                    subst,
                })))
            }
        }
    }

    /// Call a user function with concrete type arguments.
    pub fn call_function(
        &mut self,
        def: DefId,
        type_args: Vec<TypeArg>,
        args: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        let d = self.def(def)?;
        let info = d
            .as_function()
            .ok_or_else(|| bug(format!("'{}' is not a function", d.name)))?;
        tracing::trace!(function = %d.name, args = args.len(), "call");
        let rt: Rt = Rc::new(Substitution::zip(&d.params, type_args));
        let frame = Frame::root();
        for (p, v) in info.decl.params.iter().zip(args) {
            frame.define(p.id, v);
        }
        self.block(&info.decl.body, &frame, &rt)
    }

    fn call_plugin(&self, def: DefId, args: &[Value]) -> Result<Value, RuntimeError> {
        let d = self.def(def)?;
        let entry = self
            .plugins
            .get(&d.name)
            .ok_or_else(|| bug(format!("plugin '{}' has no host body", d.name)))?;
        tracing::trace!(plugin = %d.name, "call");
        (entry.body)(args)
    }

    fn call_closure(&mut self, closure: &Closure, args: Vec<Value>) -> Result<Value, RuntimeError> {
        match closure {
            Closure::Function(def) => match self.def(*def)?.kind {
                DefKind::Plugin(_) => self.call_plugin(*def, &args),
                _ => self.call_function(*def, Vec::new(), args),
            },
            Closure::Lambda { node, env, subst } => {
                let lambda = *self
                    .lambdas
                    .get(node)
                    .ok_or_else(|| bug("lambda invoked before evaluation"))?;
                let ExprKind::Lambda { params, body } = &lambda.kind else {
                    return Err(bug("closure does not point at a lambda"));
                };
                let scope = Frame::child(env);
                for (p, v) in params.iter().zip(args) {
                    scope.define(p.id, v);
                }
                self.expr(body, &scope, subst)
            }
        }
    }

    fn pair(&self, first: Value, second: Value) -> Value {
        Value::Record(Rc::new(RecordValue {
            def: self.platform.pair,
            name: Rc::from("Pair"),
            field_names: vec![Rc::from("first"), Rc::from("second")],
            fields: RefCell::new(vec![first, second]),
            subst: Substitution::new(),
        }))
    }
}

// ── Primitive operations ────────────────────────────────────────────────────

fn literal(lit: &Literal) -> Value {
    match lit {
        Literal::Int(n) => Value::Int(*n),
        Literal::Decimal(d, _) => Value::Decimal(*d),
        Literal::Char(c) => Value::Char(*c),
        Literal::String(s) => Value::string(s.as_str()),
        Literal::Boolean(b) => Value::Boolean(*b),
    }
}

fn construct(kind: BuiltinKind, args: Vec<Value>, bound: u64) -> Result<Value, RuntimeError> {
    let mutable = kind.is_mutable();
    match kind.frozen() {
        BuiltinKind::List => Value::list(args, bound, mutable),
        BuiltinKind::Set => Value::set(args, bound, mutable),
        BuiltinKind::Dictionary => {
            let mut pairs = Vec::with_capacity(args.len());
            for arg in args {
                let Value::Record(r) = arg else {
                    return Err(bug("dictionary entry is not a pair"));
                };
                let fields = r.fields.borrow();
                match fields.as_slice() {
                    [k, v] => pairs.push((k.clone(), v.clone())),
                    _ => return Err(bug("dictionary entry is not a pair")),
                }
            }
            Value::dictionary(pairs, bound, mutable)
        }
        other => Err(bug(format!("'{}' cannot be constructed", other.name()))),
    }
}

fn arg(args: &[Value], index: usize) -> Result<&Value, RuntimeError> {
    args.get(index)
        .ok_or_else(|| bug(format!("missing member argument {}", index)))
}

fn member(member: Member, recv: &Value, args: Vec<Value>) -> Result<Value, RuntimeError> {
    match member {
        Member::Size => Ok(Value::Int(recv.size()? as i64)),
        Member::Get => recv.get(arg(&args, 0)?),
        Member::Contains => Ok(Value::Boolean(recv.contains(arg(&args, 0)?)?)),
        Member::Add => {
            recv.add(arg(&args, 0)?.clone())?;
            Ok(Value::Unit)
        }
        Member::Set => {
            let value = arg(&args, 1)?.clone();
            match recv {
                Value::Dictionary(_) => recv.put(arg(&args, 0)?.clone(), value)?,
                _ => recv.set_at(arg(&args, 0)?.as_int()?, value)?,
            }
            Ok(Value::Unit)
        }
        Member::Remove => {
            recv.remove(arg(&args, 0)?)?;
            Ok(Value::Unit)
        }
        Member::RemoveAt => {
            recv.remove_at(arg(&args, 0)?.as_int()?)?;
            Ok(Value::Unit)
        }
        Member::ToList | Member::ToSet | Member::ToDictionary => recv.freeze(),
        Member::ToString => Ok(Value::string(recv.to_plain_string())),
    }
}

fn finite(d: Option<Decimal>) -> Result<Value, RuntimeError> {
    d.map(Value::Decimal).ok_or(RuntimeError::NonFiniteDecimal)
}

fn binary(op: BinaryOp, l: Value, r: Value) -> Result<Value, RuntimeError> {
    use BinaryOp as B;
    match op {
        B::Eq => return Ok(Value::Boolean(l == r)),
        B::NotEq => return Ok(Value::Boolean(l != r)),
        B::And | B::Or => return Ok(Value::Boolean(r.as_bool()?)),
        _ => {}
    }
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => {
            let checked = |v: Option<i64>| v.map(Value::Int).ok_or(RuntimeError::IntegerOverflow(op.symbol()));
            match op {
                B::Add => checked(a.checked_add(b)),
                B::Sub => checked(a.checked_sub(b)),
                B::Mul => checked(a.checked_mul(b)),
                B::Div | B::Mod if b == 0 => Err(RuntimeError::DivisionByZero),
                B::Div => checked(a.checked_div(b)),
                B::Mod => checked(a.checked_rem(b)),
                _ => Ok(Value::Boolean(compare(op, a.cmp(&b)))),
            }
        }
        (Value::Decimal(a), Value::Decimal(b)) => match op {
            B::Add => finite(a.checked_add(b)),
            B::Sub => finite(a.checked_sub(b)),
            B::Mul => finite(a.checked_mul(b)),
            B::Div => finite(a.checked_div(b)),
            _ => Ok(Value::Boolean(compare(op, a.cmp(&b)))),
        },
        (Value::Char(a), Value::Char(b)) => Ok(Value::Boolean(compare(op, a.cmp(&b)))),
        (Value::String(a), Value::String(b)) if op == B::Add => {
            Ok(Value::string(format!("{}{}", a, b)))
        }
        (l, r) => Err(bug(format!(
            "operator '{}' applied to {} and {}",
            op.symbol(),
            l.type_name(),
            r.type_name()
        ))),
    }
}

fn compare(op: BinaryOp, ord: std::cmp::Ordering) -> bool {
    use std::cmp::Ordering::*;
    match op {
        BinaryOp::Lt => ord == Less,
        BinaryOp::Le => ord != Greater,
        BinaryOp::Gt => ord == Greater,
        BinaryOp::Ge => ord != Less,
        _ => false,
    }
}
