//! Expression Evaluation
//!
//! Expressions arrive already parsed; this module only evaluates them.
//! Every read goes through the proxy layer, so an evaluation that happens
//! inside a watcher records its dependencies without the evaluator knowing
//! anything about watchers.
//!
//! # Example
//!
//! ```rust,ignore
//! // user.first + " " + user.last
//! let expr = Expression::binary(
//!     BinaryOp::Add,
//!     Expression::binary(
//!         BinaryOp::Add,
//!         Expression::member(Expression::scope("user"), "first"),
//!         Expression::literal(" "),
//!     ),
//!     Expression::member(Expression::scope("user"), "last"),
//! );
//! let value = expr.evaluate(&scope);
//! ```

mod scope;

use std::cmp::Ordering;

pub use scope::Scope;

use crate::proxy::Proxied;
use crate::value::{ArrayRef, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `!x`
    Not,
    /// `-x`
    Negate,
    /// `+x`
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    /// `===`
    Equal,
    /// `!==`
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    And,
    Or,
    /// `??`
    Nullish,
}

/// A parsed expression.
#[derive(Debug, Clone)]
pub enum Expression {
    /// `$this`, or `$parent` chains when `ancestor > 0`.
    AccessThis { ancestor: usize },
    /// A bare name looked up through the scope chain.
    AccessScope { name: String, ancestor: usize },
    /// `object.name`
    AccessMember { object: Box<Expression>, name: String },
    /// `object[key]`
    AccessKeyed { object: Box<Expression>, key: Box<Expression> },
    Literal(Value),
    ArrayLiteral(Vec<Expression>),
    Unary { op: UnaryOp, operand: Box<Expression> },
    Binary { op: BinaryOp, left: Box<Expression>, right: Box<Expression> },
    /// `condition ? yes : no`
    Conditional {
        condition: Box<Expression>,
        yes: Box<Expression>,
        no: Box<Expression>,
    },
}

impl Expression {
    pub fn this() -> Self {
        Expression::AccessThis { ancestor: 0 }
    }

    pub fn scope(name: impl Into<String>) -> Self {
        Expression::AccessScope {
            name: name.into(),
            ancestor: 0,
        }
    }

    pub fn member(object: Expression, name: impl Into<String>) -> Self {
        Expression::AccessMember {
            object: Box::new(object),
            name: name.into(),
        }
    }

    pub fn keyed(object: Expression, key: Expression) -> Self {
        Expression::AccessKeyed {
            object: Box::new(object),
            key: Box::new(key),
        }
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Expression::Literal(value.into())
    }

    pub fn unary(op: UnaryOp, operand: Expression) -> Self {
        Expression::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn binary(op: BinaryOp, left: Expression, right: Expression) -> Self {
        Expression::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn conditional(condition: Expression, yes: Expression, no: Expression) -> Self {
        Expression::Conditional {
            condition: Box::new(condition),
            yes: Box::new(yes),
            no: Box::new(no),
        }
    }

    /// Evaluate against `scope`. Handles in the result are proxies.
    pub fn evaluate(&self, scope: &Scope) -> Value {
        match self {
            Expression::AccessThis { ancestor } => scope
                .ancestor(*ancestor)
                .map(|s| s.binding_context.proxy())
                .unwrap_or_default(),
            Expression::AccessScope { name, ancestor } => {
                scope.resolve_context(name, *ancestor).proxy().get_member(name)
            }
            Expression::AccessMember { object, name } => object.evaluate(scope).get_member(name),
            Expression::AccessKeyed { object, key } => {
                let object = object.evaluate(scope);
                let key = key.evaluate(scope);
                object.get_keyed(&key)
            }
            Expression::Literal(value) => value.clone(),
            Expression::ArrayLiteral(items) => {
                let values: Vec<Value> = items.iter().map(|item| item.evaluate(scope)).collect();
                Value::Array(ArrayRef::from_values(values))
            }
            Expression::Unary { op, operand } => {
                let value = operand.evaluate(scope);
                match op {
                    UnaryOp::Not => Value::Bool(!value.is_truthy()),
                    UnaryOp::Negate => Value::Number(-value.to_number()),
                    UnaryOp::Plus => Value::Number(value.to_number()),
                }
            }
            Expression::Binary { op, left, right } => evaluate_binary(*op, left, right, scope),
            Expression::Conditional { condition, yes, no } => {
                if condition.evaluate(scope).is_truthy() {
                    yes.evaluate(scope)
                } else {
                    no.evaluate(scope)
                }
            }
        }
    }
}

fn evaluate_binary(op: BinaryOp, left: &Expression, right: &Expression, scope: &Scope) -> Value {
    // Short-circuiting operators evaluate the right side only when needed.
    match op {
        BinaryOp::And => {
            let l = left.evaluate(scope);
            return if l.is_truthy() { right.evaluate(scope) } else { l };
        }
        BinaryOp::Or => {
            let l = left.evaluate(scope);
            return if l.is_truthy() { l } else { right.evaluate(scope) };
        }
        BinaryOp::Nullish => {
            let l = left.evaluate(scope);
            return if l.is_nullish() { right.evaluate(scope) } else { l };
        }
        _ => {}
    }

    let l = left.evaluate(scope);
    let r = right.evaluate(scope);
    match op {
        BinaryOp::Add => match (&l, &r) {
            (Value::String(_), _) | (_, Value::String(_)) => Value::from(format!("{l}{r}")),
            _ => Value::Number(l.to_number() + r.to_number()),
        },
        BinaryOp::Subtract => Value::Number(l.to_number() - r.to_number()),
        BinaryOp::Multiply => Value::Number(l.to_number() * r.to_number()),
        BinaryOp::Divide => Value::Number(l.to_number() / r.to_number()),
        BinaryOp::Modulo => Value::Number(l.to_number() % r.to_number()),
        BinaryOp::Equal => Value::Bool(l.strict_eq(&r)),
        BinaryOp::NotEqual => Value::Bool(!l.strict_eq(&r)),
        BinaryOp::Less => Value::Bool(compare(&l, &r) == Some(Ordering::Less)),
        BinaryOp::LessEqual => Value::Bool(matches!(
            compare(&l, &r),
            Some(Ordering::Less | Ordering::Equal)
        )),
        BinaryOp::Greater => Value::Bool(compare(&l, &r) == Some(Ordering::Greater)),
        BinaryOp::GreaterEqual => Value::Bool(matches!(
            compare(&l, &r),
            Some(Ordering::Greater | Ordering::Equal)
        )),
        BinaryOp::And | BinaryOp::Or | BinaryOp::Nullish => unreachable!("handled above"),
    }
}

/// Relational comparison: strings lexically, everything else numerically.
/// `None` when either side is `NaN`.
fn compare(l: &Value, r: &Value) -> Option<Ordering> {
    match (l, r) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => l.to_number().partial_cmp(&r.to_number()),
    }
}
