//! Evaluation scopes.

use std::rc::Rc;

use crate::proxy::Proxied;
use crate::value::{ObjectRef, Value};

/// A binding context with its override context and optional parent.
///
/// Names resolve against the override context first, then the binding
/// context, then the same pair of each ancestor in turn.
pub struct Scope {
    pub binding_context: Value,
    pub override_context: ObjectRef,
    pub parent: Option<Rc<Scope>>,
}

impl Scope {
    /// A root scope over `binding_context`.
    pub fn new(binding_context: impl Into<Value>) -> Rc<Self> {
        Self::build(binding_context.into(), None)
    }

    /// A child scope whose lookups fall back to `parent`.
    pub fn with_parent(parent: &Rc<Scope>, binding_context: impl Into<Value>) -> Rc<Self> {
        Self::build(binding_context.into(), Some(Rc::clone(parent)))
    }

    fn build(binding_context: Value, parent: Option<Rc<Scope>>) -> Rc<Self> {
        Rc::new(Self {
            binding_context: binding_context.raw(),
            override_context: ObjectRef::new(),
            parent,
        })
    }

    /// The scope `ancestor` levels up, if there is one.
    pub fn ancestor(&self, ancestor: usize) -> Option<&Scope> {
        let mut scope = self;
        for _ in 0..ancestor {
            scope = scope.parent.as_deref()?;
        }
        Some(scope)
    }

    /// The raw context `name` should be read from.
    ///
    /// With `ancestor > 0` the walk starts that many levels up and does not
    /// continue further. Otherwise every level is searched and, if no
    /// context declares `name`, the local binding context is returned.
    /// Membership checks are untracked; the read that follows is not.
    pub fn resolve_context(&self, name: &str, ancestor: usize) -> Value {
        if ancestor > 0 {
            return match self.ancestor(ancestor) {
                Some(scope) if scope.override_context.contains_key(name) => {
                    Value::Object(scope.override_context.clone())
                }
                Some(scope) => scope.binding_context.clone(),
                None => Value::Undefined,
            };
        }

        let mut current = Some(self);
        while let Some(scope) = current {
            if scope.override_context.contains_key(name) {
                return Value::Object(scope.override_context.clone());
            }
            if declares(&scope.binding_context, name) {
                return scope.binding_context.clone();
            }
            current = scope.parent.as_deref();
        }
        self.binding_context.clone()
    }
}

fn declares(context: &Value, name: &str) -> bool {
    match context {
        Value::Object(object) => object.contains_key(name),
        _ => false,
    }
}
