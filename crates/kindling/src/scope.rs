//! Activation records (component C).
//!
//! An activation record is reference-counted (`ScopeRef = Rc<RefCell<Scope>>`)
//! rather than owned by the call stack outright: a closure's access-link
//! chain must keep its defining scope alive after the defining call returns
//! (SPEC_FULL.md §9's "linked lexical scopes" redesign). This `Rc` bookkeeping
//! is ordinary Rust ownership, not the language's mark-and-sweep GC — that GC
//! governs `Value`-level heap objects only (§4.B).

use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashMap;

use crate::value::Value;

pub type ScopeRef = Rc<RefCell<Scope>>;

/// A single activation record: a bindings map plus the access link (the
/// lexically enclosing activation, for free-variable lookup). The control
/// link is not stored here — it is implicit in the call stack's `Vec` order.
#[derive(Debug, Default)]
pub struct Scope {
    bindings: AHashMap<String, Value>,
    pub access_link: Option<ScopeRef>,
}

impl Scope {
    pub fn new(access_link: Option<ScopeRef>) -> ScopeRef {
        Rc::new(RefCell::new(Scope {
            bindings: AHashMap::new(),
            access_link,
        }))
    }

    pub fn bind(&mut self, name: &str, value: Value) {
        self.bindings.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.bindings.get(name).cloned()
    }

    pub fn set(&mut self, name: &str, value: Value) -> bool {
        if let Some(slot) = self.bindings.get_mut(name) {
            *slot = value;
            true
        } else {
            false
        }
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.bindings.values()
    }
}

/// Walks `depth` access links starting at `scope`, per SPEC_FULL.md §4.C.
pub fn ancestor(scope: &ScopeRef, depth: i32) -> Option<ScopeRef> {
    let mut cur = scope.clone();
    for _ in 0..depth {
        let next = cur.borrow().access_link.clone()?;
        cur = next;
    }
    Some(cur)
}
