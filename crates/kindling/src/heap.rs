//! The allocator: owns every heap object and reclaims them by mark-and-sweep.
//!
//! Adapted from this codebase's arena-backed heap (`objects: Vec<Option<_>>`
//! addressed by a stable index), with the lifetime algorithm replaced outright:
//! no refcounts anywhere here. An object's mark is cleared the instant sweep
//! decides to keep it, so a subsequent GC cycle starts from a clean slate.

use std::rc::Rc;

use ahash::AHashSet;
use indexmap::IndexMap;

use crate::ast::Stmt;
use crate::scope::ScopeRef;
use crate::types::LinkedList;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeapId(u32);

impl HeapId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// A callable value: either an evaluator closure (name, params, body AST and
/// the access-link chain captured at creation) or a compiled descriptor for
/// the VM backend, per SPEC_FULL.md §3.
#[derive(Debug, Clone)]
pub enum FunctionObj {
    TreeWalk {
        name: String,
        params: Vec<String>,
        body: Rc<Vec<Stmt>>,
        /// The scope chain alive at the point this closure was created.
        /// `None` for a function defined at global scope.
        closure: Option<ScopeRef>,
    },
    Compiled {
        name: String,
        arg_count: usize,
        local_count: usize,
        addr: usize,
    },
}

impl FunctionObj {
    pub fn name(&self) -> &str {
        match self {
            FunctionObj::TreeWalk { name, .. } => name,
            FunctionObj::Compiled { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StructObj {
    pub type_name: String,
    pub fields: IndexMap<String, Value>,
    pub blessed: bool,
}

#[derive(Debug, Clone)]
pub enum HeapData {
    String(String),
    List(LinkedList),
    Function(FunctionObj),
    Struct(StructObj),
}

struct HeapObject {
    marked: bool,
    data: HeapData,
}

/// Owns every heap object and runs mark-and-sweep collection rooted at the
/// executor's current reachable set (SPEC_FULL.md §4.B).
#[derive(Default)]
pub struct Heap {
    objects: Vec<Option<HeapObject>>,
    free: Vec<usize>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, data: HeapData) -> HeapId {
        let obj = HeapObject { marked: false, data };
        if let Some(slot) = self.free.pop() {
            self.objects[slot] = Some(obj);
            HeapId(slot as u32)
        } else {
            self.objects.push(Some(obj));
            HeapId((self.objects.len() - 1) as u32)
        }
    }

    pub fn make_string(&mut self, s: String) -> HeapId {
        self.insert(HeapData::String(s))
    }

    pub fn make_list(&mut self, list: LinkedList) -> HeapId {
        self.insert(HeapData::List(list))
    }

    pub fn make_function(&mut self, f: FunctionObj) -> HeapId {
        self.insert(HeapData::Function(f))
    }

    pub fn make_struct(&mut self, s: StructObj) -> HeapId {
        self.insert(HeapData::Struct(s))
    }

    pub fn get(&self, id: HeapId) -> &HeapData {
        self.objects[id.index()]
            .as_ref()
            .map(|o| &o.data)
            .expect("dangling HeapId: object was swept while still referenced")
    }

    pub fn get_mut(&mut self, id: HeapId) -> &mut HeapData {
        self.objects[id.index()]
            .as_mut()
            .map(|o| &mut o.data)
            .expect("dangling HeapId: object was swept while still referenced")
    }

    pub fn live_count(&self) -> usize {
        self.objects.iter().filter(|o| o.is_some()).count()
    }

    /// Marks every object transitively reachable from `roots`. Uses an
    /// explicit worklist with an "already marked" guard rather than plain
    /// recursion, so cyclic List/Struct graphs terminate (SPEC_FULL.md §5).
    pub fn mark(&mut self, roots: impl IntoIterator<Item = Value>) {
        let mut worklist: Vec<HeapId> = roots
            .into_iter()
            .filter_map(|v| match v {
                Value::Ref(id) => Some(id),
                _ => None,
            })
            .collect();
        // A closure's defining scope chain may not be reachable from the
        // current call stack at all (the function outlived the call that
        // created it), so its bindings aren't roots of their own accord —
        // they're only kept alive transitively, through the Function object
        // that still references the chain. Guard against re-walking the same
        // scope twice when two live closures share an enclosing scope.
        let mut visited_scopes: AHashSet<usize> = AHashSet::new();

        while let Some(id) = worklist.pop() {
            let Some(obj) = self.objects.get_mut(id.index()).and_then(|o| o.as_mut()) else {
                continue;
            };
            if obj.marked {
                continue;
            }
            obj.marked = true;
            match &obj.data {
                HeapData::String(_) => {}
                HeapData::Function(FunctionObj::TreeWalk { closure, .. }) => {
                    let mut scope = closure.clone();
                    while let Some(s) = scope {
                        let ptr = Rc::as_ptr(&s) as usize;
                        if !visited_scopes.insert(ptr) {
                            break;
                        }
                        let borrowed = s.borrow();
                        for v in borrowed.values() {
                            if let Value::Ref(child) = v {
                                worklist.push(*child);
                            }
                        }
                        scope = borrowed.access_link.clone();
                    }
                }
                HeapData::Function(FunctionObj::Compiled { .. }) => {}
                HeapData::List(list) => {
                    for v in list.child_values() {
                        if let Value::Ref(child) = v {
                            worklist.push(*child);
                        }
                    }
                }
                HeapData::Struct(s) if s.blessed => {
                    for v in s.fields.values() {
                        if let Value::Ref(child) = v {
                            worklist.push(*child);
                        }
                    }
                }
                HeapData::Struct(_) => {}
            }
        }
    }

    /// Frees every object that mark left unmarked, and clears the mark on
    /// every surviving object so the next cycle starts clean.
    pub fn sweep(&mut self) {
        for (idx, slot) in self.objects.iter_mut().enumerate() {
            if let Some(obj) = slot {
                if obj.marked {
                    obj.marked = false;
                } else {
                    *slot = None;
                    self.free.push(idx);
                }
            }
        }
    }

    /// Runs one full mark-and-sweep cycle rooted at `roots`.
    pub fn collect(&mut self, roots: impl IntoIterator<Item = Value>) {
        self.mark(roots);
        self.sweep();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_object_is_swept() {
        let mut heap = Heap::new();
        let id = heap.make_string("orphan".to_string());
        heap.collect(std::iter::empty());
        assert_eq!(heap.live_count(), 0);
        let _ = id;
    }

    #[test]
    fn rooted_object_survives_and_mark_is_cleared_for_the_next_cycle() {
        let mut heap = Heap::new();
        let id = heap.make_string("kept".to_string());
        heap.collect([Value::Ref(id)]);
        assert_eq!(heap.live_count(), 1);
        // A second cycle with the same root must still keep it: if sweep
        // failed to clear the mark bit, this would be a false survivor
        // rather than a root-driven one.
        heap.collect([Value::Ref(id)]);
        assert_eq!(heap.live_count(), 1);
        heap.collect(std::iter::empty());
        assert_eq!(heap.live_count(), 0);
    }

    #[test]
    fn a_self_referential_struct_cycle_does_not_hang_mark_and_still_collects() {
        let mut heap = Heap::new();
        let id = heap.make_struct(StructObj {
            type_name: "Node".to_string(),
            fields: IndexMap::new(),
            blessed: true,
        });
        if let HeapData::Struct(s) = heap.get_mut(id) {
            s.fields.insert("next".to_string(), Value::Ref(id));
        }
        heap.collect([Value::Ref(id)]);
        assert_eq!(heap.live_count(), 1);
        heap.collect(std::iter::empty());
        assert_eq!(heap.live_count(), 0);
    }
}
