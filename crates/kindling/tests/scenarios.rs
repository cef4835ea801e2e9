//! End-to-end behavioral coverage: the six concrete walkthroughs plus the
//! cross-cutting invariants they're meant to demonstrate.

use kindling::{Backend, CollectSink, Context, DiagnosticSink};

fn run(src: &str, backend: Backend) -> (String, usize) {
    let mut ctx = Context::new();
    let mut sink = DiagnosticSink::new();
    let mut out = CollectSink::default();
    kindling::run_source(src, &mut ctx, &mut sink, &mut out, backend, false);
    (out.buffer, sink.iter().count())
}

fn run_both(src: &str, expected: &str) {
    for backend in [Backend::TreeWalk, Backend::Vm] {
        let (output, diagnostics) = run(src, backend);
        assert_eq!(output, expected, "backend {backend:?} produced unexpected output");
        assert_eq!(diagnostics, 0, "backend {backend:?} reported unexpected diagnostics");
    }
}

macro_rules! scenario_both {
    ($($name:ident: $code:expr, $expected:expr;)*) => {
        $(
            paste::item! {
                #[test]
                fn [< scenario_ $name >]() {
                    run_both($code, $expected);
                }
            }
        )*
    }
}

macro_rules! scenario_tree_walk_only {
    ($($name:ident: $code:expr, $expected:expr;)*) => {
        $(
            paste::item! {
                #[test]
                fn [< scenario_ $name >]() {
                    let (output, diagnostics) = run($code, Backend::TreeWalk);
                    assert_eq!(output, $expected);
                    assert_eq!(diagnostics, 0);
                }
            }
        )*
    }
}

// Scenarios 1, 5, 6 run on both backends; 6 is exercised separately below
// since it asserts on the heap rather than on printed output.
scenario_both! {
    factorial: "func fact(n) { if (n < 2) { return 1 } return n * fact(n - 1) } println fact(6)", "720\n";
    struct_bless: "struct P { x; y } let p := bless P; p[x] := 3; p[y] := 4; println p[x] + p[y]", "7\n";
}

// Scenarios 2, 3, 4 depend on closures-over-locals, higher-order list
// builtins, ranges, or comprehensions, none of which the VM's opcode set
// supports — evaluator-only.
scenario_tree_walk_only! {
    closure_counter: "func mk() { let n := 0; return &() { n := n + 1; return n } } let c := mk(); println c(); println c(); println c()", "1\n2\n3\n";
    map_filter_reduce: "let xs := [1,2,3,4,5]; println reduce(filter(map(xs, &(x) -> x*x), &(x) -> x > 5), &(a,b) -> a + b)", "50\n";
    range_comprehension: "println (1..5 | &(x) -> x*x | &(x) -> x > 1)", "[ 4, 9, 16, 25 ]\n";
}

// Scenario 6: a transient list allocated fresh on every loop iteration never
// escapes its block, so the live heap stays flat regardless of iteration
// count. Wrapped in a function call so `tmp` is a true per-call local on the
// VM backend too — the VM compiler only gives top-level `let`s a function
// scope to live in when they're actually inside one; a bare top-level while
// loop would otherwise bind `tmp` as a constant-pool global that outlives the
// loop by design, which isn't the property this scenario is demonstrating.
#[test]
fn scenario_gc_of_transient_list() {
    let src = "func churn() { let n := 0; while (n < 1000) { let tmp := [1,2,3]; n := n + 1 } return 0 } churn()";
    for backend in [Backend::TreeWalk, Backend::Vm] {
        let mut ctx = Context::new();
        let mut sink = DiagnosticSink::new();
        let mut out = CollectSink::default();
        kindling::run_source(src, &mut ctx, &mut sink, &mut out, backend, false);
        assert_eq!(sink.iter().count(), 0, "backend {backend:?} reported unexpected diagnostics");
        assert_eq!(ctx.heap.live_count(), 0, "backend {backend:?} leaked transient list allocations");
    }
}

// ---- universal invariants (SPEC_FULL.md §8), exercised directly rather
// than through the six named walkthroughs above ----

#[test]
fn gc_keeps_a_reachable_list_alive_across_an_unrelated_collection() {
    let src = "let l := [1,2,3]; if (true) { let tmp := [9,9,9]; } println l[0]";
    run_both(src, "1\n");
}

#[test]
fn numeric_narrowing_collapses_integral_reals_back_to_int() {
    // 4.0 + 0.0 narrows to the Int display form, not "4".to_string()-with-decimals.
    run_both("println 4.0 + 0.0", "4\n");
    run_both("println 1.5 + 0.5", "2\n");
    run_both("println 1.5 + 0.25", "1.75\n");
}

#[test]
fn short_circuit_logic_never_evaluates_the_unneeded_side() {
    let src = "func sideeffect() { println \"called\"; return true } let a := false && sideeffect(); let b := true || sideeffect();";
    run_both(src, "");
}

#[test]
fn list_round_trip_append_grows_size_by_one() {
    // append/size are the only list builtins the VM's ISA implements;
    // push/first below stay evaluator-only.
    run_both("let l := [1,2,3]; println size(append(l, 9))", "4\n");
}

#[test]
fn list_round_trip_push_front_is_readable_via_first() {
    let (output, diagnostics) = run("let l := [1,2,3]; println first(push(l, 9))", Backend::TreeWalk);
    assert_eq!(output, "9\n");
    assert_eq!(diagnostics, 0);
}

#[test]
fn range_runs_ascending_and_descending() {
    // Ranges are evaluator-only, so this is tree-walk only.
    let (ascending, d1) = run("println (1..4)", Backend::TreeWalk);
    assert_eq!(ascending, "[ 1, 2, 3, 4 ]\n");
    assert_eq!(d1, 0);
    let (descending, d2) = run("println (4..1)", Backend::TreeWalk);
    assert_eq!(descending, "[ 4, 3, 2, 1 ]\n");
    assert_eq!(d2, 0);
}

#[test]
fn a_closure_keeps_its_captured_heap_value_alive_after_the_defining_call_returns() {
    // `xs` is only reachable through `outer`'s activation, which is off the
    // call stack by the time `c()` runs — it survives solely because the
    // closure's access-link chain is itself a GC root (heap.rs `mark`).
    // Calling a closure through the VM is a known capability gap (DESIGN.md),
    // so this is evaluator-only like `scenario_closure_counter`.
    let src = "func outer() { let xs := [1,2,3]; return &() { return size(xs) } } let c := outer(); println c()";
    let (output, diagnostics) = run(src, Backend::TreeWalk);
    assert_eq!(output, "3\n");
    assert_eq!(diagnostics, 0);
}

#[test]
fn map_over_a_literal_list_keeps_every_produced_string_alive_across_iterations() {
    // Each `invoke` inside `list_map` closes a scope and runs a GC; the
    // strings `typeof` allocates for earlier elements must survive the GC
    // triggered by mapping later ones.
    let (output, diagnostics) = run("println map([1, 1.5, true], &(x) -> typeof(x))", Backend::TreeWalk);
    assert_eq!(output, "[ Int, Real, Bool ]\n");
    assert_eq!(diagnostics, 0);
}

#[test]
fn resolver_finds_names_through_nested_blocks_and_shadowing() {
    let src = "let x := 1; if (true) { if (true) { println x } } let y := 2; while (y > 0) { println x + y; y := y - 1 }";
    run_both(src, "1\n3\n2\n");
}

#[test]
fn comparison_is_total_across_a_sample_of_value_kinds() {
    use kindling::Value;
    let heap = Context::new().heap;
    let pairs = [(Value::Int(1), Value::Int(2)), (Value::Int(2), Value::Real(2.0)), (Value::Bool(false), Value::Int(1))];
    for (a, b) in pairs {
        let lt = kindling::value::lt(&a, &b, &heap);
        let gt = kindling::value::gt(&a, &b, &heap);
        let eq = kindling::value::equ(&a, &b, &heap);
        assert_eq!([lt, gt, eq].iter().filter(|x| **x).count(), 1, "exactly one of lt/gt/equ must hold");
    }
}
