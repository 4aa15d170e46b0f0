//! Integration tests for moonlift using `Session` as the entry point.
//!
//! Each test builds a small package through `ProgramBuilder`, compiles it
//! and checks the generated Lua together with the state machine of any
//! flattened function.

use moonlift::core::ast::{AssignOp, BinaryOp, BranchKind, Decl, Package};
use moonlift::core::{ChanDir, ObjectKind};
use moonlift::{
    Bump, CompiledPackage, CompilerOptions, Fiber, FiberStatus, ProgramBuilder, ReceiverForm,
    SemanticInfo, Session,
};

/// Compile one package in a fresh session.
fn compile(package: &Package<'_>, info: &SemanticInfo) -> CompiledPackage {
    let mut session = Session::new();
    session
        .compile(package, info)
        .unwrap_or_else(|e| panic!("failed to compile {}: {e}", package.path))
}

/// Generated code of one function, failing the test when it is missing.
fn function_code<'c>(compiled: &'c CompiledPackage, name: &str) -> &'c str {
    &compiled
        .function(name)
        .unwrap_or_else(|| panic!("no function {name} in:\n{}", compiled.archive.code))
        .code
}

/// Case numbers in the order their dispatch branches appear.
fn emitted_cases(code: &str) -> Vec<i32> {
    code.lines()
        .filter_map(|line| {
            let line = line.trim();
            let rest = line
                .strip_prefix("if __s == ")
                .or_else(|| line.strip_prefix("elseif __s == "))?;
            rest.strip_suffix(" then")?.parse().ok()
        })
        .collect()
}

fn assert_contains(code: &str, needle: &str) {
    assert!(code.contains(needle), "expected `{needle}` in:\n{code}");
}

/// Check that `expected` occur as whole trimmed lines, in this order.
fn assert_lines_in_order(code: &str, expected: &[&str]) {
    let lines: Vec<&str> = code.lines().map(str::trim).collect();
    let mut at = 0;
    for want in expected {
        let found = lines[at..]
            .iter()
            .position(|line| line == want)
            .unwrap_or_else(|| panic!("`{want}` missing after line {at} in:\n{code}"));
        at += found + 1;
    }
}

/// The trimmed lines directly after the first line equal to `anchor`.
fn lines_after<'c>(code: &'c str, anchor: &str, count: usize) -> Vec<&'c str> {
    let lines: Vec<&str> = code.lines().map(str::trim).collect();
    let at = lines
        .iter()
        .position(|line| *line == anchor)
        .unwrap_or_else(|| panic!("no line `{anchor}` in:\n{code}"));
    lines[at + 1..].iter().take(count).copied().collect()
}

// =============================================================================
// Mode selection
// =============================================================================

#[test]
fn test_no_scaffolding_without_blocking() {
    let arena = Bump::new();
    let mut b = ProgramBuilder::new(&arena, "example.com/math", "math");
    let int = b.int();
    let boolean = b.bool_type();
    let n = b.param("n", int);
    let res = b.param("", int);
    let total = b.var("total", int);
    let i = b.var("i", int);

    let zero = b.int_lit(0);
    let start_total = b.define(&[Some(total)], &[zero]);
    let zero = b.int_lit(0);
    let start_i = b.define(&[Some(i)], &[zero]);
    let i_ref = b.ident(i);
    let n_ref = b.ident(n);
    let cond = b.binary(BinaryOp::Lt, i_ref, n_ref, boolean);
    let i_ref = b.ident(i);
    let post = b.inc(i_ref);
    let total_ref = b.ident(total);
    let i_ref = b.ident(i);
    let add = b.assign_op(&[total_ref], AssignOp::Compound(BinaryOp::Add), &[i_ref]);
    let loop_body = b.block(&[add]);
    let for_loop = b.for_stmt(Some(start_i), Some(cond), Some(post), loop_body);
    let total_ref = b.ident(total);
    let ret = b.ret(&[total_ref]);
    let body = b.block(&[start_total, for_loop, ret]);

    let sig = b.signature(&[n], &[res], false);
    let sum = b.func("Sum", sig);
    let decl = b.func_decl(sum, Some(body));
    let (package, info) = b.finish(&[], &[decl]);

    let compiled = compile(&package, &info);
    let code = function_code(&compiled, "Sum");
    assert!(!code.contains("__s"), "unexpected dispatch scaffolding:\n{code}");
    assert!(!code.contains("__rt.frame"));
    assert_contains(code, "local i, total");
    assert_contains(code, "while true do");
    assert_contains(code, "if not (i < n) then goto __brk_1 end");
    assert_contains(code, "total = total + i");
    assert_contains(code, "::__cont_2::");
    assert_contains(code, "do return total end");
    assert!(compiled.function("Sum").unwrap().machine.is_none());
}

// =============================================================================
// Flattening
// =============================================================================

fn receive_package(arena: &Bump) -> (Package<'_>, SemanticInfo) {
    let mut b = ProgramBuilder::new(arena, "example.com/pipe", "pipe");
    let int = b.int();
    let ch_ty = b.chan_of(int, ChanDir::BOTH);
    let ch = b.param("ch", ch_ty);
    let res = b.param("", int);
    let x = b.var("x", int);

    let ch_ref = b.ident(ch);
    let recv = b.recv(ch_ref, int);
    b.mark_blocking(recv.id());
    let take = b.define(&[Some(x)], &[recv]);
    let x_ref = b.ident(x);
    let one = b.int_lit(1);
    let sum = b.binary(BinaryOp::Add, x_ref, one, int);
    let ret = b.ret(&[sum]);
    let body = b.block(&[take, ret]);

    let sig = b.signature(&[ch], &[res], false);
    let func = b.func("Recv", sig);
    let decl = b.func_decl(func, Some(body));
    b.finish(&[], &[decl])
}

#[test]
fn test_receive_splits_into_two_cases() {
    let arena = Bump::new();
    let (package, info) = receive_package(&arena);
    let compiled = compile(&package, &info);
    let code = function_code(&compiled, "Recv");

    assert_contains(code, "local __s, __r, __f, __c, _r, x");
    assert_contains(code, "__f, __c = __rt.frame(Recv), false");
    assert_contains(code, "__r = {__rt.recv(ch)}");
    assert_contains(code, "if __rt.blocked(__r[1]) then goto __suspend end");
    assert_contains(code, "if __c then __c = false; __r = __f.__value end");
    assert_contains(code, "x = _r[1]");
    assert_contains(code, "do return x + 1 end");
    assert_eq!(emitted_cases(code), vec![0, 1, -1]);

    // Every local survives a suspension through the frame.
    for var in ["ch", "_r", "x"] {
        assert_contains(code, &format!("__f.{var} = {var}"));
        assert_contains(code, &format!("{var} = __f.{var}"));
    }
    assert_contains(code, "__f.__s = __s");
    assert_contains(code, "do return __rt.suspend(__f) end");

    let machine = compiled.function("Recv").unwrap().machine.as_ref().unwrap();
    assert_eq!(machine.case_ids(), vec![0, 1, -1]);
    assert_eq!(machine.body_cases(), vec![0, 1]);
    assert_eq!(machine.suspension_count(), 1);

    let mut fiber = Fiber::new(machine);
    assert_eq!(
        fiber.run(|_, _| false).unwrap(),
        FiberStatus::Suspended { resume_at: 1 }
    );
    assert_eq!(fiber.resume(41_i64, |_, _| false).unwrap(), FiberStatus::Finished);
    assert_eq!(fiber.trace(), &[0, 1]);
    assert_eq!(fiber.received(), &[(1, 41)]);
}

#[test]
fn test_loop_with_suspensions() {
    let arena = Bump::new();
    let mut b = ProgramBuilder::new(&arena, "example.com/pipe", "pipe");
    let int = b.int();
    let boolean = b.bool_type();
    let ch_ty = b.chan_of(int, ChanDir::BOTH);
    let input = b.param("in", ch_ty);
    let output = b.param("out", ch_ty);
    let v = b.var("v", int);

    let in_ref = b.ident(input);
    let recv = b.recv(in_ref, int);
    b.mark_blocking(recv.id());
    let take = b.define(&[Some(v)], &[recv]);
    let v_ref = b.ident(v);
    let zero = b.int_lit(0);
    let negative = b.binary(BinaryOp::Lt, v_ref, zero, boolean);
    let stop = b.break_(None);
    let then = b.block(&[stop]);
    let check = b.if_stmt(None, negative, then, None);
    let out_ref = b.ident(output);
    let v_ref = b.ident(v);
    let send = b.send(out_ref, v_ref);
    b.mark_blocking(send.id());
    let loop_body = b.block(&[take, check, send]);
    let forever = b.for_stmt(None, None, None, loop_body);
    let body = b.block(&[forever]);

    let sig = b.signature(&[input, output], &[], false);
    let pump = b.func("Pump", sig);
    let decl = b.func_decl(pump, Some(body));
    let (package, info) = b.finish(&[], &[decl]);

    let compiled = compile(&package, &info);
    let code = function_code(&compiled, "Pump");
    assert_contains(code, "function(in_1, out)");
    assert_contains(code, "__r = {__rt.recv(in_1)}");
    assert_contains(code, "__r = {__rt.send(out, v)}");
    assert_contains(code, "if v < 0 then");

    let cases = emitted_cases(code);
    let (terminal, numbered) = cases.split_last().unwrap();
    assert_eq!(*terminal, -1);
    assert!(numbered.windows(2).all(|w| w[0] < w[1]), "{cases:?}");
    assert_eq!(numbered, &[0, 1, 2, 3, 4]);

    let machine = compiled.function("Pump").unwrap().machine.as_ref().unwrap();
    assert_eq!(machine.suspension_count(), 2);
    let mut fiber = Fiber::new(machine);
    assert_eq!(
        fiber.run(|_, _| false).unwrap(),
        FiberStatus::Suspended { resume_at: 2 }
    );
    assert_eq!(
        fiber.resume(5_i64, |_, _| false).unwrap(),
        FiberStatus::Suspended { resume_at: 3 }
    );
    assert_eq!(
        fiber.resume(0, |_, _| false).unwrap(),
        FiberStatus::Suspended { resume_at: 2 }
    );
    assert_eq!(
        fiber.resume(-1, |_, cond| cond == "v < 0").unwrap(),
        FiberStatus::Finished
    );
    assert_eq!(fiber.trace(), &[0, 1, 2, 3, 1, 2, 4]);
    assert_eq!(fiber.received(), &[(2, 5), (3, 0), (2, -1)]);
}

#[test]
fn test_cancel_runs_terminal_case() {
    let arena = Bump::new();
    let (package, info) = receive_package(&arena);
    let compiled = compile(&package, &info);
    let code = function_code(&compiled, "Recv");
    assert_lines_in_order(code, &["elseif __s == -1 then", "do return end", "end"]);

    let machine = compiled.function("Recv").unwrap().machine.as_ref().unwrap();
    let mut fiber = Fiber::<i64>::new(machine);
    assert_eq!(
        fiber.run(|_, _| false).unwrap(),
        FiberStatus::Suspended { resume_at: 1 }
    );
    assert_eq!(fiber.cancel().unwrap(), FiberStatus::Finished);
    assert_eq!(fiber.trace(), &[0, -1]);
    assert!(fiber.received().is_empty());
    assert!(fiber.resume(1, |_, _| false).is_err());
    assert!(fiber.cancel().is_err());
}

#[test]
fn test_flattened_defer_unwinds_after_pcall() {
    let arena = Bump::new();
    let mut b = ProgramBuilder::new(&arena, "example.com/pipe", "pipe");
    let int = b.int();
    let ch_ty = b.chan_of(int, ChanDir::BOTH);

    let done_sig = b.signature(&[], &[], false);
    let done = b.func("done", done_sig);
    let done_body = b.block(&[]);

    let ch = b.param("ch", ch_ty);
    let res = b.param("", int);
    let x = b.var("x", int);
    let done_ref = b.ident(done);
    let call = b.call_expr(done_ref, &[], false, None);
    let defer = b.defer(call);
    let ch_ref = b.ident(ch);
    let recv = b.recv(ch_ref, int);
    b.mark_blocking(recv.id());
    let take = b.define(&[Some(x)], &[recv]);
    let x_ref = b.ident(x);
    let ret = b.ret(&[x_ref]);
    let body = b.block(&[defer, take, ret]);
    let sig = b.signature(&[ch], &[res], false);
    let drain = b.func("Drain", sig);

    let decls = [
        b.func_decl(done, Some(done_body)),
        b.func_decl(drain, Some(body)),
    ];
    let (package, info) = b.finish(&[], &decls);

    let compiled = compile(&package, &info);
    let code = function_code(&compiled, "Drain");
    assert_contains(code, "local __s, __r, __f, __c, __defers, _r, x");
    assert_lines_in_order(
        code,
        &[
            "__s, __r = 0, nil",
            "__f, __c = __rt.frame(Drain), false",
            "if __f ~= nil then",
            "__defers = __f.__defers",
            "end",
            "local __res = {pcall(function()",
            "while true do",
            "if __s == 0 then",
            "__defers = {}",
            "__defers[#__defers + 1] = {done, {}}",
            "__r = {__rt.recv(ch)}",
            "elseif __s == 1 then",
            "x = _r[1]",
            "do return x end",
            "elseif __s == -1 then",
            "do return end",
            "::__suspend::",
            "__f.__defers = __defers",
            "do return __rt.suspend(__f) end",
            "end)}",
            // A suspension passes through without unwinding.
            "if __res[1] and __rt.suspended(__res[2]) then do return __res[2] end end",
            // A failure leaves the frame in the terminal case.
            "if not __res[1] then",
            "__s = -1",
            "if __f ~= nil then __f.__s = -1 end",
            "end",
            "if __rt.run_deferred(__defers, __res[1], __res[2]) then do return 0 end end",
            "return __rt.unpack(__res, 2, 2)",
        ],
    );
    assert_eq!(emitted_cases(code), vec![0, 1, -1]);

    let machine = compiled.function("Drain").unwrap().machine.as_ref().unwrap();
    assert_eq!(machine.body_cases(), vec![0, 1]);
    let mut fiber = Fiber::new(machine);
    assert_eq!(
        fiber.run(|_, _| false).unwrap(),
        FiberStatus::Suspended { resume_at: 1 }
    );
    assert_eq!(fiber.resume(3_i64, |_, _| false).unwrap(), FiberStatus::Finished);
    assert_eq!(fiber.trace(), &[0, 1]);
    assert!(compiled.function("done").unwrap().machine.is_none());
}

#[test]
fn test_labeled_branches_leave_switch_in_flattened_loop() {
    let arena = Bump::new();
    let mut b = ProgramBuilder::new(&arena, "example.com/pipe", "pipe");
    let int = b.int();
    let boolean = b.bool_type();
    let ch_ty = b.chan_of(int, ChanDir::BOTH);
    let ch = b.param("ch", ch_ty);
    let n = b.param("n", int);
    let res = b.param("", int);
    let total = b.var("total", int);
    let i = b.var("i", int);
    let v = b.var("v", int);
    let outer = b.label("outer");

    let zero = b.int_lit(0);
    let start_total = b.define(&[Some(total)], &[zero]);
    let zero = b.int_lit(0);
    let start_i = b.define(&[Some(i)], &[zero]);
    let i_ref = b.ident(i);
    let n_ref = b.ident(n);
    let cond = b.binary(BinaryOp::Lt, i_ref, n_ref, boolean);
    let i_ref = b.ident(i);
    let post = b.inc(i_ref);

    let ch_ref = b.ident(ch);
    let recv = b.recv(ch_ref, int);
    b.mark_blocking(recv.id());
    let take = b.define(&[Some(v)], &[recv]);

    let zero = b.int_lit(0);
    let skip = b.continue_(Some(outer));
    let skip_clause = b.case_clause(Some(&[zero]), &[skip]);
    let minus_one = b.int_lit(-1);
    let stop = b.break_(Some(outer));
    let stop_clause = b.case_clause(Some(&[minus_one]), &[stop]);
    let v_ref = b.ident(v);
    let switch = b.switch(None, Some(v_ref), &[skip_clause, stop_clause]);

    let total_ref = b.ident(total);
    let v_ref = b.ident(v);
    let add = b.assign_op(&[total_ref], AssignOp::Compound(BinaryOp::Add), &[v_ref]);
    let loop_body = b.block(&[take, switch, add]);
    let for_loop = b.for_stmt(Some(start_i), Some(cond), Some(post), loop_body);
    let labeled = b.labeled(outer, for_loop);
    let total_ref = b.ident(total);
    let ret = b.ret(&[total_ref]);
    let body = b.block(&[start_total, labeled, ret]);

    let sig = b.signature(&[ch, n], &[res], false);
    let sum = b.func("Sum", sig);
    let decl = b.func_decl(sum, Some(body));
    let (package, info) = b.finish(&[], &[decl]);

    let compiled = compile(&package, &info);
    let code = function_code(&compiled, "Sum");
    assert_eq!(emitted_cases(code), vec![0, 1, 2, 3, -1]);
    assert_contains(code, "if not (i < n) then __s = 3; goto __next end");
    assert_contains(code, "_tag = v");

    // `continue outer` runs the post statement before jumping to the test.
    assert_eq!(
        lines_after(code, "if _tag == 0 then", 2),
        vec!["i = i + 1", "__s = 1; goto __next"]
    );
    // `break outer` leaves the loop, not just the switch.
    let after_break = code
        .lines()
        .map(str::trim)
        .skip_while(|line| !line.starts_with("elseif _tag == "))
        .nth(1);
    assert_eq!(after_break, Some("__s = 3; goto __next"));
    // Falling off the end of the body runs the post statement too.
    assert_lines_in_order(
        code,
        &[
            "total = total + v",
            "i = i + 1",
            "__s = 1; goto __next",
            "elseif __s == 3 then",
            "do return total end",
        ],
    );

    let machine = compiled.function("Sum").unwrap().machine.as_ref().unwrap();
    assert_eq!(machine.body_cases(), vec![0, 1, 2, 3]);
    let mut fiber = Fiber::new(machine);
    assert_eq!(
        fiber.run(|_, _| false).unwrap(),
        FiberStatus::Suspended { resume_at: 2 }
    );
    assert_eq!(
        fiber.resume(0_i64, |_, cond| cond == "_tag == 0").unwrap(),
        FiberStatus::Suspended { resume_at: 2 }
    );
    assert_eq!(
        fiber.resume(-1, |_, cond| cond.contains("-1")).unwrap(),
        FiberStatus::Finished
    );
    assert_eq!(fiber.trace(), &[0, 1, 2, 1, 2, 3]);
    assert_eq!(fiber.received(), &[(2, 0), (2, -1)]);
}

#[test]
fn test_blocking_select() {
    let arena = Bump::new();
    let mut b = ProgramBuilder::new(&arena, "example.com/pipe", "pipe");
    let int = b.int();
    let boolean = b.bool_type();
    let ints = b.chan_of(int, ChanDir::BOTH);
    let flags = b.chan_of(boolean, ChanDir::BOTH);
    let a = b.param("a", ints);
    let quit = b.param("quit", flags);
    let res = b.param("", int);
    let v = b.var("v", int);

    let a_ref = b.ident(a);
    let from_a = b.recv(a_ref, int);
    let take = b.define(&[Some(v)], &[from_a]);
    let v_ref = b.ident(v);
    let ret_v = b.ret(&[v_ref]);
    let first = b.comm_clause(Some(take), &[ret_v]);

    let quit_ref = b.ident(quit);
    let from_quit = b.recv(quit_ref, boolean);
    let wait_quit = b.expr_stmt(from_quit);
    let minus_one = b.int_lit(-1);
    let ret_quit = b.ret(&[minus_one]);
    let second = b.comm_clause(Some(wait_quit), &[ret_quit]);

    let select = b.select(&[first, second]);
    b.mark_blocking(select.id());
    let body = b.block(&[select]);
    let sig = b.signature(&[a, quit], &[res], false);
    let wait = b.func("Wait", sig);
    let decl = b.func_decl(wait, Some(body));
    let (package, info) = b.finish(&[], &[decl]);

    let compiled = compile(&package, &info);
    let code = function_code(&compiled, "Wait");
    assert_contains(
        code,
        r#"__r = {__rt.select({{"recv", a}, {"recv", quit}}, false)}"#,
    );
    assert_contains(code, "_sel = _r");
    assert_contains(code, "if _sel[1] == 1 then __s = 2; goto __next end");
    assert_contains(code, "if _sel[1] == 2 then __s = 3; goto __next end");
    assert_contains(code, "v = _sel[2]");
    assert_contains(code, "do return -1 end");

    let machine = compiled.function("Wait").unwrap().machine.as_ref().unwrap();
    assert_eq!(machine.case_ids(), vec![0, 1, 2, 3, 4, -1]);
    let mut fiber = Fiber::new(machine);
    fiber.run(|_, _| false).unwrap();
    let status = fiber
        .resume(2_i64, |_, cond| cond == "_sel[1] == 2")
        .unwrap();
    assert_eq!(status, FiberStatus::Finished);
    assert_eq!(fiber.trace(), &[0, 1, 3]);
}

#[test]
fn test_select_with_default_stays_structured() {
    let arena = Bump::new();
    let mut b = ProgramBuilder::new(&arena, "example.com/pipe", "pipe");
    let int = b.int();
    let ints = b.chan_of(int, ChanDir::BOTH);
    let a = b.param("a", ints);
    let res = b.param("", int);

    let a_ref = b.ident(a);
    let from_a = b.recv(a_ref, int);
    let poll = b.expr_stmt(from_a);
    let one = b.int_lit(1);
    let ret_one = b.ret(&[one]);
    let ready = b.comm_clause(Some(poll), &[ret_one]);
    let zero = b.int_lit(0);
    let ret_zero = b.ret(&[zero]);
    let idle = b.comm_clause(None, &[ret_zero]);
    let select = b.select(&[ready, idle]);
    let zero = b.int_lit(0);
    let fallback = b.ret(&[zero]);
    let body = b.block(&[select, fallback]);

    let sig = b.signature(&[a], &[res], false);
    let poll_fn = b.func("Poll", sig);
    let decl = b.func_decl(poll_fn, Some(body));
    let (package, info) = b.finish(&[], &[decl]);

    let compiled = compile(&package, &info);
    let code = function_code(&compiled, "Poll");
    assert!(!code.contains("__s"));
    assert_contains(code, r#"_sel = {__rt.select({{"recv", a}}, true)}"#);
    assert_contains(code, "if _sel[1] == 1 then");
    assert_contains(code, "else");
    assert_contains(code, "::__brk_1::");
}

// =============================================================================
// Switch
// =============================================================================

#[test]
fn test_switch_with_fallthrough() {
    let arena = Bump::new();
    let mut b = ProgramBuilder::new(&arena, "example.com/sort", "sort");
    let int = b.int();
    let n = b.param("n", int);
    let res = b.param("", int);

    let one = b.int_lit(1);
    let ten = b.int_lit(10);
    let ret_ten = b.ret(&[ten]);
    let first = b.case_clause(Some(&[one]), &[ret_ten]);
    let two = b.int_lit(2);
    let fall = b.fallthrough();
    let second = b.case_clause(Some(&[two]), &[fall]);
    let thirty = b.int_lit(30);
    let ret_thirty = b.ret(&[thirty]);
    let other = b.case_clause(None, &[ret_thirty]);
    let n_ref = b.ident(n);
    let switch = b.switch(None, Some(n_ref), &[first, second, other]);
    let zero = b.int_lit(0);
    let ret_zero = b.ret(&[zero]);
    let body = b.block(&[switch, ret_zero]);

    let sig = b.signature(&[n], &[res], false);
    let classify = b.func("Classify", sig);
    let decl = b.func_decl(classify, Some(body));
    let (package, info) = b.finish(&[], &[decl]);

    let compiled = compile(&package, &info);
    let code = function_code(&compiled, "Classify");
    let expected = &[
        "_tag = n",
        "_case = 0",
        "if _tag == 1 then",
        "_case = 1",
        "elseif _tag == 2 then",
        "_case = 2",
        "else",
        "_case = 3",
        "if _case == 1 then",
        "do return 10 end",
        "if _case == 2 then",
        "_case = 3",
        "if _case == 3 then",
        "do return 30 end",
        "::__brk_1::",
        "do return 0 end",
    ];
    assert_lines_in_order(code, expected);
}

// =============================================================================
// Defer, recover and closures
// =============================================================================

#[test]
fn test_defer_recover_sets_named_result() {
    let arena = Bump::new();
    let mut b = ProgramBuilder::new(&arena, "example.com/safe", "safe");
    let int = b.int();
    let any = b.interface(&[]);
    let n = b.param("n", int);
    b.escape(n);

    let recovered = b.builtin_call("recover", &[], Some(any));
    let recover_stmt = b.expr_stmt(recovered);
    let n_ref = b.ident(n);
    let seven = b.int_lit(7);
    let set = b.assign(&[n_ref], &[seven]);
    let handler_body = b.block(&[recover_stmt, set]);
    let handler_sig = b.signature(&[], &[], false);
    let handler = b.func_lit(handler_sig, handler_body);
    let call = b.call_expr(handler, &[], false, None);
    let defer = b.defer(call);

    let boom = b.string_lit("boom");
    let panic = b.builtin_call("panic", &[boom], None);
    let panic_stmt = b.expr_stmt(panic);
    let body = b.block(&[defer, panic_stmt]);

    let sig = b.signature(&[], &[n], false);
    let safe = b.func("Safe", sig);
    let decl = b.func_decl(safe, Some(body));
    let (package, info) = b.finish(&[], &[decl]);

    let compiled = compile(&package, &info);
    let code = function_code(&compiled, "Safe");
    assert_contains(code, "local __defers, n");
    assert_contains(code, "local __res = {pcall(function()");
    assert_contains(code, "n = {0}");
    assert_contains(code, "__defers = {}");
    assert_contains(code, "__defers[#__defers + 1] = {(function(n)");
    assert_contains(code, "__rt.recover()");
    assert_contains(code, "n[1] = 7");
    assert_contains(code, "end)(n), {}}");
    assert_contains(code, r#"__rt.panic("boom")"#);
    assert_contains(
        code,
        "if __rt.run_deferred(__defers, __res[1], __res[2]) then do return n[1] end end",
    );
    assert!(code.trim_end().ends_with("return n[1]\nend"), "{code}");
}

#[test]
fn test_deferred_closure_rewrites_returned_value() {
    let arena = Bump::new();
    let mut b = ProgramBuilder::new(&arena, "example.com/safe", "safe");
    let int = b.int();
    let n = b.param("n", int);
    b.escape(n);

    let n_ref = b.ident(n);
    let two = b.int_lit(2);
    let doubled = b.binary(BinaryOp::Mul, n_ref, two, int);
    let n_ref = b.ident(n);
    let set = b.assign(&[n_ref], &[doubled]);
    let handler_body = b.block(&[set]);
    let handler_sig = b.signature(&[], &[], false);
    let handler = b.func_lit(handler_sig, handler_body);
    let call = b.call_expr(handler, &[], false, None);
    let defer = b.defer(call);
    let value = b.int_lit(21);
    let ret = b.ret(&[value]);
    let body = b.block(&[defer, ret]);

    let sig = b.signature(&[], &[n], false);
    let twice = b.func("Twice", sig);
    let decl = b.func_decl(twice, Some(body));
    let (package, info) = b.finish(&[], &[decl]);

    let compiled = compile(&package, &info);
    let code = function_code(&compiled, "Twice");
    assert!(!code.contains("do return 21 end"), "{code}");
    // The returned value lands in the result cell, the deferred closure
    // updates the same cell and the function reads it after unwinding.
    assert_lines_in_order(
        code,
        &[
            "n = {0}",
            "__defers = {}",
            "__defers[#__defers + 1] = {(function(n)",
            "n[1] = n[1] * 2",
            "end)(n), {}}",
            "n[1] = 21",
            "do return end",
            "end)}",
            "if __rt.run_deferred(__defers, __res[1], __res[2]) then do return n[1] end end",
            "return n[1]",
        ],
    );
    assert!(compiled.function("Twice").unwrap().machine.is_none());
}

#[test]
fn test_closure_shares_cell() {
    let arena = Bump::new();
    let mut b = ProgramBuilder::new(&arena, "example.com/count", "count");
    let int = b.int();
    let count = b.var("count", int);
    b.escape(count);

    let count_ref = b.ident(count);
    let bump = b.inc(count_ref);
    let count_ref = b.ident(count);
    let ret_count = b.ret(&[count_ref]);
    let inner_body = b.block(&[bump, ret_count]);
    let inner_res = b.param("", int);
    let inner_sig = b.signature(&[], &[inner_res], false);
    let closure = b.func_lit(inner_sig, inner_body);

    let zero = b.int_lit(0);
    let start = b.define(&[Some(count)], &[zero]);
    let ret = b.ret(&[closure]);
    let body = b.block(&[start, ret]);
    let res = b.param("", inner_sig);
    let sig = b.signature(&[], &[res], false);
    let counter = b.func("Counter", sig);
    let decl = b.func_decl(counter, Some(body));
    let (package, info) = b.finish(&[], &[decl]);

    let compiled = compile(&package, &info);
    let code = function_code(&compiled, "Counter");
    assert_contains(code, "count = {0}");
    assert_contains(code, "do return (function(count)");
    assert_contains(code, "return function()");
    assert_contains(code, "count[1] = count[1] + 1");
    assert_contains(code, "do return count[1] end");
    assert_contains(code, "end)(count) end");
}

// =============================================================================
// Names
// =============================================================================

#[test]
fn test_names_are_stable_and_unshadowed() {
    let arena = Bump::new();
    let mut b = ProgramBuilder::new(&arena, "example.com/names", "names");
    let int = b.int();
    let global = b.package_var("total", int);
    let local = b.var("total", int);

    let two = b.int_lit(2);
    let define = b.define(&[Some(local)], &[two]);
    let local_ref = b.ident(local);
    let ret_local = b.ret(&[local_ref]);
    let f_body = b.block(&[define, ret_local]);
    let f_res = b.param("", int);
    let f_sig = b.signature(&[], &[f_res], false);
    let f = b.func("F", f_sig);

    let global_ref = b.ident(global);
    let ret_global = b.ret(&[global_ref]);
    let g_body = b.block(&[ret_global]);
    let g_res = b.param("", int);
    let g_sig = b.signature(&[], &[g_res], false);
    let g = b.func("G", g_sig);

    let decls = [
        b.var_spec(&[global], &[]),
        b.func_decl(f, Some(f_body)),
        b.func_decl(g, Some(g_body)),
    ];
    let (package, info) = b.finish(&[], &decls);

    let compiled = compile(&package, &info);
    assert_contains(function_code(&compiled, "F"), "total_1 = 2");
    assert_contains(function_code(&compiled, "F"), "do return total_1 end");
    assert_contains(function_code(&compiled, "G"), "do return total end");
    assert_contains(&compiled.archive.code, "\ntotal = 0\n");
}

// =============================================================================
// Methods
// =============================================================================

#[test]
fn test_method_forms() {
    let arena = Bump::new();
    let mut b = ProgramBuilder::new(&arena, "example.com/geo", "geo");
    let int = b.int();
    let float = b.basic(moonlift::core::BasicKind::Float64);

    let (grid_obj, grid) = b.named_type("Grid");
    let cells = b.array_of(int, 4);
    b.set_underlying(grid, cells);
    let grid_ptr = b.pointer(grid);
    let g = b.param("g", grid_ptr);
    let clear_sig = b.method_signature(g, &[], &[]);
    let clear = b.method(grid, "Clear", clear_sig);
    let clear_body = b.block(&[]);

    let (celsius_obj, celsius) = b.named_type("Celsius");
    b.set_underlying(celsius, float);
    let c = b.param("c", celsius);
    let res = b.param("", celsius);
    let double_sig = b.method_signature(c, &[], &[res]);
    let double = b.method(celsius, "Double", double_sig);
    let c_ref = b.ident(c);
    let c_ref2 = b.ident(c);
    let sum = b.binary(BinaryOp::Add, c_ref, c_ref2, celsius);
    let ret = b.ret(&[sum]);
    let double_body = b.block(&[ret]);

    let decls = [
        b.type_decl(grid_obj),
        b.type_decl(celsius_obj),
        b.func_decl(clear, Some(clear_body)),
        b.func_decl(double, Some(double_body)),
    ];
    let (package, info) = b.finish(&[], &decls);
    let compiled = compile(&package, &info);
    let archive = &compiled.archive;

    let clear_code = function_code(&compiled, "Grid.Clear");
    assert_contains(clear_code, "Grid.methods.Clear = function(self)");
    assert_contains(clear_code, "g = self.__val");
    assert_contains(
        clear_code,
        "__rt.ptr_type(Grid).methods.Clear = function(self, ...) return Grid.new(__rt.clone(self)):Clear(...) end",
    );
    assert_contains(
        clear_code,
        r#"__rt.reg:add_method("ptr_array", Grid, "Clear", Grid.methods.Clear)"#,
    );
    let entry = archive.find_method("Grid", "Clear").unwrap();
    assert_eq!(entry.form, ReceiverForm::PointerToArray);
    assert_eq!(entry.func_ref, "Grid.methods.Clear");

    let double_code = function_code(&compiled, "Celsius.Double");
    assert_contains(double_code, "c = self");
    assert_contains(double_code, "do return c + c end");
    assert_contains(
        double_code,
        "__rt.ptr_type(Celsius).methods.Double = function(self, ...) return Celsius.methods.Double(self:get(), ...) end",
    );
    assert_eq!(
        archive.find_method("Celsius", "Double").map(|m| m.form),
        Some(ReceiverForm::Value)
    );
    assert_eq!(archive.export("Grid"), Some("Grid"));
    assert_eq!(archive.export("Clear"), None);
}

#[test]
fn test_failed_method_keeps_same_named_function_exported() {
    let arena = Bump::new();
    let mut b = ProgramBuilder::new(&arena, "example.com/geo", "geo");
    let int = b.int();

    let (grid_obj, grid) = b.named_type("Grid");
    let cells = b.array_of(int, 4);
    b.set_underlying(grid, cells);
    let g = b.param("g", grid);
    let method_res = b.param("", int);
    let method_sig = b.method_signature(g, &[], &[method_res]);
    let method = b.method(grid, "Len", method_sig);
    let again = b.label("again");
    let jump = b.branch(BranchKind::Goto, Some(again));
    let method_body = b.block(&[jump]);

    let res = b.param("", int);
    let sig = b.signature(&[], &[res], false);
    let len = b.func("Len", sig);
    let one = b.int_lit(1);
    let ret = b.ret(&[one]);
    let body = b.block(&[ret]);

    let decls = [
        b.type_decl(grid_obj),
        b.func_decl(method, Some(method_body)),
        b.func_decl(len, Some(body)),
    ];
    let (package, info) = b.finish(&[], &decls);
    let compiled = compile(&package, &info);

    assert_eq!(compiled.diagnostics.len(), 1);
    assert!(compiled.function("Grid.Len").is_none());
    assert!(compiled.archive.find_method("Grid", "Len").is_none());
    assert_contains(function_code(&compiled, "Len"), "do return 1 end");
    assert_eq!(compiled.archive.export("Len"), Some("Len"));
    assert_eq!(compiled.archive.export("Grid"), Some("Grid"));
    assert_contains(&compiled.archive.code, "__pkg.Len = Len");
}

// =============================================================================
// Concurrency statements
// =============================================================================

#[test]
fn test_go_and_non_blocking_send() {
    let arena = Bump::new();
    let mut b = ProgramBuilder::new(&arena, "example.com/work", "work");
    let int = b.int();
    let ints = b.chan_of(int, ChanDir::BOTH);

    let wch = b.param("ch", ints);
    let worker_sig = b.signature(&[wch], &[], false);
    let worker = b.func("worker", worker_sig);
    let worker_body = b.block(&[]);

    let ch = b.var("ch", ints);
    let make = b.builtin_call("make", &[], Some(ints));
    let open = b.define(&[Some(ch)], &[make]);
    let worker_ref = b.ident(worker);
    let ch_ref = b.ident(ch);
    let call = b.call_expr(worker_ref, &[ch_ref], false, None);
    let spawn = b.go(call);
    let ch_ref = b.ident(ch);
    let one = b.int_lit(1);
    let send = b.send(ch_ref, one);
    let body = b.block(&[open, spawn, send]);
    let main_sig = b.signature(&[], &[], false);
    let main = b.func("Main", main_sig);

    let decls = [
        b.func_decl(worker, Some(worker_body)),
        b.func_decl(main, Some(body)),
    ];
    let (package, info) = b.finish(&[], &decls);
    let compiled = compile(&package, &info);
    let code = function_code(&compiled, "Main");
    assert!(!code.contains("__s"));
    assert_contains(code, "ch = __rt.make_chan(__type_1, 0)");
    assert_contains(code, "__rt.go(worker, {ch})");
    assert_contains(code, "__rt.send(ch, 1)");
    assert_contains(
        &compiled.archive.code,
        "local __type_1 = __rt.types.chan(__rt.types.int, false, false)",
    );
    assert_eq!(compiled.archive.export("worker"), None);
}

// =============================================================================
// Sessions and imports
// =============================================================================

fn fmt_package(arena: &Bump) -> (Package<'_>, SemanticInfo) {
    let mut b = ProgramBuilder::new(arena, "fmt", "fmt");
    let string = b.string_type();
    let s = b.param("s", string);
    let sig = b.signature(&[s], &[], false);
    let println = b.func("Println", sig);
    let body = b.block(&[]);
    let decl = b.func_decl(println, Some(body));
    b.finish(&[], &[decl])
}

#[test]
fn test_imports_resolve_through_session() {
    let mut session = Session::new();

    let fmt_arena = Bump::new();
    let (fmt, fmt_info) = fmt_package(&fmt_arena);
    session.compile(&fmt, &fmt_info).unwrap();

    let arena = Bump::new();
    let mut b = ProgramBuilder::new(&arena, "example.com/hello", "main");
    let string = b.string_type();
    let s = b.param("s", string);
    let println_sig = b.signature(&[s], &[], false);
    let println = b.external("fmt", "Println", ObjectKind::Func, println_sig);
    let (import, fmt_name) = b.import("fmt", "fmt");
    let callee = b.qualified(fmt_name, println);
    let hi = b.string_lit("hi");
    let call = b.call(callee, &[hi], None);
    let stmt = b.expr_stmt(call);
    let body = b.block(&[stmt]);
    let sig = b.signature(&[], &[], false);
    let main = b.func("Main", sig);
    let decl = b.func_decl(main, Some(body));
    let (package, info) = b.finish(&[import], &[decl]);

    let compiled = session.compile(&package, &info).unwrap();
    let code = &compiled.archive.code;
    assert_contains(code, r#"local fmt = __rt.import("fmt")"#);
    assert_contains(code, r#"fmt.Println("hi")"#);
    assert_eq!(compiled.archive.dependencies, vec!["fmt.Println".to_string()]);
    assert_eq!(compiled.archive.imports, vec!["fmt".to_string()]);

    let order: Vec<&str> = session
        .load_order()
        .unwrap()
        .into_iter()
        .map(|a| a.import_path.as_str())
        .collect();
    assert_eq!(order, vec!["fmt", "example.com/hello"]);
}

#[test]
fn test_import_binding_does_not_shadow_lua_library() {
    let mut session = Session::new();

    let math_arena = Bump::new();
    let mut m = ProgramBuilder::new(&math_arena, "math", "math");
    let m_int = m.int();
    let m_res = m.param("", m_int);
    let m_sig = m.signature(&[], &[m_res], false);
    let max = m.func("MaxInt", m_sig);
    let big = m.int_lit(1 << 53);
    let m_ret = m.ret(&[big]);
    let m_body = m.block(&[m_ret]);
    let m_decl = m.func_decl(max, Some(m_body));
    let (math, math_info) = m.finish(&[], &[m_decl]);
    session.compile(&math, &math_info).unwrap();

    let arena = Bump::new();
    let mut b = ProgramBuilder::new(&arena, "example.com/calc", "calc");
    let int = b.int();
    let ext_res = b.param("", int);
    let ext_sig = b.signature(&[], &[ext_res], false);
    let max_int = b.external("math", "MaxInt", ObjectKind::Func, ext_sig);
    let (import, math_name) = b.import("math", "math");
    let callee = b.qualified(math_name, max_int);
    let call = b.call(callee, &[], Some(int));
    let ret = b.ret(&[call]);
    let body = b.block(&[ret]);
    let res = b.param("", int);
    let sig = b.signature(&[], &[res], false);
    let limit = b.func("Limit", sig);
    let decl = b.func_decl(limit, Some(body));
    let (package, info) = b.finish(&[import], &[decl]);

    let compiled = session.compile(&package, &info).unwrap();
    let code = &compiled.archive.code;
    assert_contains(code, r#"local math_1 = __rt.import("math")"#);
    assert!(!code.contains("local math ="), "{code}");
    assert_contains(function_code(&compiled, "Limit"), "do return math_1.MaxInt() end");
}

#[test]
fn test_missing_export_is_import_failure() {
    let mut session = Session::new();
    let fmt_arena = Bump::new();
    let (fmt, fmt_info) = fmt_package(&fmt_arena);
    session.compile(&fmt, &fmt_info).unwrap();

    let arena = Bump::new();
    let mut b = ProgramBuilder::new(&arena, "example.com/hello", "main");
    let sig = b.signature(&[], &[], false);
    let sprint = b.external("fmt", "Sprint", ObjectKind::Func, sig);
    let (import, fmt_name) = b.import("fmt", "fmt");
    let callee = b.qualified(fmt_name, sprint);
    let call = b.call(callee, &[], None);
    let stmt = b.expr_stmt(call);
    let body = b.block(&[stmt]);
    let main_sig = b.signature(&[], &[], false);
    let main = b.func("Main", main_sig);
    let decl = b.func_decl(main, Some(body));
    let (package, info) = b.finish(&[import], &[decl]);

    let err = session.compile(&package, &info).unwrap_err();
    assert!(err.to_string().contains("does not export \"Sprint\""), "{err}");
    assert!(session.archive("example.com/hello").is_none());
}

#[test]
fn test_output_is_deterministic() {
    let first = {
        let arena = Bump::new();
        let (package, info) = receive_package(&arena);
        let mut session = Session::new();
        session.compile(&package, &info).unwrap();
        session.fingerprint("example.com/pipe").unwrap()
    };
    let second = {
        let arena = Bump::new();
        let (package, info) = receive_package(&arena);
        let mut session = Session::new();
        session.compile(&package, &info).unwrap();
        session.fingerprint("example.com/pipe").unwrap()
    };
    assert_eq!(first, second);
}

#[test]
fn test_minified_output() {
    let arena = Bump::new();
    let (package, info) = receive_package(&arena);
    let mut session = Session::with_options(CompilerOptions::new().with_minify(true));
    let compiled = session.compile(&package, &info).unwrap();
    let code = &compiled.archive.code;
    assert!(!code.starts_with("--"));
    assert!(code.lines().all(|line| !line.starts_with(' ')), "{code}");
    assert_contains(code, "elseif __s == 1 then");
}

#[test]
fn test_decl_helper_shapes() {
    let arena = Bump::new();
    let (package, _) = receive_package(&arena);
    assert_eq!(package.decls.len(), 1);
    assert!(matches!(package.decls[0], Decl::Func(_)));
}
