//! Pre-translation walks over a function body.
//!
//! The oracle reports which individual nodes may suspend. Before a body is
//! translated we lift that to every enclosing statement and expression, so
//! the translator can tell at each node whether it must be lowered with
//! case boundaries. Nested function literals are opaque to the walk: their
//! blocking sites belong to their own fiber.

use rustc_hash::FxHashSet;

use moonlift_core::ast::*;
use moonlift_core::{FuncInfo, NodeId, ObjectId, ScopeLevel, SemanticInfo};

/// Visitor over statements and expressions. Override a method and call the
/// matching `walk_*` function to keep descending.
pub trait Visit<'ast> {
    fn visit_stmt(&mut self, stmt: Stmt<'ast>) {
        walk_stmt(self, stmt);
    }

    fn visit_expr(&mut self, expr: Expr<'ast>) {
        walk_expr(self, expr);
    }

    fn visit_ident(&mut self, _ident: &Ident<'ast>) {}
}

pub fn walk_block<'ast, V: Visit<'ast> + ?Sized>(v: &mut V, block: &Block<'ast>) {
    for stmt in block.stmts {
        v.visit_stmt(*stmt);
    }
}

pub fn walk_stmt<'ast, V: Visit<'ast> + ?Sized>(v: &mut V, stmt: Stmt<'ast>) {
    match stmt {
        Stmt::Expr(s) => v.visit_expr(s.expr),
        Stmt::Assign(s) => {
            for e in s.lhs.iter().chain(s.rhs) {
                v.visit_expr(*e);
            }
        }
        Stmt::IncDec(s) => v.visit_expr(s.x),
        Stmt::VarDecl(s) => {
            for name in s.names {
                v.visit_ident(name);
            }
            for e in s.values {
                v.visit_expr(*e);
            }
        }
        Stmt::Return(s) => {
            for e in s.results {
                v.visit_expr(*e);
            }
        }
        Stmt::Block(b) => walk_block(v, b),
        Stmt::If(s) => {
            if let Some(init) = s.init {
                v.visit_stmt(init);
            }
            v.visit_expr(s.cond);
            walk_block(v, &s.then);
            if let Some(else_) = s.else_ {
                v.visit_stmt(else_);
            }
        }
        Stmt::For(s) => {
            if let Some(init) = s.init {
                v.visit_stmt(init);
            }
            if let Some(cond) = s.cond {
                v.visit_expr(cond);
            }
            if let Some(post) = s.post {
                v.visit_stmt(post);
            }
            walk_block(v, &s.body);
        }
        Stmt::Range(s) => {
            for e in s.key.iter().chain(s.value.iter()) {
                v.visit_expr(*e);
            }
            v.visit_expr(s.x);
            walk_block(v, &s.body);
        }
        Stmt::Switch(s) => {
            if let Some(init) = s.init {
                v.visit_stmt(init);
            }
            if let Some(tag) = s.tag {
                v.visit_expr(tag);
            }
            for clause in s.clauses {
                for e in clause.exprs.unwrap_or(&[]) {
                    v.visit_expr(*e);
                }
                for stmt in clause.body {
                    v.visit_stmt(*stmt);
                }
            }
        }
        Stmt::Labeled(s) => {
            v.visit_ident(&s.label);
            v.visit_stmt(s.stmt);
        }
        Stmt::Branch(s) => {
            if let Some(label) = &s.label {
                v.visit_ident(label);
            }
        }
        Stmt::Defer(s) => v.visit_expr(Expr::Call(s.call)),
        Stmt::Go(s) => v.visit_expr(Expr::Call(s.call)),
        Stmt::Send(s) => {
            v.visit_expr(s.ch);
            v.visit_expr(s.value);
        }
        Stmt::Select(s) => {
            for clause in s.clauses {
                if let Some(comm) = clause.comm {
                    v.visit_stmt(comm);
                }
                for stmt in clause.body {
                    v.visit_stmt(*stmt);
                }
            }
        }
        Stmt::Empty(_) => {}
    }
}

pub fn walk_expr<'ast, V: Visit<'ast> + ?Sized>(v: &mut V, expr: Expr<'ast>) {
    match expr {
        Expr::Ident(ident) => v.visit_ident(&ident),
        Expr::Lit(_) | Expr::Type(_) => {}
        Expr::Binary(e) => {
            v.visit_expr(e.left);
            v.visit_expr(e.right);
        }
        Expr::Unary(e) => v.visit_expr(e.operand),
        Expr::Call(e) => {
            v.visit_expr(e.func);
            for arg in e.args {
                v.visit_expr(*arg);
            }
        }
        Expr::Selector(e) => v.visit_expr(e.x),
        Expr::Index(e) => {
            v.visit_expr(e.x);
            v.visit_expr(e.index);
        }
        Expr::Paren(e) => v.visit_expr(e.inner),
        Expr::FuncLit(e) => walk_block(v, &e.body),
        Expr::Composite(e) => {
            for elem in e.elems {
                if let Some(key) = elem.key {
                    v.visit_expr(key);
                }
                v.visit_expr(elem.value);
            }
        }
        Expr::TypeAssert(e) => v.visit_expr(e.x),
    }
}

// ============================================================================
// Body facts
// ============================================================================

/// What the translator needs to know about a body before emitting it.
#[derive(Debug, Default)]
pub struct BodyFacts {
    /// Nodes the oracle flagged as able to suspend.
    blocking: FxHashSet<NodeId>,
    /// Nodes that are, or contain, a blocking node.
    within: FxHashSet<NodeId>,
    /// The body registers deferred calls.
    pub has_defer: bool,
}

impl BodyFacts {
    /// Walk `body` with the oracle's blocking sites for its function.
    pub fn analyze(body: &Block<'_>, info: &FuncInfo) -> Self {
        let mut walker = FactWalker {
            facts: BodyFacts {
                blocking: info.blocking.clone(),
                ..Self::default()
            },
            stack: Vec::new(),
        };
        walk_block(&mut walker, body);
        walker.facts
    }

    /// The function has at least one suspension point.
    pub fn needs_flattening(&self) -> bool {
        !self.blocking.is_empty()
    }

    /// The node itself suspends.
    pub fn is_blocking(&self, node: NodeId) -> bool {
        self.blocking.contains(&node)
    }

    /// The node suspends or contains something that does.
    pub fn contains_blocking(&self, node: NodeId) -> bool {
        self.within.contains(&node)
    }
}

struct FactWalker {
    facts: BodyFacts,
    stack: Vec<bool>,
}

impl FactWalker {
    fn finish(&mut self, node: NodeId) {
        let inner = self.stack.pop().unwrap_or(false);
        if inner || self.facts.blocking.contains(&node) {
            self.facts.within.insert(node);
            if let Some(parent) = self.stack.last_mut() {
                *parent = true;
            }
        }
    }
}

impl<'ast> Visit<'ast> for FactWalker {
    fn visit_stmt(&mut self, stmt: Stmt<'ast>) {
        if matches!(stmt, Stmt::Defer(_)) {
            self.facts.has_defer = true;
        }
        self.stack.push(false);
        walk_stmt(self, stmt);
        self.finish(stmt.id());
    }

    fn visit_expr(&mut self, expr: Expr<'ast>) {
        if matches!(expr, Expr::FuncLit(_)) {
            return;
        }
        self.stack.push(false);
        walk_expr(self, expr);
        self.finish(expr.id());
    }
}

// ============================================================================
// Captured cells
// ============================================================================

/// Escaping locals a function literal refers to but does not declare, in
/// order of first reference. These are the cells the literal must bind at
/// creation.
pub fn captured_cells(lit: &FuncLit<'_>, info: &SemanticInfo) -> Vec<ObjectId> {
    let mut declared: FxHashSet<ObjectId> = FxHashSet::default();
    if let Some(sig) = info
        .expr_types
        .get(&lit.id)
        .and_then(|ty| info.types.signature(*ty))
    {
        declared.extend(sig.params.iter().chain(&sig.results).copied());
    }
    let mut walker = CaptureWalker {
        info,
        declared,
        order: Vec::new(),
        seen: FxHashSet::default(),
    };
    walk_block(&mut walker, &lit.body);
    walker
        .order
        .into_iter()
        .filter(|obj| !walker.declared.contains(obj))
        .collect()
}

struct CaptureWalker<'i> {
    info: &'i SemanticInfo,
    declared: FxHashSet<ObjectId>,
    order: Vec<ObjectId>,
    seen: FxHashSet<ObjectId>,
}

impl<'ast> Visit<'ast> for CaptureWalker<'_> {
    fn visit_expr(&mut self, expr: Expr<'ast>) {
        if let Expr::FuncLit(lit) = expr {
            if let Some(sig) = self
                .info
                .expr_types
                .get(&lit.id)
                .and_then(|ty| self.info.types.signature(*ty))
            {
                self.declared.extend(sig.params.iter().chain(&sig.results).copied());
            }
        }
        walk_expr(self, expr);
    }

    fn visit_ident(&mut self, ident: &Ident<'ast>) {
        if let Some(&obj) = self.info.defs.get(&ident.id) {
            self.declared.insert(obj);
            return;
        }
        let Some(&obj) = self.info.uses.get(&ident.id) else {
            return;
        };
        let object = self.info.object(obj);
        if object.level == ScopeLevel::Local
            && self.info.is_escaping(obj)
            && self.seen.insert(obj)
        {
            self.order.push(obj);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moonlift_core::{Bump, ChanDir, ProgramBuilder};

    #[test]
    fn blocking_lifts_to_enclosing_statements() {
        let arena = Bump::new();
        let mut b = ProgramBuilder::new(&arena, "main", "main");
        let int = b.int();
        let ch_ty = b.chan_of(int, ChanDir::BOTH);
        let ch = b.var("ch", ch_ty);
        let x = b.var("x", int);

        let ch_expr = b.ident(ch);
        let recv = b.recv(ch_expr, int);
        b.mark_blocking(recv.id());
        let assign = b.define(&[Some(x)], &[recv]);
        let then = b.block(&[assign]);
        let cond = b.bool_lit(true);
        let if_stmt = b.if_stmt(None, cond, then, None);
        let plain = b.empty();
        let body = b.block(&[if_stmt, plain]);

        let sig = b.signature(&[], &[], false);
        let f = b.func("f", sig);
        let decl = b.func_decl(f, Some(body));
        let (_, info) = b.finish(&[], &[decl]);
        let Decl::Func(func) = decl else { unreachable!() };

        let facts = BodyFacts::analyze(&body, info.func_info(func.id).unwrap());
        assert!(facts.needs_flattening());
        assert!(facts.is_blocking(recv.id()));
        assert!(facts.contains_blocking(assign.id()));
        assert!(facts.contains_blocking(if_stmt.id()));
        assert!(!facts.contains_blocking(plain.id()));
        assert!(!facts.has_defer);
    }

    #[test]
    fn closures_capture_escaping_outer_locals_only() {
        let arena = Bump::new();
        let mut b = ProgramBuilder::new(&arena, "main", "main");
        let int = b.int();
        let outer = b.var("counter", int);
        let plain = b.var("plain", int);
        let inner = b.var("inner", int);
        b.escape(outer);
        b.escape(inner);

        let one = b.int_lit(1);
        let decl_inner = b.define(&[Some(inner)], &[one]);
        let use_outer = b.ident(outer);
        let use_plain = b.ident(plain);
        let use_inner = b.ident(inner);
        let sum = b.binary(BinaryOp::Add, use_outer, use_plain, int);
        let sum = b.binary(BinaryOp::Add, sum, use_inner, int);
        let ret = b.ret(&[sum]);
        let body = b.block(&[decl_inner, ret]);
        let res = b.param("", int);
        let sig = b.signature(&[], &[res], false);
        let lit = b.func_lit(sig, body);
        let Expr::FuncLit(lit) = lit else { unreachable!() };

        let info = b.info();
        assert_eq!(captured_cells(lit, info), vec![outer]);
    }
}
