//! Programmatic construction of oracle output.
//!
//! [`ProgramBuilder`] allocates AST nodes in a `bumpalo` arena and records
//! the matching semantic facts (types, definitions, uses, selections,
//! blocking sites) as it goes. Hosts that embed a real type checker feed
//! its results through the same API; tests use it to write small programs.
//!
//! Blocking sites are collected as they are marked and handed to the next
//! function literal or declaration that is built, so nested closures must be
//! built before the function that contains them (which is the natural order
//! for an expression tree anyway).

use bumpalo::Bump;
use ordered_float::OrderedFloat;
use rustc_hash::FxHashMap;

use crate::ast::*;
use crate::ids::{NodeId, ObjectId, TypeId};
use crate::object::{Object, ObjectKind, ScopeLevel};
use crate::semantic::{FuncInfo, Selection, SelectionKind, SemanticInfo};
use crate::span::Span;
use crate::types::{
    BasicKind, ChanDir, InterfaceType, NamedType, Signature, StructType, Type,
};

/// Builds a package AST together with its [`SemanticInfo`].
pub struct ProgramBuilder<'ast> {
    arena: &'ast Bump,
    info: SemanticInfo,
    pkg_path: &'ast str,
    pkg_name: &'ast str,
    next_node: u32,
    line: u32,
    pending_blocking: Vec<NodeId>,
    builtins: FxHashMap<&'static str, ObjectId>,
}

impl<'ast> ProgramBuilder<'ast> {
    pub fn new(arena: &'ast Bump, pkg_path: &str, pkg_name: &str) -> Self {
        Self {
            arena,
            info: SemanticInfo::new(),
            pkg_path: arena.alloc_str(pkg_path),
            pkg_name: arena.alloc_str(pkg_name),
            next_node: 0,
            line: 1,
            pending_blocking: Vec::new(),
            builtins: FxHashMap::default(),
        }
    }

    pub fn info(&self) -> &SemanticInfo {
        &self.info
    }

    pub fn info_mut(&mut self) -> &mut SemanticInfo {
        &mut self.info
    }

    pub fn pkg_path(&self) -> &'ast str {
        self.pkg_path
    }

    fn node(&mut self) -> NodeId {
        let id = NodeId::new(self.next_node);
        self.next_node += 1;
        id
    }

    fn span(&mut self) -> Span {
        let span = Span::point(self.line, 1);
        self.line += 1;
        span
    }

    fn alloc<T>(&self, value: T) -> &'ast T {
        self.arena.alloc(value)
    }

    fn slice<T: Copy>(&self, items: &[T]) -> &'ast [T] {
        self.arena.alloc_slice_copy(items)
    }

    // ------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------

    pub fn basic(&mut self, kind: BasicKind) -> TypeId {
        self.info.types.basic(kind)
    }

    pub fn int(&mut self) -> TypeId {
        self.basic(BasicKind::Int)
    }

    pub fn string_type(&mut self) -> TypeId {
        self.basic(BasicKind::String)
    }

    pub fn bool_type(&mut self) -> TypeId {
        self.basic(BasicKind::Bool)
    }

    pub fn pointer(&mut self, elem: TypeId) -> TypeId {
        self.info.types.add(Type::Pointer(elem))
    }

    pub fn slice_of(&mut self, elem: TypeId) -> TypeId {
        self.info.types.add(Type::Slice(elem))
    }

    pub fn array_of(&mut self, elem: TypeId, len: u64) -> TypeId {
        self.info.types.add(Type::Array { elem, len })
    }

    pub fn map_of(&mut self, key: TypeId, value: TypeId) -> TypeId {
        self.info.types.add(Type::Map { key, value })
    }

    pub fn chan_of(&mut self, elem: TypeId, dir: ChanDir) -> TypeId {
        self.info.types.add(Type::Chan { elem, dir })
    }

    pub fn tuple(&mut self, elems: &[TypeId]) -> TypeId {
        self.info.types.add(Type::Tuple(elems.to_vec()))
    }

    /// A parameter or result variable.
    pub fn param(&mut self, name: &str, ty: TypeId) -> ObjectId {
        let span = self.span();
        self.info.objects.add(
            Object::new(name, ObjectKind::Var)
                .with_type(ty)
                .with_pkg(self.pkg_path)
                .with_span(span),
        )
    }

    pub fn signature(
        &mut self,
        params: &[ObjectId],
        results: &[ObjectId],
        variadic: bool,
    ) -> TypeId {
        self.info.types.add(Type::Signature(Signature {
            recv: None,
            params: params.to_vec(),
            results: results.to_vec(),
            variadic,
        }))
    }

    pub fn method_signature(
        &mut self,
        recv: ObjectId,
        params: &[ObjectId],
        results: &[ObjectId],
    ) -> TypeId {
        self.info.types.add(Type::Signature(Signature {
            recv: Some(recv),
            params: params.to_vec(),
            results: results.to_vec(),
            variadic: false,
        }))
    }

    /// A struct type from `(name, type, embedded)` triples.
    pub fn struct_type(&mut self, fields: &[(&str, TypeId, bool)]) -> TypeId {
        let mut ids = Vec::with_capacity(fields.len());
        for (name, ty, embedded) in fields {
            let mut field = Object::new(*name, ObjectKind::Field)
                .with_type(*ty)
                .with_pkg(self.pkg_path);
            field.embedded = *embedded;
            ids.push(self.info.objects.add(field));
        }
        let tags = vec![String::new(); ids.len()];
        self.info.types.add(Type::Struct(StructType { fields: ids, tags }))
    }

    /// Field objects of a struct type, in declaration order.
    pub fn fields(&self, struct_ty: TypeId) -> Vec<ObjectId> {
        match self.info.types.underlying_type(struct_ty) {
            Type::Struct(st) => st.fields.clone(),
            _ => Vec::new(),
        }
    }

    pub fn interface(&mut self, methods: &[(&str, TypeId)]) -> TypeId {
        let mut ids = Vec::with_capacity(methods.len());
        for (name, sig) in methods {
            ids.push(self.info.objects.add(
                Object::new(*name, ObjectKind::Func)
                    .with_type(*sig)
                    .with_pkg(self.pkg_path),
            ));
        }
        self.info.types.add(Type::Interface(InterfaceType { methods: ids }))
    }

    /// Declare a named type; set its underlying type with
    /// [`set_underlying`](Self::set_underlying).
    pub fn named_type(&mut self, name: &str) -> (ObjectId, TypeId) {
        let span = self.span();
        let obj = self.info.objects.add(
            Object::new(name, ObjectKind::TypeName)
                .with_pkg(self.pkg_path)
                .with_level(ScopeLevel::Package)
                .with_span(span),
        );
        let ty = self.info.types.add(Type::Named(NamedType {
            obj,
            underlying: None,
            methods: Vec::new(),
        }));
        self.info.objects.get_mut(obj).ty = Some(ty);
        (obj, ty)
    }

    pub fn set_underlying(&mut self, named: TypeId, underlying: TypeId) {
        self.info.types.set_underlying(named, underlying);
    }

    /// A named type from another package.
    pub fn external_type(&mut self, pkg: &str, name: &str) -> (ObjectId, TypeId) {
        let obj = self.info.objects.add(
            Object::new(name, ObjectKind::TypeName)
                .with_pkg(pkg)
                .with_level(ScopeLevel::Package),
        );
        let ty = self.info.types.add(Type::Named(NamedType {
            obj,
            underlying: None,
            methods: Vec::new(),
        }));
        self.info.objects.get_mut(obj).ty = Some(ty);
        (obj, ty)
    }

    // ------------------------------------------------------------------
    // Objects
    // ------------------------------------------------------------------

    /// A function-local variable.
    pub fn var(&mut self, name: &str, ty: TypeId) -> ObjectId {
        self.param(name, ty)
    }

    pub fn package_var(&mut self, name: &str, ty: TypeId) -> ObjectId {
        let span = self.span();
        self.info.objects.add(
            Object::new(name, ObjectKind::Var)
                .with_type(ty)
                .with_pkg(self.pkg_path)
                .with_level(ScopeLevel::Package)
                .with_span(span),
        )
    }

    pub fn constant(&mut self, name: &str, ty: TypeId) -> ObjectId {
        let obj = self.package_var(name, ty);
        self.info.objects.get_mut(obj).kind = ObjectKind::Const;
        obj
    }

    /// A package-level function object with the given signature type.
    pub fn func(&mut self, name: &str, sig: TypeId) -> ObjectId {
        let span = self.span();
        self.info.objects.add(
            Object::new(name, ObjectKind::Func)
                .with_type(sig)
                .with_pkg(self.pkg_path)
                .with_level(ScopeLevel::Package)
                .with_span(span),
        )
    }

    /// A method object attached to `named`.
    pub fn method(&mut self, named: TypeId, name: &str, sig: TypeId) -> ObjectId {
        let obj = self.func(name, sig);
        self.info.types.add_method(named, obj);
        obj
    }

    /// A member of another package.
    pub fn external(&mut self, pkg: &str, name: &str, kind: ObjectKind, ty: TypeId) -> ObjectId {
        self.info.objects.add(
            Object::new(name, kind)
                .with_type(ty)
                .with_pkg(pkg)
                .with_level(ScopeLevel::Package),
        )
    }

    pub fn label(&mut self, name: &str) -> ObjectId {
        self.info.objects.add(Object::new(name, ObjectKind::Label))
    }

    /// A predeclared builtin such as `len` or `append`.
    pub fn builtin(&mut self, name: &'static str) -> ObjectId {
        if let Some(&id) = self.builtins.get(name) {
            return id;
        }
        let id = self.info.objects.add(
            Object::new(name, ObjectKind::Builtin).with_level(ScopeLevel::Universe),
        );
        self.builtins.insert(name, id);
        id
    }

    /// Mark a variable as captured by an escaping closure.
    pub fn escape(&mut self, obj: ObjectId) {
        self.info.escaping.insert(obj);
    }

    /// Record `node` as a blocking site of the next function built.
    pub fn mark_blocking(&mut self, node: NodeId) {
        self.pending_blocking.push(node);
    }

    fn take_func_info(&mut self) -> FuncInfo {
        FuncInfo {
            blocking: self.pending_blocking.drain(..).collect(),
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn record_type(&mut self, id: NodeId, ty: Option<TypeId>) {
        if let Some(ty) = ty {
            self.info.expr_types.insert(id, ty);
        }
    }

    /// An identifier that defines `obj`.
    pub fn def(&mut self, obj: ObjectId) -> Ident<'ast> {
        let id = self.node();
        let span = self.span();
        let name = self.arena.alloc_str(&self.info.objects.get(obj).name);
        self.info.defs.insert(id, obj);
        let ty = self.info.objects.get(obj).ty;
        self.record_type(id, ty);
        Ident { id, name, span }
    }

    /// An identifier expression that uses `obj`.
    pub fn ident(&mut self, obj: ObjectId) -> Expr<'ast> {
        Expr::Ident(self.use_ident(obj))
    }

    pub fn use_ident(&mut self, obj: ObjectId) -> Ident<'ast> {
        let id = self.node();
        let span = self.span();
        let name = self.arena.alloc_str(&self.info.objects.get(obj).name);
        self.info.uses.insert(id, obj);
        let ty = self.info.objects.get(obj).ty;
        self.record_type(id, ty);
        Ident { id, name, span }
    }

    /// The blank identifier `_`.
    pub fn blank(&mut self) -> Expr<'ast> {
        let id = self.node();
        let span = self.span();
        Expr::Ident(Ident { id, name: "_", span })
    }

    fn lit(&mut self, kind: LitKind<'ast>, ty: TypeId) -> Expr<'ast> {
        let id = self.node();
        let span = self.span();
        self.info.expr_types.insert(id, ty);
        Expr::Lit(self.alloc(LitExpr { id, kind, span }))
    }

    pub fn int_lit(&mut self, value: i64) -> Expr<'ast> {
        let ty = self.int();
        self.lit(LitKind::Int(value), ty)
    }

    pub fn float_lit(&mut self, value: f64) -> Expr<'ast> {
        let ty = self.basic(BasicKind::Float64);
        self.lit(LitKind::Float(OrderedFloat(value)), ty)
    }

    pub fn string_lit(&mut self, value: &str) -> Expr<'ast> {
        let ty = self.string_type();
        let value = self.arena.alloc_str(value);
        self.lit(LitKind::String(value), ty)
    }

    pub fn bool_lit(&mut self, value: bool) -> Expr<'ast> {
        let ty = self.bool_type();
        self.lit(LitKind::Bool(value), ty)
    }

    pub fn nil_lit(&mut self, ty: TypeId) -> Expr<'ast> {
        self.lit(LitKind::Nil, ty)
    }

    pub fn binary(&mut self, op: BinaryOp, left: Expr<'ast>, right: Expr<'ast>, ty: TypeId) -> Expr<'ast> {
        let id = self.node();
        let span = self.span();
        self.info.expr_types.insert(id, ty);
        Expr::Binary(self.alloc(BinaryExpr { id, op, left, right, span }))
    }

    pub fn unary(&mut self, op: UnaryOp, operand: Expr<'ast>, ty: TypeId) -> Expr<'ast> {
        let id = self.node();
        let span = self.span();
        self.info.expr_types.insert(id, ty);
        Expr::Unary(self.alloc(UnaryExpr { id, op, operand, span }))
    }

    /// `<-ch`; pass a tuple type for the comma-ok form.
    pub fn recv(&mut self, ch: Expr<'ast>, ty: TypeId) -> Expr<'ast> {
        self.unary(UnaryOp::Recv, ch, ty)
    }

    /// A call; `ty` is the result type (a tuple for multiple results,
    /// `None` for no result).
    pub fn call(&mut self, func: Expr<'ast>, args: &[Expr<'ast>], ty: Option<TypeId>) -> Expr<'ast> {
        let call = self.call_expr(func, args, false, ty);
        Expr::Call(call)
    }

    pub fn call_expr(
        &mut self,
        func: Expr<'ast>,
        args: &[Expr<'ast>],
        ellipsis: bool,
        ty: Option<TypeId>,
    ) -> &'ast CallExpr<'ast> {
        let id = self.node();
        let span = self.span();
        self.record_type(id, ty);
        let args = self.slice(args);
        self.alloc(CallExpr { id, func, args, ellipsis, span })
    }

    /// Call a builtin by name.
    pub fn builtin_call(&mut self, name: &'static str, args: &[Expr<'ast>], ty: Option<TypeId>) -> Expr<'ast> {
        let obj = self.builtin(name);
        let func = self.ident(obj);
        self.call(func, args, ty)
    }

    /// A selector with an oracle-supplied selection.
    pub fn selector(
        &mut self,
        x: Expr<'ast>,
        kind: SelectionKind,
        index: &[usize],
        obj: ObjectId,
        recv: TypeId,
        ty: TypeId,
    ) -> Expr<'ast> {
        let expr = self.bare_selector(x, obj, ty);
        self.info.selections.insert(
            expr.id(),
            Selection {
                kind,
                recv,
                index: index.to_vec(),
                obj,
                ty,
            },
        );
        expr
    }

    /// A selector without a recorded selection (for package-qualified
    /// names, or to let the translator compute the path itself).
    pub fn bare_selector(&mut self, x: Expr<'ast>, obj: ObjectId, ty: TypeId) -> Expr<'ast> {
        let id = self.node();
        let span = self.span();
        let sel = self.use_ident(obj);
        self.info.expr_types.insert(id, ty);
        Expr::Selector(self.alloc(SelectorExpr { id, x, sel, span }))
    }

    /// A selector whose name is not resolved by the oracle at all.
    pub fn unresolved_selector(&mut self, x: Expr<'ast>, name: &str, ty: TypeId) -> Expr<'ast> {
        let id = self.node();
        let span = self.span();
        let sel_id = self.node();
        let name = self.arena.alloc_str(name);
        self.info.expr_types.insert(id, ty);
        let sel = Ident { id: sel_id, name, span };
        Expr::Selector(self.alloc(SelectorExpr { id, x, sel, span }))
    }

    /// `pkg.Name` for an imported package name object.
    pub fn qualified(&mut self, pkg_name: ObjectId, member: ObjectId) -> Expr<'ast> {
        let x = self.ident(pkg_name);
        let ty = self.info.objects.get(member).ty;
        let id = self.node();
        let span = self.span();
        let sel = self.use_ident(member);
        self.record_type(id, ty);
        Expr::Selector(self.alloc(SelectorExpr { id, x, sel, span }))
    }

    pub fn index(&mut self, x: Expr<'ast>, index: Expr<'ast>, ty: TypeId) -> Expr<'ast> {
        let id = self.node();
        let span = self.span();
        self.info.expr_types.insert(id, ty);
        Expr::Index(self.alloc(IndexExpr { id, x, index, span }))
    }

    pub fn paren(&mut self, inner: Expr<'ast>) -> Expr<'ast> {
        let id = self.node();
        let span = self.span();
        if let Some(ty) = self.info.expr_types.get(&inner.id()).copied() {
            self.info.expr_types.insert(id, ty);
        }
        Expr::Paren(self.alloc(ParenExpr { id, inner, span }))
    }

    /// A function literal. Blocking sites marked since the last function was
    /// built belong to it.
    pub fn func_lit(&mut self, sig: TypeId, body: Block<'ast>) -> Expr<'ast> {
        let id = self.node();
        let span = self.span();
        self.info.expr_types.insert(id, sig);
        let info = self.take_func_info();
        self.info.func_infos.insert(id, info);
        Expr::FuncLit(self.alloc(FuncLit { id, body, span }))
    }

    pub fn composite(&mut self, ty: TypeId, elems: &[(Option<Expr<'ast>>, Expr<'ast>)]) -> Expr<'ast> {
        let id = self.node();
        let span = self.span();
        self.info.expr_types.insert(id, ty);
        let elems: Vec<CompositeElem<'ast>> = elems
            .iter()
            .map(|(key, value)| CompositeElem { key: *key, value: *value })
            .collect();
        let elems = self.slice(&elems);
        Expr::Composite(self.alloc(CompositeLit { id, elems, span }))
    }

    /// A type in expression position.
    pub fn type_expr(&mut self, ty: TypeId) -> Expr<'ast> {
        Expr::Type(self.type_node(ty))
    }

    fn type_node(&mut self, ty: TypeId) -> &'ast TypeExpr {
        let id = self.node();
        let span = self.span();
        self.info.expr_types.insert(id, ty);
        self.alloc(TypeExpr { id, span })
    }

    /// A named type used as an identifier (conversion callee).
    pub fn type_name(&mut self, obj: ObjectId) -> Expr<'ast> {
        self.ident(obj)
    }

    /// `x.(T)`; `ty` is the asserted type, `result` the expression type
    /// (a tuple for the comma-ok form).
    pub fn type_assert(&mut self, x: Expr<'ast>, ty: TypeId, result: TypeId) -> Expr<'ast> {
        let ty_node = self.type_node(ty);
        let id = self.node();
        let span = self.span();
        self.info.expr_types.insert(id, result);
        Expr::TypeAssert(self.alloc(TypeAssertExpr {
            id,
            x,
            ty: Some(ty_node),
            span,
        }))
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    pub fn block(&mut self, stmts: &[Stmt<'ast>]) -> Block<'ast> {
        let id = self.node();
        let span = self.span();
        let stmts = self.slice(stmts);
        Block { id, stmts, span }
    }

    pub fn block_stmt(&mut self, stmts: &[Stmt<'ast>]) -> Stmt<'ast> {
        let block = self.block(stmts);
        Stmt::Block(self.alloc(block))
    }

    pub fn expr_stmt(&mut self, expr: Expr<'ast>) -> Stmt<'ast> {
        let id = self.node();
        let span = self.span();
        Stmt::Expr(self.alloc(ExprStmt { id, expr, span }))
    }

    pub fn assign_op(&mut self, lhs: &[Expr<'ast>], op: AssignOp, rhs: &[Expr<'ast>]) -> Stmt<'ast> {
        let id = self.node();
        let span = self.span();
        let lhs = self.slice(lhs);
        let rhs = self.slice(rhs);
        Stmt::Assign(self.alloc(AssignStmt { id, lhs, op, rhs, span }))
    }

    pub fn assign(&mut self, lhs: &[Expr<'ast>], rhs: &[Expr<'ast>]) -> Stmt<'ast> {
        self.assign_op(lhs, AssignOp::Assign, rhs)
    }

    /// `a, b := rhs`; each object gets a defining identifier (`None` for `_`).
    pub fn define(&mut self, lhs: &[Option<ObjectId>], rhs: &[Expr<'ast>]) -> Stmt<'ast> {
        let lhs: Vec<Expr<'ast>> = lhs
            .iter()
            .map(|obj| match obj {
                Some(obj) => Expr::Ident(self.def(*obj)),
                None => self.blank(),
            })
            .collect();
        self.assign_op(&lhs, AssignOp::Define, rhs)
    }

    pub fn inc(&mut self, x: Expr<'ast>) -> Stmt<'ast> {
        let id = self.node();
        let span = self.span();
        Stmt::IncDec(self.alloc(IncDecStmt { id, x, op: IncDecOp::Inc, span }))
    }

    pub fn dec(&mut self, x: Expr<'ast>) -> Stmt<'ast> {
        let id = self.node();
        let span = self.span();
        Stmt::IncDec(self.alloc(IncDecStmt { id, x, op: IncDecOp::Dec, span }))
    }

    pub fn var_decl(&mut self, names: &[ObjectId], values: &[Expr<'ast>]) -> Stmt<'ast> {
        let names: Vec<Ident<'ast>> = names.iter().map(|obj| self.def(*obj)).collect();
        let id = self.node();
        let span = self.span();
        let names = self.slice(&names);
        let values = self.slice(values);
        Stmt::VarDecl(self.alloc(VarDeclStmt { id, names, values, span }))
    }

    pub fn ret(&mut self, results: &[Expr<'ast>]) -> Stmt<'ast> {
        let id = self.node();
        let span = self.span();
        let results = self.slice(results);
        Stmt::Return(self.alloc(ReturnStmt { id, results, span }))
    }

    pub fn if_stmt(
        &mut self,
        init: Option<Stmt<'ast>>,
        cond: Expr<'ast>,
        then: Block<'ast>,
        else_: Option<Stmt<'ast>>,
    ) -> Stmt<'ast> {
        let id = self.node();
        let span = self.span();
        Stmt::If(self.alloc(IfStmt { id, init, cond, then, else_, span }))
    }

    pub fn for_stmt(
        &mut self,
        init: Option<Stmt<'ast>>,
        cond: Option<Expr<'ast>>,
        post: Option<Stmt<'ast>>,
        body: Block<'ast>,
    ) -> Stmt<'ast> {
        let id = self.node();
        let span = self.span();
        Stmt::For(self.alloc(ForStmt { id, init, cond, post, body, span }))
    }

    pub fn range(
        &mut self,
        key: Option<Expr<'ast>>,
        value: Option<Expr<'ast>>,
        define: bool,
        x: Expr<'ast>,
        body: Block<'ast>,
    ) -> Stmt<'ast> {
        let id = self.node();
        let span = self.span();
        Stmt::Range(self.alloc(RangeStmt { id, key, value, define, x, body, span }))
    }

    pub fn case_clause(&mut self, exprs: Option<&[Expr<'ast>]>, body: &[Stmt<'ast>]) -> CaseClause<'ast> {
        let id = self.node();
        let span = self.span();
        let exprs = exprs.map(|e| self.slice(e));
        let body = self.slice(body);
        CaseClause { id, exprs, body, span }
    }

    pub fn switch(
        &mut self,
        init: Option<Stmt<'ast>>,
        tag: Option<Expr<'ast>>,
        clauses: &[CaseClause<'ast>],
    ) -> Stmt<'ast> {
        let id = self.node();
        let span = self.span();
        let clauses = self.slice(clauses);
        Stmt::Switch(self.alloc(SwitchStmt { id, init, tag, clauses, span }))
    }

    pub fn labeled(&mut self, label: ObjectId, stmt: Stmt<'ast>) -> Stmt<'ast> {
        let label = self.def(label);
        let id = self.node();
        let span = self.span();
        Stmt::Labeled(self.alloc(LabeledStmt { id, label, stmt, span }))
    }

    pub fn branch(&mut self, kind: BranchKind, label: Option<ObjectId>) -> Stmt<'ast> {
        let label = label.map(|obj| self.use_ident(obj));
        let id = self.node();
        let span = self.span();
        Stmt::Branch(self.alloc(BranchStmt { id, kind, label, span }))
    }

    pub fn break_(&mut self, label: Option<ObjectId>) -> Stmt<'ast> {
        self.branch(BranchKind::Break, label)
    }

    pub fn continue_(&mut self, label: Option<ObjectId>) -> Stmt<'ast> {
        self.branch(BranchKind::Continue, label)
    }

    pub fn fallthrough(&mut self) -> Stmt<'ast> {
        self.branch(BranchKind::Fallthrough, None)
    }

    pub fn defer(&mut self, call: &'ast CallExpr<'ast>) -> Stmt<'ast> {
        let id = self.node();
        let span = self.span();
        Stmt::Defer(self.alloc(DeferStmt { id, call, span }))
    }

    pub fn go(&mut self, call: &'ast CallExpr<'ast>) -> Stmt<'ast> {
        let id = self.node();
        let span = self.span();
        Stmt::Go(self.alloc(GoStmt { id, call, span }))
    }

    pub fn send(&mut self, ch: Expr<'ast>, value: Expr<'ast>) -> Stmt<'ast> {
        let id = self.node();
        let span = self.span();
        Stmt::Send(self.alloc(SendStmt { id, ch, value, span }))
    }

    pub fn comm_clause(&mut self, comm: Option<Stmt<'ast>>, body: &[Stmt<'ast>]) -> CommClause<'ast> {
        let id = self.node();
        let span = self.span();
        let body = self.slice(body);
        CommClause { id, comm, body, span }
    }

    pub fn select(&mut self, clauses: &[CommClause<'ast>]) -> Stmt<'ast> {
        let id = self.node();
        let span = self.span();
        let clauses = self.slice(clauses);
        Stmt::Select(self.alloc(SelectStmt { id, clauses, span }))
    }

    pub fn empty(&mut self) -> Stmt<'ast> {
        let id = self.node();
        let span = self.span();
        Stmt::Empty(self.alloc(EmptyStmt { id, span }))
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    /// A function or method declaration for `obj`. Blocking sites marked
    /// since the last function was built belong to it.
    pub fn func_decl(&mut self, obj: ObjectId, body: Option<Block<'ast>>) -> Decl<'ast> {
        let name = self.def(obj);
        let id = self.node();
        let span = self.span();
        let info = self.take_func_info();
        self.info.func_infos.insert(id, info);
        Decl::Func(self.alloc(FuncDecl { id, name, body, span }))
    }

    pub fn type_decl(&mut self, obj: ObjectId) -> Decl<'ast> {
        let name = self.def(obj);
        let id = self.node();
        let span = self.span();
        Decl::Type(self.alloc(TypeDecl { id, name, span }))
    }

    pub fn var_spec(&mut self, names: &[ObjectId], values: &[Expr<'ast>]) -> Decl<'ast> {
        Decl::Var(self.value_decl(names, values))
    }

    pub fn const_spec(&mut self, names: &[ObjectId], values: &[Expr<'ast>]) -> Decl<'ast> {
        Decl::Const(self.value_decl(names, values))
    }

    fn value_decl(&mut self, names: &[ObjectId], values: &[Expr<'ast>]) -> &'ast ValueDecl<'ast> {
        let names: Vec<Ident<'ast>> = names.iter().map(|obj| self.def(*obj)).collect();
        let id = self.node();
        let span = self.span();
        let names = self.slice(&names);
        let values = self.slice(values);
        self.alloc(ValueDecl { id, names, values, span })
    }

    /// `import "path"`; returns the declaration and the package name object.
    pub fn import(&mut self, path: &str, name: &str) -> (ImportDecl<'ast>, ObjectId) {
        let mut object = Object::new(name, ObjectKind::PkgName)
            .with_pkg(self.pkg_path)
            .with_level(ScopeLevel::Package);
        object.imported = Some(path.to_string());
        let obj = self.info.objects.add(object);
        let id = self.node();
        let span = self.span();
        self.info.defs.insert(id, obj);
        let path = self.arena.alloc_str(path);
        (ImportDecl { id, alias: None, path, span }, obj)
    }

    /// Finish the package.
    pub fn finish(self, imports: &[ImportDecl<'ast>], decls: &[Decl<'ast>]) -> (Package<'ast>, SemanticInfo) {
        let package = Package {
            path: self.pkg_path,
            name: self.pkg_name,
            imports: self.slice(imports),
            decls: self.slice(decls),
        };
        (package, self.info)
    }
}
