//! Bytecode generation for method bodies.
//!
//! [`ClassContext`] holds what every method of one class shares: the constant
//! pool, the BootstrapMethods table and the lambda registry. [`Gen`] turns one
//! body into a [`Code`] buffer. Switches are lowered in `switch_lowering`,
//! lambdas, method references and string concatenation become `invokedynamic`
//! call sites through [`InvokeDynamicSiteBuilder`].

use crate::ast::*;
use crate::common::hierarchy::TypeHierarchyOracle;
use crate::config::Config;
use crate::consts::OBJECT;
use crate::wash::capture::{EnclosingScope, LambdaCaptureAnalyzer, VisibleLocal};

use super::bootstrap::BootstrapMethodsTable;
use super::code::{Code, FinishedCode, Label, ScopeMark};
use super::constpool::ConstantPool;
use super::defs::CONSTRUCTOR_METHOD_NAME;
use super::descriptor::{
    class_constant_name, descriptor_to_type, method_descriptor, parse_method_descriptor, type_to_descriptor,
};
use super::error::{CodeGenError, CodeGenResult};
use super::indy::{ConcatPart, FunctionalCallSite, InvokeDynamicSiteBuilder};
use super::lambda::{lift_lambda, lifted_impl, LambdaRegistry};
use super::opcodes::*;
use super::switch_lowering::LoweredSwitch;

const STRING_BUILDER: &str = "java/lang/StringBuilder";

/// Per-class generation state.
pub struct ClassContext<'a> {
    pub oracle: &'a TypeHierarchyOracle,
    pub config: &'a Config,
    pub class_name: String,
    pub superclass: String,
    pub is_interface: bool,
    pub cp: ConstantPool,
    pub bootstrap: BootstrapMethodsTable,
    pub lambdas: LambdaRegistry,
    /// Every switch lowered so far, in emission order.
    pub switches: Vec<LoweredSwitch>,
}

impl<'a> ClassContext<'a> {
    pub fn new(class: &ClassDecl, oracle: &'a TypeHierarchyOracle, config: &'a Config) -> Self {
        let superclass = match (&class.extends, class.is_interface()) {
            (Some(superclass), false) => class_constant_name(superclass),
            _ => OBJECT.to_string(),
        };
        Self {
            oracle,
            config,
            class_name: class.name.clone(),
            superclass,
            is_interface: class.is_interface(),
            cp: ConstantPool::new(),
            bootstrap: BootstrapMethodsTable::new(),
            lambdas: LambdaRegistry::new(config),
            switches: Vec::new(),
        }
    }

    pub fn site_builder(&mut self) -> InvokeDynamicSiteBuilder<'_> {
        InvokeDynamicSiteBuilder::new(self.oracle, &mut self.cp, &mut self.bootstrap)
    }

    /// Unknown owners are treated as classes.
    pub(super) fn owner_is_interface(&self, owner: &str) -> bool {
        self.oracle.is_interface(owner).unwrap_or(false)
    }
}

/// Where `break`, `continue` and `yield` go.
#[derive(Debug, Clone)]
pub(super) enum JumpTarget {
    Loop { head: Label, exit: Label },
    /// `result` is the type of a switch expression, `None` for a statement.
    Switch { end: Label, result: Option<TypeRef> },
}

#[derive(Debug, Clone)]
pub(super) struct GenLocal {
    pub name: String,
    pub ty: TypeRef,
    pub slot: u16,
}

#[derive(Debug, Clone, Copy)]
pub(super) struct Scope {
    mark: ScopeMark,
    locals: usize,
}

/// Generator for one method body.
pub struct Gen<'c, 'a> {
    pub(super) ctx: &'c mut ClassContext<'a>,
    pub(super) code: Code,
    /// Member whose source holds this body; names the lambdas found in it.
    member: String,
    is_static: bool,
    return_type: TypeRef,
    locals: Vec<GenLocal>,
    pub(super) jumps: Vec<JumpTarget>,
}

impl<'c, 'a> Gen<'c, 'a> {
    pub fn new(ctx: &'c mut ClassContext<'a>, method: &MethodDecl, member: &str) -> CodeGenResult<Self> {
        let param_descriptors: Vec<String> = method.params.iter().map(|p| type_to_descriptor(&p.type_ref)).collect();
        let this_class = (!method.is_static()).then(|| ctx.class_name.clone());
        let mut code = Code::new(this_class.as_deref(), method.is_constructor(), &param_descriptors)?;

        let mut slot = 0u16;
        if let Some(class) = &this_class {
            code.name_parameter("this", &format!("L{};", class), 0);
            slot = 1;
        }
        let mut locals = Vec::with_capacity(method.params.len());
        for (param, descriptor) in method.params.iter().zip(&param_descriptors) {
            code.name_parameter(&param.name, descriptor, slot);
            locals.push(GenLocal { name: param.name.clone(), ty: param.type_ref.clone(), slot });
            slot += 1;
        }
        Ok(Self {
            ctx,
            code,
            member: member.to_string(),
            is_static: method.is_static(),
            return_type: method.return_type.clone(),
            locals,
            jumps: Vec::new(),
        })
    }

    /// Generates the whole body. Constructors without an explicit `super(..)`
    /// or `this(..)` call get `super()` first; void bodies get a trailing `return`.
    pub fn generate(mut self, method: &MethodDecl) -> CodeGenResult<FinishedCode> {
        let body = method
            .body
            .as_ref()
            .ok_or_else(|| CodeGenError::unsupported(format!("code for bodiless method {}", method.name)))?;
        log::trace!("gen: {}.{} ({} statements)", self.ctx.class_name, method.name, body.statements.len());

        if method.is_constructor() && !starts_with_constructor_call(body) {
            if self.ctx.config.debug_info {
                self.code.mark_line(method.span.start.line);
            }
            self.code.emit_load(0, &format!("L{};", self.ctx.class_name))?;
            let superclass = self.ctx.superclass.clone();
            self.code.emit_invoke(&mut self.ctx.cp, INVOKESPECIAL, &superclass, CONSTRUCTOR_METHOD_NAME, "()V", false)?;
        }
        for stmt in &body.statements {
            self.gen_stmt(stmt)?;
        }
        if self.code.is_alive() {
            if !self.return_type.is_void() {
                return Err(CodeGenError::unsupported(format!("missing return at the end of {}", method.name)));
            }
            self.code.emitop(RETURN)?;
        }
        let Gen { ctx, code, .. } = self;
        code.finish(&mut ctx.cp, &method.name)
    }

    // ------------------------------------------------------------------
    // Locals
    // ------------------------------------------------------------------

    pub(super) fn enter_scope(&self) -> Scope {
        Scope { mark: self.code.enter_scope(), locals: self.locals.len() }
    }

    pub(super) fn exit_scope(&mut self, scope: Scope) {
        self.code.exit_scope(scope.mark);
        self.locals.truncate(scope.locals);
    }

    pub(super) fn declare(&mut self, name: &str, ty: &TypeRef) -> u16 {
        let slot = self.code.declare_local(Some(name), &type_to_descriptor(ty));
        self.locals.push(GenLocal { name: name.to_string(), ty: ty.clone(), slot });
        slot
    }

    /// Unnamed slot for generator temporaries.
    pub(super) fn temp(&mut self, descriptor: &str) -> u16 {
        self.code.declare_local(None, descriptor)
    }

    pub(super) fn local(&self, name: &str) -> CodeGenResult<&GenLocal> {
        self.locals
            .iter()
            .rev()
            .find(|l| l.name == name)
            .ok_or_else(|| CodeGenError::UnknownLocal { name: name.to_string() })
    }

    pub(super) fn store_local(&mut self, name: &str) -> CodeGenResult<()> {
        let local = self.local(name)?;
        let (slot, descriptor) = (local.slot, type_to_descriptor(&local.ty));
        self.code.emit_store(slot, &descriptor)
    }

    /// Pattern variables of `instanceof` expressions get their slots before any
    /// label of the statement exists, so frames after the statement keep them.
    pub(super) fn declare_pattern_bindings(&mut self, expr: &Expr) {
        let mut collector = BindingCollector::default();
        collector.visit_expr(expr);
        for (name, ty) in collector.bindings {
            self.declare(&name, &ty);
        }
    }

    fn this_descriptor(&self) -> String {
        format!("L{};", self.ctx.class_name)
    }

    fn load_this(&mut self) -> CodeGenResult<()> {
        if self.is_static {
            return Err(CodeGenError::unsupported(format!("'this' in static member {}", self.member)));
        }
        let descriptor = self.this_descriptor();
        self.code.emit_load(0, &descriptor)
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    pub(super) fn gen_stmt(&mut self, stmt: &Stmt) -> CodeGenResult<()> {
        if self.ctx.config.debug_info {
            self.code.mark_line(stmt.span().start.line);
        }
        match stmt {
            Stmt::Expr { expr, .. } => {
                self.declare_pattern_bindings(expr);
                self.gen_expr_discard(expr)
            }
            Stmt::LocalVar { name, type_ref, init, .. } => {
                if let Some(init) = init {
                    self.declare_pattern_bindings(init);
                    self.gen_expr_as(init, type_ref)?;
                    let slot = self.declare(name, type_ref);
                    self.code.emit_store(slot, &type_to_descriptor(type_ref))
                } else {
                    self.declare(name, type_ref);
                    Ok(())
                }
            }
            Stmt::Block(block) => self.gen_block(&block.statements),
            Stmt::If { cond, then_branch, else_branch, .. } => {
                self.declare_pattern_bindings(cond);
                let otherwise = self.code.new_label();
                self.gen_cond(cond, otherwise, false)?;
                self.gen_scoped(then_branch)?;
                match else_branch {
                    Some(else_branch) => {
                        let end = self.code.new_label();
                        self.code.emit_jump(GOTO, end)?;
                        self.code.place(otherwise);
                        self.gen_scoped(else_branch)?;
                        self.code.place(end);
                    }
                    None => self.code.place(otherwise),
                }
                Ok(())
            }
            Stmt::While { cond, body, .. } => {
                self.declare_pattern_bindings(cond);
                let head = self.code.new_label();
                let exit = self.code.new_label();
                self.code.place(head);
                self.gen_cond(cond, exit, false)?;
                self.jumps.push(JumpTarget::Loop { head, exit });
                let result = self.gen_scoped(body);
                self.jumps.pop();
                result?;
                self.code.emit_jump(GOTO, head)?;
                self.code.place(exit);
                Ok(())
            }
            Stmt::Return { value, .. } => match value {
                Some(value) => {
                    self.declare_pattern_bindings(value);
                    let return_type = self.return_type.clone();
                    self.gen_expr_as(value, &return_type)?;
                    self.code.emitop(return_op(&return_type))
                }
                None => self.code.emitop(RETURN),
            },
            Stmt::Yield { value, .. } => {
                let (end, result) = self
                    .jumps
                    .iter()
                    .rev()
                    .find_map(|t| match t {
                        JumpTarget::Switch { end, result: Some(result) } => Some((*end, result.clone())),
                        _ => None,
                    })
                    .ok_or(CodeGenError::MisplacedJump { keyword: "yield", context: "switch expression" })?;
                self.declare_pattern_bindings(value);
                self.gen_result(value, &result)?;
                self.code.emit_jump(GOTO, end)
            }
            Stmt::Break { .. } => match self.jumps.last() {
                Some(JumpTarget::Loop { exit, .. }) => self.code.emit_jump(GOTO, *exit),
                Some(JumpTarget::Switch { end, result: None }) => self.code.emit_jump(GOTO, *end),
                _ => Err(CodeGenError::MisplacedJump { keyword: "break", context: "loop or switch statement" }),
            },
            Stmt::Continue { .. } => {
                let mut head = None;
                for target in self.jumps.iter().rev() {
                    match target {
                        JumpTarget::Loop { head: h, .. } => {
                            head = Some(*h);
                            break;
                        }
                        JumpTarget::Switch { result: None, .. } => continue,
                        JumpTarget::Switch { .. } => break,
                    }
                }
                let head = head.ok_or(CodeGenError::MisplacedJump { keyword: "continue", context: "loop" })?;
                self.code.emit_jump(GOTO, head)
            }
            Stmt::Throw { expr, .. } => {
                self.declare_pattern_bindings(expr);
                self.gen_expr(expr)?;
                self.code.emitop(ATHROW)
            }
            Stmt::Switch(switch) => self.gen_switch(switch),
        }
    }

    pub(super) fn gen_block(&mut self, statements: &[Stmt]) -> CodeGenResult<()> {
        let scope = self.enter_scope();
        for stmt in statements {
            self.gen_stmt(stmt)?;
        }
        self.exit_scope(scope);
        Ok(())
    }

    fn gen_scoped(&mut self, stmt: &Stmt) -> CodeGenResult<()> {
        let scope = self.enter_scope();
        let result = self.gen_stmt(stmt);
        self.exit_scope(scope);
        result
    }

    /// Value of a `yield` or an arrow case of a switch expression, typed as the switch.
    pub(super) fn gen_result(&mut self, value: &Expr, result: &TypeRef) -> CodeGenResult<()> {
        self.gen_expr_as(value, result)?;
        if result.is_reference() {
            self.code.widen_top(&type_to_descriptor(result))?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    /// Evaluates `expr` for its side effects only.
    pub(super) fn gen_expr_discard(&mut self, expr: &Expr) -> CodeGenResult<()> {
        match &expr.kind {
            ExprKind::Assign { target, value } => self.gen_assign(target, value, false),
            ExprKind::Increment { name, delta, .. } => {
                let slot = self.local(name)?.slot;
                self.code.emit_iinc(slot, *delta)
            }
            _ => {
                self.gen_expr(expr)?;
                if !expr.ty.is_void() {
                    self.code.emitop(POP)?;
                }
                Ok(())
            }
        }
    }

    /// Pushes the value of `expr`, converted to `target`.
    pub(super) fn gen_expr_as(&mut self, expr: &Expr, target: &TypeRef) -> CodeGenResult<()> {
        self.gen_expr(expr)?;
        if matches!(expr.kind, ExprKind::Literal(Literal::Null)) {
            return Ok(());
        }
        self.coerce(&expr.ty, target)
    }

    pub(super) fn gen_expr(&mut self, expr: &Expr) -> CodeGenResult<()> {
        match &expr.kind {
            ExprKind::Literal(literal) => self.gen_literal(literal),
            ExprKind::Local(name) => {
                let local = self.local(name)?;
                let (slot, descriptor) = (local.slot, type_to_descriptor(&local.ty));
                self.code.emit_load(slot, &descriptor)
            }
            ExprKind::This => self.load_this(),
            ExprKind::Field { target, owner, name, is_static } => {
                let descriptor = type_to_descriptor(&expr.ty);
                if *is_static {
                    if let Some(target) = target {
                        self.gen_expr_discard(target)?;
                    }
                    return self.code.emit_field(&mut self.ctx.cp, GETSTATIC, owner, name, &descriptor);
                }
                match target {
                    Some(target) => self.gen_expr(target)?,
                    None => self.load_this()?,
                }
                self.code.emit_field(&mut self.ctx.cp, GETFIELD, owner, name, &descriptor)
            }
            ExprKind::MethodCall { target, owner, name, descriptor, args, invoke } => {
                self.gen_call(target.as_deref(), owner, name, descriptor, args, *invoke)?;
                let (_, ret) = parse_method_descriptor(descriptor)?;
                if ret != "V" && !expr.ty.is_void() {
                    self.coerce(&descriptor_to_type(&ret), &expr.ty)?;
                }
                Ok(())
            }
            ExprKind::New { class, descriptor, args } => {
                self.code.emit_new(&mut self.ctx.cp, class)?;
                self.code.emitop(DUP)?;
                self.gen_args(args, descriptor)?;
                self.code.emit_invoke(&mut self.ctx.cp, INVOKESPECIAL, class, CONSTRUCTOR_METHOD_NAME, descriptor, false)
            }
            ExprKind::Binary { op: BinaryOp::Add, .. } if is_string(&expr.ty) => self.gen_string_concat(expr),
            ExprKind::Binary { op, .. } if op.is_comparison() || op.is_logical() => self.gen_bool_value(expr),
            ExprKind::Binary { op, left, right } => {
                self.gen_expr_as(left, &TypeRef::int())?;
                self.gen_expr_as(right, &TypeRef::int())?;
                self.code.emitop(arithmetic_op(*op))
            }
            ExprKind::Unary { op: UnaryOp::Neg, operand } => {
                self.gen_expr_as(operand, &TypeRef::int())?;
                self.code.emitop(INEG)
            }
            ExprKind::Unary { op: UnaryOp::Not, .. } | ExprKind::InstanceOf { .. } => self.gen_bool_value(expr),
            ExprKind::Assign { target, value } => self.gen_assign(target, value, true),
            ExprKind::Increment { name, delta, prefix } => {
                let slot = self.local(name)?.slot;
                if *prefix {
                    self.code.emit_iinc(slot, *delta)?;
                    self.code.emit_load(slot, "I")
                } else {
                    self.code.emit_load(slot, "I")?;
                    self.code.emit_iinc(slot, *delta)
                }
            }
            ExprKind::Cast { target, expr: inner } => {
                self.gen_expr(inner)?;
                self.coerce(&inner.ty, target)
            }
            ExprKind::Conditional { cond, then_expr, else_expr } => {
                let otherwise = self.code.new_label();
                let end = self.code.new_label();
                self.gen_cond(cond, otherwise, false)?;
                self.gen_result(then_expr, &expr.ty)?;
                self.code.emit_jump(GOTO, end)?;
                self.code.place(otherwise);
                self.gen_result(else_expr, &expr.ty)?;
                self.code.place(end);
                Ok(())
            }
            ExprKind::Lambda(lambda) => self.gen_lambda(lambda),
            ExprKind::MethodRef(method_ref) => self.gen_method_ref(method_ref),
            ExprKind::Switch(switch) => self.gen_switch(switch),
        }
    }

    fn gen_literal(&mut self, literal: &Literal) -> CodeGenResult<()> {
        match literal {
            Literal::Int(v) => self.code.emit_int(&mut self.ctx.cp, *v),
            Literal::Bool(b) => self.code.emit_int(&mut self.ctx.cp, *b as i32),
            Literal::Char(c) => self.code.emit_int(&mut self.ctx.cp, *c as i32),
            Literal::String(s) => self.code.emit_string(&mut self.ctx.cp, s),
            Literal::Null => self.code.emitop(ACONST_NULL),
        }
    }

    fn gen_args(&mut self, args: &[Expr], descriptor: &str) -> CodeGenResult<()> {
        let (params, _) = parse_method_descriptor(descriptor)?;
        if params.len() != args.len() {
            return Err(CodeGenError::InvalidDescriptor { descriptor: descriptor.to_string() });
        }
        for (arg, param) in args.iter().zip(&params) {
            self.gen_expr_as(arg, &descriptor_to_type(param))?;
        }
        Ok(())
    }

    fn gen_call(
        &mut self,
        target: Option<&Expr>,
        owner: &str,
        name: &str,
        descriptor: &str,
        args: &[Expr],
        invoke: InvokeKind,
    ) -> CodeGenResult<()> {
        let op = match invoke {
            InvokeKind::Static => INVOKESTATIC,
            InvokeKind::Virtual => INVOKEVIRTUAL,
            InvokeKind::Interface => INVOKEINTERFACE,
            InvokeKind::Special => INVOKESPECIAL,
        };
        if op == INVOKESTATIC {
            if let Some(target) = target {
                self.gen_expr_discard(target)?;
            }
        } else {
            match target {
                Some(target) if matches!(target.kind, ExprKind::This) => self.load_this()?,
                Some(target) => self.gen_expr_as(target, &TypeRef::class(owner))?,
                None => self.load_this()?,
            }
        }
        self.gen_args(args, descriptor)?;
        let owner_is_interface = op == INVOKEINTERFACE || (op != INVOKEVIRTUAL && self.ctx.owner_is_interface(owner));
        self.code.emit_invoke(&mut self.ctx.cp, op, owner, name, descriptor, owner_is_interface)
    }

    fn gen_assign(&mut self, target: &Expr, value: &Expr, keep: bool) -> CodeGenResult<()> {
        match &target.kind {
            ExprKind::Local(name) => {
                let ty = self.local(name)?.ty.clone();
                self.gen_expr_as(value, &ty)?;
                if keep {
                    self.code.emitop(DUP)?;
                }
                self.store_local(name)
            }
            ExprKind::Field { target: receiver, owner, name, is_static } => {
                let descriptor = type_to_descriptor(&target.ty);
                if *is_static {
                    self.gen_expr_as(value, &target.ty)?;
                    if keep {
                        self.code.emitop(DUP)?;
                    }
                    return self.code.emit_field(&mut self.ctx.cp, PUTSTATIC, owner, name, &descriptor);
                }
                match receiver {
                    Some(receiver) => self.gen_expr(receiver)?,
                    None => self.load_this()?,
                }
                self.gen_expr_as(value, &target.ty)?;
                if keep {
                    self.code.emitop(DUP_X1)?;
                }
                self.code.emit_field(&mut self.ctx.cp, PUTFIELD, owner, name, &descriptor)
            }
            _ => Err(CodeGenError::unsupported("assignment to something other than a local or a field")),
        }
    }

    /// Converts the value on the stack from `from` to `to`: boxing, unboxing
    /// and `checkcast` for narrowing reference conversions.
    pub(super) fn coerce(&mut self, from: &TypeRef, to: &TypeRef) -> CodeGenResult<()> {
        if to.is_void() || from.is_void() {
            return Ok(());
        }
        match (from.primitive_type(), to.primitive_type()) {
            (Some(a), Some(b)) if a == b || (a.is_int_like() && b.is_int_like()) => Ok(()),
            (Some(a), Some(b)) => Err(CodeGenError::unsupported(format!("conversion from {} to {}", a.name(), b.name()))),
            (Some(p), None) => {
                self.code.emit_box(&mut self.ctx.cp, p)?;
                let boxed = TypeHierarchyOracle::boxed(from);
                self.coerce(&boxed, to)
            }
            (None, Some(p)) => {
                let wrapper = p
                    .box_class()
                    .ok_or_else(|| CodeGenError::unsupported(format!("unboxing to {}", p.name())))?;
                if TypeHierarchyOracle::erase(from).class_name() != Some(wrapper) {
                    self.code.emit_type_op(&mut self.ctx.cp, CHECKCAST, wrapper)?;
                }
                self.code.emit_unbox(&mut self.ctx.cp, p)
            }
            (None, None) => {
                if self.needs_checkcast(from, to) {
                    self.code.emit_type_op(&mut self.ctx.cp, CHECKCAST, &class_constant_name(to))?;
                }
                Ok(())
            }
        }
    }

    fn needs_checkcast(&self, from: &TypeRef, to: &TypeRef) -> bool {
        let from_desc = type_to_descriptor(from);
        let to_desc = type_to_descriptor(to);
        if from_desc == to_desc || to_desc == "Ljava/lang/Object;" {
            return false;
        }
        let from_erased = TypeHierarchyOracle::erase(from);
        let to_erased = TypeHierarchyOracle::erase(to);
        match (from_erased.class_name(), to_erased.class_name()) {
            (Some(sub), Some(sup)) => !self.ctx.oracle.is_subclass(sub, sup).unwrap_or(false),
            _ => true,
        }
    }

    // ------------------------------------------------------------------
    // Conditions
    // ------------------------------------------------------------------

    /// Pushes 1 or 0 for a boolean expression that is compiled as jumps.
    fn gen_bool_value(&mut self, expr: &Expr) -> CodeGenResult<()> {
        let is_false = self.code.new_label();
        let end = self.code.new_label();
        self.gen_cond(expr, is_false, false)?;
        self.code.emit_int(&mut self.ctx.cp, 1)?;
        self.code.emit_jump(GOTO, end)?;
        self.code.place(is_false);
        self.code.emit_int(&mut self.ctx.cp, 0)?;
        self.code.place(end);
        Ok(())
    }

    /// Jumps to `target` when `cond` evaluates to `jump_if`, falls through otherwise.
    pub(super) fn gen_cond(&mut self, cond: &Expr, target: Label, jump_if: bool) -> CodeGenResult<()> {
        match &cond.kind {
            ExprKind::Literal(Literal::Bool(value)) => {
                if *value == jump_if {
                    self.code.emit_jump(GOTO, target)?;
                }
                Ok(())
            }
            ExprKind::Unary { op: UnaryOp::Not, operand } => self.gen_cond(operand, target, !jump_if),
            ExprKind::Binary { op: BinaryOp::And, left, right } => {
                if jump_if {
                    let skip = self.code.new_label();
                    self.gen_cond(left, skip, false)?;
                    self.gen_cond(right, target, true)?;
                    self.code.place(skip);
                } else {
                    self.gen_cond(left, target, false)?;
                    self.gen_cond(right, target, false)?;
                }
                Ok(())
            }
            ExprKind::Binary { op: BinaryOp::Or, left, right } => {
                if jump_if {
                    self.gen_cond(left, target, true)?;
                    self.gen_cond(right, target, true)?;
                } else {
                    let skip = self.code.new_label();
                    self.gen_cond(left, skip, true)?;
                    self.gen_cond(right, target, false)?;
                    self.code.place(skip);
                }
                Ok(())
            }
            ExprKind::Binary { op, left, right } if op.is_comparison() => {
                self.gen_comparison(*op, left, right, target, jump_if)
            }
            ExprKind::InstanceOf { expr, target: tested, binding } => {
                self.gen_instanceof(expr, tested, binding.as_deref(), target, jump_if)
            }
            _ => {
                self.gen_expr_as(cond, &TypeRef::boolean())?;
                self.code.emit_jump(if jump_if { IFNE } else { IFEQ }, target)
            }
        }
    }

    fn gen_comparison(&mut self, op: BinaryOp, left: &Expr, right: &Expr, target: Label, jump_if: bool) -> CodeGenResult<()> {
        let is_null = |e: &Expr| matches!(e.kind, ExprKind::Literal(Literal::Null));
        let reference_equality = matches!(op, BinaryOp::Eq | BinaryOp::Ne);
        let branch = if is_null(left) || is_null(right) {
            let other = if is_null(left) { right } else { left };
            self.gen_expr(other)?;
            if op == BinaryOp::Eq {
                IFNULL
            } else {
                IFNONNULL
            }
        } else if reference_equality && left.ty.is_reference() && right.ty.is_reference() {
            self.gen_expr(left)?;
            self.gen_expr(right)?;
            if op == BinaryOp::Eq {
                IF_ACMPEQ
            } else {
                IF_ACMPNE
            }
        } else {
            self.gen_expr_as(left, &TypeRef::int())?;
            self.gen_expr_as(right, &TypeRef::int())?;
            match op {
                BinaryOp::Eq => IF_ICMPEQ,
                BinaryOp::Ne => IF_ICMPNE,
                BinaryOp::Lt => IF_ICMPLT,
                BinaryOp::Le => IF_ICMPLE,
                BinaryOp::Gt => IF_ICMPGT,
                _ => IF_ICMPGE,
            }
        };
        self.code.emit_jump(if jump_if { branch } else { negate(branch) }, target)
    }

    /// `e instanceof T` and `e instanceof T t`. The binding is only stored on
    /// the path where the test succeeded.
    fn gen_instanceof(
        &mut self,
        expr: &Expr,
        tested: &TypeRef,
        binding: Option<&str>,
        target: Label,
        jump_if: bool,
    ) -> CodeGenResult<()> {
        if tested.is_primitive() {
            return Err(CodeGenError::unsupported(format!("instanceof against primitive type {}", tested)));
        }
        let class = class_constant_name(tested);
        let binding = match binding {
            Some(binding) => binding,
            None => {
                self.gen_expr(expr)?;
                self.code.emit_type_op(&mut self.ctx.cp, INSTANCEOF, &class)?;
                return self.code.emit_jump(if jump_if { IFNE } else { IFEQ }, target);
            }
        };

        let value_desc = type_to_descriptor(&expr.ty);
        let value_slot = match &expr.kind {
            ExprKind::Local(name) => self.local(name)?.slot,
            _ => {
                let slot = self.temp(&value_desc);
                self.gen_expr(expr)?;
                self.code.emit_store(slot, &value_desc)?;
                slot
            }
        };
        self.code.emit_load(value_slot, &value_desc)?;
        self.code.emit_type_op(&mut self.ctx.cp, INSTANCEOF, &class)?;
        let failed = if jump_if { self.code.new_label() } else { target };
        self.code.emit_jump(IFEQ, failed)?;
        self.code.emit_load(value_slot, &value_desc)?;
        self.code.emit_type_op(&mut self.ctx.cp, CHECKCAST, &class)?;
        self.store_local(binding)?;
        if jump_if {
            self.code.emit_jump(GOTO, target)?;
            self.code.place(failed);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // invokedynamic users
    // ------------------------------------------------------------------

    fn gen_string_concat(&mut self, expr: &Expr) -> CodeGenResult<()> {
        let mut operands = Vec::new();
        flatten_concat(expr, &mut operands);

        let mut parts: Vec<ConcatPart> = Vec::new();
        let mut dynamic = Vec::new();
        for operand in &operands {
            match constant_text(operand) {
                Some(text) => match parts.last_mut() {
                    Some(ConcatPart::Constant(previous)) => previous.push_str(&text),
                    _ => parts.push(ConcatPart::Constant(text)),
                },
                None => {
                    parts.push(ConcatPart::Arg(type_to_descriptor(&operand.ty)));
                    dynamic.push(*operand);
                }
            }
        }

        let use_indy = self.ctx.config.supports_indy_string_concat()
            && dynamic.len() <= crate::consts::STRING_CONCAT_MAX_ARGS;
        if !use_indy {
            return self.gen_string_builder(&operands);
        }
        for operand in dynamic {
            self.gen_expr(operand)?;
        }
        let call_site = self.ctx.site_builder().build_string_concat(&parts)?;
        self.code.emit_invokedynamic(call_site.pool_index, &call_site.descriptor)
    }

    /// `new StringBuilder().append(..)...toString()` for targets before Java 9.
    fn gen_string_builder(&mut self, operands: &[&Expr]) -> CodeGenResult<()> {
        self.code.emit_new(&mut self.ctx.cp, STRING_BUILDER)?;
        self.code.emitop(DUP)?;
        self.code.emit_invoke(&mut self.ctx.cp, INVOKESPECIAL, STRING_BUILDER, CONSTRUCTOR_METHOD_NAME, "()V", false)?;
        for operand in operands {
            self.gen_expr(operand)?;
            let arg = match operand.ty.primitive_type() {
                Some(PrimitiveType::Boolean) => "Z",
                Some(PrimitiveType::Char) => "C",
                Some(_) => "I",
                None if is_string(&operand.ty) => "Ljava/lang/String;",
                None => "Ljava/lang/Object;",
            };
            let descriptor = format!("({})L{};", arg, STRING_BUILDER);
            self.code.emit_invoke(&mut self.ctx.cp, INVOKEVIRTUAL, STRING_BUILDER, "append", &descriptor, false)?;
        }
        self.code
            .emit_invoke(&mut self.ctx.cp, INVOKEVIRTUAL, STRING_BUILDER, "toString", "()Ljava/lang/String;", false)
    }

    /// Visible locals, innermost declaration of each name. Finality was already
    /// checked by the semantic pass, so everything counts as effectively final here.
    fn enclosing_scope(&self) -> EnclosingScope {
        let mut visible: Vec<VisibleLocal> = Vec::new();
        for (id, local) in self.locals.iter().enumerate().rev() {
            if visible.iter().any(|v| v.name == local.name) {
                continue;
            }
            visible.push(VisibleLocal {
                id,
                name: local.name.clone(),
                type_ref: local.ty.clone(),
                effectively_final: true,
            });
        }
        EnclosingScope::new(visible, self.is_static)
    }

    fn gen_lambda(&mut self, lambda: &LambdaExpr) -> CodeGenResult<()> {
        let analysis = LambdaCaptureAnalyzer::analyze(lambda, &self.enclosing_scope());
        let mut env = analysis.env;
        env.captures_instance &= !self.is_static;

        let name = self.ctx.lambdas.next_name(&self.member);
        let method = lift_lambda(lambda, &env, &name);
        let implementation = lifted_impl(&self.ctx.class_name, &method, self.ctx.is_interface);

        let mut captured = Vec::with_capacity(env.captured_locals.len() + 1);
        if env.captures_instance {
            self.load_this()?;
            captured.push(self.this_descriptor());
        }
        for (local, _) in &env.captured_locals {
            let local = self.local(local)?;
            let (slot, descriptor) = (local.slot, type_to_descriptor(&local.ty));
            self.code.emit_load(slot, &descriptor)?;
            captured.push(descriptor);
        }
        log::debug!("lambda {} in {} captures {} values", name, self.member, captured.len());
        self.ctx.lambdas.enqueue(method, &self.member);

        let params: Vec<TypeRef> = lambda.params.iter().map(|p| p.type_ref.clone()).collect();
        let instantiated = method_descriptor(&params, &lambda.return_type);
        let site = self.ctx.site_builder().build_lambda(&lambda.target, implementation, captured, &instantiated)?;
        self.emit_functional_site(&site)
    }

    fn gen_method_ref(&mut self, method_ref: &MethodRefExpr) -> CodeGenResult<()> {
        if let MethodRefKind::Bound(receiver) = &method_ref.kind {
            self.gen_expr_as(receiver, &TypeRef::class(method_ref.owner.clone()))?;
            // the receiver is null-checked where the reference is evaluated
            self.code.emitop(DUP)?;
            self.emit_require_non_null()?;
            self.code.emitop(POP)?;
        }
        let site = self.ctx.site_builder().build_method_ref(method_ref)?;
        self.emit_functional_site(&site)
    }

    fn emit_functional_site(&mut self, site: &FunctionalCallSite) -> CodeGenResult<()> {
        self.code.emit_invokedynamic(site.call_site.pool_index, &site.call_site.descriptor)?;
        self.ctx.lambdas.record(site);
        Ok(())
    }

    /// `Objects.requireNonNull(Object)`, leaving its result on the stack.
    pub(super) fn emit_require_non_null(&mut self) -> CodeGenResult<()> {
        self.code.emit_invoke(
            &mut self.ctx.cp,
            INVOKESTATIC,
            "java/util/Objects",
            "requireNonNull",
            "(Ljava/lang/Object;)Ljava/lang/Object;",
            false,
        )
    }
}

fn starts_with_constructor_call(body: &Block) -> bool {
    matches!(
        body.statements.first(),
        Some(Stmt::Expr { expr: Expr { kind: ExprKind::MethodCall { name, .. }, .. }, .. })
            if name == CONSTRUCTOR_METHOD_NAME
    )
}

fn is_string(ty: &TypeRef) -> bool {
    ty.class_name() == Some(crate::consts::STRING)
}

pub(super) fn return_op(ty: &TypeRef) -> u8 {
    if ty.is_void() {
        RETURN
    } else if ty.is_primitive() {
        IRETURN
    } else {
        ARETURN
    }
}

fn arithmetic_op(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::Add => IADD,
        BinaryOp::Sub => ISUB,
        BinaryOp::Mul => IMUL,
        BinaryOp::Div => IDIV,
        BinaryOp::Rem => IREM,
        BinaryOp::BitAnd => IAND,
        BinaryOp::BitOr => IOR,
        BinaryOp::BitXor => IXOR,
        BinaryOp::Shl => ISHL,
        _ => ISHR,
    }
}

/// Operands of a chain of string `+`, left to right.
fn flatten_concat<'e>(expr: &'e Expr, out: &mut Vec<&'e Expr>) {
    match &expr.kind {
        ExprKind::Binary { op: BinaryOp::Add, left, right } if is_string(&expr.ty) => {
            flatten_concat(left, out);
            flatten_concat(right, out);
        }
        _ => out.push(expr),
    }
}

/// Literal operands are folded into the recipe.
fn constant_text(expr: &Expr) -> Option<String> {
    match &expr.kind {
        ExprKind::Literal(Literal::String(s)) => Some(s.clone()),
        ExprKind::Literal(Literal::Int(v)) => Some(v.to_string()),
        ExprKind::Literal(Literal::Char(c)) => Some(c.to_string()),
        ExprKind::Literal(Literal::Bool(b)) => Some(b.to_string()),
        ExprKind::Literal(Literal::Null) => Some("null".to_string()),
        _ => None,
    }
}

/// `instanceof` bindings of one statement-level expression. Lambda bodies and
/// switch bodies declare their own.
#[derive(Default)]
struct BindingCollector {
    bindings: Vec<(String, TypeRef)>,
}

impl Visitor for BindingCollector {
    fn visit_switch(&mut self, switch: &SwitchConstruct) {
        self.visit_expr(&switch.selector);
    }

    fn visit_lambda(&mut self, _lambda: &LambdaExpr) {}

    fn declare_local(&mut self, name: &str, ty: &TypeRef, kind: LocalKind) {
        if matches!(kind, LocalKind::Binding) {
            self.bindings.push((name.to_string(), ty.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::opcodes::instructions;

    fn oracle() -> TypeHierarchyOracle {
        TypeHierarchyOracle::with_builtins()
    }

    fn class() -> ClassDecl {
        ClassDecl::new("p/T", ClassKind::Class)
    }

    fn static_method(params: Vec<Parameter>, ret: TypeRef, body: Vec<Stmt>) -> MethodDecl {
        let mut m = MethodDecl::new("m", params, ret, Some(Block::new(body)));
        m.modifiers.push(Modifier::Static);
        m
    }

    fn opcodes(finished: &FinishedCode) -> Vec<u8> {
        instructions(&finished.code).into_iter().map(|(_, op)| op).collect()
    }

    fn generate(method: &MethodDecl, config: &Config) -> (FinishedCode, ClassContext<'static>) {
        let oracle: &'static TypeHierarchyOracle = Box::leak(Box::new(oracle()));
        let config: &'static Config = Box::leak(Box::new(config.clone()));
        let mut ctx = ClassContext::new(&class(), oracle, config);
        let finished = Gen::new(&mut ctx, method, &method.name).unwrap().generate(method).unwrap();
        (finished, ctx)
    }

    #[test]
    fn void_body_gets_trailing_return() {
        let (finished, _) = generate(&static_method(vec![], TypeRef::void(), vec![]), &Config::default());
        assert_eq!(finished.code, vec![RETURN]);
    }

    #[test]
    fn constructor_calls_super() {
        let ctor = MethodDecl::new("<init>", vec![], TypeRef::void(), Some(Block::new(vec![])));
        let (finished, ctx) = generate(&ctor, &Config::default());
        assert_eq!(opcodes(&finished), vec![ALOAD_0, INVOKESPECIAL, RETURN]);
        assert_eq!(ctx.superclass, OBJECT);
    }

    #[test]
    fn instanceof_binding_survives_negated_if() {
        // if (!(o instanceof String s)) return 0; return s.length();
        let o = Expr::local("o", TypeRef::object());
        let test = Expr::new(
            ExprKind::InstanceOf { expr: Box::new(o), target: TypeRef::string(), binding: Some("s".into()) },
            TypeRef::boolean(),
            Span::line(1),
        );
        let not = Expr::new(ExprKind::Unary { op: UnaryOp::Not, operand: Box::new(test) }, TypeRef::boolean(), Span::line(1));
        let length = Expr::new(
            ExprKind::MethodCall {
                target: Some(Box::new(Expr::local("s", TypeRef::string()))),
                owner: "java/lang/String".into(),
                name: "length".into(),
                descriptor: "()I".into(),
                args: vec![],
                invoke: InvokeKind::Virtual,
            },
            TypeRef::int(),
            Span::line(2),
        );
        let body = vec![
            Stmt::If {
                cond: not,
                then_branch: Box::new(Stmt::Return { value: Some(Expr::int(0)), span: Span::line(1) }),
                else_branch: None,
                span: Span::line(1),
            },
            Stmt::Return { value: Some(length), span: Span::line(2) },
        ];
        let method = static_method(vec![Parameter::new("o", TypeRef::object())], TypeRef::int(), body);
        let (finished, _) = generate(&method, &Config::default());
        let ops = opcodes(&finished);
        assert_eq!(ops.iter().filter(|op| **op == INSTANCEOF).count(), 1);
        assert_eq!(ops.iter().filter(|op| **op == CHECKCAST).count(), 1);
        assert!(finished.stack_map.is_some());
        assert_eq!(finished.max_locals, 2);
    }

    #[test]
    fn string_concat_uses_indy_or_builder() {
        let concat = Expr::new(
            ExprKind::Binary {
                op: BinaryOp::Add,
                left: Box::new(Expr::string("n=")),
                right: Box::new(Expr::local("n", TypeRef::int())),
            },
            TypeRef::string(),
            Span::line(1),
        );
        let method = static_method(
            vec![Parameter::new("n", TypeRef::int())],
            TypeRef::string(),
            vec![Stmt::Return { value: Some(concat), span: Span::line(1) }],
        );
        let (finished, ctx) = generate(&method, &Config::default());
        assert_eq!(opcodes(&finished), vec![ILOAD_0, INVOKEDYNAMIC, ARETURN]);
        assert_eq!(ctx.bootstrap.len(), 1);

        let old = Config::default().with_target(crate::codegen::defs::major_versions::JAVA_8);
        let (finished, ctx) = generate(&method, &old);
        assert!(!opcodes(&finished).contains(&INVOKEDYNAMIC));
        assert!(ctx.bootstrap.is_empty());
    }

    #[test]
    fn break_outside_loop_is_rejected() {
        let oracle = oracle();
        let config = Config::default();
        let mut ctx = ClassContext::new(&class(), &oracle, &config);
        let method = static_method(vec![], TypeRef::void(), vec![Stmt::Break { span: Span::line(1) }]);
        let err = Gen::new(&mut ctx, &method, "m").unwrap().generate(&method).unwrap_err();
        assert!(matches!(err, CodeGenError::MisplacedJump { keyword: "break", .. }));
    }

    #[test]
    fn capturing_lambda_loads_captured_local() {
        let runnable = FunctionalTarget::new(TypeRef::class("java/util/function/IntSupplier"));
        let lambda = LambdaExpr {
            params: vec![],
            body: LambdaBody::Expr(Box::new(Expr::local("x", TypeRef::int()))),
            target: runnable,
            return_type: TypeRef::int(),
            span: Span::line(1),
        };
        let expr = Expr::new(
            ExprKind::Lambda(Box::new(lambda)),
            TypeRef::class("java/util/function/IntSupplier"),
            Span::line(1),
        );
        let method = static_method(
            vec![Parameter::new("x", TypeRef::int())],
            TypeRef::class("java/util/function/IntSupplier"),
            vec![Stmt::Return { value: Some(expr), span: Span::line(1) }],
        );
        let (finished, mut ctx) = generate(&method, &Config::default());
        assert_eq!(opcodes(&finished), vec![ILOAD_0, INVOKEDYNAMIC, ARETURN]);
        let pending = ctx.lambdas.next_pending().unwrap();
        assert_eq!(pending.method.name, "lambda$0");
        assert!(pending.method.is_static());
        assert_eq!(pending.method.params.len(), 1);
    }
}
