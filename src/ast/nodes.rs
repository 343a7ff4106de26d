//! AST node definitions

use super::{AstNode, Span};
use std::fmt;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Void,
}

impl PrimitiveType {
    pub fn descriptor(self) -> char {
        match self {
            PrimitiveType::Boolean => 'Z',
            PrimitiveType::Byte => 'B',
            PrimitiveType::Char => 'C',
            PrimitiveType::Short => 'S',
            PrimitiveType::Int => 'I',
            PrimitiveType::Long => 'J',
            PrimitiveType::Float => 'F',
            PrimitiveType::Double => 'D',
            PrimitiveType::Void => 'V',
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::Byte => "byte",
            PrimitiveType::Char => "char",
            PrimitiveType::Short => "short",
            PrimitiveType::Int => "int",
            PrimitiveType::Long => "long",
            PrimitiveType::Float => "float",
            PrimitiveType::Double => "double",
            PrimitiveType::Void => "void",
        }
    }

    /// Wrapper class in internal form, `None` for `void`.
    pub fn box_class(self) -> Option<&'static str> {
        match self {
            PrimitiveType::Boolean => Some("java/lang/Boolean"),
            PrimitiveType::Byte => Some("java/lang/Byte"),
            PrimitiveType::Char => Some("java/lang/Character"),
            PrimitiveType::Short => Some("java/lang/Short"),
            PrimitiveType::Int => Some("java/lang/Integer"),
            PrimitiveType::Long => Some("java/lang/Long"),
            PrimitiveType::Float => Some("java/lang/Float"),
            PrimitiveType::Double => Some("java/lang/Double"),
            PrimitiveType::Void => None,
        }
    }

    pub fn from_box_class(name: &str) -> Option<PrimitiveType> {
        [
            PrimitiveType::Boolean,
            PrimitiveType::Byte,
            PrimitiveType::Char,
            PrimitiveType::Short,
            PrimitiveType::Int,
            PrimitiveType::Long,
            PrimitiveType::Float,
            PrimitiveType::Double,
        ]
        .into_iter()
        .find(|p| p.box_class() == Some(name))
    }

    /// Types whose values live in a single `int` slot on the operand stack.
    pub fn is_int_like(self) -> bool {
        matches!(
            self,
            PrimitiveType::Boolean
                | PrimitiveType::Byte
                | PrimitiveType::Char
                | PrimitiveType::Short
                | PrimitiveType::Int
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Primitive(PrimitiveType),
    /// Class or interface type. `name` is the internal binary name (`p/Outer$Inner`).
    /// `owner` is present when the source names a member type through a
    /// parameterized outer type, e.g. `X<String>.MX<Thread>`.
    Class {
        name: String,
        args: Vec<TypeArg>,
        owner: Option<Box<TypeRef>>,
    },
    /// Type variable with its erased bound (`None` means `java/lang/Object`).
    TypeVar {
        name: String,
        bound: Option<Box<TypeRef>>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeRef {
    pub kind: TypeKind,
    pub array_dims: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeArg {
    Type(TypeRef),
    Wildcard(WildcardType),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WildcardType {
    pub bound: Option<(BoundKind, TypeRef)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundKind {
    Extends,
    Super,
}

impl TypeRef {
    pub fn primitive(p: PrimitiveType) -> Self {
        Self { kind: TypeKind::Primitive(p), array_dims: 0 }
    }

    pub fn int() -> Self {
        Self::primitive(PrimitiveType::Int)
    }

    pub fn boolean() -> Self {
        Self::primitive(PrimitiveType::Boolean)
    }

    pub fn void() -> Self {
        Self::primitive(PrimitiveType::Void)
    }

    pub fn class(name: impl Into<String>) -> Self {
        Self {
            kind: TypeKind::Class { name: name.into(), args: Vec::new(), owner: None },
            array_dims: 0,
        }
    }

    pub fn object() -> Self {
        Self::class("java/lang/Object")
    }

    pub fn string() -> Self {
        Self::class("java/lang/String")
    }

    pub fn type_var(name: impl Into<String>) -> Self {
        Self { kind: TypeKind::TypeVar { name: name.into(), bound: None }, array_dims: 0 }
    }

    pub fn type_var_bounded(name: impl Into<String>, bound: TypeRef) -> Self {
        Self {
            kind: TypeKind::TypeVar { name: name.into(), bound: Some(Box::new(bound)) },
            array_dims: 0,
        }
    }

    pub fn with_args(mut self, type_args: Vec<TypeArg>) -> Self {
        if let TypeKind::Class { args, .. } = &mut self.kind {
            *args = type_args;
        }
        self
    }

    /// Shorthand for plain (non-wildcard) type arguments.
    pub fn with_type_args(self, type_args: Vec<TypeRef>) -> Self {
        self.with_args(type_args.into_iter().map(TypeArg::Type).collect())
    }

    pub fn with_owner(mut self, outer: TypeRef) -> Self {
        if let TypeKind::Class { owner, .. } = &mut self.kind {
            *owner = Some(Box::new(outer));
        }
        self
    }

    pub fn array_of(mut self, dims: usize) -> Self {
        self.array_dims += dims;
        self
    }

    pub fn primitive_type(&self) -> Option<PrimitiveType> {
        match self.kind {
            TypeKind::Primitive(p) if self.array_dims == 0 => Some(p),
            _ => None,
        }
    }

    pub fn is_primitive(&self) -> bool {
        self.primitive_type().is_some()
    }

    pub fn is_void(&self) -> bool {
        self.primitive_type() == Some(PrimitiveType::Void)
    }

    pub fn is_reference(&self) -> bool {
        !self.is_primitive()
    }

    pub fn is_array(&self) -> bool {
        self.array_dims > 0
    }

    pub fn is_int_like(&self) -> bool {
        self.primitive_type().map_or(false, PrimitiveType::is_int_like)
    }

    /// Internal class name for non-array class types.
    pub fn class_name(&self) -> Option<&str> {
        match &self.kind {
            TypeKind::Class { name, .. } if self.array_dims == 0 => Some(name),
            _ => None,
        }
    }

    pub fn type_var_name(&self) -> Option<&str> {
        match &self.kind {
            TypeKind::TypeVar { name, .. } if self.array_dims == 0 => Some(name),
            _ => None,
        }
    }

    pub fn type_args(&self) -> &[TypeArg] {
        match &self.kind {
            TypeKind::Class { args, .. } => args,
            _ => &[],
        }
    }

    pub fn owner(&self) -> Option<&TypeRef> {
        match &self.kind {
            TypeKind::Class { owner, .. } => owner.as_deref(),
            _ => None,
        }
    }

    pub fn element_type(&self) -> Option<TypeRef> {
        if self.array_dims == 0 {
            return None;
        }
        Some(Self { kind: self.kind.clone(), array_dims: self.array_dims - 1 })
    }

    /// True when this usage carries type arguments, directly or through its owner.
    pub fn is_parameterized(&self) -> bool {
        match &self.kind {
            TypeKind::Class { args, owner, .. } => {
                !args.is_empty() || owner.as_ref().map_or(false, |o| o.is_parameterized())
            }
            _ => false,
        }
    }

    /// True when a type variable occurs anywhere in this type.
    pub fn mentions_type_var(&self) -> bool {
        match &self.kind {
            TypeKind::Primitive(_) => false,
            TypeKind::TypeVar { .. } => true,
            TypeKind::Class { args, owner, .. } => {
                args.iter().any(|arg| match arg {
                    TypeArg::Type(t) => t.mentions_type_var(),
                    TypeArg::Wildcard(w) => w.bound.as_ref().map_or(false, |(_, b)| b.mentions_type_var()),
                }) || owner.as_ref().map_or(false, |o| o.mentions_type_var())
            }
        }
    }

    /// Collects every type variable name mentioned in this type.
    pub fn collect_type_vars(&self, into: &mut Vec<String>) {
        match &self.kind {
            TypeKind::Primitive(_) => {}
            TypeKind::TypeVar { name, .. } => {
                if !into.contains(name) {
                    into.push(name.clone());
                }
            }
            TypeKind::Class { args, owner, .. } => {
                for arg in args {
                    match arg {
                        TypeArg::Type(t) => t.collect_type_vars(into),
                        TypeArg::Wildcard(WildcardType { bound: Some((_, b)) }) => b.collect_type_vars(into),
                        TypeArg::Wildcard(_) => {}
                    }
                }
                if let Some(o) = owner {
                    o.collect_type_vars(into);
                }
            }
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TypeKind::Primitive(p) => write!(f, "{}", p.name())?,
            TypeKind::TypeVar { name, .. } => write!(f, "{}", name)?,
            TypeKind::Class { name, args, .. } => {
                write!(f, "{}", name.replace(['/', '$'], "."))?;
                if !args.is_empty() {
                    write!(f, "<")?;
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ",")?;
                        }
                        match arg {
                            TypeArg::Type(t) => write!(f, "{}", t)?,
                            TypeArg::Wildcard(WildcardType { bound: None }) => write!(f, "?")?,
                            TypeArg::Wildcard(WildcardType { bound: Some((BoundKind::Extends, b)) }) => {
                                write!(f, "? extends {}", b)?
                            }
                            TypeArg::Wildcard(WildcardType { bound: Some((BoundKind::Super, b)) }) => {
                                write!(f, "? super {}", b)?
                            }
                        }
                    }
                    write!(f, ">")?;
                }
            }
        }
        for _ in 0..self.array_dims {
            write!(f, "[]")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeParam {
    pub name: String,
    pub bounds: Vec<TypeRef>,
    pub span: Span,
}

impl TypeParam {
    pub fn new(name: impl Into<String>, bounds: Vec<TypeRef>) -> Self {
        Self { name: name.into(), bounds, span: Span::default() }
    }
}

// ---------------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    Public,
    Protected,
    Private,
    Static,
    Final,
    Abstract,
    Sealed,
    NonSealed,
    Synchronized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    Class,
    Interface,
    Enum,
    Record,
}

#[derive(Debug, Clone)]
pub struct CompilationUnit {
    pub package: Option<String>,
    pub types: Vec<ClassDecl>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ClassDecl {
    /// Internal binary name, e.g. `p/Outer$Inner`.
    pub name: String,
    pub kind: ClassKind,
    pub modifiers: Vec<Modifier>,
    pub type_params: Vec<TypeParam>,
    pub extends: Option<TypeRef>,
    /// Implemented interfaces; for an interface, the interfaces it extends.
    pub implements: Vec<TypeRef>,
    pub permits: Vec<TypeRef>,
    pub fields: Vec<FieldDecl>,
    pub methods: Vec<MethodDecl>,
    pub enum_constants: Vec<String>,
    pub record_components: Vec<Parameter>,
    pub span: Span,
}

impl ClassDecl {
    pub fn new(name: impl Into<String>, kind: ClassKind) -> Self {
        Self {
            name: name.into(),
            kind,
            modifiers: vec![Modifier::Public],
            type_params: Vec::new(),
            extends: None,
            implements: Vec::new(),
            permits: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            enum_constants: Vec::new(),
            record_components: Vec::new(),
            span: Span::default(),
        }
    }

    pub fn has_modifier(&self, modifier: Modifier) -> bool {
        self.modifiers.contains(&modifier)
    }

    pub fn is_interface(&self) -> bool {
        self.kind == ClassKind::Interface
    }

    pub fn simple_name(&self) -> &str {
        let tail = self.name.rsplit('/').next().unwrap_or(&self.name);
        tail.rsplit('$').next().unwrap_or(tail)
    }
}

impl AstNode for ClassDecl {
    fn span(&self) -> Span {
        self.span
    }
}

#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub name: String,
    pub modifiers: Vec<Modifier>,
    pub type_ref: TypeRef,
    pub span: Span,
}

impl FieldDecl {
    pub fn new(name: impl Into<String>, type_ref: TypeRef) -> Self {
        Self { name: name.into(), modifiers: Vec::new(), type_ref, span: Span::default() }
    }

    pub fn is_static(&self) -> bool {
        self.modifiers.contains(&Modifier::Static)
    }
}

#[derive(Debug, Clone)]
pub struct MethodDecl {
    /// Method name; constructors use `<init>`.
    pub name: String,
    pub modifiers: Vec<Modifier>,
    pub type_params: Vec<TypeParam>,
    pub params: Vec<Parameter>,
    pub return_type: TypeRef,
    pub throws: Vec<TypeRef>,
    pub body: Option<Block>,
    pub synthetic: bool,
    pub bridge: bool,
    pub span: Span,
}

impl MethodDecl {
    pub fn new(name: impl Into<String>, params: Vec<Parameter>, return_type: TypeRef, body: Option<Block>) -> Self {
        Self {
            name: name.into(),
            modifiers: vec![Modifier::Public],
            type_params: Vec::new(),
            params,
            return_type,
            throws: Vec::new(),
            body,
            synthetic: false,
            bridge: false,
            span: Span::default(),
        }
    }

    pub fn has_modifier(&self, modifier: Modifier) -> bool {
        self.modifiers.contains(&modifier)
    }

    pub fn is_static(&self) -> bool {
        self.has_modifier(Modifier::Static)
    }

    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }
}

impl AstNode for MethodDecl {
    fn span(&self) -> Span {
        self.span
    }
}

#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub type_ref: TypeRef,
    pub is_final: bool,
    pub span: Span,
}

impl Parameter {
    pub fn new(name: impl Into<String>, type_ref: TypeRef) -> Self {
        Self { name: name.into(), type_ref, is_final: false, span: Span::default() }
    }
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Block {
    pub statements: Vec<Stmt>,
    pub span: Span,
}

impl Block {
    pub fn new(statements: Vec<Stmt>) -> Self {
        Self { statements, span: Span::default() }
    }
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Expr { expr: Expr, span: Span },
    LocalVar { name: String, type_ref: TypeRef, init: Option<Expr>, is_final: bool, span: Span },
    Block(Block),
    If { cond: Expr, then_branch: Box<Stmt>, else_branch: Option<Box<Stmt>>, span: Span },
    While { cond: Expr, body: Box<Stmt>, span: Span },
    Return { value: Option<Expr>, span: Span },
    Yield { value: Expr, span: Span },
    Break { span: Span },
    Continue { span: Span },
    Throw { expr: Expr, span: Span },
    Switch(Box<SwitchConstruct>),
}

impl AstNode for Stmt {
    fn span(&self) -> Span {
        match self {
            Stmt::Expr { span, .. }
            | Stmt::LocalVar { span, .. }
            | Stmt::If { span, .. }
            | Stmt::While { span, .. }
            | Stmt::Return { span, .. }
            | Stmt::Yield { span, .. }
            | Stmt::Break { span }
            | Stmt::Continue { span }
            | Stmt::Throw { span, .. } => *span,
            Stmt::Block(block) => block.span,
            Stmt::Switch(switch) => switch.span,
        }
    }
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    /// Static type assigned by the type checker; `void` for void calls.
    pub ty: TypeRef,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i32),
    Bool(bool),
    Char(char),
    String(String),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(self, BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge)
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeKind {
    Static,
    Virtual,
    Interface,
    Special,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Literal(Literal),
    Local(String),
    This,
    /// `target == None` means an unqualified access (implicit `this` or the owner's static).
    Field { target: Option<Box<Expr>>, owner: String, name: String, is_static: bool },
    MethodCall {
        target: Option<Box<Expr>>,
        owner: String,
        name: String,
        descriptor: String,
        args: Vec<Expr>,
        invoke: InvokeKind,
    },
    New { class: String, descriptor: String, args: Vec<Expr> },
    Binary { op: BinaryOp, left: Box<Expr>, right: Box<Expr> },
    Unary { op: UnaryOp, operand: Box<Expr> },
    /// Assignment to a local or a field.
    Assign { target: Box<Expr>, value: Box<Expr> },
    /// `x++`, `--x` and friends on an `int` local.
    Increment { name: String, delta: i32, prefix: bool },
    InstanceOf { expr: Box<Expr>, target: TypeRef, binding: Option<String> },
    Cast { target: TypeRef, expr: Box<Expr> },
    Conditional { cond: Box<Expr>, then_expr: Box<Expr>, else_expr: Box<Expr> },
    Lambda(Box<LambdaExpr>),
    MethodRef(Box<MethodRefExpr>),
    Switch(Box<SwitchConstruct>),
}

impl Expr {
    pub fn new(kind: ExprKind, ty: TypeRef, span: Span) -> Self {
        Self { kind, ty, span }
    }

    pub fn int(value: i32) -> Self {
        Self::new(ExprKind::Literal(Literal::Int(value)), TypeRef::int(), Span::default())
    }

    pub fn boolean(value: bool) -> Self {
        Self::new(ExprKind::Literal(Literal::Bool(value)), TypeRef::boolean(), Span::default())
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new(ExprKind::Literal(Literal::String(value.into())), TypeRef::string(), Span::default())
    }

    pub fn null() -> Self {
        Self::new(ExprKind::Literal(Literal::Null), TypeRef::object(), Span::default())
    }

    pub fn local(name: impl Into<String>, ty: TypeRef) -> Self {
        Self::new(ExprKind::Local(name.into()), ty, Span::default())
    }

    pub fn this(class: impl Into<String>) -> Self {
        Self::new(ExprKind::This, TypeRef::class(class), Span::default())
    }

    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn is_true_literal(&self) -> bool {
        matches!(self.kind, ExprKind::Literal(Literal::Bool(true)))
    }

    pub fn is_false_literal(&self) -> bool {
        matches!(self.kind, ExprKind::Literal(Literal::Bool(false)))
    }
}

impl AstNode for Expr {
    fn span(&self) -> Span {
        self.span
    }
}

/// Functional interface a lambda or method reference is converted to, plus the
/// extra bounds of an intersection cast such as `(Runnable & Serializable)`.
#[derive(Debug, Clone)]
pub struct FunctionalTarget {
    pub interface: TypeRef,
    pub markers: Vec<TypeRef>,
}

impl FunctionalTarget {
    pub fn new(interface: TypeRef) -> Self {
        Self { interface, markers: Vec::new() }
    }

    pub fn with_markers(mut self, markers: Vec<TypeRef>) -> Self {
        self.markers = markers;
        self
    }
}

#[derive(Debug, Clone)]
pub enum LambdaBody {
    Expr(Box<Expr>),
    Block(Block),
}

#[derive(Debug, Clone)]
pub struct LambdaExpr {
    pub params: Vec<Parameter>,
    pub body: LambdaBody,
    pub target: FunctionalTarget,
    /// Return type of the instantiated functional descriptor.
    pub return_type: TypeRef,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum MethodRefKind {
    /// `Type::staticMethod`
    Static,
    /// `expr::method`, the receiver is evaluated once and captured.
    Bound(Box<Expr>),
    /// `Type::instanceMethod`, the receiver is the first functional argument.
    Unbound,
    /// `Type::new`
    Constructor,
}

#[derive(Debug, Clone)]
pub struct MethodRefExpr {
    pub target: FunctionalTarget,
    pub kind: MethodRefKind,
    pub owner: String,
    pub name: String,
    pub descriptor: String,
    pub owner_is_interface: bool,
    /// Instantiated functional descriptor, e.g. `(Ljava/lang/String;)Ljava/lang/Integer;`.
    pub instantiated: String,
    pub span: Span,
}

// ---------------------------------------------------------------------------
// Switch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SwitchConstruct {
    pub selector: Box<Expr>,
    pub cases: Vec<SwitchCase>,
    pub is_expression: bool,
    /// `case ... ->` rules rather than statement groups.
    pub uses_arrows: bool,
    /// Type of a switch expression.
    pub result_type: Option<TypeRef>,
    pub span: Span,
}

impl SwitchConstruct {
    pub fn new(selector: Expr, cases: Vec<SwitchCase>, is_expression: bool, uses_arrows: bool) -> Self {
        Self {
            selector: Box::new(selector),
            cases,
            is_expression,
            uses_arrows,
            result_type: None,
            span: Span::default(),
        }
    }

    /// `switch (sel) { case L -> e; ... }` yielding `result_type`.
    pub fn expression(selector: Expr, cases: Vec<SwitchCase>, result_type: TypeRef) -> Self {
        let mut switch = Self::new(selector, cases, true, true);
        switch.result_type = Some(result_type);
        switch
    }

    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn selector_type(&self) -> &TypeRef {
        &self.selector.ty
    }

    pub fn labels(&self) -> impl Iterator<Item = &CaseLabel> {
        self.cases.iter().map(|c| &c.label)
    }

    pub fn has_default(&self) -> bool {
        self.labels().any(CaseLabel::has_default)
    }

    pub fn has_null(&self) -> bool {
        self.labels().any(CaseLabel::has_null)
    }

    pub fn has_patterns(&self) -> bool {
        self.labels().any(|l| l.pattern().is_some())
    }
}

impl AstNode for SwitchConstruct {
    fn span(&self) -> Span {
        self.span
    }
}

#[derive(Debug, Clone)]
pub struct SwitchCase {
    pub label: CaseLabel,
    pub body: CaseBody,
    pub span: Span,
}

impl SwitchCase {
    /// Rule form with an expression body.
    pub fn arrow(label: CaseLabel, body: Expr) -> Self {
        let span = label.span;
        Self { label, body: CaseBody::Expr(body), span }
    }

    /// Rule form with a block body, or a colon-form statement group.
    pub fn block(label: CaseLabel, statements: Vec<Stmt>) -> Self {
        let span = label.span;
        Self { label, body: CaseBody::Block(statements), span }
    }

    pub fn statements(&self) -> &[Stmt] {
        match &self.body {
            CaseBody::Block(stmts) => stmts,
            CaseBody::Expr(_) => &[],
        }
    }
}

#[derive(Debug, Clone)]
pub enum CaseBody {
    /// `case L -> expr;`
    Expr(Expr),
    /// A statement group, or the block/throw of a rule.
    Block(Vec<Stmt>),
}

#[derive(Debug, Clone)]
pub struct CaseLabel {
    pub elements: Vec<CaseLabelElement>,
    /// Guard attached to the pattern of this label (`case P when g`).
    pub guard: Option<Expr>,
    pub span: Span,
}

impl CaseLabel {
    pub fn new(elements: Vec<CaseLabelElement>) -> Self {
        Self { elements, guard: None, span: Span::default() }
    }

    pub fn of_pattern(pattern: Pattern) -> Self {
        Self::new(vec![CaseLabelElement::Pattern(pattern)])
    }

    pub fn of_type(type_ref: TypeRef, binding: impl Into<String>) -> Self {
        Self::of_pattern(Pattern::type_pattern(type_ref, binding))
    }

    pub fn of_constants(constants: Vec<CaseConstant>) -> Self {
        Self::new(constants.into_iter().map(CaseLabelElement::Constant).collect())
    }

    pub fn default_label() -> Self {
        Self::new(vec![CaseLabelElement::Default])
    }

    pub fn null_label() -> Self {
        Self::new(vec![CaseLabelElement::Null])
    }

    /// `case null, default`
    pub fn null_default() -> Self {
        Self::new(vec![CaseLabelElement::Null, CaseLabelElement::Default])
    }

    pub fn when(mut self, guard: Expr) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn pattern(&self) -> Option<&Pattern> {
        self.elements.iter().find_map(|e| match e {
            CaseLabelElement::Pattern(p) => Some(p),
            _ => None,
        })
    }

    pub fn patterns(&self) -> impl Iterator<Item = &Pattern> {
        self.elements.iter().filter_map(|e| match e {
            CaseLabelElement::Pattern(p) => Some(p),
            _ => None,
        })
    }

    pub fn constants(&self) -> impl Iterator<Item = &CaseConstant> {
        self.elements.iter().filter_map(|e| match e {
            CaseLabelElement::Constant(c) => Some(c),
            _ => None,
        })
    }

    pub fn has_default(&self) -> bool {
        self.elements.iter().any(|e| matches!(e, CaseLabelElement::Default))
    }

    pub fn has_null(&self) -> bool {
        self.elements.iter().any(|e| matches!(e, CaseLabelElement::Null))
    }

    /// A guard that is the constant `true` guards nothing.
    pub fn is_guarded(&self) -> bool {
        self.guard.as_ref().map_or(false, |g| !g.is_true_literal())
    }

    /// Pattern variables introduced by this label, in declaration order.
    pub fn bindings(&self) -> Vec<(&str, &TypeRef)> {
        let mut out = Vec::new();
        for p in self.patterns() {
            p.collect_bindings(&mut out);
        }
        out
    }
}

#[derive(Debug, Clone)]
pub enum CaseLabelElement {
    Constant(CaseConstant),
    Pattern(Pattern),
    Null,
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CaseConstant {
    Int(i32),
    Char(char),
    Bool(bool),
    Str(String),
    /// `qualified` is true for `case Color.RED`, false for `case RED`.
    Enum { owner: String, name: String, qualified: bool },
}

impl CaseConstant {
    pub fn enum_constant(owner: impl Into<String>, name: impl Into<String>) -> Self {
        CaseConstant::Enum { owner: owner.into(), name: name.into(), qualified: false }
    }

    /// Integer value for switches lowered to `tableswitch`/`lookupswitch`.
    pub fn int_value(&self) -> Option<i32> {
        match self {
            CaseConstant::Int(v) => Some(*v),
            CaseConstant::Char(c) => Some(*c as i32),
            CaseConstant::Bool(b) => Some(*b as i32),
            _ => None,
        }
    }
}

impl fmt::Display for CaseConstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaseConstant::Int(v) => write!(f, "{}", v),
            CaseConstant::Char(c) => write!(f, "'{}'", c),
            CaseConstant::Bool(b) => write!(f, "{}", b),
            CaseConstant::Str(s) => write!(f, "\"{}\"", s),
            CaseConstant::Enum { name, .. } => write!(f, "{}", name),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Pattern {
    Type(TypePattern),
    Record(RecordPattern),
}

#[derive(Debug, Clone)]
pub struct TypePattern {
    pub type_ref: TypeRef,
    pub binding: String,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct RecordPattern {
    pub type_ref: TypeRef,
    pub components: Vec<Pattern>,
    pub span: Span,
}

impl Pattern {
    pub fn type_pattern(type_ref: TypeRef, binding: impl Into<String>) -> Self {
        Pattern::Type(TypePattern { type_ref, binding: binding.into(), span: Span::default() })
    }

    pub fn record(type_ref: TypeRef, components: Vec<Pattern>) -> Self {
        Pattern::Record(RecordPattern { type_ref, components, span: Span::default() })
    }

    pub fn type_ref(&self) -> &TypeRef {
        match self {
            Pattern::Type(p) => &p.type_ref,
            Pattern::Record(p) => &p.type_ref,
        }
    }

    pub fn collect_bindings<'a>(&'a self, out: &mut Vec<(&'a str, &'a TypeRef)>) {
        match self {
            Pattern::Type(p) => out.push((&p.binding, &p.type_ref)),
            Pattern::Record(p) => {
                for c in &p.components {
                    c.collect_bindings(out);
                }
            }
        }
    }
}

impl AstNode for Pattern {
    fn span(&self) -> Span {
        match self {
            Pattern::Type(p) => p.span,
            Pattern::Record(p) => p.span,
        }
    }
}
