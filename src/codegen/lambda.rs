//! Lambda bodies as synthetic methods, and `$deserializeLambda$`.

use std::collections::{HashMap, VecDeque};

use crate::ast::*;
use crate::config::{Config, LambdaNaming};
use crate::wash::capture::CapturedEnvironment;

use super::code::{Code, FinishedCode, Label};
use super::constpool::{ConstantPool, ReferenceKind};
use super::descriptor::{descriptor_to_internal, method_descriptor_of, primitive_of_descriptor};
use super::error::CodeGenResult;
use super::indy::{FunctionalCallSite, ImplMethod};
use super::opcodes::*;
use super::string_switch::emit_string_index;
use super::switch_optimizer::SwitchOptimizer;

const SERIALIZED_LAMBDA: &str = "java/lang/invoke/SerializedLambda";
const STRING_DESC: &str = "Ljava/lang/String;";

/// Hands out `lambda$N` / `lambda$<member>$N` names, unique within one class.
#[derive(Debug, Clone)]
pub struct LambdaNamer {
    policy: LambdaNaming,
    next: usize,
    per_member: HashMap<String, usize>,
}

impl LambdaNamer {
    pub fn new(policy: LambdaNaming) -> Self {
        Self { policy, next: 0, per_member: HashMap::new() }
    }

    pub fn next_name(&mut self, member: &str) -> String {
        match self.policy {
            LambdaNaming::PerClass => {
                let n = self.next;
                self.next += 1;
                format!("lambda${}", n)
            }
            LambdaNaming::PerMember => {
                let member = match member {
                    "<init>" => "new",
                    "<clinit>" => "static",
                    other => other,
                };
                let counter = self.per_member.entry(member.to_string()).or_insert(0);
                let n = *counter;
                *counter += 1;
                format!("lambda${}${}", member, n)
            }
        }
    }
}

/// A lifted body waiting to be generated, with the member whose source contains it.
#[derive(Debug, Clone)]
pub struct PendingLambda {
    pub method: MethodDecl,
    pub member: String,
}

/// Per-class lambda bookkeeping: names, lifted bodies, serializable sites.
#[derive(Debug)]
pub struct LambdaRegistry {
    namer: LambdaNamer,
    pending: VecDeque<PendingLambda>,
    serializable: Vec<FunctionalCallSite>,
}

impl LambdaRegistry {
    pub fn new(config: &Config) -> Self {
        Self { namer: LambdaNamer::new(config.lambda_naming), pending: VecDeque::new(), serializable: Vec::new() }
    }

    pub fn next_name(&mut self, member: &str) -> String {
        self.namer.next_name(member)
    }

    pub fn enqueue(&mut self, method: MethodDecl, member: &str) {
        self.pending.push_back(PendingLambda { method, member: member.to_string() });
    }

    pub fn next_pending(&mut self) -> Option<PendingLambda> {
        self.pending.pop_front()
    }

    pub fn record(&mut self, site: &FunctionalCallSite) {
        if site.serializable {
            self.serializable.push(site.clone());
        }
    }

    pub fn serializable_sites(&self) -> &[FunctionalCallSite] {
        &self.serializable
    }
}

/// The synthetic method holding a lambda body: captured locals first, then the
/// lambda's own parameters. Static unless the body uses `this`.
pub fn lift_lambda(lambda: &LambdaExpr, env: &CapturedEnvironment, name: &str) -> MethodDecl {
    let mut params: Vec<Parameter> = env
        .captured_locals
        .iter()
        .map(|(local, ty)| Parameter { is_final: true, ..Parameter::new(local.clone(), ty.clone()) })
        .collect();
    params.extend(lambda.params.iter().cloned());

    let span = lambda.span;
    let statements = match &lambda.body {
        LambdaBody::Block(block) => block.statements.clone(),
        LambdaBody::Expr(expr) if lambda.return_type.is_void() => vec![Stmt::Expr { expr: (**expr).clone(), span }],
        LambdaBody::Expr(expr) => vec![Stmt::Return { value: Some((**expr).clone()), span }],
    };
    let mut method = MethodDecl::new(name, params, lambda.return_type.clone(), Some(Block { statements, span }));
    method.modifiers = vec![Modifier::Private];
    if !env.captures_instance {
        method.modifiers.push(Modifier::Static);
    }
    method.synthetic = true;
    method.span = span;
    method
}

/// Handle target for a lifted body of `class`.
pub fn lifted_impl(class: &str, method: &MethodDecl, class_is_interface: bool) -> ImplMethod {
    ImplMethod {
        kind: if method.is_static() { ReferenceKind::InvokeStatic } else { ReferenceKind::InvokeSpecial },
        owner: class.to_string(),
        name: method.name.clone(),
        descriptor: method_descriptor_of(method),
        is_interface: class_is_interface,
    }
}

/// Body of `private static Object $deserializeLambda$(SerializedLambda)`.
///
/// Dispatches on `getImplMethodName()` by hash then `equals`, checks the rest
/// of the serialized form against each candidate site, reloads the captured
/// arguments and re-runs the original call site.
pub fn generate_deserialize_lambda(cp: &mut ConstantPool, sites: &[FunctionalCallSite]) -> CodeGenResult<FinishedCode> {
    log::debug!("generating $deserializeLambda$ for {} call sites", sites.len());
    let mut code = Code::new(None, false, &[format!("L{};", SERIALIZED_LAMBDA)])?;
    code.name_parameter("lambda", &format!("L{};", SERIALIZED_LAMBDA), 0);
    let name_slot = code.declare_local(None, STRING_DESC);
    let index_slot = code.declare_local(None, "I");

    let mut names: Vec<&str> = Vec::new();
    let mut groups: Vec<Vec<&FunctionalCallSite>> = Vec::new();
    for site in sites {
        let name = site.implementation.name.as_str();
        match names.iter().position(|n| *n == name) {
            Some(i) => groups[i].push(site),
            None => {
                names.push(name);
                groups.push(vec![site]);
            }
        }
    }

    code.emit_load(0, &format!("L{};", SERIALIZED_LAMBDA))?;
    code.emit_invoke(cp, INVOKEVIRTUAL, SERIALIZED_LAMBDA, "getImplMethodName", "()Ljava/lang/String;", false)?;
    code.emit_store(name_slot, STRING_DESC)?;
    emit_string_index(&mut code, cp, name_slot, index_slot, &names)?;

    let fail = code.new_label();
    let mut dispatch = SwitchOptimizer::new(fail);
    let group_labels: Vec<_> = (0..groups.len()).map(|_| code.new_label()).collect();
    for (i, label) in group_labels.iter().enumerate() {
        dispatch.add_case(i as i32, *label);
    }
    code.emit_load(index_slot, "I")?;
    code.emit_switch(&dispatch.optimize())?;

    for (label, group) in group_labels.into_iter().zip(&groups) {
        code.place(label);
        for site in group {
            let next = code.new_label();
            emit_site_checks(&mut code, cp, site, next)?;
            for (i, captured) in site.captured.iter().enumerate() {
                code.emit_load(0, &format!("L{};", SERIALIZED_LAMBDA))?;
                code.emit_int(cp, i as i32)?;
                code.emit_invoke(cp, INVOKEVIRTUAL, SERIALIZED_LAMBDA, "getCapturedArg", "(I)Ljava/lang/Object;", false)?;
                match primitive_of_descriptor(captured) {
                    Some(p) => {
                        let wrapper = p.box_class().unwrap_or(crate::consts::OBJECT);
                        code.emit_type_op(cp, CHECKCAST, wrapper)?;
                        code.emit_unbox(cp, p)?;
                    }
                    None => code.emit_type_op(cp, CHECKCAST, descriptor_to_internal(captured))?,
                }
            }
            code.emit_invokedynamic(site.call_site.pool_index, &site.call_site.descriptor)?;
            code.emitop(ARETURN)?;
            code.place(next);
        }
        code.emit_jump(GOTO, fail)?;
    }

    code.place(fail);
    code.emit_new(cp, "java/lang/IllegalArgumentException")?;
    code.emitop(DUP)?;
    code.emit_string(cp, "Invalid lambda deserialization")?;
    code.emit_invoke(cp, INVOKESPECIAL, "java/lang/IllegalArgumentException", "<init>", "(Ljava/lang/String;)V", false)?;
    code.emitop(ATHROW)?;
    code.finish(cp, super::defs::DESERIALIZE_LAMBDA_NAME)
}

/// Jumps to `mismatch` unless the serialized form describes `site`.
fn emit_site_checks(code: &mut Code, cp: &mut ConstantPool, site: &FunctionalCallSite, mismatch: Label) -> CodeGenResult<()> {
    let lambda_desc = format!("L{};", SERIALIZED_LAMBDA);
    code.emit_load(0, &lambda_desc)?;
    code.emit_invoke(cp, INVOKEVIRTUAL, SERIALIZED_LAMBDA, "getImplMethodKind", "()I", false)?;
    code.emit_int(cp, site.implementation.kind as i32)?;
    code.emit_jump(IF_ICMPNE, mismatch)?;

    let checks: [(&str, &str); 5] = [
        ("getFunctionalInterfaceClass", &site.interface),
        ("getFunctionalInterfaceMethodName", &site.sam.name),
        ("getFunctionalInterfaceMethodSignature", &site.sam.descriptor),
        ("getImplClass", &site.implementation.owner),
        ("getImplMethodSignature", &site.implementation.descriptor),
    ];
    for (getter, expected) in checks {
        code.emit_load(0, &lambda_desc)?;
        code.emit_invoke(cp, INVOKEVIRTUAL, SERIALIZED_LAMBDA, getter, "()Ljava/lang/String;", false)?;
        code.emit_string(cp, expected)?;
        code.emit_invoke(cp, INVOKEVIRTUAL, crate::consts::STRING, "equals", "(Ljava/lang/Object;)Z", false)?;
        code.emit_jump(IFEQ, mismatch)?;
    }
    Ok(())
}
