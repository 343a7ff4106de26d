//! Class writer: turns one class or interface declaration into a [`ClassFile`].
//!
//! Method bodies are generated through [`Gen`]; methods whose analysis found
//! errors become problem methods that throw `java.lang.Error`. Lambda bodies
//! lifted while generating are drained afterwards, then `$deserializeLambda$`
//! is added when a serializable call site was emitted. `BootstrapMethods` is
//! written last so every call site of the class is in the table.

use crate::ast::*;
use crate::common::diagnostics::Diagnostic;
use crate::common::hierarchy::TypeHierarchyOracle;
use crate::config::Config;
use crate::wash::ClassAnalysis;

use super::attribute::{
    make_inner_classes_attribute, make_line_number_table_attribute, make_local_variable_table_attribute,
    make_signature_attribute, make_source_file_attribute, AttributeInfo, CodeAttribute, InnerClassEntry,
};
use super::class::ClassFile;
use super::code::{Code, FinishedCode};
use super::constpool::ConstantPool;
use super::defs::access_flags::*;
use super::defs::{CONSTRUCTOR_METHOD_NAME, DESERIALIZE_LAMBDA_DESCRIPTOR, DESERIALIZE_LAMBDA_NAME};
use super::descriptor::{class_constant_name, method_descriptor_of, type_to_descriptor};
use super::error::{CodeGenError, CodeGenResult};
use super::field::FieldInfo;
use super::frame::make_stack_map_attribute;
use super::gen::{ClassContext, Gen};
use super::lambda::generate_deserialize_lambda;
use super::method::MethodInfo;
use super::opcodes::*;
use super::signature::GenericSignatureEncoder;
use super::switch_lowering::LoweredSwitch;

const ERROR_CLASS: &str = "java/lang/Error";

/// Everything produced for one class besides the bytes.
#[derive(Debug)]
pub struct WrittenClass {
    pub class_file: ClassFile,
    /// Switches in emission order, lambda bodies included.
    pub switches: Vec<LoweredSwitch>,
    /// Names of the methods emitted as problem methods.
    pub problem_methods: Vec<String>,
}

pub struct ClassWriter<'a> {
    oracle: &'a TypeHierarchyOracle,
    config: &'a Config,
}

impl<'a> ClassWriter<'a> {
    pub fn new(oracle: &'a TypeHierarchyOracle, config: &'a Config) -> Self {
        Self { oracle, config }
    }

    pub fn write_class(&self, class: &ClassDecl, analysis: &ClassAnalysis) -> CodeGenResult<WrittenClass> {
        if matches!(class.kind, ClassKind::Enum | ClassKind::Record) {
            return Err(CodeGenError::unsupported(format!("emitting {:?} declaration {}", class.kind, class.name)));
        }
        log::debug!("class writer: {} ({} methods, {} fields)", class.name, class.methods.len(), class.fields.len());

        let mut ctx = ClassContext::new(class, self.oracle, self.config);
        let encoder = GenericSignatureEncoder::new(self.oracle);
        let mut class_file = ClassFile::new();
        class_file.major_version = self.config.target;
        class_file.access_flags = class_flags(class);
        class_file.this_class = ctx.cp.add_class(&class.name)?;
        class_file.super_class = ctx.cp.add_class(&ctx.superclass)?;
        for interface in &class.implements {
            class_file.interfaces.push(ctx.cp.add_class(&class_constant_name(interface))?);
        }

        for field in &class.fields {
            let mut info = FieldInfo::new(
                member_flags(&field.modifiers),
                ctx.cp.add_utf8(&field.name)?,
                ctx.cp.add_utf8(&type_to_descriptor(&field.type_ref))?,
            );
            if let Some(signature) = encoder.encode_field(field) {
                info.attributes.push(make_signature_attribute(&mut ctx.cp, &signature)?);
            }
            class_file.fields.push(info);
        }

        let mut problem_methods = Vec::new();
        for method in &class.methods {
            let descriptor = method_descriptor_of(method);
            let errors: Vec<&Diagnostic> =
                analysis.method(&method.name, &descriptor).map(|a| a.errors().collect()).unwrap_or_default();
            let code = match &method.body {
                None => None,
                Some(_) if !errors.is_empty() => {
                    log::debug!("{}.{} has {} errors, emitting a problem method", class.name, method.name, errors.len());
                    problem_methods.push(method.name.clone());
                    Some(problem_body(&mut ctx, method, &errors)?)
                }
                Some(_) => Some(Gen::new(&mut ctx, method, &method.name)?.generate(method)?),
            };
            let mut info = self.method_info(&mut ctx.cp, method, class.is_interface(), code)?;
            if let Some(signature) = encoder.encode_method(method)? {
                info.attributes.push(make_signature_attribute(&mut ctx.cp, &signature)?);
            }
            class_file.methods.push(info);
        }

        if !class.is_interface() && !class.methods.iter().any(MethodDecl::is_constructor) {
            let ctor = default_constructor(class);
            let code = Gen::new(&mut ctx, &ctor, CONSTRUCTOR_METHOD_NAME)?.generate(&ctor)?;
            let info = self.method_info(&mut ctx.cp, &ctor, false, Some(code))?;
            class_file.methods.push(info);
        }

        // lambda bodies may lift further lambdas
        while let Some(pending) = ctx.lambdas.next_pending() {
            log::trace!("generating lifted body {} from {}", pending.method.name, pending.member);
            let code = Gen::new(&mut ctx, &pending.method, &pending.member)?.generate(&pending.method)?;
            let info = self.method_info(&mut ctx.cp, &pending.method, class.is_interface(), Some(code))?;
            class_file.methods.push(info);
        }

        if !ctx.lambdas.serializable_sites().is_empty() {
            let code = generate_deserialize_lambda(&mut ctx.cp, ctx.lambdas.serializable_sites())?;
            let mut info = MethodInfo::new(
                ACC_PRIVATE | ACC_STATIC | ACC_SYNTHETIC,
                ctx.cp.add_utf8(DESERIALIZE_LAMBDA_NAME)?,
                ctx.cp.add_utf8(DESERIALIZE_LAMBDA_DESCRIPTOR)?,
            );
            info.attributes.push(self.code_attribute(&mut ctx.cp, code)?);
            class_file.methods.push(info);
        }

        let source_file = match &self.config.source_file {
            Some(file) => file.clone(),
            None => format!("{}.java", outermost_simple_name(&class.name)),
        };
        class_file.attributes.push(make_source_file_attribute(&mut ctx.cp, &source_file)?);
        if let Some(signature) = encoder.encode_class(class)? {
            class_file.attributes.push(make_signature_attribute(&mut ctx.cp, &signature)?);
        }
        if let Some((outer, simple)) = class.name.rsplit_once('$') {
            let entry = InnerClassEntry {
                inner: class.name.clone(),
                outer: Some(outer.to_string()),
                simple_name: Some(simple.to_string()),
                access_flags: class_flags(class) & !ACC_SUPER | (member_flags(&class.modifiers) & ACC_STATIC),
            };
            class_file.attributes.push(make_inner_classes_attribute(&mut ctx.cp, &[entry])?);
        }
        if let Some(bootstrap) = ctx.bootstrap.to_attribute(&mut ctx.cp)? {
            class_file.attributes.push(bootstrap);
        }

        log::debug!(
            "class writer: {} done, {} methods, {} bootstrap entries, {} pool entries",
            class.name,
            class_file.methods.len(),
            ctx.bootstrap.len(),
            ctx.cp.len()
        );
        let ClassContext { cp, switches, .. } = ctx;
        class_file.constant_pool = cp;
        Ok(WrittenClass { class_file, switches, problem_methods })
    }

    fn method_info(
        &self,
        cp: &mut ConstantPool,
        method: &MethodDecl,
        in_interface: bool,
        code: Option<FinishedCode>,
    ) -> CodeGenResult<MethodInfo> {
        let mut flags = member_flags(&method.modifiers);
        if method.synthetic {
            flags |= ACC_SYNTHETIC;
        }
        if method.bridge {
            flags |= ACC_BRIDGE;
        }
        if code.is_none() && (in_interface || method.has_modifier(Modifier::Abstract)) {
            flags |= ACC_ABSTRACT;
        }
        if in_interface && flags & ACC_PRIVATE == 0 {
            flags |= ACC_PUBLIC;
        }
        let mut info = MethodInfo::new(flags, cp.add_utf8(&method.name)?, cp.add_utf8(&method_descriptor_of(method))?);
        if let Some(code) = code {
            info.attributes.push(self.code_attribute(cp, code)?);
        }
        Ok(info)
    }

    fn code_attribute(&self, cp: &mut ConstantPool, finished: FinishedCode) -> CodeGenResult<AttributeInfo> {
        let FinishedCode { code, max_stack, max_locals, stack_map, line_numbers, local_vars } = finished;
        let mut attribute = CodeAttribute::new(max_stack, max_locals, code);
        if self.config.debug_info {
            if !line_numbers.is_empty() {
                attribute.attributes.push(make_line_number_table_attribute(cp, &line_numbers)?);
            }
            if !local_vars.is_empty() {
                attribute.attributes.push(make_local_variable_table_attribute(cp, &local_vars)?);
            }
        }
        if let Some(table) = &stack_map {
            attribute.attributes.push(make_stack_map_attribute(cp, table)?);
        }
        Ok(AttributeInfo::named(cp, "Code", attribute.to_bytes())?)
    }
}

fn class_flags(class: &ClassDecl) -> u16 {
    let mut flags = 0;
    if class.has_modifier(Modifier::Public) {
        flags |= ACC_PUBLIC;
    }
    if class.is_interface() {
        flags |= ACC_INTERFACE | ACC_ABSTRACT;
    } else {
        flags |= ACC_SUPER;
        if class.has_modifier(Modifier::Final) {
            flags |= ACC_FINAL;
        }
        if class.has_modifier(Modifier::Abstract) {
            flags |= ACC_ABSTRACT;
        }
    }
    flags
}

fn member_flags(modifiers: &[Modifier]) -> u16 {
    modifiers.iter().fold(0, |flags, m| {
        flags
            | match m {
                Modifier::Public => ACC_PUBLIC,
                Modifier::Protected => ACC_PROTECTED,
                Modifier::Private => ACC_PRIVATE,
                Modifier::Static => ACC_STATIC,
                Modifier::Final => ACC_FINAL,
                Modifier::Abstract => ACC_ABSTRACT,
                Modifier::Synchronized => ACC_SYNCHRONIZED,
                Modifier::Sealed | Modifier::NonSealed => 0,
            }
    })
}

fn outermost_simple_name(name: &str) -> &str {
    let simple = name.rsplit('/').next().unwrap_or(name);
    simple.split('$').next().unwrap_or(simple)
}

fn default_constructor(class: &ClassDecl) -> MethodDecl {
    let mut ctor = MethodDecl::new(CONSTRUCTOR_METHOD_NAME, Vec::new(), TypeRef::void(), Some(Block::new(Vec::new())));
    ctor.modifiers = if class.has_modifier(Modifier::Public) { vec![Modifier::Public] } else { Vec::new() };
    ctor.span = class.span;
    ctor
}

/// Text of the `Error` thrown by a problem method.
pub fn problem_message(errors: &[&Diagnostic]) -> String {
    let mut message =
        String::from(if errors.len() == 1 { "Unresolved compilation problem: \n" } else { "Unresolved compilation problems: \n" });
    for error in errors {
        message.push('\t');
        message.push_str(&error.message);
        message.push('\n');
    }
    message
}

/// `throw new Error("Unresolved compilation problem...")` in place of the real body.
fn problem_body(ctx: &mut ClassContext<'_>, method: &MethodDecl, errors: &[&Diagnostic]) -> CodeGenResult<FinishedCode> {
    let params: Vec<String> = method.params.iter().map(|p| type_to_descriptor(&p.type_ref)).collect();
    let this_class = (!method.is_static()).then(|| ctx.class_name.clone());
    let mut code = Code::new(this_class.as_deref(), method.is_constructor(), &params)?;
    code.emit_new(&mut ctx.cp, ERROR_CLASS)?;
    code.emitop(DUP)?;
    code.emit_string(&mut ctx.cp, &problem_message(errors))?;
    code.emit_invoke(&mut ctx.cp, INVOKESPECIAL, ERROR_CLASS, CONSTRUCTOR_METHOD_NAME, "(Ljava/lang/String;)V", false)?;
    code.emitop(ATHROW)?;
    code.finish(&mut ctx.cp, &method.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::opcodes::instructions;
    use crate::common::diagnostics::{Message, Severity};
    use crate::wash::SemanticAnalyzer;

    fn create_span() -> Span {
        Span::line(1)
    }

    fn write(class: &ClassDecl, config: &Config) -> WrittenClass {
        let oracle = TypeHierarchyOracle::builder().register_decl(class).build();
        let analysis = SemanticAnalyzer::new(&oracle, config).analyze_class(class);
        ClassWriter::new(&oracle, config).write_class(class, &analysis).unwrap()
    }

    fn code_of(written: &WrittenClass, name: &str) -> Vec<u8> {
        let cf = &written.class_file;
        let method = cf.find_method(name).unwrap();
        let code = method.attribute(&cf.constant_pool, "Code").unwrap();
        CodeAttribute::parse(&code.info).unwrap().2.to_vec()
    }

    #[test]
    fn empty_class_gets_default_constructor_and_source_file() {
        let class = ClassDecl::new("p/Empty", ClassKind::Class);
        let written = write(&class, &Config::default());
        let cf = &written.class_file;
        assert_eq!(cf.class_name().unwrap(), "p/Empty");
        assert_eq!(cf.method_names(), vec!["<init>".to_string()]);
        assert_eq!(cf.access_flags, ACC_PUBLIC | ACC_SUPER);
        let ops: Vec<u8> = instructions(&code_of(&written, "<init>")).into_iter().map(|(_, op)| op).collect();
        assert_eq!(ops, vec![ALOAD_0, INVOKESPECIAL, RETURN]);
        let source = cf.attribute("SourceFile").unwrap();
        let index = u16::from_be_bytes([source.info[0], source.info[1]]);
        assert_eq!(cf.constant_pool.utf8(index).unwrap(), "Empty.java");
        assert!(cf.attribute("BootstrapMethods").is_none());
    }

    #[test]
    fn interface_methods_are_public_abstract() {
        let mut iface = ClassDecl::new("p/Shape", ClassKind::Interface);
        iface.methods.push(MethodDecl::new("area", vec![], TypeRef::int(), None));
        let written = write(&iface, &Config::default());
        let cf = &written.class_file;
        assert_eq!(cf.access_flags, ACC_PUBLIC | ACC_INTERFACE | ACC_ABSTRACT);
        let area = cf.find_method("area").unwrap();
        assert_eq!(area.access_flags, ACC_PUBLIC | ACC_ABSTRACT);
        assert!(area.attribute(&cf.constant_pool, "Code").is_none());
        assert!(cf.find_method("<init>").is_none());
    }

    #[test]
    fn problem_message_lists_every_error() {
        let one = Diagnostic::error(create_span(), Message::FalseGuard);
        let two = Diagnostic::with_severity(create_span(), Severity::Error, Message::DuplicateBinding);
        assert_eq!(
            problem_message(&[&one]),
            "Unresolved compilation problem: \n\tThis case label has a guard that is a constant expression with value 'false'\n"
        );
        assert!(problem_message(&[&one, &two]).starts_with("Unresolved compilation problems: \n\t"));
        assert_eq!(problem_message(&[&one, &two]).matches('\t').count(), 2);
    }

    #[test]
    fn lifted_lambda_is_private_static_synthetic() {
        let supplier = TypeRef::class("java/util/function/IntSupplier");
        let lambda = LambdaExpr {
            params: vec![],
            body: LambdaBody::Expr(Box::new(Expr::int(7))),
            target: FunctionalTarget::new(supplier.clone()),
            return_type: TypeRef::int(),
            span: create_span(),
        };
        let mut m = MethodDecl::new(
            "make",
            vec![],
            supplier.clone(),
            Some(Block::new(vec![Stmt::Return {
                value: Some(Expr::new(ExprKind::Lambda(Box::new(lambda)), supplier, create_span())),
                span: create_span(),
            }])),
        );
        m.modifiers.push(Modifier::Static);
        let mut class = ClassDecl::new("p/L", ClassKind::Class);
        class.methods.push(m);

        let oracle = TypeHierarchyOracle::builder().register_decl(&class).build();
        let config = Config::default();
        let analysis = SemanticAnalyzer::new(&oracle, &config).analyze_class(&class);
        let written = ClassWriter::new(&oracle, &config).write_class(&class, &analysis).unwrap();
        let cf = &written.class_file;
        assert_eq!(cf.method_names(), vec!["make", "<init>", "lambda$0"]);
        let lifted = cf.find_method("lambda$0").unwrap();
        assert_eq!(lifted.access_flags, ACC_PRIVATE | ACC_STATIC | ACC_SYNTHETIC);
        assert!(cf.attribute("BootstrapMethods").is_some());
    }

    #[test]
    fn records_are_not_emitted() {
        let record = ClassDecl::new("p/R", ClassKind::Record);
        let oracle = TypeHierarchyOracle::with_builtins();
        let config = Config::default();
        let analysis = SemanticAnalyzer::new(&oracle, &config).analyze_class(&record);
        let err = ClassWriter::new(&oracle, &config).write_class(&record, &analysis).unwrap_err();
        assert!(matches!(err, CodeGenError::Unsupported { .. }));
    }
}
