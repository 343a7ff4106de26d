//! Lowering of reviewed switches to bytecode.
//!
//! Every switch goes through [`review_switch`] first; only a
//! [`ValidatedSwitch`] reaches [`Gen::lower_switch`]. The shape is chosen by
//! [`LoweringShape::plan`]:
//!
//! * `IntSwitch`: primitive or boxed selector with constant labels, a plain
//!   `tableswitch`/`lookupswitch`.
//! * `EnumOrdinal`: enum constants only, switching on `ordinal()`.
//! * `StringHash`: string constants only, hash dispatch then an index switch.
//! * `TypeSwitch` / `EnumSwitch`: `invokedynamic` to `SwitchBootstraps`,
//!   whose result (`-1` for null) feeds a `tableswitch`.
//! * `GuardChain`: a linear chain of `instanceof` and constant tests, used
//!   for guards, record patterns and targets without the bootstraps.
//!
//! An exhaustive switch without `default` gets a synthetic one that throws
//! `MatchException` (or `IncompatibleClassChangeError` before Java 21).

use crate::ast::*;
use crate::common::hierarchy::TypeHierarchyOracle;
use crate::config::Config;
use crate::review::exhaustiveness::substitute;
use crate::review::{review_switch, SelectorKind, ValidatedSwitch};

use super::code::Label;
use super::defs::CONSTRUCTOR_METHOD_NAME;
use super::descriptor::{class_constant_name, type_to_descriptor};
use super::error::{CodeGenError, CodeGenResult};
use super::gen::{Gen, JumpTarget};
use super::indy::SwitchLabel;
use super::opcodes::*;
use super::string_switch::emit_string_index;
use super::switch_optimizer::SwitchOptimizer;

const MATCH_EXCEPTION: &str = "java/lang/MatchException";
const INCOMPATIBLE_CLASS_CHANGE: &str = "java/lang/IncompatibleClassChangeError";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoweringShape {
    TypeSwitch,
    EnumSwitch,
    GuardChain,
    IntSwitch,
    EnumOrdinal,
    StringHash,
}

impl LoweringShape {
    pub fn plan(validated: &ValidatedSwitch<'_>, config: &Config) -> Self {
        let switch = validated.construct();
        let constants_only = !switch.has_patterns() && !switch.has_null();
        let needs_chain = switch
            .labels()
            .any(|l| l.is_guarded() || l.patterns().any(|p| matches!(p, Pattern::Record(_))));
        match validated.selector_kind() {
            SelectorKind::Boolean | SelectorKind::Int(_) => LoweringShape::IntSwitch,
            SelectorKind::Boxed(_) if constants_only => LoweringShape::IntSwitch,
            SelectorKind::String if constants_only => LoweringShape::StringHash,
            SelectorKind::Enum(_) if constants_only => LoweringShape::EnumOrdinal,
            _ if needs_chain || !config.supports_switch_bootstraps() => LoweringShape::GuardChain,
            SelectorKind::Enum(_) => LoweringShape::EnumSwitch,
            // typeSwitch has no label kind for these
            _ if switch
                .labels()
                .flat_map(CaseLabel::constants)
                .any(|c| matches!(c, CaseConstant::Enum { .. } | CaseConstant::Bool(_))) =>
            {
                LoweringShape::GuardChain
            }
            _ => LoweringShape::TypeSwitch,
        }
    }
}

/// What was emitted for one switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoweredSwitch {
    pub shape: LoweringShape,
    /// BootstrapMethods entry of the `typeSwitch`/`enumSwitch` site.
    pub bootstrap_index: Option<u16>,
    pub cases: usize,
    pub synthetic_default: bool,
}

/// Labels shared by the parts of one lowering.
struct SwitchFrame<'s> {
    switch: &'s SwitchConstruct,
    selector_ty: TypeRef,
    end: Label,
    default: Label,
    synthetic: Option<Label>,
    result: Option<TypeRef>,
    bootstrap_index: Option<u16>,
}

impl Gen<'_, '_> {
    /// Reviews `switch` and lowers it. A switch that fails review is never lowered.
    pub(super) fn gen_switch(&mut self, switch: &SwitchConstruct) -> CodeGenResult<()> {
        let review = review_switch(switch, self.ctx.oracle, self.ctx.config);
        log::trace!("switch at {}: {} review diagnostics", switch.span, review.diagnostics.len());
        match review.outcome {
            Some(validated) => self.lower_switch(&validated),
            None => Err(CodeGenError::UnvalidatedSwitch { location: switch.span.to_string() }),
        }
    }

    pub fn lower_switch(&mut self, validated: &ValidatedSwitch<'_>) -> CodeGenResult<()> {
        let switch = validated.construct();
        let shape = LoweringShape::plan(validated, self.ctx.config);
        let result = match (switch.is_expression, &switch.result_type) {
            (true, Some(ty)) => Some(ty.clone()),
            (true, None) => return Err(CodeGenError::unsupported("switch expression without a result type")),
            (false, _) => None,
        };
        log::debug!(
            "lowering switch at {} as {:?} ({} cases, exhaustive={})",
            switch.span,
            shape,
            switch.cases.len(),
            validated.is_exhaustive()
        );

        let end = self.code.new_label();
        let scope = self.enter_scope();
        if !switch.is_expression {
            // expression switches had their selector bindings declared with the statement
            self.declare_pattern_bindings(&switch.selector);
        }
        let synthetic = validated.needs_synthetic_default().then(|| self.code.new_label());

        let mut frame = SwitchFrame {
            switch,
            selector_ty: switch.selector_type().clone(),
            end,
            default: end,
            synthetic,
            result: result.clone(),
            bootstrap_index: None,
        };
        self.jumps.push(JumpTarget::Switch { end, result });
        let lowered = match shape {
            LoweringShape::TypeSwitch | LoweringShape::EnumSwitch => self.lower_bootstrap_switch(&mut frame, shape),
            LoweringShape::IntSwitch => self.lower_int_switch(&mut frame, validated.selector_kind()),
            LoweringShape::EnumOrdinal => self.lower_enum_ordinal(&mut frame),
            LoweringShape::StringHash => self.lower_string_switch(&mut frame),
            LoweringShape::GuardChain => self.lower_guard_chain(&mut frame, validated.selector_kind()),
        };
        self.jumps.pop();
        lowered?;

        self.code.emit_jump(GOTO, end)?;
        if let Some(synthetic) = synthetic {
            self.code.place(synthetic);
            if self.code.is_alive() {
                self.emit_synthetic_default()?;
            }
        }
        self.exit_scope(scope);
        self.code.place(end);

        self.ctx.switches.push(LoweredSwitch {
            shape,
            bootstrap_index: frame.bootstrap_index,
            cases: switch.cases.len(),
            synthetic_default: synthetic.is_some(),
        });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// One label per case, plus the target of values no label matches.
    fn case_labels(&mut self, frame: &mut SwitchFrame<'_>) -> Vec<Label> {
        let bodies: Vec<Label> = frame.switch.cases.iter().map(|_| self.code.new_label()).collect();
        frame.default = self.default_target(frame, |i| Some(bodies[i]));
        bodies
    }

    fn default_target(&self, frame: &SwitchFrame<'_>, body: impl Fn(usize) -> Option<Label>) -> Label {
        frame
            .switch
            .cases
            .iter()
            .position(|c| c.label.has_default())
            .and_then(body)
            .or(frame.synthetic)
            .unwrap_or(frame.end)
    }

    /// Evaluates the selector into a fresh local. Without `case null` a null
    /// selector throws before any test runs.
    fn spill_selector(&mut self, frame: &SwitchFrame<'_>) -> CodeGenResult<u16> {
        let descriptor = type_to_descriptor(&frame.selector_ty);
        self.gen_expr(&frame.switch.selector)?;
        if !frame.switch.has_null() && frame.selector_ty.is_reference() {
            self.code.emitop(DUP)?;
            self.emit_require_non_null()?;
            self.code.emitop(POP)?;
        }
        let slot = self.temp(&descriptor);
        self.code.emit_store(slot, &descriptor)?;
        Ok(slot)
    }

    fn lower_bootstrap_switch(&mut self, frame: &mut SwitchFrame<'_>, shape: LoweringShape) -> CodeGenResult<()> {
        let selector = self.spill_selector(frame)?;
        let bodies = self.case_labels(frame);

        let mut labels = Vec::new();
        let mut owners = Vec::new();
        let mut null_case = None;
        for (i, case) in frame.switch.cases.iter().enumerate() {
            for element in &case.label.elements {
                let label = match element {
                    CaseLabelElement::Pattern(p) => SwitchLabel::Class(class_constant_name(p.type_ref())),
                    CaseLabelElement::Constant(CaseConstant::Int(v)) => SwitchLabel::Int(*v),
                    CaseLabelElement::Constant(CaseConstant::Char(c)) => SwitchLabel::Int(*c as i32),
                    CaseLabelElement::Constant(CaseConstant::Str(s)) => SwitchLabel::Str(s.clone()),
                    CaseLabelElement::Constant(CaseConstant::Enum { name, .. }) => SwitchLabel::EnumName(name.clone()),
                    CaseLabelElement::Constant(c @ CaseConstant::Bool(_)) => {
                        return Err(CodeGenError::unsupported(format!("boolean label {} in a bootstrap switch", c)))
                    }
                    CaseLabelElement::Null => {
                        null_case = Some(i);
                        continue;
                    }
                    CaseLabelElement::Default => continue,
                };
                labels.push(label);
                owners.push(i);
            }
        }

        let erased = TypeHierarchyOracle::erase(&frame.selector_ty);
        let site = match shape {
            LoweringShape::EnumSwitch => {
                let enum_class = class_constant_name(&erased);
                self.ctx.site_builder().build_enum_switch(&enum_class, &labels)?
            }
            _ => self.ctx.site_builder().build_type_switch(&type_to_descriptor(&erased), &labels)?,
        };
        self.code.emit_load(selector, &type_to_descriptor(&frame.selector_ty))?;
        self.code.emit_int(&mut self.ctx.cp, 0)?;
        self.code.emit_invokedynamic(site.pool_index, &site.descriptor)?;
        frame.bootstrap_index = Some(site.bootstrap_index);

        let mut dispatch = SwitchOptimizer::new(frame.default);
        if let Some(i) = null_case {
            dispatch.add_case(-1, bodies[i]);
        }
        for (position, owner) in owners.into_iter().enumerate() {
            dispatch.add_case(position as i32, bodies[owner]);
        }
        self.code.emit_switch(&dispatch.optimize())?;
        self.gen_bodies(frame, &bodies, Some(selector))
    }

    fn lower_int_switch(&mut self, frame: &mut SwitchFrame<'_>, kind: &SelectorKind) -> CodeGenResult<()> {
        self.gen_expr(&frame.switch.selector)?;
        if let SelectorKind::Boxed(p) = kind {
            let selector_ty = frame.selector_ty.clone();
            self.coerce(&selector_ty, &TypeRef::primitive(*p))?;
        }
        let bodies = self.case_labels(frame);
        let mut dispatch = SwitchOptimizer::new(frame.default);
        for (i, case) in frame.switch.cases.iter().enumerate() {
            if case.label.pattern().is_some() {
                return Err(CodeGenError::unsupported("pattern label on a primitive selector"));
            }
            for constant in case.label.constants() {
                let value = constant
                    .int_value()
                    .ok_or_else(|| CodeGenError::unsupported(format!("label {} on an integral selector", constant)))?;
                dispatch.add_case(value, bodies[i]);
            }
        }
        self.code.emit_switch(&dispatch.optimize())?;
        self.gen_bodies(frame, &bodies, None)
    }

    fn lower_enum_ordinal(&mut self, frame: &mut SwitchFrame<'_>) -> CodeGenResult<()> {
        let enum_class = class_constant_name(&TypeHierarchyOracle::erase(&frame.selector_ty));
        let constants = self.ctx.oracle.enum_constants(&enum_class)?.to_vec();
        self.gen_expr(&frame.switch.selector)?;
        self.code.emit_invoke(&mut self.ctx.cp, INVOKEVIRTUAL, &enum_class, "ordinal", "()I", false)?;

        let bodies = self.case_labels(frame);
        let mut dispatch = SwitchOptimizer::new(frame.default);
        for (i, case) in frame.switch.cases.iter().enumerate() {
            for constant in case.label.constants() {
                let name = match constant {
                    CaseConstant::Enum { name, .. } => name,
                    other => return Err(CodeGenError::unsupported(format!("label {} on an enum selector", other))),
                };
                let ordinal = constants.iter().position(|c| c == name).ok_or_else(|| {
                    CodeGenError::unsupported(format!("unknown constant {} of enum {}", name, enum_class))
                })?;
                dispatch.add_case(ordinal as i32, bodies[i]);
            }
        }
        self.code.emit_switch(&dispatch.optimize())?;
        self.gen_bodies(frame, &bodies, None)
    }

    fn lower_string_switch(&mut self, frame: &mut SwitchFrame<'_>) -> CodeGenResult<()> {
        const STRING_DESC: &str = "Ljava/lang/String;";
        self.gen_expr(&frame.switch.selector)?;
        let string_slot = self.temp(STRING_DESC);
        self.code.emit_store(string_slot, STRING_DESC)?;
        let index_slot = self.temp("I");

        let mut keys: Vec<&str> = Vec::new();
        let mut owners = Vec::new();
        for (i, case) in frame.switch.cases.iter().enumerate() {
            for constant in case.label.constants() {
                match constant {
                    CaseConstant::Str(s) => {
                        keys.push(s);
                        owners.push(i);
                    }
                    other => return Err(CodeGenError::unsupported(format!("label {} on a String selector", other))),
                }
            }
        }
        emit_string_index(&mut self.code, &mut self.ctx.cp, string_slot, index_slot, &keys)?;
        self.code.emit_load(index_slot, "I")?;

        let bodies = self.case_labels(frame);
        let mut dispatch = SwitchOptimizer::new(frame.default);
        for (position, owner) in owners.into_iter().enumerate() {
            dispatch.add_case(position as i32, bodies[owner]);
        }
        self.code.emit_switch(&dispatch.optimize())?;
        self.gen_bodies(frame, &bodies, None)
    }

    /// Case bodies in source order after a single dispatch instruction.
    /// Colon-form groups fall through to the next body.
    fn gen_bodies(&mut self, frame: &SwitchFrame<'_>, bodies: &[Label], selector: Option<u16>) -> CodeGenResult<()> {
        for (case, body) in frame.switch.cases.iter().zip(bodies) {
            self.code.place(*body);
            let scope = self.enter_scope();
            if let (Some(selector), Some(Pattern::Type(pattern))) = (selector, case.label.pattern()) {
                if case.label.patterns().count() == 1 {
                    self.bind_type_pattern(selector, &frame.selector_ty, pattern)?;
                }
            }
            self.gen_case_body(frame, case, None)?;
            self.exit_scope(scope);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Guard chain
    // ------------------------------------------------------------------

    /// Tests every case in order. Pattern cases are tested and run inline;
    /// the other bodies are placed after the chain, once every jump to them
    /// is known.
    fn lower_guard_chain(&mut self, frame: &mut SwitchFrame<'_>, kind: &SelectorKind) -> CodeGenResult<()> {
        let selector = self.spill_selector(frame)?;
        let selector_desc = type_to_descriptor(&frame.selector_ty);
        let bodies: Vec<Option<Label>> = frame
            .switch
            .cases
            .iter()
            .map(|c| c.label.pattern().is_none().then(|| self.code.new_label()))
            .collect();
        frame.default = self.default_target(frame, |i| bodies[i]);

        if let Some(null_body) = frame.switch.cases.iter().position(|c| c.label.has_null()).and_then(|i| bodies[i]) {
            self.code.emit_load(selector, &selector_desc)?;
            self.code.emit_jump(IFNULL, null_body)?;
        }

        for (i, case) in frame.switch.cases.iter().enumerate() {
            let fall_through = bodies.get(i + 1).copied().flatten().unwrap_or(frame.end);
            match bodies[i] {
                Some(body) => {
                    for constant in case.label.constants() {
                        self.emit_constant_test(selector, frame, kind, constant, body)?;
                    }
                }
                None => {
                    let scope = self.enter_scope();
                    let next = self.code.new_label();
                    let patterns: Vec<&Pattern> = case.label.patterns().collect();
                    match patterns.as_slice() {
                        [pattern] => self.emit_pattern_test(selector, &frame.selector_ty, pattern, next)?,
                        _ => self.emit_alternatives_test(selector, &selector_desc, &patterns, next)?,
                    }
                    if let Some(guard) = case.label.guard.as_ref().filter(|_| case.label.is_guarded()) {
                        self.declare_pattern_bindings(guard);
                        self.gen_cond(guard, next, false)?;
                    }
                    self.gen_case_body(frame, case, Some(fall_through))?;
                    self.exit_scope(scope);
                    self.code.place(next);
                }
            }
        }
        self.code.emit_jump(GOTO, frame.default)?;

        for (i, case) in frame.switch.cases.iter().enumerate() {
            if let Some(body) = bodies[i] {
                let fall_through = bodies.get(i + 1).copied().flatten().unwrap_or(frame.end);
                self.code.place(body);
                let scope = self.enter_scope();
                self.gen_case_body(frame, case, Some(fall_through))?;
                self.exit_scope(scope);
            }
        }
        Ok(())
    }

    fn emit_constant_test(
        &mut self,
        selector: u16,
        frame: &SwitchFrame<'_>,
        kind: &SelectorKind,
        constant: &CaseConstant,
        body: Label,
    ) -> CodeGenResult<()> {
        let selector_desc = type_to_descriptor(&frame.selector_ty);
        match constant {
            CaseConstant::Str(s) => {
                self.code.emit_string(&mut self.ctx.cp, s)?;
                self.code.emit_load(selector, &selector_desc)?;
                self.code.emit_invoke(
                    &mut self.ctx.cp,
                    INVOKEVIRTUAL,
                    crate::consts::STRING,
                    "equals",
                    "(Ljava/lang/Object;)Z",
                    false,
                )?;
                self.code.emit_jump(IFNE, body)
            }
            CaseConstant::Enum { owner, name, .. } => {
                self.code.emit_load(selector, &selector_desc)?;
                self.code.emit_field(&mut self.ctx.cp, GETSTATIC, owner, name, &format!("L{};", owner))?;
                self.code.emit_jump(IF_ACMPEQ, body)
            }
            other => {
                let value = other
                    .int_value()
                    .ok_or_else(|| CodeGenError::unsupported(format!("constant label {}", other)))?;
                let primitive = match (kind, other) {
                    (SelectorKind::Boxed(p), _) => *p,
                    (_, CaseConstant::Bool(_)) => PrimitiveType::Boolean,
                    _ => PrimitiveType::Int,
                };
                self.code.emit_load(selector, &selector_desc)?;
                let selector_ty = frame.selector_ty.clone();
                self.coerce(&selector_ty, &TypeRef::primitive(primitive))?;
                self.code.emit_int(&mut self.ctx.cp, value)?;
                self.code.emit_jump(IF_ICMPEQ, body)
            }
        }
    }

    /// `case A _, B _`: any of the types matches, nothing is bound.
    fn emit_alternatives_test(
        &mut self,
        selector: u16,
        selector_desc: &str,
        patterns: &[&Pattern],
        fail: Label,
    ) -> CodeGenResult<()> {
        let matched = self.code.new_label();
        for pattern in patterns {
            if matches!(pattern, Pattern::Record(_)) {
                return Err(CodeGenError::unsupported("record pattern among alternatives"));
            }
            self.code.emit_load(selector, selector_desc)?;
            self.code.emit_type_op(&mut self.ctx.cp, INSTANCEOF, &class_constant_name(pattern.type_ref()))?;
            self.code.emit_jump(IFNE, matched)?;
        }
        self.code.emit_jump(GOTO, fail)?;
        self.code.place(matched);
        Ok(())
    }

    /// Jumps to `fail` unless the value in `value_slot` matches `pattern`;
    /// on the fall-through path every binding of the pattern is stored.
    fn emit_pattern_test(&mut self, value_slot: u16, value_ty: &TypeRef, pattern: &Pattern, fail: Label) -> CodeGenResult<()> {
        let value_desc = type_to_descriptor(value_ty);
        match pattern {
            Pattern::Type(p) => {
                let total = self.ctx.oracle.is_subtype(value_ty, &p.type_ref).unwrap_or(false);
                if !total {
                    if p.type_ref.is_primitive() || value_ty.is_primitive() {
                        return Err(CodeGenError::unsupported(format!(
                            "pattern {} against a value of type {}",
                            p.type_ref, value_ty
                        )));
                    }
                    self.code.emit_load(value_slot, &value_desc)?;
                    self.code.emit_type_op(&mut self.ctx.cp, INSTANCEOF, &class_constant_name(&p.type_ref))?;
                    self.code.emit_jump(IFEQ, fail)?;
                }
                self.bind_type_pattern(value_slot, value_ty, p)
            }
            Pattern::Record(p) => {
                let record = class_constant_name(&p.type_ref);
                let record_desc = format!("L{};", record);
                self.code.emit_load(value_slot, &value_desc)?;
                self.code.emit_type_op(&mut self.ctx.cp, INSTANCEOF, &record)?;
                self.code.emit_jump(IFEQ, fail)?;
                self.code.emit_load(value_slot, &value_desc)?;
                self.coerce(value_ty, &TypeRef::class(record.clone()))?;
                let record_slot = self.temp(&record_desc);
                self.code.emit_store(record_slot, &record_desc)?;

                let components = self.ctx.oracle.record_components(&record)?.to_vec();
                if components.len() != p.components.len() {
                    return Err(CodeGenError::unsupported(format!(
                        "record pattern with {} components for {} with {}",
                        p.components.len(),
                        record,
                        components.len()
                    )));
                }
                let params = self.ctx.oracle.lookup(&record)?.type_params.clone();
                // a raw record pattern takes its type arguments from the value
                let args = match (p.type_ref.type_args(), value_ty.class_name()) {
                    ([], Some(name)) if name == record => value_ty.type_args().to_vec(),
                    (args, _) => args.to_vec(),
                };

                for (component, sub) in components.iter().zip(&p.components) {
                    let erased = TypeHierarchyOracle::erase(&component.type_ref);
                    let accessor = format!("(){}", type_to_descriptor(&erased));
                    let component_ty = substitute(&component.type_ref, &params, &args);
                    let component_desc = type_to_descriptor(&component_ty);
                    self.code.emit_load(record_slot, &record_desc)?;
                    self.code.emit_invoke(&mut self.ctx.cp, INVOKEVIRTUAL, &record, &component.name, &accessor, false)?;
                    self.coerce(&erased, &component_ty)?;
                    let component_slot = self.temp(&component_desc);
                    self.code.emit_store(component_slot, &component_desc)?;
                    self.emit_pattern_test(component_slot, &component_ty, sub, fail)?;
                }
                Ok(())
            }
        }
    }

    /// Declares the binding of a type pattern and stores the matched value into it.
    fn bind_type_pattern(&mut self, value_slot: u16, value_ty: &TypeRef, pattern: &TypePattern) -> CodeGenResult<()> {
        if pattern.binding.is_empty() || pattern.binding == "_" {
            return Ok(());
        }
        let slot = self.declare(&pattern.binding, &pattern.type_ref);
        self.code.emit_load(value_slot, &type_to_descriptor(value_ty))?;
        self.coerce(value_ty, &pattern.type_ref)?;
        self.code.emit_store(slot, &type_to_descriptor(&pattern.type_ref))
    }

    // ------------------------------------------------------------------
    // Bodies
    // ------------------------------------------------------------------

    /// `fall_through` is where a colon-form group that completes normally
    /// continues; `None` when the next body is placed right after this one.
    fn gen_case_body(&mut self, frame: &SwitchFrame<'_>, case: &SwitchCase, fall_through: Option<Label>) -> CodeGenResult<()> {
        match &case.body {
            CaseBody::Expr(expr) => {
                self.declare_pattern_bindings(expr);
                match &frame.result {
                    Some(result) => self.gen_result(expr, result)?,
                    None => self.gen_expr_discard(expr)?,
                }
                self.code.emit_jump(GOTO, frame.end)
            }
            CaseBody::Block(statements) => {
                for stmt in statements {
                    self.gen_stmt(stmt)?;
                }
                if frame.switch.uses_arrows {
                    return self.code.emit_jump(GOTO, frame.end);
                }
                match fall_through {
                    Some(label) => self.code.emit_jump(GOTO, label),
                    None => Ok(()),
                }
            }
        }
    }

    fn emit_synthetic_default(&mut self) -> CodeGenResult<()> {
        if self.ctx.config.supports_switch_bootstraps() {
            self.code.emit_new(&mut self.ctx.cp, MATCH_EXCEPTION)?;
            self.code.emitop(DUP)?;
            self.code.emitop(ACONST_NULL)?;
            self.code.emitop(ACONST_NULL)?;
            self.code.emit_invoke(
                &mut self.ctx.cp,
                INVOKESPECIAL,
                MATCH_EXCEPTION,
                CONSTRUCTOR_METHOD_NAME,
                "(Ljava/lang/String;Ljava/lang/Throwable;)V",
                false,
            )?;
        } else {
            self.code.emit_new(&mut self.ctx.cp, INCOMPATIBLE_CLASS_CHANGE)?;
            self.code.emitop(DUP)?;
            self.code
                .emit_invoke(&mut self.ctx.cp, INVOKESPECIAL, INCOMPATIBLE_CLASS_CHANGE, CONSTRUCTOR_METHOD_NAME, "()V", false)?;
        }
        self.code.emitop(ATHROW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::code::FinishedCode;
    use crate::codegen::defs::major_versions;
    use crate::codegen::gen::ClassContext;
    use crate::codegen::opcodes::instructions;
    use crate::common::hierarchy::{RecordComponent, TypeInfo};

    fn oracle() -> TypeHierarchyOracle {
        TypeHierarchyOracle::builder()
            .register(TypeInfo::interface("p/Shape").sealed(&[]))
            .register(TypeInfo::class("p/Circle").final_().implements("p/Shape"))
            .register(TypeInfo::class("p/Square").final_().implements("p/Shape"))
            .register(TypeInfo::enumeration("p/Color", &["RED", "GREEN", "BLUE"]))
            .register(TypeInfo::record(
                "p/Point",
                vec![
                    RecordComponent { name: "x".into(), type_ref: TypeRef::int() },
                    RecordComponent { name: "y".into(), type_ref: TypeRef::int() },
                ],
            ))
            .build()
    }

    fn method(param: TypeRef, ret: TypeRef, body: Vec<Stmt>) -> MethodDecl {
        let mut m = MethodDecl::new("m", vec![Parameter::new("v", param)], ret, Some(Block::new(body)));
        m.modifiers.push(Modifier::Static);
        m
    }

    fn returning(switch: SwitchConstruct, ret: TypeRef) -> Vec<Stmt> {
        let expr = Expr::new(ExprKind::Switch(Box::new(switch)), ret, Span::line(2));
        vec![Stmt::Return { value: Some(expr), span: Span::line(2) }]
    }

    fn generate(method: &MethodDecl, config: Config) -> CodeGenResult<(FinishedCode, ClassContext<'static>)> {
        let oracle: &'static TypeHierarchyOracle = Box::leak(Box::new(oracle()));
        let config: &'static Config = Box::leak(Box::new(config));
        let mut ctx = ClassContext::new(&ClassDecl::new("p/T", ClassKind::Class), oracle, config);
        let finished = Gen::new(&mut ctx, method, "m")?.generate(method)?;
        Ok((finished, ctx))
    }

    fn count(finished: &FinishedCode, op: u8) -> usize {
        instructions(&finished.code).into_iter().filter(|(_, o)| *o == op).count()
    }

    fn shape_switch(selector: &str) -> SwitchConstruct {
        SwitchConstruct::expression(
            Expr::local("v", TypeRef::class(selector)),
            vec![
                SwitchCase::arrow(CaseLabel::of_type(TypeRef::class("p/Circle"), "c"), Expr::int(1)),
                SwitchCase::arrow(CaseLabel::of_type(TypeRef::class("p/Square"), "s"), Expr::int(2)),
            ],
            TypeRef::int(),
        )
        .at(Span::line(2))
    }

    #[test]
    fn plans_follow_selector_and_labels() {
        let _ = env_logger::builder().is_test(true).try_init();
        let oracle = oracle();
        let config = Config::default();
        let plan = |switch: &SwitchConstruct, config: &Config| {
            let review = review_switch(switch, &oracle, config);
            LoweringShape::plan(review.outcome.as_ref().unwrap(), config)
        };

        let sealed = shape_switch("p/Shape");
        assert_eq!(plan(&sealed, &config), LoweringShape::TypeSwitch);
        let java17 = Config::default().with_target(major_versions::JAVA_17);
        assert_eq!(plan(&sealed, &java17), LoweringShape::GuardChain);

        let ints = SwitchConstruct::new(
            Expr::local("v", TypeRef::int()),
            vec![
                SwitchCase::block(CaseLabel::of_constants(vec![CaseConstant::Int(1)]), vec![]),
                SwitchCase::block(CaseLabel::default_label(), vec![]),
            ],
            false,
            false,
        );
        assert_eq!(plan(&ints, &config), LoweringShape::IntSwitch);

        let color = |labels: Vec<CaseLabel>| {
            SwitchConstruct::new(
                Expr::local("v", TypeRef::class("p/Color")),
                labels.into_iter().map(|l| SwitchCase::block(l, vec![])).collect(),
                false,
                true,
            )
        };
        let red = || CaseLabel::of_constants(vec![CaseConstant::enum_constant("p/Color", "RED")]);
        assert_eq!(plan(&color(vec![red()]), &config), LoweringShape::EnumOrdinal);
        assert_eq!(plan(&color(vec![CaseLabel::null_label(), red()]), &config), LoweringShape::EnumSwitch);
    }

    #[test]
    fn sealed_type_switch_uses_bootstrap_and_synthetic_default() {
        let m = method(TypeRef::class("p/Shape"), TypeRef::int(), returning(shape_switch("p/Shape"), TypeRef::int()));
        let (finished, ctx) = generate(&m, Config::default()).unwrap();
        assert_eq!(count(&finished, INVOKEDYNAMIC), 1);
        assert_eq!(count(&finished, TABLESWITCH) + count(&finished, LOOKUPSWITCH), 1);
        assert_eq!(count(&finished, CHECKCAST), 2);
        assert_eq!(count(&finished, ATHROW), 1);
        assert!(finished.stack_map.is_some());

        let lowered = &ctx.switches[0];
        assert_eq!(lowered.shape, LoweringShape::TypeSwitch);
        assert!(lowered.synthetic_default);
        assert_eq!(lowered.bootstrap_index, Some(0));
        assert_eq!(ctx.bootstrap.len(), 1);
    }

    #[test]
    fn old_targets_chain_instanceof_and_throw_icce() {
        let m = method(TypeRef::class("p/Shape"), TypeRef::int(), returning(shape_switch("p/Shape"), TypeRef::int()));
        let (finished, ctx) = generate(&m, Config::default().with_target(major_versions::JAVA_17)).unwrap();
        assert_eq!(count(&finished, INVOKEDYNAMIC), 0);
        assert_eq!(count(&finished, INSTANCEOF), 2);
        assert_eq!(ctx.switches[0].shape, LoweringShape::GuardChain);
        assert!(ctx.bootstrap.is_empty());
        assert!(ctx.cp.entries().any(|(i, _)| ctx.cp.class_name(i).ok() == Some(INCOMPATIBLE_CLASS_CHANGE)));
    }

    #[test]
    fn guarded_record_pattern_reads_components() {
        // switch (v) { case Point(int x, int y) when x > y -> 1; default -> 0; }
        let point = Pattern::record(
            TypeRef::class("p/Point"),
            vec![Pattern::type_pattern(TypeRef::int(), "x"), Pattern::type_pattern(TypeRef::int(), "y")],
        );
        let guard = Expr::new(
            ExprKind::Binary {
                op: BinaryOp::Gt,
                left: Box::new(Expr::local("x", TypeRef::int())),
                right: Box::new(Expr::local("y", TypeRef::int())),
            },
            TypeRef::boolean(),
            Span::line(2),
        );
        let switch = SwitchConstruct::expression(
            Expr::local("v", TypeRef::object()),
            vec![
                SwitchCase::arrow(CaseLabel::of_pattern(point).when(guard), Expr::int(1)),
                SwitchCase::arrow(CaseLabel::default_label(), Expr::int(0)),
            ],
            TypeRef::int(),
        );
        let m = method(TypeRef::object(), TypeRef::int(), returning(switch, TypeRef::int()));
        let (finished, ctx) = generate(&m, Config::default()).unwrap();
        assert_eq!(count(&finished, INVOKEDYNAMIC), 0);
        assert_eq!(count(&finished, INSTANCEOF), 1);
        assert_eq!(count(&finished, INVOKEVIRTUAL), 2);
        assert_eq!(count(&finished, IF_ICMPLE), 1);
        assert_eq!(count(&finished, ATHROW), 0);
        assert!(finished.stack_map.is_some());
        assert_eq!(ctx.switches[0].shape, LoweringShape::GuardChain);
        assert!(!ctx.switches[0].synthetic_default);
    }

    #[test]
    fn enum_constants_switch_on_ordinal() {
        let color = |name: &str| CaseLabel::of_constants(vec![CaseConstant::enum_constant("p/Color", name)]);
        let ret = |v: i32| Stmt::Return { value: Some(Expr::int(v)), span: Span::line(3) };
        let switch = SwitchConstruct::new(
            Expr::local("v", TypeRef::class("p/Color")),
            vec![SwitchCase::block(color("RED"), vec![ret(1)]), SwitchCase::block(color("BLUE"), vec![ret(3)])],
            false,
            false,
        );
        let m = method(TypeRef::class("p/Color"), TypeRef::int(), vec![Stmt::Switch(Box::new(switch)), ret(0)]);
        let (finished, ctx) = generate(&m, Config::default()).unwrap();
        assert_eq!(count(&finished, INVOKEVIRTUAL), 1);
        assert_eq!(count(&finished, TABLESWITCH) + count(&finished, LOOKUPSWITCH), 1);
        assert_eq!(count(&finished, IRETURN), 3);
        assert_eq!(ctx.switches[0].shape, LoweringShape::EnumOrdinal);
    }

    #[test]
    fn string_switch_hashes_then_dispatches_on_index() {
        let label = |s: &str| CaseLabel::of_constants(vec![CaseConstant::Str(s.into())]);
        let switch = SwitchConstruct::expression(
            Expr::local("v", TypeRef::string()),
            vec![
                SwitchCase::arrow(label("a"), Expr::int(1)),
                SwitchCase::arrow(label("b"), Expr::int(2)),
                SwitchCase::arrow(CaseLabel::default_label(), Expr::int(0)),
            ],
            TypeRef::int(),
        );
        let m = method(TypeRef::string(), TypeRef::int(), returning(switch, TypeRef::int()));
        let (finished, ctx) = generate(&m, Config::default()).unwrap();
        // hashCode plus one equals per key
        assert_eq!(count(&finished, INVOKEVIRTUAL), 3);
        assert_eq!(count(&finished, TABLESWITCH) + count(&finished, LOOKUPSWITCH), 2);
        assert_eq!(ctx.switches[0].shape, LoweringShape::StringHash);
    }

    #[test]
    fn non_exhaustive_expression_is_not_lowered() {
        let switch = SwitchConstruct::expression(
            Expr::local("v", TypeRef::object()),
            vec![SwitchCase::arrow(CaseLabel::of_type(TypeRef::string(), "s"), Expr::int(1))],
            TypeRef::int(),
        )
        .at(Span::line(7));
        let m = method(TypeRef::object(), TypeRef::int(), returning(switch, TypeRef::int()));
        let err = generate(&m, Config::default()).err().unwrap();
        assert!(matches!(err, CodeGenError::UnvalidatedSwitch { ref location } if location.starts_with("7:")));
    }
}
