//! Exhaustiveness of switch labels over enums, sealed hierarchies and records.
//!
//! Coverage works on rows of cells. Each unguarded pattern label is a row; a
//! record pattern is flattened into its component cells once the column it
//! sits in has been split into the leaves of that column's type. A column is
//! covered when every leaf is covered by some remaining row.

use std::collections::HashSet;

use crate::ast::*;
use crate::common::diagnostics::{Diagnostic, Message, Severity};
use crate::common::hierarchy::{ResolveError, ResolveResult, TypeHierarchyOracle};
use crate::config::Config;
use crate::consts::{RECORD_COVERAGE_MAX_DEPTH, SEALED_MAX_EXPANSION_DEPTH};

pub struct ExhaustivenessProver<'o> {
    oracle: &'o TypeHierarchyOracle,
}

#[derive(Debug, Clone, Copy)]
enum Cell<'p> {
    Any,
    Pat(&'p Pattern),
}

type Row<'p> = Vec<Cell<'p>>;

impl<'o> ExhaustivenessProver<'o> {
    pub fn new(oracle: &'o TypeHierarchyOracle) -> Self {
        Self { oracle }
    }

    /// True when every non-null value of `selector` is matched by some label.
    pub fn is_exhaustive(&self, selector: &TypeRef, labels: &[&CaseLabel]) -> ResolveResult<bool> {
        if labels.iter().any(|l| l.has_default()) {
            return Ok(true);
        }
        let unguarded: Vec<&CaseLabel> = labels.iter().copied().filter(|l| !l.is_guarded()).collect();

        let is_boolean = selector.primitive_type() == Some(PrimitiveType::Boolean)
            || selector.class_name() == Some("java/lang/Boolean");
        if is_boolean {
            let covered: HashSet<bool> = unguarded
                .iter()
                .flat_map(|l| l.constants())
                .filter_map(|c| match c {
                    CaseConstant::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect();
            if covered.len() == 2 {
                return Ok(true);
            }
        }

        let enum_constants: HashSet<(&str, &str)> = unguarded
            .iter()
            .flat_map(|l| l.constants())
            .filter_map(|c| match c {
                CaseConstant::Enum { owner, name, .. } => Some((owner.as_str(), name.as_str())),
                _ => None,
            })
            .collect();
        let rows: Vec<Row> = unguarded
            .iter()
            .flat_map(|l| l.patterns())
            .map(|p| vec![Cell::Pat(p)])
            .collect();

        let selector = self.boxed_selector(selector);
        for leaf in self.leaves(&selector, 0)? {
            if self.enum_fully_listed(&leaf, &enum_constants)? {
                continue;
            }
            if !self.rows_cover(std::slice::from_ref(&leaf), &rows, 0)? {
                log::trace!("switch over {} leaves {} uncovered", selector, leaf);
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn boxed_selector(&self, selector: &TypeRef) -> TypeRef {
        if selector.is_primitive() {
            TypeHierarchyOracle::boxed(selector)
        } else {
            selector.clone()
        }
    }

    fn enum_fully_listed(&self, leaf: &TypeRef, listed: &HashSet<(&str, &str)>) -> ResolveResult<bool> {
        let name = match leaf.class_name() {
            Some(name) if self.oracle.is_enum(name)? => name,
            _ => return Ok(false),
        };
        Ok(self.oracle.enum_constants(name)?.iter().all(|c| listed.contains(&(name, c.as_str()))))
    }

    /// Types partitioning `ty`: sealed types expand into their permitted
    /// subtypes, a non-abstract sealed class also stands for itself.
    fn leaves(&self, ty: &TypeRef, depth: usize) -> ResolveResult<Vec<TypeRef>> {
        let name = match ty.class_name() {
            Some(name) => name,
            None => return Ok(vec![TypeHierarchyOracle::erase(ty)]),
        };
        if depth > SEALED_MAX_EXPANSION_DEPTH {
            return Err(ResolveError::HierarchyTooDeep(crate::common::hierarchy::source_name(name)));
        }
        let permits = match self.oracle.sealed_permits(name)? {
            Some(permits) if !permits.is_empty() => permits,
            _ => return Ok(vec![ty.clone()]),
        };
        let mut out = Vec::new();
        if !self.oracle.is_abstract(name)? {
            out.push(TypeRef::class(name));
        }
        for permitted in permits {
            for leaf in self.leaves(&TypeRef::class(permitted.clone()), depth + 1)? {
                if !out.contains(&leaf) {
                    out.push(leaf);
                }
            }
        }
        Ok(out)
    }

    fn rows_cover(&self, columns: &[TypeRef], rows: &[Row<'_>], depth: usize) -> ResolveResult<bool> {
        if depth > RECORD_COVERAGE_MAX_DEPTH {
            let name = columns.first().map(|t| t.to_string()).unwrap_or_default();
            return Err(ResolveError::HierarchyTooDeep(name));
        }
        let (first, rest) = match columns.split_first() {
            Some(split) => split,
            None => return Ok(!rows.is_empty()),
        };
        for leaf in self.leaves(first, 0)? {
            let record_name = match leaf.class_name() {
                Some(name) if self.oracle.is_record(name)? => Some(name),
                _ => None,
            };
            let deconstructed = record_name.is_some()
                && rows.iter().any(|row| matches!(row[0], Cell::Pat(Pattern::Record(rp)) if self.same_record(&leaf, &rp.type_ref)));

            let mut next_columns = Vec::new();
            if deconstructed {
                next_columns.extend(self.component_types(&leaf, first)?);
            }
            let arity = next_columns.len();
            next_columns.extend(rest.iter().cloned());

            let mut next_rows = Vec::new();
            for row in rows {
                let head: Option<Vec<Cell>> = match row[0] {
                    Cell::Any => Some(vec![Cell::Any; arity]),
                    Cell::Pat(Pattern::Type(tp)) => {
                        if self.oracle.is_subtype(&leaf, &tp.type_ref)? {
                            Some(vec![Cell::Any; arity])
                        } else {
                            None
                        }
                    }
                    Cell::Pat(Pattern::Record(rp)) => {
                        if deconstructed && self.same_record(&leaf, &rp.type_ref) && rp.components.len() == arity {
                            Some(rp.components.iter().map(Cell::Pat).collect())
                        } else {
                            None
                        }
                    }
                };
                if let Some(mut next) = head {
                    next.extend_from_slice(&row[1..]);
                    next_rows.push(next);
                }
            }
            if !self.rows_cover(&next_columns, &next_rows, depth + 1)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn same_record(&self, leaf: &TypeRef, pattern_type: &TypeRef) -> bool {
        TypeHierarchyOracle::erase(leaf) == TypeHierarchyOracle::erase(pattern_type)
    }

    /// Component types of record `leaf`, with the record's type variables
    /// replaced by the arguments `column` supplies when it names the same record.
    fn component_types(&self, leaf: &TypeRef, column: &TypeRef) -> ResolveResult<Vec<TypeRef>> {
        let name = leaf.class_name().unwrap_or_default();
        let info = self.oracle.lookup(name)?;
        let args = if column.class_name() == Some(name) { column.type_args() } else { &[] };
        Ok(info
            .record_components
            .iter()
            .map(|c| substitute(&c.type_ref, &info.type_params, args))
            .collect())
    }
}

pub(crate) fn substitute(ty: &TypeRef, params: &[String], args: &[TypeArg]) -> TypeRef {
    if let TypeKind::TypeVar { name, .. } = &ty.kind {
        if let Some(i) = params.iter().position(|p| p == name) {
            let replacement = match args.get(i) {
                Some(TypeArg::Type(t)) => Some(t.clone()),
                Some(TypeArg::Wildcard(WildcardType { bound: Some((BoundKind::Extends, b)) })) => Some(b.clone()),
                _ => None,
            };
            if let Some(t) = replacement {
                return t.array_of(ty.array_dims);
            }
        }
    }
    TypeHierarchyOracle::erase(ty)
}

/// The diagnostic a non-exhaustive switch earns, if any.
pub fn exhaustiveness_diagnostic(
    switch: &SwitchConstruct,
    exhaustive: bool,
    enhanced: bool,
    config: &Config,
) -> Option<Diagnostic> {
    if exhaustive {
        return None;
    }
    if switch.is_expression {
        return Some(Diagnostic::error(switch.span, Message::ExpressionNotExhaustive));
    }
    if enhanced {
        let severity = if config.strict_statement_exhaustiveness { Severity::Error } else { Severity::Warning };
        return Some(Diagnostic::with_severity(switch.span, severity, Message::StatementNotExhaustive));
    }
    if config.report_missing_default && !switch.has_default() {
        return Some(Diagnostic::with_severity(switch.span, Severity::Info, Message::MissingDefault));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::hierarchy::{RecordComponent, TypeInfo};

    fn oracle() -> TypeHierarchyOracle {
        TypeHierarchyOracle::builder()
            .register(TypeInfo::interface("Shape").sealed(&["Circle", "Poly"]))
            .register(TypeInfo::class("Circle").final_().implements("Shape"))
            .register(TypeInfo::interface("Poly").sealed(&["Tri", "Quad"]).implements("Shape"))
            .register(TypeInfo::class("Tri").final_().implements("Poly"))
            .register(TypeInfo::class("Quad").sealed(&["Square"]).implements("Poly"))
            .register(TypeInfo::class("Square").final_().extends("Quad"))
            .register(TypeInfo::enumeration("Color", &["RED", "GREEN", "BLUE"]))
            .register(TypeInfo::record(
                "Pair",
                vec![
                    RecordComponent { name: "a".into(), type_ref: TypeRef::class("Shape") },
                    RecordComponent { name: "b".into(), type_ref: TypeRef::boolean() },
                ],
            ))
            .register(
                TypeInfo::record("Box", vec![RecordComponent { name: "v".into(), type_ref: TypeRef::type_var("T") }])
                    .generic(&["T"]),
            )
            .build()
    }

    fn exhaustive(selector: TypeRef, labels: Vec<CaseLabel>) -> bool {
        let oracle = oracle();
        let refs: Vec<&CaseLabel> = labels.iter().collect();
        ExhaustivenessProver::new(&oracle).is_exhaustive(&selector, &refs).unwrap()
    }

    fn ty(name: &str) -> TypeRef {
        TypeRef::class(name)
    }

    #[test]
    fn nested_sealed_hierarchy() {
        let labels = || {
            vec![
                CaseLabel::of_type(ty("Circle"), "c"),
                CaseLabel::of_type(ty("Tri"), "t"),
                CaseLabel::of_type(ty("Square"), "s"),
            ]
        };
        // Quad is a concrete sealed class, so it must be covered itself.
        assert!(!exhaustive(ty("Shape"), labels()));
        let mut with_quad = labels();
        with_quad.push(CaseLabel::of_type(ty("Quad"), "q"));
        assert!(exhaustive(ty("Shape"), with_quad));
        assert!(exhaustive(ty("Shape"), vec![CaseLabel::of_type(ty("Circle"), "c"), CaseLabel::of_type(ty("Poly"), "p")]));
    }

    #[test]
    fn guarded_and_null_labels_do_not_count() {
        let labels = vec![
            CaseLabel::null_label(),
            CaseLabel::of_type(ty("Circle"), "c"),
            CaseLabel::of_type(ty("Poly"), "p").when(Expr::local("ok", TypeRef::boolean())),
        ];
        assert!(!exhaustive(ty("Shape"), labels));
    }

    #[test]
    fn enum_constants_and_default() {
        let consts = |names: &[&str]| {
            CaseLabel::of_constants(names.iter().map(|n| CaseConstant::enum_constant("Color", *n)).collect())
        };
        assert!(exhaustive(ty("Color"), vec![consts(&["RED", "GREEN", "BLUE"])]));
        assert!(!exhaustive(ty("Color"), vec![consts(&["RED", "GREEN"])]));
        assert!(exhaustive(ty("Color"), vec![consts(&["RED"]), CaseLabel::default_label()]));
        assert!(exhaustive(ty("Color"), vec![consts(&["RED"]), CaseLabel::of_type(ty("Color"), "c")]));
    }

    #[test]
    fn boolean_and_plain_types() {
        let both = CaseLabel::of_constants(vec![CaseConstant::Bool(true), CaseConstant::Bool(false)]);
        assert!(exhaustive(TypeRef::boolean(), vec![both]));
        assert!(!exhaustive(TypeRef::int(), vec![CaseLabel::of_constants(vec![CaseConstant::Int(1)])]));
        assert!(exhaustive(TypeRef::object(), vec![CaseLabel::of_type(TypeRef::object(), "o")]));
        assert!(!exhaustive(TypeRef::object(), vec![CaseLabel::of_type(TypeRef::string(), "s")]));
    }

    #[test]
    fn record_components_split_over_sealed_leaves() {
        let pair = |a: Pattern, b: Pattern| CaseLabel::of_pattern(Pattern::record(ty("Pair"), vec![a, b]));
        let tp = |t: TypeRef, n: &str| Pattern::type_pattern(t, n);
        let labels = vec![
            pair(tp(ty("Circle"), "c"), tp(TypeRef::boolean(), "x")),
            pair(tp(ty("Poly"), "p"), tp(TypeRef::boolean(), "y")),
        ];
        assert!(exhaustive(ty("Pair"), labels));
        let labels = vec![pair(tp(ty("Circle"), "c"), tp(TypeRef::boolean(), "x"))];
        assert!(!exhaustive(ty("Pair"), labels));
    }

    #[test]
    fn generic_record_uses_selector_arguments() {
        let selector = ty("Box").with_type_args(vec![TypeRef::string()]);
        let label = CaseLabel::of_pattern(Pattern::record(ty("Box"), vec![Pattern::type_pattern(TypeRef::string(), "s")]));
        assert!(exhaustive(selector, vec![label.clone()]));
        assert!(!exhaustive(ty("Box"), vec![label]));
    }

    #[test]
    fn adding_default_always_makes_exhaustive() {
        let mut labels = vec![CaseLabel::of_type(ty("Circle"), "c")];
        assert!(!exhaustive(ty("Shape"), labels.clone()));
        assert!(!exhaustive(ty("Shape"), labels.clone()));
        labels.push(CaseLabel::default_label());
        assert!(exhaustive(ty("Shape"), labels));
    }

    #[test]
    fn statement_severity_follows_config() {
        let switch = SwitchConstruct::new(Expr::local("s", ty("Shape")), vec![], false, true);
        let warning = exhaustiveness_diagnostic(&switch, false, true, &Config::default()).unwrap();
        assert_eq!(warning.severity, Severity::Warning);
        let error = exhaustiveness_diagnostic(&switch, false, true, &Config::default().strict()).unwrap();
        assert_eq!(error.severity, Severity::Error);
        assert!(exhaustiveness_diagnostic(&switch, false, false, &Config::default()).is_none());
    }
}
