//! Per-class driver: reconstructs every method, inlines lambda helpers, orders members and
//! nests inner classes into their outer class.

use std::collections::{HashMap, HashSet};

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::ast::visit::{child_lists_mut, map_exprs_in, map_lists};
use crate::ast::{
    CallTarget, ClassDeclaration, ExprKind, Expression, FieldDeclaration, FieldDeclarator,
    LambdaBody, Literal, LocalRef, MemberDeclaration, MethodBody, MethodDeclaration, Parameter,
    RawListing, Statement, StmtKind, RAW_LISTING_MARKER,
};
use crate::cfg;
use crate::error::{Diagnostic, ReconstructError};
use crate::ir::{AccessFlags, Constant, Op, RawClass, RawField, RawMethod};
use crate::members;
use crate::resolver::TypeResolver;
use crate::structure::{self, Structured};
use crate::synth::{coerce_literal, LocalTable, MethodContext};
use crate::types::{parse_class_signature, parse_field_signature, Type, OBJECT};

pub const DEFAULT_MAX_INSTRUCTIONS: usize = 50_000;

/// Offset applied to local ids of an inlined lambda helper, per inlined body.
const INLINE_SCOPE_SHIFT: usize = 24;
const MAX_INLINE_DEPTH: usize = 16;

/// Engine configuration.
#[derive(Clone, Debug)]
pub struct Options {
    /// Rewrite line annotations so they never decrease in output order.
    pub realign_line_numbers: bool,
    /// Surface the first per-method error instead of emitting a raw listing.
    pub strict: bool,
    /// Methods with more instructions fall back to a raw listing.
    pub max_instructions: usize,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            realign_line_numbers: false,
            strict: false,
            max_instructions: DEFAULT_MAX_INSTRUCTIONS,
        }
    }
}

/// Reconstructs a set of classes, nesting `Outer$Inner` classes found in the same set.
///
/// Output follows input order for top-level classes.
pub fn decompile_classes(
    classes: &[RawClass],
    resolver: &TypeResolver,
    options: &Options,
) -> Result<Vec<ClassDeclaration>, ReconstructError> {
    let declarations = classes
        .par_iter()
        .map(|class| reconstruct_class(class, resolver, options))
        .collect::<Result<Vec<_>, _>>()?;

    let names: HashSet<&str> = classes.iter().map(|class| class.name.as_str()).collect();
    let mut children: HashMap<String, Vec<String>> = HashMap::new();
    let mut roots = Vec::new();
    for class in classes {
        match outer_class(class, &names) {
            Some(outer) => children.entry(outer).or_default().push(class.name.clone()),
            None => roots.push(class.name.clone()),
        }
    }
    let access: HashMap<&str, _> = classes
        .iter()
        .flat_map(|class| class.inner_classes.iter())
        .map(|inner| (inner.inner.as_str(), inner.access))
        .collect();

    let mut by_name: HashMap<String, ClassDeclaration> = declarations
        .into_iter()
        .map(|declaration| (declaration.name.clone(), declaration))
        .collect();
    let mut output = Vec::new();
    for root in roots {
        if let Some(mut declaration) = nest(&root, &children, &access, &mut by_name, 0) {
            if options.realign_line_numbers {
                realign_lines(&mut declaration);
            }
            output.push(declaration);
        }
    }
    Ok(output)
}

/// Reconstructs one class without nesting other classes into it.
pub fn decompile_class(
    class: &RawClass,
    resolver: &TypeResolver,
    options: &Options,
) -> Result<ClassDeclaration, ReconstructError> {
    let mut declaration = reconstruct_class(class, resolver, options)?;
    if options.realign_line_numbers {
        realign_lines(&mut declaration);
    }
    Ok(declaration)
}

/// `decompile_class` minus line realignment, which `decompile_classes` applies after nesting.
fn reconstruct_class(
    class: &RawClass,
    resolver: &TypeResolver,
    options: &Options,
) -> Result<ClassDeclaration, ReconstructError> {
    debug!(class = %class.name, methods = class.methods.len(), "reconstructing class");
    let mut methods = class
        .methods
        .par_iter()
        .map(|method| decompile_method(class, method, resolver, options))
        .collect::<Result<Vec<_>, _>>()?;
    inline_lambdas(&mut methods);

    let signature = class
        .signature
        .as_deref()
        .and_then(|signature| parse_class_signature(signature).ok());
    let type_scope: Vec<String> = signature
        .iter()
        .flat_map(|signature| signature.type_params.iter().map(|p| p.name.clone()))
        .collect();
    let (type_params, super_class, interfaces) = match signature {
        Some(signature) => (
            signature.type_params,
            Some(signature.super_class),
            signature.interfaces,
        ),
        None => (
            Vec::new(),
            class.super_name.as_deref().map(|name| resolver.resolve(name)),
            class
                .interfaces
                .iter()
                .map(|name| resolver.resolve(name))
                .collect(),
        ),
    };
    let super_class = super_class.filter(|ty| ty.internal_name() != Some(OBJECT));

    let lines = field_lines(class);
    let fields = class
        .fields
        .iter()
        .map(|field| field_declaration(field, &type_scope, &lines))
        .collect();
    let line = methods
        .iter()
        .map(|method| method.line)
        .filter(|line| *line > 0)
        .min()
        .unwrap_or(0);

    Ok(ClassDeclaration {
        name: class.name.clone(),
        qualified_name: resolver.qualified_name(&class.name),
        access: class.access,
        type_params,
        super_class,
        interfaces,
        source_file: class.source_file.clone(),
        members: members::merge(members::aggregate_fields(fields), methods, Vec::new()),
        line,
    })
}

/// Reconstructs one method. Failures become a raw listing unless `options.strict` is set.
pub fn decompile_method(
    class: &RawClass,
    method: &RawMethod,
    resolver: &TypeResolver,
    options: &Options,
) -> Result<MethodDeclaration, ReconstructError> {
    let built = LocalTable::build(class, method);
    let reconstructed = match &built {
        Ok(locals) if method.has_code() => Some(reconstruct(
            &MethodContext {
                class,
                method,
                resolver,
                locals,
            },
            options,
        )),
        Ok(_) => None,
        Err(error) => Some(Err(error.clone())),
    };

    let (body, diagnostics) = match reconstructed {
        None => (MethodBody::None, Vec::new()),
        Some(Ok(Structured {
            mut body,
            diagnostics,
        })) => {
            if method.is_constructor() {
                drop_implicit_super(&mut body);
            }
            (MethodBody::Structured(body), diagnostics)
        }
        Some(Err(error)) if options.strict => return Err(error),
        Some(Err(error)) => {
            warn!(
                class = %class.name,
                method = %method.name,
                descriptor = %method.descriptor,
                error = %error,
                "falling back to raw listing"
            );
            (
                MethodBody::Raw(raw_listing(method, &error)),
                vec![Diagnostic::from(&error)],
            )
        }
    };

    let locals = built.unwrap_or_default();
    let (type_params, return_type, throws) = match locals.signature() {
        Some(signature) => (
            signature.type_params.clone(),
            signature.ret.clone(),
            signature.throws.clone(),
        ),
        None => (Vec::new(), Type::void(), Vec::new()),
    };
    let throws = if throws.is_empty() {
        method.exceptions.iter().map(|name| resolver.resolve(name)).collect()
    } else {
        throws
    };

    Ok(MethodDeclaration {
        name: method.name.clone(),
        descriptor: method.descriptor.clone(),
        access: method.access,
        type_params,
        params: locals
            .params()
            .map(|param| Parameter {
                var: param.var.clone(),
                ty: param.ty.clone(),
            })
            .collect(),
        return_type,
        throws,
        body,
        line: method.first_line(),
        diagnostics,
    })
}

fn reconstruct(ctx: &MethodContext<'_>, options: &Options) -> Result<Structured, ReconstructError> {
    let count = ctx.method.instructions.len();
    if count > options.max_instructions {
        return Err(ReconstructError::BudgetExceeded {
            count,
            limit: options.max_instructions,
        });
    }
    debug!(method = %ctx.method.name, instructions = count, "building control flow graph");
    let graph = cfg::build(
        &ctx.method.instructions,
        ctx.method.code_length,
        &ctx.method.exception_table,
    )?;
    let synthesized = structure::propagate(ctx, &graph)?;
    structure::structure(ctx, &graph, synthesized)
}

fn raw_listing(method: &RawMethod, error: &ReconstructError) -> RawListing {
    let mut lines = vec![RAW_LISTING_MARKER.to_string(), format!("// {error}")];
    lines.extend(
        method
            .instructions
            .iter()
            .map(|inst| format!("{:>5}: {:?}", inst.offset, inst.op)),
    );
    RawListing {
        reason: error.kind(),
        message: error.to_string(),
        lines,
    }
}

fn drop_implicit_super(body: &mut Vec<Statement>) {
    let implicit = body.first().is_some_and(|stmt| {
        matches!(
            &stmt.kind,
            StmtKind::Expression(Expression {
                kind: ExprKind::MethodCall {
                    target: CallTarget::SuperConstructor,
                    args,
                    ..
                },
                ..
            }) if args.is_empty()
        )
    });
    if implicit {
        body.remove(0);
    }
}

/// Line of the first store to each field in a constructor or static initializer.
fn field_lines(class: &RawClass) -> HashMap<&str, u32> {
    let mut lines = HashMap::new();
    for method in &class.methods {
        if !method.is_constructor() && !method.is_static_initializer() {
            continue;
        }
        for inst in &method.instructions {
            if let Op::PutField(member) | Op::PutStatic(member) = &inst.op
                && member.owner == class.name
            {
                let line = method.line_at(inst.offset);
                if line > 0 {
                    lines.entry(member.name.as_str()).or_insert(line);
                }
            }
        }
    }
    lines
}

fn field_declaration(
    field: &RawField,
    type_scope: &[String],
    lines: &HashMap<&str, u32>,
) -> FieldDeclaration {
    let ty = field
        .signature
        .as_deref()
        .and_then(|signature| parse_field_signature(signature, type_scope).ok())
        .or_else(|| Type::from_descriptor(&field.descriptor).ok())
        .unwrap_or_else(Type::object_root);
    let initializer = field.constant_value.as_ref().map(|constant| {
        let literal = Expression::new(ExprKind::Literal(constant_literal(constant)), constant.ty());
        coerce_literal(literal, &ty)
    });
    let line = lines.get(field.name.as_str()).copied().unwrap_or(0);
    FieldDeclaration {
        access: field.access,
        ty: ty.clone(),
        declarators: vec![FieldDeclarator {
            name: field.name.clone(),
            initializer,
            line,
        }],
        line,
    }
}

fn constant_literal(constant: &Constant) -> Literal {
    match constant {
        Constant::Int(value) => Literal::Int(*value),
        Constant::Long(value) => Literal::Long(*value),
        Constant::Float(value) => Literal::Float(*value),
        Constant::Double(value) => Literal::Double(*value),
        Constant::String(value) => Literal::String(value.clone()),
        Constant::Class(name) => Literal::Class(Type::from_class_ref(name)),
        Constant::Null | Constant::MethodType(_) | Constant::MethodHandle(_) => Literal::Null,
    }
}

/// Outer class of `class` when it is part of the same set.
fn outer_class(class: &RawClass, names: &HashSet<&str>) -> Option<String> {
    if let Some(outer) = class.declared_outer()
        && names.contains(outer)
    {
        return Some(outer.to_string());
    }
    let (outer, simple) = class.name.rsplit_once('$')?;
    let anonymous = simple.starts_with(|c: char| c.is_ascii_digit());
    (!anonymous && !simple.is_empty() && names.contains(outer)).then(|| outer.to_string())
}

fn nest(
    name: &str,
    children: &HashMap<String, Vec<String>>,
    access: &HashMap<&str, AccessFlags>,
    by_name: &mut HashMap<String, ClassDeclaration>,
    depth: usize,
) -> Option<ClassDeclaration> {
    let mut declaration = by_name.remove(name)?;
    if let Some(flags) = access.get(name)
        && depth > 0
    {
        declaration.access = *flags;
    }
    let inner: Vec<ClassDeclaration> = children
        .get(name)
        .into_iter()
        .flatten()
        .filter_map(|child| nest(child, children, access, by_name, depth + 1))
        .collect();
    if inner.is_empty() {
        return Some(declaration);
    }

    let mut fields = Vec::new();
    let mut methods = Vec::new();
    let mut types = Vec::new();
    for member in declaration.members.drain(..) {
        match member {
            MemberDeclaration::Field(field) => fields.push(field),
            MemberDeclaration::Method(method) => methods.push(method),
            MemberDeclaration::Type(class) => types.push(class),
        }
    }
    types.extend(inner);
    declaration.members = members::merge(fields, methods, types);
    Some(declaration)
}

type HelperKey = (String, String);

fn helper_key(method: &MethodDeclaration) -> HelperKey {
    (method.name.clone(), method.descriptor.clone())
}

/// Replaces pending lambda bodies with the bodies of their helper methods and drops helpers
/// that were inlined everywhere they are used.
fn inline_lambdas(methods: &mut Vec<MethodDeclaration>) {
    let helpers: HashMap<HelperKey, MethodDeclaration> = methods
        .iter()
        .filter(|method| {
            method.name.starts_with("lambda$") && matches!(method.body, MethodBody::Structured(_))
        })
        .map(|method| (helper_key(method), method.clone()))
        .collect();
    if helpers.is_empty() {
        return;
    }

    let mut inliner = Inliner {
        helpers: &helpers,
        inlined: HashSet::new(),
        kept: HashSet::new(),
        scopes: 0,
    };
    for method in methods.iter_mut() {
        if helpers.contains_key(&helper_key(method)) {
            continue;
        }
        if let MethodBody::Structured(body) = &mut method.body {
            inliner.inline_in(body, 0);
        }
    }
    // Helpers no lambda pointed at stay in the class; their own lambdas still get bodies.
    for method in methods.iter_mut() {
        let method_key = helper_key(method);
        if !helpers.contains_key(&method_key) || inliner.inlined.contains(&method_key) {
            continue;
        }
        if let MethodBody::Structured(body) = &mut method.body {
            inliner.inline_in(body, 0);
        }
    }
    let removed: HashSet<HelperKey> = inliner.inlined.difference(&inliner.kept).cloned().collect();
    debug!(helpers = removed.len(), "inlined lambda helpers");
    methods.retain(|method| !removed.contains(&helper_key(method)));
}

struct Inliner<'h> {
    helpers: &'h HashMap<HelperKey, MethodDeclaration>,
    inlined: HashSet<HelperKey>,
    /// Helpers still referenced by a pending body.
    kept: HashSet<HelperKey>,
    scopes: usize,
}

impl Inliner<'_> {
    fn inline_in(&mut self, body: &mut [Statement], depth: usize) {
        map_exprs_in(body, &mut |expr| self.inline_expr(expr, depth));
    }

    fn inline_expr(&mut self, expr: &mut Expression, depth: usize) {
        let ExprKind::Lambda {
            params,
            body: LambdaBody::Pending {
                helper,
                descriptor,
                captured,
            },
        } = &mut expr.kind
        else {
            return;
        };
        let key = (helper.clone(), descriptor.clone());
        let helpers = self.helpers;
        let Some(declaration) = helpers.get(&key) else {
            return;
        };
        let MethodBody::Structured(helper_body) = &declaration.body else {
            return;
        };
        if depth >= MAX_INLINE_DEPTH {
            self.kept.insert(key);
            return;
        }

        let captured_values: Vec<Expression> = if declaration.access.is_static() {
            captured.clone()
        } else {
            captured.iter().skip(1).cloned().collect()
        };
        let captured_count = captured_values.len();
        if captured_count > declaration.params.len() {
            self.kept.insert(key);
            return;
        }
        self.scopes += 1;
        let offset = self.scopes << INLINE_SCOPE_SHIFT;
        let substitutions: HashMap<usize, Expression> = declaration
            .params
            .iter()
            .zip(captured_values)
            .map(|(param, value)| (param.var.id, value))
            .collect();

        let mut stmts = helper_body.clone();
        remap_locals(&mut stmts, offset, &substitutions);
        self.inline_in(&mut stmts, depth + 1);

        *params = declaration.params[captured_count..]
            .iter()
            .map(|param| LocalRef {
                id: param.var.id + offset,
                name: param.var.name.clone(),
            })
            .collect();
        let inlined = lambda_body(stmts);
        if let ExprKind::Lambda { body, .. } = &mut expr.kind {
            *body = inlined;
        }
        self.inlined.insert(key);
    }
}

fn lambda_body(mut stmts: Vec<Statement>) -> LambdaBody {
    let single_value = stmts.len() == 1
        && matches!(
            stmts[0].kind,
            StmtKind::Return(Some(_)) | StmtKind::Expression(_)
        );
    if single_value
        && let Some(Statement {
            kind: StmtKind::Return(Some(value)) | StmtKind::Expression(value),
            ..
        }) = stmts.pop()
    {
        return LambdaBody::Expression(Box::new(value));
    }
    LambdaBody::Block(stmts)
}

/// Moves the helper's locals into their own id range and replaces captured parameters with
/// the values captured at the call site.
fn remap_locals(stmts: &mut Vec<Statement>, offset: usize, substitutions: &HashMap<usize, Expression>) {
    map_exprs_in(stmts, &mut |expr| {
        let ExprKind::Local(var) = &mut expr.kind else {
            return;
        };
        let id = var.id;
        match substitutions.get(&id) {
            Some(value) => *expr = value.clone(),
            None => var.id = id + offset,
        }
    });
    map_lists(stmts, &mut |list| {
        for stmt in list.iter_mut() {
            match &mut stmt.kind {
                StmtKind::Declaration { var, .. } | StmtKind::ForEach { var, .. } => {
                    var.id += offset
                }
                StmtKind::Try { catches, .. } => {
                    catches.iter_mut().for_each(|clause| clause.var.id += offset)
                }
                _ => {}
            }
        }
    });
}

fn realign_lines(class: &mut ClassDeclaration) {
    let mut last = 0;
    realign_members(&mut class.members, &mut last);
}

/// Unknown lines take the last known one.
fn realign(line: &mut u32, last: &mut u32) {
    if *line < *last {
        *line = *last;
    } else {
        *last = *line;
    }
}

fn realign_members(members: &mut [MemberDeclaration], last: &mut u32) {
    for member in members {
        match member {
            MemberDeclaration::Field(field) => {
                realign(&mut field.line, last);
                for declarator in &mut field.declarators {
                    realign(&mut declarator.line, last);
                }
            }
            MemberDeclaration::Method(method) => {
                realign(&mut method.line, last);
                if let MethodBody::Structured(body) = &mut method.body {
                    realign_statements(body, last);
                }
            }
            MemberDeclaration::Type(class) => {
                realign(&mut class.line, last);
                realign_members(&mut class.members, last);
            }
        }
    }
}

fn realign_statements(stmts: &mut [Statement], last: &mut u32) {
    for stmt in stmts {
        realign(&mut stmt.line, last);
        for list in child_lists_mut(stmt) {
            realign_statements(list, last);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::render_statements;
    use crate::error::ErrorKind;
    use crate::ir::{DynamicCallSite, HandleKind, InnerClass, MemberRef, MethodHandle};
    use crate::testing::{
        aload, areturn, class_with, iadd, iconst, iload, invoke_special, invoke_static, ireturn,
        putfield, sconst, vreturn, MethodBuilder,
    };
    use pretty_assertions::assert_eq;

    fn lambda_site(name: &str, descriptor: &str, helper: MemberRef) -> Op {
        Op::InvokeDynamic(DynamicCallSite {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            bootstrap: MethodHandle {
                kind: HandleKind::InvokeStatic,
                member: MemberRef::new(
                    "java/lang/invoke/LambdaMetafactory",
                    "metafactory",
                    "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodHandle;Ljava/lang/invoke/MethodType;)Ljava/lang/invoke/CallSite;",
                ),
            },
            bootstrap_args: vec![
                Constant::MethodType("()V".to_string()),
                Constant::MethodHandle(MethodHandle {
                    kind: HandleKind::InvokeStatic,
                    member: helper,
                }),
                Constant::MethodType("()V".to_string()),
            ],
        })
    }

    fn helper_flags() -> u16 {
        AccessFlags::PRIVATE | AccessFlags::STATIC | AccessFlags::SYNTHETIC
    }

    fn method_named<'a>(class: &'a ClassDeclaration, name: &str) -> Option<&'a MethodDeclaration> {
        class.members.iter().find_map(|member| match member {
            MemberDeclaration::Method(method) if method.name == name => Some(method),
            _ => None,
        })
    }

    fn rendered_body(method: &MethodDeclaration) -> String {
        match &method.body {
            MethodBody::Structured(body) => render_statements(body),
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn lambda_helpers_are_inlined_and_removed() {
        let run = MethodBuilder::new("run", "()Ljava/util/function/Supplier;")
            .with_static()
            .code(vec![
                lambda_site(
                    "get",
                    "()Ljava/util/function/Supplier;",
                    MemberRef::new("a/B", "lambda$run$0", "()Ljava/lang/String;"),
                ),
                areturn(),
            ])
            .build();
        let helper = MethodBuilder::new("lambda$run$0", "()Ljava/lang/String;")
            .with_access(helper_flags())
            .code(vec![sconst("x"), areturn()])
            .build();
        let class = class_with("a/B", vec![run, helper]);

        let declaration = decompile_class(&class, &TypeResolver::empty(), &Options::default())
            .expect("class");

        assert_eq!(declaration.members.len(), 1);
        let run = method_named(&declaration, "run").expect("run");
        assert_eq!(rendered_body(run), "return () -> \"x\";\n");
    }

    #[test]
    fn captured_values_replace_helper_parameters() {
        let run = MethodBuilder::new("run", "(I)Ljava/util/function/IntUnaryOperator;")
            .with_static()
            .code(vec![
                iload(0),
                lambda_site(
                    "applyAsInt",
                    "(I)Ljava/util/function/IntUnaryOperator;",
                    MemberRef::new("a/B", "lambda$run$0", "(II)I"),
                ),
                areturn(),
            ])
            .build();
        let helper = MethodBuilder::new("lambda$run$0", "(II)I")
            .with_access(helper_flags())
            .code(vec![iload(0), iload(1), iadd(), ireturn()])
            .build();
        let class = class_with("a/B", vec![run, helper]);

        let declaration = decompile_class(&class, &TypeResolver::empty(), &Options::default())
            .expect("class");

        let run = method_named(&declaration, "run").expect("run");
        assert_eq!(rendered_body(run), "return arg1 -> arg0 + arg1;\n");
        assert!(method_named(&declaration, "lambda$run$0").is_none());
    }

    #[test]
    fn implicit_super_calls_are_dropped() {
        let init = MethodBuilder::new("<init>", "()V")
            .code(vec![
                aload(0),
                invoke_special("java/lang/Object", "<init>", "()V"),
                vreturn(),
            ])
            .build();
        let class = class_with("a/B", vec![init]);

        let declaration = decompile_class(&class, &TypeResolver::empty(), &Options::default())
            .expect("class");

        let init = method_named(&declaration, "<init>").expect("constructor");
        assert_eq!(init.body, MethodBody::Structured(Vec::new()));
    }

    #[test]
    fn failing_methods_degrade_to_raw_listings() {
        let broken = MethodBuilder::new("broken", "()I")
            .with_static()
            .code(vec![iadd(), ireturn()])
            .build();
        let class = class_with("a/B", vec![broken]);

        let declaration = decompile_class(&class, &TypeResolver::empty(), &Options::default())
            .expect("class");

        let broken = method_named(&declaration, "broken").expect("method");
        let MethodBody::Raw(listing) = &broken.body else {
            panic!("expected raw listing, got {:?}", broken.body);
        };
        assert_eq!(listing.reason, ErrorKind::StackSimulation);
        assert_eq!(listing.lines[0], RAW_LISTING_MARKER);
        assert_eq!(listing.lines.len(), 4);
        assert_eq!(broken.diagnostics[0].kind, ErrorKind::StackSimulation);
    }

    #[test]
    fn strict_mode_surfaces_the_first_error() {
        let broken = MethodBuilder::new("broken", "()I")
            .with_static()
            .code(vec![iadd(), ireturn()])
            .build();
        let class = class_with("a/B", vec![broken]);
        let options = Options {
            strict: true,
            ..Options::default()
        };

        let error = decompile_class(&class, &TypeResolver::empty(), &options).expect_err("strict");

        assert_eq!(error.kind(), ErrorKind::StackSimulation);
    }

    #[test]
    fn oversized_methods_exceed_the_budget() {
        let method = MethodBuilder::new("big", "()I")
            .with_static()
            .code(vec![iconst(1), iconst(2), iadd(), ireturn()])
            .build();
        let class = class_with("a/B", vec![method]);
        let options = Options {
            max_instructions: 3,
            ..Options::default()
        };

        let declaration =
            decompile_class(&class, &TypeResolver::empty(), &options).expect("class");

        let big = method_named(&declaration, "big").expect("method");
        assert!(matches!(
            &big.body,
            MethodBody::Raw(listing) if listing.reason == ErrorKind::BudgetExceeded
        ));
    }

    #[test]
    fn fields_take_the_line_of_their_initializer() {
        let init = MethodBuilder::new("<init>", "()V")
            .code(vec![
                aload(0),
                invoke_special("java/lang/Object", "<init>", "()V"),
                aload(0),
                iconst(3),
                putfield("a/B", "count", "I"),
                vreturn(),
            ])
            .lines(&[(0, 1), (2, 4)])
            .build();
        let mut class = class_with("a/B", vec![init]);
        class.fields = vec![
            RawField {
                name: "count".to_string(),
                descriptor: "I".to_string(),
                access: AccessFlags(AccessFlags::PRIVATE),
                ..RawField::default()
            },
            RawField {
                name: "LIMIT".to_string(),
                descriptor: "Z".to_string(),
                access: AccessFlags(AccessFlags::STATIC | AccessFlags::FINAL),
                constant_value: Some(Constant::Int(1)),
                ..RawField::default()
            },
        ];

        let declaration = decompile_class(&class, &TypeResolver::empty(), &Options::default())
            .expect("class");

        let fields: Vec<(&str, u32)> = declaration
            .members
            .iter()
            .filter_map(|member| match member {
                MemberDeclaration::Field(field) => {
                    Some((field.declarators[0].name.as_str(), field.line))
                }
                _ => None,
            })
            .collect();
        assert_eq!(fields, vec![("count", 4), ("LIMIT", 0)]);
        let limit = declaration
            .members
            .iter()
            .find_map(|member| match member {
                MemberDeclaration::Field(field) if field.declarators[0].name == "LIMIT" => {
                    field.declarators[0].initializer.as_ref()
                }
                _ => None,
            })
            .expect("initializer");
        assert_eq!(limit.to_string(), "true");
    }

    #[test]
    fn inner_classes_nest_into_their_outer_class() {
        let outer_method = MethodBuilder::new("outer", "()V")
            .with_static()
            .code(vec![vreturn()])
            .lines(&[(0, 3)])
            .build();
        let inner_method = MethodBuilder::new("inner", "()V")
            .with_static()
            .code(vec![invoke_static("a/B", "outer", "()V"), vreturn()])
            .lines(&[(0, 8)])
            .build();
        let outer = class_with("a/B", vec![outer_method]);
        let mut inner = class_with("a/B$C", vec![inner_method]);
        inner.inner_classes.push(InnerClass {
            inner: "a/B$C".to_string(),
            outer: Some("a/B".to_string()),
            simple_name: Some("C".to_string()),
            access: AccessFlags(AccessFlags::STATIC),
        });

        let classes = decompile_classes(
            &[inner, outer],
            &TypeResolver::empty(),
            &Options::default(),
        )
        .expect("classes");

        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].name, "a/B");
        let kinds: Vec<(&str, u32)> = classes[0]
            .members
            .iter()
            .map(|member| match member {
                MemberDeclaration::Method(method) => (method.name.as_str(), member.line()),
                MemberDeclaration::Type(class) => (class.name.as_str(), member.line()),
                MemberDeclaration::Field(_) => ("field", member.line()),
            })
            .collect();
        assert_eq!(kinds, vec![("outer", 3), ("a/B$C", 8)]);
        let MemberDeclaration::Type(nested) = &classes[0].members[1] else {
            panic!("expected nested type");
        };
        assert_eq!(nested.access, AccessFlags(AccessFlags::STATIC));
    }

    #[test]
    fn realigned_lines_never_decrease() {
        let first = MethodBuilder::new("first", "()V")
            .with_static()
            .code(vec![invoke_static("a/B", "f", "()V"), vreturn()])
            .lines(&[(0, 20)])
            .build();
        let second = MethodBuilder::new("second", "()V")
            .with_static()
            .code(vec![
                invoke_static("a/B", "f", "()V"),
                invoke_static("a/B", "g", "()V"),
                vreturn(),
            ])
            .lines(&[(0, 30), (1, 25)])
            .build();
        let class = class_with("a/B", vec![first, second]);
        let options = Options {
            realign_line_numbers: true,
            ..Options::default()
        };

        let classes =
            decompile_classes(&[class], &TypeResolver::empty(), &options).expect("classes");

        let second = method_named(&classes[0], "second").expect("method");
        let MethodBody::Structured(body) = &second.body else {
            panic!("expected structured body");
        };
        let lines: Vec<u32> = body.iter().map(|stmt| stmt.line).collect();
        assert_eq!(second.line, 25);
        assert_eq!(lines, vec![30, 30]);
    }

    #[test]
    fn single_classes_realign_unknown_lines_too() {
        let first = MethodBuilder::new("first", "()V")
            .with_static()
            .code(vec![invoke_static("a/B", "f", "()V"), vreturn()])
            .lines(&[(0, 20)])
            .build();
        let second = MethodBuilder::new("second", "()V")
            .with_static()
            .code(vec![
                invoke_static("a/B", "f", "()V"),
                invoke_static("a/B", "g", "()V"),
                vreturn(),
            ])
            .lines(&[(0, 30), (1, 25)])
            .build();
        let third = MethodBuilder::new("third", "()V")
            .with_static()
            .code(vec![invoke_static("a/B", "h", "()V"), vreturn()])
            .build();
        let class = class_with("a/B", vec![first, second, third]);
        let options = Options {
            realign_line_numbers: true,
            ..Options::default()
        };

        let declaration =
            decompile_class(&class, &TypeResolver::empty(), &options).expect("class");

        let lines_of = |name: &str| {
            let method = method_named(&declaration, name).expect("method");
            let MethodBody::Structured(body) = &method.body else {
                panic!("expected structured body");
            };
            let mut lines = vec![method.line];
            lines.extend(body.iter().map(|stmt| stmt.line));
            lines
        };
        assert_eq!(lines_of("second"), vec![25, 30, 30]);
        assert_eq!(lines_of("third"), vec![30, 30]);

        let plain = decompile_class(&class, &TypeResolver::empty(), &Options::default())
            .expect("class");
        let third = method_named(&plain, "third").expect("method");
        assert_eq!(third.line, 0);
    }
}
