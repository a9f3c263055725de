//! Method calls, constructor folding, string concatenation and `invokedynamic` call sites.

use tracing::debug;

use super::{coerce_literal, Simulator, Value};
use crate::ast::{BinaryOp, CallTarget, ExprKind, Expression, LambdaBody, Literal, StmtKind};
use crate::error::{Diagnostic, ReconstructError};
use crate::ir::{Constant, DynamicCallSite, HandleKind, InvokeKind, MemberRef};
use crate::types::{parse_method_descriptor, MethodSignature, ObjectType, Type};

const STRING_BUILDER: &str = "java/lang/StringBuilder";
const STRING_BUFFER: &str = "java/lang/StringBuffer";
const LAMBDA_FACTORY: &str = "java/lang/invoke/LambdaMetafactory";
const CONCAT_FACTORY: &str = "java/lang/invoke/StringConcatFactory";

const RECIPE_ARG: char = '\u{1}';
const RECIPE_CONSTANT: char = '\u{2}';

fn is_builder(owner: &str) -> bool {
    owner == STRING_BUILDER || owner == STRING_BUFFER
}

/// `String.valueOf(x)` reduced to `x`; concatenation converts implicitly.
fn strip_value_of(expr: Expression) -> Expression {
    if let ExprKind::MethodCall {
        target: CallTarget::Static,
        owner,
        name,
        descriptor,
        args,
    } = &expr.kind
        && owner == crate::types::STRING
        && name == "valueOf"
        && descriptor != "([C)Ljava/lang/String;"
        && let [arg] = args.as_slice()
    {
        return arg.clone();
    }
    expr
}

/// Operands appended by a `new StringBuilder(..).append(..)...` chain, in order.
fn builder_operands(expr: &Expression) -> Option<Vec<Expression>> {
    match &expr.kind {
        ExprKind::MethodCall {
            target: CallTarget::Instance(receiver),
            owner,
            name,
            args,
            ..
        } if is_builder(owner) && name == "append" => {
            let [arg] = args.as_slice() else {
                return None;
            };
            let mut operands = builder_operands(receiver)?;
            operands.push(arg.clone());
            Some(operands)
        }
        ExprKind::NewObject { class, args, .. }
            if class.internal_name().is_some_and(is_builder) =>
        {
            match args.as_slice() {
                [] => Some(Vec::new()),
                [initial] if initial.ty.is_string() || is_value_of_string(initial) => {
                    Some(vec![strip_value_of(initial.clone())])
                }
                _ => None,
            }
        }
        _ => None,
    }
}

fn is_value_of_string(expr: &Expression) -> bool {
    matches!(
        &expr.kind,
        ExprKind::MethodCall { owner, name, .. } if owner == crate::types::STRING && name == "valueOf"
    )
}

/// Left-associative `+` chain that evaluates to the same string as appending `operands`.
pub(crate) fn concatenation(operands: Vec<Expression>) -> Expression {
    let starts_with_string = match operands.as_slice() {
        [] => false,
        [only] => matches!(only.kind, ExprKind::Literal(Literal::String(_))),
        [first, second, ..] => first.ty.is_string() || second.ty.is_string(),
    };
    let mut operands = operands.into_iter();
    let mut result = if starts_with_string {
        match operands.next() {
            Some(first) => first,
            None => Expression::string(""),
        }
    } else {
        Expression::string("")
    };
    for operand in operands {
        result = Expression::binary(BinaryOp::Add, result, operand, Type::string());
    }
    result
}

/// Splits a `makeConcatWithConstants` recipe into literal chunks and operands.
fn recipe_operands(
    recipe: &str,
    args: Vec<Expression>,
    constants: &[Constant],
) -> Option<Vec<Expression>> {
    let mut operands = Vec::new();
    let mut args = args.into_iter();
    let mut constants = constants.iter();
    let mut text = String::new();
    let flush = |text: &mut String, operands: &mut Vec<Expression>| {
        if !text.is_empty() {
            operands.push(Expression::string(std::mem::take(text)));
        }
    };
    for c in recipe.chars() {
        match c {
            RECIPE_ARG => {
                flush(&mut text, &mut operands);
                operands.push(args.next()?);
            }
            RECIPE_CONSTANT => match constants.next()? {
                Constant::String(value) => text.push_str(value),
                Constant::Int(value) => text.push_str(&value.to_string()),
                Constant::Long(value) => text.push_str(&value.to_string()),
                _ => return None,
            },
            c => text.push(c),
        }
    }
    flush(&mut text, &mut operands);
    Some(operands)
}

impl Simulator<'_, '_> {
    pub(super) fn field_type(&self, receiver: Option<&Expression>, field: &MemberRef) -> Type {
        let erased =
            Type::from_descriptor(&field.descriptor).unwrap_or_else(|_| Type::object_root());
        let (receiver_ty, on_this) = match receiver {
            Some(expr) => (
                expr.ty.as_object().cloned(),
                matches!(expr.kind, ExprKind::This),
            ),
            None => (Some(ObjectType::new(field.owner.clone())), false),
        };
        let generic = receiver_ty.and_then(|receiver| {
            self.ctx
                .resolver
                .field_type(&receiver, &field.owner, &field.name)
        });
        match generic {
            Some(ty) if on_this || !ty.contains_generics() => ty,
            _ => erased,
        }
    }

    pub(super) fn invoke(
        &mut self,
        kind: InvokeKind,
        method: &MemberRef,
    ) -> Result<(), ReconstructError> {
        let descriptor = parse_method_descriptor(&method.descriptor)
            .map_err(|err| self.error(err.to_string()))?;
        let values = self.pop_n(descriptor.params.len())?;
        let receiver = match kind {
            InvokeKind::Static => None,
            _ => Some(self.pop()?),
        };
        let overloaded =
            self.ctx
                .resolver
                .has_overload(&method.owner, &method.name, descriptor.params.len());
        let args: Vec<Expression> = values
            .into_iter()
            .zip(&descriptor.params)
            .map(|(value, param)| {
                let expr = if overloaded {
                    value.expr
                } else {
                    self.coerce_value(value.expr, param)
                };
                coerce_literal(expr, param)
            })
            .collect();

        if method.name == "<init>" {
            if let Some(receiver) = receiver {
                return self.construct(receiver, method, args);
            }
            return Err(self.error("constructor call without a receiver"));
        }

        if method.name == "toString"
            && is_builder(&method.owner)
            && let Some(receiver) = &receiver
            && !self.stack.iter().any(|entry| entry.id == receiver.id)
            && let Some(operands) = builder_operands(&receiver.expr)
        {
            let concat = concatenation(operands);
            self.push(concat);
            return Ok(());
        }

        let receiver = receiver.map(|value| value.expr);
        let ret = self.return_type(method, &descriptor, receiver.as_ref(), &args);
        let target = match receiver {
            None => CallTarget::Static,
            Some(receiver) => {
                let is_this = matches!(receiver.kind, ExprKind::This);
                if kind == InvokeKind::Special && is_this && method.owner != self.ctx.class.name {
                    CallTarget::Super
                } else {
                    CallTarget::Instance(Box::new(receiver))
                }
            }
        };
        let call = Expression::new(
            ExprKind::MethodCall {
                target,
                owner: method.owner.clone(),
                name: method.name.clone(),
                descriptor: method.descriptor.clone(),
                args,
            },
            ret,
        );
        if call.ty.is_void() {
            self.emit(StmtKind::Expression(call));
        } else {
            self.push(call);
        }
        Ok(())
    }

    /// Folds `<init>` into its allocation, or into `super(..)` / `this(..)`.
    fn construct(
        &mut self,
        receiver: Value,
        method: &MemberRef,
        args: Vec<Expression>,
    ) -> Result<(), ReconstructError> {
        match &receiver.expr.kind {
            ExprKind::Uninitialized(class) => {
                let created = Expression::new(
                    ExprKind::NewObject {
                        class: self.ctx.resolver.resolve(class),
                        descriptor: method.descriptor.clone(),
                        args,
                    },
                    receiver.expr.ty.clone(),
                );
                let copies = self
                    .stack
                    .iter()
                    .filter(|entry| entry.id == receiver.id)
                    .count();
                match copies {
                    0 => self.emit(StmtKind::Expression(created)),
                    1 => {
                        for entry in self.stack.iter_mut().filter(|e| e.id == receiver.id) {
                            entry.expr = created.clone();
                        }
                    }
                    _ => {
                        let temp = self.temp(created.ty.clone());
                        self.statements.push(crate::ast::Statement::expression(
                            Expression::assign(None, temp.clone(), created),
                            self.line,
                        ));
                        for entry in self.stack.iter_mut().filter(|e| e.id == receiver.id) {
                            entry.expr = temp.clone();
                        }
                    }
                }
                Ok(())
            }
            ExprKind::This if self.ctx.method.is_constructor() => {
                let target = if method.owner == self.ctx.class.name {
                    CallTarget::ThisConstructor
                } else {
                    CallTarget::SuperConstructor
                };
                let call = Expression::new(
                    ExprKind::MethodCall {
                        target,
                        owner: method.owner.clone(),
                        name: method.name.clone(),
                        descriptor: method.descriptor.clone(),
                        args,
                    },
                    Type::void(),
                );
                self.emit(StmtKind::Expression(call));
                Ok(())
            }
            _ => {
                let call = Expression::new(
                    ExprKind::MethodCall {
                        target: CallTarget::Instance(Box::new(receiver.expr)),
                        owner: method.owner.clone(),
                        name: method.name.clone(),
                        descriptor: method.descriptor.clone(),
                        args,
                    },
                    Type::void(),
                );
                self.emit(StmtKind::Expression(call));
                Ok(())
            }
        }
    }

    /// Return type with class and method type variables bound where they can be inferred.
    fn return_type(
        &mut self,
        method: &MemberRef,
        descriptor: &MethodSignature,
        receiver: Option<&Expression>,
        args: &[Expression],
    ) -> Type {
        let resolver = self.ctx.resolver;
        let Some((declaring, signature)) =
            resolver.method_signature(&method.owner, &method.name, &method.descriptor)
        else {
            return descriptor.ret.clone();
        };
        if signature.params.len() != args.len() {
            return descriptor.ret.clone();
        }
        let on_this = receiver.is_some_and(|expr| matches!(expr.kind, ExprKind::This));
        let class_bindings = receiver
            .and_then(|expr| expr.ty.as_object())
            .map(|object| resolver.member_bindings(object, &declaring))
            .unwrap_or_default();
        let mut ret = signature.ret.bind(&class_bindings);
        if !signature.type_params.is_empty() {
            let formals: Vec<Type> = signature
                .params
                .iter()
                .map(|param| param.bind(&class_bindings))
                .collect();
            let actuals: Vec<Type> = args.iter().map(|arg| arg.ty.clone()).collect();
            match resolver.unify(&formals, &actuals) {
                Ok(bindings) => ret = ret.bind(&bindings),
                Err(err) => {
                    debug!(method = %method.name, error = %err, "falling back to erased return type");
                    self.diagnostics.push(Diagnostic::from(&err));
                    return descriptor.ret.clone();
                }
            }
        }
        if ret.contains_generics() && !on_this {
            return descriptor.ret.clone();
        }
        ret
    }

    pub(super) fn invoke_dynamic(&mut self, site: &DynamicCallSite) -> Result<(), ReconstructError> {
        let descriptor = parse_method_descriptor(&site.descriptor)
            .map_err(|err| self.error(err.to_string()))?;
        let captured: Vec<Expression> = self
            .pop_n(descriptor.params.len())?
            .into_iter()
            .map(|value| value.expr)
            .collect();
        let bootstrap = &site.bootstrap.member;

        if bootstrap.owner == LAMBDA_FACTORY
            && let Some(Constant::MethodHandle(handle)) = site.bootstrap_args.get(1)
        {
            let expr = self.lambda(handle.kind, &handle.member, captured, descriptor.ret);
            self.push(expr);
            return Ok(());
        }

        if bootstrap.owner == CONCAT_FACTORY {
            let operands = match (bootstrap.name.as_str(), site.bootstrap_args.split_first()) {
                ("makeConcatWithConstants", Some((Constant::String(recipe), constants))) => {
                    recipe_operands(recipe, captured.clone(), constants)
                }
                ("makeConcat", _) => Some(captured.clone()),
                _ => None,
            };
            if let Some(operands) = operands {
                self.push(concatenation(operands));
                return Ok(());
            }
        }

        let call = Expression::new(
            ExprKind::MethodCall {
                target: CallTarget::Static,
                owner: bootstrap.owner.clone(),
                name: site.name.clone(),
                descriptor: site.descriptor.clone(),
                args: captured,
            },
            descriptor.ret,
        );
        if call.ty.is_void() {
            self.emit(StmtKind::Expression(call));
        } else {
            self.push(call);
        }
        Ok(())
    }

    fn lambda(
        &self,
        kind: HandleKind,
        target: &MemberRef,
        mut captured: Vec<Expression>,
        ty: Type,
    ) -> Expression {
        if target.owner == self.ctx.class.name && target.name.starts_with("lambda$") {
            return Expression::new(
                ExprKind::Lambda {
                    params: Vec::new(),
                    body: LambdaBody::Pending {
                        helper: target.name.clone(),
                        descriptor: target.descriptor.clone(),
                        captured,
                    },
                },
                ty,
            );
        }
        let receiver = match kind {
            HandleKind::NewInvokeSpecial | HandleKind::InvokeStatic => None,
            _ if captured.len() == 1 => captured.pop().map(Box::new),
            _ => None,
        };
        Expression::new(
            ExprKind::MethodReference {
                receiver,
                owner: target.owner.clone(),
                name: target.name.clone(),
            },
            ty,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::LocalRef;
    use pretty_assertions::assert_eq;

    fn local(name: &str, ty: Type) -> Expression {
        Expression::local(
            LocalRef {
                id: 1,
                name: name.to_string(),
            },
            ty,
        )
    }

    #[test]
    fn concatenation_adds_an_empty_prefix_only_when_needed() {
        let number = local("n", Type::int());
        let text = local("s", Type::string());

        let numeric = concatenation(vec![number.clone(), number.clone()]);
        let textual = concatenation(vec![number.clone(), text.clone(), number.clone()]);
        let single = concatenation(vec![text]);

        assert_eq!(numeric.to_string(), "\"\" + n + n");
        assert_eq!(textual.to_string(), "n + s + n");
        assert_eq!(single.to_string(), "\"\" + s");
        assert_eq!(concatenation(Vec::new()).to_string(), "\"\"");
    }

    #[test]
    fn recipes_interleave_constants_and_arguments() {
        let operands = recipe_operands(
            "id=\u{1}, tag=\u{2}!",
            vec![local("id", Type::int())],
            &[Constant::String("x".to_string())],
        )
        .expect("recipe");

        assert_eq!(concatenation(operands).to_string(), "\"id=\" + id + \", tag=x!\"");
        assert_eq!(recipe_operands("\u{1}", Vec::new(), &[]), None);
    }
}
