use std::fmt::{self, Write as _};

use super::{
    BinaryOp, CallTarget, CaseLabel, ExprKind, Expression, Label, LambdaBody, Literal, Statement,
    StmtKind, UnaryOp,
};
use crate::ir::CmpKind;
use crate::types::Type;

const INDENT: &str = "    ";

// Java operator precedence, higher binds tighter.
const ASSIGN: u8 = 1;
const TERNARY: u8 = 2;
const UNARY: u8 = 13;
const POSTFIX: u8 = 14;
const PRIMARY: u8 = 15;

fn binary_precedence(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::LogicalOr => 3,
        BinaryOp::LogicalAnd => 4,
        BinaryOp::Or => 5,
        BinaryOp::Xor => 6,
        BinaryOp::And => 7,
        BinaryOp::Eq | BinaryOp::Ne => 8,
        BinaryOp::Lt | BinaryOp::Ge | BinaryOp::Gt | BinaryOp::Le => 9,
        BinaryOp::Shl | BinaryOp::Shr | BinaryOp::Ushr => 10,
        BinaryOp::Add | BinaryOp::Sub => 11,
        BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => 12,
    }
}

fn precedence(expr: &Expression) -> u8 {
    match &expr.kind {
        ExprKind::Assign { .. } | ExprKind::Lambda { .. } => ASSIGN,
        ExprKind::Ternary { .. } => TERNARY,
        ExprKind::Binary { op, .. } => binary_precedence(*op),
        ExprKind::InstanceOf { .. } => 9,
        ExprKind::Unary {
            op: UnaryOp::PostInc | UnaryOp::PostDec,
            ..
        } => POSTFIX,
        ExprKind::Unary { .. } | ExprKind::Cast(_) => UNARY,
        ExprKind::Literal(Literal::Int(value)) if *value < 0 => UNARY,
        ExprKind::Literal(Literal::Long(value)) if *value < 0 => UNARY,
        ExprKind::Literal(Literal::Float(value)) if value.is_sign_negative() => UNARY,
        ExprKind::Literal(Literal::Double(value)) if value.is_sign_negative() => UNARY,
        _ => PRIMARY,
    }
}

/// Source spelling of a type: nested classes use `.`.
pub(crate) fn type_name(ty: &Type) -> String {
    ty.to_string().replace('$', ".")
}

fn class_name(internal: &str) -> String {
    internal.replace(['/', '$'], ".")
}

pub(crate) fn label_name(label: Label) -> String {
    format!("label{}", label.0)
}

fn push_char_escaped(out: &mut String, unit: u16, quote: char) {
    match unit {
        0x08 => out.push_str("\\b"),
        0x09 => out.push_str("\\t"),
        0x0a => out.push_str("\\n"),
        0x0c => out.push_str("\\f"),
        0x0d => out.push_str("\\r"),
        0x5c => out.push_str("\\\\"),
        unit if unit == quote as u16 => {
            out.push('\\');
            out.push(quote);
        }
        0x20..=0x7e => out.push(unit as u8 as char),
        unit => {
            let _ = write!(out, "\\u{unit:04x}");
        }
    }
}

fn quote_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for unit in value.encode_utf16() {
        push_char_escaped(&mut out, unit, '"');
    }
    out.push('"');
    out
}

fn float_literal(value: f64, wrapper: &str, suffix: &str) -> String {
    if value.is_nan() {
        format!("{wrapper}.NaN")
    } else if value.is_infinite() {
        let sign = if value > 0.0 { "POSITIVE" } else { "NEGATIVE" };
        format!("{wrapper}.{sign}_INFINITY")
    } else {
        format!("{value:?}{suffix}")
    }
}

fn literal(value: &Literal) -> String {
    match value {
        Literal::Null => "null".to_string(),
        Literal::Boolean(value) => value.to_string(),
        Literal::Char(unit) => {
            let mut out = String::from("'");
            push_char_escaped(&mut out, *unit, '\'');
            out.push('\'');
            out
        }
        Literal::Int(value) => value.to_string(),
        Literal::Long(value) => format!("{value}L"),
        Literal::Float(value) => {
            if value.is_finite() {
                format!("{value:?}f")
            } else {
                float_literal(f64::from(*value), "Float", "f")
            }
        }
        Literal::Double(value) => float_literal(*value, "Double", ""),
        Literal::String(value) => quote_string(value),
        Literal::Class(ty) => format!("{}.class", type_name(ty)),
    }
}

struct Printer {
    out: String,
    depth: usize,
}

impl Printer {
    fn new(depth: usize) -> Self {
        Printer {
            out: String::new(),
            depth,
        }
    }

    fn expr_at(&mut self, expr: &Expression, min: u8) {
        if precedence(expr) < min {
            self.out.push('(');
            self.expr(expr);
            self.out.push(')');
        } else {
            self.expr(expr);
        }
    }

    fn args(&mut self, args: &[Expression]) {
        self.out.push('(');
        for (index, arg) in args.iter().enumerate() {
            if index > 0 {
                self.out.push_str(", ");
            }
            self.expr_at(arg, ASSIGN);
        }
        self.out.push(')');
    }

    fn expr(&mut self, expr: &Expression) {
        match &expr.kind {
            ExprKind::Literal(value) => self.out.push_str(&literal(value)),
            ExprKind::Local(var) => self.out.push_str(&var.name),
            ExprKind::This => self.out.push_str("this"),
            ExprKind::Field {
                target,
                owner,
                name,
            } => {
                match target {
                    Some(target) => self.expr_at(target, POSTFIX),
                    None => self.out.push_str(&class_name(owner)),
                }
                self.out.push('.');
                self.out.push_str(name);
            }
            ExprKind::MethodCall {
                target,
                owner,
                name,
                args,
                ..
            } => {
                match target {
                    CallTarget::Static => {
                        self.out.push_str(&class_name(owner));
                        self.out.push('.');
                        self.out.push_str(name);
                    }
                    CallTarget::Instance(receiver) => {
                        self.expr_at(receiver, POSTFIX);
                        self.out.push('.');
                        self.out.push_str(name);
                    }
                    CallTarget::Super => {
                        self.out.push_str("super.");
                        self.out.push_str(name);
                    }
                    CallTarget::SuperConstructor => self.out.push_str("super"),
                    CallTarget::ThisConstructor => self.out.push_str("this"),
                }
                self.args(args);
            }
            ExprKind::NewObject { class, args, .. } => {
                self.out.push_str("new ");
                self.out.push_str(&type_name(class));
                self.args(args);
            }
            ExprKind::NewArray {
                element,
                dimensions,
                init,
            } => {
                self.out.push_str("new ");
                match init {
                    Some(values) => {
                        self.out.push_str(&type_name(element));
                        self.out.push_str("[]{");
                        for (index, value) in values.iter().enumerate() {
                            if index > 0 {
                                self.out.push_str(", ");
                            }
                            self.expr_at(value, ASSIGN);
                        }
                        self.out.push('}');
                    }
                    None => {
                        let mut base = element;
                        let mut extra: usize = 0;
                        while let Type::Array(inner) = base {
                            base = inner;
                            extra += 1;
                        }
                        // The dimensions beyond the first count against the element type.
                        extra = (extra + 1).saturating_sub(dimensions.len());
                        self.out.push_str(&type_name(base));
                        for dimension in dimensions {
                            self.out.push('[');
                            self.expr_at(dimension, ASSIGN);
                            self.out.push(']');
                        }
                        for _ in 0..extra {
                            self.out.push_str("[]");
                        }
                    }
                }
            }
            ExprKind::Cast(inner) => {
                let _ = write!(self.out, "({}) ", type_name(&expr.ty));
                self.expr_at(inner, UNARY);
            }
            ExprKind::Binary { op, left, right } => {
                let own = binary_precedence(*op);
                self.expr_at(left, own);
                let _ = write!(self.out, " {} ", op.symbol());
                self.expr_at(right, own + 1);
            }
            ExprKind::Unary { op, operand } => match op {
                UnaryOp::PostInc | UnaryOp::PostDec => {
                    self.expr_at(operand, POSTFIX);
                    self.out
                        .push_str(if *op == UnaryOp::PostInc { "++" } else { "--" });
                }
                _ => {
                    let symbol = match op {
                        UnaryOp::Neg => "-",
                        UnaryOp::Not => "!",
                        UnaryOp::BitNot => "~",
                        UnaryOp::PreInc => "++",
                        _ => "--",
                    };
                    self.out.push_str(symbol);
                    let mut nested = Printer::new(self.depth);
                    nested.expr_at(operand, UNARY);
                    // Keep `- -x` and `- --x` from fusing into other tokens.
                    if matches!(symbol, "-" | "--") && nested.out.starts_with('-') {
                        self.out.push(' ');
                    }
                    self.out.push_str(&nested.out);
                }
            },
            ExprKind::Assign { op, target, value } => {
                self.expr_at(target, POSTFIX);
                match op {
                    Some(op) => {
                        let _ = write!(self.out, " {}= ", op.symbol());
                    }
                    None => self.out.push_str(" = "),
                }
                self.expr_at(value, ASSIGN);
            }
            ExprKind::Ternary {
                cond,
                then,
                otherwise,
            } => {
                self.expr_at(cond, TERNARY + 1);
                self.out.push_str(" ? ");
                self.expr_at(then, ASSIGN);
                self.out.push_str(" : ");
                self.expr_at(otherwise, TERNARY);
            }
            ExprKind::InstanceOf { expr, class } => {
                self.expr_at(expr, 9);
                let _ = write!(self.out, " instanceof {}", type_name(class));
            }
            ExprKind::Lambda { params, body } => {
                match params.as_slice() {
                    [single] => self.out.push_str(&single.name),
                    _ => {
                        let names: Vec<&str> = params.iter().map(|p| p.name.as_str()).collect();
                        let _ = write!(self.out, "({})", names.join(", "));
                    }
                }
                self.out.push_str(" -> ");
                match body {
                    LambdaBody::Pending { helper, .. } => {
                        // Never inlined; show the helper it still points at.
                        let _ = write!(self.out, "{helper}(...)");
                    }
                    LambdaBody::Expression(inner) => self.expr_at(inner, ASSIGN),
                    LambdaBody::Block(stmts) => {
                        self.out.push_str("{\n");
                        let mut nested = Printer::new(self.depth + 1);
                        nested.statements(stmts);
                        self.out.push_str(&nested.out);
                        self.indent();
                        self.out.push('}');
                    }
                }
            }
            ExprKind::MethodReference {
                receiver,
                owner,
                name,
            } => {
                match receiver {
                    Some(receiver) => self.expr_at(receiver, POSTFIX),
                    None => self.out.push_str(&class_name(owner)),
                }
                self.out.push_str("::");
                self.out
                    .push_str(if name == "<init>" { "new" } else { name });
            }
            ExprKind::ArrayAccess { array, index } => {
                self.expr_at(array, POSTFIX);
                self.out.push('[');
                self.expr_at(index, ASSIGN);
                self.out.push(']');
            }
            ExprKind::ArrayLength(array) => {
                self.expr_at(array, POSTFIX);
                self.out.push_str(".length");
            }
            ExprKind::CaughtException => self.out.push_str("<caught>"),
            ExprKind::Uninitialized(class) => {
                let _ = write!(self.out, "<new {}>", class_name(class));
            }
            ExprKind::Compare3 { kind, left, right } => {
                let wrapper = match kind {
                    CmpKind::Long => "Long",
                    CmpKind::FloatL | CmpKind::FloatG => "Float",
                    CmpKind::DoubleL | CmpKind::DoubleG => "Double",
                };
                let _ = write!(self.out, "{wrapper}.compare");
                self.args(&[(**left).clone(), (**right).clone()]);
            }
        }
    }

    fn indent(&mut self) {
        for _ in 0..self.depth {
            self.out.push_str(INDENT);
        }
    }

    fn line(&mut self, text: &str) {
        self.indent();
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn expression_text(&self, expr: &Expression) -> String {
        let mut nested = Printer::new(self.depth);
        nested.expr(expr);
        nested.out
    }

    fn statements(&mut self, stmts: &[Statement]) {
        for stmt in stmts {
            self.statement(stmt, "");
        }
    }

    fn block(&mut self, stmts: &[Statement]) {
        self.depth += 1;
        self.statements(stmts);
        self.depth -= 1;
    }

    fn inline_statement(&self, stmt: &Statement) -> String {
        match &stmt.kind {
            StmtKind::Declaration { var, ty, init } => match init {
                Some(init) => format!(
                    "{} {} = {}",
                    type_name(ty),
                    var.name,
                    self.expression_text(init)
                ),
                None => format!("{} {}", type_name(ty), var.name),
            },
            StmtKind::Expression(expr) => self.expression_text(expr),
            _ => String::new(),
        }
    }

    fn statement(&mut self, stmt: &Statement, prefix: &str) {
        match &stmt.kind {
            StmtKind::Block(body) => {
                self.line(&format!("{prefix}{{"));
                self.block(body);
                self.line("}");
            }
            StmtKind::If {
                cond,
                then,
                otherwise,
            } => {
                let cond = self.expression_text(cond);
                self.line(&format!("{prefix}if ({cond}) {{"));
                self.block(then);
                let mut otherwise = otherwise;
                loop {
                    match otherwise.as_slice() {
                        [] => break,
                        [
                            Statement {
                                kind:
                                    StmtKind::If {
                                        cond,
                                        then,
                                        otherwise: rest,
                                    },
                                ..
                            },
                        ] => {
                            let cond = self.expression_text(cond);
                            self.line(&format!("}} else if ({cond}) {{"));
                            self.block(then);
                            otherwise = rest;
                        }
                        _ => {
                            self.line("} else {");
                            self.block(otherwise);
                            break;
                        }
                    }
                }
                self.line("}");
            }
            StmtKind::While { cond, body } => {
                let cond = self.expression_text(cond);
                self.line(&format!("{prefix}while ({cond}) {{"));
                self.block(body);
                self.line("}");
            }
            StmtKind::DoWhile { body, cond } => {
                self.line(&format!("{prefix}do {{"));
                self.block(body);
                let cond = self.expression_text(cond);
                self.line(&format!("}} while ({cond});"));
            }
            StmtKind::For {
                init,
                cond,
                update,
                body,
            } => {
                let init: Vec<String> = init.iter().map(|s| self.inline_statement(s)).collect();
                let cond = cond
                    .as_ref()
                    .map(|cond| self.expression_text(cond))
                    .unwrap_or_default();
                let update: Vec<String> = update.iter().map(|e| self.expression_text(e)).collect();
                self.line(&format!(
                    "{prefix}for ({}; {}; {}) {{",
                    init.join(", "),
                    cond,
                    update.join(", ")
                ));
                self.block(body);
                self.line("}");
            }
            StmtKind::ForEach {
                var,
                var_ty,
                iterable,
                body,
            } => {
                let iterable = self.expression_text(iterable);
                self.line(&format!(
                    "{prefix}for ({} {} : {iterable}) {{",
                    type_name(var_ty),
                    var.name
                ));
                self.block(body);
                self.line("}");
            }
            StmtKind::Switch { selector, cases } => {
                let selector = self.expression_text(selector);
                self.line(&format!("{prefix}switch ({selector}) {{"));
                self.depth += 1;
                for case in cases {
                    for label in &case.labels {
                        let text = match label {
                            CaseLabel::Int(value) => format!("case {value}:"),
                            CaseLabel::String(value) => format!("case {}:", quote_string(value)),
                            CaseLabel::Enum(name) => format!("case {name}:"),
                            CaseLabel::Default => "default:".to_string(),
                        };
                        self.line(&text);
                    }
                    self.block(&case.body);
                }
                self.depth -= 1;
                self.line("}");
            }
            StmtKind::Try {
                body,
                catches,
                finally,
            } => {
                self.line(&format!("{prefix}try {{"));
                self.block(body);
                for clause in catches {
                    let types: Vec<String> = clause.types.iter().map(type_name).collect();
                    self.line(&format!(
                        "}} catch ({} {}) {{",
                        types.join(" | "),
                        clause.var.name
                    ));
                    self.block(&clause.body);
                }
                if let Some(finally) = finally {
                    self.line("} finally {");
                    self.block(finally);
                }
                self.line("}");
            }
            StmtKind::Synchronized { lock, body } => {
                let lock = self.expression_text(lock);
                self.line(&format!("{prefix}synchronized ({lock}) {{"));
                self.block(body);
                self.line("}");
            }
            StmtKind::Labeled { label, body } => {
                let prefix = format!("{prefix}{}: ", label_name(*label));
                self.statement(body, &prefix);
            }
            StmtKind::Break(label) => match label {
                Some(label) => self.line(&format!("{prefix}break {};", label_name(*label))),
                None => self.line(&format!("{prefix}break;")),
            },
            StmtKind::Continue(label) => match label {
                Some(label) => self.line(&format!("{prefix}continue {};", label_name(*label))),
                None => self.line(&format!("{prefix}continue;")),
            },
            StmtKind::Return(value) => match value {
                Some(value) => {
                    let value = self.expression_text(value);
                    self.line(&format!("{prefix}return {value};"));
                }
                None => self.line(&format!("{prefix}return;")),
            },
            StmtKind::Throw(value) => {
                let value = self.expression_text(value);
                self.line(&format!("{prefix}throw {value};"));
            }
            StmtKind::Expression(_) | StmtKind::Declaration { .. } => {
                let text = self.inline_statement(stmt);
                self.line(&format!("{prefix}{text};"));
            }
            StmtKind::Assert { cond, message } => {
                let cond = self.expression_text(cond);
                match message {
                    Some(message) => {
                        let message = self.expression_text(message);
                        self.line(&format!("{prefix}assert {cond} : {message};"));
                    }
                    None => self.line(&format!("{prefix}assert {cond};")),
                }
            }
            StmtKind::MonitorEnter(lock) => {
                let lock = self.expression_text(lock);
                self.line(&format!("{prefix}monitorenter({lock});"));
            }
            StmtKind::MonitorExit(lock) => {
                let lock = self.expression_text(lock);
                self.line(&format!("{prefix}monitorexit({lock});"));
            }
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut printer = Printer::new(0);
        printer.expr(self);
        f.write_str(&printer.out)
    }
}

/// Renders statements as Java source text, four spaces per nesting level.
pub fn render_statements(stmts: &[Statement]) -> String {
    let mut printer = Printer::new(0);
    printer.statements(stmts);
    printer.out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{LocalRef, SwitchCase};
    use crate::types::PrimitiveType;
    use pretty_assertions::assert_eq;

    fn var(name: &str) -> Expression {
        Expression::local(
            LocalRef {
                id: 0,
                name: name.to_string(),
            },
            Type::int(),
        )
    }

    #[test]
    fn parenthesizes_by_precedence() {
        let sum = Expression::binary(BinaryOp::Add, var("a"), var("b"), Type::int());
        let product = Expression::binary(BinaryOp::Mul, sum.clone(), var("c"), Type::int());
        let right = Expression::binary(BinaryOp::Sub, var("a"), sum, Type::int());

        assert_eq!(product.to_string(), "(a + b) * c");
        assert_eq!(right.to_string(), "a - (a + b)");
        assert_eq!(
            Expression::unary(UnaryOp::Neg, Expression::int(-1)).to_string(),
            "- -1"
        );
    }

    #[test]
    fn formats_literals_like_java() {
        let cases = [
            (Literal::Long(3), "3L"),
            (Literal::Float(1.5), "1.5f"),
            (Literal::Double(2.0), "2.0"),
            (Literal::Double(f64::NAN), "Double.NaN"),
            (Literal::Char(u16::from(b'\'')), "'\\''"),
            (Literal::String("a\"b\n\u{e9}".to_string()), "\"a\\\"b\\n\\u00e9\""),
            (
                Literal::Class(Type::array(Type::primitive(PrimitiveType::Byte))),
                "byte[].class",
            ),
        ];
        for (value, expected) in cases {
            assert_eq!(Expression::literal(value).to_string(), expected);
        }
    }

    #[test]
    fn unsized_dimensions_follow_the_sized_ones() {
        let int = Type::primitive(PrimitiveType::Int);
        let array = |element: Type, dimensions: Vec<Expression>| {
            Expression::new(
                ExprKind::NewArray {
                    element: element.clone(),
                    dimensions,
                    init: None,
                },
                Type::array(element),
            )
        };

        let partial = array(
            Type::array(Type::array(int.clone())),
            vec![Expression::int(2), Expression::int(3)],
        );
        let flat = array(int, vec![var("n")]);

        assert_eq!(partial.to_string(), "new int[2][3][]");
        assert_eq!(flat.to_string(), "new int[n]");
    }

    #[test]
    fn renders_nested_statements() {
        let stmts = vec![
            Statement::new(
                StmtKind::Labeled {
                    label: Label(1),
                    body: Box::new(Statement::new(
                        StmtKind::While {
                            cond: Expression::boolean(true),
                            body: vec![Statement::new(
                                StmtKind::If {
                                    cond: var("a"),
                                    then: vec![Statement::new(StmtKind::Break(Some(Label(1))), 0)],
                                    otherwise: vec![Statement::expression(
                                        Expression::unary(UnaryOp::PostInc, var("i")),
                                        0,
                                    )],
                                },
                                0,
                            )],
                        },
                        0,
                    )),
                },
                0,
            ),
            Statement::new(
                StmtKind::Switch {
                    selector: var("i"),
                    cases: vec![SwitchCase {
                        labels: vec![CaseLabel::Int(1), CaseLabel::Default],
                        body: vec![Statement::new(StmtKind::Return(Some(var("i"))), 0)],
                    }],
                },
                0,
            ),
        ];

        assert_eq!(
            render_statements(&stmts),
            "label1: while (true) {\n    if (a) {\n        break label1;\n    } else {\n        i++;\n    }\n}\nswitch (i) {\n    case 1:\n    default:\n        return i;\n}\n"
        );
    }
}
