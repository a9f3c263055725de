use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// Primitive JVM types, including `void` for method returns.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize)]
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

const BOXES: [(PrimitiveType, &str, &str); 8] = [
    (PrimitiveType::Boolean, "java/lang/Boolean", "booleanValue"),
    (PrimitiveType::Byte, "java/lang/Byte", "byteValue"),
    (PrimitiveType::Char, "java/lang/Character", "charValue"),
    (PrimitiveType::Short, "java/lang/Short", "shortValue"),
    (PrimitiveType::Int, "java/lang/Integer", "intValue"),
    (PrimitiveType::Long, "java/lang/Long", "longValue"),
    (PrimitiveType::Float, "java/lang/Float", "floatValue"),
    (PrimitiveType::Double, "java/lang/Double", "doubleValue"),
];

impl PrimitiveType {
    pub fn from_descriptor_char(value: u8) -> Option<Self> {
        let primitive = match value {
            b'Z' => PrimitiveType::Boolean,
            b'B' => PrimitiveType::Byte,
            b'C' => PrimitiveType::Char,
            b'S' => PrimitiveType::Short,
            b'I' => PrimitiveType::Int,
            b'J' => PrimitiveType::Long,
            b'F' => PrimitiveType::Float,
            b'D' => PrimitiveType::Double,
            b'V' => PrimitiveType::Void,
            _ => return None,
        };
        Some(primitive)
    }

    pub fn descriptor_char(self) -> char {
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

    pub fn keyword(self) -> &'static str {
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

    /// Long and double occupy two stack slots and two local slots.
    pub fn is_wide(self) -> bool {
        matches!(self, PrimitiveType::Long | PrimitiveType::Double)
    }

    pub fn is_floating(self) -> bool {
        matches!(self, PrimitiveType::Float | PrimitiveType::Double)
    }

    pub fn is_integral(self) -> bool {
        matches!(
            self,
            PrimitiveType::Byte
                | PrimitiveType::Char
                | PrimitiveType::Short
                | PrimitiveType::Int
                | PrimitiveType::Long
        )
    }

    pub fn box_class(self) -> Option<&'static str> {
        BOXES
            .iter()
            .find(|(primitive, _, _)| *primitive == self)
            .map(|(_, class, _)| *class)
    }

    pub fn unbox_method(self) -> Option<&'static str> {
        BOXES
            .iter()
            .find(|(primitive, _, _)| *primitive == self)
            .map(|(_, _, method)| *method)
    }

    pub fn from_box_class(name: &str) -> Option<Self> {
        BOXES
            .iter()
            .find(|(_, class, _)| *class == name)
            .map(|(primitive, _, _)| *primitive)
    }

    /// Identity or widening primitive conversion.
    pub fn widens_to(self, target: PrimitiveType) -> bool {
        use PrimitiveType::*;
        if self == target {
            return true;
        }
        match self {
            Byte => matches!(target, Short | Int | Long | Float | Double),
            Short | Char => matches!(target, Int | Long | Float | Double),
            Int => matches!(target, Long | Float | Double),
            Long => matches!(target, Float | Double),
            Float => matches!(target, Double),
            Boolean | Double | Void => false,
        }
    }

    /// Result type of binary numeric promotion.
    pub fn promote(self, other: PrimitiveType) -> PrimitiveType {
        use PrimitiveType::*;
        if self == Double || other == Double {
            Double
        } else if self == Float || other == Float {
            Float
        } else if self == Long || other == Long {
            Long
        } else if self == Boolean && other == Boolean {
            Boolean
        } else {
            Int
        }
    }
}

/// Class or interface type with optional type arguments.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize)]
pub struct ObjectType {
    /// Internal name, e.g. `java/util/List`.
    pub name: String,
    pub args: Vec<Type>,
}

impl ObjectType {
    pub fn new(name: impl Into<String>) -> Self {
        ObjectType {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(name: impl Into<String>, args: Vec<Type>) -> Self {
        ObjectType {
            name: name.into(),
            args,
        }
    }

    pub fn is_raw(&self) -> bool {
        self.args.is_empty()
    }

    /// Name with package separators replaced by dots.
    pub fn dotted_name(&self) -> String {
        self.name.replace('/', ".")
    }

    /// Unqualified class name without package.
    pub fn simple_name(&self) -> &str {
        let tail = self.name.rsplit('/').next().unwrap_or(&self.name);
        tail.rsplit('$').next().unwrap_or(tail)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize)]
pub enum Wildcard {
    Unbounded,
    Extends(Box<Type>),
    Super(Box<Type>),
}

/// Structured type value; equality is structural.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize)]
pub enum Type {
    Primitive(PrimitiveType),
    Object(ObjectType),
    Array(Box<Type>),
    Generic { name: String, index: usize },
    Wildcard(Wildcard),
    /// Type of the `null` literal.
    Null,
}

pub const OBJECT: &str = "java/lang/Object";
pub const STRING: &str = "java/lang/String";

impl Type {
    pub fn object(name: impl Into<String>) -> Type {
        Type::Object(ObjectType::new(name))
    }

    pub fn generic_object(name: impl Into<String>, args: Vec<Type>) -> Type {
        Type::Object(ObjectType::with_args(name, args))
    }

    pub fn array(element: Type) -> Type {
        Type::Array(Box::new(element))
    }

    pub fn primitive(primitive: PrimitiveType) -> Type {
        Type::Primitive(primitive)
    }

    pub fn int() -> Type {
        Type::Primitive(PrimitiveType::Int)
    }

    pub fn long() -> Type {
        Type::Primitive(PrimitiveType::Long)
    }

    pub fn boolean() -> Type {
        Type::Primitive(PrimitiveType::Boolean)
    }

    pub fn void() -> Type {
        Type::Primitive(PrimitiveType::Void)
    }

    pub fn object_root() -> Type {
        Type::object(OBJECT)
    }

    pub fn string() -> Type {
        Type::object(STRING)
    }

    pub fn generic(name: impl Into<String>, index: usize) -> Type {
        Type::Generic {
            name: name.into(),
            index,
        }
    }

    /// Type named by a `CONSTANT_Class` entry: an internal name or an array descriptor.
    pub fn from_class_ref(value: &str) -> Type {
        if value.starts_with('[') {
            Type::from_descriptor(value).unwrap_or_else(|_| Type::object(value))
        } else {
            Type::object(value)
        }
    }

    pub fn from_descriptor(descriptor: &str) -> Result<Type, SignatureError> {
        let mut parser = SignatureParser::new(descriptor, &[]);
        let ty = parser.java_type()?;
        parser.expect_end()?;
        Ok(ty)
    }

    pub fn as_primitive(&self) -> Option<PrimitiveType> {
        match self {
            Type::Primitive(primitive) => Some(*primitive),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectType> {
        match self {
            Type::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn internal_name(&self) -> Option<&str> {
        self.as_object().map(|object| object.name.as_str())
    }

    pub fn is_primitive(&self, primitive: PrimitiveType) -> bool {
        self.as_primitive() == Some(primitive)
    }

    pub fn is_boolean(&self) -> bool {
        self.is_primitive(PrimitiveType::Boolean)
    }

    pub fn is_void(&self) -> bool {
        self.is_primitive(PrimitiveType::Void)
    }

    pub fn is_reference(&self) -> bool {
        !matches!(self, Type::Primitive(_))
    }

    pub fn is_wide(&self) -> bool {
        self.as_primitive().is_some_and(PrimitiveType::is_wide)
    }

    pub fn is_floating(&self) -> bool {
        self.as_primitive().is_some_and(PrimitiveType::is_floating)
    }

    pub fn is_string(&self) -> bool {
        self.internal_name() == Some(STRING)
    }

    pub fn is_object_root(&self) -> bool {
        matches!(self, Type::Object(object) if object.name == OBJECT)
    }

    pub fn element_type(&self) -> Option<&Type> {
        match self {
            Type::Array(element) => Some(element),
            _ => None,
        }
    }

    /// Stack slots occupied by a value of this type.
    pub fn slot_size(&self) -> usize {
        match self {
            Type::Primitive(PrimitiveType::Void) => 0,
            ty if ty.is_wide() => 2,
            _ => 1,
        }
    }

    pub fn contains_generics(&self) -> bool {
        match self {
            Type::Generic { .. } => true,
            Type::Object(object) => object.args.iter().any(Type::contains_generics),
            Type::Array(element) => element.contains_generics(),
            Type::Wildcard(Wildcard::Extends(bound) | Wildcard::Super(bound)) => {
                bound.contains_generics()
            }
            Type::Wildcard(Wildcard::Unbounded) | Type::Primitive(_) | Type::Null => false,
        }
    }

    /// Erased form: type arguments dropped and type variables replaced by `Object`.
    pub fn erasure(&self) -> Type {
        match self {
            Type::Object(object) => Type::object(object.name.clone()),
            Type::Array(element) => Type::array(element.erasure()),
            Type::Generic { .. } | Type::Wildcard(Wildcard::Unbounded) => Type::object_root(),
            Type::Wildcard(Wildcard::Extends(bound)) => bound.erasure(),
            Type::Wildcard(Wildcard::Super(_)) => Type::object_root(),
            Type::Primitive(_) | Type::Null => self.clone(),
        }
    }

    /// Substitutes bound type variables, producing a new tree.
    pub fn bind(&self, bindings: &BindingMap) -> Type {
        match self {
            Type::Generic { name, .. } => bindings
                .get(name)
                .cloned()
                .unwrap_or_else(|| self.clone()),
            Type::Object(object) => Type::Object(ObjectType {
                name: object.name.clone(),
                args: object.args.iter().map(|arg| arg.bind(bindings)).collect(),
            }),
            Type::Array(element) => Type::array(element.bind(bindings)),
            Type::Wildcard(Wildcard::Extends(bound)) => {
                Type::Wildcard(Wildcard::Extends(Box::new(bound.bind(bindings))))
            }
            Type::Wildcard(Wildcard::Super(bound)) => {
                Type::Wildcard(Wildcard::Super(Box::new(bound.bind(bindings))))
            }
            Type::Wildcard(Wildcard::Unbounded) | Type::Primitive(_) | Type::Null => {
                self.clone()
            }
        }
    }

    /// Boxed counterpart of a primitive; other types are returned unchanged.
    pub fn boxed(&self) -> Type {
        match self.as_primitive().and_then(PrimitiveType::box_class) {
            Some(class) => Type::object(class),
            None => self.clone(),
        }
    }

    /// Primitive counterpart of a wrapper class.
    pub fn unboxed(&self) -> Option<PrimitiveType> {
        self.internal_name().and_then(PrimitiveType::from_box_class)
    }

    pub fn descriptor(&self) -> String {
        match self {
            Type::Primitive(primitive) => primitive.descriptor_char().to_string(),
            Type::Object(object) => format!("L{};", object.name),
            Type::Array(element) => format!("[{}", element.descriptor()),
            Type::Generic { .. } | Type::Wildcard(_) | Type::Null => {
                self.erasure().descriptor()
            }
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Primitive(primitive) => f.write_str(primitive.keyword()),
            Type::Object(object) => {
                f.write_str(&object.dotted_name())?;
                if !object.args.is_empty() {
                    f.write_str("<")?;
                    for (index, arg) in object.args.iter().enumerate() {
                        if index > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{arg}")?;
                    }
                    f.write_str(">")?;
                }
                Ok(())
            }
            Type::Array(element) => write!(f, "{element}[]"),
            Type::Generic { name, .. } => f.write_str(name),
            Type::Wildcard(Wildcard::Unbounded) => f.write_str("?"),
            Type::Wildcard(Wildcard::Extends(bound)) => write!(f, "? extends {bound}"),
            Type::Wildcard(Wildcard::Super(bound)) => write!(f, "? super {bound}"),
            Type::Null => f.write_str("null"),
        }
    }
}

/// Generic parameter name to type argument, scoped to one resolution call.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BindingMap {
    bindings: BTreeMap<String, Type>,
}

impl BindingMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Type> {
        self.bindings.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, ty: Type) -> Option<Type> {
        self.bindings.insert(name.into(), ty)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Type)> {
        self.bindings.iter()
    }
}

/// Formal type parameter with its bounds.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct TypeParameter {
    pub name: String,
    pub bounds: Vec<Type>,
}

/// Parsed method descriptor or generic method signature.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct MethodSignature {
    pub type_params: Vec<TypeParameter>,
    pub params: Vec<Type>,
    pub ret: Type,
    pub throws: Vec<Type>,
}

/// Parsed generic class signature.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ClassSignature {
    pub type_params: Vec<TypeParameter>,
    pub super_class: Type,
    pub interfaces: Vec<Type>,
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("invalid signature {signature:?} at {position}: {message}")]
pub struct SignatureError {
    pub signature: String,
    pub position: usize,
    pub message: String,
}

pub fn parse_method_descriptor(descriptor: &str) -> Result<MethodSignature, SignatureError> {
    parse_method_signature(descriptor, &[])
}

/// Parses a method signature; `outer` names the enclosing class type parameters.
pub fn parse_method_signature(
    signature: &str,
    outer: &[String],
) -> Result<MethodSignature, SignatureError> {
    let mut parser = SignatureParser::new(signature, outer);
    let type_params = parser.type_parameters()?;
    parser.expect(b'(')?;
    let mut params = Vec::new();
    while parser.peek() != Some(b')') {
        params.push(parser.java_type()?);
    }
    parser.expect(b')')?;
    let ret = parser.java_type()?;
    let mut throws = Vec::new();
    while parser.peek() == Some(b'^') {
        parser.advance();
        throws.push(parser.java_type()?);
    }
    parser.expect_end()?;
    Ok(MethodSignature {
        type_params,
        params,
        ret,
        throws,
    })
}

pub fn parse_class_signature(signature: &str) -> Result<ClassSignature, SignatureError> {
    let mut parser = SignatureParser::new(signature, &[]);
    let type_params = parser.type_parameters()?;
    let super_class = parser.java_type()?;
    let mut interfaces = Vec::new();
    while parser.peek().is_some() {
        interfaces.push(parser.java_type()?);
    }
    Ok(ClassSignature {
        type_params,
        super_class,
        interfaces,
    })
}

pub fn parse_field_signature(signature: &str, outer: &[String]) -> Result<Type, SignatureError> {
    let mut parser = SignatureParser::new(signature, outer);
    let ty = parser.java_type()?;
    parser.expect_end()?;
    Ok(ty)
}

struct SignatureParser<'a> {
    source: &'a str,
    bytes: &'a [u8],
    position: usize,
    scope: Vec<String>,
}

impl<'a> SignatureParser<'a> {
    fn new(source: &'a str, outer: &[String]) -> Self {
        SignatureParser {
            source,
            bytes: source.as_bytes(),
            position: 0,
            scope: outer.to_vec(),
        }
    }

    fn error(&self, message: impl Into<String>) -> SignatureError {
        SignatureError {
            signature: self.source.to_string(),
            position: self.position,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.position).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let value = self.peek()?;
        self.position += 1;
        Some(value)
    }

    fn expect(&mut self, expected: u8) -> Result<(), SignatureError> {
        match self.advance() {
            Some(value) if value == expected => Ok(()),
            Some(value) => Err(self.error(format!(
                "expected '{}' but found '{}'",
                expected as char, value as char
            ))),
            None => Err(self.error(format!("expected '{}'", expected as char))),
        }
    }

    fn expect_end(&self) -> Result<(), SignatureError> {
        if self.position == self.bytes.len() {
            Ok(())
        } else {
            Err(self.error("trailing characters"))
        }
    }

    fn identifier(&mut self, stops: &[u8]) -> Result<&'a str, SignatureError> {
        let start = self.position;
        while let Some(value) = self.peek() {
            if stops.contains(&value) {
                break;
            }
            self.position += 1;
        }
        if start == self.position {
            return Err(self.error("empty identifier"));
        }
        Ok(&self.source[start..self.position])
    }

    fn type_parameters(&mut self) -> Result<Vec<TypeParameter>, SignatureError> {
        if self.peek() != Some(b'<') {
            return Ok(Vec::new());
        }
        self.advance();
        // Names are registered before bounds so recursive bounds resolve.
        let names_start = self.position;
        let mut declared = Vec::new();
        while self.peek() != Some(b'>') {
            let name = self.identifier(b":")?.to_string();
            declared.push(name);
            self.skip_bounds()?;
        }
        let mut scope = declared.clone();
        scope.extend(self.scope.iter().cloned());
        self.scope = scope;
        self.position = names_start;

        let mut params = Vec::new();
        while self.peek() != Some(b'>') {
            let name = self.identifier(b":")?.to_string();
            let mut bounds = Vec::new();
            while self.peek() == Some(b':') {
                self.advance();
                if matches!(self.peek(), Some(b'L' | b'T' | b'[')) {
                    bounds.push(self.java_type()?);
                }
            }
            params.push(TypeParameter { name, bounds });
        }
        self.expect(b'>')?;
        Ok(params)
    }

    fn skip_bounds(&mut self) -> Result<(), SignatureError> {
        while self.peek() == Some(b':') {
            self.advance();
            if matches!(self.peek(), Some(b'L' | b'T' | b'[')) {
                self.java_type()?;
            }
        }
        Ok(())
    }

    fn java_type(&mut self) -> Result<Type, SignatureError> {
        let Some(tag) = self.advance() else {
            return Err(self.error("unexpected end of signature"));
        };
        match tag {
            b'L' => self.class_type(),
            b'T' => {
                let name = self.identifier(b";")?.to_string();
                self.expect(b';')?;
                let index = self
                    .scope
                    .iter()
                    .position(|candidate| *candidate == name)
                    .unwrap_or(0);
                Ok(Type::Generic { name, index })
            }
            b'[' => Ok(Type::array(self.java_type()?)),
            other => PrimitiveType::from_descriptor_char(other)
                .map(Type::Primitive)
                .ok_or_else(|| self.error(format!("unknown type tag '{}'", other as char))),
        }
    }

    fn class_type(&mut self) -> Result<Type, SignatureError> {
        let mut name = self.identifier(b"<;.")?.to_string();
        let mut args = self.type_arguments()?;
        while self.peek() == Some(b'.') {
            self.advance();
            let inner = self.identifier(b"<;.")?;
            name.push('$');
            name.push_str(inner);
            args = self.type_arguments()?;
        }
        self.expect(b';')?;
        Ok(Type::Object(ObjectType { name, args }))
    }

    fn type_arguments(&mut self) -> Result<Vec<Type>, SignatureError> {
        if self.peek() != Some(b'<') {
            return Ok(Vec::new());
        }
        self.advance();
        let mut args = Vec::new();
        while self.peek() != Some(b'>') {
            let arg = match self.peek() {
                Some(b'*') => {
                    self.advance();
                    Type::Wildcard(Wildcard::Unbounded)
                }
                Some(b'+') => {
                    self.advance();
                    Type::Wildcard(Wildcard::Extends(Box::new(self.java_type()?)))
                }
                Some(b'-') => {
                    self.advance();
                    Type::Wildcard(Wildcard::Super(Box::new(self.java_type()?)))
                }
                Some(_) => self.java_type()?,
                None => return Err(self.error("unterminated type arguments")),
            };
            args.push(arg);
        }
        self.expect(b'>')?;
        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_descriptor_types() {
        assert_eq!(Type::from_descriptor("I").expect("int"), Type::int());
        assert_eq!(
            Type::from_descriptor("[[Ljava/lang/String;").expect("array"),
            Type::array(Type::array(Type::string()))
        );
        assert!(Type::from_descriptor("Ljava/lang/String").is_err());
        assert!(Type::from_descriptor("II").is_err());
    }

    #[test]
    fn parses_method_descriptor() {
        let signature = parse_method_descriptor("(IJ[Ljava/lang/Object;)V").expect("descriptor");

        assert_eq!(
            signature.params,
            vec![
                Type::int(),
                Type::long(),
                Type::array(Type::object_root())
            ]
        );
        assert!(signature.ret.is_void());
        assert!(signature.type_params.is_empty());
    }

    #[test]
    fn parses_generic_method_signature_with_bounds() {
        let signature = parse_method_signature(
            "<T::Ljava/lang/Comparable<-TT;>;>(Ljava/util/List<+TT;>;TE;)TT;^Ljava/io/IOException;",
            &["E".to_string()],
        )
        .expect("signature");

        assert_eq!(signature.type_params.len(), 1);
        assert_eq!(signature.type_params[0].name, "T");
        assert_eq!(
            signature.type_params[0].bounds,
            vec![Type::generic_object(
                "java/lang/Comparable",
                vec![Type::Wildcard(Wildcard::Super(Box::new(Type::generic("T", 0))))]
            )]
        );
        assert_eq!(
            signature.params[0],
            Type::generic_object(
                "java/util/List",
                vec![Type::Wildcard(Wildcard::Extends(Box::new(Type::generic(
                    "T", 0
                ))))]
            )
        );
        assert_eq!(signature.params[1], Type::generic("E", 1));
        assert_eq!(signature.ret, Type::generic("T", 0));
        assert_eq!(signature.throws, vec![Type::object("java/io/IOException")]);
    }

    #[test]
    fn parses_class_signature_with_inner_class() {
        let signature = parse_class_signature(
            "<K:Ljava/lang/Object;V:Ljava/lang/Object;>Ljava/util/AbstractMap<TK;TV;>;Ljava/util/Map<TK;TV;>;",
        )
        .expect("class signature");

        assert_eq!(signature.type_params.len(), 2);
        assert_eq!(
            signature.super_class.to_string(),
            "java.util.AbstractMap<K, V>"
        );
        assert_eq!(signature.interfaces.len(), 1);

        let inner = parse_field_signature("Lpkg/Outer<TK;>.Inner<Ljava/lang/String;>;", &[])
            .expect("inner");
        assert_eq!(inner.to_string(), "pkg.Outer$Inner<java.lang.String>");
    }

    #[test]
    fn binding_substitutes_nested_variables() {
        let mut bindings = BindingMap::new();
        bindings.insert("E", Type::object("java/lang/Number"));
        let list = Type::generic_object(
            "java/util/List",
            vec![Type::Wildcard(Wildcard::Extends(Box::new(Type::generic(
                "E", 0,
            ))))],
        );

        assert_eq!(
            list.bind(&bindings).to_string(),
            "java.util.List<? extends java.lang.Number>"
        );
        assert_eq!(list.erasure(), Type::object("java/util/List"));
        assert_eq!(Type::generic("F", 1).bind(&bindings), Type::generic("F", 1));
    }

    #[test]
    fn primitive_widening_follows_language_rules() {
        assert!(PrimitiveType::Byte.widens_to(PrimitiveType::Int));
        assert!(PrimitiveType::Char.widens_to(PrimitiveType::Long));
        assert!(!PrimitiveType::Char.widens_to(PrimitiveType::Short));
        assert!(!PrimitiveType::Long.widens_to(PrimitiveType::Int));
        assert!(!PrimitiveType::Boolean.widens_to(PrimitiveType::Int));
        assert_eq!(
            PrimitiveType::Int.promote(PrimitiveType::Float),
            PrimitiveType::Float
        );
    }
}
