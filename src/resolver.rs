use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, trace};

use crate::classfile::parse_class;
use crate::error::ReconstructError;
use crate::ir::{AccessFlags, ArrayKind, Constant, Op, RawClass};
pub use crate::types::BindingMap;
use crate::types::{
    parse_class_signature, parse_field_signature, parse_method_descriptor, parse_method_signature,
    MethodSignature, ObjectType, Type, TypeParameter, Wildcard, OBJECT,
};

/// Supplies class bytes for types referenced by the classes being reconstructed.
pub trait ClassLoader: Send + Sync {
    fn can_load(&self, internal_name: &str) -> bool;
    fn load(&self, internal_name: &str) -> anyhow::Result<Vec<u8>>;
}

/// Answers structural questions about a class by internal name.
pub trait ClassInfoSource: Send + Sync {
    fn class_info(&self, internal_name: &str) -> Option<ClassInfo>;
}

/// Hierarchy and member summary of one class.
#[derive(Clone, Debug, Default)]
pub struct ClassInfo {
    pub name: String,
    pub super_class: Option<Type>,
    pub interfaces: Vec<Type>,
    pub type_params: Vec<TypeParameter>,
    pub access: AccessFlags,
    /// Enclosing class and simple name when this is a member class.
    pub outer: Option<String>,
    pub simple_name: Option<String>,
    pub methods: Vec<MethodInfo>,
    /// Fields in declaration order.
    pub fields: Vec<FieldInfo>,
    /// `$SwitchMap$…` arrays initialized in `<clinit>`: field name to (constant, case) pairs.
    pub switch_maps: HashMap<String, Vec<(String, i32)>>,
}

#[derive(Clone, Debug)]
pub struct MethodInfo {
    pub name: String,
    pub descriptor: String,
    pub signature: Option<String>,
    pub access: AccessFlags,
}

#[derive(Clone, Debug)]
pub struct FieldInfo {
    pub name: String,
    pub descriptor: String,
    pub signature: Option<String>,
    pub access: AccessFlags,
}

impl ClassInfo {
    pub fn from_raw(class: &RawClass) -> ClassInfo {
        let signature = class.signature.as_deref().and_then(|signature| {
            parse_class_signature(signature)
                .map_err(|err| trace!(class = %class.name, error = %err, "ignoring class signature"))
                .ok()
        });
        let (super_class, interfaces, type_params) = match signature {
            Some(signature) => {
                let super_class = class.super_name.as_ref().map(|_| signature.super_class);
                (super_class, signature.interfaces, signature.type_params)
            }
            None => (
                class.super_name.as_deref().map(Type::object),
                class.interfaces.iter().map(Type::object).collect(),
                Vec::new(),
            ),
        };
        let member = class
            .inner_classes
            .iter()
            .find(|inner| inner.inner == class.name && inner.outer.is_some());

        ClassInfo {
            name: class.name.clone(),
            super_class,
            interfaces,
            type_params,
            access: class.access,
            outer: member.and_then(|inner| inner.outer.clone()),
            simple_name: member.and_then(|inner| inner.simple_name.clone()),
            methods: class
                .methods
                .iter()
                .map(|method| MethodInfo {
                    name: method.name.clone(),
                    descriptor: method.descriptor.clone(),
                    signature: method.signature.clone(),
                    access: method.access,
                })
                .collect(),
            fields: class
                .fields
                .iter()
                .map(|field| FieldInfo {
                    name: field.name.clone(),
                    descriptor: field.descriptor.clone(),
                    signature: field.signature.clone(),
                    access: field.access,
                })
                .collect(),
            switch_maps: switch_maps(class),
        }
    }

    pub fn is_interface(&self) -> bool {
        self.access.is_interface()
    }

    pub fn type_param_names(&self) -> Vec<String> {
        self.type_params
            .iter()
            .map(|param| param.name.clone())
            .collect()
    }
}

fn switch_maps(class: &RawClass) -> HashMap<String, Vec<(String, i32)>> {
    let mut maps: HashMap<String, Vec<(String, i32)>> = HashMap::new();
    let Some(initializer) = class.method("<clinit>", "()V") else {
        return maps;
    };
    let ops: Vec<&Op> = initializer
        .instructions
        .iter()
        .map(|instruction| &instruction.op)
        .collect();
    for window in ops.windows(5) {
        if let [
            Op::GetStatic(map),
            Op::GetStatic(constant),
            Op::Invoke { method, .. },
            Op::Const(Constant::Int(case)),
            Op::ArrayStore(ArrayKind::Int),
        ] = window
            && map.name.starts_with("$SwitchMap$")
            && method.name == "ordinal"
            && method.owner == constant.owner
        {
            maps.entry(map.name.clone())
                .or_default()
                .push((constant.name.clone(), *case));
        }
    }
    maps
}

/// Loader-backed source: parses class bytes on demand.
pub struct LoaderSource<L> {
    loader: L,
}

impl<L: ClassLoader> LoaderSource<L> {
    pub fn new(loader: L) -> Self {
        LoaderSource { loader }
    }
}

impl<L: ClassLoader> ClassInfoSource for LoaderSource<L> {
    fn class_info(&self, internal_name: &str) -> Option<ClassInfo> {
        if !self.loader.can_load(internal_name) {
            return None;
        }
        let class = self
            .loader
            .load(internal_name)
            .and_then(|bytes| parse_class(&bytes));
        match class {
            Ok(class) => Some(ClassInfo::from_raw(&class)),
            Err(err) => {
                debug!(class = internal_name, error = %err, "failed to load class");
                None
            }
        }
    }
}

/// In-memory source, used for the classes under reconstruction.
#[derive(Default)]
pub struct MapSource {
    classes: HashMap<String, ClassInfo>,
}

impl MapSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_classes<'a>(classes: impl IntoIterator<Item = &'a RawClass>) -> Self {
        let mut source = MapSource::new();
        for class in classes {
            source.insert(ClassInfo::from_raw(class));
        }
        source
    }

    pub fn insert(&mut self, info: ClassInfo) {
        self.classes.insert(info.name.clone(), info);
    }
}

impl ClassInfoSource for MapSource {
    fn class_info(&self, internal_name: &str) -> Option<ClassInfo> {
        self.classes.get(internal_name).cloned()
    }
}

/// Queries each source in order and returns the first answer.
pub struct ChainedSource {
    sources: Vec<Box<dyn ClassInfoSource>>,
}

impl ChainedSource {
    pub fn new(sources: Vec<Box<dyn ClassInfoSource>>) -> Self {
        ChainedSource { sources }
    }
}

impl ClassInfoSource for ChainedSource {
    fn class_info(&self, internal_name: &str) -> Option<ClassInfo> {
        self.sources
            .iter()
            .find_map(|source| source.class_info(internal_name))
    }
}

enum SupertypeSearch {
    Found(ObjectType),
    Missing { complete: bool },
}

/// Type resolution and assignability over a class-info source, with a concurrent cache.
pub struct TypeResolver {
    source: Box<dyn ClassInfoSource>,
    cache: DashMap<String, Option<Arc<ClassInfo>>>,
}

impl TypeResolver {
    pub fn new(source: impl ClassInfoSource + 'static) -> Self {
        TypeResolver {
            source: Box::new(source),
            cache: DashMap::new(),
        }
    }

    /// Resolver that knows only `java/lang/Object`.
    pub fn empty() -> Self {
        TypeResolver::new(MapSource::new())
    }

    pub fn class_info(&self, internal_name: &str) -> Option<Arc<ClassInfo>> {
        if let Some(cached) = self.cache.get(internal_name) {
            return cached.value().clone();
        }
        let info = self
            .source
            .class_info(internal_name)
            .or_else(|| (internal_name == OBJECT).then(object_info))
            .map(Arc::new);
        if info.is_none() {
            debug!(class = internal_name, "unresolved class");
        }
        self.cache
            .entry(internal_name.to_string())
            .or_insert(info)
            .value()
            .clone()
    }

    /// Type for an internal name or array descriptor; never fails.
    pub fn resolve(&self, internal_name: &str) -> Type {
        let ty = Type::from_class_ref(internal_name);
        if let Type::Object(object) = &ty {
            // Warm the cache so later hierarchy queries do not reload.
            let _ = self.class_info(&object.name);
        }
        ty
    }

    /// Source-level name: package dots, with member classes joined to their outer class.
    pub fn qualified_name(&self, internal_name: &str) -> String {
        if let Some(info) = self.class_info(internal_name)
            && let (Some(outer), Some(simple)) = (&info.outer, &info.simple_name)
        {
            return format!("{}.{}", self.qualified_name(outer), simple);
        }
        internal_name.replace('/', ".")
    }

    /// Direct supertypes with the receiver's type arguments substituted.
    pub fn supertypes(&self, ty: &ObjectType) -> Option<Vec<Type>> {
        let info = self.class_info(&ty.name)?;
        let mut supertypes: Vec<Type> = info.super_class.iter().cloned().collect();
        supertypes.extend(info.interfaces.iter().cloned());
        if supertypes.is_empty() && ty.name != OBJECT {
            supertypes.push(Type::object_root());
        }
        let bindings = type_arg_bindings(&info.type_params, &ty.args);
        Some(
            supertypes
                .into_iter()
                .map(|supertype| match &bindings {
                    Some(bindings) => supertype.bind(bindings),
                    None if !info.type_params.is_empty() => supertype.erasure(),
                    None => supertype,
                })
                .collect(),
        )
    }

    fn find_supertype(&self, source: &ObjectType, target: &str) -> SupertypeSearch {
        let mut queue = VecDeque::from([source.clone()]);
        let mut seen = HashSet::new();
        let mut complete = true;
        while let Some(current) = queue.pop_front() {
            if current.name == target {
                return SupertypeSearch::Found(current);
            }
            if !seen.insert(current.name.clone()) {
                continue;
            }
            match self.supertypes(&current) {
                Some(supertypes) => queue.extend(supertypes.into_iter().filter_map(|supertype| {
                    match supertype {
                        Type::Object(object) => Some(object),
                        _ => None,
                    }
                })),
                None => complete = false,
            }
        }
        SupertypeSearch::Missing { complete }
    }

    /// Whether a value of type `source` can be assigned to a variable of type `target`.
    pub fn is_assignable(&self, target: &Type, source: &Type) -> bool {
        if target == source {
            return true;
        }
        match (target, source) {
            (_, Type::Null) => target.is_reference(),
            (Type::Null, _) => false,
            (Type::Primitive(target), Type::Primitive(source)) => source.widens_to(*target),
            (Type::Primitive(_), _) | (_, Type::Primitive(_)) => false,
            (Type::Generic { .. }, _) | (_, Type::Generic { .. }) => true,
            (Type::Wildcard(_), _) => self.contains(target, source),
            (_, Type::Wildcard(Wildcard::Extends(bound))) => self.is_assignable(target, bound),
            (_, Type::Wildcard(_)) => target.is_object_root(),
            (Type::Object(target), Type::Array(_)) => matches!(
                target.name.as_str(),
                OBJECT | "java/lang/Cloneable" | "java/io/Serializable"
            ),
            (Type::Array(target), Type::Array(source)) => {
                match (target.as_primitive(), source.as_primitive()) {
                    (Some(target), Some(source)) => target == source,
                    (None, None) => self.is_assignable(target, source),
                    _ => false,
                }
            }
            (Type::Array(_), Type::Object(_)) => false,
            (Type::Object(target), Type::Object(source)) => self.object_assignable(target, source),
        }
    }

    fn object_assignable(&self, target: &ObjectType, source: &ObjectType) -> bool {
        if target.name == OBJECT {
            return true;
        }
        match self.find_supertype(source, &target.name) {
            SupertypeSearch::Found(found) => {
                if target.is_raw() || found.is_raw() || target.args.len() != found.args.len() {
                    return true;
                }
                target
                    .args
                    .iter()
                    .zip(&found.args)
                    .all(|(target_arg, source_arg)| self.contains(target_arg, source_arg))
            }
            SupertypeSearch::Missing { complete } => {
                if !complete {
                    trace!(target = %target.name, source = %source.name, "optimistic assignability");
                }
                !complete
            }
        }
    }

    /// Type-argument containment: whether `source_arg` fits where `target_arg` is expected.
    fn contains(&self, target_arg: &Type, source_arg: &Type) -> bool {
        match target_arg {
            Type::Wildcard(Wildcard::Unbounded) | Type::Generic { .. } => true,
            Type::Wildcard(Wildcard::Extends(bound)) => match source_arg {
                Type::Wildcard(Wildcard::Extends(source)) => self.is_assignable(bound, source),
                Type::Wildcard(_) => bound.is_object_root(),
                source => self.is_assignable(bound, source),
            },
            Type::Wildcard(Wildcard::Super(bound)) => match source_arg {
                Type::Wildcard(Wildcard::Super(source)) => self.is_assignable(source, bound),
                Type::Wildcard(_) => false,
                source => self.is_assignable(source, bound),
            },
            target => matches!(source_arg, Type::Generic { .. }) || target == source_arg,
        }
    }

    /// Binds type variables of `formals` against concrete `actuals` in lock-step.
    pub fn unify(&self, formals: &[Type], actuals: &[Type]) -> Result<BindingMap, ReconstructError> {
        let mut bindings = BindingMap::new();
        for (formal, actual) in formals.iter().zip(actuals) {
            self.unify_into(formal, actual, &mut bindings)?;
        }
        Ok(bindings)
    }

    fn unify_into(
        &self,
        formal: &Type,
        actual: &Type,
        bindings: &mut BindingMap,
    ) -> Result<(), ReconstructError> {
        match formal {
            Type::Generic { name, .. } => {
                if matches!(actual, Type::Null) {
                    return Ok(());
                }
                let actual = actual.boxed();
                match bindings.get(name) {
                    None => {
                        bindings.insert(name.clone(), actual);
                    }
                    Some(existing) if *existing == actual => {}
                    Some(existing) => {
                        if self.is_assignable(existing, &actual) {
                            // The existing binding is already the more general one.
                        } else if self.is_assignable(&actual, existing) {
                            bindings.insert(name.clone(), actual);
                        } else {
                            return Err(ReconstructError::UnificationConflict {
                                name: name.clone(),
                                first: existing.to_string(),
                                second: actual.to_string(),
                            });
                        }
                    }
                }
            }
            Type::Array(formal_element) => {
                if let Type::Array(actual_element) = actual {
                    self.unify_into(formal_element, actual_element, bindings)?;
                }
            }
            Type::Object(formal_object) if !formal_object.args.is_empty() => {
                if let Type::Object(actual_object) = actual
                    && let SupertypeSearch::Found(found) =
                        self.find_supertype(actual_object, &formal_object.name)
                    && found.args.len() == formal_object.args.len()
                {
                    for (formal_arg, actual_arg) in formal_object.args.iter().zip(&found.args) {
                        self.unify_into(formal_arg, actual_arg, bindings)?;
                    }
                }
            }
            Type::Wildcard(Wildcard::Extends(bound) | Wildcard::Super(bound)) => {
                let actual = match actual {
                    Type::Wildcard(Wildcard::Extends(inner) | Wildcard::Super(inner)) => inner,
                    Type::Wildcard(Wildcard::Unbounded) => return Ok(()),
                    other => other,
                };
                self.unify_into(bound, actual, bindings)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Finds a method by name and descriptor in a class or its supertypes.
    pub fn find_method(
        &self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Option<(Arc<ClassInfo>, MethodInfo)> {
        let mut queue = VecDeque::from([owner.to_string()]);
        let mut seen = HashSet::new();
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            let Some(info) = self.class_info(&current) else {
                continue;
            };
            if let Some(method) = info
                .methods
                .iter()
                .find(|method| method.name == name && method.descriptor == descriptor)
            {
                return Some((info.clone(), method.clone()));
            }
            queue.extend(
                info.super_class
                    .iter()
                    .chain(&info.interfaces)
                    .filter_map(|ty| ty.internal_name().map(str::to_string)),
            );
        }
        None
    }

    /// Generic signature of a method, parsed in the scope of its declaring class.
    pub fn method_signature(
        &self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Option<(String, MethodSignature)> {
        let (declaring, method) = self.find_method(owner, name, descriptor)?;
        let signature = method.signature.as_deref()?;
        match parse_method_signature(signature, &declaring.type_param_names()) {
            Ok(parsed) => Some((declaring.name.clone(), parsed)),
            Err(err) => {
                trace!(owner, name, error = %err, "ignoring method signature");
                None
            }
        }
    }

    /// Bindings of `declaring`'s type parameters as seen through `receiver`.
    pub fn member_bindings(&self, receiver: &ObjectType, declaring: &str) -> BindingMap {
        let Some(info) = self.class_info(declaring) else {
            return BindingMap::new();
        };
        match self.find_supertype(receiver, declaring) {
            SupertypeSearch::Found(found) => {
                type_arg_bindings(&info.type_params, &found.args).unwrap_or_default()
            }
            SupertypeSearch::Missing { .. } => BindingMap::new(),
        }
    }

    /// Whether `owner` (or a supertype) declares more than one `name` method with `arity`
    /// parameters.
    pub fn has_overload(&self, owner: &str, name: &str, arity: usize) -> bool {
        let mut descriptors = HashSet::new();
        let mut queue = VecDeque::from([owner.to_string()]);
        let mut seen = HashSet::new();
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            let Some(info) = self.class_info(&current) else {
                continue;
            };
            for method in info.methods.iter().filter(|method| method.name == name) {
                let matches_arity = parse_method_descriptor(&method.descriptor)
                    .map(|signature| signature.params.len() == arity)
                    .unwrap_or(false);
                if matches_arity {
                    descriptors.insert(method.descriptor.clone());
                }
            }
            queue.extend(
                info.super_class
                    .iter()
                    .chain(&info.interfaces)
                    .filter_map(|ty| ty.internal_name().map(str::to_string)),
            );
        }
        descriptors.len() > 1
    }

    /// Generic type of a field as seen through `receiver`, when the field has a signature.
    pub fn field_type(&self, receiver: &ObjectType, owner: &str, name: &str) -> Option<Type> {
        let info = self.class_info(owner)?;
        let field = info.fields.iter().find(|field| field.name == name)?;
        let signature = field.signature.as_deref()?;
        let ty = parse_field_signature(signature, &info.type_param_names())
            .map_err(|err| trace!(owner, name, error = %err, "ignoring field signature"))
            .ok()?;
        Some(ty.bind(&self.member_bindings(receiver, owner)))
    }

    /// Enum constant names in declaration order.
    pub fn enum_constants(&self, enum_name: &str) -> Vec<String> {
        self.class_info(enum_name)
            .map(|info| {
                info.fields
                    .iter()
                    .filter(|field| field.access.is_enum())
                    .map(|field| field.name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Case numbering of a `$SwitchMap$…` array.
    pub fn switch_map(&self, owner: &str, field: &str) -> Option<Vec<(String, i32)>> {
        self.class_info(owner)
            .and_then(|info| info.switch_maps.get(field).cloned())
    }
}

fn object_info() -> ClassInfo {
    ClassInfo {
        name: OBJECT.to_string(),
        access: AccessFlags(AccessFlags::PUBLIC),
        ..ClassInfo::default()
    }
}

fn type_arg_bindings(params: &[TypeParameter], args: &[Type]) -> Option<BindingMap> {
    if params.is_empty() || params.len() != args.len() {
        return None;
    }
    let mut bindings = BindingMap::new();
    for (param, arg) in params.iter().zip(args) {
        bindings.insert(param.name.clone(), arg.clone());
    }
    Some(bindings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{InnerClass, Instruction, MemberRef, RawField, RawMethod};

    fn info(name: &str, signature: Option<&str>, super_name: Option<&str>, interfaces: &[&str]) -> ClassInfo {
        let class = RawClass {
            name: name.to_string(),
            super_name: super_name.map(str::to_string),
            interfaces: interfaces.iter().map(|name| name.to_string()).collect(),
            signature: signature.map(str::to_string),
            ..RawClass::default()
        };
        ClassInfo::from_raw(&class)
    }

    fn collections() -> TypeResolver {
        let mut source = MapSource::new();
        source.insert(info(
            "java/util/Collection",
            Some("<E:Ljava/lang/Object;>Ljava/lang/Object;"),
            Some(OBJECT),
            &[],
        ));
        source.insert(info(
            "java/util/List",
            Some("<E:Ljava/lang/Object;>Ljava/lang/Object;Ljava/util/Collection<TE;>;"),
            Some(OBJECT),
            &["java/util/Collection"],
        ));
        source.insert(info(
            "java/util/ArrayList",
            Some("<E:Ljava/lang/Object;>Ljava/lang/Object;Ljava/util/List<TE;>;"),
            Some(OBJECT),
            &["java/util/List"],
        ));
        source.insert(info("java/lang/Number", None, Some(OBJECT), &[]));
        source.insert(info("java/lang/Integer", None, Some("java/lang/Number"), &[]));
        source.insert(info("java/lang/String", None, Some(OBJECT), &[]));
        TypeResolver::new(source)
    }

    fn list_of(name: &str, arg: Type) -> Type {
        Type::generic_object(name, vec![arg])
    }

    fn number() -> Type {
        Type::object("java/lang/Number")
    }

    #[test]
    fn identical_parameterized_lists_are_mutually_assignable() {
        let resolver = collections();
        let list = list_of("java/util/List", number());

        assert!(resolver.is_assignable(&list, &list.clone()));
        assert!(resolver.is_assignable(&list.clone(), &list));
    }

    #[test]
    fn array_list_assigns_to_list_but_not_back() {
        let resolver = collections();
        let list = list_of("java/util/List", number());
        let array_list = list_of("java/util/ArrayList", number());

        assert!(resolver.is_assignable(&list, &array_list));
        assert!(!resolver.is_assignable(&array_list, &list));
    }

    #[test]
    fn extends_wildcard_accepts_list_of_number_only_one_way() {
        let resolver = collections();
        let bounded = list_of(
            "java/util/List",
            Type::Wildcard(Wildcard::Extends(Box::new(number()))),
        );
        let list = list_of("java/util/List", number());

        assert!(resolver.is_assignable(&bounded, &list));
        assert!(!resolver.is_assignable(&list, &bounded));
    }

    #[test]
    fn type_arguments_are_invariant_without_wildcards() {
        let resolver = collections();
        let numbers = list_of("java/util/List", number());
        let integers = list_of("java/util/List", Type::object("java/lang/Integer"));
        let extends_number = list_of(
            "java/util/List",
            Type::Wildcard(Wildcard::Extends(Box::new(number()))),
        );
        let super_integer = list_of(
            "java/util/List",
            Type::Wildcard(Wildcard::Super(Box::new(Type::object("java/lang/Integer")))),
        );

        assert!(!resolver.is_assignable(&numbers, &integers));
        assert!(resolver.is_assignable(&extends_number, &integers));
        assert!(resolver.is_assignable(&super_integer, &numbers));
        assert!(!resolver.is_assignable(&super_integer, &list_of("java/util/List", Type::string())));
    }

    #[test]
    fn raw_types_fall_back_to_erasure() {
        let resolver = collections();
        let raw = Type::object("java/util/List");
        let parameterized = list_of("java/util/ArrayList", Type::string());

        assert!(resolver.is_assignable(&raw, &parameterized));
        assert!(resolver.is_assignable(&list_of("java/util/List", Type::string()), &raw));
    }

    #[test]
    fn primitives_widen_and_arrays_follow_java_rules() {
        let resolver = collections();

        assert!(resolver.is_assignable(&Type::long(), &Type::int()));
        assert!(!resolver.is_assignable(&Type::int(), &Type::long()));
        assert!(resolver.is_assignable(&Type::string(), &Type::Null));
        assert!(!resolver.is_assignable(&Type::int(), &Type::Null));
        assert!(resolver.is_assignable(
            &Type::array(number()),
            &Type::array(Type::object("java/lang/Integer"))
        ));
        assert!(!resolver.is_assignable(&Type::array(Type::long()), &Type::array(Type::int())));
        assert!(resolver.is_assignable(&Type::object_root(), &Type::array(Type::int())));
        assert!(resolver.is_assignable(
            &Type::object("java/io/Serializable"),
            &Type::array(Type::string())
        ));
    }

    #[test]
    fn unknown_classes_are_optimistically_assignable() {
        let resolver = collections();

        assert!(resolver.is_assignable(
            &Type::object("java/util/List"),
            &Type::object("com/example/Unknown")
        ));
        assert!(!resolver.is_assignable(&Type::object("java/util/List"), &Type::string()));
    }

    #[test]
    fn resolve_never_fails_and_dots_unknown_names() {
        let resolver = collections();

        let ty = resolver.resolve("com/example/Missing$Inner");

        assert_eq!(ty, Type::object("com/example/Missing$Inner"));
        assert_eq!(
            resolver.qualified_name("com/example/Missing$Inner"),
            "com.example.Missing$Inner"
        );
    }

    #[test]
    fn member_classes_use_dot_separator() {
        let mut class = RawClass {
            name: "com/example/Outer$Inner".to_string(),
            super_name: Some(OBJECT.to_string()),
            ..RawClass::default()
        };
        class.inner_classes.push(InnerClass {
            inner: "com/example/Outer$Inner".to_string(),
            outer: Some("com/example/Outer".to_string()),
            simple_name: Some("Inner".to_string()),
            access: AccessFlags(AccessFlags::STATIC),
        });
        let resolver = TypeResolver::new(MapSource::from_classes([&class]));

        assert_eq!(
            resolver.qualified_name("com/example/Outer$Inner"),
            "com.example.Outer.Inner"
        );
    }

    #[test]
    fn unify_binds_first_occurrence_and_keeps_more_general_type() {
        let resolver = collections();
        let t = Type::generic("T", 0);

        let bindings = resolver
            .unify(
                &[t.clone(), t.clone()],
                &[number(), Type::object("java/lang/Integer")],
            )
            .expect("compatible arguments");

        assert_eq!(bindings.get("T"), Some(&number()));
    }

    #[test]
    fn unify_boxes_primitives_and_walks_supertypes() {
        let resolver = collections();
        let formal = list_of("java/util/Collection", Type::generic("E", 0));

        let bindings = resolver
            .unify(
                &[formal, Type::generic("X", 1)],
                &[list_of("java/util/ArrayList", Type::string()), Type::int()],
            )
            .expect("unify");

        assert_eq!(bindings.get("E"), Some(&Type::string()));
        assert_eq!(bindings.get("X"), Some(&Type::object("java/lang/Integer")));
    }

    #[test]
    fn unify_reports_conflicts() {
        let resolver = collections();
        let t = Type::generic("T", 0);

        let error = resolver
            .unify(&[t.clone(), t], &[Type::string(), number()])
            .expect_err("conflict");

        assert!(matches!(error, ReconstructError::UnificationConflict { ref name, .. } if name == "T"));
        assert!(!error.is_fatal());
    }

    #[test]
    fn binding_maps_are_fresh_per_call() {
        let resolver = collections();
        let t = Type::generic("T", 0);

        let first = resolver.unify(&[t.clone()], &[Type::string()]).expect("first");
        let second = resolver.unify(&[t], &[number()]).expect("second");

        assert_eq!(first.get("T"), Some(&Type::string()));
        assert_eq!(second.get("T"), Some(&number()));
    }

    #[test]
    fn member_bindings_follow_supertype_arguments() {
        let resolver = collections();
        let receiver = ObjectType::with_args("java/util/ArrayList", vec![Type::string()]);

        let bindings = resolver.member_bindings(&receiver, "java/util/Collection");

        assert_eq!(bindings.get("E"), Some(&Type::string()));
    }

    #[test]
    fn detects_overloads_and_switch_maps() {
        let mut owner = RawClass {
            name: "com/example/Printer".to_string(),
            super_name: Some(OBJECT.to_string()),
            ..RawClass::default()
        };
        for descriptor in ["(I)V", "(Ljava/lang/Integer;)V", "()V"] {
            owner.methods.push(RawMethod {
                name: "print".to_string(),
                descriptor: descriptor.to_string(),
                ..RawMethod::default()
            });
        }
        let map_field = MemberRef::new("com/example/Outer$1", "$SwitchMap$com$example$Color", "[I");
        let constant = |name: &str| MemberRef::new("com/example/Color", name, "Lcom/example/Color;");
        let ordinal = MemberRef::new("com/example/Color", "ordinal", "()I");
        let mut ops = Vec::new();
        for (name, case) in [("RED", 1), ("BLUE", 2)] {
            ops.push(Op::GetStatic(map_field.clone()));
            ops.push(Op::GetStatic(constant(name)));
            ops.push(Op::Invoke {
                kind: crate::ir::InvokeKind::Virtual,
                method: ordinal.clone(),
            });
            ops.push(Op::Const(Constant::Int(case)));
            ops.push(Op::ArrayStore(ArrayKind::Int));
        }
        let switch_holder = RawClass {
            name: "com/example/Outer$1".to_string(),
            super_name: Some(OBJECT.to_string()),
            methods: vec![RawMethod {
                name: "<clinit>".to_string(),
                descriptor: "()V".to_string(),
                instructions: ops
                    .into_iter()
                    .enumerate()
                    .map(|(offset, op)| Instruction {
                        offset: offset as u32,
                        op,
                    })
                    .collect(),
                ..RawMethod::default()
            }],
            ..RawClass::default()
        };
        let color = RawClass {
            name: "com/example/Color".to_string(),
            super_name: Some("java/lang/Enum".to_string()),
            fields: ["RED", "GREEN", "BLUE"]
                .iter()
                .map(|name| RawField {
                    name: name.to_string(),
                    descriptor: "Lcom/example/Color;".to_string(),
                    access: AccessFlags(AccessFlags::ENUM | AccessFlags::STATIC),
                    ..RawField::default()
                })
                .collect(),
            ..RawClass::default()
        };
        let resolver = TypeResolver::new(MapSource::from_classes([&owner, &switch_holder, &color]));

        assert!(resolver.has_overload("com/example/Printer", "print", 1));
        assert!(!resolver.has_overload("com/example/Printer", "print", 0));
        assert_eq!(
            resolver.switch_map("com/example/Outer$1", "$SwitchMap$com$example$Color"),
            Some(vec![("RED".to_string(), 1), ("BLUE".to_string(), 2)])
        );
        assert_eq!(resolver.enum_constants("com/example/Color"), vec!["RED", "GREEN", "BLUE"]);
    }
}
