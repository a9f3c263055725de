use std::str::FromStr;

use anyhow::{Context, Result};
use jclassfile::attributes::Attribute;
use jclassfile::class_file;
use jclassfile::constant_pool::ConstantPool;
use jdescriptor::{MethodDescriptor, TypeDescriptor};

use crate::bytecode::{self, PoolResolver};
use crate::ir::{
    AccessFlags, Constant, DynamicCallSite, ExceptionHandler, HandleKind, InnerClass, LineNumber,
    LocalVariable, MemberRef, MethodHandle, RawClass, RawField, RawMethod,
};

/// Parse class file bytes into the reconstruction input model.
pub fn parse_class(data: &[u8]) -> Result<RawClass> {
    let class_file = class_file::parse(data).context("failed to parse class file bytes")?;
    let constant_pool = class_file.constant_pool();
    let name =
        resolve_class_name(constant_pool, class_file.this_class()).context("resolve class name")?;
    let super_name = if class_file.super_class() == 0 {
        None
    } else {
        Some(
            resolve_class_name(constant_pool, class_file.super_class())
                .context("resolve super class name")?,
        )
    };
    let mut interfaces = Vec::new();
    for interface in class_file.interfaces() {
        interfaces
            .push(resolve_class_name(constant_pool, *interface).context("resolve interface name")?);
    }

    let mut signature = None;
    let mut source_file = None;
    let mut inner_classes = Vec::new();
    let mut bootstrap_methods = Vec::new();
    for attribute in class_file.attributes() {
        match attribute {
            Attribute::Signature { signature_index } => {
                signature = Some(resolve_utf8(constant_pool, *signature_index)?);
            }
            Attribute::SourceFile { sourcefile_index } => {
                source_file = Some(resolve_utf8(constant_pool, *sourcefile_index)?);
            }
            Attribute::InnerClasses { classes } => {
                for record in classes {
                    inner_classes.push(InnerClass {
                        inner: resolve_class_name(constant_pool, record.inner_class_info_index())
                            .context("resolve inner class")?,
                        outer: optional_class_name(
                            constant_pool,
                            record.outer_class_info_index(),
                        )?,
                        simple_name: optional_utf8(constant_pool, record.inner_name_index())?,
                        access: AccessFlags(record.inner_class_access_flags().bits()),
                    });
                }
            }
            Attribute::BootstrapMethods { bootstrap_methods: records } => {
                for record in records {
                    bootstrap_methods.push(BootstrapEntry {
                        method_ref: record.bootstrap_method_ref(),
                        arguments: record.bootstrap_arguments().to_vec(),
                    });
                }
            }
            _ => {}
        }
    }

    let pool = ClassPool {
        constant_pool,
        bootstrap_methods,
    };
    let fields = parse_fields(&pool, class_file.fields()).context("parse fields")?;
    let methods = parse_methods(&pool, class_file.methods())
        .with_context(|| format!("parse methods of {name}"))?;

    Ok(RawClass {
        name,
        super_name,
        interfaces,
        access: AccessFlags(class_file.access_flags().bits()),
        signature,
        source_file,
        fields,
        methods,
        inner_classes,
    })
}

struct BootstrapEntry {
    method_ref: u16,
    arguments: Vec<u16>,
}

/// Constant pool view that resolves instruction operands.
struct ClassPool<'a> {
    constant_pool: &'a [ConstantPool],
    bootstrap_methods: Vec<BootstrapEntry>,
}

impl PoolResolver for ClassPool<'_> {
    fn class_name(&self, index: u16) -> Result<String> {
        resolve_class_name(self.constant_pool, index)
    }

    fn member_ref(&self, index: u16) -> Result<MemberRef> {
        resolve_member_ref(self.constant_pool, index)
    }

    fn constant(&self, index: u16) -> Result<Constant> {
        resolve_constant(self.constant_pool, index)
    }

    fn dynamic_call_site(&self, index: u16) -> Result<DynamicCallSite> {
        let entry = self
            .constant_pool
            .get(index as usize)
            .context("missing invokedynamic entry")?;
        let (bootstrap_index, name_and_type_index) = match entry {
            ConstantPool::InvokeDynamic {
                bootstrap_method_attr_index,
                name_and_type_index,
            } => (*bootstrap_method_attr_index, *name_and_type_index),
            _ => anyhow::bail!("unexpected invokedynamic entry"),
        };
        let (name_index, descriptor_index) =
            resolve_name_and_type(self.constant_pool, name_and_type_index)?;
        let bootstrap = self
            .bootstrap_methods
            .get(bootstrap_index as usize)
            .with_context(|| format!("missing bootstrap method {bootstrap_index}"))?;
        let Constant::MethodHandle(handle) = resolve_constant(self.constant_pool, bootstrap.method_ref)?
        else {
            anyhow::bail!("bootstrap method is not a method handle");
        };
        let mut bootstrap_args = Vec::new();
        for argument in &bootstrap.arguments {
            bootstrap_args.push(resolve_constant(self.constant_pool, *argument)?);
        }
        Ok(DynamicCallSite {
            name: resolve_utf8(self.constant_pool, name_index)?,
            descriptor: resolve_utf8(self.constant_pool, descriptor_index)?,
            bootstrap: handle,
            bootstrap_args,
        })
    }
}

fn parse_fields(pool: &ClassPool<'_>, fields: &[jclassfile::fields::FieldInfo]) -> Result<Vec<RawField>> {
    let constant_pool = pool.constant_pool;
    let mut parsed = Vec::new();
    for field in fields {
        let name = resolve_utf8(constant_pool, field.name_index()).context("resolve field name")?;
        let descriptor = resolve_utf8(constant_pool, field.descriptor_index())
            .context("resolve field descriptor")?;
        let mut signature = None;
        let mut constant_value = None;
        for attribute in field.attributes() {
            match attribute {
                Attribute::Signature { signature_index } => {
                    signature = Some(resolve_utf8(constant_pool, *signature_index)?);
                }
                Attribute::ConstantValue {
                    constantvalue_index,
                } => {
                    constant_value = Some(
                        resolve_constant(constant_pool, *constantvalue_index)
                            .with_context(|| format!("resolve constant value of {name}"))?,
                    );
                }
                _ => {}
            }
        }
        parsed.push(RawField {
            name,
            descriptor,
            signature,
            access: AccessFlags(field.access_flags().bits()),
            constant_value,
        });
    }
    Ok(parsed)
}

fn parse_methods(
    pool: &ClassPool<'_>,
    methods: &[jclassfile::methods::MethodInfo],
) -> Result<Vec<RawMethod>> {
    let constant_pool = pool.constant_pool;
    let mut parsed = Vec::new();
    for method in methods {
        let name =
            resolve_utf8(constant_pool, method.name_index()).context("resolve method name")?;
        let descriptor = resolve_utf8(constant_pool, method.descriptor_index())
            .context("resolve method descriptor")?;
        validate_descriptor(&descriptor)
            .with_context(|| format!("invalid descriptor of {name}"))?;
        let mut raw = RawMethod {
            name,
            descriptor,
            access: AccessFlags(method.access_flags().bits()),
            ..RawMethod::default()
        };
        for attribute in method.attributes() {
            match attribute {
                Attribute::Signature { signature_index } => {
                    raw.signature = Some(resolve_utf8(constant_pool, *signature_index)?);
                }
                Attribute::Exceptions {
                    exception_index_table,
                } => {
                    for index in exception_index_table {
                        raw.exceptions.push(resolve_class_name(constant_pool, *index)?);
                    }
                }
                Attribute::Code {
                    max_locals,
                    code,
                    exception_table,
                    attributes,
                    ..
                } => {
                    raw.max_locals = *max_locals;
                    raw.code_length = code.len() as u32;
                    raw.instructions = bytecode::decode(code, pool)
                        .with_context(|| format!("decode bytecode of {}", raw.name))?;
                    raw.exception_table = parse_exception_handlers(exception_table, constant_pool)
                        .context("parse handlers")?;
                    raw.line_numbers = parse_line_numbers(attributes);
                    raw.local_variables = parse_local_variables(attributes, constant_pool)
                        .context("parse local variables")?;
                }
                _ => {}
            }
        }
        parsed.push(raw);
    }
    Ok(parsed)
}

/// Reference parameters are counted so malformed descriptors are caught early.
fn validate_descriptor(descriptor: &str) -> Result<usize> {
    let parsed = MethodDescriptor::from_str(descriptor).context("parse method descriptor")?;
    Ok(parsed
        .parameter_types()
        .iter()
        .filter(|ty| is_reference_type(ty))
        .count())
}

fn is_reference_type(ty: &TypeDescriptor) -> bool {
    matches!(ty, TypeDescriptor::Object(_) | TypeDescriptor::Array(_, _))
}

fn parse_line_numbers(attributes: &[Attribute]) -> Vec<LineNumber> {
    let mut entries = Vec::new();
    for attribute in attributes {
        let Attribute::LineNumberTable { line_number_table } = attribute else {
            continue;
        };
        for record in line_number_table {
            entries.push(LineNumber {
                start_pc: record.start_pc() as u32,
                line: record.line_number() as u32,
            });
        }
    }
    entries.sort_by_key(|entry| entry.start_pc);
    entries
}

fn parse_local_variables(
    attributes: &[Attribute],
    constant_pool: &[ConstantPool],
) -> Result<Vec<LocalVariable>> {
    let mut variables = Vec::new();
    for attribute in attributes {
        let Attribute::LocalVariableTable {
            local_variable_table,
        } = attribute
        else {
            continue;
        };
        for record in local_variable_table {
            variables.push(LocalVariable {
                start_pc: record.start_pc() as u32,
                length: record.length() as u32,
                name: resolve_utf8(constant_pool, record.name_index())?,
                descriptor: resolve_utf8(constant_pool, record.descriptor_index())?,
                signature: None,
                slot: record.index(),
            });
        }
    }
    for attribute in attributes {
        let Attribute::LocalVariableTypeTable {
            local_variable_type_table,
        } = attribute
        else {
            continue;
        };
        for record in local_variable_type_table {
            let signature = resolve_utf8(constant_pool, record.signature_index())?;
            if let Some(variable) = variables.iter_mut().find(|variable| {
                variable.slot == record.index() && variable.start_pc == record.start_pc() as u32
            }) {
                variable.signature = Some(signature);
            }
        }
    }
    variables.sort_by_key(|variable| (variable.slot, variable.start_pc));
    Ok(variables)
}

fn parse_exception_handlers(
    table: &[jclassfile::attributes::ExceptionRecord],
    constant_pool: &[ConstantPool],
) -> Result<Vec<ExceptionHandler>> {
    let mut handlers = Vec::new();
    for entry in table {
        let catch_type = if entry.catch_type() == 0 {
            None
        } else {
            Some(
                resolve_class_name(constant_pool, entry.catch_type())
                    .context("resolve catch type")?,
            )
        };
        handlers.push(ExceptionHandler {
            start_pc: entry.start_pc() as u32,
            end_pc: entry.end_pc() as u32,
            handler_pc: entry.handler_pc() as u32,
            catch_type,
        });
    }
    Ok(handlers)
}

fn resolve_class_name(constant_pool: &[ConstantPool], class_index: u16) -> Result<String> {
    let entry = constant_pool
        .get(class_index as usize)
        .context("missing class entry")?;
    match entry {
        ConstantPool::Class { name_index } => resolve_utf8(constant_pool, *name_index),
        _ => anyhow::bail!("unexpected class entry"),
    }
}

fn optional_class_name(constant_pool: &[ConstantPool], index: u16) -> Result<Option<String>> {
    if index == 0 {
        return Ok(None);
    }
    resolve_class_name(constant_pool, index).map(Some)
}

fn resolve_utf8(constant_pool: &[ConstantPool], index: u16) -> Result<String> {
    let entry = constant_pool
        .get(index as usize)
        .context("missing utf8 entry")?;
    match entry {
        ConstantPool::Utf8 { value } => Ok(value.clone()),
        _ => anyhow::bail!("unexpected utf8 entry"),
    }
}

fn optional_utf8(constant_pool: &[ConstantPool], index: u16) -> Result<Option<String>> {
    if index == 0 {
        return Ok(None);
    }
    resolve_utf8(constant_pool, index).map(Some)
}

fn resolve_name_and_type(constant_pool: &[ConstantPool], index: u16) -> Result<(u16, u16)> {
    let entry = constant_pool
        .get(index as usize)
        .context("missing name and type entry")?;
    match entry {
        ConstantPool::NameAndType {
            name_index,
            descriptor_index,
        } => Ok((*name_index, *descriptor_index)),
        _ => anyhow::bail!("unexpected name and type entry"),
    }
}

fn resolve_member_ref(constant_pool: &[ConstantPool], index: u16) -> Result<MemberRef> {
    let entry = constant_pool
        .get(index as usize)
        .context("missing member ref entry")?;
    let (class_index, name_and_type_index) = match entry {
        ConstantPool::Fieldref {
            class_index,
            name_and_type_index,
        }
        | ConstantPool::Methodref {
            class_index,
            name_and_type_index,
        }
        | ConstantPool::InterfaceMethodref {
            class_index,
            name_and_type_index,
        } => (*class_index, *name_and_type_index),
        _ => anyhow::bail!("unexpected member ref entry"),
    };
    let owner = resolve_class_name(constant_pool, class_index).context("resolve owner")?;
    let (name_index, descriptor_index) = resolve_name_and_type(constant_pool, name_and_type_index)?;
    Ok(MemberRef {
        owner,
        name: resolve_utf8(constant_pool, name_index).context("resolve member name")?,
        descriptor: resolve_utf8(constant_pool, descriptor_index)
            .context("resolve member descriptor")?,
    })
}

fn resolve_constant(constant_pool: &[ConstantPool], index: u16) -> Result<Constant> {
    let entry = constant_pool
        .get(index as usize)
        .context("missing constant pool entry")?;
    let constant = match entry {
        ConstantPool::Integer { value } => Constant::Int(*value),
        ConstantPool::Float { value } => Constant::Float(*value),
        ConstantPool::Long { value } => Constant::Long(*value),
        ConstantPool::Double { value } => Constant::Double(*value),
        ConstantPool::String { string_index } => {
            Constant::String(resolve_utf8(constant_pool, *string_index)?)
        }
        ConstantPool::Class { name_index } => {
            Constant::Class(resolve_utf8(constant_pool, *name_index)?)
        }
        ConstantPool::MethodType { descriptor_index } => {
            Constant::MethodType(resolve_utf8(constant_pool, *descriptor_index)?)
        }
        ConstantPool::MethodHandle {
            reference_kind,
            reference_index,
        } => {
            let kind = HandleKind::from_reference_kind(*reference_kind as u8)
                .context("invalid method handle kind")?;
            Constant::MethodHandle(MethodHandle {
                kind,
                member: resolve_member_ref(constant_pool, *reference_index)?,
            })
        }
        _ => anyhow::bail!("unsupported loadable constant at {}", index),
    };
    Ok(constant)
}
