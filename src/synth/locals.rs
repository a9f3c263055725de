use std::collections::HashMap;

use crate::ast::LocalRef;
use crate::error::ReconstructError;
use crate::ir::{LocalVariable, Op, RawClass, RawMethod, ValueKind};
use crate::types::{
    parse_class_signature, parse_field_signature, parse_method_descriptor, parse_method_signature,
    MethodSignature, ObjectType, Type,
};

/// First id handed out to temporaries introduced during synthesis.
pub const TEMP_BASE: usize = 1 << 20;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LocalOrigin {
    This,
    Parameter,
    /// Named by the local-variable table.
    Debug,
    /// No debug information; named after its kind and slot.
    Synthetic,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LocalVar {
    pub var: LocalRef,
    pub ty: Type,
    pub slot: u16,
    pub origin: LocalOrigin,
}

/// Variables of one method, resolved for every load, store and `iinc`.
#[derive(Clone, Debug, Default)]
pub struct LocalTable {
    vars: Vec<LocalVar>,
    params: Vec<usize>,
    by_offset: HashMap<u32, usize>,
    signature: Option<MethodSignature>,
}

fn kind_prefix(kind: ValueKind) -> &'static str {
    match kind {
        ValueKind::Int => "int",
        ValueKind::Long => "long",
        ValueKind::Float => "float",
        ValueKind::Double => "double",
        ValueKind::Reference => "obj",
    }
}

fn class_type_params(class: &RawClass) -> Vec<String> {
    class
        .signature
        .as_deref()
        .and_then(|signature| parse_class_signature(signature).ok())
        .map(|signature| signature.type_params.into_iter().map(|p| p.name).collect())
        .unwrap_or_default()
}

/// Type of `this` inside `class`, parameterized by its own type variables.
pub fn this_type(class: &RawClass) -> Type {
    let args = class_type_params(class)
        .into_iter()
        .enumerate()
        .map(|(index, name)| Type::generic(name, index))
        .collect();
    Type::Object(ObjectType::with_args(class.name.clone(), args))
}

fn entry_type(entry: &LocalVariable, scope: &[String]) -> Type {
    entry
        .signature
        .as_deref()
        .and_then(|signature| parse_field_signature(signature, scope).ok())
        .or_else(|| Type::from_descriptor(&entry.descriptor).ok())
        .unwrap_or_else(Type::object_root)
}

impl LocalTable {
    pub fn build(class: &RawClass, method: &RawMethod) -> Result<LocalTable, ReconstructError> {
        let descriptor = parse_method_descriptor(&method.descriptor)
            .map_err(|err| ReconstructError::malformed(err.to_string()))?;
        let mut scope = class_type_params(class);
        let generic = method
            .signature
            .as_deref()
            .and_then(|signature| parse_method_signature(signature, &scope).ok())
            .filter(|signature| signature.params.len() == descriptor.params.len());
        if let Some(signature) = &generic {
            let mut method_scope: Vec<String> =
                signature.type_params.iter().map(|p| p.name.clone()).collect();
            method_scope.append(&mut scope);
            scope = method_scope;
        }

        let mut table = LocalTable {
            signature: Some(generic.clone().unwrap_or_else(|| descriptor.clone())),
            ..LocalTable::default()
        };
        let mut keyed: HashMap<(u16, u32, String), usize> = HashMap::new();
        let mut synthetic: HashMap<(u16, ValueKind), usize> = HashMap::new();
        let mut param_slots: HashMap<u16, usize> = HashMap::new();

        let debug_entry = |slot: u16, offset: u32| {
            method
                .local_variables
                .iter()
                .find(|entry| entry.slot == slot && entry.covers(offset))
        };

        let mut slot = 0u16;
        if !method.access.is_static() {
            let id = table.push(LocalVar {
                var: LocalRef {
                    id: 0,
                    name: "this".to_string(),
                },
                ty: this_type(class),
                slot,
                origin: LocalOrigin::This,
            });
            param_slots.insert(slot, id);
            slot += 1;
        }
        for (index, erased) in descriptor.params.iter().enumerate() {
            let entry = debug_entry(slot, 0);
            let ty = match (entry, &generic) {
                (Some(entry), _) if entry.signature.is_some() => entry_type(entry, &scope),
                (_, Some(signature)) => signature.params[index].clone(),
                _ => erased.clone(),
            };
            let name = entry
                .map(|entry| entry.name.clone())
                .unwrap_or_else(|| format!("arg{index}"));
            let id = table.push(LocalVar {
                var: LocalRef { id: 0, name },
                ty,
                slot,
                origin: LocalOrigin::Parameter,
            });
            if let Some(entry) = entry {
                keyed.insert((slot, entry.start_pc, entry.name.clone()), id);
            }
            table.params.push(id);
            param_slots.insert(slot, id);
            slot += erased.slot_size() as u16;
        }

        for (index, instruction) in method.instructions.iter().enumerate() {
            let (slot, kind, store) = match instruction.op {
                Op::Load(kind, slot) => (slot, kind, false),
                Op::Store(kind, slot) => (slot, kind, true),
                Op::Iinc { slot, .. } => (slot, ValueKind::Int, false),
                _ => continue,
            };
            let offset = instruction.offset;
            let next = method
                .instructions
                .get(index + 1)
                .map(|next| next.offset)
                .unwrap_or(method.code_length);
            let entry = if store {
                debug_entry(slot, next).or_else(|| debug_entry(slot, offset))
            } else {
                debug_entry(slot, offset)
            };
            let id = match entry {
                Some(entry) => {
                    let key = (slot, entry.start_pc, entry.name.clone());
                    match keyed.get(&key) {
                        Some(id) => *id,
                        None => {
                            let id = table.push(LocalVar {
                                var: LocalRef {
                                    id: 0,
                                    name: entry.name.clone(),
                                },
                                ty: entry_type(entry, &scope),
                                slot,
                                origin: LocalOrigin::Debug,
                            });
                            keyed.insert(key, id);
                            id
                        }
                    }
                }
                None => match param_slots.get(&slot) {
                    Some(id) => *id,
                    None => *synthetic.entry((slot, kind)).or_insert_with(|| {
                        table.push(LocalVar {
                            var: LocalRef {
                                id: 0,
                                name: format!("{}{slot}", kind_prefix(kind)),
                            },
                            ty: kind.default_type(),
                            slot,
                            origin: LocalOrigin::Synthetic,
                        })
                    }),
                },
            };
            table.by_offset.insert(offset, id);
        }
        Ok(table)
    }

    fn push(&mut self, mut local: LocalVar) -> usize {
        let id = self.vars.len();
        local.var.id = id;
        self.vars.push(local);
        id
    }

    /// Variable accessed by the load, store or `iinc` at `offset`.
    pub fn at(&self, offset: u32) -> Option<&LocalVar> {
        self.by_offset.get(&offset).map(|id| &self.vars[*id])
    }

    pub fn get(&self, id: usize) -> Option<&LocalVar> {
        self.vars.get(id)
    }

    pub fn params(&self) -> impl Iterator<Item = &LocalVar> {
        self.params.iter().map(|id| &self.vars[*id])
    }

    /// Method signature with generic parameter and return types when known.
    pub fn signature(&self) -> Option<&MethodSignature> {
        self.signature.as_ref()
    }

    pub fn return_type(&self) -> Type {
        self.signature
            .as_ref()
            .map(|signature| signature.ret.clone())
            .unwrap_or_else(Type::void)
    }

    pub fn is_parameter(&self, id: usize) -> bool {
        self.vars
            .get(id)
            .is_some_and(|local| matches!(local.origin, LocalOrigin::This | LocalOrigin::Parameter))
    }

    pub fn is_synthetic(&self, id: usize) -> bool {
        id >= TEMP_BASE
            || self
                .vars
                .get(id)
                .is_some_and(|local| local.origin == LocalOrigin::Synthetic)
    }
}
