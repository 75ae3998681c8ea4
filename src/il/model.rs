//! In-memory module description produced by a metadata reader.
//!
//! This is the dependency-source view of a managed module: type and method
//! records, signatures, and RVA-addressed section data. Reading a real PE
//! image into this shape is the metadata reader's job; the compiler core
//! only consumes it.

use serde::{Deserialize, Serialize};

use crate::il::body::MethodBody;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModuleDef {
    pub name: String,
    #[serde(default)]
    pub is_system_module: bool,
    /// Entry point, as `(declaring type fqn, method name)`.
    #[serde(default)]
    pub entry_point: Option<EntryPointRef>,
    #[serde(default)]
    pub types: Vec<TypeDef>,
    #[serde(default)]
    pub sections: Vec<Section>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntryPointRef {
    pub declaring_type: String,
    pub method: String,
}

/// An RVA-addressed blob of initialized data.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Section {
    pub rva: u32,
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TypeDef {
    #[serde(default)]
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub is_interface: bool,
    #[serde(default)]
    pub is_value_type: bool,
    #[serde(default)]
    pub is_abstract: bool,
    #[serde(default)]
    pub is_sealed: bool,
    #[serde(default)]
    pub is_delegate: bool,
    #[serde(default)]
    pub blocked_from_reflection: bool,
    #[serde(default)]
    pub base: Option<SigType>,
    #[serde(default)]
    pub interfaces: Vec<SigType>,
    #[serde(default)]
    pub generic_params: Vec<GenericParamDef>,
    #[serde(default)]
    pub methods: Vec<MethodDef>,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
}

impl TypeDef {
    pub fn fullname(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenericParamDef {
    pub name: String,
    #[serde(default)]
    pub variance: Variance,
    /// The `class` constraint: instantiations over this parameter are known
    /// to be reference types.
    #[serde(default)]
    pub has_reference_type_constraint: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Variance {
    #[default]
    None,
    Covariant,
    Contravariant,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MethodDef {
    pub name: String,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub is_virtual: bool,
    #[serde(default)]
    pub is_new_slot: bool,
    #[serde(default)]
    pub is_abstract: bool,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default)]
    pub is_internal_call: bool,
    #[serde(default)]
    pub blocked_from_reflection: bool,
    #[serde(default)]
    pub generic_param_count: u16,
    pub signature: MethodSig,
    #[serde(default)]
    pub body: Option<MethodBody>,
}

impl MethodDef {
    pub fn is_constructor(&self) -> bool {
        self.name == ".ctor" || self.name == ".cctor"
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub is_thread_static: bool,
    #[serde(default)]
    pub is_literal: bool,
    pub ty: SigType,
    /// Mapped initial data for static fields, as a section-relative address.
    #[serde(default)]
    pub rva: Option<u32>,
}

/// A scoped reference to a named type. `assembly == None` resolves in the
/// defining module first, then across the loaded set.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeRefSig {
    #[serde(default)]
    pub assembly: Option<String>,
    #[serde(default)]
    pub namespace: String,
    pub name: String,
}

impl TypeRefSig {
    pub fn fullname(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveKind {
    Void,
    Boolean,
    Char,
    SByte,
    Byte,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Single,
    Double,
    IntPtr,
    UIntPtr,
}

impl PrimitiveKind {
    /// System namespace type name backing the primitive.
    pub fn system_name(self) -> &'static str {
        match self {
            PrimitiveKind::Void => "Void",
            PrimitiveKind::Boolean => "Boolean",
            PrimitiveKind::Char => "Char",
            PrimitiveKind::SByte => "SByte",
            PrimitiveKind::Byte => "Byte",
            PrimitiveKind::Int16 => "Int16",
            PrimitiveKind::UInt16 => "UInt16",
            PrimitiveKind::Int32 => "Int32",
            PrimitiveKind::UInt32 => "UInt32",
            PrimitiveKind::Int64 => "Int64",
            PrimitiveKind::UInt64 => "UInt64",
            PrimitiveKind::Single => "Single",
            PrimitiveKind::Double => "Double",
            PrimitiveKind::IntPtr => "IntPtr",
            PrimitiveKind::UIntPtr => "UIntPtr",
        }
    }

    /// Byte size of the primitive when stored as a field element.
    pub fn element_size(self) -> usize {
        match self {
            PrimitiveKind::Void => 0,
            PrimitiveKind::Boolean | PrimitiveKind::SByte | PrimitiveKind::Byte => 1,
            PrimitiveKind::Char | PrimitiveKind::Int16 | PrimitiveKind::UInt16 => 2,
            PrimitiveKind::Int32 | PrimitiveKind::UInt32 | PrimitiveKind::Single => 4,
            PrimitiveKind::Int64 | PrimitiveKind::UInt64 | PrimitiveKind::Double => 8,
            PrimitiveKind::IntPtr | PrimitiveKind::UIntPtr => 8,
        }
    }
}

/// Signature type algebra. Signatures may mention the generic parameters of
/// the enclosing type (`TypeVar`) or method (`MethodVar`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SigType {
    Prim(PrimitiveKind),
    Named(TypeRefSig),
    Inst {
        def: TypeRefSig,
        args: Vec<SigType>,
    },
    Array(Box<SigType>),
    ByRef(Box<SigType>),
    Ptr(Box<SigType>),
    FnPtr(Box<MethodSig>),
    TypeVar(u16),
    MethodVar(u16),
}

impl SigType {
    pub fn named(namespace: &str, name: &str) -> SigType {
        SigType::Named(TypeRefSig {
            assembly: None,
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodSig {
    #[serde(default)]
    pub has_this: bool,
    /// Vararg calling convention. Rejected by signature resolution.
    #[serde(default)]
    pub is_vararg: bool,
    pub ret: SigType,
    #[serde(default)]
    pub params: Vec<SigType>,
}

impl MethodSig {
    pub fn static_sig(ret: SigType, params: Vec<SigType>) -> MethodSig {
        MethodSig {
            has_this: false,
            is_vararg: false,
            ret,
            params,
        }
    }

    pub fn instance_sig(ret: SigType, params: Vec<SigType>) -> MethodSig {
        MethodSig {
            has_this: true,
            is_vararg: false,
            ret,
            params,
        }
    }
}
