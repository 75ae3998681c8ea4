//! Interned type representation.
//!
//! Every type is a handle into the context's arena; structurally equal types
//! intern to the same handle, so handle equality is type identity.

use bitflags::bitflags;
use std::fmt;

use crate::il::PrimitiveKind;
use crate::typesystem::context::ModuleId;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type#{}", self.0)
    }
}

/// The two flavours of canonical sharing. `Specific` collapses reference
/// arguments to `__Canon` and preserves value types; `Universal` collapses
/// everything to `__UniversalCanon`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum CanonicalFormKind {
    Specific,
    Universal,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum GenericParamKind {
    Type,
    Method,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TypeKind {
    /// A type definition from module metadata.
    Ecma { module: ModuleId, def_index: u32 },
    /// `def` applied to `args`.
    Instantiated { def: TypeId, args: Box<[TypeId]> },
    Array { element: TypeId },
    ByRef { element: TypeId },
    Pointer { element: TypeId },
    FunctionPointer { ret: TypeId, params: Box<[TypeId]> },
    /// A generic parameter occurrence (`!0` / `!!0`).
    GenericParameter { kind: GenericParamKind, index: u16 },
    /// `__Canon` / `__UniversalCanon`.
    CanonSentinel { universal: bool },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TypeCategory {
    Primitive(PrimitiveKind),
    ValueType,
    Class,
    Interface,
    Array,
    ByRef,
    Pointer,
    FunctionPointer,
    GenericParameter,
    CanonSentinel,
}

bitflags! {
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct TypeFlags: u16 {
        const VALUE_TYPE = 1 << 0;
        const INTERFACE = 1 << 1;
        const ABSTRACT = 1 << 2;
        const SEALED = 1 << 3;
        const DELEGATE = 1 << 4;
        /// Mentions a generic parameter somewhere.
        const HAS_GENERIC_VARIABLES = 1 << 5;
        /// Contains `__Canon` (or `__UniversalCanon`) somewhere.
        const CANONICAL_SPECIFIC = 1 << 6;
        /// Contains `__UniversalCanon` somewhere.
        const CANONICAL_UNIVERSAL = 1 << 7;
    }
}

pub struct TypeData {
    pub kind: TypeKind,
    pub category: TypeCategory,
    pub flags: TypeFlags,
}

impl TypeData {
    pub fn is_value_type(&self) -> bool {
        self.flags.contains(TypeFlags::VALUE_TYPE)
    }

    pub fn is_interface(&self) -> bool {
        self.flags.contains(TypeFlags::INTERFACE)
    }

    pub fn is_reference_type(&self) -> bool {
        matches!(
            self.category,
            TypeCategory::Class | TypeCategory::Interface | TypeCategory::Array
        ) || matches!(self.kind, TypeKind::CanonSentinel { .. })
    }
}
