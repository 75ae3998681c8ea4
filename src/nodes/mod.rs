//! Graph nodes and the interning factory that encodes compilation policy.

pub mod data;
pub mod dictionary;
pub mod factory;
pub mod helpers;
pub mod method;
pub mod type_nodes;

pub use dictionary::{DictionaryEntry, DictionaryLayoutStore, DictionaryOwner};
pub use factory::{FactoryMode, NodeFactory};
pub use helpers::{HelperId, HelperTarget};

use crate::typesystem::{FieldId, MethodId, ModuleId, TypeId};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum StaticsKind {
    Gc,
    NonGc,
    Thread,
}

/// Interned node identity. One node exists per key within one factory;
/// scanner and compiler build independent factories.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum NodeKey {
    MethodEntrypoint { method: MethodId, unboxing: bool },
    ShadowConcreteMethod(MethodId),
    ExternMethod(MethodId),
    NecessaryType(TypeId),
    ConstructedType(TypeId),
    CanonicalType(TypeId),
    ExternalType(TypeId),
    VTable(TypeId),
    InterfaceDispatchMap(TypeId),
    TypeDictionary(TypeId),
    MethodDictionary(MethodId),
    ReadyToRunHelper(HelperId, HelperTarget),
    VirtualMethodUse(MethodId),
    GenericVirtualMethodUse(MethodId),
    StringLiteral(String),
    FieldRvaData(FieldId),
    Statics(TypeId, StaticsKind),
    TypeMetadata(TypeId),
    MethodMetadata(MethodId),
    ModuleMetadata(ModuleId),
    ReadOnlyBlob(String),
}
