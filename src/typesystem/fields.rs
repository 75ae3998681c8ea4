use std::fmt;

use crate::typesystem::context::ModuleId;
use crate::typesystem::types::TypeId;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct FieldId(pub u32);

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "field#{}", self.0)
    }
}

#[derive(Clone, Debug)]
pub enum FieldKind {
    Ecma {
        module: ModuleId,
        owner: TypeId,
        type_def_index: u32,
        field_index: u32,
    },
    OnInstantiatedType { def: FieldId, owner: TypeId },
}

pub struct FieldData {
    pub kind: FieldKind,
    pub owner: TypeId,
}
