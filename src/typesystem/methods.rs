use std::fmt;
use std::rc::Rc;

use crate::typesystem::context::ModuleId;
use crate::typesystem::types::TypeId;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct MethodId(pub u32);

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "method#{}", self.0)
    }
}

#[derive(Clone, Debug)]
pub enum MethodKind {
    /// A method definition from module metadata. `owner` is the interned
    /// definition type.
    Ecma {
        module: ModuleId,
        owner: TypeId,
        type_def_index: u32,
        method_index: u32,
    },
    /// The method of an instantiated type (`List<int>.Add`).
    OnInstantiatedType { def: MethodId, owner: TypeId },
    /// A generic method instantiation (`M<int>`).
    Instantiated { def: MethodId, args: Box<[TypeId]> },
}

pub struct MethodData {
    pub kind: MethodKind,
    pub owner: TypeId,
}

/// A method signature with every type resolved to an interned handle.
/// Definitions keep their generic parameters as interned variables.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodSignature {
    pub is_static: bool,
    pub ret: TypeId,
    pub params: Rc<[TypeId]>,
}

impl MethodSignature {
    pub fn matches(&self, other: &MethodSignature) -> bool {
        self.is_static == other.is_static && self.ret == other.ret && self.params == other.params
    }
}
