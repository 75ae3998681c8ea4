//! Method bodies as a dependency source.
//!
//! Bodies are kept at the level the dependency engine needs: the ordered
//! list of operations that reference other entities. Operand-stack detail
//! and control flow are the code generator's business, not ours.

use serde::{Deserialize, Serialize};

use crate::il::model::SigType;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MethodBody {
    #[serde(default)]
    pub ops: Vec<IlOp>,
}

/// A method reference as it appears in a body. Overloads are resolved by
/// name plus parameter types in the owner's context.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodRef {
    pub owner: SigType,
    pub name: String,
    #[serde(default)]
    pub params: Vec<SigType>,
    #[serde(default)]
    pub method_inst: Vec<SigType>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldRef {
    pub owner: SigType,
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum TokenRef {
    Type(SigType),
    Method(MethodRef),
    Field(FieldRef),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum IlOp {
    Call { method: MethodRef },
    CallVirt { method: MethodRef },
    NewObj { ctor: MethodRef },
    NewArr { element: SigType },
    Box { ty: SigType },
    Unbox { ty: SigType },
    CastClass { ty: SigType },
    IsInst { ty: SigType },
    LdStr { value: String },
    LdSFld { field: FieldRef },
    StSFld { field: FieldRef },
    LdFld { field: FieldRef },
    LdToken { token: TokenRef },
    LdFtn { method: MethodRef },
    LdVirtFtn { method: MethodRef },
    Throw,
}
