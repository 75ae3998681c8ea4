pub mod body;
pub mod errors;
pub mod model;
pub mod provider;

pub use body::{FieldRef, IlOp, MethodBody, MethodRef, TokenRef};
pub use errors::{IlError, Result};
pub use model::{
    EntryPointRef, FieldDef, GenericParamDef, MethodDef, MethodSig, ModuleDef, PrimitiveKind,
    Section, SigType, TypeDef, TypeRefSig, Variance,
};
pub use provider::{JsonModuleReader, ModuleReader};
