pub mod canon;
pub mod context;
pub mod errors;
pub mod fields;
pub mod instantiation;
pub mod intrinsics;
pub mod methods;
pub mod types;
pub mod virtuals;

pub use context::{GenericContext, ModuleId, TypeSystemContext, WellKnownType};
pub use errors::{Result, TypeSystemError};
pub use fields::FieldId;
pub use methods::{MethodId, MethodSignature};
pub use types::{CanonicalFormKind, GenericParamKind, TypeCategory, TypeFlags, TypeId};
