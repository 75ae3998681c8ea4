//! Version-bubble policy: which entities belong to this compilation.
//!
//! The module group is the sole source of truth for locality; nothing else
//! second-guesses it.

use std::rc::Rc;

use crate::typesystem::{MethodId, ModuleId, TypeId, TypeSystemContext};

pub const GENERATED_ASSEMBLY_NAME: &str = "<Generated>";

pub trait ModuleGroup {
    /// The entity's descriptor lives in this compilation.
    fn contains_type(&self, ctx: &TypeSystemContext, ty: TypeId) -> bool;

    /// The method's body is compiled here.
    fn contains_method_body(&self, ctx: &TypeSystemContext, m: MethodId, unboxing_stub: bool)
    -> bool;

    /// Stronger than containment: the body cannot change underneath us, so
    /// inlining across the boundary is allowed.
    fn versions_with_method_body(&self, ctx: &TypeSystemContext, m: MethodId) -> bool;

    fn versions_with_type(&self, ctx: &TypeSystemContext, ty: TypeId) -> bool;

    /// Name of the synthetic module that owns generated stubs.
    fn generated_assembly_name(&self) -> &str {
        GENERATED_ASSEMBLY_NAME
    }
}

/// The defining module of a type, looking through composites to the
/// element or definition. Synthetic types (sentinels, variables) have none
/// and are treated as generated, hence local.
fn defining_module(ctx: &TypeSystemContext, ty: TypeId) -> Option<ModuleId> {
    use crate::typesystem::TypeCategory::*;
    match ctx.category(ty) {
        Array | ByRef | Pointer => ctx
            .element_type(ty)
            .and_then(|e| defining_module(ctx, e)),
        _ => ctx.type_module(ty),
    }
}

/// Everything loaded compiles into the one output image.
pub struct SingleFileModuleGroup;

impl ModuleGroup for SingleFileModuleGroup {
    fn contains_type(&self, _ctx: &TypeSystemContext, _ty: TypeId) -> bool {
        true
    }

    fn contains_method_body(
        &self,
        _ctx: &TypeSystemContext,
        _m: MethodId,
        _unboxing_stub: bool,
    ) -> bool {
        true
    }

    fn versions_with_method_body(&self, _ctx: &TypeSystemContext, _m: MethodId) -> bool {
        true
    }

    fn versions_with_type(&self, _ctx: &TypeSystemContext, _ty: TypeId) -> bool {
        true
    }
}

/// One input module is compiled; a set of modules versions with it.
pub struct VersionBubbleModuleGroup {
    compilation_module: ModuleId,
    version_bubble: Vec<ModuleId>,
}

impl VersionBubbleModuleGroup {
    pub fn new(compilation_module: ModuleId, version_bubble: Vec<ModuleId>) -> Rc<Self> {
        Rc::new(VersionBubbleModuleGroup {
            compilation_module,
            version_bubble,
        })
    }

    fn in_bubble(&self, module: ModuleId) -> bool {
        module == self.compilation_module || self.version_bubble.contains(&module)
    }
}

impl ModuleGroup for VersionBubbleModuleGroup {
    fn contains_type(&self, ctx: &TypeSystemContext, ty: TypeId) -> bool {
        match defining_module(ctx, ty) {
            Some(m) => m == self.compilation_module,
            // Generated types belong to the compilation.
            None => true,
        }
    }

    fn contains_method_body(
        &self,
        ctx: &TypeSystemContext,
        m: MethodId,
        _unboxing_stub: bool,
    ) -> bool {
        ctx.method_module(m) == self.compilation_module
    }

    fn versions_with_method_body(&self, ctx: &TypeSystemContext, m: MethodId) -> bool {
        self.in_bubble(ctx.method_module(m))
    }

    fn versions_with_type(&self, ctx: &TypeSystemContext, ty: TypeId) -> bool {
        match defining_module(ctx, ty) {
            Some(m) => self.in_bubble(m),
            None => true,
        }
    }
}

/// Nothing is local; every reference resolves to an import.
pub struct ExternalModuleGroup;

impl ModuleGroup for ExternalModuleGroup {
    fn contains_type(&self, _ctx: &TypeSystemContext, _ty: TypeId) -> bool {
        false
    }

    fn contains_method_body(
        &self,
        _ctx: &TypeSystemContext,
        _m: MethodId,
        _unboxing_stub: bool,
    ) -> bool {
        false
    }

    fn versions_with_method_body(&self, _ctx: &TypeSystemContext, _m: MethodId) -> bool {
        false
    }

    fn versions_with_type(&self, _ctx: &TypeSystemContext, _ty: TypeId) -> bool {
        false
    }
}
