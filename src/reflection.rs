//! Metadata manager: which entities keep reflection metadata and what that
//! costs in dependencies.
//!
//! Metadata comes in two categories: a *description* (the entity appears in
//! the metadata blob) and a *runtime mapping* (the description is wired to
//! a runtime artifact such as a method body or type descriptor).

use bitflags::bitflags;
use std::cell::RefCell;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};
use log::debug;

use crate::graph::{Edge, NodeId};
use crate::nodes::NodeFactory;
use crate::typesystem::{
    CanonicalFormKind, FieldId, MethodId, TypeCategory, TypeId, TypeSystemContext,
};

bitflags! {
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    pub struct MetadataCategory: u8 {
        const DESCRIPTION = 1 << 0;
        const RUNTIME_MAPPING = 1 << 1;
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EntityRef {
    Type(TypeId),
    Method(MethodId),
    Field(FieldId),
}

/// End-of-compilation metadata: the serialized blob plus entity-to-offset
/// maps handed to the object writer.
#[derive(Default, Debug)]
pub struct MetadataBlob {
    pub blob: Vec<u8>,
    pub type_map: IndexMap<TypeId, u32>,
    pub method_map: IndexMap<MethodId, u32>,
    pub field_map: IndexMap<FieldId, u32>,
}

pub trait MetadataManager {
    fn metadata_category(&self, ctx: &TypeSystemContext, entity: EntityRef) -> MetadataCategory;

    fn is_reflection_blocked(&self, ctx: &TypeSystemContext, entity: EntityRef) -> bool;

    /// Adds the edges an entity needs in order to be reflectable.
    fn dependencies_due_to_reflectability(
        &self,
        deps: &mut Vec<Edge>,
        factory: &NodeFactory,
        entity: EntityRef,
    );

    fn has_reflection_invoke_stub_for_invokable_method(
        &self,
        ctx: &TypeSystemContext,
        m: MethodId,
    ) -> bool;

    /// The shared body backing reflection invocation of `m`.
    fn get_canonical_reflection_invoke_stub(
        &self,
        ctx: &TypeSystemContext,
        m: MethodId,
    ) -> Option<MethodId>;

    fn compute_metadata(&self, factory: &NodeFactory, marked: &[NodeId]) -> MetadataBlob;
}

/// Reflection blocking: synthetic (non-metadata) entities, array methods,
/// and anything the policy attributes annotate.
#[derive(Default)]
pub struct BlockedInternalsPolicy;

impl BlockedInternalsPolicy {
    pub fn is_blocked(&self, ctx: &TypeSystemContext, entity: EntityRef) -> bool {
        match entity {
            EntityRef::Type(t) => {
                let def = ctx.type_definition(t);
                match ctx.category(def) {
                    TypeCategory::Primitive(_)
                    | TypeCategory::ValueType
                    | TypeCategory::Class
                    | TypeCategory::Interface => match ctx.type_def_record(def) {
                        Some((module, i)) => module.types[i as usize].blocked_from_reflection,
                        None => true,
                    },
                    // Arrays, pointers, sentinels and variables have no
                    // metadata presence of their own.
                    _ => true,
                }
            }
            EntityRef::Method(m) => {
                if self.is_blocked(ctx, EntityRef::Type(ctx.method_owner(m))) {
                    return true;
                }
                let (module, tdi, mi) = ctx.method_def_record(m);
                module.types[tdi as usize].methods[mi as usize].blocked_from_reflection
            }
            EntityRef::Field(f) => self.is_blocked(ctx, EntityRef::Type(ctx.field_owner(f))),
        }
    }
}

/// No reflection at all.
#[derive(Default)]
pub struct EmptyMetadataManager;

impl MetadataManager for EmptyMetadataManager {
    fn metadata_category(&self, _ctx: &TypeSystemContext, _entity: EntityRef) -> MetadataCategory {
        MetadataCategory::empty()
    }

    fn is_reflection_blocked(&self, _ctx: &TypeSystemContext, _entity: EntityRef) -> bool {
        true
    }

    fn dependencies_due_to_reflectability(
        &self,
        _deps: &mut Vec<Edge>,
        _factory: &NodeFactory,
        _entity: EntityRef,
    ) {
    }

    fn has_reflection_invoke_stub_for_invokable_method(
        &self,
        _ctx: &TypeSystemContext,
        _m: MethodId,
    ) -> bool {
        false
    }

    fn get_canonical_reflection_invoke_stub(
        &self,
        _ctx: &TypeSystemContext,
        _m: MethodId,
    ) -> Option<MethodId> {
        None
    }

    fn compute_metadata(&self, _factory: &NodeFactory, _marked: &[NodeId]) -> MetadataBlob {
        MetadataBlob::default()
    }
}

/// Explicitly listed entities get both description and runtime mapping.
pub struct CompilerGeneratedMetadataManager {
    blocked: BlockedInternalsPolicy,
    types: IndexSet<TypeId>,
    methods: IndexSet<MethodId>,
}

impl CompilerGeneratedMetadataManager {
    pub fn new(types: IndexSet<TypeId>, methods: IndexSet<MethodId>) -> Self {
        CompilerGeneratedMetadataManager {
            blocked: BlockedInternalsPolicy,
            types,
            methods,
        }
    }
}

impl MetadataManager for CompilerGeneratedMetadataManager {
    fn metadata_category(&self, ctx: &TypeSystemContext, entity: EntityRef) -> MetadataCategory {
        if self.is_reflection_blocked(ctx, entity) {
            return MetadataCategory::empty();
        }
        let listed = match entity {
            EntityRef::Type(t) => self.types.contains(&ctx.type_definition(t)),
            EntityRef::Method(m) => self.methods.contains(&ctx.typical_method_def(m)),
            EntityRef::Field(_) => false,
        };
        if listed {
            MetadataCategory::DESCRIPTION | MetadataCategory::RUNTIME_MAPPING
        } else {
            MetadataCategory::empty()
        }
    }

    fn is_reflection_blocked(&self, ctx: &TypeSystemContext, entity: EntityRef) -> bool {
        self.blocked.is_blocked(ctx, entity)
    }

    fn dependencies_due_to_reflectability(
        &self,
        deps: &mut Vec<Edge>,
        factory: &NodeFactory,
        entity: EntityRef,
    ) {
        add_metadata_edges(self, deps, factory, entity);
    }

    fn has_reflection_invoke_stub_for_invokable_method(
        &self,
        ctx: &TypeSystemContext,
        m: MethodId,
    ) -> bool {
        self.metadata_category(ctx, EntityRef::Method(m))
            .contains(MetadataCategory::RUNTIME_MAPPING)
    }

    fn get_canonical_reflection_invoke_stub(
        &self,
        ctx: &TypeSystemContext,
        m: MethodId,
    ) -> Option<MethodId> {
        canonical_invoke_stub(ctx, m)
    }

    fn compute_metadata(&self, factory: &NodeFactory, marked: &[NodeId]) -> MetadataBlob {
        build_metadata_blob(factory, marked)
    }
}

/// Everything the scanner proved compiled is reflectable unless blocked.
/// Used by the compiler pass, fed from scan results.
pub struct UsageBasedMetadataManager {
    blocked: BlockedInternalsPolicy,
    compiled_methods: IndexSet<MethodId>,
    constructed_types: IndexSet<TypeId>,
}

impl UsageBasedMetadataManager {
    pub fn new(compiled_methods: IndexSet<MethodId>, constructed_types: IndexSet<TypeId>) -> Self {
        UsageBasedMetadataManager {
            blocked: BlockedInternalsPolicy,
            compiled_methods,
            constructed_types,
        }
    }
}

impl MetadataManager for UsageBasedMetadataManager {
    fn metadata_category(&self, ctx: &TypeSystemContext, entity: EntityRef) -> MetadataCategory {
        if self.is_reflection_blocked(ctx, entity) {
            return MetadataCategory::empty();
        }
        let seen = match entity {
            EntityRef::Type(t) => self.constructed_types.contains(&t),
            EntityRef::Method(m) => self.compiled_methods.contains(&m),
            EntityRef::Field(_) => false,
        };
        if seen {
            MetadataCategory::DESCRIPTION | MetadataCategory::RUNTIME_MAPPING
        } else {
            MetadataCategory::empty()
        }
    }

    fn is_reflection_blocked(&self, ctx: &TypeSystemContext, entity: EntityRef) -> bool {
        self.blocked.is_blocked(ctx, entity)
    }

    fn dependencies_due_to_reflectability(
        &self,
        deps: &mut Vec<Edge>,
        factory: &NodeFactory,
        entity: EntityRef,
    ) {
        add_metadata_edges(self, deps, factory, entity);
    }

    fn has_reflection_invoke_stub_for_invokable_method(
        &self,
        ctx: &TypeSystemContext,
        m: MethodId,
    ) -> bool {
        self.metadata_category(ctx, EntityRef::Method(m))
            .contains(MetadataCategory::RUNTIME_MAPPING)
    }

    fn get_canonical_reflection_invoke_stub(
        &self,
        ctx: &TypeSystemContext,
        m: MethodId,
    ) -> Option<MethodId> {
        canonical_invoke_stub(ctx, m)
    }

    fn compute_metadata(&self, factory: &NodeFactory, marked: &[NodeId]) -> MetadataBlob {
        build_metadata_blob(factory, marked)
    }
}

/// Two-phase policy for the scanner: defers blob generation and only
/// records that an entity became reflectable, so the edges still thread
/// through the scan graph.
#[derive(Default)]
pub struct ScannerMetadataManager {
    blocked: BlockedInternalsPolicy,
    reflectable_types: RefCell<IndexSet<TypeId>>,
    reflectable_methods: RefCell<IndexSet<MethodId>>,
}

impl ScannerMetadataManager {
    pub fn new() -> Rc<Self> {
        Rc::new(ScannerMetadataManager::default())
    }

    pub fn reflectable_types(&self) -> IndexSet<TypeId> {
        self.reflectable_types.borrow().clone()
    }

    pub fn reflectable_methods(&self) -> IndexSet<MethodId> {
        self.reflectable_methods.borrow().clone()
    }
}

impl MetadataManager for ScannerMetadataManager {
    fn metadata_category(&self, ctx: &TypeSystemContext, entity: EntityRef) -> MetadataCategory {
        if self.is_reflection_blocked(ctx, entity) {
            MetadataCategory::empty()
        } else {
            MetadataCategory::DESCRIPTION | MetadataCategory::RUNTIME_MAPPING
        }
    }

    fn is_reflection_blocked(&self, ctx: &TypeSystemContext, entity: EntityRef) -> bool {
        self.blocked.is_blocked(ctx, entity)
    }

    fn dependencies_due_to_reflectability(
        &self,
        deps: &mut Vec<Edge>,
        factory: &NodeFactory,
        entity: EntityRef,
    ) {
        match entity {
            EntityRef::Type(t) => {
                if !self.is_reflection_blocked(factory.type_system(), entity) {
                    self.reflectable_types.borrow_mut().insert(t);
                }
            }
            EntityRef::Method(m) => {
                if !self.is_reflection_blocked(factory.type_system(), entity) {
                    self.reflectable_methods.borrow_mut().insert(m);
                }
            }
            EntityRef::Field(_) => {}
        }
        add_metadata_edges(self, deps, factory, entity);
    }

    fn has_reflection_invoke_stub_for_invokable_method(
        &self,
        ctx: &TypeSystemContext,
        m: MethodId,
    ) -> bool {
        !self.is_reflection_blocked(ctx, EntityRef::Method(m))
    }

    fn get_canonical_reflection_invoke_stub(
        &self,
        ctx: &TypeSystemContext,
        m: MethodId,
    ) -> Option<MethodId> {
        canonical_invoke_stub(ctx, m)
    }

    fn compute_metadata(&self, _factory: &NodeFactory, _marked: &[NodeId]) -> MetadataBlob {
        // Blob generation is deferred to the compiler pass.
        debug!("scanner metadata manager defers blob generation");
        MetadataBlob::default()
    }
}

fn add_metadata_edges(
    mgr: &dyn MetadataManager,
    deps: &mut Vec<Edge>,
    factory: &NodeFactory,
    entity: EntityRef,
) {
    let ctx = factory.type_system();
    let category = mgr.metadata_category(ctx, entity);
    if !category.contains(MetadataCategory::DESCRIPTION) {
        return;
    }
    match entity {
        EntityRef::Type(t) => {
            deps.push(Edge::new(factory.type_metadata(t), "Reflectable type"));
        }
        EntityRef::Method(m) => {
            deps.push(Edge::new(factory.method_metadata(m), "Reflectable method"));
        }
        EntityRef::Field(_) => {}
    }
}

/// Reflection invocation shares the canonical body.
fn canonical_invoke_stub(ctx: &TypeSystemContext, m: MethodId) -> Option<MethodId> {
    ctx.get_canon_method_target(m, CanonicalFormKind::Specific).ok()
}

/// A simple length-prefixed name blob; offsets index the start of each
/// entity record.
fn build_metadata_blob(factory: &NodeFactory, marked: &[NodeId]) -> MetadataBlob {
    let ctx = factory.type_system();
    let mut out = MetadataBlob::default();
    for &n in marked {
        match factory.node_key(n) {
            crate::nodes::NodeKey::TypeMetadata(t) => {
                let offset = out.blob.len() as u32;
                write_record(&mut out.blob, &ctx.type_display_name(t));
                out.type_map.insert(t, offset);
            }
            crate::nodes::NodeKey::MethodMetadata(m) => {
                let offset = out.blob.len() as u32;
                write_record(&mut out.blob, &ctx.method_display_name(m));
                out.method_map.insert(m, offset);
            }
            _ => {}
        }
    }
    out
}

fn write_record(blob: &mut Vec<u8>, name: &str) {
    let bytes = name.as_bytes();
    blob.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    blob.extend_from_slice(bytes);
}
