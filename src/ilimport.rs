//! The body importer: turns method bodies into dependency edges.
//!
//! This is the dependency source both passes share. The scanner consumes
//! the flattened edge list; the reference backend consumes the per-op lists
//! so it can attach relocations to the opcodes it emits.
//!
//! A body executing as shared (canonical) code cannot name the concrete
//! types it runs over, so every reference that still mentions a generic
//! variable in its open form is additionally recorded as a dictionary entry
//! of the body's canonical context.

use crate::graph::Edge;
use crate::il::{FieldRef, IlOp, MethodRef, SigType, TokenRef};
use crate::nodes::{
    DictionaryEntry, DictionaryOwner, FactoryMode, HelperId, HelperTarget, NodeFactory,
};
use crate::reflection::EntityRef;
use crate::typesystem::intrinsics::{
    self, INTRINSIC_NAMESPACE, IntrinsicIsa,
};
use crate::typesystem::{
    CanonicalFormKind, GenericContext, MethodId, ModuleId, Result, TypeId, TypeSystemError,
};

/// The raw operation list of a method body. Absent bodies are empty unless
/// the method claims an internal-call implementation outside the system
/// module, which the format forbids.
pub fn method_body_ops(
    ctx: &crate::typesystem::TypeSystemContext,
    m: MethodId,
) -> Result<Vec<IlOp>> {
    let (module_def, tdi, mi) = ctx.method_def_record(m);
    let record = &module_def.types[tdi as usize].methods[mi as usize];
    match &record.body {
        Some(body) => Ok(body.ops.clone()),
        None => {
            if record.is_internal_call && !ctx.is_system_module(ctx.method_module(m)) {
                Err(TypeSystemError::InvalidProgram(format!(
                    "internal call '{}' outside the system module",
                    ctx.method_display_name(m)
                )))
            } else {
                Ok(Vec::new())
            }
        }
    }
}

/// Flattened dependency edges of a body.
pub fn analyze_body(m: MethodId, factory: &NodeFactory) -> Result<Vec<Edge>> {
    Ok(analyze_ops(m, factory)?.into_iter().flatten().collect())
}

/// Per-op dependency edges, parallel to `method_body_ops`.
pub fn analyze_ops(m: MethodId, factory: &NodeFactory) -> Result<Vec<Vec<Edge>>> {
    let importer = BodyImporter::new(m, factory)?;
    importer.run()
}

struct BodyImporter<'f> {
    factory: &'f NodeFactory,
    module: ModuleId,
    ops: Vec<IlOp>,
    type_args: Vec<TypeId>,
    method_args: Vec<TypeId>,
    /// Canonical context to record runtime-determined lookups against;
    /// absent when the body is not shared code.
    dict_owner: Option<DictionaryOwner>,
}

impl<'f> BodyImporter<'f> {
    fn new(m: MethodId, factory: &'f NodeFactory) -> Result<Self> {
        let ctx = factory.type_system();
        let ops = method_body_ops(ctx, m)?;
        let (type_args, method_args) = ctx.method_generic_context(m);
        let shared = ctx.method_is_canonical(m, CanonicalFormKind::Specific);
        let dict_owner = if !shared {
            None
        } else if ctx.method_has_instantiation(m) {
            Some(DictionaryOwner::Method(factory.canonical_method(m)))
        } else {
            let owner = ctx.method_owner(m);
            let canon_owner = ctx
                .convert_to_canon_form(owner, CanonicalFormKind::Specific)
                .unwrap_or(owner);
            Some(DictionaryOwner::Type(canon_owner))
        };
        Ok(BodyImporter {
            factory,
            module: ctx.method_module(m),
            ops,
            type_args,
            method_args,
            dict_owner,
        })
    }

    fn ctx(&self) -> &crate::typesystem::TypeSystemContext {
        self.factory.type_system()
    }

    fn gctx(&self) -> GenericContext<'_> {
        GenericContext::new(&self.type_args, &self.method_args)
    }

    fn run(self) -> Result<Vec<Vec<Edge>>> {
        let mut per_op = Vec::with_capacity(self.ops.len());
        for i in 0..self.ops.len() {
            let mut edges = Vec::new();
            self.import_op(i, &mut edges)?;
            per_op.push(edges);
        }
        Ok(per_op)
    }

    fn import_op(&self, index: usize, edges: &mut Vec<Edge>) -> Result<()> {
        let op = &self.ops[index];
        match op {
            IlOp::Call { method } => self.import_call(method, false, edges),
            IlOp::CallVirt { method } => self.import_call(method, true, edges),
            IlOp::NewObj { ctor } => self.import_newobj(index, ctor, edges),
            IlOp::NewArr { element } => {
                let ctx = self.ctx();
                let el = ctx.resolve_sig_type(element, self.module, &self.gctx())?;
                let array = ctx.make_array_type(el);
                edges.push(Edge::new(
                    self.factory
                        .ready_to_run_helper(HelperId::NewArray, HelperTarget::Type(array)),
                    "Array allocation",
                ));
                self.record_type_entry(element)?;
                Ok(())
            }
            IlOp::Box { ty } => {
                let t = self.ctx().resolve_sig_type(ty, self.module, &self.gctx())?;
                edges.push(Edge::new(
                    self.factory.constructed_type_symbol(t),
                    "Boxing",
                ));
                self.record_type_entry(ty)?;
                Ok(())
            }
            IlOp::Unbox { ty } => {
                let t = self.ctx().resolve_sig_type(ty, self.module, &self.gctx())?;
                edges.push(Edge::new(
                    self.factory.necessary_type_symbol(t),
                    "Unboxing",
                ));
                Ok(())
            }
            IlOp::CastClass { ty } => self.import_cast(HelperId::CastClass, ty, edges),
            IlOp::IsInst { ty } => self.import_cast(HelperId::IsInstanceOf, ty, edges),
            IlOp::LdStr { value } => {
                edges.push(Edge::new(
                    self.factory.string_literal(value),
                    "String literal",
                ));
                Ok(())
            }
            IlOp::LdSFld { field } | IlOp::StSFld { field } => {
                self.import_static_field(field, edges)
            }
            IlOp::LdFld { field } => {
                let f = self
                    .ctx()
                    .resolve_field_ref(field, self.module, &self.gctx())?;
                edges.push(Edge::new(
                    self.factory
                        .necessary_type_symbol(self.ctx().field_owner(f)),
                    "Field access",
                ));
                Ok(())
            }
            IlOp::LdToken { token } => self.import_token(token, edges),
            IlOp::LdFtn { method } => {
                if self.delegate_ctor_follows(index) {
                    return Ok(());
                }
                let target = self
                    .ctx()
                    .resolve_method_ref(method, self.module, &self.gctx())?;
                edges.extend(
                    self.factory
                        .direct_call_dependencies(target, "Function pointer"),
                );
                self.record_method_entry(method, DictionaryEntry::MethodEntry)?;
                Ok(())
            }
            IlOp::LdVirtFtn { method } => {
                if self.delegate_ctor_follows(index) {
                    return Ok(());
                }
                let target = self
                    .ctx()
                    .resolve_method_ref(method, self.module, &self.gctx())?;
                let decl = self.ctx().find_slot_defining_method(target)?;
                edges.push(Edge::new(
                    self.factory
                        .ready_to_run_helper(HelperId::VirtualCall, HelperTarget::Method(decl)),
                    "Virtual function pointer",
                ));
                Ok(())
            }
            IlOp::Throw => Ok(()),
        }
    }

    fn import_call(
        &self,
        mr: &MethodRef,
        virtual_call: bool,
        edges: &mut Vec<Edge>,
    ) -> Result<()> {
        let ctx = self.ctx();
        let target = ctx.resolve_method_ref(mr, self.module, &self.gctx())?;
        let dispatchable = virtual_call
            && ctx.method_is_virtual(target)
            && !ctx.method_is_final(target)
            && !ctx.is_sealed_type(ctx.method_owner(target));
        if !dispatchable {
            return self.import_direct_call(target, mr, edges);
        }
        let decl = ctx.find_slot_defining_method(target)?;
        if ctx.method_has_instantiation(decl) {
            edges.push(Edge::new(
                self.factory.generic_virtual_method_use(decl),
                "Generic virtual call",
            ));
            return Ok(());
        }
        // While compiling, a receiver type nothing ever derived from lets
        // the call go direct, as long as the scanner compiled the target.
        if self.factory.mode() == FactoryMode::Compiling {
            let receiver = ctx.method_owner(target);
            if let Some(scan) = self.factory.scan_results() {
                if !ctx.is_interface(receiver)
                    && scan.devirtualization().is_effectively_sealed(ctx, receiver)
                {
                    if let Some(devirt) = ctx.find_virtual_function_target(decl, receiver)? {
                        if !ctx.method_is_abstract(devirt)
                            && scan.is_method_compiled(self.factory.canonical_method(devirt))
                        {
                            return self.import_direct_call(devirt, mr, edges);
                        }
                    }
                }
            }
        }
        edges.push(Edge::new(
            self.factory.virtual_method_use(decl),
            "Virtual call",
        ));
        Ok(())
    }

    fn import_direct_call(
        &self,
        target: MethodId,
        mr: &MethodRef,
        edges: &mut Vec<Edge>,
    ) -> Result<()> {
        if self.intrinsic_support_folds(target) {
            return Ok(());
        }
        edges.extend(self.factory.direct_call_dependencies(target, "Call"));
        self.record_method_entry(mr, DictionaryEntry::MethodEntry)?;
        Ok(())
    }

    /// `IsSupported` on an ISA class with a known support level folds to a
    /// constant; runtime-checked ISAs keep the call.
    fn intrinsic_support_folds(&self, target: MethodId) -> bool {
        let ctx = self.ctx();
        if ctx.method_name(target) != "get_IsSupported" {
            return false;
        }
        let owner = ctx.type_definition(ctx.method_owner(target));
        let Some((module_def, def_index)) = ctx.type_def_record(owner) else {
            return false;
        };
        let record = &module_def.types[def_index as usize];
        if record.namespace != INTRINSIC_NAMESPACE {
            return false;
        }
        match IntrinsicIsa::from_type_name(&record.name) {
            Some(isa) => intrinsics::has_known_support_level_at_compile_time(isa),
            None => false,
        }
    }

    fn import_newobj(&self, index: usize, ctor: &MethodRef, edges: &mut Vec<Edge>) -> Result<()> {
        let ctx = self.ctx();
        let ctor_m = ctx.resolve_method_ref(ctor, self.module, &self.gctx())?;
        let owner = ctx.method_owner(ctor_m);
        if ctx.is_delegate(owner) {
            if let Some((target_ref, virtual_dispatch)) = self.preceding_ftn(index) {
                let target =
                    ctx.resolve_method_ref(target_ref, self.module, &self.gctx())?;
                let target = if virtual_dispatch {
                    ctx.find_slot_defining_method(target)?
                } else {
                    target
                };
                edges.push(Edge::new(
                    self.factory.ready_to_run_helper(
                        HelperId::DelegateCtor,
                        HelperTarget::Delegate {
                            delegate_type: owner,
                            target,
                            virtual_dispatch,
                        },
                    ),
                    "Delegate creation",
                ));
                self.record_type_entry(&ctor.owner)?;
                return Ok(());
            }
        }
        edges.push(Edge::new(
            self.factory
                .ready_to_run_helper(HelperId::NewObject, HelperTarget::Type(owner)),
            "Object allocation",
        ));
        edges.extend(self.factory.direct_call_dependencies(ctor_m, "Constructor"));
        self.record_type_entry(&ctor.owner)?;
        Ok(())
    }

    fn import_cast(&self, helper: HelperId, ty: &SigType, edges: &mut Vec<Edge>) -> Result<()> {
        let t = self.ctx().resolve_sig_type(ty, self.module, &self.gctx())?;
        edges.push(Edge::new(
            self.factory.ready_to_run_helper(helper, HelperTarget::Type(t)),
            "Cast",
        ));
        self.record_type_entry(ty)?;
        Ok(())
    }

    fn import_static_field(&self, fr: &FieldRef, edges: &mut Vec<Edge>) -> Result<()> {
        let ctx = self.ctx();
        let field = ctx.resolve_field_ref(fr, self.module, &self.gctx())?;
        if ctx.field_is_literal(field) {
            return Ok(());
        }
        if ctx.field_rva(field).is_some() {
            // Validates size against the section block up front.
            let data = ctx.read_field_rva_data(field)?;
            edges.push(Edge::new(
                self.factory.field_rva_data(field, data),
                "RVA field data",
            ));
            return Ok(());
        }
        let owner = ctx.field_owner(field);
        let helper = if ctx.field_is_thread_static(field) {
            HelperId::GetThreadStaticBase
        } else if ctx.contains_gc_pointers(ctx.field_type(field)?)? {
            HelperId::GetGcStaticBase
        } else {
            HelperId::GetNonGcStaticBase
        };
        edges.push(Edge::new(
            self.factory
                .ready_to_run_helper(helper, HelperTarget::Type(owner)),
            "Static field access",
        ));
        self.record_type_entry(&fr.owner)?;
        Ok(())
    }

    fn import_token(&self, token: &TokenRef, edges: &mut Vec<Edge>) -> Result<()> {
        let ctx = self.ctx();
        match token {
            TokenRef::Type(ty) => {
                let t = ctx.resolve_sig_type(ty, self.module, &self.gctx())?;
                edges.push(Edge::new(
                    self.factory
                        .ready_to_run_helper(HelperId::TypeHandle, HelperTarget::Type(t)),
                    "Type token",
                ));
                self.factory.metadata().dependencies_due_to_reflectability(
                    edges,
                    self.factory,
                    EntityRef::Type(t),
                );
                self.record_type_entry(ty)?;
            }
            TokenRef::Method(mr) => {
                let m = ctx.resolve_method_ref(mr, self.module, &self.gctx())?;
                edges.push(Edge::new(
                    self.factory
                        .ready_to_run_helper(HelperId::MethodHandle, HelperTarget::Method(m)),
                    "Method token",
                ));
                self.record_method_entry(mr, DictionaryEntry::MethodHandle)?;
            }
            TokenRef::Field(fr) => {
                let f = ctx.resolve_field_ref(fr, self.module, &self.gctx())?;
                edges.push(Edge::new(
                    self.factory
                        .ready_to_run_helper(HelperId::FieldHandle, HelperTarget::Field(f)),
                    "Field token",
                ));
            }
        }
        Ok(())
    }

    // ---- delegate creation peephole ----

    fn delegate_ctor_follows(&self, index: usize) -> bool {
        match self.ops.get(index + 1) {
            Some(IlOp::NewObj { ctor }) => {
                let ctx = self.ctx();
                match ctx.resolve_sig_type(&ctor.owner, self.module, &self.gctx()) {
                    Ok(owner) => ctx.is_delegate(owner),
                    Err(_) => false,
                }
            }
            _ => false,
        }
    }

    fn preceding_ftn(&self, index: usize) -> Option<(&MethodRef, bool)> {
        if index == 0 {
            return None;
        }
        match &self.ops[index - 1] {
            IlOp::LdFtn { method } => Some((method, false)),
            IlOp::LdVirtFtn { method } => Some((method, true)),
            _ => None,
        }
    }

    // ---- runtime-determined lookups ----

    /// Records a type reference that shared code must look up through its
    /// dictionary.
    fn record_type_entry(&self, sig: &SigType) -> Result<()> {
        let Some(owner) = self.dict_owner else {
            return Ok(());
        };
        let ctx = self.ctx();
        let open = ctx.resolve_sig_type(sig, self.module, &GenericContext::empty())?;
        if ctx.has_generic_variables(open) {
            self.factory
                .record_dictionary_entry(owner, DictionaryEntry::TypeHandle(open));
        }
        Ok(())
    }

    fn record_method_entry(
        &self,
        mr: &MethodRef,
        entry: fn(MethodId) -> DictionaryEntry,
    ) -> Result<()> {
        let Some(owner) = self.dict_owner else {
            return Ok(());
        };
        let ctx = self.ctx();
        let open = ctx.resolve_method_ref(mr, self.module, &GenericContext::empty())?;
        let open_owner = ctx.method_owner(open);
        let var_dependent = ctx.has_generic_variables(open_owner)
            || ctx
                .method_instantiation(open)
                .iter()
                .any(|&a| ctx.has_generic_variables(a));
        if var_dependent {
            self.factory.record_dictionary_entry(owner, entry(open));
        }
        Ok(())
    }
}
