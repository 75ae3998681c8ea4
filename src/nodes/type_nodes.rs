//! Type descriptor nodes.
//!
//! A *necessary* type is a descriptor something referred to (casts,
//! tokens); a *constructed* type can have live instances, which is what
//! pulls in the vtable, the dispatch map, and, through conditional edges,
//! the overrides of every virtual slot somebody actually uses.

use log::warn;

use crate::graph::{CondEdge, DependencyNode, Edge};
use crate::nodes::{NodeFactory, StaticsKind};
use crate::reflection::EntityRef;
use crate::typesystem::{CanonicalFormKind, MethodId, Result, TypeId};

pub struct NecessaryTypeNode {
    pub ty: TypeId,
}

impl DependencyNode for NecessaryTypeNode {
    fn name(&self, factory: &NodeFactory) -> String {
        format!(
            "NecessaryType {}",
            factory.type_system().type_display_name(self.ty)
        )
    }

    fn static_dependencies(&self, factory: &NodeFactory) -> Vec<Edge> {
        let ctx = factory.type_system();
        let mut deps = Vec::new();
        match ctx.base_type(self.ty) {
            Ok(Some(base)) => deps.push(Edge::new(
                factory.necessary_type_symbol(base),
                "Base type",
            )),
            Ok(None) => {}
            Err(e) => warn!(
                "base of {} unavailable: {e}",
                ctx.type_display_name(self.ty)
            ),
        }
        if let Some(element) = ctx.element_type(self.ty) {
            deps.push(Edge::new(
                factory.necessary_type_symbol(element),
                "Element type",
            ));
        }
        for arg in ctx.type_instantiation(self.ty) {
            deps.push(Edge::new(
                factory.necessary_type_symbol(arg),
                "Instantiation argument",
            ));
        }
        deps
    }
}

pub struct ConstructedTypeNode {
    pub ty: TypeId,
}

impl ConstructedTypeNode {
    fn implied_dependencies(&self, factory: &NodeFactory) -> Result<Vec<Edge>> {
        let ctx = factory.type_system();
        let mut deps = Vec::new();
        if let Some(base) = ctx.base_type(self.ty)? {
            deps.push(Edge::new(
                factory.constructed_type_symbol(base),
                "Base type",
            ));
        }
        for &iface in ctx.runtime_interfaces(self.ty)?.iter() {
            deps.push(Edge::new(
                factory.constructed_type_symbol(iface),
                "Runtime interface",
            ));
        }
        if ctx.is_array(self.ty) {
            let element = ctx.array_element_type(self.ty).expect("array has element");
            deps.push(Edge::new(
                factory.necessary_type_symbol(element),
                "Element type",
            ));
        } else {
            deps.push(Edge::new(factory.vtable(self.ty), "VTable"));
        }
        let canon = ctx.convert_to_canon_form(self.ty, CanonicalFormKind::Specific)?;
        if canon != self.ty {
            deps.push(Edge::new(
                factory.canonical_type_symbol(self.ty),
                "Canonical template",
            ));
            deps.push(Edge::new(
                factory.type_dictionary(self.ty),
                "Generic dictionary",
            ));
        }
        if !ctx.is_interface(self.ty) && !ctx.runtime_interfaces(self.ty)?.is_empty() {
            deps.push(Edge::new(
                factory.interface_dispatch_map(self.ty),
                "Interface dispatch map",
            ));
        }
        Ok(deps)
    }

    /// Conditional override edges: `VirtualMethodUse(decl)` marked while
    /// this type is constructed pulls in the implementation.
    fn override_edges(&self, factory: &NodeFactory) -> Result<Vec<CondEdge>> {
        let ctx = factory.type_system();
        let mut edges = Vec::new();
        let slots = ctx.enum_all_virtual_slots(self.ty)?;
        let impls = ctx.implementation_slots(self.ty)?;
        for (decl, &target) in slots.iter().zip(impls.iter()) {
            self.push_impl_edges(factory, &mut edges, *decl, target)?;
        }
        for &iface in ctx.runtime_interfaces(self.ty)?.iter() {
            for decl in ctx.owned_methods(iface)? {
                if !ctx.method_is_virtual(decl) || ctx.method_is_static(decl) {
                    continue;
                }
                let target = match ctx
                    .resolve_variant_interface_method_to_virtual_method_on_type(decl, self.ty)?
                {
                    Some(t) => t,
                    None => continue,
                };
                self.push_impl_edges(factory, &mut edges, decl, target)?;
            }
        }
        Ok(edges)
    }

    fn push_impl_edges(
        &self,
        factory: &NodeFactory,
        edges: &mut Vec<CondEdge>,
        decl: MethodId,
        target: MethodId,
    ) -> Result<()> {
        let ctx = factory.type_system();
        if ctx.method_is_abstract(target) {
            return Ok(());
        }
        let trigger = factory.virtual_method_use(decl);
        if ctx.is_value_type(self.ty) && !ctx.method_is_static(target) {
            // Dispatch through the vtable sees a boxed `this`.
            edges.push(CondEdge::new(
                factory.unboxing_stub_entrypoint(target),
                trigger,
                "Boxed virtual override",
            ));
        } else {
            for dep in factory.direct_call_dependencies(target, "Virtual override") {
                edges.push(CondEdge::new(dep.target, trigger, dep.reason));
            }
        }
        Ok(())
    }
}

impl DependencyNode for ConstructedTypeNode {
    fn name(&self, factory: &NodeFactory) -> String {
        format!(
            "ConstructedType {}",
            factory.type_system().type_display_name(self.ty)
        )
    }

    fn static_dependencies(&self, factory: &NodeFactory) -> Vec<Edge> {
        let ctx = factory.type_system();
        let mut deps = match self.implied_dependencies(factory) {
            Ok(deps) => deps,
            Err(e) => {
                warn!(
                    "constructed type {} degraded: {e}",
                    ctx.type_display_name(self.ty)
                );
                Vec::new()
            }
        };
        factory.metadata().dependencies_due_to_reflectability(
            &mut deps,
            factory,
            EntityRef::Type(self.ty),
        );
        deps
    }

    fn has_conditional_static_dependencies(&self) -> bool {
        true
    }

    fn conditional_static_dependencies(&self, factory: &NodeFactory) -> Vec<CondEdge> {
        match self.override_edges(factory) {
            Ok(edges) => edges,
            Err(e) => {
                warn!(
                    "override edges of {} degraded: {e}",
                    factory.type_system().type_display_name(self.ty)
                );
                Vec::new()
            }
        }
    }
}

/// The canonical template descriptor shared-code instantiations point at.
pub struct CanonicalTypeNode {
    pub ty: TypeId,
}

impl DependencyNode for CanonicalTypeNode {
    fn name(&self, factory: &NodeFactory) -> String {
        format!(
            "CanonicalType {}",
            factory.type_system().type_display_name(self.ty)
        )
    }

    fn static_dependencies(&self, factory: &NodeFactory) -> Vec<Edge> {
        let ctx = factory.type_system();
        let mut deps = Vec::new();
        match ctx.base_type(self.ty) {
            Ok(Some(base)) => deps.push(Edge::new(
                factory.necessary_type_symbol(base),
                "Base type",
            )),
            Ok(None) => {}
            Err(e) => warn!(
                "base of {} unavailable: {e}",
                ctx.type_display_name(self.ty)
            ),
        }
        if !ctx.is_array(self.ty) {
            deps.push(Edge::new(factory.vtable(self.ty), "VTable"));
        }
        deps
    }
}

/// Import stub for a type descriptor outside the module group.
pub struct ExternalTypeNode {
    pub ty: TypeId,
}

impl DependencyNode for ExternalTypeNode {
    fn name(&self, factory: &NodeFactory) -> String {
        format!(
            "ExternalType {}",
            factory.type_system().type_display_name(self.ty)
        )
    }

    fn static_dependencies(&self, _factory: &NodeFactory) -> Vec<Edge> {
        Vec::new()
    }
}

/// The vtable of a type.
///
/// While scanning, the slot set accrues lazily through `VirtualMethodUse`
/// marking and the conditional override edges; the node itself implies
/// nothing. While compiling, the layout is fixed by the scan oracle and the
/// node implies the implementation of every used slot.
pub struct VTableNode {
    pub ty: TypeId,
}

impl DependencyNode for VTableNode {
    fn name(&self, factory: &NodeFactory) -> String {
        format!(
            "VTable {}",
            factory.type_system().type_display_name(self.ty)
        )
    }

    fn static_dependencies(&self, factory: &NodeFactory) -> Vec<Edge> {
        let Some(scan) = factory.scan_results() else {
            return Vec::new();
        };
        let ctx = factory.type_system();
        let Some(layout) = scan.vtable_layouts().layout_for(self.ty) else {
            // Outside the scanned local scope: lazy layout.
            return Vec::new();
        };
        let mut deps = Vec::new();
        for &decl in layout {
            let resolved: Result<()> = (|| {
                let Some(target) = ctx.find_virtual_function_target(decl, self.ty)? else {
                    return Ok(());
                };
                if ctx.method_is_abstract(target) {
                    return Ok(());
                }
                if ctx.is_value_type(self.ty) && !ctx.method_is_static(target) {
                    deps.push(Edge::new(
                        factory.unboxing_stub_entrypoint(target),
                        "VTable slot",
                    ));
                } else {
                    deps.extend(factory.direct_call_dependencies(target, "VTable slot"));
                }
                Ok(())
            })();
            if let Err(e) = resolved {
                warn!(
                    "vtable slot of {} dropped: {e}",
                    ctx.type_display_name(self.ty)
                );
            }
        }
        deps
    }
}

/// Interface dispatch map: interface method to implementation slot, per
/// constructed type.
pub struct InterfaceDispatchMapNode {
    pub ty: TypeId,
}

impl DependencyNode for InterfaceDispatchMapNode {
    fn name(&self, factory: &NodeFactory) -> String {
        format!(
            "InterfaceDispatchMap {}",
            factory.type_system().type_display_name(self.ty)
        )
    }

    fn static_dependencies(&self, factory: &NodeFactory) -> Vec<Edge> {
        let ctx = factory.type_system();
        match ctx.runtime_interfaces(self.ty) {
            Ok(interfaces) => interfaces
                .iter()
                .map(|&i| Edge::new(factory.necessary_type_symbol(i), "Implemented interface"))
                .collect(),
            Err(e) => {
                warn!(
                    "dispatch map of {} degraded: {e}",
                    ctx.type_display_name(self.ty)
                );
                Vec::new()
            }
        }
    }
}

/// Static base storage for a type.
pub struct StaticsNode {
    pub ty: TypeId,
    pub kind: StaticsKind,
}

impl DependencyNode for StaticsNode {
    fn name(&self, factory: &NodeFactory) -> String {
        let kind = match self.kind {
            StaticsKind::Gc => "GcStatics",
            StaticsKind::NonGc => "NonGcStatics",
            StaticsKind::Thread => "ThreadStatics",
        };
        format!(
            "{kind} {}",
            factory.type_system().type_display_name(self.ty)
        )
    }

    fn static_dependencies(&self, factory: &NodeFactory) -> Vec<Edge> {
        vec![Edge::new(
            factory.necessary_type_symbol(self.ty),
            "Statics owner",
        )]
    }
}
