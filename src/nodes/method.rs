//! Method nodes.
//!
//! The scanner represents a local method with a lightweight node that walks
//! the body for references; the compiler's node runs the codegen backend
//! and caches its output. A concrete instantiation of shared code is a
//! shadow node pointing at the canonical body plus its dictionary.

use std::cell::RefCell;

use log::{info, warn};

use crate::codegen::{CodegenError, CompiledMethodBody};
use crate::graph::{DependencyNode, Edge, NodeId};
use crate::ilimport;
use crate::nodes::NodeFactory;
use crate::reflection::EntityRef;
use crate::typesystem::{CanonicalFormKind, MethodId};

/// Scan-mode method body: dependencies from the lightweight body importer.
pub struct ScannedMethodNode {
    pub method: MethodId,
}

impl DependencyNode for ScannedMethodNode {
    fn name(&self, factory: &NodeFactory) -> String {
        format!(
            "ScannedMethod {}",
            factory.type_system().method_display_name(self.method)
        )
    }

    fn static_dependencies(&self, factory: &NodeFactory) -> Vec<Edge> {
        let ctx = factory.type_system();
        let mut deps = vec![Edge::new(
            factory.necessary_type_symbol(ctx.method_owner(self.method)),
            "Owning type",
        )];
        match ilimport::analyze_body(self.method, factory) {
            Ok(mut body_deps) => deps.append(&mut body_deps),
            Err(e) => {
                // The method degrades to a throwing stub with no outgoing
                // edges; marking continues.
                warn!(
                    "method {} replaced with throwing stub: {e}",
                    ctx.method_display_name(self.method)
                );
                deps.clear();
                return deps;
            }
        }
        factory.metadata().dependencies_due_to_reflectability(
            &mut deps,
            factory,
            EntityRef::Method(self.method),
        );
        deps
    }
}

/// Compile-mode method body: dependency computation runs the codegen
/// backend and caches code, relocs, frame info and GC info on the node.
pub struct MethodCodeNode {
    pub method: MethodId,
    body: RefCell<Option<CompiledMethodBody>>,
}

impl MethodCodeNode {
    pub fn new(method: MethodId) -> Self {
        MethodCodeNode {
            method,
            body: RefCell::new(None),
        }
    }
}

impl DependencyNode for MethodCodeNode {
    fn name(&self, factory: &NodeFactory) -> String {
        format!(
            "MethodCode {}",
            factory.type_system().method_display_name(self.method)
        )
    }

    fn static_dependencies_are_computed(&self) -> bool {
        self.body.borrow().is_some()
    }

    fn static_dependencies(&self, factory: &NodeFactory) -> Vec<Edge> {
        let ctx = factory.type_system();
        let options = factory.options();
        let mut deps = vec![Edge::new(
            factory.necessary_type_symbol(ctx.method_owner(self.method)),
            "Owning type",
        )];
        factory.metadata().dependencies_due_to_reflectability(
            &mut deps,
            factory,
            EntityRef::Method(self.method),
        );

        let is_generic = ctx.method_has_instantiation(self.method)
            || !ctx.type_instantiation(ctx.method_owner(self.method)).is_empty()
            || ctx.is_generic_definition(ctx.method_owner(self.method));
        let gated = (options.no_generic_code && is_generic)
            || (options.only_canonical_code
                && is_generic
                && !ctx.method_is_canonical(self.method, CanonicalFormKind::Specific));
        if gated {
            self.store_body(factory, CompiledMethodBody::empty());
            return deps;
        }

        if options.verbose {
            info!("compiling {}", ctx.method_display_name(self.method));
        }
        match factory.backend().compile_method(self.method, factory) {
            Ok((body, mut body_deps)) => {
                deps.append(&mut body_deps);
                self.store_body(factory, body);
            }
            Err(CodegenError::RequiresRuntimeJit(why)) => {
                warn!(
                    "method {} left for runtime JIT: {why}",
                    ctx.method_display_name(self.method)
                );
                self.store_body(factory, CompiledMethodBody::empty());
            }
            Err(CodegenError::TypeSystem(e)) => {
                warn!(
                    "method {} replaced with throwing stub: {e}",
                    ctx.method_display_name(self.method)
                );
                self.store_body(factory, CompiledMethodBody::empty());
                deps.clear();
            }
        }
        deps
    }
}

impl MethodCodeNode {
    fn store_body(&self, factory: &NodeFactory, body: CompiledMethodBody) {
        factory.record_compiled_body(self.method, body.clone());
        *self.body.borrow_mut() = Some(body);
    }

    pub fn compiled_body(&self) -> Option<CompiledMethodBody> {
        self.body.borrow().clone()
    }
}

/// Import stub for a method compiled outside the module group.
pub struct ExternMethodSymbolNode {
    pub method: MethodId,
}

impl DependencyNode for ExternMethodSymbolNode {
    fn name(&self, factory: &NodeFactory) -> String {
        format!(
            "ExternMethod {}",
            factory.type_system().method_display_name(self.method)
        )
    }

    fn static_dependencies(&self, _factory: &NodeFactory) -> Vec<Edge> {
        Vec::new()
    }
}

/// One concrete instantiation of shared code: owns no body, tracks the
/// canonical entrypoint and the dictionary this instantiation requires.
pub struct ShadowConcreteMethodNode {
    pub method: MethodId,
}

impl DependencyNode for ShadowConcreteMethodNode {
    fn name(&self, factory: &NodeFactory) -> String {
        format!(
            "ShadowConcreteMethod {}",
            factory.type_system().method_display_name(self.method)
        )
    }

    fn static_dependencies(&self, factory: &NodeFactory) -> Vec<Edge> {
        let ctx = factory.type_system();
        let canon = factory.canonical_method(self.method);
        let mut deps = vec![Edge::new(
            factory.method_entrypoint(canon),
            "Canonical body",
        )];
        if ctx.method_has_instantiation(self.method) {
            deps.push(Edge::new(
                factory.method_dictionary(self.method),
                "Generic dictionary",
            ));
        } else {
            let owner = ctx.method_owner(self.method);
            if !ctx.type_instantiation(owner).is_empty() {
                deps.push(Edge::new(
                    factory.type_dictionary(owner),
                    "Generic dictionary",
                ));
            }
        }
        deps
    }
}

/// Unboxing stub for a concrete value-type instance method: unwraps the
/// boxed `this` and tail-calls the real body.
pub struct UnboxingStubNode {
    pub target: MethodId,
}

impl DependencyNode for UnboxingStubNode {
    fn name(&self, factory: &NodeFactory) -> String {
        format!(
            "UnboxingStub {}",
            factory.type_system().method_display_name(self.target)
        )
    }

    fn static_dependencies(&self, factory: &NodeFactory) -> Vec<Edge> {
        factory.direct_call_dependencies(self.target, "Unboxed body")
    }
}

/// Unboxing thunk for canonical instance methods: besides unboxing, it
/// materialises the hidden generic context argument from the object's type
/// descriptor.
pub struct InstantiatingUnboxingThunkNode {
    pub target: MethodId,
}

impl DependencyNode for InstantiatingUnboxingThunkNode {
    fn name(&self, factory: &NodeFactory) -> String {
        format!(
            "InstantiatingUnboxingThunk {}",
            factory.type_system().method_display_name(self.target)
        )
    }

    fn static_dependencies(&self, factory: &NodeFactory) -> Vec<Edge> {
        let ctx = factory.type_system();
        let canon = factory.canonical_method(self.target);
        let mut deps = vec![Edge::new(
            factory.method_entrypoint(canon),
            "Unboxed body",
        )];
        let owner = ctx.method_owner(self.target);
        deps.push(Edge::new(
            factory.necessary_type_symbol(owner),
            "Instantiation argument",
        ));
        deps
    }
}

/// A live use of a virtual slot. Serves as the trigger of the conditional
/// edges constructed types declare for their overrides.
pub struct VirtualMethodUseNode {
    pub decl: MethodId,
}

impl DependencyNode for VirtualMethodUseNode {
    fn name(&self, factory: &NodeFactory) -> String {
        format!(
            "VirtualMethodUse {}",
            factory.type_system().method_display_name(self.decl)
        )
    }

    fn static_dependencies(&self, factory: &NodeFactory) -> Vec<Edge> {
        let ctx = factory.type_system();
        let owner = ctx.method_owner(self.decl);
        if ctx.has_generic_variables(owner) {
            Vec::new()
        } else {
            vec![Edge::new(
                factory.necessary_type_symbol(owner),
                "Slot owner",
            )]
        }
    }
}

/// A live use of a generic virtual method. The override set depends on
/// which types get constructed, which only grows as marking proceeds, so
/// targets are produced dynamically against the marked view.
pub struct GenericVirtualMethodUseNode {
    pub decl: MethodId,
}

impl DependencyNode for GenericVirtualMethodUseNode {
    fn name(&self, factory: &NodeFactory) -> String {
        format!(
            "GenericVirtualMethodUse {}",
            factory.type_system().method_display_name(self.decl)
        )
    }

    fn static_dependencies(&self, _factory: &NodeFactory) -> Vec<Edge> {
        Vec::new()
    }

    fn has_dynamic_dependencies(&self) -> bool {
        true
    }

    fn search_dynamic_dependencies(
        &self,
        marked: &[NodeId],
        first_new_index: usize,
        factory: &NodeFactory,
    ) -> Vec<Edge> {
        let ctx = factory.type_system();
        let decl_owner = ctx.method_owner(self.decl);
        let mut deps = Vec::new();
        for &n in &marked[first_new_index..] {
            let crate::nodes::NodeKey::ConstructedType(t) = factory.node_key(n) else {
                continue;
            };
            if ctx.is_interface(t) || ctx.is_abstract(t) {
                continue;
            }
            let resolved = if ctx.is_interface(decl_owner) {
                ctx.resolve_variant_interface_method_to_virtual_method_on_type(self.decl, t)
            } else {
                ctx.find_virtual_function_target(self.decl, t)
            };
            match resolved {
                Ok(Some(target)) if !ctx.method_is_abstract(target) => {
                    deps.extend(
                        factory.direct_call_dependencies(target, "Generic virtual dispatch"),
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        "generic virtual dispatch of {} on {} skipped: {e}",
                        ctx.method_display_name(self.decl),
                        ctx.type_display_name(t)
                    );
                }
            }
        }
        deps
    }
}
