//! The scanner pass.
//!
//! Runs the dependency graph once with the lightweight body importer to
//! discover a conservative closure of the program, and distils the marked
//! set into the four oracles the compiler pass consumes: vtable layouts,
//! dictionary layouts, devirtualisation facts, and the inlining policy.

use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};
use log::{debug, info, warn};

use crate::config::CompilerOptions;
use crate::graph::DependencyGraph;
use crate::modulegroup::ModuleGroup;
use crate::nodes::{DictionaryEntry, DictionaryOwner, NodeFactory, NodeKey};
use crate::reflection::{EntityRef, MetadataManager, ScannerMetadataManager};
use crate::roots::{RootProvider, RootingService};
use crate::typesystem::{MethodId, TypeId, TypeSystemContext};

/// Exact used-slot lists for live local types. Types outside the scanned
/// scope get lazy layouts (no entry).
#[derive(Default)]
pub struct VTableLayoutInfo {
    per_type: IndexMap<TypeId, Vec<MethodId>>,
}

impl VTableLayoutInfo {
    pub fn layout_for(&self, ty: TypeId) -> Option<&[MethodId]> {
        self.per_type.get(&ty).map(|v| v.as_slice())
    }

    pub fn types(&self) -> impl Iterator<Item = TypeId> + '_ {
        self.per_type.keys().copied()
    }
}

/// Types that were the base of something constructed cannot be treated as
/// sealed; everything else effectively is.
#[derive(Default)]
pub struct DevirtualizationInfo {
    unsealed: IndexSet<TypeId>,
}

impl DevirtualizationInfo {
    pub fn is_effectively_sealed(&self, ctx: &TypeSystemContext, ty: TypeId) -> bool {
        !ctx.is_abstract(ty) && !ctx.is_interface(ty) && !self.unsealed.contains(&ty)
    }

    pub fn is_unsealed(&self, ty: TypeId) -> bool {
        self.unsealed.contains(&ty)
    }
}

/// A call is inlineable iff the callee versions with the compilation and
/// its owning type was constructed, or the callee is static, or the owner
/// is a value type.
pub struct InliningPolicy {
    constructed: IndexSet<TypeId>,
}

impl InliningPolicy {
    pub fn can_inline(
        &self,
        ctx: &TypeSystemContext,
        group: &dyn ModuleGroup,
        _caller: MethodId,
        callee: MethodId,
    ) -> bool {
        if !group.versions_with_method_body(ctx, callee) {
            return false;
        }
        let owner = ctx.method_owner(callee);
        ctx.method_is_static(callee) || ctx.is_value_type(owner) || self.constructed.contains(&owner)
    }
}

/// Immutable snapshot of everything the scan learned. The only bridge
/// between the two passes.
pub struct ScanResults {
    compiled_methods: IndexSet<MethodId>,
    methods_with_metadata: IndexSet<MethodId>,
    invokable_methods: IndexSet<MethodId>,
    types_with_metadata: IndexSet<TypeId>,
    invokable_types: IndexSet<TypeId>,
    constructed_types: IndexSet<TypeId>,
    live_keys: IndexSet<NodeKey>,
    vtable_layouts: VTableLayoutInfo,
    dictionary_layouts: IndexMap<DictionaryOwner, Vec<DictionaryEntry>>,
    devirtualization: DevirtualizationInfo,
    inlining: InliningPolicy,
}

impl ScanResults {
    pub fn compiled_methods(&self) -> &IndexSet<MethodId> {
        &self.compiled_methods
    }

    pub fn methods_with_metadata(&self) -> &IndexSet<MethodId> {
        &self.methods_with_metadata
    }

    pub fn invokable_methods(&self) -> &IndexSet<MethodId> {
        &self.invokable_methods
    }

    pub fn types_with_metadata(&self) -> &IndexSet<TypeId> {
        &self.types_with_metadata
    }

    pub fn invokable_types(&self) -> &IndexSet<TypeId> {
        &self.invokable_types
    }

    pub fn constructed_types(&self) -> &IndexSet<TypeId> {
        &self.constructed_types
    }

    pub fn is_method_compiled(&self, m: MethodId) -> bool {
        self.compiled_methods.contains(&m)
    }

    pub fn is_type_constructed(&self, ty: TypeId) -> bool {
        self.constructed_types.contains(&ty)
    }

    pub fn is_key_live(&self, key: &NodeKey) -> bool {
        self.live_keys.contains(key)
    }

    pub fn vtable_layouts(&self) -> &VTableLayoutInfo {
        &self.vtable_layouts
    }

    pub fn dictionary_layouts(&self) -> &IndexMap<DictionaryOwner, Vec<DictionaryEntry>> {
        &self.dictionary_layouts
    }

    pub fn devirtualization(&self) -> &DevirtualizationInfo {
        &self.devirtualization
    }

    pub fn inlining(&self) -> &InliningPolicy {
        &self.inlining
    }

    fn build(
        graph: &DependencyGraph<'_>,
        factory: &NodeFactory,
        metadata: &ScannerMetadataManager,
    ) -> ScanResults {
        let ctx = factory.type_system();
        let mut compiled_methods = IndexSet::new();
        let mut constructed_types = IndexSet::new();
        let mut vtable_types = Vec::new();
        let mut types_with_metadata = IndexSet::new();
        let mut methods_with_metadata = IndexSet::new();
        let mut live_keys = IndexSet::new();

        for &n in graph.marked_nodes() {
            let key = factory.node_key(n);
            match &key {
                NodeKey::MethodEntrypoint {
                    method,
                    unboxing: false,
                } => {
                    compiled_methods.insert(*method);
                }
                NodeKey::ConstructedType(t) => {
                    constructed_types.insert(*t);
                }
                NodeKey::VTable(t) => vtable_types.push(*t),
                NodeKey::TypeMetadata(t) => {
                    types_with_metadata.insert(*t);
                }
                NodeKey::MethodMetadata(m) => {
                    methods_with_metadata.insert(*m);
                }
                _ => {}
            }
            if matches!(
                key,
                NodeKey::MethodEntrypoint { .. }
                    | NodeKey::ShadowConcreteMethod(_)
                    | NodeKey::ConstructedType(_)
                    | NodeKey::VTable(_)
            ) {
                live_keys.insert(key);
            }
        }

        let mut unsealed = IndexSet::new();
        for &t in &constructed_types {
            let mut cur = match ctx.base_type(t) {
                Ok(b) => b,
                Err(_) => None,
            };
            while let Some(base) = cur {
                unsealed.insert(base);
                cur = ctx.base_type(base).unwrap_or(None);
            }
            if let Ok(interfaces) = ctx.runtime_interfaces(t) {
                for &i in interfaces.iter() {
                    unsealed.insert(i);
                }
            }
        }

        let mut vtable_layouts = VTableLayoutInfo::default();
        for t in vtable_types {
            if !factory.module_group().contains_type(ctx, t) {
                continue;
            }
            let slots = match ctx.enum_all_virtual_slots(t) {
                Ok(s) => s,
                Err(e) => {
                    warn!("vtable layout of {} skipped: {e}", ctx.type_display_name(t));
                    continue;
                }
            };
            let used: Vec<MethodId> = slots
                .into_iter()
                .filter(|&s| {
                    factory
                        .lookup(&NodeKey::VirtualMethodUse(s))
                        .is_some_and(|n| graph.is_marked(n))
                })
                .collect();
            vtable_layouts.per_type.insert(t, used);
        }

        let reflectable_methods = metadata.reflectable_methods();
        let invokable_methods: IndexSet<MethodId> = compiled_methods
            .iter()
            .copied()
            .filter(|m| reflectable_methods.contains(m))
            .collect();
        let invokable_types: IndexSet<TypeId> = constructed_types
            .iter()
            .copied()
            .filter(|&t| !metadata.is_reflection_blocked(ctx, EntityRef::Type(t)))
            .collect();

        ScanResults {
            compiled_methods,
            methods_with_metadata,
            invokable_methods,
            types_with_metadata,
            invokable_types,
            inlining: InliningPolicy {
                constructed: constructed_types.clone(),
            },
            constructed_types,
            live_keys,
            vtable_layouts,
            dictionary_layouts: factory.export_dictionary_layouts(),
            devirtualization: DevirtualizationInfo { unsealed },
        }
    }
}

pub struct Scanner;

impl Scanner {
    /// Marks the scan graph to fixed point and snapshots the results.
    pub fn scan(
        ctx: Rc<TypeSystemContext>,
        group: Rc<dyn ModuleGroup>,
        options: &CompilerOptions,
        providers: &[Rc<dyn RootProvider>],
    ) -> ScanResults {
        info!("scanning for the conservative program closure");
        let metadata = ScannerMetadataManager::new();
        let factory = NodeFactory::for_scanning(
            ctx,
            group,
            options.clone(),
            Rc::clone(&metadata) as Rc<dyn crate::reflection::MetadataManager>,
        );
        let mut graph = DependencyGraph::new(&factory, options.dependency_tracking);
        {
            let mut rooting = RootingService::new(&mut graph, &factory);
            for provider in providers {
                provider.add_compilation_roots(&mut rooting);
            }
        }
        graph.compute_marked_nodes();
        debug!(
            "scan marked {} nodes over {} interned keys",
            graph.marked_nodes().len(),
            factory.node_count()
        );
        let results = ScanResults::build(&graph, &factory, &metadata);
        info!(
            "scan complete: {} methods, {} constructed types",
            results.compiled_methods.len(),
            results.constructed_types.len()
        );
        results
    }

    /// DOT rendering of a fresh scan graph, for diagnostics.
    pub fn scan_to_dot(
        ctx: Rc<TypeSystemContext>,
        group: Rc<dyn ModuleGroup>,
        options: &CompilerOptions,
        providers: &[Rc<dyn RootProvider>],
    ) -> String {
        let metadata = ScannerMetadataManager::new();
        let factory = NodeFactory::for_scanning(
            ctx,
            group,
            options.clone(),
            Rc::clone(&metadata) as Rc<dyn crate::reflection::MetadataManager>,
        );
        let mut graph =
            DependencyGraph::new(&factory, crate::graph::DependencyTrackingLevel::All);
        {
            let mut rooting = RootingService::new(&mut graph, &factory);
            for provider in providers {
                provider.add_compilation_roots(&mut rooting);
            }
        }
        graph.compute_marked_nodes();
        graph.to_dot()
    }
}
