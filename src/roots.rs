//! Compilation roots: the seeds of the dependency graph.

use std::rc::Rc;

use log::warn;

use crate::graph::DependencyGraph;
use crate::nodes::{NodeFactory, StaticsKind};
use crate::scanner::ScanResults;
use crate::typesystem::context::split_fqn;
use crate::typesystem::{MethodId, ModuleId, TypeId};

/// The surface providers root through. Per-entity failures are logged and
/// skipped; a root that cannot resolve never aborts the compilation.
pub struct RootingService<'g, 'f> {
    graph: &'g mut DependencyGraph<'f>,
    factory: &'f NodeFactory,
    filter: Option<Rc<ScanResults>>,
}

impl<'g, 'f> RootingService<'g, 'f> {
    pub fn new(graph: &'g mut DependencyGraph<'f>, factory: &'f NodeFactory) -> Self {
        RootingService {
            graph,
            factory,
            filter: None,
        }
    }

    pub fn factory(&self) -> &'f NodeFactory {
        self.factory
    }

    pub fn set_filter(&mut self, filter: Option<Rc<ScanResults>>) -> Option<Rc<ScanResults>> {
        std::mem::replace(&mut self.filter, filter)
    }

    pub fn add_method_root(&mut self, m: MethodId, reason: &str, export_name: Option<&str>) {
        let ctx = self.factory.type_system();
        if let Some(scan) = &self.filter {
            if !scan.is_method_compiled(self.factory.canonical_method(m)) {
                return;
            }
        }
        if let Err(e) = ctx.method_signature(m) {
            warn!(
                "skipping root {}: {e}",
                ctx.method_display_name(m)
            );
            return;
        }
        let deps = self.factory.direct_call_dependencies(m, "Compilation root");
        for (i, edge) in deps.iter().enumerate() {
            self.graph.add_root(edge.target, reason);
            if i == 0 {
                if let Some(name) = export_name {
                    self.factory.add_export(edge.target, name);
                }
            }
        }
    }

    pub fn add_type_root(&mut self, ty: TypeId, reason: &str) {
        if let Some(scan) = &self.filter {
            if !scan.is_type_constructed(ty) {
                return;
            }
        }
        let node = self.factory.constructed_type_symbol(ty);
        self.graph.add_root(node, reason);
    }

    /// Reflection root: the static bases of a type stay addressable.
    pub fn add_static_bases_root(&mut self, ty: TypeId, reason: &str) {
        for kind in [StaticsKind::Gc, StaticsKind::NonGc, StaticsKind::Thread] {
            self.graph.add_root(self.factory.statics(ty, kind), reason);
        }
    }

    pub fn add_module_metadata_root(&mut self, module: ModuleId, reason: &str) {
        self.graph
            .add_root(self.factory.module_metadata(module), reason);
    }

    pub fn add_read_only_blob_root(&mut self, name: &str, data: Vec<u8>, reason: &str) {
        self.graph
            .add_root(self.factory.read_only_data_blob(name, data), reason);
    }

    /// Reflection root: delegate marshalling needs the delegate constructed
    /// and its Invoke reachable.
    pub fn add_delegate_marshalling_root(&mut self, delegate: TypeId, reason: &str) {
        let ctx = self.factory.type_system();
        self.add_type_root(delegate, reason);
        match ctx.owned_methods(delegate) {
            Ok(methods) => {
                for m in methods {
                    let name = ctx.method_name(m);
                    if name == "Invoke" || name == ".ctor" {
                        self.add_method_root(m, reason, None);
                    }
                }
            }
            Err(e) => warn!(
                "skipping delegate marshalling root {}: {e}",
                ctx.type_display_name(delegate)
            ),
        }
    }

    /// Reflection root: a marshalled struct keeps its descriptor and field
    /// types.
    pub fn add_struct_marshalling_root(&mut self, ty: TypeId, reason: &str) {
        let ctx = self.factory.type_system();
        self.graph
            .add_root(self.factory.necessary_type_symbol(ty), reason);
        match ctx.owned_fields(ty) {
            Ok(fields) => {
                for f in fields {
                    match ctx.field_type(f) {
                        Ok(ft) => {
                            self.graph
                                .add_root(self.factory.necessary_type_symbol(ft), reason);
                        }
                        Err(e) => {
                            warn!("skipping marshalled field {}: {e}", ctx.field_name(f));
                        }
                    }
                }
            }
            Err(e) => warn!(
                "skipping struct marshalling root {}: {e}",
                ctx.type_display_name(ty)
            ),
        }
    }
}

pub trait RootProvider {
    fn add_compilation_roots(&self, rooting: &mut RootingService<'_, '_>);
}

/// Roots a single method by name, for focused compilations.
pub struct SingleMethodRootProvider {
    pub module: ModuleId,
    pub type_fqn: String,
    pub method_name: String,
}

impl RootProvider for SingleMethodRootProvider {
    fn add_compilation_roots(&self, rooting: &mut RootingService<'_, '_>) {
        let ctx = rooting.factory().type_system();
        let (ns, name) = split_fqn(&self.type_fqn);
        let ty = match ctx.get_type(self.module, ns, name) {
            Ok(t) => t,
            Err(e) => {
                warn!("single method root: {e}");
                return;
            }
        };
        let methods = match ctx.owned_methods(ty) {
            Ok(m) => m,
            Err(e) => {
                warn!("single method root: {e}");
                return;
            }
        };
        for m in methods {
            if ctx.method_name(m) == self.method_name {
                rooting.add_method_root(m, "Single method root", None);
                return;
            }
        }
        warn!(
            "single method root: '{}::{}' not found",
            self.type_fqn, self.method_name
        );
    }
}

/// Roots the module entry point.
pub struct ModuleEntrypointRootProvider {
    pub module: ModuleId,
}

impl RootProvider for ModuleEntrypointRootProvider {
    fn add_compilation_roots(&self, rooting: &mut RootingService<'_, '_>) {
        let ctx = rooting.factory().type_system();
        match ctx.entry_point(self.module) {
            Ok(Some(main)) => {
                rooting.add_method_root(main, "Entry point", Some("__managed_main"));
            }
            Ok(None) => warn!(
                "module '{}' has no entry point",
                ctx.module_name(self.module)
            ),
            Err(e) => warn!("entry point root: {e}"),
        }
    }
}

/// Library rooting: every reachable method in the module. Generic
/// definitions are rooted at their canonical instantiation only when
/// canonical-code rooting is enabled; otherwise generics are reached
/// through use sites alone.
pub struct LibraryRootProvider {
    pub module: ModuleId,
}

impl LibraryRootProvider {
    fn canonical_instantiation(
        &self,
        ctx: &crate::typesystem::TypeSystemContext,
        def: TypeId,
        arity: usize,
    ) -> crate::typesystem::Result<TypeId> {
        let args = vec![ctx.canon_sentinel(false); arity];
        ctx.make_instantiated_type(def, &args)
    }
}

impl RootProvider for LibraryRootProvider {
    fn add_compilation_roots(&self, rooting: &mut RootingService<'_, '_>) {
        let factory = rooting.factory();
        let ctx = factory.type_system();
        let root_canonical = factory.options().root_canonical_code;
        let module_def = ctx.module_def(self.module);

        for record in &module_def.types {
            let def = match ctx.get_type(self.module, &record.namespace, &record.name) {
                Ok(t) => t,
                Err(e) => {
                    warn!("library root skipped: {e}");
                    continue;
                }
            };
            let arity = record.generic_params.len();
            let ty = if arity == 0 {
                def
            } else {
                if !root_canonical {
                    continue;
                }
                match self.canonical_instantiation(ctx, def, arity) {
                    Ok(t) => t,
                    Err(e) => {
                        warn!("library root skipped: {e}");
                        continue;
                    }
                }
            };

            if !record.is_interface && !record.is_abstract {
                rooting.add_type_root(ty, "Library root");
            }
            if record
                .fields
                .iter()
                .any(|f| f.is_static && !f.is_literal && f.rva.is_none())
            {
                rooting.add_static_bases_root(ty, "Library statics root");
            }

            let methods = match ctx.owned_methods(ty) {
                Ok(m) => m,
                Err(e) => {
                    warn!("library root skipped: {e}");
                    continue;
                }
            };
            for m in methods {
                if ctx.method_is_abstract(m) {
                    continue;
                }
                let generic_arity = ctx.method_generic_param_count(m) as usize;
                let rooted = if generic_arity == 0 {
                    m
                } else {
                    if !root_canonical {
                        continue;
                    }
                    let args = vec![ctx.canon_sentinel(false); generic_arity];
                    match ctx.make_instantiated_method(m, &args) {
                        Ok(im) => im,
                        Err(e) => {
                            warn!("library root skipped: {e}");
                            continue;
                        }
                    }
                };
                rooting.add_method_root(rooted, "Library root", None);
            }
        }
        rooting.add_module_metadata_root(self.module, "Library module metadata");
    }
}

/// Wraps another provider and admits only entities the scanner proved live.
pub struct FilteredRootProvider {
    pub inner: Rc<dyn RootProvider>,
    pub scan: Rc<ScanResults>,
}

impl RootProvider for FilteredRootProvider {
    fn add_compilation_roots(&self, rooting: &mut RootingService<'_, '_>) {
        let prev = rooting.set_filter(Some(Rc::clone(&self.scan)));
        self.inner.add_compilation_roots(rooting);
        rooting.set_filter(prev);
    }
}
