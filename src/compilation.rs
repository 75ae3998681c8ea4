//! The compiler pass.
//!
//! Re-runs the dependency graph with the codegen backend wired in, consuming
//! the scan oracles. Its marked set must stay within what the scanner
//! predicted; any demand outside that set is a fatal scanner failure.

use std::path::Path;
use std::rc::Rc;

use indexmap::IndexMap;
use log::info;
use thiserror::Error;

use crate::codegen::{CodegenBackend, CompiledMethodBody};
use crate::config::CompilerOptions;
use crate::graph::DependencyGraph;
use crate::il::{IlError, ModuleDef};
use crate::modulegroup::ModuleGroup;
use crate::nodes::{NodeFactory, NodeKey};
use crate::objwriter::ObjectWriter;
use crate::reflection::{MetadataBlob, MetadataManager, UsageBasedMetadataManager};
use crate::roots::{RootProvider, RootingService};
use crate::scanner::ScanResults;
use crate::typesystem::{MethodId, TypeSystemContext, TypeSystemError};

#[derive(Debug, Error)]
pub enum DriverError {
    /// Internal consistency violation between scanner and compiler.
    #[error("scanner failed to predict a compiler demand: {0}")]
    ScannerFailed(String),
    #[error(transparent)]
    TypeSystem(#[from] TypeSystemError),
    #[error(transparent)]
    Il(#[from] IlError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug)]
pub struct CompilationResults {
    pub methods: IndexMap<MethodId, CompiledMethodBody>,
    pub metadata: MetadataBlob,
    pub marked_node_names: Vec<String>,
    pub generic_code_size: usize,
}

pub struct CompilerPass;

impl CompilerPass {
    #[allow(clippy::too_many_arguments)]
    pub fn compile(
        ctx: Rc<TypeSystemContext>,
        group: Rc<dyn ModuleGroup>,
        options: &CompilerOptions,
        providers: &[Rc<dyn RootProvider>],
        scan: Rc<ScanResults>,
        backend: Rc<dyn CodegenBackend>,
        writer: &dyn ObjectWriter,
        pe: &ModuleDef,
        output: Option<&Path>,
    ) -> Result<CompilationResults, DriverError> {
        info!("compiling against the scanned closure");
        let metadata: Rc<dyn MetadataManager> = Rc::new(UsageBasedMetadataManager::new(
            scan.compiled_methods().clone(),
            scan.constructed_types().clone(),
        ));
        let factory = NodeFactory::for_compilation(
            Rc::clone(&ctx),
            group,
            options.clone(),
            metadata,
            backend,
            Rc::clone(&scan),
        );
        let mut graph = DependencyGraph::new(&factory, options.dependency_tracking);
        {
            let mut rooting = RootingService::new(&mut graph, &factory);
            for provider in providers {
                provider.add_compilation_roots(&mut rooting);
            }
        }
        graph.compute_marked_nodes();

        if let Some(message) = factory.scanner_failure() {
            return Err(DriverError::ScannerFailed(message));
        }
        verify_subset(&graph, &factory, &scan)?;

        let methods = factory.compiled_bodies();
        let generic_code_size: usize = methods
            .iter()
            .filter(|(m, _)| {
                ctx.method_has_instantiation(**m)
                    || !ctx.type_instantiation(ctx.method_owner(**m)).is_empty()
            })
            .map(|(_, body)| body.code.len())
            .sum();
        // Diagnostic only; the exact format is not part of any contract.
        info!("generic code size: {generic_code_size} bytes");

        let metadata_blob = factory
            .metadata()
            .compute_metadata(&factory, graph.marked_nodes());

        if let Some(path) = output {
            writer.emit_object(pe, path, graph.marked_nodes(), &factory)?;
        }

        let marked_node_names = graph
            .marked_nodes()
            .iter()
            .map(|&n| factory.node_name(n))
            .collect();
        Ok(CompilationResults {
            methods,
            metadata: metadata_blob,
            marked_node_names,
            generic_code_size,
        })
    }
}

/// The scanner-compiler subset property: every code or descriptor key the
/// compiler marked must have been predicted, and every vtable slot the
/// compiler uses must be in the scanned layout.
fn verify_subset(
    graph: &DependencyGraph<'_>,
    factory: &NodeFactory,
    scan: &ScanResults,
) -> Result<(), DriverError> {
    let ctx = factory.type_system();
    for &n in graph.marked_nodes() {
        let key = factory.node_key(n);
        match &key {
            NodeKey::MethodEntrypoint { .. }
            | NodeKey::ShadowConcreteMethod(_)
            | NodeKey::ConstructedType(_) => {
                if !scan.is_key_live(&key) {
                    return Err(scanner_miss(graph, factory, n));
                }
            }
            NodeKey::VTable(t) => {
                if !scan.is_key_live(&key) {
                    return Err(scanner_miss(graph, factory, n));
                }
                let Some(layout) = scan.vtable_layouts().layout_for(*t) else {
                    continue;
                };
                let slots = ctx.enum_all_virtual_slots(*t)?;
                for slot in slots {
                    let used = factory
                        .lookup(&NodeKey::VirtualMethodUse(slot))
                        .is_some_and(|u| graph.is_marked(u));
                    if used && !layout.contains(&slot) {
                        return Err(DriverError::ScannerFailed(format!(
                            "vtable slot {} of {} was not in the scanned layout\n{}",
                            ctx.method_display_name(slot),
                            ctx.type_display_name(*t),
                            graph.describe_chain(n)
                        )));
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn scanner_miss(graph: &DependencyGraph<'_>, factory: &NodeFactory, n: crate::graph::NodeId) -> DriverError {
    DriverError::ScannerFailed(format!(
        "{} was not predicted by the scanner\n{}",
        factory.node_name(n),
        graph.describe_chain(n)
    ))
}
