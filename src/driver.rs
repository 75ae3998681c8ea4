//! The compilation driver: two passes over one type system.
//!
//! The scanner runs first with the lightweight body importer; its results
//! become the oracles of the compiler pass, whose roots are additionally
//! filtered down to what the scan proved live.

use std::path::Path;
use std::rc::Rc;

use log::info;

use crate::codegen::{CodegenBackend, ReferenceBackend};
use crate::compilation::{CompilationResults, CompilerPass, DriverError};
use crate::config::CompilerOptions;
use crate::modulegroup::ModuleGroup;
use crate::objwriter::{FlatObjectWriter, ObjectWriter};
use crate::roots::{FilteredRootProvider, RootProvider};
use crate::scanner::{ScanResults, Scanner};
use crate::typesystem::{ModuleId, TypeSystemContext};

pub struct CompilationDriver {
    ctx: Rc<TypeSystemContext>,
    group: Rc<dyn ModuleGroup>,
    options: CompilerOptions,
    primary_module: ModuleId,
    providers: Vec<Rc<dyn RootProvider>>,
    backend: Rc<dyn CodegenBackend>,
    writer: Box<dyn ObjectWriter>,
}

impl CompilationDriver {
    pub fn new(
        ctx: Rc<TypeSystemContext>,
        group: Rc<dyn ModuleGroup>,
        options: CompilerOptions,
        primary_module: ModuleId,
    ) -> Self {
        CompilationDriver {
            ctx,
            group,
            options,
            primary_module,
            providers: Vec::new(),
            backend: Rc::new(ReferenceBackend),
            writer: Box::new(FlatObjectWriter),
        }
    }

    pub fn add_root_provider(&mut self, provider: Rc<dyn RootProvider>) -> &mut Self {
        self.providers.push(provider);
        self
    }

    pub fn set_backend(&mut self, backend: Rc<dyn CodegenBackend>) -> &mut Self {
        self.backend = backend;
        self
    }

    pub fn set_writer(&mut self, writer: Box<dyn ObjectWriter>) -> &mut Self {
        self.writer = writer;
        self
    }

    pub fn type_system(&self) -> &Rc<TypeSystemContext> {
        &self.ctx
    }

    /// The scanner pass alone.
    pub fn scan(&self) -> ScanResults {
        Scanner::scan(
            Rc::clone(&self.ctx),
            Rc::clone(&self.group),
            &self.options,
            &self.providers,
        )
    }

    /// Scanner, then compiler, then the object writer.
    pub fn run(&self, output: Option<&Path>) -> Result<CompilationResults, DriverError> {
        let scan = Rc::new(self.scan());
        let filtered: Vec<Rc<dyn RootProvider>> = self
            .providers
            .iter()
            .map(|p| {
                Rc::new(FilteredRootProvider {
                    inner: Rc::clone(p),
                    scan: Rc::clone(&scan),
                }) as Rc<dyn RootProvider>
            })
            .collect();
        let pe = self.ctx.module_def(self.primary_module);
        let results = CompilerPass::compile(
            Rc::clone(&self.ctx),
            Rc::clone(&self.group),
            &self.options,
            &filtered,
            scan,
            Rc::clone(&self.backend),
            self.writer.as_ref(),
            &pe,
            output,
        )?;
        info!(
            "compilation complete: {} methods, {} marked nodes",
            results.methods.len(),
            results.marked_node_names.len()
        );
        Ok(results)
    }
}
