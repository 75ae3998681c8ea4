use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Result, anyhow};

use super::{load_modules, root_provider};
use crate::config::CompilerOptions;
use crate::driver::CompilationDriver;
use crate::graph::DependencyTrackingLevel;
use crate::modulegroup::SingleFileModuleGroup;
use crate::scanner::Scanner;
use crate::typesystem::TypeSystemContext;

/// Execute the compile command: both passes plus the object writer.
#[allow(clippy::too_many_arguments)]
pub fn execute(
    input: PathBuf,
    reference: Option<String>,
    output: Option<PathBuf>,
    options_file: Option<PathBuf>,
    root_mode: String,
    dump_graph: Option<PathBuf>,
    verbose: bool,
) -> Result<()> {
    // The environment is consulted exactly once, here.
    let mut options = CompilerOptions::from_env();
    if let Some(path) = &options_file {
        options.apply_file(path)?;
    }
    options.verbose = verbose;
    if dump_graph.is_some() {
        options.dependency_tracking = DependencyTrackingLevel::All;
    } else {
        options.dependency_tracking = DependencyTrackingLevel::FirstEdge;
    }

    let ctx = Rc::new(TypeSystemContext::new());
    let primary = load_modules(&ctx, &input, reference.as_deref())?;
    let group = Rc::new(SingleFileModuleGroup);

    let mut driver = CompilationDriver::new(Rc::clone(&ctx), group.clone(), options.clone(), primary);
    driver.add_root_provider(root_provider(&root_mode, primary)?);

    if let Some(dot_path) = &dump_graph {
        let dot = Scanner::scan_to_dot(
            Rc::clone(&ctx),
            group.clone(),
            &options,
            &[root_provider(&root_mode, primary)?],
        );
        std::fs::write(dot_path, dot)?;
    }

    let out = output.unwrap_or_else(|| input.with_extension("native.json"));
    match driver.run(Some(&out)) {
        Ok(results) => {
            println!(
                "Compiled {} methods into {}",
                results.methods.len(),
                out.display()
            );
            Ok(())
        }
        Err(e) => Err(anyhow!("Compilation failed: {e}")),
    }
}
