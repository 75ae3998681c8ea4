use std::path::PathBuf;
use std::rc::Rc;

use anyhow::Result;

use super::{load_modules, root_provider};
use crate::config::CompilerOptions;
use crate::modulegroup::SingleFileModuleGroup;
use crate::scanner::Scanner;
use crate::typesystem::TypeSystemContext;

/// Execute the graph command: scanner dependency graph as Graphviz DOT.
pub fn execute(
    input: PathBuf,
    reference: Option<String>,
    output: Option<PathBuf>,
    root_mode: String,
) -> Result<()> {
    let options = CompilerOptions::from_env();
    let ctx = Rc::new(TypeSystemContext::new());
    let primary = load_modules(&ctx, &input, reference.as_deref())?;
    let group = Rc::new(SingleFileModuleGroup);

    let dot = Scanner::scan_to_dot(
        ctx,
        group,
        &options,
        &[root_provider(&root_mode, primary)?],
    );
    match output {
        Some(path) => std::fs::write(path, dot)?,
        None => println!("{dot}"),
    }
    Ok(())
}
