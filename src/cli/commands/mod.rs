pub mod compile;
pub mod graph;
pub mod scan;

use std::path::Path;
use std::rc::Rc;

use anyhow::{Context, Result, anyhow};
use log::info;

use crate::il::{JsonModuleReader, ModuleReader};
use crate::roots::{
    LibraryRootProvider, ModuleEntrypointRootProvider, RootProvider, SingleMethodRootProvider,
};
use crate::typesystem::{ModuleId, TypeSystemContext};

/// Loads the primary module and every reference matching the glob.
pub(crate) fn load_modules(
    ctx: &TypeSystemContext,
    input: &Path,
    reference_glob: Option<&str>,
) -> Result<ModuleId> {
    let reader = JsonModuleReader;
    let primary_def = reader
        .read(input)
        .with_context(|| format!("loading {}", input.display()))?;
    let primary = ctx.load_module(primary_def)?;
    if let Some(pattern) = reference_glob {
        for entry in globwalk::glob(pattern).context("bad reference pattern")? {
            let entry = entry?;
            let path = entry.path();
            if path == input {
                continue;
            }
            let def = reader
                .read(path)
                .with_context(|| format!("loading {}", path.display()))?;
            info!("loaded reference module '{}'", def.name);
            ctx.load_module(def)?;
        }
    }
    Ok(primary)
}

/// Parses the `--root-mode` argument into a provider.
pub(crate) fn root_provider(mode: &str, module: ModuleId) -> Result<Rc<dyn RootProvider>> {
    if mode == "entrypoint" {
        return Ok(Rc::new(ModuleEntrypointRootProvider { module }));
    }
    if mode == "library" {
        return Ok(Rc::new(LibraryRootProvider { module }));
    }
    if let Some(target) = mode.strip_prefix("method:") {
        let (type_fqn, method_name) = target
            .split_once("::")
            .ok_or_else(|| anyhow!("expected method:<Type::Method>, got '{mode}'"))?;
        return Ok(Rc::new(SingleMethodRootProvider {
            module,
            type_fqn: type_fqn.to_string(),
            method_name: method_name.to_string(),
        }));
    }
    Err(anyhow!("unknown root mode '{mode}'"))
}
