use crate::il::errors::Result;
use crate::il::model::ModuleDef;
use std::path::Path;

/// Produces module descriptions from on-disk artifacts. The PE/metadata
/// parser is an external collaborator behind this seam; the in-tree reader
/// consumes JSON module descriptions.
pub trait ModuleReader {
    fn read(&self, path: &Path) -> Result<ModuleDef>;
}

pub struct JsonModuleReader;

impl ModuleReader for JsonModuleReader {
    fn read(&self, path: &Path) -> Result<ModuleDef> {
        let text = std::fs::read_to_string(path)?;
        let module: ModuleDef = serde_json::from_str(&text)?;
        Ok(module)
    }
}
