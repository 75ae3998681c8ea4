use std::path::PathBuf;
use std::rc::Rc;

use anyhow::Result;
use serde_json::json;

use super::{load_modules, root_provider};
use crate::config::CompilerOptions;
use crate::modulegroup::SingleFileModuleGroup;
use crate::scanner::Scanner;
use crate::typesystem::TypeSystemContext;

/// Execute the scan command: scanner pass only, results as JSON.
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

    let results = Scanner::scan(
        Rc::clone(&ctx),
        group,
        &options,
        &[root_provider(&root_mode, primary)?],
    );

    let compiled: Vec<String> = results
        .compiled_methods()
        .iter()
        .map(|&m| ctx.method_display_name(m))
        .collect();
    let constructed: Vec<String> = results
        .constructed_types()
        .iter()
        .map(|&t| ctx.type_display_name(t))
        .collect();
    let invokable: Vec<String> = results
        .invokable_methods()
        .iter()
        .map(|&m| ctx.method_display_name(m))
        .collect();
    let vtables: Vec<serde_json::Value> = results
        .vtable_layouts()
        .types()
        .map(|t| {
            let slots: Vec<String> = results
                .vtable_layouts()
                .layout_for(t)
                .unwrap_or(&[])
                .iter()
                .map(|&s| ctx.method_display_name(s))
                .collect();
            json!({ "type": ctx.type_display_name(t), "used_slots": slots })
        })
        .collect();
    let report = json!({
        "compiled_methods": compiled,
        "constructed_types": constructed,
        "invokable_methods": invokable,
        "vtable_layouts": vtables,
    });
    let text = serde_json::to_string_pretty(&report)?;
    match output {
        Some(path) => std::fs::write(path, text)?,
        None => println!("{text}"),
    }
    Ok(())
}
