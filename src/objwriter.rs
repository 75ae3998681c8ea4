//! The object-file writer seam.
//!
//! The real writer owns section layout and the PE/ELF/Mach-O envelope; the
//! core only guarantees a topologically stable marked-node order. The flat
//! writer here serialises the marked set into a JSON image so the driver
//! produces an inspectable artifact end to end.

use std::io;
use std::path::Path;

use log::info;
use serde_json::json;

use crate::graph::NodeId;
use crate::il::ModuleDef;
use crate::nodes::NodeFactory;

pub trait ObjectWriter {
    fn emit_object(
        &self,
        pe: &ModuleDef,
        output: &Path,
        marked: &[NodeId],
        factory: &NodeFactory,
    ) -> io::Result<()>;
}

pub struct FlatObjectWriter;

impl ObjectWriter for FlatObjectWriter {
    fn emit_object(
        &self,
        pe: &ModuleDef,
        output: &Path,
        marked: &[NodeId],
        factory: &NodeFactory,
    ) -> io::Result<()> {
        let ctx = factory.type_system();
        let symbols: Vec<String> = marked.iter().map(|&n| factory.node_name(n)).collect();
        let methods: Vec<serde_json::Value> = factory
            .compiled_bodies()
            .iter()
            .map(|(m, body)| {
                json!({
                    "name": ctx.method_display_name(*m),
                    "code_size": body.code.len(),
                    "relocs": body.relocs.len(),
                    "frame_size": body.frame_info.frame_size,
                    "empty": body.is_empty(),
                })
            })
            .collect();
        let exports: Vec<serde_json::Value> = factory
            .exports()
            .iter()
            .map(|(node, name)| json!({ "symbol": factory.node_name(*node), "export": name }))
            .collect();
        let image = json!({
            "module": pe.name,
            "symbols": symbols,
            "methods": methods,
            "exports": exports,
        });
        std::fs::write(output, serde_json::to_string_pretty(&image)?)?;
        info!(
            "emitted {} symbols to {}",
            marked.len(),
            output.display()
        );
        Ok(())
    }
}
