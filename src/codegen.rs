//! The codegen backend seam.
//!
//! The real machine-code generator is an external collaborator: it is handed
//! one method at a time, reports every symbol it references back through the
//! node factory, and returns code bytes, relocations, frame info and GC
//! info. The reference backend here emits a relocatable opcode stream from
//! the body importer's analysis; it exists so the driver produces a complete
//! image without a native code generator attached.

use thiserror::Error;

use crate::graph::{Edge, NodeId};
use crate::il::IlOp;
use crate::ilimport;
use crate::nodes::NodeFactory;
use crate::typesystem::{MethodId, TypeSystemError};

#[derive(Debug, Error)]
pub enum CodegenError {
    /// The method cannot be pre-compiled but the program is well-formed;
    /// it will be JIT compiled at runtime.
    #[error("requires runtime JIT: {0}")]
    RequiresRuntimeJit(String),
    #[error(transparent)]
    TypeSystem(#[from] TypeSystemError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relocation {
    pub offset: u32,
    pub target: NodeId,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameInfo {
    pub frame_size: u32,
    pub has_frame_pointer: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompiledMethodBody {
    pub code: Vec<u8>,
    pub relocs: Vec<Relocation>,
    pub frame_info: FrameInfo,
    pub gc_info: Vec<u8>,
}

impl CompiledMethodBody {
    /// The not-pre-compiled placeholder; the runtime JIT takes over.
    pub fn empty() -> CompiledMethodBody {
        CompiledMethodBody::default()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }
}

pub trait CodegenBackend {
    /// Compiles one method, discovering its dependencies by requesting
    /// nodes from the factory.
    fn compile_method(
        &self,
        m: MethodId,
        factory: &NodeFactory,
    ) -> Result<(CompiledMethodBody, Vec<Edge>), CodegenError>;
}

pub struct ReferenceBackend;

impl CodegenBackend for ReferenceBackend {
    fn compile_method(
        &self,
        m: MethodId,
        factory: &NodeFactory,
    ) -> Result<(CompiledMethodBody, Vec<Edge>), CodegenError> {
        let ctx = factory.type_system();
        let ops = ilimport::method_body_ops(ctx, m)?;
        if ops.is_empty() {
            if ctx.method_is_internal_call(m) {
                return Err(CodegenError::RequiresRuntimeJit(
                    "runtime-provided internal call".to_string(),
                ));
            }
            return Ok((CompiledMethodBody::empty(), Vec::new()));
        }
        let per_op = ilimport::analyze_ops(m, factory)?;

        let mut body = CompiledMethodBody::default();
        let mut deps = Vec::new();
        for (op, edges) in ops.iter().zip(per_op) {
            body.code.extend_from_slice(il_opcode(op));
            for edge in edges {
                body.relocs.push(Relocation {
                    offset: body.code.len() as u32,
                    target: edge.target,
                });
                body.code.extend_from_slice(&[0, 0, 0, 0]);
                deps.push(edge);
            }
        }

        let sig = ctx.method_signature(m)?;
        body.frame_info = FrameInfo {
            frame_size: 16 + 8 * sig.params.len() as u32,
            has_frame_pointer: true,
        };
        let mut gc_slots = 0u8;
        for &p in sig.params.iter() {
            if ctx.contains_gc_pointers(p).unwrap_or(false) {
                gc_slots = gc_slots.saturating_add(1);
            }
        }
        body.gc_info.push(gc_slots);
        Ok((body, deps))
    }
}

fn il_opcode(op: &IlOp) -> &'static [u8] {
    match op {
        IlOp::Call { .. } => &[0x28],
        IlOp::CallVirt { .. } => &[0x6f],
        IlOp::NewObj { .. } => &[0x73],
        IlOp::NewArr { .. } => &[0x8d],
        IlOp::Box { .. } => &[0x8c],
        IlOp::Unbox { .. } => &[0x79],
        IlOp::CastClass { .. } => &[0x74],
        IlOp::IsInst { .. } => &[0x75],
        IlOp::LdStr { .. } => &[0x72],
        IlOp::LdSFld { .. } => &[0x7e],
        IlOp::StSFld { .. } => &[0x80],
        IlOp::LdFld { .. } => &[0x7b],
        IlOp::LdToken { .. } => &[0xd0],
        IlOp::LdFtn { .. } => &[0xfe, 0x06],
        IlOp::LdVirtFtn { .. } => &[0xfe, 0x07],
        IlOp::Throw => &[0x7a],
    }
}
