//! Data and metadata nodes: frozen string literals, RVA field blobs,
//! read-only blobs, and the reflection metadata records.

use std::rc::Rc;

use crate::graph::{DependencyNode, Edge};
use crate::nodes::NodeFactory;
use crate::typesystem::{FieldId, MethodId, ModuleId, TypeId, WellKnownType};

pub struct StringLiteralNode {
    pub value: String,
}

impl DependencyNode for StringLiteralNode {
    fn name(&self, _factory: &NodeFactory) -> String {
        format!("StringLiteral {:?}", self.value)
    }

    fn static_dependencies(&self, factory: &NodeFactory) -> Vec<Edge> {
        match factory.type_system().well_known(WellKnownType::String) {
            Ok(string_type) => vec![Edge::new(
                factory.necessary_type_symbol(string_type),
                "String type",
            )],
            Err(_) => Vec::new(),
        }
    }
}

/// The mapped initial data of a static RVA field. The bytes are validated
/// against the section block before the node is created.
pub struct FieldRvaDataNode {
    pub field: FieldId,
    pub data: Rc<[u8]>,
}

impl DependencyNode for FieldRvaDataNode {
    fn name(&self, factory: &NodeFactory) -> String {
        format!(
            "FieldRvaData {}",
            factory.type_system().field_display_name(self.field)
        )
    }

    fn static_dependencies(&self, _factory: &NodeFactory) -> Vec<Edge> {
        Vec::new()
    }
}

pub struct ReadOnlyBlobNode {
    pub name: String,
    pub data: Rc<[u8]>,
}

impl DependencyNode for ReadOnlyBlobNode {
    fn name(&self, _factory: &NodeFactory) -> String {
        format!("ReadOnlyBlob {}", self.name)
    }

    fn static_dependencies(&self, _factory: &NodeFactory) -> Vec<Edge> {
        Vec::new()
    }
}

/// Reflection description record for a type.
pub struct TypeMetadataNode {
    pub ty: TypeId,
}

impl DependencyNode for TypeMetadataNode {
    fn name(&self, factory: &NodeFactory) -> String {
        format!(
            "TypeMetadata {}",
            factory.type_system().type_display_name(self.ty)
        )
    }

    fn static_dependencies(&self, factory: &NodeFactory) -> Vec<Edge> {
        let ctx = factory.type_system();
        let mut deps = Vec::new();
        if let Some(module) = ctx.type_module(self.ty) {
            deps.push(Edge::new(
                factory.module_metadata(module),
                "Defining module",
            ));
        }
        for arg in ctx.type_instantiation(self.ty) {
            deps.push(Edge::new(
                factory.type_metadata(arg),
                "Instantiation argument",
            ));
        }
        deps
    }
}

/// Reflection description record for a method.
pub struct MethodMetadataNode {
    pub method: MethodId,
}

impl DependencyNode for MethodMetadataNode {
    fn name(&self, factory: &NodeFactory) -> String {
        format!(
            "MethodMetadata {}",
            factory.type_system().method_display_name(self.method)
        )
    }

    fn static_dependencies(&self, factory: &NodeFactory) -> Vec<Edge> {
        vec![Edge::new(
            factory.type_metadata(factory.type_system().method_owner(self.method)),
            "Declaring type",
        )]
    }
}

pub struct ModuleMetadataNode {
    pub module: ModuleId,
}

impl DependencyNode for ModuleMetadataNode {
    fn name(&self, factory: &NodeFactory) -> String {
        format!(
            "ModuleMetadata {}",
            factory.type_system().module_name(self.module)
        )
    }

    fn static_dependencies(&self, _factory: &NodeFactory) -> Vec<Edge> {
        Vec::new()
    }
}
