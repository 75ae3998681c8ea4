//! Ready-to-run helpers: runtime-callable stubs keyed by helper id and
//! target.

use crate::graph::{DependencyNode, Edge};
use crate::nodes::{NodeFactory, StaticsKind};
use crate::typesystem::{FieldId, MethodId, TypeId};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum HelperId {
    NewObject,
    NewArray,
    IsInstanceOf,
    CastClass,
    GetGcStaticBase,
    GetNonGcStaticBase,
    GetThreadStaticBase,
    VirtualCall,
    DelegateCtor,
    TypeHandle,
    MethodHandle,
    FieldHandle,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum HelperTarget {
    Type(TypeId),
    Method(MethodId),
    Field(FieldId),
    Delegate {
        delegate_type: TypeId,
        target: MethodId,
        virtual_dispatch: bool,
    },
}

pub struct ReadyToRunHelperNode {
    pub id: HelperId,
    pub target: HelperTarget,
}

impl DependencyNode for ReadyToRunHelperNode {
    fn name(&self, factory: &NodeFactory) -> String {
        let ctx = factory.type_system();
        let target = match self.target {
            HelperTarget::Type(t) => ctx.type_display_name(t),
            HelperTarget::Method(m) => ctx.method_display_name(m),
            HelperTarget::Field(f) => ctx.field_display_name(f),
            HelperTarget::Delegate {
                delegate_type,
                target,
                ..
            } => format!(
                "{} over {}",
                ctx.type_display_name(delegate_type),
                ctx.method_display_name(target)
            ),
        };
        format!("Helper {:?}({})", self.id, target)
    }

    fn static_dependencies(&self, factory: &NodeFactory) -> Vec<Edge> {
        let mut deps = Vec::new();
        match (self.id, self.target) {
            (HelperId::NewObject, HelperTarget::Type(t)) => {
                deps.push(Edge::new(
                    factory.constructed_type_symbol(t),
                    "Object allocation",
                ));
            }
            (HelperId::NewArray, HelperTarget::Type(t)) => {
                deps.push(Edge::new(
                    factory.constructed_type_symbol(t),
                    "Array allocation",
                ));
            }
            (HelperId::IsInstanceOf | HelperId::CastClass, HelperTarget::Type(t)) => {
                deps.push(Edge::new(factory.necessary_type_symbol(t), "Cast target"));
            }
            (HelperId::GetGcStaticBase, HelperTarget::Type(t)) => {
                deps.push(Edge::new(factory.statics(t, StaticsKind::Gc), "Static base"));
            }
            (HelperId::GetNonGcStaticBase, HelperTarget::Type(t)) => {
                deps.push(Edge::new(
                    factory.statics(t, StaticsKind::NonGc),
                    "Static base",
                ));
            }
            (HelperId::GetThreadStaticBase, HelperTarget::Type(t)) => {
                deps.push(Edge::new(
                    factory.statics(t, StaticsKind::Thread),
                    "Thread static base",
                ));
            }
            (HelperId::VirtualCall, HelperTarget::Method(m)) => {
                deps.push(Edge::new(factory.virtual_method_use(m), "Virtual call"));
            }
            (
                HelperId::DelegateCtor,
                HelperTarget::Delegate {
                    delegate_type,
                    target,
                    virtual_dispatch,
                },
            ) => {
                deps.push(Edge::new(
                    factory.constructed_type_symbol(delegate_type),
                    "Delegate type",
                ));
                if virtual_dispatch {
                    deps.push(Edge::new(
                        factory.virtual_method_use(target),
                        "Delegate to virtual",
                    ));
                } else {
                    deps.extend(factory.direct_call_dependencies(target, "Delegate target"));
                }
            }
            (HelperId::TypeHandle, HelperTarget::Type(t)) => {
                deps.push(Edge::new(factory.necessary_type_symbol(t), "Type handle"));
            }
            (HelperId::MethodHandle, HelperTarget::Method(m)) => {
                deps.push(Edge::new(
                    factory.necessary_type_symbol(factory.type_system().method_owner(m)),
                    "Method handle owner",
                ));
                deps.push(Edge::new(factory.method_metadata(m), "Method handle"));
            }
            (HelperId::FieldHandle, HelperTarget::Field(f)) => {
                deps.push(Edge::new(
                    factory.necessary_type_symbol(factory.type_system().field_owner(f)),
                    "Field handle owner",
                ));
            }
            _ => {}
        }
        deps
    }
}
