//! Conditional and dynamic edges: an override becomes live only when its
//! slot is used *and* its type is constructed.

use ilaot::il::{IlOp, PrimitiveKind, SigType};
use ilaot::nodes::NodeKey;

use crate::common::*;

fn void() -> SigType {
    SigType::Prim(PrimitiveKind::Void)
}

/// IFoo with implementations S and T.
fn dispatch_module(main_ops: Vec<IlOp>) -> ilaot::il::ModuleDef {
    let mut ifoo = interface("App", "IFoo");
    ifoo.methods
        .push(abstract_interface_method("M", void(), Vec::new()));

    let mut s = class("App", "S");
    s.interfaces.push(SigType::named("App", "IFoo"));
    s.methods.push(ctor());
    s.methods.push(virtual_method("M", void(), Vec::new()));

    let mut t = class("App", "T");
    t.interfaces.push(SigType::named("App", "IFoo"));
    t.methods.push(ctor());
    t.methods.push(virtual_method("M", void(), Vec::new()));

    let mut program = class("App", "Program");
    program
        .methods
        .push(with_body(static_method("Main", void(), Vec::new()), main_ops));

    app_module(vec![ifoo, s, t, program])
}

#[test]
fn interface_use_plus_construction_marks_the_override() {
    let (ctx, module, results) = scan_app(dispatch_module(vec![
        newobj("App.S"),
        callvirt("App.IFoo", "M"),
    ]));
    let s = ctx.get_type(module, "App", "S").unwrap();
    let t = ctx.get_type(module, "App", "T").unwrap();
    let s_m = ctx
        .owned_methods(s)
        .unwrap()
        .into_iter()
        .find(|&m| ctx.method_name(m) == "M")
        .unwrap();
    let t_m = ctx
        .owned_methods(t)
        .unwrap()
        .into_iter()
        .find(|&m| ctx.method_name(m) == "M")
        .unwrap();

    // S was constructed and IFoo::M was used, so S::M is live. T never
    // was, so its override stays dead.
    assert!(results.is_method_compiled(s_m));
    assert!(!results.is_method_compiled(t_m));
    assert!(results.is_type_constructed(s));
    assert!(!results.is_type_constructed(t));
}

#[test]
fn construction_without_use_leaves_the_override_dead() {
    let (ctx, module, results) = scan_app(dispatch_module(vec![newobj("App.S")]));
    let s = ctx.get_type(module, "App", "S").unwrap();
    let s_m = ctx
        .owned_methods(s)
        .unwrap()
        .into_iter()
        .find(|&m| ctx.method_name(m) == "M")
        .unwrap();
    assert!(results.is_type_constructed(s));
    assert!(!results.is_method_compiled(s_m));
}

#[test]
fn use_without_construction_leaves_the_override_dead() {
    // Call through the interface with nothing constructed: the virtual use
    // is live, no implementation is.
    let (ctx, module, results) =
        scan_app(dispatch_module(vec![callvirt("App.IFoo", "M")]));
    let s = ctx.get_type(module, "App", "S").unwrap();
    let s_m = ctx
        .owned_methods(s)
        .unwrap()
        .into_iter()
        .find(|&m| ctx.method_name(m) == "M")
        .unwrap();
    assert!(!results.is_type_constructed(s));
    assert!(!results.is_method_compiled(s_m));
    assert!(!results.is_key_live(&NodeKey::ConstructedType(s)));
}

#[test]
fn variant_interface_use_marks_compatible_implementations() {
    let mut producer = interface("App", "IProducer");
    producer.generic_params.push(variant_param(
        "T",
        ilaot::il::Variance::Covariant,
    ));
    producer
        .methods
        .push(abstract_interface_method("Produce", void(), Vec::new()));

    let mut animal = class("App", "Animal");
    animal.methods.push(ctor());
    let mut dog = class("App", "Dog");
    dog.base = Some(SigType::named("App", "Animal"));

    let mut kennel = class("App", "Kennel");
    kennel.interfaces.push(SigType::Inst {
        def: ilaot::il::TypeRefSig {
            assembly: None,
            namespace: "App".to_string(),
            name: "IProducer".to_string(),
        },
        args: vec![SigType::named("App", "Dog")],
    });
    kennel.methods.push(ctor());
    kennel
        .methods
        .push(virtual_method("Produce", void(), Vec::new()));

    // The call goes through IProducer<Animal>; only IProducer<Dog> is
    // implemented.
    let mut produce_call = method_ref("App.IProducer", "Produce");
    produce_call.owner = SigType::Inst {
        def: ilaot::il::TypeRefSig {
            assembly: None,
            namespace: "App".to_string(),
            name: "IProducer".to_string(),
        },
        args: vec![SigType::named("App", "Animal")],
    };
    let mut program = class("App", "Program");
    program.methods.push(with_body(
        static_method("Main", void(), Vec::new()),
        vec![
            newobj("App.Kennel"),
            IlOp::CallVirt {
                method: produce_call,
            },
        ],
    ));

    let (ctx, module, results) =
        scan_app(app_module(vec![producer, animal, dog, kennel, program]));
    let kennel_ty = ctx.get_type(module, "App", "Kennel").unwrap();
    let kennel_produce = ctx
        .owned_methods(kennel_ty)
        .unwrap()
        .into_iter()
        .find(|&m| ctx.method_name(m) == "Produce")
        .unwrap();
    assert!(results.is_method_compiled(kennel_produce));
}

#[test]
fn generic_virtual_dispatch_is_resolved_dynamically() {
    let mut base = class("App", "Base");
    base.methods.push(ctor());
    let mut speak = virtual_method("Speak", void(), Vec::new());
    speak.generic_param_count = 1;
    base.methods.push(speak);

    let mut derived = class("App", "Derived");
    derived.base = Some(SigType::named("App", "Base"));
    derived.methods.push(ctor());
    let mut speak_override = override_method("Speak", void(), Vec::new());
    speak_override.generic_param_count = 1;
    derived.methods.push(speak_override);

    let mut gvm_call = method_ref("App.Base", "Speak");
    gvm_call.method_inst = vec![SigType::named("System", "String")];

    let mut program = class("App", "Program");
    program.methods.push(with_body(
        static_method("Main", void(), Vec::new()),
        vec![newobj("App.Derived"), IlOp::CallVirt { method: gvm_call }],
    ));

    let (ctx, module, results) =
        scan_app(app_module(vec![base, derived, program]));
    let derived_ty = ctx.get_type(module, "App", "Derived").unwrap();
    let speak_def = ctx
        .owned_methods(derived_ty)
        .unwrap()
        .into_iter()
        .find(|&m| ctx.method_name(m) == "Speak")
        .unwrap();
    let string = ctx.well_known(ilaot::typesystem::WellKnownType::String).unwrap();
    let target = ctx.make_instantiated_method(speak_def, &[string]).unwrap();

    // The live constructed set grew to include Derived, so the dynamic
    // search resolved the generic virtual onto it.
    let canon_target = ctx
        .get_canon_method_target(target, ilaot::typesystem::CanonicalFormKind::Specific)
        .unwrap();
    assert!(results.is_method_compiled(canon_target));
}
