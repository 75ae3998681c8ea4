use ilaot::il::{PrimitiveKind, SigType};
use ilaot::typesystem::{GenericContext, TypeSystemError, WellKnownType};

use crate::common::*;

#[test]
fn structurally_equal_types_intern_to_the_same_handle() {
    let mut gen_class = class("App", "Gen");
    gen_class.generic_params.push(generic_param("T"));
    let (ctx, module) = load(app_module(vec![class("App", "Program"), gen_class]));

    let a = ctx.get_type(module, "App", "Program").unwrap();
    let b = ctx.get_type(module, "App", "Program").unwrap();
    assert_eq!(a, b);

    let gen_def = ctx.get_type(module, "App", "Gen").unwrap();
    let int32 = ctx.well_known(WellKnownType::Primitive(PrimitiveKind::Int32)).unwrap();
    let g1 = ctx.make_instantiated_type(gen_def, &[int32]).unwrap();
    let g2 = ctx.make_instantiated_type(gen_def, &[int32]).unwrap();
    assert_eq!(g1, g2);

    assert_eq!(ctx.make_array_type(g1), ctx.make_array_type(g2));
    assert_eq!(ctx.make_byref_type(int32), ctx.make_byref_type(int32));
    assert_ne!(ctx.make_byref_type(int32), ctx.make_pointer_type(int32));
}

#[test]
fn instantiation_of_a_fully_instantiated_type_is_a_fixed_point() {
    let mut gen_class = class("App", "Gen");
    gen_class.generic_params.push(generic_param("T"));
    let (ctx, module) = load(app_module(vec![class("App", "Program"), gen_class]));

    let gen_def = ctx.get_type(module, "App", "Gen").unwrap();
    let string = ctx.well_known(WellKnownType::String).unwrap();
    let closed = ctx.make_instantiated_type(gen_def, &[string]).unwrap();
    let arr = ctx.make_array_type(closed);

    let int32 = ctx.well_known(WellKnownType::Primitive(PrimitiveKind::Int32)).unwrap();
    assert_eq!(ctx.instantiate_type(closed, &[int32], &[]).unwrap(), closed);
    assert_eq!(ctx.instantiate_type(arr, &[int32], &[int32]).unwrap(), arr);
}

#[test]
fn missing_type_fails_with_type_load() {
    let (ctx, module) = load(app_module(vec![class("App", "Program")]));
    let err = ctx.get_type(module, "App", "Nope").unwrap_err();
    assert!(matches!(err, TypeSystemError::TypeLoad { .. }));
}

#[test]
fn vararg_signatures_are_rejected() {
    let mut program = class("App", "Program");
    let mut bad = static_method(
        "Variadic",
        SigType::Prim(PrimitiveKind::Void),
        vec![SigType::Prim(PrimitiveKind::Int32)],
    );
    bad.signature.is_vararg = true;
    program.methods.push(bad);
    let (ctx, module) = load(app_module(vec![program]));

    let ty = ctx.get_type(module, "App", "Program").unwrap();
    let m = ctx.owned_methods(ty).unwrap()[0];
    let err = ctx.method_signature(m).unwrap_err();
    assert!(matches!(err, TypeSystemError::BadImageFormat(_)));
}

#[test]
fn signature_resolution_substitutes_the_owner_instantiation() {
    let mut gen_class = class("App", "Gen");
    gen_class.generic_params.push(generic_param("T"));
    gen_class.methods.push(instance_method(
        "Get",
        SigType::TypeVar(0),
        vec![SigType::TypeVar(0)],
    ));
    let (ctx, module) = load(app_module(vec![gen_class]));

    let gen_def = ctx.get_type(module, "App", "Gen").unwrap();
    let string = ctx.well_known(WellKnownType::String).unwrap();
    let closed = ctx.make_instantiated_type(gen_def, &[string]).unwrap();
    let get = ctx.owned_methods(closed).unwrap()[0];
    let sig = ctx.method_signature(get).unwrap();
    assert_eq!(sig.ret, string);
    assert_eq!(sig.params.as_ref(), &[string]);
}

#[test]
fn type_variables_resolve_through_the_generic_context() {
    let (ctx, module) = load(app_module(vec![class("App", "Program")]));
    let string = ctx.well_known(WellKnownType::String).unwrap();
    let resolved = ctx
        .resolve_sig_type(
            &SigType::TypeVar(0),
            module,
            &GenericContext::for_type(&[string]),
        )
        .unwrap();
    assert_eq!(resolved, string);
}

#[test]
fn display_names_read_like_metadata() {
    let mut gen_class = class("App", "Gen");
    gen_class.generic_params.push(generic_param("T"));
    gen_class.methods.push(instance_method(
        "Get",
        SigType::Prim(PrimitiveKind::Void),
        Vec::new(),
    ));
    let (ctx, module) = load(app_module(vec![gen_class]));

    let gen_def = ctx.get_type(module, "App", "Gen").unwrap();
    let canon = ctx.canon_sentinel(false);
    let shared = ctx.make_instantiated_type(gen_def, &[canon]).unwrap();
    insta::assert_snapshot!(ctx.type_display_name(shared), @"App.Gen<__Canon>");
    insta::assert_snapshot!(
        ctx.type_display_name(ctx.make_array_type(shared)),
        @"App.Gen<__Canon>[]"
    );

    let get = ctx.owned_methods(shared).unwrap()[0];
    insta::assert_snapshot!(ctx.method_display_name(get), @"App.Gen<__Canon>::Get");
}
