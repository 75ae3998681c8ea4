use ilaot::il::{PrimitiveKind, Section, SigType};
use ilaot::typesystem::TypeSystemError;
use ilaot::typesystem::intrinsics::{
    IntrinsicIsa, has_known_support_level_at_compile_time, is_known_supported_at_compile_time,
};

use crate::common::*;

fn rva_fixture(section_len: usize) -> ilaot::il::ModuleDef {
    let mut holder = class("App", "Holder");
    let mut field = static_field("Blob", SigType::Prim(PrimitiveKind::Int64));
    field.rva = Some(0x2000);
    holder.fields.push(field);
    app_module_with_sections(
        vec![holder],
        vec![Section {
            rva: 0x2000,
            data: (0..section_len as u8).collect(),
        }],
    )
}

#[test]
fn rva_field_reads_exactly_the_element_size() {
    let (ctx, module) = load(rva_fixture(16));
    let holder = ctx.get_type(module, "App", "Holder").unwrap();
    let field = ctx.owned_fields(holder).unwrap()[0];
    let data = ctx.read_field_rva_data(field).unwrap();
    assert_eq!(data, vec![0, 1, 2, 3, 4, 5, 6, 7]);
}

#[test]
fn rva_data_shorter_than_the_field_is_a_bad_image() {
    let (ctx, module) = load(rva_fixture(4));
    let holder = ctx.get_type(module, "App", "Holder").unwrap();
    let field = ctx.owned_fields(holder).unwrap()[0];
    let err = ctx.read_field_rva_data(field).unwrap_err();
    assert!(matches!(err, TypeSystemError::BadImageFormat(_)));
}

#[test]
fn rva_outside_any_section_is_a_bad_image() {
    let mut holder = class("App", "Holder");
    let mut field = static_field("Blob", SigType::Prim(PrimitiveKind::Int64));
    field.rva = Some(0x9000);
    holder.fields.push(field);
    let (ctx, module) = load(app_module_with_sections(
        vec![holder],
        vec![Section {
            rva: 0x2000,
            data: vec![0; 64],
        }],
    ));
    let holder_ty = ctx.get_type(module, "App", "Holder").unwrap();
    let field = ctx.owned_fields(holder_ty).unwrap()[0];
    assert!(matches!(
        ctx.read_field_rva_data(field).unwrap_err(),
        TypeSystemError::BadImageFormat(_)
    ));
}

#[test]
fn struct_fields_sum_their_element_sizes() {
    let mut point = value_type("App", "Point");
    point
        .fields
        .push(instance_field("x", SigType::Prim(PrimitiveKind::Int32)));
    point
        .fields
        .push(instance_field("y", SigType::Prim(PrimitiveKind::Int32)));
    let (ctx, module) = load(app_module(vec![point]));
    let point_ty = ctx.get_type(module, "App", "Point").unwrap();
    assert_eq!(ctx.field_element_size(point_ty).unwrap(), 8);

    let string = ctx.well_known(ilaot::typesystem::WellKnownType::String).unwrap();
    assert_eq!(ctx.field_element_size(string).unwrap(), 8);
}

#[test]
fn internal_call_outside_the_system_module_is_an_invalid_program() {
    let mut native = class("App", "Native");
    let mut m = static_method("Magic", SigType::Prim(PrimitiveKind::Void), Vec::new());
    m.is_internal_call = true;
    m.body = None;
    native.methods.push(m);
    let (ctx, module) = load(app_module(vec![native]));
    let native_ty = ctx.get_type(module, "App", "Native").unwrap();
    let magic = ctx.owned_methods(native_ty).unwrap()[0];
    assert!(matches!(
        ilaot::ilimport::method_body_ops(&ctx, magic).unwrap_err(),
        TypeSystemError::InvalidProgram(_)
    ));
}

#[test]
fn runtime_checked_isas_have_no_compile_time_support_level() {
    for isa in [
        IntrinsicIsa::Aes,
        IntrinsicIsa::Pclmulqdq,
        IntrinsicIsa::Sse3,
        IntrinsicIsa::Ssse3,
        IntrinsicIsa::Lzcnt,
    ] {
        assert!(!has_known_support_level_at_compile_time(isa));
    }
    for isa in [
        IntrinsicIsa::Sse,
        IntrinsicIsa::Sse2,
        IntrinsicIsa::Sse41,
        IntrinsicIsa::Sse42,
        IntrinsicIsa::Popcnt,
        IntrinsicIsa::Avx,
        IntrinsicIsa::Avx2,
        IntrinsicIsa::Bmi1,
        IntrinsicIsa::Bmi2,
        IntrinsicIsa::Fma,
    ] {
        assert!(has_known_support_level_at_compile_time(isa));
    }
    assert!(is_known_supported_at_compile_time(IntrinsicIsa::Sse2));
    assert!(!is_known_supported_at_compile_time(IntrinsicIsa::Avx2));
}
