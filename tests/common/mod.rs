//! Fixture builders: a small system module plus helpers to assemble
//! application modules record by record.

#![allow(dead_code)]

use std::rc::Rc;

use ilaot::config::CompilerOptions;
use ilaot::il::{
    EntryPointRef, FieldDef, GenericParamDef, IlOp, MethodBody, MethodDef, MethodRef, MethodSig,
    ModuleDef, PrimitiveKind, Section, SigType, TypeDef, Variance,
};
use ilaot::modulegroup::SingleFileModuleGroup;
use ilaot::roots::{ModuleEntrypointRootProvider, RootProvider};
use ilaot::scanner::{ScanResults, Scanner};
use ilaot::typesystem::{ModuleId, TypeSystemContext};

pub const SYSTEM_MODULE: &str = "corelib";
pub const APP_MODULE: &str = "app";

pub fn class(namespace: &str, name: &str) -> TypeDef {
    TypeDef {
        namespace: namespace.to_string(),
        name: name.to_string(),
        is_interface: false,
        is_value_type: false,
        is_abstract: false,
        is_sealed: false,
        is_delegate: false,
        blocked_from_reflection: false,
        base: Some(SigType::named("System", "Object")),
        interfaces: Vec::new(),
        generic_params: Vec::new(),
        methods: Vec::new(),
        fields: Vec::new(),
    }
}

pub fn interface(namespace: &str, name: &str) -> TypeDef {
    TypeDef {
        is_interface: true,
        is_abstract: true,
        base: None,
        ..class(namespace, name)
    }
}

pub fn value_type(namespace: &str, name: &str) -> TypeDef {
    TypeDef {
        is_value_type: true,
        is_sealed: true,
        base: Some(SigType::named("System", "ValueType")),
        ..class(namespace, name)
    }
}

pub fn generic_param(name: &str) -> GenericParamDef {
    GenericParamDef {
        name: name.to_string(),
        variance: Variance::None,
        has_reference_type_constraint: false,
    }
}

pub fn variant_param(name: &str, variance: Variance) -> GenericParamDef {
    GenericParamDef {
        variance,
        ..generic_param(name)
    }
}

pub fn static_method(name: &str, ret: SigType, params: Vec<SigType>) -> MethodDef {
    MethodDef {
        name: name.to_string(),
        is_static: true,
        is_virtual: false,
        is_new_slot: false,
        is_abstract: false,
        is_final: false,
        is_internal_call: false,
        blocked_from_reflection: false,
        generic_param_count: 0,
        signature: MethodSig::static_sig(ret, params),
        body: Some(MethodBody { ops: Vec::new() }),
    }
}

pub fn instance_method(name: &str, ret: SigType, params: Vec<SigType>) -> MethodDef {
    MethodDef {
        name: name.to_string(),
        is_static: false,
        is_virtual: false,
        is_new_slot: false,
        is_abstract: false,
        is_final: false,
        is_internal_call: false,
        blocked_from_reflection: false,
        generic_param_count: 0,
        signature: MethodSig::instance_sig(ret, params),
        body: Some(MethodBody { ops: Vec::new() }),
    }
}

pub fn virtual_method(name: &str, ret: SigType, params: Vec<SigType>) -> MethodDef {
    let mut m = instance_method(name, ret, params);
    m.is_virtual = true;
    m.is_new_slot = true;
    m
}

pub fn override_method(name: &str, ret: SigType, params: Vec<SigType>) -> MethodDef {
    let mut m = instance_method(name, ret, params);
    m.is_virtual = true;
    m.is_new_slot = false;
    m
}

pub fn abstract_interface_method(name: &str, ret: SigType, params: Vec<SigType>) -> MethodDef {
    let mut m = virtual_method(name, ret, params);
    m.is_abstract = true;
    m.body = None;
    m
}

pub fn ctor() -> MethodDef {
    instance_method(".ctor", SigType::Prim(PrimitiveKind::Void), Vec::new())
}

pub fn with_body(mut m: MethodDef, ops: Vec<IlOp>) -> MethodDef {
    m.body = Some(MethodBody { ops });
    m
}

pub fn instance_field(name: &str, ty: SigType) -> FieldDef {
    FieldDef {
        name: name.to_string(),
        is_static: false,
        is_thread_static: false,
        is_literal: false,
        ty,
        rva: None,
    }
}

pub fn static_field(name: &str, ty: SigType) -> FieldDef {
    FieldDef {
        is_static: true,
        ..instance_field(name, ty)
    }
}

pub fn call(type_fqn: &str, method: &str) -> IlOp {
    IlOp::Call {
        method: method_ref(type_fqn, method),
    }
}

pub fn method_ref(type_fqn: &str, method: &str) -> MethodRef {
    let (ns, name) = split(type_fqn);
    MethodRef {
        owner: SigType::named(ns, name),
        name: method.to_string(),
        params: Vec::new(),
        method_inst: Vec::new(),
    }
}

pub fn newobj(type_fqn: &str) -> IlOp {
    IlOp::NewObj {
        ctor: method_ref(type_fqn, ".ctor"),
    }
}

pub fn callvirt(type_fqn: &str, method: &str) -> IlOp {
    IlOp::CallVirt {
        method: method_ref(type_fqn, method),
    }
}

fn split(fqn: &str) -> (&str, &str) {
    match fqn.rfind('.') {
        Some(i) => (&fqn[..i], &fqn[i + 1..]),
        None => ("", fqn),
    }
}

/// The minimal system module every fixture loads first.
pub fn system_module() -> ModuleDef {
    let mut object = class("System", "Object");
    object.base = None;
    object.methods.push(ctor());

    let mut value_type_def = class("System", "ValueType");
    value_type_def.is_abstract = true;

    let mut string_def = class("System", "String");
    string_def.is_sealed = true;

    let mut array_def = class("System", "Array");
    array_def.is_abstract = true;

    let mut delegate_def = class("System", "MulticastDelegate");
    delegate_def.is_abstract = true;

    let mut types = vec![object, value_type_def, string_def, array_def, delegate_def];
    for prim in [
        PrimitiveKind::Void,
        PrimitiveKind::Boolean,
        PrimitiveKind::Byte,
        PrimitiveKind::Int32,
        PrimitiveKind::Int64,
        PrimitiveKind::Double,
    ] {
        let mut p = class("System", prim.system_name());
        p.is_value_type = true;
        p.is_sealed = true;
        p.base = Some(SigType::named("System", "ValueType"));
        types.push(p);
    }

    ModuleDef {
        name: SYSTEM_MODULE.to_string(),
        is_system_module: true,
        entry_point: None,
        types,
        sections: Vec::new(),
    }
}

/// An application module with an entry point on `App.Program::Main`.
pub fn app_module(types: Vec<TypeDef>) -> ModuleDef {
    ModuleDef {
        name: APP_MODULE.to_string(),
        is_system_module: false,
        entry_point: Some(EntryPointRef {
            declaring_type: "App.Program".to_string(),
            method: "Main".to_string(),
        }),
        types,
        sections: Vec::new(),
    }
}

pub fn app_module_with_sections(types: Vec<TypeDef>, sections: Vec<Section>) -> ModuleDef {
    ModuleDef {
        sections,
        ..app_module(types)
    }
}

/// Loads the system module plus an app module into a fresh context.
pub fn load(app: ModuleDef) -> (Rc<TypeSystemContext>, ModuleId) {
    let ctx = Rc::new(TypeSystemContext::new());
    ctx.load_module(system_module()).expect("system module loads");
    let module = ctx.load_module(app).expect("app module loads");
    (ctx, module)
}

/// Scans an app module from its entry point with default options.
pub fn scan_app(app: ModuleDef) -> (Rc<TypeSystemContext>, ModuleId, ScanResults) {
    scan_app_with_options(app, &CompilerOptions::default())
}

pub fn scan_app_with_options(
    app: ModuleDef,
    options: &CompilerOptions,
) -> (Rc<TypeSystemContext>, ModuleId, ScanResults) {
    let (ctx, module) = load(app);
    let providers: Vec<Rc<dyn RootProvider>> =
        vec![Rc::new(ModuleEntrypointRootProvider { module })];
    let results = Scanner::scan(
        Rc::clone(&ctx),
        Rc::new(SingleFileModuleGroup),
        options,
        &providers,
    );
    (ctx, module, results)
}
