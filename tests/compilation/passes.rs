use std::rc::Rc;

use ilaot::codegen::ReferenceBackend;
use ilaot::compilation::{CompilerPass, DriverError};
use ilaot::config::CompilerOptions;
use ilaot::driver::CompilationDriver;
use ilaot::graph::DependencyTrackingLevel;
use ilaot::il::{IlOp, PrimitiveKind, SigType, TypeRefSig};
use ilaot::modulegroup::SingleFileModuleGroup;
use ilaot::objwriter::FlatObjectWriter;
use ilaot::roots::{RootProvider, SingleMethodRootProvider};
use ilaot::scanner::Scanner;

use crate::common::*;

fn void() -> SigType {
    SigType::Prim(PrimitiveKind::Void)
}

fn driver_for(
    app: ilaot::il::ModuleDef,
    options: CompilerOptions,
) -> (Rc<ilaot::typesystem::TypeSystemContext>, ilaot::typesystem::ModuleId, CompilationDriver) {
    let (ctx, module) = load(app);
    let mut driver = CompilationDriver::new(
        Rc::clone(&ctx),
        Rc::new(SingleFileModuleGroup),
        options,
        module,
    );
    driver.add_root_provider(Rc::new(ilaot::roots::ModuleEntrypointRootProvider { module }));
    (ctx, module, driver)
}

fn simple_app() -> ilaot::il::ModuleDef {
    let mut helper = class("App", "Helper");
    helper.methods.push(ctor());
    helper.methods.push(static_method("Work", void(), Vec::new()));
    let mut program = class("App", "Program");
    program.methods.push(with_body(
        static_method("Main", void(), Vec::new()),
        vec![
            newobj("App.Helper"),
            call("App.Helper", "Work"),
            IlOp::LdStr {
                value: "hello".to_string(),
            },
        ],
    ));
    app_module(vec![program, helper])
}

#[test]
fn the_driver_compiles_the_closure_end_to_end() {
    let (ctx, module, driver) = driver_for(simple_app(), CompilerOptions::default());
    let results = driver.run(None).expect("compilation succeeds");

    let program = ctx.get_type(module, "App", "Program").unwrap();
    let main = ctx
        .owned_methods(program)
        .unwrap()
        .into_iter()
        .find(|&m| ctx.method_name(m) == "Main")
        .unwrap();
    let body = results.methods.get(&main).expect("main was compiled");
    assert!(!body.is_empty());
    assert!(!body.relocs.is_empty());
    assert!(
        results
            .marked_node_names
            .iter()
            .any(|n| n.contains("StringLiteral"))
    );
}

#[test]
fn compiled_output_is_deterministic() {
    let run = || {
        let (_, _, driver) = driver_for(simple_app(), CompilerOptions::default());
        driver.run(None).unwrap().marked_node_names
    };
    assert_eq!(run(), run());
}

#[test]
fn constructed_types_imply_base_interfaces_and_vtable() {
    let mut iface = interface("App", "IThing");
    iface
        .methods
        .push(abstract_interface_method("Go", void(), Vec::new()));
    let mut base = class("App", "Base");
    base.methods.push(ctor());
    let mut derived = class("App", "Derived");
    derived.base = Some(SigType::named("App", "Base"));
    derived.interfaces.push(SigType::named("App", "IThing"));
    derived.methods.push(ctor());
    derived.methods.push(virtual_method("Go", void(), Vec::new()));

    let mut program = class("App", "Program");
    program.methods.push(with_body(
        static_method("Main", void(), Vec::new()),
        vec![newobj("App.Derived")],
    ));

    let (_, _, driver) =
        driver_for(app_module(vec![iface, base, derived, program]), CompilerOptions::default());
    let results = driver.run(None).unwrap();
    let names = &results.marked_node_names;

    assert!(names.iter().any(|n| n == "ConstructedType App.Derived"));
    assert!(names.iter().any(|n| n == "ConstructedType App.Base"));
    assert!(names.iter().any(|n| n == "ConstructedType App.IThing"));
    assert!(names.iter().any(|n| n == "VTable App.Derived"));
}

#[test]
fn a_compiler_demand_outside_the_scan_is_a_scanner_failure() {
    // The scan roots Quiet::Calm, which constructs S but never dispatches.
    // The compile pass roots Loud::Shout, which also calls through the
    // interface: a slot the scanner never predicted.
    let mut ifoo = interface("App", "IFoo");
    ifoo.methods
        .push(abstract_interface_method("M", void(), Vec::new()));
    let mut s = class("App", "S");
    s.interfaces.push(SigType::named("App", "IFoo"));
    s.methods.push(ctor());
    s.methods.push(virtual_method("M", void(), Vec::new()));

    let mut quiet = class("App", "Quiet");
    quiet.methods.push(with_body(
        static_method("Calm", void(), Vec::new()),
        vec![newobj("App.S")],
    ));
    let mut loud = class("App", "Loud");
    loud.methods.push(with_body(
        static_method("Shout", void(), Vec::new()),
        vec![newobj("App.S"), callvirt("App.IFoo", "M")],
    ));

    let mut module_def = app_module(vec![ifoo, s, quiet, loud]);
    module_def.entry_point = None;
    let (ctx, module) = load(module_def);
    let group = Rc::new(SingleFileModuleGroup);
    let options = CompilerOptions {
        dependency_tracking: DependencyTrackingLevel::FirstEdge,
        ..CompilerOptions::default()
    };

    let scan_roots: Vec<Rc<dyn RootProvider>> = vec![Rc::new(SingleMethodRootProvider {
        module,
        type_fqn: "App.Quiet".to_string(),
        method_name: "Calm".to_string(),
    })];
    let scan = Rc::new(Scanner::scan(
        Rc::clone(&ctx),
        group.clone(),
        &options,
        &scan_roots,
    ));

    let compile_roots: Vec<Rc<dyn RootProvider>> = vec![Rc::new(SingleMethodRootProvider {
        module,
        type_fqn: "App.Loud".to_string(),
        method_name: "Shout".to_string(),
    })];
    let pe = ctx.module_def(module);
    let err = CompilerPass::compile(
        Rc::clone(&ctx),
        group,
        &options,
        &compile_roots,
        scan,
        Rc::new(ReferenceBackend),
        &FlatObjectWriter,
        &pe,
        None,
    )
    .unwrap_err();
    assert!(matches!(err, DriverError::ScannerFailed(_)));
}

#[test]
fn no_generic_code_empties_every_generic_body() {
    let mut gen_class = class("App", "Gen");
    gen_class.generic_params.push(generic_param("T"));
    gen_class.methods.push(ctor());
    gen_class.methods.push(with_body(
        instance_method("M", void(), Vec::new()),
        vec![IlOp::LdStr {
            value: "generic".to_string(),
        }],
    ));

    let mut gen_string_ctor = method_ref("App.Gen", ".ctor");
    gen_string_ctor.owner = SigType::Inst {
        def: TypeRefSig {
            assembly: None,
            namespace: "App".to_string(),
            name: "Gen".to_string(),
        },
        args: vec![SigType::named("System", "String")],
    };
    let mut m_call = gen_string_ctor.clone();
    m_call.name = "M".to_string();

    let mut program = class("App", "Program");
    program.methods.push(with_body(
        static_method("Main", void(), Vec::new()),
        vec![
            IlOp::NewObj {
                ctor: gen_string_ctor,
            },
            IlOp::CallVirt { method: m_call },
            IlOp::LdStr {
                value: "plain".to_string(),
            },
        ],
    ));

    let options = CompilerOptions {
        no_generic_code: true,
        ..CompilerOptions::default()
    };
    let (ctx, module, driver) = driver_for(app_module(vec![gen_class, program]), options);
    let results = driver.run(None).unwrap();

    let gen_def = ctx.get_type(module, "App", "Gen").unwrap();
    let canon = ctx.canon_sentinel(false);
    let gen_canon = ctx.make_instantiated_type(gen_def, &[canon]).unwrap();
    let m_shared = ctx
        .owned_methods(gen_canon)
        .unwrap()
        .into_iter()
        .find(|&m| ctx.method_name(m) == "M")
        .unwrap();
    assert!(results.methods.get(&m_shared).unwrap().is_empty());

    let program_ty = ctx.get_type(module, "App", "Program").unwrap();
    let main = ctx
        .owned_methods(program_ty)
        .unwrap()
        .into_iter()
        .find(|&m| ctx.method_name(m) == "Main")
        .unwrap();
    assert!(!results.methods.get(&main).unwrap().is_empty());
}

#[test]
fn only_canonical_code_keeps_shared_bodies_and_empties_value_instantiations() {
    let mut gen_class = class("App", "Gen");
    gen_class.generic_params.push(generic_param("T"));
    gen_class.methods.push(ctor());
    gen_class.methods.push(with_body(
        instance_method("M", void(), Vec::new()),
        vec![IlOp::LdStr {
            value: "body".to_string(),
        }],
    ));

    let make_ref = |name: &str, arg: SigType| {
        let mut r = method_ref("App.Gen", name);
        r.owner = SigType::Inst {
            def: TypeRefSig {
                assembly: None,
                namespace: "App".to_string(),
                name: "Gen".to_string(),
            },
            args: vec![arg],
        };
        r
    };

    let mut program = class("App", "Program");
    program.methods.push(with_body(
        static_method("Main", void(), Vec::new()),
        vec![
            IlOp::NewObj {
                ctor: make_ref(".ctor", SigType::named("System", "String")),
            },
            IlOp::CallVirt {
                method: make_ref("M", SigType::named("System", "String")),
            },
            IlOp::NewObj {
                ctor: make_ref(".ctor", SigType::Prim(PrimitiveKind::Int32)),
            },
            IlOp::CallVirt {
                method: make_ref("M", SigType::Prim(PrimitiveKind::Int32)),
            },
        ],
    ));

    let options = CompilerOptions {
        only_canonical_code: true,
        ..CompilerOptions::default()
    };
    let (ctx, module, driver) = driver_for(app_module(vec![gen_class, program]), options);
    let results = driver.run(None).unwrap();

    let gen_def = ctx.get_type(module, "App", "Gen").unwrap();
    let canon = ctx.canon_sentinel(false);
    let int32 = ctx
        .well_known(ilaot::typesystem::WellKnownType::Primitive(PrimitiveKind::Int32))
        .unwrap();
    let find_m = |ty| {
        ctx.owned_methods(ty)
            .unwrap()
            .into_iter()
            .find(|&m| ctx.method_name(m) == "M")
            .unwrap()
    };
    let shared_m = find_m(ctx.make_instantiated_type(gen_def, &[canon]).unwrap());
    let int_m = find_m(ctx.make_instantiated_type(gen_def, &[int32]).unwrap());

    assert!(!results.methods.get(&shared_m).unwrap().is_empty());
    assert!(results.methods.get(&int_m).unwrap().is_empty());
}

#[test]
fn runtime_internal_calls_fall_back_to_the_jit() {
    let mut system = system_module();
    let magic = {
        let mut m = static_method("Magic", void(), Vec::new());
        m.is_internal_call = true;
        m.body = None;
        m
    };
    let runtime = {
        let mut t = class("System", "Runtime");
        t.methods.push(magic);
        t
    };
    system.types.push(runtime);

    let mut program = class("App", "Program");
    program.methods.push(with_body(
        static_method("Main", void(), Vec::new()),
        vec![call("System.Runtime", "Magic")],
    ));

    let ctx = Rc::new(ilaot::typesystem::TypeSystemContext::new());
    ctx.load_module(system).unwrap();
    let module = ctx.load_module(app_module(vec![program])).unwrap();
    let mut driver = CompilationDriver::new(
        Rc::clone(&ctx),
        Rc::new(SingleFileModuleGroup),
        CompilerOptions::default(),
        module,
    );
    driver.add_root_provider(Rc::new(ilaot::roots::ModuleEntrypointRootProvider { module }));
    let results = driver.run(None).unwrap();

    let system_id = ctx.module_by_name(SYSTEM_MODULE).unwrap();
    let runtime_ty = ctx.get_type(system_id, "System", "Runtime").unwrap();
    let magic_m = ctx.owned_methods(runtime_ty).unwrap()[0];
    // Present in the image, but left for the runtime JIT.
    assert!(results.methods.get(&magic_m).unwrap().is_empty());
}

#[test]
fn delegate_creation_goes_through_the_ctor_helper() {
    let mut action = class("App", "Action");
    action.is_delegate = true;
    action.base = Some(SigType::named("System", "MulticastDelegate"));
    action.methods.push(ctor());

    let mut program = class("App", "Program");
    program.methods.push(static_method("Target", void(), Vec::new()));
    program.methods.push(with_body(
        static_method("Main", void(), Vec::new()),
        vec![
            IlOp::LdFtn {
                method: method_ref("App.Program", "Target"),
            },
            newobj("App.Action"),
        ],
    ));

    let (_, _, driver) = driver_for(app_module(vec![action, program]), CompilerOptions::default());
    let results = driver.run(None).unwrap();
    assert!(
        results
            .marked_node_names
            .iter()
            .any(|n| n.starts_with("Helper DelegateCtor"))
    );
    // The delegate target is reachable through the helper.
    assert!(
        results
            .marked_node_names
            .iter()
            .any(|n| n.contains("App.Program::Target"))
    );
}

#[test]
fn reflectable_entities_land_in_the_metadata_blob() {
    let (ctx, module, driver) = driver_for(simple_app(), CompilerOptions::default());
    let results = driver.run(None).unwrap();
    assert!(!results.metadata.blob.is_empty());

    let helper = ctx.get_type(module, "App", "Helper").unwrap();
    let work = ctx
        .owned_methods(helper)
        .unwrap()
        .into_iter()
        .find(|&m| ctx.method_name(m) == "Work")
        .unwrap();
    assert!(results.metadata.method_map.contains_key(&work));
}

/// Deletes the image even when an assertion unwinds.
struct RemoveOnDrop(std::path::PathBuf);

impl Drop for RemoveOnDrop {
    fn drop(&mut self) {
        std::fs::remove_file(&self.0).ok();
    }
}

#[test]
fn the_object_writer_emits_a_flat_image() {
    let out = std::env::temp_dir().join(format!(
        "ilaot-flat-image-{}-{:?}.native.json",
        std::process::id(),
        std::thread::current().id()
    ));
    let _cleanup = RemoveOnDrop(out.clone());
    let (_, _, driver) = driver_for(simple_app(), CompilerOptions::default());
    driver.run(Some(&out)).unwrap();
    let text = std::fs::read_to_string(&out).unwrap();
    let image: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(image["module"], "app");
    assert!(!image["symbols"].as_array().unwrap().is_empty());
}
