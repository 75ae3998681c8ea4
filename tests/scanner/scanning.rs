use std::rc::Rc;

use ilaot::config::CompilerOptions;
use ilaot::il::{IlOp, MethodRef, PrimitiveKind, SigType, TypeRefSig};
use ilaot::modulegroup::SingleFileModuleGroup;
use ilaot::roots::{LibraryRootProvider, RootProvider};
use ilaot::scanner::Scanner;
use ilaot::typesystem::CanonicalFormKind;

use crate::common::*;

fn void() -> SigType {
    SigType::Prim(PrimitiveKind::Void)
}

fn int() -> SigType {
    SigType::Prim(PrimitiveKind::Int32)
}

/// `F<T>(int)` calls `F<Gen<T>>(n - 1)`: generic recursion that only
/// terminates because instantiations share canonical code.
fn recursive_module() -> ilaot::il::ModuleDef {
    let mut gen_class = class("App", "Gen");
    gen_class.generic_params.push(generic_param("T"));

    let mut rec = class("App", "Rec");
    let mut f = static_method("F", void(), vec![int()]);
    f.generic_param_count = 1;
    f.body = Some(ilaot::il::MethodBody {
        ops: vec![IlOp::Call {
            method: MethodRef {
                owner: SigType::named("App", "Rec"),
                name: "F".to_string(),
                params: vec![int()],
                method_inst: vec![SigType::Inst {
                    def: TypeRefSig {
                        assembly: None,
                        namespace: "App".to_string(),
                        name: "Gen".to_string(),
                    },
                    args: vec![SigType::MethodVar(0)],
                }],
            },
        }],
    });
    rec.methods.push(f);

    let mut program = class("App", "Program");
    let mut call_f = method_ref("App.Rec", "F");
    call_f.params = vec![int()];
    call_f.method_inst = vec![SigType::named("System", "Object")];
    program.methods.push(with_body(
        static_method("Main", void(), Vec::new()),
        vec![IlOp::Call { method: call_f }],
    ));

    app_module(vec![gen_class, rec, program])
}

#[test]
fn generic_recursion_through_canon_terminates() {
    let (ctx, module, results) = scan_app(recursive_module());

    let rec = ctx.get_type(module, "App", "Rec").unwrap();
    let f_def = ctx
        .owned_methods(rec)
        .unwrap()
        .into_iter()
        .find(|&m| ctx.method_name(m) == "F")
        .unwrap();
    let canon = ctx.canon_sentinel(false);
    let f_canonical = ctx.make_instantiated_method(f_def, &[canon]).unwrap();

    // One canonical body carries every instantiation.
    assert!(results.is_method_compiled(f_canonical));
    let f_bodies = results
        .compiled_methods()
        .iter()
        .filter(|&&m| ctx.method_name(m) == "F")
        .count();
    assert_eq!(f_bodies, 1);
}

#[test]
fn a_leaf_type_is_effectively_sealed_after_the_scan() {
    let mut base = class("App", "Base");
    base.methods.push(ctor());
    let mut derived = class("App", "Derived");
    derived.base = Some(SigType::named("App", "Base"));
    derived.methods.push(ctor());
    let mut leaf = class("App", "Leaf");
    leaf.methods.push(ctor());
    let mut ghost = class("App", "Ghost");
    ghost.is_abstract = true;

    let mut program = class("App", "Program");
    program.methods.push(with_body(
        static_method("Main", void(), Vec::new()),
        vec![newobj("App.Derived"), newobj("App.Leaf")],
    ));

    let (ctx, module, results) =
        scan_app(app_module(vec![base, derived, leaf, ghost, program]));
    let base_ty = ctx.get_type(module, "App", "Base").unwrap();
    let derived_ty = ctx.get_type(module, "App", "Derived").unwrap();
    let leaf_ty = ctx.get_type(module, "App", "Leaf").unwrap();
    let ghost_ty = ctx.get_type(module, "App", "Ghost").unwrap();
    let devirt = results.devirtualization();

    // Base is under a constructed type, so it stays open for dispatch.
    assert!(devirt.is_unsealed(base_ty));
    assert!(!devirt.is_effectively_sealed(&ctx, base_ty));
    // Nothing derives from Leaf or Derived.
    assert!(devirt.is_effectively_sealed(&ctx, leaf_ty));
    assert!(devirt.is_effectively_sealed(&ctx, derived_ty));
    // Abstract types never count as sealed.
    assert!(!devirt.is_effectively_sealed(&ctx, ghost_ty));
    // Constructed leaves are invokable.
    assert!(results.invokable_types().contains(&leaf_ty));
}

fn library_module() -> ilaot::il::ModuleDef {
    let mut gen_class = class("App", "Gen");
    gen_class.generic_params.push(generic_param("T"));
    gen_class.methods.push(ctor());
    gen_class.methods.push(instance_method("M", void(), Vec::new()));

    let mut plain = class("App", "Plain");
    plain.methods.push(ctor());
    plain.methods.push(static_method("Helper", void(), Vec::new()));

    let mut module = app_module(vec![gen_class, plain]);
    module.entry_point = None;
    module
}

fn scan_library(root_canonical_code: bool) -> (Rc<ilaot::typesystem::TypeSystemContext>, ilaot::typesystem::ModuleId, ilaot::scanner::ScanResults) {
    let (ctx, module) = load(library_module());
    let options = CompilerOptions {
        root_canonical_code,
        ..CompilerOptions::default()
    };
    let providers: Vec<Rc<dyn RootProvider>> = vec![Rc::new(LibraryRootProvider { module })];
    let results = Scanner::scan(
        Rc::clone(&ctx),
        Rc::new(SingleFileModuleGroup),
        &options,
        &providers,
    );
    (ctx, module, results)
}

#[test]
fn library_rooting_includes_canonical_generics_only_when_enabled() {
    let (ctx, module, results) = scan_library(true);
    let gen_def = ctx.get_type(module, "App", "Gen").unwrap();
    let canon = ctx.canon_sentinel(false);
    let gen_canon = ctx.make_instantiated_type(gen_def, &[canon]).unwrap();
    let m = ctx
        .owned_methods(gen_canon)
        .unwrap()
        .into_iter()
        .find(|&m| ctx.method_name(m) == "M")
        .unwrap();
    assert!(results.is_method_compiled(m));
    assert!(results.is_type_constructed(gen_canon));

    let (ctx2, module2, results2) = scan_library(false);
    let gen_def2 = ctx2.get_type(module2, "App", "Gen").unwrap();
    let canon2 = ctx2.canon_sentinel(false);
    let gen_canon2 = ctx2.make_instantiated_type(gen_def2, &[canon2]).unwrap();
    // Without the flag no generic roots exist at all.
    assert!(!results2.is_type_constructed(gen_canon2));
    assert!(
        !results2
            .compiled_methods()
            .iter()
            .any(|&m| ctx2.method_name(m) == "M")
    );
    // Non-generic library code is rooted either way.
    assert!(
        results2
            .compiled_methods()
            .iter()
            .any(|&m| ctx2.method_name(m) == "Helper")
    );
}

#[test]
fn scan_results_are_deterministic_across_runs() {
    let names = |(ctx, _, results): (
        Rc<ilaot::typesystem::TypeSystemContext>,
        ilaot::typesystem::ModuleId,
        ilaot::scanner::ScanResults,
    )| {
        let methods: Vec<String> = results
            .compiled_methods()
            .iter()
            .map(|&m| ctx.method_display_name(m))
            .collect();
        let types: Vec<String> = results
            .constructed_types()
            .iter()
            .map(|&t| ctx.type_display_name(t))
            .collect();
        (methods, types)
    };
    assert_eq!(
        names(scan_app(recursive_module())),
        names(scan_app(recursive_module()))
    );
}

#[test]
fn canonical_bodies_keep_shadow_nodes_for_concrete_instantiations() {
    let (ctx, module, results) = scan_app(recursive_module());
    let rec = ctx.get_type(module, "App", "Rec").unwrap();
    let f_def = ctx
        .owned_methods(rec)
        .unwrap()
        .into_iter()
        .find(|&m| ctx.method_name(m) == "F")
        .unwrap();
    let object = ctx.well_known(ilaot::typesystem::WellKnownType::Object).unwrap();
    let f_object = ctx.make_instantiated_method(f_def, &[object]).unwrap();
    assert!(
        results.is_key_live(&ilaot::nodes::NodeKey::ShadowConcreteMethod(f_object)),
        "the rooted concrete instantiation tracks its dictionary through a shadow node"
    );
    assert_eq!(
        ctx.get_canon_method_target(f_object, CanonicalFormKind::Specific).unwrap(),
        ctx.make_instantiated_method(f_def, &[ctx.canon_sentinel(false)]).unwrap()
    );
}
