//! The four oracles the scan hands to the compiler.

use ilaot::il::{IlOp, PrimitiveKind, SigType, TypeRefSig};
use ilaot::modulegroup::SingleFileModuleGroup;
use ilaot::nodes::{DictionaryEntry, DictionaryOwner};

use crate::common::*;

fn void() -> SigType {
    SigType::Prim(PrimitiveKind::Void)
}

#[test]
fn vtable_layout_records_exactly_the_used_slots() {
    let mut base = class("App", "Base");
    base.methods.push(ctor());
    base.methods.push(virtual_method("Used", void(), Vec::new()));
    base.methods.push(virtual_method("Unused", void(), Vec::new()));

    let mut program = class("App", "Program");
    program.methods.push(with_body(
        static_method("Main", void(), Vec::new()),
        vec![newobj("App.Base"), callvirt("App.Base", "Used")],
    ));

    let (ctx, module, results) = scan_app(app_module(vec![base, program]));
    let base_ty = ctx.get_type(module, "App", "Base").unwrap();
    let used = ctx
        .owned_methods(base_ty)
        .unwrap()
        .into_iter()
        .find(|&m| ctx.method_name(m) == "Used")
        .unwrap();

    let layout = results.vtable_layouts().layout_for(base_ty).unwrap();
    assert_eq!(layout, &[used]);
}

#[test]
fn dictionary_layout_collects_runtime_determined_lookups() {
    // Gen<T>.Make allocates a List<T>, a lookup only the dictionary can
    // answer in shared code.
    let mut list = class("App", "List");
    list.generic_params.push(generic_param("T"));
    list.methods.push(ctor());

    let mut gen_class = class("App", "Gen");
    gen_class.generic_params.push(generic_param("T"));
    gen_class.methods.push(ctor());
    gen_class.methods.push(with_body(
        instance_method("Make", void(), Vec::new()),
        vec![IlOp::NewObj {
            ctor: ilaot::il::MethodRef {
                owner: SigType::Inst {
                    def: TypeRefSig {
                        assembly: None,
                        namespace: "App".to_string(),
                        name: "List".to_string(),
                    },
                    args: vec![SigType::TypeVar(0)],
                },
                name: ".ctor".to_string(),
                params: Vec::new(),
                method_inst: Vec::new(),
            },
        }],
    ));

    let mut make_call = method_ref("App.Gen", "Make");
    make_call.owner = SigType::Inst {
        def: TypeRefSig {
            assembly: None,
            namespace: "App".to_string(),
            name: "Gen".to_string(),
        },
        args: vec![SigType::named("System", "String")],
    };
    let mut gen_string_ctor = make_call.clone();
    gen_string_ctor.name = ".ctor".to_string();
    let mut program = class("App", "Program");
    program.methods.push(with_body(
        static_method("Main", void(), Vec::new()),
        vec![
            IlOp::NewObj {
                ctor: gen_string_ctor,
            },
            IlOp::CallVirt { method: make_call },
        ],
    ));

    let (ctx, module, results) = scan_app(app_module(vec![list, gen_class, program]));
    let gen_def = ctx.get_type(module, "App", "Gen").unwrap();
    let canon = ctx.canon_sentinel(false);
    let gen_canon = ctx.make_instantiated_type(gen_def, &[canon]).unwrap();

    let layouts = results.dictionary_layouts();
    let entries = layouts
        .get(&DictionaryOwner::Type(gen_canon))
        .expect("the shared Make body records against its canonical context");
    let list_def = ctx.get_type(module, "App", "List").unwrap();
    let open_list = ctx
        .make_instantiated_type(list_def, &[ctx.generic_parameter(ilaot::typesystem::GenericParamKind::Type, 0)])
        .unwrap();
    assert!(entries.contains(&DictionaryEntry::TypeHandle(open_list)));
}

#[test]
fn inlining_policy_follows_construction_and_staticness() {
    let mut target = class("App", "Target");
    target.methods.push(ctor());
    target.methods.push(instance_method("Inst", void(), Vec::new()));
    target.methods.push(static_method("Stat", void(), Vec::new()));

    let mut lonely = class("App", "Lonely");
    lonely.methods.push(instance_method("Inst", void(), Vec::new()));

    let mut point = value_type("App", "Point");
    point.methods.push(instance_method("Flip", void(), Vec::new()));

    let mut program = class("App", "Program");
    program.methods.push(with_body(
        static_method("Main", void(), Vec::new()),
        vec![newobj("App.Target")],
    ));

    let (ctx, module, results) =
        scan_app(app_module(vec![target, lonely, point, program]));
    let group = SingleFileModuleGroup;
    let find = |ty: &str, name: &str| {
        let t = ctx.get_type(module, "App", ty).unwrap();
        ctx.owned_methods(t)
            .unwrap()
            .into_iter()
            .find(|&m| ctx.method_name(m) == name)
            .unwrap()
    };
    let main = find("Program", "Main");
    let policy = results.inlining();

    // Constructed owner, static callee, and value-type owner all inline.
    assert!(policy.can_inline(&ctx, &group, main, find("Target", "Inst")));
    assert!(policy.can_inline(&ctx, &group, main, find("Target", "Stat")));
    assert!(policy.can_inline(&ctx, &group, main, find("Point", "Flip")));
    // An instance method on a never-constructed class does not.
    assert!(!policy.can_inline(&ctx, &group, main, find("Lonely", "Inst")));
}

#[test]
fn blocked_types_are_not_invokable() {
    let mut open_type = class("App", "Open");
    open_type.methods.push(ctor());
    let mut hidden = class("App", "Hidden");
    hidden.blocked_from_reflection = true;
    hidden.methods.push(ctor());

    let mut program = class("App", "Program");
    program.methods.push(with_body(
        static_method("Main", void(), Vec::new()),
        vec![newobj("App.Open"), newobj("App.Hidden")],
    ));

    let (ctx, module, results) = scan_app(app_module(vec![open_type, hidden, program]));
    let open_ty = ctx.get_type(module, "App", "Open").unwrap();
    let hidden_ty = ctx.get_type(module, "App", "Hidden").unwrap();

    assert!(results.is_type_constructed(open_ty));
    assert!(results.is_type_constructed(hidden_ty));
    assert!(results.invokable_types().contains(&open_ty));
    assert!(!results.invokable_types().contains(&hidden_ty));
}

#[test]
fn compiled_methods_with_metadata_are_invokable() {
    let mut program = class("App", "Program");
    program.methods.push(with_body(
        static_method("Main", void(), Vec::new()),
        vec![call("App.Program", "Work")],
    ));
    program.methods.push(static_method("Work", void(), Vec::new()));

    let (ctx, module, results) = scan_app(app_module(vec![program]));
    let program_ty = ctx.get_type(module, "App", "Program").unwrap();
    let work = ctx
        .owned_methods(program_ty)
        .unwrap()
        .into_iter()
        .find(|&m| ctx.method_name(m) == "Work")
        .unwrap();
    assert!(results.is_method_compiled(work));
    assert!(results.invokable_methods().contains(&work));
    assert!(results.methods_with_metadata().contains(&work));
}
