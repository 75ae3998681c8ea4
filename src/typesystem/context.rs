//! The type-system context: interning arenas for modules, types, methods and
//! fields, plus signature resolution.
//!
//! All entities are value-identity objects; two structurally equal inputs
//! intern to the same handle. Interning tables are behind `RefCell` so new
//! entities can be created while graph marking iterates; creation is
//! append-only and never invalidates an existing handle.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexSet;

use crate::il::{FieldRef, MethodDef, MethodRef, ModuleDef, PrimitiveKind, SigType, TypeRefSig};
use crate::typesystem::errors::{Result, TypeSystemError};
use crate::typesystem::fields::{FieldData, FieldId, FieldKind};
use crate::typesystem::methods::{MethodData, MethodId, MethodKind, MethodSignature};
use crate::typesystem::types::{
    GenericParamKind, TypeCategory, TypeData, TypeFlags, TypeId, TypeKind,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub u32);

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module#{}", self.0)
    }
}

/// Substitution environment for signature resolution: the generic arguments
/// of the enclosing type and method.
#[derive(Copy, Clone, Debug)]
pub struct GenericContext<'a> {
    pub type_args: &'a [TypeId],
    pub method_args: &'a [TypeId],
}

impl<'a> GenericContext<'a> {
    pub fn empty() -> GenericContext<'static> {
        GenericContext {
            type_args: &[],
            method_args: &[],
        }
    }

    pub fn for_type(type_args: &'a [TypeId]) -> GenericContext<'a> {
        GenericContext {
            type_args,
            method_args: &[],
        }
    }

    pub fn new(type_args: &'a [TypeId], method_args: &'a [TypeId]) -> GenericContext<'a> {
        GenericContext {
            type_args,
            method_args,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WellKnownType {
    Object,
    ValueType,
    String,
    Array,
    MulticastDelegate,
    Primitive(PrimitiveKind),
}

#[derive(Clone, Eq, PartialEq, Hash)]
enum TypeKey {
    Ecma(ModuleId, u32),
    Instantiated(TypeId, Box<[TypeId]>),
    Array(TypeId),
    ByRef(TypeId),
    Pointer(TypeId),
    FnPtr(Box<[TypeId]>),
    GenericParam(GenericParamKind, u16),
    CanonSentinel(bool),
}

#[derive(Clone, Eq, PartialEq, Hash)]
enum MethodKey {
    Ecma(ModuleId, u32, u32),
    OnType(MethodId, TypeId),
    Instantiated(MethodId, Box<[TypeId]>),
}

#[derive(Clone, Eq, PartialEq, Hash)]
enum FieldKey {
    Ecma(ModuleId, u32, u32),
    OnType(FieldId, TypeId),
}

struct ModuleEntry {
    def: Rc<ModuleDef>,
    type_index: HashMap<String, u32>,
}

pub struct TypeSystemContext {
    modules: RefCell<Vec<ModuleEntry>>,
    module_by_name: RefCell<HashMap<String, ModuleId>>,
    system_module: Cell<Option<ModuleId>>,

    types: RefCell<Vec<TypeData>>,
    type_intern: RefCell<HashMap<TypeKey, TypeId>>,
    methods: RefCell<Vec<MethodData>>,
    method_intern: RefCell<HashMap<MethodKey, MethodId>>,
    fields: RefCell<Vec<FieldData>>,
    field_intern: RefCell<HashMap<FieldKey, FieldId>>,

    method_sig_cache: RefCell<HashMap<MethodId, Rc<MethodSignature>>>,
    base_type_cache: RefCell<HashMap<TypeId, Option<TypeId>>>,
    interface_cache: RefCell<HashMap<TypeId, Rc<[TypeId]>>>,
    pub(crate) introduced_slot_cache: RefCell<HashMap<TypeId, Rc<[MethodId]>>>,
    pub(crate) impl_slot_cache: RefCell<HashMap<TypeId, Rc<[MethodId]>>>,
}

impl Default for TypeSystemContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeSystemContext {
    pub fn new() -> Self {
        TypeSystemContext {
            modules: RefCell::new(Vec::new()),
            module_by_name: RefCell::new(HashMap::new()),
            system_module: Cell::new(None),
            types: RefCell::new(Vec::new()),
            type_intern: RefCell::new(HashMap::new()),
            methods: RefCell::new(Vec::new()),
            method_intern: RefCell::new(HashMap::new()),
            fields: RefCell::new(Vec::new()),
            field_intern: RefCell::new(HashMap::new()),
            method_sig_cache: RefCell::new(HashMap::new()),
            base_type_cache: RefCell::new(HashMap::new()),
            interface_cache: RefCell::new(HashMap::new()),
            introduced_slot_cache: RefCell::new(HashMap::new()),
            impl_slot_cache: RefCell::new(HashMap::new()),
        }
    }

    // ---- modules ----

    pub fn load_module(&self, def: ModuleDef) -> Result<ModuleId> {
        if self.module_by_name.borrow().contains_key(&def.name) {
            return Err(TypeSystemError::BadImageFormat(format!(
                "module '{}' loaded twice",
                def.name
            )));
        }
        let mut type_index = HashMap::new();
        for (i, t) in def.types.iter().enumerate() {
            if type_index.insert(t.fullname(), i as u32).is_some() {
                return Err(TypeSystemError::BadImageFormat(format!(
                    "duplicate type '{}' in module '{}'",
                    t.fullname(),
                    def.name
                )));
            }
        }
        let id = ModuleId(self.modules.borrow().len() as u32);
        if def.is_system_module {
            if self.system_module.get().is_some() {
                return Err(TypeSystemError::BadImageFormat(
                    "more than one system module".to_string(),
                ));
            }
            self.system_module.set(Some(id));
        }
        self.module_by_name.borrow_mut().insert(def.name.clone(), id);
        self.modules.borrow_mut().push(ModuleEntry {
            def: Rc::new(def),
            type_index,
        });
        Ok(id)
    }

    pub fn module_def(&self, module: ModuleId) -> Rc<ModuleDef> {
        Rc::clone(&self.modules.borrow()[module.0 as usize].def)
    }

    pub fn module_name(&self, module: ModuleId) -> String {
        self.module_def(module).name.clone()
    }

    pub fn module_by_name(&self, name: &str) -> Option<ModuleId> {
        self.module_by_name.borrow().get(name).copied()
    }

    pub fn modules(&self) -> Vec<ModuleId> {
        (0..self.modules.borrow().len() as u32).map(ModuleId).collect()
    }

    pub fn system_module(&self) -> Option<ModuleId> {
        self.system_module.get()
    }

    pub fn is_system_module(&self, module: ModuleId) -> bool {
        self.system_module.get() == Some(module)
    }

    // ---- type interning ----

    fn lookup_type(&self, key: &TypeKey) -> Option<TypeId> {
        self.type_intern.borrow().get(key).copied()
    }

    fn intern_type(&self, key: TypeKey, data: TypeData) -> TypeId {
        if let Some(id) = self.lookup_type(&key) {
            return id;
        }
        let mut types = self.types.borrow_mut();
        let id = TypeId(types.len() as u32);
        types.push(data);
        drop(types);
        self.type_intern.borrow_mut().insert(key, id);
        id
    }

    pub(crate) fn type_kind(&self, ty: TypeId) -> TypeKind {
        self.types.borrow()[ty.0 as usize].kind.clone()
    }

    pub fn category(&self, ty: TypeId) -> TypeCategory {
        self.types.borrow()[ty.0 as usize].category
    }

    pub fn type_flags(&self, ty: TypeId) -> TypeFlags {
        self.types.borrow()[ty.0 as usize].flags
    }

    fn composite_flags(&self, parts: &[TypeId]) -> TypeFlags {
        let mut acc = TypeFlags::empty();
        let propagated = TypeFlags::HAS_GENERIC_VARIABLES
            | TypeFlags::CANONICAL_SPECIFIC
            | TypeFlags::CANONICAL_UNIVERSAL;
        for &p in parts {
            acc |= self.type_flags(p) & propagated;
        }
        acc
    }

    /// `Context.GetType` of the algebra: a type definition by name, from one
    /// module.
    pub fn get_type(&self, module: ModuleId, namespace: &str, name: &str) -> Result<TypeId> {
        let fqn = if namespace.is_empty() {
            name.to_string()
        } else {
            format!("{namespace}.{name}")
        };
        let (def, def_index) = {
            let modules = self.modules.borrow();
            let entry = &modules[module.0 as usize];
            match entry.type_index.get(&fqn) {
                Some(&i) => (Rc::clone(&entry.def), i),
                None => {
                    return Err(TypeSystemError::TypeLoad {
                        module: entry.def.name.clone(),
                        name: fqn,
                    });
                }
            }
        };
        let key = TypeKey::Ecma(module, def_index);
        if let Some(id) = self.lookup_type(&key) {
            return Ok(id);
        }
        let record = &def.types[def_index as usize];
        let primitive = if def.is_system_module && record.namespace == "System" {
            primitive_by_name(&record.name)
        } else {
            None
        };
        let category = match primitive {
            Some(k) => TypeCategory::Primitive(k),
            None if record.is_interface => TypeCategory::Interface,
            None if record.is_value_type => TypeCategory::ValueType,
            None => TypeCategory::Class,
        };
        let mut flags = TypeFlags::empty();
        if record.is_value_type || primitive.is_some() {
            flags |= TypeFlags::VALUE_TYPE;
        }
        if record.is_interface {
            flags |= TypeFlags::INTERFACE | TypeFlags::ABSTRACT;
        }
        if record.is_abstract {
            flags |= TypeFlags::ABSTRACT;
        }
        if record.is_sealed {
            flags |= TypeFlags::SEALED;
        }
        if record.is_delegate {
            flags |= TypeFlags::DELEGATE;
        }
        Ok(self.intern_type(
            key,
            TypeData {
                kind: TypeKind::Ecma { module, def_index },
                category,
                flags,
            },
        ))
    }

    pub fn well_known(&self, wk: WellKnownType) -> Result<TypeId> {
        let system = self.system_module.get().ok_or_else(|| TypeSystemError::TypeLoad {
            module: "<system>".to_string(),
            name: "no system module loaded".to_string(),
        })?;
        let name = match wk {
            WellKnownType::Object => "Object",
            WellKnownType::ValueType => "ValueType",
            WellKnownType::String => "String",
            WellKnownType::Array => "Array",
            WellKnownType::MulticastDelegate => "MulticastDelegate",
            WellKnownType::Primitive(k) => k.system_name(),
        };
        self.get_type(system, "System", name)
    }

    pub fn make_instantiated_type(&self, def: TypeId, args: &[TypeId]) -> Result<TypeId> {
        if args.is_empty() {
            return Ok(def);
        }
        let (module, def_index) = match self.type_kind(def) {
            TypeKind::Ecma { module, def_index } => (module, def_index),
            _ => {
                return Err(TypeSystemError::BadImageFormat(format!(
                    "cannot instantiate non-definition type '{}'",
                    self.type_display_name(def)
                )));
            }
        };
        let arity = {
            let mdef = self.module_def(module);
            mdef.types[def_index as usize].generic_params.len()
        };
        if arity != args.len() {
            return Err(TypeSystemError::BadImageFormat(format!(
                "generic arity mismatch instantiating '{}': expected {}, got {}",
                self.type_display_name(def),
                arity,
                args.len()
            )));
        }
        let key = TypeKey::Instantiated(def, args.into());
        if let Some(id) = self.lookup_type(&key) {
            return Ok(id);
        }
        let def_data_flags = self.type_flags(def);
        let category = self.category(def);
        let inherited = def_data_flags
            & (TypeFlags::VALUE_TYPE
                | TypeFlags::INTERFACE
                | TypeFlags::ABSTRACT
                | TypeFlags::SEALED
                | TypeFlags::DELEGATE);
        let flags = inherited | self.composite_flags(args);
        Ok(self.intern_type(
            key,
            TypeData {
                kind: TypeKind::Instantiated {
                    def,
                    args: args.into(),
                },
                category,
                flags,
            },
        ))
    }

    pub fn make_array_type(&self, element: TypeId) -> TypeId {
        let key = TypeKey::Array(element);
        if let Some(id) = self.lookup_type(&key) {
            return id;
        }
        let flags = TypeFlags::SEALED | self.composite_flags(&[element]);
        self.intern_type(
            key,
            TypeData {
                kind: TypeKind::Array { element },
                category: TypeCategory::Array,
                flags,
            },
        )
    }

    pub fn make_byref_type(&self, element: TypeId) -> TypeId {
        let key = TypeKey::ByRef(element);
        if let Some(id) = self.lookup_type(&key) {
            return id;
        }
        let flags = self.composite_flags(&[element]);
        self.intern_type(
            key,
            TypeData {
                kind: TypeKind::ByRef { element },
                category: TypeCategory::ByRef,
                flags,
            },
        )
    }

    pub fn make_pointer_type(&self, element: TypeId) -> TypeId {
        let key = TypeKey::Pointer(element);
        if let Some(id) = self.lookup_type(&key) {
            return id;
        }
        let flags = self.composite_flags(&[element]);
        self.intern_type(
            key,
            TypeData {
                kind: TypeKind::Pointer { element },
                category: TypeCategory::Pointer,
                flags,
            },
        )
    }

    pub fn make_function_pointer_type(&self, ret: TypeId, params: &[TypeId]) -> TypeId {
        let mut all = Vec::with_capacity(params.len() + 1);
        all.push(ret);
        all.extend_from_slice(params);
        let key = TypeKey::FnPtr(all.clone().into_boxed_slice());
        if let Some(id) = self.lookup_type(&key) {
            return id;
        }
        let flags = self.composite_flags(&all);
        self.intern_type(
            key,
            TypeData {
                kind: TypeKind::FunctionPointer {
                    ret,
                    params: params.into(),
                },
                category: TypeCategory::FunctionPointer,
                flags,
            },
        )
    }

    pub fn generic_parameter(&self, kind: GenericParamKind, index: u16) -> TypeId {
        let key = TypeKey::GenericParam(kind, index);
        if let Some(id) = self.lookup_type(&key) {
            return id;
        }
        self.intern_type(
            key,
            TypeData {
                kind: TypeKind::GenericParameter { kind, index },
                category: TypeCategory::GenericParameter,
                flags: TypeFlags::HAS_GENERIC_VARIABLES,
            },
        )
    }

    /// The `__Canon` sentinel (or `__UniversalCanon`).
    pub fn canon_sentinel(&self, universal: bool) -> TypeId {
        let key = TypeKey::CanonSentinel(universal);
        if let Some(id) = self.lookup_type(&key) {
            return id;
        }
        let mut flags = TypeFlags::CANONICAL_SPECIFIC | TypeFlags::SEALED;
        if universal {
            flags |= TypeFlags::CANONICAL_UNIVERSAL;
        }
        self.intern_type(
            key,
            TypeData {
                kind: TypeKind::CanonSentinel { universal },
                category: TypeCategory::CanonSentinel,
                flags,
            },
        )
    }

    // ---- type accessors ----

    pub fn is_value_type(&self, ty: TypeId) -> bool {
        self.type_flags(ty).contains(TypeFlags::VALUE_TYPE)
    }

    pub fn is_interface(&self, ty: TypeId) -> bool {
        self.type_flags(ty).contains(TypeFlags::INTERFACE)
    }

    pub fn is_abstract(&self, ty: TypeId) -> bool {
        self.type_flags(ty).contains(TypeFlags::ABSTRACT)
    }

    pub fn is_sealed_type(&self, ty: TypeId) -> bool {
        self.type_flags(ty).contains(TypeFlags::SEALED)
    }

    pub fn is_delegate(&self, ty: TypeId) -> bool {
        self.type_flags(ty).contains(TypeFlags::DELEGATE)
    }

    pub fn is_array(&self, ty: TypeId) -> bool {
        matches!(self.category(ty), TypeCategory::Array)
    }

    pub fn array_element_type(&self, ty: TypeId) -> Option<TypeId> {
        match self.type_kind(ty) {
            TypeKind::Array { element } => Some(element),
            _ => None,
        }
    }

    /// Element of an array, byref, or pointer type.
    pub fn element_type(&self, ty: TypeId) -> Option<TypeId> {
        match self.type_kind(ty) {
            TypeKind::Array { element }
            | TypeKind::ByRef { element }
            | TypeKind::Pointer { element } => Some(element),
            _ => None,
        }
    }

    /// Nesting depth of generic instantiations and composites, used to cut
    /// off unbounded generic expansion.
    pub fn type_nesting_depth(&self, ty: TypeId) -> usize {
        match self.type_kind(ty) {
            TypeKind::Instantiated { args, .. } => {
                1 + args
                    .iter()
                    .map(|&a| self.type_nesting_depth(a))
                    .max()
                    .unwrap_or(0)
            }
            TypeKind::Array { element }
            | TypeKind::ByRef { element }
            | TypeKind::Pointer { element } => 1 + self.type_nesting_depth(element),
            _ => 0,
        }
    }

    pub fn method_nesting_depth(&self, m: MethodId) -> usize {
        let owner = self.type_nesting_depth(self.method_owner(m));
        let inst = self
            .method_instantiation(m)
            .iter()
            .map(|&a| 1 + self.type_nesting_depth(a))
            .max()
            .unwrap_or(0);
        owner.max(inst)
    }

    pub fn is_reference_type(&self, ty: TypeId) -> bool {
        self.types.borrow()[ty.0 as usize].is_reference_type()
    }

    pub fn has_generic_variables(&self, ty: TypeId) -> bool {
        self.type_flags(ty).contains(TypeFlags::HAS_GENERIC_VARIABLES)
    }

    /// The definition a type was instantiated from, or the type itself.
    pub fn type_definition(&self, ty: TypeId) -> TypeId {
        match self.type_kind(ty) {
            TypeKind::Instantiated { def, .. } => def,
            _ => ty,
        }
    }

    pub fn type_instantiation(&self, ty: TypeId) -> Vec<TypeId> {
        match self.type_kind(ty) {
            TypeKind::Instantiated { args, .. } => args.to_vec(),
            _ => Vec::new(),
        }
    }

    pub fn is_generic_definition(&self, ty: TypeId) -> bool {
        match self.type_kind(ty) {
            TypeKind::Ecma { module, def_index } => {
                let def = self.module_def(module);
                !def.types[def_index as usize].generic_params.is_empty()
            }
            _ => false,
        }
    }

    /// Owning module of a definition type (or of the definition behind an
    /// instantiation).
    pub fn type_module(&self, ty: TypeId) -> Option<ModuleId> {
        match self.type_kind(self.type_definition(ty)) {
            TypeKind::Ecma { module, .. } => Some(module),
            _ => None,
        }
    }

    pub(crate) fn type_def_record(&self, ty: TypeId) -> Option<(Rc<ModuleDef>, u32)> {
        match self.type_kind(self.type_definition(ty)) {
            TypeKind::Ecma { module, def_index } => Some((self.module_def(module), def_index)),
            _ => None,
        }
    }

    /// Whether instances of this type carry GC-visible pointers.
    pub fn contains_gc_pointers(&self, ty: TypeId) -> Result<bool> {
        match self.category(ty) {
            TypeCategory::Primitive(_) | TypeCategory::Pointer | TypeCategory::FunctionPointer => {
                Ok(false)
            }
            TypeCategory::Class
            | TypeCategory::Interface
            | TypeCategory::Array
            | TypeCategory::ByRef
            | TypeCategory::CanonSentinel => Ok(true),
            // Conservative for open types.
            TypeCategory::GenericParameter => Ok(true),
            TypeCategory::ValueType => {
                for field in self.owned_fields(ty)? {
                    if self.field_is_static(field) {
                        continue;
                    }
                    let ft = self.field_type(field)?;
                    if ft != ty && self.contains_gc_pointers(ft)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }

    // ---- base type and interfaces ----

    pub fn base_type(&self, ty: TypeId) -> Result<Option<TypeId>> {
        if let Some(cached) = self.base_type_cache.borrow().get(&ty) {
            return Ok(*cached);
        }
        let base = self.compute_base_type(ty)?;
        self.base_type_cache.borrow_mut().insert(ty, base);
        Ok(base)
    }

    fn compute_base_type(&self, ty: TypeId) -> Result<Option<TypeId>> {
        match self.type_kind(ty) {
            TypeKind::Ecma { module, def_index } => {
                let def = self.module_def(module);
                match &def.types[def_index as usize].base {
                    Some(sig) => {
                        let base =
                            self.resolve_sig_type(sig, module, &GenericContext::empty())?;
                        Ok(Some(base))
                    }
                    None => Ok(None),
                }
            }
            TypeKind::Instantiated { def, args } => {
                match self.base_type(def)? {
                    Some(base_of_def) => {
                        Ok(Some(self.instantiate_type(base_of_def, &args, &[])?))
                    }
                    None => Ok(None),
                }
            }
            TypeKind::Array { .. } => {
                match self.well_known(WellKnownType::Array) {
                    Ok(t) => Ok(Some(t)),
                    Err(_) => Ok(self.well_known(WellKnownType::Object).ok()),
                }
            }
            _ => Ok(None),
        }
    }

    /// The flattened, ordered interface set of a type: declared interfaces
    /// first (metadata order), then inherited ones, deduplicated.
    pub fn runtime_interfaces(&self, ty: TypeId) -> Result<Rc<[TypeId]>> {
        if let Some(cached) = self.interface_cache.borrow().get(&ty) {
            return Ok(Rc::clone(cached));
        }
        let mut acc: IndexSet<TypeId> = IndexSet::new();
        let declared = match self.type_kind(ty) {
            TypeKind::Ecma { module, def_index } => {
                let def = self.module_def(module);
                let mut out = Vec::new();
                for sig in &def.types[def_index as usize].interfaces {
                    out.push(self.resolve_sig_type(sig, module, &GenericContext::empty())?);
                }
                out
            }
            TypeKind::Instantiated { def, args } => {
                let of_def = self.runtime_interfaces(def)?;
                let mut out = Vec::new();
                for &i in of_def.iter() {
                    out.push(self.instantiate_type(i, &args, &[])?);
                }
                out
            }
            _ => Vec::new(),
        };
        for i in &declared {
            acc.insert(*i);
            for &nested in self.runtime_interfaces(*i)?.iter() {
                acc.insert(nested);
            }
        }
        if let Some(base) = self.base_type(ty)? {
            for &i in self.runtime_interfaces(base)?.iter() {
                acc.insert(i);
            }
        }
        let rc: Rc<[TypeId]> = acc.into_iter().collect::<Vec<_>>().into();
        self.interface_cache.borrow_mut().insert(ty, Rc::clone(&rc));
        Ok(rc)
    }

    // ---- signature resolution ----

    pub fn resolve_type_ref(&self, r: &TypeRefSig, module: ModuleId) -> Result<TypeId> {
        if let Some(asm) = &r.assembly {
            let m = self.module_by_name(asm).ok_or_else(|| TypeSystemError::TypeLoad {
                module: asm.clone(),
                name: r.fullname(),
            })?;
            return self.get_type(m, &r.namespace, &r.name);
        }
        if let Ok(t) = self.get_type(module, &r.namespace, &r.name) {
            return Ok(t);
        }
        for m in self.modules() {
            if m != module {
                if let Ok(t) = self.get_type(m, &r.namespace, &r.name) {
                    return Ok(t);
                }
            }
        }
        Err(TypeSystemError::TypeLoad {
            module: self.module_name(module),
            name: r.fullname(),
        })
    }

    pub fn resolve_sig_type(
        &self,
        sig: &SigType,
        module: ModuleId,
        ctx: &GenericContext<'_>,
    ) -> Result<TypeId> {
        match sig {
            SigType::Prim(k) => self.well_known(WellKnownType::Primitive(*k)),
            SigType::Named(r) => self.resolve_type_ref(r, module),
            SigType::Inst { def, args } => {
                let def_t = self.resolve_type_ref(def, module)?;
                let mut resolved = Vec::with_capacity(args.len());
                for a in args {
                    resolved.push(self.resolve_sig_type(a, module, ctx)?);
                }
                self.make_instantiated_type(def_t, &resolved)
            }
            SigType::Array(e) => Ok(self.make_array_type(self.resolve_sig_type(e, module, ctx)?)),
            SigType::ByRef(e) => Ok(self.make_byref_type(self.resolve_sig_type(e, module, ctx)?)),
            SigType::Ptr(e) => Ok(self.make_pointer_type(self.resolve_sig_type(e, module, ctx)?)),
            SigType::FnPtr(ms) => {
                if ms.is_vararg {
                    return Err(TypeSystemError::BadImageFormat(
                        "vararg signature".to_string(),
                    ));
                }
                let ret = self.resolve_sig_type(&ms.ret, module, ctx)?;
                let mut params = Vec::with_capacity(ms.params.len());
                for p in &ms.params {
                    params.push(self.resolve_sig_type(p, module, ctx)?);
                }
                Ok(self.make_function_pointer_type(ret, &params))
            }
            SigType::TypeVar(i) => {
                if ctx.type_args.is_empty() {
                    Ok(self.generic_parameter(GenericParamKind::Type, *i))
                } else {
                    ctx.type_args.get(*i as usize).copied().ok_or_else(|| {
                        TypeSystemError::BadImageFormat(format!(
                            "type variable !{i} out of range"
                        ))
                    })
                }
            }
            SigType::MethodVar(i) => {
                if ctx.method_args.is_empty() {
                    Ok(self.generic_parameter(GenericParamKind::Method, *i))
                } else {
                    ctx.method_args.get(*i as usize).copied().ok_or_else(|| {
                        TypeSystemError::BadImageFormat(format!(
                            "method variable !!{i} out of range"
                        ))
                    })
                }
            }
        }
    }

    // ---- methods ----

    fn intern_method(&self, key: MethodKey, data: MethodData) -> MethodId {
        if let Some(&id) = self.method_intern.borrow().get(&key) {
            return id;
        }
        let mut methods = self.methods.borrow_mut();
        let id = MethodId(methods.len() as u32);
        methods.push(data);
        drop(methods);
        self.method_intern.borrow_mut().insert(key, id);
        id
    }

    pub(crate) fn ecma_method(&self, owner: TypeId, method_index: u32) -> MethodId {
        let (module, type_def_index) = match self.type_kind(owner) {
            TypeKind::Ecma { module, def_index } => (module, def_index),
            _ => unreachable!("ecma_method on non-definition type"),
        };
        self.intern_method(
            MethodKey::Ecma(module, type_def_index, method_index),
            MethodData {
                kind: MethodKind::Ecma {
                    module,
                    owner,
                    type_def_index,
                    method_index,
                },
                owner,
            },
        )
    }

    /// `MethodForInstantiatedType`: the method of `List<int>` standing in for
    /// a definition method of `List<T>`.
    pub fn method_for_instantiated_type(&self, def: MethodId, owner: TypeId) -> MethodId {
        debug_assert!(matches!(
            self.type_kind(owner),
            TypeKind::Instantiated { .. }
        ));
        self.intern_method(
            MethodKey::OnType(def, owner),
            MethodData {
                kind: MethodKind::OnInstantiatedType { def, owner },
                owner,
            },
        )
    }

    pub fn make_instantiated_method(&self, def: MethodId, args: &[TypeId]) -> Result<MethodId> {
        if args.is_empty() {
            return Ok(def);
        }
        let arity = self.method_generic_param_count(def);
        if arity as usize != args.len() {
            return Err(TypeSystemError::BadImageFormat(format!(
                "generic arity mismatch instantiating method '{}'",
                self.method_display_name(def)
            )));
        }
        if matches!(
            self.methods.borrow()[def.0 as usize].kind,
            MethodKind::Instantiated { .. }
        ) {
            return Err(TypeSystemError::BadImageFormat(
                "re-instantiating an instantiated method".to_string(),
            ));
        }
        let owner = self.method_owner(def);
        Ok(self.intern_method(
            MethodKey::Instantiated(def, args.into()),
            MethodData {
                kind: MethodKind::Instantiated {
                    def,
                    args: args.into(),
                },
                owner,
            },
        ))
    }

    pub fn method_owner(&self, m: MethodId) -> TypeId {
        self.methods.borrow()[m.0 as usize].owner
    }

    pub(crate) fn method_kind(&self, m: MethodId) -> MethodKind {
        self.methods.borrow()[m.0 as usize].kind.clone()
    }

    /// Strips instantiations down to the metadata definition.
    pub fn typical_method_def(&self, m: MethodId) -> MethodId {
        match self.method_kind(m) {
            MethodKind::Ecma { .. } => m,
            MethodKind::OnInstantiatedType { def, .. } => self.typical_method_def(def),
            MethodKind::Instantiated { def, .. } => self.typical_method_def(def),
        }
    }

    /// The uninstantiated form of a generic method instantiation; identity
    /// for everything else.
    pub fn method_definition(&self, m: MethodId) -> MethodId {
        match self.method_kind(m) {
            MethodKind::Instantiated { def, .. } => def,
            _ => m,
        }
    }

    pub fn method_instantiation(&self, m: MethodId) -> Vec<TypeId> {
        match self.method_kind(m) {
            MethodKind::Instantiated { args, .. } => args.to_vec(),
            _ => Vec::new(),
        }
    }

    pub(crate) fn method_def_record(&self, m: MethodId) -> (Rc<ModuleDef>, u32, u32) {
        match self.method_kind(self.typical_method_def(m)) {
            MethodKind::Ecma {
                module,
                type_def_index,
                method_index,
                ..
            } => (self.module_def(module), type_def_index, method_index),
            _ => unreachable!("typical method is always an ECMA definition"),
        }
    }

    pub fn method_module(&self, m: MethodId) -> ModuleId {
        match self.method_kind(self.typical_method_def(m)) {
            MethodKind::Ecma { module, .. } => module,
            _ => unreachable!(),
        }
    }

    fn with_method_record<R>(&self, m: MethodId, f: impl FnOnce(&MethodDef) -> R) -> R {
        let (module, tdi, mi) = self.method_def_record(m);
        f(&module.types[tdi as usize].methods[mi as usize])
    }

    pub fn method_name(&self, m: MethodId) -> String {
        self.with_method_record(m, |r| r.name.clone())
    }

    pub fn method_is_static(&self, m: MethodId) -> bool {
        self.with_method_record(m, |r| r.is_static)
    }

    pub fn method_is_virtual(&self, m: MethodId) -> bool {
        self.with_method_record(m, |r| r.is_virtual)
    }

    pub fn method_is_abstract(&self, m: MethodId) -> bool {
        self.with_method_record(m, |r| r.is_abstract)
    }

    pub fn method_is_final(&self, m: MethodId) -> bool {
        self.with_method_record(m, |r| r.is_final)
    }

    pub fn method_is_new_slot(&self, m: MethodId) -> bool {
        self.with_method_record(m, |r| r.is_new_slot)
    }

    pub fn method_is_internal_call(&self, m: MethodId) -> bool {
        self.with_method_record(m, |r| r.is_internal_call)
    }

    pub fn method_is_constructor(&self, m: MethodId) -> bool {
        self.with_method_record(m, |r| r.is_constructor())
    }

    pub fn method_has_body(&self, m: MethodId) -> bool {
        self.with_method_record(m, |r| r.body.is_some())
    }

    pub fn method_generic_param_count(&self, m: MethodId) -> u16 {
        self.with_method_record(m, |r| r.generic_param_count)
    }

    pub fn method_has_instantiation(&self, m: MethodId) -> bool {
        !self.method_instantiation(m).is_empty() || self.method_generic_param_count(m) > 0
    }

    /// The generic context a method body executes under.
    pub fn method_generic_context(&self, m: MethodId) -> (Vec<TypeId>, Vec<TypeId>) {
        let type_args = self.type_instantiation(self.method_owner(m));
        let method_args = self.method_instantiation(m);
        (type_args, method_args)
    }

    pub fn method_signature(&self, m: MethodId) -> Result<Rc<MethodSignature>> {
        if let Some(sig) = self.method_sig_cache.borrow().get(&m) {
            return Ok(Rc::clone(sig));
        }
        let (module_def, tdi, mi) = self.method_def_record(m);
        let module = self.method_module(m);
        let record = &module_def.types[tdi as usize].methods[mi as usize];
        if record.signature.is_vararg {
            return Err(TypeSystemError::BadImageFormat(format!(
                "vararg signature on '{}'",
                self.method_display_name(m)
            )));
        }
        let (type_args, method_args) = self.method_generic_context(m);
        let ctx = GenericContext::new(&type_args, &method_args);
        let ret = self.resolve_sig_type(&record.signature.ret, module, &ctx)?;
        let mut params = Vec::with_capacity(record.signature.params.len());
        for p in &record.signature.params {
            params.push(self.resolve_sig_type(p, module, &ctx)?);
        }
        let sig = Rc::new(MethodSignature {
            is_static: record.is_static,
            ret,
            params: params.into(),
        });
        self.method_sig_cache.borrow_mut().insert(m, Rc::clone(&sig));
        Ok(sig)
    }

    /// Declared methods of a type, in metadata order, wrapped for the
    /// instantiation when `ty` is instantiated.
    pub fn owned_methods(&self, ty: TypeId) -> Result<Vec<MethodId>> {
        match self.type_kind(ty) {
            TypeKind::Ecma { module, def_index } => {
                let count = self.module_def(module).types[def_index as usize].methods.len();
                Ok((0..count as u32).map(|i| self.ecma_method(ty, i)).collect())
            }
            TypeKind::Instantiated { def, .. } => {
                let of_def = self.owned_methods(def)?;
                Ok(of_def
                    .into_iter()
                    .map(|m| self.method_for_instantiated_type(m, ty))
                    .collect())
            }
            _ => Ok(Vec::new()),
        }
    }

    pub fn resolve_method_ref(
        &self,
        r: &MethodRef,
        module: ModuleId,
        ctx: &GenericContext<'_>,
    ) -> Result<MethodId> {
        let owner = self.resolve_sig_type(&r.owner, module, ctx)?;
        // Member references resolve against the named type first, then up
        // its base chain.
        let mut cur = Some(owner);
        while let Some(t) = cur {
            if let Some(mut m) = self.find_declared_method(t, r)? {
                if !r.method_inst.is_empty() {
                    let mut args = Vec::with_capacity(r.method_inst.len());
                    for a in &r.method_inst {
                        args.push(self.resolve_sig_type(a, module, ctx)?);
                    }
                    m = self.make_instantiated_method(m, &args)?;
                }
                return Ok(m);
            }
            cur = self.base_type(t)?;
        }
        Err(TypeSystemError::MissingMethod {
            owner: self.type_display_name(owner),
            name: r.name.clone(),
        })
    }

    /// Overloads match on name and arity first, then on the exact metadata
    /// signature; the reference carries the callee's typical parameter
    /// shapes, variables included.
    fn find_declared_method(&self, owner: TypeId, r: &MethodRef) -> Result<Option<MethodId>> {
        let owner_def = self.type_definition(owner);
        let mut found = None;
        for cand in self.owned_methods(owner_def)? {
            let matches = self.with_method_record(cand, |rec| {
                rec.name == r.name && rec.signature.params.len() == r.params.len()
            });
            if !matches {
                continue;
            }
            let exact = self.with_method_record(cand, |rec| rec.signature.params == r.params);
            if exact || found.is_none() {
                found = Some(cand);
                if exact {
                    break;
                }
            }
        }
        Ok(found.map(|def_method| {
            if owner != owner_def {
                self.method_for_instantiated_type(def_method, owner)
            } else {
                def_method
            }
        }))
    }

    // ---- fields ----

    fn intern_field(&self, key: FieldKey, data: FieldData) -> FieldId {
        if let Some(&id) = self.field_intern.borrow().get(&key) {
            return id;
        }
        let mut fields = self.fields.borrow_mut();
        let id = FieldId(fields.len() as u32);
        fields.push(data);
        drop(fields);
        self.field_intern.borrow_mut().insert(key, id);
        id
    }

    pub(crate) fn ecma_field(&self, owner: TypeId, field_index: u32) -> FieldId {
        let (module, type_def_index) = match self.type_kind(owner) {
            TypeKind::Ecma { module, def_index } => (module, def_index),
            _ => unreachable!("ecma_field on non-definition type"),
        };
        self.intern_field(
            FieldKey::Ecma(module, type_def_index, field_index),
            FieldData {
                kind: FieldKind::Ecma {
                    module,
                    owner,
                    type_def_index,
                    field_index,
                },
                owner,
            },
        )
    }

    pub fn field_for_instantiated_type(&self, def: FieldId, owner: TypeId) -> FieldId {
        self.intern_field(
            FieldKey::OnType(def, owner),
            FieldData {
                kind: FieldKind::OnInstantiatedType { def, owner },
                owner,
            },
        )
    }

    pub fn owned_fields(&self, ty: TypeId) -> Result<Vec<FieldId>> {
        match self.type_kind(ty) {
            TypeKind::Ecma { module, def_index } => {
                let count = self.module_def(module).types[def_index as usize].fields.len();
                Ok((0..count as u32).map(|i| self.ecma_field(ty, i)).collect())
            }
            TypeKind::Instantiated { def, .. } => {
                let of_def = self.owned_fields(def)?;
                Ok(of_def
                    .into_iter()
                    .map(|f| self.field_for_instantiated_type(f, ty))
                    .collect())
            }
            _ => Ok(Vec::new()),
        }
    }

    pub fn field_owner(&self, f: FieldId) -> TypeId {
        self.fields.borrow()[f.0 as usize].owner
    }

    fn typical_field_def(&self, f: FieldId) -> FieldId {
        match &self.fields.borrow()[f.0 as usize].kind {
            FieldKind::Ecma { .. } => f,
            FieldKind::OnInstantiatedType { def, .. } => *def,
        }
    }

    fn with_field_record<R>(&self, f: FieldId, g: impl FnOnce(&crate::il::FieldDef) -> R) -> R {
        let typical = self.typical_field_def(f);
        let (module, tdi, fi) = match &self.fields.borrow()[typical.0 as usize].kind {
            FieldKind::Ecma {
                module,
                type_def_index,
                field_index,
                ..
            } => (*module, *type_def_index, *field_index),
            FieldKind::OnInstantiatedType { .. } => unreachable!(),
        };
        let def = self.module_def(module);
        g(&def.types[tdi as usize].fields[fi as usize])
    }

    pub fn field_name(&self, f: FieldId) -> String {
        self.with_field_record(f, |r| r.name.clone())
    }

    pub fn field_is_static(&self, f: FieldId) -> bool {
        self.with_field_record(f, |r| r.is_static)
    }

    pub fn field_is_thread_static(&self, f: FieldId) -> bool {
        self.with_field_record(f, |r| r.is_thread_static)
    }

    pub fn field_is_literal(&self, f: FieldId) -> bool {
        self.with_field_record(f, |r| r.is_literal)
    }

    pub fn field_rva(&self, f: FieldId) -> Option<u32> {
        self.with_field_record(f, |r| r.rva)
    }

    pub fn field_type(&self, f: FieldId) -> Result<TypeId> {
        let owner = self.field_owner(f);
        let module = self
            .type_module(owner)
            .expect("field owner is always a metadata-backed type");
        let type_args = self.type_instantiation(owner);
        let sig = self.with_field_record(f, |r| r.ty.clone());
        self.resolve_sig_type(&sig, module, &GenericContext::for_type(&type_args))
    }

    pub fn resolve_field_ref(
        &self,
        r: &FieldRef,
        module: ModuleId,
        ctx: &GenericContext<'_>,
    ) -> Result<FieldId> {
        let owner = self.resolve_sig_type(&r.owner, module, ctx)?;
        let owner_def = self.type_definition(owner);
        for f in self.owned_fields(owner_def)? {
            if self.field_name(f) == r.name {
                return Ok(if owner != owner_def {
                    self.field_for_instantiated_type(f, owner)
                } else {
                    f
                });
            }
        }
        Err(TypeSystemError::MissingField {
            owner: self.type_display_name(owner),
            name: r.name.clone(),
        })
    }

    /// Byte size of a field of this type, as stored in an RVA block.
    pub fn field_element_size(&self, ty: TypeId) -> Result<usize> {
        match self.category(ty) {
            TypeCategory::Primitive(k) => {
                let size = k.element_size();
                if size == 0 {
                    return Err(TypeSystemError::BadImageFormat(
                        "zero-size field element".to_string(),
                    ));
                }
                Ok(size)
            }
            TypeCategory::ValueType => {
                let mut size = 0usize;
                for f in self.owned_fields(ty)? {
                    if !self.field_is_static(f) {
                        size += self.field_element_size(self.field_type(f)?)?;
                    }
                }
                if size == 0 {
                    return Err(TypeSystemError::BadImageFormat(
                        "zero-size field element".to_string(),
                    ));
                }
                Ok(size)
            }
            TypeCategory::Class
            | TypeCategory::Interface
            | TypeCategory::Array
            | TypeCategory::Pointer
            | TypeCategory::FunctionPointer => Ok(8),
            _ => Err(TypeSystemError::BadImageFormat(format!(
                "open type '{}' has no element size",
                self.type_display_name(ty)
            ))),
        }
    }

    /// Reads the mapped initial data of a static RVA field. The field size
    /// is the element size of the field's type and must fit in the section
    /// block.
    pub fn read_field_rva_data(&self, f: FieldId) -> Result<Vec<u8>> {
        let rva = self.field_rva(f).ok_or_else(|| {
            TypeSystemError::BadImageFormat(format!(
                "field '{}' has no RVA",
                self.field_name(f)
            ))
        })?;
        let size = self.field_element_size(self.field_type(f)?)?;
        let owner = self.field_owner(f);
        let module = self
            .type_module(owner)
            .expect("field owner is always a metadata-backed type");
        let def = self.module_def(module);
        for section in &def.sections {
            if rva >= section.rva && (rva as u64) < section.rva as u64 + section.data.len() as u64 {
                let offset = (rva - section.rva) as usize;
                if section.data.len() - offset < size {
                    return Err(TypeSystemError::BadImageFormat(format!(
                        "RVA data for field '{}' exceeds section block",
                        self.field_name(f)
                    )));
                }
                return Ok(section.data[offset..offset + size].to_vec());
            }
        }
        Err(TypeSystemError::BadImageFormat(format!(
            "RVA {:#x} of field '{}' maps to no section",
            rva,
            self.field_name(f)
        )))
    }

    // ---- entry point ----

    pub fn entry_point(&self, module: ModuleId) -> Result<Option<MethodId>> {
        let def = self.module_def(module);
        let Some(ep) = &def.entry_point else {
            return Ok(None);
        };
        let (ns, name) = split_fqn(&ep.declaring_type);
        let ty = self.get_type(module, ns, name)?;
        for m in self.owned_methods(ty)? {
            if self.method_name(m) == ep.method {
                return Ok(Some(m));
            }
        }
        Err(TypeSystemError::MissingMethod {
            owner: ep.declaring_type.clone(),
            name: ep.method.clone(),
        })
    }

    // ---- display ----

    pub fn type_display_name(&self, ty: TypeId) -> String {
        match self.type_kind(ty) {
            TypeKind::Ecma { module, def_index } => {
                self.module_def(module).types[def_index as usize].fullname()
            }
            TypeKind::Instantiated { def, args } => {
                let args: Vec<String> =
                    args.iter().map(|&a| self.type_display_name(a)).collect();
                format!("{}<{}>", self.type_display_name(def), args.join(", "))
            }
            TypeKind::Array { element } => format!("{}[]", self.type_display_name(element)),
            TypeKind::ByRef { element } => format!("{}&", self.type_display_name(element)),
            TypeKind::Pointer { element } => format!("{}*", self.type_display_name(element)),
            TypeKind::FunctionPointer { ret, params } => {
                let params: Vec<String> =
                    params.iter().map(|&p| self.type_display_name(p)).collect();
                format!(
                    "method {}({})",
                    self.type_display_name(ret),
                    params.join(", ")
                )
            }
            TypeKind::GenericParameter { kind, index } => match kind {
                GenericParamKind::Type => format!("!{index}"),
                GenericParamKind::Method => format!("!!{index}"),
            },
            TypeKind::CanonSentinel { universal } => {
                if universal {
                    "__UniversalCanon".to_string()
                } else {
                    "__Canon".to_string()
                }
            }
        }
    }

    pub fn method_display_name(&self, m: MethodId) -> String {
        let owner = self.type_display_name(self.method_owner(m));
        let name = self.method_name(m);
        let inst = self.method_instantiation(m);
        if inst.is_empty() {
            format!("{owner}::{name}")
        } else {
            let args: Vec<String> = inst.iter().map(|&a| self.type_display_name(a)).collect();
            format!("{owner}::{name}<{}>", args.join(", "))
        }
    }

    pub fn field_display_name(&self, f: FieldId) -> String {
        format!(
            "{}::{}",
            self.type_display_name(self.field_owner(f)),
            self.field_name(f)
        )
    }
}

fn primitive_by_name(name: &str) -> Option<PrimitiveKind> {
    use PrimitiveKind::*;
    Some(match name {
        "Void" => Void,
        "Boolean" => Boolean,
        "Char" => Char,
        "SByte" => SByte,
        "Byte" => Byte,
        "Int16" => Int16,
        "UInt16" => UInt16,
        "Int32" => Int32,
        "UInt32" => UInt32,
        "Int64" => Int64,
        "UInt64" => UInt64,
        "Single" => Single,
        "Double" => Double,
        "IntPtr" => IntPtr,
        "UIntPtr" => UIntPtr,
        _ => return None,
    })
}

pub(crate) fn split_fqn(fqn: &str) -> (&str, &str) {
    match fqn.rfind('.') {
        Some(i) => (&fqn[..i], &fqn[i + 1..]),
        None => ("", fqn),
    }
}
