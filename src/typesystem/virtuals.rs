//! Virtual slot layout and compile-time dispatch.
//!
//! Each type definition introduces the slots whose slot-defining ancestor is
//! the type itself; a derived type's vtable is the concatenation of its
//! chain's introduced lists, base-first. Introduced lists and full impl-slot
//! arrays are cached per type.

use std::rc::Rc;

use crate::il::Variance;
use crate::typesystem::context::TypeSystemContext;
use crate::typesystem::errors::Result;
use crate::typesystem::methods::MethodId;
use crate::typesystem::types::TypeId;

impl TypeSystemContext {
    /// The classic most-derived-override walk: follows non-newslot overrides
    /// up the chain to the method that first declared the slot. A generic
    /// method instantiation resolves through its definition and is
    /// re-applied to the slot-defining declaration.
    pub fn find_slot_defining_method(&self, m: MethodId) -> Result<MethodId> {
        let inst = self.method_instantiation(m);
        let mut cur = self.method_definition(m);
        loop {
            if self.method_is_new_slot(cur) {
                break;
            }
            let owner = self.method_owner(cur);
            let Some(base) = self.base_type(owner)? else {
                break;
            };
            let name = self.method_name(cur);
            let sig = self.method_signature(cur)?;
            match self.find_matching_virtual_decl(base, &name, &sig)? {
                Some(decl) => cur = decl,
                None => break,
            }
        }
        if inst.is_empty() {
            Ok(cur)
        } else {
            self.make_instantiated_method(cur, &inst)
        }
    }

    /// First declaration with matching name and signature on `ty` or above.
    fn find_matching_virtual_decl(
        &self,
        ty: TypeId,
        name: &str,
        sig: &crate::typesystem::methods::MethodSignature,
    ) -> Result<Option<MethodId>> {
        let mut cur = Some(ty);
        while let Some(t) = cur {
            for m in self.owned_methods(t)? {
                if self.method_is_virtual(m)
                    && self.method_name(m) == name
                    && self.method_signature(m)?.matches(sig)
                {
                    return Ok(Some(m));
                }
            }
            cur = self.base_type(t)?;
        }
        Ok(None)
    }

    /// Declared virtual methods whose slot-defining ancestor is `ty` itself,
    /// in metadata order.
    pub fn introduced_virtual_slots(&self, ty: TypeId) -> Result<Rc<[MethodId]>> {
        if let Some(cached) = self.introduced_slot_cache.borrow().get(&ty) {
            return Ok(Rc::clone(cached));
        }
        let mut introduced = Vec::new();
        for m in self.owned_methods(ty)? {
            if self.method_is_virtual(m) && self.find_slot_defining_method(m)? == m {
                introduced.push(m);
            }
        }
        let rc: Rc<[MethodId]> = introduced.into();
        self.introduced_slot_cache
            .borrow_mut()
            .insert(ty, Rc::clone(&rc));
        Ok(rc)
    }

    /// The ordered list of virtual slots introduced up through `ty`,
    /// base-first.
    pub fn enum_all_virtual_slots(&self, ty: TypeId) -> Result<Vec<MethodId>> {
        let mut chain = Vec::new();
        let mut cur = Some(ty);
        while let Some(t) = cur {
            chain.push(t);
            cur = self.base_type(t)?;
        }
        let mut slots = Vec::new();
        for t in chain.into_iter().rev() {
            slots.extend_from_slice(&self.introduced_virtual_slots(t)?);
        }
        Ok(slots)
    }

    /// The implementation occupying each slot of `enum_all_virtual_slots`
    /// for `ty`, after applying overrides most-derived-last.
    pub fn implementation_slots(&self, ty: TypeId) -> Result<Rc<[MethodId]>> {
        if let Some(cached) = self.impl_slot_cache.borrow().get(&ty) {
            return Ok(Rc::clone(cached));
        }
        let mut impls: Vec<MethodId> = match self.base_type(ty)? {
            Some(base) => self.implementation_slots(base)?.to_vec(),
            None => Vec::new(),
        };
        let base_slot_count = impls.len();
        impls.extend_from_slice(&self.introduced_virtual_slots(ty)?);
        let slots = self.enum_all_virtual_slots(ty)?;
        debug_assert_eq!(slots.len(), impls.len());
        for m in self.owned_methods(ty)? {
            if !self.method_is_virtual(m) || self.method_is_new_slot(m) {
                continue;
            }
            let decl = self.find_slot_defining_method(m)?;
            if decl == m {
                continue;
            }
            if let Some(i) = slots[..base_slot_count].iter().position(|&s| s == decl) {
                impls[i] = m;
            }
        }
        let rc: Rc<[MethodId]> = impls.into();
        self.impl_slot_cache.borrow_mut().insert(ty, Rc::clone(&rc));
        Ok(rc)
    }

    /// Compile-time vtable dispatch: resolves `slot_decl` on `object_type`.
    /// Generic virtual targets are re-instantiated from the decl's
    /// instantiation.
    pub fn find_virtual_function_target(
        &self,
        slot_decl: MethodId,
        object_type: TypeId,
    ) -> Result<Option<MethodId>> {
        let decl_inst = self.method_instantiation(slot_decl);
        let decl = self.method_definition(slot_decl);
        let slots = self.enum_all_virtual_slots(object_type)?;
        let Some(i) = slots.iter().position(|&s| s == decl) else {
            return Ok(None);
        };
        let target = self.implementation_slots(object_type)?[i];
        if decl_inst.is_empty() {
            Ok(Some(target))
        } else {
            Ok(Some(self.make_instantiated_method(target, &decl_inst)?))
        }
    }

    /// Implicit interface implementation: the most derived instance method
    /// with matching name and signature.
    pub fn resolve_interface_method_to_virtual_method_on_type(
        &self,
        iface_method: MethodId,
        ty: TypeId,
    ) -> Result<Option<MethodId>> {
        let target_iface = self.method_owner(iface_method);
        if !self.runtime_interfaces(ty)?.contains(&target_iface) {
            return Ok(None);
        }
        let iface_inst = self.method_instantiation(iface_method);
        let iface_def = self.method_definition(iface_method);
        let name = self.method_name(iface_def);
        let sig = self.method_signature(iface_def)?;
        let mut cur = Some(ty);
        while let Some(t) = cur {
            for m in self.owned_methods(t)? {
                if !self.method_is_static(m)
                    && self.method_name(m) == name
                    && self.method_signature(m)?.matches(&sig)
                {
                    return Ok(Some(if iface_inst.is_empty() {
                        m
                    } else {
                        self.make_instantiated_method(m, &iface_inst)?
                    }));
                }
            }
            cur = self.base_type(t)?;
        }
        Ok(None)
    }

    /// Variant-aware interface resolution: when the exact interface match
    /// fails, an implemented interface of the same definition with
    /// variance-compatible arguments satisfies the dispatch.
    pub fn resolve_variant_interface_method_to_virtual_method_on_type(
        &self,
        iface_method: MethodId,
        ty: TypeId,
    ) -> Result<Option<MethodId>> {
        if let Some(m) = self.resolve_interface_method_to_virtual_method_on_type(iface_method, ty)? {
            return Ok(Some(m));
        }
        let target_iface = self.method_owner(iface_method);
        let target_def = self.type_definition(target_iface);
        for &implemented in self.runtime_interfaces(ty)?.iter() {
            if implemented == target_iface || self.type_definition(implemented) != target_def {
                continue;
            }
            if !self.variance_compatible_interfaces(implemented, target_iface)? {
                continue;
            }
            let typical = self.typical_method_def(iface_method);
            let variant_decl = self.method_for_instantiated_type(typical, implemented);
            let decl = {
                let inst = self.method_instantiation(iface_method);
                if inst.is_empty() {
                    variant_decl
                } else {
                    self.make_instantiated_method(variant_decl, &inst)?
                }
            };
            if let Some(m) = self.resolve_interface_method_to_virtual_method_on_type(decl, ty)? {
                return Ok(Some(m));
            }
        }
        Ok(None)
    }

    /// Whether any generic parameter of the interface definition declares
    /// variance.
    pub fn interface_has_variance(&self, def: TypeId) -> bool {
        match self.type_def_record(def) {
            Some((module, def_index)) => module.types[def_index as usize]
                .generic_params
                .iter()
                .any(|p| p.variance != Variance::None),
            None => false,
        }
    }

    /// `implemented` satisfies a dispatch through `target` when every
    /// argument pair respects the parameter's declared variance.
    fn variance_compatible_interfaces(&self, implemented: TypeId, target: TypeId) -> Result<bool> {
        let def = self.type_definition(target);
        let Some((module_def, def_index)) = self.type_def_record(def) else {
            return Ok(false);
        };
        let params = &module_def.types[def_index as usize].generic_params;
        let impl_args = self.type_instantiation(implemented);
        let target_args = self.type_instantiation(target);
        if impl_args.len() != target_args.len() {
            return Ok(false);
        }
        for (i, (&ia, &ta)) in impl_args.iter().zip(target_args.iter()).enumerate() {
            let ok = match params.get(i).map(|p| p.variance).unwrap_or(Variance::None) {
                Variance::None => ia == ta,
                Variance::Covariant => self.can_cast_to(ia, ta)?,
                Variance::Contravariant => self.can_cast_to(ta, ia)?,
            };
            if !ok {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Reference conversions only: identity, base chain, implemented
    /// interfaces (variance-aware), and covariant reference arrays.
    pub fn can_cast_to(&self, from: TypeId, to: TypeId) -> Result<bool> {
        if from == to {
            return Ok(true);
        }
        if !self.is_reference_type(from) || !self.is_reference_type(to) {
            return Ok(false);
        }
        if let (Some(fe), Some(te)) = (self.array_element_type(from), self.array_element_type(to)) {
            return Ok(self.is_reference_type(fe) && self.can_cast_to(fe, te)?);
        }
        let mut cur = self.base_type(from)?;
        while let Some(t) = cur {
            if t == to {
                return Ok(true);
            }
            cur = self.base_type(t)?;
        }
        if self.is_interface(to) {
            for &i in self.runtime_interfaces(from)?.iter() {
                if i == to {
                    return Ok(true);
                }
                if self.type_definition(i) == self.type_definition(to)
                    && self.variance_compatible_interfaces(i, to)?
                {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}
