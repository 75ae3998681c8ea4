//! Canonical forms.
//!
//! Generic instantiations that cannot affect code layout share one compiled
//! body. `Specific` canonicalisation collapses reference-type arguments to
//! the `__Canon` sentinel and keeps value types apart; `Universal` collapses
//! every argument to `__UniversalCanon`.

use crate::typesystem::context::TypeSystemContext;
use crate::typesystem::errors::Result;
use crate::typesystem::methods::MethodId;
use crate::typesystem::types::{CanonicalFormKind, TypeCategory, TypeFlags, TypeId, TypeKind};

impl TypeSystemContext {
    /// Whether the type mentions a canonical sentinel of the given flavour.
    pub fn is_canonical_subtype(&self, ty: TypeId, kind: CanonicalFormKind) -> bool {
        let flags = self.type_flags(ty);
        match kind {
            CanonicalFormKind::Specific => flags.contains(TypeFlags::CANONICAL_SPECIFIC),
            CanonicalFormKind::Universal => flags.contains(TypeFlags::CANONICAL_UNIVERSAL),
        }
    }

    pub fn method_is_canonical(&self, m: MethodId, kind: CanonicalFormKind) -> bool {
        if self.is_canonical_subtype(self.method_owner(m), kind) {
            return true;
        }
        self.method_instantiation(m)
            .iter()
            .any(|&a| self.is_canonical_subtype(a, kind))
    }

    /// Idempotent; commutes with instantiation (modulo value-type
    /// preservation for `Specific`).
    pub fn convert_to_canon_form(&self, ty: TypeId, kind: CanonicalFormKind) -> Result<TypeId> {
        match self.type_kind(ty) {
            TypeKind::Instantiated { def, args } => {
                let ref_constrained = self.reference_constraints_of(def);
                let mut canon_args = Vec::with_capacity(args.len());
                for (i, &a) in args.iter().enumerate() {
                    let constrained = ref_constrained.get(i).copied().unwrap_or(false);
                    canon_args.push(self.canonical_argument(a, constrained, kind)?);
                }
                self.make_instantiated_type(def, &canon_args)
            }
            TypeKind::Array { element } => {
                Ok(self.make_array_type(self.canonical_argument(element, false, kind)?))
            }
            TypeKind::ByRef { element } => {
                Ok(self.make_byref_type(self.convert_to_canon_form(element, kind)?))
            }
            TypeKind::Pointer { element } => {
                Ok(self.make_pointer_type(self.convert_to_canon_form(element, kind)?))
            }
            _ => Ok(ty),
        }
    }

    /// Canonical form of one generic argument. A reference type (or a
    /// parameter constrained to one) collapses to the sentinel; value types
    /// keep identity but canonicalise their own instantiation.
    fn canonical_argument(
        &self,
        arg: TypeId,
        reference_constrained: bool,
        kind: CanonicalFormKind,
    ) -> Result<TypeId> {
        match kind {
            CanonicalFormKind::Universal => Ok(self.canon_sentinel(true)),
            CanonicalFormKind::Specific => {
                if matches!(self.category(arg), TypeCategory::CanonSentinel) {
                    return Ok(arg);
                }
                if self.is_reference_type(arg) {
                    return Ok(self.canon_sentinel(false));
                }
                match self.category(arg) {
                    TypeCategory::GenericParameter if reference_constrained => {
                        Ok(self.canon_sentinel(false))
                    }
                    TypeCategory::ValueType | TypeCategory::Primitive(_) => {
                        self.convert_to_canon_form(arg, kind)
                    }
                    _ => Ok(arg),
                }
            }
        }
    }

    /// The shared body a method's code lives in: owner and method
    /// instantiation both canonicalised.
    pub fn get_canon_method_target(&self, m: MethodId, kind: CanonicalFormKind) -> Result<MethodId> {
        let owner = self.method_owner(m);
        let canon_owner = self.convert_to_canon_form(owner, kind)?;
        let typical = self.typical_method_def(m);
        let uninst = if canon_owner == self.type_definition(canon_owner) {
            typical
        } else {
            self.method_for_instantiated_type(typical, canon_owner)
        };
        let inst = self.method_instantiation(m);
        if inst.is_empty() {
            return Ok(uninst);
        }
        let param_constraints = self.method_reference_constraints(m);
        let mut canon_inst = Vec::with_capacity(inst.len());
        for (i, a) in inst.into_iter().enumerate() {
            let constrained = param_constraints.get(i).copied().unwrap_or(false);
            canon_inst.push(self.canonical_argument(a, constrained, kind)?);
        }
        self.make_instantiated_method(uninst, &canon_inst)
    }

    /// `class`-constraint bits for a definition's generic parameters.
    fn reference_constraints_of(&self, def: TypeId) -> Vec<bool> {
        match self.type_def_record(def) {
            Some((module, def_index)) => module.types[def_index as usize]
                .generic_params
                .iter()
                .map(|p| p.has_reference_type_constraint)
                .collect(),
            None => Vec::new(),
        }
    }

    fn method_reference_constraints(&self, _m: MethodId) -> Vec<bool> {
        // Method generic parameters carry no constraint records in the
        // module model; treat them as unconstrained.
        Vec::new()
    }
}
