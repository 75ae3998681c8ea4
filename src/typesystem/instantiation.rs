//! Generic substitution over interned types.

use crate::typesystem::context::TypeSystemContext;
use crate::typesystem::errors::Result;
use crate::typesystem::types::{GenericParamKind, TypeId, TypeKind};

impl TypeSystemContext {
    /// Substitutes type and method variables. Fully-instantiated inputs are
    /// a fixed point.
    pub fn instantiate_type(
        &self,
        ty: TypeId,
        type_args: &[TypeId],
        method_args: &[TypeId],
    ) -> Result<TypeId> {
        if !self.has_generic_variables(ty) {
            return Ok(ty);
        }
        match self.type_kind(ty) {
            TypeKind::GenericParameter { kind, index } => {
                let args = match kind {
                    GenericParamKind::Type => type_args,
                    GenericParamKind::Method => method_args,
                };
                Ok(args.get(index as usize).copied().unwrap_or(ty))
            }
            TypeKind::Instantiated { def, args } => {
                let mut new_args = Vec::with_capacity(args.len());
                for &a in args.iter() {
                    new_args.push(self.instantiate_type(a, type_args, method_args)?);
                }
                self.make_instantiated_type(def, &new_args)
            }
            TypeKind::Array { element } => Ok(self.make_array_type(self.instantiate_type(
                element,
                type_args,
                method_args,
            )?)),
            TypeKind::ByRef { element } => Ok(self.make_byref_type(self.instantiate_type(
                element,
                type_args,
                method_args,
            )?)),
            TypeKind::Pointer { element } => Ok(self.make_pointer_type(self.instantiate_type(
                element,
                type_args,
                method_args,
            )?)),
            TypeKind::FunctionPointer { ret, params } => {
                let ret = self.instantiate_type(ret, type_args, method_args)?;
                let mut new_params = Vec::with_capacity(params.len());
                for &p in params.iter() {
                    new_params.push(self.instantiate_type(p, type_args, method_args)?);
                }
                Ok(self.make_function_pointer_type(ret, &new_params))
            }
            // Definitions and sentinels carry no variables.
            _ => Ok(ty),
        }
    }

    /// Substitutes through a method handle: the owner's instantiation and
    /// the method's own instantiation are both mapped.
    pub fn instantiate_method(
        &self,
        m: crate::typesystem::methods::MethodId,
        type_args: &[TypeId],
        method_args: &[TypeId],
    ) -> Result<crate::typesystem::methods::MethodId> {
        let owner = self.method_owner(m);
        let new_owner = self.instantiate_type(owner, type_args, method_args)?;
        let typical = self.typical_method_def(m);
        let uninst = if new_owner == self.type_definition(new_owner) {
            typical
        } else {
            self.method_for_instantiated_type(typical, new_owner)
        };
        let inst = self.method_instantiation(m);
        if inst.is_empty() {
            return Ok(uninst);
        }
        let mut new_inst = Vec::with_capacity(inst.len());
        for a in inst {
            new_inst.push(self.instantiate_type(a, type_args, method_args)?);
        }
        self.make_instantiated_method(uninst, &new_inst)
    }
}
