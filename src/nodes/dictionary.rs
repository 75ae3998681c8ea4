//! Generic dictionaries.
//!
//! A canonical body cannot name the concrete types it runs over; every
//! runtime-determined lookup it performs becomes a slot in the dictionary
//! layout of its canonical context. Each concrete instantiation then owns a
//! dictionary whose slots are the layout entries instantiated with its own
//! arguments.

use std::cell::RefCell;

use indexmap::{IndexMap, IndexSet};
use log::warn;

use crate::graph::{DependencyNode, Edge, NodeId};
use crate::nodes::NodeFactory;
use crate::typesystem::{CanonicalFormKind, MethodId, TypeId};

/// Instantiation nesting beyond this collapses onto canonical forms, which
/// bounds the otherwise unbounded expansion of self-referential generics
/// (`F<T>` calling `F<Gen<T>>`).
const MAX_INSTANTIATION_DEPTH: usize = 8;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum DictionaryOwner {
    Type(TypeId),
    Method(MethodId),
}

/// One dictionary slot, stored in open (definition) form; the generic
/// parameters in it are substituted per concrete instantiation.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum DictionaryEntry {
    TypeHandle(TypeId),
    MethodHandle(MethodId),
    /// A call stub: the entry resolves to a method entrypoint.
    MethodEntry(MethodId),
}

/// Per-context ordered dictionary layouts. The scanner's store grows as
/// canonical bodies are analysed; the compiler's is frozen from the scan
/// oracle, and a miss there is a scanner failure.
pub struct DictionaryLayoutStore {
    frozen: bool,
    layouts: IndexMap<DictionaryOwner, IndexSet<DictionaryEntry>>,
}

impl DictionaryLayoutStore {
    pub fn recording() -> Self {
        DictionaryLayoutStore {
            frozen: false,
            layouts: IndexMap::new(),
        }
    }

    pub fn frozen_from(layouts: &IndexMap<DictionaryOwner, Vec<DictionaryEntry>>) -> Self {
        DictionaryLayoutStore {
            frozen: true,
            layouts: layouts
                .iter()
                .map(|(&owner, entries)| (owner, entries.iter().copied().collect()))
                .collect(),
        }
    }

    /// Returns false when the store is frozen and the entry is absent.
    pub fn record(&mut self, owner: DictionaryOwner, entry: DictionaryEntry) -> bool {
        if self.frozen {
            self.layouts
                .get(&owner)
                .is_some_and(|entries| entries.contains(&entry))
        } else {
            self.layouts.entry(owner).or_default().insert(entry);
            true
        }
    }

    pub fn entries(&self, owner: DictionaryOwner) -> Vec<DictionaryEntry> {
        self.layouts
            .get(&owner)
            .map(|e| e.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn export(&self) -> IndexMap<DictionaryOwner, Vec<DictionaryEntry>> {
        self.layouts
            .iter()
            .map(|(&owner, entries)| (owner, entries.iter().copied().collect()))
            .collect()
    }
}

/// The dictionary of one concrete generic context. Slots are consumed from
/// the canonical owner's layout, which may still be growing during a scan,
/// so the node keeps a cursor and re-checks on every marking wave.
pub struct GenericDictionaryNode {
    pub owner: DictionaryOwner,
    consumed: RefCell<usize>,
}

impl GenericDictionaryNode {
    pub fn new(owner: DictionaryOwner) -> Self {
        GenericDictionaryNode {
            owner,
            consumed: RefCell::new(0),
        }
    }

    fn canonical_owner(&self, factory: &NodeFactory) -> DictionaryOwner {
        let ctx = factory.type_system();
        match self.owner {
            DictionaryOwner::Type(t) => DictionaryOwner::Type(
                ctx.convert_to_canon_form(t, crate::typesystem::CanonicalFormKind::Specific)
                    .unwrap_or(t),
            ),
            DictionaryOwner::Method(m) => {
                DictionaryOwner::Method(factory.canonical_method(m))
            }
        }
    }

    /// The substitution this concrete context applies to open entries.
    fn instantiation(&self, factory: &NodeFactory) -> (Vec<TypeId>, Vec<TypeId>) {
        let ctx = factory.type_system();
        match self.owner {
            DictionaryOwner::Type(t) => (ctx.type_instantiation(t), Vec::new()),
            DictionaryOwner::Method(m) => (
                ctx.type_instantiation(ctx.method_owner(m)),
                ctx.method_instantiation(m),
            ),
        }
    }

    fn entry_dependencies(&self, factory: &NodeFactory, from: usize) -> Vec<Edge> {
        let ctx = factory.type_system();
        let canon_owner = self.canonical_owner(factory);
        let entries = factory.dictionary_entries(canon_owner);
        let (type_args, method_args) = self.instantiation(factory);
        let mut deps = Vec::new();
        for entry in entries.iter().skip(from) {
            let result: crate::typesystem::Result<()> = (|| {
                match *entry {
                    DictionaryEntry::TypeHandle(open) => {
                        let concrete = ctx.instantiate_type(open, &type_args, &method_args)?;
                        if ctx.type_nesting_depth(concrete) > MAX_INSTANTIATION_DEPTH {
                            let canon = ctx
                                .convert_to_canon_form(concrete, CanonicalFormKind::Specific)?;
                            deps.push(Edge::new(
                                factory.necessary_type_symbol(canon),
                                "Dictionary type handle (depth cutoff)",
                            ));
                        } else {
                            deps.push(Edge::new(
                                factory.constructed_type_symbol(concrete),
                                "Dictionary type handle",
                            ));
                        }
                    }
                    DictionaryEntry::MethodHandle(open) => {
                        let concrete = ctx.instantiate_method(open, &type_args, &method_args)?;
                        deps.push(Edge::new(
                            factory.necessary_type_symbol(ctx.method_owner(concrete)),
                            "Dictionary method handle",
                        ));
                        deps.push(Edge::new(
                            factory.method_metadata(concrete),
                            "Dictionary method handle",
                        ));
                    }
                    DictionaryEntry::MethodEntry(open) => {
                        let concrete = ctx.instantiate_method(open, &type_args, &method_args)?;
                        if ctx.method_nesting_depth(concrete) > MAX_INSTANTIATION_DEPTH {
                            deps.push(Edge::new(
                                factory.canonical_entrypoint(concrete),
                                "Dictionary call stub (depth cutoff)",
                            ));
                        } else {
                            deps.extend(
                                factory
                                    .direct_call_dependencies(concrete, "Dictionary call stub"),
                            );
                        }
                    }
                }
                Ok(())
            })();
            if let Err(e) = result {
                warn!("dictionary entry of {:?} dropped: {e}", self.owner);
            }
        }
        *self.consumed.borrow_mut() = entries.len();
        deps
    }
}

impl DependencyNode for GenericDictionaryNode {
    fn name(&self, factory: &NodeFactory) -> String {
        let ctx = factory.type_system();
        match self.owner {
            DictionaryOwner::Type(t) => format!("Dictionary {}", ctx.type_display_name(t)),
            DictionaryOwner::Method(m) => format!("Dictionary {}", ctx.method_display_name(m)),
        }
    }

    fn static_dependencies(&self, factory: &NodeFactory) -> Vec<Edge> {
        self.entry_dependencies(factory, 0)
    }

    fn has_dynamic_dependencies(&self) -> bool {
        true
    }

    fn search_dynamic_dependencies(
        &self,
        _marked: &[NodeId],
        _first_new_index: usize,
        factory: &NodeFactory,
    ) -> Vec<Edge> {
        let from = *self.consumed.borrow();
        self.entry_dependencies(factory, from)
    }
}
