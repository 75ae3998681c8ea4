//! The node factory: maps type-system entities to graph nodes.
//!
//! Every accessor is memoised per key, so node identity follows entity
//! identity within one compilation. The factory also encodes the pass
//! policy: the same key yields a lightweight scanned node while scanning
//! and a codegen-backed node while compiling.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::codegen::{CodegenBackend, CompiledMethodBody};
use crate::config::CompilerOptions;
use crate::graph::{DependencyNode, Edge, NodeId};
use crate::modulegroup::ModuleGroup;
use crate::nodes::data::{
    FieldRvaDataNode, MethodMetadataNode, ModuleMetadataNode, ReadOnlyBlobNode, StringLiteralNode,
    TypeMetadataNode,
};
use crate::nodes::dictionary::{
    DictionaryEntry, DictionaryLayoutStore, DictionaryOwner, GenericDictionaryNode,
};
use crate::nodes::helpers::{HelperId, HelperTarget, ReadyToRunHelperNode};
use crate::nodes::method::{
    ExternMethodSymbolNode, GenericVirtualMethodUseNode, InstantiatingUnboxingThunkNode,
    MethodCodeNode, ScannedMethodNode, ShadowConcreteMethodNode, UnboxingStubNode,
    VirtualMethodUseNode,
};
use crate::nodes::type_nodes::{
    CanonicalTypeNode, ConstructedTypeNode, ExternalTypeNode, InterfaceDispatchMapNode,
    NecessaryTypeNode, StaticsNode, VTableNode,
};
use crate::nodes::{NodeKey, StaticsKind};
use crate::reflection::MetadataManager;
use crate::scanner::ScanResults;
use crate::typesystem::{
    CanonicalFormKind, FieldId, MethodId, ModuleId, TypeId, TypeSystemContext,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FactoryMode {
    Scanning,
    Compiling,
}

pub struct NodeFactory {
    ctx: Rc<TypeSystemContext>,
    group: Rc<dyn ModuleGroup>,
    metadata: Rc<dyn MetadataManager>,
    options: CompilerOptions,
    mode: FactoryMode,
    backend: Option<Rc<dyn CodegenBackend>>,
    scan_results: Option<Rc<ScanResults>>,

    nodes: RefCell<Vec<(NodeKey, Rc<dyn DependencyNode>)>>,
    intern: RefCell<HashMap<NodeKey, NodeId>>,
    dictionary_layouts: RefCell<DictionaryLayoutStore>,
    compiled_bodies: RefCell<IndexMap<MethodId, CompiledMethodBody>>,
    scanner_failure: RefCell<Option<String>>,
    exports: RefCell<Vec<(NodeId, String)>>,
}

impl NodeFactory {
    pub fn for_scanning(
        ctx: Rc<TypeSystemContext>,
        group: Rc<dyn ModuleGroup>,
        options: CompilerOptions,
        metadata: Rc<dyn MetadataManager>,
    ) -> Self {
        NodeFactory {
            ctx,
            group,
            metadata,
            options,
            mode: FactoryMode::Scanning,
            backend: None,
            scan_results: None,
            nodes: RefCell::new(Vec::new()),
            intern: RefCell::new(HashMap::new()),
            dictionary_layouts: RefCell::new(DictionaryLayoutStore::recording()),
            compiled_bodies: RefCell::new(IndexMap::new()),
            scanner_failure: RefCell::new(None),
            exports: RefCell::new(Vec::new()),
        }
    }

    pub fn for_compilation(
        ctx: Rc<TypeSystemContext>,
        group: Rc<dyn ModuleGroup>,
        options: CompilerOptions,
        metadata: Rc<dyn MetadataManager>,
        backend: Rc<dyn CodegenBackend>,
        scan_results: Rc<ScanResults>,
    ) -> Self {
        let layouts = DictionaryLayoutStore::frozen_from(scan_results.dictionary_layouts());
        NodeFactory {
            ctx,
            group,
            metadata,
            options,
            mode: FactoryMode::Compiling,
            backend: Some(backend),
            scan_results: Some(scan_results),
            nodes: RefCell::new(Vec::new()),
            intern: RefCell::new(HashMap::new()),
            dictionary_layouts: RefCell::new(layouts),
            compiled_bodies: RefCell::new(IndexMap::new()),
            scanner_failure: RefCell::new(None),
            exports: RefCell::new(Vec::new()),
        }
    }

    // ---- accessors ----

    pub fn type_system(&self) -> &TypeSystemContext {
        &self.ctx
    }

    pub fn type_system_rc(&self) -> Rc<TypeSystemContext> {
        Rc::clone(&self.ctx)
    }

    pub fn module_group(&self) -> &dyn ModuleGroup {
        self.group.as_ref()
    }

    pub fn metadata(&self) -> &dyn MetadataManager {
        self.metadata.as_ref()
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    pub fn mode(&self) -> FactoryMode {
        self.mode
    }

    pub fn backend(&self) -> &dyn CodegenBackend {
        self.backend
            .as_deref()
            .expect("codegen backend is only consulted by the compilation factory")
    }

    pub fn scan_results(&self) -> Option<&ScanResults> {
        self.scan_results.as_deref()
    }

    pub fn node(&self, id: NodeId) -> Rc<dyn DependencyNode> {
        Rc::clone(&self.nodes.borrow()[id.0 as usize].1)
    }

    pub fn node_key(&self, id: NodeId) -> NodeKey {
        self.nodes.borrow()[id.0 as usize].0.clone()
    }

    pub fn node_name(&self, id: NodeId) -> String {
        self.node(id).name(self)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.borrow().len()
    }

    pub fn lookup(&self, key: &NodeKey) -> Option<NodeId> {
        self.intern.borrow().get(key).copied()
    }

    fn intern_node(
        &self,
        key: NodeKey,
        make: impl FnOnce() -> Rc<dyn DependencyNode>,
    ) -> NodeId {
        if let Some(id) = self.lookup(&key) {
            return id;
        }
        let node = make();
        let mut nodes = self.nodes.borrow_mut();
        let id = NodeId(nodes.len() as u32);
        nodes.push((key.clone(), node));
        drop(nodes);
        self.intern.borrow_mut().insert(key, id);
        id
    }

    // ---- method nodes ----

    /// The canonical form a method's code lives in; identity when nothing
    /// about the method is shareable.
    pub fn canonical_method(&self, m: MethodId) -> MethodId {
        self.ctx
            .get_canon_method_target(m, CanonicalFormKind::Specific)
            .unwrap_or(m)
    }

    /// Callable entrypoint of a method. Routes to an extern symbol outside
    /// the module group, to a shadow concrete node for a concrete
    /// instantiation of shared code, and otherwise to the pass-specific
    /// body node.
    pub fn method_entrypoint(&self, m: MethodId) -> NodeId {
        if !self.group.contains_method_body(&self.ctx, m, false) {
            return self.extern_method_symbol(m);
        }
        let canon = self.canonical_method(m);
        if canon != m {
            // A partially-canonical instantiation has no identity of its
            // own; it collapses onto the shared body. Only fully concrete
            // instantiations get a shadow node.
            if self.ctx.method_is_canonical(m, CanonicalFormKind::Specific) {
                return self.method_entrypoint(canon);
            }
            return self.shadow_concrete_method(m);
        }
        self.intern_node(
            NodeKey::MethodEntrypoint {
                method: m,
                unboxing: false,
            },
            || match self.mode {
                FactoryMode::Scanning => Rc::new(ScannedMethodNode { method: m }),
                FactoryMode::Compiling => Rc::new(MethodCodeNode::new(m)),
            },
        )
    }

    pub fn canonical_entrypoint(&self, m: MethodId) -> NodeId {
        self.method_entrypoint(self.canonical_method(m))
    }

    /// Unboxing entrypoint for a value-type instance method. Canonical
    /// shared methods get the instantiating thunk that also supplies the
    /// generic context argument; concrete methods get the plain stub.
    pub fn unboxing_stub_entrypoint(&self, m: MethodId) -> NodeId {
        if !self.group.contains_method_body(&self.ctx, m, true) {
            return self.extern_method_symbol(m);
        }
        let canonical = self
            .ctx
            .method_is_canonical(self.canonical_method(m), CanonicalFormKind::Specific)
            && !self.ctx.method_has_instantiation(m);
        self.intern_node(
            NodeKey::MethodEntrypoint {
                method: m,
                unboxing: true,
            },
            || {
                if canonical {
                    Rc::new(InstantiatingUnboxingThunkNode { target: m })
                } else {
                    Rc::new(UnboxingStubNode { target: m })
                }
            },
        )
    }

    pub fn shadow_concrete_method(&self, m: MethodId) -> NodeId {
        self.intern_node(NodeKey::ShadowConcreteMethod(m), || {
            Rc::new(ShadowConcreteMethodNode { method: m })
        })
    }

    pub fn extern_method_symbol(&self, m: MethodId) -> NodeId {
        self.intern_node(NodeKey::ExternMethod(m), || {
            Rc::new(ExternMethodSymbolNode { method: m })
        })
    }

    pub fn virtual_method_use(&self, decl: MethodId) -> NodeId {
        let decl = self.normalize_virtual_use(decl);
        self.intern_node(NodeKey::VirtualMethodUse(decl), || {
            Rc::new(VirtualMethodUseNode { decl })
        })
    }

    /// Uses of a variant interface's slots collapse onto the interface
    /// definition, so a call through any instantiation triggers the
    /// overrides of every variance-compatible one.
    fn normalize_virtual_use(&self, decl: MethodId) -> MethodId {
        let owner = self.ctx.method_owner(decl);
        if !self.ctx.is_interface(owner) {
            return decl;
        }
        let def = self.ctx.type_definition(owner);
        if def == owner || !self.ctx.interface_has_variance(def) {
            return decl;
        }
        self.ctx.typical_method_def(decl)
    }

    pub fn generic_virtual_method_use(&self, decl: MethodId) -> NodeId {
        self.intern_node(NodeKey::GenericVirtualMethodUse(decl), || {
            Rc::new(GenericVirtualMethodUseNode { decl })
        })
    }

    /// Dependencies of a direct (devirtualised or non-virtual) call.
    pub fn direct_call_dependencies(&self, target: MethodId, reason: &'static str) -> Vec<Edge> {
        let canon = self.canonical_method(target);
        if !self.group.contains_method_body(&self.ctx, canon, false) {
            return vec![Edge::new(self.extern_method_symbol(target), reason)];
        }
        let mut deps = vec![Edge::new(self.method_entrypoint(canon), reason)];
        if canon != target && !self.ctx.method_is_canonical(target, CanonicalFormKind::Specific) {
            deps.push(Edge::new(self.shadow_concrete_method(target), reason));
        }
        deps
    }

    // ---- type nodes ----

    pub fn necessary_type_symbol(&self, ty: TypeId) -> NodeId {
        if !self.group.contains_type(&self.ctx, ty) {
            return self.external_type_symbol(ty);
        }
        self.intern_node(NodeKey::NecessaryType(ty), || Rc::new(NecessaryTypeNode { ty }))
    }

    pub fn constructed_type_symbol(&self, ty: TypeId) -> NodeId {
        if !self.group.contains_type(&self.ctx, ty) {
            return self.external_type_symbol(ty);
        }
        self.intern_node(NodeKey::ConstructedType(ty), || {
            Rc::new(ConstructedTypeNode { ty })
        })
    }

    pub fn canonical_type_symbol(&self, ty: TypeId) -> NodeId {
        let canon = self
            .ctx
            .convert_to_canon_form(ty, CanonicalFormKind::Specific)
            .unwrap_or(ty);
        self.intern_node(NodeKey::CanonicalType(canon), || {
            Rc::new(CanonicalTypeNode { ty: canon })
        })
    }

    pub fn external_type_symbol(&self, ty: TypeId) -> NodeId {
        self.intern_node(NodeKey::ExternalType(ty), || Rc::new(ExternalTypeNode { ty }))
    }

    pub fn vtable(&self, ty: TypeId) -> NodeId {
        self.intern_node(NodeKey::VTable(ty), || Rc::new(VTableNode { ty }))
    }

    pub fn interface_dispatch_map(&self, ty: TypeId) -> NodeId {
        self.intern_node(NodeKey::InterfaceDispatchMap(ty), || {
            Rc::new(InterfaceDispatchMapNode { ty })
        })
    }

    pub fn statics(&self, ty: TypeId, kind: StaticsKind) -> NodeId {
        self.intern_node(NodeKey::Statics(ty, kind), || Rc::new(StaticsNode { ty, kind }))
    }

    // ---- dictionaries ----

    pub fn type_dictionary(&self, ty: TypeId) -> NodeId {
        self.intern_node(NodeKey::TypeDictionary(ty), || {
            Rc::new(GenericDictionaryNode::new(DictionaryOwner::Type(ty)))
        })
    }

    pub fn method_dictionary(&self, m: MethodId) -> NodeId {
        self.intern_node(NodeKey::MethodDictionary(m), || {
            Rc::new(GenericDictionaryNode::new(DictionaryOwner::Method(m)))
        })
    }

    /// Records a runtime-determined lookup against its canonical context.
    /// While compiling, the layout is frozen; a miss is a scanner failure.
    pub fn record_dictionary_entry(&self, owner: DictionaryOwner, entry: DictionaryEntry) {
        let present = self.dictionary_layouts.borrow_mut().record(owner, entry);
        if !present {
            self.report_scanner_failure(format!(
                "dictionary entry {entry:?} of {owner:?} was not predicted by the scanner"
            ));
        }
    }

    pub fn dictionary_entries(&self, owner: DictionaryOwner) -> Vec<DictionaryEntry> {
        self.dictionary_layouts.borrow().entries(owner)
    }

    pub fn export_dictionary_layouts(
        &self,
    ) -> IndexMap<DictionaryOwner, Vec<DictionaryEntry>> {
        self.dictionary_layouts.borrow().export()
    }

    // ---- helpers, data, metadata ----

    pub fn ready_to_run_helper(&self, id: HelperId, target: HelperTarget) -> NodeId {
        self.intern_node(NodeKey::ReadyToRunHelper(id, target), || {
            Rc::new(ReadyToRunHelperNode { id, target })
        })
    }

    pub fn string_literal(&self, value: &str) -> NodeId {
        self.intern_node(NodeKey::StringLiteral(value.to_string()), || {
            Rc::new(StringLiteralNode {
                value: value.to_string(),
            })
        })
    }

    pub fn field_rva_data(&self, field: FieldId, data: Vec<u8>) -> NodeId {
        self.intern_node(NodeKey::FieldRvaData(field), || {
            Rc::new(FieldRvaDataNode {
                field,
                data: data.into(),
            })
        })
    }

    pub fn read_only_data_blob(&self, name: &str, data: Vec<u8>) -> NodeId {
        self.intern_node(NodeKey::ReadOnlyBlob(name.to_string()), || {
            Rc::new(ReadOnlyBlobNode {
                name: name.to_string(),
                data: data.into(),
            })
        })
    }

    pub fn type_metadata(&self, ty: TypeId) -> NodeId {
        self.intern_node(NodeKey::TypeMetadata(ty), || Rc::new(TypeMetadataNode { ty }))
    }

    pub fn method_metadata(&self, m: MethodId) -> NodeId {
        self.intern_node(NodeKey::MethodMetadata(m), || {
            Rc::new(MethodMetadataNode { method: m })
        })
    }

    pub fn module_metadata(&self, module: ModuleId) -> NodeId {
        self.intern_node(NodeKey::ModuleMetadata(module), || {
            Rc::new(ModuleMetadataNode { module })
        })
    }

    // ---- pass bookkeeping ----

    pub fn record_compiled_body(&self, m: MethodId, body: CompiledMethodBody) {
        self.compiled_bodies.borrow_mut().insert(m, body);
    }

    pub fn compiled_bodies(&self) -> IndexMap<MethodId, CompiledMethodBody> {
        self.compiled_bodies.borrow().clone()
    }

    /// First scanner-consistency violation wins; the pass aborts on it
    /// after marking settles.
    pub fn report_scanner_failure(&self, message: String) {
        self.scanner_failure.borrow_mut().get_or_insert(message);
    }

    pub fn scanner_failure(&self) -> Option<String> {
        self.scanner_failure.borrow().clone()
    }

    pub fn add_export(&self, node: NodeId, name: &str) {
        self.exports.borrow_mut().push((node, name.to_string()));
    }

    pub fn exports(&self) -> Vec<(NodeId, String)> {
        self.exports.borrow().clone()
    }
}
