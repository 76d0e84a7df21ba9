//=========================================================================
// Scene Units
//=========================================================================
//
// Composable entities owning per-phase capability modules and callback
// chains.
//
// Architecture:
//   SceneUnit
//     ├─ update_modules: NamespaceTree<SharedModule>
//     ├─ render_modules: NamespaceTree<SharedModule>
//     ├─ pending:        buffered attach/detach/toggle requests
//     └─ callbacks:      user chains behind the required dispatch
//
// A phase run iterates one collection while behaviors raise structural
// requests through a scope. The scope can only buffer; the buffers flush
// the moment the phase completes. That discipline is what lets a module
// attach or detach siblings from inside the very iteration that runs it.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, warn};
use thiserror::Error;

//=== Internal Dependencies ===============================================

use crate::core::backend::RenderBackend;
use crate::core::capability::{CapabilityModule, Phase};
use crate::core::context::{FrameContext, PropertyBag};
use crate::core::namespace::{NamespaceError, NamespaceTree, VisitOrder};
use crate::core::FlagGuard;

//=== Module Declarations =================================================

mod group;

//=== Public API ==========================================================

pub use group::{SceneUnitGroup, TraversalOrder, UnitFilter};

//=== Unit Id =============================================================

/// Stable identity for a scene unit, independent of its (optional) name.
///
/// Ids come from a process-wide counter, so anonymous units can be found
/// again for bucket removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(u64);

impl UnitId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        UnitId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

//=== Unit Error ==========================================================

/// Module attachment failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UnitError {
    /// A module with that name already occupies a matching phase
    /// collection.
    #[error("a module named `{0}` is already attached for that phase")]
    DuplicateModule(String),

    /// No attached module has that name.
    #[error("no module named `{0}` is attached")]
    ModuleNotFound(String),

    /// The module name is not a valid namespace path.
    #[error("invalid module name `{0}`")]
    InvalidName(String),
}

fn module_error(name: &str, err: NamespaceError) -> UnitError {
    match err {
        NamespaceError::DuplicateName(_) => UnitError::DuplicateModule(name.to_string()),
        NamespaceError::InvalidPath(_) => UnitError::InvalidName(name.to_string()),
        NamespaceError::NotFound(_) => UnitError::ModuleNotFound(name.to_string()),
    }
}

//=== Shared Module Storage ===============================================

// A `Both` module occupies the update and render collections under the
// same key; the core is single-threaded, so shared storage is interior
// mutability, not locking.
pub(crate) type SharedModule = Rc<RefCell<CapabilityModule>>;

#[derive(Default)]
struct PendingOps {
    add: Vec<SharedModule>,
    remove: Vec<String>,
    set_active: Vec<(String, bool)>,
}

//=== Unit Scope ==========================================================

/// What a behavior or callback sees of its unit during the update phase.
///
/// Structural requests (`attach`, `detach`, `set_module_active`) are
/// buffered and applied when the phase completes; the scope never hands
/// out the phase collections themselves.
pub struct UnitScope<'a> {
    unit: UnitId,
    unit_name: Option<&'a str>,
    parent_mode: Option<&'a str>,
    pending: &'a mut PendingOps,

    /// Frame-wide shared state (event queue, blackboard, physics).
    pub ctx: &'a mut FrameContext,
}

impl UnitScope<'_> {
    //--- Identity ---------------------------------------------------------

    /// The running unit's id.
    pub fn unit_id(&self) -> UnitId {
        self.unit
    }

    /// The running unit's name, if it has one.
    pub fn unit_name(&self) -> Option<&str> {
        self.unit_name
    }

    /// Name of the mode this unit belongs to, if any.
    pub fn parent_mode(&self) -> Option<&str> {
        self.parent_mode
    }

    //--- Deferred Structural Requests -------------------------------------

    /// Requests attachment of `module` once the running phase completes.
    pub fn attach(&mut self, module: CapabilityModule) {
        self.pending.add.push(Rc::new(RefCell::new(module)));
    }

    /// Requests detachment of the named module once the running phase
    /// completes. Unknown names are skipped quietly at flush.
    pub fn detach(&mut self, name: &str) {
        self.pending.remove.push(name.to_string());
    }

    /// Requests an activity toggle once the running phase completes.
    pub fn set_module_active(&mut self, name: &str, active: bool) {
        self.pending.set_active.push((name.to_string(), active));
    }

    //--- Mode Requests ----------------------------------------------------

    /// Queues an activation request for `target`, sent on behalf of this
    /// unit's parent mode.
    pub fn activate_mode(&mut self, target: &str, args: PropertyBag) {
        let sender = self.parent_mode.map(str::to_string);
        self.ctx.events.push_activate(sender, target, args);
    }

    /// Queues a deactivation request for `target`.
    pub fn deactivate_mode(&mut self, target: &str) {
        self.ctx.events.push_deactivate(target);
    }
}

//=== Unit Render Scope ===================================================

/// Render-phase counterpart of [`UnitScope`].
///
/// Carries the render backend and the same deferral surface, but only a
/// shared view of the frame context: rendering never raises scheduling
/// events.
pub struct UnitRenderScope<'a> {
    unit: UnitId,
    unit_name: Option<&'a str>,
    pending: &'a mut PendingOps,

    /// Frame-wide shared state, read-only during render.
    pub ctx: &'a FrameContext,

    /// Drawing primitive for this frame.
    pub backend: &'a mut dyn RenderBackend,
}

impl UnitRenderScope<'_> {
    /// The running unit's id.
    pub fn unit_id(&self) -> UnitId {
        self.unit
    }

    /// The running unit's name, if it has one.
    pub fn unit_name(&self) -> Option<&str> {
        self.unit_name
    }

    /// Requests attachment of `module` once the running phase completes.
    pub fn attach(&mut self, module: CapabilityModule) {
        self.pending.add.push(Rc::new(RefCell::new(module)));
    }

    /// Requests detachment of the named module once the running phase
    /// completes.
    pub fn detach(&mut self, name: &str) {
        self.pending.remove.push(name.to_string());
    }

    /// Requests an activity toggle once the running phase completes.
    pub fn set_module_active(&mut self, name: &str, active: bool) {
        self.pending.set_active.push((name.to_string(), active));
    }
}

//=== Callback Chains =====================================================

pub type UnitCallback = Box<dyn FnMut(&mut UnitScope<'_>)>;
pub type UnitRenderCallback = Box<dyn FnMut(&mut UnitRenderScope<'_>)>;

//=== Scene Unit ==========================================================

/// A composable entity owning capability modules and callback chains.
///
/// Units are either named (addressable by path within their group) or
/// anonymous (found only by id in a bucket). Each phase run dispatches
/// the phase's modules first, then the user callbacks in registration
/// order; the dispatch is the required head of the chain and cannot be
/// cleared.
pub struct SceneUnit {
    id: UnitId,
    name: Option<String>,
    parent_mode: Option<String>,
    update_modules: NamespaceTree<SharedModule>,
    render_modules: NamespaceTree<SharedModule>,
    pending: PendingOps,
    mid_update: Cell<bool>,
    mid_render: Cell<bool>,
    update_callbacks: Vec<UnitCallback>,
    render_callbacks: Vec<UnitRenderCallback>,
}

impl SceneUnit {
    //--- Construction -----------------------------------------------------

    /// Creates a named unit.
    pub fn named(name: impl Into<String>) -> Self {
        Self::build(Some(name.into()))
    }

    /// Creates an anonymous unit, addressable only by id.
    pub fn anonymous() -> Self {
        Self::build(None)
    }

    fn build(name: Option<String>) -> Self {
        Self {
            id: UnitId::next(),
            name,
            parent_mode: None,
            update_modules: NamespaceTree::new("update"),
            render_modules: NamespaceTree::new("render"),
            pending: PendingOps::default(),
            mid_update: Cell::new(false),
            mid_render: Cell::new(false),
            update_callbacks: Vec::new(),
            render_callbacks: Vec::new(),
        }
    }

    //--- Accessors --------------------------------------------------------

    /// Stable id, assigned at construction.
    pub fn id(&self) -> UnitId {
        self.id
    }

    /// The unit's name; `None` for anonymous units.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Name of the owning mode, if the unit is bound to one.
    pub fn parent_mode(&self) -> Option<&str> {
        self.parent_mode.as_deref()
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    pub(crate) fn set_parent_mode(&mut self, mode: Option<String>) {
        self.parent_mode = mode;
    }

    /// Number of modules in the update collection.
    pub fn update_module_count(&self) -> usize {
        self.update_modules.len()
    }

    /// Number of modules in the render collection.
    pub fn render_module_count(&self) -> usize {
        self.render_modules.len()
    }

    /// True if a module with that name is attached in either phase
    /// collection.
    pub fn has_module(&self, name: &str) -> bool {
        self.find_module(name).is_some()
    }

    /// The named module's activity flag, if attached.
    pub fn module_is_active(&self, name: &str) -> Option<bool> {
        self.find_module(name).map(|shared| shared.borrow().is_active())
    }

    //--- Attachment -------------------------------------------------------

    /// Attaches a capability module.
    ///
    /// If the unit is mid-iterating a phase the module belongs to, the
    /// whole attach is deferred until that phase completes, even when
    /// only one of a `Both` module's phases is busy, so both collections
    /// gain the entry atomically from the caller's perspective.
    /// Otherwise the module is inserted immediately and its attach hook
    /// fires synchronously.
    pub fn attach(&mut self, module: CapabilityModule) -> Result<(), UnitError> {
        if self.phase_busy(module.phase()) {
            debug!(
                "unit {} deferring attach of `{}` until the running phase completes",
                self.id,
                module.name()
            );
            self.pending.add.push(Rc::new(RefCell::new(module)));
            return Ok(());
        }
        self.attach_now(Rc::new(RefCell::new(module)))
    }

    /// Detaches the named module.
    ///
    /// Mid-phase requests are deferred symmetrically to [`attach`];
    /// immediate requests against an unknown name fail with
    /// [`UnitError::ModuleNotFound`].
    ///
    /// [`attach`]: SceneUnit::attach
    pub fn detach(&mut self, name: &str) -> Result<(), UnitError> {
        let shared = self
            .find_module(name)
            .ok_or_else(|| UnitError::ModuleNotFound(name.to_string()))?;

        if self.phase_busy(shared.borrow().phase()) {
            debug!("unit {} deferring detach of `{}`", self.id, name);
            self.pending.remove.push(name.to_string());
            return Ok(());
        }
        self.detach_now(name)
    }

    /// Enables or disables the named module without detaching it.
    pub fn set_module_active(&mut self, name: &str, active: bool) -> Result<(), UnitError> {
        let shared = self
            .find_module(name)
            .ok_or_else(|| UnitError::ModuleNotFound(name.to_string()))?;
        shared.borrow_mut().set_active(active);
        Ok(())
    }

    //--- Callback Registration --------------------------------------------

    /// Replaces the user update chain with a single callback. The
    /// internal module dispatch stays chained first regardless.
    pub fn set_update_callback(&mut self, callback: impl FnMut(&mut UnitScope<'_>) + 'static) {
        self.update_callbacks.clear();
        self.update_callbacks.push(Box::new(callback));
    }

    /// Appends a callback to the user update chain.
    pub fn add_update_callback(&mut self, callback: impl FnMut(&mut UnitScope<'_>) + 'static) {
        self.update_callbacks.push(Box::new(callback));
    }

    /// Replaces the user render chain with a single callback.
    pub fn set_render_callback(
        &mut self,
        callback: impl FnMut(&mut UnitRenderScope<'_>) + 'static,
    ) {
        self.render_callbacks.clear();
        self.render_callbacks.push(Box::new(callback));
    }

    /// Appends a callback to the user render chain.
    pub fn add_render_callback(
        &mut self,
        callback: impl FnMut(&mut UnitRenderScope<'_>) + 'static,
    ) {
        self.render_callbacks.push(Box::new(callback));
    }

    //--- Phase Execution --------------------------------------------------

    /// Runs the update phase: active update modules in collection order,
    /// then the user callback chain, then the pending-request flush.
    ///
    /// The mid-phase flag is cleared by a guard even if a callback
    /// panics, so the unit cannot be left permanently "iterating".
    pub fn run_update_phase(&mut self, ctx: &mut FrameContext) {
        let modules = collect_modules(&self.update_modules);

        {
            let _guard = FlagGuard::set(&self.mid_update);
            let mut scope = UnitScope {
                unit: self.id,
                unit_name: self.name.as_deref(),
                parent_mode: self.parent_mode.as_deref(),
                pending: &mut self.pending,
                ctx,
            };

            for shared in &modules {
                let mut module = shared.borrow_mut();
                if !module.is_active() {
                    continue;
                }
                module.run_update(&mut scope);
            }

            for callback in &mut self.update_callbacks {
                callback(&mut scope);
            }
        }

        self.flush_pending();
    }

    /// Runs the render phase: active render modules in collection order,
    /// then the user render chain, then the pending-request flush.
    pub fn run_render_phase(&mut self, ctx: &FrameContext, backend: &mut dyn RenderBackend) {
        let modules = collect_modules(&self.render_modules);

        {
            let _guard = FlagGuard::set(&self.mid_render);
            let mut scope = UnitRenderScope {
                unit: self.id,
                unit_name: self.name.as_deref(),
                pending: &mut self.pending,
                ctx,
                backend,
            };

            for shared in &modules {
                let mut module = shared.borrow_mut();
                if !module.is_active() {
                    continue;
                }
                module.run_render(&mut scope);
            }

            for callback in &mut self.render_callbacks {
                callback(&mut scope);
            }
        }

        self.flush_pending();
    }

    //--- Teardown ---------------------------------------------------------

    /// Detaches every module with the owner-teardown variant: owners are
    /// released and detach hooks fired, with no per-name removal logic
    /// (no iteration is active, so nothing needs deferring).
    pub fn clear_modules(&mut self) {
        release_all(&mut self.update_modules);
        release_all(&mut self.render_modules);
        self.pending = PendingOps::default();
    }

    //--- Internal Helpers -------------------------------------------------

    fn phase_busy(&self, phase: Phase) -> bool {
        (phase.includes_update() && self.mid_update.get())
            || (phase.includes_render() && self.mid_render.get())
    }

    fn find_module(&self, name: &str) -> Option<SharedModule> {
        self.update_modules
            .try_item(name)
            .cloned()
            .or_else(|| self.render_modules.try_item(name).cloned())
    }

    fn attach_now(&mut self, shared: SharedModule) -> Result<(), UnitError> {
        let (name, phase) = {
            let module = shared.borrow();
            (module.name().to_string(), module.phase())
        };

        // Both collections must gain the entry or neither
        if (phase.includes_update() && self.update_modules.try_item(&name).is_some())
            || (phase.includes_render() && self.render_modules.try_item(&name).is_some())
        {
            return Err(UnitError::DuplicateModule(name));
        }

        if phase.includes_update() {
            self.update_modules
                .insert_item(&name, Rc::clone(&shared), true)
                .map_err(|err| module_error(&name, err))?;
        }
        if phase.includes_render() {
            self.render_modules
                .insert_item(&name, Rc::clone(&shared), true)
                .map_err(|err| module_error(&name, err))?;
        }

        debug!("unit {} attached module `{}`", self.id, name);
        shared.borrow_mut().bind(self.id);
        Ok(())
    }

    fn detach_now(&mut self, name: &str) -> Result<(), UnitError> {
        let mut removed = None;
        if let Ok(shared) = self.update_modules.remove_item(name) {
            removed = Some(shared);
        }
        if let Ok(shared) = self.render_modules.remove_item(name) {
            removed = Some(shared);
        }

        let shared = removed.ok_or_else(|| UnitError::ModuleNotFound(name.to_string()))?;
        debug!("unit {} detached module `{}`", self.id, name);
        shared.borrow_mut().release();
        Ok(())
    }

    /// Applies buffered requests: adds, then removes, then activity
    /// toggles. Requests that went stale while buffered (duplicate names,
    /// vanished modules) are logged and skipped; their requester has
    /// already returned.
    fn flush_pending(&mut self) {
        for shared in std::mem::take(&mut self.pending.add) {
            let name = shared.borrow().name().to_string();
            if let Err(err) = self.attach_now(shared) {
                warn!("unit {} dropped deferred attach of `{}`: {}", self.id, name, err);
            }
        }

        for name in std::mem::take(&mut self.pending.remove) {
            if let Err(err) = self.detach_now(&name) {
                debug!("unit {} skipped deferred detach of `{}`: {}", self.id, name, err);
            }
        }

        for (name, active) in std::mem::take(&mut self.pending.set_active) {
            match self.find_module(&name) {
                Some(shared) => shared.borrow_mut().set_active(active),
                None => debug!(
                    "unit {} skipped activity toggle for unknown module `{}`",
                    self.id, name
                ),
            }
        }
    }
}

impl Drop for SceneUnit {
    fn drop(&mut self) {
        self.clear_modules();
    }
}

impl fmt::Debug for SceneUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneUnit")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("parent_mode", &self.parent_mode)
            .field("update_modules", &self.update_modules.len())
            .field("render_modules", &self.render_modules.len())
            .finish()
    }
}

//=== Free Helpers ========================================================

fn collect_modules(tree: &NamespaceTree<SharedModule>) -> Vec<SharedModule> {
    let mut out = Vec::new();
    tree.visit(VisitOrder::LocalFirst, |_, shared| out.push(Rc::clone(shared)));
    out
}

fn release_all(tree: &mut NamespaceTree<SharedModule>) {
    tree.visit(VisitOrder::LocalFirst, |_, shared| shared.borrow_mut().release());
    tree.clear();
}

//=========================================================================
// Tests
//=========================================================================
