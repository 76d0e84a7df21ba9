//=========================================================================
// Mode System
//=========================================================================
//
// Named, independently constructible application modes and the scheduler
// that drives them.
//
// Architecture:
//   ModeScheduler
//     ├─ registered: HashMap<String, Mode>
//     ├─ active:     HashSet<String>
//     └─ deferred:   two-stage ModeEvent queue
//   Mode
//     ├─ units:    SceneUnitGroup
//     ├─ behavior: Box<dyn ModeBehavior>
//     └─ callbacks, constraints, activation bookkeeping
//
// Flow:
//   update() → active modes in process order → unit group traversal
//            → deferred events applied at the tick boundary
//
//=========================================================================

//=== External Dependencies ===============================================

use std::collections::HashSet;
use std::fmt;

//=== Internal Dependencies ===============================================

use crate::core::backend::RenderBackend;
use crate::core::context::{ConstructArgs, FrameContext, PropertyBag};
use crate::core::unit::{SceneUnitGroup, TraversalOrder, UnitFilter};

//=== Module Declarations =================================================

mod event_queue;
mod scheduler;

//=== Public API ==========================================================

pub use event_queue::{ModeEvent, ModeEventQueue};
pub use scheduler::{ModeScheduler, SchedulerError};

//=== Mode Behavior =======================================================

/// Strategy object supplying a mode's lifecycle and per-frame logic.
///
/// `construct` runs on activation and typically populates the mode's
/// unit group through the scope. Everything else has a default empty
/// implementation.
///
/// ```rust
/// # use cadence_engine::prelude::*;
/// struct Menu;
///
/// impl ModeBehavior for Menu {
///     fn construct(&mut self, scope: &mut ModeScope<'_>, _args: &ConstructArgs) {
///         scope.units.insert("cursor", SceneUnit::named("cursor")).ok();
///     }
/// }
/// ```
pub trait ModeBehavior {
    /// Called when an activation is applied.
    fn construct(&mut self, scope: &mut ModeScope<'_>, args: &ConstructArgs);

    /// Called instead of [`construct`] on re-activation of a
    /// reconstructable mode. Defaults to delegating to `construct`.
    ///
    /// [`construct`]: ModeBehavior::construct
    fn reconstruct(&mut self, scope: &mut ModeScope<'_>, args: &ConstructArgs) {
        self.construct(scope, args);
    }

    /// Called when a deactivation is applied.
    fn deconstruct(&mut self, _scope: &mut ModeScope<'_>) {}

    /// Per-tick logic, after the mode's unit group has updated.
    fn update(&mut self, _scope: &mut ModeScope<'_>) {}

    /// Per-frame drawing, after the mode's unit group has rendered.
    fn render(&mut self, _scope: &mut ModeRenderScope<'_>) {}
}

//=== Transition Constraints ==============================================

/// Which senders may activate a mode.
///
/// An allow-list, when present, admits only listed senders (and excludes
/// host-initiated requests, which have no sender name). A deny-list
/// rejects listed senders and never matches a nameless one.
#[derive(Debug, Default, Clone)]
pub struct TransitionConstraints {
    allowed_from: Option<HashSet<String>>,
    disallowed_from: Option<HashSet<String>>,
}

impl TransitionConstraints {
    /// No constraints: any sender is admitted.
    pub fn none() -> Self {
        Self::default()
    }

    /// Restricts activation to the listed sender names.
    pub fn allow_from<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_from: Some(names.into_iter().map(Into::into).collect()),
            disallowed_from: None,
        }
    }

    /// Rejects activation from the listed sender names.
    pub fn deny_from<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_from: None,
            disallowed_from: Some(names.into_iter().map(Into::into).collect()),
        }
    }

    /// True if a request from `sender` passes both lists.
    pub fn permits(&self, sender: Option<&str>) -> bool {
        if let Some(allowed) = &self.allowed_from {
            match sender {
                Some(name) if allowed.contains(name) => {}
                _ => return false,
            }
        }
        if let (Some(denied), Some(name)) = (&self.disallowed_from, sender) {
            if denied.contains(name) {
                return false;
            }
        }
        true
    }
}

//=== Mode Scope ==========================================================

/// What a mode behavior or callback sees of its mode during updates and
/// lifecycle hooks.
pub struct ModeScope<'a> {
    name: &'a str,
    elapsed: f64,

    /// The mode's own unit group.
    pub units: &'a mut SceneUnitGroup,

    /// Frame-wide shared state (event queue, blackboard, physics).
    pub ctx: &'a mut FrameContext,
}

impl ModeScope<'_> {
    /// The running mode's name.
    pub fn name(&self) -> &str {
        self.name
    }

    /// Seconds this mode has been active since its last activation.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Queues an activation request for `target`, sent by this mode.
    pub fn activate(&mut self, target: &str, args: PropertyBag) {
        self.ctx.events.push_activate(Some(self.name.to_string()), target, args);
    }

    /// Queues a deactivation request for `target`.
    pub fn deactivate(&mut self, target: &str) {
        self.ctx.events.push_deactivate(target);
    }

    /// Queues a deactivation request for this mode itself.
    pub fn deactivate_self(&mut self) {
        let name = self.name.to_string();
        self.ctx.events.push_deactivate(&name);
    }
}

//=== Mode Render Scope ===================================================

/// Render-phase counterpart of [`ModeScope`]: carries the backend and a
/// read-only context. Rendering never raises scheduling events.
pub struct ModeRenderScope<'a> {
    name: &'a str,
    elapsed: f64,

    /// Frame-wide shared state, read-only during render.
    pub ctx: &'a FrameContext,

    /// Drawing primitive for this frame.
    pub backend: &'a mut dyn RenderBackend,
}

impl ModeRenderScope<'_> {
    /// The rendering mode's name.
    pub fn name(&self) -> &str {
        self.name
    }

    /// Seconds this mode has been active since its last activation.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }
}

//=== Callback Chains =====================================================

pub type ModeCallback = Box<dyn FnMut(&mut ModeScope<'_>)>;
pub type ModeRenderCallback = Box<dyn FnMut(&mut ModeRenderScope<'_>)>;

//=== Mode ================================================================

/// One coherent application mode: a behavior, a unit group, transition
/// constraints, and activation bookkeeping.
///
/// A mode is constructed once and registered once; `construct` and
/// `deconstruct` then run on every activation cycle, so a mode is
/// reusable for the lifetime of the scheduler. Configuration is fluent:
///
/// ```rust
/// # use cadence_engine::prelude::*;
/// # struct Pause;
/// # impl ModeBehavior for Pause {
/// #     fn construct(&mut self, _s: &mut ModeScope<'_>, _a: &ConstructArgs) {}
/// # }
/// let pause = Mode::new("pause", Pause)
///     .with_reconstructable(true)
///     .with_constraints(TransitionConstraints::allow_from(["game"]));
/// ```
pub struct Mode {
    name: String,
    behavior: Box<dyn ModeBehavior>,
    reconstructable: bool,
    constraints: TransitionConstraints,
    activation_count: u32,
    elapsed: f64,
    units: SceneUnitGroup,
    order: TraversalOrder,
    filter: UnitFilter,
    update_callbacks: Vec<ModeCallback>,
    render_callbacks: Vec<ModeRenderCallback>,
}

impl Mode {
    //--- Construction -----------------------------------------------------

    /// Creates a mode with the given name and behavior.
    ///
    /// Defaults: not reconstructable, no transition constraints, unit
    /// traversal `PreOrder`/`Both`.
    pub fn new(name: impl Into<String>, behavior: impl ModeBehavior + 'static) -> Self {
        let name = name.into();
        let units = SceneUnitGroup::with_owner(name.clone());
        Self {
            name,
            behavior: Box::new(behavior),
            reconstructable: false,
            constraints: TransitionConstraints::none(),
            activation_count: 0,
            elapsed: 0.0,
            units,
            order: TraversalOrder::PreOrder,
            filter: UnitFilter::Both,
            update_callbacks: Vec::new(),
            render_callbacks: Vec::new(),
        }
    }

    /// Marks the mode reconstructable: re-activations after the first
    /// invoke `reconstruct` instead of `construct`.
    pub fn with_reconstructable(mut self, reconstructable: bool) -> Self {
        self.reconstructable = reconstructable;
        self
    }

    /// Sets the mode's transition constraints.
    pub fn with_constraints(mut self, constraints: TransitionConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    /// Sets the traversal policy for the mode's unit group.
    pub fn with_traversal(mut self, order: TraversalOrder, filter: UnitFilter) -> Self {
        self.order = order;
        self.filter = filter;
        self
    }

    //--- Accessors --------------------------------------------------------

    /// The mode's registered name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Times this mode has been activated since registration.
    pub fn activation_count(&self) -> u32 {
        self.activation_count
    }

    /// True if re-activations invoke `reconstruct`.
    pub fn is_reconstructable(&self) -> bool {
        self.reconstructable
    }

    /// Seconds active since the last activation; reset on deactivation.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// The mode's unit group.
    pub fn units(&self) -> &SceneUnitGroup {
        &self.units
    }

    /// Mutable variant of [`Mode::units`].
    pub fn units_mut(&mut self) -> &mut SceneUnitGroup {
        &mut self.units
    }

    /// True if a request from `sender` passes this mode's constraints.
    pub fn permits_sender(&self, sender: Option<&str>) -> bool {
        self.constraints.permits(sender)
    }

    //--- Callback Registration --------------------------------------------

    /// Replaces the user update chain with a single callback. The
    /// internal unit-group traversal stays chained first regardless.
    pub fn set_update_callback(&mut self, callback: impl FnMut(&mut ModeScope<'_>) + 'static) {
        self.update_callbacks.clear();
        self.update_callbacks.push(Box::new(callback));
    }

    /// Appends a callback to the user update chain.
    pub fn add_update_callback(&mut self, callback: impl FnMut(&mut ModeScope<'_>) + 'static) {
        self.update_callbacks.push(Box::new(callback));
    }

    /// Replaces the user render chain with a single callback.
    pub fn set_render_callback(
        &mut self,
        callback: impl FnMut(&mut ModeRenderScope<'_>) + 'static,
    ) {
        self.render_callbacks.clear();
        self.render_callbacks.push(Box::new(callback));
    }

    /// Appends a callback to the user render chain.
    pub fn add_render_callback(
        &mut self,
        callback: impl FnMut(&mut ModeRenderScope<'_>) + 'static,
    ) {
        self.render_callbacks.push(Box::new(callback));
    }

    //--- Lifecycle (driven by the scheduler) ------------------------------

    pub(crate) fn run_construct(&mut self, ctx: &mut FrameContext, args: &ConstructArgs) {
        self.activation_count += 1;
        let reconstruct = self.reconstructable && self.activation_count > 1;

        let mut scope = ModeScope {
            name: &self.name,
            elapsed: self.elapsed,
            units: &mut self.units,
            ctx,
        };
        if reconstruct {
            self.behavior.reconstruct(&mut scope, args);
        } else {
            self.behavior.construct(&mut scope, args);
        }
    }

    pub(crate) fn run_deconstruct(&mut self, ctx: &mut FrameContext) {
        let mut scope = ModeScope {
            name: &self.name,
            elapsed: self.elapsed,
            units: &mut self.units,
            ctx,
        };
        self.behavior.deconstruct(&mut scope);
        self.elapsed = 0.0;
    }

    pub(crate) fn run_update(&mut self, ctx: &mut FrameContext) {
        self.elapsed += ctx.delta();

        // Required head of the chain: the unit-group traversal
        self.units.update(self.order, self.filter, ctx);

        let mut scope = ModeScope {
            name: &self.name,
            elapsed: self.elapsed,
            units: &mut self.units,
            ctx,
        };
        self.behavior.update(&mut scope);
        for callback in &mut self.update_callbacks {
            callback(&mut scope);
        }
    }

    pub(crate) fn run_render(&mut self, ctx: &FrameContext, backend: &mut dyn RenderBackend) {
        self.units.render(self.order, self.filter, ctx, &mut *backend);

        let mut scope = ModeRenderScope {
            name: &self.name,
            elapsed: self.elapsed,
            ctx,
            backend,
        };
        self.behavior.render(&mut scope);
        for callback in &mut self.render_callbacks {
            callback(&mut scope);
        }
    }
}

impl fmt::Debug for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mode")
            .field("name", &self.name)
            .field("activation_count", &self.activation_count)
            .field("reconstructable", &self.reconstructable)
            .field("units", &self.units.len())
            .finish_non_exhaustive()
    }
}

//=========================================================================
// Tests
//=========================================================================
