//=========================================================================
// Mode Scheduler
//=========================================================================
//
// Top-level controller for mode registration, activation, and per-frame
// processing.
//
// Activation and deactivation never mutate the registered/active sets
// directly from application code. Requests become events routed through
// a two-stage deferred queue:
//
//   updating          → deferred        (applied this frame, after
//                                        traversal)
//   applying_deferred → deferred_next   (applied next frame)
//   otherwise         → applied immediately
//
// The second stage exists so the queue is never mutated while it is
// being flushed. A visible consequence: an activation chain raised from
// construction hooks resolves one link per frame. That pacing is part of
// the contract — dependent logic may rely on the one-frame delay.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::cell::Cell;
use std::collections::{HashMap, HashSet};

use log::{debug, info, warn};
use thiserror::Error;

//=== Internal Dependencies ===============================================

use super::{Mode, ModeEvent};
use crate::core::backend::RenderBackend;
use crate::core::context::{ConstructArgs, FrameContext, PropertyBag};
use crate::core::FlagGuard;

//=== Scheduler Error =====================================================

/// Mode registration and transition precondition violations.
///
/// All surfaced synchronously at the violating call; the scheduler never
/// retries.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// The mode name is already registered.
    #[error("mode `{0}` is already registered")]
    AlreadyRegistered(String),

    /// No mode with that name is registered.
    #[error("mode `{0}` is not registered")]
    NotRegistered(String),

    /// The mode is already in the active set.
    #[error("mode `{0}` is already active")]
    AlreadyActive(String),

    /// The mode is not in the active set.
    #[error("mode `{0}` is not active")]
    NotActive(String),

    /// The target's transition constraints exclude the sender.
    #[error("activation of `{target}` from sender {sender:?} is not allowed")]
    TransitionNotAllowed {
        sender: Option<String>,
        target: String,
    },

    /// Update/Render ran before the process order was established.
    #[error("the process order must be set before the scheduler runs")]
    OrderNotSet,

    /// The process order can be set exactly once.
    #[error("the process order is already set and cannot change")]
    OrderAlreadySet,
}

//=== Mode Scheduler ======================================================

/// Owns every registered mode and drives the active ones once per frame.
///
/// One instance lives for the whole application run; the host constructs
/// it explicitly and threads it through the frame loop. Update walks the
/// fixed process order forward, render walks it in exact reverse, and
/// deferred events apply in FIFO order at the tick boundary.
pub struct ModeScheduler {
    registered: HashMap<String, Mode>,
    active: HashSet<String>,
    process_order: Vec<String>,
    order_set: bool,
    updating: Cell<bool>,
    applying_deferred: Cell<bool>,
    deferred: Vec<ModeEvent>,
    deferred_next: Vec<ModeEvent>,
}

impl ModeScheduler {
    //--- Construction -----------------------------------------------------

    /// Creates a scheduler with no modes and no process order.
    pub fn new() -> Self {
        Self {
            registered: HashMap::new(),
            active: HashSet::new(),
            process_order: Vec::new(),
            order_set: false,
            updating: Cell::new(false),
            applying_deferred: Cell::new(false),
            deferred: Vec::new(),
            deferred_next: Vec::new(),
        }
    }

    //--- Registration -----------------------------------------------------

    /// Registers a mode under its own name, exactly once.
    pub fn register(&mut self, mode: Mode) -> Result<(), SchedulerError> {
        if self.registered.contains_key(mode.name()) {
            return Err(SchedulerError::AlreadyRegistered(mode.name().to_string()));
        }
        debug!("registered mode `{}`", mode.name());
        self.registered.insert(mode.name().to_string(), mode);
        Ok(())
    }

    /// Fixes the per-frame processing order. Callable exactly once,
    /// before the first [`update`](ModeScheduler::update).
    ///
    /// The order may name modes registered later; an active mode absent
    /// from the order is legal but will never update.
    pub fn set_process_order<I, S>(&mut self, names: I) -> Result<(), SchedulerError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.order_set {
            return Err(SchedulerError::OrderAlreadySet);
        }
        self.process_order = names.into_iter().map(Into::into).collect();
        self.order_set = true;
        info!("process order set: {:?}", self.process_order);
        Ok(())
    }

    //--- Queries ----------------------------------------------------------

    /// True if a mode with that name is registered.
    pub fn is_registered(&self, name: &str) -> bool {
        self.registered.contains_key(name)
    }

    /// True if the named mode is currently active.
    pub fn is_active(&self, name: &str) -> bool {
        self.active.contains(name)
    }

    /// Number of currently active modes.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Names of the active modes, sorted for deterministic reporting.
    pub fn active_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.active.iter().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// The fixed processing order, empty until set.
    pub fn process_order(&self) -> &[String] {
        &self.process_order
    }

    /// The named mode, registered or not-yet-activated alike.
    pub fn mode(&self, name: &str) -> Option<&Mode> {
        self.registered.get(name)
    }

    /// Mutable variant of [`ModeScheduler::mode`], for callback and unit
    /// wiring after registration.
    pub fn mode_mut(&mut self, name: &str) -> Option<&mut Mode> {
        self.registered.get_mut(name)
    }

    //--- Transition Requests ----------------------------------------------

    /// Requests activation of the named mode on behalf of `sender`.
    ///
    /// Preconditions are checked synchronously: the name must be
    /// registered, not currently active, and the target's constraints
    /// must admit the sender. On success the request is applied
    /// immediately when no frame is in flight, or joins the deferred
    /// queue otherwise.
    pub fn activate(
        &mut self,
        ctx: &mut FrameContext,
        sender: Option<&str>,
        name: &str,
        args: PropertyBag,
    ) -> Result<(), SchedulerError> {
        let mode = self
            .registered
            .get(name)
            .ok_or_else(|| SchedulerError::NotRegistered(name.to_string()))?;
        if self.active.contains(name) {
            return Err(SchedulerError::AlreadyActive(name.to_string()));
        }
        if !mode.permits_sender(sender) {
            return Err(SchedulerError::TransitionNotAllowed {
                sender: sender.map(str::to_string),
                target: name.to_string(),
            });
        }
        if self.order_set && !self.process_order.iter().any(|entry| entry == name) {
            warn!("mode `{}` is not in the process order and will never update", name);
        }

        let event = ModeEvent::Activate {
            target: name.to_string(),
            sender: sender.map(str::to_string),
            args,
        };
        self.apply_or_queue(event, ctx);
        Ok(())
    }

    /// Requests deactivation of the named mode.
    pub fn deactivate(&mut self, ctx: &mut FrameContext, name: &str) -> Result<(), SchedulerError> {
        if !self.registered.contains_key(name) {
            return Err(SchedulerError::NotRegistered(name.to_string()));
        }
        if !self.active.contains(name) {
            return Err(SchedulerError::NotActive(name.to_string()));
        }

        let event = ModeEvent::Deactivate {
            target: name.to_string(),
        };
        self.apply_or_queue(event, ctx);
        Ok(())
    }

    //--- Frame Processing -------------------------------------------------

    /// Runs one frame's update: active modes in process order, then the
    /// deferred-event flush.
    ///
    /// Requests raised during traversal apply at this frame's flush;
    /// requests raised by lifecycle hooks during the flush itself land in
    /// the next-frame queue, so chained activations resolve one hop per
    /// frame.
    pub fn update(&mut self, ctx: &mut FrameContext) -> Result<(), SchedulerError> {
        if !self.order_set {
            return Err(SchedulerError::OrderNotSet);
        }

        // Traversal, under the updating flag (cleared even on unwind)
        {
            let _guard = FlagGuard::set(&self.updating);
            let order = &self.process_order;
            let registered = &mut self.registered;
            let active = &self.active;

            for name in order {
                if !active.contains(name) {
                    continue;
                }
                if let Some(mode) = registered.get_mut(name) {
                    mode.run_update(ctx);
                }
            }
        }

        // Requests raised during traversal join the queue in FIFO order
        self.deferred.extend(ctx.events.take());

        // Flush, under the applying flag
        {
            let _guard = FlagGuard::set(&self.applying_deferred);
            let events = std::mem::take(&mut self.deferred);
            for event in events {
                Self::apply_event_inner(&mut self.active, &mut self.registered, event, ctx);
                // Hook-raised requests wait for the next frame's flush
                self.deferred_next.extend(ctx.events.take());
            }
        }

        // Promote the next-frame queue
        self.deferred = std::mem::take(&mut self.deferred_next);
        Ok(())
    }

    /// Renders active modes in exact reverse process order.
    ///
    /// No event machinery runs here: rendering is read-only with respect
    /// to the registered/active sets.
    pub fn render(
        &mut self,
        ctx: &FrameContext,
        backend: &mut dyn RenderBackend,
    ) -> Result<(), SchedulerError> {
        if !self.order_set {
            return Err(SchedulerError::OrderNotSet);
        }

        let order = &self.process_order;
        let registered = &mut self.registered;
        let active = &self.active;

        for name in order.iter().rev() {
            if !active.contains(name) {
                continue;
            }
            if let Some(mode) = registered.get_mut(name) {
                mode.run_render(ctx, &mut *backend);
            }
        }
        Ok(())
    }

    //--- Internal Helpers -------------------------------------------------

    fn apply_or_queue(&mut self, event: ModeEvent, ctx: &mut FrameContext) {
        if self.updating.get() {
            self.deferred.push(event);
        } else if self.applying_deferred.get() {
            self.deferred_next.push(event);
        } else {
            self.apply_event(event, ctx);
            // Anything the hooks raised waits for the next frame's flush
            self.deferred.extend(ctx.events.take());
        }
    }

    /// Applies one event against the registered/active sets.
    ///
    /// Queued requests are re-validated here: their requester has long
    /// since returned, so a request gone stale while buffered (target
    /// activated twice in one frame, deactivated elsewhere, never
    /// registered) is logged and dropped rather than surfaced.
    fn apply_event(&mut self, event: ModeEvent, ctx: &mut FrameContext) {
        Self::apply_event_inner(&mut self.active, &mut self.registered, event, ctx);
    }

    /// Body of [`apply_event`], operating on the two fields it touches so
    /// the caller can hold a disjoint borrow (e.g. the `applying_deferred`
    /// flag guard) across the call.
    fn apply_event_inner(
        active: &mut HashSet<String>,
        registered: &mut HashMap<String, Mode>,
        event: ModeEvent,
        ctx: &mut FrameContext,
    ) {
        match event {
            ModeEvent::Activate { target, sender, args } => {
                if active.contains(&target) {
                    warn!("mode `{}` is already active, dropping queued activation", target);
                    return;
                }
                let Some(mode) = registered.get(&target) else {
                    warn!("mode `{}` is not registered, dropping queued activation", target);
                    return;
                };
                if !mode.permits_sender(sender.as_deref()) {
                    warn!(
                        "activation of `{}` from sender {:?} is not allowed, dropping",
                        target, sender
                    );
                    return;
                }

                debug!("activating mode `{}` (sender: {:?})", target, sender);
                active.insert(target.clone());

                let args = ConstructArgs { sender, bag: args };
                if let Some(mode) = registered.get_mut(&target) {
                    mode.run_construct(ctx, &args);
                }
            }
            ModeEvent::Deactivate { target } => {
                if !active.remove(&target) {
                    warn!("mode `{}` is not active, dropping queued deactivation", target);
                    return;
                }

                debug!("deactivating mode `{}`", target);
                if let Some(mode) = registered.get_mut(&target) {
                    mode.run_deconstruct(ctx);
                }
            }
        }
    }
}

impl Default for ModeScheduler {
    fn default() -> Self {
        Self::new()
    }
}

//=========================================================================
// Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mode::{ModeBehavior, ModeRenderScope, ModeScope};
    use std::cell::RefCell;
    use std::rc::Rc;

    type Journal = Rc<RefCell<Vec<String>>>;

    fn journal() -> Journal {
        Rc::new(RefCell::new(Vec::new()))
    }

    /// Records lifecycle and per-frame invocations.
    struct Probe {
        tag: &'static str,
        journal: Journal,
    }

    impl Probe {
        fn mode(tag: &'static str, journal: &Journal) -> Mode {
            Mode::new(tag, Probe { tag, journal: Rc::clone(journal) })
        }
    }

    impl ModeBehavior for Probe {
        fn construct(&mut self, _scope: &mut ModeScope<'_>, _args: &ConstructArgs) {
            self.journal.borrow_mut().push(format!("{}:construct", self.tag));
        }

        fn deconstruct(&mut self, _scope: &mut ModeScope<'_>) {
            self.journal.borrow_mut().push(format!("{}:deconstruct", self.tag));
        }

        fn update(&mut self, _scope: &mut ModeScope<'_>) {
            self.journal.borrow_mut().push(format!("{}:update", self.tag));
        }

        fn render(&mut self, _scope: &mut ModeRenderScope<'_>) {
            self.journal.borrow_mut().push(format!("{}:render", self.tag));
        }
    }

    /// Activates a fixed successor from its construction hook.
    struct ChainLink {
        next: Option<&'static str>,
    }

    impl ModeBehavior for ChainLink {
        fn construct(&mut self, scope: &mut ModeScope<'_>, _args: &ConstructArgs) {
            if let Some(next) = self.next {
                scope.activate(next, PropertyBag::new());
            }
        }
    }

    struct NullBackend;

    impl RenderBackend for NullBackend {
        fn draw(
            &mut self,
            _texture: crate::core::backend::TextureHandle,
            _position: (f32, f32),
            _props: &PropertyBag,
        ) {
        }
    }

    fn frame(scheduler: &mut ModeScheduler, ctx: &mut FrameContext) {
        ctx.advance(1.0 / 60.0);
        scheduler.update(ctx).unwrap();
    }

    //--- Registration Tests -----------------------------------------------

    #[test]
    fn double_registration_fails() {
        let log = journal();
        let mut scheduler = ModeScheduler::new();
        scheduler.register(Probe::mode("menu", &log)).unwrap();

        let err = scheduler.register(Probe::mode("menu", &log)).unwrap_err();
        assert_eq!(err, SchedulerError::AlreadyRegistered("menu".to_string()));
    }

    #[test]
    fn process_order_is_set_exactly_once() {
        let mut scheduler = ModeScheduler::new();
        scheduler.set_process_order(["menu", "game"]).unwrap();

        let err = scheduler.set_process_order(["game"]).unwrap_err();
        assert_eq!(err, SchedulerError::OrderAlreadySet);
    }

    #[test]
    fn update_and_render_require_an_order() {
        let mut scheduler = ModeScheduler::new();
        let mut ctx = FrameContext::new();

        assert_eq!(scheduler.update(&mut ctx).unwrap_err(), SchedulerError::OrderNotSet);
        assert_eq!(
            scheduler.render(&ctx, &mut NullBackend).unwrap_err(),
            SchedulerError::OrderNotSet
        );
    }

    //--- Transition Precondition Tests ------------------------------------

    #[test]
    fn activating_an_unregistered_name_fails() {
        let mut scheduler = ModeScheduler::new();
        let mut ctx = FrameContext::new();

        let err = scheduler
            .activate(&mut ctx, None, "ghost", PropertyBag::new())
            .unwrap_err();
        assert_eq!(err, SchedulerError::NotRegistered("ghost".to_string()));
    }

    #[test]
    fn activating_an_active_mode_always_fails() {
        let log = journal();
        let mut scheduler = ModeScheduler::new();
        let mut ctx = FrameContext::new();
        scheduler.register(Probe::mode("menu", &log)).unwrap();
        scheduler.set_process_order(["menu"]).unwrap();

        scheduler.activate(&mut ctx, None, "menu", PropertyBag::new()).unwrap();
        let err = scheduler
            .activate(&mut ctx, None, "menu", PropertyBag::new())
            .unwrap_err();
        assert_eq!(err, SchedulerError::AlreadyActive("menu".to_string()));

        // Still holds after any number of frames
        frame(&mut scheduler, &mut ctx);
        frame(&mut scheduler, &mut ctx);
        let err = scheduler
            .activate(&mut ctx, None, "menu", PropertyBag::new())
            .unwrap_err();
        assert_eq!(err, SchedulerError::AlreadyActive("menu".to_string()));
    }

    #[test]
    fn deactivating_an_inactive_mode_fails() {
        let log = journal();
        let mut scheduler = ModeScheduler::new();
        let mut ctx = FrameContext::new();
        scheduler.register(Probe::mode("menu", &log)).unwrap();

        let err = scheduler.deactivate(&mut ctx, "menu").unwrap_err();
        assert_eq!(err, SchedulerError::NotActive("menu".to_string()));
    }

    #[test]
    fn constraints_gate_activation_by_sender() {
        let log = journal();
        let mut scheduler = ModeScheduler::new();
        let mut ctx = FrameContext::new();

        let gated = Probe::mode("pause", &log)
            .with_constraints(crate::core::mode::TransitionConstraints::allow_from(["game"]));
        scheduler.register(gated).unwrap();

        let err = scheduler
            .activate(&mut ctx, Some("menu"), "pause", PropertyBag::new())
            .unwrap_err();
        assert!(matches!(err, SchedulerError::TransitionNotAllowed { .. }));

        scheduler
            .activate(&mut ctx, Some("game"), "pause", PropertyBag::new())
            .unwrap();
        assert!(scheduler.is_active("pause"));
    }

    //--- Immediate Application Tests --------------------------------------

    #[test]
    fn outside_frame_activation_constructs_synchronously() {
        let log = journal();
        let mut scheduler = ModeScheduler::new();
        let mut ctx = FrameContext::new();
        scheduler.register(Probe::mode("menu", &log)).unwrap();

        scheduler.activate(&mut ctx, None, "menu", PropertyBag::new()).unwrap();
        assert_eq!(*log.borrow(), vec!["menu:construct".to_string()]);
        assert!(scheduler.is_active("menu"));
        assert_eq!(scheduler.mode("menu").unwrap().activation_count(), 1);
    }

    //--- Ordering Tests ---------------------------------------------------

    #[test]
    fn update_walks_process_order_and_render_reverses_it() {
        let log = journal();
        let mut scheduler = ModeScheduler::new();
        let mut ctx = FrameContext::new();

        for tag in ["a", "b", "c"] {
            scheduler.register(Probe::mode(tag, &log)).unwrap();
        }
        scheduler.set_process_order(["a", "b", "c"]).unwrap();
        scheduler.activate(&mut ctx, None, "a", PropertyBag::new()).unwrap();
        scheduler.activate(&mut ctx, None, "c", PropertyBag::new()).unwrap();
        log.borrow_mut().clear();

        frame(&mut scheduler, &mut ctx);
        assert_eq!(*log.borrow(), vec!["a:update".to_string(), "c:update".to_string()]);

        log.borrow_mut().clear();
        scheduler.render(&ctx, &mut NullBackend).unwrap();
        assert_eq!(*log.borrow(), vec!["c:render".to_string(), "a:render".to_string()]);
    }

    //--- Deferred Cascade Tests -------------------------------------------

    #[test]
    fn chained_activations_resolve_one_hop_per_frame() {
        let mut scheduler = ModeScheduler::new();
        let mut ctx = FrameContext::new();

        scheduler.register(Mode::new("a", ChainLink { next: Some("b") })).unwrap();
        scheduler.register(Mode::new("b", ChainLink { next: Some("c") })).unwrap();
        scheduler.register(Mode::new("c", ChainLink { next: None })).unwrap();
        scheduler.set_process_order(["a", "b", "c"]).unwrap();

        // Immediate activation constructs `a`; the request it raised for
        // `b` waits for the first frame's flush.
        scheduler.activate(&mut ctx, None, "a", PropertyBag::new()).unwrap();
        assert_eq!(scheduler.active_names(), vec!["a"]);

        frame(&mut scheduler, &mut ctx);
        assert_eq!(scheduler.active_names(), vec!["a", "b"]);

        frame(&mut scheduler, &mut ctx);
        assert_eq!(scheduler.active_names(), vec!["a", "b", "c"]);
    }

    #[test]
    fn traversal_requests_apply_within_the_same_frame() {
        let log = journal();
        let mut scheduler = ModeScheduler::new();
        let mut ctx = FrameContext::new();

        scheduler.register(Probe::mode("menu", &log)).unwrap();
        scheduler.register(Probe::mode("game", &log)).unwrap();
        scheduler.set_process_order(["menu", "game"]).unwrap();
        scheduler.activate(&mut ctx, None, "menu", PropertyBag::new()).unwrap();

        // On the second frame, an update callback swaps menu for game.
        scheduler.mode_mut("menu").unwrap().add_update_callback(|scope| {
            if scope.ctx.frame() == 2 {
                scope.deactivate_self();
                scope.activate("game", PropertyBag::new());
            }
        });

        frame(&mut scheduler, &mut ctx);
        assert_eq!(scheduler.mode("menu").unwrap().activation_count(), 1);
        assert_eq!(scheduler.active_names(), vec!["menu"]);

        frame(&mut scheduler, &mut ctx);
        assert_eq!(scheduler.active_names(), vec!["game"]);

        let entries = log.borrow();
        assert!(entries.contains(&"menu:deconstruct".to_string()));
        assert!(entries.contains(&"game:construct".to_string()));
    }

    #[test]
    fn stale_queued_requests_are_dropped_quietly() {
        let log = journal();
        let mut scheduler = ModeScheduler::new();
        let mut ctx = FrameContext::new();

        scheduler.register(Probe::mode("menu", &log)).unwrap();
        scheduler.register(Probe::mode("game", &log)).unwrap();
        scheduler.set_process_order(["menu", "game"]).unwrap();
        scheduler.activate(&mut ctx, None, "menu", PropertyBag::new()).unwrap();

        // Two units race to activate the same target in one frame.
        scheduler.mode_mut("menu").unwrap().add_update_callback(|scope| {
            if scope.ctx.frame() == 1 {
                scope.activate("game", PropertyBag::new());
                scope.activate("game", PropertyBag::new());
            }
        });

        frame(&mut scheduler, &mut ctx);
        assert!(scheduler.is_active("game"));
        assert_eq!(scheduler.mode("game").unwrap().activation_count(), 1);
    }
}
