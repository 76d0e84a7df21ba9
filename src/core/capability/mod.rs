//=========================================================================
// Capability Modules
//=========================================================================
//
// Named, attachable units of per-frame behavior composed onto scene
// units.
//
// A module declares up front which phase(s) it participates in (update,
// render, or both); the phase is immutable after construction and
// decides which of the owner's phase collections hold the module.
// Concrete behavior is a strategy object, not a subclass.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::fmt;

//=== Internal Dependencies ===============================================

use crate::core::unit::{UnitId, UnitRenderScope, UnitScope};

//=== Phase ===============================================================

/// Which frame phase(s) a capability module participates in.
///
/// Fixed at module construction; a `Both` module is stored in the update
/// and render collections under the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Update,
    Render,
    Both,
}

impl Phase {
    /// True if the module runs during the update phase.
    pub fn includes_update(self) -> bool {
        matches!(self, Phase::Update | Phase::Both)
    }

    /// True if the module runs during the render phase.
    pub fn includes_render(self) -> bool {
        matches!(self, Phase::Render | Phase::Both)
    }
}

//=== Module Behavior =====================================================

/// Strategy object supplying a capability module's actions.
///
/// All methods have default empty implementations; a module implements
/// only the phases it declared. Structural requests raised from inside
/// `update`/`render` go through the scope and are deferred until the
/// running phase completes.
///
/// ```rust
/// # use cadence_engine::prelude::*;
/// struct Blink { visible: bool }
///
/// impl ModuleBehavior for Blink {
///     fn update(&mut self, _scope: &mut UnitScope<'_>) {
///         self.visible = !self.visible;
///     }
/// }
/// ```
pub trait ModuleBehavior {
    /// Called synchronously once the module lands in its owner's phase
    /// collection(s).
    fn on_attached(&mut self, _owner: UnitId) {}

    /// Called when the module leaves its owner, including owner teardown.
    fn on_detached(&mut self) {}

    /// Per-tick action for update-phase modules.
    fn update(&mut self, _scope: &mut UnitScope<'_>) {}

    /// Per-frame action for render-phase modules.
    fn render(&mut self, _scope: &mut UnitRenderScope<'_>) {}
}

//=== Capability Module ===================================================

/// A named unit of behavior attached to at most one scene unit at a time.
///
/// The module's `active` flag gates execution only: an inactive module is
/// skipped during its phase, not detached, and keeps its place in the
/// owner's collections.
pub struct CapabilityModule {
    name: String,
    phase: Phase,
    active: bool,
    owner: Option<UnitId>,
    behavior: Box<dyn ModuleBehavior>,
}

impl CapabilityModule {
    //--- Construction -----------------------------------------------------

    /// Creates a detached module with the given name, phase, and
    /// behavior. Modules start active.
    pub fn new(
        name: impl Into<String>,
        phase: Phase,
        behavior: impl ModuleBehavior + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            phase,
            active: true,
            owner: None,
            behavior: Box::new(behavior),
        }
    }

    //--- Accessors --------------------------------------------------------

    /// The module's name, unique within its owner's phase collection(s).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The phase(s) this module participates in.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// True if the module runs during its phase(s).
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Enables or disables the module without detaching it.
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// The owning unit's id; `Some` iff currently attached.
    pub fn owner(&self) -> Option<UnitId> {
        self.owner
    }

    //--- Lifecycle (driven by the owning unit) ----------------------------

    pub(crate) fn bind(&mut self, owner: UnitId) {
        self.owner = Some(owner);
        self.behavior.on_attached(owner);
    }

    /// Clears the owner reference and notifies the behavior. Idempotent
    /// so owner teardown can sweep a `Both` module from two collections.
    pub(crate) fn release(&mut self) {
        if self.owner.take().is_some() {
            self.behavior.on_detached();
        }
    }

    pub(crate) fn run_update(&mut self, scope: &mut UnitScope<'_>) {
        self.behavior.update(scope);
    }

    pub(crate) fn run_render(&mut self, scope: &mut UnitRenderScope<'_>) {
        self.behavior.render(scope);
    }
}

impl fmt::Debug for CapabilityModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityModule")
            .field("name", &self.name)
            .field("phase", &self.phase)
            .field("active", &self.active)
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

//=========================================================================
// Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;
    impl ModuleBehavior for Noop {}

    #[test]
    fn phase_membership() {
        assert!(Phase::Update.includes_update());
        assert!(!Phase::Update.includes_render());
        assert!(Phase::Render.includes_render());
        assert!(!Phase::Render.includes_update());
        assert!(Phase::Both.includes_update());
        assert!(Phase::Both.includes_render());
    }

    #[test]
    fn modules_start_active_and_unowned() {
        let module = CapabilityModule::new("fader", Phase::Update, Noop);
        assert!(module.is_active());
        assert!(module.owner().is_none());
        assert_eq!(module.name(), "fader");
    }

    #[test]
    fn activity_toggle_does_not_touch_ownership() {
        let mut module = CapabilityModule::new("fader", Phase::Update, Noop);
        module.set_active(false);
        assert!(!module.is_active());
        assert!(module.owner().is_none());
    }
}
