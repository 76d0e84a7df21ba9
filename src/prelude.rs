//=========================================================================
// Prelude
//=========================================================================
//
// Convenience module that re-exports commonly used types and traits.
//
// Usage:
//   use cadence_engine::prelude::*;
//
//=========================================================================

//=== Public API ==========================================================

// Engine facade
pub use crate::engine::{Engine, EngineBuilder};

// Modes and scheduling
pub use crate::core::mode::{
    Mode, ModeBehavior, ModeEvent, ModeEventQueue, ModeRenderScope, ModeScheduler, ModeScope,
    SchedulerError, TransitionConstraints,
};

// Scene units and capability modules
pub use crate::core::capability::{CapabilityModule, ModuleBehavior, Phase};
pub use crate::core::unit::{
    SceneUnit, SceneUnitGroup, TraversalOrder, UnitError, UnitFilter, UnitId, UnitRenderScope,
    UnitScope,
};

// Namespace containers
pub use crate::core::namespace::{NamespaceError, NamespaceTree, VisitOrder};

// Frame context and boundary interfaces
pub use crate::core::backend::{BodyHandle, PhysicsBackend, RenderBackend, TextureHandle};
pub use crate::core::context::{ConstructArgs, FrameContext, PropertyBag};
