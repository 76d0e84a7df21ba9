//=========================================================================
// Backend Interfaces
//=========================================================================
//
// Boundary contracts for the rendering and physics collaborators.
//
// The core treats both as opaque: draw calls are fire-and-forget, and
// body handles are never interpreted. Hosts implement these traits over
// whatever backend they run.
//
//=========================================================================

//=== Internal Dependencies ===============================================

use crate::core::context::PropertyBag;

//=== Opaque Handles ======================================================

/// Opaque handle to a texture owned by the rendering backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u64);

/// Opaque handle to a body owned by the physics backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyHandle(pub u64);

//=== Render Backend ======================================================

/// Drawing primitive the render phase calls out to.
///
/// The core never reads anything back: `draw` is a side-effecting call
/// with no return value, and `properties` is an opaque pass-through.
pub trait RenderBackend {
    fn draw(&mut self, texture: TextureHandle, position: (f32, f32), properties: &PropertyBag);
}

//=== Physics Backend =====================================================

/// Body state queried and driven by update-phase modules.
pub trait PhysicsBackend {
    /// Current position of `body`.
    fn position(&self, body: BodyHandle) -> (f32, f32);

    /// Moves `body` to `position`.
    fn set_position(&mut self, body: BodyHandle, position: (f32, f32));
}
