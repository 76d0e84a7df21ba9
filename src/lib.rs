//=========================================================================
// Cadence Engine — Library Root
//
// This crate defines the public API surface of the Cadence Engine: a
// scene-composition and update-scheduling core for frame-driven
// interactive applications.
//
// Responsibilities:
// - Expose the core subsystem tree (`core`): namespace containers,
//   capability modules, scene units, modes, and the deferred-event
//   scheduler
// - Provide the high-level `Engine` facade that drives the frame loop
// - Keep rendering, physics, input, and assets behind boundary traits;
//   this crate owns composition and scheduling, nothing else
//
// Typical usage:
// ```no_run
// use cadence_engine::prelude::*;
//
// struct Menu;
// impl ModeBehavior for Menu {
//     fn construct(&mut self, _scope: &mut ModeScope<'_>, _args: &ConstructArgs) {}
// }
//
// let engine = EngineBuilder::new().build().init(|scheduler, _ctx| {
//     scheduler.register(Mode::new("menu", Menu)).unwrap();
//     scheduler.set_process_order(["menu"]).unwrap();
// });
// ```
//
//=========================================================================

//--- Public Modules ------------------------------------------------------
//
// `core` contains all scene-composition and scheduling subsystems. It is
// exposed publicly for engine-level extensibility, but normal
// application code will mostly use the top-level `Engine` facade and the
// prelude.
//
pub mod core;
pub mod prelude;

//--- Internal Modules ----------------------------------------------------
//
// `engine` defines the main engine entry point and the frame loop.
//
mod engine;

//--- Public Exports ------------------------------------------------------
//
// Re-exports the `Engine` types as the main entry point for
// applications, so users can simply `use cadence_engine::Engine;`
// without knowing the internal module structure.
//
pub use engine::{Engine, EngineBuilder};
