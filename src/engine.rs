//=========================================================================
// Cadence Engine
//
// Main entry point and frame-loop coordinator.
//
// Architecture:
// ```text
//     EngineBuilder  ──build()──>  Engine  ──run()──>  [Frame Loop]
//         │                          │
//         └─ with_tps()              ├─ ModeScheduler (update order)
//                                    └─ FrameContext  (shared state)
// ```
//
// The core is single-threaded and frame-driven: `run` ticks the
// scheduler at a fixed timestep on the calling thread, renders, and
// sleeps off the remainder of each frame.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::time::{Duration, Instant};

use log::{debug, info};

//=== Internal Dependencies ===============================================

use crate::core::{
    FrameContext, ModeScheduler, PropertyBag, RenderBackend, SchedulerError,
};

//=== EngineBuilder =======================================================

/// Builder for configuring and constructing an [`Engine`].
///
/// Provides a fluent API for setting engine parameters before
/// construction.
///
/// # Default Values
///
/// - **TPS**: 60.0 (logic updates per second)
///
/// # Examples
///
/// ```no_run
/// use cadence_engine::EngineBuilder;
///
/// let engine = EngineBuilder::new().with_tps(120.0).build();
/// ```
pub struct EngineBuilder {
    tps: f64,
}

impl EngineBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self { tps: 60.0 }
    }

    /// Sets the target ticks per second for the frame loop.
    ///
    /// Higher values give finer-grained updates at higher CPU cost. The
    /// fixed timestep (`1.0 / tps`) is what every traversal sees as the
    /// tick delta.
    ///
    /// Default: 60.0
    ///
    /// # Panics
    ///
    /// Panics if `tps <= 0.0`.
    pub fn with_tps(mut self, tps: f64) -> Self {
        assert!(tps > 0.0, "TPS must be positive, got {}", tps);
        self.tps = tps;
        self
    }

    /// Builds the engine instance.
    ///
    /// Consumes the builder and produces a configured [`Engine`] ready
    /// for initialization or execution.
    pub fn build(self) -> Engine {
        info!("Building engine (TPS: {})", self.tps);

        Engine {
            scheduler: ModeScheduler::new(),
            context: FrameContext::new(),
            tps: self.tps,
        }
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

//=== Engine ==============================================================

/// Engine runtime: one scheduler, one frame context, one loop.
///
/// The scheduler and context are constructed explicitly here and
/// threaded through every frame; subsystems that need them receive a
/// reference, never a global.
///
/// # Examples
///
/// ```no_run
/// use cadence_engine::prelude::*;
///
/// struct Menu;
/// impl ModeBehavior for Menu {
///     fn construct(&mut self, _scope: &mut ModeScope<'_>, _args: &ConstructArgs) {}
/// }
///
/// struct Blank;
/// impl RenderBackend for Blank {
///     fn draw(&mut self, _t: TextureHandle, _p: (f32, f32), _props: &PropertyBag) {}
/// }
///
/// let mut engine = EngineBuilder::new()
///     .build()
///     .init(|scheduler, _ctx| {
///         scheduler.register(Mode::new("menu", Menu)).unwrap();
///         scheduler.set_process_order(["menu"]).unwrap();
///     });
///
/// engine.activate(None, "menu", PropertyBag::new()).unwrap();
/// engine.run(&mut Blank, |scheduler, _ctx| scheduler.active_count() == 0).unwrap();
/// ```
pub struct Engine {
    scheduler: ModeScheduler,
    context: FrameContext,
    tps: f64,
}

impl Engine {
    //--- Initialization ---------------------------------------------------

    /// Initializes engine systems before execution.
    ///
    /// Provides mutable access to the scheduler and frame context for
    /// registering modes, fixing the process order, and installing
    /// backends before the loop starts.
    pub fn init<F>(mut self, init_fn: F) -> Self
    where
        F: FnOnce(&mut ModeScheduler, &mut FrameContext),
    {
        info!("Initializing engine systems");
        init_fn(&mut self.scheduler, &mut self.context);
        info!("Engine initialization complete");
        self
    }

    //--- Accessors --------------------------------------------------------

    /// The mode scheduler.
    pub fn scheduler(&self) -> &ModeScheduler {
        &self.scheduler
    }

    /// Mutable variant of [`Engine::scheduler`].
    pub fn scheduler_mut(&mut self) -> &mut ModeScheduler {
        &mut self.scheduler
    }

    /// The frame context.
    pub fn context(&self) -> &FrameContext {
        &self.context
    }

    /// Mutable variant of [`Engine::context`].
    pub fn context_mut(&mut self) -> &mut FrameContext {
        &mut self.context
    }

    //--- Transition Requests ----------------------------------------------

    /// Requests activation of a mode on behalf of `sender`.
    pub fn activate(
        &mut self,
        sender: Option<&str>,
        name: &str,
        args: PropertyBag,
    ) -> Result<(), SchedulerError> {
        self.scheduler.activate(&mut self.context, sender, name, args)
    }

    /// Requests deactivation of a mode.
    pub fn deactivate(&mut self, name: &str) -> Result<(), SchedulerError> {
        self.scheduler.deactivate(&mut self.context, name)
    }

    //--- Execution --------------------------------------------------------

    /// Advances the simulation by exactly one fixed timestep.
    pub fn tick(&mut self) -> Result<(), SchedulerError> {
        self.context.advance(1.0 / self.tps);
        self.scheduler.update(&mut self.context)
    }

    /// Renders the current frame through `backend`.
    pub fn render(&mut self, backend: &mut dyn RenderBackend) -> Result<(), SchedulerError> {
        self.scheduler.render(&self.context, backend)
    }

    /// Runs the frame loop until `exit` returns true.
    ///
    /// Each iteration ticks the scheduler, renders, evaluates the exit
    /// predicate, and sleeps off whatever remains of the fixed timestep
    /// to keep pacing deterministic.
    pub fn run<F>(&mut self, backend: &mut dyn RenderBackend, mut exit: F) -> Result<(), SchedulerError>
    where
        F: FnMut(&ModeScheduler, &FrameContext) -> bool,
    {
        info!("Starting frame loop (TPS: {})", self.tps);
        let frame_duration = Duration::from_secs_f64(1.0 / self.tps);

        loop {
            let frame_start = Instant::now();

            self.tick()?;
            self.render(backend)?;

            if exit(&self.scheduler, &self.context) {
                debug!("exit predicate satisfied at frame {}", self.context.frame());
                break;
            }

            let elapsed = frame_start.elapsed();
            if elapsed < frame_duration {
                std::thread::sleep(frame_duration - elapsed);
            }
        }

        info!("Frame loop exited after {} frames", self.context.frame());
        Ok(())
    }
}

//=========================================================================
// Unit Tests
//=========================================================================
