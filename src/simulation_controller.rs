use crate::backend::ComputeBackend;
use crate::error::FluidError;
use crate::simulation::FluidField;
use crate::timer::Timer;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimulationControllerStatus {
    Realtime,
    Paused,
}

// The simulation controller orchestrates simulation steps.
// It holds the central timer and as such is responsible for glueing rendering frames and simulation together.
pub struct SimulationController {
    scheduled_restart: bool,
    timer: Timer,
    simulation_steps_per_second: u64,
    pub status: SimulationControllerStatus,
}

const MIN_REALTIME_FPS: f64 = 10.0;

fn delta_from_steps_per_second(steps_per_second: u64) -> Duration {
    Duration::from_nanos(1000 * 1000 * 1000 / steps_per_second.max(1))
}

fn new_timer(steps_per_second: u64) -> Timer {
    Timer::new(
        delta_from_steps_per_second(steps_per_second),
        Duration::from_secs_f64(1.0 / MIN_REALTIME_FPS),
    )
}

impl SimulationController {
    pub fn new(simulation_steps_per_second: u64) -> Self {
        SimulationController {
            scheduled_restart: false,
            timer: new_timer(simulation_steps_per_second),
            simulation_steps_per_second,
            status: SimulationControllerStatus::Realtime,
        }
    }

    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    pub fn timer_mut(&mut self) -> &mut Timer {
        &mut self.timer
    }

    pub fn on_frame_submitted(&mut self) {
        self.timer.on_frame_submitted();
    }

    pub fn toggle_pause(&mut self) {
        self.status = match self.status {
            SimulationControllerStatus::Realtime => SimulationControllerStatus::Paused,
            SimulationControllerStatus::Paused => SimulationControllerStatus::Realtime,
        };
        info!("simulation {:?}", self.status);
    }

    pub fn schedule_restart(&mut self) {
        self.scheduled_restart = true;
    }

    pub fn simulation_steps_per_second(&self) -> u64 {
        self.simulation_steps_per_second
    }

    /// Clears the field if a restart was scheduled.
    pub fn handle_scheduled_restart<B: ComputeBackend + ?Sized>(
        &mut self,
        fluid: &mut FluidField<B::View>,
        backend: &mut B,
    ) -> Result<(), FluidError> {
        if !self.scheduled_restart {
            return Ok(());
        }
        self.scheduled_restart = false;
        self.timer = new_timer(self.simulation_steps_per_second);
        fluid.clear(backend)
    }

    /// Performs all simulation steps due in the current frame and returns how many were done.
    /// Each step advances the field by its configured time step.
    pub fn frame_steps<B: ComputeBackend + ?Sized>(&mut self, fluid: &mut FluidField<B::View>, backend: &mut B) -> Result<u32, FluidError> {
        if self.status == SimulationControllerStatus::Paused {
            self.timer.skip_simulation_frame();
            return Ok(0);
        }

        let mut steps = 0;
        while self.timer.simulation_step_loop() {
            let time_step = fluid.parameters().time_step;
            fluid.tick(backend, time_step)?;
            steps += 1;
        }
        Ok(steps)
    }
}
