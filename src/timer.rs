use std::time::{Duration, Instant};

// There are three dependent clocks:
// * real time
//      that's the watch on your wrist
// * render time
//      same as real time, but advanced in chunks of whole frames
// * simulation time
//      tries to keep up with render time in fixed steps and may start to drop steps
//
// Simulation runs on the device, so there is no point in measuring the steps themselves on the CPU.
pub struct Timer {
    simulation_delta: Duration,
    // more simulation time than this per frame is dropped instead of caught up
    max_simulation_time_per_frame: Duration,

    // real time measures
    timestamp_last_frame: Instant,
    last_frame_duration: Duration,

    // render time measures
    total_rendered_time: Duration,

    // simulation time
    num_simulation_steps_this_frame: u32,
    total_simulated_time: Duration,
    accepted_simulation_to_render_lag: Duration, // time lost that we don't plan on catching up anymore
}

impl Timer {
    pub fn new(simulation_delta: Duration, max_simulation_time_per_frame: Duration) -> Timer {
        Timer {
            simulation_delta: simulation_delta.max(Duration::from_nanos(1)),
            max_simulation_time_per_frame,

            timestamp_last_frame: Instant::now(),
            last_frame_duration: Duration::from_millis(0),

            total_rendered_time: Duration::from_millis(0),

            num_simulation_steps_this_frame: 0,
            total_simulated_time: Duration::from_millis(0),
            accepted_simulation_to_render_lag: Duration::from_millis(0),
        }
    }

    pub fn on_frame_submitted(&mut self) {
        let now = Instant::now();
        self.advance_frame(now - self.timestamp_last_frame);
        self.timestamp_last_frame = now;
    }

    /// Ends the current frame as if it took `frame_duration`.
    pub fn advance_frame(&mut self, frame_duration: Duration) {
        self.last_frame_duration = frame_duration;
        self.total_rendered_time += frame_duration;
        self.num_simulation_steps_this_frame = 0;
    }

    /// Returns true as long as another simulation step should be done in the current frame.
    pub fn simulation_step_loop(&mut self) -> bool {
        if self.num_simulation_steps_this_frame > 0 {
            self.total_simulated_time += self.simulation_delta;
        }

        // simulation time shouldn't advance faster than render time
        let residual_time = self
            .total_rendered_time
            .saturating_sub(self.total_simulated_time + self.accepted_simulation_to_render_lag);
        if residual_time < self.simulation_delta {
            return false;
        }

        // Did we hit the maximum of simulation steps and want to introduce lag instead?
        if self.num_simulation_steps_this_frame * self.simulation_delta >= self.max_simulation_time_per_frame {
            // Not dropping all lost time avoids oscillating between catching up and lagging,
            // frame durations lag a few frames behind the work that caused them.
            self.accepted_simulation_to_render_lag += residual_time.mul_f32(0.75);
            warn!(
                "simulation can't keep up, dropping {:?} after {} steps",
                residual_time.mul_f32(0.75),
                self.num_simulation_steps_this_frame
            );
            return false;
        }

        self.num_simulation_steps_this_frame += 1;
        true
    }

    /// Accepts all render time of this frame as lag, the simulation stands still.
    pub fn skip_simulation_frame(&mut self) {
        self.accepted_simulation_to_render_lag = self.total_rendered_time.saturating_sub(self.total_simulated_time);
    }

    pub fn simulation_delta(&self) -> Duration {
        self.simulation_delta
    }

    // Duration of the previous frame.
    pub fn frame_duration(&self) -> Duration {
        self.last_frame_duration
    }

    pub fn total_simulated_time(&self) -> Duration {
        self.total_simulated_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_steps(timer: &mut Timer) -> u32 {
        let mut steps = 0;
        while timer.simulation_step_loop() {
            steps += 1;
        }
        steps
    }

    #[test]
    fn steps_follow_render_time() {
        let mut timer = Timer::new(Duration::from_millis(10), Duration::from_secs(1));
        timer.advance_frame(Duration::from_millis(35));
        assert_eq!(count_steps(&mut timer), 3);
        timer.advance_frame(Duration::from_millis(10));
        // 45ms rendered, 30ms simulated
        assert_eq!(count_steps(&mut timer), 1);
        assert_eq!(timer.total_simulated_time(), Duration::from_millis(40));
    }

    #[test]
    fn long_frames_introduce_lag() {
        let mut timer = Timer::new(Duration::from_millis(10), Duration::from_millis(50));
        timer.advance_frame(Duration::from_secs(1));
        assert_eq!(count_steps(&mut timer), 5);
        timer.advance_frame(Duration::from_millis(10));
        assert_le!(count_steps(&mut timer), 5);
    }

    #[test]
    fn skipped_frames_are_not_caught_up() {
        let mut timer = Timer::new(Duration::from_millis(10), Duration::from_secs(1));
        timer.advance_frame(Duration::from_millis(100));
        timer.skip_simulation_frame();
        timer.advance_frame(Duration::from_millis(20));
        assert_eq!(count_steps(&mut timer), 2);
    }
}
