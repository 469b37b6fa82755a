//! Automatable node parameters
//!
//! A parameter holds a time-ordered list of automation events evaluated
//! against the rendering clock. A linear ramp interpolates from the event
//! before it to its own time and value; a set-value step holds until the
//! next event.

/// One scheduled change of a parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AutomationEvent {
    /// Jump to `value` at `time`
    SetValue { time: f64, value: f32 },
    /// Arrive at `value` at `time`, moving linearly from the previous event
    LinearRamp { time: f64, value: f32 },
}

impl AutomationEvent {
    pub fn time(&self) -> f64 {
        match *self {
            AutomationEvent::SetValue { time, .. } | AutomationEvent::LinearRamp { time, .. } => time,
        }
    }

    pub fn value(&self) -> f32 {
        match *self {
            AutomationEvent::SetValue { value, .. } | AutomationEvent::LinearRamp { value, .. } => value,
        }
    }
}

/// A node parameter driven by the rendering clock
#[derive(Debug, Clone, PartialEq)]
pub struct AudioParam {
    default_value: f32,
    events: Vec<AutomationEvent>,
}

impl AudioParam {
    pub fn new(default_value: f32) -> Self {
        Self {
            default_value,
            events: Vec::new(),
        }
    }

    /// Schedule a step to `value` at `time` (seconds on the context clock)
    pub fn set_value_at_time(&mut self, value: f32, time: f64) {
        self.insert(AutomationEvent::SetValue { time, value });
    }

    /// Schedule a linear ramp that reaches `value` at `end_time`
    pub fn linear_ramp_to_value_at_time(&mut self, value: f32, end_time: f64) {
        self.insert(AutomationEvent::LinearRamp {
            time: end_time,
            value,
        });
    }

    /// Value of the parameter at time `t`
    pub fn value_at(&self, t: f64) -> f32 {
        let next = self.events.partition_point(|e| e.time() <= t);

        let (prev_time, prev_value) = match next.checked_sub(1) {
            Some(idx) => (self.events[idx].time(), self.events[idx].value()),
            None => (0.0, self.default_value),
        };

        match self.events.get(next) {
            Some(&AutomationEvent::LinearRamp { time, value }) if time > prev_time => {
                let progress = ((t - prev_time) / (time - prev_time)).clamp(0.0, 1.0) as f32;
                prev_value + (value - prev_value) * progress
            }
            _ => prev_value,
        }
    }

    /// Value once every scheduled event has elapsed
    pub fn final_value(&self) -> f32 {
        self.events.last().map(|e| e.value()).unwrap_or(self.default_value)
    }

    /// Drop events that can no longer influence values at or after `t`
    ///
    /// The latest event at or before `t` is kept as the anchor for whatever
    /// comes next.
    pub fn prune_before(&mut self, t: f64) {
        let elapsed = self.events.partition_point(|e| e.time() <= t);
        if elapsed > 1 {
            self.events.drain(..elapsed - 1);
        }
    }

    pub fn events(&self) -> &[AutomationEvent] {
        &self.events
    }

    // Events with equal times keep their scheduling order
    fn insert(&mut self, event: AutomationEvent) {
        let idx = self.events.partition_point(|e| e.time() <= event.time());
        self.events.insert(idx, event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_default_value_without_events() {
        let param = AudioParam::new(440.0);
        assert_eq!(param.value_at(0.0), 440.0);
        assert_eq!(param.value_at(100.0), 440.0);
        assert_eq!(param.final_value(), 440.0);
    }

    #[test]
    fn test_set_value_steps() {
        let mut param = AudioParam::new(300.0);
        param.set_value_at_time(310.0, 1.0);
        assert_eq!(param.value_at(0.999), 300.0);
        assert_eq!(param.value_at(1.0), 310.0);
        assert_eq!(param.value_at(5.0), 310.0);
    }

    #[test]
    fn test_linear_ramp_interpolates_from_previous_event() {
        let mut param = AudioParam::new(0.0);
        param.set_value_at_time(400.0, 0.0);
        param.linear_ramp_to_value_at_time(200.0, 2.0);

        assert_abs_diff_eq!(param.value_at(0.0), 400.0);
        assert_abs_diff_eq!(param.value_at(1.0), 300.0, epsilon = 1e-3);
        assert_abs_diff_eq!(param.value_at(2.0), 200.0);
        assert_abs_diff_eq!(param.value_at(3.0), 200.0);
    }

    #[test]
    fn test_events_stay_time_ordered() {
        let mut param = AudioParam::new(0.0);
        param.set_value_at_time(3.0, 3.0);
        param.set_value_at_time(1.0, 1.0);
        param.set_value_at_time(2.0, 2.0);

        let times: Vec<f64> = param.events().iter().map(|e| e.time()).collect();
        assert_eq!(times, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_prune_keeps_anchor_for_pending_ramp() {
        let mut param = AudioParam::new(0.0);
        param.set_value_at_time(100.0, 0.0);
        param.set_value_at_time(200.0, 1.0);
        param.linear_ramp_to_value_at_time(400.0, 3.0);

        param.prune_before(2.0);
        assert_eq!(param.events().len(), 2);
        assert_abs_diff_eq!(param.value_at(2.0), 300.0, epsilon = 1e-3);
    }
}
