/// Cooldown gate state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GateState {
    /// Ready to fire.
    Cooled,
    /// Suppressing until `cooldown_secs` have passed since `last_alert`.
    OnCooldown { last_alert: f64 },
}

/// Decides whether a qualifying detection may fire a notification now.
///
/// Timestamps are seconds (see `frame::unix_now`). The gate is pure with
/// respect to its time input: the only effect of `admit` is recording the
/// admitted timestamp. Each successful admit re-arms the cooldown.
#[derive(Clone, Debug)]
pub struct AlertGate {
    cooldown_secs: f64,
    state: GateState,
}

impl AlertGate {
    pub fn new(cooldown_secs: f64) -> Self {
        Self {
            cooldown_secs,
            state: GateState::Cooled,
        }
    }

    /// Returns true when an alert may fire at `now`, and records it.
    ///
    /// While on cooldown, admission requires strictly more than
    /// `cooldown_secs` since the last admitted alert.
    pub fn admit(&mut self, now: f64) -> bool {
        let admitted = match self.state {
            GateState::Cooled => true,
            GateState::OnCooldown { last_alert } => now - last_alert > self.cooldown_secs,
        };
        if admitted {
            self.state = GateState::OnCooldown { last_alert: now };
        }
        admitted
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn cooldown_secs(&self) -> f64 {
        self.cooldown_secs
    }

    /// Seconds of suppression left at `now`; zero when an admit would pass.
    pub fn remaining(&self, now: f64) -> f64 {
        match self.state {
            GateState::Cooled => 0.0,
            GateState::OnCooldown { last_alert } => {
                (self.cooldown_secs - (now - last_alert)).max(0.0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_admit_always_passes() {
        let mut gate = AlertGate::new(30.0);
        assert_eq!(gate.state(), GateState::Cooled);
        assert!(gate.admit(0.0));
        assert_eq!(gate.state(), GateState::OnCooldown { last_alert: 0.0 });
    }

    #[test]
    fn cooldown_boundary() {
        let mut gate = AlertGate::new(30.0);
        assert!(gate.admit(0.0));
        assert!(!gate.admit(29.9));
        assert!(gate.admit(30.1));
    }

    #[test]
    fn exactly_cooldown_is_still_suppressed() {
        let mut gate = AlertGate::new(30.0);
        assert!(gate.admit(100.0));
        assert!(!gate.admit(130.0));
    }

    #[test]
    fn suppressed_admits_do_not_move_the_window() {
        let mut gate = AlertGate::new(30.0);
        assert!(gate.admit(0.0));
        for t in [5.0, 10.0, 20.0, 29.0] {
            assert!(!gate.admit(t));
        }
        assert_eq!(gate.state(), GateState::OnCooldown { last_alert: 0.0 });
        assert!(gate.admit(31.0));
    }

    #[test]
    fn successful_admit_rearms_cooldown() {
        let mut gate = AlertGate::new(30.0);
        assert!(gate.admit(0.0));
        assert!(gate.admit(31.0));
        assert!(!gate.admit(60.0));
        assert!(gate.admit(61.5));
    }

    #[test]
    fn admits_match_reference_rule_over_a_sequence() {
        let cooldown = 10.0;
        let mut gate = AlertGate::new(cooldown);
        let mut last_admitted: Option<f64> = None;
        let mut t = 0.0;
        for step in 0..200 {
            t += ((step * 7) % 5) as f64 + 0.25;
            let expected = last_admitted.map_or(true, |last| t - last > cooldown);
            assert_eq!(gate.admit(t), expected, "at t={}", t);
            if expected {
                last_admitted = Some(t);
            }
        }
    }

    #[test]
    fn remaining_counts_down() {
        let mut gate = AlertGate::new(30.0);
        assert_eq!(gate.remaining(0.0), 0.0);
        gate.admit(10.0);
        assert_eq!(gate.remaining(20.0), 20.0);
        assert_eq!(gate.remaining(50.0), 0.0);
    }

    #[test]
    fn zero_cooldown_admits_any_later_time() {
        let mut gate = AlertGate::new(0.0);
        assert!(gate.admit(1.0));
        assert!(!gate.admit(1.0));
        assert!(gate.admit(1.001));
    }
}
