/// Gains of the wheel PID controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl Default for PidGains {
    fn default() -> Self { Self { kp: 2.0, ki: 0.05, kd: 0.01 } }
}

/// Single-axis PID with a clamped integral term.
#[derive(Debug, Clone)]
pub struct Pid {
    gains: PidGains,
    integral_limit: f64,
    integral: f64,
    prev_error: Option<f64>,
}

impl Pid {
    pub fn new(gains: PidGains, integral_limit: f64) -> Self {
        Self { gains, integral_limit, integral: 0.0, prev_error: None }
    }

    pub fn update(&mut self, error: f64, dt: f64) -> f64 {
        self.integral = (self.integral + error * dt).clamp(-self.integral_limit, self.integral_limit);
        // no derivative kick on the first sample after a reset
        let derivative = match self.prev_error {
            Some(prev) if dt > 0.0 => (error - prev) / dt,
            _ => 0.0,
        };
        self.prev_error = Some(error);
        self.gains.kp * error + self.gains.ki * self.integral + self.gains.kd * derivative
    }

    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = None;
    }

    pub fn integral(&self) -> f64 { self.integral }
}
