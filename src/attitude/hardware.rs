use serde::Serialize;

/// One raw IMU/BMS sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ImuReading {
    /// Angular rates around x, y, z in deg/s.
    pub gyroscope: [f64; 3],
    /// Pitch, roll, yaw in degrees.
    pub orientation: [f64; 3],
    pub bms_voltage: f64,
    pub bms_current: f64,
    pub bms_temp: f64,
}

/// Orientation source of the attitude loop. `None` means the read failed.
pub trait AttitudeSensor: Send + Sync {
    fn read(&self) -> Option<ImuReading>;

    /// Yaw in degrees within `[0, 360)`.
    fn yaw(&self) -> Option<f64> { self.read().map(|r| r.orientation[2]) }

    /// Yaw rate in deg/s.
    fn angular_rate(&self) -> Option<f64> { self.read().map(|r| r.gyroscope[2]) }
}

/// Reaction wheel motor. Duty is signed, in percent of full authority.
pub trait WheelDriver: Send + Sync {
    fn set_duty(&self, duty: f64);
    fn duty(&self) -> f64;
}

/// Light intensity per sun sensor, sensors mounted 90° apart around the yaw axis.
pub trait SunSensorArray: Send + Sync {
    fn intensities(&self) -> Vec<Option<f64>>;
}
