use super::hardware::{AttitudeSensor, ImuReading};
use crate::common::math::wrap_degrees;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// Mounting angle between neighbouring sun sensors.
const SENSOR_SPACING_DEG: f64 = 90.0;

/// Sun-sensor intensities taken at one IMU yaw.
#[derive(Debug, Clone, PartialEq)]
pub struct SunSample {
    pub yaw: f64,
    pub intensities: Vec<Option<f64>>,
}

/// Finds the yaw facing the sun.
///
/// Every sensor reading is attributed to the yaw the sensor looked at (IMU yaw plus its
/// mounting angle), readings are averaged per integer degree and the brightest degree wins.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn sun_offset(samples: &[SunSample]) -> Option<f64> {
    let mut bins: BTreeMap<i32, (f64, u32)> = BTreeMap::new();
    for sample in samples {
        for (idx, intensity) in sample.intensities.iter().enumerate() {
            let Some(intensity) = intensity else { continue };
            let looked_at = wrap_degrees(sample.yaw + SENSOR_SPACING_DEG * idx as f64);
            let bin = (looked_at.floor() as i32).rem_euclid(360);
            let entry = bins.entry(bin).or_insert((0.0, 0));
            entry.0 += intensity;
            entry.1 += 1;
        }
    }
    bins.into_iter()
        .map(|(bin, (sum, count))| (bin, sum / f64::from(count)))
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(bin, _)| f64::from(bin))
}

/// Attitude sensor whose yaw is reported relative to a calibration offset.
pub struct CalibratedSensor {
    inner: Arc<dyn AttitudeSensor>,
    offset: RwLock<f64>,
}

impl CalibratedSensor {
    pub fn new(inner: Arc<dyn AttitudeSensor>) -> Self { Self { inner, offset: RwLock::new(0.0) } }

    pub fn set_offset(&self, offset: f64) {
        if let Ok(mut guard) = self.offset.write() {
            *guard = offset;
        }
    }

    pub fn offset(&self) -> f64 { self.offset.read().map_or(0.0, |o| *o) }

    /// The uncorrected sensor, used while calibrating.
    pub fn raw(&self) -> &Arc<dyn AttitudeSensor> { &self.inner }
}

impl AttitudeSensor for CalibratedSensor {
    fn read(&self) -> Option<ImuReading> {
        let mut reading = self.inner.read()?;
        reading.orientation[2] = wrap_degrees(reading.orientation[2] - self.offset());
        Some(reading)
    }
}
