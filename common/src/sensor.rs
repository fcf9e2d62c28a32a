use crate::clock::elapsed_ms;

/// Raw climate sample. Failed reads are reported as NaN fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimateReading {
    pub temperature_c: f32,
    pub humidity: f32,
}

impl ClimateReading {
    pub fn failed() -> Self {
        Self {
            temperature_c: f32::NAN,
            humidity: f32::NAN,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.temperature_c.is_finite() && self.humidity.is_finite()
    }
}

pub trait ClimateSensor {
    fn read(&mut self) -> ClimateReading;
}

/// Fixed-interval schedule for climate reads. The first call is always due.
#[derive(Debug, Clone)]
pub struct SensorSampler {
    interval_ms: u64,
    last_sample_ms: Option<u64>,
}

impl SensorSampler {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_sample_ms: None,
        }
    }

    pub fn poll(&mut self, now_ms: u64) -> bool {
        let due = self
            .last_sample_ms
            .map(|last| elapsed_ms(now_ms, last) >= self.interval_ms)
            .unwrap_or(true);
        if due {
            self.last_sample_ms = Some(now_ms);
        }
        due
    }
}
