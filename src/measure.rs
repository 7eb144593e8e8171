//! Runtime measurement and energy / emissions estimation

use std::time::{Duration, Instant};

/// Assumed draw of a CPU-bound workload when nothing better is known (kW)
pub const DEFAULT_ASSUMED_KW: f64 = 0.1;

/// Energy and emissions for a run
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Footprint {
    pub energy_kwh: f64,
    pub emissions_kg_co2e: f64,
}

/// Proxy estimate: kWh = kW * hours, kgCO2e = kWh * gCO2/kWh / 1000
pub fn energy_co2_proxy(runtime_s: f64, intensity_g_per_kwh: f64, assumed_kw: f64) -> Footprint {
    let energy_kwh = assumed_kw * (runtime_s / 3600.0);
    Footprint {
        energy_kwh,
        emissions_kg_co2e: energy_kwh * (intensity_g_per_kwh / 1000.0),
    }
}

/// Run `f` and report its wall-clock duration alongside its output
pub fn timed<T>(f: impl FnOnce() -> T) -> (T, Duration) {
    let start = Instant::now();
    let out = f();
    (out, start.elapsed())
}
