use std::time::Duration;

use metrics::{Counter, Gauge, Histogram, counter, gauge, histogram};

#[derive(Clone, Copy, Debug)]
pub enum ProbeSignalData {
    Success { elapsed: Duration },
    Unhealthy { elapsed: Option<Duration> },
    Ignored,
}

registered_event! {
    ProbeAdmission(circuit: &str) => {
        allowed: Counter = counter!("probe_closer_admissions_total", "circuit" => circuit.to_owned(), "result" => "allowed"),
        denied: Counter = counter!("probe_closer_admissions_total", "circuit" => circuit.to_owned(), "result" => "denied"),
    }

    fn emit(&self, allowed: bool) {
        if allowed {
            self.allowed.increment(1);
        } else {
            self.denied.increment(1);
            debug!(target: "adaptive_rate::probe", "Probe denied by rate limit.");
        }
    }
}

registered_event! {
    ProbeSignal(circuit: &str) => {
        healthy: Counter = counter!("probe_closer_signals_total", "circuit" => circuit.to_owned(), "class" => "healthy"),
        unhealthy: Counter = counter!("probe_closer_signals_total", "circuit" => circuit.to_owned(), "class" => "unhealthy"),
        ignored: Counter = counter!("probe_closer_signals_total", "circuit" => circuit.to_owned(), "class" => "ignored"),
        probe_duration: Histogram = histogram!("probe_closer_probe_duration_seconds", "circuit" => circuit.to_owned()),
    }

    fn emit(&self, data: ProbeSignalData) {
        match data {
            ProbeSignalData::Success { elapsed } => {
                self.healthy.increment(1);
                self.probe_duration.record(elapsed);
            }
            ProbeSignalData::Unhealthy { elapsed } => {
                self.unhealthy.increment(1);
                if let Some(elapsed) = elapsed {
                    self.probe_duration.record(elapsed);
                }
            }
            ProbeSignalData::Ignored => self.ignored.increment(1),
        }
    }
}

registered_event! {
    ProbeRate(circuit: &str) => {
        rate: Gauge = gauge!("probe_closer_rate", "circuit" => circuit.to_owned()),
    }

    fn emit(&self, rate: f64) {
        self.rate.set(rate);
    }
}
