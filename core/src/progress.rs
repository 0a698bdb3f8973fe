//! Weighted three-phase progress aggregator.

use std::io::Write;

/// One of the three ordered phases (update/refresh, fetch/download,
/// install/upgrade) occupying a fixed percent window of the whole run.
#[derive(Debug, Clone, Copy)]
pub struct ProgressPhase {
    weight: u32,
    start: f64,
    stop: f64,
    last: f64,
}

impl ProgressPhase {
    fn new(weight: u32, start: f64, stop: f64) -> Self {
        Self {
            weight,
            start,
            stop,
            last: start,
        }
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }
}

/// Reports an intra-phase percent (0..=100) from a driver callback,
/// converts it to a global, monotone percent in [0, 100], and emits it
/// to a writer standing in for the real stderr fd duplicated at startup.
pub struct ProgressReporter<W: Write> {
    phases: [ProgressPhase; 3],
    current: usize,
    global_last: f64,
    out: W,
}

impl<W: Write> ProgressReporter<W> {
    /// `weights` are (update, fetch, upgrade), in that fixed order.
    pub fn new(weights: [u32; 3], out: W) -> Self {
        let total: u32 = weights.iter().sum();
        let total = total.max(1) as f64;
        let mut start = 0.0;
        let mut phases = [ProgressPhase::new(0, 0.0, 0.0); 3];
        for (i, w) in weights.iter().enumerate() {
            let stop = start + (*w as f64) * 100.0 / total;
            phases[i] = ProgressPhase::new(*w, start, stop);
            start = stop;
        }
        Self {
            phases,
            current: 0,
            global_last: 0.0,
            out,
        }
    }

    /// Report `percent` (0..=100) of progress within the current phase.
    /// Emits `"{g:.2}\n"` to the writer iff it strictly improves on the
    /// last reported global value. Regressive/duplicate values are
    /// dropped silently.
    pub fn report(&mut self, percent: f64) {
        let percent = percent.clamp(0.0, 100.0);
        let phase = &mut self.phases[self.current];
        phase.last = phase.last.max(percent);
        let global = phase.start + phase.last * (phase.stop - phase.start) / 100.0;
        let global = (global * 100.0).round() / 100.0;
        if global > self.global_last {
            self.global_last = global;
            let _ = writeln!(self.out, "{global:.2}");
        }
    }

    /// Close out the current phase at 100% and advance to the next one,
    /// if any.
    pub fn finish_phase(&mut self) {
        self.report(100.0);
        if self.current + 1 < self.phases.len() {
            self.current += 1;
        }
    }

    /// Fallback for drivers with no progress hooks: emit a single
    /// terminal 100.00 to signal completion to the multiplexer, skipping
    /// the per-phase ramp entirely.
    pub fn finish_all(&mut self) {
        self.current = self.phases.len() - 1;
        self.global_last = 100.0;
        let _ = writeln!(self.out, "100.00");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reporter(weights: [u32; 3]) -> ProgressReporter<Vec<u8>> {
        ProgressReporter::new(weights, Vec::new())
    }

    fn lines(r: &ProgressReporter<Vec<u8>>) -> Vec<String> {
        String::from_utf8(r.out.clone())
            .unwrap()
            .lines()
            .map(str::to_owned)
            .collect()
    }

    #[test]
    fn single_phase_scales_to_full_range() {
        let mut r = reporter([1, 0, 0]);
        r.report(50.0);
        assert_eq!(lines(&r), vec!["50.00"]);
    }

    #[test]
    fn equal_weights_partition_evenly() {
        let mut r = reporter([1, 1, 1]);
        r.finish_phase();
        r.finish_phase();
        r.finish_phase();
        assert_eq!(lines(&r), vec!["33.33", "66.67", "100.00"]);
    }

    #[test]
    fn regressive_updates_are_dropped() {
        let mut r = reporter([1, 0, 0]);
        r.report(80.0);
        r.report(50.0);
        assert_eq!(lines(&r).len(), 1);
    }

    #[test]
    fn never_exceeds_100() {
        let mut r = reporter([2, 3, 5]);
        r.finish_phase();
        r.finish_phase();
        r.finish_phase();
        let last: f64 = lines(&r).last().unwrap().parse().unwrap();
        assert!((last - 100.0).abs() < 0.01);
    }

    #[test]
    fn finish_all_emits_single_terminal_line_when_no_hooks() {
        let mut r = reporter([1, 1, 1]);
        r.finish_all();
        assert_eq!(lines(&r).last().unwrap(), "100.00");
    }
}
