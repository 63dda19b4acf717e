use super::model::{Capability, MidpointInterpolator};
use anyhow::Result;
use fl_core::AlignedFrame;

/// Orders the frames synthesized between two source frames.
///
/// For `n` inserts the targets are `1/(n+1) .. n/(n+1)`. Parametric models are
/// asked for each point directly. Midpoint-only models are driven by
/// bisection, which lands on the same points only when `n + 1` is a power of
/// two; for other `n` the spacing is approximate.
pub struct InterpolationScheduler {
    capability: Capability,
}

impl InterpolationScheduler {
    pub fn new(capability: Capability) -> Self {
        Self { capability }
    }

    pub fn capability(&self) -> &Capability {
        &self.capability
    }

    /// Returns exactly `n` aligned frames in temporal order.
    pub fn schedule(
        &mut self,
        i0: &AlignedFrame,
        i1: &AlignedFrame,
        n: usize,
    ) -> Result<Vec<AlignedFrame>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        match &mut self.capability {
            Capability::Parametric(model) => {
                let denom = (n + 1) as f32;
                (1..=n)
                    .map(|i| model.interpolate(i0, i1, i as f32 / denom))
                    .collect()
            }
            Capability::MidpointOnly(model) => bisect(model.as_mut(), i0, i1, n),
        }
    }
}

/// Left half gets `n / 2`, right half the same; the midpoint itself is only
/// emitted when `n` is odd. Depth is bounded by `log2(n)`.
fn bisect(
    model: &mut dyn MidpointInterpolator,
    i0: &AlignedFrame,
    i1: &AlignedFrame,
    n: usize,
) -> Result<Vec<AlignedFrame>> {
    let mid = model.midpoint(i0, i1)?;
    if n == 1 {
        return Ok(vec![mid]);
    }

    let mut out = bisect(model, i0, &mid, n / 2)?;
    let right = bisect(model, &mid, i1, n / 2)?;
    out.reserve(right.len() + 1);
    if n % 2 == 1 {
        out.push(mid);
    }
    out.extend(right);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpolate::model::ParametricInterpolator;
    use std::sync::{Arc, Mutex};

    /// Single-sample frames make the schedule easy to read back.
    fn point(v: f32) -> AlignedFrame {
        AlignedFrame::filled(1, 1, v)
    }

    fn values(frames: &[AlignedFrame]) -> Vec<f32> {
        frames.iter().map(|f| f.samples()[0]).collect()
    }

    struct Average {
        calls: Arc<Mutex<usize>>,
    }

    impl MidpointInterpolator for Average {
        fn midpoint(&mut self, a: &AlignedFrame, b: &AlignedFrame) -> Result<AlignedFrame> {
            *self.calls.lock().unwrap() += 1;
            Ok(point((a.samples()[0] + b.samples()[0]) / 2.0))
        }
    }

    struct Lerp {
        seen: Arc<Mutex<Vec<f32>>>,
    }

    impl ParametricInterpolator for Lerp {
        fn interpolate(&mut self, a: &AlignedFrame, b: &AlignedFrame, t: f32) -> Result<AlignedFrame> {
            self.seen.lock().unwrap().push(t);
            let (x, y) = (a.samples()[0], b.samples()[0]);
            Ok(point(x + (y - x) * t))
        }
    }

    fn midpoint_scheduler() -> (InterpolationScheduler, Arc<Mutex<usize>>) {
        let calls = Arc::new(Mutex::new(0));
        let scheduler = InterpolationScheduler::new(Capability::MidpointOnly(Box::new(Average {
            calls: calls.clone(),
        })));
        (scheduler, calls)
    }

    #[test]
    fn bisection_odd_count_keeps_midpoint() {
        let (mut scheduler, _) = midpoint_scheduler();
        let out = scheduler.schedule(&point(0.0), &point(8.0), 3).unwrap();
        assert_eq!(values(&out), vec![2.0, 4.0, 6.0]);
    }

    #[test]
    fn bisection_even_count_drops_midpoint() {
        let (mut scheduler, _) = midpoint_scheduler();
        let out = scheduler.schedule(&point(0.0), &point(4.0), 2).unwrap();
        assert_eq!(values(&out), vec![1.0, 3.0]);
    }

    #[test]
    fn bisection_spacing_is_approximate_for_four() {
        // Exact spacing would be 1.6, 3.2, 4.8, 6.4.
        let (mut scheduler, _) = midpoint_scheduler();
        let out = scheduler.schedule(&point(0.0), &point(8.0), 4).unwrap();
        assert_eq!(values(&out), vec![1.0, 3.0, 5.0, 7.0]);
    }

    #[test]
    fn bisection_yields_n_frames_with_linear_calls() {
        let (mut scheduler, calls) = midpoint_scheduler();
        for n in 1..=33 {
            *calls.lock().unwrap() = 0;
            let out = scheduler.schedule(&point(0.0), &point(1.0), n).unwrap();
            assert_eq!(out.len(), n, "n = {}", n);
            assert!(*calls.lock().unwrap() <= 2 * n, "n = {}", n);
        }
    }

    #[test]
    fn bisection_is_deterministic() {
        let (mut scheduler, _) = midpoint_scheduler();
        let first = values(&scheduler.schedule(&point(0.0), &point(64.0), 7).unwrap());
        let second = values(&scheduler.schedule(&point(0.0), &point(64.0), 7).unwrap());
        assert_eq!(first, second);
        assert_eq!(first, vec![8.0, 16.0, 24.0, 32.0, 40.0, 48.0, 56.0]);
    }

    #[test]
    fn parametric_requests_even_timesteps_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler = InterpolationScheduler::new(Capability::Parametric(Box::new(Lerp {
            seen: seen.clone(),
        })));
        let out = scheduler.schedule(&point(0.0), &point(8.0), 3).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![0.25, 0.5, 0.75]);
        assert_eq!(values(&out), vec![2.0, 4.0, 6.0]);

        for n in 1..=9 {
            assert_eq!(scheduler.schedule(&point(0.0), &point(1.0), n).unwrap().len(), n);
        }
    }

    #[test]
    fn zero_inserts_is_empty() {
        let (mut scheduler, calls) = midpoint_scheduler();
        assert!(scheduler.schedule(&point(0.0), &point(1.0), 0).unwrap().is_empty());
        assert_eq!(*calls.lock().unwrap(), 0);
    }
}
