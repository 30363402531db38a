//! Adaptive search volume
//!
//! The ball (center + radius) the design-centering loop samples from. After
//! every iteration the center moves toward the feasible samples and the
//! radius grows or shrinks depending on the empirical hitting probability.

use std::sync::Arc;

use crate::representation::{Point, Representation};
use crate::sample::SampleSet;

/// Radius floor; keeps the ball from collapsing to nothing
pub const MIN_RADIUS: f64 = 0.05;

/// Largest step applied in one adaptation
pub const MAX_STEP: f64 = 0.99;

/// p-norm ball in representation space
pub struct Volume {
    pub center: Point,
    pub radius: f64,
    representation: Arc<dyn Representation>,
}

impl Volume {
    pub fn new(center: Point, radius: f64, representation: Arc<dyn Representation>) -> Self {
        let center = representation.approximate(&center);
        let mut volume = Volume {
            center,
            radius,
            representation,
        };
        volume.radius = volume.bounded(radius);
        volume
    }

    /// Clamp into `[MIN_RADIUS, max_radius]`
    fn bounded(&self, radius: f64) -> f64 {
        if radius.is_nan() {
            return MIN_RADIUS;
        }
        radius.clamp(MIN_RADIUS, self.max_radius())
    }

    /// Dimension used in the area estimate
    pub fn true_dim(&self) -> usize {
        self.representation.true_dim()
    }

    /// Largest radius the ball can take
    pub fn max_radius(&self) -> f64 {
        self.representation.max_radius().max(MIN_RADIUS)
    }

    /// `p * radius^true_dim`
    pub fn area(&self, hitting_probability: f64) -> f64 {
        hitting_probability * self.radius.powi(self.true_dim() as i32)
    }

    /// Move the center to the mean of the latest group's feasible points
    ///
    /// The mean is snapped into the representation's domain. With no
    /// feasible point in the group the center stays where it is.
    pub fn adapt_center(&mut self, sample_set: &SampleSet) -> Point {
        let feasible: Vec<&Point> = sample_set.last_group()
            .iter()
            .filter(|s| s.feasible())
            .map(|s| s.point())
            .collect();

        if let Some(first) = feasible.first() {
            let mut mean = vec![0.0; first.len()];
            for point in &feasible {
                for (m, v) in mean.iter_mut().zip(point.iter()) {
                    *m += v;
                }
            }
            let n = feasible.len() as f64;
            mean.iter_mut().for_each(|m| *m /= n);
            self.center = self.representation.approximate(&mean);
        }
        self.center.clone()
    }

    /// Empirical hitting probability of the latest group
    pub fn hitting_probability(sample_set: &SampleSet) -> f64 {
        let group = sample_set.last_group();
        if group.is_empty() {
            return 0.0;
        }
        group.iter().filter(|s| s.feasible()).count() as f64 / group.len() as f64
    }

    /// Grow the radius by `target_step` if the latest group hit more often than
    /// `target_p`, shrink it otherwise; returns the empirical probability
    ///
    /// The radius never exceeds the diameter of the representation space.
    pub fn adapt_volume(&mut self, sample_set: &SampleSet, target_p: f64, target_step: f64) -> f64 {
        let p_emp = Self::hitting_probability(sample_set);
        let step = if target_step.is_finite() { target_step.clamp(0.0, MAX_STEP) } else { 0.0 };

        if p_emp > target_p {
            self.radius *= 1.0 + step;
        } else {
            self.radius *= 1.0 - step;
        }
        self.radius = self.bounded(self.radius);
        p_emp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kpn::Application;
    use crate::platform::Platform;
    use crate::representation::SimpleVectorRepresentation;
    use crate::sample::Sample;

    fn repr() -> Arc<dyn Representation> {
        let mut app = Application::new("plane");
        app.add_process("x");
        app.add_process("y");
        Arc::new(SimpleVectorRepresentation::new(
            Arc::new(app),
            Arc::new(Platform::homogeneous(16, 1_000_000_000)),
            2.0,
        ))
    }

    fn group(repr: &Arc<dyn Representation>, points: &[([f64; 2], bool)]) -> SampleSet {
        let samples: Vec<Sample> = points.iter()
            .map(|(p, feasible)| {
                let mut s = Sample::new(p.to_vec(), repr.as_ref()).unwrap();
                s.set_feasible(*feasible);
                s
            })
            .collect();
        let mut set = SampleSet::new();
        set.add_sample_list(&samples);
        set.add_sample_group(&samples);
        set
    }

    #[test]
    fn test_empty_group_probability_is_zero() {
        let repr = repr();
        let mut volume = Volume::new(vec![5.0, 5.0], 2.0, repr);
        let p = volume.adapt_volume(&SampleSet::new(), 0.5, 0.1);
        assert_eq!(p, 0.0);
        assert!((volume.radius - 1.8).abs() < 1e-12);
    }

    #[test]
    fn test_probability_in_unit_interval() {
        let repr = repr();
        let cases: [&[([f64; 2], bool)]; 3] = [
            &[([1.0, 1.0], true), ([2.0, 2.0], true)],
            &[([1.0, 1.0], false)],
            &[([1.0, 1.0], true), ([2.0, 2.0], false), ([3.0, 3.0], false), ([4.0, 4.0], true)],
        ];
        for case in cases {
            let set = group(&repr, case);
            let mut volume = Volume::new(vec![5.0, 5.0], 2.0, repr.clone());
            let p = volume.adapt_volume(&set, 0.5, 0.2);
            assert!((0.0..=1.0).contains(&p));
        }
    }

    #[test]
    fn test_radius_grows_and_shrinks() {
        let repr = repr();
        let hits = group(&repr, &[([1.0, 1.0], true), ([2.0, 2.0], true), ([3.0, 3.0], false)]);
        let mut volume = Volume::new(vec![2.0, 2.0], 2.0, repr.clone());
        let p = volume.adapt_volume(&hits, 0.5, 0.25);
        assert!((p - 2.0 / 3.0).abs() < 1e-12);
        assert!((volume.radius - 2.5).abs() < 1e-12);

        let misses = group(&repr, &[([1.0, 1.0], false), ([2.0, 2.0], true)]);
        volume.adapt_volume(&misses, 0.5, 0.5);
        assert!((volume.radius - 1.25).abs() < 1e-12);

        for _ in 0..200 {
            volume.adapt_volume(&misses, 0.9, 0.99);
        }
        assert_eq!(volume.radius, MIN_RADIUS);
    }

    #[test]
    fn test_center_is_feasible_mean() {
        let repr = repr();
        let set = group(&repr, &[([4.0, 8.0], true), ([6.0, 10.0], true), ([15.0, 0.0], false)]);
        let mut volume = Volume::new(vec![0.0, 0.0], 2.0, repr);
        assert_eq!(volume.adapt_center(&set), vec![5.0, 9.0]);
    }

    #[test]
    fn test_center_kept_without_feasible_samples() {
        let repr = repr();
        let set = group(&repr, &[([4.0, 8.0], false)]);
        let mut volume = Volume::new(vec![3.0, 3.0], 2.0, repr);
        assert_eq!(volume.adapt_center(&set), vec![3.0, 3.0]);
    }

    #[test]
    fn test_center_rounds_fractional_mean() {
        let repr = repr();
        let set = group(&repr, &[([4.0, 8.0], true), ([5.0, 9.0], true), ([5.0, 8.0], true), ([0.0, 0.0], false)]);
        let mut volume = Volume::new(vec![0.0, 0.0], 2.0, repr);
        // mean (4.67, 8.33)
        assert_eq!(volume.adapt_center(&set), vec![5.0, 8.0]);
        assert_eq!(volume.center, vec![5.0, 8.0]);
    }

    #[test]
    fn test_radius_capped_at_diameter() {
        let repr = repr();
        let max = repr.max_radius();
        assert!(max > 21.0 && max < 22.0);
        let hits = group(&repr, &[([1.0, 1.0], true)]);
        let mut volume = Volume::new(vec![5.0, 5.0], 1e9, repr.clone());
        assert_eq!(volume.radius, max);

        for _ in 0..1000 {
            volume.adapt_volume(&hits, 0.5, 0.99);
        }
        assert!(volume.radius.is_finite());
        assert_eq!(volume.radius, max);
    }

    #[test]
    fn test_area() {
        let volume = Volume::new(vec![3.0, 3.0], 2.0, repr());
        assert!((volume.area(0.5) - 2.0).abs() < 1e-12);
    }
}
