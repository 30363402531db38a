//! Mapping Representations
//!
//! A representation embeds mappings as points of a metric space so the
//! search can talk about distances and balls. The design-centering core only
//! ever uses the [`Representation`] trait; [`SimpleVectorRepresentation`] is
//! the plain "one coordinate per process" embedding.

use std::collections::HashSet;
use std::sync::Arc;

use log::trace;
use rand::Rng;
use rand_distr::{Binomial, Distribution};
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use crate::error::DseResult;
use crate::kpn::Application;
use crate::mapping::{CommunicationMapper, Mapping};
use crate::platform::Platform;

/// A point in representation space
pub type Point = Vec<f64>;

/// Random number generator used for every sampling decision
pub type DcRng = Xoshiro256PlusPlus;

/// Attempts to find a point not yet drawn in the current batch
const MAX_RESAMPLE: usize = 64;

/// Attempts to draw an offset inside the ball before falling back to the center
const MAX_REJECT: usize = 256;

/// Offset distribution inside a ball
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleDistribution {
    /// Every lattice point of the ball equally likely
    Uniform,
    /// Centered binomial per coordinate, concentrated near the center
    Binomial,
}

/// Geometry capabilities the search relies on
pub trait Representation: Send + Sync {
    /// Number of coordinates of a point
    fn dim(&self) -> usize;

    /// Dimension used for volume estimates
    fn true_dim(&self) -> usize {
        self.dim()
    }

    /// A uniformly random point of the whole space
    fn uniform(&self, rng: &mut DcRng) -> Point;

    fn to_representation(&self, mapping: &Mapping) -> Point;

    fn from_representation(&self, point: &Point) -> DseResult<Mapping>;

    /// Snap an arbitrary vector to the nearest valid point
    fn approximate(&self, vector: &[f64]) -> Point;

    /// Draw `n` valid points from the ball around `center`
    fn sample_in_ball(
        &self,
        center: &Point,
        radius: f64,
        n: usize,
        distribution: SampleDistribution,
        rng: &mut DcRng,
    ) -> Vec<Point>;

    fn distance(&self, a: &Point, b: &Point) -> f64;

    /// Diameter of the space; no ball needs a larger radius
    fn max_radius(&self) -> f64;
}

/// One coordinate per process, holding the index of its processor
#[derive(Debug, Clone)]
pub struct SimpleVectorRepresentation {
    pub app: Arc<Application>,
    pub platform: Arc<Platform>,
    /// p of the p-norm; `f64::INFINITY` gives the Chebyshev box
    pub norm_p: f64,
}

impl SimpleVectorRepresentation {
    pub fn new(app: Arc<Application>, platform: Arc<Platform>, norm_p: f64) -> Self {
        SimpleVectorRepresentation { app, platform, norm_p }
    }

    fn norm(&self, offset: &[f64]) -> f64 {
        if self.norm_p.is_infinite() {
            offset.iter().fold(0.0, |acc, v| acc.max(v.abs()))
        } else {
            offset.iter()
                .map(|v| v.abs().powf(self.norm_p))
                .sum::<f64>()
                .powf(1.0 / self.norm_p)
        }
    }

    /// Integer offset inside the ball, or the zero offset if none is found
    fn draw_offset(&self, radius: f64, binomial: Option<&Binomial>, rng: &mut DcRng) -> Vec<f64> {
        let dim = self.dim();
        let reach = radius.floor() as i64;
        if reach == 0 {
            return vec![0.0; dim];
        }

        for _ in 0..MAX_REJECT {
            let offset: Vec<f64> = (0..dim)
                .map(|_| match binomial {
                    Some(b) => (b.sample(rng) as i64 - reach) as f64,
                    None => rng.random_range(-reach..=reach) as f64,
                })
                .collect();
            if self.norm(&offset) <= radius + 1e-9 {
                return offset;
            }
        }
        vec![0.0; dim]
    }
}

fn lattice_key(point: &Point) -> Vec<i64> {
    point.iter().map(|v| v.round() as i64).collect()
}

impl Representation for SimpleVectorRepresentation {
    fn dim(&self) -> usize {
        self.app.num_processes()
    }

    fn uniform(&self, rng: &mut DcRng) -> Point {
        let n_pe = self.platform.num_processors().max(1);
        (0..self.dim())
            .map(|_| rng.random_range(0..n_pe) as f64)
            .collect()
    }

    fn to_representation(&self, mapping: &Mapping) -> Point {
        mapping.process_to_pe.iter().map(|&pe| pe as f64).collect()
    }

    fn from_representation(&self, point: &Point) -> DseResult<Mapping> {
        let placement = self.approximate(point)
            .iter()
            .map(|&v| v as usize)
            .collect();
        CommunicationMapper::complete(&self.app, &self.platform, placement)
    }

    fn approximate(&self, vector: &[f64]) -> Point {
        let max = self.platform.num_processors().saturating_sub(1) as f64;
        vector.iter()
            .map(|&v| if v.is_finite() { v.round().clamp(0.0, max) } else { 0.0 })
            .collect()
    }

    fn sample_in_ball(
        &self,
        center: &Point,
        radius: f64,
        n: usize,
        distribution: SampleDistribution,
        rng: &mut DcRng,
    ) -> Vec<Point> {
        let radius = if radius.is_finite() {
            radius.clamp(0.0, self.max_radius())
        } else {
            self.max_radius()
        };
        let reach = radius.floor() as u64;
        let binomial = match distribution {
            SampleDistribution::Binomial => Binomial::new(reach.saturating_mul(2), 0.5).ok(),
            SampleDistribution::Uniform => None,
        };

        let mut seen = HashSet::new();
        let mut points = Vec::with_capacity(n);
        for _ in 0..n {
            let mut candidate = center.clone();
            for attempt in 0..MAX_RESAMPLE {
                let offset = self.draw_offset(radius, binomial.as_ref(), rng);
                let shifted: Vec<f64> = center.iter().zip(&offset).map(|(c, o)| c + o).collect();
                candidate = self.approximate(&shifted);
                if !seen.contains(&lattice_key(&candidate)) {
                    break;
                }
                if attempt + 1 == MAX_RESAMPLE {
                    trace!("ball around {:?} exhausted, accepting duplicate", center);
                }
            }
            seen.insert(lattice_key(&candidate));
            points.push(candidate);
        }
        points
    }

    fn distance(&self, a: &Point, b: &Point) -> f64 {
        let diff: Vec<f64> = a.iter().zip(b).map(|(x, y)| x - y).collect();
        self.norm(&diff)
    }

    fn max_radius(&self) -> f64 {
        let span = self.platform.num_processors().saturating_sub(1) as f64;
        if self.norm_p.is_infinite() {
            span
        } else {
            span * (self.dim() as f64).powf(1.0 / self.norm_p)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn grid(n_pe: usize, norm_p: f64) -> SimpleVectorRepresentation {
        let mut app = Application::new("grid");
        app.add_process("x");
        app.add_process("y");
        SimpleVectorRepresentation::new(
            Arc::new(app),
            Arc::new(Platform::homogeneous(n_pe, 1_000_000_000)),
            norm_p,
        )
    }

    #[test]
    fn test_approximate_rounds_and_clamps() {
        let repr = grid(10, 2.0);
        assert_eq!(repr.approximate(&[3.4, 12.0]), vec![3.0, 9.0]);
        assert_eq!(repr.approximate(&[-2.0, f64::NAN]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_round_trip_mapping() {
        let repr = grid(10, 2.0);
        let mapping = repr.from_representation(&vec![4.0, 7.0]).unwrap();
        assert_eq!(mapping.process_to_pe, vec![4, 7]);
        assert_eq!(repr.to_representation(&mapping), vec![4.0, 7.0]);
    }

    #[test]
    fn test_distance_norms() {
        let l2 = grid(10, 2.0);
        let linf = grid(10, f64::INFINITY);
        let a = vec![0.0, 0.0];
        let b = vec![3.0, 4.0];
        assert!((l2.distance(&a, &b) - 5.0).abs() < 1e-12);
        assert_eq!(linf.distance(&a, &b), 4.0);
    }

    #[test]
    fn test_ball_samples_stay_inside() {
        let mut rng = DcRng::seed_from_u64(11);
        for &p in &[1.0, 2.0, f64::INFINITY] {
            let repr = grid(20, p);
            let center = vec![10.0, 10.0];
            for distr in [SampleDistribution::Uniform, SampleDistribution::Binomial] {
                let points = repr.sample_in_ball(&center, 3.0, 40, distr, &mut rng);
                assert_eq!(points.len(), 40);
                for point in &points {
                    assert!(repr.distance(&center, point) <= 3.0 + 1e-9);
                }
            }
        }
    }

    #[test]
    fn test_small_ball_covers_lattice_before_repeating() {
        let repr = grid(20, f64::INFINITY);
        let mut rng = DcRng::seed_from_u64(3);
        let points = repr.sample_in_ball(&vec![5.0, 5.0], 1.5, 9, SampleDistribution::Uniform, &mut rng);
        let distinct: HashSet<Vec<i64>> = points.iter().map(lattice_key).collect();
        assert_eq!(distinct.len(), 9);
    }

    #[test]
    fn test_max_radius_is_diameter() {
        assert_eq!(grid(15, f64::INFINITY).max_radius(), 14.0);
        assert!((grid(15, 2.0).max_radius() - 14.0 * 2f64.sqrt()).abs() < 1e-12);
        assert_eq!(grid(15, 1.0).max_radius(), 28.0);
        assert_eq!(grid(1, 2.0).max_radius(), 0.0);
    }

    #[test]
    fn test_huge_radius_is_clamped() {
        let repr = grid(15, f64::INFINITY);
        let mut rng = DcRng::seed_from_u64(8);
        for distr in [SampleDistribution::Uniform, SampleDistribution::Binomial] {
            for radius in [1e30, f64::MAX, f64::INFINITY] {
                let points = repr.sample_in_ball(&vec![7.0, 7.0], radius, 20, distr, &mut rng);
                assert_eq!(points.len(), 20);
                assert!(points.iter().flatten().all(|&v| (0.0..=14.0).contains(&v)));
            }
        }
    }

    #[test]
    fn test_zero_radius_returns_center() {
        let repr = grid(20, 2.0);
        let mut rng = DcRng::seed_from_u64(5);
        let points = repr.sample_in_ball(&vec![2.0, 3.0], 0.5, 4, SampleDistribution::Uniform, &mut rng);
        assert!(points.iter().all(|p| p == &vec![2.0, 3.0]));
    }
}
