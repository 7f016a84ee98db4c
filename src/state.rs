//! State of the multibody system: `x = [q; v]`.
//!
//! All joints are revolute, so the configuration lives in a vector space and the tangent
//! state has the same layout as the state itself (`ndx == nx`).

extern crate nalgebra as na;

use std::f64::consts::PI;
use std::sync::Arc;
use na::DVector;
use rand::Rng;
use crate::multibody::MultibodyModel;

#[derive(Debug, Clone)]
pub struct StateMultibody {
    model: Arc<MultibodyModel>,
}

impl StateMultibody {
    pub fn new(model: Arc<MultibodyModel>) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &Arc<MultibodyModel> {
        &self.model
    }

    pub fn nq(&self) -> usize {
        self.model.nq()
    }

    pub fn nv(&self) -> usize {
        self.model.nv()
    }

    pub fn nx(&self) -> usize {
        self.nq() + self.nv()
    }

    pub fn ndx(&self) -> usize {
        2 * self.nv()
    }

    pub fn zero(&self) -> DVector<f64> {
        DVector::zeros(self.nx())
    }

    /// Random state with joint angles in `[-pi, pi)` and velocities in `[-1, 1)`.
    pub fn rand<R: Rng>(&self, rng: &mut R) -> DVector<f64> {
        let nq = self.nq();
        DVector::from_fn(self.nx(), |i, _| {
            if i < nq { rng.gen_range(-PI..PI) } else { rng.gen_range(-1.0..1.0) }
        })
    }

    pub fn q<'a>(&self, x: &'a DVector<f64>) -> na::DVectorView<'a, f64> {
        x.rows(0, self.nq())
    }

    pub fn v<'a>(&self, x: &'a DVector<f64>) -> na::DVectorView<'a, f64> {
        x.rows(self.nq(), self.nv())
    }

    /// `x (+) dx`
    pub fn integrate(&self, x: &DVector<f64>, dx: &DVector<f64>) -> DVector<f64> {
        x + dx
    }

    /// `x1 (-) x0`
    pub fn diff(&self, x0: &DVector<f64>, x1: &DVector<f64>) -> DVector<f64> {
        x1 - x0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use crate::multibody_robots::six_axis_arm;

    #[test]
    fn test_dimensions_and_random_bounds() {
        let (model, _) = six_axis_arm();
        let state = StateMultibody::new(Arc::new(model));
        assert_eq!(state.nx(), 12);
        assert_eq!(state.ndx(), 12);

        let mut rng = StdRng::seed_from_u64(7);
        let x = state.rand(&mut rng);
        assert!(state.q(&x).iter().all(|q| (-PI..PI).contains(q)));
        assert!(state.v(&x).iter().all(|v| (-1.0..1.0).contains(v)));
    }

    #[test]
    fn test_integrate_then_diff() {
        let (model, _) = six_axis_arm();
        let state = StateMultibody::new(Arc::new(model));
        let x0 = state.zero();
        let dx = DVector::from_element(state.ndx(), 0.25);
        let x1 = state.integrate(&x0, &dx);
        assert_eq!(state.diff(&x0, &x1), dx);
    }
}
