//! Central finite differences of residuals and contacts, used to validate analytic derivatives.
//!
//! Every perturbed column is evaluated on its own kinematics and data instances, in parallel.

extern crate nalgebra as na;

use na::{DMatrix, DVector};
use rayon::prelude::*;
use crate::contact_traits::Contact;
use crate::data_collector::DataCollector;
use crate::kinematics_impl::MultibodyData;
use crate::residual_error::{check_vector_len, ResidualError};
use crate::residual_traits::Residual;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumDiff {
    /// Perturbation applied to one coordinate at a time.
    disturbance: f64,
}

impl Default for NumDiff {
    fn default() -> Self {
        // Balances truncation and rounding errors of the central scheme.
        NumDiff { disturbance: f64::EPSILON.cbrt() }
    }
}

impl NumDiff {
    pub fn new(disturbance: f64) -> Self {
        NumDiff { disturbance }
    }

    pub fn disturbance(&self) -> f64 {
        self.disturbance
    }

    /// Agreement expected between analytic and numerical derivatives.
    pub fn tolerance(&self) -> f64 {
        self.disturbance.sqrt()
    }

    /// Derivative of `function` at `point`, one column per coordinate of `point`.
    pub fn jacobian<F>(&self, point: &DVector<f64>, function: F) -> Result<DMatrix<f64>, ResidualError>
    where
        F: Fn(&DVector<f64>) -> Result<DVector<f64>, ResidualError> + Sync,
    {
        let h = self.disturbance;
        let columns = (0..point.len()).into_par_iter().map(|i| {
            let mut plus = point.clone();
            plus[i] += h;
            let mut minus = point.clone();
            minus[i] -= h;
            Ok((function(&plus)? - function(&minus)?) / (2.0 * h))
        }).collect::<Result<Vec<DVector<f64>>, ResidualError>>()?;

        let rows = columns.first().map_or(0, |c| c.len());
        let mut jacobian = DMatrix::zeros(rows, columns.len());
        for (i, column) in columns.iter().enumerate() {
            jacobian.set_column(i, column);
        }
        Ok(jacobian)
    }

    /// Residual value with the kinematics updated for `x` at zero joint acceleration.
    pub fn residual_value<R: Residual>(model: &R, x: &DVector<f64>, u: &DVector<f64>)
                                       -> Result<DVector<f64>, ResidualError> {
        let shared = DataCollector::for_state(model.state().model(), x)?;
        let mut data = model.create_data(&shared)?;
        model.calc(&mut data, &shared, x, u)?;
        Ok(data.as_ref().r.clone())
    }

    /// Numerical `rx`, `nr x ndx`.
    pub fn residual_rx<R: Residual>(&self, model: &R, x: &DVector<f64>, u: &DVector<f64>)
                                    -> Result<DMatrix<f64>, ResidualError> {
        check_vector_len("x", x.len(), model.state().nx())?;
        self.jacobian(x, |x| Self::residual_value(model, x, u))
    }

    /// Numerical `ru`, `nr x nu`.
    pub fn residual_ru<R: Residual>(&self, model: &R, x: &DVector<f64>, u: &DVector<f64>)
                                    -> Result<DMatrix<f64>, ResidualError> {
        check_vector_len("u", u.len(), model.nu())?;
        if u.is_empty() {
            return Ok(DMatrix::zeros(model.nr(), 0));
        }
        self.jacobian(u, |u| Self::residual_value(model, x, u))
    }

    /// Exposed acceleration drift of the contact at `x`, zero joint acceleration.
    pub fn contact_drift<C: Contact + ?Sized>(contact: &C, x: &DVector<f64>) -> Result<DVector<f64>, ResidualError> {
        let mut kinematics = MultibodyData::new(contact.state().model());
        kinematics.update_state(x)?;
        let mut data = contact.create_data();
        contact.calc(&mut data, &kinematics, x)?;
        Ok(data.a0)
    }

    /// Numerical `da0_dx`, `nc x ndx`.
    pub fn contact_da0_dx<C: Contact + ?Sized>(&self, contact: &C, x: &DVector<f64>)
                                               -> Result<DMatrix<f64>, ResidualError> {
        check_vector_len("x", x.len(), contact.state().nx())?;
        self.jacobian(x, |x| Self::contact_drift(contact, x))
    }
}
