//! Point contact restricted to one Cartesian axis.
//!
//! The full 3-D contact is always computed; the exposed `jc`, `a0` and `da0_dx` are the row of
//! the 3-D quantities selected by the mask. Forces go the other way: the scalar force is
//! scattered into the masked component of the 3-D force.

extern crate nalgebra as na;

use std::fmt;
use std::str::FromStr;
use na::{DMatrix, DVector, Vector3};
use crate::contact_3d::Contact3d;
use crate::contact_traits::{Contact, ContactData};
use crate::kinematic_traits::{FrameIndex, KinematicsProvider, ReferenceFrame};
use crate::residual_error::{check_matrix_shape, check_vector_len, ResidualError};
use crate::residual_traits::ForceStage;
use crate::state::StateMultibody;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContactMask {
    X,
    Y,
    Z,
}

impl ContactMask {
    pub const ALL: [ContactMask; 3] = [ContactMask::X, ContactMask::Y, ContactMask::Z];

    /// Row of the 3-D quantities selected by this mask.
    pub fn row(self) -> usize {
        match self {
            ContactMask::X => 0,
            ContactMask::Y => 1,
            ContactMask::Z => 2,
        }
    }
}

impl TryFrom<usize> for ContactMask {
    type Error = ResidualError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ContactMask::X),
            1 => Ok(ContactMask::Y),
            2 => Ok(ContactMask::Z),
            _ => Err(ResidualError::InvalidMask(value.to_string())),
        }
    }
}

impl FromStr for ContactMask {
    type Err = ResidualError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "x" => Ok(ContactMask::X),
            "y" => Ok(ContactMask::Y),
            "z" => Ok(ContactMask::Z),
            _ => Err(ResidualError::InvalidMask(s.to_string())),
        }
    }
}

impl fmt::Display for ContactMask {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ContactMask::X => "x",
            ContactMask::Y => "y",
            ContactMask::Z => "z",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone)]
pub struct Contact1d {
    inner: Contact3d,
    mask: ContactMask,
}

impl Contact1d {
    pub fn new(state: StateMultibody, frame_id: FrameIndex, reference_position: Vector3<f64>, nu: usize,
               gains: [f64; 2], mask: ContactMask, reference: ReferenceFrame) -> Result<Self, ResidualError> {
        let inner = Contact3d::new(state, frame_id, reference_position, nu, gains, reference)?;
        Ok(Contact1d { inner, mask })
    }

    pub fn mask(&self) -> ContactMask {
        self.mask
    }

    /// Selects another axis for the following evaluations. A `calc_diff` after the change
    /// re-selects `jc` and `a0` too, so data filled by `calc` with the old axis stays consistent.
    pub fn set_mask(&mut self, mask: ContactMask) {
        self.mask = mask;
    }

    pub fn reference_position(&self) -> &Vector3<f64> {
        self.inner.reference_position()
    }

    pub fn set_reference_position(&mut self, reference_position: Vector3<f64>) {
        self.inner.set_reference_position(reference_position);
    }

    pub fn gains(&self) -> [f64; 2] {
        self.inner.gains()
    }

    pub fn reference(&self) -> ReferenceFrame {
        self.inner.reference()
    }
}

impl Contact for Contact1d {
    fn state(&self) -> &StateMultibody {
        self.inner.state()
    }

    fn nc(&self) -> usize {
        1
    }

    fn nu(&self) -> usize {
        self.inner.nu()
    }

    fn frame_id(&self) -> FrameIndex {
        self.inner.frame_id()
    }

    fn calc(&self, data: &mut ContactData, kinematics: &dyn KinematicsProvider, x: &DVector<f64>)
            -> Result<(), ResidualError> {
        self.check_data(data)?;
        self.inner.calc_full(data, kinematics, x)?;
        data.select_kinematics(&[self.mask.row()]);
        Ok(())
    }

    fn calc_diff(&self, data: &mut ContactData, kinematics: &dyn KinematicsProvider, x: &DVector<f64>)
                 -> Result<(), ResidualError> {
        self.check_data(data)?;
        self.inner.calc_diff_full(data, kinematics, x)?;
        data.select_derivatives(&[self.mask.row()]);
        Ok(())
    }

    fn update_force(&self, data: &mut ContactData, force: &DVector<f64>) -> Result<(), ResidualError> {
        self.check_data(data)?;
        check_vector_len("force", force.len(), 1)?;
        let mut full = Vector3::zeros();
        full[self.mask.row()] = force[0];
        self.inner.store_force(data, full)
    }

    fn update_force_diff(&self, data: &mut ContactData, df_dx: &DMatrix<f64>, df_du: &DMatrix<f64>)
                         -> Result<(), ResidualError> {
        self.check_data(data)?;
        let ndx = self.state().ndx();
        check_matrix_shape("df_dx", df_dx.shape(), (1, ndx))?;
        check_matrix_shape("df_du", df_du.shape(), (1, self.nu()))?;
        let row = self.mask.row();
        data.df_dx.fill(0.0);
        data.df_du.fill(0.0);
        data.df_dx.row_mut(row).copy_from(&df_dx.row(0));
        data.df_du.row_mut(row).copy_from(&df_du.row(0));
        data.force_stage = ForceStage::ForceDerivativesValid;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_parsing() {
        assert_eq!("x".parse::<ContactMask>().unwrap(), ContactMask::X);
        assert_eq!(" Z ".parse::<ContactMask>().unwrap(), ContactMask::Z);
        assert_eq!("w".parse::<ContactMask>(), Err(ResidualError::InvalidMask("w".into())));
        assert_eq!(ContactMask::try_from(1), Ok(ContactMask::Y));
        assert_eq!(ContactMask::try_from(3), Err(ResidualError::InvalidMask("3".into())));
        for mask in ContactMask::ALL {
            assert_eq!(mask.to_string().parse::<ContactMask>(), Ok(mask));
            assert_eq!(ContactMask::try_from(mask.row()), Ok(mask));
        }
    }
}
