//! Common interface of the contact models and the data they fill.

extern crate nalgebra as na;

use na::{DMatrix, DVector, Isometry3, Matrix3xX, Vector3};
use crate::contact_1d::Contact1d;
use crate::contact_3d::Contact3d;
use crate::kinematic_traits::{FrameIndex, Force, KinematicsProvider};
use crate::residual_error::{check_matrix_shape, check_vector_len, ResidualError};
use crate::residual_traits::{EvaluationStage, ForceStage, StageGuard};
use crate::state::StateMultibody;

/// Contact kinematics and force bookkeeping for one evaluation thread.
///
/// The `full_*` fields hold the 3-D point contact, `jc`, `a0` and `da0_dx` the rows exposed
/// by the contact (all three for a 3-D contact, the masked one for a 1-D contact). The force
/// fields are always 3-D and are written only by `update_force` and `update_force_diff`.
#[derive(Debug, Clone)]
pub struct ContactData {
    pub full_jc: Matrix3xX<f64>,
    pub full_a0: Vector3<f64>,
    pub full_da0_dx: Matrix3xX<f64>,
    pub jc: DMatrix<f64>,
    pub a0: DVector<f64>,
    pub da0_dx: DMatrix<f64>,
    pub f: Vector3<f64>,
    pub df_dx: Matrix3xX<f64>,
    pub df_du: Matrix3xX<f64>,
    /// Contact force as a spatial force on the parent joint, in the joint frame.
    pub fext: Force,
    /// Frame placement seen by the last `calc`.
    pub placement: Isometry3<f64>,
    pub force_stage: ForceStage,
    guard: StageGuard,
}

impl ContactData {
    pub fn new(nc: usize, nv: usize, nu: usize) -> Self {
        ContactData {
            full_jc: Matrix3xX::zeros(nv),
            full_a0: Vector3::zeros(),
            full_da0_dx: Matrix3xX::zeros(2 * nv),
            jc: DMatrix::zeros(nc, nv),
            a0: DVector::zeros(nc),
            da0_dx: DMatrix::zeros(nc, 2 * nv),
            f: Vector3::zeros(),
            df_dx: Matrix3xX::zeros(2 * nv),
            df_du: Matrix3xX::zeros(nu),
            fext: Force::zero(),
            placement: Isometry3::identity(),
            force_stage: ForceStage::Unset,
            guard: StageGuard::default(),
        }
    }

    pub fn stage(&self) -> EvaluationStage {
        self.guard.stage()
    }

    pub fn nc(&self) -> usize {
        self.a0.len()
    }

    pub(crate) fn guard_mut(&mut self) -> &mut StageGuard {
        &mut self.guard
    }

    pub(crate) fn guard(&self) -> &StageGuard {
        &self.guard
    }

    /// Fails with `DimensionMismatch` unless the buffers were allocated for a contact of
    /// these sizes.
    pub(crate) fn check_shape(&self, nc: usize, nv: usize, nu: usize) -> Result<(), ResidualError> {
        check_vector_len("a0", self.a0.len(), nc)?;
        check_matrix_shape("jc", self.jc.shape(), (nc, nv))?;
        check_matrix_shape("da0_dx", self.da0_dx.shape(), (nc, 2 * nv))?;
        check_matrix_shape("full_jc", self.full_jc.shape(), (3, nv))?;
        check_matrix_shape("full_da0_dx", self.full_da0_dx.shape(), (3, 2 * nv))?;
        check_matrix_shape("df_dx", self.df_dx.shape(), (3, 2 * nv))?;
        check_matrix_shape("df_du", self.df_du.shape(), (3, nu))
    }

    /// Copies the selected rows of the full kinematics into the exposed fields.
    pub(crate) fn select_kinematics(&mut self, rows: &[usize]) {
        for (i, &row) in rows.iter().enumerate() {
            self.jc.row_mut(i).copy_from(&self.full_jc.row(row));
            self.a0[i] = self.full_a0[row];
        }
    }

    /// Copies the selected rows of the drift derivative, re-selecting `jc` and `a0` as well
    /// so that every exposed field follows the same rows.
    pub(crate) fn select_derivatives(&mut self, rows: &[usize]) {
        self.select_kinematics(rows);
        for (i, &row) in rows.iter().enumerate() {
            self.da0_dx.row_mut(i).copy_from(&self.full_da0_dx.row(row));
        }
    }
}

pub trait Contact: Send + Sync {
    fn state(&self) -> &StateMultibody;

    /// Number of constrained directions.
    fn nc(&self) -> usize;

    fn nu(&self) -> usize;

    fn frame_id(&self) -> FrameIndex;

    fn create_data(&self) -> ContactData {
        ContactData::new(self.nc(), self.state().nv(), self.nu())
    }

    /// Fails unless `data` has the sizes of data created by this contact.
    fn check_data(&self, data: &ContactData) -> Result<(), ResidualError> {
        data.check_shape(self.nc(), self.state().nv(), self.nu())
    }

    /// Contact Jacobian and acceleration drift. The kinematics must be updated for `x` at
    /// zero joint acceleration, otherwise `a0` also carries `Jc a`.
    fn calc(&self, data: &mut ContactData, kinematics: &dyn KinematicsProvider, x: &DVector<f64>)
            -> Result<(), ResidualError>;

    /// Derivative of the acceleration drift. Requires `calc` for the same `x`.
    fn calc_diff(&self, data: &mut ContactData, kinematics: &dyn KinematicsProvider, x: &DVector<f64>)
                 -> Result<(), ResidualError>;

    /// Stores the contact force, given in the constrained directions. A world-aligned force is
    /// rotated into the frame with the placement of the last `calc` on this data, so `calc`
    /// must have run for the current state; a local force needs no kinematics.
    fn update_force(&self, data: &mut ContactData, force: &DVector<f64>) -> Result<(), ResidualError>;

    /// Stores the force derivatives, given as `nc x ndx` and `nc x nu`.
    fn update_force_diff(&self, data: &mut ContactData, df_dx: &DMatrix<f64>, df_du: &DMatrix<f64>)
                         -> Result<(), ResidualError>;
}

/// Closed set of contact kinds.
#[derive(Debug, Clone)]
pub enum ContactModel {
    Contact1d(Contact1d),
    Contact3d(Contact3d),
}

impl From<Contact1d> for ContactModel {
    fn from(contact: Contact1d) -> Self {
        ContactModel::Contact1d(contact)
    }
}

impl From<Contact3d> for ContactModel {
    fn from(contact: Contact3d) -> Self {
        ContactModel::Contact3d(contact)
    }
}

impl ContactModel {
    fn inner(&self) -> &dyn Contact {
        match self {
            ContactModel::Contact1d(contact) => contact,
            ContactModel::Contact3d(contact) => contact,
        }
    }
}

impl Contact for ContactModel {
    fn state(&self) -> &StateMultibody {
        self.inner().state()
    }

    fn nc(&self) -> usize {
        self.inner().nc()
    }

    fn nu(&self) -> usize {
        self.inner().nu()
    }

    fn frame_id(&self) -> FrameIndex {
        self.inner().frame_id()
    }

    fn calc(&self, data: &mut ContactData, kinematics: &dyn KinematicsProvider, x: &DVector<f64>)
            -> Result<(), ResidualError> {
        self.inner().calc(data, kinematics, x)
    }

    fn calc_diff(&self, data: &mut ContactData, kinematics: &dyn KinematicsProvider, x: &DVector<f64>)
                 -> Result<(), ResidualError> {
        self.inner().calc_diff(data, kinematics, x)
    }

    fn update_force(&self, data: &mut ContactData, force: &DVector<f64>) -> Result<(), ResidualError> {
        self.inner().update_force(data, force)
    }

    fn update_force_diff(&self, data: &mut ContactData, df_dx: &DMatrix<f64>, df_du: &DMatrix<f64>)
                         -> Result<(), ResidualError> {
        self.inner().update_force_diff(data, df_dx, df_du)
    }
}
