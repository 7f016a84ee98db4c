//! Traits and closed variant sets for residual and contact models
//!
//! A model is immutable and may be shared between threads. Every evaluation thread creates
//! its own data through the model and passes it back on each call.

extern crate nalgebra as na;

use na::{DMatrix, DVector};
use crate::data_collector::DataCollector;
use crate::residual_error::{check_matrix_shape, check_vector_len, ResidualError};
use crate::residual_fly_high::{FlyHighData, FlyHighResidual};
use crate::state::StateMultibody;

#[cfg(feature = "collisions")]
use crate::residual_vel_collision::{VelocityCollisionData, VelocityCollisionResidual};

/// Progress of the kinematic path of one data instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvaluationStage {
    #[default]
    Uninitialized,
    KinematicsValid,
    DerivativesValid,
}

/// Progress of the force path, independent of `EvaluationStage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForceStage {
    #[default]
    Unset,
    ForceValid,
    ForceDerivativesValid,
}

/// Tracks which state `calc` last evaluated so that `calc_diff` can refuse stale data.
#[derive(Debug, Clone, Default)]
pub struct StageGuard {
    stage: EvaluationStage,
    evaluated_state: Option<DVector<f64>>,
}

impl StageGuard {
    pub fn stage(&self) -> EvaluationStage {
        self.stage
    }

    pub(crate) fn calc_done(&mut self, x: &DVector<f64>) {
        self.stage = EvaluationStage::KinematicsValid;
        self.evaluated_state = Some(x.clone());
    }

    /// Fails unless `calc` has run for exactly this state.
    pub(crate) fn check_diff(&self, x: &DVector<f64>) -> Result<(), ResidualError> {
        match &self.evaluated_state {
            None => {
                tracing::warn!("calc_diff called before calc");
                Err(ResidualError::CalcDiffBeforeCalc)
            }
            Some(state) if state != x => {
                tracing::warn!("calc_diff called for a state that differs from the last calc");
                Err(ResidualError::StaleState)
            }
            Some(_) => Ok(()),
        }
    }

    pub(crate) fn diff_done(&mut self) {
        self.stage = EvaluationStage::DerivativesValid;
    }
}

/// Value and first order sensitivities of a residual.
#[derive(Debug, Clone)]
pub struct ResidualOutputs {
    /// Residual value, `nr`.
    pub r: DVector<f64>,
    /// Derivative with respect to the tangent state, `nr x ndx`.
    pub rx: DMatrix<f64>,
    /// Derivative with respect to the control, `nr x nu`.
    pub ru: DMatrix<f64>,
    pub guard: StageGuard,
}

impl ResidualOutputs {
    pub fn new(nr: usize, ndx: usize, nu: usize) -> Self {
        ResidualOutputs {
            r: DVector::zeros(nr),
            rx: DMatrix::zeros(nr, ndx),
            ru: DMatrix::zeros(nr, nu),
            guard: StageGuard::default(),
        }
    }

    pub fn stage(&self) -> EvaluationStage {
        self.guard.stage()
    }

    /// Fails with `DimensionMismatch` unless the buffers have these sizes.
    pub(crate) fn check_shape(&self, nr: usize, ndx: usize, nu: usize) -> Result<(), ResidualError> {
        check_vector_len("r", self.r.len(), nr)?;
        check_matrix_shape("rx", self.rx.shape(), (nr, ndx))?;
        check_matrix_shape("ru", self.ru.shape(), (nr, nu))
    }
}

pub trait Residual: Send + Sync {
    type Data: AsRef<ResidualOutputs> + Send;

    fn state(&self) -> &StateMultibody;

    /// Dimension of the residual vector.
    fn nr(&self) -> usize;

    /// Dimension of the control vector.
    fn nu(&self) -> usize;

    /// Creates the per-thread data. Fails if the shared data is not of the kind the
    /// model needs.
    fn create_data(&self, shared: &DataCollector) -> Result<Self::Data, ResidualError>;

    /// Evaluates the residual. The kinematics in `shared` must already be updated for `x`.
    fn calc(&self, data: &mut Self::Data, shared: &DataCollector, x: &DVector<f64>, u: &DVector<f64>)
            -> Result<(), ResidualError>;

    /// Evaluates the derivatives. Requires `calc` for the same `x` on the same data.
    fn calc_diff(&self, data: &mut Self::Data, shared: &DataCollector, x: &DVector<f64>, u: &DVector<f64>)
                 -> Result<(), ResidualError>;

    /// Common argument checks for `calc` and `calc_diff`.
    fn check_arguments(&self, x: &DVector<f64>, u: &DVector<f64>) -> Result<(), ResidualError> {
        check_vector_len("x", x.len(), self.state().nx())?;
        check_vector_len("u", u.len(), self.nu())
    }

    /// Fails unless `data` has the sizes of data created by this model.
    fn check_data(&self, data: &Self::Data) -> Result<(), ResidualError> {
        data.as_ref().check_shape(self.nr(), self.state().ndx(), self.nu())
    }
}

/// Closed set of residual kinds.
#[derive(Debug, Clone)]
pub enum ResidualModel {
    #[cfg(feature = "collisions")]
    VelocityCollision(VelocityCollisionResidual),
    FlyHigh(FlyHighResidual),
}

#[derive(Debug, Clone)]
pub enum ResidualData {
    #[cfg(feature = "collisions")]
    VelocityCollision(VelocityCollisionData),
    FlyHigh(FlyHighData),
}

impl ResidualModel {
    pub fn kind(&self) -> &'static str {
        match self {
            #[cfg(feature = "collisions")]
            ResidualModel::VelocityCollision(_) => "velocity collision",
            ResidualModel::FlyHigh(_) => "fly high",
        }
    }
}

impl ResidualData {
    pub fn kind(&self) -> &'static str {
        match self {
            #[cfg(feature = "collisions")]
            ResidualData::VelocityCollision(_) => "velocity collision",
            ResidualData::FlyHigh(_) => "fly high",
        }
    }
}

impl AsRef<ResidualOutputs> for ResidualData {
    fn as_ref(&self) -> &ResidualOutputs {
        match self {
            #[cfg(feature = "collisions")]
            ResidualData::VelocityCollision(data) => data.as_ref(),
            ResidualData::FlyHigh(data) => data.as_ref(),
        }
    }
}

#[cfg(feature = "collisions")]
impl From<VelocityCollisionResidual> for ResidualModel {
    fn from(model: VelocityCollisionResidual) -> Self {
        ResidualModel::VelocityCollision(model)
    }
}

impl From<FlyHighResidual> for ResidualModel {
    fn from(model: FlyHighResidual) -> Self {
        ResidualModel::FlyHigh(model)
    }
}

impl ResidualModel {
    fn mismatch(&self, data: &ResidualData) -> ResidualError {
        tracing::warn!("{} data passed to a {} residual", data.kind(), self.kind());
        ResidualError::InvalidDataKind { expected: self.kind(), found: data.kind() }
    }
}

impl Residual for ResidualModel {
    type Data = ResidualData;

    fn state(&self) -> &StateMultibody {
        match self {
            #[cfg(feature = "collisions")]
            ResidualModel::VelocityCollision(model) => model.state(),
            ResidualModel::FlyHigh(model) => model.state(),
        }
    }

    fn nr(&self) -> usize {
        match self {
            #[cfg(feature = "collisions")]
            ResidualModel::VelocityCollision(model) => model.nr(),
            ResidualModel::FlyHigh(model) => model.nr(),
        }
    }

    fn nu(&self) -> usize {
        match self {
            #[cfg(feature = "collisions")]
            ResidualModel::VelocityCollision(model) => model.nu(),
            ResidualModel::FlyHigh(model) => model.nu(),
        }
    }

    fn create_data(&self, shared: &DataCollector) -> Result<ResidualData, ResidualError> {
        Ok(match self {
            #[cfg(feature = "collisions")]
            ResidualModel::VelocityCollision(model) => ResidualData::VelocityCollision(model.create_data(shared)?),
            ResidualModel::FlyHigh(model) => ResidualData::FlyHigh(model.create_data(shared)?),
        })
    }

    fn calc(&self, data: &mut ResidualData, shared: &DataCollector, x: &DVector<f64>, u: &DVector<f64>)
            -> Result<(), ResidualError> {
        match (self, data) {
            #[cfg(feature = "collisions")]
            (ResidualModel::VelocityCollision(model), ResidualData::VelocityCollision(data)) =>
                model.calc(data, shared, x, u),
            (ResidualModel::FlyHigh(model), ResidualData::FlyHigh(data)) => model.calc(data, shared, x, u),
            #[allow(unreachable_patterns)]
            (model, data) => Err(model.mismatch(data)),
        }
    }

    fn calc_diff(&self, data: &mut ResidualData, shared: &DataCollector, x: &DVector<f64>, u: &DVector<f64>)
                 -> Result<(), ResidualError> {
        match (self, data) {
            #[cfg(feature = "collisions")]
            (ResidualModel::VelocityCollision(model), ResidualData::VelocityCollision(data)) =>
                model.calc_diff(data, shared, x, u),
            (ResidualModel::FlyHigh(model), ResidualData::FlyHigh(data)) => model.calc_diff(data, shared, x, u),
            #[allow(unreachable_patterns)]
            (model, data) => Err(model.mismatch(data)),
        }
    }
}
