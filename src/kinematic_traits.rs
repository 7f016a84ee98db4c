extern crate nalgebra as na;

use na::{Isometry3, Matrix3xX, Matrix6xX, Point3, Vector3, Vector6};

/// Index of the joint in the multibody model. Joint 0 is the universe (world), it never moves.
pub type JointIndex = usize;

/// Index of the operational frame in the multibody model.
pub type FrameIndex = usize;

/// Index of the collision pair in the geometry model.
pub type PairIndex = usize;

/// Index of the geometry object in the geometry model.
pub type GeometryIndex = usize;

/// The universe joint, parent of everything that does not move with the robot.
pub const UNIVERSE: JointIndex = 0;

/// The frame in which velocities, accelerations and Jacobians are expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceFrame {
    /// Frame axes, frame origin.
    Local,
    /// World axes, frame origin.
    LocalWorldAligned,
}

/// Spatial velocity: linear part first, angular part second.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Motion {
    pub linear: Vector3<f64>,
    pub angular: Vector3<f64>,
}

impl Motion {
    pub fn new(linear: Vector3<f64>, angular: Vector3<f64>) -> Self {
        Self { linear, angular }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn to_vector(&self) -> Vector6<f64> {
        Vector6::new(
            self.linear.x, self.linear.y, self.linear.z,
            self.angular.x, self.angular.y, self.angular.z,
        )
    }
}

/// Spatial force: linear force first, torque second.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Force {
    pub linear: Vector3<f64>,
    pub angular: Vector3<f64>,
}

impl Force {
    pub fn zero() -> Self {
        Self::default()
    }

    /// Expresses the force, given in frame `b`, in frame `a` where `a_m_b` is the placement
    /// of `b` relative to `a`.
    pub fn act(a_m_b: &Isometry3<f64>, force: &Force) -> Force {
        let linear = a_m_b.rotation * force.linear;
        let angular = a_m_b.rotation * force.angular + a_m_b.translation.vector.cross(&linear);
        Force { linear, angular }
    }

    pub fn to_vector(&self) -> Vector6<f64> {
        Vector6::new(
            self.linear.x, self.linear.y, self.linear.z,
            self.angular.x, self.angular.y, self.angular.z,
        )
    }

    pub fn is_zero(&self) -> bool {
        self.linear.iter().chain(self.angular.iter()).all(|&c| c == 0.0)
    }
}

/// Kinematic quantities of the robot, already updated for the current state. Residuals only
/// read from the provider and never trigger kinematic recomputation themselves.
///
/// All Jacobians are taken with respect to the generalized velocity (columns `0..nv`) and all
/// derivatives with respect to the configuration have the same column layout.
/// Matrices with 6 rows carry the linear part in rows `0..3` and the angular part in rows `3..6`.
pub trait KinematicsProvider: Send + Sync {
    /// Dimension of the generalized velocity.
    fn nv(&self) -> usize;

    /// Placement of the joint frame in the world.
    fn joint_placement(&self, joint: JointIndex) -> &Isometry3<f64>;

    /// Velocity of the joint frame, world axes at the joint origin.
    fn joint_spatial_velocity(&self, joint: JointIndex) -> Motion;

    /// Placement of the operational frame in the world.
    fn frame_placement(&self, frame: FrameIndex) -> &Isometry3<f64>;

    /// Velocity of the frame origin expressed in the given reference frame.
    fn frame_velocity(&self, frame: FrameIndex, reference: ReferenceFrame) -> Motion;

    /// Maps generalized velocity into `frame_velocity`.
    fn frame_jacobian(&self, frame: FrameIndex, reference: ReferenceFrame) -> Matrix6xX<f64>;

    /// Partial derivatives of `frame_velocity` with respect to `q` and `v`.
    fn frame_velocity_derivatives(&self, frame: FrameIndex, reference: ReferenceFrame)
                                  -> (Matrix6xX<f64>, Matrix6xX<f64>);

    /// Second time derivative of the frame origin, expressed in the given reference frame.
    fn frame_classical_acceleration(&self, frame: FrameIndex, reference: ReferenceFrame) -> Vector3<f64>;

    /// Partial derivatives of `frame_classical_acceleration` with respect to `q` and `v`.
    fn frame_classical_acceleration_derivatives(&self, frame: FrameIndex, reference: ReferenceFrame)
                                                -> (Matrix3xX<f64>, Matrix3xX<f64>);

    /// Derivative with respect to `q` of a constant world vector once expressed in the given
    /// reference frame. Zero for world-aligned frames.
    fn frame_vector_derivative(&self, frame: FrameIndex, reference: ReferenceFrame, vector: &Vector3<f64>)
                               -> Matrix3xX<f64>;

    /// Position Jacobian (world axes) of a point rigidly attached to the joint. The point
    /// is given in world coordinates at the current configuration.
    fn point_jacobian(&self, joint: JointIndex, point: &Point3<f64>) -> Matrix3xX<f64>;
}
