//! Forward kinematics of the revolute-joint tree and its analytic derivatives.
//!
//! All derivatives follow from one rule: moving joint `k` rotates everything it supports about
//! the world axis `z_k` through the joint origin `o_k`. For a point `p` carried by the chain and
//! supporting joints sorted as `c1 <= c2 <= ... <= cn`, the mixed partial derivative of `p`
//! with respect to `q_c1 .. q_cn` is `z_c1 x (z_c2 x ( ... (z_cn x (p - o_cn))))`.

extern crate nalgebra as na;

use std::sync::Arc;
use na::{DVector, Isometry3, Matrix3, Matrix3xX, Matrix6xX, Point3, Vector3};
use crate::kinematic_traits::{FrameIndex, JointIndex, KinematicsProvider, Motion, ReferenceFrame, UNIVERSE};
use crate::multibody::MultibodyModel;
use crate::residual_error::{check_vector_len, ResidualError};

/// Kinematic data for one evaluation thread. Created from the shared model and updated
/// once per time step by `forward_kinematics`.
#[derive(Debug, Clone)]
pub struct MultibodyData {
    model: Arc<MultibodyModel>,
    /// Joint placements in the world.
    pub omi: Vec<Isometry3<f64>>,
    /// Frame placements in the world.
    pub omf: Vec<Isometry3<f64>>,
    /// Joint axes in world coordinates.
    axes: Vec<Vector3<f64>>,
    pub q: DVector<f64>,
    pub v: DVector<f64>,
    pub a: DVector<f64>,
}

impl MultibodyData {
    pub fn new(model: &Arc<MultibodyModel>) -> Self {
        let nv = model.nv();
        MultibodyData {
            model: model.clone(),
            omi: vec![Isometry3::identity(); model.njoints()],
            omf: vec![Isometry3::identity(); model.nframes()],
            axes: vec![Vector3::zeros(); model.njoints()],
            q: DVector::zeros(nv),
            v: DVector::zeros(nv),
            a: DVector::zeros(nv),
        }
    }

    pub fn model(&self) -> &Arc<MultibodyModel> {
        &self.model
    }

    /// Updates placements, axes and stores the state so that all provider queries
    /// refer to `(q, v, a)`.
    pub fn forward_kinematics(&mut self, q: &DVector<f64>, v: &DVector<f64>, a: &DVector<f64>)
                              -> Result<(), ResidualError> {
        let nv = self.model.nv();
        check_vector_len("q", q.len(), nv)?;
        check_vector_len("v", v.len(), nv)?;
        check_vector_len("a", a.len(), nv)?;

        let model = self.model.clone();
        for (index, joint) in model.joints().iter().enumerate().skip(1) {
            let angle = q[MultibodyModel::idx_v(index)];
            let placement = self.omi[joint.parent] * joint.placement * joint.motion(angle);
            self.axes[index] = placement.rotation * joint.axis.into_inner();
            self.omi[index] = placement;
        }
        for (index, frame) in model.frames().iter().enumerate() {
            self.omf[index] = self.omi[frame.parent] * frame.placement;
        }
        self.q.copy_from(q);
        self.v.copy_from(v);
        self.a.copy_from(a);
        Ok(())
    }

    /// Convenience for the state layout `x = [q; v]` with zero joint acceleration.
    pub fn update_state(&mut self, x: &DVector<f64>) -> Result<(), ResidualError> {
        let nv = self.model.nv();
        check_vector_len("x", x.len(), 2 * nv)?;
        let q = x.rows(0, nv).into_owned();
        let v = x.rows(nv, nv).into_owned();
        self.forward_kinematics(&q, &v, &DVector::zeros(nv))
    }

    fn origin(&self, joint: JointIndex) -> Vector3<f64> {
        self.omi[joint].translation.vector
    }

    /// Nested cross product for the supporting joints in ascending order.
    fn nested(&self, point: &Vector3<f64>, sorted: &[JointIndex]) -> Vector3<f64> {
        let (&last, rest) = match sorted.split_last() {
            Some(split) => split,
            None => return *point,
        };
        let mut result = self.axes[last].cross(&(point - self.origin(last)));
        for &joint in rest.iter().rev() {
            result = self.axes[joint].cross(&result);
        }
        result
    }

    fn d1(&self, point: &Vector3<f64>, i: JointIndex) -> Vector3<f64> {
        self.nested(point, &[i])
    }

    fn d2(&self, point: &Vector3<f64>, i: JointIndex, k: JointIndex) -> Vector3<f64> {
        self.nested(point, &[i.min(k), i.max(k)])
    }

    fn d3(&self, point: &Vector3<f64>, i: JointIndex, k: JointIndex, m: JointIndex) -> Vector3<f64> {
        let mut sorted = [i, k, m];
        sorted.sort_unstable();
        self.nested(point, &sorted)
    }

    fn frame_point(&self, frame: FrameIndex) -> Vector3<f64> {
        self.omf[frame].translation.vector
    }

    fn frame_support(&self, frame: FrameIndex) -> &[JointIndex] {
        self.model.support(self.model.frames()[frame].parent)
    }

    fn world_rotation_transposed(&self, frame: FrameIndex) -> Matrix3<f64> {
        self.omf[frame].rotation.to_rotation_matrix().into_inner().transpose()
    }

    fn world_frame_velocity(&self, frame: FrameIndex) -> Motion {
        let point = self.frame_point(frame);
        let mut motion = Motion::zero();
        for &i in self.frame_support(frame) {
            let vi = self.v[MultibodyModel::idx_v(i)];
            motion.linear += self.d1(&point, i) * vi;
            motion.angular += self.axes[i] * vi;
        }
        motion
    }

    fn world_frame_jacobian(&self, frame: FrameIndex) -> Matrix6xX<f64> {
        let point = self.frame_point(frame);
        let mut jacobian = Matrix6xX::zeros(self.model.nv());
        for &i in self.frame_support(frame) {
            let col = MultibodyModel::idx_v(i);
            jacobian.fixed_view_mut::<3, 1>(0, col).copy_from(&self.d1(&point, i));
            jacobian.fixed_view_mut::<3, 1>(3, col).copy_from(&self.axes[i]);
        }
        jacobian
    }

    fn world_frame_velocity_dq(&self, frame: FrameIndex) -> Matrix6xX<f64> {
        let point = self.frame_point(frame);
        let support = self.frame_support(frame);
        let mut dq = Matrix6xX::zeros(self.model.nv());
        for &m in support {
            let mut linear = Vector3::zeros();
            let mut outer = Vector3::zeros();
            for &i in support {
                let vi = self.v[MultibodyModel::idx_v(i)];
                linear += self.d2(&point, i, m) * vi;
                if i > m {
                    outer += self.axes[i] * vi;
                }
            }
            let col = MultibodyModel::idx_v(m);
            dq.fixed_view_mut::<3, 1>(0, col).copy_from(&linear);
            dq.fixed_view_mut::<3, 1>(3, col).copy_from(&self.axes[m].cross(&outer));
        }
        dq
    }

    fn world_classical_acceleration(&self, frame: FrameIndex) -> Vector3<f64> {
        let point = self.frame_point(frame);
        let support = self.frame_support(frame);
        let mut acc = Vector3::zeros();
        for &i in support {
            let ii = MultibodyModel::idx_v(i);
            acc += self.d1(&point, i) * self.a[ii];
            for &k in support {
                acc += self.d2(&point, i, k) * (self.v[ii] * self.v[MultibodyModel::idx_v(k)]);
            }
        }
        acc
    }

    fn world_classical_acceleration_derivatives(&self, frame: FrameIndex) -> (Matrix3xX<f64>, Matrix3xX<f64>) {
        let point = self.frame_point(frame);
        let support = self.frame_support(frame);
        let nv = self.model.nv();
        let mut dq = Matrix3xX::zeros(nv);
        let mut dv = Matrix3xX::zeros(nv);
        for &m in support {
            let mut d_q = Vector3::zeros();
            let mut d_v = Vector3::zeros();
            for &i in support {
                let vi = self.v[MultibodyModel::idx_v(i)];
                let second = self.d2(&point, i, m);
                d_q += second * self.a[MultibodyModel::idx_v(i)];
                d_v += second * (2.0 * vi);
                for &k in support {
                    d_q += self.d3(&point, i, k, m) * (vi * self.v[MultibodyModel::idx_v(k)]);
                }
            }
            let col = MultibodyModel::idx_v(m);
            dq.set_column(col, &d_q);
            dv.set_column(col, &d_v);
        }
        (dq, dv)
    }
}

impl KinematicsProvider for MultibodyData {
    fn nv(&self) -> usize {
        self.model.nv()
    }

    fn joint_placement(&self, joint: JointIndex) -> &Isometry3<f64> {
        &self.omi[joint]
    }

    fn joint_spatial_velocity(&self, joint: JointIndex) -> Motion {
        let origin = self.origin(joint);
        let mut motion = Motion::zero();
        for &i in self.model.support(joint) {
            let vi = self.v[MultibodyModel::idx_v(i)];
            motion.linear += self.d1(&origin, i) * vi;
            motion.angular += self.axes[i] * vi;
        }
        motion
    }

    fn frame_placement(&self, frame: FrameIndex) -> &Isometry3<f64> {
        &self.omf[frame]
    }

    fn frame_velocity(&self, frame: FrameIndex, reference: ReferenceFrame) -> Motion {
        let world = self.world_frame_velocity(frame);
        match reference {
            ReferenceFrame::LocalWorldAligned => world,
            ReferenceFrame::Local => {
                let rt = self.world_rotation_transposed(frame);
                Motion::new(rt * world.linear, rt * world.angular)
            }
        }
    }

    fn frame_jacobian(&self, frame: FrameIndex, reference: ReferenceFrame) -> Matrix6xX<f64> {
        let world = self.world_frame_jacobian(frame);
        match reference {
            ReferenceFrame::LocalWorldAligned => world,
            ReferenceFrame::Local => rotate_rows(&self.world_rotation_transposed(frame), &world),
        }
    }

    fn frame_velocity_derivatives(&self, frame: FrameIndex, reference: ReferenceFrame)
                                  -> (Matrix6xX<f64>, Matrix6xX<f64>) {
        let dq = self.world_frame_velocity_dq(frame);
        let dv = self.world_frame_jacobian(frame);
        match reference {
            ReferenceFrame::LocalWorldAligned => (dq, dv),
            ReferenceFrame::Local => {
                let rt = self.world_rotation_transposed(frame);
                let world = self.world_frame_velocity(frame);
                let mut local_dq = rotate_rows(&rt, &dq);
                let linear = self.frame_vector_derivative(frame, reference, &world.linear);
                let angular = self.frame_vector_derivative(frame, reference, &world.angular);
                {
                    let mut rows = local_dq.fixed_rows_mut::<3>(0);
                    rows += &linear;
                }
                {
                    let mut rows = local_dq.fixed_rows_mut::<3>(3);
                    rows += &angular;
                }
                (local_dq, rotate_rows(&rt, &dv))
            }
        }
    }

    fn frame_classical_acceleration(&self, frame: FrameIndex, reference: ReferenceFrame) -> Vector3<f64> {
        let world = self.world_classical_acceleration(frame);
        match reference {
            ReferenceFrame::LocalWorldAligned => world,
            ReferenceFrame::Local => self.world_rotation_transposed(frame) * world,
        }
    }

    fn frame_classical_acceleration_derivatives(&self, frame: FrameIndex, reference: ReferenceFrame)
                                                -> (Matrix3xX<f64>, Matrix3xX<f64>) {
        let (dq, dv) = self.world_classical_acceleration_derivatives(frame);
        match reference {
            ReferenceFrame::LocalWorldAligned => (dq, dv),
            ReferenceFrame::Local => {
                let rt = self.world_rotation_transposed(frame);
                let acc = self.world_classical_acceleration(frame);
                let local_dq = rt * dq + self.frame_vector_derivative(frame, reference, &acc);
                (local_dq, rt * dv)
            }
        }
    }

    fn frame_vector_derivative(&self, frame: FrameIndex, reference: ReferenceFrame, vector: &Vector3<f64>)
                               -> Matrix3xX<f64> {
        let mut derivative = Matrix3xX::zeros(self.model.nv());
        if reference == ReferenceFrame::Local {
            let rt = self.world_rotation_transposed(frame);
            for &k in self.frame_support(frame) {
                derivative.set_column(MultibodyModel::idx_v(k), &(-(rt * self.axes[k].cross(vector))));
            }
        }
        derivative
    }

    fn point_jacobian(&self, joint: JointIndex, point: &Point3<f64>) -> Matrix3xX<f64> {
        let mut jacobian = Matrix3xX::zeros(self.model.nv());
        if joint == UNIVERSE {
            return jacobian;
        }
        for &i in self.model.support(joint) {
            jacobian.set_column(MultibodyModel::idx_v(i), &self.d1(&point.coords, i));
        }
        jacobian
    }
}

/// Rotates linear and angular row blocks of a 6-row matrix.
fn rotate_rows(rotation: &Matrix3<f64>, matrix: &Matrix6xX<f64>) -> Matrix6xX<f64> {
    let mut rotated = Matrix6xX::zeros(matrix.ncols());
    rotated.fixed_rows_mut::<3>(0).copy_from(&(rotation * matrix.fixed_rows::<3>(0)));
    rotated.fixed_rows_mut::<3>(3).copy_from(&(rotation * matrix.fixed_rows::<3>(3)));
    rotated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multibody_robots::planar_two_link_arm;

    const SMALL: f64 = 1e-9;

    #[test]
    fn test_planar_arm_tip_matches_closed_form() {
        let (model, tip) = planar_two_link_arm(1.0, 0.5);
        let model = Arc::new(model);
        let mut data = MultibodyData::new(&model);
        let q = DVector::from_vec(vec![0.3, -0.7]);
        let v = DVector::from_vec(vec![0.4, 1.1]);
        data.forward_kinematics(&q, &v, &DVector::zeros(2)).unwrap();

        let (t1, t12) = (q[0], q[0] + q[1]);
        let expected = Vector3::new(
            t1.cos() + 0.5 * t12.cos(),
            t1.sin() + 0.5 * t12.sin(),
            0.0,
        );
        assert!((data.omf[tip].translation.vector - expected).norm() < SMALL);

        let (w1, w12) = (v[0], v[0] + v[1]);
        let velocity = Vector3::new(
            -t1.sin() * w1 - 0.5 * t12.sin() * w12,
            t1.cos() * w1 + 0.5 * t12.cos() * w12,
            0.0,
        );
        let motion = data.frame_velocity(tip, ReferenceFrame::LocalWorldAligned);
        assert!((motion.linear - velocity).norm() < SMALL);
        assert!((motion.angular - Vector3::new(0.0, 0.0, w12)).norm() < SMALL);

        // Centripetal acceleration only, as joint accelerations are zero.
        let acceleration = Vector3::new(
            -t1.cos() * w1 * w1 - 0.5 * t12.cos() * w12 * w12,
            -t1.sin() * w1 * w1 - 0.5 * t12.sin() * w12 * w12,
            0.0,
        );
        let acc = data.frame_classical_acceleration(tip, ReferenceFrame::LocalWorldAligned);
        assert!((acc - acceleration).norm() < SMALL);
    }

    #[test]
    fn test_local_and_world_aligned_agree_in_norm() {
        let (model, tip) = planar_two_link_arm(0.8, 0.6);
        let model = Arc::new(model);
        let mut data = MultibodyData::new(&model);
        let x = DVector::from_vec(vec![1.2, 0.4, -0.3, 0.9]);
        data.update_state(&x).unwrap();

        let world = data.frame_velocity(tip, ReferenceFrame::LocalWorldAligned);
        let local = data.frame_velocity(tip, ReferenceFrame::Local);
        assert!((world.linear.norm() - local.linear.norm()).abs() < SMALL);
        let rotated = data.omf[tip].rotation * local.linear;
        assert!((rotated - world.linear).norm() < SMALL);

        let jacobian = data.frame_jacobian(tip, ReferenceFrame::Local);
        let v = x.rows(2, 2).into_owned();
        assert!((jacobian.fixed_rows::<3>(0) * &v - local.linear).norm() < SMALL);
    }

    #[test]
    fn test_point_jacobian_of_universe_is_zero() {
        let (model, _) = planar_two_link_arm(1.0, 1.0);
        let data = MultibodyData::new(&Arc::new(model));
        let jacobian = data.point_jacobian(UNIVERSE, &Point3::new(1.0, 2.0, 3.0));
        assert!(jacobian.iter().all(|&c| c == 0.0));
    }

    #[test]
    fn test_wrong_state_size_rejected() {
        let (model, _) = planar_two_link_arm(1.0, 1.0);
        let mut data = MultibodyData::new(&Arc::new(model));
        assert!(data.update_state(&DVector::zeros(3)).is_err());
    }
}
