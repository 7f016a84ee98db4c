//! Differentiable residuals for trajectory optimization of articulated robots
//!
//! This crate computes, for a multibody robot built from revolute joints, residuals that an
//! optimal control solver evaluates at every time step of every candidate trajectory, together
//! with their exact first order derivatives with respect to the tangent state `(q, v)`:
//!
//! - a velocity-aware collision avoidance residual between a geometry carried by the robot and
//!   an obstacle, projecting the frame velocity on the separation between the witness points;
//! - 3-D point contacts and 1-D contacts masked to one Cartesian axis, with the acceleration
//!   drift `a0`, the contact Jacobian `Jc` and the bookkeeping of contact forces;
//! - a "fly high" residual that discourages horizontal motion of a frame close to the ground.
//!
//! # Models and data
//!
//! Models are immutable and can be shared between threads (wrap them in `Arc`). Every rollout
//! creates its own data through the model and passes it back on each call: `calc` first, then
//! `calc_diff` for the same state. The kinematics are computed once per step by
//! `MultibodyData::forward_kinematics` and handed to residuals inside a `DataCollector`.
//!
//! Contract violations (wrong shared data, wrong sizes, `calc_diff` before `calc`) are reported
//! as `ResidualError`. Numerical edge cases such as coincident witness points produce zero
//! residuals and derivatives, never NaN.
//!
//! # Features
//!
//! - `collisions` (default): geometry primitives backed by `parry3d-f64` and the collision
//!   velocity residual.
//!
//! All analytic derivatives are validated against central finite differences (`numdiff`).

pub mod residual_error;
pub mod kinematic_traits;
pub mod multibody;
pub mod kinematics_impl;
pub mod multibody_robots;
pub mod state;
pub mod data_collector;

pub mod residual_traits;
pub mod residual_fly_high;

#[cfg(feature = "collisions")]
pub mod geometry;
#[cfg(feature = "collisions")]
pub mod residual_vel_collision;

pub mod contact_traits;
pub mod contact_3d;
pub mod contact_1d;

pub mod numdiff;

#[cfg(test)]
mod tests;
