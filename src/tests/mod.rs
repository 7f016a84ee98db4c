#[cfg(feature = "collisions")]
mod test_velocity_collision;
