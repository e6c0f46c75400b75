pub mod mocap;
pub mod transitions;
