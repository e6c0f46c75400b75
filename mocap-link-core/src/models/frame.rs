/// Pose of one rigid body: position in millimetres, Euler angles in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidBodyPose {
    pub position: [f64; 3],
    /// Roll, pitch, yaw.
    pub rotation: [f64; 3],
}

impl RigidBodyPose {
    /// A pose the server could not resolve in this frame.
    pub fn lost() -> Self {
        Self {
            position: [f64::NAN; 3],
            rotation: [f64::NAN; 3],
        }
    }
}

/// One frame as delivered by the capture server (3D markers + 6DOF Euler bodies).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawFrame {
    pub frame_number: u64,
    pub markers: Vec<[f64; 3]>,
    pub rigid_bodies: Vec<RigidBodyPose>,
}

/// Message carried by the packet queue.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineMessage {
    Frame(RawFrame),
    /// Sentinel: the consumer exits as soon as it sees this.
    EndOfStream,
}
