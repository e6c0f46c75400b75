use serde::{Deserialize, Serialize};

/// Values per 3D marker: x, y, z.
pub const MARKER_WIDTH: usize = 3;

/// Values per 6DOF rigid body: x, y, z, roll, pitch, yaw.
pub const RIGID_BODY_WIDTH: usize = 6;

/// Parameter groups requested from the capture server before streaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterCategory {
    General,
    ThreeD,
    SixD,
}

impl ParameterCategory {
    pub const ALL: [ParameterCategory; 3] = [Self::General, Self::ThreeD, Self::SixD];
}

/// Frame components requested when streaming starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamComponent {
    ThreeD,
    SixDEuler,
}

impl StreamComponent {
    pub const ALL: [StreamComponent; 2] = [Self::ThreeD, Self::SixDEuler];
}

/// Capture server metadata relevant to the channel layout.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ServerParameters {
    /// Marker labels, in frame order. Empty labels are allowed.
    pub markers: Vec<String>,
    /// Rigid body names, in frame order.
    pub rigid_bodies: Vec<String>,
    /// Capture frequency in Hz, if reported.
    pub frequency: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyKind {
    Marker,
    RigidBody,
}

impl BodyKind {
    pub fn width(&self) -> usize {
        match self {
            Self::Marker => MARKER_WIDTH,
            Self::RigidBody => RIGID_BODY_WIDTH,
        }
    }

    /// Value column names, in sample order.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Self::Marker => &["x", "y", "z"],
            Self::RigidBody => &["x", "y", "z", "roll", "pitch", "yaw"],
        }
    }
}

/// One body's slot in the layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelGroup {
    pub name: String,
    pub kind: BodyKind,
}

impl ChannelGroup {
    pub fn width(&self) -> usize {
        self.kind.width()
    }
}

/// Resolved per-sample channel layout: markers first, then rigid bodies.
///
/// Immutable once resolved. Built by `processing::layout_resolver`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelLayout {
    groups: Vec<ChannelGroup>,
    channel_count: usize,
    marker_count: usize,
    body_count: usize,
}

impl ChannelLayout {
    pub(crate) fn from_groups(groups: Vec<ChannelGroup>) -> Self {
        let channel_count = groups.iter().map(ChannelGroup::width).sum();
        let marker_count = groups.iter().filter(|g| g.kind == BodyKind::Marker).count();
        let body_count = groups.len() - marker_count;
        Self {
            groups,
            channel_count,
            marker_count,
            body_count,
        }
    }

    pub fn groups(&self) -> &[ChannelGroup] {
        &self.groups
    }

    /// Total number of values in one frame across all bodies.
    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    pub fn marker_count(&self) -> usize {
        self.marker_count
    }

    pub fn body_count(&self) -> usize {
        self.body_count
    }

    /// Flattened channel labels, e.g. `skate_yaw`.
    pub fn channel_labels(&self) -> Vec<String> {
        self.groups
            .iter()
            .flat_map(|group| {
                group
                    .kind
                    .columns()
                    .iter()
                    .map(move |column| format!("{}_{}", group.name, column))
            })
            .collect()
    }
}
