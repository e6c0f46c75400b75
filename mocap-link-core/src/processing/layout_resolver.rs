use std::collections::HashMap;

use crate::models::error::SessionError;
use crate::models::layout::{BodyKind, ChannelGroup, ChannelLayout, ServerParameters};

/// Resolve the per-sample channel layout from capture server metadata.
///
/// Markers come first, then rigid bodies, each in server order. Empty marker
/// labels become `marker_<n>` and repeated names get a `_2`, `_3`… suffix so
/// every body maps to exactly one buffer record.
///
/// A layout with no channels is a `Configuration` error: the server simply has
/// nothing configured, which is distinct from a transport failure.
pub fn resolve_layout(params: &ServerParameters) -> Result<ChannelLayout, SessionError> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut groups = Vec::with_capacity(params.markers.len() + params.rigid_bodies.len());

    let markers = params.markers.iter().enumerate().map(|(i, label)| {
        let name = if label.trim().is_empty() {
            format!("marker_{}", i + 1)
        } else {
            label.trim().to_string()
        };
        (name, BodyKind::Marker)
    });
    let bodies = params.rigid_bodies.iter().enumerate().map(|(i, name)| {
        let name = if name.trim().is_empty() {
            format!("body_{}", i + 1)
        } else {
            name.trim().to_string()
        };
        (name, BodyKind::RigidBody)
    });

    for (name, kind) in markers.chain(bodies) {
        let occurrences = seen.entry(name.clone()).or_insert(0);
        *occurrences += 1;
        let name = if *occurrences > 1 {
            format!("{}_{}", name, occurrences)
        } else {
            name
        };
        groups.push(ChannelGroup { name, kind });
    }

    let layout = ChannelLayout::from_groups(groups);
    if layout.channel_count() == 0 {
        log::info!(
            "Missing capture data: markers {} rigid bodies {}",
            params.markers.len(),
            params.rigid_bodies.len()
        );
        return Err(SessionError::Configuration {
            markers: params.markers.len(),
            bodies: params.rigid_bodies.len(),
        });
    }

    log::debug!(
        "Resolved layout: {} marker(s), {} rigid bod(y/ies), {} channel(s)",
        layout.marker_count(),
        layout.body_count(),
        layout.channel_count()
    );
    Ok(layout)
}
