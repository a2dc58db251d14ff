//! Per-source 3D parameter resolution.
//!
//! Turns logical source and listener state into per-channel dry/wet send
//! gains and a pitch multiplier for the mixer. Pure computation: every
//! division is guarded, so degenerate input (zero distances, coincident
//! positions, zero-length vectors) produces finite output.

use glam::Vec3;

use crate::models::listener::{DistanceModel, Listener};
use crate::models::source::SourceProperties;

/// Gains and pitch for one source for one mixing pass.
///
/// Only the first `output_channels` entries of `dry`/`wet` are meaningful.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedParameters {
    pub dry: [f32; 2],
    pub wet: [f32; 2],
    pub pitch: f32,
    /// Left/right and front/back pan fractions, 0.5 is centred.
    pub pan: [f32; 2],
}

/// Resolve gains and pitch for a source playing a buffer with
/// `buffer_channels` channels into `output_channels` (1 or 2) channels.
///
/// Multi-channel buffers bypass spatialization entirely.
pub fn resolve(
    source: &SourceProperties,
    listener: &Listener,
    buffer_channels: usize,
    output_channels: usize,
) -> ResolvedParameters {
    let volume = source.gain * listener.gain;
    if buffer_channels != 1 {
        let mut dry = [0.0; 2];
        for send in dry.iter_mut().take(output_channels.clamp(1, 2)) {
            *send = volume;
        }
        return ResolvedParameters {
            dry,
            wet: [0.0; 2],
            pitch: source.pitch,
            pan: [0.5, 0.5],
        };
    }

    let relative = if source.relative {
        source.position
    } else {
        source.position - listener.position
    };
    let distance = relative.length();

    let (dry_mix, wet_mix) = distance_mix(source, listener.distance_model, distance);
    let gain = source.gain * cone_gain(source, relative);
    let pitch = doppler_pitch(source, listener, relative);

    let rotated = rotate_into_listener(relative, listener);
    let pan = if distance > 0.0 {
        let n = rotated.normalize_or_zero();
        [0.5 + 0.5 * n.x, 0.5 + 0.5 * n.z]
    } else {
        [0.5, 0.5]
    };

    let base = gain * listener.gain;
    let mut dry = [0.0; 2];
    let mut wet = [0.0; 2];
    if output_channels >= 2 {
        let left = (1.0 - pan[0]).max(0.0).sqrt();
        let right = pan[0].max(0.0).sqrt();
        dry = [base * dry_mix * left, base * dry_mix * right];
        wet = [base * wet_mix * left, base * wet_mix * right];
    } else {
        dry[0] = base * dry_mix;
        wet[0] = base * wet_mix;
    }

    ResolvedParameters {
        dry,
        wet,
        pitch,
        pan,
    }
}

/// Listener basis: right = at × up, then up, then -at.
fn rotate_into_listener(position: Vec3, listener: &Listener) -> Vec3 {
    let at = listener.orientation.at.normalize_or_zero();
    let up = listener.orientation.up.normalize_or_zero();
    let right = at.cross(up).normalize_or_zero();
    Vec3::new(position.dot(right), position.dot(up), -position.dot(at))
}

/// Distance attenuation of the dry and room paths, clamped to the
/// source's gain limits. The room path has no base level.
fn distance_mix(source: &SourceProperties, model: DistanceModel, distance: f32) -> (f32, f32) {
    let dry = distance_factor(source, model, distance);
    let wet = 0.0_f32;
    (
        dry.min(source.max_gain).max(source.min_gain),
        wet.min(source.max_gain).max(source.min_gain),
    )
}

fn distance_factor(source: &SourceProperties, model: DistanceModel, distance: f32) -> f32 {
    if model == DistanceModel::None {
        return 1.0;
    }
    let reference = source.reference_distance;
    let max = source.max_distance;
    let rolloff = source.rolloff_factor;
    let d = if model.is_clamped() {
        distance.max(reference).min(max.max(reference))
    } else {
        distance
    };
    if d == 0.0 {
        return 1.0;
    }

    match model {
        DistanceModel::None => 1.0,
        DistanceModel::Inverse | DistanceModel::InverseClamped => {
            let denominator = 1.0 + rolloff * (d - reference) / reference.max(f32::MIN_POSITIVE);
            if denominator > 0.0 {
                1.0 / denominator
            } else {
                1.0
            }
        }
        DistanceModel::Linear | DistanceModel::LinearClamped => {
            let span = max - reference;
            if span > 0.0 {
                (1.0 - rolloff * (d - reference) / span).max(0.0)
            } else {
                1.0
            }
        }
        DistanceModel::Exponent | DistanceModel::ExponentClamped => {
            if reference > 0.0 {
                (d / reference).powf(-rolloff)
            } else {
                1.0
            }
        }
    }
}

/// Directional cone multiplier. Zero direction means omnidirectional.
fn cone_gain(source: &SourceProperties, relative: Vec3) -> f32 {
    let direction = source.direction.normalize_or_zero();
    let to_listener = (-relative).normalize_or_zero();
    if direction == Vec3::ZERO || to_listener == Vec3::ZERO {
        return 1.0;
    }

    let angle = direction.dot(to_listener).clamp(-1.0, 1.0).acos().to_degrees();
    let inner = source.cone_inner_angle;
    let outer = source.cone_outer_angle;
    let outer_gain = source.cone_outer_gain;
    if angle > outer {
        outer_gain
    } else if angle >= inner {
        let span = outer - inner;
        if span > 0.0 {
            1.0 + (outer_gain - 1.0) * (angle - inner) / span
        } else {
            outer_gain
        }
    } else {
        1.0
    }
}

fn doppler_pitch(source: &SourceProperties, listener: &Listener, relative: Vec3) -> f32 {
    if listener.doppler_factor == 0.0 {
        return source.pitch;
    }
    let reference = listener.doppler_reference_velocity();
    let to_listener = (-relative).normalize_or_zero();
    let limit = reference - reference * f32::EPSILON;
    let vs = source.velocity.dot(to_listener).clamp(-limit, limit);
    let vl = listener.velocity.dot(to_listener).clamp(-limit, limit);
    source.pitch * listener.doppler_factor * (reference - vl) / (reference - vs)
}
