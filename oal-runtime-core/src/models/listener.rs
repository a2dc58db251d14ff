use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::config::ContextConfiguration;
use super::error::AudioError;

/// Distance attenuation model applied to mono sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DistanceModel {
    None,
    Inverse,
    #[default]
    InverseClamped,
    Linear,
    LinearClamped,
    Exponent,
    ExponentClamped,
}

impl DistanceModel {
    pub fn is_clamped(self) -> bool {
        matches!(
            self,
            Self::InverseClamped | Self::LinearClamped | Self::ExponentClamped
        )
    }
}

/// Listener orientation: the facing ("at") vector and the up vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Orientation {
    pub at: Vec3,
    pub up: Vec3,
}

impl Default for Orientation {
    fn default() -> Self {
        Self {
            at: Vec3::NEG_Z,
            up: Vec3::Y,
        }
    }
}

/// A single listener property, tagged by kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ListenerParam {
    Gain(f32),
    Position(Vec3),
    Velocity(Vec3),
    Orientation(Orientation),
    DopplerFactor(f32),
    DopplerVelocity(f32),
    SpeedOfSound(f32),
    DistanceModel(DistanceModel),
}

/// The listener plus the context-global spatialization settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Listener {
    pub position: Vec3,
    pub velocity: Vec3,
    pub orientation: Orientation,
    pub gain: f32,
    pub doppler_factor: f32,
    pub doppler_velocity: f32,
    pub speed_of_sound: f32,
    pub distance_model: DistanceModel,
}

impl Default for Listener {
    fn default() -> Self {
        Self::from_config(&ContextConfiguration::default())
    }
}

impl Listener {
    pub fn from_config(config: &ContextConfiguration) -> Self {
        Self {
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            orientation: Orientation::default(),
            gain: 1.0,
            doppler_factor: config.doppler_factor,
            doppler_velocity: config.doppler_velocity,
            speed_of_sound: config.speed_of_sound,
            distance_model: config.distance_model,
        }
    }

    pub fn set(&mut self, param: ListenerParam) -> Result<(), AudioError> {
        match param {
            ListenerParam::Gain(gain) => {
                self.gain = non_negative("listener gain", gain)?;
            }
            ListenerParam::Position(position) => self.position = finite("position", position)?,
            ListenerParam::Velocity(velocity) => self.velocity = finite("velocity", velocity)?,
            ListenerParam::Orientation(orientation) => {
                finite("orientation at", orientation.at)?;
                finite("orientation up", orientation.up)?;
                self.orientation = orientation;
            }
            ListenerParam::DopplerFactor(factor) => {
                self.doppler_factor = non_negative("doppler factor", factor)?;
            }
            ListenerParam::DopplerVelocity(velocity) => {
                if !(velocity > 0.0) {
                    return Err(AudioError::InvalidValue(format!(
                        "doppler velocity must be positive, got {}",
                        velocity
                    )));
                }
                self.doppler_velocity = velocity;
            }
            ListenerParam::SpeedOfSound(speed) => {
                if !(speed > 0.0) {
                    return Err(AudioError::InvalidValue(format!(
                        "speed of sound must be positive, got {}",
                        speed
                    )));
                }
                self.speed_of_sound = speed;
            }
            ListenerParam::DistanceModel(model) => self.distance_model = model,
        }
        Ok(())
    }

    /// Velocity at which the Doppler shift becomes singular.
    pub fn doppler_reference_velocity(&self) -> f32 {
        self.doppler_velocity * self.speed_of_sound
    }
}

pub(crate) fn non_negative(name: &str, value: f32) -> Result<f32, AudioError> {
    if value >= 0.0 && value.is_finite() {
        Ok(value)
    } else {
        Err(AudioError::InvalidValue(format!("{} must be >= 0, got {}", name, value)))
    }
}

pub(crate) fn finite(name: &str, value: Vec3) -> Result<Vec3, AudioError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(AudioError::InvalidValue(format!("{} must be finite, got {}", name, value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_configuration() {
        let listener = Listener::default();
        assert_eq!(listener.gain, 1.0);
        assert_eq!(listener.distance_model, DistanceModel::InverseClamped);
        assert_eq!(listener.orientation.at, Vec3::NEG_Z);
        assert!((listener.doppler_reference_velocity() - 343.3).abs() < 1e-3);
    }

    #[test]
    fn rejects_negative_gain() {
        let mut listener = Listener::default();
        assert!(matches!(
            listener.set(ListenerParam::Gain(-0.5)),
            Err(AudioError::InvalidValue(_))
        ));
        assert_eq!(listener.gain, 1.0);
    }

    #[test]
    fn rejects_non_positive_doppler_velocity() {
        let mut listener = Listener::default();
        assert!(listener.set(ListenerParam::DopplerVelocity(0.0)).is_err());
        assert!(listener.set(ListenerParam::DopplerVelocity(2.0)).is_ok());
        assert_eq!(listener.doppler_velocity, 2.0);
    }

    #[test]
    fn rejects_non_finite_position() {
        let mut listener = Listener::default();
        let bad = Vec3::new(f32::NAN, 0.0, 0.0);
        assert!(listener.set(ListenerParam::Position(bad)).is_err());
    }

    #[test]
    fn distance_model_serde_names() {
        let json = serde_json::to_string(&DistanceModel::InverseClamped).unwrap();
        assert_eq!(json, "\"inverse-clamped\"");
    }
}
