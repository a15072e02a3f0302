//! Conversions between cover position, aspect ratio presets and raw motor units
//!
//! Two position models are supported:
//!
//! - [`PresetTable`]: every preset carries an explicitly calibrated motor
//!   position, and the cover position of a preset follows from where it sits
//!   in the motor travel.
//! - [`LinearInterpolation`]: presets are spread linearly over
//!   `0..=max_raw_position` by aspect ratio, and the cover position is derived
//!   continuously from the raw motor value.
//!
//! Both keep their presets sorted by ascending aspect ratio and are never
//! empty, so every lookup except the name lookup is total.

use crate::config::CoverDirection;
use crate::error::{CvmError, Result};
use crate::types::{CoverPosition, PresetEntry, RawPosition, MAX_COVER_POSITION};
use std::fmt;

/// Mapping between cover positions, presets and raw motor positions
pub trait PositionModel: Send + Sync + fmt::Debug {
    /// Presets sorted by ascending aspect ratio. Never empty.
    fn presets(&self) -> &[PresetEntry];

    /// Cover position shown for a raw motor position
    fn cover_position_for_raw(&self, raw: RawPosition) -> CoverPosition;

    /// Preset to recall for a requested cover position
    ///
    /// Resolves to the preset with the smallest cover position at or above
    /// the request, or the most open preset when none is that wide.
    fn cover_position_to_preset(&self, position: CoverPosition) -> &PresetEntry {
        let position = position.min(MAX_COVER_POSITION);
        let presets = self.presets();
        presets
            .iter()
            .filter(|p| p.cover_position >= position)
            .min_by_key(|p| p.cover_position)
            .or_else(|| presets.iter().max_by_key(|p| p.cover_position))
            .unwrap_or(&presets[0])
    }

    /// Preset whose calibrated motor position is nearest to `raw`
    ///
    /// Ties go to the preset that comes first in table order.
    fn raw_motor_position_to_preset(&self, raw: RawPosition) -> &PresetEntry {
        let presets = self.presets();
        let mut nearest = &presets[0];
        for preset in &presets[1..] {
            if (raw - preset.motor_position).abs() < (raw - nearest.motor_position).abs() {
                nearest = preset;
            }
        }
        nearest
    }

    /// Preset with exactly this aspect ratio name
    fn aspect_name_to_preset(&self, name: &str) -> Option<&PresetEntry> {
        self.presets().iter().find(|p| p.name == name)
    }

    /// Preset names in table order
    fn aspect_names(&self) -> Vec<String> {
        self.presets().iter().map(|p| p.name.clone()).collect()
    }
}

/// Presets with explicitly calibrated motor positions
#[derive(Debug, Clone, PartialEq)]
pub struct PresetTable {
    presets: Vec<PresetEntry>,
}

impl PresetTable {
    /// Build a table from preset names and motor positions given in preset order
    pub fn new(
        names: &[String],
        motor_positions: &[RawPosition],
        direction: CoverDirection,
    ) -> Result<Self> {
        if names.is_empty() {
            return Err(CvmError::InvalidConfig("no presets configured".to_string()));
        }
        if names.len() != motor_positions.len() {
            return Err(CvmError::InvalidConfig(format!(
                "{} presets but {} motor positions",
                names.len(),
                motor_positions.len()
            )));
        }

        let max_motor = motor_positions.iter().copied().fold(f64::MIN, f64::max);
        if !max_motor.is_finite() || max_motor <= 0.0 {
            return Err(CvmError::InvalidConfig(format!(
                "maximum motor position must be positive, got {}",
                max_motor
            )));
        }

        let mut presets = names
            .iter()
            .zip(motor_positions)
            .enumerate()
            .map(|(i, (name, &motor_position))| -> Result<PresetEntry> {
                Ok(PresetEntry {
                    name: name.clone(),
                    aspect: parse_aspect(name)?,
                    preset: i + 1,
                    motor_position,
                    cover_position: direction.cover_from_fraction(motor_position / max_motor),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        presets.sort_by(|a, b| a.aspect.total_cmp(&b.aspect));

        for p in &presets {
            tracing::info!(
                "aspect ratio: '{}' => {:.2} cover={} motor={:.2} preset={}",
                p.name,
                p.aspect,
                p.cover_position,
                p.motor_position,
                p.preset
            );
        }

        Ok(Self { presets })
    }

    /// Build a table from the comma-separated strings a host stores
    pub fn from_csv(names_csv: &str, positions_csv: &str, direction: CoverDirection) -> Result<Self> {
        let names = split_names(names_csv);
        let positions = parse_positions(positions_csv)?;
        Self::new(&names, &positions, direction)
    }
}

impl PositionModel for PresetTable {
    fn presets(&self) -> &[PresetEntry] {
        &self.presets
    }

    fn cover_position_for_raw(&self, raw: RawPosition) -> CoverPosition {
        self.raw_motor_position_to_preset(raw).cover_position
    }
}

/// Presets spread linearly over the motor travel by aspect ratio
#[derive(Debug, Clone, PartialEq)]
pub struct LinearInterpolation {
    presets: Vec<PresetEntry>,
    max_raw_position: RawPosition,
    direction: CoverDirection,
}

impl LinearInterpolation {
    /// Spread the named aspects evenly over `0..=max_raw_position`
    pub fn new(
        names: &[String],
        max_raw_position: RawPosition,
        direction: CoverDirection,
    ) -> Result<Self> {
        if names.is_empty() {
            return Err(CvmError::InvalidConfig("no presets configured".to_string()));
        }
        if !max_raw_position.is_finite() || max_raw_position <= 0.0 {
            return Err(CvmError::InvalidConfig(format!(
                "maximum raw position must be positive, got {}",
                max_raw_position
            )));
        }

        let aspects = names
            .iter()
            .map(|name| parse_aspect(name))
            .collect::<Result<Vec<_>>>()?;
        let min_aspect = aspects.iter().copied().fold(f64::MAX, f64::min);
        let max_aspect = aspects.iter().copied().fold(f64::MIN, f64::max);
        let span = max_aspect - min_aspect;

        let mut presets = names
            .iter()
            .zip(aspects)
            .enumerate()
            .map(|(i, (name, aspect))| {
                // 0.0 at the narrowest aspect, 1.0 at the widest
                let width = if span > 0.0 { (aspect - min_aspect) / span } else { 0.0 };
                let fraction = match direction {
                    CoverDirection::Inverted => 1.0 - width,
                    CoverDirection::Direct => width,
                };
                PresetEntry {
                    name: name.clone(),
                    aspect,
                    preset: i + 1,
                    motor_position: fraction * max_raw_position,
                    cover_position: direction.cover_from_fraction(fraction),
                }
            })
            .collect::<Vec<_>>();
        presets.sort_by(|a, b| a.aspect.total_cmp(&b.aspect));

        Ok(Self {
            presets,
            max_raw_position,
            direction,
        })
    }

    /// Build from a comma-separated list of aspect names
    pub fn from_csv(names_csv: &str, max_raw_position: RawPosition, direction: CoverDirection) -> Result<Self> {
        Self::new(&split_names(names_csv), max_raw_position, direction)
    }

    /// Raw motor position of the fully extended mask
    pub fn max_raw_position(&self) -> RawPosition {
        self.max_raw_position
    }
}

impl PositionModel for LinearInterpolation {
    fn presets(&self) -> &[PresetEntry] {
        &self.presets
    }

    fn cover_position_for_raw(&self, raw: RawPosition) -> CoverPosition {
        self.direction.cover_from_fraction(raw / self.max_raw_position)
    }
}

/// Split a comma-separated preset name list
pub fn split_names(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a comma-separated motor position list
pub fn parse_positions(csv: &str) -> Result<Vec<RawPosition>> {
    csv.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f64>()
                .map_err(|_| CvmError::InvalidConfig(format!("invalid motor position: {:?}", s)))
        })
        .collect()
}

/// Join motor positions into the comma-separated form hosts persist
pub fn join_positions(positions: &[RawPosition]) -> String {
    positions
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_aspect(name: &str) -> Result<f64> {
    name.parse::<f64>()
        .map_err(|_| CvmError::InvalidConfig(format!("aspect ratio name is not numeric: {:?}", name)))
}
