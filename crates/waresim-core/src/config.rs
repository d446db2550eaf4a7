//! Static simulation tunables, loaded once at startup and never re-validated
//! at runtime.

use serde::Deserialize;
use std::collections::BTreeMap;

use crate::storage::BoxKind;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Invalid wiring or tunables. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("{field} must be positive")]
    NotPositive { field: &'static str },
    #[error("{field} must be within {min}..={max}, got {value}")]
    OutOfRange {
        field: &'static str,
        min: f32,
        max: f32,
        value: f32,
    },
    #[error("no source cell configured for box kind {0:?}")]
    MissingSourceCell(BoxKind),
}

// ---------------------------------------------------------------------------
// SimConfig
// ---------------------------------------------------------------------------

/// All numeric tunables for one simulation run. Read once at construction.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimConfig {
    /// Number of AGVs created at fleet initialization.
    pub fleet_size: u32,
    /// Battery level at or below which an idle AGV requests charging.
    pub low_battery_threshold: f32,
    /// Battery gained per tick while charging.
    pub charge_per_tick: f32,
    /// Battery spent per waypoint step.
    pub step_battery_cost: f32,
    /// Waypoints an AGV may advance in a single tick.
    pub movement_per_tick: u32,
    /// Clock period in milliseconds.
    pub tick_period_ms: u64,
    /// Columns per storage row in the standard layout.
    pub storage_cols: u32,
    /// Cell interior dimensions.
    pub cell_length: u32,
    pub cell_width: u32,
    pub cell_height: u32,
    /// Number of charging stations in the standard layout.
    pub charging_stations: u32,
    /// Destination cell for every dispatched delivery.
    pub loading_dock: String,
    /// Source cell per box kind, used by the dispatcher's lookup table.
    pub source_cells: BTreeMap<BoxKind, String>,
    /// Process executor drain deadline in milliseconds.
    pub executor_shutdown_ms: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            fleet_size: 4,
            low_battery_threshold: 20.0,
            charge_per_tick: 10.0,
            step_battery_cost: 1.0,
            movement_per_tick: 1,
            tick_period_ms: 100,
            storage_cols: 6,
            cell_length: 10,
            cell_width: 10,
            cell_height: 10,
            charging_stations: 2,
            loading_dock: "D1".to_string(),
            source_cells: BTreeMap::from([
                (BoxKind::Ambient, "A1".to_string()),
                (BoxKind::Refrigerated, "B1".to_string()),
                (BoxKind::Bulk, "C1".to_string()),
            ]),
            executor_shutdown_ms: 2_000,
        }
    }
}

impl SimConfig {
    /// Parse a config from TOML text. Unknown fields are rejected.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Range-check every tunable. Called once at context construction.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn positive(field: &'static str, value: u32) -> Result<(), ConfigError> {
            if value == 0 {
                Err(ConfigError::NotPositive { field })
            } else {
                Ok(())
            }
        }
        fn in_range(
            field: &'static str,
            value: f32,
            min: f32,
            max: f32,
        ) -> Result<(), ConfigError> {
            if value < min || value > max {
                Err(ConfigError::OutOfRange {
                    field,
                    min,
                    max,
                    value,
                })
            } else {
                Ok(())
            }
        }

        positive("fleet_size", self.fleet_size)?;
        positive("movement_per_tick", self.movement_per_tick)?;
        positive("storage_cols", self.storage_cols)?;
        positive("cell_length", self.cell_length)?;
        positive("cell_width", self.cell_width)?;
        positive("cell_height", self.cell_height)?;
        positive("charging_stations", self.charging_stations)?;
        in_range(
            "low_battery_threshold",
            self.low_battery_threshold,
            0.0,
            100.0,
        )?;
        in_range("charge_per_tick", self.charge_per_tick, f32::MIN_POSITIVE, 100.0)?;
        in_range(
            "step_battery_cost",
            self.step_battery_cost,
            0.0,
            100.0,
        )?;
        for kind in [BoxKind::Ambient, BoxKind::Refrigerated, BoxKind::Bulk] {
            if !self.source_cells.contains_key(&kind) {
                return Err(ConfigError::MissingSourceCell(kind));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        SimConfig::default().validate().unwrap();
    }

    #[test]
    fn toml_overrides_defaults() {
        let config = SimConfig::from_toml_str(
            r#"
            fleet_size = 2
            movement_per_tick = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.fleet_size, 2);
        assert_eq!(config.movement_per_tick, 3);
        assert_eq!(config.storage_cols, SimConfig::default().storage_cols);
    }

    #[test]
    fn unknown_field_is_rejected() {
        assert!(SimConfig::from_toml_str("warp_speed = 9").is_err());
    }

    #[test]
    fn zero_fleet_is_rejected() {
        let mut config = SimConfig::default();
        config.fleet_size = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NotPositive { field: "fleet_size" })
        ));
    }

    #[test]
    fn threshold_out_of_range_is_rejected() {
        let mut config = SimConfig::default();
        config.low_battery_threshold = 150.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { .. })
        ));
    }

    #[test]
    fn missing_source_cell_is_rejected() {
        let mut config = SimConfig::default();
        config.source_cells.remove(&BoxKind::Bulk);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingSourceCell(BoxKind::Bulk))
        ));
    }
}
