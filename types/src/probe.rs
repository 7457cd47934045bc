use serde::{Deserialize, Serialize};

use crate::color::{ColorMetric, Rgb};

/// Trigger-on-state or trigger-on-transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeMode {
    #[default]
    Level,
    Edge,
}

/// Where a probe reads its pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeGeometry {
    /// Box of `(2 * radius + 1)^2` pixels centred on `(x, y)`, averaged.
    Point {
        x: u32,
        y: u32,
        #[serde(default)]
        radius: u32,
    },
    /// Horizontal bar `[start_x, end_x)` on row `y`. The probe color is read
    /// at `monitor_percentage` of the bar width.
    Bar {
        start_x: u32,
        end_x: u32,
        y: u32,
        monitor_percentage: f64,
    },
}

/// Immutable description of a monitored region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeConfig {
    pub name: String,

    #[serde(flatten)]
    pub geometry: ProbeGeometry,

    #[serde(default)]
    pub mode: ProbeMode,

    #[serde(default)]
    pub metric: ColorMetric,

    /// Reference color
    pub color: Rgb,

    /// Secondary color for two-color edge transitions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_color: Option<Rgb>,

    /// Maximum distance still considered a match
    pub tolerance: f64,

    /// Minimum time between two accepted triggers of this probe
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debounce_ms: Option<u64>,
}

impl ProbeConfig {
    pub fn point(name: impl Into<String>, x: u32, y: u32, color: Rgb, tolerance: f64) -> Self {
        Self {
            name: name.into(),
            geometry: ProbeGeometry::Point { x, y, radius: 0 },
            mode: ProbeMode::Level,
            metric: ColorMetric::Rgb,
            color,
            to_color: None,
            tolerance,
            debounce_ms: None,
        }
    }

    pub fn bar(
        name: impl Into<String>,
        start_x: u32,
        end_x: u32,
        y: u32,
        monitor_percentage: f64,
        color: Rgb,
        tolerance: f64,
    ) -> Self {
        Self {
            name: name.into(),
            geometry: ProbeGeometry::Bar {
                start_x,
                end_x,
                y,
                monitor_percentage,
            },
            mode: ProbeMode::Level,
            metric: ColorMetric::Rgb,
            color,
            to_color: None,
            tolerance,
            debounce_ms: None,
        }
    }

    pub fn with_mode(mut self, mode: ProbeMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_metric(mut self, metric: ColorMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_to_color(mut self, to_color: Rgb) -> Self {
        self.to_color = Some(to_color);
        self
    }

    pub fn with_debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.debounce_ms = Some(debounce_ms);
        self
    }

    pub fn is_bar(&self) -> bool {
        matches!(self.geometry, ProbeGeometry::Bar { .. })
    }
}
