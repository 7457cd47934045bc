//! Sampling and the level/edge evaluation state machine.

use argus_types::{ProbeConfig, ProbeGeometry, ProbeMode, Rgb};
use serde::Serialize;
use tokio::time::Instant;

use crate::color::distance;
use crate::frame::Frame;

/// Which way an edge-mode probe crossed its tolerance boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeDirection {
    /// Came within tolerance of the reference color
    Rising,
    /// Left the tolerance of the reference color
    Falling,
    /// Moved from the reference color to the configured `to_color`
    Transition,
}

/// Which way a bar's fill crossed its monitored percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossDirection {
    Above,
    Below,
}

/// Bar-probe specific part of a result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PercentageReading {
    pub current_percentage: f64,
    /// Always false without a previous bar reading
    pub threshold_crossed: bool,
    pub cross_direction: Option<CrossDirection>,
}

/// Raw measurement taken from a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeSample {
    pub color: Rgb,
    /// Fill percentage for bar probes
    pub fill_percentage: Option<f64>,
}

impl ProbeSample {
    pub fn color(color: Rgb) -> Self {
        Self {
            color,
            fill_percentage: None,
        }
    }

    pub fn bar(color: Rgb, fill_percentage: f64) -> Self {
        Self {
            color,
            fill_percentage: Some(fill_percentage),
        }
    }
}

/// Output of one evaluation. Only ever kept as the "previous" input of the next one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeResult {
    pub triggered: bool,
    pub current_color: Rgb,
    /// Distance from the reference color
    pub distance: f64,
    pub timestamp: Instant,
    pub edge: Option<EdgeDirection>,
    pub percentage: Option<PercentageReading>,
}

impl ProbeResult {
    /// Larger is worse. For bars this is the share of the span matching the
    /// reference color, so health bars reference their empty color and the
    /// severity is the missing fraction. Color distance otherwise.
    pub fn severity(&self) -> f64 {
        match self.percentage {
            Some(reading) => reading.current_percentage,
            None => self.distance,
        }
    }
}

/// X coordinate at `percentage` of the bar `[start_x, end_x)`.
pub fn calculated_x(start_x: u32, end_x: u32, percentage: f64) -> u32 {
    if end_x <= start_x {
        return start_x;
    }
    let width = (end_x - start_x) as f64;
    let offset = (width * percentage.clamp(0.0, 100.0) / 100.0).floor() as u32;
    (start_x + offset).min(end_x - 1)
}

/// Percentage of `[start_x, end_x)` on row `y` within tolerance of the
/// reference color. This O(width) scan is the dominant per-cycle cost.
pub fn fill_percentage(config: &ProbeConfig, frame: &Frame) -> Option<f64> {
    let ProbeGeometry::Bar {
        start_x, end_x, y, ..
    } = config.geometry
    else {
        return None;
    };
    if end_x <= start_x || y >= frame.height() {
        return None;
    }

    let matching = frame
        .row_span(y, start_x, end_x)
        .filter(|&px| distance(config.metric, px, config.color) <= config.tolerance)
        .count();

    Some(matching as f64 * 100.0 / (end_x - start_x) as f64)
}

/// Read the probe's region from `frame`. `None` when the geometry falls
/// outside the frame; the caller skips the probe for this cycle.
pub fn sample(config: &ProbeConfig, frame: &Frame) -> Option<ProbeSample> {
    match config.geometry {
        ProbeGeometry::Point { x, y, radius } => {
            frame.region_average(x, y, radius).map(ProbeSample::color)
        }
        ProbeGeometry::Bar {
            start_x,
            end_x,
            y,
            monitor_percentage,
        } => {
            let x = calculated_x(start_x, end_x, monitor_percentage);
            let color = frame.pixel(x, y)?;
            let fill = fill_percentage(config, frame)?;
            Some(ProbeSample::bar(color, fill))
        }
    }
}

/// Evaluate one sample against the immediately preceding result.
pub fn evaluate(
    config: &ProbeConfig,
    sample: &ProbeSample,
    previous: Option<&ProbeResult>,
    timestamp: Instant,
) -> ProbeResult {
    let dist = distance(config.metric, sample.color, config.color);
    let is_close = dist <= config.tolerance;

    let percentage = sample
        .fill_percentage
        .map(|current| percentage_reading(config, current, previous));

    let (triggered, edge) = match config.mode {
        ProbeMode::Level => (is_close, None),
        ProbeMode::Edge => {
            let edge = previous.and_then(|prev| color_edge(config, sample, prev, is_close));
            let crossed = percentage.is_some_and(|p| p.threshold_crossed);
            (edge.is_some() || crossed, edge)
        }
    };

    ProbeResult {
        triggered,
        current_color: sample.color,
        distance: dist,
        timestamp,
        edge,
        percentage,
    }
}

fn color_edge(
    config: &ProbeConfig,
    sample: &ProbeSample,
    prev: &ProbeResult,
    is_close: bool,
) -> Option<EdgeDirection> {
    let was_close = prev.distance <= config.tolerance;

    match config.to_color {
        Some(to_color) => {
            let reached = distance(config.metric, sample.color, to_color) <= config.tolerance;
            (was_close && reached).then_some(EdgeDirection::Transition)
        }
        None => match (was_close, is_close) {
            (true, false) => Some(EdgeDirection::Falling),
            (false, true) => Some(EdgeDirection::Rising),
            _ => None,
        },
    }
}

fn percentage_reading(
    config: &ProbeConfig,
    current: f64,
    previous: Option<&ProbeResult>,
) -> PercentageReading {
    let threshold = match config.geometry {
        ProbeGeometry::Bar {
            monitor_percentage, ..
        } => monitor_percentage,
        ProbeGeometry::Point { .. } => 0.0,
    };

    let cross_direction = previous
        .and_then(|prev| prev.percentage)
        .and_then(|prev| {
            let was_above = prev.current_percentage >= threshold;
            let is_above = current >= threshold;
            match (was_above, is_above) {
                (false, true) => Some(CrossDirection::Above),
                (true, false) => Some(CrossDirection::Below),
                _ => None,
            }
        });

    PercentageReading {
        current_percentage: current,
        threshold_crossed: cross_direction.is_some(),
        cross_direction,
    }
}
