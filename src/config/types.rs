use serde::{Deserialize, Serialize};

use crate::config::error::{ConfigError, Result};
use crate::convert::{ColorRange, PlaneOrder, YuvConverter};
use crate::filter::{EdgeParams, SmoothingKernel};
use crate::frame::ChannelLayout;

/// Whether the edge-detection stage runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProcessingMode {
    /// Converted frames are displayed as captured.
    Normal,
    #[default]
    EdgeDetection,
}

/// Pipeline options exposed to the host.
///
/// Every field has a default, so a partial JSON object is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineConfig {
    pub mode: ProcessingMode,
    pub threshold_low: u16,
    pub threshold_high: u16,
    pub plane_order: PlaneOrder,
    pub color_range: ColorRange,
    /// Layout of edge-detected frames, and so how the display samples them.
    pub edge_output: ChannelLayout,
    pub smoothing_kernel: SmoothingKernel,
    pub hysteresis: bool,
    /// RGBA clear colour shown before the first frame and after blanking.
    pub clear_color: [f32; 4],
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let edge = EdgeParams::default();
        Self {
            mode: ProcessingMode::default(),
            threshold_low: edge.low,
            threshold_high: edge.high,
            plane_order: PlaneOrder::default(),
            color_range: ColorRange::default(),
            edge_output: edge.output,
            smoothing_kernel: edge.kernel,
            hysteresis: edge.hysteresis,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.threshold_low > self.threshold_high {
            return Err(ConfigError::Invalid(format!(
                "thresholdLow {} exceeds thresholdHigh {}",
                self.threshold_low, self.threshold_high
            )));
        }
        if self
            .clear_color
            .iter()
            .any(|c| !c.is_finite() || !(0.0..=1.0).contains(c))
        {
            return Err(ConfigError::Invalid(format!(
                "clearColor components must be within 0..1, got {:?}",
                self.clear_color
            )));
        }
        Ok(())
    }

    pub fn edge_params(&self) -> EdgeParams {
        EdgeParams {
            low: self.threshold_low,
            high: self.threshold_high,
            kernel: self.smoothing_kernel,
            hysteresis: self.hysteresis,
            output: self.edge_output,
        }
    }

    pub fn converter(&self) -> YuvConverter {
        YuvConverter::new(self.plane_order, self.color_range)
    }

    /// Layout of the buffers this config publishes.
    pub fn output_layout(&self) -> ChannelLayout {
        match self.mode {
            ProcessingMode::Normal => ChannelLayout::Rgba,
            ProcessingMode::EdgeDetection => self.edge_output,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_run_edge_detection_with_canny_thresholds() {
        let config = PipelineConfig::default();
        assert_eq!(config.mode, ProcessingMode::EdgeDetection);
        assert_eq!((config.threshold_low, config.threshold_high), (100, 200));
        assert_eq!(config.smoothing_kernel, SmoothingKernel::Binomial5);
        assert!(config.hysteresis);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn serialises_to_camelcase() {
        let json = serde_json::to_value(PipelineConfig::default()).unwrap();
        assert_eq!(json["mode"], "edgeDetection");
        assert_eq!(json["thresholdLow"], 100);
        assert_eq!(json["planeOrder"], "uv");
        assert_eq!(json["edgeOutput"], "rgba");
        assert_eq!(json["smoothingKernel"], 5);
        assert!(json["clearColor"].is_array());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"mode":"normal","planeOrder":"vu"}"#).unwrap();
        assert_eq!(config.mode, ProcessingMode::Normal);
        assert_eq!(config.plane_order, PlaneOrder::Vu);
        assert_eq!(config.threshold_high, 200);
    }

    #[test]
    fn unsupported_kernel_size_fails_to_parse() {
        let result = serde_json::from_str::<PipelineConfig>(r#"{"smoothingKernel":7}"#);
        assert!(result.is_err());
    }

    #[test]
    fn inverted_thresholds_are_invalid() {
        let config = PipelineConfig {
            threshold_low: 300,
            threshold_high: 200,
            ..PipelineConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn out_of_range_clear_color_is_invalid() {
        let config = PipelineConfig {
            clear_color: [0.0, 2.0, 0.0, 1.0],
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn edge_params_follow_config() {
        let config = PipelineConfig {
            threshold_low: 10,
            threshold_high: 20,
            smoothing_kernel: SmoothingKernel::Binomial3,
            hysteresis: false,
            edge_output: ChannelLayout::Luminance,
            ..PipelineConfig::default()
        };
        let params = config.edge_params();
        assert_eq!((params.low, params.high), (10, 20));
        assert_eq!(params.kernel, SmoothingKernel::Binomial3);
        assert!(!params.hysteresis);
        assert_eq!(config.output_layout(), ChannelLayout::Luminance);
    }

    #[test]
    fn normal_mode_always_outputs_rgba() {
        let config = PipelineConfig {
            mode: ProcessingMode::Normal,
            edge_output: ChannelLayout::Luminance,
            ..PipelineConfig::default()
        };
        assert_eq!(config.output_layout(), ChannelLayout::Rgba);
    }
}
