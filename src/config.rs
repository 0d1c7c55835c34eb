use crate::boundary::BoundaryConfig;
use crate::intersection::IntersectionOptions;
use crate::metrics::MetricsOptions;

/// Page-level animation settings, typically loaded from a `motion.toml`.
///
/// Every section is optional; missing sections and fields take their
/// defaults.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MotionConfig {
    pub boundary: BoundaryConfig,
    pub metrics: MetricsOptions,
    pub intersection: IntersectionOptions,
}

impl MotionConfig {
    /// Parse a `motion.toml` string.
    #[cfg(feature = "toml")]
    pub fn from_toml_str(s: &str) -> crate::MotionResult<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Boundary settings with the animation name shared by all sections.
    pub fn boundary_for(&self, animation_name: &str) -> BoundaryConfig {
        BoundaryConfig {
            animation_name: animation_name.to_string(),
            ..self.boundary.clone()
        }
    }

    /// Metrics settings with the animation name shared by all sections.
    pub fn metrics_for(&self, animation_name: &str) -> MetricsOptions {
        MetricsOptions {
            name: animation_name.to_string(),
            ..self.metrics.clone()
        }
    }
}
