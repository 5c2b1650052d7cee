use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_CONCURRENT: usize = 8;

/// What happens to a delivery when every slot is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaturationPolicy {
    /// The puller waits until a slot frees up.
    #[default]
    Block,
    /// The delivery is nak'ed with the retry delay.
    Defer,
    /// The delivery is acked without running the handler, counted and logged.
    Shed,
}

/// Per-topic concurrency settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    pub max_concurrent: usize,
    /// When false, in-flight work is still counted but never refused.
    pub enable_concurrency_control: bool,
    pub saturation: SaturationPolicy,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            enable_concurrency_control: true,
            saturation: SaturationPolicy::Block,
        }
    }
}
