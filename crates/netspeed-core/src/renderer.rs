// ── Renderer collaborator ──
//
// How a rate is drawn is somebody else's problem. The service only
// decides whether something is shown, shown blank, or cancelled.

use serde::{Deserialize, Serialize};

use crate::model::{Configuration, RateSample};

/// Identifier of the single indicator this service owns.
pub const INDICATOR_ID: u32 = 1;

/// Everything a renderer needs for one frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorContent {
    pub rates: RateSample,
    /// Content-free variant: the indicator must exist but show nothing.
    pub hidden: bool,
    pub configuration: Configuration,
}

impl IndicatorContent {
    pub fn visible(rates: RateSample, configuration: &Configuration) -> Self {
        Self {
            rates,
            hidden: false,
            configuration: configuration.clone(),
        }
    }

    pub fn blank(configuration: &Configuration) -> Self {
        Self {
            rates: RateSample::ZERO,
            hidden: true,
            configuration: configuration.clone(),
        }
    }
}

/// Publishes the indicator.
///
/// Calls arrive from the service task, one at a time, in order.
pub trait Renderer: Send + Sync {
    /// Show or update a regular indicator.
    fn publish(&self, id: u32, content: &IndicatorContent);

    /// Remove the indicator. Called once on terminal teardown, and while
    /// a background-bound indicator is suppressed.
    fn cancel(&self, id: u32);

    /// Show the indicator as the mandatory foreground notice.
    fn publish_foreground(&self, id: u32, content: &IndicatorContent);
}
