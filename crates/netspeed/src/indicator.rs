//! Log-backed indicator renderer used by the daemon.

use bytesize::ByteSize;
use tracing::info;

use netspeed_core::{IndicatorContent, MinUnit, Mode, Renderer};

/// Draws the indicator into the log, one line per frame.
#[derive(Debug, Default)]
pub struct TracingRenderer;

impl TracingRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl Renderer for TracingRenderer {
    fn publish(&self, id: u32, content: &IndicatorContent) {
        info!(
            id,
            text = %render_text(content),
            hidden = content.hidden,
            notify = !content.configuration.hide_notification,
            "indicator"
        );
    }

    fn cancel(&self, id: u32) {
        info!(id, "indicator removed");
    }

    fn publish_foreground(&self, id: u32, content: &IndicatorContent) {
        info!(
            id,
            text = %render_text(content),
            hidden = content.hidden,
            clickable = content.configuration.notify_clickable,
            "foreground indicator"
        );
    }
}

/// The indicator line for one frame.
pub fn render_text(content: &IndicatorContent) -> String {
    if content.hidden {
        return String::new();
    }
    let unit = content.configuration.min_unit;
    let rx = format_rate(content.rates.rx_rate, unit);
    let tx = format_rate(content.rates.tx_rate, unit);
    match content.configuration.mode {
        Mode::All => format!("↓ {rx}  ↑ {tx}"),
        Mode::Down => format!("↓ {rx}"),
        Mode::Up => format!("↑ {tx}"),
    }
}

/// Human-readable rate, never scaled below `min_unit`.
pub fn format_rate(bytes_per_sec: u64, min_unit: MinUnit) -> String {
    let floor = match min_unit {
        MinUnit::B => None,
        MinUnit::Kb => Some("KiB"),
        MinUnit::Mb => Some("MiB"),
    };
    let unit = min_unit.bytes();
    match floor {
        // Below the floor: a fraction of the smallest allowed unit.
        Some(label) if bytes_per_sec < unit => {
            let tenths = bytes_per_sec.saturating_mul(10) / unit;
            format!("{}.{} {label}/s", tenths / 10, tenths % 10)
        }
        _ => format!("{}/s", ByteSize(bytes_per_sec).to_string_as(true)),
    }
}

#[cfg(test)]
mod tests {
    use netspeed_core::{Configuration, RateSample};

    use super::*;

    #[test]
    fn rates_scale_up_freely() {
        assert_eq!(format_rate(0, MinUnit::B), "0 B/s");
        assert_eq!(format_rate(512, MinUnit::B), "512 B/s");
        assert_eq!(format_rate(1536, MinUnit::B), "1.5 KiB/s");
        assert_eq!(format_rate(1536, MinUnit::Kb), "1.5 KiB/s");
    }

    #[test]
    fn rates_never_drop_below_min_unit() {
        assert_eq!(format_rate(512, MinUnit::Kb), "0.5 KiB/s");
        assert_eq!(format_rate(0, MinUnit::Mb), "0.0 MiB/s");
    }

    #[test]
    fn mode_picks_the_directions_shown() {
        let cfg = Configuration {
            mode: Mode::Up,
            ..Configuration::default()
        };
        let content = IndicatorContent::visible(RateSample::new(100, 200), &cfg);
        assert_eq!(render_text(&content), "↑ 200 B/s");
        assert_eq!(render_text(&IndicatorContent::blank(&cfg)), "");
    }
}
