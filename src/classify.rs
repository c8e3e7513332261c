//! AQI severity bands.
//!
//! Band boundaries follow the US EPA scale: each band covers AQI values up to and
//! including its upper bound, and anything above 300 is Hazardous.

use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SeverityBand {
    Good,
    Moderate,
    UnhealthySensitive,
    Unhealthy,
    VeryUnhealthy,
    Hazardous,
}

impl SeverityBand {
    /// All bands, least to most severe.
    pub const ALL: [SeverityBand; 6] = [
        SeverityBand::Good,
        SeverityBand::Moderate,
        SeverityBand::UnhealthySensitive,
        SeverityBand::Unhealthy,
        SeverityBand::VeryUnhealthy,
        SeverityBand::Hazardous,
    ];

    /// Tick labels drawn under the scale bar, one more than there are bands.
    pub const SCALE_TICKS: [&'static str; 7] = ["0", "50", "100", "150", "200", "300", "301+"];

    /// Inclusive upper AQI bound; `None` for the open-ended top band.
    pub fn upper_bound(self) -> Option<i64> {
        match self {
            SeverityBand::Good => Some(50),
            SeverityBand::Moderate => Some(100),
            SeverityBand::UnhealthySensitive => Some(150),
            SeverityBand::Unhealthy => Some(200),
            SeverityBand::VeryUnhealthy => Some(300),
            SeverityBand::Hazardous => None,
        }
    }

    /// Status text shown next to the current reading.
    pub fn label(self) -> &'static str {
        match self {
            SeverityBand::Good => "Good",
            SeverityBand::Moderate => "Moderate",
            SeverityBand::UnhealthySensitive => "Unhealthy (Sens.)",
            SeverityBand::Unhealthy => "Unhealthy",
            SeverityBand::VeryUnhealthy => "Very Unhealthy",
            SeverityBand::Hazardous => "Hazardous",
        }
    }

    /// Short segment name used on the scale bar.
    pub fn scale_label(self) -> &'static str {
        match self {
            SeverityBand::Good => "Good",
            SeverityBand::Moderate => "Moderate",
            SeverityBand::UnhealthySensitive => "Poor",
            SeverityBand::Unhealthy => "Unhealthy",
            SeverityBand::VeryUnhealthy => "Severe",
            SeverityBand::Hazardous => "Hazardous",
        }
    }

    /// Display color as a `#rrggbb` hex string.
    pub fn color(self) -> &'static str {
        match self {
            SeverityBand::Good => "#00e400",
            SeverityBand::Moderate => "#ffff00",
            SeverityBand::UnhealthySensitive => "#ff7e00",
            SeverityBand::Unhealthy => "#ff0000",
            SeverityBand::VeryUnhealthy => "#8f3f97",
            SeverityBand::Hazardous => "#7e0023",
        }
    }

    /// Color as an `(r, g, b)` triple.
    pub fn rgb(self) -> (u8, u8, u8) {
        let hex = &self.color()[1..];
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).unwrap_or(0);
        (channel(0), channel(2), channel(4))
    }

    /// Whether text drawn on this band's color should be dark.
    pub fn needs_dark_text(self) -> bool {
        matches!(self, SeverityBand::Moderate)
    }
}

/// Map an AQI value to its band. Negative input saturates to [`SeverityBand::Good`].
pub fn classify(aqi: i64) -> SeverityBand {
    SeverityBand::ALL
        .into_iter()
        .find(|band| band.upper_bound().is_none_or(|max| aqi <= max))
        .unwrap_or(SeverityBand::Hazardous)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_values() {
        assert_eq!(classify(0), SeverityBand::Good);
        assert_eq!(classify(50), SeverityBand::Good);
        assert_eq!(classify(51), SeverityBand::Moderate);
        assert_eq!(classify(100), SeverityBand::Moderate);
        assert_eq!(classify(101), SeverityBand::UnhealthySensitive);
        assert_eq!(classify(150), SeverityBand::UnhealthySensitive);
        assert_eq!(classify(151), SeverityBand::Unhealthy);
        assert_eq!(classify(200), SeverityBand::Unhealthy);
        assert_eq!(classify(201), SeverityBand::VeryUnhealthy);
        assert_eq!(classify(300), SeverityBand::VeryUnhealthy);
        assert_eq!(classify(301), SeverityBand::Hazardous);
    }

    #[test]
    fn negative_and_huge_values_are_total() {
        assert_eq!(classify(-1), SeverityBand::Good);
        assert_eq!(classify(i64::MIN), SeverityBand::Good);
        assert_eq!(classify(5_000), SeverityBand::Hazardous);
        assert_eq!(classify(i64::MAX), SeverityBand::Hazardous);
    }

    #[test]
    fn classification_is_monotonic() {
        let mut previous = classify(-10);
        for aqi in -10..=1_000 {
            let band = classify(aqi);
            assert!(band >= previous, "aqi {aqi} mapped to {band:?} after {previous:?}");
            previous = band;
        }
    }

    #[test]
    fn colors_and_labels() {
        assert_eq!(SeverityBand::Good.color(), "#00e400");
        assert_eq!(SeverityBand::Hazardous.rgb(), (0x7e, 0x00, 0x23));
        assert_eq!(SeverityBand::VeryUnhealthy.scale_label(), "Severe");
        assert!(SeverityBand::Moderate.needs_dark_text());
        assert!(!SeverityBand::Unhealthy.needs_dark_text());
        assert_eq!(SeverityBand::SCALE_TICKS.len(), SeverityBand::ALL.len() + 1);
    }
}
