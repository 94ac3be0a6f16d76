use crate::config::ChannelConfig;
use serde::{Deserialize, Serialize};

use super::{ECG_HEADER, TIMESTAMP_STRING};

/// Prefix marking a contact-quality column ("QAF3" is the quality of "AF3")
pub const QUALITY_PREFIX: &str = "Q";

/// Logical channel kind of a column or channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Eeg,
    Gyro,
    Ecg,
    Eog,
    Quality,
    /// Independent-component source appended after a decomposition
    Source,
    Other,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Eeg => "eeg",
            ChannelKind::Gyro => "gyro",
            ChannelKind::Ecg => "ecg",
            ChannelKind::Eog => "eog",
            ChannelKind::Quality => "quality",
            ChannelKind::Source => "source",
            ChannelKind::Other => "other",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify every column of a header.
///
/// Priority order:
/// 1. Configured EEG field → Eeg
/// 2. Configured gyro field → Gyro
/// 3. "ECG" → Ecg
/// 4. "Q" + an EEG column present in the same header → Quality
/// 5. Everything else (including "Timestamp") → Other
///
/// Matching is exact and case-sensitive, like the configured field lists.
pub fn classify_header(header: &[String], config: &ChannelConfig) -> Vec<ChannelKind> {
    header
        .iter()
        .map(|name| classify_column(name, header, config))
        .collect()
}

fn classify_column(name: &str, header: &[String], config: &ChannelConfig) -> ChannelKind {
    if name == TIMESTAMP_STRING {
        return ChannelKind::Other;
    }
    if config.is_eeg_field(name) {
        return ChannelKind::Eeg;
    }
    if config.is_gyro_field(name) {
        return ChannelKind::Gyro;
    }
    if name == ECG_HEADER {
        return ChannelKind::Ecg;
    }
    if let Some(base) = name.strip_prefix(QUALITY_PREFIX) {
        if config.is_eeg_field(base) && header.iter().any(|h| h == base) {
            return ChannelKind::Quality;
        }
    }
    ChannelKind::Other
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_classify_emotiv_header() {
        let config = ChannelConfig::default();
        let h = header(&["Timestamp", "X", "Y", "AF3", "F3", "QAF3", "ECG", "Marker"]);
        let kinds = classify_header(&h, &config);
        assert_eq!(
            kinds,
            vec![
                ChannelKind::Other,
                ChannelKind::Gyro,
                ChannelKind::Gyro,
                ChannelKind::Eeg,
                ChannelKind::Eeg,
                ChannelKind::Quality,
                ChannelKind::Ecg,
                ChannelKind::Other,
            ]
        );
    }

    #[test]
    fn test_quality_requires_eeg_column() {
        let config = ChannelConfig::default();
        // QF7 without an F7 column is not a quality channel
        let kinds = classify_header(&header(&["AF3", "QF7"]), &config);
        assert_eq!(kinds, vec![ChannelKind::Eeg, ChannelKind::Other]);
    }

    #[test]
    fn test_case_sensitive() {
        let config = ChannelConfig::default();
        let kinds = classify_header(&header(&["af3", "x", "ecg"]), &config);
        assert!(kinds.iter().all(|k| *k == ChannelKind::Other));
    }

    #[test]
    fn test_custom_fields() {
        let config = ChannelConfig {
            eeg_fields: vec!["Fp1".to_string()],
            gyro_fields: vec!["GyroZ".to_string()],
            ..Default::default()
        };
        let kinds = classify_header(&header(&["Fp1", "GyroZ", "AF3"]), &config);
        assert_eq!(
            kinds,
            vec![ChannelKind::Eeg, ChannelKind::Gyro, ChannelKind::Other]
        );
    }
}
