use pii_types::Origin;
use regex::Regex;

use super::{CharOffsets, Detector, LocalSpan};
use crate::config::AddedEntity;
use crate::error::{ConfigError, DetectorError};

/// User-supplied `entity:regex` rule, origin `added`
#[derive(Debug, Clone)]
pub struct RegexDetector {
    name: String,
    entity: String,
    pattern: Regex,
}

impl RegexDetector {
    pub fn new(added: &AddedEntity) -> Result<Self, ConfigError> {
        let pattern = Regex::new(&added.pattern).map_err(|e| ConfigError::InvalidRegex {
            context: format!("--add {}", added.entity),
            message: e.to_string(),
        })?;
        Ok(Self {
            name: format!("added:{}", added.entity),
            entity: added.entity.clone(),
            pattern,
        })
    }
}

impl Detector for RegexDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn origin(&self) -> Origin {
        Origin::Added
    }

    fn detect(&self, text: &str) -> Result<Vec<LocalSpan>, DetectorError> {
        let offsets = CharOffsets::new(text);
        Ok(self
            .pattern
            .find_iter(text)
            .filter(|m| !m.is_empty())
            .map(|m| LocalSpan {
                start_offset: offsets.char_at(m.start()),
                end_offset: offsets.char_at(m.end()),
                entity_type: self.entity.clone(),
                word: m.as_str().to_string(),
                confidence: None,
            })
            .collect())
    }
}

/// Drops detections whose word matches any `--exclude` pattern
#[derive(Debug, Clone, Default)]
pub struct ExcludeFilter {
    patterns: Vec<Regex>,
}

impl ExcludeFilter {
    pub fn new(patterns: &[String]) -> Result<Self, ConfigError> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| ConfigError::InvalidRegex {
                    context: format!("--exclude {}", p),
                    message: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn is_excluded(&self, word: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(word))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn added(entity: &str, pattern: &str) -> AddedEntity {
        AddedEntity {
            entity: entity.to_string(),
            pattern: pattern.to_string(),
        }
    }

    #[test]
    fn test_added_entity_offsets_are_chars() {
        let detector = RegexDetector::new(&added("EMPLOYEE_ID", r"EMP-\d{4}")).unwrap();
        let spans = detector.detect("社員番号 EMP-0042 です").unwrap();
        assert_eq!(
            spans,
            vec![LocalSpan {
                start_offset: 5,
                end_offset: 13,
                entity_type: "EMPLOYEE_ID".to_string(),
                word: "EMP-0042".to_string(),
                confidence: None,
            }]
        );
        assert_eq!(detector.origin(), Origin::Added);
    }

    #[test]
    fn test_empty_matches_are_skipped() {
        let detector = RegexDetector::new(&added("X", r"a*")).unwrap();
        let spans = detector.detect("bab").unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].word, "a");
    }

    #[test]
    fn test_invalid_regex_is_config_error() {
        let err = RegexDetector::new(&added("X", r"(unclosed")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRegex { .. }));
        assert!(ExcludeFilter::new(&["[".to_string()]).is_err());
    }

    #[test]
    fn test_exclude_filter() {
        let filter = ExcludeFilter::new(&[r"@example\.com$".to_string()]).unwrap();
        assert!(filter.is_excluded("info@example.com"));
        assert!(!filter.is_excluded("info@example.org"));
        assert!(!ExcludeFilter::default().is_excluded("anything"));
    }
}
