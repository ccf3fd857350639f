//! Built-in pattern detector for structured PII

use lazy_static::lazy_static;
use pii_types::Origin;
use regex::Regex;

use super::{CharOffsets, Detector, LocalSpan};
use crate::error::DetectorError;

pub const BUILTIN_MODEL_ID: &str = "builtin-patterns";

lazy_static! {
    /// Checked in this order; a match that overlaps an earlier accepted
    /// match is dropped
    static ref PATTERNS: Vec<(&'static str, Regex)> = vec![
        (
            "EMAIL",
            Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(?:\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}")
                .unwrap(),
        ),
        ("URL", Regex::new(r#"https?://[^\s<>"'、。「」（）]+"#).unwrap()),
        ("CREDIT_CARD", Regex::new(r"\d(?:[ \-]?\d){12,18}").unwrap()),
        (
            "IP_ADDRESS",
            Regex::new(r"(?:(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)\.){3}(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)")
                .unwrap(),
        ),
        (
            "PHONE_NUMBER",
            Regex::new(r"(?:\+\d{1,3}[ \-]?)?(?:\(\d{1,4}\)[ \-]?|\d{2,4}[ \-])\d{2,4}[ \-]\d{3,4}")
                .unwrap(),
        ),
        ("JP_POSTAL_CODE", Regex::new(r"〒?\d{3}-\d{4}").unwrap()),
    ];
}

/// Luhn checksum over the digits of `s`, ignoring spaces and dashes
pub fn luhn_valid(s: &str) -> bool {
    let digits: Vec<u32> = s.chars().filter_map(|c| c.to_digit(10)).collect();
    if !(13..=19).contains(&digits.len()) {
        return false;
    }
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

/// A numeric match glued to more digits is part of something longer
fn isolated(text: &str, start: usize, end: usize) -> bool {
    let glued = |c: char| c.is_ascii_digit() || c == '-' || c == '.';
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    !before.is_some_and(glued) && !after.is_some_and(|c| c.is_ascii_digit() || c == '-')
}

/// Regex detector for emails, URLs, card numbers, IPs, phone numbers and
/// Japanese postal codes
#[derive(Debug, Default, Clone, Copy)]
pub struct PatternDetector;

impl PatternDetector {
    pub fn new() -> Self {
        Self
    }
}

impl Detector for PatternDetector {
    fn name(&self) -> &str {
        "patterns"
    }

    fn origin(&self) -> Origin {
        Origin::Model
    }

    fn model_id(&self) -> Option<&str> {
        Some(BUILTIN_MODEL_ID)
    }

    fn detect(&self, text: &str) -> Result<Vec<LocalSpan>, DetectorError> {
        let offsets = CharOffsets::new(text);
        let mut claimed: Vec<(usize, usize)> = Vec::new();
        let mut spans = Vec::new();

        for (entity, pattern) in PATTERNS.iter() {
            for m in pattern.find_iter(text) {
                let (start, end) = (m.start(), m.end());
                if claimed.iter().any(|&(s, e)| start < e && s < end) {
                    continue;
                }
                let numeric = *entity != "EMAIL" && *entity != "URL";
                if numeric && !isolated(text, start, end) {
                    continue;
                }
                if *entity == "CREDIT_CARD" && !luhn_valid(m.as_str()) {
                    continue;
                }
                claimed.push((start, end));
                spans.push(LocalSpan {
                    start_offset: offsets.char_at(start),
                    end_offset: offsets.char_at(end),
                    entity_type: entity.to_string(),
                    word: m.as_str().to_string(),
                    confidence: None,
                });
            }
        }

        spans.sort_by_key(|span| (span.start_offset, span.end_offset));
        Ok(spans)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entities(text: &str) -> Vec<(String, String)> {
        PatternDetector::new()
            .detect(text)
            .unwrap()
            .into_iter()
            .map(|s| (s.entity_type, s.word))
            .collect()
    }

    #[test]
    fn test_luhn() {
        assert!(luhn_valid("4111 1111 1111 1111"));
        assert!(luhn_valid("4111-1111-1111-1111"));
        assert!(!luhn_valid("4111 1111 1111 1112"));
        assert!(!luhn_valid("1234"));
    }

    #[test]
    fn test_email_with_char_offsets() {
        let spans = PatternDetector::new()
            .detect("連絡先: taro@example.co.jp まで")
            .unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].entity_type, "EMAIL");
        assert_eq!(spans[0].word, "taro@example.co.jp");
        assert_eq!(spans[0].start_offset, 5);
        assert_eq!(spans[0].end_offset, 23);
    }

    #[test]
    fn test_card_beats_phone() {
        assert_eq!(
            entities("card 4111 1111 1111 1111 end"),
            vec![("CREDIT_CARD".to_string(), "4111 1111 1111 1111".to_string())]
        );
    }

    #[test]
    fn test_invalid_card_not_reported_as_card() {
        let found = entities("4111 1111 1111 1112");
        assert!(found.iter().all(|(e, _)| e != "CREDIT_CARD"));
    }

    #[test]
    fn test_phone_and_postal() {
        assert_eq!(
            entities("電話 03-1234-5678 〒150-0002"),
            vec![
                ("PHONE_NUMBER".to_string(), "03-1234-5678".to_string()),
                ("JP_POSTAL_CODE".to_string(), "〒150-0002".to_string()),
            ]
        );
    }

    #[test]
    fn test_mobile_number_is_not_a_postal_code() {
        assert_eq!(
            entities("090-1234-5678"),
            vec![("PHONE_NUMBER".to_string(), "090-1234-5678".to_string())]
        );
    }

    #[test]
    fn test_ip_and_url() {
        assert_eq!(
            entities("see https://example.com/a?b=1 from 192.168.0.10"),
            vec![
                ("URL".to_string(), "https://example.com/a?b=1".to_string()),
                ("IP_ADDRESS".to_string(), "192.168.0.10".to_string()),
            ]
        );
    }

    #[test]
    fn test_plain_prose_has_no_detections() {
        assert!(entities("田中太郎は東京都渋谷区に住む").is_empty());
    }

    #[test]
    fn test_stamps_model_origin() {
        let detector = PatternDetector::new();
        assert_eq!(detector.origin(), Origin::Model);
        assert_eq!(detector.model_id(), Some(BUILTIN_MODEL_ID));
    }
}
