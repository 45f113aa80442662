use serde::Deserialize;
use serde_json::Value as JsonValue;

use super::{ AnalysisError, AnalysisResult, Anomaly, RiskLevel };

const MIN_SCORE: f64 = 0.0;
const MAX_SCORE: f64 = 100.0;

/// Model reply as it must appear on the wire, before bounds are checked.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct RawFindings {
    authenticity_score: f64,
    risk_level: RiskLevel,
    flags: Vec<String>,
    content_summary: String,
    detected_anomalies: Vec<Anomaly>,
    recommendations: Vec<String>,
    confidence: f64,
}

/// Validated model assessment, missing only the processing time.
#[derive(Debug, Clone, PartialEq)]
pub struct Findings {
    pub authenticity_score: u8,
    pub risk_level: RiskLevel,
    pub flags: Vec<String>,
    pub content_summary: String,
    pub detected_anomalies: Vec<Anomaly>,
    pub recommendations: Vec<String>,
    pub confidence: u8,
}

impl Findings {
    pub fn into_result(self, processing_time: u64) -> AnalysisResult {
        AnalysisResult {
            authenticity_score: self.authenticity_score,
            risk_level: self.risk_level,
            flags: self.flags,
            content_summary: self.content_summary,
            detected_anomalies: self.detected_anomalies,
            recommendations: self.recommendations,
            confidence: self.confidence,
            processing_time,
        }
    }
}

/// Byte offset of the brace closing the object that opens `s`, ignoring
/// braces inside string literals.
fn balanced_object_end(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
            }
            '{' => {
                depth += 1;
            }
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Locates the JSON object in a model reply that may wrap it in prose or code
/// fences.
///
/// Prefers the first balanced object starting at the first `{`. When the
/// braces never balance, falls back to the span from the first `{` to the
/// last `}`.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    if let Some(len) = balanced_object_end(&text[start..]) {
        return Some(&text[start..=start + len]);
    }
    let end = text.rfind('}')?;
    if end > start { Some(&text[start..=end]) } else { None }
}

fn bounded_score(field: &str, value: f64) -> Result<u8, AnalysisError> {
    if !value.is_finite() || value < MIN_SCORE || value > MAX_SCORE {
        return Err(
            AnalysisError::Schema(
                format!("{} must be between {} and {}, got {}", field, MIN_SCORE, MAX_SCORE, value)
            )
        );
    }
    Ok(value.round() as u8)
}

/// Extracts, parses and validates the assessment in a raw model reply.
pub fn parse_findings(response: &str) -> Result<Findings, AnalysisError> {
    let json = extract_json_object(response).ok_or(AnalysisError::MissingJson)?;
    let value: JsonValue = serde_json::from_str(json)?;
    let raw: RawFindings = serde_json
        ::from_value(value)
        .map_err(|e| AnalysisError::Schema(e.to_string()))?;

    Ok(Findings {
        authenticity_score: bounded_score("authenticityScore", raw.authenticity_score)?,
        risk_level: raw.risk_level,
        flags: raw.flags,
        content_summary: raw.content_summary,
        detected_anomalies: raw.detected_anomalies,
        recommendations: raw.recommendations,
        confidence: bounded_score("confidence", raw.confidence)?,
    })
}

/// Reads a leading integer the way a lenient number parser would: optional
/// whitespace and sign, then digits, ignoring anything after them.
pub fn parse_leading_integer(text: &str) -> Option<i64> {
    let trimmed = text.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let mut value: i64 = 0;
    let mut seen_digit = false;
    for b in digits.bytes().take_while(|b| b.is_ascii_digit()) {
        seen_digit = true;
        value = value.saturating_mul(10).saturating_add(i64::from(b - b'0'));
    }

    if !seen_digit {
        return None;
    }
    Some(if negative { -value } else { value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Severity;

    const VALID: &str =
        r#"{"authenticityScore":92,"riskLevel":"low","flags":[],"contentSummary":"Completion certificate","detectedAnomalies":[{"type":"font","severity":"low","description":"Mixed fonts","location":"footer"}],"recommendations":["Verify with issuer"],"confidence":88}"#;

    #[test]
    fn extracts_object_from_prose_and_fences() {
        let reply = format!("Here is my assessment:\n```json\n{}\n```\nLet me know.", VALID);
        assert_eq!(extract_json_object(&reply), Some(VALID));
    }

    #[test]
    fn ignores_trailing_braces_after_the_object() {
        let reply = format!("{} Note: scores use the {{0-100}} scale.", VALID);
        assert_eq!(extract_json_object(&reply), Some(VALID));
    }

    #[test]
    fn braces_inside_strings_do_not_close_the_object() {
        let reply = r#"{"contentSummary":"uses } and { freely","x":1} trailing"#;
        assert_eq!(extract_json_object(reply), Some(r#"{"contentSummary":"uses } and { freely","x":1}"#));
    }

    #[test]
    fn unbalanced_reply_falls_back_to_outermost_span() {
        assert_eq!(extract_json_object("{ \"a\": \"unterminated } end"), Some("{ \"a\": \"unterminated }"));
    }

    #[test]
    fn no_braces_means_no_json() {
        assert_eq!(extract_json_object("I cannot analyze this"), None);
        assert_eq!(extract_json_object("} before {"), None);
        assert!(matches!(parse_findings("I cannot analyze this"), Err(AnalysisError::MissingJson)));
    }

    #[test]
    fn parses_valid_findings() {
        let findings = parse_findings(VALID).unwrap();
        assert_eq!(findings.authenticity_score, 92);
        assert_eq!(findings.confidence, 88);
        assert_eq!(findings.risk_level, RiskLevel::Low);
        assert_eq!(findings.detected_anomalies[0].severity, Severity::Low);
        assert_eq!(findings.detected_anomalies[0].location.as_deref(), Some("footer"));
    }

    #[test]
    fn fractional_scores_are_rounded_within_bounds() {
        let reply = VALID.replace("\"authenticityScore\":92", "\"authenticityScore\":87.6");
        assert_eq!(parse_findings(&reply).unwrap().authenticity_score, 88);
    }

    #[test]
    fn out_of_range_scores_are_rejected() {
        let reply = VALID.replace("\"confidence\":88", "\"confidence\":101");
        let err = parse_findings(&reply).unwrap_err();
        assert!(matches!(err, AnalysisError::Schema(_)));
        assert!(err.to_string().contains("confidence"));

        let reply = VALID.replace("\"authenticityScore\":92", "\"authenticityScore\":-1");
        assert!(matches!(parse_findings(&reply), Err(AnalysisError::Schema(_))));
    }

    #[test]
    fn unknown_enum_values_are_rejected() {
        let reply = VALID.replace("\"riskLevel\":\"low\"", "\"riskLevel\":\"severe\"");
        assert!(matches!(parse_findings(&reply), Err(AnalysisError::Schema(_))));

        let reply = VALID.replace("\"severity\":\"low\"", "\"severity\":\"critical\"");
        assert!(matches!(parse_findings(&reply), Err(AnalysisError::Schema(_))));
    }

    #[test]
    fn missing_fields_are_rejected() {
        let reply = r#"{"authenticityScore":50,"riskLevel":"medium"}"#;
        assert!(matches!(parse_findings(reply), Err(AnalysisError::Schema(_))));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(parse_findings("{ authenticityScore: 9 }"), Err(AnalysisError::InvalidJson(_))));
    }

    #[test]
    fn leading_integer_parsing() {
        assert_eq!(parse_leading_integer("87"), Some(87));
        assert_eq!(parse_leading_integer("  73\n"), Some(73));
        assert_eq!(parse_leading_integer("64/100"), Some(64));
        assert_eq!(parse_leading_integer("87.9"), Some(87));
        assert_eq!(parse_leading_integer("-12"), Some(-12));
        assert_eq!(parse_leading_integer("+5"), Some(5));
        assert_eq!(parse_leading_integer("Score: 80"), None);
        assert_eq!(parse_leading_integer(""), None);
        assert_eq!(parse_leading_integer("-"), None);
        assert_eq!(parse_leading_integer("99999999999999999999999"), Some(i64::MAX));
    }
}
