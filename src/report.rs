//! Purpose: Stable JSON schema for per-photo stitch reports on stdout.
//! Exports: `StitchReport`, `report_json`.
//! Role: One line per stitched file so batch runs can be consumed by scripts.
//! Invariants: Fields are additive-only once published.
use serde_json::{Map, Value, json};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StitchReport {
    pub src: String,
    pub dest: String,
    pub remote_name: String,
    pub format: String,
    pub polls: u32,
    pub pulls: u32,
    pub elapsed_ms: u64,
    pub time: String,
}

pub fn report_json(report: &StitchReport) -> Value {
    let mut inner = Map::new();
    inner.insert("src".to_string(), json!(report.src));
    inner.insert("dest".to_string(), json!(report.dest));
    inner.insert("remote_name".to_string(), json!(report.remote_name));
    inner.insert("format".to_string(), json!(report.format));
    inner.insert("polls".to_string(), json!(report.polls));
    inner.insert("pulls".to_string(), json!(report.pulls));
    inner.insert("elapsed_ms".to_string(), json!(report.elapsed_ms));
    inner.insert("time".to_string(), json!(report.time));

    let mut outer = Map::new();
    outer.insert("stitched".to_string(), Value::Object(inner));
    Value::Object(outer)
}

#[cfg(test)]
mod tests {
    use super::{StitchReport, report_json};

    #[test]
    fn report_json_has_required_fields() {
        let report = StitchReport {
            src: "/photos/IMG_1.jpg".to_string(),
            dest: "/panos/IMG_1.jpg".to_string(),
            remote_name: "IMG_1_stitched.jpg".to_string(),
            format: "jpeg".to_string(),
            polls: 7,
            pulls: 1,
            elapsed_ms: 9120,
            time: "2026-02-01T00:00:00Z".to_string(),
        };

        let value = report_json(&report);
        let obj = value
            .get("stitched")
            .and_then(|v| v.as_object())
            .expect("stitched object");

        assert_eq!(obj.get("src").and_then(|v| v.as_str()), Some("/photos/IMG_1.jpg"));
        assert_eq!(
            obj.get("remote_name").and_then(|v| v.as_str()),
            Some("IMG_1_stitched.jpg")
        );
        assert_eq!(obj.get("format").and_then(|v| v.as_str()), Some("jpeg"));
        assert_eq!(obj.get("polls").and_then(|v| v.as_u64()), Some(7));
        assert_eq!(obj.get("elapsed_ms").and_then(|v| v.as_u64()), Some(9120));
        assert_eq!(
            obj.get("time").and_then(|v| v.as_str()),
            Some("2026-02-01T00:00:00Z")
        );
    }
}
