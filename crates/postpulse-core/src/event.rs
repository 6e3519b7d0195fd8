use serde::{Deserialize, Serialize};

use crate::content::page_type_for_path;
use crate::error::CoreError;

/// The payload the site sends to POST /api/views.
///
/// `page_type` is optional on the wire; when absent it is derived from the
/// path with [`page_type_for_path`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ViewPayload {
    pub path: String,
    pub page_type: Option<String>,
    pub session_id: String,
}

impl ViewPayload {
    pub fn into_input(self) -> Result<PageViewInput, CoreError> {
        let page_type = match self.page_type {
            Some(t) if !t.trim().is_empty() => t,
            _ => page_type_for_path(&self.path).to_string(),
        };
        let input = PageViewInput {
            path: self.path,
            page_type,
            session_id: self.session_id,
        };
        input.validate()?;
        Ok(input)
    }
}

/// The payload the site sends to POST /api/heartbeat.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeartbeatPayload {
    pub session_id: String,
    pub current_path: String,
    pub city: Option<String>,
    pub country: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl HeartbeatPayload {
    pub fn into_input(self) -> Result<HeartbeatInput, CoreError> {
        let input = HeartbeatInput {
            session_id: self.session_id,
            current_path: self.current_path,
            geo: Geo {
                city: self.city,
                country: self.country,
                latitude: self.latitude,
                longitude: self.longitude,
            },
        };
        input.validate()?;
        Ok(input)
    }
}

/// A validated page-view request.
#[derive(Debug, Clone, PartialEq)]
pub struct PageViewInput {
    pub path: String,
    pub page_type: String,
    pub session_id: String,
}

impl PageViewInput {
    pub fn new(path: &str, page_type: &str, session_id: &str) -> Self {
        Self {
            path: path.to_string(),
            page_type: page_type.to_string(),
            session_id: session_id.to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        non_empty("session_id", &self.session_id)?;
        non_empty("path", &self.path)
    }
}

/// One stored row of the raw event log. Never updated, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageViewEvent {
    /// UUID v4; the identity the aggregate counters deduplicate on.
    pub id: String,
    pub path: String,
    pub page_type: String,
    pub session_id: String,
    /// Unix milliseconds.
    pub timestamp: i64,
}

/// Optional visitor location attached to a heartbeat.
///
/// Each field is patched independently: `None` means "leave the stored value
/// alone", never "clear it".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Geo {
    pub city: Option<String>,
    pub country: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Geo {
    pub fn is_empty(&self) -> bool {
        self.city.is_none()
            && self.country.is_none()
            && self.latitude.is_none()
            && self.longitude.is_none()
    }
}

/// A validated heartbeat request.
#[derive(Debug, Clone, PartialEq)]
pub struct HeartbeatInput {
    pub session_id: String,
    pub current_path: String,
    pub geo: Geo,
}

impl HeartbeatInput {
    pub fn new(session_id: &str, current_path: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            current_path: current_path.to_string(),
            geo: Geo::default(),
        }
    }

    pub fn with_geo(mut self, geo: Geo) -> Self {
        self.geo = geo;
        self
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        non_empty("session_id", &self.session_id)?;
        non_empty("current_path", &self.current_path)?;
        if let Some(lat) = self.geo.latitude {
            if !(-90.0..=90.0).contains(&lat) {
                return Err(CoreError::OutOfRange {
                    field: "latitude",
                    value: lat,
                });
            }
        }
        if let Some(lon) = self.geo.longitude {
            if !(-180.0..=180.0).contains(&lon) {
                return Err(CoreError::OutOfRange {
                    field: "longitude",
                    value: lon,
                });
            }
        }
        Ok(())
    }
}

/// Presence record, one per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveSession {
    pub session_id: String,
    pub current_path: String,
    /// Unix milliseconds of the last applied heartbeat.
    pub last_seen: i64,
    pub city: Option<String>,
    pub country: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Event written; `new_visitor` is true for the session's first event ever.
    Recorded { new_visitor: bool },
    /// Same session viewed the same path inside the dedup window.
    Deduplicated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    Created,
    Updated,
    /// Inside the heartbeat window; nothing written.
    Skipped,
}

fn non_empty(field: &'static str, value: &str) -> Result<(), CoreError> {
    if value.trim().is_empty() {
        Err(CoreError::EmptyField { field })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_payload_derives_missing_page_type() {
        let payload: ViewPayload =
            serde_json::from_str(r#"{"path":"/","session_id":"s1"}"#).expect("parse");
        let input = payload.into_input().expect("valid");
        assert_eq!(input.page_type, "home");
    }

    #[test]
    fn view_payload_keeps_explicit_page_type() {
        let payload: ViewPayload =
            serde_json::from_str(r#"{"path":"/hello","page_type":"blog","session_id":"s1"}"#)
                .expect("parse");
        assert_eq!(payload.into_input().expect("valid").page_type, "blog");
    }

    #[test]
    fn view_payload_rejects_unknown_fields() {
        let parsed: Result<ViewPayload, _> =
            serde_json::from_str(r#"{"path":"/","session_id":"s1","referrer":"x"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn empty_session_id_is_rejected() {
        let err = PageViewInput::new("/a", "page", "  ").validate().expect_err("blank id");
        assert_eq!(err.field(), Some("session_id"));
    }

    #[test]
    fn heartbeat_latitude_out_of_range_is_rejected() {
        let input = HeartbeatInput::new("s1", "/").with_geo(Geo {
            latitude: Some(91.0),
            longitude: Some(0.0),
            ..Geo::default()
        });
        assert_eq!(
            input.validate(),
            Err(CoreError::OutOfRange {
                field: "latitude",
                value: 91.0
            })
        );
    }

    #[test]
    fn geo_is_empty_only_without_any_field() {
        assert!(Geo::default().is_empty());
        let geo = Geo {
            country: Some("US".to_string()),
            ..Geo::default()
        };
        assert!(!geo.is_empty());
    }
}
