/// Data structures for browser cookies
use crate::domain;
use crate::error::DispatchError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

fn root_path() -> String {
    "/".to_string()
}

fn unspecified() -> String {
    "unspecified".to_string()
}

/// A cookie as reported by the browser's cookie store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "root_path")]
    pub path: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default = "unspecified")]
    pub same_site: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<f64>,
    #[serde(default)]
    pub session: bool,
    #[serde(default)]
    pub host_only: bool,
}

impl Cookie {
    pub fn new(name: &str, value: &str, domain: &str) -> Cookie {
        Cookie {
            name: name.to_string(),
            value: value.to_string(),
            domain: domain.to_string(),
            path: root_path(),
            secure: false,
            http_only: false,
            same_site: unspecified(),
            expiration_date: None,
            session: true,
            host_only: !domain.starts_with('.'),
        }
    }

    /// URL the cookie API uses to address this cookie
    pub fn url(&self) -> String {
        domain::cookie_url(&self.domain, &self.path, self.secure)
    }
}

/// Arguments for creating or overwriting a cookie
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CookieDetails {
    pub url: String,
    pub name: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_only: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<f64>,
}

impl CookieDetails {
    /// Build from a sanitized SET_COOKIE payload.
    ///
    /// The target URL is derived from domain, path and secure flag when the
    /// payload does not carry one.
    pub fn from_payload(payload: &Map<String, Value>) -> Result<CookieDetails, DispatchError> {
        let text = |field: &str| payload.get(field).and_then(Value::as_str).map(str::to_string);
        let flag = |field: &str| payload.get(field).and_then(Value::as_bool);

        let name = text("name").unwrap_or_default();
        if name.is_empty() {
            return Err(DispatchError::InvalidValue {
                field: "name".to_string(),
                reason: "must not be empty".to_string(),
            });
        }

        let domain = text("domain").unwrap_or_default();
        let path = text("path").filter(|p| !p.is_empty());
        let secure = flag("secure");

        let url = match text("url").filter(|u| !u.is_empty()) {
            Some(url) => url,
            None => domain::cookie_url(
                &domain,
                path.as_deref().unwrap_or("/"),
                secure.unwrap_or(false),
            ),
        };
        if domain::host_from_url(&url).is_none() {
            return Err(DispatchError::InvalidUrl(url));
        }

        let same_site = text("sameSite").map(|s| normalize_same_site(&s)).transpose()?;

        Ok(CookieDetails {
            url,
            name,
            value: text("value").unwrap_or_default(),
            domain: Some(domain).filter(|d| !d.is_empty()),
            path,
            secure,
            http_only: flag("httpOnly"),
            same_site,
            expiration_date: payload.get("expirationDate").and_then(Value::as_f64),
        })
    }

    /// Domain the cookie will land on, for protection checks
    pub fn target_domain(&self) -> String {
        match &self.domain {
            Some(domain) => domain.clone(),
            None => domain::host_from_url(&self.url).unwrap_or_default(),
        }
    }
}

/// Map user-facing SameSite spellings onto the cookie API's values
pub fn normalize_same_site(raw: &str) -> Result<String, DispatchError> {
    let value = match raw.trim().to_lowercase().as_str() {
        "lax" => "lax",
        "strict" => "strict",
        "none" | "no_restriction" => "no_restriction",
        "" | "unspecified" => "unspecified",
        other => {
            return Err(DispatchError::InvalidValue {
                field: "sameSite".to_string(),
                reason: format!("unknown value '{}'", other),
            });
        }
    };
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("payload must be an object"),
        }
    }

    #[test]
    fn test_cookie_deserializes_browser_shape() {
        let raw = json!({
            "name": "sid",
            "value": "abc",
            "domain": ".example.com",
            "path": "/",
            "secure": true,
            "httpOnly": true,
            "sameSite": "lax",
            "expirationDate": 1700000000.5,
            "session": false,
            "hostOnly": false,
            "storeId": "0"
        });

        let cookie: Cookie = serde_json::from_value(raw).unwrap();

        assert_eq!(cookie.name, "sid");
        assert!(cookie.http_only);
        assert_eq!(cookie.expiration_date, Some(1700000000.5));
        assert_eq!(cookie.url(), "https://example.com/");
    }

    #[test]
    fn test_cookie_defaults_missing_fields() {
        let cookie: Cookie =
            serde_json::from_value(json!({"name": "a", "value": "b", "domain": "x.com"})).unwrap();

        assert_eq!(cookie.path, "/");
        assert_eq!(cookie.same_site, "unspecified");
        assert_eq!(cookie.expiration_date, None);
    }

    #[test]
    fn test_details_derive_url() {
        let details = CookieDetails::from_payload(&payload(json!({
            "name": "a",
            "value": "b",
            "domain": ".example.com",
            "path": "/app",
            "secure": true,
            "sameSite": "None"
        })))
        .unwrap();

        assert_eq!(details.url, "https://example.com/app");
        assert_eq!(details.same_site.as_deref(), Some("no_restriction"));
        assert_eq!(details.target_domain(), ".example.com");
    }

    #[test]
    fn test_details_reject_empty_name() {
        let result = CookieDetails::from_payload(&payload(json!({
            "name": "",
            "value": "b",
            "domain": "example.com"
        })));

        assert!(matches!(result, Err(DispatchError::InvalidValue { .. })));
    }

    #[test]
    fn test_details_reject_bad_same_site() {
        let result = CookieDetails::from_payload(&payload(json!({
            "name": "a",
            "value": "b",
            "domain": "example.com",
            "sameSite": "sometimes"
        })));

        assert!(result.is_err());
    }

    #[test]
    fn test_details_serialize_skips_unset() {
        let details = CookieDetails {
            url: "https://a.com/".to_string(),
            name: "n".to_string(),
            value: "v".to_string(),
            domain: None,
            path: None,
            secure: Some(true),
            http_only: None,
            same_site: None,
            expiration_date: None,
        };

        let value = serde_json::to_value(&details).unwrap();

        assert_eq!(value, json!({"url": "https://a.com/", "name": "n", "value": "v", "secure": true}));
    }
}
