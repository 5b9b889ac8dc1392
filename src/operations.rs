/// Cookie operations: visibility filtering, sorting and export
use crate::cookie_data::Cookie;
use crate::error::ExportError;
use csv::{Terminator, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::str::FromStr;

/// Export file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Netscape,
    Csv,
    Txt,
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "netscape" => Ok(ExportFormat::Netscape),
            "csv" => Ok(ExportFormat::Csv),
            "txt" => Ok(ExportFormat::Txt),
            other => Err(format!("unknown export format '{}'", other)),
        }
    }
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Netscape | ExportFormat::Txt => "txt",
            ExportFormat::Csv => "csv",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Csv => "text/csv",
            ExportFormat::Netscape | ExportFormat::Txt => "text/plain",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    #[default]
    Name,
    Domain,
    Expires,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Which cookie kinds the user wants to see
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Visibility {
    pub http_only: bool,
    pub secure: bool,
    pub session: bool,
}

impl Default for Visibility {
    fn default() -> Self {
        Visibility {
            http_only: true,
            secure: true,
            session: true,
        }
    }
}

/// Drop cookies of kinds hidden by the visibility toggles
pub fn filter_visible(cookies: Vec<Cookie>, visibility: Visibility) -> Vec<Cookie> {
    cookies
        .into_iter()
        .filter(|c| visibility.http_only || !c.http_only)
        .filter(|c| visibility.secure || !c.secure)
        .filter(|c| visibility.session || !c.session)
        .collect()
}

/// Sort cookies by the given field, ties broken by name then path
pub fn sort_cookies(cookies: &mut [Cookie], field: SortField, direction: SortDirection) {
    cookies.sort_by(|a, b| {
        let primary = match field {
            SortField::Name => a.name.cmp(&b.name),
            SortField::Domain => a.domain.trim_start_matches('.').cmp(b.domain.trim_start_matches('.')),
            SortField::Expires => compare_expiry(a.expiration_date, b.expiration_date),
        };
        let ordering = primary
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.path.cmp(&b.path));

        match direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });
}

// Session cookies (no expiry) sort after every dated cookie
fn compare_expiry(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Render cookies in the requested export format
pub fn export_cookies(cookies: &[Cookie], format: ExportFormat) -> Result<String, ExportError> {
    let text = match format {
        ExportFormat::Json => serde_json::to_string_pretty(cookies)?,
        ExportFormat::Netscape => export_netscape(cookies),
        ExportFormat::Csv => export_csv(cookies)?,
        ExportFormat::Txt => export_txt(cookies),
    };
    Ok(text)
}

fn export_netscape(cookies: &[Cookie]) -> String {
    let mut out = String::from("# Netscape HTTP Cookie File\n");
    for cookie in cookies {
        let domain = if cookie.http_only {
            format!("#HttpOnly_{}", cookie.domain)
        } else {
            cookie.domain.clone()
        };
        let include_subdomains = if cookie.host_only { "FALSE" } else { "TRUE" };
        let secure = if cookie.secure { "TRUE" } else { "FALSE" };
        let expires = cookie.expiration_date.map(|e| e.max(0.0) as u64).unwrap_or(0);

        out.push_str(&format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\n",
            domain, include_subdomains, cookie.path, secure, expires, cookie.name, cookie.value
        ));
    }
    out
}

fn export_csv(cookies: &[Cookie]) -> Result<String, ExportError> {
    let mut writer = WriterBuilder::new()
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record([
        "name",
        "value",
        "domain",
        "path",
        "secure",
        "httpOnly",
        "sameSite",
        "expirationDate",
    ])?;
    for cookie in cookies {
        let expires = cookie
            .expiration_date
            .map(|e| e.to_string())
            .unwrap_or_default();
        writer.write_record([
            cookie.name.as_str(),
            cookie.value.as_str(),
            cookie.domain.as_str(),
            cookie.path.as_str(),
            if cookie.secure { "true" } else { "false" },
            if cookie.http_only { "true" } else { "false" },
            cookie.same_site.as_str(),
            expires.as_str(),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ExportError::Flush(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| ExportError::Flush(e.to_string()))
}

fn export_txt(cookies: &[Cookie]) -> String {
    cookies
        .iter()
        .map(|cookie| {
            let mut line = format!(
                "{}={}; Domain={}; Path={}",
                cookie.name, cookie.value, cookie.domain, cookie.path
            );
            if cookie.secure {
                line.push_str("; Secure");
            }
            if cookie.http_only {
                line.push_str("; HttpOnly");
            }
            line.push('\n');
            line
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_cookie(name: &str, domain: &str, expires: Option<f64>) -> Cookie {
        let mut cookie = Cookie::new(name, "v", domain);
        cookie.expiration_date = expires;
        cookie.session = expires.is_none();
        cookie
    }

    #[test]
    fn test_export_format_from_str() {
        assert_eq!("CSV".parse::<ExportFormat>(), Ok(ExportFormat::Csv));
        assert_eq!(" netscape ".parse::<ExportFormat>(), Ok(ExportFormat::Netscape));
        assert!("xml".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_filter_visible() {
        let mut secure = create_test_cookie("secure", "a.com", Some(10.0));
        secure.secure = true;
        let mut http_only = create_test_cookie("http", "a.com", Some(10.0));
        http_only.http_only = true;
        let session = create_test_cookie("session", "a.com", None);

        let visible = filter_visible(
            vec![secure, http_only, session],
            Visibility {
                http_only: false,
                secure: true,
                session: false,
            },
        );

        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].name, "secure");
    }

    #[test]
    fn test_sort_by_name_desc() {
        let mut cookies = vec![
            create_test_cookie("b", "a.com", None),
            create_test_cookie("c", "a.com", None),
            create_test_cookie("a", "a.com", None),
        ];

        sort_cookies(&mut cookies, SortField::Name, SortDirection::Desc);

        let names: Vec<&str> = cookies.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_sort_by_domain_ignores_leading_dot() {
        let mut cookies = vec![
            create_test_cookie("x", "zeta.com", None),
            create_test_cookie("y", ".alpha.com", None),
        ];

        sort_cookies(&mut cookies, SortField::Domain, SortDirection::Asc);

        assert_eq!(cookies[0].domain, ".alpha.com");
    }

    #[test]
    fn test_sort_by_expiry_puts_session_last() {
        let mut cookies = vec![
            create_test_cookie("session", "a.com", None),
            create_test_cookie("late", "a.com", Some(200.0)),
            create_test_cookie("early", "a.com", Some(100.0)),
        ];

        sort_cookies(&mut cookies, SortField::Expires, SortDirection::Asc);

        let names: Vec<&str> = cookies.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["early", "late", "session"]);
    }

    #[test]
    fn test_export_netscape() {
        let mut cookie = create_test_cookie("sid", ".example.com", Some(1700000000.9));
        cookie.host_only = false;
        cookie.secure = true;

        let text = export_cookies(&[cookie], ExportFormat::Netscape).unwrap();

        assert!(text.starts_with("# Netscape HTTP Cookie File\n"));
        assert!(text.contains(".example.com\tTRUE\t/\tTRUE\t1700000000\tsid\tv\n"));
    }

    #[test]
    fn test_export_netscape_marks_http_only() {
        let mut cookie = create_test_cookie("sid", "example.com", None);
        cookie.http_only = true;

        let text = export_cookies(&[cookie], ExportFormat::Netscape).unwrap();

        assert!(text.contains("#HttpOnly_example.com\tFALSE\t/\tFALSE\t0\tsid\tv"));
    }

    #[test]
    fn test_export_csv_quotes_fields() {
        let mut cookie = create_test_cookie("prefs", "a.com", None);
        cookie.value = "x,\"y\"".to_string();

        let text = export_cookies(&[cookie], ExportFormat::Csv).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "name,value,domain,path,secure,httpOnly,sameSite,expirationDate");
        assert_eq!(lines[1], "prefs,\"x,\"\"y\"\"\",a.com,/,false,false,unspecified,");
    }

    #[test]
    fn test_export_csv_keeps_embedded_newlines_in_one_field() {
        let mut cookie = create_test_cookie("note", "a.com", Some(1700000000.0));
        cookie.value = "line1\nline2".to_string();

        let text = export_cookies(&[cookie], ExportFormat::Csv).unwrap();

        assert!(text.contains("note,\"line1\nline2\",a.com,/,false,false,unspecified,1700000000\n"));
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn test_export_txt() {
        let mut cookie = create_test_cookie("a", "a.com", None);
        cookie.secure = true;

        let text = export_cookies(&[cookie], ExportFormat::Txt).unwrap();

        assert_eq!(text, "a=v; Domain=a.com; Path=/; Secure\n");
    }

    #[test]
    fn test_export_json() {
        let cookie = create_test_cookie("a", "a.com", None);

        let text = export_cookies(&[cookie], ExportFormat::Json).unwrap();
        let parsed: Vec<Cookie> = serde_json::from_str(&text).unwrap();

        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].name, "a");
    }
}
