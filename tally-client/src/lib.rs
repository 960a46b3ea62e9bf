#![deny(clippy::print_stdout, clippy::print_stderr)]

//! HTTP adapter for Tally's XML request/response protocol.
//!
//! Tally exposes a single HTTP endpoint that accepts an `ENVELOPE` request
//! document and returns an `ENVELOPE` response document, both XML. This
//! crate renders the two envelope shapes this system needs (voucher
//! register export, master export) and posts them with bounded retries.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

/// Tally report id used for voucher fetches. `DayBook` is deliberately not
/// offered here: it ignores `SVFROMDATE`/`SVTODATE` in Tally even though it
/// accepts the same static variables as other reports, and substituting it
/// would silently defeat client-side and server-side date filtering alike.
const VOUCHER_REGISTER_REPORT_ID: &str = "Voucher Register";

const DEFAULT_VOUCHER_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_MASTER_TIMEOUT: Duration = Duration::from_secs(300);
const MAX_ATTEMPTS: u32 = 5;
const MIN_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum TallyClientError {
    #[error("could not reach tally source: {0}")]
    SourceUnreachable(String),
    #[error("tally source returned http status {status}: {body}")]
    SourceProtocolError { status: u16, body: String },
    #[error("tally rejected the request: {0}")]
    SourceLogicalError(String),
    #[error("invalid request configuration: {0}")]
    Config(String),
}

/// The masters Tally can export in one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterKind {
    AllMasters,
    Ledgers,
    StockItems,
    Units,
    OpeningBills,
}

impl MasterKind {
    fn report_id(self) -> &'static str {
        match self {
            MasterKind::AllMasters => "List of Accounts",
            MasterKind::Ledgers => "Ledgers",
            MasterKind::StockItems => "Stock Items",
            MasterKind::Units => "Units of Measure",
            MasterKind::OpeningBills => "Bills Receivable",
        }
    }
}

#[async_trait]
pub trait TallySource: Send + Sync {
    async fn fetch_vouchers(
        &self,
        from_date: NaiveDate,
        to_date: NaiveDate,
    ) -> Result<String, TallyClientError>;

    async fn fetch_masters(&self, kind: MasterKind) -> Result<String, TallyClientError>;
}

#[derive(Debug, Clone)]
pub struct TallyClientConfig {
    pub base_url: String,
    pub company: String,
    pub voucher_timeout: Duration,
    pub master_timeout: Duration,
}

impl TallyClientConfig {
    pub fn new(base_url: impl Into<String>, company: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            company: company.into(),
            voucher_timeout: DEFAULT_VOUCHER_TIMEOUT,
            master_timeout: DEFAULT_MASTER_TIMEOUT,
        }
    }
}

#[derive(Clone)]
pub struct TallyClient {
    http: reqwest::Client,
    config: TallyClientConfig,
}

impl TallyClient {
    pub fn new(config: TallyClientConfig) -> Result<Self, TallyClientError> {
        if config.base_url.trim().is_empty() {
            return Err(TallyClientError::Config("base_url cannot be empty".into()));
        }
        if config.company.trim().is_empty() {
            return Err(TallyClientError::Config("company cannot be empty".into()));
        }
        Ok(Self {
            http: reqwest::Client::new(),
            config,
        })
    }

    /// POST a complete request envelope, validate the response envelope,
    /// and return the raw response body. Retries transport and HTTP-status
    /// failures with exponential backoff; a logical rejection (`STATUS` != 1)
    /// is never retried because the source explicitly rejected the request.
    pub async fn post(&self, envelope_xml: &str, timeout: Duration) -> Result<String, TallyClientError> {
        let mut backoff = MIN_BACKOFF;
        let mut last_err = None;

        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                tracing::debug!(attempt, backoff_ms = backoff.as_millis(), "retrying tally request");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }

            match self.send_once(envelope_xml, timeout).await {
                Ok(body) => match validate_envelope(&body) {
                    Ok(()) => return Ok(body),
                    Err(err @ TallyClientError::SourceLogicalError(_)) => return Err(err),
                    Err(err) => return Err(err),
                },
                Err(err @ TallyClientError::SourceLogicalError(_)) => return Err(err),
                Err(err) => last_err = Some(err),
            }
        }

        Err(last_err.unwrap_or_else(|| {
            TallyClientError::SourceUnreachable("exhausted retries with no recorded error".into())
        }))
    }

    async fn send_once(&self, envelope_xml: &str, timeout: Duration) -> Result<String, TallyClientError> {
        let response = self
            .http
            .post(&self.config.base_url)
            .timeout(timeout)
            .header("Content-Type", "text/xml; charset=utf-8")
            .body(envelope_xml.to_owned())
            .send()
            .await
            .map_err(|err| TallyClientError::SourceUnreachable(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| TallyClientError::SourceUnreachable(err.to_string()))?;

        if !status.is_success() {
            return Err(TallyClientError::SourceProtocolError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    fn fetch_vouchers_envelope(&self, from_date: NaiveDate, to_date: NaiveDate) -> String {
        render_voucher_envelope(from_date, to_date, &self.config.company)
    }

    fn fetch_masters_envelope(&self, kind: MasterKind) -> String {
        render_master_envelope(kind, &self.config.company)
    }
}

#[async_trait]
impl TallySource for TallyClient {
    async fn fetch_vouchers(
        &self,
        from_date: NaiveDate,
        to_date: NaiveDate,
    ) -> Result<String, TallyClientError> {
        let envelope = self.fetch_vouchers_envelope(from_date, to_date);
        self.post(&envelope, self.config.voucher_timeout).await
    }

    async fn fetch_masters(&self, kind: MasterKind) -> Result<String, TallyClientError> {
        let envelope = self.fetch_masters_envelope(kind);
        self.post(&envelope, self.config.master_timeout).await
    }
}

fn render_voucher_envelope(from_date: NaiveDate, to_date: NaiveDate, company: &str) -> String {
    render_envelope(
        VOUCHER_REGISTER_REPORT_ID,
        company,
        Some(from_date),
        Some(to_date),
    )
}

fn render_master_envelope(kind: MasterKind, company: &str) -> String {
    render_envelope(kind.report_id(), company, None, None)
}

fn render_envelope(
    report_id: &str,
    company: &str,
    from_date: Option<NaiveDate>,
    to_date: Option<NaiveDate>,
) -> String {
    let date_vars = match (from_date, to_date) {
        (Some(from), Some(to)) => format!(
            "<SVFROMDATE>{}</SVFROMDATE><SVTODATE>{}</SVTODATE>",
            format_tally_date(from),
            format_tally_date(to)
        ),
        _ => String::new(),
    };

    format!(
        "<ENVELOPE>\
<HEADER><VERSION>1</VERSION><TALLYREQUEST>Export</TALLYREQUEST><TYPE>Data</TYPE><ID>{report_id}</ID></HEADER>\
<BODY><DESC><STATICVARIABLES>\
<SVEXPORTFORMAT>$$SysName:XML</SVEXPORTFORMAT>\
<SVCURRENTCOMPANY>{company}</SVCURRENTCOMPANY>\
{date_vars}\
<EXPLODEFLAG>Yes</EXPLODEFLAG>\
</STATICVARIABLES></DESC></BODY>\
</ENVELOPE>"
    )
}

/// `DD-MMM-YYYY`, the only form Tally's static variables accept.
fn format_tally_date(date: NaiveDate) -> String {
    date.format("%d-%b-%Y").to_string()
}

/// Absent `STATUS` is treated as success (older Tally builds omit it
/// entirely on a clean export).
fn validate_envelope(response: &str) -> Result<(), TallyClientError> {
    let Some(status) = extract_tag(response, "STATUS") else {
        return Ok(());
    };
    if status.trim() == "1" {
        return Ok(());
    }
    let detail = extract_tag(response, "LINEERROR")
        .or_else(|| extract_tag(response, "ERROR"))
        .unwrap_or_else(|| "tally reported a non-1 STATUS with no error detail".into());
    Err(TallyClientError::SourceLogicalError(detail))
}

fn extract_tag(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)? + start;
    Some(xml[start..end].trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::Mock;
    use wiremock::MockServer;
    use wiremock::ResponseTemplate;
    use wiremock::matchers::method;
    use wiremock::matchers::path;

    fn sample_date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap_or_else(|| panic!("invalid sample date {y}-{m}-{d}"))
    }

    #[test]
    fn voucher_envelope_uses_voucher_register_and_dd_mmm_yyyy() {
        let envelope = render_voucher_envelope(sample_date(2025, 10, 9), sample_date(2025, 10, 11), "Acme Co");
        assert!(envelope.contains("<ID>Voucher Register</ID>"));
        assert!(envelope.contains("<SVFROMDATE>09-Oct-2025</SVFROMDATE>"));
        assert!(envelope.contains("<SVTODATE>11-Oct-2025</SVTODATE>"));
        assert!(envelope.contains("<SVCURRENTCOMPANY>Acme Co</SVCURRENTCOMPANY>"));
        assert!(envelope.contains("<EXPLODEFLAG>Yes</EXPLODEFLAG>"));
        assert!(!envelope.contains("DayBook"));
    }

    #[test]
    fn master_envelope_has_no_date_variables() {
        let envelope = render_master_envelope(MasterKind::Ledgers, "Acme Co");
        assert!(!envelope.contains("SVFROMDATE"));
        assert!(envelope.contains("<ID>Ledgers</ID>"));
    }

    #[test]
    fn validate_envelope_accepts_missing_status() {
        assert!(validate_envelope("<ENVELOPE><BODY>ok</BODY></ENVELOPE>").is_ok());
    }

    #[test]
    fn validate_envelope_accepts_status_one() {
        assert!(validate_envelope("<ENVELOPE><STATUS>1</STATUS></ENVELOPE>").is_ok());
    }

    #[test]
    fn validate_envelope_rejects_other_status() {
        let err = validate_envelope(
            "<ENVELOPE><STATUS>0</STATUS><LINEERROR>Company not found</LINEERROR></ENVELOPE>",
        )
        .expect_err("non-1 status should fail");
        match err {
            TallyClientError::SourceLogicalError(msg) => assert_eq!(msg, "Company not found"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn fetch_vouchers_posts_and_returns_body_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<ENVELOPE><STATUS>1</STATUS><BODY>vouchers here</BODY></ENVELOPE>",
            ))
            .mount(&server)
            .await;

        let client = TallyClient::new(TallyClientConfig::new(server.uri(), "Acme Co"))
            .expect("valid config");
        let body = client
            .fetch_vouchers(sample_date(2025, 10, 1), sample_date(2025, 10, 2))
            .await
            .expect("fetch should succeed");
        assert!(body.contains("vouchers here"));
    }

    #[tokio::test]
    async fn fetch_vouchers_surfaces_logical_error_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<ENVELOPE><STATUS>0</STATUS><ERROR>Bad date range</ERROR></ENVELOPE>",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let client = TallyClient::new(TallyClientConfig::new(server.uri(), "Acme Co"))
            .expect("valid config");
        let err = client
            .fetch_vouchers(sample_date(2025, 10, 1), sample_date(2025, 10, 2))
            .await
            .expect_err("logical error should propagate");
        assert!(matches!(err, TallyClientError::SourceLogicalError(_)));
    }

    #[tokio::test]
    async fn fetch_masters_retries_on_protocol_error_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<ENVELOPE><STATUS>1</STATUS><BODY>ledgers</BODY></ENVELOPE>",
            ))
            .mount(&server)
            .await;

        let client = TallyClient::new(TallyClientConfig::new(server.uri(), "Acme Co"))
            .expect("valid config");
        let body = client
            .fetch_masters(MasterKind::Ledgers)
            .await
            .expect("retry should eventually succeed");
        assert!(body.contains("ledgers"));
    }

    #[test]
    fn config_rejects_empty_company() {
        let err = TallyClient::new(TallyClientConfig::new("http://localhost", ""))
            .expect_err("empty company should be rejected");
        assert!(matches!(err, TallyClientError::Config(_)));
    }
}
