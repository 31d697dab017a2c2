use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use serde_json::Value;
use time::OffsetDateTime;

use crate::{
    case_data::{
        CaseDataSource,
        types::{AccessSession, CaseComment, CaseRecord, parse_crm_timestamp, sort_chronologically},
    },
    config::CrmConfig,
    credentials::Credentials,
    error::{
        RcaError, auth_error, configuration_error, not_found, transient_error, truncate_body,
    },
};

const MAX_QUERY_PAGES: usize = 100;

pub struct SalesforceCaseSource {
    client: Client,
    api_version: String,
    timeout: Duration,
}

impl SalesforceCaseSource {
    pub fn new(config: &CrmConfig) -> Result<Self, RcaError> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| configuration_error(format!("failed to build crm http client: {err}")))?;

        Ok(Self {
            client,
            api_version: config.api_version.clone(),
            timeout: Duration::from_millis(config.request_timeout_ms),
        })
    }

    /// Runs one SOQL query and follows `nextRecordsUrl` until the result is `done`.
    async fn query(&self, session: &AccessSession, soql: &str) -> Result<Vec<Value>, RcaError> {
        let first = format!(
            "{}/services/data/{}/query",
            session.instance_url, self.api_version
        );
        let mut payload = self.get_json(session, &first, Some(soql)).await?;
        let mut records = Vec::new();

        for _ in 0..MAX_QUERY_PAGES {
            let Some(next_path) = append_query_page(&mut records, &payload)? else {
                return Ok(records);
            };
            tracing::debug!(
                target: "case_data",
                fetched = records.len(),
                "crm_query_next_page"
            );
            let next = format!("{}{}", session.instance_url, next_path);
            payload = self.get_json(session, &next, None).await?;
        }

        Err(malformed(format!(
            "crm query did not finish within {MAX_QUERY_PAGES} pages"
        )))
    }

    async fn get_json(
        &self,
        session: &AccessSession,
        url: &str,
        soql: Option<&str>,
    ) -> Result<Value, RcaError> {
        let mut request = self
            .client
            .get(url)
            .timeout(self.timeout)
            .bearer_auth(&session.access_token)
            .header(header::ACCEPT, "application/json");
        if let Some(soql) = soql {
            request = request.query(&[("q", soql)]);
        }
        let response = request
            .send()
            .await
            .map_err(|err| map_transport_error("crm query", &err))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_crm_status(status, &body));
        }

        response.json::<Value>().await.map_err(|err| {
            transient_error(format!("crm query body decode failed: {err}")).with_retryable(false)
        })
    }
}

#[async_trait]
impl CaseDataSource for SalesforceCaseSource {
    fn name(&self) -> &'static str {
        "salesforce"
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<AccessSession, RcaError> {
        let url = format!("{}/services/oauth2/token", credentials.instance_url);
        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("refresh_token", credentials.refresh_token.as_str()),
        ];

        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .header(header::ACCEPT, "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|err| map_transport_error("token exchange", &err))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(auth_error(format!(
                "token exchange rejected with status {}: {}",
                status.as_u16(),
                truncate_body(&body)
            ))
            .with_http_status(status.as_u16()));
        }

        let payload = response
            .json::<Value>()
            .await
            .map_err(|err| auth_error(format!("token response is not json: {err}")))?;
        parse_token_payload(&payload, &credentials.instance_url, OffsetDateTime::now_utc())
    }

    async fn fetch_case(
        &self,
        session: &AccessSession,
        ticket_id: &str,
    ) -> Result<CaseRecord, RcaError> {
        let soql = format!(
            "SELECT Id, CaseNumber, Subject, Description, Status, CreatedDate FROM Case WHERE CaseNumber = {} LIMIT 1",
            soql_quote(ticket_id.trim())
        );
        let records = self.query(session, &soql).await?;
        let record = records
            .first()
            .ok_or_else(|| not_found(format!("no case found for ticket {}", ticket_id.trim())))?;
        parse_case_record(record)
    }

    async fn fetch_comments(
        &self,
        session: &AccessSession,
        case: &CaseRecord,
    ) -> Result<Vec<CaseComment>, RcaError> {
        let soql = format!(
            "SELECT Id, CommentBody, CreatedBy.Name, CreatedDate FROM CaseComment WHERE ParentId = {} ORDER BY CreatedDate ASC",
            soql_quote(&case.id)
        );
        let records = self.query(session, &soql).await?;

        let mut comments = Vec::with_capacity(records.len());
        for record in &records {
            if let Some(comment) = parse_comment_record(record)? {
                comments.push(comment);
            }
        }
        sort_chronologically(&mut comments);
        Ok(comments)
    }

    async fn fetch_recent_cases(
        &self,
        session: &AccessSession,
        exclude_ticket_id: &str,
        limit: usize,
    ) -> Result<Vec<CaseRecord>, RcaError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let soql = format!(
            "SELECT Id, CaseNumber, Subject, Description, Status, CreatedDate FROM Case WHERE CaseNumber != {} AND Status != 'New' ORDER BY CreatedDate DESC LIMIT {limit}",
            soql_quote(exclude_ticket_id.trim())
        );
        self.query(session, &soql)
            .await?
            .iter()
            .map(parse_case_record)
            .collect()
    }
}

pub(crate) fn soql_quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{escaped}'")
}

pub(crate) fn map_crm_status(status: StatusCode, body: &str) -> RcaError {
    let code = status.as_u16();
    let detail = truncate_body(body);
    let err = match code {
        401 | 403 => auth_error(format!("crm rejected the session with status {code}")),
        404 => not_found(format!("crm resource not found (status {code})")),
        408 | 429 => transient_error(format!("crm returned status {code}")),
        500..=599 => transient_error(format!("crm returned status {code}")),
        _ => transient_error(format!("crm returned status {code}")).with_retryable(false),
    };

    let mut err = err.with_http_status(code);
    if !detail.is_empty() {
        err.message = format!("{}: {}", err.message, detail);
    }
    err
}

fn map_transport_error(operation: &str, err: &reqwest::Error) -> RcaError {
    if err.is_timeout() {
        transient_error(format!("{operation} timed out"))
    } else {
        transient_error(format!("{operation} failed: {err}"))
    }
}

pub(crate) fn parse_token_payload(
    payload: &Value,
    configured_instance_url: &str,
    now: OffsetDateTime,
) -> Result<AccessSession, RcaError> {
    let access_token = payload
        .get("access_token")
        .and_then(Value::as_str)
        .filter(|token| !token.trim().is_empty())
        .ok_or_else(|| auth_error("token response is missing access_token"))?;

    let instance_url = payload
        .get("instance_url")
        .and_then(Value::as_str)
        .filter(|url| !url.trim().is_empty())
        .unwrap_or(configured_instance_url)
        .trim_end_matches('/')
        .to_string();

    let expires_in = payload.get("expires_in").and_then(|value| {
        value
            .as_i64()
            .or_else(|| value.as_str().and_then(|raw| raw.trim().parse::<i64>().ok()))
    });
    let expires_at = match expires_in {
        None => None,
        Some(seconds) if seconds < 0 => return Err(out_of_range_expiry()),
        Some(seconds) => Some(
            now.checked_add(time::Duration::seconds(seconds))
                .ok_or_else(out_of_range_expiry)?,
        ),
    };

    Ok(AccessSession {
        access_token: access_token.to_string(),
        instance_url,
        expires_at,
    })
}

fn out_of_range_expiry() -> RcaError {
    auth_error("token response has out-of-range expires_in")
}

/// Appends one page of query results to `records` and returns the path of the next
/// page while the result is not `done`. Only same-host paths are followed, so the
/// bearer token never leaves the instance.
pub(crate) fn append_query_page(
    records: &mut Vec<Value>,
    payload: &Value,
) -> Result<Option<String>, RcaError> {
    let page = payload
        .get("records")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("crm query response is missing records".to_string()))?;
    records.extend(page.iter().cloned());

    let done = payload.get("done").and_then(Value::as_bool).unwrap_or(true);
    if done {
        return Ok(None);
    }
    match payload.get("nextRecordsUrl").and_then(Value::as_str) {
        Some(path) if path.starts_with("/services/data/") => Ok(Some(path.to_string())),
        Some(other) => Err(malformed(format!(
            "crm query returned an unexpected nextRecordsUrl: {}",
            truncate_body(other)
        ))),
        None => Err(malformed(
            "crm query is not done but has no nextRecordsUrl".to_string(),
        )),
    }
}

pub(crate) fn parse_case_record(record: &Value) -> Result<CaseRecord, RcaError> {
    let id = required_str(record, "Id", "case")?;
    let ticket_id = required_str(record, "CaseNumber", "case")?;
    let created_at = required_timestamp(record, "CreatedDate", "case")?;

    Ok(CaseRecord {
        id,
        ticket_id,
        subject: optional_str(record, "Subject"),
        description: optional_str(record, "Description"),
        status: optional_str(record, "Status"),
        created_at,
    })
}

/// Comments without a body carry nothing to analyze and are skipped.
pub(crate) fn parse_comment_record(record: &Value) -> Result<Option<CaseComment>, RcaError> {
    let body = optional_str(record, "CommentBody");
    if body.trim().is_empty() {
        return Ok(None);
    }

    let author = record
        .get("CreatedBy")
        .and_then(|created_by| created_by.get("Name"))
        .and_then(Value::as_str)
        .filter(|name| !name.trim().is_empty())
        .unwrap_or("unknown")
        .to_string();

    Ok(Some(CaseComment {
        author,
        body,
        created_at: required_timestamp(record, "CreatedDate", "case comment")?,
    }))
}

fn optional_str(record: &Value, field: &str) -> String {
    record
        .get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn required_str(record: &Value, field: &str, what: &str) -> Result<String, RcaError> {
    record
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| malformed(format!("{what} record is missing {field}")))
}

fn required_timestamp(
    record: &Value,
    field: &str,
    what: &str,
) -> Result<OffsetDateTime, RcaError> {
    let raw = record
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| malformed(format!("{what} record is missing {field}")))?;
    parse_crm_timestamp(raw)
        .ok_or_else(|| malformed(format!("{what} record has unparseable {field}: {raw}")))
}

fn malformed(message: String) -> RcaError {
    transient_error(message).with_retryable(false)
}
