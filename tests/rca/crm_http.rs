use std::sync::Arc;

use debug_genie::{
    Orchestrator, RcaErrorKind,
    analysis::FixtureReasoningBackend,
    case_data::{AccessSession, CaseDataSource, SalesforceCaseSource},
    config::{AnalysisConfig, CrmConfig},
    credentials::{
        Credentials, OPENAI_API_KEY, SF_CLIENT_ID, SF_CLIENT_SECRET, SF_INSTANCE_URL,
        SF_REFRESH_TOKEN, StaticCredentialSource,
    },
};
use serde_json::json;
use wiremock::{
    Match, Mock, MockServer, Request, ResponseTemplate,
    matchers::{body_string_contains, header, method, path},
};

const QUERY_PATH: &str = "/services/data/v59.0/query";
const TOKEN_PATH: &str = "/services/oauth2/token";

/// Matches a query request whose SOQL text contains the given fragment.
struct Soql(&'static str);

impl Match for Soql {
    fn matches(&self, request: &Request) -> bool {
        request
            .url
            .query_pairs()
            .any(|(key, value)| key == "q" && value.contains(self.0))
    }
}

fn live_credentials(server: &MockServer) -> Credentials {
    Credentials::from_source(
        &StaticCredentialSource::new()
            .with(OPENAI_API_KEY, "sk-test")
            .with(SF_CLIENT_ID, "client-id")
            .with(SF_CLIENT_SECRET, "client-secret")
            .with(SF_REFRESH_TOKEN, "refresh-token")
            .with(SF_INSTANCE_URL, server.uri()),
    )
    .expect("live credentials")
}

fn session_for(server: &MockServer) -> AccessSession {
    AccessSession {
        access_token: "tok-live".to_string(),
        instance_url: server.uri(),
        expires_at: None,
    }
}

fn source() -> SalesforceCaseSource {
    SalesforceCaseSource::new(&CrmConfig::default()).expect("crm client builds")
}

fn case_json() -> serde_json::Value {
    json!({
        "Id": "5003000000D8cuI",
        "CaseNumber": "00012345",
        "Subject": "Payment timeout",
        "Description": "Checkout fails for EU users",
        "Status": "Escalated",
        "CreatedDate": "2026-02-16T09:45:00.000+0000"
    })
}

fn comment_json(body: &str, created: &str) -> serde_json::Value {
    json!({
        "CommentBody": body,
        "CreatedBy": {"Name": "l2-support"},
        "CreatedDate": created
    })
}

#[tokio::test]
async fn given_token_endpoint_rejects_when_authenticating_then_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "expired access/refresh token"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = source()
        .authenticate(&live_credentials(&server))
        .await
        .expect_err("rejected grant must fail");

    assert_eq!(err.kind, RcaErrorKind::Auth);
    assert_eq!(err.http_status, Some(400));
    assert!(err.message.contains("invalid_grant"));
}

#[tokio::test]
async fn given_token_body_is_not_json_when_authenticating_then_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let err = source()
        .authenticate(&live_credentials(&server))
        .await
        .expect_err("html body must fail");
    assert_eq!(err.kind, RcaErrorKind::Auth);
}

#[tokio::test]
async fn given_no_matching_case_when_fetching_then_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(QUERY_PATH))
        .and(header("authorization", "Bearer tok-live"))
        .and(Soql("WHERE CaseNumber = 'NOPE'"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "totalSize": 0, "done": true, "records": []
        })))
        .mount(&server)
        .await;

    let err = source()
        .fetch_case(&session_for(&server), "NOPE")
        .await
        .expect_err("unknown ticket must fail");
    assert_eq!(err.kind, RcaErrorKind::NotFound);
}

#[tokio::test]
async fn given_session_rejected_when_querying_then_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(QUERY_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!([
            {"message": "Session expired or invalid", "errorCode": "INVALID_SESSION_ID"}
        ])))
        .mount(&server)
        .await;

    let err = source()
        .fetch_case(&session_for(&server), "00012345")
        .await
        .expect_err("expired session must fail");
    assert_eq!(err.kind, RcaErrorKind::Auth);
    assert_eq!(err.http_status, Some(401));
}

#[tokio::test]
async fn given_comments_span_two_pages_when_fetching_then_all_are_returned_in_order() {
    let server = MockServer::start().await;
    let next_path = "/services/data/v59.0/query/01gD0000002HU6KIAW-2000";
    Mock::given(method("GET"))
        .and(path(QUERY_PATH))
        .and(Soql("FROM CaseComment"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "totalSize": 3,
            "done": false,
            "nextRecordsUrl": next_path,
            "records": [
                comment_json("first", "2026-02-16T10:00:00.000+0000"),
                comment_json("second", "2026-02-16T10:05:00.000+0000")
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(next_path))
        .and(header("authorization", "Bearer tok-live"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "totalSize": 3,
            "done": true,
            "records": [comment_json("third", "2026-02-16T10:10:00.000+0000")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let case = debug_genie::case_data::CaseRecord {
        id: "5003000000D8cuI".to_string(),
        ticket_id: "00012345".to_string(),
        subject: String::new(),
        description: String::new(),
        status: String::new(),
        created_at: time::macros::datetime!(2026-02-16 09:45 UTC),
    };
    let comments = source()
        .fetch_comments(&session_for(&server), &case)
        .await
        .expect("both pages");

    let bodies = comments
        .iter()
        .map(|comment| comment.body.as_str())
        .collect::<Vec<_>>();
    assert_eq!(bodies, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn given_expired_session_on_live_crm_when_run_then_one_reauth_recovers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok-live",
            "token_type": "Bearer"
        })))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(QUERY_PATH))
        .and(Soql("WHERE CaseNumber = '00012345'"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!([
            {"errorCode": "INVALID_SESSION_ID"}
        ])))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(QUERY_PATH))
        .and(Soql("WHERE CaseNumber = '00012345'"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "done": true, "records": [case_json()]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(QUERY_PATH))
        .and(Soql("FROM CaseComment"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "done": true,
            "records": [comment_json("504 Gateway Timeout on checkout", "2026-02-16T10:00:00.000+0000")]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(QUERY_PATH))
        .and(Soql("Status != 'New'"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "done": true, "records": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    let orchestrator = Orchestrator::new(
        Arc::new(live_credentials(&server)),
        Arc::new(source()),
        Arc::new(FixtureReasoningBackend::default()),
        &AnalysisConfig::default(),
    )
    .expect("orchestrator builds");

    let report = orchestrator
        .run_rca("00012345")
        .await
        .expect("re-auth recovers");
    assert!(!report.impacted_services.is_empty());
}
