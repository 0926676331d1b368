//! Test fixtures shared by the API, query and mutation tests

use serde_json::{json, Value};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A user as the API serializes it
pub(crate) fn user_json() -> Value {
    json!({
        "id": "u1",
        "email": "alice@example.com",
        "name": "Alice",
        "role": "STAFF",
        "createdAt": "2024-01-01T00:00:00Z"
    })
}

/// Answer `method route` with `status` and a raw body, exactly `times` times
///
/// The expectation is checked when the server is dropped.
pub(crate) async fn respond(
    server: &MockServer,
    http_method: &str,
    route: &str,
    status: u16,
    body: &str,
    times: u64,
) {
    Mock::given(wiremock::matchers::method(http_method))
        .and(wiremock::matchers::path(route))
        .respond_with(
            ResponseTemplate::new(status).set_body_raw(body.to_string(), "application/json"),
        )
        .expect(times)
        .mount(server)
        .await;
}
