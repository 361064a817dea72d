mod support;

use axum::http::StatusCode;
use serde_json::json;

use support::TestApp;

async fn provision(app: &TestApp, address: &str, owner: &str) {
    let (status, body) = app
        .request(
            "POST",
            "/direct/addresses",
            Some(json!({
                "address": address,
                "ownerId": owner,
                "ownerType": "user",
                "ownerName": "Test Owner",
                "generateCertificate": true,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "pending");

    let (status, body) = app
        .request(
            "POST",
            &format!("/direct/addresses/{address}/activate"),
            Some(json!({})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "active");
    assert!(body["certificateExpiry"].is_string());
}

#[tokio::test]
async fn send_and_receive_round_trip_with_mdn() {
    let app = TestApp::new();
    provision(&app, "dr.reed@clinic.direct.example", "owner-1").await;
    provision(&app, "records@hospital.direct.example", "owner-2").await;

    let (status, sent) = app
        .request(
            "POST",
            "/direct/send",
            Some(json!({
                "from": "dr.reed@clinic.direct.example",
                "to": ["records@hospital.direct.example"],
                "subject": "Referral",
                "body": "Please find the referral attached.",
                "requestMdn": true,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sent["success"], true, "{sent}");
    assert_eq!(sent["mdnStatus"], "pending");

    // Pull the wrapped entity off the loopback transport and feed it back
    // through the inbound endpoint.
    let deliveries = app.state.direct_transport.deliveries().await;
    assert_eq!(deliveries.len(), 1);
    let wrapped = deliveries[0].message.clone();

    let (status, received) = app
        .request_raw("POST", "/direct/receive", "application/pkcs7-mime", wrapped)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(received["signatureValid"], true);
    assert_eq!(received["mdnSent"], true);
    assert_eq!(
        received["message"]["subject"].as_str().unwrap(),
        "Referral"
    );

    // The MDN went back out through the transport.
    let deliveries = app.state.direct_transport.deliveries().await;
    assert_eq!(deliveries.len(), 2);
}

#[tokio::test]
async fn missing_recipient_certificate_blocks_the_whole_send() {
    let app = TestApp::new();
    provision(&app, "dr.reed@clinic.direct.example", "owner-1").await;

    let (status, sent) = app
        .request(
            "POST",
            "/direct/send",
            Some(json!({
                "from": "dr.reed@clinic.direct.example",
                "to": ["nobody@unknown.direct.example"],
                "subject": "Referral",
                "body": "Hello",
            })),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(sent["success"], false);
    assert!(sent["errors"][0]
        .as_str()
        .unwrap()
        .contains("nobody@unknown.direct.example"));
    // No partial delivery.
    assert!(app.state.direct_transport.deliveries().await.is_empty());
}

#[tokio::test]
async fn sending_from_an_unprovisioned_address_is_404() {
    let app = TestApp::new();
    let (status, body) = app
        .request(
            "POST",
            "/direct/send",
            Some(json!({
                "from": "ghost@clinic.direct.example",
                "to": ["records@hospital.direct.example"],
                "subject": "x",
                "body": "y",
            })),
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not-found");
}

#[tokio::test]
async fn certificate_lookup_prefers_the_local_registry() {
    let app = TestApp::new();
    provision(&app, "dr.reed@clinic.direct.example", "owner-1").await;

    let (status, lookup) = app
        .request(
            "GET",
            "/direct/certificates/dr.reed@clinic.direct.example",
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(lookup["valid"], true);
    assert_eq!(lookup["source"], "local");

    let (status, lookup) = app
        .request("GET", "/direct/certificates/ghost@nowhere.example", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(lookup["valid"], false);
}

#[tokio::test]
async fn addresses_are_listed_per_owner() {
    let app = TestApp::new();
    provision(&app, "a@clinic.direct.example", "owner-1").await;
    provision(&app, "b@clinic.direct.example", "owner-1").await;
    provision(&app, "c@clinic.direct.example", "owner-2").await;

    let (status, list) = app
        .request("GET", "/direct/addresses?owner=owner-1", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 2);

    // Private keys never leave the gateway.
    for address in list.as_array().unwrap() {
        assert!(address.get("privateKey").is_none());
    }

    let (status, _) = app.request("GET", "/direct/addresses", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn trust_validation_rejects_unanchored_certificates() {
    let app = TestApp::new();
    provision(&app, "dr.reed@clinic.direct.example", "owner-1").await;

    let (_, address) = app
        .request("GET", "/direct/addresses/dr.reed@clinic.direct.example", None)
        .await;
    let certificate = address["certificate"].as_str().unwrap();

    // No anchors configured, so nothing validates.
    let (status, verdict) = app
        .request(
            "POST",
            "/direct/trust/validate",
            Some(json!({ "certificate": certificate })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(verdict["trusted"], false);
}
