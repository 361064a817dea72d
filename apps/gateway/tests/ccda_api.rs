mod support;

use axum::http::StatusCode;
use serde_json::json;

use support::TestApp;

fn generate_request() -> serde_json::Value {
    json!({
        "documentType": "ccd",
        "patientId": "PT-1001",
        "patient": {
            "firstName": "Jane",
            "lastName": "Doe",
            "dob": "1980-04-02",
            "gender": "F",
            "address": {
                "street": "100 Main St",
                "city": "Springfield",
                "state": "IL",
                "zip": "62701",
                "country": "US",
            },
            "phone": "555-0100",
        },
        "author": {
            "name": "Dr. Alice Reed",
            "organization": "Springfield Clinic",
            "npi": "1234567890",
        },
        "sections": [
            {
                "code": "11450-4",
                "title": "Problem List",
                "entries": [
                    { "code": "44054006", "display": "Diabetes mellitus type 2" },
                ],
            },
            {
                "code": "10160-0",
                "title": "Medications",
                "entries": [],
            },
        ],
    })
}

#[tokio::test]
async fn generate_store_query_and_retrieve() {
    let app = TestApp::new();

    let (status, stored) = app
        .request("POST", "/ccda/generate", Some(generate_request()))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(stored["patientId"], "PT-1001");
    assert_eq!(stored["documentType"], "ccd");
    assert_eq!(stored["exchangeStatus"], "local");
    let document_id = stored["documentId"].as_str().unwrap().to_string();

    let (status, fetched) = app
        .request("GET", &format!("/ccda/{document_id}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["documentId"], document_id.as_str());

    let (status, results) = app
        .request("GET", "/ccda/query?patientId=PT-1001", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(results.as_array().unwrap().len(), 1);

    let (status, empty) = app
        .request("GET", "/ccda/query?patientId=PT-9999", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(empty.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn generated_document_parses_back_with_sections() {
    let app = TestApp::new();
    let (_, stored) = app
        .request("POST", "/ccda/generate", Some(generate_request()))
        .await;
    let xml = stored["rawXml"].as_str().unwrap().to_string();

    let (status, parsed) = app
        .request_raw("POST", "/ccda/parse", "application/xml", xml)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parsed["documentType"], "ccd");
    assert_eq!(parsed["patientId"], "PT-1001");
    assert_eq!(parsed["sections"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn to_fhir_yields_a_document_bundle() {
    let app = TestApp::new();
    let (_, stored) = app
        .request("POST", "/ccda/generate", Some(generate_request()))
        .await;
    let xml = stored["rawXml"].as_str().unwrap().to_string();

    let (status, bundle) = app
        .request_raw("POST", "/ccda/to-fhir", "application/xml", xml)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bundle["resourceType"], "Bundle");
    assert_eq!(bundle["entry"][0]["resource"]["resourceType"], "Patient");
}

#[tokio::test]
async fn store_records_the_source_organization() {
    let app = TestApp::new();
    let (_, stored) = app
        .request("POST", "/ccda/generate", Some(generate_request()))
        .await;
    let xml = stored["rawXml"].as_str().unwrap().to_string();

    let (status, received) = app
        .request_raw(
            "POST",
            "/ccda/store?source=Regional%20HIE",
            "application/xml",
            xml,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(received["exchangeStatus"], "received");
    assert_eq!(received["sourceOrganization"], "Regional HIE");
}

#[tokio::test]
async fn validate_reports_problems_instead_of_failing() {
    let app = TestApp::new();
    let (status, report) = app
        .request_raw(
            "POST",
            "/ccda/validate",
            "application/xml",
            "<NotAClinicalDocument/>".to_string(),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["valid"], false);
    assert!(!report["errors"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn unparseable_xml_is_a_400() {
    let app = TestApp::new();
    let (status, body) = app
        .request_raw(
            "POST",
            "/ccda/parse",
            "application/xml",
            "this is not xml".to_string(),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid");
}

#[tokio::test]
async fn unknown_document_is_a_404() {
    let app = TestApp::new();
    let (status, _) = app.request("GET", "/ccda/no-such-doc", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
