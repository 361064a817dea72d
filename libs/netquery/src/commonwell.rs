//! CommonWell REST adapter. The alliance API speaks JSON over
//! `/v1/person` and `/v1/organization` resources with OAuth2 client
//! credentials.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value as JsonValue};

use crate::error::NetqueryError;
use crate::types::{DocumentQueryParams, PatientDemographics};
use crate::Result;

#[derive(Debug, Clone)]
pub struct CommonWellAuth {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub scope: String,
}

impl Default for CommonWellAuth {
    fn default() -> Self {
        Self {
            token_url: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            scope: "person.read person.write document.read document.write".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommonWellMatch {
    pub person_id: Option<String>,
    pub confidence: Option<f64>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CommonWellDocument {
    pub id: Option<String>,
    pub title: Option<String>,
    pub creation_date: Option<String>,
    pub mime_type: Option<String>,
    pub size: Option<String>,
}

pub struct CommonWellClient {
    client: reqwest::Client,
    auth: Option<CommonWellAuth>,
}

impl CommonWellClient {
    pub fn new(client: reqwest::Client, auth: Option<CommonWellAuth>) -> Self {
        Self { client, auth }
    }

    async fn bearer(&self) -> Result<Option<String>> {
        let Some(auth) = &self.auth else {
            return Ok(None);
        };
        let response = self
            .client
            .post(&auth.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", auth.client_id.as_str()),
                ("client_secret", auth.client_secret.as_str()),
                ("scope", auth.scope.as_str()),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(NetqueryError::Auth(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }
        let body: JsonValue = response.json().await?;
        body["access_token"]
            .as_str()
            .map(|t| Some(t.to_string()))
            .ok_or_else(|| NetqueryError::Auth("token response has no access_token".to_string()))
    }

    async fn authorized(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder> {
        Ok(match self.bearer().await? {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        })
    }

    pub async fn search_person(
        &self,
        base_url: &str,
        patient: &PatientDemographics,
    ) -> Result<Vec<CommonWellMatch>> {
        let request = self
            .authorized(self.client.post(format!("{base_url}/v1/person/search")))
            .await?
            .json(&json!({
                "firstName": patient.first_name,
                "lastName": patient.last_name,
                "dateOfBirth": patient.date_of_birth,
                "gender": patient.gender,
            }));
        let body: JsonValue = request.send().await?.error_for_status()?.json().await?;

        let matches = body["matches"].as_array().cloned().unwrap_or_default();
        Ok(matches
            .iter()
            .map(|m| CommonWellMatch {
                person_id: m["id"].as_str().map(str::to_string),
                confidence: m["confidence"].as_f64(),
                first_name: m["demographics"]["firstName"].as_str().map(str::to_string),
                last_name: m["demographics"]["lastName"].as_str().map(str::to_string),
                date_of_birth: m["demographics"]["dateOfBirth"].as_str().map(str::to_string),
                gender: m["demographics"]["gender"].as_str().map(str::to_string),
            })
            .collect())
    }

    pub async fn query_documents(
        &self,
        base_url: &str,
        params: &DocumentQueryParams,
    ) -> Result<Vec<CommonWellDocument>> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(document_type) = &params.document_type {
            query.push(("type", document_type.clone()));
        }
        if let Some(from) = &params.date_from {
            query.push(("fromDate", from.clone()));
        }
        if let Some(to) = &params.date_to {
            query.push(("toDate", to.clone()));
        }

        let request = self
            .authorized(
                self.client
                    .get(format!("{base_url}/v1/person/{}/documents", params.patient_id))
                    .query(&query),
            )
            .await?;
        let body: JsonValue = request.send().await?.error_for_status()?.json().await?;

        let documents = body["documents"].as_array().cloned().unwrap_or_default();
        Ok(documents
            .iter()
            .map(|d| CommonWellDocument {
                id: d["id"].as_str().map(str::to_string),
                title: d["title"].as_str().map(str::to_string),
                creation_date: d["creationDate"].as_str().map(str::to_string),
                mime_type: d["mimeType"].as_str().map(str::to_string),
                size: d["size"].as_str().map(str::to_string),
            })
            .collect())
    }

    /// Fetch one document's bytes; returned base64-encoded with the
    /// upstream content type.
    pub async fn retrieve_document(
        &self,
        base_url: &str,
        person_id: &str,
        document_id: &str,
    ) -> Result<(String, Option<String>)> {
        let request = self
            .authorized(
                self.client
                    .get(format!("{base_url}/v1/person/{person_id}/documents/{document_id}")),
            )
            .await?;
        let response = request.send().await?.error_for_status()?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?;
        Ok((BASE64.encode(&bytes), content_type))
    }

    pub async fn register_organization(
        &self,
        base_url: &str,
        organization: &JsonValue,
    ) -> Result<JsonValue> {
        let request = self
            .authorized(self.client.post(format!("{base_url}/v1/organization")))
            .await?
            .json(organization);
        Ok(request.send().await?.error_for_status()?.json().await?)
    }
}
