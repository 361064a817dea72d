//! Federated query service: fans a query out across network participants,
//! merges the tagged results and records one ledger row per call.

use chrono::Utc;
use futures::future::join_all;
use hie_ledger::{Direction, Ledger, ProtocolKind, TransactionOutcome};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::commonwell::{CommonWellAuth, CommonWellClient};
use crate::dedup::dedupe_patients;
use crate::error::NetqueryError;
use crate::participant::{
    resolve_repository, search_directory, DirectoryFilters, NetworkParticipant,
    ParticipantDirectory, RegisterParticipant,
};
use crate::types::{
    DocumentEntry, DocumentQueryParams, Network, NetworkQuery, NetworkResponse, PatientMatch,
    QueryResult, QueryType, RetrievedDocument,
};
use crate::{xca, xcpd, Result};

pub const DEFAULT_FANOUT_TIMEOUT: Duration = Duration::from_secs(30);
const TEFCA_VERSION: &str = "1.0";

pub struct NetworkQueryService {
    client: reqwest::Client,
    commonwell: CommonWellClient,
    directory: Arc<dyn ParticipantDirectory>,
    ledger: Ledger,
    fanout_timeout: Duration,
}

impl NetworkQueryService {
    pub fn new(
        client: reqwest::Client,
        directory: Arc<dyn ParticipantDirectory>,
        ledger: Ledger,
    ) -> Self {
        Self {
            commonwell: CommonWellClient::new(client.clone(), None),
            client,
            directory,
            ledger,
            fanout_timeout: DEFAULT_FANOUT_TIMEOUT,
        }
    }

    pub fn with_commonwell_auth(mut self, auth: CommonWellAuth) -> Self {
        self.commonwell = CommonWellClient::new(self.client.clone(), Some(auth));
        self
    }

    pub fn with_fanout_timeout(mut self, timeout: Duration) -> Self {
        self.fanout_timeout = timeout;
        self
    }

    pub fn directory(&self) -> Arc<dyn ParticipantDirectory> {
        Arc::clone(&self.directory)
    }

    /// Execute one federated query. A single ledger record covers the
    /// whole fan-out; per-participant failures become error strings.
    pub async fn query(&self, network: Network, request: &NetworkQuery) -> Result<NetworkResponse> {
        let query_id = Uuid::new_v4().to_string();
        let started = Instant::now();

        let record = self
            .ledger
            .begin(
                protocol_for(network),
                request.query_type.as_str(),
                Direction::Outbound,
                Some(request.requesting_organization.name.clone()),
                json!({
                    "queryType": request.query_type,
                    "purposeOfUse": request.purpose_of_use,
                    "requestingOrganization": request.requesting_organization.name,
                }),
            )
            .await?;

        let outcome = match request.query_type {
            QueryType::PatientDiscovery => self.patient_discovery(network, request, &query_id).await,
            QueryType::DocumentQuery => self.document_query(network, request, &query_id).await,
            QueryType::DocumentRetrieve => self.document_retrieve(network, request, &query_id).await,
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let (results, errors) = match outcome {
            Ok(pair) => pair,
            Err(e) => {
                self.ledger
                    .complete(&record.id, TransactionOutcome::failed(e.to_string()))
                    .await?;
                return Err(e);
            }
        };

        if errors.is_empty() {
            self.ledger
                .complete(
                    &record.id,
                    TransactionOutcome::completed_with(json!({
                        "resultCount": results.len(),
                        "elapsedMs": elapsed_ms,
                    })),
                )
                .await?;
        } else {
            self.ledger
                .complete(
                    &record.id,
                    TransactionOutcome::failed_with(
                        errors.join("; "),
                        json!({
                            "resultCount": results.len(),
                            "elapsedMs": elapsed_ms,
                        }),
                    ),
                )
                .await?;
        }

        tracing::info!(
            network = network.as_str(),
            query_type = request.query_type.as_str(),
            query_id = %query_id,
            results = results.len(),
            errors = errors.len(),
            elapsed_ms,
            "network query finished"
        );
        Ok(NetworkResponse {
            success: errors.is_empty(),
            query_id,
            results,
            errors,
            response_time_ms: elapsed_ms,
        })
    }

    pub async fn register_participant(
        &self,
        request: RegisterParticipant,
    ) -> Result<NetworkParticipant> {
        let participant = request.into_participant();
        if self
            .directory
            .get(participant.network, &participant.participant_id)
            .await
            .is_some()
        {
            return Err(NetqueryError::AlreadyRegistered(
                participant.participant_id.clone(),
            ));
        }
        self.directory.insert(participant.clone()).await;
        tracing::info!(
            network = participant.network.as_str(),
            participant = %participant.participant_id,
            organization = %participant.organization_name,
            "network participant registered"
        );
        Ok(participant)
    }

    pub async fn participant_status(
        &self,
        network: Network,
        participant_id: &str,
    ) -> Option<NetworkParticipant> {
        self.directory.get(network, participant_id).await
    }

    pub async fn list_participants(&self, network: Network) -> Vec<NetworkParticipant> {
        self.directory.list(network).await
    }

    pub async fn search_directory(
        &self,
        network: Network,
        filters: &DirectoryFilters,
    ) -> Vec<NetworkParticipant> {
        search_directory(self.directory.as_ref(), network, filters).await
    }

    async fn participants_for(
        &self,
        network: Network,
        capability: QueryType,
        targets: &[String],
    ) -> Vec<NetworkParticipant> {
        let all = self.directory.list(network).await;
        all.into_iter()
            .filter(|p| p.supports(capability))
            .filter(|p| targets.is_empty() || targets.contains(&p.participant_id))
            .collect()
    }

    async fn patient_discovery(
        &self,
        network: Network,
        request: &NetworkQuery,
        query_id: &str,
    ) -> Result<(Vec<QueryResult>, Vec<String>)> {
        let patient = request
            .patient
            .clone()
            .ok_or_else(|| NetqueryError::MissingParameters("patient demographics".to_string()))?;

        let participants = self
            .participants_for(network, QueryType::PatientDiscovery, &request.target_participants)
            .await;

        let calls = participants.iter().map(|participant| {
            let patient = patient.clone();
            async move {
                let outcome = tokio::time::timeout(
                    self.fanout_timeout,
                    self.discover_at(network, participant, &patient, request, query_id),
                )
                .await;
                match outcome {
                    Ok(Ok(matches)) => Ok(matches),
                    Ok(Err(e)) => Err(format!("{}: {e}", participant.organization_name)),
                    Err(_) => Err(format!(
                        "{}: timed out after {}s",
                        participant.organization_name,
                        self.fanout_timeout.as_secs()
                    )),
                }
            }
        });

        let mut matches = Vec::new();
        let mut errors = Vec::new();
        for outcome in join_all(calls).await {
            match outcome {
                Ok(found) => matches.extend(found),
                Err(e) => errors.push(e),
            }
        }

        let deduped = dedupe_patients(matches)
            .into_iter()
            .map(QueryResult::Patient)
            .collect();
        Ok((deduped, errors))
    }

    async fn discover_at(
        &self,
        network: Network,
        participant: &NetworkParticipant,
        patient: &crate::types::PatientDemographics,
        request: &NetworkQuery,
        query_id: &str,
    ) -> Result<Vec<PatientMatch>> {
        match network {
            Network::Tefca => {
                let body = json!({
                    "messageId": query_id,
                    "timestamp": Utc::now().to_rfc3339(),
                    "requestingOrganization": request.requesting_organization,
                    "purposeOfUse": request.purpose_of_use,
                    "patientDemographics": patient,
                });
                let response: JsonValue = self
                    .tefca_post(&participant.endpoint, "patient-discovery", &body, query_id)
                    .await?;
                let patients = response["patients"].as_array().cloned().unwrap_or_default();
                Ok(patients
                    .iter()
                    .map(|p| PatientMatch {
                        patient_id: p["patientId"].as_str().map(str::to_string),
                        first_name: p["firstName"].as_str().map(str::to_string),
                        last_name: p["lastName"].as_str().map(str::to_string),
                        date_of_birth: p["dateOfBirth"].as_str().map(str::to_string),
                        gender: p["gender"].as_str().map(str::to_string),
                        match_score: p["matchScore"].as_f64().unwrap_or(1.0),
                        source: participant.organization_name.clone(),
                        source_participant: participant.participant_id.clone(),
                        sources: Vec::new(),
                    })
                    .collect())
            }
            Network::Carequality => {
                let endpoint = format!("{}/xcpd", participant.endpoint);
                let envelope = xcpd::build_discovery_request(
                    patient,
                    &request.requesting_organization.oid,
                    &participant.participant_id,
                    &endpoint,
                    query_id,
                )?;
                let response = self.soap_post(&endpoint, envelope).await?;
                Ok(xcpd::parse_discovery_response(&response)?
                    .into_iter()
                    .map(|p| PatientMatch {
                        patient_id: p.patient_id,
                        first_name: p.first_name,
                        last_name: p.last_name,
                        date_of_birth: p.date_of_birth,
                        gender: p.gender,
                        match_score: 1.0,
                        source: participant.organization_name.clone(),
                        source_participant: participant.participant_id.clone(),
                        sources: Vec::new(),
                    })
                    .collect())
            }
            Network::Commonwell => Ok(self
                .commonwell
                .search_person(&participant.endpoint, patient)
                .await?
                .into_iter()
                .map(|m| PatientMatch {
                    patient_id: m.person_id,
                    first_name: m.first_name,
                    last_name: m.last_name,
                    date_of_birth: m.date_of_birth,
                    gender: m.gender,
                    match_score: m.confidence.unwrap_or(1.0),
                    source: participant.organization_name.clone(),
                    source_participant: participant.participant_id.clone(),
                    sources: Vec::new(),
                })
                .collect()),
        }
    }

    async fn document_query(
        &self,
        network: Network,
        request: &NetworkQuery,
        query_id: &str,
    ) -> Result<(Vec<QueryResult>, Vec<String>)> {
        let params = request
            .document_query
            .clone()
            .ok_or_else(|| NetqueryError::MissingParameters("document query parameters".to_string()))?;

        // Carequality routes to the one community named in the query.
        let participants = match network {
            Network::Carequality => {
                let community = params.home_community_id.as_deref().ok_or_else(|| {
                    NetqueryError::MissingParameters("home community id".to_string())
                })?;
                vec![self
                    .directory
                    .get(network, community)
                    .await
                    .ok_or_else(|| NetqueryError::ParticipantNotFound(community.to_string()))?]
            }
            _ => {
                self.participants_for(network, QueryType::DocumentQuery, &request.target_participants)
                    .await
            }
        };

        let calls = participants.iter().map(|participant| {
            let params = params.clone();
            async move {
                let outcome = tokio::time::timeout(
                    self.fanout_timeout,
                    self.query_documents_at(network, participant, &params, request, query_id),
                )
                .await;
                match outcome {
                    Ok(Ok(documents)) => Ok(documents),
                    Ok(Err(e)) => Err(format!("{}: {e}", participant.organization_name)),
                    Err(_) => Err(format!(
                        "{}: timed out after {}s",
                        participant.organization_name,
                        self.fanout_timeout.as_secs()
                    )),
                }
            }
        });

        let mut documents = Vec::new();
        let mut errors = Vec::new();
        for outcome in join_all(calls).await {
            match outcome {
                Ok(found) => documents.extend(found.into_iter().map(QueryResult::Document)),
                Err(e) => errors.push(e),
            }
        }
        Ok((documents, errors))
    }

    async fn query_documents_at(
        &self,
        network: Network,
        participant: &NetworkParticipant,
        params: &DocumentQueryParams,
        request: &NetworkQuery,
        query_id: &str,
    ) -> Result<Vec<DocumentEntry>> {
        match network {
            Network::Tefca => {
                let body = json!({
                    "messageId": query_id,
                    "timestamp": Utc::now().to_rfc3339(),
                    "requestingOrganization": request.requesting_organization,
                    "purposeOfUse": request.purpose_of_use,
                    "patientId": params.patient_id,
                    "documentType": params.document_type,
                    "dateRange": { "from": params.date_from, "to": params.date_to },
                });
                let response: JsonValue = self
                    .tefca_post(&participant.endpoint, "document-query", &body, query_id)
                    .await?;
                let documents = response["documents"].as_array().cloned().unwrap_or_default();
                Ok(documents
                    .iter()
                    .map(|d| DocumentEntry {
                        document_unique_id: d["documentId"].as_str().map(str::to_string),
                        repository_unique_id: d["repositoryId"].as_str().map(str::to_string),
                        title: d["title"].as_str().map(str::to_string),
                        creation_time: d["creationDate"].as_str().map(str::to_string),
                        mime_type: d["mimeType"].as_str().map(str::to_string),
                        size: d["size"].as_str().map(str::to_string),
                        source: participant.organization_name.clone(),
                        source_participant: participant.participant_id.clone(),
                    })
                    .collect())
            }
            Network::Carequality => {
                let endpoint = participant
                    .query_endpoint
                    .clone()
                    .unwrap_or_else(|| format!("{}/xca-query", participant.endpoint));
                let envelope = xca::build_query_request(params, query_id)?;
                let response = self.soap_post(&endpoint, envelope).await?;
                Ok(xca::parse_query_response(&response)?
                    .into_iter()
                    .map(|d| DocumentEntry {
                        document_unique_id: d.document_unique_id,
                        repository_unique_id: d.repository_unique_id,
                        title: d.title,
                        creation_time: d.creation_time,
                        mime_type: d.mime_type,
                        size: d.size,
                        source: participant.organization_name.clone(),
                        source_participant: participant.participant_id.clone(),
                    })
                    .collect())
            }
            Network::Commonwell => Ok(self
                .commonwell
                .query_documents(&participant.endpoint, params)
                .await?
                .into_iter()
                .map(|d| DocumentEntry {
                    document_unique_id: d.id,
                    repository_unique_id: Some(participant.participant_id.clone()),
                    title: d.title,
                    creation_time: d.creation_date,
                    mime_type: d.mime_type,
                    size: d.size,
                    source: participant.organization_name.clone(),
                    source_participant: participant.participant_id.clone(),
                })
                .collect()),
        }
    }

    async fn document_retrieve(
        &self,
        network: Network,
        request: &NetworkQuery,
        query_id: &str,
    ) -> Result<(Vec<QueryResult>, Vec<String>)> {
        let params = request.document_retrieve.clone().ok_or_else(|| {
            NetqueryError::MissingParameters("document retrieve parameters".to_string())
        })?;

        let participant =
            resolve_repository(self.directory.as_ref(), network, &params.repository_unique_id)
                .await?;

        let document = match network {
            Network::Tefca => {
                let body = json!({
                    "messageId": query_id,
                    "timestamp": Utc::now().to_rfc3339(),
                    "requestingOrganization": request.requesting_organization,
                    "purposeOfUse": request.purpose_of_use,
                    "documentId": params.document_unique_id,
                    "repositoryId": params.repository_unique_id,
                });
                let response: JsonValue = self
                    .tefca_post(&participant.endpoint, "document-retrieve", &body, query_id)
                    .await?;
                let doc = &response["document"];
                doc.is_object().then(|| RetrievedDocument {
                    document_unique_id: params.document_unique_id.clone(),
                    repository_unique_id: Some(params.repository_unique_id.clone()),
                    home_community_id: None,
                    mime_type: doc["mimeType"].as_str().map(str::to_string),
                    content: doc["content"].as_str().unwrap_or_default().to_string(),
                    source: participant.organization_name.clone(),
                    source_participant: participant.participant_id.clone(),
                })
            }
            Network::Carequality => {
                let endpoint = participant
                    .retrieve_endpoint
                    .clone()
                    .unwrap_or_else(|| format!("{}/xca-retrieve", participant.endpoint));
                let envelope = xca::build_retrieve_request(
                    &participant.participant_id,
                    &params.repository_unique_id,
                    &params.document_unique_id,
                    query_id,
                )?;
                let response = self.soap_post(&endpoint, envelope).await?;
                xca::parse_retrieve_response(&response)?.map(|d| RetrievedDocument {
                    document_unique_id: d.document_unique_id,
                    repository_unique_id: d.repository_unique_id,
                    home_community_id: d.home_community_id,
                    mime_type: d.mime_type,
                    content: d.content,
                    source: participant.organization_name.clone(),
                    source_participant: participant.participant_id.clone(),
                })
            }
            Network::Commonwell => {
                // CommonWell scopes documents to the person record, so the
                // repository id carries the person id.
                let (content, content_type) = self
                    .commonwell
                    .retrieve_document(
                        &participant.endpoint,
                        &params.repository_unique_id,
                        &params.document_unique_id,
                    )
                    .await?;
                Some(RetrievedDocument {
                    document_unique_id: params.document_unique_id.clone(),
                    repository_unique_id: Some(params.repository_unique_id.clone()),
                    home_community_id: None,
                    mime_type: content_type,
                    content,
                    source: participant.organization_name.clone(),
                    source_participant: participant.participant_id.clone(),
                })
            }
        };

        match document {
            Some(document) => Ok((vec![QueryResult::Retrieved(document)], Vec::new())),
            None => Ok((
                Vec::new(),
                vec![format!(
                    "{}: document {} not found",
                    participant.organization_name, params.document_unique_id
                )],
            )),
        }
    }

    async fn tefca_post(
        &self,
        base_url: &str,
        operation: &str,
        body: &JsonValue,
        query_id: &str,
    ) -> Result<JsonValue> {
        let response = self
            .client
            .post(format!("{base_url}/tefca/v1/{operation}"))
            .header("X-TEFCA-Query-ID", query_id)
            .header("X-TEFCA-Version", TEFCA_VERSION)
            .header("X-TEFCA-Timestamp", Utc::now().to_rfc3339())
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn soap_post(&self, endpoint: &str, envelope: String) -> Result<String> {
        let response = self
            .client
            .post(endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/soap+xml")
            .header(reqwest::header::ACCEPT, "application/soap+xml")
            .body(envelope)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?)
    }
}

fn protocol_for(network: Network) -> ProtocolKind {
    match network {
        Network::Tefca => ProtocolKind::Tefca,
        Network::Carequality => ProtocolKind::Carequality,
        Network::Commonwell => ProtocolKind::Commonwell,
    }
}
