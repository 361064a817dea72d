//! Application state: every protocol service wired over in-memory stores
//! and the shared ledger.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use hie_ccda::{CcdaService, MemoryDocumentStore};
use hie_direct::{DirectService, MemoryAddressStore, MemoryTransport};
use hie_fhir_proxy::{FhirProxy, MemoryEndpointStore};
use hie_ledger::{Ledger, LedgerStore, MemoryLedger};
use hie_netquery::{CommonWellAuth, MemoryParticipantDirectory, NetworkQueryService};
use hie_x12::{MemoryPartnerDirectory, MemoryX12Store, PartnerDirectory, X12Service};

use crate::config::Config;

pub struct AppState {
    pub config: Config,
    pub ledger: Ledger,
    pub ledger_store: Arc<dyn LedgerStore>,
    pub x12: X12Service,
    pub x12_partners: Arc<dyn PartnerDirectory>,
    pub ccda: CcdaService,
    pub fhir: FhirProxy,
    pub direct: DirectService,
    /// Loopback transport handle; production deployments swap an SMTP or
    /// HISP relay in here.
    pub direct_transport: Arc<MemoryTransport>,
    pub networks: NetworkQueryService,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Arc<Self>> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http.timeout_secs))
            .build()
            .context("failed to build HTTP client")?;
        let fanout_timeout = Duration::from_secs(config.http.fanout_timeout_secs);

        let ledger_store: Arc<dyn LedgerStore> = Arc::new(MemoryLedger::default());
        let ledger = Ledger::new(Arc::clone(&ledger_store));

        let x12_partners: Arc<dyn PartnerDirectory> = Arc::new(MemoryPartnerDirectory::default());
        let x12 = X12Service::new(
            Arc::new(MemoryX12Store::default()),
            Arc::clone(&x12_partners),
            ledger.clone(),
        );

        let ccda = CcdaService::new(Arc::new(MemoryDocumentStore::default()), ledger.clone());

        let fhir = FhirProxy::new(
            client.clone(),
            Arc::new(MemoryEndpointStore::default()),
            ledger.clone(),
        )
        .with_fanout_timeout(fanout_timeout);

        let mut anchors = Vec::new();
        for path in config.trust_anchor_paths() {
            let pem = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read trust anchor {path}"))?;
            anchors.push(pem);
        }
        if config.direct.insecure_bootstrap {
            tracing::warn!("insecure bootstrap certificates are enabled");
        }

        let direct_transport = Arc::new(MemoryTransport::default());
        let direct = DirectService::new(
            Arc::new(MemoryAddressStore::default()),
            Arc::clone(&direct_transport) as _,
            ledger.clone(),
        )
        .with_trust_anchors(anchors)
        .with_insecure_bootstrap(config.direct.insecure_bootstrap);

        let mut networks = NetworkQueryService::new(
            client,
            Arc::new(MemoryParticipantDirectory::default()),
            ledger.clone(),
        )
        .with_fanout_timeout(fanout_timeout);
        if let Some(commonwell) = &config.commonwell {
            let mut auth = CommonWellAuth {
                token_url: commonwell.token_url.clone(),
                client_id: commonwell.client_id.clone(),
                client_secret: commonwell.client_secret.clone(),
                ..CommonWellAuth::default()
            };
            if let Some(scope) = &commonwell.scope {
                auth.scope = scope.clone();
            }
            networks = networks.with_commonwell_auth(auth);
        }

        Ok(Arc::new(Self {
            config,
            ledger,
            ledger_store,
            x12,
            x12_partners,
            ccda,
            fhir,
            direct,
            direct_transport,
            networks,
        }))
    }
}
