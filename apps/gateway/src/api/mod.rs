//! Router assembly.

pub mod handlers;
pub mod middleware;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Extension, Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use hie_netquery::Network;

use crate::state::AppState;

/// Routes shared by the three federation networks; the concrete network is
/// injected as an extension by the mount point.
fn network_routes(network: Network) -> Router<Arc<AppState>> {
    Router::new()
        .route("/query", post(handlers::networks::query))
        .route("/directory", get(handlers::networks::directory))
        .route("/organizations", post(handlers::networks::register))
        .route("/participants", get(handlers::networks::list))
        .route(
            "/participants/:participant_id",
            get(handlers::networks::status),
        )
        .layer(Extension(network))
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::health::info))
        .route("/health", get(handlers::health::health))
        // FHIR federation proxy
        .route("/fhir", post(handlers::fhir::batch))
        .route("/fhir/metadata", get(handlers::fhir::metadata))
        .route("/fhir/$search-all", post(handlers::fhir::search_all))
        .route(
            "/fhir/endpoints",
            get(handlers::fhir::list_endpoints).post(handlers::fhir::register_endpoint),
        )
        .route(
            "/fhir/:resource_type",
            get(handlers::fhir::search).post(handlers::fhir::create),
        )
        .route(
            "/fhir/:resource_type/:id",
            get(handlers::fhir::read)
                .put(handlers::fhir::update)
                .delete(handlers::fhir::delete),
        )
        // X12 EDI
        .route("/x12/inbound", post(handlers::x12::inbound))
        .route("/x12/parse", post(handlers::x12::parse_interchange))
        .route("/x12/generate", post(handlers::x12::generate))
        .route("/x12/270", post(handlers::x12::generate_270))
        .route("/x12/276", post(handlers::x12::generate_276))
        .route("/x12/278", post(handlers::x12::generate_278))
        .route("/x12/837", post(handlers::x12::generate_837))
        .route("/x12/transactions", get(handlers::x12::list_transactions))
        .route("/x12/transactions/:id", get(handlers::x12::get_transaction))
        .route(
            "/x12/partners",
            get(handlers::x12::list_partners).post(handlers::x12::upsert_partner),
        )
        // C-CDA documents
        .route("/ccda/parse", post(handlers::ccda::parse_document))
        .route("/ccda/validate", post(handlers::ccda::validate_document))
        .route("/ccda/generate", post(handlers::ccda::generate_document))
        .route("/ccda/store", post(handlers::ccda::store_document))
        .route("/ccda/to-fhir", post(handlers::ccda::to_fhir_bundle))
        .route("/ccda/query", get(handlers::ccda::query_documents))
        .route("/ccda/:document_id", get(handlers::ccda::get_document))
        // Direct secure messaging
        .route("/direct/send", post(handlers::direct::send))
        .route("/direct/receive", post(handlers::direct::receive))
        .route(
            "/direct/addresses",
            get(handlers::direct::list_addresses).post(handlers::direct::register_address),
        )
        .route(
            "/direct/addresses/:address",
            get(handlers::direct::get_address),
        )
        .route(
            "/direct/addresses/:address/activate",
            post(handlers::direct::activate_address),
        )
        .route(
            "/direct/certificates/:address",
            get(handlers::direct::lookup_certificate),
        )
        .route("/direct/trust/validate", post(handlers::direct::validate_trust))
        // Cross-network federation
        .nest("/tefca", network_routes(Network::Tefca))
        .nest("/carequality", network_routes(Network::Carequality))
        .nest("/commonwell", network_routes(Network::Commonwell))
        // Transaction ledger
        .route("/transactions", get(handlers::transactions::list))
        .route("/transactions/:id", get(handlers::transactions::get))
        .layer(axum::middleware::from_fn(middleware::transaction_context))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
