//! Closed enumerations for the supported transaction families.

use serde::{Deserialize, Serialize};

/// Transaction families the gateway handles, keyed by transaction-set code
/// (ST01) or functional-group code (GS01).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionSetKind {
    Eligibility270,
    EligibilityResponse271,
    ClaimStatusInquiry276,
    ClaimStatusResponse277,
    PriorAuthRequest278,
    PaymentRemittance835,
    ProfessionalClaim837,
    Acknowledgment997,
    Acknowledgment999,
}

impl TransactionSetKind {
    pub fn from_set_code(code: &str) -> Option<Self> {
        match code {
            "270" => Some(Self::Eligibility270),
            "271" => Some(Self::EligibilityResponse271),
            "276" => Some(Self::ClaimStatusInquiry276),
            "277" => Some(Self::ClaimStatusResponse277),
            "278" => Some(Self::PriorAuthRequest278),
            "835" => Some(Self::PaymentRemittance835),
            "837" => Some(Self::ProfessionalClaim837),
            "997" => Some(Self::Acknowledgment997),
            "999" => Some(Self::Acknowledgment999),
            _ => None,
        }
    }

    pub fn from_functional_group(code: &str) -> Option<Self> {
        match code {
            "HS" => Some(Self::Eligibility270),
            "HB" => Some(Self::EligibilityResponse271),
            "HR" => Some(Self::ClaimStatusInquiry276),
            "HN" => Some(Self::ClaimStatusResponse277),
            "HI" => Some(Self::PriorAuthRequest278),
            "HP" => Some(Self::PaymentRemittance835),
            "HC" => Some(Self::ProfessionalClaim837),
            "FA" => Some(Self::Acknowledgment999),
            _ => None,
        }
    }

    pub fn set_code(self) -> &'static str {
        match self {
            Self::Eligibility270 => "270",
            Self::EligibilityResponse271 => "271",
            Self::ClaimStatusInquiry276 => "276",
            Self::ClaimStatusResponse277 => "277",
            Self::PriorAuthRequest278 => "278",
            Self::PaymentRemittance835 => "835",
            Self::ProfessionalClaim837 => "837",
            Self::Acknowledgment997 => "997",
            Self::Acknowledgment999 => "999",
        }
    }

    pub fn functional_group(self) -> &'static str {
        match self {
            Self::Eligibility270 => "HS",
            Self::EligibilityResponse271 => "HB",
            Self::ClaimStatusInquiry276 => "HR",
            Self::ClaimStatusResponse277 => "HN",
            Self::PriorAuthRequest278 => "HI",
            Self::PaymentRemittance835 => "HP",
            Self::ProfessionalClaim837 => "HC",
            Self::Acknowledgment997 | Self::Acknowledgment999 => "FA",
        }
    }

    /// Stable label used in ledger rows and API payloads,
    /// e.g. `x270_eligibility_inquiry`.
    pub fn canonical_name(self) -> &'static str {
        match self {
            Self::Eligibility270 => "x270_eligibility_inquiry",
            Self::EligibilityResponse271 => "x271_eligibility_response",
            Self::ClaimStatusInquiry276 => "x276_claim_status_inquiry",
            Self::ClaimStatusResponse277 => "x277_claim_status_response",
            Self::PriorAuthRequest278 => "x278_prior_auth_request",
            Self::PaymentRemittance835 => "x835_payment_remittance",
            Self::ProfessionalClaim837 => "x837_professional_claim",
            Self::Acknowledgment997 => "x997_acknowledgment",
            Self::Acknowledgment999 => "x999_acknowledgment",
        }
    }

    pub fn from_canonical_name(name: &str) -> Option<Self> {
        match name {
            "x270_eligibility_inquiry" => Some(Self::Eligibility270),
            "x271_eligibility_response" => Some(Self::EligibilityResponse271),
            "x276_claim_status_inquiry" => Some(Self::ClaimStatusInquiry276),
            "x277_claim_status_response" => Some(Self::ClaimStatusResponse277),
            "x278_prior_auth_request" => Some(Self::PriorAuthRequest278),
            "x835_payment_remittance" => Some(Self::PaymentRemittance835),
            "x837_professional_claim" => Some(Self::ProfessionalClaim837),
            "x997_acknowledgment" => Some(Self::Acknowledgment997),
            "x999_acknowledgment" => Some(Self::Acknowledgment999),
            _ => None,
        }
    }

    /// Implementation convention reference carried in GS08/ST03.
    pub fn convention_reference(self) -> &'static str {
        match self {
            Self::Eligibility270 | Self::EligibilityResponse271 => "005010X279A1",
            Self::ClaimStatusInquiry276 | Self::ClaimStatusResponse277 => "005010X212",
            Self::PriorAuthRequest278 => "005010X217",
            Self::PaymentRemittance835 => "005010X221A1",
            Self::ProfessionalClaim837 => "005010X222A1",
            Self::Acknowledgment997 => "005010",
            Self::Acknowledgment999 => "005010X231A1",
        }
    }
}

/// Lifecycle of a persisted X12 transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum X12TransactionStatus {
    Received,
    Validated,
    Rejected,
    Processing,
    Completed,
}

/// STC claim-status category codes (277).
pub fn claim_status_label(code: &str) -> &'static str {
    match code.get(..2) {
        Some("A0") => "Forwarded",
        Some("A1") => "Pending",
        Some("A2") => "Accepted",
        Some("A3") => "Rejected",
        Some("A4") => "Not Found",
        Some("A5") => "Split",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_codes_round_trip() {
        for code in ["270", "271", "276", "277", "278", "835", "837", "997", "999"] {
            let kind = TransactionSetKind::from_set_code(code).unwrap();
            assert_eq!(kind.set_code(), code);
        }
        assert!(TransactionSetKind::from_set_code("850").is_none());
    }

    #[test]
    fn canonical_names_round_trip() {
        let kind = TransactionSetKind::Eligibility270;
        assert_eq!(
            TransactionSetKind::from_canonical_name(kind.canonical_name()),
            Some(kind)
        );
    }

    #[test]
    fn claim_status_codes() {
        assert_eq!(claim_status_label("A2:20"), "Accepted");
        assert_eq!(claim_status_label("F0"), "Unknown");
    }
}
