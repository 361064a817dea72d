//! Family-specific interpretation of a parsed interchange into a
//! business-level summary.

use serde::{Deserialize, Serialize};

use crate::parse::ParsedInterchange;
use crate::segment::{Delimiters, Segment};
use crate::types::{claim_status_label, TransactionSetKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenefitInfo {
    pub code: String,
    pub coverage_level: Option<String>,
    pub service_type: Option<String>,
    pub amount: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimPayment {
    pub claim_id: String,
    pub status_code: Option<String>,
    pub charge_amount: Option<f64>,
    pub payment_amount: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceLine {
    pub procedure: String,
    pub charge_amount: Option<f64>,
    pub payment_amount: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimLine {
    pub procedure: String,
    pub charge_amount: Option<f64>,
    pub units: Option<String>,
}

/// Business summary per transaction family. Unsupported or
/// response-only families fall through to `Raw`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InterpretedTransaction {
    #[serde(rename_all = "camelCase")]
    EligibilityInquiry {
        member_id: Option<String>,
        service_types: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    EligibilityResponse {
        eligible: bool,
        benefits: Vec<BenefitInfo>,
    },
    #[serde(rename_all = "camelCase")]
    ClaimStatusInquiry {
        trace_number: Option<String>,
        member_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    ClaimStatusResponse {
        status_code: Option<String>,
        status: String,
    },
    #[serde(rename_all = "camelCase")]
    PaymentRemittance {
        claims: Vec<ClaimPayment>,
        service_lines: Vec<ServiceLine>,
        total_payment: f64,
    },
    #[serde(rename_all = "camelCase")]
    Claim {
        claim_id: Option<String>,
        total_charge: Option<f64>,
        facility_code: Option<String>,
        lines: Vec<ClaimLine>,
    },
    #[serde(rename_all = "camelCase")]
    Raw { segment_count: usize },
}

pub fn interpret(parsed: &ParsedInterchange) -> InterpretedTransaction {
    match parsed.kind {
        Some(TransactionSetKind::Eligibility270) => interpret_270(parsed),
        Some(TransactionSetKind::EligibilityResponse271) => interpret_271(parsed),
        Some(TransactionSetKind::ClaimStatusInquiry276) => interpret_276(parsed),
        Some(TransactionSetKind::ClaimStatusResponse277) => interpret_277(parsed),
        Some(TransactionSetKind::PaymentRemittance835) => interpret_835(parsed),
        Some(TransactionSetKind::ProfessionalClaim837) => interpret_837(parsed),
        _ => InterpretedTransaction::Raw {
            segment_count: parsed.segments.len(),
        },
    }
}

fn owned(segment: &Segment, index: usize) -> Option<String> {
    segment.element(index).map(str::to_string)
}

fn numeric(segment: &Segment, index: usize) -> Option<f64> {
    segment.element(index).and_then(|e| e.parse().ok())
}

/// NM1*IL carries the subscriber; each EQ carries one requested service
/// type, and an inquiry may repeat EQ.
fn interpret_270(parsed: &ParsedInterchange) -> InterpretedTransaction {
    let member_id = parsed
        .segments
        .iter()
        .find(|s| s.id == "NM1" && s.element(0) == Some("IL"))
        .and_then(|s| owned(s, 8));
    let service_types: Vec<String> = parsed
        .segments
        .iter()
        .filter(|s| s.id == "EQ")
        .filter_map(|s| owned(s, 0))
        .collect();
    InterpretedTransaction::EligibilityInquiry {
        member_id,
        service_types,
    }
}

/// EB01 "1" anywhere in the set means active coverage.
fn interpret_271(parsed: &ParsedInterchange) -> InterpretedTransaction {
    let benefits: Vec<BenefitInfo> = parsed
        .segments
        .iter()
        .filter(|s| s.id == "EB")
        .map(|s| BenefitInfo {
            code: owned(s, 0).unwrap_or_default(),
            coverage_level: owned(s, 1),
            service_type: owned(s, 2),
            amount: owned(s, 6),
        })
        .collect();
    let eligible = benefits.iter().any(|b| b.code == "1");
    InterpretedTransaction::EligibilityResponse { eligible, benefits }
}

fn interpret_276(parsed: &ParsedInterchange) -> InterpretedTransaction {
    let trace_number = parsed.first("TRN").and_then(|s| owned(s, 1));
    let member_id = parsed
        .segments
        .iter()
        .find(|s| s.id == "NM1" && s.element(0) == Some("QC"))
        .and_then(|s| owned(s, 8));
    InterpretedTransaction::ClaimStatusInquiry {
        trace_number,
        member_id,
    }
}

fn interpret_277(parsed: &ParsedInterchange) -> InterpretedTransaction {
    let status_code = parsed.first("STC").and_then(|s| owned(s, 0));
    let status = claim_status_label(status_code.as_deref().unwrap_or("")).to_string();
    InterpretedTransaction::ClaimStatusResponse {
        status_code,
        status,
    }
}

fn interpret_835(parsed: &ParsedInterchange) -> InterpretedTransaction {
    let claims: Vec<ClaimPayment> = parsed
        .segments
        .iter()
        .filter(|s| s.id == "CLP")
        .map(|s| ClaimPayment {
            claim_id: owned(s, 0).unwrap_or_default(),
            status_code: owned(s, 1),
            charge_amount: numeric(s, 2),
            payment_amount: numeric(s, 3),
        })
        .collect();
    let service_lines: Vec<ServiceLine> = parsed
        .segments
        .iter()
        .filter(|s| s.id == "SVC")
        .map(|s| ServiceLine {
            procedure: owned(s, 0).unwrap_or_default(),
            charge_amount: numeric(s, 1),
            payment_amount: numeric(s, 2),
        })
        .collect();
    let total_payment = claims.iter().filter_map(|c| c.payment_amount).sum();
    InterpretedTransaction::PaymentRemittance {
        claims,
        service_lines,
        total_payment,
    }
}

fn interpret_837(parsed: &ParsedInterchange) -> InterpretedTransaction {
    let delims = Delimiters::default();
    let clm = parsed.first("CLM");
    let lines: Vec<ClaimLine> = parsed
        .segments
        .iter()
        .filter(|s| s.id == "SV1")
        .map(|s| ClaimLine {
            // SV101 is a composite: qualifier:procedure.
            procedure: s
                .element(0)
                .and_then(|e| e.split(delims.subelement).nth(1))
                .unwrap_or_default()
                .to_string(),
            charge_amount: numeric(s, 1),
            units: owned(s, 3),
        })
        .collect();
    InterpretedTransaction::Claim {
        claim_id: clm.and_then(|s| owned(s, 0)),
        total_charge: clm.and_then(|s| numeric(s, 1)),
        facility_code: clm.and_then(|s| owned(s, 4)),
        lines,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse;

    #[test]
    fn eligibility_inquiry_fields() {
        let raw = "ISA*00* *00* *ZZ*A*ZZ*B*240101*0000*^*00501*000000001*0*P*:~\
                   GS*HS*A*B*20240101*0000*1*X*005010X279A1~\
                   ST*270*0001~NM1*IL*1*DOE*JANE****MI*MEMBER001~EQ*30~\
                   SE*4*0001~GE*1*1~IEA*1*000000001~";
        let parsed = parse(raw).unwrap();
        assert_eq!(
            interpret(&parsed),
            InterpretedTransaction::EligibilityInquiry {
                member_id: Some("MEMBER001".into()),
                service_types: vec!["30".into()],
            }
        );
    }

    #[test]
    fn eligibility_inquiry_collects_repeated_eq_segments() {
        let raw = "ISA*00* *00* *ZZ*A*ZZ*B*240101*0000*^*00501*000000001*0*P*:~\
                   GS*HS*A*B*20240101*0000*1*X*005010X279A1~\
                   ST*270*0001~NM1*IL*1*DOE*JANE****MI*MEMBER001~\
                   EQ*30~EQ*98~EQ*88~\
                   SE*6*0001~GE*1*1~IEA*1*000000001~";
        let parsed = parse(raw).unwrap();
        assert_eq!(
            interpret(&parsed),
            InterpretedTransaction::EligibilityInquiry {
                member_id: Some("MEMBER001".into()),
                service_types: vec!["30".into(), "98".into(), "88".into()],
            }
        );
    }

    #[test]
    fn eligibility_response_active_coverage() {
        let raw = "ISA*00* *00* *ZZ*A*ZZ*B*240101*0000*^*00501*000000001*0*P*:~\
                   GS*HB*A*B*20240101*0000*1*X*005010X279A1~\
                   ST*271*0001~EB*1*IND*30~EB*C*IND*30****500~\
                   SE*4*0001~GE*1*1~IEA*1*000000001~";
        let parsed = parse(raw).unwrap();
        match interpret(&parsed) {
            InterpretedTransaction::EligibilityResponse { eligible, benefits } => {
                assert!(eligible);
                assert_eq!(benefits.len(), 2);
                assert_eq!(benefits[1].amount.as_deref(), Some("500"));
            }
            other => panic!("unexpected interpretation: {other:?}"),
        }
    }

    #[test]
    fn eligibility_response_without_active_coverage() {
        let raw = "ISA*00* *00* *ZZ*A*ZZ*B*240101*0000*^*00501*000000001*0*P*:~\
                   GS*HB*A*B*20240101*0000*1*X*005010X279A1~\
                   ST*271*0001~EB*6*IND*30~SE*3*0001~GE*1*1~IEA*1*000000001~";
        let parsed = parse(raw).unwrap();
        match interpret(&parsed) {
            InterpretedTransaction::EligibilityResponse { eligible, .. } => assert!(!eligible),
            other => panic!("unexpected interpretation: {other:?}"),
        }
    }

    #[test]
    fn claim_status_response_label() {
        let raw = "ISA*00* *00* *ZZ*A*ZZ*B*240101*0000*^*00501*000000001*0*P*:~\
                   GS*HN*A*B*20240101*0000*1*X*005010X212~\
                   ST*277*0001~STC*A2:20*20240110~SE*3*0001~GE*1*1~IEA*1*000000001~";
        let parsed = parse(raw).unwrap();
        assert_eq!(
            interpret(&parsed),
            InterpretedTransaction::ClaimStatusResponse {
                status_code: Some("A2:20".into()),
                status: "Accepted".into(),
            }
        );
    }

    #[test]
    fn remittance_totals() {
        let raw = "ISA*00* *00* *ZZ*A*ZZ*B*240101*0000*^*00501*000000001*0*P*:~\
                   GS*HP*A*B*20240101*0000*1*X*005010X221A1~\
                   ST*835*0001~\
                   CLP*CLAIM1*1*100.00*80.00~SVC*HC:99213*100.00*80.00~\
                   CLP*CLAIM2*1*50.00*20.50~\
                   SE*5*0001~GE*1*1~IEA*1*000000001~";
        let parsed = parse(raw).unwrap();
        match interpret(&parsed) {
            InterpretedTransaction::PaymentRemittance {
                claims,
                service_lines,
                total_payment,
            } => {
                assert_eq!(claims.len(), 2);
                assert_eq!(service_lines.len(), 1);
                assert_eq!(claims[0].claim_id, "CLAIM1");
                assert!((total_payment - 100.50).abs() < f64::EPSILON);
            }
            other => panic!("unexpected interpretation: {other:?}"),
        }
    }

    #[test]
    fn claim_line_composite_procedure() {
        let raw = "ISA*00* *00* *ZZ*A*ZZ*B*240101*0000*^*00501*000000001*0*P*:~\
                   GS*HC*A*B*20240101*0000*1*X*005010X222A1~\
                   ST*837*0001~CLM*PATCTL123*125.00***11:B:1*Y~\
                   LX*1~SV1*HC:99213*125.00*UN*1~\
                   SE*5*0001~GE*1*1~IEA*1*000000001~";
        let parsed = parse(raw).unwrap();
        match interpret(&parsed) {
            InterpretedTransaction::Claim {
                claim_id,
                total_charge,
                facility_code,
                lines,
            } => {
                assert_eq!(claim_id.as_deref(), Some("PATCTL123"));
                assert_eq!(total_charge, Some(125.0));
                assert_eq!(facility_code.as_deref(), Some("11:B:1"));
                assert_eq!(lines.len(), 1);
                assert_eq!(lines[0].procedure, "99213");
                assert_eq!(lines[0].units.as_deref(), Some("1"));
            }
            other => panic!("unexpected interpretation: {other:?}"),
        }
    }
}
