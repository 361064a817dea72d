//! Outbound transaction generation: 270/276/278/837P plus the 999
//! functional acknowledgment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::envelope::{control_number, pad_isa_id};
use crate::parse::ParsedInterchange;
use crate::partner::TradingPartner;
use crate::types::TransactionSetKind;

/// Transaction families the gateway can originate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboundKind {
    Eligibility270,
    ClaimStatusInquiry276,
    PriorAuthRequest278,
    ProfessionalClaim837,
}

impl OutboundKind {
    pub fn set_kind(self) -> TransactionSetKind {
        match self {
            Self::Eligibility270 => TransactionSetKind::Eligibility270,
            Self::ClaimStatusInquiry276 => TransactionSetKind::ClaimStatusInquiry276,
            Self::PriorAuthRequest278 => TransactionSetKind::PriorAuthRequest278,
            Self::ProfessionalClaim837 => TransactionSetKind::ProfessionalClaim837,
        }
    }

    pub fn from_canonical_name(name: &str) -> Option<Self> {
        match TransactionSetKind::from_canonical_name(name)? {
            TransactionSetKind::Eligibility270 => Some(Self::Eligibility270),
            TransactionSetKind::ClaimStatusInquiry276 => Some(Self::ClaimStatusInquiry276),
            TransactionSetKind::PriorAuthRequest278 => Some(Self::PriorAuthRequest278),
            TransactionSetKind::ProfessionalClaim837 => Some(Self::ProfessionalClaim837),
            _ => None,
        }
    }
}

/// Business data for outbound generation. One bag shared across the four
/// families; absent fields fall back to neutral placeholders the same way
/// partner-facing defaults are applied on inbound gaps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OutboundData {
    pub sender_id: Option<String>,
    pub payer_name: Option<String>,
    pub payer_id: Option<String>,
    pub provider_name: Option<String>,
    pub provider_npi: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub member_id: Option<String>,
    pub dob: Option<String>,
    pub claim_id: Option<String>,
    pub service_type: Option<String>,
    pub diagnosis_code: Option<String>,
    // 837P specific
    pub submitter_name: Option<String>,
    pub submitter_id: Option<String>,
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    pub receiver_name: Option<String>,
    pub receiver_id: Option<String>,
    pub billing_provider_name: Option<String>,
    pub billing_provider_npi: Option<String>,
    pub billing_provider_address: Option<String>,
    pub billing_provider_city: Option<String>,
    pub billing_provider_state: Option<String>,
    pub billing_provider_zip: Option<String>,
    pub billing_provider_tax_id: Option<String>,
    pub group_number: Option<String>,
    pub subscriber_last_name: Option<String>,
    pub subscriber_first_name: Option<String>,
    pub subscriber_address: Option<String>,
    pub subscriber_city: Option<String>,
    pub subscriber_state: Option<String>,
    pub subscriber_zip: Option<String>,
    pub subscriber_dob: Option<String>,
    pub subscriber_gender: Option<String>,
    pub total_charge: Option<f64>,
    pub charge_amount: Option<f64>,
    pub procedure_code: Option<String>,
    pub service_date: Option<String>,
}

impl OutboundData {
    fn or(&self, value: &Option<String>, fallback: &str) -> String {
        value.clone().unwrap_or_else(|| fallback.to_string())
    }
}

struct EnvelopeNumbers {
    isa: String,
    gs: String,
    st: String,
}

impl EnvelopeNumbers {
    fn fresh() -> Self {
        Self {
            isa: control_number(9),
            gs: control_number(9),
            st: control_number(4),
        }
    }
}

/// Generate an outbound interchange for `kind`, addressed to `partner`.
pub fn generate(kind: OutboundKind, data: &OutboundData, partner: &TradingPartner) -> String {
    let now = Utc::now();
    let numbers = EnvelopeNumbers::fresh();
    match kind {
        OutboundKind::Eligibility270 => generate_270(data, partner, &numbers, now),
        OutboundKind::ClaimStatusInquiry276 => generate_276(data, partner, &numbers, now),
        OutboundKind::PriorAuthRequest278 => generate_278(data, partner, &numbers, now),
        OutboundKind::ProfessionalClaim837 => generate_837p(data, partner, &numbers, now),
    }
}

fn isa_segment(
    sender: &str,
    receiver: &str,
    numbers: &EnvelopeNumbers,
    now: DateTime<Utc>,
) -> String {
    format!(
        "ISA*00*          *00*          *ZZ*{}*ZZ*{}*{}*{}*^*00501*{}*0*P*:",
        pad_isa_id(sender),
        pad_isa_id(receiver),
        now.format("%y%m%d"),
        now.format("%H%M"),
        numbers.isa
    )
}

fn gs_segment(
    kind: TransactionSetKind,
    sender: &str,
    receiver: &str,
    numbers: &EnvelopeNumbers,
    now: DateTime<Utc>,
) -> String {
    format!(
        "GS*{}*{}*{}*{}*{}*{}*X*{}",
        kind.functional_group(),
        sender,
        receiver,
        now.format("%Y%m%d"),
        now.format("%H%M"),
        numbers.gs,
        kind.convention_reference()
    )
}

fn bht_reference() -> String {
    Uuid::new_v4().simple().to_string()[..20].to_string()
}

fn finish(mut segments: Vec<String>, numbers: &EnvelopeNumbers) -> String {
    // SE01 counts ST..SE inclusive: everything after ISA/GS, plus SE itself.
    let set_count = segments.len() - 2 + 1;
    segments.push(format!("SE*{}*{}", set_count, numbers.st));
    segments.push(format!("GE*1*{}", numbers.gs));
    segments.push(format!("IEA*1*{}", numbers.isa));
    let mut out = segments.join("~");
    out.push('~');
    out
}

fn generate_270(
    data: &OutboundData,
    partner: &TradingPartner,
    numbers: &EnvelopeNumbers,
    now: DateTime<Utc>,
) -> String {
    let sender = data.or(&data.sender_id, "SENDER");
    let kind = TransactionSetKind::Eligibility270;
    let segments = vec![
        isa_segment(&sender, partner.isa_id(), numbers, now),
        gs_segment(kind, &sender, partner.gs_id(), numbers, now),
        format!("ST*270*{}*{}", numbers.st, kind.convention_reference()),
        format!(
            "BHT*0022*13*{}*{}*{}",
            bht_reference(),
            now.format("%Y%m%d"),
            now.format("%H%M")
        ),
        "HL*1**20*1".to_string(),
        format!(
            "NM1*PR*2*{}*****PI*{}",
            data.or(&data.payer_name, "PAYER"),
            data.or(&data.payer_id, "")
        ),
        "HL*2*1*21*1".to_string(),
        format!(
            "NM1*1P*2*{}*****XX*{}",
            data.or(&data.provider_name, "PROVIDER"),
            data.or(&data.provider_npi, "")
        ),
        "HL*3*2*22*0".to_string(),
        format!(
            "NM1*IL*1*{}*{}****MI*{}",
            data.or(&data.last_name, ""),
            data.or(&data.first_name, ""),
            data.or(&data.member_id, "")
        ),
        format!("DMG*D8*{}", data.or(&data.dob, "")),
        format!("DTP*291*D8*{}", now.format("%Y%m%d")),
        "EQ*30".to_string(),
    ];
    finish(segments, numbers)
}

fn generate_276(
    data: &OutboundData,
    partner: &TradingPartner,
    numbers: &EnvelopeNumbers,
    now: DateTime<Utc>,
) -> String {
    let sender = data.or(&data.sender_id, "SENDER");
    let kind = TransactionSetKind::ClaimStatusInquiry276;
    let provider = data.or(&data.provider_name, "PROVIDER");
    let npi = data.or(&data.provider_npi, "");
    let claim = data.or(&data.claim_id, "");
    let segments = vec![
        isa_segment(&sender, partner.isa_id(), numbers, now),
        gs_segment(kind, &sender, partner.gs_id(), numbers, now),
        format!("ST*276*{}*{}", numbers.st, kind.convention_reference()),
        format!(
            "BHT*0010*13*{}*{}*{}",
            bht_reference(),
            now.format("%Y%m%d"),
            now.format("%H%M")
        ),
        "HL*1**20*1".to_string(),
        format!(
            "NM1*PR*2*{}*****PI*{}",
            data.or(&data.payer_name, "PAYER"),
            data.or(&data.payer_id, "")
        ),
        "HL*2*1*21*1".to_string(),
        format!("NM1*41*2*{provider}*****46*{npi}"),
        "HL*3*2*19*1".to_string(),
        format!("NM1*1P*2*{provider}*****XX*{npi}"),
        "HL*4*3*22*0".to_string(),
        format!(
            "NM1*QC*1*{}*{}****MI*{}",
            data.or(&data.last_name, ""),
            data.or(&data.first_name, ""),
            data.or(&data.member_id, "")
        ),
        format!("TRN*1*{claim}"),
        format!("REF*1K*{claim}"),
    ];
    finish(segments, numbers)
}

fn generate_278(
    data: &OutboundData,
    partner: &TradingPartner,
    numbers: &EnvelopeNumbers,
    now: DateTime<Utc>,
) -> String {
    let sender = data.or(&data.sender_id, "SENDER");
    let kind = TransactionSetKind::PriorAuthRequest278;
    let segments = vec![
        isa_segment(&sender, partner.isa_id(), numbers, now),
        gs_segment(kind, &sender, partner.gs_id(), numbers, now),
        format!("ST*278*{}*{}", numbers.st, kind.convention_reference()),
        format!(
            "BHT*0007*11*{}*{}*{}",
            bht_reference(),
            now.format("%Y%m%d"),
            now.format("%H%M")
        ),
        "HL*1**20*1".to_string(),
        format!(
            "NM1*X3*2*{}*****PI*{}",
            data.or(&data.payer_name, "PAYER"),
            data.or(&data.payer_id, "")
        ),
        "HL*2*1*21*1".to_string(),
        format!(
            "NM1*1P*2*{}*****XX*{}",
            data.or(&data.provider_name, "PROVIDER"),
            data.or(&data.provider_npi, "")
        ),
        "HL*3*2*22*1".to_string(),
        format!(
            "NM1*IL*1*{}*{}****MI*{}",
            data.or(&data.last_name, ""),
            data.or(&data.first_name, ""),
            data.or(&data.member_id, "")
        ),
        "HL*4*3*EV*0".to_string(),
        format!("UM*HS*I*{}", data.or(&data.service_type, "")),
        format!("HI*BK:{}", data.or(&data.diagnosis_code, "")),
    ];
    finish(segments, numbers)
}

fn generate_837p(
    data: &OutboundData,
    partner: &TradingPartner,
    numbers: &EnvelopeNumbers,
    now: DateTime<Utc>,
) -> String {
    let sender = data.or(&data.sender_id, "SENDER");
    let kind = TransactionSetKind::ProfessionalClaim837;
    let service_date = data
        .service_date
        .clone()
        .unwrap_or_else(|| now.format("%Y%m%d").to_string());
    let segments = vec![
        isa_segment(&sender, partner.isa_id(), numbers, now),
        gs_segment(kind, &sender, partner.gs_id(), numbers, now),
        format!("ST*837*{}*{}", numbers.st, kind.convention_reference()),
        format!(
            "BHT*0019*00*{}*{}*{}*CH",
            bht_reference(),
            now.format("%Y%m%d"),
            now.format("%H%M")
        ),
        format!(
            "NM1*41*2*{}*****46*{}",
            data.or(&data.submitter_name, "SUBMITTER"),
            data.or(&data.submitter_id, "")
        ),
        format!(
            "PER*IC*{}*TE*{}",
            data.or(&data.contact_name, "CONTACT"),
            data.or(&data.contact_phone, "")
        ),
        format!(
            "NM1*40*2*{}*****46*{}",
            data.or(&data.receiver_name, "RECEIVER"),
            data.or(&data.receiver_id, "")
        ),
        "HL*1**20*1".to_string(),
        format!(
            "NM1*85*2*{}*****XX*{}",
            data.or(&data.billing_provider_name, "PROVIDER"),
            data.or(&data.billing_provider_npi, "")
        ),
        format!("N3*{}", data.or(&data.billing_provider_address, "")),
        format!(
            "N4*{}*{}*{}",
            data.or(&data.billing_provider_city, ""),
            data.or(&data.billing_provider_state, ""),
            data.or(&data.billing_provider_zip, "")
        ),
        format!("REF*EI*{}", data.or(&data.billing_provider_tax_id, "")),
        "HL*2*1*22*0".to_string(),
        format!("SBR*P*18*{}******CI", data.or(&data.group_number, "")),
        format!(
            "NM1*IL*1*{}*{}****MI*{}",
            data.or(&data.subscriber_last_name, ""),
            data.or(&data.subscriber_first_name, ""),
            data.or(&data.member_id, "")
        ),
        format!("N3*{}", data.or(&data.subscriber_address, "")),
        format!(
            "N4*{}*{}*{}",
            data.or(&data.subscriber_city, ""),
            data.or(&data.subscriber_state, ""),
            data.or(&data.subscriber_zip, "")
        ),
        format!(
            "DMG*D8*{}*{}",
            data.or(&data.subscriber_dob, ""),
            data.or(&data.subscriber_gender, "")
        ),
        format!(
            "NM1*PR*2*{}*****PI*{}",
            data.or(&data.payer_name, "PAYER"),
            data.or(&data.payer_id, "")
        ),
        format!(
            "CLM*{}*{}***11:B:1*Y*A*Y*Y",
            data.or(&data.claim_id, ""),
            data.total_charge.unwrap_or(0.0)
        ),
        format!("HI*ABK:{}", data.or(&data.diagnosis_code, "")),
        "LX*1".to_string(),
        format!(
            "SV1*HC:{}*{}*UN*1***1",
            data.or(&data.procedure_code, ""),
            data.charge_amount.unwrap_or(0.0)
        ),
        format!("DTP*472*D8*{service_date}"),
    ];
    finish(segments, numbers)
}

/// Build a 999 acknowledging `parsed`. IK5/AK9 carry "A" when the error
/// list is empty and "R" otherwise; AK1/AK2 reference the acknowledged
/// functional group and transaction set control numbers.
pub fn generate_999(parsed: &ParsedInterchange, errors: &[String]) -> String {
    let now = Utc::now();
    let numbers = EnvelopeNumbers::fresh();
    let ack_code = if errors.is_empty() { "A" } else { "R" };
    let accepted = if errors.is_empty() { 1 } else { 0 };

    let set_code = parsed
        .kind
        .map(|k| k.set_code())
        .unwrap_or("000");
    let family_code = &set_code[..2];

    // Acknowledgment flows back: receiver of the original becomes sender.
    let sender = parsed.envelope.receiver_id.as_str();
    let receiver = parsed.envelope.sender_id.as_str();
    let kind = TransactionSetKind::Acknowledgment999;

    let segments = vec![
        isa_segment(sender, receiver, &numbers, now),
        gs_segment(kind, sender, receiver, &numbers, now),
        format!("ST*999*{}*{}", numbers.st, kind.convention_reference()),
        format!("AK1*{}*{}", family_code, parsed.envelope.gs_control_number),
        format!("AK2*{}*{}", set_code, parsed.envelope.st_control_number),
        format!("IK5*{ack_code}"),
        format!("AK9*{ack_code}*1*1*{accepted}"),
    ];
    finish(segments, &numbers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse;
    use crate::validate::validate;

    fn partner() -> TradingPartner {
        TradingPartner {
            id: "partner-1".into(),
            name: "Acme Payer".into(),
            isa_id: Some("ACMEPAYER".into()),
            isa_qualifier: Some("ZZ".into()),
            gs_id: Some("ACMEPAYER".into()),
            endpoint_url: None,
            direct_domain: None,
            fhir_version: None,
        }
    }

    fn eligibility_data() -> OutboundData {
        OutboundData {
            sender_id: Some("CLINIC01".into()),
            payer_name: Some("ACME".into()),
            payer_id: Some("60054".into()),
            provider_name: Some("GOOD HEALTH".into()),
            provider_npi: Some("1234567890".into()),
            first_name: Some("JANE".into()),
            last_name: Some("DOE".into()),
            member_id: Some("W1234".into()),
            dob: Some("19800101".into()),
            ..Default::default()
        }
    }

    #[test]
    fn generated_270_round_trips() {
        let raw = generate(OutboundKind::Eligibility270, &eligibility_data(), &partner());
        let parsed = parse(&raw).unwrap();
        assert_eq!(parsed.kind, Some(TransactionSetKind::Eligibility270));
        assert_eq!(parsed.envelope.isa_control_number.len(), 9);
        assert_eq!(parsed.envelope.st_control_number.len(), 4);
        assert!(validate(&parsed).is_empty());
    }

    #[test]
    fn generated_276_278_837_validate() {
        for kind in [
            OutboundKind::ClaimStatusInquiry276,
            OutboundKind::PriorAuthRequest278,
            OutboundKind::ProfessionalClaim837,
        ] {
            let raw = generate(kind, &eligibility_data(), &partner());
            let parsed = parse(&raw).unwrap();
            assert_eq!(parsed.kind, Some(kind.set_kind()), "{kind:?}");
            assert!(validate(&parsed).is_empty(), "{kind:?}");
        }
    }

    #[test]
    fn ack_code_follows_error_list() {
        let raw = generate(OutboundKind::Eligibility270, &eligibility_data(), &partner());
        let parsed = parse(&raw).unwrap();

        let clean = generate_999(&parsed, &[]);
        assert!(clean.contains("IK5*A~"));
        assert!(clean.contains("AK9*A*1*1*1~"));

        let reject = generate_999(&parsed, &["Missing GE segment".to_string()]);
        assert!(reject.contains("IK5*R~"));
        assert!(reject.contains("AK9*R*1*1*0~"));
    }

    #[test]
    fn ack_references_original_control_numbers() {
        let raw = generate(OutboundKind::Eligibility270, &eligibility_data(), &partner());
        let parsed = parse(&raw).unwrap();
        let ack = generate_999(&parsed, &[]);
        assert!(ack.contains(&format!("AK1*27*{}", parsed.envelope.gs_control_number)));
        assert!(ack.contains(&format!("AK2*270*{}", parsed.envelope.st_control_number)));

        // Direction is reversed on the acknowledgment envelope.
        let ack_parsed = parse(&ack).unwrap();
        assert_eq!(ack_parsed.envelope.sender_id, parsed.envelope.receiver_id);
        assert_eq!(ack_parsed.envelope.receiver_id, parsed.envelope.sender_id);
    }
}
