//! Patient match deduplication across sources.

use std::collections::HashMap;

use crate::types::PatientMatch;

fn composite_key(patient: &PatientMatch) -> String {
    // Absent fields keep their slot so a missing first name can never
    // line up with a missing last name.
    [
        patient.first_name.as_deref().unwrap_or("").to_lowercase(),
        patient.last_name.as_deref().unwrap_or("").to_lowercase(),
        patient.date_of_birth.clone().unwrap_or_default(),
        patient.gender.clone().unwrap_or_default(),
    ]
    .join("|")
}

/// Collapse matches that describe the same person. Sources are unioned,
/// the best match score wins, and the result is ordered best first.
pub fn dedupe_patients(patients: Vec<PatientMatch>) -> Vec<PatientMatch> {
    let mut by_key: HashMap<String, PatientMatch> = HashMap::new();

    for patient in patients {
        let key = composite_key(&patient);
        match by_key.get_mut(&key) {
            None => {
                let mut first = patient;
                first.sources = vec![first.source.clone()];
                by_key.insert(key, first);
            }
            Some(existing) => {
                if !existing.sources.contains(&patient.source) {
                    existing.sources.push(patient.source.clone());
                }
                if patient.match_score > existing.match_score {
                    existing.match_score = patient.match_score;
                }
            }
        }
    }

    let mut deduped: Vec<PatientMatch> = by_key.into_values().collect();
    deduped.sort_by(|a, b| {
        b.match_score
            .partial_cmp(&a.match_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    deduped
}
