//! Reference catalog loaded at start-up
//!
//! Upserts by id, so re-seeding an existing repository changes nothing.

use crate::error::ServerError;
use crate::repository::PulseRepository;
use pulse_model::{Candidate, Office, Scope};

const LAGOS: &str = "Lagos";
const IKEJA: &str = "Ikeja";

/// Seven offices across the four scopes
#[must_use]
pub fn offices() -> Vec<Office> {
    vec![
        Office::new("pres", "PRESIDENT", "President", Scope::National),
        Office::new("gov", "GOVERNOR", "Governor", Scope::State),
        Office::new("senate", "SENATE", "Senate", Scope::State),
        Office::new("reps", "REPS", "House of Representatives", Scope::State),
        Office::new("assembly", "STATE_ASSEMBLY", "State House of Assembly", Scope::State),
        Office::new("lga_chair", "LGA_CHAIR", "Local Government Chair", Scope::Lga),
        Office::new("councillor", "COUNCILLOR", "Councillor", Scope::Ward),
    ]
}

/// Sample candidates: national, Lagos state and Lagos/Ikeja
#[must_use]
pub fn candidates() -> Vec<Candidate> {
    vec![
        Candidate::new("p1", "Candidate A", "Party 1", "pres"),
        Candidate::new("p2", "Candidate B", "Party 2", "pres"),
        Candidate::new("p3", "Candidate C", "Party 3", "pres"),
        Candidate::new("g1", "Candidate X", "Party 1", "gov").in_state(LAGOS),
        Candidate::new("g2", "Candidate Y", "Party 2", "gov").in_state(LAGOS),
        Candidate::new("c1", "Chair Alpha", "Party 1", "lga_chair")
            .in_state(LAGOS)
            .in_lga(IKEJA),
        Candidate::new("c2", "Chair Beta", "Party 3", "lga_chair")
            .in_state(LAGOS)
            .in_lga(IKEJA),
    ]
}

/// Load the sample catalog
///
/// # Errors
/// Storage failures
pub async fn seed_catalog(repo: &dyn PulseRepository) -> Result<(), ServerError> {
    let offices = offices();
    let candidates = candidates();
    let (office_count, candidate_count) = (offices.len(), candidates.len());

    for office in offices {
        repo.upsert_office(office).await?;
    }
    for candidate in candidates {
        repo.upsert_candidate(candidate).await?;
    }

    tracing::info!(offices = office_count, candidates = candidate_count, "catalog seeded");
    Ok(())
}
