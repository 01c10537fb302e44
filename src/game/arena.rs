//! Arena layout: portal relocation and spawn point lookup

use rand::Rng;

use crate::game::entities::{IdsExhausted, Team};
use crate::util::vec3::Vec3;

/// Arena layout errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArenaError {
    #[error("need {needed} distinct portal candidates, have {available}")]
    InsufficientCandidates { needed: usize, available: usize },
    #[error(transparent)]
    Ids(#[from] IdsExhausted),
}

/// Number of pairwise-distinct positions in a candidate set
pub fn distinct_count(candidates: &[Vec3]) -> usize {
    candidates
        .iter()
        .enumerate()
        .filter(|(i, c)| !candidates[..*i].contains(c))
        .count()
}

/// Draw `count` pairwise-distinct portal positions from `candidates`.
///
/// Uniform rejection sampling: a draw already used this round is discarded
/// and redrawn. The candidate set is checked up front so the loop always
/// terminates.
pub fn sample_portal_positions<R: Rng + ?Sized>(
    candidates: &[Vec3],
    count: usize,
    rng: &mut R,
) -> Result<Vec<Vec3>, ArenaError> {
    let available = distinct_count(candidates);
    if available < count {
        return Err(ArenaError::InsufficientCandidates {
            needed: count,
            available,
        });
    }

    let mut chosen: Vec<Vec3> = Vec::with_capacity(count);
    while chosen.len() < count {
        let candidate = candidates[rng.gen_range(0..candidates.len())];
        if !chosen.contains(&candidate) {
            chosen.push(candidate);
        }
    }
    Ok(chosen)
}

/// Spawn point for a team
pub fn spawn_point(spawn_points: &[Vec3; 2], team: Team) -> Vec3 {
    spawn_points[team.index()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::constants::arena::PORTAL_CANDIDATES;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_positions_are_distinct_and_from_candidates() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let positions = sample_portal_positions(&PORTAL_CANDIDATES, 2, &mut rng).unwrap();
            assert_eq!(positions.len(), 2);
            assert_ne!(positions[0], positions[1]);
            assert!(positions.iter().all(|p| PORTAL_CANDIDATES.contains(p)));
        }
    }

    #[test]
    fn test_exact_fit_uses_every_candidate() {
        let candidates = [Vec3::new(1.0, 0.0, 0.0), Vec3::new(2.0, 0.0, 0.0)];
        let mut rng = StdRng::seed_from_u64(1);
        let mut positions = sample_portal_positions(&candidates, 2, &mut rng).unwrap();
        positions.sort_by(|a, b| a.x.total_cmp(&b.x));
        assert_eq!(positions, candidates.to_vec());
    }

    #[test]
    fn test_duplicate_candidates_do_not_count() {
        let candidates = [Vec3::ZERO, Vec3::ZERO, Vec3::ZERO];
        let mut rng = StdRng::seed_from_u64(3);
        let result = sample_portal_positions(&candidates, 2, &mut rng);
        assert_eq!(
            result,
            Err(ArenaError::InsufficientCandidates {
                needed: 2,
                available: 1
            })
        );
    }

    #[test]
    fn test_empty_candidates() {
        let mut rng = StdRng::seed_from_u64(3);
        assert!(sample_portal_positions(&[], 1, &mut rng).is_err());
        assert_eq!(sample_portal_positions(&[], 0, &mut rng), Ok(vec![]));
    }

    #[test]
    fn test_spawn_point_by_team() {
        let points = [Vec3::new(-1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0)];
        assert_eq!(spawn_point(&points, Team::Left), points[0]);
        assert_eq!(spawn_point(&points, Team::Right), points[1]);
    }
}
