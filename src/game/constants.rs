/// Team and selection constants
pub mod team {
    /// Number of playable teams
    pub const COUNT: usize = 2;
    /// Selection index meaning "no team chosen yet"
    pub const UNSELECTED: u8 = 2;
    /// Highest selection index reachable by select-right
    pub const MAX_SELECTION: u8 = 2;
    /// Number of player slots on the team selection panel
    pub const SLOTS: usize = 2;
}

/// Match rules
pub mod rules {
    use std::time::Duration;

    /// Score at which a team wins the match
    pub const MAX_SCORE: u32 = 3;
    /// Delay between a goal trigger and the round-advance request
    pub const GOAL_DELAY: Duration = Duration::from_millis(1000);
}

/// Ball contact response
pub mod bounce {
    /// Impulse magnitude applied along the contact normal on wall hits
    pub const WALL: f32 = 250.0;
    /// Impulse magnitude applied along the contact normal on player hits
    pub const PLAYER: f32 = 400.0;
}

/// Arena layout defaults
pub mod arena {
    use crate::util::vec3::Vec3;

    /// Ball spawn origin
    pub const BALL_ORIGIN: Vec3 = Vec3::UP;
    /// Number of goal portals (one per team)
    pub const PORTAL_COUNT: usize = 2;
    /// Player spawn points indexed by team
    pub const SPAWN_POINTS: [Vec3; 2] = [Vec3::new(-4.0, 0.5, 0.0), Vec3::new(4.0, 0.5, 0.0)];
    /// Candidate positions portals are drawn from each round
    pub const PORTAL_CANDIDATES: [Vec3; 6] = [
        Vec3::new(-8.0, 0.0, -4.0),
        Vec3::new(-8.0, 0.0, 4.0),
        Vec3::new(0.0, 0.0, -6.0),
        Vec3::new(0.0, 0.0, 6.0),
        Vec3::new(8.0, 0.0, -4.0),
        Vec3::new(8.0, 0.0, 4.0),
    ];
    /// Player movement speed in world units per second
    pub const PLAYER_SPEED: f32 = 1.0;
}

/// Network constants
pub mod net {
    /// Actor number assigned to the first peer in a room
    pub const FIRST_ACTOR: u32 = 1;
    /// Low bits of an entity id holding the per-actor serial; the actor
    /// sits above them
    pub const ENTITY_SERIAL_BITS: u32 = 32;
    /// Scene-owned view hosting match-wide invocations
    pub const MATCH_VIEW: u64 = 1;
    /// Peer tick rate in Hz
    pub const TICK_RATE: u32 = 30;
}

/// Persisted settings key for a player's locked team
pub fn team_key(actor: u32) -> String {
    format!("player{}Team", actor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_team_key_format() {
        assert_eq!(team_key(1), "player1Team");
        assert_eq!(team_key(42), "player42Team");
    }

    #[test]
    fn test_default_portal_candidates_are_distinct() {
        let candidates = arena::PORTAL_CANDIDATES;
        for (i, a) in candidates.iter().enumerate() {
            for b in &candidates[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert!(candidates.len() >= arena::PORTAL_COUNT);
    }

    #[test]
    fn test_unselected_is_outside_team_range() {
        assert_eq!(team::UNSELECTED as usize, team::COUNT);
    }
}
