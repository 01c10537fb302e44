use std::path::PathBuf;
use std::time::Duration;

use crate::game::constants::{arena, bounce, net, rules};
use crate::util::vec3::Vec3;

/// Peer configuration
#[derive(Debug, Clone)]
pub struct GameConfig {
    /// Score at which a team wins
    pub max_score: u32,
    /// Deferral between a goal trigger and the round-advance request
    pub goal_delay: Duration,
    /// Local tick rate in Hz
    pub tick_rate: u32,
    /// Impulse along the contact normal for wall contacts
    pub wall_bounce: f32,
    /// Impulse along the contact normal for player contacts
    pub player_bounce: f32,
    /// Player movement speed
    pub player_speed: f32,
    /// Where the ball is spawned each round
    pub ball_origin: Vec3,
    /// Player spawn points indexed by team
    pub spawn_points: [Vec3; 2],
    /// Number of portals relocated each round
    pub portal_count: usize,
    /// Candidate portal positions
    pub portal_candidates: Vec<Vec3>,
    /// JSON settings file (in-memory store when unset)
    pub settings_path: Option<PathBuf>,
    /// Port for the metrics endpoint (disabled when unset)
    pub metrics_port: Option<u16>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            max_score: rules::MAX_SCORE,
            goal_delay: rules::GOAL_DELAY,
            tick_rate: net::TICK_RATE,
            wall_bounce: bounce::WALL,
            player_bounce: bounce::PLAYER,
            player_speed: arena::PLAYER_SPEED,
            ball_origin: arena::BALL_ORIGIN,
            spawn_points: arena::SPAWN_POINTS,
            portal_count: arena::PORTAL_COUNT,
            portal_candidates: arena::PORTAL_CANDIDATES.to_vec(),
            settings_path: None,
            metrics_port: None,
        }
    }
}

impl GameConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(max_score) = std::env::var("MAX_SCORE") {
            match max_score.parse::<u32>() {
                Ok(parsed) if parsed > 0 => config.max_score = parsed,
                Ok(_) => tracing::warn!("MAX_SCORE must be > 0, using default"),
                Err(_) => tracing::warn!("Invalid MAX_SCORE '{}', using default", max_score),
            }
        }

        if let Ok(delay) = std::env::var("GOAL_DELAY_MS") {
            if let Ok(parsed) = delay.parse::<u64>() {
                config.goal_delay = Duration::from_millis(parsed);
            } else {
                tracing::warn!("Invalid GOAL_DELAY_MS '{}', using default", delay);
            }
        }

        if let Ok(tick_rate) = std::env::var("TICK_RATE") {
            match tick_rate.parse::<u32>() {
                Ok(parsed) if (1..=240).contains(&parsed) => config.tick_rate = parsed,
                Ok(_) => tracing::warn!("TICK_RATE must be 1-240, using default"),
                Err(_) => tracing::warn!("Invalid TICK_RATE '{}', using default", tick_rate),
            }
        }

        if let Some(value) = parse_f32_env("WALL_BOUNCE") {
            config.wall_bounce = value;
        }
        if let Some(value) = parse_f32_env("PLAYER_BOUNCE") {
            config.player_bounce = value;
        }
        if let Some(value) = parse_f32_env("PLAYER_SPEED") {
            config.player_speed = value;
        }

        if let Ok(path) = std::env::var("SETTINGS_PATH") {
            config.settings_path = Some(PathBuf::from(path));
        }

        if let Ok(port) = std::env::var("METRICS_PORT") {
            match port.parse::<u16>() {
                Ok(parsed) if parsed > 0 => config.metrics_port = Some(parsed),
                _ => tracing::warn!("Invalid METRICS_PORT '{}', metrics endpoint disabled", port),
            }
        }

        config
    }

    /// Fixed simulation step derived from the tick rate
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate as f64)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.max_score == 0 {
            return Err("max_score must be at least 1".to_string());
        }
        if self.tick_rate == 0 {
            return Err("tick_rate must be at least 1".to_string());
        }
        if self.portal_count == 0 {
            return Err("portal_count must be at least 1".to_string());
        }
        let distinct = crate::game::arena::distinct_count(&self.portal_candidates);
        if distinct < self.portal_count {
            return Err(format!(
                "portal_candidates has {} distinct positions, need at least {}",
                distinct, self.portal_count
            ));
        }
        if !self.spawn_points.iter().all(Vec3::is_finite) || !self.ball_origin.is_finite() {
            return Err("spawn points and ball origin must be finite".to_string());
        }
        Ok(())
    }
}

fn parse_f32_env(name: &str) -> Option<f32> {
    let raw = std::env::var(name).ok()?;
    match raw.parse::<f32>() {
        Ok(parsed) if parsed.is_finite() && parsed >= 0.0 => Some(parsed),
        _ => {
            tracing::warn!("Invalid {} '{}', using default", name, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GameConfig::default();
        assert_eq!(config.max_score, 3);
        assert_eq!(config.goal_delay, Duration::from_secs(1));
        assert_eq!(config.portal_count, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_or_default() {
        let config = GameConfig::load_or_default();
        assert!(config.max_score > 0);
        assert!(config.tick_rate > 0);
    }

    #[test]
    fn test_validate_rejects_too_few_candidates() {
        let config = GameConfig {
            portal_candidates: vec![Vec3::ZERO, Vec3::ZERO, Vec3::ZERO],
            ..GameConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_max_score() {
        let config = GameConfig {
            max_score: 0,
            ..GameConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tick_duration() {
        let config = GameConfig {
            tick_rate: 50,
            ..GameConfig::default()
        };
        assert_eq!(config.tick_duration(), Duration::from_millis(20));
    }
}
