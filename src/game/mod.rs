pub mod constants;
pub mod entities;
pub mod ownership;
pub mod team_selection;
pub mod match_state;
pub mod match_result;
pub mod ball;
pub mod arena;
pub mod scheduler;
pub mod input;
