pub mod protocol;
pub mod substrate;
pub mod loopback;
pub mod authority;
pub mod session;
pub mod router;
pub mod game_session;
