//! Scene flow: launcher, team selection and arena

pub mod scene;
