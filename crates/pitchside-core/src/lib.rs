// Library root: entities, mapping, vote seeding, seed data and configuration
// shared by the LLM and app crates.

pub mod config;
pub mod mapper;
pub mod model;
pub mod seed;
pub mod votes;
