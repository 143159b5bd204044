pub mod actor;
pub mod client;
pub mod demande;
