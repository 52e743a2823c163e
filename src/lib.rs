pub mod config;
pub mod dates;
pub mod gazetteer;
pub mod intent;
pub mod llm;
pub mod orchestrator;
pub mod params;
pub mod respond;
pub mod route;
pub mod session;
pub mod store;

/// Application name for XDG paths
pub const APP_NAME: &str = "kutcheri";
