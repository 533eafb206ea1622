pub mod credentials;
pub mod handlers;
pub mod pkce;
pub mod redirect;
pub mod refresh;
pub mod state;

pub use handlers::{router, BrokerState};
