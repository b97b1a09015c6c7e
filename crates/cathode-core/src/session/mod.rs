mod filter;
mod mediator;

pub use filter::{FilterChains, SessionFilter};
pub use mediator::{tokens_to_events, Mediator, MediatorConfig};
