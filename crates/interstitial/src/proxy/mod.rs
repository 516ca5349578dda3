mod error;
mod models;
mod relay;
mod rewrite;
mod server;
mod upstream;

pub use error::{ProxyError, json_error_response};
pub use models::{
    ModelCard, ModelListing, ModelPermission, ModelResolver, ResolverError, derive_model_id,
    model_id_from_response, probe_payload,
};
pub use relay::{
    ClientStream, OutcomeHandle, Relay, RelayOutcome, StreamRelay, diagnostic_fragment,
};
pub use rewrite::{Message, last_user_index, rewrite};
pub use server::{AppState, ProxyServer, create_router};
pub use upstream::{UpstreamClient, UpstreamError, UpstreamStream};
