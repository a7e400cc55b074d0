mod client;
mod error;
mod method;

pub use client::{fetch_entities, GraphApi, GraphClient};
pub use error::{GraphError, GraphResult};
pub use method::{ApiMethod, ApiRequest};
