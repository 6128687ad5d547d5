pub mod http;
pub mod target;

pub use http::{ApiResponse, EndpointClass, RetryClient, TargetRequest};
pub use target::TargetStoreClient;
