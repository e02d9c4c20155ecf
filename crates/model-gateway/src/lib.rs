//! Upstream generation gateway client.
//!
//! The gateway is the cost oracle: it streams incremental generation
//! events and finishes with token usage, a provider-reported monetary
//! cost, and a provider generation id.

mod client;
mod error;
mod types;

pub use client::HttpGateway;
pub use error::GatewayError;
pub use types::*;

use async_trait::async_trait;
use futures::stream::BoxStream;

/// Stream of gateway events for one generation.
pub type GatewayEventStream = BoxStream<'static, Result<GatewayEvent, GatewayError>>;

/// An upstream model provider capable of streaming one generation.
#[async_trait]
pub trait GenerationGateway: Send + Sync {
    async fn stream_generation(
        &self,
        request: GatewayRequest,
    ) -> Result<GatewayEventStream, GatewayError>;
}

/// Executes a single tool call on behalf of the model.
///
/// Concrete tools are wired in by the application; the runner only needs
/// the call/output contract.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(&self, call: &ToolCall) -> ToolOutput;
}
