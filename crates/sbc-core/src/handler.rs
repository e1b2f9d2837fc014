//! Method handlers
//!
//! The last pipeline stage hands the processed message to the handler
//! registered for its method. Handlers decide what goes back to the caller:
//! a locally generated response, or the message to forward.

use anyhow::Result;
use async_trait::async_trait;
use border_sip_message::SipMessage;

/// Trait for consuming messages that passed every border check.
///
/// # Example
///
/// ```ignore
/// use border_sbc_core::MessageHandler;
///
/// struct OptionsResponder;
///
/// #[async_trait::async_trait]
/// impl MessageHandler for OptionsResponder {
///     async fn handle(&self, msg: &SipMessage) -> anyhow::Result<SipMessage> {
///         Ok(SipMessage::response_to(msg, 200, "OK"))
///     }
/// }
/// ```
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Produce the message returned to the pipeline caller.
    ///
    /// An `Err` is surfaced from `process_message` unchanged.
    async fn handle(&self, msg: &SipMessage) -> Result<SipMessage>;
}

/// Forwards the processed message as-is.
/// Used when no handler is registered for a method.
#[derive(Debug, Clone, Default)]
pub struct ForwardHandler;

#[async_trait]
impl MessageHandler for ForwardHandler {
    async fn handle(&self, msg: &SipMessage) -> Result<SipMessage> {
        Ok(msg.clone())
    }
}
