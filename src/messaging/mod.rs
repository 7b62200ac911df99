//! # Messaging
//!
//! Durable collection job queue on pgmq. The [`CollectionQueue`] trait is the
//! seam the scheduler polls through; [`PgmqCollectionQueue`] is the
//! production implementation.

pub mod errors;
pub mod message;
pub mod pgmq_client;

pub use errors::{MessagingError, QueueOp};
pub use message::{CollectionMessage, QueuedMessage};
pub use pgmq_client::{CollectionQueue, PgmqCollectionQueue};
