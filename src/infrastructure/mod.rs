/// Infrastructure Layer - Technical Implementations
///
/// Implementations of the narrow contracts the pipeline consumes from the
/// outside world.
///
/// ## Modules
/// - `persistence`: order / trade persistence behind the update chain

pub mod persistence;

// Re-export key types
pub use persistence::{InMemoryOrderTradePersister, OrderTradePersister, PersistingUpdateHandler};
