// ============================================================================
// Review Worker
// ============================================================================
//
// - transport.rs     - Delivery + DeliveryTransport (broker primitives)
// - redis_streams.rs - Redis Streams consumer-group transport
// - disposition.rs   - Disposition and the error -> disposition policy
// - processor.rs     - per-delivery state machine
// - dispatch.rs      - pull loop applying dispositions to the transport
//
// ============================================================================

pub mod dispatch;
pub mod disposition;
pub mod processor;
pub mod redis_streams;
pub mod transport;

pub use dispatch::{DispatchStats, apply_disposition, dispatch_one, run_dispatch_loop};
pub use disposition::{Disposition, disposition_for_error};
pub use processor::{ProcessOutcome, ProcessingState, ReviewProcessor, Resolution};
pub use redis_streams::RedisStreamTransport;
pub use transport::{Delivery, DeliveryTransport};
