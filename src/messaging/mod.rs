/*!
 * Messaging primitives connecting pipeline stages.
 *
 * - `topic`: fan-out broadcaster wrapping messages in topic envelopes
 * - `queue`: at-least-once work queue with visibility timeouts and redrive
 */

pub mod queue;
pub mod topic;

pub use self::queue::{QueueConfig, QueueMessage, QueueStats, WorkQueue};
pub use self::topic::Topic;
