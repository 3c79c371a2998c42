/*!
 * # translate-relay
 *
 * An event-driven document translation pipeline.
 *
 * A document written into the source bucket raises an "object created"
 * event. The event is fanned out through a topic into a work queue, consumed
 * in batches by the translation worker, and the translated document is
 * written into the result bucket under `translated_<key>`. That write raises
 * a second event which flows through an identical topic and queue chain to
 * the completion worker, which notifies a recipient.
 *
 * ## Features
 *
 * - At-least-once delivery with visibility timeouts and redelivery
 * - Per-message and per-unit failure isolation inside a batch
 * - Configurable failure policy (`drop` or `dead_letter`)
 * - Translation through Ollama or Anthropic, or an offline mock
 * - In-memory and filesystem object stores
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management and worker environment settings
 * - `event`: Change events and two-level envelope decoding
 * - `storage`: Object store capability and implementations
 * - `messaging`: Topics and work queues
 * - `providers`: Translation capability and LLM provider clients
 * - `notify`: Notification capability
 * - `worker`: Batch worker, the two pipeline stages and the queue runner
 * - `pipeline`: Assembly of both stages
 * - `app_controller`: Directory runs through the pipeline
 * - `language_utils`: ISO language code utilities
 * - `errors`: Custom error types for the application
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod errors;
pub mod event;
pub mod language_utils;
pub mod messaging;
pub mod notify;
pub mod pipeline;
pub mod providers;
pub mod storage;
pub mod worker;

// Re-export main types for easier usage
pub use app_config::{Config, FailurePolicy};
pub use errors::{AppError, DecodeError, StoreError, TranslationError, UnitError, WorkerError};
pub use event::{Decoded, WorkUnit, decode_message};
pub use pipeline::Pipeline;
pub use providers::{TranslationRequest, Translator};
pub use worker::{BatchWorker, UnitHandler};
