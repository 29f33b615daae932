//! # Nimbus Triggers
//!
//! Adapters that run the three trigger shapes through the interceptor
//! pipeline:
//!
//! | Adapter | Input | Result |
//! |---------|-------|--------|
//! | [`ApiAdapter`] | [`ApiRequest`](nimbus_core::ApiRequest) | [`ApiResponse`](nimbus_core::ApiResponse) or error |
//! | [`BatchAdapter`] | [`ChangeBatch`](nimbus_core::ChangeBatch) | `()` or error |
//! | [`ScheduledAdapter`] | [`ScheduledEvent`](nimbus_core::ScheduledEvent) | `()` or error |
//!
//! All adapters share one [`Pipeline`]. The first pipeline built against an
//! empty registry registers the standard interceptors; each adapter builds
//! its chain once and reuses it for every invocation.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use nimbus_config::PipelineConfig;
//! use nimbus_core::{fixtures, Outcome};
//! use nimbus_middleware::handler_fn;
//! use nimbus_telemetry::MemorySink;
//! use nimbus_triggers::{for_each_record, BatchAdapter, Pipeline};
//!
//! # tokio_test::block_on(async {
//! let pipeline = Pipeline::builder(PipelineConfig {
//!     auth_enabled: false,
//!     flush_interval_secs: 0,
//!     ..PipelineConfig::default()
//! })
//! .metrics_sink(Arc::new(MemorySink::new()))
//! .build()
//! .unwrap();
//!
//! let thumbnails = BatchAdapter::new(
//!     &pipeline,
//!     handler_fn(|_ctx, event| async move {
//!         if let nimbus_core::TriggerEvent::Batch(batch) = event {
//!             let report = for_each_record(&batch, |_record| async { Ok(()) }).await;
//!             assert!(report.is_clean());
//!         }
//!         Ok(Outcome::Completed)
//!     }),
//! );
//!
//! thumbnails.handle(fixtures::change_batch(3)).await.unwrap();
//! pipeline.shutdown().await;
//! # });
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod api;
pub mod batch;
pub mod error;
pub mod pipeline;
pub mod scheduled;

pub use api::ApiAdapter;
pub use batch::{for_each_record, BatchAdapter, BatchReport, RecordFailure, BATCH_OPERATION};
pub use error::AdapterError;
pub use pipeline::{Pipeline, PipelineBuilder};
pub use scheduled::ScheduledAdapter;
