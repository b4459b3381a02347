//! Telemetry ingestion receivers.

mod http;

pub use http::{
    ingest_router, ingest_router_with_limit, CustomEventPayload, ErrorAck, ErrorEventPayload,
    EventAck, IngestError, IngestState, PageViewPayload, ReplayBatchPayload, ReplayMetadataPayload,
    ENVIRONMENT_HEADER, PROJECT_ID_HEADER,
};
