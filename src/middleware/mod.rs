//! Request pipeline middleware.
//!
//! [`request_id`] stands in for the hosting layer and assigns every request
//! its trace identifier, [`tower::RequestLoggingLayer`] logs the request
//! lifecycle against it.

pub mod request_id;
pub mod tower;

pub use self::{
    request_id::{
        propagate_trace_identifier_layer, set_trace_identifier_layer, TraceIdentifier,
        TRACE_IDENTIFIER_HEADER,
    },
    tower::RequestLoggingLayer,
};
