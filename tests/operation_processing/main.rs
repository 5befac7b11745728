//! End-to-end tests of the operation processing pipeline
//!
//! Every test drives a CometEngine through `post` and inspects the committed
//! state, the revision log and the request counters.

mod common;

mod access;
mod atomicity;
mod containment;
mod files;
mod ordering;
mod revisions;
