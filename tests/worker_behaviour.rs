//! Behavioural scenarios for the snapshot worker.

mod worker;
