//! End-to-end tests over real files.
//!
//! Each test file covers one scenario through the public API, using seeded
//! inputs so that failures reproduce.

#![cfg(test)]

mod helpers;

mod test_determinism;
mod test_eviction;
mod test_header_rejection;
mod test_ordering;
mod test_persistence;
mod test_secondary_index;
mod test_split_shape;
mod test_spelled_numbers;
