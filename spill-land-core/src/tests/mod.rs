//! Test suites, one file per area.

mod support;
