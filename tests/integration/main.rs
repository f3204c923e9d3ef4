//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises one subsystem against
//! the mocks in `mock_hw`. All tests run on the host (x86_64) with no
//! real hardware required.

mod controller_tests;
mod gateway_tests;
mod mock_hw;
mod modem_tests;
