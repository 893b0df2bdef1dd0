//! Integration tests for the blockfuse core, run against mockito HTTP
//! servers standing in for the execution layer, beacon API, and MEV
//! relays. No test touches the live network.

#[cfg(test)]
mod common;

#[cfg(test)]
mod el_client_tests;

#[cfg(test)]
mod beacon_client_tests;

#[cfg(test)]
mod relay_client_tests;

#[cfg(test)]
mod mempool_tests;

#[cfg(test)]
mod track_tests;

#[cfg(test)]
mod snapshot_tests;
