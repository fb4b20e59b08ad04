//! One module per wire-protocol pattern (spec §4.7). Each covers one or
//! more of the closed `Protocol` vocabulary's tags; vendor differences
//! within a pattern are expressed through constructor parameters and
//! `AdapterConfig.extra`, not separate code paths.

pub mod browser_scrape;
mod common;
pub mod hmac_rest;
pub mod html_scrape;
pub mod oauth2_rest;
pub mod oclc_worldcat;
pub mod spa_scrape;
pub mod sru;
pub mod two_phase_rest;
