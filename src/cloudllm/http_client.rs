//! A shared, pooled HTTP client.
//!
//! Grounded on the teacher's `SHARED_HTTP_CLIENT` (`clients/common.rs`, since removed from
//! this crate): every provider should reuse one `reqwest::Client` so connection pooling
//! and TLS session resumption actually kick in across turns, instead of paying a fresh
//! handshake per request.

use lazy_static::lazy_static;
use reqwest::Client;
use std::time::Duration;

lazy_static! {
    pub static ref SHARED_HTTP_CLIENT: Client = Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
        .expect("failed to build shared HTTP client");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_client_is_reusable() {
        let a: &Client = &SHARED_HTTP_CLIENT;
        let b: &Client = &SHARED_HTTP_CLIENT;
        assert!(std::ptr::eq(a, b));
    }
}
