pub mod traits;  // Runner contracts
pub mod caddy;   // Primary daemon (TLS terminator)
pub mod xray;    // Transport daemon: config markers, patching, launch
pub mod certs;   // Certificate storage discovery
pub mod process; // Supervised subprocesses
pub mod retry;   // Bounded fixed-interval polling
pub mod health;  // Container health surface
