use rustls::crypto::{CryptoProvider, aws_lc_rs};
use std::sync::OnceLock;
use tracing::debug;

/// Make sure a process-wide rustls provider exists before any TLS client is built.
///
/// reqwest (built without a bundled provider) and tokio-tungstenite both take
/// their crypto from the process default. A provider already installed by the
/// embedding application is kept.
pub fn install_rustls_provider() {
    static READY: OnceLock<()> = OnceLock::new();
    READY.get_or_init(|| {
        if CryptoProvider::get_default().is_some() {
            debug!("Using the application's rustls provider");
            return;
        }
        // Losing a race to another installer is fine: any default will do.
        let _ = aws_lc_rs::default_provider().install_default();
    });
}
