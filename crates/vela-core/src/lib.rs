// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]

/// Installs the global subscriber. `RUST_LOG` wins; otherwise `default_directive`
/// (e.g. `"info"` or `"vela_render_vk=debug,info"`) is used.
pub fn init_tracing(default_directive: &str) {
    use tracing_subscriber::{fmt, EnvFilter};
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    if fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init()
        .is_err()
    {
        tracing::debug!("tracing subscriber already installed");
    }
}
