/// Intercept messages using the `log` crate and print them to STDERR. Defaults to `info`;
/// `RUST_LOG` overrides that. Calling this more than once is harmless.
pub fn setup() {
    use env_logger::{Builder, Env};
    if Builder::from_env(Env::default().default_filter_or("info"))
        .try_init()
        .is_err()
    {
        debug!("Logging was already set up");
    }
}
