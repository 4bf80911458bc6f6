use tracing_subscriber::prelude::*;

/// Targets that are too chatty at INFO while hundreds of nodes are being queried.
const QUIET_TARGETS: [&str; 2] = ["hyper=warn", "reqwest=warn"];

/// Init tracing
pub fn init_tracing() {
    let mut env = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
        .from_env_lossy();
    for directive in QUIET_TARGETS {
        if let Ok(directive) = directive.parse() {
            env = env.add_directive(directive);
        }
    }
    let fmt_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_file(true)
        .with_line_number(true);
    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env)
        .init();
}
