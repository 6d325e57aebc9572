use log::LevelFilter;

/// Initialise `env_logger` for the server binary.
///
/// `debug` raises our own crates to `Debug`; actix internals stay at `Info`.
pub fn init_logging(debug: bool) {
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let result = env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .filter_module("soprano_server", level)
        .filter_module("soprano_core", level)
        .filter_module("soprano_llm", level)
        .format_timestamp_millis()
        .try_init();

    if let Err(e) = result {
        log::warn!("Logger already initialised: {}", e);
    }
}
