use std::panic;

/// Install the panic hook for the binary.
///
/// Debug builds get a full backtrace, release builds a short report file.
/// Either way the panic is also written to the log.
pub fn initialize_panic_handler() {
    if cfg!(debug_assertions) {
        better_panic::install();
    } else {
        human_panic::setup_panic!();
    }

    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        log::error!("{panic_info}");
        log::logger().flush();
        default_hook(panic_info);
    }));
}
