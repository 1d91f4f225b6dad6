use std::io::{self, Write};
use std::panic;

use log::error;

/// Debug builds get full backtraces, release builds a crash report.
/// Either way the panic lands in the log before the process exits.
pub fn initialize_panic_handler() {
    if cfg!(debug_assertions) {
        better_panic::install();
    } else {
        human_panic::setup_panic!();
    }

    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        error!("Panic: {panic_info}");
        log::logger().flush();
        restore_terminal();

        default_hook(panic_info);

        std::process::exit(1);
    }));
}

/// Move off a half-drawn progress line
pub fn restore_terminal() {
    let _ = writeln!(io::stderr());
    let _ = io::stderr().flush();
}
