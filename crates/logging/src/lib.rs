use time::macros::format_description;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

#[doc(hidden)]
pub use tracing as __tracing;

fn env_filter() -> EnvFilter {
    // RUST_LOG wins when set
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Multi-line output, handy while developing prompts.
pub fn init_logger() {
    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_thread_names(true)
                .with_line_number(false)
                .with_file(false)
                .pretty(),
        )
        .with(env_filter())
        .try_init();
}

/// One line per event with a local timestamp. Used by the CLI.
pub fn init_compact_logger() {
    let time_format =
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:2]");

    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_timer(fmt::time::LocalTime::new(time_format))
                .with_target(false)
                .with_level(true)
                .with_thread_names(false)
                .with_line_number(false)
                .with_file(false)
                .with_span_events(fmt::format::FmtSpan::NONE)
                .compact(),
        )
        .with(env_filter())
        .try_init();
}

/// Run a block and log how long it took at `info` level.
///
/// ```ignore
/// let rows = timeit!("executed query", { store.execute(&sql, &[]).await? });
/// ```
///
/// `?` inside the block returns from the enclosing function as usual; the
/// timing line is only emitted when the block completes.
#[macro_export]
macro_rules! timeit {
    ($label:expr, $body:block) => {{
        let __started = ::std::time::Instant::now();
        let __out = $body;
        $crate::__tracing::info!(
            elapsed_ms = __started.elapsed().as_millis() as u64,
            "{}",
            $label
        );
        __out
    }};
}
