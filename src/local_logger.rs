use std::{
    env,
    sync::{Arc, Mutex},
    time::Duration,
};

use crate::logger::{GroupEvent, get_group_event};
use crate::prelude::*;
use console::{Style, style};
use indicatif::{ProgressBar, ProgressStyle};
use lazy_static::lazy_static;
use log::Log;
use simplelog::{CombinedLogger, SharedLogger};
use std::io::Write;

pub const LOG_LEVEL_ENV: &str = "SCREEPS_BENCHMARK_LOG";
pub const ACCENT_U8_COLOR_CODE: u8 = 37; // #00AFAF

lazy_static! {
    pub static ref SPINNER: Arc<Mutex<Option<ProgressBar>>> = Arc::new(Mutex::new(None));
    pub static ref IS_TTY: bool = std::io::IsTerminal::is_terminal(&std::io::stdout());
}

/// Hide the spinner temporarily, execute `f`, then redraw it.
///
/// If the output is not a TTY, `f` will be executed without hiding anything.
pub fn suspend_progress_bar<F: FnOnce() -> R, R>(f: F) -> R {
    if *IS_TTY
        && let Ok(mut spinner) = SPINNER.lock()
        && let Some(spinner) = spinner.as_mut()
    {
        return spinner.suspend(f);
    }

    f()
}

fn log_level_from_env() -> log::LevelFilter {
    env::var(LOG_LEVEL_ENV)
        .ok()
        .and_then(|log_level| log_level.parse::<log::LevelFilter>().ok())
        .unwrap_or(log::LevelFilter::Info)
}

pub struct LocalLogger {
    log_level: log::LevelFilter,
}

impl LocalLogger {
    pub fn new() -> Self {
        LocalLogger {
            log_level: log_level_from_env(),
        }
    }

    fn start_group(&self, name: &str) {
        println!(
            "\n{}",
            style(format!("►►► {name} "))
                .bold()
                .color256(ACCENT_U8_COLOR_CODE)
        );

        if !*IS_TTY {
            println!("{name}...");
            return;
        }

        let spinner = ProgressBar::new_spinner();
        if let Ok(spinner_style) = ProgressStyle::with_template(&format!(
            "  {{spinner:>.{ACCENT_U8_COLOR_CODE}}} {{wide_msg:.{ACCENT_U8_COLOR_CODE}.bold}}"
        )) {
            spinner.set_style(spinner_style);
        }
        spinner.set_message(format!("{name}..."));
        spinner.enable_steady_tick(Duration::from_millis(100));
        if let Ok(mut current) = SPINNER.lock()
            && let Some(previous) = current.replace(spinner)
        {
            previous.finish_and_clear();
        }
    }

    fn end_group(&self) {
        clean_logger();
    }
}

impl Default for LocalLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl Log for LocalLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= self.log_level
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        match get_group_event(record) {
            Some(GroupEvent::Start(name)) => self.start_group(&name),
            Some(GroupEvent::End) => self.end_group(),
            None => suspend_progress_bar(|| print_record(record)),
        }
    }

    fn flush(&self) {
        let _ = std::io::stdout().flush();
    }
}

/// Print a log record to the console with the appropriate style
fn print_record(record: &log::Record) {
    let error_style = Style::new().red();
    let info_style = Style::new().white();
    let warn_style = Style::new().yellow();
    let debug_style = Style::new().blue().dim();
    let trace_style = Style::new().black().dim();

    match record.level() {
        log::Level::Error => eprintln!("{}", error_style.apply_to(record.args())),
        log::Level::Warn => eprintln!("{}", warn_style.apply_to(record.args())),
        log::Level::Info => println!("{}", info_style.apply_to(record.args())),
        log::Level::Debug => println!(
            "{}",
            debug_style.apply_to(format!("[DEBUG::{}] {}", record.target(), record.args())),
        ),
        log::Level::Trace => println!(
            "{}",
            trace_style.apply_to(format!("[TRACE::{}] {}", record.target(), record.args()))
        ),
    }
}

impl SharedLogger for LocalLogger {
    fn level(&self) -> log::LevelFilter {
        self.log_level
    }

    fn config(&self) -> Option<&simplelog::Config> {
        None
    }

    fn as_log(self: Box<Self>) -> Box<dyn Log> {
        Box::new(*self)
    }
}

pub fn init_local_logger() -> Result<()> {
    let logger: Box<dyn SharedLogger> = Box::new(LocalLogger::new());
    CombinedLogger::init(vec![logger])?;
    Ok(())
}

pub fn clean_logger() {
    if let Ok(mut spinner) = SPINNER.lock()
        && let Some(spinner) = spinner.take()
    {
        spinner.finish_and_clear();
    }
}
